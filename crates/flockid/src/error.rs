use crate::{Fingerprint, store::StoreError};

/// A result type defaulting to the crate-wide [`Error`].
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// All error variants that `flockid` can emit.
///
/// Registry-side variants ([`Error::RegistrationConflict`],
/// [`Error::CapacityExceeded`], [`Error::UnknownWorker`]) are expected outcomes
/// of the registration protocol and are mapped onto status codes by the HTTP
/// layer. Worker-side variants are either returned to the immediate caller
/// ([`Error::NotRegistered`], [`Error::ClockMovedBackward`]) or are fatal to
/// the worker process ([`Error::NoUsableInterface`],
/// [`Error::FingerprintChanged`], [`Error::TransportFailure`]).
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// A worker with the same fingerprint already holds an identity.
    #[error("a worker with this fingerprint is already registered")]
    RegistrationConflict,

    /// Every identity in `0..=MAX_WORKER_ID` is taken.
    #[error("worker capacity exceeded")]
    CapacityExceeded,

    /// The worker has not completed registration, or has been terminated.
    #[error("worker is not registered")]
    NotRegistered,

    /// The local clock reports a time earlier than the last issued timestamp
    /// and the configured drift policy refused to wait for it.
    #[error("clock moved backward: last issued {last} ms, now {now} ms")]
    ClockMovedBackward {
        /// Last timestamp used for an issued id.
        last: u64,
        /// Timestamp observed when the request was refused.
        now: u64,
    },

    /// No network interface qualifies as this worker's fingerprint.
    #[error("no usable network interface found")]
    NoUsableInterface,

    /// The host's fingerprint no longer matches the one it registered with.
    #[error("fingerprint changed from {registered} to {current}")]
    FingerprintChanged {
        registered: Fingerprint,
        current: Fingerprint,
    },

    /// The coordinator could not be reached or answered unsuccessfully.
    #[error("coordinator transport failure: {0}")]
    TransportFailure(String),

    /// A heartbeat or unregistration named an identity with no record.
    #[error("unknown worker {0}")]
    UnknownWorker(u16),

    /// No live worker is available to route a request to.
    #[error("no live worker available")]
    NoWorkersAvailable,

    /// The record store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}
