//! JSON bodies exchanged between workers and the coordinator.

use serde::{Deserialize, Serialize};

use crate::{Error, Fingerprint, StoreError};

/// Envelope status codes.
pub mod codes {
    pub const SUCCESS: i32 = 0;
    /// The fingerprint already holds an identity.
    pub const DUPLICATE_FINGERPRINT: i32 = -1;
    /// The named worker has no record.
    pub const UNKNOWN_WORKER: i32 = -1;
    /// All identities are taken.
    pub const CAPACITY_EXCEEDED: i32 = -2;
    /// Any other coordinator-side failure.
    pub const FAILURE: i32 = -100;
}

/// Body of `GET /worker/id` when generation fails.
pub const ID_FAILURE: i64 = -1;

/// A worker's registration or heartbeat.
///
/// Serialized flat, for example
/// `{"ip":"10.0.0.7","mac":"00-1A-2B-3C-4D-5E","timestamp":1723421520000,"exposedAddress":"http://10.0.0.7:8080","workerId":3}`.
/// `workerId` is only carried on heartbeats.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Beacon {
    #[serde(flatten)]
    pub fingerprint: Fingerprint,
    /// Sender's wall clock in milliseconds since the Unix epoch.
    pub timestamp: u64,
    pub exposed_address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<u16>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnregisterRequest {
    pub worker_id: u16,
}

/// The coordinator's response wrapper.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub code: i32,
    pub message: String,
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    pub fn success(data: T) -> Self {
        Self {
            code: codes::SUCCESS,
            message: "success".to_string(),
            data: Some(data),
        }
    }

    pub fn fail(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub const fn is_success(&self) -> bool {
        self.code == codes::SUCCESS
    }

    /// Unwraps a successful payload, turning anything else into
    /// [`Error::TransportFailure`].
    pub fn into_result(self) -> Result<T, Error> {
        match self {
            Self {
                code: codes::SUCCESS,
                data: Some(data),
                ..
            } => Ok(data),
            Self { code, message, .. } => Err(Error::TransportFailure(format!(
                "coordinator answered {code}: {message}"
            ))),
        }
    }
}

impl<T> From<&Error> for Envelope<T> {
    fn from(err: &Error) -> Self {
        let code = match err {
            Error::RegistrationConflict | Error::Store(StoreError::DuplicateFingerprint(_)) => {
                codes::DUPLICATE_FINGERPRINT
            }
            Error::CapacityExceeded | Error::Store(StoreError::IdSpaceExhausted) => {
                codes::CAPACITY_EXCEEDED
            }
            Error::UnknownWorker(_) => codes::UNKNOWN_WORKER,
            _ => codes::FAILURE,
        };
        Self::fail(code, err.to_string())
    }
}
