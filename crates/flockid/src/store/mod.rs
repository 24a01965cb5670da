//! Durable worker records.
//!
//! The registry keeps its live view in memory and writes through to a
//! [`WorkerStore`] so assigned identities survive a coordinator restart.

mod file;
mod memory;

pub use file::*;
pub use memory::*;

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::{Fingerprint, MAX_WORKER_ID};

/// A persisted worker registration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerRecord {
    /// The assigned identity, unique and at most [`MAX_WORKER_ID`].
    pub id: u16,
    pub fingerprint: Fingerprint,
    /// Base URL the worker serves ids on.
    pub exposed_address: String,
    /// Milliseconds since the Unix epoch.
    pub last_heartbeat: u64,
}

/// A registration awaiting an identity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewWorker {
    pub fingerprint: Fingerprint,
    pub exposed_address: String,
    pub last_heartbeat: u64,
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum StoreError {
    #[error("store i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("store snapshot is malformed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("fingerprint {0} is already stored")]
    DuplicateFingerprint(Fingerprint),

    #[error("no identity left below {}", MAX_WORKER_ID + 1)]
    IdSpaceExhausted,
}

/// Persistence for [`WorkerRecord`]s.
///
/// `insert` assigns `max(id) + 1`, or `0` for an empty store, and never reuses
/// an identity below the current maximum. Fingerprints are unique.
pub trait WorkerStore: Send + Sync {
    /// Stores `worker` under a fresh identity and returns the full record.
    fn insert(&self, worker: NewWorker) -> Result<WorkerRecord, StoreError>;

    fn get(&self, id: u16) -> Result<Option<WorkerRecord>, StoreError>;

    fn find_by_fingerprint(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<Option<WorkerRecord>, StoreError>;

    /// All records ordered by identity.
    fn list(&self) -> Result<Vec<WorkerRecord>, StoreError>;

    /// Removes the record for `id`, returning whether one existed.
    fn delete(&self, id: u16) -> Result<bool, StoreError>;

    fn max_id(&self) -> Result<Option<u16>, StoreError>;

    /// Updates `last_heartbeat` for `id`, returning whether a record existed.
    fn touch(&self, id: u16, last_heartbeat: u64) -> Result<bool, StoreError>;
}

macro_rules! forward_store {
    ($($ty:ty),*) => {$(
        impl<S: WorkerStore + ?Sized> WorkerStore for $ty {
            fn insert(&self, worker: NewWorker) -> Result<WorkerRecord, StoreError> {
                (**self).insert(worker)
            }

            fn get(&self, id: u16) -> Result<Option<WorkerRecord>, StoreError> {
                (**self).get(id)
            }

            fn find_by_fingerprint(
                &self,
                fingerprint: &Fingerprint,
            ) -> Result<Option<WorkerRecord>, StoreError> {
                (**self).find_by_fingerprint(fingerprint)
            }

            fn list(&self) -> Result<Vec<WorkerRecord>, StoreError> {
                (**self).list()
            }

            fn delete(&self, id: u16) -> Result<bool, StoreError> {
                (**self).delete(id)
            }

            fn max_id(&self) -> Result<Option<u16>, StoreError> {
                (**self).max_id()
            }

            fn touch(&self, id: u16, last_heartbeat: u64) -> Result<bool, StoreError> {
                (**self).touch(id, last_heartbeat)
            }
        }
    )*};
}

forward_store!(Box<S>, Arc<S>);

/// Next identity after `max`, if one is left.
pub(crate) fn next_identity(max: Option<u16>) -> Result<u16, StoreError> {
    match max {
        None => Ok(0),
        Some(max) if max < MAX_WORKER_ID => Ok(max + 1),
        Some(_) => Err(StoreError::IdSpaceExhausted),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_identity_is_max_plus_one() {
        assert_eq!(next_identity(None).unwrap(), 0);
        assert_eq!(next_identity(Some(0)).unwrap(), 1);
        assert_eq!(next_identity(Some(1022)).unwrap(), 1023);
        assert!(matches!(
            next_identity(Some(1023)),
            Err(StoreError::IdSpaceExhausted)
        ));
    }
}
