use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

use super::{NewWorker, StoreError, WorkerRecord, WorkerStore, next_identity};
use crate::Fingerprint;

/// Records indexed by identity and by fingerprint.
#[derive(Debug, Default)]
pub(crate) struct Records {
    by_id: BTreeMap<u16, WorkerRecord>,
    by_fingerprint: HashMap<Fingerprint, u16>,
}

impl Records {
    pub(crate) fn from_records(records: Vec<WorkerRecord>) -> Result<Self, StoreError> {
        let mut this = Self::default();
        for record in records {
            if this.by_fingerprint.contains_key(&record.fingerprint) {
                return Err(StoreError::DuplicateFingerprint(record.fingerprint));
            }
            this.by_fingerprint.insert(record.fingerprint, record.id);
            this.by_id.insert(record.id, record);
        }
        Ok(this)
    }

    pub(crate) fn insert(&mut self, worker: NewWorker) -> Result<WorkerRecord, StoreError> {
        if self.by_fingerprint.contains_key(&worker.fingerprint) {
            return Err(StoreError::DuplicateFingerprint(worker.fingerprint));
        }
        let id = next_identity(self.max_id())?;
        let record = WorkerRecord {
            id,
            fingerprint: worker.fingerprint,
            exposed_address: worker.exposed_address,
            last_heartbeat: worker.last_heartbeat,
        };
        self.by_fingerprint.insert(record.fingerprint, id);
        self.by_id.insert(id, record.clone());
        Ok(record)
    }

    pub(crate) fn get(&self, id: u16) -> Option<WorkerRecord> {
        self.by_id.get(&id).cloned()
    }

    pub(crate) fn find_by_fingerprint(&self, fingerprint: &Fingerprint) -> Option<WorkerRecord> {
        self.by_fingerprint
            .get(fingerprint)
            .and_then(|id| self.by_id.get(id))
            .cloned()
    }

    pub(crate) fn list(&self) -> Vec<WorkerRecord> {
        self.by_id.values().cloned().collect()
    }

    pub(crate) fn delete(&mut self, id: u16) -> bool {
        match self.by_id.remove(&id) {
            Some(record) => {
                self.by_fingerprint.remove(&record.fingerprint);
                true
            }
            None => false,
        }
    }

    pub(crate) fn max_id(&self) -> Option<u16> {
        self.by_id.last_key_value().map(|(id, _)| *id)
    }

    pub(crate) fn touch(&mut self, id: u16, last_heartbeat: u64) -> bool {
        match self.by_id.get_mut(&id) {
            Some(record) => {
                record.last_heartbeat = last_heartbeat;
                true
            }
            None => false,
        }
    }
}

/// A [`WorkerStore`] that lives only as long as the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<Records>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WorkerStore for MemoryStore {
    fn insert(&self, worker: NewWorker) -> Result<WorkerRecord, StoreError> {
        self.records.write().insert(worker)
    }

    fn get(&self, id: u16) -> Result<Option<WorkerRecord>, StoreError> {
        Ok(self.records.read().get(id))
    }

    fn find_by_fingerprint(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<Option<WorkerRecord>, StoreError> {
        Ok(self.records.read().find_by_fingerprint(fingerprint))
    }

    fn list(&self) -> Result<Vec<WorkerRecord>, StoreError> {
        Ok(self.records.read().list())
    }

    fn delete(&self, id: u16) -> Result<bool, StoreError> {
        Ok(self.records.write().delete(id))
    }

    fn max_id(&self) -> Result<Option<u16>, StoreError> {
        Ok(self.records.read().max_id())
    }

    fn touch(&self, id: u16, last_heartbeat: u64) -> Result<bool, StoreError> {
        Ok(self.records.write().touch(id, last_heartbeat))
    }
}
