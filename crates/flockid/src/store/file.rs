use parking_lot::Mutex;
use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use super::{NewWorker, StoreError, WorkerRecord, WorkerStore, memory::Records};
use crate::Fingerprint;

/// A [`WorkerStore`] persisted as a JSON array of records.
///
/// Every mutation rewrites the whole snapshot to a sibling temporary file and
/// renames it over the target, so a crash leaves either the old or the new
/// snapshot on disk. A mutation whose write fails is rolled back in memory.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    records: Mutex<Records>,
}

impl FileStore {
    /// Opens the snapshot at `path`, starting empty if it does not exist.
    ///
    /// # Errors
    ///
    /// Fails if the file exists but cannot be read or parsed, or if it holds
    /// two records with the same fingerprint.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let records = match fs::read(&path) {
            Ok(bytes) => Records::from_records(serde_json::from_slice(&bytes)?)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => Records::default(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            records: Mutex::new(records),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, records: &Records) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(&records.list())?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let mut file = fs::File::create(&tmp)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Runs `mutate` and persists the result, restoring the previous contents
    /// if persisting fails.
    fn mutate<R>(
        &self,
        mutate: impl FnOnce(&mut Records) -> Result<R, StoreError>,
    ) -> Result<R, StoreError> {
        let mut records = self.records.lock();
        let before = records.list();
        let out = mutate(&mut records)?;
        if let Err(e) = self.persist(&records) {
            *records = Records::from_records(before)?;
            return Err(e);
        }
        Ok(out)
    }
}

impl WorkerStore for FileStore {
    fn insert(&self, worker: NewWorker) -> Result<WorkerRecord, StoreError> {
        self.mutate(|records| records.insert(worker))
    }

    fn get(&self, id: u16) -> Result<Option<WorkerRecord>, StoreError> {
        Ok(self.records.lock().get(id))
    }

    fn find_by_fingerprint(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<Option<WorkerRecord>, StoreError> {
        Ok(self.records.lock().find_by_fingerprint(fingerprint))
    }

    fn list(&self) -> Result<Vec<WorkerRecord>, StoreError> {
        Ok(self.records.lock().list())
    }

    fn delete(&self, id: u16) -> Result<bool, StoreError> {
        self.mutate(|records| Ok(records.delete(id)))
    }

    fn max_id(&self) -> Result<Option<u16>, StoreError> {
        Ok(self.records.lock().max_id())
    }

    fn touch(&self, id: u16, last_heartbeat: u64) -> Result<bool, StoreError> {
        let mut records = self.records.lock();
        let Some(previous) = records.get(id).map(|record| record.last_heartbeat) else {
            return Ok(false);
        };
        records.touch(id, last_heartbeat);
        if let Err(e) = self.persist(&records) {
            records.touch(id, previous);
            return Err(e);
        }
        Ok(true)
    }
}
