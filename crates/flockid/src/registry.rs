use parking_lot::RwLock;
use rand::seq::IndexedRandom;
#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    Error, Fingerprint, MAX_WORKER_ID, NewWorker, Result, StoreError, SystemClock, TimeSource,
    WorkerRecord, WorkerStore,
};

/// A beacon timestamp further than this from the coordinator's clock is
/// replaced by the coordinator's clock.
pub const HEARTBEAT_TOLERANCE_MS: u64 = 3_000;

/// Records whose last heartbeat is older than this are evicted.
pub const STALE_AFTER_MS: u64 = 10_000;

/// The coordinator's view of the worker fleet.
///
/// Identities are allocated through the [`WorkerStore`]; the registry adds the
/// uniqueness and capacity checks on top and keeps an in-memory list of live
/// workers for load balancing. Registration, unregistration and the eviction
/// sweep all mutate that list under one write lock, so a reader never sees it
/// half rebuilt and two sweeps never interleave. Heartbeats only touch the
/// store.
pub struct WorkerRegistry<S, T = SystemClock> {
    store: S,
    live: RwLock<Vec<WorkerRecord>>,
    time: T,
}

impl<S: WorkerStore> WorkerRegistry<S> {
    /// Creates a registry on the system clock, warming the live list from
    /// `store`.
    pub fn new(store: S) -> Result<Self> {
        Self::with_time(store, SystemClock)
    }
}

impl<S, T> WorkerRegistry<S, T>
where
    S: WorkerStore,
    T: TimeSource,
{
    pub fn with_time(store: S, time: T) -> Result<Self> {
        let live = store.list()?;
        #[cfg(feature = "tracing")]
        tracing::info!(workers = live.len(), "worker registry loaded");
        Ok(Self {
            store,
            live: RwLock::new(live),
            time,
        })
    }

    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Assigns an identity to a new fingerprint.
    ///
    /// # Errors
    ///
    /// [`Error::RegistrationConflict`] if the fingerprint already holds an
    /// identity, [`Error::CapacityExceeded`] once identity
    /// [`MAX_WORKER_ID`] has been handed out.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self), fields(%fingerprint)))]
    pub fn register(
        &self,
        fingerprint: Fingerprint,
        exposed_address: String,
        timestamp: u64,
    ) -> Result<u16> {
        let mut live = self.live.write();

        if self.store.find_by_fingerprint(&fingerprint)?.is_some() {
            #[cfg(feature = "tracing")]
            tracing::warn!("fingerprint already registered");
            return Err(Error::RegistrationConflict);
        }
        if self.store.max_id()?.is_some_and(|max| max >= MAX_WORKER_ID) {
            #[cfg(feature = "tracing")]
            tracing::warn!("worker capacity exceeded");
            return Err(Error::CapacityExceeded);
        }

        let last_heartbeat = self.reconcile(timestamp);
        let record = self
            .store
            .insert(NewWorker {
                fingerprint,
                exposed_address,
                last_heartbeat,
            })
            .map_err(|e| match e {
                StoreError::DuplicateFingerprint(_) => Error::RegistrationConflict,
                StoreError::IdSpaceExhausted => Error::CapacityExceeded,
                other => Error::Store(other),
            })?;

        #[cfg(feature = "tracing")]
        tracing::info!(identity = record.id, address = %record.exposed_address, "worker registered");
        let id = record.id;
        live.push(record);
        Ok(id)
    }

    /// Records a heartbeat from `identity`.
    ///
    /// Heartbeats run concurrently with each other but never inside an
    /// [`evict_stale`](Self::evict_stale) sweep: either the sweep sees the
    /// refreshed timestamp, or the record is already gone and the heartbeat
    /// fails.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownWorker`] if no record exists for `identity`.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self)))]
    pub fn heartbeat(&self, identity: u16, timestamp: u64) -> Result<()> {
        let _no_sweep = self.live.read();
        if self.store.get(identity)?.is_none() {
            #[cfg(feature = "tracing")]
            tracing::warn!("heartbeat from unknown worker");
            return Err(Error::UnknownWorker(identity));
        }
        let last_heartbeat = self.reconcile(timestamp);
        if !self.store.touch(identity, last_heartbeat)? {
            return Err(Error::UnknownWorker(identity));
        }
        Ok(())
    }

    /// Removes `identity` from the store and the live list.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownWorker`] if no record exists for `identity`.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self)))]
    pub fn unregister(&self, identity: u16) -> Result<()> {
        let mut live = self.live.write();
        if !self.store.delete(identity)? {
            return Err(Error::UnknownWorker(identity));
        }
        live.retain(|record| record.id != identity);
        #[cfg(feature = "tracing")]
        tracing::info!("worker unregistered");
        Ok(())
    }

    /// The exposed address of a uniformly chosen live worker.
    ///
    /// # Errors
    ///
    /// [`Error::NoWorkersAvailable`] when the live list is empty.
    pub fn select_live_worker(&self) -> Result<String> {
        self.live
            .read()
            .choose(&mut rand::rng())
            .map(|record| record.exposed_address.clone())
            .ok_or(Error::NoWorkersAvailable)
    }

    /// Deletes every record whose heartbeat is older than
    /// [`STALE_AFTER_MS`] and rebuilds the live list from the survivors.
    ///
    /// Returns the evicted records. A record whose deletion fails stays live
    /// and is retried by the next sweep; the live list is rebuilt either way
    /// and the first deletion error is returned.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self)))]
    pub fn evict_stale(&self) -> Result<Vec<WorkerRecord>> {
        let mut live = self.live.write();
        let now = self.time.current_millis();

        let (stale, mut survivors): (Vec<_>, Vec<_>) = self
            .store
            .list()?
            .into_iter()
            .partition(|record| now.saturating_sub(record.last_heartbeat) > STALE_AFTER_MS);

        let mut evicted = Vec::with_capacity(stale.len());
        let mut failure = None;
        for record in stale {
            match self.store.delete(record.id) {
                Ok(_) => {
                    #[cfg(feature = "tracing")]
                    tracing::info!(
                        identity = record.id,
                        address = %record.exposed_address,
                        silent_ms = now.saturating_sub(record.last_heartbeat),
                        "evicted stale worker"
                    );
                    evicted.push(record);
                }
                Err(e) => {
                    #[cfg(feature = "tracing")]
                    tracing::error!(identity = record.id, "failed to evict stale worker: {e}");
                    survivors.push(record);
                    failure.get_or_insert(e);
                }
            }
        }

        survivors.sort_unstable_by_key(|record| record.id);
        *live = survivors;
        match failure {
            Some(e) => Err(e.into()),
            None => Ok(evicted),
        }
    }

    /// A copy of the live list.
    pub fn live_workers(&self) -> Vec<WorkerRecord> {
        self.live.read().clone()
    }

    /// Substitutes the coordinator's clock for a timestamp outside
    /// [`HEARTBEAT_TOLERANCE_MS`].
    fn reconcile(&self, timestamp: u64) -> u64 {
        let now = self.time.current_millis();
        if now.abs_diff(timestamp) > HEARTBEAT_TOLERANCE_MS {
            #[cfg(feature = "tracing")]
            tracing::warn!(
                reported = timestamp,
                substituted = now,
                "worker clock outside tolerance, using coordinator time"
            );
            now
        } else {
            timestamp
        }
    }
}

impl<S: core::fmt::Debug, T> core::fmt::Debug for WorkerRegistry<S, T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WorkerRegistry")
            .field("store", &self.store)
            .field("live", &self.live.read().len())
            .finish_non_exhaustive()
    }
}
