//! Periodic eviction of workers that stopped sending heartbeats.

use flockid::{TimeSource, WorkerRegistry, WorkerStore};
use std::{sync::Arc, time::Duration};
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;

pub const LIVENESS_PERIOD: Duration = Duration::from_secs(10);

/// Sweeps `registry` every `period`, starting immediately, until `token` is
/// cancelled.
///
/// A failed sweep is logged and retried on the next tick. Cancellation is
/// only observed between sweeps.
pub async fn run<S, T>(
    registry: Arc<WorkerRegistry<S, T>>,
    period: Duration,
    token: CancellationToken,
) -> anyhow::Result<()>
where
    S: WorkerStore,
    T: TimeSource,
{
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = token.cancelled() => {
                tracing::info!("liveness checker stopped");
                return Ok(());
            }
            _ = ticker.tick() => {}
        }

        match registry.evict_stale() {
            Ok(evicted) if !evicted.is_empty() => {
                tracing::info!(evicted = evicted.len(), "liveness sweep evicted workers");
            }
            Ok(_) => tracing::debug!("liveness sweep found no stale workers"),
            Err(e) => tracing::error!("liveness sweep failed: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flockid::{Fingerprint, HardwareAddr, MemoryStore};
    use std::net::Ipv4Addr;
    use std::sync::atomic::{AtomicU64, Ordering};

    const NOW: u64 = 1_723_421_600_000;

    struct ManualClock(AtomicU64);

    impl TimeSource for ManualClock {
        fn current_millis(&self) -> u64 {
            self.0.load(Ordering::Relaxed)
        }
    }

    fn fingerprint(n: u8) -> Fingerprint {
        Fingerprint {
            ip: Ipv4Addr::new(10, 0, 0, n),
            mac: HardwareAddr([0x02, 0, 0, 0, 0, n]),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn evicts_silent_workers_on_schedule() {
        let clock = Arc::new(ManualClock(AtomicU64::new(NOW)));
        let registry =
            Arc::new(WorkerRegistry::with_time(MemoryStore::new(), Arc::clone(&clock)).unwrap());
        registry
            .register(fingerprint(1), "http://10.0.0.1:8080".into(), NOW)
            .unwrap();

        let token = CancellationToken::new();
        let task = tokio::spawn(run(
            Arc::clone(&registry),
            LIVENESS_PERIOD,
            token.clone(),
        ));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(registry.live_workers().len(), 1);

        clock.0.fetch_add(10_001, Ordering::Relaxed);
        tokio::time::sleep(LIVENESS_PERIOD).await;
        assert!(registry.live_workers().is_empty());
        assert!(registry.select_live_worker().is_err());

        token.cancel();
        task.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn stops_when_cancelled() {
        let registry = Arc::new(WorkerRegistry::new(MemoryStore::new()).unwrap());
        let token = CancellationToken::new();
        token.cancel();
        run(registry, LIVENESS_PERIOD, token).await.unwrap();
    }
}
