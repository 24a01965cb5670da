use super::client::Coordinator;
use flockid::{
    Beacon, Error, InterfaceSource, RegistrationIdentity, TimeSource, WorkerNode,
    resolve_fingerprint,
};
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;

pub const HEARTBEAT_INITIAL_DELAY: Duration = Duration::from_secs(5);
pub const HEARTBEAT_PERIOD: Duration = Duration::from_secs(10);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeartbeatSchedule {
    pub initial_delay: Duration,
    pub period: Duration,
}

impl Default for HeartbeatSchedule {
    fn default() -> Self {
        Self {
            initial_delay: HEARTBEAT_INITIAL_DELAY,
            period: HEARTBEAT_PERIOD,
        }
    }
}

/// Proves liveness to the coordinator on `schedule` until `token` is
/// cancelled.
///
/// Nothing is retried. The first failed beat, whether the interface is gone,
/// the fingerprint changed or the coordinator refused, terminates `node` and
/// is returned. Cancellation is only observed between beats.
pub async fn run<C, I, T, N>(
    coordinator: &C,
    interfaces: &I,
    time: &T,
    node: &WorkerNode<N>,
    schedule: HeartbeatSchedule,
    token: CancellationToken,
) -> flockid::Result<()>
where
    C: Coordinator,
    I: InterfaceSource,
    T: TimeSource,
    N: TimeSource + Clone,
{
    let registration = node.registration().cloned().ok_or(Error::NotRegistered)?;
    let mut ticker = interval_at(Instant::now() + schedule.initial_delay, schedule.period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = token.cancelled() => {
                tracing::info!(identity = registration.identity, "heartbeat stopped");
                return Ok(());
            }
            _ = ticker.tick() => {}
        }

        if let Err(e) = beat(coordinator, interfaces, time, &registration).await {
            tracing::error!(
                identity = registration.identity,
                "heartbeat failed, terminating worker: {e}"
            );
            node.terminate();
            return Err(e);
        }
        tracing::debug!(identity = registration.identity, "heartbeat accepted");
    }
}

async fn beat<C, I, T>(
    coordinator: &C,
    interfaces: &I,
    time: &T,
    registration: &RegistrationIdentity,
) -> flockid::Result<()>
where
    C: Coordinator,
    I: InterfaceSource,
    T: TimeSource,
{
    let current = resolve_fingerprint(interfaces)?;
    if current != registration.fingerprint {
        return Err(Error::FingerprintChanged {
            registered: registration.fingerprint,
            current,
        });
    }
    coordinator
        .heartbeat(&Beacon {
            fingerprint: current,
            timestamp: time.current_millis(),
            exposed_address: registration.exposed_address.clone(),
            worker_id: Some(registration.identity),
        })
        .await
}
