//! Worker role: registration, heartbeats and the id endpoint.

pub mod client;
pub mod heartbeat;
pub mod registrar;
mod routes;

pub use routes::router;

use anyhow::Context;
use client::Coordinator;
use flockid::{InterfaceSource, SystemClock, TimeSource, WorkerNode};
use heartbeat::HeartbeatSchedule;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Drives `node` through its lifecycle.
///
/// Registers with the coordinator, activates the node and keeps it alive with
/// heartbeats. Failing to register or a failed heartbeat terminates the node
/// and is returned as an error. On cancellation the node is terminated and
/// the worker unregisters itself, best effort.
pub async fn run<C, I, T>(
    node: Arc<WorkerNode<T>>,
    coordinator: C,
    interfaces: I,
    exposed_address: String,
    token: CancellationToken,
) -> anyhow::Result<()>
where
    C: Coordinator,
    I: InterfaceSource + Sync,
    T: TimeSource + Clone + Send + Sync,
{
    run_with_schedule(
        node,
        coordinator,
        interfaces,
        exposed_address,
        HeartbeatSchedule::default(),
        token,
    )
    .await
}

async fn run_with_schedule<C, I, T>(
    node: Arc<WorkerNode<T>>,
    coordinator: C,
    interfaces: I,
    exposed_address: String,
    schedule: HeartbeatSchedule,
    token: CancellationToken,
) -> anyhow::Result<()>
where
    C: Coordinator,
    I: InterfaceSource + Sync,
    T: TimeSource + Clone + Send + Sync,
{
    let registered = tokio::select! {
        biased;
        () = token.cancelled() => {
            node.terminate();
            return Ok(());
        }
        registered = registrar::register(&coordinator, &interfaces, &SystemClock, &exposed_address) => registered,
    };

    let registration = match registered {
        Ok(registration) => registration,
        Err(e) => {
            node.terminate();
            return Err(e).context("worker registration failed");
        }
    };
    let identity = registration.identity;
    if !node.activate(registration) {
        anyhow::bail!("worker node could not be activated as {identity}");
    }

    heartbeat::run(
        &coordinator,
        &interfaces,
        &SystemClock,
        &node,
        schedule,
        token,
    )
    .await
    .context("worker terminated")?;

    node.terminate();
    match coordinator.unregister(identity).await {
        Ok(()) => tracing::info!(identity, "unregistered from coordinator"),
        Err(e) => tracing::warn!(identity, "failed to unregister from coordinator: {e}"),
    }
    Ok(())
}

impl<C: Coordinator + ?Sized> Coordinator for Arc<C> {
    fn register(
        &self,
        beacon: &flockid::Beacon,
    ) -> impl Future<Output = flockid::Result<u16>> + Send {
        (**self).register(beacon)
    }

    fn heartbeat(
        &self,
        beacon: &flockid::Beacon,
    ) -> impl Future<Output = flockid::Result<()>> + Send {
        (**self).heartbeat(beacon)
    }

    fn unregister(&self, worker_id: u16) -> impl Future<Output = flockid::Result<()>> + Send {
        (**self).unregister(worker_id)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::client::Coordinator;
    use flockid::{
        Beacon, Error, GeneratorConfig, HardwareAddr, InterfaceInfo, InterfaceSource,
        RegistrationIdentity, SystemClock, WorkerNode, resolve_fingerprint,
    };
    use std::collections::VecDeque;
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::Instant;

    pub fn mac() -> HardwareAddr {
        HardwareAddr([0x02, 0x42, 0x0A, 0x00, 0x00, 0x09])
    }

    /// A single `eth0` whose hardware address can be swapped or removed.
    pub struct FakeInterfaces(Mutex<Vec<InterfaceInfo>>);

    impl FakeInterfaces {
        pub fn set_mac(&self, mac: HardwareAddr) {
            for iface in self.0.lock().unwrap().iter_mut() {
                iface.mac = Some(mac);
            }
        }

        pub fn clear(&self) {
            self.0.lock().unwrap().clear();
        }
    }

    impl InterfaceSource for FakeInterfaces {
        fn interfaces(&self) -> Vec<InterfaceInfo> {
            self.0.lock().unwrap().clone()
        }
    }

    pub fn interfaces() -> FakeInterfaces {
        FakeInterfaces(Mutex::new(vec![InterfaceInfo {
            name: "eth0".into(),
            up: true,
            loopback: false,
            is_virtual: false,
            mac: Some(mac()),
            ips: vec![IpAddr::V4(Ipv4Addr::new(10, 0, 0, 9))],
        }]))
    }

    /// A node already activated as `identity` with the fingerprint of
    /// `interfaces`.
    pub fn active_node(interfaces: &FakeInterfaces, identity: u16) -> WorkerNode<SystemClock> {
        let node = WorkerNode::new(GeneratorConfig::default(), SystemClock);
        node.activate(RegistrationIdentity {
            fingerprint: resolve_fingerprint(interfaces).unwrap(),
            exposed_address: "http://10.0.0.9:8080".into(),
            identity,
        });
        node
    }

    /// Answers from scripts. Registration fails once its script runs out,
    /// heartbeats succeed.
    #[derive(Default)]
    pub struct FakeCoordinator {
        registrations: Mutex<VecDeque<flockid::Result<u16>>>,
        heartbeat_results: Mutex<VecDeque<flockid::Result<()>>>,
        register_calls: AtomicUsize,
        heartbeats: Mutex<Vec<(Instant, Beacon)>>,
        unregistered: Mutex<Vec<u16>>,
    }

    impl FakeCoordinator {
        pub fn registering(results: impl IntoIterator<Item = flockid::Result<u16>>) -> Self {
            Self {
                registrations: Mutex::new(results.into_iter().collect()),
                ..Self::default()
            }
        }

        pub fn with_heartbeats(
            self,
            results: impl IntoIterator<Item = flockid::Result<()>>,
        ) -> Self {
            *self.heartbeat_results.lock().unwrap() = results.into_iter().collect();
            self
        }

        pub fn register_calls(&self) -> usize {
            self.register_calls.load(Ordering::Relaxed)
        }

        pub fn heartbeats(&self) -> Vec<(Instant, Beacon)> {
            self.heartbeats.lock().unwrap().clone()
        }

        pub fn unregistered(&self) -> Vec<u16> {
            self.unregistered.lock().unwrap().clone()
        }
    }

    impl Coordinator for FakeCoordinator {
        async fn register(&self, _beacon: &Beacon) -> flockid::Result<u16> {
            self.register_calls.fetch_add(1, Ordering::Relaxed);
            self.registrations
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(Error::TransportFailure("no scripted response".into())))
        }

        async fn heartbeat(&self, beacon: &Beacon) -> flockid::Result<()> {
            self.heartbeats
                .lock()
                .unwrap()
                .push((Instant::now(), beacon.clone()));
            self.heartbeat_results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(()))
        }

        async fn unregister(&self, worker_id: u16) -> flockid::Result<()> {
            self.unregistered.lock().unwrap().push(worker_id);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{FakeCoordinator, interfaces};
    use super::*;
    use flockid::{Error, GeneratorConfig, Lifecycle};
    use std::time::Duration;
    use tokio::time::sleep;

    fn node() -> Arc<WorkerNode<SystemClock>> {
        Arc::new(WorkerNode::new(GeneratorConfig::default(), SystemClock))
    }

    #[tokio::test(start_paused = true)]
    async fn serves_until_cancelled_then_unregisters() {
        let coordinator = Arc::new(FakeCoordinator::registering([Ok(3)]));
        let node = node();
        let token = CancellationToken::new();

        let (result, ()) = tokio::join!(
            run(
                Arc::clone(&node),
                Arc::clone(&coordinator),
                interfaces(),
                "http://10.0.0.9:8080".into(),
                token.clone(),
            ),
            async {
                sleep(Duration::from_secs(1)).await;
                assert_eq!(node.lifecycle(), Lifecycle::Active);
                assert!(node.next_id().is_ok());
                sleep(Duration::from_secs(20)).await;
                token.cancel();
            }
        );

        result.unwrap();
        assert_eq!(coordinator.heartbeats().len(), 2);
        assert_eq!(coordinator.unregistered(), [3]);
        assert_eq!(node.lifecycle(), Lifecycle::Terminated);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_registration_terminates() {
        let coordinator = Arc::new(FakeCoordinator::registering([
            Err(Error::RegistrationConflict),
            Err(Error::RegistrationConflict),
            Err(Error::RegistrationConflict),
        ]));
        let node = node();

        let result = run(
            Arc::clone(&node),
            Arc::clone(&coordinator),
            interfaces(),
            "http://10.0.0.9:8080".into(),
            CancellationToken::new(),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(coordinator.register_calls(), 3);
        assert_eq!(node.lifecycle(), Lifecycle::Terminated);
        assert!(coordinator.unregistered().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_heartbeat_surfaces_as_error() {
        let coordinator = Arc::new(
            FakeCoordinator::registering([Ok(1)])
                .with_heartbeats([Err(Error::UnknownWorker(1))]),
        );
        let node = node();

        let result = run_with_schedule(
            Arc::clone(&node),
            Arc::clone(&coordinator),
            interfaces(),
            "http://10.0.0.9:8080".into(),
            HeartbeatSchedule {
                initial_delay: Duration::from_millis(10),
                period: Duration::from_millis(10),
            },
            CancellationToken::new(),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(node.lifecycle(), Lifecycle::Terminated);
        assert!(coordinator.unregistered().is_empty());
    }
}
