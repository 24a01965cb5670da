use super::client::Coordinator;
use flockid::{
    Beacon, Error, InterfaceSource, RegistrationIdentity, TimeSource, resolve_fingerprint,
};
use std::time::Duration;

pub const REGISTER_ATTEMPTS: u32 = 3;
pub const REGISTER_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Obtains an identity for this host from the coordinator.
///
/// The fingerprint is resolved once; a host without a usable interface fails
/// immediately. Each of the [`REGISTER_ATTEMPTS`] attempts carries a fresh
/// timestamp, and a failed attempt is followed by [`REGISTER_RETRY_DELAY`]
/// unless it was the last. The last attempt's error is returned.
pub async fn register<C, I, T>(
    coordinator: &C,
    interfaces: &I,
    time: &T,
    exposed_address: &str,
) -> flockid::Result<RegistrationIdentity>
where
    C: Coordinator,
    I: InterfaceSource,
    T: TimeSource,
{
    let fingerprint = resolve_fingerprint(interfaces)?;
    tracing::info!(%fingerprint, exposed_address, "registering with coordinator");

    let mut last_error = Error::TransportFailure("registration was never attempted".into());
    for attempt in 1..=REGISTER_ATTEMPTS {
        let beacon = Beacon {
            fingerprint,
            timestamp: time.current_millis(),
            exposed_address: exposed_address.to_string(),
            worker_id: None,
        };
        match coordinator.register(&beacon).await {
            Ok(identity) => {
                tracing::info!(identity, attempt, "registered with coordinator");
                return Ok(RegistrationIdentity {
                    fingerprint,
                    exposed_address: beacon.exposed_address,
                    identity,
                });
            }
            Err(e) => {
                tracing::error!(attempt, "registration attempt failed: {e}");
                last_error = e;
            }
        }
        if attempt < REGISTER_ATTEMPTS {
            tokio::time::sleep(REGISTER_RETRY_DELAY).await;
        }
    }
    Err(last_error)
}
