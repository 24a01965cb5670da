use anyhow::Context;
use flockid::{Beacon, Envelope, Error, UnregisterRequest};
use serde::{Serialize, de::DeserializeOwned};
use std::{future::Future, time::Duration};

/// The worker's view of its coordinator.
///
/// Every non-success outcome, whether transport or application level, comes
/// back as an [`Error`].
pub trait Coordinator: Send + Sync {
    /// Registers `beacon` and returns the assigned identity.
    fn register(&self, beacon: &Beacon) -> impl Future<Output = flockid::Result<u16>> + Send;

    fn heartbeat(&self, beacon: &Beacon) -> impl Future<Output = flockid::Result<()>> + Send;

    fn unregister(&self, worker_id: u16) -> impl Future<Output = flockid::Result<()>> + Send;
}

/// A [`Coordinator`] reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpCoordinator {
    client: reqwest::Client,
    base_url: String,
}

impl HttpCoordinator {
    /// Every request fails after `timeout`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to create coordinator http client")?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { client, base_url })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> flockid::Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.url(path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::TransportFailure(format!("POST {url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::TransportFailure(format!("POST {url}: HTTP {status}")));
        }

        response
            .json::<Envelope<T>>()
            .await
            .map_err(|e| Error::TransportFailure(format!("POST {url}: malformed response: {e}")))?
            .into_result()
    }
}

impl Coordinator for HttpCoordinator {
    async fn register(&self, beacon: &Beacon) -> flockid::Result<u16> {
        self.post("/master/registry", beacon).await
    }

    async fn heartbeat(&self, beacon: &Beacon) -> flockid::Result<()> {
        self.post::<_, u16>("/master/heartbeat", beacon)
            .await
            .map(|_| ())
    }

    async fn unregister(&self, worker_id: u16) -> flockid::Result<()> {
        self.post::<_, u16>("/master/unregister", &UnregisterRequest { worker_id })
            .await
            .map(|_| ())
    }
}
