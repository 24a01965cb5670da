//! Coordinator role: identity registration, heartbeats, eviction and the
//! public redirect endpoint.

pub mod liveness;
mod routes;

pub use routes::router;

use anyhow::Context;
use flockid::{FileStore, MemoryStore, WorkerStore};
use std::path::Path;

/// Opens the file-backed store at `path`, or an in-memory one.
pub fn open_store(path: Option<&Path>) -> anyhow::Result<Box<dyn WorkerStore>> {
    match path {
        Some(path) => {
            let store = FileStore::open(path)
                .with_context(|| format!("failed to open worker store {}", path.display()))?;
            tracing::info!(path = %path.display(), "using file-backed worker store");
            Ok(Box::new(store))
        }
        None => {
            tracing::info!("using in-memory worker store");
            Ok(Box::new(MemoryStore::new()))
        }
    }
}
