pub mod config;
pub mod master;
pub mod telemetry;
pub mod worker;

use anyhow::Context;
use axum::Router;
use config::ServerConfig;
use flockid::{SystemClock, SystemInterfaces, WorkerNode, WorkerRegistry};
use std::{future::Future, sync::Arc};
use tokio::{net::TcpListener, task::JoinSet};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use worker::client::HttpCoordinator;

/// Runs the enabled roles until `shutdown` resolves or one of them fails.
///
/// Every background task shares one [`CancellationToken`]. Shutdown cancels
/// it, lets the HTTP server drain and waits for every task; the first task
/// error becomes the result.
pub async fn run(
    config: ServerConfig,
    shutdown: impl Future<Output = ()> + Send,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "listening");

    let token = CancellationToken::new();
    let mut tasks: JoinSet<anyhow::Result<()>> = JoinSet::new();
    let mut app = Router::new();

    if config.master {
        let store = master::open_store(config.store_path.as_deref())?;
        let registry =
            Arc::new(WorkerRegistry::new(store).context("failed to load worker records")?);
        app = app.merge(master::router(Arc::clone(&registry)));
        tasks.spawn(master::liveness::run(
            registry,
            master::liveness::LIVENESS_PERIOD,
            token.clone(),
        ));
    }

    let node = config
        .worker
        .then(|| Arc::new(WorkerNode::new(config.generator, SystemClock)));
    if let Some(node) = &node {
        app = app.merge(worker::router(Arc::clone(node)));
    }

    let app = app.layer(TraceLayer::new_for_http());
    let server_token = token.clone();
    tasks.spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(server_token.cancelled_owned())
            .await
            .context("http server failed")
    });

    if let Some(node) = node {
        let coordinator =
            HttpCoordinator::new(&config.master_address, config.coordinator_timeout)?;
        tasks.spawn(worker::run(
            node,
            coordinator,
            SystemInterfaces,
            config.exposed_address.clone(),
            token.clone(),
        ));
    }

    let mut result = tokio::select! {
        () = shutdown => Ok(()),
        Some(joined) = tasks.join_next() => flatten(joined),
    };

    token.cancel();
    while let Some(joined) = tasks.join_next().await {
        let outcome = flatten(joined);
        if result.is_ok() {
            result = outcome;
        } else if let Err(e) = outcome {
            tracing::error!("{e:#}");
        }
    }
    result
}

fn flatten(joined: Result<anyhow::Result<()>, tokio::task::JoinError>) -> anyhow::Result<()> {
    joined.context("background task panicked")?
}
