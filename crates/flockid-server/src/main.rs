#![doc = include_str!("../README.md")]

mod server;

use clap::Parser;
use server::config::{CliArgs, ServerConfig};
use server::telemetry::init_telemetry;
use tokio::signal;

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();

    // Config resolution logs its fallbacks, so telemetry goes first.
    init_telemetry(args.log_json)?;
    let config = ServerConfig::try_from(args)?;

    if cfg!(debug_assertions) {
        tracing::info!("starting flockid-server with full config: {config:#?}");
    } else {
        tracing::info!(
            listen = %config.listen_addr,
            master = config.master,
            worker = config.worker,
            "starting flockid-server"
        );
    }

    let result = server::run(config, shutdown_signal()).await;
    match &result {
        Ok(()) => tracing::info!("flockid-server shut down"),
        Err(e) => tracing::error!("flockid-server stopped: {e:#}"),
    }
    result
}

async fn shutdown_signal() {
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = ctrl_c => tracing::info!("received Ctrl+C signal"),
        () = terminate => tracing::info!("received SIGTERM signal"),
    }
}
