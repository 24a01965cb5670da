//! Log output.
//!
//! Events go through a `tracing_subscriber` registry filtered by `RUST_LOG`
//! (default `info`). The human-readable format is used unless `--log-json` is
//! set, in which case each event is a JSON line.

use tracing_subscriber::{
    EnvFilter, fmt::time::ChronoLocal, layer::SubscriberExt, util::SubscriberInitExt,
};

pub fn init_telemetry(json: bool) -> anyhow::Result<()> {
    let registry = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()));

    let layer = tracing_subscriber::fmt::layer()
        .with_thread_ids(true)
        .with_line_number(true)
        .with_target(false)
        .with_timer(ChronoLocal::rfc_3339())
        .with_file(true);

    if json {
        registry.with(layer.json()).try_init()?;
    } else {
        registry.with(layer.pretty()).try_init()?;
    }

    Ok(())
}
