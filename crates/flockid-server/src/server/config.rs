use anyhow::bail;
use clap::Parser;
use flockid::{
    ClockDriftPolicy, DEFAULT_EPOCH, DEFAULT_EPOCH_MILLIS, GeneratorConfig, IdLayout,
    MAX_WAIT_BOUND_MS, SystemClock, TimeSource, parse_epoch,
};
use std::{path::PathBuf, time::Duration};

/// Runtime configuration for the `flockid-server` binary.
///
/// One process can act as the coordinator (`--master`), as an id-serving
/// worker (`--worker`), or as both. Every option can also be given through
/// its environment variable or a `.env` file.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "flockid-server",
    version,
    about = "Coordinator and worker for coordinator-assigned Snowflake IDs"
)]
pub struct CliArgs {
    /// Address the HTTP server binds to.
    ///
    /// Environment variable: `SF_LISTEN_ADDR`
    #[arg(long, env = "SF_LISTEN_ADDR", default_value_t = String::from("0.0.0.0:8080"))]
    pub listen_addr: String,

    /// Base URL under which this process is reachable by clients. The
    /// coordinator redirects id requests to `<exposed-address>/worker/id`.
    ///
    /// Environment variable: `SF_EXPOSED_ADDRESS`
    #[arg(long, env = "SF_EXPOSED_ADDRESS", default_value_t = String::from("http://127.0.0.1:8080"))]
    pub exposed_address: String,

    /// Base URL of the coordinator a worker registers with.
    ///
    /// Environment variable: `SF_MASTER_ADDRESS`
    #[arg(long, env = "SF_MASTER_ADDRESS", default_value_t = String::from("http://127.0.0.1:8080"))]
    pub master_address: String,

    /// Run the coordinator role.
    ///
    /// Environment variable: `SF_MASTER_ENABLED`
    #[arg(long, env = "SF_MASTER_ENABLED", default_value_t = false)]
    pub master: bool,

    /// Run the worker role.
    ///
    /// Environment variable: `SF_WORKER_ENABLED`
    #[arg(long, env = "SF_WORKER_ENABLED", default_value_t = false)]
    pub worker: bool,

    /// Reaction to the local clock moving backward: `reject`, `wait` or
    /// `auto`. Unrecognised values fall back to `auto`.
    ///
    /// Environment variable: `SF_CLOCK_DRIFT_STRATEGY`
    #[arg(long, env = "SF_CLOCK_DRIFT_STRATEGY", default_value_t = String::from("auto"))]
    pub clock_drift_strategy: String,

    /// Longest backward drift, in milliseconds, the `wait` strategy sits out.
    /// Capped at 1000.
    ///
    /// Environment variable: `SF_WAIT_TIME`
    #[arg(long, env = "SF_WAIT_TIME", default_value_t = 30)]
    pub wait_time: u64,

    /// Epoch origin of the timestamp field, RFC 3339 or
    /// `YYYY-MM-DD HH:MM:SS` in local time.
    ///
    /// Environment variable: `SF_START_TIME`
    #[arg(long, env = "SF_START_TIME", default_value_t = String::from(DEFAULT_EPOCH))]
    pub start_time: String,

    /// Bit layout of issued ids: `standard` or `compat`.
    ///
    /// Environment variable: `SF_ID_LAYOUT`
    #[arg(long, env = "SF_ID_LAYOUT", default_value_t = IdLayout::STANDARD)]
    pub id_layout: IdLayout,

    /// JSON file the coordinator keeps worker records in. Records are kept in
    /// memory only when unset.
    ///
    /// Environment variable: `SF_STORE_PATH`
    #[arg(long, env = "SF_STORE_PATH")]
    pub store_path: Option<PathBuf>,

    /// Timeout for every worker-to-coordinator request, in milliseconds.
    ///
    /// Environment variable: `SF_COORDINATOR_TIMEOUT_MS`
    #[arg(long, env = "SF_COORDINATOR_TIMEOUT_MS", default_value_t = 3_000)]
    pub coordinator_timeout_ms: u64,

    /// Emit logs as JSON lines instead of the human-readable format.
    ///
    /// Environment variable: `SF_LOG_JSON`
    #[arg(long, env = "SF_LOG_JSON", default_value_t = false)]
    pub log_json: bool,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub exposed_address: String,
    pub master_address: String,
    pub master: bool,
    pub worker: bool,
    pub generator: GeneratorConfig,
    pub store_path: Option<PathBuf>,
    pub coordinator_timeout: Duration,
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if !args.master && !args.worker {
            bail!("at least one of --master (SF_MASTER_ENABLED) or --worker (SF_WORKER_ENABLED) must be enabled");
        }

        if args.coordinator_timeout_ms == 0 {
            bail!("SF_COORDINATOR_TIMEOUT_MS must be greater than 0");
        }

        let policy = args
            .clock_drift_strategy
            .parse::<ClockDriftPolicy>()
            .unwrap_or_else(|e| {
                tracing::warn!("{e}, falling back to `{}`", ClockDriftPolicy::Auto);
                ClockDriftPolicy::Auto
            });

        if args.wait_time > MAX_WAIT_BOUND_MS {
            tracing::warn!(
                "SF_WAIT_TIME ({}) exceeds {MAX_WAIT_BOUND_MS} ms, clamping",
                args.wait_time
            );
        }

        let epoch_millis = parse_epoch(&args.start_time).unwrap_or_else(|| {
            tracing::warn!(
                "unparseable SF_START_TIME `{}`, falling back to {DEFAULT_EPOCH}",
                args.start_time
            );
            DEFAULT_EPOCH_MILLIS
        });

        let now = SystemClock.current_millis();
        if epoch_millis > now {
            bail!(
                "SF_START_TIME ({epoch_millis} ms) lies in the future (now = {now} ms)"
            );
        }

        Ok(Self {
            listen_addr: args.listen_addr,
            exposed_address: args.exposed_address,
            master_address: args.master_address,
            master: args.master,
            worker: args.worker,
            generator: GeneratorConfig::new(policy, args.wait_time, epoch_millis)
                .with_layout(args.id_layout),
            store_path: args.store_path,
            coordinator_timeout: Duration::from_millis(args.coordinator_timeout_ms),
        })
    }
}
