//! Logging initialization

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::cli::Args;

/// Kept alive for the duration of the program
pub struct TelemetryGuards;

/// `RUST_LOG` wins over `--log-level` when set.
pub fn init_telemetry(args: &Args) -> Result<TelemetryGuards> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directives(&args.log_level)))
        .context("Failed to create environment filter")?;

    if args.json_logs {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().with_target(true))
            .try_init()
            .context("Failed to install log subscriber")?;
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .pretty()
                    .with_target(true)
                    .with_line_number(true)
                    .with_file(true),
            )
            .try_init()
            .context("Failed to install log subscriber")?;
    }

    Ok(TelemetryGuards)
}

/// Our crates log at `level`; dependencies stay at warn unless asked for more.
fn default_directives(level: &str) -> String {
    let level = level.to_lowercase();
    let deps = match level.as_str() {
        "trace" | "debug" => "info",
        _ => "warn",
    };
    format!(
        "{deps},siemq_server={level},siemq_api={level},siemq_conversation={level},\
         siemq_context={level},siemq_nlp={level},siemq_infra={level},tower_http={level}"
    )
}
