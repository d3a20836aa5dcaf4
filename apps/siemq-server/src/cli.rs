//! Command-line argument parsing

use anyhow::bail;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "siemq-server",
    about = "Conversational security query server",
    version,
    long_about = "Answers natural-language questions about security events, \
                  keeping per-session context so follow-up questions refine earlier ones."
)]
pub struct Args {
    /// Path to configuration file (defaults and SIEMQ__* env vars apply when absent)
    #[arg(short, long, env = "SIEMQ_CONFIG")]
    pub config: Option<PathBuf>,

    /// HTTP server port, overriding the configuration file
    #[arg(short, long, env = "PORT")]
    pub port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        short,
        long,
        env = "LOG_LEVEL",
        default_value = "info",
        value_parser = ["trace", "debug", "info", "warn", "error"]
    )]
    pub log_level: String,

    /// Environment (dev, staging, prod)
    #[arg(
        short,
        long,
        env = "ENVIRONMENT",
        default_value = "dev",
        value_parser = ["dev", "staging", "prod"]
    )]
    pub env: String,

    /// Enable JSON log format
    #[arg(long, env = "JSON_LOGS")]
    pub json_logs: bool,
}

impl Args {
    pub fn validate(&self) -> anyhow::Result<()> {
        if let Some(path) = &self.config {
            if !path.is_file() {
                bail!("Configuration file not found: {}", path.display());
            }
        }
        if self.port == Some(0) {
            bail!("Port must be non-zero");
        }
        Ok(())
    }
}
