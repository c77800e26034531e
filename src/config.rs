//! Service configuration via CLI args and environment variables.

use std::time::Duration;

use clap::Parser;

use crate::middleware::Skipper;

/// Runtime settings for a service built on tsu-observe.
#[derive(Parser, Debug, Clone)]
#[command(name = "tsu-observe", version, about)]
pub struct Config {
    /// Bind address.
    #[arg(long, default_value = "0.0.0.0", env = "TSU_HOST")]
    pub host: String,

    /// Bind port.
    #[arg(long, default_value_t = 3000, env = "TSU_PORT")]
    pub port: u16,

    /// Service name stamped on every summary record.
    #[arg(long, default_value = "tsu", env = "TSU_SERVICE")]
    pub service: String,

    /// Paths left out of body and summary logging (comma-separated).
    #[arg(long, env = "TSU_SKIP_PATHS", value_delimiter = ',')]
    pub skip_paths: Vec<String>,

    /// Log level, used when `RUST_LOG` is not set.
    #[arg(long, default_value = "info", env = "TSU_LOG_LEVEL")]
    pub log_level: String,

    /// Log output format: `text` or `json`.
    #[arg(long, default_value = "json", env = "TSU_LOG_FORMAT")]
    pub log_format: String,

    /// Seconds in-flight requests get after a shutdown signal.
    #[arg(long, default_value_t = 10, env = "TSU_SHUTDOWN_GRACE")]
    pub shutdown_grace: u64,
}

impl Config {
    /// Parses configuration from CLI args and env vars.
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The skip set, built once from `skip_paths`.
    pub fn skipper(&self) -> Skipper {
        Skipper::new(self.skip_paths.iter().map(|p| p.trim()).filter(|p| !p.is_empty()))
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace)
    }
}
