use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub const LOG_FORMAT_ENV: &str = "STRATEGY_CORE_LOG_FORMAT";

#[derive(Parser, Debug, Clone)]
#[command(
    name = "strategy-core serve",
    about = "HTTP API for the household balance-sheet stress dashboard"
)]
pub struct ServeConfig {
    #[arg(env = "STRATEGY_CORE_PORT", default_value_t = 8080)]
    pub port: u16,
    #[arg(
        long,
        env = "STRATEGY_CORE_DATA_FILE",
        default_value = "strategy-core.json",
        help = "JSON file the session snapshot is saved to"
    )]
    pub data_file: PathBuf,
    #[arg(
        long,
        env = "STRATEGY_CORE_AUTOSAVE_MS",
        default_value_t = 3_000,
        help = "Quiet period after the last edit before the snapshot is written"
    )]
    pub autosave_ms: u64,
}

impl ServeConfig {
    pub fn autosave_delay(&self) -> Duration {
        Duration::from_millis(self.autosave_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.autosave_ms == 0 {
            return Err("--autosave-ms must be > 0".to_string());
        }
        if self.data_file.as_os_str().is_empty() {
            return Err("--data-file must not be empty".to_string());
        }
        Ok(())
    }
}

/// Logs go to stderr so `report` output on stdout stays machine-readable.
/// `RUST_LOG` controls the filter; `STRATEGY_CORE_LOG_FORMAT=json` switches to
/// JSON lines.
pub fn init_tracing() {
    let log_format = std::env::var(LOG_FORMAT_ENV).unwrap_or_else(|_| "text".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if log_format.eq_ignore_ascii_case("json") {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_line_number(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}
