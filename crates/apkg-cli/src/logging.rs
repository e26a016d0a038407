//! Logging setup
//!
//! Nothing is logged unless `APKG_LOG` is set (e.g. `APKG_LOG=debug`).
//! Logs go to the configured `log_file`, or stderr when none is set.

use std::fs::File;
use std::sync::Mutex;

use tracing::info;
use tracing_subscriber::EnvFilter;

use apkg_core::Config;

/// Environment variable holding the log level
const LOG_ENV: &str = "APKG_LOG";

/// Initialize logging for a command
///
/// `default_level` is used when `APKG_LOG` is unset; `None` disables logging.
pub fn init(config: &Config, default_level: Option<&str>) {
    let level = match std::env::var(LOG_ENV) {
        Ok(level) if !level.trim().is_empty() => level,
        _ => match default_level {
            Some(level) => level.to_string(),
            None => return,
        },
    };

    let env_filter = EnvFilter::new(filter_directive(&level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false);

    // Ignore the error if a subscriber is already installed
    match &config.log_file {
        Some(path) => {
            let file = match File::create(path) {
                Ok(f) => f,
                Err(e) => {
                    eprintln!("Warning: Could not create log file {:?}: {}", path, e);
                    return;
                }
            };
            let _ = builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init();
            info!("Logging to {:?}", path);
        }
        None => {
            let _ = builder.with_writer(std::io::stderr).try_init();
        }
    }
}

/// Filter applying `level` to this project's crates only
fn filter_directive(level: &str) -> String {
    let level = level.trim();
    format!("apkg_core={},apkg_export={},tower_http={}", level, level, level)
}
