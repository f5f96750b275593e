//! Logging initialization
//!
//! Installs a global `tracing` subscriber. `RUST_LOG` wins over the configured level.

use tracing_subscriber::EnvFilter;

use crate::core::config::{LogFormat, LoggingConfig};

/// Build the filter for a config, preferring `RUST_LOG` when set.
pub fn env_filter(cfg: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.level))
}

/// Initialize the global tracing subscriber from config.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_logging(cfg: &LoggingConfig) {
    let filter = env_filter(cfg);

    let installed = match cfg.format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .compact()
            .try_init(),
    };

    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice_is_harmless() {
        let cfg = LoggingConfig::default();
        init_logging(&cfg);
        init_logging(&LoggingConfig {
            level: "debug".to_string(),
            format: LogFormat::Json,
        });
    }
}
