//! Tracing setup from the `[application]` section.
//!
//! One `fmt` layer in the configured format, filtered by `RUST_LOG` when it is
//! set and by `application.log_level` otherwise.
//!
//! # Example
//! ```no_run
//! use biofum::{config::BiofumConfig, logging};
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = BiofumConfig::load()?;
//! logging::init_from_config(&config)?;
//! tracing::info!(port = %config.stage.port, "Connecting to stage");
//! # Ok(())
//! # }
//! ```

use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

use crate::config::BiofumConfig;

/// How log lines are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Multi-line, colored, with source locations
    Pretty,
    /// One plain line per event, for log files
    Compact,
    /// Newline-delimited JSON
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            _ => Err(anyhow!("unknown log format '{}'", s)),
        }
    }
}

/// Install the global subscriber described by `config.application`.
///
/// Does nothing when a global subscriber is already installed.
pub fn init_from_config(config: &BiofumConfig) -> Result<()> {
    let format: LogFormat = config.application.log_format.parse()?;
    let filter = env_filter(&config.application.log_level)?;

    if tracing::dispatcher::has_been_set() {
        return Ok(());
    }

    let layer: Box<dyn Layer<Registry> + Send + Sync> = match format {
        LogFormat::Pretty => fmt::layer()
            .pretty()
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_ansi(false).boxed(),
        LogFormat::Json => fmt::layer().json().boxed(),
    };

    match tracing_subscriber::registry()
        .with(layer.with_filter(filter))
        .try_init()
    {
        Ok(()) => Ok(()),
        // another thread installed one between the check and here
        Err(_) if tracing::dispatcher::has_been_set() => Ok(()),
        Err(e) => Err(e).context("installing tracing subscriber"),
    }
}

/// `RUST_LOG` if set, else the configured level.
fn env_filter(level: &str) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    let level =
        LevelFilter::from_str(level).with_context(|| format!("invalid log level '{}'", level))?;
    Ok(EnvFilter::default().add_directive(level.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_format() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("Compact".parse::<LogFormat>().unwrap(), LogFormat::Compact);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_bad_level_is_rejected_before_install() {
        let mut config = BiofumConfig::default();
        config.application.log_level = "verbose".to_string();
        if std::env::var_os("RUST_LOG").is_none() {
            assert!(init_from_config(&config).is_err());
        }

        let mut config = BiofumConfig::default();
        config.application.log_format = "xml".to_string();
        assert!(init_from_config(&config).is_err());
    }

    #[test]
    fn test_init_is_idempotent() {
        let mut config = BiofumConfig::default();
        config.application.log_level = "error".to_string();
        assert!(init_from_config(&config).is_ok());

        config.application.log_format = "json".to_string();
        assert!(init_from_config(&config).is_ok());
    }
}
