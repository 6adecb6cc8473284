//! Runtime configuration for the command-line front end

use crate::cli::Cli;
use crate::error::{Error, Result};
use clap::ValueEnum;
use std::fmt;
use tracing_subscriber::EnvFilter;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => f.write_str("text"),
            Self::Json => f.write_str("json"),
        }
    }
}

/// Logging configuration.
///
/// `RUST_LOG`, when set, takes precedence over `log_filter`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub log_format: LogFormat,
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Text,
            log_filter: "warn".to_string(),
        }
    }
}

impl Config {
    pub fn from_cli(cli: &Cli) -> Self {
        Self {
            log_format: cli.log_format,
            log_filter: cli.log_filter.clone(),
        }
    }

    /// Filter directives in effect, after applying `RUST_LOG`
    pub fn filter(&self) -> Result<EnvFilter> {
        let directives = std::env::var(EnvFilter::DEFAULT_ENV)
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| self.log_filter.clone());
        EnvFilter::try_new(&directives)
            .map_err(|e| Error::Configuration(format!("invalid log filter {:?}: {}", directives, e)))
    }

    /// Install the global tracing subscriber; logs go to stderr
    pub fn init_tracing(&self) -> Result<()> {
        let filter = self.filter()?;
        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr);
        let installed = match self.log_format {
            LogFormat::Text => builder.try_init(),
            LogFormat::Json => builder.json().try_init(),
        };
        installed.map_err(|e| Error::Configuration(e.to_string()))
    }
}
