pub mod config;

#[cfg(feature = "stdout")]
pub mod stdout;

use std::str::FromStr;

use tracing::level_filters::LevelFilter;
use tracing_subscriber::{filter::Directive, EnvFilter};

use crate::config::Config;

pub const DEFAULT_FILTER: &str = "info";

pub trait Telemetry: Default {
    fn from_config(config: Config) -> Self;

    /// Directive from config, or [`DEFAULT_FILTER`]. Falls back to `INFO` when
    /// the configured directive does not parse.
    fn default_directive(config: &Config) -> Directive {
        let filter = config
            .filter
            .clone()
            .unwrap_or(DEFAULT_FILTER.to_string());
        Directive::from_str(filter.as_str())
            .inspect_err(|e| eprintln!("invalid log filter {filter:?}: {e}"))
            .unwrap_or_else(|_| LevelFilter::INFO.into())
    }

    fn env_filter(directive: Directive) -> EnvFilter {
        EnvFilter::builder()
            .with_default_directive(directive)
            .from_env_lossy()
    }

    fn with_directive(self, directive: Directive) -> Self;
    fn with_filter(self, filter: EnvFilter) -> Self;
    fn init(self);
}
