use tracing::level_filters::LevelFilter;
use tracing_subscriber::{
    filter::Directive,
    fmt,
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
    Registry,
};

use crate::{
    config::{Config, LogFormat},
    Telemetry,
};

/// Logs to stdout, pretty or JSON.
pub struct StdoutTelemetry {
    format: LogFormat,
    filter: EnvFilter,
}

impl StdoutTelemetry {
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    fn try_init(self) -> Result<(), tracing_subscriber::util::TryInitError> {
        let registry = Registry::default().with(self.filter);
        match self.format {
            LogFormat::Pretty => {
                registry
                    .with(
                        fmt::layer()
                            .with_ansi(cfg!(debug_assertions))
                            .with_file(true)
                            .with_line_number(true)
                            .with_target(false)
                            .with_thread_names(true),
                    )
                    .try_init()
            }
            LogFormat::Json => {
                registry
                    .with(
                        fmt::layer()
                            .json()
                            .with_current_span(true)
                            .with_target(true),
                    )
                    .try_init()
            }
        }
    }
}

impl Telemetry for StdoutTelemetry {
    fn from_config(config: Config) -> Self {
        Self {
            format: config.format,
            filter: Self::env_filter(Self::default_directive(&config)),
        }
    }

    fn with_directive(mut self, directive: Directive) -> Self {
        self.filter = Self::env_filter(directive);
        self
    }

    fn with_filter(mut self, filter: EnvFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Installs the global subscriber. A second call is a no-op.
    fn init(self) {
        if let Err(e) = self.try_init() {
            eprintln!("telemetry already initialized: {e}");
        }
    }
}

impl Default for StdoutTelemetry {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            filter: Self::env_filter(LevelFilter::INFO.into()),
        }
    }
}
