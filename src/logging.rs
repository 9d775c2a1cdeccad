//! Logging setup for the receiver binary.
//!
//! Logs go to stderr so that `sign` output on stdout stays machine-readable.
//! `RUST_LOG` takes precedence over the verbosity passed on the command line.

use tracing_subscriber::{fmt, EnvFilter};

/// Log level selected from the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    /// Only rejected and failed requests
    Warn,
    /// Startup, shutdown and received events (default)
    #[default]
    Info,
    /// Per-request verification outcomes
    Debug,
    /// Everything, including skipped requests
    Trace,
}

impl LogLevel {
    fn as_str(self) -> &'static str {
        match self {
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl From<u8> for LogLevel {
    /// Convert verbosity count to log level.
    /// 0 = Info, 1 = Debug, 2+ = Trace
    fn from(verbosity: u8) -> Self {
        match verbosity {
            0 => LogLevel::Info,
            1 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }
}

/// Configuration for the tracing subscriber.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// The log level to use
    pub level: LogLevel,
    /// Whether to include timestamps
    pub with_timestamps: bool,
    /// Whether to include the target (module path)
    pub with_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            with_timestamps: true,
            with_target: true,
        }
    }
}

impl LoggingConfig {
    /// Set the log level.
    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    /// Set whether to include timestamps.
    pub fn with_timestamps(mut self, enabled: bool) -> Self {
        self.with_timestamps = enabled;
        self
    }

    /// Create a configuration from verbosity level (0 = info, 1 = debug, 2+ = trace).
    pub fn from_verbosity(verbosity: u8) -> Self {
        Self::default().with_level(LogLevel::from(verbosity))
    }

    /// Filter directives applied when `RUST_LOG` is not set.
    ///
    /// Covers this crate and the `tower_http` request spans; everything else
    /// stays at `warn`.
    pub fn directives(&self) -> String {
        let level = self.level.as_str();
        format!("warn,clubhouse_webhook={level},tower_http={level}")
    }
}

/// Initialize the global tracing subscriber.
///
/// Call once at startup. A second call panics, as with any global subscriber.
pub fn init_logging(config: LoggingConfig) {
    let env_filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new(config.directives())
    };

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(config.with_target);

    if config.with_timestamps {
        subscriber.init();
    } else {
        subscriber.without_time().init();
    }
}
