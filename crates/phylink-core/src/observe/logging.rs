//! # Structured Logging
//!
//! Simulation runs log through `tracing`. [`init_logging`] installs one
//! global subscriber: an [`EnvFilter`] plus a JSON, pretty or compact fmt
//! layer. `RUST_LOG` still wins when set and no explicit filter is given.
//!
//! Without a filter the chosen level applies to the `phylink_*` crates only;
//! everything else stays at `warn`, so Monte Carlo sweeps are not drowned in
//! dependency chatter.
//!
//! ## Example
//!
//! ```rust,ignore
//! use phylink_core::observe::{init_logging, LogConfig, LogFormat};
//!
//! let config = LogConfig {
//!     format: LogFormat::Json,
//!     ..LogConfig::default().with_verbosity(1)
//! };
//! init_logging(&config);
//!
//! tracing::info!(snr_db = 10.0, ber = 1.2e-4, "Simulation complete");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{prelude::*, EnvFilter};

/// Crates whose events follow [`LogConfig::level`]
const PHYLINK_TARGETS: [&str; 2] = ["phylink_core", "phylink_sim"];

/// Severity threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Per-metric and per-round detail
    Trace,
    /// Stage completions and decoder statistics
    Debug,
    #[default]
    Info,
    /// Fallbacks and unreadable cache entries
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

/// Output encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per event
    Json,
    /// Multi-line, colored
    #[default]
    Pretty,
    /// One line per event
    Compact,
}

/// `logging:` section of the configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: LogLevel,
    pub format: LogFormat,
    /// Add file:line to each event
    pub source_location: bool,
    /// Add the thread name (`phylink-sim-N` inside the parallel runner)
    pub thread_names: bool,
    /// Emit span enter/exit events
    pub span_events: bool,
    /// Raw `EnvFilter` directives, e.g. `"phylink_core::codec=trace,info"`
    pub filter: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Pretty,
            source_location: false,
            thread_names: false,
            span_events: false,
            filter: None,
        }
    }
}

impl LogConfig {
    /// Debug level with locations, thread names and span events.
    pub fn development() -> Self {
        Self {
            level: LogLevel::Debug,
            source_location: true,
            thread_names: true,
            span_events: true,
            ..Default::default()
        }
    }

    /// JSON at info level with thread names, for batch runs.
    pub fn production() -> Self {
        Self {
            format: LogFormat::Json,
            thread_names: true,
            ..Default::default()
        }
    }

    /// Compact, errors only.
    pub fn quiet() -> Self {
        Self {
            level: LogLevel::Error,
            format: LogFormat::Compact,
            ..Default::default()
        }
    }

    /// Raise the level by `verbose` steps from the configured one (`-v`
    /// is debug, `-vv` trace). Zero keeps the configured level.
    pub fn with_verbosity(mut self, verbose: u8) -> Self {
        self.level = match verbose {
            0 => self.level,
            1 => self.level.min(LogLevel::Debug),
            _ => LogLevel::Trace,
        };
        self
    }

    /// Filter directives used when neither `filter` nor `RUST_LOG` is set.
    pub fn directives(&self) -> String {
        if let Some(custom) = &self.filter {
            return custom.clone();
        }
        let mut directives = vec![LogLevel::Warn.as_str().to_string()];
        directives.extend(PHYLINK_TARGETS.iter().map(|t| format!("{}={}", t, self.level)));
        directives.join(",")
    }

    fn env_filter(&self) -> EnvFilter {
        let fallback = || EnvFilter::default().add_directive(LevelFilter::from(self.level).into());
        match &self.filter {
            Some(custom) => EnvFilter::try_new(custom).unwrap_or_else(|_| fallback()),
            None => EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(self.directives()))
                .unwrap_or_else(|_| fallback()),
        }
    }
}

/// Install the global subscriber. Returns `false` when one was already set.
pub fn init_logging(config: &LogConfig) -> bool {
    let span_events = if config.span_events { FmtSpan::FULL } else { FmtSpan::NONE };
    let layer = tracing_subscriber::fmt::layer()
        .with_file(config.source_location)
        .with_line_number(config.source_location)
        .with_thread_names(config.thread_names)
        .with_span_events(span_events);
    let registry = tracing_subscriber::registry().with(config.env_filter());

    let installed = match config.format {
        LogFormat::Json => tracing::subscriber::set_global_default(registry.with(layer.json())),
        LogFormat::Pretty => tracing::subscriber::set_global_default(registry.with(layer.pretty())),
        LogFormat::Compact => tracing::subscriber::set_global_default(registry.with(layer.compact())),
    }
    .is_ok();

    if installed {
        tracing::debug!(level = %config.level, format = ?config.format, "Logging initialized");
    }
    installed
}
