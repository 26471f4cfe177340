//! # Observability
//!
//! - **Logging**: structured logs via `tracing`
//! - **Diagnostics**: pipeline stage events delivered to an injected sink
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use phylink_core::observe::{init_logging, LogConfig, RecordingSink};
//!
//! init_logging(&LogConfig::default());
//!
//! let sink = std::sync::Arc::new(RecordingSink::new());
//! // hand `sink.clone()` to a pipeline, then inspect `sink.stages()`
//! ```

pub mod diagnostics;
pub mod logging;

pub use diagnostics::{DiagnosticEvent, DiagnosticsSink, RecordingSink, Stage, TracingSink};
pub use logging::{init_logging, LogConfig, LogFormat, LogLevel};
