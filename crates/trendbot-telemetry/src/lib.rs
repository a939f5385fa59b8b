//! Prometheus metrics and structured logging for the trend bot.
//!
//! - Structured logging with tracing (pretty or JSON, optional log file)
//! - Prometheus counters for the batch pipeline, rendered at end of run

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::{init_logging, LogFormat, LoggingConfig};
pub use metrics::Metrics;
