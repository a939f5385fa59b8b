//! Structured logging initialization.

use std::fs::{File, OpenOptions};
use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::Subscriber;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::{fmt, util::SubscriberInitExt, EnvFilter};

use crate::error::{TelemetryError, TelemetryResult};

const DEFAULT_FILTER: &str = "info,trendbot=debug";

/// Console output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Logging settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub log_format: LogFormat,
    /// Plain-text log file, appended to.
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl LoggingConfig {
    /// Effective console format. `RUST_ENV=production` forces JSON.
    pub fn effective_format(&self) -> LogFormat {
        let is_production = std::env::var("RUST_ENV")
            .map(|v| v == "production")
            .unwrap_or(false);
        if is_production {
            LogFormat::Json
        } else {
            self.log_format
        }
    }
}

/// Initialize logging.
///
/// `RUST_LOG` overrides the default filter (`info,trendbot=debug`).
pub fn init_logging(config: &LoggingConfig) -> TelemetryResult<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let file = config.log_file.as_ref().map(open_log_file).transpose()?;

    let result = match config.effective_format() {
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true),
            )
            .with(file_layer(file))
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .pretty()
                    .with_target(true)
                    .with_thread_names(true),
            )
            .with(file_layer(file))
            .try_init(),
    };

    result.map_err(|e| TelemetryError::LoggingInit(e.to_string()))
}

fn open_log_file(path: &PathBuf) -> TelemetryResult<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| TelemetryError::LogFile {
            path: path.clone(),
            source,
        })
}

fn file_layer<S>(file: Option<File>) -> Option<impl Layer<S>>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    file.map(|f| {
        fmt::layer()
            .with_writer(Mutex::new(f))
            .with_ansi(false)
            .with_target(true)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_deserializes_lowercase() {
        let cfg: LoggingConfig =
            serde_json::from_str(r#"{"log_format":"json","log_file":"bot.log"}"#).unwrap();
        assert_eq!(cfg.log_format, LogFormat::Json);
        assert_eq!(cfg.log_file, Some(PathBuf::from("bot.log")));

        let cfg: LoggingConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.log_format, LogFormat::Pretty);
        assert_eq!(cfg.log_file, None);
    }

    #[test]
    fn test_unopenable_log_file_reported() {
        let path = PathBuf::from("/nonexistent-dir/for-sure/trendbot.log");
        let err = open_log_file(&path).unwrap_err();
        assert!(matches!(err, TelemetryError::LogFile { .. }));
    }
}
