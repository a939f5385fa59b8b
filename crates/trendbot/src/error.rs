//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Gateway error: {0}")]
    Gateway(#[from] trendbot_gateway::GatewayError),

    #[error("Instrument error: {0}")]
    Core(#[from] trendbot_core::CoreError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] trendbot_telemetry::TelemetryError),
}

impl From<config::ConfigError> for AppError {
    fn from(e: config::ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;
