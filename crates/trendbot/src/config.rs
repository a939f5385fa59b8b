//! Application configuration.
//!
//! Loaded from a TOML file, then overridden by `TRENDBOT__`-prefixed
//! environment variables (`TRENDBOT__GATEWAY__PORT=4002`).

use std::collections::HashSet;
use std::path::Path;

use config::{Config, Environment, File, FileFormat};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use trendbot_core::{Instrument, Quantity, SecurityType, Symbol};
use trendbot_gateway::SessionConfig;
use trendbot_telemetry::LoggingConfig;

use crate::error::{AppError, AppResult};

const ENV_PREFIX: &str = "TRENDBOT";

// ============================================================================
// Gateway
// ============================================================================

/// Broker gateway connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_client_id")]
    pub client_id: u32,
    /// Full bridge URL; overrides host/port when set.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Wait for `nextValidId` after connecting.
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,
    /// Delay between consecutive series requests.
    #[serde(default = "default_request_pacing_ms")]
    pub request_pacing_ms: u64,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    7497
}

fn default_client_id() -> u32 {
    123
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

fn default_handshake_timeout_ms() -> u64 {
    10_000
}

fn default_request_pacing_ms() -> u64 {
    1_000
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            client_id: default_client_id(),
            url: None,
            connect_timeout_ms: default_connect_timeout_ms(),
            handshake_timeout_ms: default_handshake_timeout_ms(),
            request_pacing_ms: default_request_pacing_ms(),
        }
    }
}

impl GatewayConfig {
    pub fn session_config(&self) -> SessionConfig {
        let mut session = SessionConfig::new(&self.host, self.port, self.client_id);
        if let Some(url) = &self.url {
            session.url = url.clone();
        }
        session.connect_timeout_ms = self.connect_timeout_ms;
        session.handshake_timeout_ms = self.handshake_timeout_ms;
        session
    }
}

// ============================================================================
// Batch
// ============================================================================

/// Per-run batch settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Bound on waiting for every series to complete.
    #[serde(default = "default_batch_timeout_ms")]
    pub timeout_ms: u64,
    /// Linger after dispatch so execution callbacks can correct ownership.
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
    #[serde(default = "default_duration")]
    pub duration: String,
    #[serde(default = "default_bar_size")]
    pub bar_size: String,
    #[serde(default = "default_what_to_show")]
    pub what_to_show: String,
    #[serde(default = "default_regular_hours_only")]
    pub regular_hours_only: bool,
}

fn default_batch_timeout_ms() -> u64 {
    60_000
}

fn default_settle_ms() -> u64 {
    10_000
}

fn default_duration() -> String {
    "1 Y".to_string()
}

fn default_bar_size() -> String {
    "1 day".to_string()
}

fn default_what_to_show() -> String {
    "ADJUSTED_LAST".to_string()
}

fn default_regular_hours_only() -> bool {
    true
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_batch_timeout_ms(),
            settle_ms: default_settle_ms(),
            duration: default_duration(),
            bar_size: default_bar_size(),
            what_to_show: default_what_to_show(),
            regular_hours_only: default_regular_hours_only(),
        }
    }
}

// ============================================================================
// Instruments
// ============================================================================

/// Values applied to instruments that do not override them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentDefaults {
    #[serde(default = "default_capital_per_trade")]
    pub capital_per_trade: Decimal,
    #[serde(default = "default_window")]
    pub window: usize,
    /// Shares sent on a SELL. The broker's held quantity is not queried.
    #[serde(default = "default_sell_quantity")]
    pub sell_quantity: Decimal,
    #[serde(default = "default_exchange")]
    pub exchange: String,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default)]
    pub sec_type: SecurityType,
}

fn default_capital_per_trade() -> Decimal {
    Decimal::from(10_000)
}

fn default_window() -> usize {
    200
}

fn default_sell_quantity() -> Decimal {
    Decimal::from(10)
}

fn default_exchange() -> String {
    "SMART".to_string()
}

fn default_currency() -> String {
    "USD".to_string()
}

impl Default for InstrumentDefaults {
    fn default() -> Self {
        Self {
            capital_per_trade: default_capital_per_trade(),
            window: default_window(),
            sell_quantity: default_sell_quantity(),
            exchange: default_exchange(),
            currency: default_currency(),
            sec_type: SecurityType::default(),
        }
    }
}

/// One `[[instruments]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentConfig {
    pub symbol: String,
    #[serde(default)]
    pub capital: Option<Decimal>,
    #[serde(default)]
    pub window: Option<usize>,
    #[serde(default)]
    pub sell_quantity: Option<Decimal>,
    #[serde(default)]
    pub exchange: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    /// Held at start of run.
    #[serde(default)]
    pub owned: bool,
}

impl InstrumentConfig {
    pub fn new(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            capital: None,
            window: None,
            sell_quantity: None,
            exchange: None,
            currency: None,
            owned: false,
        }
    }
}

// ============================================================================
// AppConfig
// ============================================================================

/// Main application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub defaults: InstrumentDefaults,
    #[serde(default)]
    pub instruments: Vec<InstrumentConfig>,
    #[serde(default)]
    pub telemetry: LoggingConfig,
}

impl AppConfig {
    /// Load from a TOML file with environment overrides.
    pub fn from_file(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(AppError::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }

        let config: Self = Config::builder()
            .add_source(File::from(path).format(FileFormat::Toml))
            .add_source(env_source())
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse TOML text (no environment layer).
    pub fn from_toml_str(content: &str) -> AppResult<Self> {
        let config: Self = Config::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Check the catalog and batch settings.
    ///
    /// # Errors
    /// `AppError::Config` for an empty catalog, duplicate symbols, or an
    /// instrument with invalid strategy parameters.
    pub fn validate(&self) -> AppResult<()> {
        if self.instruments.is_empty() {
            return Err(AppError::Config(
                "at least one [[instruments]] entry is required".to_string(),
            ));
        }
        if self.batch.timeout_ms == 0 {
            return Err(AppError::Config("batch.timeout_ms must be > 0".to_string()));
        }

        let mut seen = HashSet::new();
        for instrument in self.catalog()? {
            if !seen.insert(instrument.symbol.clone()) {
                return Err(AppError::Config(format!(
                    "duplicate instrument symbol {}",
                    instrument.symbol
                )));
            }
            instrument
                .validate()
                .map_err(|e| AppError::Config(e.to_string()))?;
        }
        Ok(())
    }

    /// Build the instrument catalog in configuration order.
    pub fn catalog(&self) -> AppResult<Vec<Instrument>> {
        let d = &self.defaults;
        self.instruments
            .iter()
            .map(|entry| {
                let symbol = Symbol::new(&entry.symbol)?;
                let mut instrument = Instrument::stock(
                    symbol,
                    entry.capital.unwrap_or(d.capital_per_trade),
                    entry.window.unwrap_or(d.window),
                )
                .with_sell_quantity(Quantity::new(
                    entry.sell_quantity.unwrap_or(d.sell_quantity),
                ));
                instrument.sec_type = d.sec_type;
                instrument.exchange = entry.exchange.clone().unwrap_or_else(|| d.exchange.clone());
                instrument.currency = entry.currency.clone().unwrap_or_else(|| d.currency.clone());
                Ok(instrument)
            })
            .collect()
    }

    /// Symbols held at start of run.
    pub fn initial_ownership(&self) -> AppResult<Vec<(Symbol, bool)>> {
        self.instruments
            .iter()
            .map(|entry| Ok((Symbol::new(&entry.symbol)?, entry.owned)))
            .collect()
    }
}

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .try_parsing(true)
}
