//! Instrument catalog types.
//!
//! An `Instrument` is immutable after the catalog is loaded: contract
//! metadata for the broker plus the per-instrument strategy parameters.

use crate::{CoreError, Quantity};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ticker symbol (e.g., "AAPL").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    /// Create a symbol, trimming whitespace and upper-casing.
    pub fn new(s: impl AsRef<str>) -> crate::Result<Self> {
        let trimmed = s.as_ref().trim();
        if trimmed.is_empty() {
            return Err(CoreError::InvalidSymbol("empty symbol".to_string()));
        }
        Ok(Self(trimmed.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Symbol {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Broker security type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SecurityType {
    /// Common stock / ETF.
    #[default]
    #[serde(rename = "STK")]
    Stock,
}

impl fmt::Display for SecurityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stock => write!(f, "STK"),
        }
    }
}

/// A tradable instrument with its strategy parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instrument {
    /// Ticker symbol.
    pub symbol: Symbol,
    /// Security type (STK).
    pub sec_type: SecurityType,
    /// Routing exchange (e.g., "SMART").
    pub exchange: String,
    /// Trading currency (e.g., "USD").
    pub currency: String,
    /// Capital allocated to a new long entry.
    pub capital: Decimal,
    /// Moving-average window length in bars.
    pub window: usize,
    /// Shares sent on a SELL intent (the bot does not query held quantity).
    pub sell_quantity: Quantity,
}

impl Instrument {
    /// Create a SMART-routed USD stock.
    pub fn stock(symbol: Symbol, capital: Decimal, window: usize) -> Self {
        Self {
            symbol,
            sec_type: SecurityType::Stock,
            exchange: "SMART".to_string(),
            currency: "USD".to_string(),
            capital,
            window,
            sell_quantity: Quantity::from(10u32),
        }
    }

    /// Override the SELL intent quantity.
    #[must_use]
    pub fn with_sell_quantity(mut self, quantity: Quantity) -> Self {
        self.sell_quantity = quantity;
        self
    }

    /// Check strategy parameters.
    pub fn validate(&self) -> crate::Result<()> {
        if self.window == 0 {
            return Err(CoreError::InvalidConfig(format!(
                "{}: moving-average window must be >= 1",
                self.symbol
            )));
        }
        if self.capital <= Decimal::ZERO {
            return Err(CoreError::InvalidConfig(format!(
                "{}: capital allocation must be positive",
                self.symbol
            )));
        }
        if !self.sell_quantity.is_positive() {
            return Err(CoreError::InvalidConfig(format!(
                "{}: sell quantity must be positive",
                self.symbol
            )));
        }
        Ok(())
    }
}
