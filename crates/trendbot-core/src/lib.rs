//! Core domain types for the moving-average trend bot.
//!
//! This crate provides fundamental types used throughout the trading system:
//! - `Instrument`: Catalog entry (symbol, contract metadata, allocation, window)
//! - `Price`, `Quantity`: Precision-safe numeric types
//! - `RequestId`, `OrderId`: Broker-side correlation identifiers
//! - `Bar`, `Signal`, `OrderAction`: Series and trading enums

pub mod decimal;
pub mod error;
pub mod instrument;
pub mod order;
pub mod series;

pub use decimal::{Price, Quantity};
pub use error::{CoreError, Result};
pub use instrument::{Instrument, SecurityType, Symbol};
pub use order::{ExecutionSide, OrderAction, OrderId, OrderKind, RequestId};
pub use series::{parse_bar_date, Bar, Signal};
