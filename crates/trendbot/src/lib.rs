//! Moving-average trend bot.
//!
//! Runs one batch per invocation:
//! - Connect to the broker gateway and wait for `nextValidId`
//! - Request one daily series per catalog instrument
//! - Wait (bounded) for every series to complete
//! - Derive signals, reconcile against ownership, dispatch orders
//! - Linger for execution callbacks, then disconnect

pub mod app;
pub mod config;
pub mod error;
pub mod report;
pub mod router;

pub use app::Application;
pub use config::AppConfig;
pub use error::{AppError, AppResult};
pub use report::{BatchReport, SignalRecord};
pub use router::BatchEventRouter;
