//! Order dispatch for the trend bot.
//!
//! # Key Components
//!
//! - [`OrderDispatcher`]: submits reconciled decisions one by one, flipping
//!   ownership optimistically and rolling back on refusal
//! - [`InflightOrders`]: orders submitted but not yet terminal, so an
//!   asynchronous broker rejection can still roll ownership back
//!
//! # Per-decision sequence
//!
//! 1. reserve order id (failure -> decision failed, nothing flipped)
//! 2. flip ownership, register in-flight
//! 3. submit (failure -> restore ownership, unregister, continue)

pub mod dispatcher;
pub mod error;
pub mod inflight;

pub use dispatcher::{DispatchReport, FailedOrder, OrderDispatcher, SubmittedOrder};
pub use error::{ExecutorError, ExecutorResult};
pub use inflight::{InflightOrder, InflightOrders};
