//! Historical series aggregation for the trend bot.
//!
//! Accumulates per-request bar series from gateway callbacks and tracks
//! completion of the whole request batch:
//! - [`DataAggregator`]: request id -> append-only series, frozen on completion
//! - [`CompletionTracker`]: counts completions and releases one waiter exactly once

pub mod aggregator;
pub mod completion;

pub use aggregator::{DataAggregator, PriceSeries, SampleOutcome};
pub use completion::{CompletionOutcome, CompletionTracker, CompletionUpdate, TrackerState};
