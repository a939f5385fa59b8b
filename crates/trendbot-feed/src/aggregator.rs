//! Per-request series aggregation.
//!
//! Each request id owns one append-only series. Callbacks for different
//! request ids land in different DashMap shards and never contend on a
//! shared lock; callbacks for one request id arrive sequentially from the
//! gateway's I/O task.

use dashmap::DashMap;
use tracing::{debug, warn};
use trendbot_core::{Bar, Price, RequestId};

/// A frozen, ordered series of daily bars.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PriceSeries {
    bars: Vec<Bar>,
}

impl PriceSeries {
    pub fn new(bars: Vec<Bar>) -> Self {
        Self { bars }
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    /// Close of the most recent bar.
    pub fn last_close(&self) -> Option<Price> {
        self.bars.last().map(|b| b.close)
    }
}

/// Result of feeding one sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleOutcome {
    /// Sample appended.
    Appended,
    /// Sample dated before the previous one; dropped.
    OutOfOrder,
    /// Series already frozen; dropped.
    Frozen,
}

#[derive(Debug, Default)]
struct SeriesSlot {
    bars: Vec<Bar>,
    frozen: bool,
}

/// Request id -> accumulating series.
#[derive(Debug, Default)]
pub struct DataAggregator {
    series: DashMap<RequestId, SeriesSlot>,
}

impl DataAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a sample, creating the series on first arrival.
    ///
    /// Samples must arrive in non-decreasing date order; a sample dated
    /// before its predecessor is dropped.
    pub fn on_sample(&self, req_id: RequestId, bar: Bar) -> SampleOutcome {
        let mut slot = self.series.entry(req_id).or_default();

        if slot.frozen {
            warn!(%req_id, date = %bar.date, "Sample after completion ignored");
            return SampleOutcome::Frozen;
        }

        if let Some(last) = slot.bars.last() {
            if bar.date < last.date {
                warn!(
                    %req_id,
                    date = %bar.date,
                    previous = %last.date,
                    "Out-of-order sample dropped"
                );
                return SampleOutcome::OutOfOrder;
            }
        }

        slot.bars.push(bar);
        SampleOutcome::Appended
    }

    /// Freeze the series for `req_id`.
    ///
    /// A completion without any samples yields an empty frozen series.
    /// Returns `true` only the first time a given series is frozen.
    pub fn on_complete(&self, req_id: RequestId) -> bool {
        let mut slot = self.series.entry(req_id).or_default();
        if slot.frozen {
            debug!(%req_id, "Duplicate completion for frozen series");
            return false;
        }
        slot.frozen = true;
        debug!(%req_id, samples = slot.bars.len(), "Series frozen");
        true
    }

    /// Snapshot of a frozen series. `None` while still accumulating or unknown.
    pub fn frozen_series(&self, req_id: RequestId) -> Option<PriceSeries> {
        self.series
            .get(&req_id)
            .filter(|slot| slot.frozen)
            .map(|slot| PriceSeries::new(slot.bars.clone()))
    }

    /// Whether the series for `req_id` has been frozen.
    pub fn is_frozen(&self, req_id: RequestId) -> bool {
        self.series.get(&req_id).is_some_and(|slot| slot.frozen)
    }

    /// Number of samples received so far for `req_id`.
    pub fn sample_count(&self, req_id: RequestId) -> usize {
        self.series.get(&req_id).map_or(0, |slot| slot.bars.len())
    }
}
