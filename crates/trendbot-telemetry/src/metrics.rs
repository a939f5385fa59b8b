//! Prometheus metrics for the trend bot.
//!
//! Covers one batch end to end:
//! - Gateway connection state and broker notices
//! - Series samples and completions
//! - Batch outcome and signals
//! - Order decisions, submissions, rejections and executions
//!
//! There is no HTTP exporter; [`Metrics::gather_text`] renders the registry
//! for the end-of-run log.
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. A registration failure
//! means duplicate metric names, a programming error that should crash at
//! first use rather than silently drop metrics.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge, CounterVec, Encoder, Gauge, TextEncoder,
};

use crate::error::{TelemetryError, TelemetryResult};

/// Gateway connection state (1 = connected, 0 = disconnected).
pub static GATEWAY_CONNECTED: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(
        "trendbot_gateway_connected",
        "Gateway connection state (1=connected)"
    )
    .unwrap()
});

/// Non-informational broker notices.
pub static GATEWAY_NOTICES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "trendbot_gateway_notices_total",
        "Broker error callbacks that were not informational",
        &["code"]
    )
    .unwrap()
});

/// Historical samples received.
pub static SERIES_SAMPLES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "trendbot_series_samples_total",
        "Historical samples received",
        &["symbol"]
    )
    .unwrap()
});

/// Series completion callbacks accepted.
pub static SERIES_COMPLETED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "trendbot_series_completed_total",
        "Historical series completed",
        &["symbol"]
    )
    .unwrap()
});

/// Batch wait outcome.
pub static BATCH_OUTCOME_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "trendbot_batch_outcome_total",
        "Completion wait outcome per batch",
        &["outcome"]
    )
    .unwrap()
});

/// Signals derived.
pub static SIGNALS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "trendbot_signals_total",
        "Signals derived per instrument",
        &["signal", "sufficient"]
    )
    .unwrap()
});

/// Decisions suppressed by the reconciler.
pub static DECISIONS_SKIPPED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "trendbot_decisions_skipped_total",
        "Order decisions suppressed before dispatch",
        &["reason"]
    )
    .unwrap()
});

/// Orders handed to the gateway.
pub static ORDERS_SUBMITTED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "trendbot_orders_submitted_total",
        "Orders submitted",
        &["action"]
    )
    .unwrap()
});

/// Orders refused, at submission or asynchronously by the broker.
pub static ORDERS_REJECTED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "trendbot_orders_rejected_total",
        "Orders refused",
        &["action", "stage"]
    )
    .unwrap()
});

/// Execution reports received.
pub static EXECUTIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "trendbot_executions_total",
        "Execution reports received",
        &["side"]
    )
    .unwrap()
});

/// Metrics helper.
pub struct Metrics;

impl Metrics {
    pub fn gateway_connected() {
        GATEWAY_CONNECTED.set(1.0);
    }

    pub fn gateway_disconnected() {
        GATEWAY_CONNECTED.set(0.0);
    }

    pub fn gateway_notice(code: i32) {
        GATEWAY_NOTICES_TOTAL
            .with_label_values(&[&code.to_string()])
            .inc();
    }

    pub fn series_sample(symbol: &str) {
        SERIES_SAMPLES_TOTAL.with_label_values(&[symbol]).inc();
    }

    pub fn series_completed(symbol: &str) {
        SERIES_COMPLETED_TOTAL.with_label_values(&[symbol]).inc();
    }

    /// `outcome`: "satisfied" or "timed_out".
    pub fn batch_outcome(outcome: &str) {
        BATCH_OUTCOME_TOTAL.with_label_values(&[outcome]).inc();
    }

    pub fn signal(signal: &str, sufficient: bool) {
        SIGNALS_TOTAL
            .with_label_values(&[signal, if sufficient { "true" } else { "false" }])
            .inc();
    }

    pub fn decision_skipped(reason: &str) {
        DECISIONS_SKIPPED_TOTAL.with_label_values(&[reason]).inc();
    }

    pub fn order_submitted(action: &str) {
        ORDERS_SUBMITTED_TOTAL.with_label_values(&[action]).inc();
    }

    /// `stage`: "submit" (refused synchronously) or "broker" (code 201/202).
    pub fn order_rejected(action: &str, stage: &str) {
        ORDERS_REJECTED_TOTAL
            .with_label_values(&[action, stage])
            .inc();
    }

    pub fn execution(side: &str) {
        EXECUTIONS_TOTAL.with_label_values(&[side]).inc();
    }

    /// Render every registered metric in the Prometheus text format.
    pub fn gather_text() -> TelemetryResult<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&prometheus::gather(), &mut buffer)
            .map_err(|e| TelemetryError::Metrics(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| TelemetryError::Metrics(e.to_string()))
    }
}
