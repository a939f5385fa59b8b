//! Batch orchestration.
//!
//! Connection failures are fatal and place no orders. Everything after the
//! handshake is recoverable: a timed-out series resolves FLAT, a refused
//! order is rolled back, and the session is always disconnected before
//! `run` returns.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};
use trendbot_core::{Instrument, RequestId};
use trendbot_executor::{InflightOrders, OrderDispatcher};
use trendbot_feed::{CompletionOutcome, CompletionTracker, DataAggregator};
use trendbot_gateway::{Contract, GatewayCommands, GatewaySession, SeriesRequest};
use trendbot_position::{OwnershipBook, PositionReconciler, SkipReason};
use trendbot_signal::SignalEngine;
use trendbot_telemetry::Metrics;

use crate::config::AppConfig;
use crate::error::AppResult;
use crate::report::{BatchReport, SignalRecord};
use crate::router::BatchEventRouter;

/// Shared state for one batch.
struct BatchContext {
    aggregator: Arc<DataAggregator>,
    tracker: Arc<CompletionTracker>,
    book: Arc<OwnershipBook>,
    inflight: Arc<InflightOrders>,
}

/// Main application.
pub struct Application {
    config: AppConfig,
    /// (request id, instrument) in catalog order; ids are `1..=N`.
    catalog: Vec<(RequestId, Instrument)>,
}

impl Application {
    /// Validate the configuration and build the catalog.
    pub fn new(config: AppConfig) -> AppResult<Self> {
        config.validate()?;
        let catalog = config
            .catalog()?
            .into_iter()
            .enumerate()
            .map(|(i, instrument)| (RequestId::new(i as u32 + 1), instrument))
            .collect();
        Ok(Self { config, catalog })
    }

    pub fn catalog(&self) -> impl Iterator<Item = &Instrument> {
        self.catalog.iter().map(|(_, instrument)| instrument)
    }

    /// Run one batch end to end.
    ///
    /// # Errors
    /// Only connection-level failures (refused socket, no `nextValidId`).
    pub async fn run(&self) -> AppResult<BatchReport> {
        let ctx = BatchContext {
            aggregator: Arc::new(DataAggregator::new()),
            tracker: Arc::new(CompletionTracker::new(
                self.catalog.iter().map(|(req_id, _)| *req_id),
            )),
            book: Arc::new(OwnershipBook::seeded(self.config.initial_ownership()?)),
            inflight: Arc::new(InflightOrders::new()),
        };

        let router = Arc::new(BatchEventRouter::new(
            self.catalog
                .iter()
                .map(|(req_id, instrument)| (*req_id, instrument.symbol.clone()))
                .collect::<HashMap<_, _>>(),
            Arc::clone(&ctx.aggregator),
            Arc::clone(&ctx.tracker),
            Arc::clone(&ctx.book),
            Arc::clone(&ctx.inflight),
        ));

        let session = match GatewaySession::connect(self.config.gateway.session_config(), router)
            .await
        {
            Ok(session) => Arc::new(session),
            Err(e) => {
                error!(error = %e, "Cannot connect to broker gateway, no orders placed");
                return Err(e.into());
            }
        };
        Metrics::gateway_connected();

        let result = self.run_batch(&session, &ctx).await;

        info!("Disconnecting...");
        session.shutdown().await;
        Metrics::gateway_disconnected();

        let report = result?;
        report.log_summary();
        match serde_json::to_string(&report) {
            Ok(json) => debug!(report = %json, "Batch report"),
            Err(e) => warn!(error = %e, "Batch report not serializable"),
        }
        match Metrics::gather_text() {
            Ok(text) => debug!(metrics = %text, "End-of-run metrics"),
            Err(e) => warn!(error = %e, "Metrics unavailable"),
        }
        Ok(report)
    }

    async fn run_batch(
        &self,
        session: &Arc<GatewaySession>,
        ctx: &BatchContext,
    ) -> AppResult<BatchReport> {
        let next_id = session.wait_for_order_id().await.map_err(|e| {
            error!(error = %e, "No order id from broker gateway, no orders placed");
            e
        })?;
        info!(next_order_id = %next_id, "Broker gateway ready");

        self.request_all(session.as_ref()).await;

        let batch = &self.config.batch;
        let outcome = ctx.tracker.wait(Duration::from_millis(batch.timeout_ms)).await;
        let timed_out = match outcome {
            CompletionOutcome::Satisfied => {
                info!("All historical data received");
                Metrics::batch_outcome("satisfied");
                Vec::new()
            }
            CompletionOutcome::TimedOut { missing } => {
                for req_id in &missing {
                    let symbol = self.symbol_for(*req_id);
                    warn!(%req_id, symbol = ?symbol, "Series never completed, resolving FLAT");
                }
                warn!(
                    missing = missing.len(),
                    timeout_ms = batch.timeout_ms,
                    "Timed out waiting for historical data, continuing with available signals"
                );
                Metrics::batch_outcome("timed_out");
                missing
            }
        };

        let signals = self.evaluate_signals(ctx, &timed_out);

        let reconciler = PositionReconciler::new(Arc::clone(&ctx.book));
        let catalog: Vec<&Instrument> = self.catalog().collect();
        let reconcile = reconciler.reconcile(
            catalog
                .iter()
                .copied()
                .zip(signals.iter().map(|record| &record.evaluation)),
        );
        for skipped in &reconcile.skipped {
            Metrics::decision_skipped(match skipped.reason {
                SkipReason::ZeroQuantity { .. } => "zero_quantity",
                SkipReason::NoReferencePrice => "no_reference_price",
            });
        }

        info!(decisions = reconcile.decisions.len(), "Placing trades based on signals");
        let dispatcher = OrderDispatcher::new(
            Arc::clone(session),
            Arc::clone(&ctx.book),
            Arc::clone(&ctx.inflight),
        );
        let dispatch = dispatcher.dispatch(&reconcile.decisions);
        for order in &dispatch.submitted {
            Metrics::order_submitted(order.action.as_str());
        }
        for order in &dispatch.failed {
            Metrics::order_rejected(order.action.as_str(), "submit");
        }

        if batch.settle_ms > 0 {
            info!(settle_ms = batch.settle_ms, "Finished placing orders, waiting before disconnecting");
            tokio::time::sleep(Duration::from_millis(batch.settle_ms)).await;
        }

        Ok(BatchReport {
            timed_out,
            signals,
            reconcile,
            dispatch,
            final_ownership: ctx.book.snapshot(),
        })
    }

    /// Issue one series request per instrument, in catalog order, pausing
    /// `request_pacing_ms` after each.
    ///
    /// A refused request is logged; that instrument will resolve FLAT.
    async fn request_all<G: GatewayCommands + ?Sized>(&self, gateway: &G) {
        let gw = &self.config.gateway;
        let batch = &self.config.batch;
        let pacing = Duration::from_millis(gw.request_pacing_ms);

        for (req_id, instrument) in &self.catalog {
            info!(symbol = %instrument.symbol, %req_id, "Requesting historical data");
            let request = SeriesRequest {
                req_id: *req_id,
                contract: Contract::from(instrument),
                duration: batch.duration.clone(),
                bar_size: batch.bar_size.clone(),
                what_to_show: batch.what_to_show.clone(),
                regular_hours_only: batch.regular_hours_only,
            };
            if let Err(e) = gateway.request_series(&request) {
                error!(symbol = %instrument.symbol, %req_id, error = %e, "Series request failed");
            }

            // Gap after every request, including the last
            if !pacing.is_zero() {
                tokio::time::sleep(pacing).await;
            }
        }
    }

    fn evaluate_signals(&self, ctx: &BatchContext, timed_out: &[RequestId]) -> Vec<SignalRecord> {
        let engine = SignalEngine::new();
        let timed_out: HashSet<RequestId> = timed_out.iter().copied().collect();

        self.catalog
            .iter()
            .map(|(req_id, instrument)| {
                // A series frozen after the deadline is not used
                let series = if timed_out.contains(req_id) {
                    None
                } else {
                    ctx.aggregator.frozen_series(*req_id)
                };
                let evaluation =
                    engine.evaluate(instrument, *req_id, series.as_ref().map(|s| s.bars()));
                Metrics::signal(
                    &evaluation.signal.to_string(),
                    !evaluation.is_insufficient(),
                );
                SignalRecord {
                    symbol: instrument.symbol.clone(),
                    req_id: *req_id,
                    evaluation,
                }
            })
            .collect()
    }

    fn symbol_for(&self, req_id: RequestId) -> Option<&str> {
        self.catalog
            .iter()
            .find(|(id, _)| *id == req_id)
            .map(|(_, instrument)| instrument.symbol.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InstrumentConfig;

    fn config(symbols: &[&str]) -> AppConfig {
        let mut config = AppConfig::default();
        config.instruments = symbols.iter().map(|s| InstrumentConfig::new(s)).collect();
        config
    }

    #[test]
    fn test_request_ids_follow_catalog_order() {
        let app = Application::new(config(&["SPY", "QQQ", "IWM"])).unwrap();
        let ids: Vec<u32> = app.catalog.iter().map(|(id, _)| id.value()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(app.symbol_for(RequestId::new(2)), Some("QQQ"));
        assert_eq!(app.symbol_for(RequestId::new(4)), None);
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(Application::new(AppConfig::default()).is_err());
    }
}
