//! Inbound callback routing for one batch.
//!
//! Runs on the gateway's I/O task. Series callbacks feed the aggregator and
//! the completion tracker; order callbacks feed the in-flight registry and
//! the ownership book.

use std::collections::HashMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{debug, error, info, warn};
use trendbot_core::{Bar, OrderAction, OrderId, RequestId, Symbol};
use trendbot_executor::InflightOrders;
use trendbot_feed::{CompletionTracker, CompletionUpdate, DataAggregator, SampleOutcome};
use trendbot_gateway::{
    is_order_rejection_code, ExecutionReport, GatewayEvents, GatewayNotice, OrderStatusUpdate,
};
use trendbot_position::OwnershipBook;
use trendbot_telemetry::Metrics;

/// [`GatewayEvents`] implementation for a single batch.
pub struct BatchEventRouter {
    /// Request id -> symbol, fixed for the batch.
    requests: HashMap<RequestId, Symbol>,
    aggregator: Arc<DataAggregator>,
    tracker: Arc<CompletionTracker>,
    book: Arc<OwnershipBook>,
    inflight: Arc<InflightOrders>,
}

impl BatchEventRouter {
    pub fn new(
        requests: HashMap<RequestId, Symbol>,
        aggregator: Arc<DataAggregator>,
        tracker: Arc<CompletionTracker>,
        book: Arc<OwnershipBook>,
        inflight: Arc<InflightOrders>,
    ) -> Self {
        Self {
            requests,
            aggregator,
            tracker,
            book,
            inflight,
        }
    }

    fn symbol_for(&self, req_id: RequestId) -> Option<&Symbol> {
        self.requests.get(&req_id)
    }
}

impl GatewayEvents for BatchEventRouter {
    fn on_next_valid_id(&self, order_id: OrderId) {
        debug!(%order_id, "Order id counter ready");
    }

    fn on_historical_sample(&self, req_id: RequestId, bar: Bar) {
        let Some(symbol) = self.symbol_for(req_id) else {
            warn!(%req_id, "Sample for unknown request id dropped");
            return;
        };
        if self.aggregator.on_sample(req_id, bar) == SampleOutcome::Appended {
            Metrics::series_sample(symbol.as_str());
        }
    }

    fn on_historical_end(&self, req_id: RequestId, start: &str, end: &str) {
        let Some(symbol) = self.symbol_for(req_id) else {
            warn!(%req_id, "Completion for unknown request id dropped");
            return;
        };
        if !self.aggregator.on_complete(req_id) {
            return;
        }

        let samples = self.aggregator.sample_count(req_id);
        match self.tracker.mark_complete(req_id) {
            CompletionUpdate::Progress { remaining } => {
                info!(%symbol, %req_id, samples, start, end, remaining, "Historical data received");
            }
            CompletionUpdate::Released => {
                info!(%symbol, %req_id, samples, start, end, "Historical data received, batch complete");
            }
            CompletionUpdate::Late => {
                warn!(%symbol, %req_id, samples, "Historical data arrived after the batch timed out");
            }
            CompletionUpdate::Duplicate | CompletionUpdate::Unexpected => {}
        }
        Metrics::series_completed(symbol.as_str());
    }

    fn on_order_status(&self, update: &OrderStatusUpdate) {
        info!(
            order_id = %update.order_id,
            status = %update.status,
            filled = %update.filled,
            remaining = %update.remaining,
            "Order status"
        );
        self.inflight.on_status(update, &self.book);
    }

    fn on_open_order(
        &self,
        order_id: OrderId,
        symbol: &Symbol,
        action: OrderAction,
        quantity: Decimal,
    ) {
        debug!(%order_id, %symbol, %action, %quantity, "Open order");
    }

    fn on_execution(&self, report: &ExecutionReport) {
        info!(
            req_id = report.req_id,
            symbol = %report.symbol,
            side = %report.side,
            shares = %report.shares,
            price = %report.price,
            "Execution"
        );
        self.book.apply_execution(&report.symbol, report.side);
        Metrics::execution(&report.side.to_string());
    }

    fn on_error(&self, notice: &GatewayNotice) {
        Metrics::gateway_notice(notice.code);

        if is_order_rejection_code(notice.code) {
            if let Some(order) = self.inflight.on_rejection(notice, &self.book) {
                Metrics::order_rejected(order.action.as_str(), "broker");
                return;
            }
        }

        let symbol = u32::try_from(notice.req_id)
            .ok()
            .and_then(|id| self.symbol_for(RequestId::new(id)));
        match symbol {
            Some(symbol) => error!(
                %symbol,
                req_id = notice.req_id,
                code = notice.code,
                msg = %notice.message,
                "Gateway error for series request"
            ),
            None => error!(
                req_id = notice.req_id,
                code = notice.code,
                msg = %notice.message,
                "Gateway error"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trendbot_core::{parse_bar_date, ExecutionSide, Price, Quantity};
    use trendbot_executor::InflightOrder;
    use trendbot_feed::TrackerState;

    fn bar(date: &str, close: u32) -> Bar {
        Bar::new(parse_bar_date(date).unwrap(), Price::new(close.into()))
    }

    struct Fixture {
        router: BatchEventRouter,
        aggregator: Arc<DataAggregator>,
        tracker: Arc<CompletionTracker>,
        book: Arc<OwnershipBook>,
        inflight: Arc<InflightOrders>,
    }

    fn fixture(symbols: &[&str]) -> Fixture {
        let requests: HashMap<RequestId, Symbol> = symbols
            .iter()
            .enumerate()
            .map(|(i, s)| (RequestId::new(i as u32 + 1), Symbol::new(s).unwrap()))
            .collect();
        let aggregator = Arc::new(DataAggregator::new());
        let tracker = Arc::new(CompletionTracker::new(requests.keys().copied()));
        let book = Arc::new(OwnershipBook::new());
        let inflight = Arc::new(InflightOrders::new());
        let router = BatchEventRouter::new(
            requests,
            Arc::clone(&aggregator),
            Arc::clone(&tracker),
            Arc::clone(&book),
            Arc::clone(&inflight),
        );
        Fixture {
            router,
            aggregator,
            tracker,
            book,
            inflight,
        }
    }

    #[test]
    fn test_series_flow_releases_tracker() {
        let f = fixture(&["A", "B"]);
        f.router.on_historical_sample(RequestId::new(1), bar("20240102", 10));
        f.router.on_historical_sample(RequestId::new(1), bar("20240103", 11));
        f.router.on_historical_end(RequestId::new(1), "20240102", "20240103");
        assert_eq!(f.tracker.state(), TrackerState::Waiting);

        f.router.on_historical_end(RequestId::new(2), "", "");
        assert_eq!(f.tracker.state(), TrackerState::Satisfied);
        assert_eq!(f.aggregator.frozen_series(RequestId::new(1)).unwrap().len(), 2);
        assert!(f.aggregator.frozen_series(RequestId::new(2)).unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_end_does_not_double_count() {
        let f = fixture(&["A", "B"]);
        f.router.on_historical_end(RequestId::new(1), "", "");
        f.router.on_historical_end(RequestId::new(1), "", "");
        assert_eq!(f.tracker.state(), TrackerState::Waiting);
        assert_eq!(f.tracker.missing(), vec![RequestId::new(2)]);
    }

    #[test]
    fn test_unknown_request_ignored() {
        let f = fixture(&["A"]);
        f.router.on_historical_sample(RequestId::new(9), bar("20240102", 10));
        f.router.on_historical_end(RequestId::new(9), "", "");
        assert_eq!(f.aggregator.sample_count(RequestId::new(9)), 0);
        assert_eq!(f.tracker.state(), TrackerState::Waiting);
    }

    #[test]
    fn test_execution_corrects_ownership() {
        let f = fixture(&["A"]);
        let symbol = Symbol::new("A").unwrap();
        f.router.on_execution(&ExecutionReport {
            req_id: -1,
            symbol: symbol.clone(),
            side: ExecutionSide::Bought,
            shares: 5.into(),
            price: 100.into(),
        });
        assert!(f.book.is_owned(&symbol));
    }

    #[test]
    fn test_rejection_notice_rolls_back() {
        let f = fixture(&["A"]);
        let symbol = Symbol::new("A").unwrap();
        let prior = f.book.set(&symbol, true);
        f.inflight
            .register(
                OrderId::new(31),
                InflightOrder {
                    symbol: symbol.clone(),
                    action: OrderAction::Buy,
                    quantity: Quantity::from(3u32),
                    prior_owned: prior,
                },
            )
            .unwrap();

        f.router.on_error(&GatewayNotice {
            req_id: 31,
            code: 201,
            message: "Order rejected".to_string(),
        });
        assert!(!f.book.is_owned(&symbol));
        assert!(f.inflight.is_empty());
    }

    #[test]
    fn test_unfilled_cancel_status_rolls_back() {
        let f = fixture(&["A"]);
        let symbol = Symbol::new("A").unwrap();
        let prior = f.book.set(&symbol, true);
        f.inflight
            .register(
                OrderId::new(12),
                InflightOrder {
                    symbol: symbol.clone(),
                    action: OrderAction::Buy,
                    quantity: Quantity::from(3u32),
                    prior_owned: prior,
                },
            )
            .unwrap();

        f.router.on_order_status(&OrderStatusUpdate {
            order_id: OrderId::new(12),
            status: "Cancelled".to_string(),
            filled: Decimal::ZERO,
            remaining: Decimal::from(3),
        });
        assert!(!f.book.is_owned(&symbol));
        assert!(f.inflight.is_empty());
    }

    #[test]
    fn test_non_rejection_error_keeps_ownership() {
        let f = fixture(&["A"]);
        let symbol = Symbol::new("A").unwrap();
        f.book.set(&symbol, true);
        f.router.on_error(&GatewayNotice {
            req_id: 1,
            code: 162,
            message: "Historical market data service error".to_string(),
        });
        assert!(f.book.is_owned(&symbol));
    }
}
