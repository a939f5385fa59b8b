//! Sequential order dispatcher.
//!
//! Submission is fire-and-forget per decision: the dispatcher never waits
//! for fills. A refused submission is logged and rolled back, and the
//! remaining decisions still run.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};
use trendbot_core::{OrderAction, OrderId, Quantity, Symbol};
use trendbot_gateway::{GatewayCommands, OrderTicket};
use trendbot_position::{OrderDecision, OwnershipBook};

use crate::error::{ExecutorError, ExecutorResult};
use crate::inflight::{InflightOrder, InflightOrders};

/// An order handed to the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmittedOrder {
    pub order_id: OrderId,
    pub symbol: Symbol,
    pub action: OrderAction,
    pub quantity: Quantity,
}

/// A decision that did not reach the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedOrder {
    /// `None` if no id could be reserved.
    pub order_id: Option<OrderId>,
    pub symbol: Symbol,
    pub action: OrderAction,
    pub reason: String,
}

/// Outcome of one dispatch pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub submitted: Vec<SubmittedOrder>,
    pub failed: Vec<FailedOrder>,
}

impl DispatchReport {
    pub fn submitted_count(&self) -> usize {
        self.submitted.len()
    }

    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }
}

/// Submits decisions through the gateway's command port.
pub struct OrderDispatcher<G: GatewayCommands + ?Sized> {
    gateway: Arc<G>,
    book: Arc<OwnershipBook>,
    inflight: Arc<InflightOrders>,
}

impl<G: GatewayCommands + ?Sized> OrderDispatcher<G> {
    pub fn new(gateway: Arc<G>, book: Arc<OwnershipBook>, inflight: Arc<InflightOrders>) -> Self {
        Self {
            gateway,
            book,
            inflight,
        }
    }

    /// Dispatch every decision in order.
    pub fn dispatch(&self, decisions: &[OrderDecision]) -> DispatchReport {
        let mut report = DispatchReport::default();

        for decision in decisions {
            match self.dispatch_one(decision) {
                Ok(order_id) => report.submitted.push(SubmittedOrder {
                    order_id,
                    symbol: decision.symbol().clone(),
                    action: decision.action,
                    quantity: decision.quantity,
                }),
                Err(e) => {
                    let order_id = match &e {
                        ExecutorError::Submission { order_id, .. }
                        | ExecutorError::DuplicateInflight(order_id) => Some(*order_id),
                        ExecutorError::Reservation(_) => None,
                    };
                    warn!(
                        symbol = %decision.symbol(),
                        action = %decision.action,
                        order_id = ?order_id,
                        error = %e,
                        "Order not submitted, continuing with remaining decisions"
                    );
                    report.failed.push(FailedOrder {
                        order_id,
                        symbol: decision.symbol().clone(),
                        action: decision.action,
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!(
            submitted = report.submitted_count(),
            failed = report.failed_count(),
            "Dispatch complete"
        );
        report
    }

    fn dispatch_one(&self, decision: &OrderDecision) -> ExecutorResult<OrderId> {
        let symbol = decision.symbol();
        let order_id = self
            .gateway
            .reserve_order_id()
            .map_err(ExecutorError::Reservation)?;

        // Flip before submitting so an early execution callback is not
        // overwritten by a later flip.
        let prior_owned = self.book.set(symbol, decision.action.owned_after());
        if let Err(e) = self.inflight.register(
            order_id,
            InflightOrder {
                symbol: symbol.clone(),
                action: decision.action,
                quantity: decision.quantity,
                prior_owned,
            },
        ) {
            self.book.set(symbol, prior_owned);
            return Err(e);
        }

        let ticket = OrderTicket::market(&decision.instrument, decision.action, decision.quantity);
        if let Err(source) = self.gateway.submit_order(order_id, &ticket) {
            self.inflight.remove(order_id);
            self.book.set(symbol, prior_owned);
            return Err(ExecutorError::Submission { order_id, source });
        }

        info!(
            %order_id,
            %symbol,
            action = %decision.action,
            quantity = %decision.quantity,
            "Order submitted"
        );
        Ok(order_id)
    }
}
