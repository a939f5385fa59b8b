//! Registry of submitted, not-yet-terminal orders.
//!
//! Written by the dispatcher (control flow) and drained by the gateway's
//! I/O task as status and error callbacks arrive.

use dashmap::DashMap;
use tracing::{debug, warn};
use trendbot_core::{OrderAction, OrderId, Quantity, Symbol};
use trendbot_gateway::{GatewayNotice, OrderStatusUpdate};
use trendbot_position::OwnershipBook;

use crate::error::{ExecutorError, ExecutorResult};

/// An order awaiting a terminal status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InflightOrder {
    pub symbol: Symbol,
    pub action: OrderAction,
    pub quantity: Quantity,
    /// Ownership before the optimistic flip.
    pub prior_owned: bool,
}

/// Order id -> in-flight order.
#[derive(Debug, Default)]
pub struct InflightOrders {
    orders: DashMap<OrderId, InflightOrder>,
}

impl InflightOrders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a submitted order.
    ///
    /// # Errors
    /// `DuplicateInflight` if the id is already tracked.
    pub fn register(&self, order_id: OrderId, order: InflightOrder) -> ExecutorResult<()> {
        match self.orders.entry(order_id) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(ExecutorError::DuplicateInflight(order_id))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(order);
                Ok(())
            }
        }
    }

    /// Stop tracking an order. Returns it if it was tracked.
    pub fn remove(&self, order_id: OrderId) -> Option<InflightOrder> {
        self.orders.remove(&order_id).map(|(_, order)| order)
    }

    /// Apply an `orderStatus` callback; terminal statuses end tracking.
    ///
    /// An order that ends without any fill (cancelled or inactive) has its
    /// optimistic ownership flip rolled back.
    pub fn on_status(
        &self,
        update: &OrderStatusUpdate,
        book: &OwnershipBook,
    ) -> Option<InflightOrder> {
        if !update.is_terminal() {
            return None;
        }
        let order = self.remove(update.order_id)?;

        if update.status != "Filled" && update.filled.is_zero() {
            book.set(&order.symbol, order.prior_owned);
            warn!(
                order_id = %update.order_id,
                symbol = %order.symbol,
                status = %update.status,
                restored_owned = order.prior_owned,
                "Order ended unfilled, ownership rolled back"
            );
        } else {
            debug!(
                order_id = %update.order_id,
                status = %update.status,
                "Order reached terminal status"
            );
        }
        Some(order)
    }

    /// Roll back the optimistic flip for an order the broker refused
    /// after submission (codes 201/202).
    ///
    /// Returns the order if it was in flight. Unknown ids are ignored.
    pub fn on_rejection(
        &self,
        notice: &GatewayNotice,
        book: &OwnershipBook,
    ) -> Option<InflightOrder> {
        let order_id = notice.order_id()?;
        let order = self.remove(order_id)?;

        book.set(&order.symbol, order.prior_owned);
        warn!(
            %order_id,
            symbol = %order.symbol,
            action = %order.action,
            code = notice.code,
            reason = %notice.message,
            restored_owned = order.prior_owned,
            "Order rejected by broker, ownership rolled back"
        );
        Some(order)
    }

    pub fn contains(&self, order_id: OrderId) -> bool {
        self.orders.contains_key(&order_id)
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn order(symbol: &str, action: OrderAction, prior_owned: bool) -> InflightOrder {
        InflightOrder {
            symbol: Symbol::new(symbol).unwrap(),
            action,
            quantity: Quantity::from(10u32),
            prior_owned,
        }
    }

    fn status(order_id: u64, status: &str) -> OrderStatusUpdate {
        OrderStatusUpdate {
            order_id: OrderId::new(order_id),
            status: status.to_string(),
            filled: dec!(0),
            remaining: dec!(10),
        }
    }

    #[test]
    fn test_register_rejects_duplicate() {
        let inflight = InflightOrders::new();
        inflight
            .register(OrderId::new(1), order("A", OrderAction::Buy, false))
            .unwrap();
        assert!(matches!(
            inflight.register(OrderId::new(1), order("A", OrderAction::Buy, false)),
            Err(ExecutorError::DuplicateInflight(_))
        ));
        assert_eq!(inflight.len(), 1);
    }

    #[test]
    fn test_terminal_status_ends_tracking() {
        let book = OwnershipBook::new();
        let inflight = InflightOrders::new();
        let symbol = Symbol::new("A").unwrap();
        let prior = book.set(&symbol, true);
        inflight
            .register(OrderId::new(5), order("A", OrderAction::Buy, prior))
            .unwrap();

        assert!(inflight.on_status(&status(5, "Submitted"), &book).is_none());
        assert!(inflight.contains(OrderId::new(5)));

        let filled = OrderStatusUpdate {
            filled: dec!(10),
            remaining: Decimal::ZERO,
            ..status(5, "Filled")
        };
        assert!(inflight.on_status(&filled, &book).is_some());
        assert!(inflight.is_empty());
        assert!(book.is_owned(&symbol));
    }

    #[test]
    fn test_unfilled_cancel_restores_prior_ownership() {
        let book = OwnershipBook::new();
        let inflight = InflightOrders::new();
        let symbol = Symbol::new("B").unwrap();
        let prior = book.set(&symbol, true);
        inflight
            .register(OrderId::new(8), order("B", OrderAction::Buy, prior))
            .unwrap();

        assert!(inflight.on_status(&status(8, "Cancelled"), &book).is_some());
        assert!(!book.is_owned(&symbol));

        // A rejection notice arriving afterwards finds nothing to undo
        let notice = GatewayNotice {
            req_id: 8,
            code: 201,
            message: "Order rejected".to_string(),
        };
        assert!(inflight.on_rejection(&notice, &book).is_none());
        assert!(!book.is_owned(&symbol));
    }

    #[test]
    fn test_partially_filled_cancel_keeps_ownership() {
        let book = OwnershipBook::new();
        let inflight = InflightOrders::new();
        let symbol = Symbol::new("B").unwrap();
        let prior = book.set(&symbol, true);
        inflight
            .register(OrderId::new(3), order("B", OrderAction::Buy, prior))
            .unwrap();

        let partial = OrderStatusUpdate {
            filled: dec!(4),
            remaining: dec!(6),
            ..status(3, "Cancelled")
        };
        inflight.on_status(&partial, &book);
        assert!(book.is_owned(&symbol));
        assert!(inflight.is_empty());
    }

    #[test]
    fn test_rejection_restores_prior_ownership() {
        let book = OwnershipBook::new();
        let inflight = InflightOrders::new();
        let symbol = Symbol::new("B").unwrap();

        // Optimistic flip to owned for a BUY
        let prior = book.set(&symbol, true);
        inflight
            .register(OrderId::new(9), order("B", OrderAction::Buy, prior))
            .unwrap();

        let notice = GatewayNotice {
            req_id: 9,
            code: 201,
            message: "Order rejected - insufficient margin".to_string(),
        };
        let rolled_back = inflight.on_rejection(&notice, &book);

        assert!(rolled_back.is_some());
        assert!(!book.is_owned(&symbol));
        assert!(inflight.is_empty());
    }

    #[test]
    fn test_rejection_for_unknown_order_ignored() {
        let book = OwnershipBook::new();
        let inflight = InflightOrders::new();
        let notice = GatewayNotice {
            req_id: 42,
            code: 201,
            message: "rejected".to_string(),
        };
        assert!(inflight.on_rejection(&notice, &book).is_none());

        let global = GatewayNotice { req_id: -1, ..notice };
        assert!(inflight.on_rejection(&global, &book).is_none());
    }
}
