//! Command-issuing and event-consuming ports of the gateway.
//!
//! [`GatewayCommands`] is what the control flow calls; [`GatewayEvents`] is
//! what the session's background I/O task calls back into. The two are
//! deliberately separate traits so a component can implement one without
//! the other.

use rust_decimal::Decimal;
use trendbot_core::{
    Bar, ExecutionSide, Instrument, OrderAction, OrderId, OrderKind, Quantity, RequestId, Symbol,
};

use crate::error::GatewayResult;
use crate::message::Contract;

// ============================================================================
// Error code classification
// ============================================================================

/// Connectivity notices (farm connection OK/broken, etc.).
///
/// These are status chatter, not failures, and are kept out of error logs.
pub fn is_informational_code(code: i32) -> bool {
    (2100..=2110).contains(&code) || code == 2158
}

/// Codes that terminate an order without a fill (201 rejected, 202 cancelled).
pub fn is_order_rejection_code(code: i32) -> bool {
    matches!(code, 201 | 202)
}

// ============================================================================
// Command payloads
// ============================================================================

/// One historical-series request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesRequest {
    pub req_id: RequestId,
    pub contract: Contract,
    /// Lookback, e.g. "1 Y".
    pub duration: String,
    /// Bar size, e.g. "1 day".
    pub bar_size: String,
    /// Price kind, e.g. "ADJUSTED_LAST".
    pub what_to_show: String,
    pub regular_hours_only: bool,
}

/// One market order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderTicket {
    pub symbol: Symbol,
    pub contract: Contract,
    pub action: OrderAction,
    pub quantity: Quantity,
    pub kind: OrderKind,
}

impl OrderTicket {
    /// Market order for `instrument`.
    pub fn market(instrument: &Instrument, action: OrderAction, quantity: Quantity) -> Self {
        Self {
            symbol: instrument.symbol.clone(),
            contract: Contract::from(instrument),
            action,
            quantity,
            kind: OrderKind::Market,
        }
    }
}

// ============================================================================
// Event payloads
// ============================================================================

/// `orderStatus` callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderStatusUpdate {
    pub order_id: OrderId,
    pub status: String,
    pub filled: Decimal,
    pub remaining: Decimal,
}

impl OrderStatusUpdate {
    /// Whether the order will produce no further status changes.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status.as_str(),
            "Filled" | "Cancelled" | "ApiCancelled" | "Inactive"
        )
    }
}

/// `execDetails` callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionReport {
    pub req_id: i64,
    pub symbol: Symbol,
    pub side: ExecutionSide,
    pub shares: Decimal,
    pub price: Decimal,
}

/// `error` callback that is not an informational notice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayNotice {
    /// Request or order id the notice refers to; -1 for session-wide notices.
    pub req_id: i64,
    pub code: i32,
    pub message: String,
}

impl GatewayNotice {
    /// The order id this notice refers to, if it names one.
    pub fn order_id(&self) -> Option<OrderId> {
        u64::try_from(self.req_id).ok().map(OrderId::new)
    }
}

// ============================================================================
// Ports
// ============================================================================

/// Outbound side of the broker session.
///
/// All methods are non-blocking: they enqueue and return. Broker responses
/// arrive later through [`GatewayEvents`].
pub trait GatewayCommands: Send + Sync {
    /// Issue a historical-series request.
    ///
    /// # Errors
    /// Fails if the request id was already used or the session is down.
    fn request_series(&self, request: &SeriesRequest) -> GatewayResult<()>;

    /// Reserve the next order id from the session counter.
    fn reserve_order_id(&self) -> GatewayResult<OrderId>;

    /// Submit an order under a previously reserved id.
    ///
    /// # Errors
    /// Fails if the order id was already submitted or the gateway refused it.
    fn submit_order(&self, order_id: OrderId, ticket: &OrderTicket) -> GatewayResult<()>;

    /// Release the connection. Idempotent.
    fn disconnect(&self);
}

/// Inbound side of the broker session.
///
/// Called from the session's I/O task, one callback at a time.
pub trait GatewayEvents: Send + Sync {
    fn on_next_valid_id(&self, order_id: OrderId);

    fn on_historical_sample(&self, req_id: RequestId, bar: Bar);

    fn on_historical_end(&self, req_id: RequestId, start: &str, end: &str);

    fn on_order_status(&self, update: &OrderStatusUpdate);

    fn on_open_order(
        &self,
        _order_id: OrderId,
        _symbol: &Symbol,
        _action: OrderAction,
        _quantity: Decimal,
    ) {
    }

    fn on_execution(&self, report: &ExecutionReport);

    fn on_error(&self, notice: &GatewayNotice);
}
