//! Broker bridge message types.
//!
//! One JSON object per WebSocket text frame, discriminated by `type`.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use trendbot_core::{ExecutionSide, Instrument, OrderAction, OrderKind, SecurityType};

// ============================================================================
// Contract
// ============================================================================

/// Contract description sent with every series request and order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contract {
    pub symbol: String,
    pub sec_type: SecurityType,
    pub exchange: String,
    pub currency: String,
}

impl From<&Instrument> for Contract {
    fn from(instrument: &Instrument) -> Self {
        Self {
            symbol: instrument.symbol.to_string(),
            sec_type: instrument.sec_type,
            exchange: instrument.exchange.clone(),
            currency: instrument.currency.clone(),
        }
    }
}

/// Order body of a `placeOrder` message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderBody {
    pub action: OrderAction,
    pub total_quantity: Decimal,
    pub order_type: OrderKind,
}

// ============================================================================
// Outbound (client -> bridge)
// ============================================================================

/// Messages sent to the broker bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum OutboundMessage {
    /// Session handshake, sent once after the socket opens.
    StartApi { client_id: u32 },
    /// Historical bar request.
    ReqHistoricalData {
        req_id: u32,
        contract: Contract,
        /// Empty string = "now".
        end_date_time: String,
        duration_str: String,
        bar_size_setting: String,
        what_to_show: String,
        #[serde(rename = "useRTH")]
        use_rth: bool,
        format_date: u8,
    },
    /// Order submission.
    PlaceOrder {
        order_id: u64,
        contract: Contract,
        order: OrderBody,
    },
}

impl OutboundMessage {
    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::StartApi { .. } => "startApi",
            Self::ReqHistoricalData { .. } => "reqHistoricalData",
            Self::PlaceOrder { .. } => "placeOrder",
        }
    }
}

// ============================================================================
// Inbound (bridge -> client)
// ============================================================================

/// Callbacks delivered by the broker bridge.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum InboundMessage {
    NextValidId {
        order_id: u64,
    },
    HistoricalData {
        req_id: u32,
        date: String,
        close: Decimal,
    },
    HistoricalDataEnd {
        req_id: u32,
        #[serde(default)]
        start: String,
        #[serde(default)]
        end: String,
    },
    OrderStatus {
        order_id: u64,
        status: String,
        #[serde(default)]
        filled: Decimal,
        #[serde(default)]
        remaining: Decimal,
    },
    OpenOrder {
        order_id: u64,
        symbol: String,
        action: OrderAction,
        total_quantity: Decimal,
    },
    ExecDetails {
        req_id: i64,
        symbol: String,
        side: ExecutionSide,
        shares: Decimal,
        price: Decimal,
    },
    Error {
        req_id: i64,
        error_code: i32,
        error_string: String,
    },
    /// Any other callback the bridge forwards; ignored.
    #[serde(other)]
    Unknown,
}
