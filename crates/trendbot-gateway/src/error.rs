//! Gateway error types.

use thiserror::Error;
use trendbot_core::{OrderId, RequestId};

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Timed out after {0}ms waiting for nextValidId")]
    HandshakeTimeout(u64),

    #[error("Connection closed: code={code}, reason={reason}")]
    ConnectionClosed { code: u16, reason: String },

    #[error("Not connected")]
    NotConnected,

    #[error("Order id counter not seeded by the broker yet")]
    NotSeeded,

    #[error("Request id {0} already used in this session")]
    DuplicateRequestId(RequestId),

    #[error("Order id {0} already submitted in this session")]
    DuplicateOrderId(OrderId),

    #[error("Order {order_id} rejected: {reason}")]
    OrderRejected { order_id: OrderId, reason: String },

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Tungstenite error: {0}")]
    Tungstenite(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type GatewayResult<T> = Result<T, GatewayError>;
