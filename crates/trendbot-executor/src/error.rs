//! Executor error types.

use thiserror::Error;
use trendbot_core::OrderId;
use trendbot_gateway::GatewayError;

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("Order id reservation failed: {0}")]
    Reservation(#[source] GatewayError),

    #[error("Order {order_id} submission failed: {source}")]
    Submission {
        order_id: OrderId,
        #[source]
        source: GatewayError,
    },

    #[error("Order {0} already in flight")]
    DuplicateInflight(OrderId),
}

pub type ExecutorResult<T> = Result<T, ExecutorError>;
