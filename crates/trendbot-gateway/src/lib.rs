//! Broker gateway session for the trend bot.
//!
//! Owns the single connection to the broker bridge and splits the broker
//! client's two roles into two ports:
//! - [`GatewayCommands`]: outbound requests (series requests, order submission)
//! - [`GatewayEvents`]: inbound callbacks delivered from the background I/O task
//!
//! The session also owns the [`OrderIdCounter`], seeded by `nextValidId`.

pub mod error;
pub mod message;
pub mod order_id;
pub mod ports;
pub mod session;

pub use error::{GatewayError, GatewayResult};
pub use message::{Contract, InboundMessage, OutboundMessage};
pub use order_id::OrderIdCounter;
pub use ports::{
    is_informational_code, is_order_rejection_code, ExecutionReport, GatewayCommands,
    GatewayEvents, GatewayNotice, OrderStatusUpdate, OrderTicket, SeriesRequest,
};
pub use session::{GatewaySession, SessionConfig, SessionState};

use std::sync::Once;

static INIT_CRYPTO: Once = Once::new();

/// Initialize the TLS crypto provider.
/// Must be called before connecting to a `wss://` bridge.
pub fn init_crypto() {
    INIT_CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
