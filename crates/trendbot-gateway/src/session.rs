//! Broker gateway session.
//!
//! Owns the single WebSocket connection to the broker bridge. `connect`
//! performs the handshake and spawns one background task that both drains
//! the outbound queue and delivers inbound callbacks to a [`GatewayEvents`]
//! implementation. Commands never touch the socket directly; they are queued
//! and written by that task.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use trendbot_core::{parse_bar_date, Bar, OrderId, Price, RequestId, Symbol};

use crate::error::{GatewayError, GatewayResult};
use crate::message::{InboundMessage, OrderBody, OutboundMessage};
use crate::order_id::OrderIdCounter;
use crate::ports::{
    is_informational_code, ExecutionReport, GatewayCommands, GatewayEvents, GatewayNotice,
    OrderStatusUpdate, OrderTicket, SeriesRequest,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Outbound queue depth. One entry per request or order; a batch never
/// comes close to this.
const OUTBOUND_CAPACITY: usize = 256;

/// Upper bound on waiting for the I/O task during shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Bridge URL, e.g. `ws://127.0.0.1:7497`.
    pub url: String,
    /// Client id announced in the `startApi` handshake.
    pub client_id: u32,
    /// Socket connect timeout.
    pub connect_timeout_ms: u64,
    /// How long to wait for `nextValidId` after connecting.
    pub handshake_timeout_ms: u64,
}

impl SessionConfig {
    /// Configuration for a bridge at `ws://{host}:{port}`.
    pub fn new(host: &str, port: u16, client_id: u32) -> Self {
        Self {
            url: format!("ws://{host}:{port}"),
            client_id,
            ..Default::default()
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:7497".to_string(),
            client_id: 1,
            connect_timeout_ms: 5_000,
            handshake_timeout_ms: 10_000,
        }
    }
}

/// Session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connected,
    Disconnected,
}

/// A live broker session.
pub struct GatewaySession {
    config: SessionConfig,
    state: Arc<RwLock<SessionState>>,
    order_ids: Arc<OrderIdCounter>,
    outbound_tx: mpsc::Sender<OutboundMessage>,
    /// Request ids issued this session (never reused).
    issued_requests: Mutex<HashSet<RequestId>>,
    /// Order ids submitted this session (never reused).
    submitted_orders: Mutex<HashSet<OrderId>>,
    shutdown_token: CancellationToken,
    io_task: Mutex<Option<JoinHandle<()>>>,
}

impl GatewaySession {
    /// Connect to the bridge, send `startApi`, and start the I/O task.
    ///
    /// # Errors
    /// `GatewayError::ConnectionFailed` if the socket is refused, the
    /// connect times out, or the handshake cannot be written.
    pub async fn connect(
        config: SessionConfig,
        events: Arc<dyn GatewayEvents>,
    ) -> GatewayResult<Self> {
        info!(url = %config.url, client_id = config.client_id, "Connecting to broker gateway");

        let connect_timeout = Duration::from_millis(config.connect_timeout_ms);
        let (ws_stream, _response) =
            match tokio::time::timeout(connect_timeout, connect_async(config.url.as_str())).await {
                Ok(Ok(pair)) => pair,
                Ok(Err(e)) => {
                    return Err(GatewayError::ConnectionFailed(format!(
                        "{}: {e}",
                        config.url
                    )))
                }
                Err(_) => {
                    return Err(GatewayError::ConnectionFailed(format!(
                        "{}: connect timed out after {}ms",
                        config.url, config.connect_timeout_ms
                    )))
                }
            };

        let (mut write, read) = ws_stream.split();

        let hello = serde_json::to_string(&OutboundMessage::StartApi {
            client_id: config.client_id,
        })?;
        write
            .send(Message::Text(hello))
            .await
            .map_err(|e| GatewayError::ConnectionFailed(format!("handshake failed: {e}")))?;

        info!(url = %config.url, "Broker gateway connected");

        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let state = Arc::new(RwLock::new(SessionState::Connected));
        let order_ids = Arc::new(OrderIdCounter::new());
        let shutdown_token = CancellationToken::new();

        let io_loop = IoLoop {
            write,
            read,
            outbound_rx,
            events,
            order_ids: Arc::clone(&order_ids),
            token: shutdown_token.clone(),
        };
        let loop_state = Arc::clone(&state);
        let io_task = tokio::spawn(async move {
            let result = io_loop.run().await;
            *loop_state.write() = SessionState::Disconnected;
            match result {
                Ok(()) => info!("Gateway I/O loop stopped"),
                Err(e) => error!(error = %e, "Gateway I/O loop terminated"),
            }
        });

        Ok(Self {
            config,
            state,
            order_ids,
            outbound_tx,
            issued_requests: Mutex::new(HashSet::new()),
            submitted_orders: Mutex::new(HashSet::new()),
            shutdown_token,
            io_task: Mutex::new(Some(io_task)),
        })
    }

    /// Wait for the broker's `nextValidId`.
    ///
    /// # Errors
    /// `GatewayError::HandshakeTimeout` if no id arrives in time.
    pub async fn wait_for_order_id(&self) -> GatewayResult<OrderId> {
        let timeout_ms = self.config.handshake_timeout_ms;
        self.order_ids
            .wait_seeded(Duration::from_millis(timeout_ms))
            .await
            .ok_or(GatewayError::HandshakeTimeout(timeout_ms))
    }

    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }

    /// The session's order-id counter.
    pub fn order_ids(&self) -> &Arc<OrderIdCounter> {
        &self.order_ids
    }

    /// Disconnect and wait (bounded) for the I/O task to flush and exit.
    pub async fn shutdown(&self) {
        self.disconnect();
        let handle = self.io_task.lock().take();
        if let Some(handle) = handle {
            if tokio::time::timeout(SHUTDOWN_GRACE, handle).await.is_err() {
                warn!("Gateway I/O task did not stop within grace period");
            }
        }
    }

    fn enqueue(&self, msg: OutboundMessage) -> GatewayResult<()> {
        if !self.is_connected() {
            return Err(GatewayError::NotConnected);
        }
        let kind = msg.kind();
        self.outbound_tx.try_send(msg).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                GatewayError::SendFailed(format!("outbound queue full ({kind})"))
            }
            mpsc::error::TrySendError::Closed(_) => GatewayError::NotConnected,
        })
    }
}

impl GatewayCommands for GatewaySession {
    fn request_series(&self, request: &SeriesRequest) -> GatewayResult<()> {
        if !self.issued_requests.lock().insert(request.req_id) {
            return Err(GatewayError::DuplicateRequestId(request.req_id));
        }

        debug!(req_id = %request.req_id, symbol = %request.contract.symbol, "Requesting historical data");

        self.enqueue(OutboundMessage::ReqHistoricalData {
            req_id: request.req_id.value(),
            contract: request.contract.clone(),
            end_date_time: String::new(),
            duration_str: request.duration.clone(),
            bar_size_setting: request.bar_size.clone(),
            what_to_show: request.what_to_show.clone(),
            use_rth: request.regular_hours_only,
            format_date: 1,
        })
    }

    fn reserve_order_id(&self) -> GatewayResult<OrderId> {
        self.order_ids.reserve()
    }

    fn submit_order(&self, order_id: OrderId, ticket: &OrderTicket) -> GatewayResult<()> {
        match self.order_ids.peek() {
            None => return Err(GatewayError::NotSeeded),
            Some(next) if order_id >= next => {
                return Err(GatewayError::OrderRejected {
                    order_id,
                    reason: "order id was never reserved".to_string(),
                })
            }
            Some(_) => {}
        }

        if !ticket.quantity.is_positive() {
            return Err(GatewayError::OrderRejected {
                order_id,
                reason: format!("non-positive quantity {}", ticket.quantity),
            });
        }

        if !self.submitted_orders.lock().insert(order_id) {
            return Err(GatewayError::DuplicateOrderId(order_id));
        }

        self.enqueue(OutboundMessage::PlaceOrder {
            order_id: order_id.value(),
            contract: ticket.contract.clone(),
            order: OrderBody {
                action: ticket.action,
                total_quantity: ticket.quantity.inner(),
                order_type: ticket.kind,
            },
        })
    }

    fn disconnect(&self) {
        if !self.shutdown_token.is_cancelled() {
            info!("Disconnecting from broker gateway");
            self.shutdown_token.cancel();
        }
        *self.state.write() = SessionState::Disconnected;
    }
}

impl Drop for GatewaySession {
    fn drop(&mut self) {
        self.shutdown_token.cancel();
    }
}

// ============================================================================
// I/O loop
// ============================================================================

struct IoLoop {
    write: WsSink,
    read: WsSource,
    outbound_rx: mpsc::Receiver<OutboundMessage>,
    events: Arc<dyn GatewayEvents>,
    order_ids: Arc<OrderIdCounter>,
    token: CancellationToken,
}

impl IoLoop {
    async fn run(mut self) -> GatewayResult<()> {
        loop {
            tokio::select! {
                biased;

                () = self.token.cancelled() => {
                    // Flush anything queued before the disconnect request
                    while let Ok(msg) = self.outbound_rx.try_recv() {
                        self.send(&msg).await?;
                    }
                    if let Err(e) = self.write.send(Message::Close(None)).await {
                        warn!(?e, "Failed to send Close frame during disconnect");
                    }
                    return Ok(());
                }

                outbound = self.outbound_rx.recv() => {
                    match outbound {
                        Some(msg) => self.send(&msg).await?,
                        None => return Ok(()),
                    }
                }

                inbound = self.read.next() => {
                    match inbound {
                        Some(Ok(Message::Text(text))) => self.handle_text(&text),
                        Some(Ok(Message::Ping(data))) => {
                            self.write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let (code, reason) = frame
                                .map(|f| (f.code.into(), f.reason.to_string()))
                                .unwrap_or((1000, "Normal close".to_string()));
                            warn!(code, %reason, "Broker gateway closed the connection");
                            return Err(GatewayError::ConnectionClosed { code, reason });
                        }
                        Some(Err(e)) => return Err(e.into()),
                        None => {
                            warn!("Broker gateway stream ended");
                            return Ok(());
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    async fn send(&mut self, msg: &OutboundMessage) -> GatewayResult<()> {
        let text = serde_json::to_string(msg)?;
        self.write.send(Message::Text(text)).await?;
        debug!(kind = msg.kind(), "Sent to broker gateway");
        Ok(())
    }

    fn handle_text(&self, text: &str) {
        match serde_json::from_str::<InboundMessage>(text) {
            Ok(msg) => dispatch_inbound(msg, self.events.as_ref(), &self.order_ids),
            Err(e) => warn!(error = %e, raw = %text, "Unparseable gateway message"),
        }
    }
}

/// Route one parsed callback to the event port.
fn dispatch_inbound(msg: InboundMessage, events: &dyn GatewayEvents, order_ids: &OrderIdCounter) {
    match msg {
        InboundMessage::NextValidId { order_id } => {
            let next = order_ids.seed(OrderId::new(order_id));
            info!(next_order_id = %next, "Received nextValidId");
            events.on_next_valid_id(next);
        }
        InboundMessage::HistoricalData {
            req_id,
            date,
            close,
        } => match parse_bar_date(&date) {
            Ok(date) => {
                events.on_historical_sample(RequestId::new(req_id), Bar::new(date, Price::new(close)))
            }
            Err(e) => warn!(req_id, error = %e, "Dropping sample with unparseable date"),
        },
        InboundMessage::HistoricalDataEnd { req_id, start, end } => {
            events.on_historical_end(RequestId::new(req_id), &start, &end);
        }
        InboundMessage::OrderStatus {
            order_id,
            status,
            filled,
            remaining,
        } => {
            events.on_order_status(&OrderStatusUpdate {
                order_id: OrderId::new(order_id),
                status,
                filled,
                remaining,
            });
        }
        InboundMessage::OpenOrder {
            order_id,
            symbol,
            action,
            total_quantity,
        } => match Symbol::new(&symbol) {
            Ok(symbol) => {
                events.on_open_order(OrderId::new(order_id), &symbol, action, total_quantity)
            }
            Err(e) => warn!(order_id, error = %e, "Dropping openOrder with bad symbol"),
        },
        InboundMessage::ExecDetails {
            req_id,
            symbol,
            side,
            shares,
            price,
        } => match Symbol::new(&symbol) {
            Ok(symbol) => events.on_execution(&ExecutionReport {
                req_id,
                symbol,
                side,
                shares,
                price,
            }),
            Err(e) => warn!(req_id, error = %e, "Dropping execDetails with bad symbol"),
        },
        InboundMessage::Error {
            req_id,
            error_code,
            error_string,
        } => {
            if is_informational_code(error_code) {
                debug!(req_id, code = error_code, msg = %error_string, "Gateway notice");
                return;
            }
            events.on_error(&GatewayNotice {
                req_id,
                code: error_code,
                message: error_string,
            });
        }
        InboundMessage::Unknown => debug!("Ignoring unhandled gateway callback"),
    }
}
