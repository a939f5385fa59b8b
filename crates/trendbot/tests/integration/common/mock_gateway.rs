//! Scripted broker bridge for integration tests.
//!
//! Speaks the JSON-over-WebSocket bridge protocol:
//! - Answers `startApi` with `nextValidId` (unless scripted not to)
//! - Answers `reqHistoricalData` with scripted bars and, optionally, the end marker
//! - Answers `placeOrder` with `orderStatus`, or with error 201 for rejected symbols
//! - Records every message it receives

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::{accept_async, tungstenite::Message};

/// Bars served for one symbol.
#[derive(Debug, Clone, Default)]
pub struct ScriptedSeries {
    /// (yyyymmdd, close)
    pub bars: Vec<(String, String)>,
    /// Send `historicalDataEnd` after the bars.
    pub complete: bool,
}

impl ScriptedSeries {
    /// A completed series of consecutive January dates.
    pub fn closes(closes: &[&str]) -> Self {
        let bars = closes
            .iter()
            .enumerate()
            .map(|(i, close)| (format!("202401{:02}", i + 2), close.to_string()))
            .collect();
        Self {
            bars,
            complete: true,
        }
    }

    /// Same bars, never completed.
    pub fn incomplete(mut self) -> Self {
        self.complete = false;
        self
    }
}

/// What the bridge does.
#[derive(Debug, Clone)]
pub struct GatewayScript {
    /// `None`: never send `nextValidId`.
    pub next_valid_id: Option<u64>,
    pub series: HashMap<String, ScriptedSeries>,
    /// Orders for these symbols get error 201.
    pub reject_symbols: HashSet<String>,
    /// Accepted orders also get a fill and an execution report.
    pub fill_orders: bool,
}

impl Default for GatewayScript {
    fn default() -> Self {
        Self {
            next_valid_id: Some(100),
            series: HashMap::new(),
            reject_symbols: HashSet::new(),
            fill_orders: false,
        }
    }
}

impl GatewayScript {
    pub fn with_series(mut self, symbol: &str, series: ScriptedSeries) -> Self {
        self.series.insert(symbol.to_string(), series);
        self
    }

    pub fn rejecting(mut self, symbol: &str) -> Self {
        self.reject_symbols.insert(symbol.to_string());
        self
    }
}

/// A mock broker bridge.
pub struct MockGateway {
    addr: SocketAddr,
    shutdown_tx: mpsc::Sender<()>,
    messages: Arc<Mutex<Vec<Value>>>,
}

impl MockGateway {
    /// Start on an available port.
    pub async fn start(script: GatewayScript) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let messages: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let messages_clone = messages.clone();
        let script = Arc::new(script);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Ok((stream, _)) = listener.accept() => {
                        tokio::spawn(handle_connection(stream, script.clone(), messages_clone.clone()));
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }
        });

        Self {
            addr,
            shutdown_tx,
            messages,
        }
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// All received messages, in arrival order.
    pub async fn received(&self) -> Vec<Value> {
        self.messages.lock().await.clone()
    }

    /// Received messages of one `type`.
    pub async fn received_of(&self, kind: &str) -> Vec<Value> {
        self.received()
            .await
            .into_iter()
            .filter(|m| m["type"] == kind)
            .collect()
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

async fn handle_connection(
    stream: TcpStream,
    script: Arc<GatewayScript>,
    messages: Arc<Mutex<Vec<Value>>>,
) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            eprintln!("WebSocket handshake failed: {}", e);
            return;
        }
    };

    let (mut write, mut read) = ws_stream.split();

    while let Some(msg) = read.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                let Ok(parsed) = serde_json::from_str::<Value>(&text) else {
                    continue;
                };
                messages.lock().await.push(parsed.clone());

                for reply in respond(&script, &parsed) {
                    if write.send(Message::Text(reply.to_string())).await.is_err() {
                        return;
                    }
                }
            }
            Ok(Message::Ping(data)) => {
                let _ = write.send(Message::Pong(data)).await;
            }
            Ok(Message::Close(_)) => break,
            Err(_) => break,
            _ => {}
        }
    }
}

fn respond(script: &GatewayScript, msg: &Value) -> Vec<Value> {
    match msg["type"].as_str() {
        Some("startApi") => {
            let mut replies = vec![json!({
                "type": "error",
                "reqId": -1,
                "errorCode": 2104,
                "errorString": "Market data farm connection is OK:usfarm"
            })];
            if let Some(id) = script.next_valid_id {
                replies.push(json!({ "type": "nextValidId", "orderId": id }));
            }
            replies
        }
        Some("reqHistoricalData") => {
            let req_id = msg["reqId"].clone();
            let symbol = msg["contract"]["symbol"].as_str().unwrap_or_default();
            let Some(series) = script.series.get(symbol) else {
                return vec![json!({
                    "type": "error",
                    "reqId": req_id,
                    "errorCode": 162,
                    "errorString": "Historical Market Data Service error message:No data"
                })];
            };

            let mut replies: Vec<Value> = series
                .bars
                .iter()
                .map(|(date, close)| {
                    json!({
                        "type": "historicalData",
                        "reqId": req_id,
                        "date": date,
                        "close": close
                    })
                })
                .collect();
            if series.complete {
                let start = series.bars.first().map(|b| b.0.clone()).unwrap_or_default();
                let end = series.bars.last().map(|b| b.0.clone()).unwrap_or_default();
                replies.push(json!({
                    "type": "historicalDataEnd",
                    "reqId": req_id,
                    "start": start,
                    "end": end
                }));
            }
            replies
        }
        Some("placeOrder") => {
            let order_id = msg["orderId"].clone();
            let symbol = msg["contract"]["symbol"].as_str().unwrap_or_default();
            if script.reject_symbols.contains(symbol) {
                return vec![json!({
                    "type": "error",
                    "reqId": order_id,
                    "errorCode": 201,
                    "errorString": "Order rejected - reason:insufficient buying power"
                })];
            }

            let quantity = msg["order"]["totalQuantity"].clone();
            let mut replies = vec![json!({
                "type": "orderStatus",
                "orderId": order_id,
                "status": "Submitted",
                "filled": "0",
                "remaining": quantity
            })];
            if script.fill_orders {
                let side = if msg["order"]["action"] == "BUY" { "BOT" } else { "SLD" };
                replies.push(json!({
                    "type": "orderStatus",
                    "orderId": order_id,
                    "status": "Filled",
                    "filled": quantity,
                    "remaining": "0"
                }));
                replies.push(json!({
                    "type": "execDetails",
                    "reqId": -1,
                    "symbol": symbol,
                    "side": side,
                    "shares": quantity,
                    "price": "100"
                }));
            }
            replies
        }
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_gateway_starts() {
        let server = MockGateway::start(GatewayScript::default()).await;
        assert!(server.url().starts_with("ws://127.0.0.1:"));
        assert!(server.received().await.is_empty());
        server.shutdown().await;
    }
}
