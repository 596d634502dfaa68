//! [`CockpitServer`] – HTTP + WebSocket server for the browser dashboard.
//!
//! Listens on `0.0.0.0:8080` (configurable via [`CockpitServer::with_port`]).
//!
//! * `GET /api/status` → the status query as JSON.
//! * Any other HTTP request → 200 OK with the embedded dashboard page.
//! * WebSocket upgrades → bidirectional bridge between the [`EventBus`] and
//!   the [`DashboardHandle`].

use std::net::SocketAddr;

use futures_util::{SinkExt, StreamExt};
use heatex_middleware::EventBus;
use heatex_runtime::DashboardHandle;
use heatex_runtime::display::DASHBOARD_SOURCE;
use heatex_types::{DashboardError, DataSourceMode, Event, EventPayload};
use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::error::RecvError;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, info, warn};

/// Default TCP port for the dashboard HTTP/WebSocket server.
pub const DEFAULT_PORT: u16 = 8080;

/// The compiled-in dashboard page (HTML + CSS + JS).
const DASHBOARD_HTML: &str = include_str!("dashboard.html");

/// Upper bound on the request head read for plain HTTP requests.
const MAX_REQUEST_HEAD: usize = 8 * 1024;

// ---------------------------------------------------------------------------
// CockpitServer
// ---------------------------------------------------------------------------

/// Serves the dashboard page and bridges the bus and the operator command
/// surface to every connected browser.
pub struct CockpitServer {
    bus: EventBus,
    dashboard: DashboardHandle,
    port: u16,
}

impl CockpitServer {
    /// Create a server on the [`DEFAULT_PORT`].
    pub fn new(bus: EventBus, dashboard: DashboardHandle) -> Self {
        Self {
            bus,
            dashboard,
            port: DEFAULT_PORT,
        }
    }

    /// Override the listening port (builder-style).
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Bind `0.0.0.0:port` and serve until the task is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`DashboardError::Transport`] if the TCP listener cannot bind.
    pub async fn run(self) -> Result<(), DashboardError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| DashboardError::Transport(format!("cockpit bind error on {addr}: {e}")))?;
        info!(port = self.port, "cockpit listening on http://localhost:{}", self.port);
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener.
    pub async fn serve(self, listener: TcpListener) -> Result<(), DashboardError> {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let bus = self.bus.clone();
                    let dashboard = self.dashboard.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, peer, bus, dashboard).await {
                            debug!(%peer, error = %e, "cockpit client error");
                        }
                    });
                }
                Err(e) => warn!(error = %e, "cockpit accept error"),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Per-connection handler
// ---------------------------------------------------------------------------

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    bus: EventBus,
    dashboard: DashboardHandle,
) -> Result<(), DashboardError> {
    // `peek` leaves the request in place for tungstenite's handshaker.
    let mut buf = [0u8; 1024];
    let n = stream
        .peek(&mut buf)
        .await
        .map_err(|e| DashboardError::Transport(format!("peek error from {peer}: {e}")))?;

    let header_preview = String::from_utf8_lossy(&buf[..n]);
    let is_ws_upgrade = header_preview.lines().any(|line| {
        let line = line.to_lowercase();
        line.starts_with("upgrade:") && line.contains("websocket")
    });

    if is_ws_upgrade {
        handle_ws(stream, peer, bus, dashboard).await
    } else {
        serve_http(stream, dashboard).await
    }
}

// ---------------------------------------------------------------------------
// Plain HTTP
// ---------------------------------------------------------------------------

async fn serve_http(mut stream: TcpStream, dashboard: DashboardHandle) -> Result<(), DashboardError> {
    let head = read_request_head(&mut stream).await?;
    let path = head
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("/");

    if path == "/api/status" {
        let (status_line, body) = match dashboard.status().await {
            Ok(status) => (
                "200 OK",
                serde_json::to_string(&status)
                    .map_err(|e| DashboardError::Serialization(e.to_string()))?,
            ),
            Err(e) => ("503 Service Unavailable", json!({ "error": e.to_string() }).to_string()),
        };
        write_response(&mut stream, status_line, "application/json", &body).await
    } else {
        write_response(&mut stream, "200 OK", "text/html; charset=utf-8", DASHBOARD_HTML).await
    }
}

async fn read_request_head(stream: &mut TcpStream) -> Result<String, DashboardError> {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") && head.len() < MAX_REQUEST_HEAD {
        let n = stream
            .read(&mut buf)
            .await
            .map_err(|e| DashboardError::Transport(format!("HTTP read error: {e}")))?;
        if n == 0 {
            break;
        }
        head.extend_from_slice(&buf[..n]);
    }
    Ok(String::from_utf8_lossy(&head).into_owned())
}

async fn write_response(
    stream: &mut TcpStream,
    status_line: &str,
    content_type: &str,
    body: &str,
) -> Result<(), DashboardError> {
    let response = format!(
        "HTTP/1.1 {status_line}\r\n\
         Content-Type: {content_type}\r\n\
         Content-Length: {}\r\n\
         Cache-Control: no-store\r\n\
         Connection: close\r\n\
         \r\n\
         {body}",
        body.len(),
    );
    stream
        .write_all(response.as_bytes())
        .await
        .map_err(|e| DashboardError::Transport(format!("HTTP write error: {e}")))
}

// ---------------------------------------------------------------------------
// WebSocket: bus → browser, browser → dashboard
// ---------------------------------------------------------------------------

async fn handle_ws(
    stream: TcpStream,
    peer: SocketAddr,
    bus: EventBus,
    dashboard: DashboardHandle,
) -> Result<(), DashboardError> {
    let ws_stream = accept_async(stream)
        .await
        .map_err(|e| DashboardError::Transport(format!("WS handshake from {peer}: {e}")))?;
    info!(%peer, "cockpit client connected");

    let (mut ws_tx, mut ws_rx) = ws_stream.split();
    let mut bus_rx = bus.subscribe();

    // A fresh tab renders the current frame without waiting for the next commit.
    let snapshot = dashboard.snapshot().await?;
    let greeting = Event::new(DASHBOARD_SOURCE, EventPayload::Display(snapshot));
    if let Ok(json) = serde_json::to_string(&greeting) {
        let _ = ws_tx.send(Message::Text(json.into())).await;
    }

    loop {
        tokio::select! {
            result = bus_rx.recv() => match result {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(json) => {
                        if ws_tx.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(error = %e, "event serialization failed"),
                },
                Err(RecvError::Lagged(n)) => warn!(%peer, skipped = n, "cockpit client lagged"),
                Err(RecvError::Closed) => break,
            },
            msg = ws_rx.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let Some(command) = parse_upstream(text.as_str()) else {
                        debug!(%peer, "ignoring unrecognised upstream message");
                        continue;
                    };
                    let reply = execute(command, &dashboard).await;
                    if ws_tx.send(Message::Text(reply.to_string().into())).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                _ => {}
            },
        }
    }

    info!(%peer, "cockpit client disconnected");
    Ok(())
}

// ---------------------------------------------------------------------------
// Upstream commands
// ---------------------------------------------------------------------------

/// An operator command sent by the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamCommand {
    SetMode(DataSourceMode),
    Reconnect,
    Status,
}

/// Parse a text frame from the page.
///
/// | Topic | Command |
/// |---|---|
/// | `/dashboard/mode` with `msg.mode` | [`UpstreamCommand::SetMode`] |
/// | `/dashboard/reconnect` | [`UpstreamCommand::Reconnect`] |
/// | `/dashboard/status` | [`UpstreamCommand::Status`] |
///
/// Anything else, including an unknown mode name, yields `None`.
pub fn parse_upstream(text: &str) -> Option<UpstreamCommand> {
    let json = serde_json::from_str::<Value>(text).ok()?;
    match json.get("topic").and_then(Value::as_str)? {
        "/dashboard/mode" => json
            .get("msg")
            .and_then(|m| m.get("mode"))
            .and_then(Value::as_str)
            .and_then(|mode| mode.parse().ok())
            .map(UpstreamCommand::SetMode),
        "/dashboard/reconnect" => Some(UpstreamCommand::Reconnect),
        "/dashboard/status" => Some(UpstreamCommand::Status),
        _ => None,
    }
}

/// Run `command` against the dashboard and build the reply frame.
async fn execute(command: UpstreamCommand, dashboard: &DashboardHandle) -> Value {
    let result = match command {
        UpstreamCommand::SetMode(mode) => dashboard.set_mode(mode).await,
        UpstreamCommand::Reconnect => dashboard.manual_reconnect().await,
        UpstreamCommand::Status => dashboard.status().await,
    };
    match result {
        Ok(status) => json!({ "topic": "/dashboard/status", "msg": status }),
        Err(e) => json!({ "topic": "/dashboard/error", "msg": { "message": e.to_string() } }),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use heatex_middleware::{HttpNegotiator, SimulatorAdapter, WsConnector};
    use heatex_runtime::{BusDisplaySink, DataSources, Dashboard, DashboardConfig};
    use std::sync::Arc;
    use std::time::Duration;

    fn start_dashboard(bus: &EventBus) -> DashboardHandle {
        let sources = DataSources {
            simulator: Arc::new(SimulatorAdapter::with_seed(1)),
            database: Arc::new(SimulatorAdapter::with_seed(2)),
            negotiator: Arc::new(HttpNegotiator::new("")),
            connector: Arc::new(WsConnector::new()),
        };
        let config = DashboardConfig {
            initial_mode: DataSourceMode::Simulator,
            poll_interval: Duration::from_secs(3600),
            ..Default::default()
        };
        let (dashboard, handle) =
            Dashboard::new(config, sources, Arc::new(BusDisplaySink::new(bus.clone())));
        tokio::spawn(dashboard.run());
        handle
    }

    async fn start_server() -> (SocketAddr, DashboardHandle) {
        let bus = EventBus::default();
        let handle = start_dashboard(&bus);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(CockpitServer::new(bus, handle.clone()).serve(listener));
        (addr, handle)
    }

    async fn http_get(addr: SocketAddr, path: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\n\r\n");
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    // ── CockpitServer constructor ─────────────────────────────────────────────

    #[tokio::test]
    async fn default_port_is_8080() {
        let bus = EventBus::default();
        let server = CockpitServer::new(bus.clone(), start_dashboard(&bus));
        assert_eq!(server.port(), DEFAULT_PORT);
        assert_eq!(server.with_port(9999).port(), 9999);
    }

    // ── Upstream parsing ──────────────────────────────────────────────────────

    #[test]
    fn parses_mode_selection() {
        let msg = r#"{"topic":"/dashboard/mode","msg":{"mode":"database"}}"#;
        assert_eq!(
            parse_upstream(msg),
            Some(UpstreamCommand::SetMode(DataSourceMode::DatabaseRoundTrip))
        );
        let msg = r#"{"topic":"/dashboard/mode","msg":{"mode":"pubsub"}}"#;
        assert_eq!(
            parse_upstream(msg),
            Some(UpstreamCommand::SetMode(DataSourceMode::RealtimeChannel))
        );
    }

    #[test]
    fn parses_reconnect_and_status() {
        assert_eq!(
            parse_upstream(r#"{"topic":"/dashboard/reconnect"}"#),
            Some(UpstreamCommand::Reconnect)
        );
        assert_eq!(
            parse_upstream(r#"{"topic":"/dashboard/status","msg":{}}"#),
            Some(UpstreamCommand::Status)
        );
    }

    #[test]
    fn rejects_unknown_input() {
        assert_eq!(parse_upstream("not json at all"), None);
        assert_eq!(parse_upstream(r#"{"topic":"/unknown"}"#), None);
        assert_eq!(parse_upstream(r#"{"topic":"/dashboard/mode","msg":{"mode":"steam"}}"#), None);
        assert_eq!(parse_upstream(r#"{"topic":"/dashboard/mode"}"#), None);
    }

    #[tokio::test]
    async fn reconnect_outside_realtime_replies_with_error() {
        let bus = EventBus::default();
        let handle = start_dashboard(&bus);
        let reply = execute(UpstreamCommand::Reconnect, &handle).await;
        assert_eq!(reply["topic"], "/dashboard/error");
        assert!(reply["msg"]["message"].as_str().unwrap().contains("realtime"));
    }

    // ── HTTP ──────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn status_endpoint_returns_json() {
        let (addr, _handle) = start_server().await;
        let response = http_get(addr, "/api/status").await;
        assert!(response.starts_with("HTTP/1.1 200 OK"));
        assert!(response.contains("application/json"));
        let body = response.split("\r\n\r\n").nth(1).unwrap();
        let status: Value = serde_json::from_str(body).unwrap();
        assert_eq!(status["mode"], "simulator");
        assert_eq!(status["channel_state"], "idle");
        assert_eq!(status["max_attempts"], 5);
    }

    #[tokio::test]
    async fn other_paths_serve_the_page() {
        let (addr, _handle) = start_server().await;
        let response = http_get(addr, "/").await;
        assert!(response.starts_with("HTTP/1.1 200 OK"));
        assert!(response.contains("text/html"));
        assert!(response.contains("WebSocket"));
    }

    // ── WebSocket ─────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn websocket_greets_and_accepts_mode_changes() {
        let (addr, handle) = start_server().await;
        let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/"))
            .await
            .unwrap();

        let first = ws.next().await.unwrap().unwrap();
        let first: Value = serde_json::from_str(first.to_text().unwrap()).unwrap();
        assert_eq!(first["payload"]["kind"], "display");
        assert!(first["payload"]["data"]["efficiency"].is_number());

        let command = r#"{"topic":"/dashboard/mode","msg":{"mode":"database"}}"#;
        ws.send(Message::Text(command.into())).await.unwrap();

        let reply = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let frame = ws.next().await.unwrap().unwrap();
                let value: Value = serde_json::from_str(frame.to_text().unwrap()).unwrap();
                if value["topic"] == "/dashboard/status" {
                    return value;
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(reply["msg"]["mode"], "database");
        assert_eq!(handle.status().await.unwrap().mode, DataSourceMode::DatabaseRoundTrip);
    }

    // ── Page embedding ────────────────────────────────────────────────────────

    #[test]
    fn page_wires_websocket_and_commands() {
        assert!(DASHBOARD_HTML.contains("WebSocket"));
        assert!(DASHBOARD_HTML.contains("/dashboard/mode"));
        assert!(DASHBOARD_HTML.contains("/dashboard/reconnect"));
    }
}
