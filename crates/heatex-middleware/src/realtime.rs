//! Realtime channel plumbing.
//!
//! Connecting to the hosted publish/subscribe service is two steps:
//!
//! 1. **Negotiate** – `GET {pubsub_url}/negotiate?userId=…` returns a
//!    short-lived client WebSocket URL ([`ConnectionDescriptor`]).
//! 2. **Connect** – open the WebSocket and turn it into a stream of
//!    [`ChannelEvent`]s.  The stream always ends with exactly one
//!    [`ChannelEvent::Closed`].
//!
//! Both steps sit behind traits ([`Negotiator`], [`ChannelConnector`]) so the
//! dashboard runtime can be driven by scripted fakes in tests.
//!
//! Negotiation failures are split in two: a service that is not configured
//! (empty URL, HTTP 400/401/403) yields [`DashboardError::Config`], anything
//! else (unreachable host, 5xx, bad body) yields
//! [`DashboardError::Negotiation`].

use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream::{self, BoxStream};
use heatex_kernel::CloseReason;
use heatex_kernel::reconnect::ABNORMAL_CLOSURE;
use heatex_types::DashboardError;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

// ─────────────────────────────────────────────────────────────────────────────
// Negotiation
// ─────────────────────────────────────────────────────────────────────────────

/// Where to open the realtime WebSocket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionDescriptor {
    pub url: String,
}

#[async_trait]
pub trait Negotiator: Send + Sync {
    async fn negotiate(&self, user_id: &str) -> Result<ConnectionDescriptor, DashboardError>;
}

#[derive(Deserialize)]
struct NegotiateResponse {
    #[serde(alias = "Url")]
    url: Option<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(alias = "Message")]
    message: Option<String>,
}

/// HTTP client for the negotiation endpoint.
pub struct HttpNegotiator {
    base_url: String,
    access_key: Option<String>,
    client: reqwest::Client,
}

impl HttpNegotiator {
    /// `base_url` is the service root, e.g. `"https://pubsub.example.com/api"`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            access_key: None,
            client: reqwest::Client::new(),
        }
    }

    /// Send `access_key` as a bearer token.  Empty keys are ignored.
    pub fn with_access_key(mut self, access_key: impl Into<String>) -> Self {
        let key = access_key.into();
        self.access_key = (!key.is_empty()).then_some(key);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl Negotiator for HttpNegotiator {
    async fn negotiate(&self, user_id: &str) -> Result<ConnectionDescriptor, DashboardError> {
        let base = self.base_url.trim().trim_end_matches('/');
        if base.is_empty() {
            return Err(DashboardError::Config(
                "realtime channel URL not configured (set pubsub_url or HEATEX_PUBSUB_URL)".into(),
            ));
        }

        let url = format!("{base}/negotiate");
        let mut request = self.client.get(&url).query(&[("userId", user_id)]);
        if let Some(key) = &self.access_key {
            request = request.bearer_auth(key);
        }
        debug!(url = %url, user_id, "negotiating realtime channel");

        let response = request
            .send()
            .await
            .map_err(|e| DashboardError::Negotiation(e.to_string()))?;

        let status = response.status();
        if matches!(
            status,
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
        ) {
            let detail = response
                .json::<ErrorBody>()
                .await
                .ok()
                .and_then(|b| b.message)
                .unwrap_or_else(|| status.to_string());
            return Err(DashboardError::Config(detail));
        }
        if !status.is_success() {
            return Err(DashboardError::Negotiation(format!("negotiate returned {status}")));
        }

        let body: NegotiateResponse = response
            .json()
            .await
            .map_err(|e| DashboardError::Negotiation(format!("bad negotiate body: {e}")))?;
        match body.url {
            Some(url) if !url.is_empty() => Ok(ConnectionDescriptor { url }),
            _ => Err(DashboardError::Negotiation(
                "no connection URL received from server".into(),
            )),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Transport
// ─────────────────────────────────────────────────────────────────────────────

/// One observation from an open channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// An inbound text frame, undecoded.
    Message(String),
    /// The channel closed.  Always the last event of the stream.
    Closed(CloseReason),
}

/// Opens a realtime channel.
///
/// `Ok` means the channel is established; the returned stream yields inbound
/// frames and ends after a single [`ChannelEvent::Closed`].  `Err` means the
/// connection was never established.
#[async_trait]
pub trait ChannelConnector: Send + Sync {
    async fn connect(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> Result<BoxStream<'static, ChannelEvent>, DashboardError>;
}

/// [`ChannelConnector`] over `tokio-tungstenite`.
#[derive(Debug, Default, Clone)]
pub struct WsConnector;

impl WsConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ChannelConnector for WsConnector {
    async fn connect(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> Result<BoxStream<'static, ChannelEvent>, DashboardError> {
        let (ws, _response) = connect_async(descriptor.url.as_str())
            .await
            .map_err(|e| DashboardError::Transport(e.to_string()))?;
        info!("realtime websocket connected");

        let events = stream::unfold(Some(ws), |state| async move {
            let mut ws = state?;
            loop {
                match ws.next().await {
                    Some(Ok(Message::Text(text))) => {
                        return Some((ChannelEvent::Message(text.as_str().to_owned()), Some(ws)));
                    }
                    Some(Ok(Message::Binary(bytes))) => {
                        if let Ok(text) = String::from_utf8(bytes.to_vec()) {
                            return Some((ChannelEvent::Message(text), Some(ws)));
                        }
                        debug!("ignoring non-UTF-8 binary frame");
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let reason = match frame {
                            Some(frame) => CloseReason::from_code(u16::from(frame.code)),
                            // 1005: closed without a status code.
                            None => CloseReason::Abnormal(Some(1005)),
                        };
                        return Some((ChannelEvent::Closed(reason), None));
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        warn!(error = %e, "realtime websocket error");
                        return Some((
                            ChannelEvent::Closed(CloseReason::Abnormal(Some(ABNORMAL_CLOSURE))),
                            None,
                        ));
                    }
                    None => {
                        return Some((
                            ChannelEvent::Closed(CloseReason::Abnormal(Some(ABNORMAL_CLOSURE))),
                            None,
                        ));
                    }
                }
            }
        });
        Ok(events.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::SinkExt;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;
    use tokio_tungstenite::tungstenite::protocol::CloseFrame;
    use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

    /// Serve a single canned HTTP response and return the base URL.
    async fn serve_once(status_line: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            let response = format!(
                "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        });
        format!("http://{addr}")
    }

    // ── negotiation ──────────────────────────────────────────────────────────

    #[tokio::test]
    async fn empty_base_url_is_configuration_error() {
        let err = HttpNegotiator::new("  ").negotiate("dashboard_1").await.unwrap_err();
        assert!(err.is_configuration());
    }

    #[tokio::test]
    async fn negotiate_returns_url_field() {
        let base = serve_once("200 OK", r#"{"Status":"Success","Url":"wss://hub/client?token=abc"}"#).await;
        let descriptor = HttpNegotiator::new(base).negotiate("dashboard_1").await.unwrap();
        assert_eq!(descriptor.url, "wss://hub/client?token=abc");
    }

    #[tokio::test]
    async fn bad_request_is_configuration_error() {
        let base = serve_once(
            "400 Bad Request",
            r#"{"Status":"Error","Message":"connection string not configured"}"#,
        )
        .await;
        let err = HttpNegotiator::new(base).negotiate("dashboard_1").await.unwrap_err();
        assert_eq!(err, DashboardError::Config("connection string not configured".into()));
    }

    #[tokio::test]
    async fn server_error_is_transient() {
        let base = serve_once("503 Service Unavailable", "{}").await;
        let err = HttpNegotiator::new(base).negotiate("dashboard_1").await.unwrap_err();
        assert!(matches!(err, DashboardError::Negotiation(_)));
    }

    #[tokio::test]
    async fn missing_url_is_transient() {
        let base = serve_once("200 OK", r#"{"Status":"Success"}"#).await;
        let err = HttpNegotiator::new(base).negotiate("dashboard_1").await.unwrap_err();
        assert!(matches!(err, DashboardError::Negotiation(_)));
    }

    #[tokio::test]
    async fn unreachable_service_is_transient() {
        // Bind then drop to get a port nobody listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let err = HttpNegotiator::new(format!("http://{addr}"))
            .negotiate("dashboard_1")
            .await
            .unwrap_err();
        assert!(matches!(err, DashboardError::Negotiation(_)));
    }

    #[test]
    fn empty_access_key_is_ignored() {
        let negotiator = HttpNegotiator::new("http://x").with_access_key("");
        assert!(negotiator.access_key.is_none());
    }

    // ── websocket transport ──────────────────────────────────────────────────

    #[tokio::test]
    async fn text_frames_then_normal_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(socket).await.unwrap();
            ws.send(Message::Text("hello".into())).await.unwrap();
            ws.close(Some(CloseFrame {
                code: CloseCode::Normal,
                reason: "bye".into(),
            }))
            .await
            .unwrap();
            while ws.next().await.is_some() {}
        });

        let descriptor = ConnectionDescriptor {
            url: format!("ws://{addr}"),
        };
        let events: Vec<ChannelEvent> = WsConnector::new()
            .connect(&descriptor)
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(
            events,
            vec![
                ChannelEvent::Message("hello".into()),
                ChannelEvent::Closed(CloseReason::Normal),
            ]
        );
    }

    #[tokio::test]
    async fn dropped_connection_is_abnormal() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let ws = accept_async(socket).await.unwrap();
            drop(ws);
        });

        let descriptor = ConnectionDescriptor {
            url: format!("ws://{addr}"),
        };
        let events: Vec<ChannelEvent> = WsConnector::new()
            .connect(&descriptor)
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], ChannelEvent::Closed(CloseReason::Abnormal(_))));
    }

    #[tokio::test]
    async fn refused_connection_is_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let descriptor = ConnectionDescriptor {
            url: format!("ws://{addr}"),
        };
        let err = WsConnector::new().connect(&descriptor).await.err().unwrap();
        assert!(matches!(err, DashboardError::Transport(_)));
    }
}
