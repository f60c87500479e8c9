//! SHC event socket.
//!
//! The controller pushes JSON frames over a WebSocket at
//! `ws://{host}:{port}/events?token={access_token}`: port 9090 on second
//! generation controllers, the REST port (8080) on classic ones. This module
//! owns the connection, keep-alive pings, frame parsing, and the backoff
//! schedule; the reconnect loop itself lives in `livisi-core`.
//!
//! # Example
//!
//! ```rust,ignore
//! use livisi_api::websocket::{EventSocket, Frame, event_url, parse_frame};
//!
//! let url = event_url(client.base_url(), generation, &token)?;
//! let mut socket = EventSocket::connect(&url, &transport, Duration::from_secs(10)).await?;
//!
//! while let Some(frame) = socket.next_frame().await? {
//!     if let Frame::Text(text) = frame {
//!         if let Some(event) = parse_frame(&text)? {
//!             println!("{} from {}", event.event_type.as_deref().unwrap_or("?"), event.source);
//!         }
//!     }
//! }
//! ```

use std::time::Duration;

use futures_util::stream::{SplitStream, StreamExt};
use futures_util::SinkExt;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::{Connector, MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::error::Error;
use crate::rest::models::ControllerGeneration;
use crate::session::Token;
use crate::transport::TransportConfig;

/// Event socket port on second generation controllers.
pub const V2_EVENT_PORT: u16 = 9090;

/// Event socket port on classic controllers (shared with REST).
pub const CLASSIC_EVENT_PORT: u16 = 8080;

pub const EVENT_STATE_CHANGED: &str = "StateChanged";
pub const EVENT_BUTTON_PRESSED: &str = "ButtonPressed";
pub const EVENT_MOTION_DETECTED: &str = "MotionDetected";

// ── RawEvent ─────────────────────────────────────────────────────────

/// A frame from the event socket, as sent by the controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEvent {
    #[serde(default)]
    pub namespace: Option<String>,

    /// `StateChanged`, `ButtonPressed`, `MotionDetected`, ...
    #[serde(rename = "type", default)]
    pub event_type: Option<String>,

    /// Link of the emitter: `/capability/{id}` or `/device/{id}`.
    pub source: String,

    /// ISO-8601 timestamp from the controller.
    #[serde(default)]
    pub timestamp: Option<String>,

    #[serde(default)]
    pub properties: Option<Map<String, Value>>,
}

/// Parse one text frame.
///
/// Returns `Ok(None)` for well-formed frames without properties, which the
/// controller sends and which carry nothing to apply.
pub fn parse_frame(text: &str) -> Result<Option<RawEvent>, Error> {
    let event: RawEvent = serde_json::from_str(text).map_err(|e| Error::Deserialization {
        message: e.to_string(),
        body: text.to_owned(),
    })?;

    if event.properties.is_none() {
        tracing::trace!(source = %event.source, "event without properties");
        return Ok(None);
    }
    Ok(Some(event))
}

/// Build the event socket URL for a controller.
///
/// `base_url` is the REST root; the scheme becomes `ws`/`wss`, the port
/// depends on the controller generation.
pub fn event_url(
    base_url: &Url,
    generation: ControllerGeneration,
    token: &Token,
) -> Result<Url, Error> {
    let mut url = base_url.clone();

    let scheme = if base_url.scheme() == "https" { "wss" } else { "ws" };
    url.set_scheme(scheme)
        .map_err(|()| Error::WebSocketConnect(format!("cannot derive ws URL from {base_url}")))?;

    let port = if generation.is_v2() {
        V2_EVENT_PORT
    } else {
        base_url.port().unwrap_or(CLASSIC_EVENT_PORT)
    };
    url.set_port(Some(port))
        .map_err(|()| Error::WebSocketConnect(format!("cannot set port on {base_url}")))?;

    url.set_path("/events");
    url.query_pairs_mut()
        .clear()
        .append_pair("token", token.secret().expose_secret());
    Ok(url)
}

// ── EventSocket ──────────────────────────────────────────────────────

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// One frame off the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A JSON text frame.
    Text(String),
    /// Ping/pong traffic: proves the link is alive, carries no data.
    Heartbeat,
}

/// A connected event socket.
///
/// A background task sends a ping every `ping_interval`; it is aborted
/// when the socket is dropped.
pub struct EventSocket {
    read: SplitStream<WsStream>,
    pinger: JoinHandle<()>,
}

impl EventSocket {
    /// Open the socket. The URL carries the token, so it is never logged.
    pub async fn connect(
        url: &Url,
        transport: &TransportConfig,
        ping_interval: Duration,
    ) -> Result<Self, Error> {
        tracing::info!(
            host = url.host_str().unwrap_or("-"),
            port = url.port().unwrap_or_default(),
            "connecting to event socket"
        );

        let connector = transport.rustls_config()?.map(Connector::Rustls);

        let handshake =
            tokio_tungstenite::connect_async_tls_with_config(url.as_str(), None, true, connector);
        let (ws_stream, _response) = tokio::time::timeout(transport.timeout, handshake)
            .await
            .map_err(|_| Error::Timeout {
                timeout_secs: transport.timeout_secs(),
            })?
            .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

        tracing::info!("event socket connected");

        let (mut write, read) = ws_stream.split();
        let pinger = tokio::spawn(async move {
            let mut interval = tokio::time::interval(ping_interval);
            interval.tick().await;
            loop {
                interval.tick().await;
                if let Err(e) = write.send(tungstenite::Message::Ping(Vec::new().into())).await {
                    tracing::debug!(error = %e, "ping failed, stopping keep-alive");
                    break;
                }
            }
        });

        Ok(Self { read, pinger })
    }

    /// Read the next frame.
    ///
    /// `Ok(None)` means the controller closed the socket. Cancel-safe: a
    /// dropped call loses no frame.
    pub async fn next_frame(&mut self) -> Result<Option<Frame>, Error> {
        loop {
            match self.read.next().await {
                Some(Ok(tungstenite::Message::Text(text))) => {
                    return Ok(Some(Frame::Text(text.as_str().to_owned())));
                }
                Some(Ok(tungstenite::Message::Ping(_) | tungstenite::Message::Pong(_))) => {
                    return Ok(Some(Frame::Heartbeat));
                }
                Some(Ok(tungstenite::Message::Close(frame))) => {
                    return match frame {
                        Some(cf) => Err(Error::WebSocketClosed {
                            code: cf.code.into(),
                            reason: cf.reason.as_str().to_owned(),
                        }),
                        None => Ok(None),
                    };
                }
                Some(Ok(_)) => {
                    // Binary and raw frames -- the controller sends neither.
                }
                Some(Err(e)) => return Err(Error::WebSocketConnect(e.to_string())),
                None => return Ok(None),
            }
        }
    }
}

impl Drop for EventSocket {
    fn drop(&mut self) {
        self.pinger.abort();
    }
}

// ── ReconnectConfig ──────────────────────────────────────────────────

/// Exponential backoff configuration for event socket reconnection.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt. Default: 1s.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay. Default: 60s.
    pub max_delay: Duration,

    /// A connection that stayed up this long resets the backoff. Default: 30s.
    pub stable_after: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            stable_after: Duration::from_secs(30),
        }
    }
}

/// Exponential backoff with jitter.
///
/// `delay = min(initial * 2^attempt, max) * jitter`, jitter in +-25%, and
/// never above `max_delay`.
pub fn calculate_backoff(attempt: u32, config: &ReconnectConfig) -> Duration {
    let exponent = i32::try_from(attempt.min(30)).unwrap_or(30);
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(exponent);
    let max = config.max_delay.as_secs_f64();
    let capped = base.min(max);

    // Deterministic "jitter" seeded from the attempt number.
    let jitter_factor = 1.0 + 0.25 * (f64::from(attempt) * 7.3).sin();
    let with_jitter = (capped * jitter_factor).clamp(0.0, max);

    Duration::from_secs_f64(with_jitter)
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn default_reconnect_config() {
        let config = ReconnectConfig::default();
        assert_eq!(config.initial_delay, Duration::from_secs(1));
        assert_eq!(config.max_delay, Duration::from_secs(60));
        assert_eq!(config.stable_after, Duration::from_secs(30));
    }

    #[test]
    fn backoff_increases_exponentially() {
        let config = ReconnectConfig::default();

        let d0 = calculate_backoff(0, &config);
        let d1 = calculate_backoff(1, &config);
        let d2 = calculate_backoff(2, &config);

        assert!(d1 > d0, "d1 ({d1:?}) should be greater than d0 ({d0:?})");
        assert!(d2 > d1, "d2 ({d2:?}) should be greater than d1 ({d1:?})");
    }

    #[test]
    fn backoff_never_exceeds_max_delay() {
        let config = ReconnectConfig {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            stable_after: Duration::from_secs(30),
        };

        for attempt in 0..64 {
            let delay = calculate_backoff(attempt, &config);
            assert!(delay <= Duration::from_secs(10), "attempt {attempt}: {delay:?}");
        }
    }

    #[test]
    fn parse_state_changed_frame() {
        let raw = json!({
            "namespace": "core.RWE",
            "type": "StateChanged",
            "source": "/capability/dimmer-17",
            "timestamp": "2026-03-01T10:00:00.000Z",
            "properties": { "dimLevel": 42 }
        });

        let event = parse_frame(&raw.to_string()).unwrap().unwrap();
        assert_eq!(event.event_type.as_deref(), Some(EVENT_STATE_CHANGED));
        assert_eq!(event.source, "/capability/dimmer-17");
        assert_eq!(event.properties.unwrap()["dimLevel"], 42);
    }

    #[test]
    fn frame_without_properties_is_skipped() {
        let raw = json!({
            "namespace": "core.RWE",
            "type": "StateChanged",
            "source": "/device/abc",
            "properties": null
        });
        assert!(parse_frame(&raw.to_string()).unwrap().is_none());
    }

    #[tokio::test]
    async fn connect_gives_up_when_upgrade_never_answers() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        // Accept the TCP connection, then stay silent.
        let _server = tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            std::future::pending::<()>().await;
        });

        let transport = TransportConfig {
            timeout: Duration::from_secs(1),
            ..TransportConfig::default()
        };
        let url = Url::parse(&format!("ws://127.0.0.1:{port}/events?token=t")).unwrap();

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            EventSocket::connect(&url, &transport, Duration::from_secs(10)),
        )
        .await
        .expect("connect must respect the transport timeout");
        assert!(matches!(result, Err(Error::Timeout { timeout_secs: 1 })));
    }

    #[test]
    fn malformed_frame_is_an_error() {
        assert!(matches!(
            parse_frame("not json at all"),
            Err(Error::Deserialization { .. })
        ));
    }
}
