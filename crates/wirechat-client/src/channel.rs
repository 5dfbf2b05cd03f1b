//! Realtime channel connection management.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, RwLock, mpsc};
use tokio::time::timeout;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tracing::{debug, warn};
use url::Url;

use crate::error::{ClientError, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWriter = SplitSink<WsStream, Message>;

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        }
    }
}

/// Event observed on an open channel.
///
/// Every inbound frame is a pre-formatted display line the server produced;
/// the channel never parses it. `Closed` is terminal and arrives exactly
/// once per successful connect, whether closure was local or remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Line(String),
    Closed,
}

/// Channel configuration.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub connect_timeout: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Realtime channel to the chat service.
///
/// Disconnected -> Connecting -> Connected -> Disconnected, one attempt at
/// a time. The channel never reconnects on its own; closure policy belongs
/// to the caller.
pub struct ChatChannel {
    config: ChannelConfig,
    state: Arc<RwLock<ConnectionState>>,
    writer: Arc<Mutex<Option<WsWriter>>>,
    recv_task: Arc<Mutex<Option<tokio::task::JoinHandle<()>>>>,
}

impl ChatChannel {
    #[must_use]
    pub fn new(config: ChannelConfig) -> Self {
        Self {
            config,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            writer: Arc::new(Mutex::new(None)),
            recv_task: Arc::new(Mutex::new(None)),
        }
    }

    /// Current connection state.
    pub async fn state(&self) -> ConnectionState {
        *self.state.read().await
    }

    /// Open the channel and start the background receive loop.
    ///
    /// Returns the event stream for this attempt. An attempt that fails to
    /// open reports the failure here and emits no events.
    pub async fn connect(&self, url: &Url) -> Result<mpsc::UnboundedReceiver<ChannelEvent>> {
        {
            let mut state_guard = self.state.write().await;
            if *state_guard != ConnectionState::Disconnected {
                return Err(ClientError::AlreadyConnected);
            }
            *state_guard = ConnectionState::Connecting;
        }

        // The URL path carries the token; log the host only.
        let host = url.host_str().unwrap_or("<unknown-host>").to_string();
        debug!("connecting realtime channel to {host}");

        let connected = timeout(self.config.connect_timeout, connect_async(url.as_str())).await;
        let stream = match connected {
            Ok(Ok((stream, _response))) => stream,
            Ok(Err(error)) => {
                *self.state.write().await = ConnectionState::Disconnected;
                return Err(ClientError::WebSocket(error.to_string()));
            }
            Err(_) => {
                *self.state.write().await = ConnectionState::Disconnected;
                return Err(ClientError::Timeout(format!(
                    "connect timeout after {:?}",
                    self.config.connect_timeout
                )));
            }
        };

        let (writer, mut reader) = stream.split();
        *self.writer.lock().await = Some(writer);
        *self.state.write().await = ConnectionState::Connected;
        debug!("realtime channel to {host} open");

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let state = Arc::clone(&self.state);
        let writer_slot = Arc::clone(&self.writer);

        let task = tokio::spawn(async move {
            while let Some(frame) = reader.next().await {
                match frame {
                    Ok(Message::Text(text)) => {
                        if events_tx.send(ChannelEvent::Line(text)).is_err() {
                            break;
                        }
                    }
                    Ok(Message::Ping(payload)) => {
                        debug!("received ping from {host} ({} bytes)", payload.len());
                    }
                    Ok(Message::Pong(_)) => {}
                    Ok(Message::Close(_)) => break,
                    Ok(Message::Binary(_)) => {}
                    Ok(Message::Frame(_)) => {}
                    Err(error) => {
                        warn!("websocket read error on {host}: {error}");
                        break;
                    }
                }
            }

            writer_slot.lock().await.take();
            *state.write().await = ConnectionState::Disconnected;
            // This task is the only sender of Closed, so the terminal event
            // cannot be delivered twice for one attempt.
            let _ = events_tx.send(ChannelEvent::Closed);
            debug!("realtime channel to {host} closed");
        });

        *self.recv_task.lock().await = Some(task);
        Ok(events_rx)
    }

    /// Send one raw text frame. Empty or whitespace-only input is dropped
    /// without touching the socket; non-empty input goes out verbatim.
    pub async fn send(&self, text: &str) -> Result<()> {
        let Some(payload) = outbound_payload(text) else {
            debug!("dropping empty outbound message");
            return Ok(());
        };
        if self.state().await != ConnectionState::Connected {
            return Err(ClientError::NotConnected);
        }
        let mut writer_guard = self.writer.lock().await;
        let writer = writer_guard.as_mut().ok_or(ClientError::NotConnected)?;
        writer
            .send(Message::Text(payload.to_owned()))
            .await
            .map_err(|error| ClientError::WebSocket(error.to_string()))
    }

    /// Close the channel. Sends the close frame and lets the receive loop
    /// wind down on its own; the loop is never aborted, so the terminal
    /// `Closed` event survives a local close.
    pub async fn close(&self) -> Result<()> {
        if let Some(mut writer) = self.writer.lock().await.take() {
            writer
                .send(Message::Close(None))
                .await
                .map_err(|error| ClientError::WebSocket(error.to_string()))?;
        }
        Ok(())
    }
}

/// Outbound payload for `text`, or `None` when there is nothing to send.
#[must_use]
pub fn outbound_payload(text: &str) -> Option<&str> {
    if text.trim().is_empty() { None } else { Some(text) }
}

/// Derive the realtime base from an HTTP base by mirroring transport
/// security: https becomes wss, http becomes ws.
pub fn derive_ws_base(http_base: &str) -> Result<Url> {
    let mut url = Url::parse(http_base.trim().trim_end_matches('/'))?;
    let scheme = match url.scheme() {
        "https" => "wss",
        "http" => "ws",
        other => {
            return Err(ClientError::InvalidUrl(format!(
                "cannot derive a realtime base from scheme {other}"
            )));
        }
    };
    if url.set_scheme(scheme).is_err() {
        return Err(ClientError::InvalidUrl(format!(
            "cannot apply scheme {scheme} to {host}",
            host = url.host_str().unwrap_or("<unknown-host>")
        )));
    }
    Ok(url)
}

/// Validate an explicit realtime base URL (ws or wss).
pub fn validate_ws_base(ws_base: &str) -> Result<Url> {
    let url = Url::parse(ws_base.trim().trim_end_matches('/'))?;
    if url.scheme() != "ws" && url.scheme() != "wss" {
        return Err(ClientError::InvalidUrl(format!(
            "realtime base must use ws:// or wss:// scheme, got: {}",
            url.scheme()
        )));
    }
    Ok(url)
}

/// Channel endpoint for `token`: `<ws-base>/ws/<token>`.
///
/// The token rides in the URL path because the server routes on it, so the
/// full endpoint never belongs in logs or error text.
pub fn channel_url(ws_base: &Url, token: &str) -> Result<Url> {
    if token.is_empty() {
        return Err(ClientError::InvalidUrl(
            "cannot build a channel endpoint without a token".to_string(),
        ));
    }
    let mut url = ws_base.clone();
    {
        let mut segments = url.path_segments_mut().map_err(|()| {
            ClientError::InvalidUrl("realtime base cannot be a base URL".to_string())
        })?;
        segments.pop_if_empty();
        segments.push("ws");
        segments.push(token);
    }
    Ok(url)
}
