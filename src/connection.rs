//! Feed connection lifecycle and message dispatch
//!
//! [`FeedClient`] owns the websocket transport, an [`EventBus`] for handler
//! registration, and the dedup set of sent channel-keys. `connect()` runs
//! the receive loop on the calling task: every inbound frame is decoded,
//! classified into a routing key, and emitted on the bus synchronously.
//! There is no reconnect policy here; a supervisor that owns the client
//! decides what to do when `connect()` returns.

use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, RwLock};
use tokio::time::{interval_at, Instant};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        client::IntoClientRequest,
        http::{HeaderName, HeaderValue},
        Error as WsError, Message,
    },
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, warn};

use serde::Serialize;
use serde_json::Value;

use crate::auth;
use crate::bus::EventBus;
use crate::config::FeedConfig;
use crate::error::{Error, Result};
use crate::routing::{classify, RoutingKey};
use crate::subscription::{channel_key, check_subscribe_ack, ControlFrame, SentChannels};

/// Connection state of the feed client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected
    Disconnected,
    /// Handshake in progress
    Connecting,
    /// Connected, run loop active
    Open,
    /// Close requested by the caller
    Closing,
    /// Connection ended cleanly
    Closed,
    /// Connection ended with a transport failure
    Errored,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "Disconnected"),
            ConnectionState::Connecting => write!(f, "Connecting"),
            ConnectionState::Open => write!(f, "Open"),
            ConnectionState::Closing => write!(f, "Closing"),
            ConnectionState::Closed => write!(f, "Closed"),
            ConnectionState::Errored => write!(f, "Errored"),
        }
    }
}

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsStream = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Client for the realtime market-data feed
///
/// Cloning is cheap and clones share all state, so a client can be handed
/// to the task running `connect()` while the original keeps subscribing.
pub struct FeedClient {
    config: FeedConfig,
    state: Arc<RwLock<ConnectionState>>,
    sink: Arc<Mutex<Option<WsSink>>>,
    bus: Arc<Mutex<EventBus>>,
    sent_channels: Arc<Mutex<SentChannels>>,
}

impl std::fmt::Debug for FeedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Clone for FeedClient {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            state: Arc::clone(&self.state),
            sink: Arc::clone(&self.sink),
            bus: Arc::clone(&self.bus),
            sent_channels: Arc::clone(&self.sent_channels),
        }
    }
}

impl FeedClient {
    /// Create a client for the given configuration
    pub fn new(config: FeedConfig) -> Self {
        Self {
            config,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            sink: Arc::new(Mutex::new(None)),
            bus: Arc::new(Mutex::new(EventBus::new())),
            sent_channels: Arc::new(Mutex::new(SentChannels::new())),
        }
    }

    /// The configuration this client was built with
    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    /// Current connection state
    pub async fn state(&self) -> ConnectionState {
        *self.state.read().await
    }

    /// True only when the connection is open with a live socket
    pub async fn is_connected(&self) -> bool {
        *self.state.read().await == ConnectionState::Open && self.sink.lock().await.is_some()
    }

    async fn set_state(&self, state: ConnectionState) {
        *self.state.write().await = state;
    }

    /// Register a handler for an exact topic
    ///
    /// Topics are the fixed literals (`open`, `subscribe`, `status`,
    /// `latency`) and the routing keys formed by classification, e.g.
    /// `update:XBTUSD:trade`.
    pub async fn on<F>(&self, topic: impl Into<String>, handler: F)
    where
        F: FnMut(&Value) -> Result<()> + Send + 'static,
    {
        self.bus.lock().await.on(topic, handler);
    }

    /// Connect and run the receive loop until the connection ends
    ///
    /// Blocks the calling task for the lifetime of the connection. Returns
    /// `Ok(())` on a clean close, a [`Error::Connection`] on transport
    /// failure, [`Error::Subscription`] on a rejected subscription, or any
    /// error raised by a registered handler.
    pub async fn connect(&self) -> Result<()> {
        {
            let state = *self.state.read().await;
            if state == ConnectionState::Open || state == ConnectionState::Connecting {
                return Err(Error::WebSocket(format!("already connected ({state})")));
            }
        }
        self.set_state(ConnectionState::Connecting).await;

        let url = self.config.ws_url();
        debug!(%url, auth = self.config.should_auth(), "connecting");

        let mut request = url
            .into_client_request()
            .map_err(|e| Error::WebSocket(format!("invalid url: {e}")))?;
        for (name, value) in auth::auth_headers(self.config.credentials.as_ref())? {
            let value = HeaderValue::from_str(&value)
                .map_err(|e| Error::Auth(format!("invalid header value: {e}")))?;
            request
                .headers_mut()
                .insert(HeaderName::from_static(name), value);
        }

        let (ws_stream, _response) = match connect_async(request).await {
            Ok(ok) => ok,
            Err(e) => {
                self.set_state(ConnectionState::Errored).await;
                return Err(map_connect_error(e));
            }
        };

        let (sink, stream) = ws_stream.split();
        *self.sink.lock().await = Some(sink);
        self.set_state(ConnectionState::Open).await;
        info!("websocket opened");

        let result = match self.emit(&RoutingKey::Open.topic(), &Value::Null).await {
            Ok(()) => self.run_loop(stream).await,
            Err(e) => Err(e),
        };
        *self.sink.lock().await = None;
        // Dispatch failures (rejected subscription, handler error) abort the
        // loop without passing through a transport callback; the connection
        // is dead all the same and must not keep reporting Open.
        if result.is_err() && *self.state.read().await == ConnectionState::Open {
            self.set_state(ConnectionState::Errored).await;
        }
        result
    }

    /// Receive loop: reads frames, answers pings, drives the keepalive
    /// timer, and dispatches decoded messages to registered handlers.
    async fn run_loop(&self, mut stream: WsStream) -> Result<()> {
        let mut ping_timer = interval_at(
            Instant::now() + self.config.ping_interval,
            self.config.ping_interval,
        );
        let mut last_ping: Option<Instant> = None;
        let mut awaiting_pong = false;

        loop {
            tokio::select! {
                _ = ping_timer.tick(), if self.config.heartbeat => {
                    if awaiting_pong {
                        // The deadline stays anchored to the unanswered ping;
                        // sending another one here would keep pushing it out.
                        let overdue = last_ping
                            .map(|sent| sent.elapsed() >= self.config.ping_timeout)
                            .unwrap_or(false);
                        if overdue {
                            self.set_state(ConnectionState::Errored).await;
                            return Err(Error::Connection(format!(
                                "keepalive timeout: no pong within {:?}",
                                self.config.ping_timeout
                            )));
                        }
                    } else {
                        self.send_raw(Message::Ping(b"ping".to_vec())).await?;
                        last_ping = Some(Instant::now());
                        awaiting_pong = true;
                    }
                }
                frame = stream.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        self.dispatch_frame(&text).await?;
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        self.send_raw(Message::Pong(payload)).await?;
                    }
                    Some(Ok(Message::Pong(_))) => {
                        awaiting_pong = false;
                        if let Some(sent) = last_ping {
                            let latency_ms = sent.elapsed().as_secs_f64() * 1000.0;
                            debug!(latency_ms, "pong received");
                            self.emit(&RoutingKey::Latency.topic(), &Value::from(latency_ms))
                                .await?;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("websocket closed");
                        self.set_state(ConnectionState::Closed).await;
                        return Ok(());
                    }
                    Some(Ok(_)) => {
                        // Binary and raw frames are not part of the feed protocol.
                        debug!("ignoring non-text frame");
                    }
                    Some(Err(e)) => {
                        self.set_state(ConnectionState::Errored).await;
                        return Err(Error::Connection(format!("transport failure: {e}")));
                    }
                }
            }
        }
    }

    /// Decode, classify, and emit one inbound text frame
    ///
    /// Unparseable and unroutable frames are dropped; a rejected
    /// subscription ack or a failing handler aborts the run loop.
    async fn dispatch_frame(&self, text: &str) -> Result<()> {
        let message: Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "dropping unparseable frame");
                return Ok(());
            }
        };

        let Some(key) = classify(&message) else {
            debug!("dropping unroutable message");
            return Ok(());
        };

        // Every subscribe ack passes the fixed success check before any
        // handler sees it.
        if key == RoutingKey::Subscribe {
            check_subscribe_ack(&message)?;
        }

        self.emit(&key.topic(), &message).await
    }

    async fn emit(&self, topic: &str, payload: &Value) -> Result<()> {
        self.bus.lock().await.emit(topic, payload)
    }

    /// Serialize and send a control frame over the transport
    ///
    /// Fails with a transport error when the connection is not open.
    pub async fn send_control_frame<T: Serialize>(&self, frame: &T) -> Result<()> {
        if *self.state.read().await != ConnectionState::Open {
            return Err(Error::WebSocket("not connected".to_string()));
        }
        let text = serde_json::to_string(frame)?;
        self.send_raw(Message::Text(text)).await
    }

    async fn send_raw(&self, message: Message) -> Result<()> {
        let mut guard = self.sink.lock().await;
        match guard.as_mut() {
            Some(sink) => sink
                .send(message)
                .await
                .map_err(|e| Error::WebSocket(format!("failed to send: {e}"))),
            None => Err(Error::WebSocket("no connection".to_string())),
        }
    }

    /// Subscribe to a channel by its wire name
    ///
    /// The handler is registered under `channel` as its topic. The subscribe
    /// control frame goes out only the first time this channel is requested;
    /// later calls just add handlers.
    pub async fn subscribe<F>(&self, channel: impl Into<String>, handler: F) -> Result<()>
    where
        F: FnMut(&Value) -> Result<()> + Send + 'static,
    {
        let channel = channel.into();
        self.on(channel.clone(), handler).await;
        self.send_subscribe_once(channel).await
    }

    /// Subscribe to an instrument-qualified channel for one action
    ///
    /// The wire channel-key is `channel:instrument`; the handler is
    /// registered under the routing key `action:instrument:channel` so
    /// classified updates reach it. Dedup applies to the wire key: many
    /// action handlers can share one wire subscription.
    pub async fn subscribe_action<F>(
        &self,
        action: &str,
        channel: &str,
        instrument: &str,
        handler: F,
    ) -> Result<()>
    where
        F: FnMut(&Value) -> Result<()> + Send + 'static,
    {
        let key = RoutingKey::instrument(action, instrument, channel);
        self.on(key.topic(), handler).await;
        self.send_subscribe_once(channel_key(channel, instrument)).await
    }

    async fn send_subscribe_once(&self, channel_key: String) -> Result<()> {
        let first = self.sent_channels.lock().await.mark_sent(&channel_key);
        if !first {
            debug!(channel = %channel_key, "already subscribed, handler added");
            return Ok(());
        }

        debug!(channel = %channel_key, "subscribing");
        if let Err(e) = self
            .send_control_frame(&ControlFrame::subscribe(channel_key.clone()))
            .await
        {
            // The frame never went out; let a later attempt resend it.
            self.sent_channels.lock().await.unmark(&channel_key);
            return Err(e);
        }
        Ok(())
    }

    /// Request a clean shutdown of the connection
    ///
    /// Sends a close frame; the run loop observes the close and transitions
    /// to `Closed`. A no-op when not connected.
    pub async fn close(&self) -> Result<()> {
        let mut guard = self.sink.lock().await;
        if let Some(sink) = guard.as_mut() {
            self.set_state(ConnectionState::Closing).await;
            let _ = sink.send(Message::Close(None)).await;
            let _ = sink.close().await;
        }
        Ok(())
    }
}

fn map_connect_error(e: WsError) -> Error {
    match e {
        WsError::Io(io_err) => Error::Connection(format!("io error: {io_err}")),
        WsError::Tls(tls_err) => Error::Connection(format!("tls error: {tls_err}")),
        WsError::ConnectionClosed => Error::Connection("connection closed".to_string()),
        WsError::AlreadyClosed => Error::Connection("already closed".to_string()),
        WsError::Protocol(p) => Error::Connection(format!("protocol error: {p}")),
        WsError::Url(u) => Error::WebSocket(format!("url error: {u}")),
        WsError::Http(resp) => Error::Connection(format!("http error: status {}", resp.status())),
        WsError::HttpFormat(e) => Error::WebSocket(format!("http format error: {e}")),
        _ => Error::Connection(format!("websocket error: {e}")),
    }
}
