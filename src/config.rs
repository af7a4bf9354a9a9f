//! Feed configuration
//!
//! All connection parameters are passed explicitly at construction time;
//! there is no process-wide settings object.

use std::time::Duration;

/// Default base URL for the realtime feed
pub const DEFAULT_BASE_URL: &str = "wss://ws.bitmex.com";

/// Path of the realtime websocket endpoint
pub const REALTIME_PATH: &str = "/realtime";

/// API credential pair for authenticated connections
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Public API key identifier
    pub api_key: String,
    /// API secret used for request signing
    pub api_secret: String,
}

impl Credentials {
    /// Create a credential pair
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .finish()
    }
}

/// Configuration for a realtime feed connection
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Base URL of the exchange (scheme and path are ignored, only the host is used)
    pub base_url: String,
    /// Credentials for authenticated connections; `None` connects anonymously
    pub credentials: Option<Credentials>,
    /// Whether to request server-side heartbeats and run the keepalive timer
    pub heartbeat: bool,
    /// Interval between keepalive pings (only used when `heartbeat` is set)
    pub ping_interval: Duration,
    /// How long an unanswered ping is tolerated before the connection is
    /// considered dead (only used when `heartbeat` is set)
    pub ping_timeout: Duration,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            credentials: None,
            heartbeat: true,
            ping_interval: Duration::from_secs(10),
            ping_timeout: Duration::from_secs(9),
        }
    }
}

impl FeedConfig {
    /// Create a configuration for the given base URL with default options
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    /// Attach credentials, enabling authentication at connect time
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Disable heartbeats and the keepalive timer
    pub fn without_heartbeat(mut self) -> Self {
        self.heartbeat = false;
        self
    }

    /// Whether this configuration authenticates at connect time
    pub fn should_auth(&self) -> bool {
        self.credentials.is_some()
    }

    /// Derive the full websocket URL for the realtime endpoint
    ///
    /// The host is taken from `base_url`; `?heartbeat=true` is appended when
    /// heartbeats are enabled. Plaintext schemes (`ws://`, `http://`) are
    /// preserved so the client can talk to local test servers.
    pub fn ws_url(&self) -> String {
        let (scheme, rest) = split_scheme(&self.base_url);
        let host = rest.split('/').next().unwrap_or(rest);
        let query = if self.heartbeat { "?heartbeat=true" } else { "" };
        format!("{scheme}://{host}{REALTIME_PATH}{query}")
    }
}

fn split_scheme(base_url: &str) -> (&'static str, &str) {
    for (prefix, scheme) in [
        ("wss://", "wss"),
        ("ws://", "ws"),
        ("https://", "wss"),
        ("http://", "ws"),
    ] {
        if let Some(rest) = base_url.strip_prefix(prefix) {
            return (scheme, rest);
        }
    }
    ("wss", base_url)
}
