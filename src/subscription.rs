//! Subscription bookkeeping
//!
//! Control frame construction, wire channel-keys, the dedup set of keys
//! already sent, and subscribe-acknowledgment handling.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};

/// Outbound subscription control frame: `{"op":"subscribe","args":[...]}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlFrame {
    pub op: String,
    pub args: Vec<String>,
}

impl ControlFrame {
    /// Build a subscribe frame for one channel-key
    pub fn subscribe(channel_key: impl Into<String>) -> Self {
        Self {
            op: "subscribe".to_string(),
            args: vec![channel_key.into()],
        }
    }
}

/// Wire-level channel-key for an instrument-qualified channel
pub fn channel_key(channel: &str, instrument: &str) -> String {
    format!("{channel}:{instrument}")
}

/// Set of channel-keys whose subscribe frame has already been sent
///
/// A second subscription to the same key registers another handler but must
/// not produce a duplicate control frame.
#[derive(Debug, Default)]
pub struct SentChannels {
    sent: HashSet<String>,
}

impl SentChannels {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a key, returning `true` only the first time it is seen
    pub fn mark_sent(&mut self, channel_key: &str) -> bool {
        self.sent.insert(channel_key.to_string())
    }

    /// Whether a subscribe frame was already sent for this key
    pub(crate) fn contains(&self, channel_key: &str) -> bool {
        self.sent.contains(channel_key)
    }

    /// Forget a key, e.g. when its subscribe frame failed to send
    pub(crate) fn unmark(&mut self, channel_key: &str) -> bool {
        self.sent.remove(channel_key)
    }

    pub(crate) fn len(&self) -> usize {
        self.sent.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.sent.is_empty()
    }
}

/// Server acknowledgment of a subscribe request
#[derive(Debug, Clone, Deserialize)]
pub struct SubscribeAck {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub subscribe: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Inspect a subscribe acknowledgment, failing on a rejected subscription
///
/// Every ack passes through this check before reaching handlers. A nack is
/// subscription-fatal: the caller cannot proceed meaningfully with an
/// unacknowledged subscription.
pub fn check_subscribe_ack(message: &Value) -> Result<()> {
    let ack: SubscribeAck = serde_json::from_value(message.clone())?;
    if ack.success {
        debug!(channel = ack.subscribe.as_deref(), "subscription acknowledged");
        Ok(())
    } else {
        let channel = ack.subscribe.as_deref().unwrap_or("<unknown channel>");
        let reason = ack.error.as_deref().unwrap_or("no reason given");
        Err(Error::Subscription(format!(
            "server rejected subscription to {channel}: {reason}"
        )))
    }
}
