//! Message classification and routing keys
//!
//! Every decoded inbound message is classified into a [`RoutingKey`], the
//! topic it is dispatched under. The key is kept as a tagged enum internally
//! and rendered to its canonical string form only at the bus boundary.

use serde_json::Value;

/// Tables that are system-level rather than instrument-scoped
///
/// Messages for these tables route under `action:table`; all other tables
/// are qualified by the instrument symbol of their first data record.
pub const SYSTEM_CHANNELS: &[&str] = &["announcement", "chat", "connected", "publicNotifications"];

/// Routing key for one stream of related messages
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RoutingKey {
    /// System-level table update, routed as `action:table`
    System { action: String, table: String },
    /// Instrument-scoped table update, routed as `action:symbol:table`
    Instrument {
        action: String,
        symbol: String,
        table: String,
    },
    /// Subscription acknowledgment
    Subscribe,
    /// Connection status notice from the server
    Status,
    /// Connection established
    Open,
    /// Keepalive round-trip latency sample
    Latency,
}

impl RoutingKey {
    /// Build an instrument-scoped key
    pub fn instrument(
        action: impl Into<String>,
        symbol: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        RoutingKey::Instrument {
            action: action.into(),
            symbol: symbol.into(),
            table: table.into(),
        }
    }

    /// Canonical topic string used at the bus boundary
    pub fn topic(&self) -> String {
        match self {
            RoutingKey::System { action, table } => format!("{action}:{table}"),
            RoutingKey::Instrument {
                action,
                symbol,
                table,
            } => format!("{action}:{symbol}:{table}"),
            RoutingKey::Subscribe => "subscribe".to_string(),
            RoutingKey::Status => "status".to_string(),
            RoutingKey::Open => "open".to_string(),
            RoutingKey::Latency => "latency".to_string(),
        }
    }
}

impl std::fmt::Display for RoutingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.topic())
    }
}

/// Classify a decoded message into its routing key
///
/// Returns `None` when no key can be formed: unroutable shapes and
/// instrument-scoped updates with an empty `data` sequence are dropped by
/// the dispatcher rather than emitted under a malformed key.
pub fn classify(message: &Value) -> Option<RoutingKey> {
    let object = message.as_object()?;

    if let Some(action) = object.get("action").and_then(Value::as_str) {
        let table = object.get("table").and_then(Value::as_str)?;
        if SYSTEM_CHANNELS.contains(&table) {
            return Some(RoutingKey::System {
                action: action.to_string(),
                table: table.to_string(),
            });
        }
        // Instrument-scoped: qualify by the first record's symbol. An empty
        // data sequence is a valid empty update and yields no key.
        let symbol = object
            .get("data")?
            .as_array()?
            .first()?
            .get("symbol")?
            .as_str()?;
        return Some(RoutingKey::instrument(action, symbol, table));
    }

    if object.contains_key("subscribe") {
        return Some(RoutingKey::Subscribe);
    }
    if object.contains_key("status") {
        return Some(RoutingKey::Status);
    }

    None
}
