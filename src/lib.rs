//! Async client for the BitMEX realtime websocket feed
//!
//! Connects to the exchange's persistent websocket endpoint, optionally
//! authenticating with a signed header set, and routes every inbound
//! message to handlers by a derived topic:
//! - system tables route under `action:table`
//! - instrument tables route under `action:symbol:table`
//! - acknowledgments and notices route under the fixed topics `subscribe`,
//!   `status`, `open`, and `latency`
//!
//! # Example
//!
//! ```ignore
//! use bitmex_feed::{FeedClient, FeedConfig};
//!
//! let feed = FeedClient::new(FeedConfig::default());
//!
//! // Run the connection on its own task; the feed is Clone.
//! let runner = feed.clone();
//! tokio::spawn(async move { runner.connect().await });
//!
//! // One wire subscription, dispatched per action and instrument.
//! feed.subscribe_action("update", "trade", "XBTUSD", |msg| {
//!     println!("trade update: {msg}");
//!     Ok(())
//! })
//! .await?;
//! ```

pub mod auth;
pub mod bus;
pub mod config;
pub mod connection;
pub mod error;
pub mod routing;
pub mod subscription;

pub use bus::EventBus;
pub use config::{Credentials, FeedConfig, DEFAULT_BASE_URL, REALTIME_PATH};
pub use connection::{ConnectionState, FeedClient};
pub use error::{Error, Result};
pub use routing::{classify, RoutingKey, SYSTEM_CHANNELS};
pub use subscription::{channel_key, ControlFrame};
