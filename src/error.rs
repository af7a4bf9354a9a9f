//! Error types for the feed client

use thiserror::Error;

/// Result type alias for feed operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when using the feed client
#[derive(Error, Debug)]
pub enum Error {
    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Connection-fatal transport failure
    ///
    /// The connection is gone and will not be retried by the client;
    /// reconnecting is the responsibility of whoever owns the client.
    #[error("connection error: {0}")]
    Connection(String),

    /// The server rejected a subscription request
    #[error("subscription error: {0}")]
    Subscription(String),

    /// WebSocket transport misuse (e.g. sending while not connected)
    #[error("websocket error: {0}")]
    WebSocket(String),

    /// Authentication error
    #[error("authentication error: {0}")]
    Auth(String),

    /// Invalid parameter error
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_connection() {
        let err = Error::Connection("io error: broken pipe".to_string());
        assert_eq!(err.to_string(), "connection error: io error: broken pipe");
    }

    #[test]
    fn test_error_display_subscription() {
        let err = Error::Subscription("rejected: trade:XBTUSD".to_string());
        assert_eq!(err.to_string(), "subscription error: rejected: trade:XBTUSD");
    }

    #[test]
    fn test_error_display_websocket() {
        let err = Error::WebSocket("not connected".to_string());
        assert_eq!(err.to_string(), "websocket error: not connected");
    }

    #[test]
    fn test_error_display_auth() {
        let err = Error::Auth("invalid secret".to_string());
        assert_eq!(err.to_string(), "authentication error: invalid secret");
    }

    #[test]
    fn test_error_display_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(err.to_string().starts_with("JSON error:"));
        assert!(matches!(err, Error::Json(_)));
    }

    #[test]
    fn test_connection_and_subscription_are_distinguishable() {
        // The two fatal conditions must be separate kinds, not one generic failure.
        let conn = Error::Connection("x".to_string());
        let sub = Error::Subscription("x".to_string());
        assert!(matches!(conn, Error::Connection(_)));
        assert!(matches!(sub, Error::Subscription(_)));
        assert!(!matches!(conn, Error::Subscription(_)));
    }

    #[test]
    fn test_result_type_alias() {
        fn returns_ok() -> Result<i32> {
            Ok(42)
        }

        fn returns_err() -> Result<i32> {
            Err(Error::WebSocket("test error".to_string()))
        }

        assert!(returns_ok().is_ok());
        assert!(returns_err().is_err());
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
    }

    #[test]
    fn test_error_debug_impl() {
        let err = Error::Subscription("test".to_string());
        let debug_str = format!("{:?}", err);
        assert!(debug_str.contains("Subscription"));
        assert!(debug_str.contains("test"));
    }
}
