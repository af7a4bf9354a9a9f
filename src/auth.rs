//! Request signing for authenticated connections
//!
//! The exchange authenticates websocket handshakes with three headers: a
//! nonce, an HMAC-SHA256 signature over `verb + path + nonce + body`, and
//! the public API key. The header set is computed fresh for every connect
//! attempt; a nonce must never be reused with the same key.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::config::{Credentials, REALTIME_PATH};
use crate::error::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

static LAST_NONCE: AtomicU64 = AtomicU64::new(0);

/// Generate a strictly increasing, time-derived nonce
///
/// Based on the current time in milliseconds, bumped past the previously
/// issued value when calls land within the same millisecond. Monotonic for
/// the lifetime of the process.
pub fn generate_nonce() -> u64 {
    let now_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);

    loop {
        let last = LAST_NONCE.load(Ordering::SeqCst);
        let next = now_ms.max(last + 1);
        if LAST_NONCE
            .compare_exchange(last, next, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            return next;
        }
    }
}

/// Compute the hex-encoded HMAC-SHA256 signature for a signed request
///
/// The signed payload is the concatenation of the HTTP verb, the request
/// path, the decimal nonce, and the request body (empty for the websocket
/// handshake).
pub fn generate_signature(
    secret: &str,
    verb: &str,
    path: &str,
    nonce: u64,
    body: &str,
) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| Error::Auth(format!("invalid secret key: {e}")))?;
    mac.update(verb.as_bytes());
    mac.update(path.as_bytes());
    mac.update(nonce.to_string().as_bytes());
    mac.update(body.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Build the handshake auth headers for the given credentials
///
/// Returns an empty set when no credentials are supplied. Never caches:
/// every call draws a fresh nonce and recomputes the signature.
pub fn auth_headers(credentials: Option<&Credentials>) -> Result<Vec<(&'static str, String)>> {
    let Some(creds) = credentials else {
        return Ok(Vec::new());
    };

    let nonce = generate_nonce();
    let signature = generate_signature(&creds.api_secret, "GET", REALTIME_PATH, nonce, "")?;

    Ok(vec![
        ("api-nonce", nonce.to_string()),
        ("api-signature", signature),
        ("api-key", creds.api_key.clone()),
    ])
}
