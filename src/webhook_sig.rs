//! Billing webhook signature verification.
//!
//! The provider signs the raw body with HMAC-SHA256 over `"{t}.{payload}"`
//! and sends `Stripe-Signature: t=<unix>,v1=<hex>[,v1=<hex>...]`. Signature
//! bytes are compared in constant time; the timestamp must fall inside the
//! configured tolerance window to bound replays.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Compute the hex signature for `payload` at `timestamp`. Also used by
/// tests to forge valid headers.
pub fn sign(secret: &str, timestamp: i64, payload: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Build a header value in the provider's format.
pub fn signature_header(secret: &str, timestamp: i64, payload: &[u8]) -> String {
    format!("t={timestamp},v1={}", sign(secret, timestamp, payload))
}

/// Verify `header` against `payload`. `now` is passed in so the tolerance
/// window is testable.
pub fn verify(secret: &str, header: &str, payload: &[u8], tolerance_secs: i64, now: i64) -> bool {
    let mut timestamp: Option<i64> = None;
    let mut candidates: Vec<String> = Vec::new();

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse().ok(),
            Some(("v1", value)) => candidates.push(value.to_string()),
            _ => {}
        }
    }

    let Some(timestamp) = timestamp else {
        return false;
    };
    if candidates.is_empty() {
        return false;
    }
    if (now - timestamp).abs() > tolerance_secs {
        return false;
    }

    let expected = sign(secret, timestamp, payload);
    let expected_bytes = expected.as_bytes();

    candidates.iter().any(|candidate| {
        candidate.len() == expected.len()
            && candidate.as_bytes().ct_eq(expected_bytes).into()
    })
}
