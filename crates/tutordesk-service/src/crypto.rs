//! Cryptographic utilities for webhook verification.
//!
//! The meeting provider signs every webhook delivery with HMAC-SHA256 over
//! `v0:{timestamp}:{raw body}`; the same primitive answers the provider's
//! URL-validation handshake.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Compute HMAC-SHA256 and return hex-encoded result.
///
/// # Panics
///
/// This function will never panic in practice. The `expect` call is guarded by
/// the invariant that HMAC-SHA256 accepts keys of any size per RFC 2104.
#[must_use]
pub fn hmac_sha256_hex(secret: &str, message: &str) -> String {
    // INVARIANT: HMAC-SHA256 accepts keys of any size per RFC 2104, so
    // `new_from_slice` only fails if the Hmac implementation is broken.
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC-SHA256 accepts any key size");
    mac.update(message.as_bytes());
    let result = mac.finalize();

    hex::encode(result.into_bytes())
}

/// Compute the `v0=<hex>` signature the meeting provider sends in its
/// signature header.
#[must_use]
pub fn meeting_signature(secret: &str, timestamp: &str, body: &str) -> String {
    let message = format!("v0:{timestamp}:{body}");
    format!("v0={}", hmac_sha256_hex(secret, &message))
}

/// Constant-time string comparison to prevent timing attacks.
#[must_use]
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hmac_sha256_produces_correct_length() {
        let result = hmac_sha256_hex("key", "The quick brown fox jumps over the lazy dog");
        assert_eq!(result.len(), 64); // SHA256 = 32 bytes = 64 hex chars
    }

    #[test]
    fn hmac_sha256_is_deterministic() {
        let result1 = hmac_sha256_hex("secret", "message");
        let result2 = hmac_sha256_hex("secret", "message");
        assert_eq!(result1, result2);
    }

    #[test]
    fn meeting_signature_has_version_prefix() {
        let sig = meeting_signature("secret", "1700000000", "{}");
        assert!(sig.starts_with("v0="));
        assert_eq!(sig.len(), 3 + 64);
    }

    #[test]
    fn meeting_signature_covers_timestamp() {
        let a = meeting_signature("secret", "1700000000", "{}");
        let b = meeting_signature("secret", "1700000001", "{}");
        assert_ne!(a, b);
    }

    #[test]
    fn constant_time_eq_equal_strings() {
        assert!(constant_time_eq("abc", "abc"));
        assert!(constant_time_eq("", ""));
    }

    #[test]
    fn constant_time_eq_different_strings() {
        assert!(!constant_time_eq("abc", "abd"));
        assert!(!constant_time_eq("abc", "ab"));
        assert!(!constant_time_eq("abc", "ABC"));
    }
}
