//! Cryptographic utilities for webhook verification.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Compute HMAC-SHA256 and return the hex-encoded result.
///
/// # Panics
///
/// This function will never panic in practice. The `expect` call is
/// guarded by the invariant that HMAC-SHA256 accepts keys of any size per
/// RFC 2104.
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

/// Verify a Stripe webhook signature header against the payload.
///
/// Stripe signs webhooks with HMAC-SHA256 over `"{timestamp}.{payload}"`
/// and sends a header of the form `t=timestamp,v1=signature[,v1=...]`.
///
/// # Errors
///
/// Returns an error when the header is malformed or no signature matches.
pub fn verify_stripe_signature(
    payload: &str,
    signature_header: &str,
    secret: &str,
) -> Result<(), String> {
    let mut timestamp: Option<&str> = None;
    let mut signatures: Vec<&str> = Vec::new();

    for part in signature_header.split(',') {
        let mut kv = part.splitn(2, '=');
        match (kv.next(), kv.next()) {
            (Some("t"), Some(ts)) => timestamp = Some(ts),
            (Some("v1"), Some(sig)) => signatures.push(sig),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or_else(|| "missing timestamp".to_string())?;

    if signatures.is_empty() {
        return Err("missing v1 signature".to_string());
    }

    let signed_payload = format!("{timestamp}.{payload}");
    let expected = hmac_sha256_hex(secret, &signed_payload);

    if signatures.iter().any(|sig| constant_time_eq(&expected, sig)) {
        Ok(())
    } else {
        Err("signature mismatch".to_string())
    }
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
    fn constant_time_eq_basic() {
        assert!(constant_time_eq("abc", "abc"));
        assert!(constant_time_eq("", ""));
        assert!(!constant_time_eq("abc", "abd"));
        assert!(!constant_time_eq("abc", "ab"));
    }

    #[test]
    fn stripe_signature_roundtrip() {
        let payload = r#"{"id":"evt_1"}"#;
        let secret = "whsec_test";
        let signed = format!("1700000000.{payload}");
        let sig = hmac_sha256_hex(secret, &signed);
        let header = format!("t=1700000000,v1={sig}");

        assert!(verify_stripe_signature(payload, &header, secret).is_ok());
    }

    #[test]
    fn stripe_signature_rejects_tampering() {
        let payload = r#"{"id":"evt_1"}"#;
        let secret = "whsec_test";
        let signed = format!("1700000000.{payload}");
        let sig = hmac_sha256_hex(secret, &signed);
        let header = format!("t=1700000000,v1={sig}");

        assert!(verify_stripe_signature(r#"{"id":"evt_2"}"#, &header, secret).is_err());
        assert!(verify_stripe_signature(payload, "t=1700000000", secret).is_err());
        assert!(verify_stripe_signature(payload, &format!("v1={sig}"), secret).is_err());
    }
}
