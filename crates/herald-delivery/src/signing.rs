//! HMAC-SHA256 payload signing.
//!
//! Every delivery carries `X-Webhook-Signature: <hex>`, the lowercase hex
//! HMAC-SHA256 of the exact request body bytes keyed with the endpoint's
//! secret. Receivers recompute it over the raw body they received.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the payload signature.
pub const SIGNATURE_HEADER: &str = "X-Webhook-Signature";

/// Signature generation and verification errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    /// Secret key rejected by the MAC.
    #[error("invalid secret key")]
    InvalidSecret,
    /// Signature is not hex-encoded.
    #[error("invalid signature format: {0}")]
    InvalidFormat(String),
}

/// Signs `payload` with `secret`, returning the lowercase hex digest.
///
/// # Example
///
/// ```
/// use herald_delivery::signing::sign;
///
/// let signature = sign(b"{\"id\":\"1\"}", b"whsec_example").unwrap();
/// assert_eq!(signature.len(), 64);
/// ```
pub fn sign(payload: &[u8], secret: &[u8]) -> Result<String, SignatureError> {
    let mut mac = HmacSha256::new_from_slice(secret).map_err(|_| SignatureError::InvalidSecret)?;
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Verifies a signature over `payload` in constant time.
///
/// Accepts raw hex or the `sha256=<hex>` form.
pub fn verify(payload: &[u8], signature: &str, secret: &[u8]) -> Result<bool, SignatureError> {
    let hex_signature = signature.strip_prefix("sha256=").unwrap_or(signature);
    let expected = hex::decode(hex_signature)
        .map_err(|e| SignatureError::InvalidFormat(format!("{e}: {signature}")))?;

    let mut mac = HmacSha256::new_from_slice(secret).map_err(|_| SignatureError::InvalidSecret)?;
    mac.update(payload);
    Ok(mac.verify_slice(&expected).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_rfc4231_test_vector() {
        let signature = sign(b"what do ya want for nothing?", b"Jefe").unwrap();
        assert_eq!(
            signature,
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn signing_is_deterministic() {
        let first = sign(b"payload", b"secret").unwrap();
        let second = sign(b"payload", b"secret").unwrap();

        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn different_secrets_give_different_signatures() {
        assert_ne!(sign(b"payload", b"one").unwrap(), sign(b"payload", b"two").unwrap());
    }

    #[test]
    fn verify_accepts_raw_and_prefixed_forms() {
        let signature = sign(b"payload", b"secret").unwrap();

        assert!(verify(b"payload", &signature, b"secret").unwrap());
        assert!(verify(b"payload", &format!("sha256={signature}"), b"secret").unwrap());
    }

    #[test]
    fn verify_rejects_tampering() {
        let signature = sign(b"payload", b"secret").unwrap();

        assert!(!verify(b"payload!", &signature, b"secret").unwrap());
        assert!(!verify(b"payload", &signature, b"other").unwrap());
    }

    #[test]
    fn verify_rejects_non_hex() {
        assert!(matches!(
            verify(b"payload", "not-hex", b"secret"),
            Err(SignatureError::InvalidFormat(_))
        ));
    }
}
