use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use hmac::{Hmac, Mac};
use once_cell::sync::Lazy;
use sha2::Sha256;
use std::collections::HashSet;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Topics this service subscribes to. Anything else is still logged, but
/// flagged as unexpected.
static ALLOWED_TOPICS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    HashSet::from([
        "orders/create",
        "orders/updated",
        "orders/paid",
        "orders/fulfilled",
        "orders/cancelled",
        "products/create",
        "products/update",
        "products/delete",
        "inventory_levels/update",
        "inventory_levels/connect",
    ])
});

pub fn topic_allowed(topic: &str) -> bool {
    ALLOWED_TOPICS.contains(topic)
}

#[derive(Debug, Error, PartialEq)]
pub enum WebhookAuthError {
    #[error("missing webhook signature header")]
    MissingSignature,
    #[error("webhook signature mismatch")]
    InvalidSignature,
}

/// Verify the `X-Shopify-Hmac-SHA256` header against the raw request body.
///
/// The header carries a base64-encoded HMAC-SHA256 of the exact bytes
/// received, keyed with the shared webhook secret. Verification happens
/// before any JSON parsing and fails closed: a missing, undecodable, or
/// mismatched signature all reject. The comparison is constant-time.
pub fn verify_webhook_hmac(
    body: &[u8],
    hmac_header: &str,
    secret: &str,
) -> Result<(), WebhookAuthError> {
    if hmac_header.is_empty() {
        return Err(WebhookAuthError::MissingSignature);
    }
    let claimed = BASE64
        .decode(hmac_header.trim())
        .map_err(|_| WebhookAuthError::InvalidSignature)?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| WebhookAuthError::InvalidSignature)?;
    mac.update(body);
    mac.verify_slice(&claimed)
        .map_err(|_| WebhookAuthError::InvalidSignature)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(body: &[u8], secret: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        BASE64.encode(mac.finalize().into_bytes())
    }

    #[test]
    fn valid_signature_accepted() {
        let body = br#"{"id":9647282618663,"title":"Loafer"}"#;
        let sig = sign(body, "shpss_secret");
        assert!(verify_webhook_hmac(body, &sig, "shpss_secret").is_ok());
    }

    #[test]
    fn missing_signature_rejected() {
        let body = b"{}";
        assert_eq!(
            verify_webhook_hmac(body, "", "shpss_secret"),
            Err(WebhookAuthError::MissingSignature)
        );
    }

    #[test]
    fn flipped_body_bit_rejected() {
        let body = b"{\"id\":42}".to_vec();
        let sig = sign(&body, "shpss_secret");
        let mut tampered = body.clone();
        tampered[2] ^= 0x01;
        assert_eq!(
            verify_webhook_hmac(&tampered, &sig, "shpss_secret"),
            Err(WebhookAuthError::InvalidSignature)
        );
    }

    #[test]
    fn flipped_signature_bit_rejected() {
        let body = b"{\"id\":42}";
        let sig = sign(body, "shpss_secret");
        let mut raw = BASE64.decode(&sig).unwrap();
        raw[0] ^= 0x80;
        let tampered = BASE64.encode(raw);
        assert_eq!(
            verify_webhook_hmac(body, &tampered, "shpss_secret"),
            Err(WebhookAuthError::InvalidSignature)
        );
    }

    #[test]
    fn wrong_secret_rejected() {
        let body = b"{\"id\":42}";
        let sig = sign(body, "shpss_secret");
        assert!(verify_webhook_hmac(body, &sig, "other_secret").is_err());
    }

    #[test]
    fn garbage_base64_rejected() {
        assert_eq!(
            verify_webhook_hmac(b"{}", "!!not-base64!!", "shpss_secret"),
            Err(WebhookAuthError::InvalidSignature)
        );
    }

    #[test]
    fn topic_allow_list() {
        assert!(topic_allowed("products/update"));
        assert!(topic_allowed("inventory_levels/connect"));
        assert!(!topic_allowed("collections/update"));
    }
}
