//! Request signing for access-key authentication.

use crate::error::{NacosError, Result};
use base64::{Engine, engine::general_purpose::STANDARD};
use hmac::{Hmac, Mac};
use sha1::Sha1;

type HmacSha1 = Hmac<Sha1>;

/// Header carrying the access key id.
pub const ACCESS_KEY_HEADER: &str = "Spas-AccessKey";
/// Header carrying the request signature.
pub const SIGNATURE_HEADER: &str = "Spas-Signature";
/// Header carrying the epoch-millisecond timestamp that was signed.
pub const TIMESTAMP_HEADER: &str = "Timestamp";

/// Headers attached to a signed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeaders {
    /// Access key id
    pub access_key: String,
    /// base64(HMAC-SHA1(secret, canonical string))
    pub signature: String,
    /// Millisecond timestamp included in the canonical string
    pub timestamp: String,
}

/// Canonical string signed for a request against `namespace`/`group`.
pub fn canonical_string(namespace: &str, group: &str, timestamp: &str) -> String {
    format!("{}+{}+{}", namespace, group, timestamp)
}

/// base64-encoded HMAC-SHA1 of `text` keyed by `secret`.
pub fn sign_sha1(text: &str, secret: &str) -> Result<String> {
    let mut mac = HmacSha1::new_from_slice(secret.as_bytes())
        .map_err(|e| NacosError::Auth(format!("Invalid signing key: {}", e)))?;
    mac.update(text.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rfc2202_vector() {
        assert_eq!(
            sign_sha1("what do ya want for nothing?", "Jefe").unwrap(),
            "7/zfauXrL6LSdBbV8YTfnCWafHk="
        );
    }

    #[test]
    fn test_canonical_string() {
        let text = canonical_string("pay-dev", "DEFAULT_GROUP", "1700000000000");
        assert_eq!(text, "pay-dev+DEFAULT_GROUP+1700000000000");
        assert_eq!(sign_sha1(&text, "secret").unwrap(), "OoXADwGxTr0U+vlWl58VMGcy94s=");
    }
}
