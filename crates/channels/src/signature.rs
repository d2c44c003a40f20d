//! Webhook signature verification.
//!
//! Vendors sign webhook bodies with an HMAC over the raw bytes and send the
//! result as `<algorithm>=<hex digest>`. Verification is constant-time via
//! `Mac::verify_slice`; any malformation (missing prefix, bad hex, length
//! mismatch) yields `false` rather than an error.

use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;
type HmacSha1 = Hmac<Sha1>;

/// HMAC algorithm used by a vendor to sign webhook bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    /// `sha256=<hex>` - used by the POS and the online storefront.
    Sha256,
    /// `sha1=<hex>` - used by the delivery marketplace.
    Sha1,
}

impl SignatureAlgorithm {
    /// The header prefix this algorithm produces, including the `=`.
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Sha256 => "sha256=",
            Self::Sha1 => "sha1=",
        }
    }
}

/// Compute the signature header value for a body.
///
/// Produces `<prefix><hex digest>`, the exact string a vendor would send.
pub fn sign(algorithm: SignatureAlgorithm, secret: &str, body: &[u8]) -> String {
    let digest = match algorithm {
        SignatureAlgorithm::Sha256 => {
            let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
                .unwrap_or_else(|_| unreachable!("HMAC accepts keys of any length"));
            mac.update(body);
            hex::encode(mac.finalize().into_bytes())
        }
        SignatureAlgorithm::Sha1 => {
            let mut mac = HmacSha1::new_from_slice(secret.as_bytes())
                .unwrap_or_else(|_| unreachable!("HMAC accepts keys of any length"));
            mac.update(body);
            hex::encode(mac.finalize().into_bytes())
        }
    };
    format!("{}{}", algorithm.prefix(), digest)
}

/// Verify a signature header against a body.
///
/// Returns `false` for a missing/mismatched prefix, non-hex payload, wrong
/// digest length, or digest mismatch. The digest comparison is constant-time.
pub fn verify(algorithm: SignatureAlgorithm, secret: &str, body: &[u8], header: &str) -> bool {
    let Some(hex_digest) = header.strip_prefix(algorithm.prefix()) else {
        return false;
    };
    let Ok(expected) = hex::decode(hex_digest) else {
        return false;
    };

    match algorithm {
        SignatureAlgorithm::Sha256 => {
            let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
                .unwrap_or_else(|_| unreachable!("HMAC accepts keys of any length"));
            mac.update(body);
            mac.verify_slice(&expected).is_ok()
        }
        SignatureAlgorithm::Sha1 => {
            let mut mac = HmacSha1::new_from_slice(secret.as_bytes())
                .unwrap_or_else(|_| unreachable!("HMAC accepts keys of any length"));
            mac.update(body);
            mac.verify_slice(&expected).is_ok()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_verify_round_trip_sha256() {
        let body = br#"{"item_id":"abc","quantity":4}"#;
        let header = sign(SignatureAlgorithm::Sha256, "topsecret", body);
        assert!(header.starts_with("sha256="));
        assert!(verify(SignatureAlgorithm::Sha256, "topsecret", body, &header));
    }

    #[test]
    fn test_sign_verify_round_trip_sha1() {
        let body = b"order updated";
        let header = sign(SignatureAlgorithm::Sha1, "s1", body);
        assert!(header.starts_with("sha1="));
        assert!(verify(SignatureAlgorithm::Sha1, "s1", body, &header));
    }

    #[test]
    fn test_wrong_secret_fails() {
        let body = b"payload";
        let header = sign(SignatureAlgorithm::Sha256, "right", body);
        assert!(!verify(SignatureAlgorithm::Sha256, "wrong", body, &header));
    }

    #[test]
    fn test_tampered_body_fails() {
        let header = sign(SignatureAlgorithm::Sha256, "s", b"original");
        assert!(!verify(SignatureAlgorithm::Sha256, "s", b"tampered", &header));
    }

    #[test]
    fn test_missing_prefix_fails() {
        let body = b"payload";
        let header = sign(SignatureAlgorithm::Sha256, "s", body);
        let bare = header.trim_start_matches("sha256=");
        assert!(!verify(SignatureAlgorithm::Sha256, "s", body, bare));
    }

    #[test]
    fn test_wrong_prefix_fails() {
        let body = b"payload";
        let digest = sign(SignatureAlgorithm::Sha1, "s", body);
        let relabeled = digest.replace("sha1=", "sha256=");
        assert!(!verify(SignatureAlgorithm::Sha256, "s", body, &relabeled));
    }

    #[test]
    fn test_non_hex_digest_fails() {
        assert!(!verify(
            SignatureAlgorithm::Sha256,
            "s",
            b"payload",
            "sha256=not-hex-at-all"
        ));
    }

    #[test]
    fn test_truncated_digest_fails() {
        let body = b"payload";
        let header = sign(SignatureAlgorithm::Sha256, "s", body);
        assert!(!verify(SignatureAlgorithm::Sha256, "s", body, &header[..20]));
    }
}
