//! Signature verification for identity-provider webhooks.
//!
//! Signed content is `{id}.{timestamp}.{body}`; the signature header holds one
//! or more space-separated `v1,<base64 mac>` entries, any of which may match.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::auth::signature;

pub const ID_HEADER: &str = "svix-id";
pub const TIMESTAMP_HEADER: &str = "svix-timestamp";
pub const SIGNATURE_HEADER: &str = "svix-signature";

const SECRET_PREFIX: &str = "whsec_";
const TOLERANCE_SECS: u64 = 5 * 60;

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum WebhookError {
    #[error("webhook signing secret is not valid base64")]
    BadSecret,

    #[error("webhook timestamp is malformed")]
    BadTimestamp,

    #[error("webhook timestamp is outside the tolerance window")]
    StaleTimestamp,

    #[error("no matching webhook signature")]
    NoMatch,
}

fn decode_secret(secret: &str) -> Result<Vec<u8>, WebhookError> {
    let encoded = secret.strip_prefix(SECRET_PREFIX).unwrap_or(secret);
    STANDARD.decode(encoded).map_err(|_| WebhookError::BadSecret)
}

pub fn verify(
    secret: &str,
    msg_id: &str,
    timestamp: &str,
    signature_header: &str,
    body: &[u8],
    now: i64,
) -> Result<(), WebhookError> {
    let key = decode_secret(secret)?;

    let sent_at: i64 = timestamp.parse().map_err(|_| WebhookError::BadTimestamp)?;
    if now.abs_diff(sent_at) > TOLERANCE_SECS {
        return Err(WebhookError::StaleTimestamp);
    }

    let mut signed = format!("{msg_id}.{timestamp}.").into_bytes();
    signed.extend_from_slice(body);

    let matched = signature_header
        .split_whitespace()
        .filter_map(|entry| entry.strip_prefix("v1,"))
        .filter_map(|sig| STANDARD.decode(sig).ok())
        .any(|sig| signature::verify_hmac_sha256(&key, &signed, &sig));

    if matched {
        Ok(())
    } else {
        Err(WebhookError::NoMatch)
    }
}

/// Produces a `v1,<sig>` entry; the counterpart of [`verify`].
#[cfg(test)]
pub fn sign(secret: &str, msg_id: &str, timestamp: &str, body: &[u8]) -> String {
    let key = decode_secret(secret).unwrap();
    let mut signed = format!("{msg_id}.{timestamp}.").into_bytes();
    signed.extend_from_slice(body);
    let mac = signature::hmac_sha256(&key, &signed).unwrap();
    format!("v1,{}", STANDARD.encode(mac))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_MfKQ9r8GKYqrTwjUPD8ILPZIo2LaLaSw";

    #[test]
    fn accepts_matching_signature_among_several() {
        let body = br#"{"type":"user.created"}"#;
        let good = sign(SECRET, "msg_1", "1700000000", body);
        let header = format!("v1,AAAA {good}");
        assert_eq!(verify(SECRET, "msg_1", "1700000000", &header, body, 1_700_000_010), Ok(()));
    }

    #[test]
    fn rejects_tampered_body() {
        let good = sign(SECRET, "msg_1", "1700000000", b"{}");
        assert_eq!(
            verify(SECRET, "msg_1", "1700000000", &good, b"{ }", 1_700_000_000),
            Err(WebhookError::NoMatch)
        );
    }

    #[test]
    fn rejects_stale_timestamp() {
        let good = sign(SECRET, "msg_1", "1700000000", b"{}");
        assert_eq!(
            verify(SECRET, "msg_1", "1700000000", &good, b"{}", 1_700_000_000 + 301),
            Err(WebhookError::StaleTimestamp)
        );
    }

    #[test]
    fn extreme_timestamps_are_stale() {
        for timestamp in ["-9223372036854775808", "9223372036854775807"] {
            assert_eq!(
                verify(SECRET, "msg_1", timestamp, "v1,AAAA", b"{}", 1_700_000_000),
                Err(WebhookError::StaleTimestamp)
            );
        }
    }

    #[test]
    fn rejects_malformed_timestamp() {
        assert_eq!(
            verify(SECRET, "msg_1", "yesterday", "v1,xyz", b"{}", 0),
            Err(WebhookError::BadTimestamp)
        );
    }
}
