//! Signed QR credential derivation and offline verification.
//!
//! An approved permit is printed with a compact, self-verifying token so a
//! field scanner can check authenticity and validity without a database
//! round-trip. The token is a colon-delimited ASCII string signed with a
//! server-held HMAC-SHA256 secret; the digest is truncated to keep the QR
//! code small while remaining forgery-resistant.
//!
//! Current format (5 fields):
//!
//! ```text
//! GP1:<permit uuid>:<start|null>:<end|null>:<signature>
//! ```
//!
//! where the dates are `YYYY-MM-DD` or the literal `null`, and the signature
//! is the first [`SIGNATURE_BYTES`] bytes of the HMAC over
//! `<permit uuid>:<start|null>:<end|null>`, lowercase hex.
//!
//! The legacy 4-field format (`GP0:<permit uuid>:<expiry epoch-millis>:sig`)
//! is still accepted: physical documents issued before validity windows
//! existed must remain scannable.
//!
//! All date comparisons are by calendar date in UTC, so issuance and
//! scanning locales cannot disagree by a boundary day.

use chrono::{DateTime, NaiveDate, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

/// Tag of the current 5-field token format.
pub const TOKEN_TAG: &str = "GP1";

/// Tag of the legacy 4-field token format (absolute expiry, no window).
pub const LEGACY_TOKEN_TAG: &str = "GP0";

/// Truncated signature length in bytes (hex-encoded to twice this).
pub const SIGNATURE_BYTES: usize = 16;

/// Literal standing in for an absent validity date.
pub const DATE_SENTINEL: &str = "null";

type HmacSha256 = Hmac<Sha256>;

/// The permit fields a credential is derived from.
///
/// Recomputed on demand from the permit row; never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CredentialClaims {
    /// The permit's public identity, printed on the document.
    pub permit_id: Uuid,
    pub validity_start: Option<NaiveDate>,
    pub validity_end: Option<NaiveDate>,
}

/// Why a scanned token was rejected. Terminal; never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum VerifyError {
    #[error("malformed token: {0}")]
    MalformedToken(&'static str),

    #[error("signature mismatch")]
    SignatureInvalid,

    #[error("permit not valid until {starts}")]
    NotYetValid { starts: NaiveDate },

    #[error("permit expired on {ended}")]
    Expired { ended: NaiveDate },
}

/// Derive the printable token string for a permit.
pub fn derive_token(claims: &CredentialClaims, secret: &str) -> String {
    let start = date_field(claims.validity_start);
    let end = date_field(claims.validity_end);
    let payload = format!("{}:{}:{}", claims.permit_id, start, end);
    let signature = sign_payload(&payload, secret);
    format!("{TOKEN_TAG}:{}:{start}:{end}:{signature}", claims.permit_id)
}

/// Verify a scanned token as of the given calendar date.
///
/// Checks, in order: field structure, signature (constant-time), validity
/// window. A token with neither a start nor an end date is treated as
/// always valid: permits issued before validity windows existed carry no
/// dates, and their printed credentials are honored indefinitely.
///
/// On success returns the permit's public identity; the caller may then
/// cross-check live workflow state (e.g. a later revocation). This function
/// itself never touches the database.
pub fn verify_token(token: &str, secret: &str, as_of: NaiveDate) -> Result<Uuid, VerifyError> {
    let fields: Vec<&str> = token.split(':').collect();
    match fields.as_slice() {
        &[TOKEN_TAG, permit_id, start, end, signature] => {
            verify_current(permit_id, start, end, signature, secret, as_of)
        }
        &[LEGACY_TOKEN_TAG, permit_id, expiry_millis, signature] => {
            verify_legacy(permit_id, expiry_millis, signature, secret, as_of)
        }
        _ => Err(VerifyError::MalformedToken("unrecognized shape")),
    }
}

fn verify_current(
    permit_id: &str,
    start: &str,
    end: &str,
    signature: &str,
    secret: &str,
    as_of: NaiveDate,
) -> Result<Uuid, VerifyError> {
    let permit_id: Uuid = permit_id
        .parse()
        .map_err(|_| VerifyError::MalformedToken("invalid permit id"))?;
    let validity_start = parse_date_field(start)?;
    let validity_end = parse_date_field(end)?;

    let payload = format!("{permit_id}:{start}:{end}");
    check_signature(&payload, signature, secret)?;

    if let Some(starts) = validity_start {
        if as_of < starts {
            return Err(VerifyError::NotYetValid { starts });
        }
    }
    if let Some(ended) = validity_end {
        if as_of > ended {
            return Err(VerifyError::Expired { ended });
        }
    }

    Ok(permit_id)
}

fn verify_legacy(
    permit_id: &str,
    expiry_millis: &str,
    signature: &str,
    secret: &str,
    as_of: NaiveDate,
) -> Result<Uuid, VerifyError> {
    let parsed_id: Uuid = permit_id
        .parse()
        .map_err(|_| VerifyError::MalformedToken("invalid permit id"))?;
    let millis: i64 = expiry_millis
        .parse()
        .map_err(|_| VerifyError::MalformedToken("invalid expiry timestamp"))?;
    let expiry = DateTime::<Utc>::from_timestamp_millis(millis)
        .ok_or(VerifyError::MalformedToken("invalid expiry timestamp"))?;

    let payload = format!("{permit_id}:{expiry_millis}");
    check_signature(&payload, signature, secret)?;

    // Legacy tokens carry no start date, so they can only ever expire.
    let ended = expiry.date_naive();
    if as_of > ended {
        return Err(VerifyError::Expired { ended });
    }

    Ok(parsed_id)
}

/// Derive a legacy-format token. Only used to produce fixtures for scanner
/// compatibility tests; new issuance always uses [`derive_token`].
pub fn derive_legacy_token(permit_id: Uuid, expiry: DateTime<Utc>, secret: &str) -> String {
    let millis = expiry.timestamp_millis();
    let payload = format!("{permit_id}:{millis}");
    let signature = sign_payload(&payload, secret);
    format!("{LEGACY_TOKEN_TAG}:{permit_id}:{millis}:{signature}")
}

fn date_field(date: Option<NaiveDate>) -> String {
    match date {
        Some(d) => d.format("%Y-%m-%d").to_string(),
        None => DATE_SENTINEL.to_string(),
    }
}

fn parse_date_field(field: &str) -> Result<Option<NaiveDate>, VerifyError> {
    if field == DATE_SENTINEL {
        return Ok(None);
    }
    field
        .parse()
        .map(Some)
        .map_err(|_| VerifyError::MalformedToken("invalid date"))
}

fn sign_payload(payload: &str, secret: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(payload.as_bytes());
    let digest = mac.finalize().into_bytes();
    hex::encode(&digest[..SIGNATURE_BYTES])
}

/// Recompute the expected MAC and compare against the presented signature in
/// constant time (`verify_truncated_left` on the truncated digest prefix).
fn check_signature(payload: &str, signature: &str, secret: &str) -> Result<(), VerifyError> {
    let presented =
        hex::decode(signature).ok_or(VerifyError::MalformedToken("invalid signature encoding"))?;
    if presented.len() != SIGNATURE_BYTES {
        return Err(VerifyError::MalformedToken("invalid signature length"));
    }

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(payload.as_bytes());
    mac.verify_truncated_left(&presented)
        .map_err(|_| VerifyError::SignatureInvalid)
}

// ---------------------------------------------------------------------------
// hex encoding helpers (no extra dep)
// ---------------------------------------------------------------------------

mod hex {
    /// Encode bytes as a lowercase hex string.
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        bytes.as_ref().iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Decode a hex string; `None` if the input is not well-formed hex.
    pub fn decode(s: &str) -> Option<Vec<u8>> {
        if s.len() % 2 != 0 {
            return None;
        }
        (0..s.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(s.get(i..i + 2)?, 16).ok())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const SECRET: &str = "test-signing-secret-long-enough-for-hmac";

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn claims(start: Option<&str>, end: Option<&str>) -> CredentialClaims {
        CredentialClaims {
            permit_id: Uuid::new_v4(),
            validity_start: start.map(date),
            validity_end: end.map(date),
        }
    }

    #[test]
    fn round_trip_inside_window() {
        let c = claims(Some("2025-03-01"), Some("2025-03-31"));
        let token = derive_token(&c, SECRET);

        for day in ["2025-03-01", "2025-03-15", "2025-03-31"] {
            let id = verify_token(&token, SECRET, date(day)).unwrap();
            assert_eq!(id, c.permit_id);
        }
    }

    #[test]
    fn day_before_window_is_not_yet_valid() {
        let c = claims(Some("2025-03-01"), Some("2025-03-31"));
        let token = derive_token(&c, SECRET);

        let err = verify_token(&token, SECRET, date("2025-02-28")).unwrap_err();
        assert_eq!(
            err,
            VerifyError::NotYetValid {
                starts: date("2025-03-01")
            }
        );
    }

    #[test]
    fn day_after_window_is_expired() {
        let c = claims(Some("2025-03-01"), Some("2025-03-31"));
        let token = derive_token(&c, SECRET);

        let err = verify_token(&token, SECRET, date("2025-04-01")).unwrap_err();
        assert_eq!(
            err,
            VerifyError::Expired {
                ended: date("2025-03-31")
            }
        );
    }

    #[test]
    fn no_dates_means_always_valid() {
        let c = claims(None, None);
        let token = derive_token(&c, SECRET);

        for day in ["1990-01-01", "2025-06-15", "2099-12-31"] {
            assert_eq!(verify_token(&token, SECRET, date(day)).unwrap(), c.permit_id);
        }
    }

    #[test]
    fn open_ended_window_checks_only_start() {
        let c = claims(Some("2025-03-01"), None);
        let token = derive_token(&c, SECRET);

        assert!(verify_token(&token, SECRET, date("2025-02-28")).is_err());
        assert!(verify_token(&token, SECRET, date("2099-01-01")).is_ok());
    }

    #[test]
    fn token_shape_is_stable() {
        let c = CredentialClaims {
            permit_id: "0195d3a0-0000-7000-8000-000000000042".parse().unwrap(),
            validity_start: Some(date("2025-03-01")),
            validity_end: Some(date("2025-03-31")),
        };
        let token = derive_token(&c, SECRET);
        let fields: Vec<&str> = token.split(':').collect();

        assert_eq!(fields.len(), 5);
        assert_eq!(fields[0], TOKEN_TAG);
        assert_eq!(fields[1], "0195d3a0-0000-7000-8000-000000000042");
        assert_eq!(fields[2], "2025-03-01");
        assert_eq!(fields[3], "2025-03-31");
        assert_eq!(fields[4].len(), SIGNATURE_BYTES * 2);
        assert!(fields[4].chars().all(|ch| ch.is_ascii_hexdigit()));
        assert!(
            fields[4].chars().all(|ch| !ch.is_ascii_uppercase()),
            "signature must be lowercase hex"
        );
    }

    #[test]
    fn tampered_signature_is_rejected() {
        let c = claims(Some("2025-03-01"), Some("2025-03-31"));
        let token = derive_token(&c, SECRET);

        // Flip each character of the signature field in turn.
        let sig_start = token.rfind(':').unwrap() + 1;
        for i in sig_start..token.len() {
            let mut tampered: Vec<char> = token.chars().collect();
            tampered[i] = if tampered[i] == '0' { '1' } else { '0' };
            let tampered: String = tampered.into_iter().collect();
            if tampered == token {
                continue;
            }
            assert_eq!(
                verify_token(&tampered, SECRET, date("2025-03-15")).unwrap_err(),
                VerifyError::SignatureInvalid,
                "flipping signature char {i} must invalidate the token"
            );
        }
    }

    #[test]
    fn tampered_dates_are_rejected() {
        let c = claims(Some("2025-03-01"), Some("2025-03-31"));
        let token = derive_token(&c, SECRET);

        // Extending the window without re-signing must fail.
        let stretched = token.replace(":2025-03-31:", ":2026-03-31:");
        assert_ne!(stretched, token);
        assert_eq!(
            verify_token(&stretched, SECRET, date("2025-06-01")).unwrap_err(),
            VerifyError::SignatureInvalid
        );
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let c = claims(None, None);
        let token = derive_token(&c, SECRET);
        assert_eq!(
            verify_token(&token, "another-secret", date("2025-03-15")).unwrap_err(),
            VerifyError::SignatureInvalid
        );
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        for token in [
            "",
            "GP1",
            "GP1:not-a-uuid:null:null:00",
            "GP9:0195d3a0-0000-7000-8000-000000000042:null:null:00",
            "GP1:0195d3a0-0000-7000-8000-000000000042:2025-13-40:null:00",
            "GP1:0195d3a0-0000-7000-8000-000000000042:null:null",
            "GP1:0195d3a0-0000-7000-8000-000000000042:null:null:zz!!",
        ] {
            assert!(
                matches!(
                    verify_token(token, SECRET, date("2025-03-15")),
                    Err(VerifyError::MalformedToken(_))
                ),
                "should reject {token:?} as malformed"
            );
        }
    }

    #[test]
    fn short_signature_is_malformed_not_invalid() {
        // A truncated-but-valid-hex signature is a shape error, not a
        // signature comparison failure.
        let c = claims(None, None);
        let token = derive_token(&c, SECRET);
        let short = &token[..token.len() - 2];
        assert!(matches!(
            verify_token(short, SECRET, date("2025-03-15")),
            Err(VerifyError::MalformedToken(_))
        ));
    }

    #[test]
    fn legacy_token_round_trip() {
        let permit_id = Uuid::new_v4();
        let expiry = Utc.with_ymd_and_hms(2025, 6, 30, 17, 0, 0).unwrap();
        let token = derive_legacy_token(permit_id, expiry, SECRET);

        assert!(token.starts_with(LEGACY_TOKEN_TAG));
        assert_eq!(token.split(':').count(), 4);

        // Valid on and before the expiry date, expired the day after.
        assert_eq!(verify_token(&token, SECRET, date("2025-06-30")).unwrap(), permit_id);
        assert_eq!(verify_token(&token, SECRET, date("2024-01-01")).unwrap(), permit_id);
        assert_eq!(
            verify_token(&token, SECRET, date("2025-07-01")).unwrap_err(),
            VerifyError::Expired {
                ended: date("2025-06-30")
            }
        );
    }

    #[test]
    fn legacy_token_tamper_is_rejected() {
        let permit_id = Uuid::new_v4();
        let expiry = Utc.with_ymd_and_hms(2025, 6, 30, 0, 0, 0).unwrap();
        let token = derive_legacy_token(permit_id, expiry, SECRET);

        // Pushing the expiry out without re-signing must fail.
        let millis = expiry.timestamp_millis();
        let stretched = token.replace(&millis.to_string(), &(millis + 86_400_000).to_string());
        assert_ne!(stretched, token);
        assert_eq!(
            verify_token(&stretched, SECRET, date("2025-06-15")).unwrap_err(),
            VerifyError::SignatureInvalid
        );
    }

    #[test]
    fn hex_decode_rejects_bad_input() {
        assert_eq!(hex::decode("0a1f"), Some(vec![0x0a, 0x1f]));
        assert_eq!(hex::decode("abc"), None);
        assert_eq!(hex::decode("zz"), None);
    }
}
