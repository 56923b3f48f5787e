//! Permit document-number format.
//!
//! Issued numbers follow `<ordinal>/<authority>/<scope>-<suffix>`, e.g.
//! `0042/WEP/2025-GP`: a zero-padded ordinal, the permit-type authority code,
//! the numbering scope (calendar year), and the issuing-office suffix. The
//! format is stable: printed documents and audits parse issued numbers back
//! into `(scope, ordinal)`, so separators and padding must not change.

use crate::error::CoreError;

/// Zero-padding width of the ordinal. Ordinals past 9999 widen naturally.
pub const ORDINAL_WIDTH: usize = 4;

/// Permit-type code, second segment of every issued number.
pub const AUTHORITY_CODE: &str = "WEP";

/// Issuing-office suffix, appended to the scope segment.
pub const ISSUER_SUFFIX: &str = "GP";

/// Format an issued ordinal into the document-number string.
pub fn format_sequence_number(scope: &str, ordinal: i64) -> String {
    format!("{ordinal:0ORDINAL_WIDTH$}/{AUTHORITY_CODE}/{scope}-{ISSUER_SUFFIX}")
}

/// Parse a document number back into `(scope, ordinal)`.
///
/// Rejects anything that does not match the issued format exactly, including
/// unknown authority codes or issuer suffixes.
pub fn parse_sequence_number(number: &str) -> Result<(String, i64), CoreError> {
    let malformed = || CoreError::Validation(format!("Malformed sequence number '{number}'"));

    let mut parts = number.split('/');
    let (ordinal_part, authority, scoped) =
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(a), Some(b), Some(c), None) => (a, b, c),
            _ => return Err(malformed()),
        };

    if authority != AUTHORITY_CODE {
        return Err(malformed());
    }

    let Some((scope, suffix)) = scoped.rsplit_once('-') else {
        return Err(malformed());
    };
    if suffix != ISSUER_SUFFIX || scope.is_empty() {
        return Err(malformed());
    }

    if ordinal_part.is_empty() || !ordinal_part.chars().all(|c| c.is_ascii_digit()) {
        return Err(malformed());
    }
    let ordinal: i64 = ordinal_part.parse().map_err(|_| malformed())?;
    if ordinal < 1 {
        return Err(malformed());
    }

    Ok((scope.to_string(), ordinal))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_with_zero_padding() {
        assert_eq!(format_sequence_number("2025", 42), "0042/WEP/2025-GP");
        assert_eq!(format_sequence_number("2025", 1), "0001/WEP/2025-GP");
    }

    #[test]
    fn ordinal_widens_past_padding() {
        assert_eq!(format_sequence_number("2025", 12345), "12345/WEP/2025-GP");
    }

    #[test]
    fn parses_issued_numbers() {
        let (scope, ordinal) = parse_sequence_number("0042/WEP/2025-GP").unwrap();
        assert_eq!(scope, "2025");
        assert_eq!(ordinal, 42);
    }

    #[test]
    fn round_trips() {
        for ordinal in [1, 9, 999, 10000] {
            let formatted = format_sequence_number("2026", ordinal);
            assert_eq!(
                parse_sequence_number(&formatted).unwrap(),
                ("2026".to_string(), ordinal)
            );
        }
    }

    #[test]
    fn rejects_wrong_authority_code() {
        assert!(parse_sequence_number("0042/XXX/2025-GP").is_err());
    }

    #[test]
    fn rejects_wrong_issuer_suffix() {
        assert!(parse_sequence_number("0042/WEP/2025-XX").is_err());
    }

    #[test]
    fn rejects_malformed_input() {
        for input in [
            "",
            "0042",
            "0042/WEP",
            "0042/WEP/2025",
            "0042/WEP/2025-GP/extra",
            "00x2/WEP/2025-GP",
            "-042/WEP/2025-GP",
            "0000/WEP/2025-GP",
            "0042/WEP/-GP",
        ] {
            assert!(
                parse_sequence_number(input).is_err(),
                "should reject {input:?}"
            );
        }
    }
}
