//! Serial and verification code formats.
//!
//! Serial codes are `{event_code}-{series}-{counter}` with a zero-padded
//! counter; the counter itself is allocated by the pipeline against the
//! database. Verification codes are random and authenticate a public
//! lookup, so they come from `rand::rng()` (ChaCha-based, OS-seeded CSPRNG).

use rand::Rng;

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Namespace prefix carried by every verification code.
pub const VERIFICATION_PREFIX: &str = "CERT-";

/// Number of random characters after the prefix.
pub const VERIFICATION_CODE_LENGTH: usize = 10;

/// Upper-case letters and digits without the lookalikes `0 O 1 I L`.
pub const VERIFICATION_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";

/// Default zero padding of the serial counter.
pub const DEFAULT_SERIAL_PAD_WIDTH: usize = 5;

// ---------------------------------------------------------------------------
// Serial codes
// ---------------------------------------------------------------------------

/// Build the scope prefix shared by every serial in `(event_code, series)`.
///
/// Both parts must be non-empty and free of whitespace; the trailing dash is
/// included so prefix matching never confuses `EV-A-` with `EV-AB-`.
pub fn serial_prefix(event_code: &str, series: &str) -> Result<String, CoreError> {
    for (label, part) in [("event code", event_code), ("series", series)] {
        if part.is_empty() {
            return Err(CoreError::Validation(format!("Serial {label} must not be empty")));
        }
        if part.chars().any(char::is_whitespace) {
            return Err(CoreError::Validation(format!(
                "Serial {label} must not contain whitespace: '{part}'"
            )));
        }
    }
    Ok(format!("{event_code}-{series}-"))
}

/// Render a serial code from its prefix and counter.
pub fn format_serial(prefix: &str, counter: i64, pad_width: usize) -> String {
    format!("{prefix}{counter:0pad_width$}")
}

// ---------------------------------------------------------------------------
// Verification codes
// ---------------------------------------------------------------------------

/// Generate a fresh verification code, e.g. `CERT-7KQ2MZ9XHP`.
pub fn generate_verification_code() -> String {
    let mut rng = rand::rng();
    let body: String = (0..VERIFICATION_CODE_LENGTH)
        .map(|_| {
            let idx = rng.random_range(0..VERIFICATION_ALPHABET.len());
            char::from(VERIFICATION_ALPHABET[idx])
        })
        .collect();
    format!("{VERIFICATION_PREFIX}{body}")
}

/// Whether `code` has the shape produced by [`generate_verification_code`].
pub fn is_valid_verification_code(code: &str) -> bool {
    code.strip_prefix(VERIFICATION_PREFIX).is_some_and(|body| {
        body.len() == VERIFICATION_CODE_LENGTH
            && body.bytes().all(|b| VERIFICATION_ALPHABET.contains(&b))
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn prefix_joins_parts_with_trailing_dash() {
        assert_eq!(serial_prefix("EV24", "A").unwrap(), "EV24-A-");
    }

    #[test]
    fn prefix_rejects_empty_or_spaced_parts() {
        assert_matches!(serial_prefix("", "A"), Err(CoreError::Validation(_)));
        assert_matches!(serial_prefix("EV", ""), Err(CoreError::Validation(_)));
        assert_matches!(serial_prefix("EV 24", "A"), Err(CoreError::Validation(_)));
    }

    #[test]
    fn serial_is_zero_padded() {
        assert_eq!(format_serial("EV24-A-", 7, 5), "EV24-A-00007");
        // Counters wider than the padding are not truncated.
        assert_eq!(format_serial("EV24-A-", 123_456, 5), "EV24-A-123456");
    }

    #[test]
    fn verification_code_shape() {
        let code = generate_verification_code();
        assert!(code.starts_with(VERIFICATION_PREFIX));
        assert_eq!(code.len(), VERIFICATION_PREFIX.len() + VERIFICATION_CODE_LENGTH);
        assert!(is_valid_verification_code(&code), "bad code {code}");
    }

    #[test]
    fn verification_code_avoids_lookalikes() {
        for _ in 0..200 {
            let code = generate_verification_code();
            let body = &code[VERIFICATION_PREFIX.len()..];
            assert!(!body.contains(['0', 'O', '1', 'I', 'L']), "lookalike in {code}");
        }
    }

    #[test]
    fn verification_codes_do_not_repeat_in_practice() {
        let codes: HashSet<String> = (0..1000).map(|_| generate_verification_code()).collect();
        assert_eq!(codes.len(), 1000);
    }

    #[test]
    fn validity_check_rejects_foreign_shapes() {
        assert!(!is_valid_verification_code("CERT-ABC"));
        assert!(!is_valid_verification_code("XXXX-ABCDEFGHJK"));
        assert!(!is_valid_verification_code("CERT-ABCDEFGH0K"));
    }
}
