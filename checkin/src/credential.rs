//! Admission credential shape.
//!
//! A credential is `<uuid>-<millis>`: a lowercase hyphenated UUID built from
//! 128 random bits, the separator, and the issuing time as a zero-padded
//! 13-digit count of milliseconds since the Unix epoch.
//!
//! ```text
//! 0f8fad5b-d9cb-469f-a165-70867728950e-1735689600000
//! └──────────── random (36) ─────────┘ └ millis (13) ┘
//! ```
//!
//! Everything in this module is pure. Format checks never touch storage, so
//! malformed scanner input is rejected before any lookup is spent on it.

use crate::types::AdmissionCredential;
use chrono::{DateTime, Utc};
use rand::RngCore;
use uuid::Uuid;

/// Separator between the random and timestamp segments.
pub const CREDENTIAL_SEPARATOR: char = '-';

/// Length of the hyphenated UUID text form.
pub const RANDOM_SEGMENT_LEN: usize = 36;

/// Width of the millisecond timestamp segment.
pub const TIMESTAMP_DIGITS: usize = 13;

/// Total credential length.
pub const CREDENTIAL_LEN: usize = RANDOM_SEGMENT_LEN + 1 + TIMESTAMP_DIGITS;

/// Build a fresh candidate credential stamped with `now`.
///
/// Uniqueness is not checked here; that is the issuer's job.
#[must_use]
pub fn generate_candidate(now: DateTime<Utc>) -> AdmissionCredential {
    let mut rng = rand::thread_rng();
    let mut random_bytes = [0u8; 16];
    rng.fill_bytes(&mut random_bytes);
    let random = uuid::Builder::from_random_bytes(random_bytes).into_uuid();

    // Pre-epoch clocks are clamped rather than producing a signed segment.
    let millis = now.timestamp_millis().max(0);

    AdmissionCredential::from_generated(format!(
        "{}{CREDENTIAL_SEPARATOR}{millis:0width$}",
        random.hyphenated(),
        width = TIMESTAMP_DIGITS
    ))
}

/// Structural check of an untrusted credential string.
///
/// # Examples
///
/// ```
/// use checkin::credential::is_valid_format;
///
/// assert!(is_valid_format("0f8fad5b-d9cb-469f-a165-70867728950e-1735689600000"));
/// assert!(!is_valid_format("not-a-real-credential"));
/// assert!(!is_valid_format("0F8FAD5B-D9CB-469F-A165-70867728950E-1735689600000"));
/// assert!(!is_valid_format("0f8fad5b-d9cb-469f-a165-70867728950e-173568960000"));
/// ```
#[must_use]
pub fn is_valid_format(candidate: &str) -> bool {
    if candidate.len() != CREDENTIAL_LEN {
        return false;
    }

    let Some((random, millis)) = candidate.rsplit_once(CREDENTIAL_SEPARATOR) else {
        return false;
    };

    is_canonical_uuid(random)
        && millis.len() == TIMESTAMP_DIGITS
        && millis.bytes().all(|b| b.is_ascii_digit())
}

/// Lowercase hyphenated 8-4-4-4-12 form only.
fn is_canonical_uuid(segment: &str) -> bool {
    if segment.len() != RANDOM_SEGMENT_LEN {
        return false;
    }

    let lowercase_hex = segment
        .bytes()
        .all(|b| b == b'-' || b.is_ascii_digit() || (b'a'..=b'f').contains(&b));

    lowercase_hex && Uuid::try_parse(segment).is_ok()
}

/// Clean up a scanner-supplied operator tag for storage.
///
/// Control characters are dropped, whitespace is trimmed, and the result is
/// cut to `max_chars` characters. An absent or blank tag becomes `fallback`,
/// so an admission always records who performed it.
///
/// # Examples
///
/// ```
/// use checkin::credential::normalize_operator_tag;
///
/// assert_eq!(normalize_operator_tag(Some("  Gate-A \n"), "unspecified", 64), "Gate-A");
/// assert_eq!(normalize_operator_tag(Some("   "), "unspecified", 64), "unspecified");
/// assert_eq!(normalize_operator_tag(None, "unspecified", 64), "unspecified");
/// assert_eq!(normalize_operator_tag(Some("Gate-ABCDEF"), "unspecified", 6), "Gate-A");
/// ```
#[must_use]
pub fn normalize_operator_tag(tag: Option<&str>, fallback: &str, max_chars: usize) -> String {
    let cleaned: String = tag
        .unwrap_or_default()
        .chars()
        .filter(|c| !c.is_control())
        .collect();

    let trimmed: String = cleaned.trim().chars().take(max_chars).collect();
    let trimmed = trimmed.trim_end();

    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    #[test]
    fn test_generated_candidate_is_well_formed() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let credential = generate_candidate(now);

        assert!(is_valid_format(credential.as_str()));
        assert!(credential.as_str().ends_with("-1735689600000"));
    }

    #[test]
    fn test_candidates_differ_at_same_instant() {
        let now = Utc::now();
        assert_ne!(generate_candidate(now), generate_candidate(now));
    }

    #[test]
    fn test_epoch_is_zero_padded() {
        let epoch = Utc.timestamp_millis_opt(0).unwrap();
        let credential = generate_candidate(epoch);
        assert!(credential.as_str().ends_with("-0000000000000"));
        assert!(is_valid_format(credential.as_str()));
    }

    #[test]
    fn test_rejects_other_uuid_forms() {
        // simple (no hyphens) form padded to the same overall length
        assert!(!is_valid_format("0f8fad5bd9cb469fa16570867728950e-----1735689600000"));
        // braced form
        assert!(!is_valid_format("{0f8fad5b-d9cb-469f-a165-70867728950e}-17356896000"));
        // non-hex letter in the random segment
        assert!(!is_valid_format("0f8fad5b-d9cb-469f-a165-70867728950g-1735689600000"));
        // non-digit in the timestamp
        assert!(!is_valid_format("0f8fad5b-d9cb-469f-a165-70867728950e-17356896000x0"));
        assert!(!is_valid_format(""));
    }

    #[test]
    fn test_operator_tag_strips_control_characters() {
        assert_eq!(normalize_operator_tag(Some("Gate\u{0}-B"), "x", 64), "Gate-B");
    }

    proptest! {
        #[test]
        fn prop_generated_credentials_pass_format_check(millis in 0i64..9_999_999_999_999) {
            let now = Utc.timestamp_millis_opt(millis).unwrap();
            let credential = generate_candidate(now);
            prop_assert!(is_valid_format(credential.as_str()));
            prop_assert_eq!(credential.as_str().len(), CREDENTIAL_LEN);
        }

        #[test]
        fn prop_format_check_never_panics(input in ".*") {
            let _ = is_valid_format(&input);
        }

        #[test]
        fn prop_operator_tag_respects_limit(input in ".*", max in 1usize..32) {
            let tag = normalize_operator_tag(Some(&input), "unspecified", max);
            prop_assert!(!tag.is_empty());
            prop_assert!(tag == "unspecified" || tag.chars().count() <= max);
        }
    }
}
