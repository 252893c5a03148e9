//! PII vocabulary shared by the detector and the redaction service.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::ids::{DetectionId, UtteranceId};

/// Kinds of personally identifiable information the detector recognizes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PiiType {
    /// Email address.
    Email,
    /// Phone number.
    Phone,
    /// US social security number.
    Ssn,
    /// Payment card number.
    CreditCard,
    /// IPv4 address.
    IpAddress,
    /// Date of birth.
    DateOfBirth,
    /// Street address.
    StreetAddress,
    /// A person's name introduced in speech.
    PersonName,
    /// US ZIP code.
    ZipCode,
}

impl PiiType {
    /// All variants.
    pub const ALL: [Self; 9] = [
        Self::Email,
        Self::Phone,
        Self::Ssn,
        Self::CreditCard,
        Self::IpAddress,
        Self::DateOfBirth,
        Self::StreetAddress,
        Self::PersonName,
        Self::ZipCode,
    ];

    /// Canonical redaction label substituted for a redacted span.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Email => "[EMAIL]",
            Self::Phone => "[PHONE]",
            Self::Ssn => "[SSN]",
            Self::CreditCard => "[CREDIT_CARD]",
            Self::IpAddress => "[IP_ADDRESS]",
            Self::DateOfBirth => "[DATE_OF_BIRTH]",
            Self::StreetAddress => "[ADDRESS]",
            Self::PersonName => "[NAME]",
            Self::ZipCode => "[ZIP_CODE]",
        }
    }

    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Phone => "phone",
            Self::Ssn => "ssn",
            Self::CreditCard => "credit_card",
            Self::IpAddress => "ip_address",
            Self::DateOfBirth => "date_of_birth",
            Self::StreetAddress => "street_address",
            Self::PersonName => "person_name",
            Self::ZipCode => "zip_code",
        }
    }
}

impl fmt::Display for PiiType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Digest of the exact text a detection's offsets were computed against.
///
/// Offsets are only meaningful for the text version they were stamped with.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TextVersion(String);

impl TextVersion {
    /// Stamp for `text`: first 16 hex chars of its SHA-256.
    #[must_use]
    pub fn of(text: &str) -> Self {
        let digest = Sha256::digest(text.as_bytes());
        let hex: String = digest.iter().take(8).map(|b| format!("{b:02x}")).collect();
        Self(hex)
    }

    /// Whether `text` is the version this stamp was computed from.
    #[must_use]
    pub fn matches(&self, text: &str) -> bool {
        *self == Self::of(text)
    }

    /// Borrow the hex digest.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One PII match inside an utterance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PiiDetection {
    /// Identity.
    pub id: DetectionId,
    /// Utterance the match was found in.
    pub utterance_id: UtteranceId,
    /// What kind of PII.
    pub pii_type: PiiType,
    /// The matched text.
    pub matched_text: String,
    /// Start byte offset (UTF-8) into the scanned text.
    pub start: usize,
    /// End byte offset (exclusive).
    pub end: usize,
    /// Version of the text the offsets refer to.
    pub text_version: TextVersion,
}

impl PiiDetection {
    /// Whether `[start, end)` is a valid slice of `text`.
    #[must_use]
    pub fn fits(&self, text: &str) -> bool {
        self.start <= self.end
            && self.end <= text.len()
            && text.is_char_boundary(self.start)
            && text.is_char_boundary(self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detection(start: usize, end: usize, text: &str) -> PiiDetection {
        PiiDetection {
            id: DetectionId::new(),
            utterance_id: UtteranceId::new(),
            pii_type: PiiType::Email,
            matched_text: String::new(),
            start,
            end,
            text_version: TextVersion::of(text),
        }
    }

    #[test]
    fn labels_are_bracketed_upper_case() {
        for t in PiiType::ALL {
            let label = t.label();
            assert!(label.starts_with('[') && label.ends_with(']'), "{label}");
            assert_eq!(label, label.to_uppercase());
        }
    }

    #[test]
    fn email_label() {
        assert_eq!(PiiType::Email.label(), "[EMAIL]");
    }

    #[test]
    fn wire_names_match_serde() {
        for t in PiiType::ALL {
            assert_eq!(serde_json::to_string(&t).unwrap(), format!("\"{}\"", t.as_str()));
        }
    }

    #[test]
    fn text_version_is_stable_and_sensitive() {
        let a = TextVersion::of("hello");
        assert_eq!(a, TextVersion::of("hello"));
        assert_ne!(a, TextVersion::of("hello!"));
        assert_eq!(a.as_str().len(), 16);
        assert!(a.matches("hello"));
    }

    #[test]
    fn fits_checks_bounds_and_order() {
        let text = "abc";
        assert!(detection(0, 3, text).fits(text));
        assert!(!detection(2, 1, text).fits(text));
        assert!(!detection(0, 4, text).fits(text));
    }

    #[test]
    fn fits_checks_char_boundaries() {
        let text = "héllo";
        // 'é' occupies bytes 1..3
        assert!(!detection(0, 2, text).fits(text));
        assert!(detection(0, 3, text).fits(text));
    }
}
