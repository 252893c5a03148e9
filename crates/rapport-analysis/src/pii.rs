//! PII detection over utterance text.
//!
//! Each pattern runs independently; overlapping matches from different
//! patterns are all kept. Every detection carries the [`TextVersion`] of the
//! exact text scanned, so offsets are never applied to a different version.

use std::sync::LazyLock;

use rapport_core::ids::{DetectionId, UtteranceId};
use rapport_core::pii::{PiiDetection, PiiType, TextVersion};
use regex::Regex;

struct PiiPattern {
    pii_type: PiiType,
    regex: Regex,
    /// Capture group holding the PII span (0 = whole match).
    group: usize,
    validate: Option<fn(&str) -> bool>,
}

impl PiiPattern {
    fn new(pii_type: PiiType, pattern: &str) -> Self {
        Self {
            pii_type,
            regex: Regex::new(pattern).unwrap(),
            group: 0,
            validate: None,
        }
    }

    fn group(mut self, group: usize) -> Self {
        self.group = group;
        self
    }

    fn validate(mut self, f: fn(&str) -> bool) -> Self {
        self.validate = Some(f);
        self
    }
}

static PATTERNS: LazyLock<Vec<PiiPattern>> = LazyLock::new(|| {
    vec![
        PiiPattern::new(
            PiiType::Email,
            r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b",
        ),
        PiiPattern::new(
            PiiType::Phone,
            r"(?:\+?1[\s.-]?)?(?:\(\d{3}\)|\b\d{3})[\s.-]?\d{3}[\s.-]\d{4}\b",
        ),
        PiiPattern::new(PiiType::Ssn, r"\b\d{3}-\d{2}-\d{4}\b"),
        PiiPattern::new(
            PiiType::CreditCard,
            r"\b\d{4}[ -]?\d{4}[ -]?\d{4}[ -]?\d{1,7}\b",
        )
        .validate(luhn_valid),
        PiiPattern::new(
            PiiType::IpAddress,
            r"\b(?:(?:25[0-5]|2[0-4]\d|1\d\d|[1-9]?\d)\.){3}(?:25[0-5]|2[0-4]\d|1\d\d|[1-9]?\d)\b",
        ),
        PiiPattern::new(
            PiiType::DateOfBirth,
            r"(?i)\b(?:born on|date of birth(?: is)?|birthday is|dob)[:\s]+(\d{1,2}[/.-]\d{1,2}[/.-]\d{2,4}|(?:jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?\s+\d{1,2}(?:st|nd|rd|th)?,?\s+\d{4})",
        )
        .group(1),
        PiiPattern::new(
            PiiType::StreetAddress,
            r"\b\d{1,5}\s+(?:[A-Z][a-z]+\s+){1,3}(?:Street|St|Avenue|Ave|Road|Rd|Boulevard|Blvd|Lane|Ln|Drive|Dr|Court|Ct|Way|Place|Pl)\b",
        ),
        PiiPattern::new(
            PiiType::PersonName,
            r"(?:\b[Mm]y name is|\bI'm|\bI am|\b[Tt]his is|\b[Cc]all me)\s+([A-Z][a-z]+(?:\s+[A-Z][a-z]+)?)",
        )
        .group(1),
        PiiPattern::new(PiiType::ZipCode, r"\b\d{5}(?:-\d{4})?\b"),
    ]
});

/// Luhn checksum over the digits of `candidate`.
pub fn luhn_valid(candidate: &str) -> bool {
    let digits: Vec<u32> = candidate.chars().filter_map(|c| c.to_digit(10)).collect();
    if !(13..=19).contains(&digits.len()) {
        return false;
    }
    let sum: u32 = digits
        .iter()
        .rev()
        .enumerate()
        .map(|(i, &d)| {
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 { doubled - 9 } else { doubled }
            } else {
                d
            }
        })
        .sum();
    sum % 10 == 0
}

/// Scan `text` for PII. Results are ordered by start offset, then type.
pub fn scan(utterance_id: &UtteranceId, text: &str) -> Vec<PiiDetection> {
    let version = TextVersion::of(text);
    let mut detections = Vec::new();

    for pattern in PATTERNS.iter() {
        for caps in pattern.regex.captures_iter(text) {
            let Some(m) = caps.get(pattern.group) else {
                continue;
            };
            if let Some(validate) = pattern.validate {
                if !validate(m.as_str()) {
                    continue;
                }
            }
            detections.push(PiiDetection {
                id: DetectionId::new(),
                utterance_id: utterance_id.clone(),
                pii_type: pattern.pii_type,
                matched_text: m.as_str().to_string(),
                start: m.start(),
                end: m.end(),
                text_version: version.clone(),
            });
        }
    }

    detections.sort_by(|a, b| a.start.cmp(&b.start).then(a.pii_type.cmp(&b.pii_type)));
    detections
}

#[cfg(test)]
mod tests {
    use super::*;

    fn types_in(text: &str) -> Vec<PiiType> {
        scan(&UtteranceId::new(), text)
            .into_iter()
            .map(|d| d.pii_type)
            .collect()
    }

    #[test]
    fn email_detected_with_offsets() {
        let text = "My email is a@b.com";
        let found = scan(&UtteranceId::new(), text);
        assert_eq!(found.len(), 1);
        let d = &found[0];
        assert_eq!(d.pii_type, PiiType::Email);
        assert_eq!(d.matched_text, "a@b.com");
        assert_eq!(&text[d.start..d.end], "a@b.com");
        assert!(d.text_version.matches(text));
    }

    #[test]
    fn phone_formats() {
        assert_eq!(types_in("call 555-123-4567 today"), vec![PiiType::Phone]);
        assert_eq!(types_in("call (555) 123-4567"), vec![PiiType::Phone]);
        assert_eq!(types_in("call +1 555.123.4567"), vec![PiiType::Phone]);
    }

    #[test]
    fn ssn_is_not_a_phone() {
        assert_eq!(types_in("it's 123-45-6789"), vec![PiiType::Ssn]);
    }

    #[test]
    fn credit_card_requires_luhn() {
        assert_eq!(types_in("card 4111 1111 1111 1111"), vec![PiiType::CreditCard]);
        assert!(types_in("card 4111 1111 1111 1112").is_empty());
    }

    #[test]
    fn luhn_examples() {
        assert!(luhn_valid("4111111111111111"));
        assert!(luhn_valid("5500-0000-0000-0004"));
        assert!(!luhn_valid("1234"));
    }

    #[test]
    fn ip_address() {
        assert_eq!(types_in("server at 192.168.1.20"), vec![PiiType::IpAddress]);
        assert!(types_in("version 999.1.1.1").is_empty());
    }

    #[test]
    fn date_of_birth_needs_context() {
        let text = "I was born on 04/12/1988 in Ohio";
        let found = scan(&UtteranceId::new(), text);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].pii_type, PiiType::DateOfBirth);
        assert_eq!(found[0].matched_text, "04/12/1988");
        assert!(types_in("the release was 04/12/1988").is_empty());
    }

    #[test]
    fn street_address_and_zip_overlap_kept() {
        let found = types_in("I live at 42 Maple Street, 94110");
        assert!(found.contains(&PiiType::StreetAddress));
        assert!(found.contains(&PiiType::ZipCode));
    }

    #[test]
    fn person_name_span_excludes_preamble() {
        let text = "Hi, my name is Dana Whitfield and I design";
        let found = scan(&UtteranceId::new(), text);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].pii_type, PiiType::PersonName);
        assert_eq!(&text[found[0].start..found[0].end], "Dana Whitfield");
    }

    #[test]
    fn multibyte_text_offsets_are_char_boundaries() {
        let text = "café owner, reach me at zoë@example.org";
        let found = scan(&UtteranceId::new(), text);
        for d in &found {
            assert!(d.fits(text));
        }
    }

    #[test]
    fn redaction_labels_do_not_rescan() {
        assert!(types_in("My email is [EMAIL] and phone [PHONE]").is_empty());
    }

    #[test]
    fn results_sorted_by_start() {
        let found = scan(&UtteranceId::new(), "x@y.io then 555-123-4567");
        assert!(found.windows(2).all(|w| w[0].start <= w[1].start));
    }
}
