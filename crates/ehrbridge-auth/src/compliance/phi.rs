//! PHI pattern detection and redaction.
//!
//! Each pattern replaces its matches with `[REDACTED <KIND>]`. Placeholders
//! never match a later pattern, so application order does not matter.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

/// Kind of protected health information a pattern detects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhiKind {
    Ssn,
    MedicalRecordNumber,
    Phone,
    DateOfBirth,
    Email,
    Name,
}

impl PhiKind {
    /// Label used inside the redaction placeholder.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            PhiKind::Ssn => "SSN",
            PhiKind::MedicalRecordNumber => "MRN",
            PhiKind::Phone => "PHONE",
            PhiKind::DateOfBirth => "DOB",
            PhiKind::Email => "EMAIL",
            PhiKind::Name => "NAME",
        }
    }

    /// Replacement text for a match.
    #[must_use]
    pub fn placeholder(&self) -> String {
        format!("[REDACTED {}]", self.label())
    }
}

impl fmt::Display for PhiKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

static PHI_PATTERNS: LazyLock<Vec<(PhiKind, Regex)>> = LazyLock::new(|| {
    vec![
        (
            PhiKind::Ssn,
            Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").expect("Invalid SSN regex"),
        ),
        (
            PhiKind::MedicalRecordNumber,
            Regex::new(r"(?i)\b(?:MRN|Medical Record(?: Number)?)[:#\s]*[A-Z]{0,3}\d[A-Z0-9-]{3,}")
                .expect("Invalid MRN regex"),
        ),
        (
            PhiKind::Phone,
            Regex::new(r"(?:\(\d{3}\)\s?|\b\d{3}[-.\s])\d{3}[-.]\d{4}\b")
                .expect("Invalid phone regex"),
        ),
        (
            PhiKind::DateOfBirth,
            Regex::new(r"\b\d{1,2}/\d{1,2}/\d{2,4}\b").expect("Invalid date regex"),
        ),
        (
            PhiKind::Email,
            Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b")
                .expect("Invalid email regex"),
        ),
        (
            PhiKind::Name,
            Regex::new(r"\b(?:Mrs|Mr|Ms|Miss|Dr)\.?\s+[A-Z][a-z]+(?:\s+[A-Z][a-z]+)?")
                .expect("Invalid name regex"),
        ),
    ]
});

/// Replaces every PHI match in `text` with its placeholder.
#[must_use]
pub fn sanitize_phi(text: &str) -> String {
    let mut sanitized = text.to_string();
    for (kind, pattern) in PHI_PATTERNS.iter() {
        if pattern.is_match(&sanitized) {
            sanitized = pattern
                .replace_all(&sanitized, kind.placeholder().as_str())
                .into_owned();
        }
    }
    sanitized
}

/// Returns `true` if any PHI pattern matches `text`.
#[must_use]
pub fn contains_phi(text: &str) -> bool {
    PHI_PATTERNS.iter().any(|(_, pattern)| pattern.is_match(text))
}

/// Lists the kinds of PHI present in `text`, in pattern order.
#[must_use]
pub fn detect_phi(text: &str) -> Vec<PhiKind> {
    PHI_PATTERNS
        .iter()
        .filter(|(_, pattern)| pattern.is_match(text))
        .map(|(kind, _)| *kind)
        .collect()
}

/// Redacts PHI in every string inside a JSON value, in place.
///
/// Returns `true` if anything was replaced.
pub fn sanitize_value(value: &mut Value) -> bool {
    match value {
        Value::String(s) => {
            if contains_phi(s) {
                *s = sanitize_phi(s);
                true
            } else {
                false
            }
        }
        Value::Array(items) => items
            .iter_mut()
            .fold(false, |changed, item| sanitize_value(item) | changed),
        Value::Object(map) => map
            .values_mut()
            .fold(false, |changed, item| sanitize_value(item) | changed),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ssn_redacted() {
        let out = sanitize_phi("SSN: 123-45-6789");
        assert!(out.contains("[REDACTED SSN]"));
        assert!(!out.contains("123-45-6789"));
    }

    #[test]
    fn test_dob_detected() {
        assert!(contains_phi("patient dob 04/12/1980"));
        assert_eq!(
            sanitize_phi("patient dob 04/12/1980"),
            "patient dob [REDACTED DOB]"
        );
    }

    #[test]
    fn test_each_kind() {
        let cases = [
            ("MRN: 00123456", PhiKind::MedicalRecordNumber),
            ("Medical Record Number #A1234567", PhiKind::MedicalRecordNumber),
            ("call (555) 123-4567", PhiKind::Phone),
            ("call 555-123-4567", PhiKind::Phone),
            ("mail jane.doe@example.org", PhiKind::Email),
            ("seen by Dr. Gregory House", PhiKind::Name),
            ("Mrs Smith arrived", PhiKind::Name),
        ];
        for (text, kind) in cases {
            assert_eq!(detect_phi(text), vec![kind], "{text}");
            assert!(sanitize_phi(text).contains(&kind.placeholder()), "{text}");
        }
    }

    #[test]
    fn test_clean_text_untouched() {
        let text = "CBC panel resulted, hemoglobin within range";
        assert!(!contains_phi(text));
        assert_eq!(sanitize_phi(text), text);
        assert!(!contains_phi("medical record review pending"));
    }

    #[test]
    fn test_multiple_kinds() {
        let out = sanitize_phi("Mr. John Smith, SSN 123-45-6789, born 1/2/70, john@example.com");
        assert_eq!(
            out,
            "[REDACTED NAME], SSN [REDACTED SSN], born [REDACTED DOB], [REDACTED EMAIL]"
        );
        assert!(!contains_phi(&out));
    }

    #[test]
    fn test_sanitize_value_recurses() {
        let mut details = json!({
            "note": "SSN 123-45-6789",
            "nested": {"emails": ["a@b.io", "plain"]},
            "status": 200
        });
        assert!(sanitize_value(&mut details));
        assert_eq!(details["note"], "SSN [REDACTED SSN]");
        assert_eq!(details["nested"]["emails"][0], "[REDACTED EMAIL]");
        assert_eq!(details["nested"]["emails"][1], "plain");
        assert_eq!(details["status"], 200);

        let mut clean = json!({"status": 200, "resourceType": "Patient"});
        assert!(!sanitize_value(&mut clean));
    }
}
