//! Lab-subsystem report classification.
//!
//! The source FHIR server has no first-class "origin subsystem" field, so
//! deciding whether a `DiagnosticReport` came from the Beaker lab system is a
//! heuristic over `code.coding[]`. The markers are deployment-specific and
//! come from configuration; swap in another [`ReportClassifier`] when a
//! deployment codes its reports differently.

use ehrbridge_config::ClassificationSettings;
use serde_json::Value;

/// Decides whether a report belongs to the lab subsystem of interest.
pub trait ReportClassifier: Send + Sync {
    fn matches(&self, report: &Value) -> bool;
}

impl<F> ReportClassifier for F
where
    F: Fn(&Value) -> bool + Send + Sync,
{
    fn matches(&self, report: &Value) -> bool {
        self(report)
    }
}

/// Matches when any `code.coding[]` entry carries a marker substring
/// (case-insensitive) in its `system`, `display`, or `code`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodingMarkerClassifier {
    system_markers: Vec<String>,
    display_markers: Vec<String>,
    code_markers: Vec<String>,
}

impl CodingMarkerClassifier {
    #[must_use]
    pub fn new(
        system_markers: impl IntoIterator<Item = impl AsRef<str>>,
        display_markers: impl IntoIterator<Item = impl AsRef<str>>,
        code_markers: impl IntoIterator<Item = impl AsRef<str>>,
    ) -> Self {
        Self {
            system_markers: lowercase_all(system_markers),
            display_markers: lowercase_all(display_markers),
            code_markers: lowercase_all(code_markers),
        }
    }

    #[must_use]
    pub fn from_settings(settings: &ClassificationSettings) -> Self {
        Self::new(
            &settings.system_markers,
            &settings.display_markers,
            &settings.code_markers,
        )
    }

    fn coding_matches(&self, coding: &Value) -> bool {
        field_contains(coding, "system", &self.system_markers)
            || field_contains(coding, "display", &self.display_markers)
            || field_contains(coding, "code", &self.code_markers)
    }
}

impl Default for CodingMarkerClassifier {
    fn default() -> Self {
        Self::from_settings(&ClassificationSettings::default())
    }
}

impl ReportClassifier for CodingMarkerClassifier {
    fn matches(&self, report: &Value) -> bool {
        report
            .pointer("/code/coding")
            .and_then(Value::as_array)
            .is_some_and(|codings| codings.iter().any(|c| self.coding_matches(c)))
    }
}

fn lowercase_all(markers: impl IntoIterator<Item = impl AsRef<str>>) -> Vec<String> {
    markers
        .into_iter()
        .map(|m| m.as_ref().trim().to_lowercase())
        .filter(|m| !m.is_empty())
        .collect()
}

fn field_contains(coding: &Value, field: &str, markers: &[String]) -> bool {
    let Some(value) = coding.get(field).and_then(Value::as_str) else {
        return false;
    };
    let value = value.to_lowercase();
    markers.iter().any(|m| value.contains(m.as_str()))
}
