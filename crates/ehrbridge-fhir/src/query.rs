//! Outbound FHIR query description.

use url::Url;

use crate::error::{GatewayError, GatewayResult};

/// Resource type, optional id, and search parameters for one GET.
///
/// Immutable once built; rendering it to a URL has no side effects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FhirQuery {
    resource_type: String,
    id: Option<String>,
    params: Vec<(String, String)>,
}

impl FhirQuery {
    #[must_use]
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: None,
            params: Vec::new(),
        }
    }

    /// Read a single resource by id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    #[must_use]
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }

    /// Sets `_sort`, e.g. `-date` for newest first.
    #[must_use]
    pub fn with_sort(self, sort: impl Into<String>) -> Self {
        self.with_param("_sort", sort)
    }

    /// Sets `_count` (page size).
    #[must_use]
    pub fn with_count(self, count: u32) -> Self {
        self.with_param("_count", count.to_string())
    }

    #[must_use]
    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    #[must_use]
    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    /// Renders `{base}{resourceType}[/{id}][?params]`.
    ///
    /// `base` must end with `/`.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::InvalidQuery` if the resource type or id is not
    /// a valid FHIR token.
    pub fn to_url(&self, base: &Url) -> GatewayResult<Url> {
        if !is_resource_type(&self.resource_type) {
            return Err(GatewayError::invalid_query(format!(
                "'{}' is not a FHIR resource type",
                self.resource_type
            )));
        }

        let mut path = self.resource_type.clone();
        if let Some(id) = &self.id {
            if !is_resource_id(id) {
                return Err(GatewayError::invalid_query(format!(
                    "'{id}' is not a valid resource id"
                )));
            }
            path.push('/');
            path.push_str(id);
        }

        let mut url = base
            .join(&path)
            .map_err(|e| GatewayError::invalid_query(e.to_string()))?;
        if !self.params.is_empty() {
            url.query_pairs_mut().extend_pairs(&self.params);
        }
        Ok(url)
    }
}

/// FHIR resource type names: an uppercase letter followed by letters.
fn is_resource_type(value: &str) -> bool {
    let mut chars = value.chars();
    chars.next().is_some_and(|c| c.is_ascii_uppercase()) && chars.all(|c| c.is_ascii_alphabetic())
}

/// FHIR ids: 1-64 of `[A-Za-z0-9-.]`.
fn is_resource_id(value: &str) -> bool {
    (1..=64).contains(&value.len())
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://ehr.example/api/FHIR/R4/").unwrap()
    }

    #[test]
    fn test_search_url() {
        let url = FhirQuery::new("DiagnosticReport")
            .with_param("patient", "pat-1")
            .with_param("category", "LAB")
            .with_sort("-date")
            .with_count(50)
            .to_url(&base())
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://ehr.example/api/FHIR/R4/DiagnosticReport?patient=pat-1&category=LAB&_sort=-date&_count=50"
        );
    }

    #[test]
    fn test_read_url_has_no_query() {
        let url = FhirQuery::new("Patient")
            .with_id("abc.123")
            .to_url(&base())
            .unwrap();
        assert_eq!(url.as_str(), "https://ehr.example/api/FHIR/R4/Patient/abc.123");
        assert!(url.query().is_none());
    }

    #[test]
    fn test_param_values_are_encoded() {
        let url = FhirQuery::new("Observation")
            .with_param("code", "http://loinc.org|69548-6")
            .to_url(&base())
            .unwrap();
        assert_eq!(
            url.query(),
            Some("code=http%3A%2F%2Floinc.org%7C69548-6")
        );
        let pairs: Vec<_> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs[0].1, "http://loinc.org|69548-6");
    }

    #[test]
    fn test_rejects_path_tricks() {
        assert!(FhirQuery::new("../admin").to_url(&base()).is_err());
        assert!(FhirQuery::new("patient").to_url(&base()).is_err());
        assert!(
            FhirQuery::new("Patient")
                .with_id("a/b")
                .to_url(&base())
                .is_err()
        );
    }
}
