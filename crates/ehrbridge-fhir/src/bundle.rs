//! Typed views over FHIR responses.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{GatewayError, GatewayResult};

/// A searchset (or other) Bundle, reduced to the parts the gateway uses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bundle {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub bundle_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub link: Vec<BundleLink>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entry: Vec<BundleEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleLink {
    pub relation: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<Value>,
}

impl Bundle {
    /// Resources carried by the entries, in order. Entries without a
    /// resource are skipped.
    #[must_use]
    pub fn resources(&self) -> Vec<&Value> {
        self.entry.iter().filter_map(|e| e.resource.as_ref()).collect()
    }

    /// Consumes the bundle, returning its resources.
    #[must_use]
    pub fn into_resources(self) -> Vec<Value> {
        self.entry.into_iter().filter_map(|e| e.resource).collect()
    }

    /// URL of the link with `relation`, e.g. `next`.
    #[must_use]
    pub fn link_url(&self, relation: &str) -> Option<&str> {
        self.link
            .iter()
            .find(|l| l.relation == relation)
            .map(|l| l.url.as_str())
    }
}

/// A parsed FHIR response: either a Bundle or a single resource.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedResource {
    Bundle(Bundle),
    Resource(Value),
}

impl ParsedResource {
    /// Classifies a JSON body by its `resourceType`.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::InvalidResponse` if the body is not a JSON
    /// object or a `Bundle` does not have bundle shape.
    pub fn from_value(value: Value) -> GatewayResult<Self> {
        let Some(object) = value.as_object() else {
            return Err(GatewayError::invalid_response(
                "FHIR response is not a JSON object",
            ));
        };

        if object.get("resourceType").and_then(Value::as_str) == Some("Bundle") {
            let bundle: Bundle = serde_json::from_value(value)
                .map_err(|e| GatewayError::invalid_response(format!("malformed Bundle: {e}")))?;
            return Ok(Self::Bundle(bundle));
        }
        Ok(Self::Resource(value))
    }

    /// Number of resources: bundle entries, or 1 for a single resource.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        match self {
            Self::Bundle(bundle) => bundle.resources().len(),
            Self::Resource(_) => 1,
        }
    }

    /// Flattens into the list of resources.
    #[must_use]
    pub fn into_resources(self) -> Vec<Value> {
        match self {
            Self::Bundle(bundle) => bundle.into_resources(),
            Self::Resource(value) => vec![value],
        }
    }

    #[must_use]
    pub fn as_bundle(&self) -> Option<&Bundle> {
        match self {
            Self::Bundle(bundle) => Some(bundle),
            Self::Resource(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bundle_parsing() {
        let parsed = ParsedResource::from_value(json!({
            "resourceType": "Bundle",
            "type": "searchset",
            "total": 2,
            "link": [
                {"relation": "self", "url": "https://ehr.example/fhir/Observation?page=1"},
                {"relation": "next", "url": "https://ehr.example/fhir/Observation?page=2"}
            ],
            "entry": [
                {"fullUrl": "https://ehr.example/fhir/Observation/1", "resource": {"resourceType": "Observation", "id": "1"}},
                {"search": {"mode": "outcome"}},
                {"resource": {"resourceType": "Observation", "id": "2"}}
            ]
        }))
        .unwrap();

        let bundle = parsed.as_bundle().unwrap();
        assert_eq!(bundle.bundle_type.as_deref(), Some("searchset"));
        assert_eq!(bundle.total, Some(2));
        assert_eq!(
            bundle.link_url("next"),
            Some("https://ehr.example/fhir/Observation?page=2")
        );
        assert_eq!(parsed.entry_count(), 2);

        let ids: Vec<_> = parsed
            .into_resources()
            .into_iter()
            .map(|r| r["id"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(ids, vec!["1", "2"]);
    }

    #[test]
    fn test_empty_bundle() {
        let parsed =
            ParsedResource::from_value(json!({"resourceType": "Bundle", "type": "searchset"}))
                .unwrap();
        assert_eq!(parsed.entry_count(), 0);
        assert!(parsed.as_bundle().unwrap().link_url("next").is_none());
    }

    #[test]
    fn test_single_resource() {
        let parsed =
            ParsedResource::from_value(json!({"resourceType": "Patient", "id": "p1"})).unwrap();
        assert!(parsed.as_bundle().is_none());
        assert_eq!(parsed.entry_count(), 1);
    }

    #[test]
    fn test_non_object_rejected() {
        let err = ParsedResource::from_value(json!(["not", "fhir"])).unwrap_err();
        assert!(matches!(err, GatewayError::InvalidResponse { .. }));

        let err =
            ParsedResource::from_value(json!({"resourceType": "Bundle", "entry": "oops"}))
                .unwrap_err();
        assert!(err.to_string().contains("malformed Bundle"));
    }
}
