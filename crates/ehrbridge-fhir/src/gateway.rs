//! Authenticated FHIR REST gateway.
//!
//! Every request obtains a bearer token from the session's [`TokenManager`]
//! (refreshing transparently), and every outcome is written to the audit
//! trail. Non-2xx responses are surfaced as [`GatewayError::RemoteApi`] and
//! never retried here.

use std::sync::Arc;

use ehrbridge_auth::{AuditAction, ComplianceService, SecurityEventType, TokenManager};
use ehrbridge_config::FhirSettings;
use serde_json::{Value, json};
use url::Url;

use crate::bundle::{Bundle, ParsedResource};
use crate::classify::{CodingMarkerClassifier, ReportClassifier};
use crate::error::{GatewayError, GatewayResult};
use crate::query::FhirQuery;

/// LOINC code system URI.
pub const LOINC_SYSTEM: &str = "http://loinc.org";

/// Default page size for lab report searches.
pub const DEFAULT_LAB_PAGE_SIZE: u32 = 50;

/// Gateway behavior switches.
#[derive(Debug, Clone)]
pub struct GatewayOptions {
    /// Check `(user, resourceType, "read")` grants before every fetch.
    pub enforce_permissions: bool,
    /// `_count` for lab report searches.
    pub lab_page_size: u32,
    /// LOINC codes selecting genomic observations.
    pub genomic_loinc_codes: Vec<String>,
}

impl Default for GatewayOptions {
    fn default() -> Self {
        Self::from_settings(&FhirSettings::default())
    }
}

impl GatewayOptions {
    #[must_use]
    pub fn from_settings(settings: &FhirSettings) -> Self {
        Self {
            enforce_permissions: false,
            lab_page_size: DEFAULT_LAB_PAGE_SIZE,
            genomic_loinc_codes: settings.genomic_loinc_codes.clone(),
        }
    }

    #[must_use]
    pub fn with_enforce_permissions(mut self, enforce: bool) -> Self {
        self.enforce_permissions = enforce;
        self
    }
}

/// What an HTTP GET is for, used for audit rows.
struct AccessTarget<'a> {
    resource_type: &'a str,
    resource_id: Option<&'a str>,
    action: AuditAction,
}

/// FHIR resource gateway for one signed-in clinician.
pub struct FhirGateway {
    base_url: Url,
    http: reqwest::Client,
    tokens: Arc<TokenManager>,
    compliance: ComplianceService,
    classifier: Arc<dyn ReportClassifier>,
    options: GatewayOptions,
}

impl FhirGateway {
    /// Creates a gateway over the configured FHIR base URL.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Configuration` if the base URL is not an
    /// absolute http(s) URL or the HTTP client cannot be built.
    pub fn new(
        settings: &FhirSettings,
        tokens: Arc<TokenManager>,
        compliance: ComplianceService,
    ) -> GatewayResult<Self> {
        let base_url = Url::parse(&settings.normalized_base_url())
            .map_err(|e| GatewayError::configuration(format!("invalid fhir.base_url: {e}")))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(GatewayError::configuration(
                "fhir.base_url must use http or https",
            ));
        }

        let http = reqwest::Client::builder()
            .timeout(settings.request_timeout())
            .build()
            .map_err(|e| GatewayError::configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url,
            http,
            tokens,
            compliance,
            classifier: Arc::new(CodingMarkerClassifier::default()),
            options: GatewayOptions::from_settings(settings),
        })
    }

    #[must_use]
    pub fn with_classifier(mut self, classifier: Arc<dyn ReportClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    #[must_use]
    pub fn with_options(mut self, options: GatewayOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    #[must_use]
    pub fn options(&self) -> &GatewayOptions {
        &self.options
    }

    fn user_id(&self) -> &str {
        self.tokens.user_id()
    }

    // -------------------------------------------------------------------------
    // Generic fetch
    // -------------------------------------------------------------------------

    /// Fetches a resource or search result.
    ///
    /// # Errors
    ///
    /// - `NotAuthenticated` when no valid token exists (no request is sent)
    /// - `PermissionDenied` when enforcement is on and no grant matches
    /// - `RemoteApi` for any non-2xx response
    /// - `Network`, `InvalidResponse`, `InvalidQuery`, `Auth` otherwise
    pub async fn fetch(&self, query: &FhirQuery) -> GatewayResult<ParsedResource> {
        let url = query.to_url(&self.base_url)?;
        let target = AccessTarget {
            resource_type: query.resource_type(),
            resource_id: query.id(),
            action: if query.id().is_some() {
                AuditAction::Read
            } else {
                AuditAction::Search
            },
        };
        self.get(url, &target).await
    }

    /// Reads one `Patient`.
    ///
    /// # Errors
    ///
    /// As [`Self::fetch`]; also `InvalidResponse` if the server returns a Bundle.
    pub async fn get_patient(&self, patient_id: &str) -> GatewayResult<Value> {
        match self
            .fetch(&FhirQuery::new("Patient").with_id(patient_id))
            .await?
        {
            ParsedResource::Resource(patient) => Ok(patient),
            ParsedResource::Bundle(_) => Err(GatewayError::invalid_response(
                "expected a Patient resource, got a Bundle",
            )),
        }
    }

    /// Follows a bundle's `next` link.
    ///
    /// Returns `Ok(None)` when there is no next page.
    ///
    /// # Errors
    ///
    /// Returns `InvalidQuery` if the link points outside the configured FHIR
    /// origin (the bearer token is never sent elsewhere), otherwise as
    /// [`Self::fetch`].
    pub async fn fetch_next_page(&self, bundle: &Bundle) -> GatewayResult<Option<Bundle>> {
        let Some(next) = bundle.link_url("next") else {
            return Ok(None);
        };
        let url = Url::parse(next)
            .or_else(|_| self.base_url.join(next))
            .map_err(|e| GatewayError::invalid_query(format!("invalid next link: {e}")))?;

        if url.origin() != self.base_url.origin() {
            tracing::warn!(
                user_id = %self.user_id(),
                next_origin = %url.origin().ascii_serialization(),
                "Refusing to follow next link to a foreign origin"
            );
            return Err(GatewayError::invalid_query(
                "next link points outside the FHIR server origin",
            ));
        }

        let resource_type = resource_type_from_path(&self.base_url, &url).unwrap_or("Bundle");
        let target = AccessTarget {
            resource_type,
            resource_id: None,
            action: AuditAction::Search,
        };
        match self.get(url.clone(), &target).await? {
            ParsedResource::Bundle(page) => Ok(Some(page)),
            ParsedResource::Resource(_) => Err(GatewayError::invalid_response(
                "next link did not return a Bundle",
            )),
        }
    }

    // -------------------------------------------------------------------------
    // Clinical convenience queries
    // -------------------------------------------------------------------------

    fn lab_report_query(&self, patient_id: &str) -> FhirQuery {
        FhirQuery::new("DiagnosticReport")
            .with_param("patient", patient_id)
            .with_param("category", "LAB")
            .with_sort("-date")
            .with_count(self.options.lab_page_size)
    }

    /// Every lab `DiagnosticReport` for the patient, unclassified.
    ///
    /// Other entries in the searchset (e.g. `OperationOutcome` warnings) are
    /// dropped.
    ///
    /// # Errors
    ///
    /// As [`Self::fetch`].
    pub async fn get_all_laboratory_reports(&self, patient_id: &str) -> GatewayResult<Vec<Value>> {
        let parsed = self.fetch(&self.lab_report_query(patient_id)).await?;
        Ok(parsed
            .into_resources()
            .into_iter()
            .filter(|r| r.get("resourceType").and_then(Value::as_str) == Some("DiagnosticReport"))
            .collect())
    }

    /// Lab reports the classifier attributes to the Beaker subsystem.
    ///
    /// # Errors
    ///
    /// As [`Self::fetch`].
    pub async fn get_beaker_reports(&self, patient_id: &str) -> GatewayResult<Vec<Value>> {
        let reports = self.get_all_laboratory_reports(patient_id).await?;
        let total = reports.len();
        let beaker: Vec<Value> = reports
            .into_iter()
            .filter(|report| self.classifier.matches(report))
            .collect();

        tracing::debug!(
            user_id = %self.user_id(),
            total,
            matched = beaker.len(),
            "Classified lab reports"
        );
        Ok(beaker)
    }

    /// Genomic-finding `Observation`s for the patient.
    ///
    /// # Errors
    ///
    /// Returns `InvalidQuery` when no LOINC codes are configured, otherwise
    /// as [`Self::fetch`].
    pub async fn get_genomic_observations(&self, patient_id: &str) -> GatewayResult<Vec<Value>> {
        let codes = self
            .options
            .genomic_loinc_codes
            .iter()
            .map(|code| code.trim())
            .filter(|code| !code.is_empty())
            .map(|code| format!("{LOINC_SYSTEM}|{code}"))
            .collect::<Vec<_>>();
        if codes.is_empty() {
            return Err(GatewayError::invalid_query(
                "no genomic LOINC codes configured",
            ));
        }
        let codes = codes.join(",");

        let query = FhirQuery::new("Observation")
            .with_param("patient", patient_id)
            .with_param("code", codes);
        Ok(self.fetch(&query).await?.into_resources())
    }

    // -------------------------------------------------------------------------
    // Transport
    // -------------------------------------------------------------------------

    async fn get(&self, url: Url, target: &AccessTarget<'_>) -> GatewayResult<ParsedResource> {
        if self.options.enforce_permissions {
            self.ensure_permitted(target.resource_type).await?;
        }

        let Some(token) = self.tokens.get_valid_token().await? else {
            tracing::info!(
                user_id = %self.user_id(),
                resource_type = target.resource_type,
                "Fetch rejected: not authenticated"
            );
            return Err(GatewayError::NotAuthenticated);
        };

        tracing::debug!(
            user_id = %self.user_id(),
            resource_type = target.resource_type,
            path = url.path(),
            "FHIR GET"
        );

        let response = match self
            .http
            .get(url)
            .bearer_auth(token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                self.audit(target, json!({ "error": e.to_string() })).await;
                return Err(e.into());
            }
        };

        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                self.audit(target, json!({ "status": status.as_u16(), "error": e.to_string() }))
                    .await;
                return Err(e.into());
            }
        };

        if !status.is_success() {
            tracing::warn!(
                user_id = %self.user_id(),
                resource_type = target.resource_type,
                status = status.as_u16(),
                "FHIR server returned an error"
            );
            self.audit(target, json!({ "status": status.as_u16(), "success": false }))
                .await;
            return Err(GatewayError::remote_api(status.as_u16(), body));
        }

        let parsed = serde_json::from_str::<Value>(&body)
            .map_err(|e| GatewayError::invalid_response(format!("response is not JSON: {e}")))
            .and_then(ParsedResource::from_value);

        match parsed {
            Ok(parsed) => {
                self.audit(
                    target,
                    json!({
                        "status": status.as_u16(),
                        "success": true,
                        "entries": parsed.entry_count(),
                    }),
                )
                .await;
                Ok(parsed)
            }
            Err(e) => {
                self.audit(
                    target,
                    json!({ "status": status.as_u16(), "success": false, "error": e.to_string() }),
                )
                .await;
                Err(e)
            }
        }
    }

    async fn ensure_permitted(&self, resource_type: &str) -> GatewayResult<()> {
        let user_id = self.user_id();
        let granted = self
            .compliance
            .check_permission(user_id, resource_type, "read")
            .await;

        if !granted {
            self.compliance
                .log_security_event(
                    SecurityEventType::PermissionCheck,
                    Some(user_id),
                    json!({ "resource": resource_type, "action": "read" }),
                    false,
                )
                .await;
            return Err(GatewayError::PermissionDenied {
                user_id: user_id.to_string(),
                resource_type: resource_type.to_string(),
            });
        }
        Ok(())
    }

    async fn audit(&self, target: &AccessTarget<'_>, details: Value) {
        self.compliance
            .create_audit_trail(
                self.user_id(),
                target.action,
                target.resource_type,
                target.resource_id,
                Some(details),
            )
            .await;
    }
}

impl std::fmt::Debug for FhirGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FhirGateway")
            .field("base_url", &self.base_url.as_str())
            .field("user_id", &self.user_id())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// First path segment below the base URL, e.g. `Observation`.
fn resource_type_from_path<'a>(base: &Url, url: &'a Url) -> Option<&'a str> {
    url.path()
        .strip_prefix(base.path())?
        .split('/')
        .next()
        .filter(|segment| !segment.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_type_from_path() {
        let base = Url::parse("https://ehr.example/api/FHIR/R4/").unwrap();
        let next = Url::parse("https://ehr.example/api/FHIR/R4/Observation?page=2").unwrap();
        assert_eq!(resource_type_from_path(&base, &next), Some("Observation"));

        let root = Url::parse("https://ehr.example/api/FHIR/R4/?_getpages=abc").unwrap();
        assert_eq!(resource_type_from_path(&base, &root), None);

        let elsewhere = Url::parse("https://ehr.example/other/Observation").unwrap();
        assert_eq!(resource_type_from_path(&base, &elsewhere), None);
    }

    #[test]
    fn test_options_from_settings() {
        let options = GatewayOptions::from_settings(&FhirSettings::default());
        assert!(!options.enforce_permissions);
        assert_eq!(options.lab_page_size, 50);
        assert!(options.genomic_loinc_codes.contains(&"69548-6".to_string()));
        assert!(options.with_enforce_permissions(true).enforce_permissions);
    }
}
