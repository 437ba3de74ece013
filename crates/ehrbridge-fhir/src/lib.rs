//! FHIR resource gateway for a signed-in clinician.
//!
//! [`FhirGateway`] issues authenticated GETs against the configured FHIR
//! base URL, using a [`ehrbridge_auth::TokenManager`] for bearer tokens and
//! a [`ehrbridge_auth::ComplianceService`] for audit rows. On top of the
//! generic [`FhirGateway::fetch`] it offers the clinical queries the bridge
//! needs: lab reports (with Beaker classification), genomic observations,
//! and patient reads.
//!
//! # Example
//!
//! ```ignore
//! let gateway = FhirGateway::new(&config.fhir, tokens, compliance)?;
//! for report in gateway.get_beaker_reports("pat-42").await? {
//!     println!("{}", report["id"]);
//! }
//! ```

pub mod bundle;
pub mod classify;
pub mod error;
pub mod gateway;
pub mod query;

pub use bundle::{Bundle, BundleEntry, BundleLink, ParsedResource};
pub use classify::{CodingMarkerClassifier, ReportClassifier};
pub use error::{GatewayError, GatewayResult};
pub use gateway::{DEFAULT_LAB_PAGE_SIZE, FhirGateway, GatewayOptions, LOINC_SYSTEM};
pub use query::FhirQuery;
