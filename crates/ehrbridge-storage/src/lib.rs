//! # ehrbridge-storage
//!
//! Storage contract for the EHR bridge.
//!
//! The bridge persists four logical tables:
//!
//! - `credential_tokens` - encrypted OAuth credentials, one row per user
//! - `audit_trails` - append-only clinical access log
//! - `security_logs` - append-only security event log
//! - `permission_grants` - read-only entitlement tuples
//!
//! This crate defines the row types and the traits ([`CredentialStore`],
//! [`AuditStore`], [`PermissionStore`]) plus an [`InMemoryStore`] backend.
//! The PostgreSQL backend lives in `ehrbridge-postgres`.

mod error;
mod memory;
mod traits;
mod types;

pub use error::{ErrorCategory, StorageError};
pub use memory::InMemoryStore;
pub use traits::{AuditStore, CredentialStore, PermissionStore};
pub use types::{
    AuditTrailEntry, PermissionGrant, SecurityLogEntry, TokenRecord, WILDCARD_ACTION,
};

/// Type alias for a storage result.
pub type StorageResult<T> = Result<T, StorageError>;

/// Shared credential store handle.
pub type DynCredentialStore = std::sync::Arc<dyn CredentialStore>;

/// Shared audit store handle.
pub type DynAuditStore = std::sync::Arc<dyn AuditStore>;

/// Shared permission store handle.
pub type DynPermissionStore = std::sync::Arc<dyn PermissionStore>;
