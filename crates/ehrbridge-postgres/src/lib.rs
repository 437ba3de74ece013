//! PostgreSQL storage backend for the EHR bridge
//!
//! Provides persistent storage for:
//!
//! - Encrypted OAuth credentials (`credential_tokens`)
//! - Clinical access audit rows (`audit_trails`)
//! - Security events (`security_logs`)
//! - Permission grants (`permission_grants`, read-only)
//!
//! Tables are created by [`PostgresStore::migrate`] when missing.
//!
//! # Example
//!
//! ```ignore
//! use ehrbridge_postgres::PostgresStore;
//!
//! let store = PostgresStore::connect("postgres://localhost/ehrbridge").await?;
//! store.migrate().await?;
//!
//! let record = store.tokens().find_by_user("dr-1").await?;
//! ```

pub mod audit;
pub mod permission;
pub mod schema;
pub mod security_log;
pub mod storage_adapters;
pub mod token;

use std::sync::Arc;

use sqlx_core::pool::Pool;
use sqlx_postgres::Postgres;

/// PostgreSQL connection pool type alias.
pub type PgPool = Pool<Postgres>;

pub use audit::AuditTrailStorage;
pub use permission::PermissionStorage;
pub use security_log::SecurityLogStorage;
pub use storage_adapters::{ArcAuditStore, ArcCredentialStore, ArcPermissionStore};
pub use token::TokenStorage;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during PostgreSQL storage operations.
#[derive(Debug, thiserror::Error)]
pub enum PgStorageError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx_core::Error),

    /// Serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PgStorageError {
    /// Returns `true` if the pool could not reach the database.
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Database(
                sqlx_core::Error::Io(_)
                    | sqlx_core::Error::Tls(_)
                    | sqlx_core::Error::PoolTimedOut
                    | sqlx_core::Error::PoolClosed
                    | sqlx_core::Error::WorkerCrashed
            )
        )
    }
}

impl From<PgStorageError> for ehrbridge_storage::StorageError {
    fn from(err: PgStorageError) -> Self {
        use ehrbridge_storage::StorageError;

        if err.is_connection_error() {
            return StorageError::connection_error(err.to_string());
        }
        match err {
            PgStorageError::Serialization(e) => StorageError::serialization(e.to_string()),
            PgStorageError::Database(e) => StorageError::internal(e.to_string()),
        }
    }
}

/// Result type for PostgreSQL storage operations.
pub type PgResult<T> = Result<T, PgStorageError>;

// =============================================================================
// PostgreSQL Store
// =============================================================================

/// PostgreSQL storage backend for bridge data.
///
/// Holds a connection pool and hands out table-specific storage types.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: Arc<PgPool>,
}

impl PostgresStore {
    /// Create new storage with an existing connection pool.
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Create new storage by connecting to the database.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails.
    pub async fn connect(database_url: &str) -> PgResult<Self> {
        use sqlx_core::pool::PoolOptions;
        let pool = PoolOptions::<Postgres>::new().connect(database_url).await?;
        tracing::debug!("PostgreSQL connection pool created");
        Ok(Self::new(Arc::new(pool)))
    }

    /// Create missing tables and indexes.
    ///
    /// # Errors
    ///
    /// Returns an error if any DDL statement fails.
    pub async fn migrate(&self) -> PgResult<()> {
        schema::ensure_schema(&self.pool).await
    }

    /// Get a reference to the connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Get a reference to the Arc-wrapped pool.
    #[must_use]
    pub fn pool_arc(&self) -> Arc<PgPool> {
        Arc::clone(&self.pool)
    }

    // -------------------------------------------------------------------------
    // Storage Accessors
    // -------------------------------------------------------------------------

    /// Get credential token storage.
    #[must_use]
    pub fn tokens(&self) -> TokenStorage<'_> {
        TokenStorage::new(&self.pool)
    }

    /// Get audit trail storage.
    #[must_use]
    pub fn audit_trails(&self) -> AuditTrailStorage<'_> {
        AuditTrailStorage::new(&self.pool)
    }

    /// Get security log storage.
    #[must_use]
    pub fn security_logs(&self) -> SecurityLogStorage<'_> {
        SecurityLogStorage::new(&self.pool)
    }

    /// Get permission grant storage.
    #[must_use]
    pub fn permissions(&self) -> PermissionStorage<'_> {
        PermissionStorage::new(&self.pool)
    }

    // -------------------------------------------------------------------------
    // Trait-object adapters
    // -------------------------------------------------------------------------

    /// Arc-owning credential store adapter.
    #[must_use]
    pub fn credential_store(&self) -> ArcCredentialStore {
        ArcCredentialStore::new(self.pool_arc())
    }

    /// Arc-owning audit store adapter.
    #[must_use]
    pub fn audit_store(&self) -> ArcAuditStore {
        ArcAuditStore::new(self.pool_arc())
    }

    /// Arc-owning permission store adapter.
    #[must_use]
    pub fn permission_store(&self) -> ArcPermissionStore {
        ArcPermissionStore::new(self.pool_arc())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ehrbridge_storage::{ErrorCategory, StorageError};

    #[test]
    fn test_serialization_maps_to_validation() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let mapped: StorageError = PgStorageError::Serialization(json_err).into();
        assert_eq!(mapped.category(), ErrorCategory::Validation);
    }

    #[test]
    fn test_pool_timeout_is_transient() {
        let err = PgStorageError::Database(sqlx_core::Error::PoolTimedOut);
        assert!(err.is_connection_error());
        let mapped: StorageError = err.into();
        assert!(mapped.is_transient());
    }

    #[test]
    fn test_row_not_found_is_internal() {
        let err = PgStorageError::Database(sqlx_core::Error::RowNotFound);
        assert!(!err.is_connection_error());
        let mapped: StorageError = err.into();
        assert_eq!(mapped.category(), ErrorCategory::Internal);
    }
}
