//! Component wiring for one CLI invocation.

use std::sync::Arc;

use anyhow::{Context, Result};
use ehrbridge_auth::{AuthError, ComplianceService, OAuthClient, TokenManager};
use ehrbridge_config::{BridgeConfig, StorageBackend};
use ehrbridge_fhir::{CodingMarkerClassifier, FhirGateway};
use ehrbridge_postgres::PostgresStore;
use ehrbridge_storage::{DynAuditStore, DynCredentialStore, DynPermissionStore, InMemoryStore};

use crate::output::print_warning;

struct Stores {
    credentials: DynCredentialStore,
    audit: DynAuditStore,
    permissions: DynPermissionStore,
}

pub struct App {
    config: BridgeConfig,
    tokens: Arc<TokenManager>,
    compliance: ComplianceService,
}

impl App {
    /// Builds every component for `user_id` and resumes a persisted session.
    pub async fn build(config: BridgeConfig, user_id: &str) -> Result<Self> {
        let stores = open_stores(&config).await?;
        let cipher = Arc::new(config.encryption.cipher()?);
        let client = Arc::new(OAuthClient::new(
            config.oauth.clone(),
            config.fhir.normalized_base_url(),
            config.fhir.request_timeout(),
        )?);

        let compliance = ComplianceService::new(stores.audit, stores.permissions);
        let tokens = Arc::new(TokenManager::new(
            user_id,
            client,
            cipher,
            stores.credentials,
            compliance.clone(),
        ));

        match tokens.restore().await {
            Ok(restored) => {
                tracing::debug!(user_id, restored, "Session restore attempted");
            }
            Err(AuthError::Cipher(e)) => {
                print_warning(&format!(
                    "Stored session for '{user_id}' cannot be decrypted ({e}); sign in again"
                ));
            }
            Err(e) => return Err(e).context("Failed to restore session"),
        }

        Ok(Self {
            config,
            tokens,
            compliance,
        })
    }

    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    pub fn gateway(&self) -> Result<FhirGateway> {
        let classifier = CodingMarkerClassifier::from_settings(&self.config.classification);
        let gateway = FhirGateway::new(&self.config.fhir, self.tokens.clone(), self.compliance.clone())?
            .with_classifier(Arc::new(classifier));
        Ok(gateway)
    }

    pub fn uses_ephemeral_storage(&self) -> bool {
        self.config.storage.backend == StorageBackend::Memory
    }
}

async fn open_stores(config: &BridgeConfig) -> Result<Stores> {
    match config.storage.backend {
        StorageBackend::Memory => {
            let store = Arc::new(InMemoryStore::new());
            Ok(Stores {
                credentials: store.clone(),
                audit: store.clone(),
                permissions: store,
            })
        }
        StorageBackend::Postgres => {
            let url = config
                .storage
                .database_url
                .as_deref()
                .context("storage.database_url is required for the postgres backend")?;
            let store = PostgresStore::connect(url)
                .await
                .context("Failed to connect to PostgreSQL")?;
            store.migrate().await.context("Failed to apply schema")?;
            Ok(Stores {
                credentials: Arc::new(store.credential_store()),
                audit: Arc::new(store.audit_store()),
                permissions: Arc::new(store.permission_store()),
            })
        }
    }
}
