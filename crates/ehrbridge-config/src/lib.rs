//! Configuration and secret handling for the EHR bridge.
//!
//! This crate provides:
//! - [`BridgeConfig`] - layered configuration (TOML file + `EHRBRIDGE__*` environment)
//! - [`SecretCipher`] - AES-256-GCM encryption for tokens and secrets at rest
//!
//! Configuration errors are fatal at startup; callers are expected to load and
//! validate once, then hand the typed sections to the components that need them.

pub mod secrets;
pub mod settings;

pub use secrets::{CipherError, EncryptedBlob, KEY_SIZE, SecretCipher};
pub use settings::{
    BridgeConfig, ClassificationSettings, EncryptionSettings, FhirSettings, LoggingConfig,
    MAX_TOKEN_LIFETIME_SECS, OAuthSettings, StorageBackend, StorageSettings, load_config,
};

/// Error types for configuration operations
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Encryption error: {0}")]
    Encryption(String),
}

impl ConfigError {
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn encryption(msg: impl Into<String>) -> Self {
        Self::Encryption(msg.into())
    }
}

/// Result type for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;
