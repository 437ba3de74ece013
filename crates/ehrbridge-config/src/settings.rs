use serde::{Deserialize, Serialize};
use url::Url;

use crate::secrets::SecretCipher;
use crate::{ConfigError, Result};

/// LOINC codes identifying genomic-finding observations.
const DEFAULT_GENOMIC_LOINC_CODES: &[&str] = &[
    "69548-6", // Genetic variant assessment
    "81247-9", // Master HL7 genetic variant reporting panel
    "51969-4", // Genetic analysis report
    "55233-1", // Genetic analysis master panel
    "48018-6", // Gene studied [ID]
];

/// Longest access-token lifetime accepted from configuration or a provider.
pub const MAX_TOKEN_LIFETIME_SECS: i64 = 365 * 24 * 60 * 60;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BridgeConfig {
    #[serde(default)]
    pub fhir: FhirSettings,
    #[serde(default)]
    pub oauth: OAuthSettings,
    #[serde(default)]
    pub encryption: EncryptionSettings,
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Markers used to pick lab-subsystem reports out of DiagnosticReport results
    #[serde(default)]
    pub classification: ClassificationSettings,
}

impl BridgeConfig {
    pub fn validate(&self) -> Result<()> {
        // OAuth validations
        if self.oauth.client_id.trim().is_empty() {
            return Err(ConfigError::validation("oauth.client_id must be set"));
        }
        require_absolute_url("fhir.base_url", &self.fhir.base_url)?;
        require_absolute_url("oauth.redirect_uri", &self.oauth.redirect_uri)?;
        require_absolute_url(
            "oauth.authorization_endpoint",
            &self.oauth.authorization_endpoint,
        )?;
        require_absolute_url("oauth.token_endpoint", &self.oauth.token_endpoint)?;
        if self.oauth.scopes.is_empty() {
            return Err(ConfigError::validation("oauth.scopes must not be empty"));
        }
        if !(1..=MAX_TOKEN_LIFETIME_SECS).contains(&self.oauth.default_expires_in_secs) {
            return Err(ConfigError::validation(format!(
                "oauth.default_expires_in_secs must be between 1 and {MAX_TOKEN_LIFETIME_SECS}"
            )));
        }
        // HTTP timeout validation
        if !(1..=120).contains(&self.fhir.request_timeout_secs) {
            return Err(ConfigError::validation(
                "fhir.request_timeout_secs must be between 1 and 120",
            ));
        }
        if self.fhir.genomic_loinc_codes.iter().all(|c| c.trim().is_empty()) {
            return Err(ConfigError::validation(
                "fhir.genomic_loinc_codes must contain at least one code",
            ));
        }
        // Encryption key must be present and well-formed
        self.encryption.cipher()?;
        // Storage validation
        if self.storage.backend == StorageBackend::Postgres
            && self
                .storage
                .database_url
                .as_deref()
                .unwrap_or("")
                .is_empty()
        {
            return Err(ConfigError::validation(
                "storage.backend=postgres requires storage.database_url",
            ));
        }
        // Logging validation
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(ConfigError::validation(format!(
                "logging.level must be one of {valid_levels:?}"
            )));
        }
        Ok(())
    }
}

fn require_absolute_url(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(ConfigError::validation(format!("{field} must be set")));
    }
    let url = Url::parse(value)
        .map_err(|e| ConfigError::validation(format!("{field} is not a valid URL: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::validation(format!(
            "{field} must use http or https"
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FhirSettings {
    /// FHIR API base, e.g. `https://fhir.example.org/api/FHIR/R4/`
    pub base_url: String,
    pub request_timeout_secs: u64,
    pub genomic_loinc_codes: Vec<String>,
}

impl Default for FhirSettings {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            request_timeout_secs: 30,
            genomic_loinc_codes: DEFAULT_GENOMIC_LOINC_CODES
                .iter()
                .map(|c| (*c).to_string())
                .collect(),
        }
    }
}

impl FhirSettings {
    /// Base URL guaranteed to end with `/`, so resource paths can be appended.
    #[must_use]
    pub fn normalized_base_url(&self) -> String {
        let trimmed = self.base_url.trim();
        if trimmed.ends_with('/') {
            trimmed.to_string()
        } else {
            format!("{trimmed}/")
        }
    }

    #[must_use]
    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthSettings {
    pub client_id: String,
    /// Only set for confidential clients.
    pub client_secret: Option<String>,
    pub redirect_uri: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub scopes: Vec<String>,
    /// Tokens expiring within this window are refreshed before use.
    pub refresh_window_secs: i64,
    /// Applied when the token response omits `expires_in`.
    pub default_expires_in_secs: i64,
}

impl Default for OAuthSettings {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: None,
            redirect_uri: String::new(),
            authorization_endpoint: String::new(),
            token_endpoint: String::new(),
            scopes: vec!["openid".to_string(), "fhirUser".to_string()],
            refresh_window_secs: 300,
            default_expires_in_secs: 3600,
        }
    }
}

impl std::fmt::Debug for OAuthSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthSettings")
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "<redacted>"),
            )
            .field("redirect_uri", &self.redirect_uri)
            .field("authorization_endpoint", &self.authorization_endpoint)
            .field("token_endpoint", &self.token_endpoint)
            .field("scopes", &self.scopes)
            .field("refresh_window_secs", &self.refresh_window_secs)
            .field("default_expires_in_secs", &self.default_expires_in_secs)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EncryptionSettings {
    /// 32-byte key, hex (64 chars) or base64 encoded.
    /// Prefer EHRBRIDGE__ENCRYPTION__KEY over writing it to a file.
    pub key: Option<String>,
}

impl EncryptionSettings {
    /// Build the process-wide cipher from the configured key.
    pub fn cipher(&self) -> Result<SecretCipher> {
        let key = self
            .key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ConfigError::encryption("encryption.key must be set"))?;
        SecretCipher::from_encoded_key(key).map_err(|e| ConfigError::encryption(e.to_string()))
    }
}

impl std::fmt::Debug for EncryptionSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionSettings")
            .field("key", &self.key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StorageSettings {
    pub backend: StorageBackend,
    pub database_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Case-insensitive substrings matched against `code.coding[]` entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassificationSettings {
    pub system_markers: Vec<String>,
    pub display_markers: Vec<String>,
    pub code_markers: Vec<String>,
}

impl Default for ClassificationSettings {
    fn default() -> Self {
        Self {
            system_markers: vec!["beaker".to_string(), "sunquest".to_string()],
            display_markers: vec!["beaker".to_string()],
            code_markers: vec!["beaker".to_string()],
        }
    }
}

pub use loader::load_config;

pub mod loader {
    use super::BridgeConfig;
    use crate::{ConfigError, Result};
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    /// Default configuration file looked up in the working directory.
    pub const DEFAULT_CONFIG_FILE: &str = "ehrbridge.toml";

    pub fn load_config(path: Option<&str>) -> Result<BridgeConfig> {
        let mut builder = Config::builder();
        match path {
            Some(p) => {
                let pathbuf = PathBuf::from(p);
                if !pathbuf.exists() {
                    return Err(ConfigError::Io(std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        format!("config file not found: {p}"),
                    )));
                }
                builder = builder.add_source(File::from(pathbuf));
            }
            None => {
                let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    builder = builder.add_source(File::from(default_path));
                }
            }
        }
        // Environment variable overrides, e.g., EHRBRIDGE__OAUTH__CLIENT_ID=abc
        builder = builder.add_source(
            Environment::with_prefix("EHRBRIDGE")
                .try_parsing(true)
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("oauth.scopes")
                .with_list_parse_key("fhir.genomic_loinc_codes"),
        );
        let cfg = builder
            .build()
            .map_err(|e| ConfigError::parse(format!("config build error: {e}")))?;
        let merged: BridgeConfig = cfg
            .try_deserialize()
            .map_err(|e| ConfigError::parse(format!("config deserialize error: {e}")))?;
        merged.validate()?;
        tracing::debug!(
            fhir_base_url = %merged.fhir.base_url,
            storage_backend = ?merged.storage.backend,
            "Configuration loaded"
        );
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> BridgeConfig {
        BridgeConfig {
            fhir: FhirSettings {
                base_url: "https://fhir.example.org/api/FHIR/R4".to_string(),
                ..FhirSettings::default()
            },
            oauth: OAuthSettings {
                client_id: "client-123".to_string(),
                redirect_uri: "https://app.example.org/callback".to_string(),
                authorization_endpoint: "https://fhir.example.org/oauth2/authorize".to_string(),
                token_endpoint: "https://fhir.example.org/oauth2/token".to_string(),
                ..OAuthSettings::default()
            },
            encryption: EncryptionSettings {
                key: Some(hex::encode(SecretCipher::generate_key())),
            },
            ..BridgeConfig::default()
        }
    }

    #[test]
    fn test_valid_config_passes() {
        valid_config().validate().unwrap();
    }

    #[test]
    fn test_missing_client_id_rejected() {
        let mut cfg = valid_config();
        cfg.oauth.client_id = "  ".to_string();
        let err = cfg.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Validation(ref m) if m.contains("client_id")));
    }

    #[test]
    fn test_relative_endpoint_rejected() {
        let mut cfg = valid_config();
        cfg.oauth.token_endpoint = "/oauth2/token".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_missing_encryption_key_rejected() {
        let mut cfg = valid_config();
        cfg.encryption.key = None;
        assert!(matches!(
            cfg.validate().unwrap_err(),
            ConfigError::Encryption(_)
        ));
    }

    #[test]
    fn test_postgres_requires_database_url() {
        let mut cfg = valid_config();
        cfg.storage.backend = StorageBackend::Postgres;
        assert!(cfg.validate().is_err());
        cfg.storage.database_url = Some("postgres://localhost/ehrbridge".to_string());
        cfg.validate().unwrap();
    }

    #[test]
    fn test_timeout_bounds() {
        let mut cfg = valid_config();
        cfg.fhir.request_timeout_secs = 0;
        assert!(cfg.validate().is_err());
        cfg.fhir.request_timeout_secs = 121;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_default_expiry_upper_bound() {
        let mut cfg = valid_config();
        cfg.oauth.default_expires_in_secs = MAX_TOKEN_LIFETIME_SECS;
        cfg.validate().unwrap();
        cfg.oauth.default_expires_in_secs = i64::MAX;
        let err = cfg.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Validation(ref m) if m.contains("default_expires_in_secs")));
    }

    #[test]
    fn test_empty_genomic_codes_rejected() {
        let mut cfg = valid_config();
        cfg.fhir.genomic_loinc_codes = Vec::new();
        let err = cfg.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Validation(ref m) if m.contains("genomic_loinc_codes")));
        cfg.fhir.genomic_loinc_codes = vec![" ".to_string()];
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_normalized_base_url() {
        let cfg = valid_config();
        assert_eq!(
            cfg.fhir.normalized_base_url(),
            "https://fhir.example.org/api/FHIR/R4/"
        );
        let already = FhirSettings {
            base_url: "https://fhir.example.org/R4/".to_string(),
            ..FhirSettings::default()
        };
        assert_eq!(already.normalized_base_url(), "https://fhir.example.org/R4/");
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let mut cfg = valid_config();
        cfg.oauth.client_secret = Some("super-secret".to_string());
        let debug = format!("{cfg:?}");
        assert!(!debug.contains("super-secret"));
        assert!(!debug.contains(cfg.encryption.key.as_deref().unwrap()));
    }

    #[test]
    fn test_classification_defaults() {
        let settings = ClassificationSettings::default();
        assert_eq!(settings.system_markers, vec!["beaker", "sunquest"]);
        assert_eq!(settings.display_markers, vec!["beaker"]);
    }
}
