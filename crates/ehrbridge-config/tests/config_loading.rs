use std::{env, fs};

use ehrbridge_config::{ConfigError, SecretCipher, StorageBackend, load_config};

fn write_config(dir: &tempfile::TempDir, body: &str) -> String {
    let path = dir.path().join("ehrbridge.toml");
    fs::write(&path, body).expect("write toml");
    path.to_string_lossy().to_string()
}

#[test]
fn config_parsing_env_overrides_and_validation() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let key = hex_key();
    let toml_content = format!(
        r#"
[fhir]
base_url = "https://fhir.example.org/api/FHIR/R4"
request_timeout_secs = 20

[oauth]
client_id = "bridge-client"
redirect_uri = "https://app.example.org/callback"
authorization_endpoint = "https://fhir.example.org/oauth2/authorize"
token_endpoint = "https://fhir.example.org/oauth2/token"
scopes = ["openid", "fhirUser", "patient/*.read"]

[encryption]
key = "{key}"

[storage]
backend = "memory"

[logging]
level = "debug"

[classification]
system_markers = ["beaker"]
"#
    );
    let path = write_config(&dir, &toml_content);

    // 1) Valid config parses
    let cfg = load_config(Some(&path)).expect("should parse config");
    assert_eq!(cfg.oauth.client_id, "bridge-client");
    assert_eq!(cfg.oauth.scopes.len(), 3);
    assert_eq!(cfg.oauth.refresh_window_secs, 300);
    assert_eq!(cfg.fhir.request_timeout_secs, 20);
    assert_eq!(cfg.storage.backend, StorageBackend::Memory);
    assert_eq!(cfg.classification.system_markers, vec!["beaker"]);
    assert_eq!(cfg.classification.display_markers, vec!["beaker"]);
    assert!(!cfg.fhir.genomic_loinc_codes.is_empty());

    // 2) Env override should win over file
    unsafe {
        env::set_var("EHRBRIDGE__FHIR__REQUEST_TIMEOUT_SECS", "45");
    }
    let cfg_env = load_config(Some(&path)).expect("should parse config with env overrides");
    assert_eq!(cfg_env.fhir.request_timeout_secs, 45);
    unsafe {
        env::remove_var("EHRBRIDGE__FHIR__REQUEST_TIMEOUT_SECS");
    }

    // 3) Invalid values are rejected at load time
    let invalid = toml_content.replace("level = \"debug\"", "level = \"verbose\"");
    let invalid_path = write_config(&dir, &invalid);
    let err = load_config(Some(&invalid_path)).unwrap_err();
    assert!(matches!(err, ConfigError::Validation(_)));
}

#[test]
fn missing_config_file_is_an_error() {
    let err = load_config(Some("/definitely/not/here/ehrbridge.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Io(_)));
}

fn hex_key() -> String {
    SecretCipher::generate_key()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}
