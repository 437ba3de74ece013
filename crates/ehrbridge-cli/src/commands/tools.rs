use anyhow::Result;
use colored::Colorize;
use ehrbridge_auth::compliance::{detect_phi, sanitize_phi};
use ehrbridge_config::SecretCipher;

pub fn keygen() -> Result<()> {
    let key = hex::encode(SecretCipher::generate_key());
    println!("{key}");
    eprintln!(
        "{}",
        "Set as EHRBRIDGE__ENCRYPTION__KEY. Tokens encrypted with a previous key become unreadable."
            .dimmed()
    );
    Ok(())
}

pub fn redact(text: &str) -> Result<()> {
    let kinds = detect_phi(text);
    println!("{}", sanitize_phi(text));
    if !kinds.is_empty() {
        let labels: Vec<&str> = kinds.iter().map(|k| k.label()).collect();
        eprintln!("{}: {}", "Redacted".cyan(), labels.join(", "));
    }
    Ok(())
}
