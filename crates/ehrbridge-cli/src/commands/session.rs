use std::io::{self, BufRead, Write};

use anyhow::{Context, Result, bail};
use colored::Colorize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use url::Url;

use crate::app::App;
use crate::cli::{ExchangeArgs, OutputFormat};
use crate::output::{print_json, print_success, print_warning};

/// What the EHR sent back to the redirect URI.
#[derive(Debug, PartialEq, Eq)]
pub struct RedirectResponse {
    pub code: String,
    pub state: Option<String>,
}

/// Accepts either the full redirect URL or a bare authorization code.
pub fn parse_redirect(input: &str) -> Result<RedirectResponse> {
    let input = input.trim();
    if input.is_empty() {
        bail!("No authorization code given");
    }

    let Ok(url) = Url::parse(input) else {
        return Ok(RedirectResponse {
            code: input.to_string(),
            state: None,
        });
    };

    let mut code = None;
    let mut state = None;
    let mut error = None;
    let mut description = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            "error_description" => description = Some(value.into_owned()),
            _ => {}
        }
    }

    if let Some(error) = error {
        match description {
            Some(description) => bail!("Authorization denied: {error} ({description})"),
            None => bail!("Authorization denied: {error}"),
        }
    }
    let code = code.context("Redirect URL has no 'code' parameter")?;
    Ok(RedirectResponse { code, state })
}

/// Returns the redirect's state once it matches the one issued with the
/// authorization URL. A redirect without state cannot be tied to this
/// sign-in and is refused.
pub fn verified_state<'a>(expected: &str, response: &'a RedirectResponse) -> Result<&'a str> {
    match response.state.as_deref() {
        None => bail!(
            "The redirect carries no state; paste the full redirect URL so it can be matched to this authorization"
        ),
        Some(returned) if returned != expected => {
            bail!("State mismatch: the redirect does not belong to this authorization")
        }
        Some(returned) => Ok(returned),
    }
}

pub async fn authorize(app: &App) -> Result<()> {
    let (url, session) = app.tokens().begin_authorization().await;
    println!("{}: {}", "Open".cyan(), url);
    println!("{}: {}", "State".cyan(), session.state);
    println!(
        "Then run {} with the redirect URL.",
        format!("ehrbridge exchange --state {} --code <redirect-url>", session.state).bold()
    );
    Ok(())
}

pub async fn login(app: &App) -> Result<()> {
    let (url, session) = app.tokens().begin_authorization().await;
    println!("Open this URL in a browser and sign in:\n\n  {url}\n");
    print!("Paste the redirect URL: ");
    io::stdout().flush().context("Failed to flush stdout")?;

    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read from stdin")?;
    let response = parse_redirect(&line)?;
    let state = verified_state(&session.state, &response)?;

    let record = app
        .tokens()
        .complete_authorization(&response.code, state)
        .await
        .context("Sign-in failed")?;

    print_success(&format!(
        "Signed in as {} (expires {})",
        app.tokens().user_id().cyan(),
        format_instant(record.expires_at)
    ));
    warn_if_ephemeral(app);
    Ok(())
}

pub async fn exchange(app: &App, args: &ExchangeArgs) -> Result<()> {
    let response = parse_redirect(&args.code)?;
    if let Some(expected) = &args.state {
        verified_state(expected, &response)?;
    }

    let record = app
        .tokens()
        .exchange_code(&response.code)
        .await
        .context("Code exchange failed")?;

    print_success(&format!(
        "Tokens stored for {} (expires {})",
        app.tokens().user_id().cyan(),
        format_instant(record.expires_at)
    ));
    warn_if_ephemeral(app);
    Ok(())
}

pub fn status(app: &App, format: OutputFormat) -> Result<()> {
    let status = app.tokens().status();

    if format == OutputFormat::Json {
        print_json(&serde_json::json!({
            "user_id": status.user_id,
            "authenticated": status.authenticated,
            "expires_at": status.expires_at.map(format_instant),
            "has_refresh_token": status.has_refresh_token,
            "scope": status.scope,
            "patient": status.patient,
        }));
        return Ok(());
    }

    let auth_label = if status.authenticated {
        "yes".green()
    } else {
        "no".red()
    };
    println!("{}: {}", "User".cyan(), status.user_id);
    println!("{}: {}", "Authenticated".cyan(), auth_label);
    if let Some(expires_at) = status.expires_at {
        println!("{}: {}", "Expires".cyan(), format_instant(expires_at));
    }
    println!(
        "{}: {}",
        "Refresh token".cyan(),
        if status.has_refresh_token { "yes" } else { "no" }
    );
    if let Some(scope) = &status.scope {
        println!("{}: {}", "Scope".cyan(), scope);
    }
    if let Some(patient) = &status.patient {
        println!("{}: {}", "Patient context".cyan(), patient);
    }
    Ok(())
}

pub async fn logout(app: &App) -> Result<()> {
    app.tokens().logout().await;
    print_success(&format!("Signed out {}", app.tokens().user_id().cyan()));
    Ok(())
}

fn warn_if_ephemeral(app: &App) {
    if app.uses_ephemeral_storage() {
        print_warning("storage.backend is 'memory'; the session ends with this process");
    }
}

fn format_instant(instant: OffsetDateTime) -> String {
    instant
        .format(&Rfc3339)
        .unwrap_or_else(|_| instant.unix_timestamp().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_code() {
        let parsed = parse_redirect("  abc123\n").unwrap();
        assert_eq!(
            parsed,
            RedirectResponse {
                code: "abc123".to_string(),
                state: None
            }
        );
    }

    #[test]
    fn test_redirect_url() {
        let parsed =
            parse_redirect("https://app.example/callback?code=xyz&state=s-1&session_state=q")
                .unwrap();
        assert_eq!(parsed.code, "xyz");
        assert_eq!(parsed.state.as_deref(), Some("s-1"));
    }

    #[test]
    fn test_redirect_error() {
        let err = parse_redirect(
            "https://app.example/callback?error=access_denied&error_description=User+cancelled",
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Authorization denied: access_denied (User cancelled)"
        );
    }

    #[test]
    fn test_state_must_match() {
        let response = parse_redirect("https://app.example/callback?code=xyz&state=s-1").unwrap();
        assert_eq!(verified_state("s-1", &response).unwrap(), "s-1");

        let err = verified_state("s-2", &response).unwrap_err();
        assert!(err.to_string().contains("State mismatch"));
    }

    #[test]
    fn test_missing_state_is_refused() {
        let bare = parse_redirect("abc123").unwrap();
        assert!(verified_state("s-1", &bare).is_err());

        let stateless = parse_redirect("https://app.example/callback?code=xyz").unwrap();
        let err = verified_state("s-1", &stateless).unwrap_err();
        assert!(err.to_string().contains("no state"));
    }

    #[test]
    fn test_redirect_without_code() {
        assert!(parse_redirect("https://app.example/callback?state=s-1").is_err());
        assert!(parse_redirect("   ").is_err());
    }
}
