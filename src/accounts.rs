use anyhow::Result;
use chrono::Utc;
use colored::Colorize;
use std::{
    io::{self, Write},
    path::Path,
};

use crate::{
    config,
    error::AuthError,
    oauth::{self, AuthCode, TokenRequest},
    pkce::PkcePair,
    store::{self, Account, Upsert},
};

/// An enrollment in progress: the account name and the PKCE pair that must
/// outlive the browser round-trip.
#[derive(Debug, Clone)]
pub struct Enrollment {
    name: String,
    pkce: PkcePair,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Enrolled {
    pub account: Account,
    pub outcome: Upsert,
}

impl Enrollment {
    pub fn begin(name: &str) -> Result<Self, AuthError> {
        Self::with_pkce(name, PkcePair::generate())
    }

    pub fn with_pkce(name: &str, pkce: PkcePair) -> Result<Self, AuthError> {
        if name.trim().is_empty() {
            return Err(AuthError::MissingName);
        }
        Ok(Self {
            name: name.to_string(),
            pkce,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn authorize_url(&self) -> String {
        oauth::authorize_url(&self.pkce)
    }

    /// Build the token request from pasted callback text.
    pub fn token_request(&self, pasted: &str) -> Result<TokenRequest, AuthError> {
        let composite = oauth::extract_code(pasted);
        if composite.is_empty() {
            return Err(AuthError::MissingCode);
        }
        Ok(TokenRequest::authorization_code(
            AuthCode::split(&composite),
            &self.pkce.verifier,
        ))
    }
}

// ── Core function (no stdout) ─────────────────────────────────────────────────

/// Exchange the pasted code and upsert the account. The store is only
/// loaded and written once the exchange has succeeded.
pub fn core_enroll(
    enrollment: &Enrollment,
    pasted: &str,
    token_url: &str,
    store_path: &Path,
    now_ms: i64,
) -> Result<Enrolled> {
    let request = enrollment.token_request(pasted)?;
    let tokens = oauth::exchange_code(token_url, &request)?;

    let account = Account::from_tokens(enrollment.name(), &tokens, now_ms);
    let (updated, outcome) = store::upsert(store::load_or_default(store_path)?, account.clone());
    store::save(store_path, &updated)?;

    tracing::debug!(account = %account.name, ?outcome, path = %store_path.display(), "store saved");
    Ok(Enrolled { account, outcome })
}

// ── Add account ───────────────────────────────────────────────────────────────

pub fn add(name: &str) -> Result<()> {
    let enrollment = Enrollment::begin(name)?;
    let store_path = config::auth_file()?;

    println!("\n  {} {}\n", "Adding account:".bold(), name.cyan().bold());
    println!("  1. Open this URL in your browser:\n");
    println!("     {}\n", enrollment.authorize_url());
    println!("  2. Log in to your Anthropic account");
    println!("  3. After approval, you'll be redirected to a page showing a code");
    println!("  4. Copy the FULL URL from your browser's address bar\n");

    print!("  Paste the callback URL here: ");
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;

    println!("\n  {} Exchanging code for tokens...", "·".cyan());

    let enrolled = core_enroll(
        &enrollment,
        &input,
        config::TOKEN_URL,
        &store_path,
        Utc::now().timestamp_millis(),
    )?;

    match enrolled.outcome {
        Upsert::Updated => println!(
            "\n  {} Updated existing account: {}",
            "✓".green().bold(),
            name.bold()
        ),
        Upsert::Added => println!(
            "\n  {} Added new account: {}",
            "✓".green().bold(),
            name.bold()
        ),
    }
    println!("    Saved to {}", store_path.display().to_string().dimmed());
    println!("\n  Restart OpenCode to use the new account.\n");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TokenStub;
    use std::fs;

    const TOKENS: &str = r#"{"access_token":"acc-1","refresh_token":"ref-1","expires_in":3600}"#;

    fn fixed_pkce() -> PkcePair {
        PkcePair {
            verifier: "fixed-verifier".to_string(),
            challenge: crate::pkce::compute_challenge("fixed-verifier"),
        }
    }

    #[test]
    fn begin_requires_a_name() {
        assert!(matches!(Enrollment::begin(""), Err(AuthError::MissingName)));
        assert!(matches!(Enrollment::begin("  "), Err(AuthError::MissingName)));
        assert_eq!(Enrollment::begin("max-5x").unwrap().name(), "max-5x");
    }

    #[test]
    fn authorize_url_uses_verifier_as_state() {
        let enrollment = Enrollment::with_pkce("a", fixed_pkce()).unwrap();
        let url = enrollment.authorize_url();
        assert!(url.contains("&state=fixed-verifier"));
        assert!(url.contains(&format!("&code_challenge={}&", fixed_pkce().challenge)));
    }

    #[test]
    fn token_request_uses_pasted_state_and_local_verifier() {
        let enrollment = Enrollment::with_pkce("a", fixed_pkce()).unwrap();
        let request = enrollment
            .token_request("https://console.anthropic.com/oauth/code/callback?code=abc&state=xyz")
            .unwrap();
        assert_eq!(request.code, "abc");
        assert_eq!(request.state.as_deref(), Some("xyz"));
        assert_eq!(request.code_verifier, "fixed-verifier");
    }

    #[test]
    fn missing_code_fails_before_any_network_call() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth.json");
        let enrollment = Enrollment::with_pkce("a", fixed_pkce()).unwrap();

        // Nothing listens on this port; a request would surface as Transport.
        let err = core_enroll(
            &enrollment,
            "https://console.anthropic.com/oauth/code/callback?state=xyz",
            "http://127.0.0.1:9/v1/oauth/token",
            &path,
            0,
        )
        .unwrap_err();

        assert!(matches!(err.downcast_ref::<AuthError>(), Some(AuthError::MissingCode)));
        assert!(!path.exists());
    }

    #[test]
    fn enroll_creates_store_and_computes_expiry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("opencode").join("auth.json");
        let stub = TokenStub::respond("200 OK", TOKENS);
        let enrollment = Enrollment::with_pkce("max-5x", fixed_pkce()).unwrap();
        let now = 1_700_000_000_000;

        let enrolled = core_enroll(&enrollment, "abc#xyz", &stub.url, &path, now).unwrap();

        assert_eq!(enrolled.outcome, Upsert::Added);
        assert_eq!(enrolled.account.expires, now + 3_600_000);

        let body = stub.request_body();
        assert_eq!(body["code"], "abc");
        assert_eq!(body["state"], "xyz");
        assert_eq!(body["code_verifier"], "fixed-verifier");

        let saved = store::load_strict(&path).unwrap();
        assert_eq!(saved.accounts(), [enrolled.account]);
    }

    #[test]
    fn rejected_exchange_leaves_store_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth.json");
        let before = "{\n  \"anthropic\": {\"multiAccounts\": {\"accounts\": []}}, \"x\": 1\n}";
        fs::write(&path, before).unwrap();
        let stub = TokenStub::respond("401 Unauthorized", r#"{"error":"invalid_grant"}"#);
        let enrollment = Enrollment::with_pkce("a", fixed_pkce()).unwrap();

        let err = core_enroll(&enrollment, "abc#xyz", &stub.url, &path, 0).unwrap_err();
        stub.request_body();

        match err.downcast_ref::<AuthError>() {
            Some(AuthError::TokenExchange { status, body }) => {
                assert_eq!(*status, 401);
                assert!(body.contains("invalid_grant"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(fs::read_to_string(&path).unwrap(), before);
    }
}
