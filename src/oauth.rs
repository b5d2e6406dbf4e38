use serde::{Deserialize, Serialize};

use crate::{
    config::{AUTHORIZE_URL, CLIENT_ID, REDIRECT_URI, SCOPE},
    error::AuthError,
    pkce::PkcePair,
};

// ── Authorization request ─────────────────────────────────────────────────────

/// Authorization URL for the browser leg. The verifier rides along as
/// `state` and comes back in the callback.
pub fn authorize_url(pkce: &PkcePair) -> String {
    let params = [
        ("code", "true"),
        ("client_id", CLIENT_ID),
        ("response_type", "code"),
        ("redirect_uri", REDIRECT_URI),
        ("scope", SCOPE),
        ("code_challenge", pkce.challenge.as_str()),
        ("code_challenge_method", "S256"),
        ("state", pkce.verifier.as_str()),
    ];

    let query = params
        .iter()
        .map(|(key, value)| format!("{key}={}", form_encode(value)))
        .collect::<Vec<_>>()
        .join("&");

    format!("{AUTHORIZE_URL}?{query}")
}

fn form_encode(value: &str) -> String {
    urlencoding::encode(value).replace("%20", "+")
}

fn form_decode(value: &str) -> String {
    let spaced = value.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => spaced.clone(),
    }
}

// ── Callback capture ──────────────────────────────────────────────────────────

/// Turn whatever the operator pasted into a `code#state` composite.
///
/// A callback URL yields `code#state` when both parameters are present and
/// `code` alone otherwise (empty when the URL carries no code). Anything that
/// is not a URL is taken verbatim, which also covers the `code#state` string
/// shown on the callback page.
pub fn extract_code(pasted: &str) -> String {
    let pasted = pasted.trim();

    let Some(params) = query_params(pasted) else {
        return pasted.to_string();
    };

    let first = |name: &str| {
        params
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.clone())
            .unwrap_or_default()
    };

    let code = first("code");
    let state = first("state");
    if !code.is_empty() && !state.is_empty() {
        format!("{code}#{state}")
    } else {
        code
    }
}

/// Query pairs of an absolute URL, or `None` when `raw` is not one.
fn query_params(raw: &str) -> Option<Vec<(String, String)>> {
    let (scheme, rest) = raw.split_once("://")?;
    let valid_scheme = scheme.starts_with(|c: char| c.is_ascii_alphabetic())
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    if !valid_scheme || rest.is_empty() || raw.contains(char::is_whitespace) {
        return None;
    }

    let without_fragment = rest.split('#').next().unwrap_or_default();
    let query = without_fragment
        .split_once('?')
        .map(|(_, query)| query)
        .unwrap_or_default();

    Some(
        query
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| {
                let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
                (form_decode(key), form_decode(value))
            })
            .collect(),
    )
}

/// Authorization code and the `state` it was issued with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthCode {
    pub code: String,
    pub state: Option<String>,
}

impl AuthCode {
    /// `code#state`: the first segment is the code, the second (when a `#`
    /// is present, even if empty) is the state. Later segments are ignored.
    pub fn split(composite: &str) -> Self {
        let mut parts = composite.split('#');
        Self {
            code: parts.next().unwrap_or_default().to_string(),
            state: parts.next().map(str::to_string),
        }
    }
}

// ── Token exchange ────────────────────────────────────────────────────────────

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct TokenRequest {
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    pub grant_type: &'static str,
    pub client_id: &'static str,
    pub redirect_uri: &'static str,
    pub code_verifier: String,
}

impl TokenRequest {
    pub fn authorization_code(auth_code: AuthCode, verifier: &str) -> Self {
        Self {
            code: auth_code.code,
            state: auth_code.state,
            grant_type: "authorization_code",
            client_id: CLIENT_ID,
            redirect_uri: REDIRECT_URI,
            code_verifier: verifier.to_string(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    /// Lifetime in seconds.
    pub expires_in: i64,
}

/// Single POST to the token endpoint. No retry, no timeout.
pub fn exchange_code(token_url: &str, request: &TokenRequest) -> Result<TokenResponse, AuthError> {
    tracing::debug!(url = token_url, has_state = request.state.is_some(), "exchanging authorization code");

    match ureq::post(token_url)
        .set("Content-Type", "application/json")
        .send_json(request)
    {
        Ok(response) => response
            .into_json::<TokenResponse>()
            .map_err(|e| AuthError::InvalidResponse(e.to_string())),
        Err(ureq::Error::Status(status, response)) => {
            let body = response.into_string().unwrap_or_default();
            tracing::warn!(status, "token endpoint rejected the code");
            Err(AuthError::TokenExchange { status, body })
        }
        Err(err) => Err(AuthError::Transport(err.to_string())),
    }
}

/// Absolute expiry in epoch milliseconds.
pub fn expires_at(now_ms: i64, expires_in: i64) -> i64 {
    now_ms + expires_in * 1000
}
