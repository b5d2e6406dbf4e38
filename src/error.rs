use thiserror::Error;

/// Failures of the enrollment flow that leave the store untouched.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("An account name is required")]
    MissingName,

    #[error("Could not extract code from URL")]
    MissingCode,

    #[error("Token exchange failed: {status}\n{body}")]
    TokenExchange { status: u16, body: String },

    #[error("Token request failed: {0}")]
    Transport(String),

    #[error("Unexpected token response: {0}")]
    InvalidResponse(String),
}
