//! Multi-account Anthropic OAuth for OpenCode.
//!
//! `add-account` runs the PKCE authorization-code flow and upserts the
//! resulting account into `~/.local/share/opencode/auth.json`;
//! `account-usage` renders the quota usage recorded in the same file.

pub mod accounts;
pub mod config;
pub mod error;
pub mod logging;
pub mod oauth;
pub mod pkce;
pub mod store;
pub mod usage;

#[cfg(test)]
mod test_support;

pub use error::AuthError;
