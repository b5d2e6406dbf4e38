use anyhow::{Context, Result};
use std::{env, path::PathBuf};

pub const CLIENT_ID: &str = "9d1c250a-e61b-44d9-88ed-5944d1962f5e";
pub const AUTHORIZE_URL: &str = "https://console.anthropic.com/oauth/authorize";
pub const TOKEN_URL: &str = "https://console.anthropic.com/v1/oauth/token";
pub const REDIRECT_URI: &str = "https://console.anthropic.com/oauth/code/callback";
pub const SCOPE: &str = "org:create_api_key user:profile user:inference";

/// Overrides the store location for `account-usage` only.
pub const AUTH_FILE_ENV: &str = "AUTH_FILE";

/// The shared OpenCode credential store: ~/.local/share/opencode/auth.json
pub fn auth_file() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Cannot find home directory")?;
    Ok(home
        .join(".local")
        .join("share")
        .join("opencode")
        .join("auth.json"))
}

/// Store path for the usage report, honouring `AUTH_FILE` when it is set.
pub fn report_auth_file() -> Result<PathBuf> {
    match env::var_os(AUTH_FILE_ENV) {
        Some(path) if !path.is_empty() => Ok(PathBuf::from(path)),
        _ => auth_file(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{EnvGuard, ENV_LOCK};

    #[test]
    fn auth_file_lives_under_opencode_data_dir() {
        let path = auth_file().unwrap();
        assert!(path.ends_with(".local/share/opencode/auth.json"));
    }

    #[test]
    fn report_path_uses_env_override() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|err| err.into_inner());
        let temp_dir = tempfile::tempdir().unwrap();
        let custom = temp_dir.path().join("custom.json");
        let _guard = EnvGuard::set(AUTH_FILE_ENV, &custom);

        assert_eq!(report_auth_file().unwrap(), custom);
        assert_ne!(auth_file().unwrap(), custom);
    }

    #[test]
    fn empty_override_falls_back_to_default() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|err| err.into_inner());
        let _guard = EnvGuard::set(AUTH_FILE_ENV, std::path::Path::new(""));

        assert_eq!(report_auth_file().unwrap(), auth_file().unwrap());
    }
}
