use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::{
    fs,
    io::{ErrorKind, Write},
    path::Path,
};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

use crate::oauth::{self, TokenResponse};

// ── Document shape ────────────────────────────────────────────────────────────

/// Root of auth.json. Providers other than `anthropic` pass through untouched.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AuthFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anthropic: Option<ProviderEntry>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl Default for AuthFile {
    fn default() -> Self {
        Self {
            anthropic: Some(ProviderEntry {
                multi_accounts: Some(MultiAccounts::default()),
                extra: Map::new(),
            }),
            other: Map::new(),
        }
    }
}

impl AuthFile {
    pub fn multi_accounts(&self) -> Option<&MultiAccounts> {
        self.anthropic.as_ref()?.multi_accounts.as_ref()
    }

    pub fn accounts(&self) -> &[Account] {
        self.multi_accounts()
            .map(|m| m.accounts.as_slice())
            .unwrap_or_default()
    }

    fn multi_accounts_mut(&mut self) -> &mut MultiAccounts {
        self.anthropic
            .get_or_insert_with(ProviderEntry::default)
            .multi_accounts
            .get_or_insert_with(MultiAccounts::default)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ProviderEntry {
    #[serde(
        rename = "multiAccounts",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub multi_accounts: Option<MultiAccounts>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct MultiAccounts {
    #[serde(default)]
    pub accounts: Vec<Account>,
    /// Written by the OpenCode plugin. Kept raw here so an unexpected shape
    /// never costs the enrollment path the rest of the store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MultiAccounts {
    /// Decoded usage for one account, `None` when nothing was recorded yet.
    pub fn usage_for(&self, name: &str) -> Result<Option<UsageSnapshot>> {
        let Some(entry) = self.usage.as_ref().and_then(|u| u.get(name)) else {
            return Ok(None);
        };
        if entry.is_null() {
            return Ok(None);
        }
        serde_json::from_value(entry.clone())
            .map(Some)
            .with_context(|| format!("Invalid usage data for account '{name}'"))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Account {
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub access: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub refresh: String,
    /// Absolute expiry, epoch milliseconds.
    #[serde(default, deserialize_with = "null_as_default")]
    pub expires: i64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl Account {
    pub fn from_tokens(name: &str, tokens: &TokenResponse, now_ms: i64) -> Self {
        Self {
            name: name.to_string(),
            access: tokens.access_token.clone(),
            refresh: tokens.refresh_token.clone(),
            expires: oauth::expires_at(now_ms, tokens.expires_in),
            extra: Map::new(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct UsageSnapshot {
    #[serde(rename = "session5h", default)]
    pub session_5h: Option<WindowStat>,
    #[serde(rename = "weekly7d", default)]
    pub weekly_7d: Option<WindowStat>,
    #[serde(rename = "weekly7dSonnet", default)]
    pub weekly_7d_sonnet: Option<WindowStat>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct WindowStat {
    /// Fraction of the window's quota used, 0.0..=1.0.
    #[serde(default)]
    pub utilization: Option<f64>,
    /// Epoch seconds at which the window resets.
    #[serde(default)]
    pub reset: Option<i64>,
}

// ── Upsert ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Added,
    Updated,
}

/// Replace the account with the same name in place, or append it.
pub fn upsert(mut store: AuthFile, account: Account) -> (AuthFile, Upsert) {
    let accounts = &mut store.multi_accounts_mut().accounts;
    let outcome = match accounts.iter().position(|a| a.name == account.name) {
        Some(index) => {
            accounts[index] = account;
            Upsert::Updated
        }
        None => {
            accounts.push(account);
            Upsert::Added
        }
    };
    (store, outcome)
}

// ── Load / save ───────────────────────────────────────────────────────────────

/// Enrollment-side load.
///
/// A missing file, text that is not JSON, or a non-object root yields the
/// empty default document. Valid JSON that does not fit the typed model
/// keeps everything outside `anthropic.multiAccounts` and rebuilds only that
/// subtree. Read failures other than not-found are errors.
pub fn load_or_default(path: &Path) -> Result<AuthFile> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(AuthFile::default()),
        Err(e) => {
            return Err(e).with_context(|| format!("Cannot read auth file at {}", path.display()))
        }
    };

    let root = match serde_json::from_str::<Value>(&content) {
        Ok(Value::Object(root)) => root,
        _ => {
            tracing::warn!(path = %path.display(), "auth file is not a JSON object, starting from an empty store");
            return Ok(AuthFile::default());
        }
    };

    match serde_json::from_value(Value::Object(root.clone())) {
        Ok(store) => Ok(store),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "rebuilding anthropic.multiAccounts");
            Ok(salvage(root))
        }
    }
}

/// Rebuild the typed document from a root object that failed to decode,
/// dropping only what cannot be represented.
fn salvage(mut root: Map<String, Value>) -> AuthFile {
    let anthropic = match root.remove("anthropic") {
        Some(Value::Object(provider)) => salvage_provider(provider),
        _ => ProviderEntry::default(),
    };
    AuthFile {
        anthropic: Some(anthropic),
        other: root,
    }
}

fn salvage_provider(mut provider: Map<String, Value>) -> ProviderEntry {
    let multi_accounts = match provider.remove("multiAccounts") {
        Some(Value::Object(multi)) => salvage_multi_accounts(multi),
        _ => MultiAccounts::default(),
    };
    ProviderEntry {
        multi_accounts: Some(multi_accounts),
        extra: provider,
    }
}

fn salvage_multi_accounts(mut multi: Map<String, Value>) -> MultiAccounts {
    let accounts = match multi.remove("accounts") {
        Some(Value::Array(entries)) => entries
            .into_iter()
            .filter_map(|entry| match serde_json::from_value::<Account>(entry) {
                Ok(account) => Some(account),
                Err(e) => {
                    tracing::warn!(error = %e, "dropping unreadable account entry");
                    None
                }
            })
            .collect(),
        _ => Vec::new(),
    };
    let usage = multi.remove("usage").filter(|u| !u.is_null());
    MultiAccounts {
        accounts,
        usage,
        extra: multi,
    }
}

/// Report-side load: every failure is an error.
pub fn load_strict(path: &Path) -> Result<AuthFile> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Cannot read auth file at {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {}", path.display()))
}

pub fn save(path: &Path, store: &AuthFile) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Cannot create directory {}", parent.display()))?;
    }
    let content = serde_json::to_string_pretty(store)?;
    write_atomic(path, &content)
}

/// Atomically write a JSON file: validate → temp file → chmod 600 → rename.
pub fn write_atomic(path: &Path, content: &str) -> Result<()> {
    let _: Value = serde_json::from_str(content).context("Refusing to write invalid JSON")?;

    let temp_path = path.with_extension(format!("tmp.{}", std::process::id()));

    {
        let mut f = fs::File::create(&temp_path)
            .with_context(|| format!("Cannot create temp file {}", temp_path.display()))?;
        f.write_all(content.as_bytes())?;
        f.flush()?;
    }

    #[cfg(unix)]
    fs::set_permissions(&temp_path, fs::Permissions::from_mode(0o600))?;

    fs::rename(&temp_path, path)
        .with_context(|| format!("Cannot finalize file at {}", path.display()))?;

    Ok(())
}
