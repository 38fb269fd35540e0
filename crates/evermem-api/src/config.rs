use std::path::{Path, PathBuf};
use std::time::Duration;

use sha2::{Digest, Sha256};

pub const DEFAULT_API_URL: &str = "https://api.evermind.ai";
pub const DEFAULT_USER_ID: &str = "claude-code-user";
pub const DEFAULT_TIMEOUT_MS: u64 = 5_000;

/// Resolved settings for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub api_key: Option<String>,
    pub user_id: String,
    pub group_id: String,
    pub api_url: String,
    pub timeout: Duration,
    pub cwd: PathBuf,
}

impl Config {
    /// Load `.env` files (never overriding the real environment), then read
    /// `EVERMEM_*` variables.
    pub fn from_env(cwd: &Path) -> Self {
        load_dotenv(cwd);
        Self::from_lookup(cwd, |key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source. Empty values count as unset.
    pub fn from_lookup<F>(cwd: &Path, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let timeout_ms = get("EVERMEM_TIMEOUT_MS")
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_MS);
        Self {
            api_key: get("EVERMEM_API_KEY"),
            user_id: get("EVERMEM_USER_ID").unwrap_or_else(|| DEFAULT_USER_ID.to_string()),
            group_id: get("EVERMEM_GROUP_ID").unwrap_or_else(|| default_group_id(cwd)),
            api_url: get("EVERMEM_API_URL")
                .unwrap_or_else(|| DEFAULT_API_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            timeout: Duration::from_millis(timeout_ms),
            cwd: cwd.to_path_buf(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    /// Short, non-reversible identifier of the API key for local bookkeeping.
    pub fn key_id(&self) -> Option<String> {
        self.api_key.as_deref().map(key_id_for)
    }

    /// Same settings scoped to another working directory. An explicit
    /// `EVERMEM_GROUP_ID` is kept; a derived one follows the new cwd.
    pub fn for_cwd(&self, cwd: &Path) -> Self {
        let derived = default_group_id(&self.cwd);
        let group_id = if self.group_id == derived {
            default_group_id(cwd)
        } else {
            self.group_id.clone()
        };
        Self {
            group_id,
            cwd: cwd.to_path_buf(),
            ..self.clone()
        }
    }
}

/// `claude-code:<cwd>` with characters outside `[A-Za-z0-9-_/]` replaced.
pub fn default_group_id(cwd: &Path) -> String {
    let sanitized: String = cwd
        .to_string_lossy()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '/') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("claude-code:{sanitized}")
}

/// First 12 hex chars of SHA-256 over the key.
pub fn key_id_for(api_key: &str) -> String {
    let digest = Sha256::digest(api_key.as_bytes());
    hex::encode(digest)[..12].to_string()
}

fn load_dotenv(cwd: &Path) {
    let mut candidates = vec![cwd.join(".env")];
    if let Some(dir) = dirs::config_dir() {
        candidates.push(dir.join("evermem").join(".env"));
    }
    for path in candidates {
        if !path.is_file() {
            continue;
        }
        if let Err(e) = dotenvy::from_path(&path) {
            tracing::debug!(path = %path.display(), "failed to load .env: {e}");
        }
    }
}
