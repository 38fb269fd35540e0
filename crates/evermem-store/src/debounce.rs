use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::write_atomic;

/// Duplicate SessionStart firings inside this window reuse the cached output.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_secs(1);

/// Fallback output when a duplicate fires before the first run cached anything.
const READY_OUTPUT: &str = r#"{"continue":true,"systemMessage":"💡 EverMem: Ready"}"#;

/// Per-project debounce state for a hook, keyed by a hash of the cwd.
pub struct Debounce {
    lock_path: PathBuf,
    output_path: PathBuf,
    window: Duration,
}

impl Debounce {
    pub fn new(root: &Path, hook: &str, cwd: &Path) -> Self {
        let hash = blake3::hash(cwd.to_string_lossy().as_bytes());
        let key = &hash.to_hex()[..16];
        let dir = root.join("debounce");
        Self {
            lock_path: dir.join(format!("{hook}-{key}.lock")),
            output_path: dir.join(format!("{hook}-{key}-output.json")),
            window: DEBOUNCE_WINDOW,
        }
    }

    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    /// If the previous firing was within the window, return the output to
    /// replay. Otherwise stamp the lock and return `None` so the caller runs
    /// the hook for real.
    pub fn check(&self) -> anyhow::Result<Option<String>> {
        if let Ok(meta) = std::fs::metadata(&self.lock_path) {
            let age = meta
                .modified()
                .ok()
                .and_then(|m| SystemTime::now().duration_since(m).ok());
            if age.is_some_and(|age| age < self.window) {
                let cached = std::fs::read_to_string(&self.output_path)
                    .unwrap_or_else(|_| READY_OUTPUT.to_string());
                tracing::debug!("debounced duplicate hook firing");
                return Ok(Some(cached));
            }
        }
        write_atomic(&self.lock_path, now_millis().to_string().as_bytes())?;
        Ok(None)
    }

    pub fn cache_output(&self, output: &str) -> anyhow::Result<()> {
        write_atomic(&self.output_path, output.as_bytes())
    }
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
}
