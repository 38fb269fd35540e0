use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "EVERMEM_LOG";
const HOOK_LOG_FILE: &str = "evermem-hook-debug.log";

fn filter(default: &str) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default))
}

/// Interactive commands log to stderr, `warn` unless `EVERMEM_LOG` says otherwise.
pub fn init_cli() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter("warn"))
        .with_writer(std::io::stderr)
        .try_init();
}

/// Hook stdout/stderr belong to Claude Code. Logs go to a temp file, and
/// only when `EVERMEM_DEBUG=1`.
pub fn init_hook() {
    if std::env::var("EVERMEM_DEBUG").ok().as_deref() != Some("1") {
        return;
    }
    let path = std::env::temp_dir().join(HOOK_LOG_FILE);
    let Ok(file) = std::fs::OpenOptions::new().create(true).append(true).open(&path) else {
        return;
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter("debug"))
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .try_init();
}
