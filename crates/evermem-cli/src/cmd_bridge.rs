use std::io::Read;
use std::path::Path;
use std::time::Duration;

use evermem_transcript::RetryPolicy;

/// Retry budget for the turn-end read, overridable from the environment.
pub fn retry_policy_from_env() -> RetryPolicy {
    retry_policy_from(|k| std::env::var(k).ok())
}

fn retry_policy_from(lookup: impl Fn(&str) -> Option<String>) -> RetryPolicy {
    let default = RetryPolicy::default();
    RetryPolicy {
        max_attempts: lookup("EVERMEM_RETRY_ATTEMPTS")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default.max_attempts),
        delay: lookup("EVERMEM_RETRY_DELAY_MS")
            .and_then(|v| v.trim().parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(default.delay),
    }
}

/// `evermem hook claude`: read stdin, dispatch hook.
/// Always exits 0; failures only reach the debug log.
pub fn hook_claude() -> anyhow::Result<()> {
    let mut stdin_buf = String::new();
    if let Err(e) = std::io::stdin().read_to_string(&mut stdin_buf) {
        tracing::warn!("stdin read error: {e}");
        return Ok(());
    }
    tracing::debug!(bytes = stdin_buf.len(), "hook payload received");

    let result = evermem_bridge_claude::hook_entrypoint_from_stdin(
        &stdin_buf,
        evermem_store::store_root(),
        retry_policy_from_env(),
    );
    match result {
        Ok(result) => match &result.stdout {
            Some(output) => {
                tracing::debug!(bytes = output.len(), "hook output");
                print!("{output}");
            }
            None => tracing::debug!("hook produced no output"),
        },
        Err(e) => tracing::warn!("hook failed: {e:#}"),
    }
    Ok(())
}

/// `evermem bridge claude install`
pub fn install(repo_root: &Path) -> anyhow::Result<()> {
    let report = evermem_bridge_claude::install(repo_root)?;
    if let Some(backup) = &report.backup {
        println!("Backed up previous settings to {}", backup.display());
    }
    println!("Installed evermem hooks into {}", report.settings.display());
    println!("Configured MCP server (evermem mcp serve)");
    Ok(())
}

/// `evermem bridge claude uninstall`
pub fn uninstall(repo_root: &Path) -> anyhow::Result<()> {
    let path = evermem_bridge_claude::settings_path(repo_root);
    if evermem_bridge_claude::uninstall(repo_root)? {
        println!("Uninstalled evermem hooks from {}", path.display());
    } else {
        println!("No settings file found at {}", path.display());
    }
    Ok(())
}

/// `evermem doctor`
pub fn doctor(repo_root: &Path) -> anyhow::Result<()> {
    let config = evermem_api::Config::from_env(repo_root);
    let store_root = evermem_store::store_root();
    for check in evermem_bridge_claude::doctor(repo_root, &config, &store_root) {
        println!("{check}");
    }
    Ok(())
}
