use std::fs;
use std::path::{Path, PathBuf};

use evermem_api::Config;
use serde_json::{json, Map, Value};

use evermem_store::now_rfc3339;

// ── Install / Uninstall ──

pub const HOOK_COMMAND: &str = "evermem hook claude";
const MCP_SERVER_NAME: &str = "evermem";

/// Hook events EverMem listens on.
pub const HOOK_EVENTS: &[&str] = &["SessionStart", "UserPromptSubmit", "Stop", "SessionEnd"];

/// Whether a matcher group runs our hook. Accepts both the
/// `{matcher, hooks: [{type, command}]}` shape and a bare command string.
fn is_evermem_group(group: &Value) -> bool {
    if let Some(hooks) = group.get("hooks").and_then(Value::as_array) {
        return hooks.iter().any(|h| {
            h.get("command")
                .and_then(Value::as_str)
                .is_some_and(|c| c.contains("evermem hook"))
        });
    }
    group.as_str().is_some_and(|s| s.contains("evermem hook"))
}

pub fn settings_path(repo_root: &Path) -> PathBuf {
    repo_root.join(".claude").join("settings.local.json")
}

fn object_entry<'a>(settings: &'a mut Value, key: &str) -> anyhow::Result<&'a mut Map<String, Value>> {
    settings
        .as_object_mut()
        .ok_or_else(|| anyhow::anyhow!("settings is not an object"))?
        .entry(key)
        .or_insert_with(|| json!({}))
        .as_object_mut()
        .ok_or_else(|| anyhow::anyhow!("{key} is not an object"))
}

/// Replace any previous EverMem matcher group with a fresh one per event,
/// keeping other tools' groups, and register the MCP server.
pub fn merge_hooks(settings: &mut Value) -> anyhow::Result<()> {
    let hooks = object_entry(settings, "hooks")?;
    for event in HOOK_EVENTS {
        let mut groups: Vec<Value> = hooks
            .get(*event)
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter(|g| !is_evermem_group(g))
            .collect();
        groups.push(json!({
            "matcher": "",
            "hooks": [{ "type": "command", "command": HOOK_COMMAND }],
        }));
        hooks.insert(event.to_string(), Value::Array(groups));
    }

    object_entry(settings, "mcpServers")?
        .entry(MCP_SERVER_NAME)
        .or_insert_with(|| json!({ "command": "evermem", "args": ["mcp", "serve"] }));
    Ok(())
}

/// Remove EverMem matcher groups and the MCP server, dropping containers
/// left empty.
pub fn strip_hooks(settings: &mut Value) {
    let Some(obj) = settings.as_object_mut() else {
        return;
    };
    if let Some(hooks) = obj.get_mut("hooks").and_then(Value::as_object_mut) {
        for event in HOOK_EVENTS {
            let Some(groups) = hooks.get(*event).and_then(Value::as_array).cloned() else {
                continue;
            };
            let kept: Vec<Value> = groups.into_iter().filter(|g| !is_evermem_group(g)).collect();
            if kept.is_empty() {
                hooks.remove(*event);
            } else {
                hooks.insert(event.to_string(), Value::Array(kept));
            }
        }
    }
    if let Some(servers) = obj.get_mut("mcpServers").and_then(Value::as_object_mut) {
        servers.remove(MCP_SERVER_NAME);
    }
    for key in ["hooks", "mcpServers"] {
        if obj.get(key).and_then(Value::as_object).is_some_and(Map::is_empty) {
            obj.remove(key);
        }
    }
}

#[derive(Debug, Clone)]
pub struct InstallReport {
    pub settings: PathBuf,
    pub backup: Option<PathBuf>,
}

/// Install EverMem hooks into `.claude/settings.local.json`.
pub fn install(repo_root: &Path) -> anyhow::Result<InstallReport> {
    let path = settings_path(repo_root);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut backup = None;
    let mut settings = if path.exists() {
        let ts = now_rfc3339().replace(':', "-");
        let backup_path = path.with_extension(format!("json.evermem.bak.{ts}"));
        fs::copy(&path, &backup_path)?;
        backup = Some(backup_path);
        serde_json::from_str(&fs::read_to_string(&path)?).unwrap_or_else(|_| json!({}))
    } else {
        json!({})
    };

    merge_hooks(&mut settings)?;
    fs::write(&path, serde_json::to_string_pretty(&settings)?)?;
    tracing::info!(path = %path.display(), "installed hooks");
    Ok(InstallReport {
        settings: path,
        backup,
    })
}

/// Remove EverMem hooks. Returns `false` when there was no settings file.
pub fn uninstall(repo_root: &Path) -> anyhow::Result<bool> {
    let path = settings_path(repo_root);
    if !path.exists() {
        return Ok(false);
    }
    let mut settings: Value = serde_json::from_str(&fs::read_to_string(&path)?)?;
    strip_hooks(&mut settings);
    fs::write(&path, serde_json::to_string_pretty(&settings)?)?;
    Ok(true)
}

// ── Doctor ──

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DoctorCheck {
    pub ok: bool,
    pub label: String,
}

impl std::fmt::Display for DoctorCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", if self.ok { "OK" } else { "WARN" }, self.label)
    }
}

/// Check bridge health: binary, hooks, credentials, local store.
pub fn doctor(repo_root: &Path, config: &Config, store_root: &Path) -> Vec<DoctorCheck> {
    let binary = which_evermem();
    let path = settings_path(repo_root);
    let has_hooks = fs::read_to_string(&path)
        .map(|c| c.contains("evermem hook"))
        .unwrap_or(false);

    vec![
        DoctorCheck {
            ok: binary.is_some(),
            label: format!("evermem in PATH: {}", binary.unwrap_or_else(|| "not found".into())),
        },
        DoctorCheck {
            ok: has_hooks,
            label: format!("hooks in {}", path.display()),
        },
        DoctorCheck {
            ok: config.is_configured(),
            label: match config.key_id() {
                Some(id) => format!("EVERMEM_API_KEY set (key id {id})"),
                None => "EVERMEM_API_KEY not set".to_string(),
            },
        },
        DoctorCheck {
            ok: store_root.exists(),
            label: format!("store root: {}", store_root.display()),
        },
    ]
}

fn which_evermem() -> Option<String> {
    let path_var = std::env::var_os("PATH")?;
    let exe_name = if cfg!(windows) { "evermem.exe" } else { "evermem" };
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(exe_name))
        .find(|candidate| candidate.exists())
        .map(|p| p.to_string_lossy().to_string())
}
