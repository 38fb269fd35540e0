use std::path::Path;

use evermem_api::Config;
use evermem_store::{format_relative_now, store_root, GroupSummary, GroupsLog};

fn render(groups: &[GroupSummary]) -> String {
    if groups.is_empty() {
        return "No groups recorded yet.".to_string();
    }
    groups
        .iter()
        .map(|g| {
            format!(
                "{}  ({} sessions, last seen {})\n    {}",
                g.id,
                g.session_count,
                format_relative_now(&g.last_seen),
                g.path
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// `evermem groups`
pub fn execute(cwd: &Path, all: bool, json: bool) -> anyhow::Result<()> {
    let key_id = if all { None } else { Config::from_env(cwd).key_id() };
    if !all && key_id.is_none() {
        anyhow::bail!("EVERMEM_API_KEY not set; pass --all to list groups for every key");
    }
    let groups = GroupsLog::new(&store_root()).load(key_id.as_deref())?;
    if json {
        println!("{}", serde_json::to_string_pretty(&groups)?);
    } else {
        println!("{}", render(&groups));
    }
    Ok(())
}
