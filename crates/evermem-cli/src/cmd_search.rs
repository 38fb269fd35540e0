use std::path::Path;

use evermem_api::{Config, EverMemClient, Memory, MemoryApi, SearchOptions};

const RULE_WIDTH: usize = 70;

/// Greedy word wrap at `width` columns.
fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut line = String::new();
    for word in text.split_whitespace() {
        if !line.is_empty() && line.chars().count() + 1 + word.chars().count() > width {
            lines.push(std::mem::take(&mut line));
        }
        if !line.is_empty() {
            line.push(' ');
        }
        line.push_str(word);
    }
    if !line.is_empty() {
        lines.push(line);
    }
    lines
}

fn render(memories: &[Memory]) -> String {
    let rule = "=".repeat(RULE_WIDTH);
    let mut out = vec![format!("Found {} memories:", memories.len()), rule.clone()];
    for (i, m) in memories.iter().enumerate() {
        let score = if m.score > 0.0 {
            format!("{:.1}%", m.score * 100.0)
        } else {
            "N/A".to_string()
        };
        out.push(String::new());
        out.push(format!("{}. [Score: {score}] {}", i + 1, m.timestamp));
        out.push("-".repeat(RULE_WIDTH));
        out.extend(wrap(&m.text, RULE_WIDTH));
    }
    out.push(String::new());
    out.push(rule);
    out.join("\n")
}

/// `evermem search <query>`
pub fn execute(cwd: &Path, query: &str, limit: u32, json: bool) -> anyhow::Result<()> {
    if query.trim().is_empty() {
        println!("Usage: evermem search <query>");
        println!("Example: evermem search how do we handle authentication");
        return Ok(());
    }
    let config = Config::from_env(cwd);
    if !config.is_configured() {
        anyhow::bail!("EVERMEM_API_KEY not configured. Set it with: export EVERMEM_API_KEY=\"your-key\"");
    }
    if !json {
        println!("Searching EverMem Cloud...\n");
        println!("Query: \"{query}\"");
        println!("User: {}", config.user_id);
        println!("Group: {}\n", config.group_id);
    }

    let client = EverMemClient::new(config);
    let memories = client
        .search_memories(query, &SearchOptions::top_k(limit))
        .map_err(|e| anyhow::anyhow!(e.user_hint()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&memories)?);
    } else if memories.is_empty() {
        println!("No memories found matching your query.");
    } else {
        println!("{}", render(&memories));
    }
    Ok(())
}
