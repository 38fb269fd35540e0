use std::io::{IsTerminal, Read};
use std::path::{Path, PathBuf};

use evermem_api::{Config, EverMemClient};
use evermem_bridge_claude::HookInput;
use evermem_store::{store_root, HistoryPreview};

/// Hook payload piped on stdin, if any.
fn read_payload() -> anyhow::Result<Option<HookInput>> {
    let stdin = std::io::stdin();
    if stdin.is_terminal() {
        return Ok(None);
    }
    let mut buf = String::new();
    stdin.lock().read_to_string(&mut buf)?;
    HookInput::parse(&buf)
}

/// Project the import belongs to: the payload's `cwd`, else the process cwd.
fn project_dir(payload: Option<&HookInput>, cwd: &Path) -> PathBuf {
    match payload {
        Some(input) if !input.cwd.is_empty() => PathBuf::from(&input.cwd),
        _ => cwd.to_path_buf(),
    }
}

/// An explicit path wins over the payload's `transcript_path`.
fn transcript_path(path: Option<PathBuf>, payload: Option<&HookInput>) -> anyhow::Result<PathBuf> {
    if let Some(path) = path {
        return Ok(path);
    }
    payload
        .filter(|i| !i.transcript_path.is_empty())
        .map(|i| PathBuf::from(&i.transcript_path))
        .ok_or_else(|| anyhow::anyhow!("no transcript path given and no hook payload on stdin"))
}

fn configured_client(cwd: &Path) -> anyhow::Result<EverMemClient> {
    let config = Config::from_env(cwd);
    if !config.is_configured() {
        anyhow::bail!("EverMem API key not configured. Set EVERMEM_API_KEY in your shell profile.");
    }
    Ok(EverMemClient::new(config))
}

/// `evermem history extract [path]`
pub fn extract(path: Option<PathBuf>) -> anyhow::Result<()> {
    let payload = match path {
        Some(_) => None,
        None => read_payload()?,
    };
    let transcript = transcript_path(path, payload.as_ref())?;
    let preview = HistoryPreview::new(&store_root());
    let report = evermem_bridge_claude::extract_history(&transcript, &preview)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// `evermem history upload`
pub fn upload(cwd: &Path) -> anyhow::Result<()> {
    let payload = read_payload()?;
    let client = configured_client(&project_dir(payload.as_ref(), cwd))?;
    let preview = HistoryPreview::new(&store_root());
    let report = evermem_bridge_claude::upload_history(&client, &preview, &client.config().group_id)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// `evermem history add [path]`
pub fn add(cwd: &Path, path: Option<PathBuf>) -> anyhow::Result<()> {
    let payload = read_payload()?;
    let transcript = transcript_path(path, payload.as_ref())?;
    let client = configured_client(&project_dir(payload.as_ref(), cwd))?;
    let group_id = client.config().group_id.clone();

    println!("📤 Uploading session history...\n");
    println!("   Source: {}", transcript.display());
    let report = evermem_bridge_claude::add_history(&client, &transcript, &group_id)?;
    println!("   Total lines: {}", report.total_lines);
    if !report.complete {
        println!("   ⚠️  Warning: Last turn may be incomplete (session in progress)\n");
    }
    println!("   Q&A pairs found: {}", report.stats.qa_pairs_found);
    if report.stats.qa_pairs_found == 0 {
        println!("\n⚠️  No Q&A pairs to upload.");
        return Ok(());
    }

    let upload = &report.upload;
    println!("\n✅ History uploaded!");
    println!(
        "   - {} Q&A pairs ({} messages uploaded)",
        upload.total_qa_pairs, upload.uploaded
    );
    if report.stats.system_skipped > 0 {
        println!("   - {} skipped (system messages)", report.stats.system_skipped);
    }
    if report.stats.interrupted_skipped > 0 {
        println!("   - {} skipped (interrupted)", report.stats.interrupted_skipped);
    }
    if upload.failed > 0 {
        println!("   - {} failed", upload.failed);
    }
    println!("\n   Group ID: {group_id}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(json: &str) -> HookInput {
        HookInput::parse(json).unwrap().unwrap()
    }

    #[test]
    fn payload_cwd_selects_the_project() {
        let input = payload(r#"{"cwd":"/work/api","transcript_path":"/t.jsonl"}"#);
        assert_eq!(project_dir(Some(&input), Path::new("/elsewhere")), PathBuf::from("/work/api"));
        assert_eq!(project_dir(None, Path::new("/elsewhere")), PathBuf::from("/elsewhere"));

        let no_cwd = payload(r#"{"transcript_path":"/t.jsonl"}"#);
        assert_eq!(project_dir(Some(&no_cwd), Path::new("/elsewhere")), PathBuf::from("/elsewhere"));
    }

    #[test]
    fn upload_and_add_derive_the_same_group() {
        let input = payload(r#"{"cwd":"/work/api"}"#);
        let dir = project_dir(Some(&input), Path::new("/elsewhere"));
        assert_eq!(evermem_api::default_group_id(&dir), "claude-code:/work/api");
    }

    #[test]
    fn explicit_path_beats_payload() {
        let input = payload(r#"{"transcript_path":"/from/hook.jsonl"}"#);
        assert_eq!(
            transcript_path(Some("/given.jsonl".into()), Some(&input)).unwrap(),
            PathBuf::from("/given.jsonl")
        );
        assert_eq!(transcript_path(None, Some(&input)).unwrap(), PathBuf::from("/from/hook.jsonl"));
        assert!(transcript_path(None, None).is_err());
    }
}
