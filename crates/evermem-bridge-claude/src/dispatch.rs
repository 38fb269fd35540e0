use std::path::{Path, PathBuf};

use evermem_api::{Config, EverMemClient, MemoryApi, NewMemory, SearchOptions};
use evermem_store::{now_rfc3339, Debounce, GroupsLog, SessionEntry, SessionsLog};
use evermem_transcript::{
    digest_session, extract_turn_end, ExtractOptions, QaPair, RetryPolicy, Role, TruncationLimits,
};
use serde_json::json;

use crate::parse::{now_millis, HookInput};
use crate::redact::redact_secrets;
use crate::render;

/// Prompts shorter than this many words are not worth a search.
const MIN_PROMPT_WORDS: usize = 3;
const RECALL_TOP_K: u32 = 5;
const RECALL_MAX: usize = 5;
const RECENT_PAGE_SIZE: u32 = 100;
const RECENT_TAKE: usize = 5;

// ── Hook Result ──

/// Result from a hook dispatch. `stdout` is the JSON Claude Code reads;
/// `None` means the hook stays silent.
#[derive(Debug, Default, Clone)]
pub struct HookResult {
    pub stdout: Option<String>,
}

impl HookResult {
    pub fn output(stdout: String) -> Self {
        Self {
            stdout: Some(stdout),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    fn system_message(message: &str) -> anyhow::Result<Self> {
        Ok(Self::output(serde_json::to_string(&json!({ "systemMessage": message }))?))
    }
}

// ── Hook environment ──

/// Everything a hook needs besides the remote API.
#[derive(Debug, Clone)]
pub struct HookEnv {
    pub config: Config,
    pub store_root: PathBuf,
    pub retry: RetryPolicy,
    pub limits: TruncationLimits,
}

impl HookEnv {
    pub fn new(config: Config, store_root: PathBuf) -> Self {
        Self {
            config,
            store_root,
            retry: RetryPolicy::default(),
            limits: TruncationLimits::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Result of storing one role's content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOutcome {
    pub role: Role,
    /// Length before truncation, in chars.
    pub chars: usize,
    pub truncated: bool,
    pub error: Option<String>,
}

// ── Hook dispatch ──

/// Main hook entrypoint: parse stdin, resolve config for the hook's cwd,
/// and dispatch against the live EverMem API.
pub fn hook_entrypoint_from_stdin(
    stdin: &str,
    store_root: PathBuf,
    retry: RetryPolicy,
) -> anyhow::Result<HookResult> {
    let Some(input) = HookInput::parse(stdin)? else {
        return Ok(HookResult::empty());
    };
    let config = Config::from_env(&input.cwd_path());
    let client = EverMemClient::new(config.clone());
    let env = HookEnv::new(config, store_root).with_retry(retry);
    dispatch(&input, &env, &client)
}

/// Route one parsed hook event. Unconfigured installs are a silent no-op.
pub fn dispatch(input: &HookInput, env: &HookEnv, api: &dyn MemoryApi) -> anyhow::Result<HookResult> {
    if !env.config.is_configured() {
        tracing::debug!(event = %input.hook_event_name, "EVERMEM_API_KEY not set, skipping hook");
        return Ok(HookResult::empty());
    }
    match input.hook_event_name.as_str() {
        "SessionStart" => dispatch_session_start(input, env, api),
        "UserPromptSubmit" => dispatch_user_prompt_submit(input, api),
        "Stop" => dispatch_stop(input, env, api),
        "SessionEnd" => dispatch_session_end(input, env),
        other => {
            tracing::debug!(event = other, "ignoring hook event");
            Ok(HookResult::empty())
        }
    }
}

// ── SessionStart ──

fn dispatch_session_start(
    input: &HookInput,
    env: &HookEnv,
    api: &dyn MemoryApi,
) -> anyhow::Result<HookResult> {
    let cwd = input.cwd_path();
    let debounce = Debounce::new(&env.store_root, "session-start", &cwd);
    match debounce.check() {
        Ok(Some(cached)) => return Ok(HookResult::output(cached)),
        Ok(None) => {}
        Err(e) => tracing::warn!("debounce check failed: {e}"),
    }

    let config = &env.config;
    if !input.cwd.is_empty() {
        let groups = GroupsLog::new(&env.store_root);
        if let Err(e) = groups.save(&config.group_id, &cwd, config.key_id().as_deref()) {
            tracing::warn!("failed to record group: {e}");
        }
    }

    if !input.session_id.is_empty() && !input.cwd.is_empty() {
        let action = if input.is_resumed() { "resumed" } else { "created" };
        let content = format!(
            "[Session Start] User {action} session at {}. session_id: {}, group_id: {}, path: {}",
            now_rfc3339(),
            input.session_id,
            config.group_id,
            input.cwd
        );
        let memory = NewMemory::new(Role::User, content)
            .with_id(format!("session_start_{}", now_millis()))
            .with_sender("System");
        if let Err(e) = api.add(&memory) {
            tracing::warn!("failed to store session start: {e}");
        }
    }

    let memories = match api.recent_memories(RECENT_PAGE_SIZE) {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!("failed to load recent memories: {e}");
            let out = json!({
                "continue": true,
                "systemMessage": format!("⚠️ EverMem: {}", e.user_hint()),
            });
            return Ok(HookResult::output(serde_json::to_string(&out)?));
        }
    };
    let last = SessionsLog::new(&env.store_root)
        .last_for_group(&config.group_id)
        .unwrap_or_else(|e| {
            tracing::warn!("failed to read sessions log: {e}");
            None
        });

    if memories.is_empty() && last.is_none() {
        return Ok(HookResult::empty());
    }

    let recent = &memories[..memories.len().min(RECENT_TAKE)];
    let now = time::OffsetDateTime::now_utc();
    let context = render::session_context(last.as_ref(), recent, now);
    let output = json!({
        "continue": true,
        "systemMessage": render::session_start_line(last.as_ref(), recent, now),
        "systemPrompt": context,
        "hookSpecificOutput": {
            "hookEventName": "SessionStart",
            "additionalContext": context,
        },
    });
    let output = serde_json::to_string(&output)?;
    if let Err(e) = debounce.cache_output(&output) {
        tracing::warn!("failed to cache session start output: {e}");
    }
    Ok(HookResult::output(output))
}

// ── UserPromptSubmit ──

fn dispatch_user_prompt_submit(input: &HookInput, api: &dyn MemoryApi) -> anyhow::Result<HookResult> {
    if input.prompt.split_whitespace().count() < MIN_PROMPT_WORDS {
        return Ok(HookResult::empty());
    }
    let query = redact_secrets(&input.prompt);
    let memories = match api.search_memories(&query, &SearchOptions::top_k(RECALL_TOP_K)) {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!("memory search failed: {e}");
            return Ok(HookResult::empty());
        }
    };
    let selected: Vec<_> = memories
        .into_iter()
        .filter(|m| m.score > 0.0)
        .take(RECALL_MAX)
        .collect();
    if selected.is_empty() {
        return Ok(HookResult::empty());
    }

    let context = render::relevant_memories(&selected);
    let output = json!({
        "systemMessage": render::recall_message(&selected, &context, time::OffsetDateTime::now_utc()),
        "hookSpecificOutput": {
            "hookEventName": "UserPromptSubmit",
            "additionalContext": context,
        },
    });
    Ok(HookResult::output(serde_json::to_string(&output)?))
}

// ── Stop ──

fn dispatch_stop(input: &HookInput, env: &HookEnv, api: &dyn MemoryApi) -> anyhow::Result<HookResult> {
    if input.transcript_path.is_empty() {
        return Ok(HookResult::empty());
    }
    let path = Path::new(&input.transcript_path);
    let extraction = match extract_turn_end(path, &ExtractOptions::current_turn(), env.retry) {
        Ok(x) => x,
        Err(e) => {
            tracing::warn!("{e}");
            return HookResult::system_message(&format!("⚠️ EverMem: {e}"));
        }
    };
    let Some(pair) = extraction.last_pair() else {
        tracing::debug!(stats = ?extraction.stats, "no completed pair in current turn");
        return Ok(HookResult::empty());
    };

    let outcomes = store_pair(api, pair, &env.limits, now_millis());
    if outcomes.is_empty() {
        return Ok(HookResult::empty());
    }
    HookResult::system_message(&render::save_summary(&outcomes))
}

/// Redact, truncate and store one pair: user first, then assistant.
pub fn store_pair(
    api: &dyn MemoryApi,
    pair: &QaPair,
    limits: &TruncationLimits,
    stamp: i128,
) -> Vec<StoreOutcome> {
    [
        (Role::User, pair.user.as_str(), format!("u_{stamp}")),
        (Role::Assistant, pair.assistant.as_str(), format!("a_{stamp}")),
    ]
    .into_iter()
    .filter(|(_, text, _)| !text.trim().is_empty())
    .map(|(role, text, id)| {
        let cut = limits.apply(role, &redact_secrets(text));
        let error = api
            .add(&NewMemory::new(role, cut.content).with_id(id))
            .err()
            .map(|e| e.to_string());
        if let Some(e) = &error {
            tracing::warn!(%role, "failed to store memory: {e}");
        }
        StoreOutcome {
            role,
            chars: text.chars().count(),
            truncated: cut.truncated,
            error,
        }
    })
    .collect()
}

// ── SessionEnd ──

fn dispatch_session_end(input: &HookInput, env: &HookEnv) -> anyhow::Result<HookResult> {
    if input.session_id.is_empty() || input.transcript_path.is_empty() {
        return Ok(HookResult::empty());
    }
    let digest = match digest_session(Path::new(&input.transcript_path)) {
        Ok(d) => d,
        Err(e) => {
            tracing::warn!("{e}");
            return Ok(HookResult::empty());
        }
    };
    if digest.turn_count == 0 {
        return Ok(HookResult::empty());
    }

    let entry = SessionEntry {
        session_id: input.session_id.clone(),
        group_id: env.config.group_id.clone(),
        summary: digest.summary.clone(),
        turn_count: digest.turn_count,
        reason: if input.reason.is_empty() {
            "unknown".to_string()
        } else {
            input.reason.clone()
        },
        start_time: digest.first_timestamp.clone(),
        end_time: digest.last_timestamp.clone(),
        timestamp: now_rfc3339(),
    };
    if let Err(e) = SessionsLog::new(&env.store_root).append_once(&entry) {
        tracing::warn!("failed to save session summary: {e}");
    }

    HookResult::system_message(&render::session_end_message(&digest))
}
