use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use rmcp::handler::server::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::*;
use rmcp::{tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler, ServiceExt};
use schemars::JsonSchema;
use serde::Deserialize;

use evermem_api::{Config, EverMemClient, Memory, MemoryApi, SearchOptions};
use evermem_transcript::char_prefix;

const DEFAULT_LIMIT: u32 = 10;
const MAX_LIMIT: u32 = 20;
const PREVIEW_CHARS: usize = 200;
const CACHE_CAPACITY: usize = 100;
const CACHE_EVICT: usize = 50;

const NOT_CONFIGURED: &str = "EverMem API key not configured. Set EVERMEM_API_KEY environment variable.";

// --- Tool parameter structs ---

#[derive(Debug, Deserialize, JsonSchema)]
struct SearchParams {
    /// The search query to find relevant memories
    query: String,
    /// Maximum number of memories to return (default: 10, max: 20)
    limit: Option<u32>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct GetMemoryParams {
    /// The unique identifier of the memory to retrieve
    memory_id: String,
}

// --- Result cache ---

/// Search hits kept so `get_memory` can return full text by id.
/// Insertion ordered; once over capacity the oldest half is dropped.
#[derive(Debug, Default)]
struct MemoryCache {
    entries: VecDeque<(String, Memory)>,
}

impl MemoryCache {
    fn insert_batch(&mut self, batch: impl IntoIterator<Item = (String, Memory)>) {
        self.entries.extend(batch);
        if self.entries.len() > CACHE_CAPACITY {
            self.entries.drain(..CACHE_EVICT);
        }
    }

    fn get(&self, id: &str) -> Option<&Memory> {
        self.entries.iter().find(|(k, _)| k == id).map(|(_, m)| m)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

// --- MCP Server ---

type SharedApi = Arc<dyn MemoryApi + Send + Sync>;

/// MCP server giving Claude on-demand access to EverMem.
#[derive(Clone)]
pub struct EverMemServer {
    config: Config,
    api: SharedApi,
    cache: Arc<Mutex<MemoryCache>>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl EverMemServer {
    pub fn new(config: Config) -> Self {
        let api: SharedApi = Arc::new(EverMemClient::new(config.clone()));
        Self::with_api(config, api)
    }

    pub fn with_api(config: Config, api: SharedApi) -> Self {
        Self {
            config,
            api,
            cache: Arc::new(Mutex::new(MemoryCache::default())),
            tool_router: Self::tool_router(),
        }
    }

    fn lock_cache(&self) -> Result<std::sync::MutexGuard<'_, MemoryCache>, McpError> {
        self.cache
            .lock()
            .map_err(|_| McpError::internal_error("memory cache poisoned", None))
    }

    /// Search past conversation memories
    #[tool(
        description = "Search past conversation memories using semantic and keyword matching. Use this to find relevant context from previous sessions."
    )]
    async fn search_memories(
        &self,
        Parameters(params): Parameters<SearchParams>,
    ) -> Result<CallToolResult, McpError> {
        if !self.config.is_configured() {
            return Ok(CallToolResult::error(vec![Content::text(NOT_CONFIGURED)]));
        }
        let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        let api = Arc::clone(&self.api);
        let query = params.query;
        let found = tokio::task::spawn_blocking(move || {
            api.search_memories(&query, &SearchOptions::top_k(limit))
        })
        .await
        .map_err(|e| McpError::internal_error(e.to_string(), None))?;

        let memories = match found {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!("search_memories failed: {e}");
                return Ok(CallToolResult::error(vec![Content::text(format!(
                    "Error searching memories: {e}"
                ))]));
            }
        };
        if memories.is_empty() {
            return Ok(CallToolResult::success(vec![Content::text(
                "No memories found matching your query.",
            )]));
        }

        let stamp = time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
        let hits: Vec<(String, Memory)> = memories
            .into_iter()
            .enumerate()
            .map(|(i, m)| (format!("mem_{stamp}_{i}"), m))
            .collect();
        let text = format_results(&hits);
        self.lock_cache()?.insert_batch(hits);
        Ok(CallToolResult::success(vec![Content::text(text)]))
    }

    /// Get the full details of a specific memory by its ID
    #[tool(description = "Get the full details of a specific memory by its ID")]
    async fn get_memory(
        &self,
        Parameters(params): Parameters<GetMemoryParams>,
    ) -> Result<CallToolResult, McpError> {
        let cache = self.lock_cache()?;
        let Some(memory) = cache.get(&params.memory_id) else {
            return Ok(CallToolResult::error(vec![Content::text(format!(
                "Memory not found: {}. Try searching first with search_memories.",
                params.memory_id
            ))]));
        };
        Ok(CallToolResult::success(vec![Content::text(format!(
            "Memory: {}\nType: {}\nDate: {}\nScore: {}%\n\n--- Content ---\n{}",
            params.memory_id,
            memory.kind.as_str(),
            date_time(&memory.timestamp),
            percent(memory.score),
            memory.text
        ))]))
    }
}

#[tool_handler]
impl ServerHandler for EverMemServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "EverMem long-term memory: search past Claude Code sessions and fetch full memories by id"
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

fn percent(score: f64) -> i64 {
    (score * 100.0).round() as i64
}

fn parse_ts(ts: &str) -> Option<time::OffsetDateTime> {
    time::OffsetDateTime::parse(ts, &time::format_description::well_known::Rfc3339).ok()
}

fn date(ts: &str) -> String {
    match parse_ts(ts) {
        Some(t) => format!("{:04}-{:02}-{:02}", t.year(), u8::from(t.month()), t.day()),
        None => ts.to_string(),
    }
}

fn date_time(ts: &str) -> String {
    match parse_ts(ts) {
        Some(t) => format!("{} {:02}:{:02} UTC", date(ts), t.hour(), t.minute()),
        None => ts.to_string(),
    }
}

fn preview(text: &str) -> String {
    let head = char_prefix(text, PREVIEW_CHARS);
    if head.len() < text.len() {
        format!("{head}...")
    } else {
        text.to_string()
    }
}

fn format_results(hits: &[(String, Memory)]) -> String {
    let body = hits
        .iter()
        .enumerate()
        .map(|(i, (id, m))| {
            format!(
                "[{}] ID: {id}\n    Type: {} | Score: {}% | Date: {}\n    {}",
                i + 1,
                m.kind.as_str(),
                percent(m.score),
                date(&m.timestamp),
                preview(&m.text)
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");
    format!(
        "Found {} memories:\n\n{body}\n\nUse get_memory with an ID to see full content.",
        hits.len()
    )
}

/// Start the MCP server on stdio transport.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    if !config.is_configured() {
        tracing::warn!("EVERMEM_API_KEY not set; search_memories will report an error");
    }
    let server = EverMemServer::new(config);
    let service = server.serve(rmcp::transport::stdio()).await?;
    service.waiting().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use evermem_api::{ApiError, MemoryKind, NewMemory};
    use serde_json::{json, Value};
    use std::path::Path;

    #[derive(Default)]
    struct FakeApi {
        response: Value,
        top_ks: Mutex<Vec<u32>>,
    }

    impl MemoryApi for FakeApi {
        fn search(&self, _query: &str, opts: &SearchOptions) -> Result<Value, ApiError> {
            self.top_ks.lock().unwrap().push(opts.top_k);
            Ok(self.response.clone())
        }

        fn add(&self, _memory: &NewMemory) -> Result<Value, ApiError> {
            Ok(Value::Null)
        }

        fn list(&self, _page_size: u32) -> Result<Value, ApiError> {
            Ok(Value::Null)
        }
    }

    fn config(key: Option<&str>) -> Config {
        let key = key.map(str::to_string);
        Config::from_lookup(Path::new("/repo"), move |k| {
            if k == "EVERMEM_API_KEY" {
                key.clone()
            } else {
                None
            }
        })
    }

    fn server_with(response: Value) -> (EverMemServer, Arc<FakeApi>) {
        let api = Arc::new(FakeApi {
            response,
            ..FakeApi::default()
        });
        let server = EverMemServer::with_api(config(Some("sk-test")), api.clone());
        (server, api)
    }

    fn text(result: &CallToolResult) -> &str {
        result.content[0].raw.as_text().unwrap().text.as_str()
    }

    fn memory(text: &str) -> Memory {
        Memory {
            text: text.into(),
            timestamp: "2025-05-01T08:30:00Z".into(),
            kind: MemoryKind::Implementation,
            score: 0.5,
            subject: None,
            metadata: Value::Null,
        }
    }

    #[test]
    fn server_info_has_tools() {
        let (server, _) = server_with(Value::Null);
        assert!(server.get_info().capabilities.tools.is_some());
    }

    #[tokio::test]
    async fn search_formats_and_caches_results() {
        let (server, api) = server_with(json!({
            "result": {
                "memories": [{"episodic_memory": [
                    {"content": "Use sqlx for migrations", "created_at": "2025-05-01T08:30:00Z"}
                ]}],
                "scores": [{"episodic_memory": [0.876]}]
            }
        }));
        let result = server
            .search_memories(Parameters(SearchParams {
                query: "migrations".into(),
                limit: Some(50),
            }))
            .await
            .unwrap();
        let out = text(&result);
        assert!(out.starts_with("Found 1 memories:\n\n[1] ID: mem_"));
        assert!(out.contains("Type: implementation | Score: 88% | Date: 2025-05-01"));
        assert!(out.contains("    Use sqlx for migrations"));
        assert!(out.ends_with("Use get_memory with an ID to see full content."));
        assert_eq!(*api.top_ks.lock().unwrap(), vec![MAX_LIMIT]);

        let id = out
            .lines()
            .find_map(|l| l.strip_prefix("[1] ID: "))
            .unwrap()
            .to_string();
        let full = server
            .get_memory(Parameters(GetMemoryParams { memory_id: id.clone() }))
            .await
            .unwrap();
        assert_eq!(
            text(&full),
            format!(
                "Memory: {id}\nType: implementation\nDate: 2025-05-01 08:30 UTC\nScore: 88%\n\n--- Content ---\nUse sqlx for migrations"
            )
        );
    }

    #[tokio::test]
    async fn empty_search_says_so() {
        let (server, _) = server_with(json!({"result": {"memories": []}}));
        let result = server
            .search_memories(Parameters(SearchParams {
                query: "nothing".into(),
                limit: None,
            }))
            .await
            .unwrap();
        assert_eq!(text(&result), "No memories found matching your query.");
    }

    #[tokio::test]
    async fn unconfigured_search_is_an_error_result() {
        let server = EverMemServer::with_api(config(None), Arc::new(FakeApi::default()));
        let result = server
            .search_memories(Parameters(SearchParams {
                query: "x".into(),
                limit: None,
            }))
            .await
            .unwrap();
        assert_eq!(result.is_error, Some(true));
        assert_eq!(text(&result), NOT_CONFIGURED);
    }

    #[tokio::test]
    async fn unknown_id_points_to_search() {
        let (server, _) = server_with(Value::Null);
        let result = server
            .get_memory(Parameters(GetMemoryParams {
                memory_id: "mem_1_0".into(),
            }))
            .await
            .unwrap();
        assert_eq!(result.is_error, Some(true));
        assert!(text(&result).contains("Try searching first with search_memories."));
    }

    #[test]
    fn cache_drops_oldest_half_past_capacity() {
        let mut cache = MemoryCache::default();
        cache.insert_batch((0..100).map(|i| (format!("m{i}"), memory("x"))));
        assert_eq!(cache.len(), 100);
        cache.insert_batch([("m100".to_string(), memory("y"))]);
        assert_eq!(cache.len(), 51);
        assert!(cache.get("m49").is_none());
        assert!(cache.get("m50").is_some());
        assert_eq!(cache.get("m100").unwrap().text, "y");
    }

    #[test]
    fn long_text_preview_is_cut() {
        let long = "é".repeat(250);
        let p = preview(&long);
        assert!(p.ends_with("..."));
        assert_eq!(p.chars().count(), PREVIEW_CHARS + 3);
        let exact = "a".repeat(PREVIEW_CHARS);
        assert_eq!(preview(&exact), exact);
    }
}
