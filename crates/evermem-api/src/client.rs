use std::time::Duration;

use evermem_transcript::Role;
use serde_json::{json, Value};

use crate::config::Config;
use crate::error::ApiError;
use crate::transform::{transform_list_results, transform_search_results, Memory};

pub const SEARCH_PATH: &str = "/api/v1/memories/search";
pub const MEMORIES_PATH: &str = "/api/v1/memories";
pub const GROUP_NAME: &str = "Claude Code Session";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchOptions {
    pub top_k: u32,
    pub retrieve_method: String,
    pub memory_types: Vec<String>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            top_k: 10,
            retrieve_method: "hybrid".to_string(),
            memory_types: vec!["episodic_memory".to_string()],
        }
    }
}

impl SearchOptions {
    pub fn top_k(top_k: u32) -> Self {
        Self {
            top_k,
            ..Self::default()
        }
    }
}

/// One message to store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMemory {
    pub content: String,
    pub role: Role,
    pub message_id: Option<String>,
    pub sender_name: Option<String>,
}

impl NewMemory {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            role,
            message_id: None,
            sender_name: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.message_id = Some(id.into());
        self
    }

    pub fn with_sender(mut self, name: impl Into<String>) -> Self {
        self.sender_name = Some(name.into());
        self
    }
}

/// Fresh message id for callers that supply none.
pub fn generate_message_id() -> String {
    format!("cc_{}", ulid::Ulid::new().to_string().to_lowercase())
}

pub fn search_body(config: &Config, query: &str, opts: &SearchOptions) -> Value {
    json!({
        "query": query,
        "user_id": config.user_id,
        "group_id": config.group_id,
        "memory_types": opts.memory_types,
        "retrieve_method": opts.retrieve_method,
        "top_k": opts.top_k,
        "include_metadata": true,
    })
}

pub fn add_body(config: &Config, memory: &NewMemory, create_time: &str) -> Value {
    let sender_name = memory.sender_name.clone().unwrap_or_else(|| {
        match memory.role {
            Role::Assistant => "Claude",
            Role::User => "User",
        }
        .to_string()
    });
    json!({
        "message_id": memory.message_id.clone().unwrap_or_else(generate_message_id),
        "create_time": create_time,
        "sender": config.user_id,
        "sender_name": sender_name,
        "role": memory.role.as_str(),
        "content": memory.content,
        "group_id": config.group_id,
        "group_name": GROUP_NAME,
    })
}

pub fn list_body(config: &Config, page_size: u32) -> Value {
    json!({
        "user_id": config.user_id,
        "group_id": config.group_id,
        "page_size": page_size,
        "memory_type": "episodic_memory",
    })
}

/// Remote memory store seam. The hooks, MCP server and CLI only see this.
pub trait MemoryApi {
    fn search(&self, query: &str, opts: &SearchOptions) -> Result<Value, ApiError>;
    fn add(&self, memory: &NewMemory) -> Result<Value, ApiError>;
    fn list(&self, page_size: u32) -> Result<Value, ApiError>;

    fn search_memories(&self, query: &str, opts: &SearchOptions) -> Result<Vec<Memory>, ApiError> {
        Ok(transform_search_results(&self.search(query, opts)?))
    }

    fn recent_memories(&self, page_size: u32) -> Result<Vec<Memory>, ApiError> {
        Ok(transform_list_results(&self.list(page_size)?))
    }
}

/// Raw upstream reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Thin HTTP layer over a base URL. Non-2xx replies are returned, not raised.
#[derive(Debug, Clone)]
pub struct Upstream {
    base_url: String,
    agent: ureq::Agent,
}

impl Upstream {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build()
            .new_agent();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            agent,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `GET` carrying a JSON body, which the memory API expects for reads.
    pub fn get_with_body(
        &self,
        path: &str,
        authorization: &str,
        body: String,
    ) -> Result<RawResponse, ApiError> {
        let url = format!("{}{path}", self.base_url);
        tracing::debug!(%url, "GET with body");
        let mut resp = self
            .agent
            .get(&url)
            .header("Authorization", authorization)
            .header("Content-Type", "application/json")
            .force_send_body()
            .send(body)?;
        read_raw(&mut resp)
    }

    pub fn post(&self, path: &str, authorization: &str, body: String) -> Result<RawResponse, ApiError> {
        let url = format!("{}{path}", self.base_url);
        tracing::debug!(%url, "POST");
        let mut resp = self
            .agent
            .post(&url)
            .header("Authorization", authorization)
            .header("Content-Type", "application/json")
            .send(body)?;
        read_raw(&mut resp)
    }
}

fn read_raw(resp: &mut ureq::http::Response<ureq::Body>) -> Result<RawResponse, ApiError> {
    let status = resp.status().as_u16();
    let body = resp.body_mut().read_to_string()?;
    Ok(RawResponse { status, body })
}

fn decode(raw: RawResponse) -> Result<Value, ApiError> {
    if !raw.is_success() {
        return Err(ApiError::from_status(raw.status, &raw.body));
    }
    if raw.body.trim().is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_str(&raw.body)?)
}

/// `MemoryApi` over HTTP.
pub struct EverMemClient {
    config: Config,
    upstream: Upstream,
}

impl EverMemClient {
    pub fn new(config: Config) -> Self {
        let upstream = Upstream::new(&config.api_url, config.timeout);
        Self { config, upstream }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn bearer(&self) -> Result<String, ApiError> {
        let key = self.config.api_key.as_deref().ok_or(ApiError::NotConfigured)?;
        Ok(format!("Bearer {key}"))
    }
}

impl MemoryApi for EverMemClient {
    fn search(&self, query: &str, opts: &SearchOptions) -> Result<Value, ApiError> {
        let auth = self.bearer()?;
        let body = search_body(&self.config, query, opts).to_string();
        decode(self.upstream.get_with_body(SEARCH_PATH, &auth, body)?)
    }

    fn add(&self, memory: &NewMemory) -> Result<Value, ApiError> {
        let auth = self.bearer()?;
        let body = add_body(&self.config, memory, &evermem_store::now_rfc3339()).to_string();
        decode(self.upstream.post(MEMORIES_PATH, &auth, body)?)
    }

    fn list(&self, page_size: u32) -> Result<Value, ApiError> {
        let auth = self.bearer()?;
        let body = list_body(&self.config, page_size).to_string();
        decode(self.upstream.get_with_body(MEMORIES_PATH, &auth, body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn config() -> Config {
        Config::from_lookup(Path::new("/work/app"), |k| match k {
            "EVERMEM_API_KEY" => Some("sk-test".to_string()),
            "EVERMEM_USER_ID" => Some("dev".to_string()),
            _ => None,
        })
    }

    #[test]
    fn search_body_shape() {
        let body = search_body(&config(), "db choice", &SearchOptions::top_k(5));
        assert_eq!(body["query"], "db choice");
        assert_eq!(body["user_id"], "dev");
        assert_eq!(body["group_id"], "claude-code:/work/app");
        assert_eq!(body["top_k"], 5);
        assert_eq!(body["retrieve_method"], "hybrid");
        assert_eq!(body["memory_types"], json!(["episodic_memory"]));
        assert_eq!(body["include_metadata"], true);
    }

    #[test]
    fn add_body_defaults_sender_by_role() {
        let cfg = config();
        let user = add_body(&cfg, &NewMemory::new(Role::User, "q").with_id("u_1"), "2025-01-01T00:00:00Z");
        assert_eq!(user["sender_name"], "User");
        assert_eq!(user["message_id"], "u_1");
        assert_eq!(user["role"], "user");
        assert_eq!(user["sender"], "dev");
        assert_eq!(user["group_name"], GROUP_NAME);
        assert_eq!(user["create_time"], "2025-01-01T00:00:00Z");

        let assistant = add_body(&cfg, &NewMemory::new(Role::Assistant, "a"), "t");
        assert_eq!(assistant["sender_name"], "Claude");
        assert!(assistant["message_id"].as_str().unwrap().starts_with("cc_"));

        let system = add_body(&cfg, &NewMemory::new(Role::User, "s").with_sender("System"), "t");
        assert_eq!(system["sender_name"], "System");
    }

    #[test]
    fn list_body_shape() {
        let body = list_body(&config(), 100);
        assert_eq!(body["page_size"], 100);
        assert_eq!(body["memory_type"], "episodic_memory");
    }

    #[test]
    fn generated_ids_are_unique() {
        assert_ne!(generate_message_id(), generate_message_id());
    }

    #[test]
    fn unconfigured_client_fails_before_network() {
        let cfg = Config::from_lookup(Path::new("/x"), |_| None);
        let client = EverMemClient::new(cfg);
        assert!(matches!(client.add(&NewMemory::new(Role::User, "q")), Err(ApiError::NotConfigured)));
        assert!(matches!(client.search("q", &SearchOptions::default()), Err(ApiError::NotConfigured)));
    }

    #[test]
    fn decode_handles_status_and_empty_bodies() {
        let ok = decode(RawResponse { status: 200, body: String::new() }).unwrap();
        assert_eq!(ok, Value::Null);
        let err = decode(RawResponse {
            status: 401,
            body: r#"{"message":"bad key"}"#.into(),
        })
        .unwrap_err();
        assert!(err.is_auth());
        assert_eq!(err.to_string(), "bad key");
    }
}
