use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use axum::extract::State;
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use regex::Regex;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;

use evermem_api::{key_id_for, ApiError, RawResponse, Upstream};
use evermem_store::GroupsLog;

pub const DEFAULT_PORT: u16 = 3456;
/// Upstream timeout for proxied dashboard reads.
pub const PROXY_TIMEOUT: Duration = Duration::from_secs(30);

static AUTH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Bearer [A-Za-z0-9_\-.]+$").expect("static regex"));

// ── Config ──

pub struct ServeConfig {
    pub bind: String,
    pub port: u16,
    pub api_url: String,
    pub store_root: PathBuf,
}

impl ServeConfig {
    /// Port from `EVERMEM_PROXY_PORT`, falling back to [`DEFAULT_PORT`].
    pub fn port_from_env() -> u16 {
        std::env::var("EVERMEM_PROXY_PORT")
            .ok()
            .and_then(|p| p.trim().parse().ok())
            .unwrap_or(DEFAULT_PORT)
    }
}

// ── Upstream seam ──

/// Where proxied reads go. The live implementation is [`Upstream`].
pub trait Forward: Send + Sync {
    fn get_with_body(&self, path: &str, authorization: &str, body: String) -> Result<RawResponse, ApiError>;
}

impl Forward for Upstream {
    fn get_with_body(&self, path: &str, authorization: &str, body: String) -> Result<RawResponse, ApiError> {
        Upstream::get_with_body(self, path, authorization, body)
    }
}

// ── App State ──

struct AppState {
    port: u16,
    store_root: PathBuf,
    upstream: Arc<dyn Forward>,
}

// ── Error Handling ──

struct AppError(anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = json!({ "error": self.0.to_string() });
        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}

impl<E: Into<anyhow::Error>> From<E> for AppError {
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

fn error_json(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

// ── Entrypoint ──

pub async fn serve(config: ServeConfig) -> anyhow::Result<()> {
    let upstream = Arc::new(Upstream::new(&config.api_url, PROXY_TIMEOUT));
    let app = router(config.port, &config.store_root, upstream);
    let addr = format!("{}:{}", config.bind, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    eprintln!("EverMem dashboard proxy listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

/// Build the router (for testing without binding to a port).
pub fn router(port: u16, store_root: &Path, upstream: Arc<dyn Forward>) -> Router {
    let state = Arc::new(AppState {
        port,
        store_root: store_root.to_path_buf(),
        upstream,
    });
    Router::new()
        .route("/health", get(health))
        .route("/api/groups", get(get_groups))
        .route("/api/v0/memories", post(proxy_read))
        .route("/api/v0/memories/search", post(proxy_read))
        .fallback(not_found)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn not_found() -> Response {
    error_json(StatusCode::NOT_FOUND, "Not found")
}

// ── GET /health ──

async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({ "status": "ok", "port": state.port }))
}

// ── GET /api/groups ──

async fn get_groups(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let Some(api_key) = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
    else {
        return Ok(error_json(
            StatusCode::UNAUTHORIZED,
            "Missing or invalid Authorization header",
        ));
    };
    let key_id = key_id_for(api_key);
    let groups = GroupsLog::new(&state.store_root).load(Some(&key_id))?;
    Ok(Json(json!({
        "status": "ok",
        "keyId": key_id,
        "totalGroups": groups.len(),
        "groups": groups,
    }))
    .into_response())
}

// ── POST /api/v0/memories[/search] ──

/// Browsers cannot send a GET with a body, so the dashboard POSTs here and
/// the body is replayed upstream as a GET on the same path.
async fn proxy_read(
    State(state): State<Arc<AppState>>,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> Result<Response, AppError> {
    let Some(auth) = headers.get(AUTHORIZATION) else {
        return Ok(error_json(StatusCode::UNAUTHORIZED, "Missing Authorization header"));
    };
    let auth = match auth.to_str() {
        Ok(a) if AUTH_RE.is_match(a) => a.to_string(),
        _ => {
            return Ok(error_json(
                StatusCode::BAD_REQUEST,
                "Invalid Authorization header format",
            ))
        }
    };

    let path = uri.path().to_string();
    let upstream = Arc::clone(&state.upstream);
    let forwarded =
        tokio::task::spawn_blocking(move || upstream.get_with_body(&path, &auth, body)).await?;

    match forwarded {
        Ok(raw) => {
            let status = StatusCode::from_u16(raw.status).unwrap_or(StatusCode::BAD_GATEWAY);
            let data: Value =
                serde_json::from_str(&raw.body).unwrap_or_else(|_| json!({ "raw": raw.body }));
            Ok((status, Json(data)).into_response())
        }
        Err(e) => {
            tracing::warn!("proxy error: {e}");
            Ok((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Proxy request failed", "message": e.to_string() })),
            )
                .into_response())
        }
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use std::sync::Mutex;
    use tower::ServiceExt;

    #[derive(Default)]
    struct FakeUpstream {
        calls: Mutex<Vec<(String, String, String)>>,
        fail: bool,
    }

    impl Forward for FakeUpstream {
        fn get_with_body(&self, path: &str, authorization: &str, body: String) -> Result<RawResponse, ApiError> {
            self.calls
                .lock()
                .unwrap()
                .push((path.to_string(), authorization.to_string(), body));
            if self.fail {
                return Err(ApiError::Timeout);
            }
            Ok(RawResponse {
                status: 200,
                body: r#"{"result":{"memories":[]}}"#.to_string(),
            })
        }
    }

    async fn body_json(resp: Response) -> Value {
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    fn post_req(uri: &str, auth: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method("POST").uri(uri);
        if let Some(a) = auth {
            builder = builder.header("authorization", a);
        }
        builder.body(Body::from(r#"{"user_id":"u"}"#)).unwrap()
    }

    #[tokio::test]
    async fn health_reports_port() {
        let tmp = tempfile::tempdir().unwrap();
        let app = router(4000, tmp.path(), Arc::new(FakeUpstream::default()));
        let resp = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["port"], 4000);
    }

    #[tokio::test]
    async fn search_is_forwarded_with_body() {
        let tmp = tempfile::tempdir().unwrap();
        let upstream = Arc::new(FakeUpstream::default());
        let app = router(DEFAULT_PORT, tmp.path(), upstream.clone());
        let resp = app
            .oneshot(post_req("/api/v0/memories/search", Some("Bearer sk-abc.123_x")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(body_json(resp).await["result"].is_object());

        let calls = upstream.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "/api/v0/memories/search");
        assert_eq!(calls[0].1, "Bearer sk-abc.123_x");
        assert_eq!(calls[0].2, r#"{"user_id":"u"}"#);
    }

    #[tokio::test]
    async fn missing_auth_is_401_and_malformed_is_400() {
        let tmp = tempfile::tempdir().unwrap();
        let upstream = Arc::new(FakeUpstream::default());
        let app = router(DEFAULT_PORT, tmp.path(), upstream.clone());

        let resp = app
            .clone()
            .oneshot(post_req("/api/v0/memories", None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let resp = app
            .oneshot(post_req("/api/v0/memories", Some("Bearer bad token; rm -rf")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(upstream.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn upstream_failure_is_500() {
        let tmp = tempfile::tempdir().unwrap();
        let upstream = Arc::new(FakeUpstream {
            fail: true,
            ..FakeUpstream::default()
        });
        let resp = router(DEFAULT_PORT, tmp.path(), upstream)
            .oneshot(post_req("/api/v0/memories", Some("Bearer k")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(resp).await["error"], "Proxy request failed");
    }

    #[tokio::test]
    async fn groups_are_filtered_by_key() {
        let tmp = tempfile::tempdir().unwrap();
        let log = GroupsLog::new(tmp.path());
        let mine = key_id_for("sk-mine");
        log.save("claude-code:/a", Path::new("/a"), Some(&mine)).unwrap();
        log.save("claude-code:/b", Path::new("/b"), Some("someoneelse")).unwrap();

        let resp = router(DEFAULT_PORT, tmp.path(), Arc::new(FakeUpstream::default()))
            .oneshot(
                Request::builder()
                    .uri("/api/groups")
                    .header("authorization", "Bearer sk-mine")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["keyId"], mine);
        assert_eq!(json["totalGroups"], 1);
        assert_eq!(json["groups"][0]["id"], "claude-code:/a");
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let tmp = tempfile::tempdir().unwrap();
        let resp = router(DEFAULT_PORT, tmp.path(), Arc::new(FakeUpstream::default()))
            .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
