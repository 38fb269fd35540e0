/// Failures talking to the EverMem API.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("EverMem API key not configured")]
    NotConfigured,
    #[error("API timeout")]
    Timeout,
    #[error("{message}")]
    Status { status: u16, message: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ApiError {
    /// Build a status error from a non-2xx body, preferring its `message`.
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| format!("API error: {status}"));
        ApiError::Status { status, message }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, ApiError::Status { status: 401 | 403, .. })
    }

    /// One-line hint for hook output.
    pub fn user_hint(&self) -> String {
        match self {
            ApiError::NotConfigured => "EVERMEM_API_KEY is not set.".to_string(),
            ApiError::Timeout => "Request timeout - EverMem server is slow or unreachable.".to_string(),
            e if e.is_auth() => "Authentication failed. Check your EVERMEM_API_KEY.".to_string(),
            ApiError::Status { status: 404, .. } => {
                "API endpoint not found. Check EVERMEM_API_URL.".to_string()
            }
            ApiError::Transport(_) => {
                "Network error - cannot reach EverMem server.".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl From<ureq::Error> for ApiError {
    fn from(e: ureq::Error) -> Self {
        match e {
            ureq::Error::Timeout(_) => ApiError::Timeout,
            ureq::Error::Io(io) if io.kind() == std::io::ErrorKind::TimedOut => ApiError::Timeout,
            ureq::Error::StatusCode(status) => ApiError::Status {
                status,
                message: format!("API error: {status}"),
            },
            other => ApiError::Transport(other.to_string()),
        }
    }
}
