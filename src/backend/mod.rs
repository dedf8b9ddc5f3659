//! Backend module for the assistant's remote services
//!
//! The chat, task and system endpoints are opaque HTTP services; the
//! [`Backend`] trait is the seam the dispatcher and chat path call through.

pub(crate) mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use http::HttpBackend;

/// HTTP method used by a structured command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HttpMethod::Get => write!(f, "GET"),
            HttpMethod::Post => write!(f, "POST"),
        }
    }
}

/// Reply from `POST /chat`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatReply {
    pub reply: String,
    #[serde(default)]
    pub timestamp: Option<f64>,
}

/// Payload of `GET /get_memory`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserMemory {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub habits: Vec<String>,
    /// Entries are either plain strings or structured objects
    #[serde(default)]
    pub conversations: Vec<Value>,
}

/// Errors talking to the backend
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BackendError {
    #[error("backend returned status {status}: {detail}")]
    Status { status: u16, detail: String },

    #[error("request timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid response body: {0}")]
    Decode(String),

    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

#[async_trait]
pub trait Backend: Send + Sync {
    /// `POST /chat` with `{text}`
    async fn chat(&self, text: &str) -> Result<ChatReply, BackendError>;

    /// Call a structured command endpoint such as `/tasks`
    async fn command(
        &self,
        method: HttpMethod,
        endpoint: &str,
        body: Option<&Value>,
    ) -> Result<Value, BackendError>;

    /// `GET /get_memory`
    async fn memory(&self) -> Result<UserMemory, BackendError>;
}
