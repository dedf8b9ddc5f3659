//! Command dispatch
//!
//! Executes a structured command against the backend and always resolves to
//! a [`CommandResult`]; transport and HTTP failures are classified here and
//! never escape.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::backend::{Backend, BackendError};

use super::format::{stats_display, stats_speech};
use super::grammar::{Command, CommandKind, ParsedCommand};

/// Classified dispatch failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "type", content = "detail", rename_all = "snake_case")]
pub enum DispatchError {
    #[error("backend rejected the request body: {0}")]
    Validation(String),

    #[error("endpoint not found: {0}")]
    EndpointNotFound(String),

    #[error("command failed: {0}")]
    CommandFailed(String),

    #[error("request timed out")]
    Timeout,
}

impl From<BackendError> for DispatchError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Status { status: 422, detail } => DispatchError::Validation(detail),
            BackendError::Status { status: 404, detail } => DispatchError::EndpointNotFound(detail),
            BackendError::Timeout => DispatchError::Timeout,
            other => DispatchError::CommandFailed(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandResult {
    pub success: bool,
    pub kind: CommandKind,
    pub display_message: String,
    pub speech_message: String,
    pub raw: Option<Value>,
    pub error: Option<DispatchError>,
}

pub struct CommandDispatcher {
    backend: Arc<dyn Backend>,
}

impl CommandDispatcher {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    /// Execute a structured command; `None` for chat, which takes the chat path
    pub async fn dispatch(&self, parsed: &ParsedCommand) -> Option<CommandResult> {
        if parsed.is_chat() {
            return None;
        }

        let body = parsed.body();
        let outcome = self
            .backend
            .command(parsed.method, parsed.target_endpoint, body.as_ref())
            .await;

        Some(match outcome {
            Ok(raw) => {
                info!(kind = ?parsed.kind(), "command succeeded");
                success(parsed, raw)
            }
            Err(err) => {
                warn!(kind = ?parsed.kind(), error = %err, "command failed");
                failure(parsed, DispatchError::from(err))
            }
        })
    }
}

fn success(parsed: &ParsedCommand, raw: Value) -> CommandResult {
    let (display_message, speech_message) = match &parsed.command {
        Command::AddTask { content } => (
            format!("✅ Task added: \"{}\"", content),
            format!("Task added: {}", content),
        ),
        Command::OpenApp { name } => (format!("🚀 Opening {}...", name), format!("Opening {}", name)),
        Command::GetStats => stats_messages(&raw),
        Command::Chat { .. } => (
            "Command executed successfully".to_string(),
            "Command executed successfully".to_string(),
        ),
    };

    CommandResult {
        success: true,
        kind: parsed.kind(),
        display_message,
        speech_message,
        raw: Some(raw),
        error: None,
    }
}

fn stats_messages(raw: &Value) -> (String, String) {
    if !raw.is_object() {
        let text = "📊 System statistics retrieved".to_string();
        return (text, "System statistics retrieved".to_string());
    }

    let display = stats_display(raw)
        .unwrap_or_else(|| serde_json::to_string_pretty(raw).unwrap_or_else(|_| raw.to_string()));
    let speech = stats_speech(raw).unwrap_or_else(|| "System statistics retrieved".to_string());
    (format!("📊 System Statistics:\n{}", display), speech)
}

fn failure(parsed: &ParsedCommand, error: DispatchError) -> CommandResult {
    let kind = parsed.kind();
    let message = match &error {
        DispatchError::Validation(_) => format!(
            "I understand your command, but the server needs different data. {}",
            validation_hint(kind)
        ),
        DispatchError::EndpointNotFound(_) => {
            format!("The \"{}\" feature is not available right now.", kind.label())
        }
        DispatchError::Timeout => format!(
            "I couldn't execute \"{}\" because the server took too long to respond. {}",
            parsed.original,
            usage_hint(kind)
        ),
        DispatchError::CommandFailed(_) => format!(
            "I couldn't execute \"{}\". {}",
            parsed.original,
            usage_hint(kind)
        ),
    };

    CommandResult {
        success: false,
        kind,
        display_message: message.clone(),
        speech_message: message,
        raw: None,
        error: Some(error),
    }
}

fn usage_hint(kind: CommandKind) -> &'static str {
    match kind {
        CommandKind::AddTask => "Try saying \"add task [your task]\" or \"remind me to [do something]\"",
        CommandKind::OpenApp => "Try saying \"open [application name]\" or \"launch [app]\"",
        CommandKind::GetStats => "Try saying \"system stats\" or \"CPU usage\"",
        CommandKind::Chat => "Please try rephrasing your command.",
    }
}

fn validation_hint(kind: CommandKind) -> &'static str {
    match kind {
        CommandKind::AddTask => "The server might expect a different field name for tasks.",
        CommandKind::OpenApp => "The server might expect a different field name for applications.",
        _ => "The server validation requirements might have changed.",
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::backend::{ChatReply, HttpBackend, HttpMethod, UserMemory};
    use crate::command::grammar::parse;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// Backend returning canned outcomes and recording calls
    pub(crate) struct StubBackend {
        pub command_result: Result<Value, BackendError>,
        pub chat_result: Result<ChatReply, BackendError>,
        pub calls: Mutex<Vec<(HttpMethod, String, Option<Value>)>>,
    }

    impl StubBackend {
        pub fn command(result: Result<Value, BackendError>) -> Self {
            Self {
                command_result: result,
                chat_result: Ok(ChatReply {
                    reply: "Sure thing".to_string(),
                    timestamp: None,
                }),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn chat(result: Result<ChatReply, BackendError>) -> Self {
            Self {
                chat_result: result,
                ..Self::command(Ok(Value::Null))
            }
        }
    }

    #[async_trait]
    impl Backend for StubBackend {
        async fn chat(&self, text: &str) -> Result<ChatReply, BackendError> {
            self.calls
                .lock()
                .unwrap()
                .push((HttpMethod::Post, "/chat".to_string(), Some(json!({ "text": text }))));
            self.chat_result.clone()
        }

        async fn command(
            &self,
            method: HttpMethod,
            endpoint: &str,
            body: Option<&Value>,
        ) -> Result<Value, BackendError> {
            self.calls
                .lock()
                .unwrap()
                .push((method, endpoint.to_string(), body.cloned()));
            self.command_result.clone()
        }

        async fn memory(&self) -> Result<UserMemory, BackendError> {
            Ok(UserMemory::default())
        }
    }

    async fn run(text: &str, backend: StubBackend) -> (Option<CommandResult>, Arc<StubBackend>) {
        let backend = Arc::new(backend);
        let dispatcher = CommandDispatcher::new(backend.clone());
        (dispatcher.dispatch(&parse(text)).await, backend)
    }

    #[tokio::test]
    async fn test_add_task_success() {
        let (result, backend) = run("remind me to call mom", StubBackend::command(Ok(json!({"id": "1"})))).await;
        let result = result.unwrap();

        assert!(result.success);
        assert_eq!(result.display_message, "✅ Task added: \"call mom\"");
        assert_eq!(result.speech_message, "Task added: call mom");

        let calls = backend.calls.lock().unwrap();
        assert_eq!(calls[0].0, HttpMethod::Post);
        assert_eq!(calls[0].1, "/tasks");
        assert_eq!(calls[0].2, Some(json!({"content": "call mom", "title": "call mom"})));
    }

    #[tokio::test]
    async fn test_open_app_not_found() {
        let err = BackendError::Status {
            status: 404,
            detail: "Not Found".to_string(),
        };
        let (result, _) = run("open notepad", StubBackend::command(Err(err))).await;
        let result = result.unwrap();

        assert!(!result.success);
        assert_eq!(result.kind, CommandKind::OpenApp);
        assert!(matches!(result.error, Some(DispatchError::EndpointNotFound(_))));
        assert_eq!(
            result.display_message,
            "The \"open app\" feature is not available right now."
        );
    }

    #[tokio::test]
    async fn test_stats_success() {
        let (result, backend) = run("what's the cpu usage", StubBackend::command(Ok(json!({"cpu_percent": 42})))).await;
        let result = result.unwrap();

        assert!(result.display_message.contains("CPU Usage: 42%"));
        assert!(result.speech_message.contains("CPU usage is 42 percent"));
        assert_eq!(backend.calls.lock().unwrap()[0].2, None);
    }

    #[tokio::test]
    async fn test_stats_unrecognised_fields_dump_raw() {
        let (result, _) = run("system stats", StubBackend::command(Ok(json!({"load": [1, 2]})))).await;
        let result = result.unwrap();
        assert!(result.display_message.starts_with("📊 System Statistics:\n{"));
        assert!(result.display_message.contains("\"load\""));
        assert_eq!(result.speech_message, "System statistics retrieved");
    }

    #[tokio::test]
    async fn test_validation_error() {
        let err = BackendError::Status {
            status: 422,
            detail: "field required".to_string(),
        };
        let (result, _) = run("add task buy milk", StubBackend::command(Err(err))).await;
        let result = result.unwrap();
        assert_eq!(
            result.display_message,
            "I understand your command, but the server needs different data. The server might expect a different field name for tasks."
        );
        assert_eq!(result.error, Some(DispatchError::Validation("field required".to_string())));
    }

    #[tokio::test]
    async fn test_transport_failure_is_command_failed() {
        let err = BackendError::Transport("connection refused".to_string());
        let (result, _) = run("open chrome", StubBackend::command(Err(err))).await;
        let result = result.unwrap();
        assert!(matches!(result.error, Some(DispatchError::CommandFailed(_))));
        assert_eq!(
            result.display_message,
            "I couldn't execute \"open chrome\". Try saying \"open [application name]\" or \"launch [app]\""
        );
    }

    #[tokio::test]
    async fn test_timeout_message() {
        let (result, _) = run("system stats", StubBackend::command(Err(BackendError::Timeout))).await;
        let result = result.unwrap();
        assert_eq!(result.error, Some(DispatchError::Timeout));
        assert!(result.display_message.contains("took too long"));
    }

    #[tokio::test]
    async fn test_chat_is_not_dispatched() {
        let (result, backend) = run("tell me a joke", StubBackend::command(Ok(Value::Null))).await;
        assert!(result.is_none());
        assert!(backend.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_open_app_over_http_not_found() {
        let (url, captured) =
            crate::backend::http::tests::serve_once("404 Not Found", r#"{"detail":"Not Found"}"#).await;
        let backend = Arc::new(HttpBackend::new(&crate::backend::http::tests::config(&url)).unwrap());
        let dispatcher = CommandDispatcher::new(backend);

        let result = dispatcher.dispatch(&parse("open notepad")).await.unwrap();
        assert_eq!(
            result.display_message,
            "The \"open app\" feature is not available right now."
        );

        let captured = captured.await.unwrap();
        assert_eq!(captured.request_line, "POST /api/system/open HTTP/1.1");
        assert!(captured.body.contains(r#""app_name":"notepad""#));
    }
}
