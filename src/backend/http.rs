//! reqwest implementation of the backend

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::config::BackendConfig;

use super::{Backend, BackendError, ChatReply, HttpMethod, UserMemory};

pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    command_prefix: String,
}

impl HttpBackend {
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| BackendError::Client(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            command_prefix: config.command_prefix.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Value, BackendError> {
        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(transport_error)?;

        if !status.is_success() {
            let detail = error_detail(&bytes)
                .unwrap_or_else(|| format!("HTTP error! status: {}", status.as_u16()));
            return Err(BackendError::Status {
                status: status.as_u16(),
                detail,
            });
        }

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }

        serde_json::from_slice(&bytes).map_err(|e| BackendError::Decode(e.to_string()))
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn chat(&self, text: &str) -> Result<ChatReply, BackendError> {
        debug!("sending chat message");
        let body = serde_json::json!({ "text": text });
        let value = self.send(self.client.post(self.url("/chat")).json(&body)).await?;
        serde_json::from_value(value).map_err(|e| BackendError::Decode(e.to_string()))
    }

    async fn command(
        &self,
        method: HttpMethod,
        endpoint: &str,
        body: Option<&Value>,
    ) -> Result<Value, BackendError> {
        let url = self.url(&format!("{}{}", self.command_prefix, endpoint));
        debug!(%method, %url, "dispatching command");

        let request = match method {
            HttpMethod::Get => self.client.get(&url),
            HttpMethod::Post => self.client.post(&url),
        };
        let request = match body {
            Some(body) if method != HttpMethod::Get => request.json(body),
            _ => request,
        };

        self.send(request).await
    }

    async fn memory(&self) -> Result<UserMemory, BackendError> {
        let value = self.send(self.client.get(self.url("/get_memory"))).await?;
        serde_json::from_value(value).map_err(|e| BackendError::Decode(e.to_string()))
    }
}

fn transport_error(e: reqwest::Error) -> BackendError {
    if e.is_timeout() {
        BackendError::Timeout
    } else {
        BackendError::Transport(e.to_string())
    }
}

/// Pull `detail` or `message` out of a JSON error body
fn error_detail(bytes: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(bytes).ok()?;
    match value.get("detail") {
        Some(Value::String(detail)) => Some(detail.clone()),
        Some(detail) if !detail.is_null() => Some(detail.to_string()),
        _ => value
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    /// Request line and body seen by the canned server
    #[derive(Debug)]
    pub(crate) struct Captured {
        pub request_line: String,
        pub body: String,
    }

    /// Serve one canned HTTP response on a loopback port
    pub(crate) async fn serve_once(status: &str, body: &str) -> (String, oneshot::Receiver<Captured>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel();
        let response = format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let captured = read_request(&mut stream).await;
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.ok();
            let _ = tx.send(captured);
        });

        (format!("http://{}", addr), rx)
    }

    async fn read_request(stream: &mut tokio::net::TcpStream) -> Captured {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        let header_end = loop {
            let n = stream.read(&mut chunk).await.unwrap();
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
            if n == 0 {
                break buf.len();
            }
        };

        let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
        let content_length = head
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())
                    .flatten()
            })
            .unwrap_or(0);

        while buf.len() < header_end + content_length {
            let n = stream.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
        }

        Captured {
            request_line: head.lines().next().unwrap_or_default().to_string(),
            body: String::from_utf8_lossy(&buf[header_end..]).to_string(),
        }
    }

    pub(crate) fn config(base_url: &str) -> BackendConfig {
        BackendConfig {
            base_url: base_url.to_string(),
            command_prefix: "/api".to_string(),
            timeout_ms: 2_000,
        }
    }

    #[tokio::test]
    async fn test_chat_posts_text() {
        let (url, captured) = serve_once("200 OK", r#"{"reply":"Hi there","timestamp":1.5}"#).await;
        let backend = HttpBackend::new(&config(&url)).unwrap();

        let reply = backend.chat("hello").await.unwrap();
        assert_eq!(reply.reply, "Hi there");

        let captured = captured.await.unwrap();
        assert_eq!(captured.request_line, "POST /chat HTTP/1.1");
        assert_eq!(captured.body, r#"{"text":"hello"}"#);
    }

    #[tokio::test]
    async fn test_command_uses_prefix() {
        let (url, captured) = serve_once("200 OK", r#"{"cpu_percent":12}"#).await;
        let backend = HttpBackend::new(&config(&url)).unwrap();

        let value = backend
            .command(HttpMethod::Get, "/system/stats", None)
            .await
            .unwrap();
        assert_eq!(value["cpu_percent"], 12);
        assert_eq!(
            captured.await.unwrap().request_line,
            "GET /api/system/stats HTTP/1.1"
        );
    }

    #[tokio::test]
    async fn test_status_error_uses_detail() {
        let (url, _captured) = serve_once(
            "422 Unprocessable Entity",
            r#"{"detail":[{"loc":["body","title"],"msg":"field required"}]}"#,
        )
        .await;
        let backend = HttpBackend::new(&config(&url)).unwrap();
        let body = serde_json::json!({"content": "x"});

        let err = backend
            .command(HttpMethod::Post, "/tasks", Some(&body))
            .await
            .unwrap_err();
        match err {
            BackendError::Status { status, detail } => {
                assert_eq!(status, 422);
                assert!(detail.contains("field required"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_status_error_without_body() {
        let (url, _captured) = serve_once("500 Internal Server Error", "").await;
        let backend = HttpBackend::new(&config(&url)).unwrap();
        let err = backend.memory().await.unwrap_err();
        assert_eq!(
            err,
            BackendError::Status {
                status: 500,
                detail: "HTTP error! status: 500".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            // accept and never answer
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let mut cfg = config(&format!("http://{}", addr));
        cfg.timeout_ms = 100;
        let backend = HttpBackend::new(&cfg).unwrap();
        assert_eq!(backend.chat("hello").await.unwrap_err(), BackendError::Timeout);
    }

    #[test]
    fn test_error_detail_message_field() {
        assert_eq!(
            error_detail(br#"{"message":"nope"}"#),
            Some("nope".to_string())
        );
        assert_eq!(error_detail(b"not json"), None);
    }
}
