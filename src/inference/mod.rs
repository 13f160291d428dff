//! Client for the local inference service (the Ollama HTTP API).
//!
//! Two endpoints are used:
//! - `GET /api/tags` lists the models currently installed
//! - `POST /api/chat` runs a non-streaming chat completion
//!
//! Calls are blocking. The model listing is bounded by a short read timeout;
//! chat completions run for as long as the model needs.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Default address of a local Ollama server.
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Default timeout for the model listing probe.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors from the inference service.
#[derive(Debug, Error)]
pub enum InferenceError {
    /// Connection refused, DNS failure, timeout, ...
    #[error("Ollama is unreachable: {0}")]
    Unreachable(String),

    /// Non-success HTTP status; `message` is the server's error text when it sent one
    #[error("Ollama returned HTTP {code}: {message}")]
    Status { code: u16, message: String },

    /// Response body did not have the expected shape
    #[error("Failed to parse Ollama response: {0}")]
    Parse(String),
}

/// The seam between insight generation and the inference service.
pub trait InferenceBackend: Send + Sync {
    /// Whether the service answers the model listing with a success status.
    fn is_reachable(&self) -> bool;

    /// Names of the models currently available, in server order.
    ///
    /// Never fails: an unreachable or misbehaving service yields an empty list.
    fn list_models(&self) -> Vec<String>;

    /// Run a chat completion and return the assistant's message content.
    fn chat(&self, request: &ChatRequest) -> Result<String, InferenceError>;
}

/// A single chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    /// A message with the `user` role.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Sampling options sent with every chat request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChatOptions {
    pub temperature: f32,
    pub top_p: f32,
    /// Maximum number of tokens to generate
    pub num_predict: u32,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.9,
            num_predict: 800,
        }
    }
}

/// Body of `POST /api/chat`.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
    pub options: ChatOptions,
}

impl ChatRequest {
    /// A non-streaming request carrying a single user message.
    pub fn single(model: impl Into<String>, prompt: impl Into<String>, options: ChatOptions) -> Self {
        Self {
            model: model.into(),
            messages: vec![ChatMessage::user(prompt)],
            stream: false,
            options,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// Blocking client for an Ollama server.
pub struct OllamaClient {
    base_url: String,
    probe_timeout: Duration,
    agent: ureq::Agent,
}

impl OllamaClient {
    /// Create a client for the server at `base_url`.
    pub fn new(base_url: impl Into<String>, probe_timeout: Duration) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            probe_timeout,
            agent: ureq::AgentBuilder::new().build(),
        }
    }

    /// Server address without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn fetch_models(&self) -> Result<Vec<String>, InferenceError> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .agent
            .get(&url)
            .timeout(self.probe_timeout)
            .call()
            .map_err(map_ureq_error)?;

        let tags: TagsResponse = response
            .into_json()
            .map_err(|e| InferenceError::Parse(e.to_string()))?;

        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }
}

impl InferenceBackend for OllamaClient {
    fn is_reachable(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url);
        match self.agent.get(&url).timeout(self.probe_timeout).call() {
            Ok(_) => true,
            Err(e) => {
                tracing::error!("Cannot connect to Ollama at {}: {}", self.base_url, e);
                false
            }
        }
    }

    fn list_models(&self) -> Vec<String> {
        match self.fetch_models() {
            Ok(models) => models,
            Err(e) => {
                tracing::error!("Failed to list Ollama models: {}", e);
                Vec::new()
            }
        }
    }

    fn chat(&self, request: &ChatRequest) -> Result<String, InferenceError> {
        let url = format!("{}/api/chat", self.base_url);
        let response = self
            .agent
            .post(&url)
            .send_json(request)
            .map_err(map_ureq_error)?;

        let body: ChatResponse = response
            .into_json()
            .map_err(|e| InferenceError::Parse(e.to_string()))?;

        Ok(body.message.content)
    }
}

fn map_ureq_error(err: ureq::Error) -> InferenceError {
    match err {
        ureq::Error::Status(code, resp) => {
            let body = resp.into_string().unwrap_or_default();
            InferenceError::Status {
                code,
                message: error_message(&body),
            }
        }
        ureq::Error::Transport(t) => InferenceError::Unreachable(t.to_string()),
    }
}

/// Extract `error` from an Ollama error body, falling back to the raw text.
fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .map(|b| b.error)
        .unwrap_or_else(|_| body.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::thread;

    /// Serve one canned HTTP response on a random local port.
    ///
    /// Returns the base URL and a handle yielding the raw request body.
    fn serve_once(status_line: &'static str, body: &'static str) -> (String, thread::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut content_length = 0usize;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                if line == "\r\n" || line.is_empty() {
                    break;
                }
                let lower = line.to_ascii_lowercase();
                if let Some(value) = lower.strip_prefix("content-length:") {
                    content_length = value.trim().parse().unwrap();
                }
            }
            let mut request_body = vec![0u8; content_length];
            reader.read_exact(&mut request_body).unwrap();

            let mut stream = stream;
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).unwrap();
            String::from_utf8(request_body).unwrap()
        });
        (format!("http://{}", addr), handle)
    }

    /// An address nothing listens on.
    fn dead_url() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{}", addr)
    }

    #[test]
    fn test_tags_response_deserialize() {
        let json = r#"{"models":[{"name":"llama3.1:latest","size":123},{"name":"mistral:latest"}]}"#;
        let tags: TagsResponse = serde_json::from_str(json).unwrap();
        let names: Vec<_> = tags.models.into_iter().map(|m| m.name).collect();
        assert_eq!(names, vec!["llama3.1:latest", "mistral:latest"]);
    }

    #[test]
    fn test_tags_response_without_models() {
        let tags: TagsResponse = serde_json::from_str("{}").unwrap();
        assert!(tags.models.is_empty());
    }

    #[test]
    fn test_chat_request_serialization() {
        let request = ChatRequest::single("llama3.1", "Bonjour", ChatOptions::default());
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "llama3.1");
        assert_eq!(json["stream"], false);
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "Bonjour");
        assert_eq!(json["options"]["num_predict"], 800);
    }

    #[test]
    fn test_error_message_prefers_json_error_field() {
        assert_eq!(
            error_message(r#"{"error":"model \"llama3.1\" not found, try pulling it first"}"#),
            r#"model "llama3.1" not found, try pulling it first"#
        );
        assert_eq!(error_message("  plain failure \n"), "plain failure");
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = OllamaClient::new("http://localhost:11434/", DEFAULT_PROBE_TIMEOUT);
        assert_eq!(client.base_url(), "http://localhost:11434");
    }

    #[test]
    fn test_unreachable_server_degrades_to_no_models() {
        let client = OllamaClient::new(dead_url(), Duration::from_secs(1));
        assert!(!client.is_reachable());
        assert!(client.list_models().is_empty());
    }

    #[test]
    fn test_list_models_from_server() {
        let (url, handle) = serve_once(
            "200 OK",
            r#"{"models":[{"name":"mistral:latest"},{"name":"phi3:mini"}]}"#,
        );
        let client = OllamaClient::new(url, DEFAULT_PROBE_TIMEOUT);
        assert_eq!(client.list_models(), vec!["mistral:latest", "phi3:mini"]);
        handle.join().unwrap();
    }

    #[test]
    fn test_list_models_error_status_is_empty() {
        let (url, handle) = serve_once("500 Internal Server Error", r#"{"error":"boom"}"#);
        let client = OllamaClient::new(url, DEFAULT_PROBE_TIMEOUT);
        assert!(client.list_models().is_empty());
        handle.join().unwrap();
    }

    #[test]
    fn test_chat_returns_message_content() {
        let (url, handle) = serve_once(
            "200 OK",
            r#"{"model":"llama3.1","message":{"role":"assistant","content":"OK"},"done":true}"#,
        );
        let client = OllamaClient::new(url, DEFAULT_PROBE_TIMEOUT);
        let request = ChatRequest::single("llama3.1", "Dis OK", ChatOptions::default());
        assert_eq!(client.chat(&request).unwrap(), "OK");

        let sent: serde_json::Value = serde_json::from_str(&handle.join().unwrap()).unwrap();
        assert_eq!(sent["model"], "llama3.1");
        assert_eq!(sent["options"]["top_p"].as_f64().map(|v| (v * 10.0).round()), Some(9.0));
    }

    #[test]
    fn test_chat_model_not_found() {
        let (url, handle) = serve_once(
            "404 Not Found",
            r#"{"error":"model \"llama3.1\" not found, try pulling it first"}"#,
        );
        let client = OllamaClient::new(url, DEFAULT_PROBE_TIMEOUT);
        let request = ChatRequest::single("llama3.1", "Dis OK", ChatOptions::default());
        let err = client.chat(&request).unwrap_err();
        match &err {
            InferenceError::Status { code, message } => {
                assert_eq!(*code, 404);
                assert!(message.contains("not found"));
            }
            other => panic!("Expected Status error, got: {:?}", other),
        }
        assert!(err.to_string().contains("model"));
        handle.join().unwrap();
    }

    #[test]
    fn test_chat_malformed_body() {
        let (url, handle) = serve_once("200 OK", r#"{"unexpected":true}"#);
        let client = OllamaClient::new(url, DEFAULT_PROBE_TIMEOUT);
        let request = ChatRequest::single("llama3.1", "Dis OK", ChatOptions::default());
        assert!(matches!(client.chat(&request), Err(InferenceError::Parse(_))));
        handle.join().unwrap();
    }
}
