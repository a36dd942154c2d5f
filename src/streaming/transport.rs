// streaming/transport.rs
// Request shape and the HTTP client for OpenAI-compatible completion endpoints

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::{header, Client};
use serde::Serialize;
use tracing::{debug, info};

use crate::conversation::Message;
use crate::error::ChatError;

const CONNECT_TIMEOUT_SECONDS: u64 = 30;

/// Raw body fragments as they come off the wire.
pub type ByteStream = BoxStream<'static, Result<Bytes, ChatError>>;

/// Where requests go and how they authenticate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub base_url: String,
    pub api_key: String,
}

impl Endpoint {
    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// Sampling and transport options that ride along with every request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RequestParams {
    pub stream: bool,
    pub temperature: Option<f32>,
    pub max_completion_tokens: Option<u32>,
}

impl Default for RequestParams {
    fn default() -> Self {
        Self { stream: true, temperature: None, max_completion_tokens: None }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_completion_tokens: Option<u32>,
}

impl CompletionRequest {
    /// System prompt first, then the user/assistant turns of `history` in order.
    pub fn new(
        model: &str,
        system_prompt: Option<&str>,
        history: &[Message],
        params: RequestParams,
    ) -> Self {
        let mut messages = Vec::with_capacity(history.len() + 1);
        if let Some(prompt) = system_prompt.filter(|p| !p.trim().is_empty()) {
            messages.push(ChatMessage { role: "system".to_string(), content: prompt.to_string() });
        }
        messages.extend(history.iter().filter_map(|message| {
            let role = message.role.wire_name()?;
            Some(ChatMessage { role: role.to_string(), content: message.content.clone() })
        }));

        Self {
            model: model.to_string(),
            messages,
            stream: params.stream,
            temperature: params.temperature,
            max_completion_tokens: params.max_completion_tokens,
        }
    }
}

pub enum CompletionResponse {
    /// Success status on a streaming request: body fragments in arrival order.
    Stream(ByteStream),
    /// Success status on a non-streaming request: the whole body.
    Complete(Bytes),
}

/// Opens completion requests. Returns once response headers have arrived.
#[async_trait]
pub trait CompletionTransport: Send + Sync {
    async fn send(
        &self,
        endpoint: &Endpoint,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, ChatError>;
}

pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> anyhow::Result<Self> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::USER_AGENT,
            header::HeaderValue::from_static(concat!("sidechat/", env!("CARGO_PKG_VERSION"))),
        );

        // Connect timeout only; a stream may stay open for minutes.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECONDS))
            .gzip(true)
            .default_headers(headers)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;
        Ok(Self { client })
    }
}

/// Best-effort `error.message` from an error body, else the status reason.
fn error_detail(status: reqwest::StatusCode, body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            value
                .pointer("/error/message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("Unknown error").to_string())
}

#[async_trait]
impl CompletionTransport for HttpTransport {
    async fn send(
        &self,
        endpoint: &Endpoint,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, ChatError> {
        let url = endpoint.completions_url();
        info!(%url, model = %request.model, stream = request.stream, "sending completion request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&endpoint.api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = error_detail(status, &body);
            debug!(status = status.as_u16(), %detail, "completion request rejected");
            return Err(ChatError::HttpStatus { status: status.as_u16(), detail });
        }

        if request.stream {
            let body = response.bytes_stream().map(|chunk| chunk.map_err(ChatError::from));
            Ok(CompletionResponse::Stream(body.boxed()))
        } else {
            Ok(CompletionResponse::Complete(response.bytes().await?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crate::conversation::{MessageId, Role};
    use httpmock::prelude::*;

    fn message(id: u64, role: Role, content: &str) -> Message {
        Message {
            id: MessageId(id),
            role,
            content: content.to_string(),
            reasoning: None,
            reasoning_collapsed: false,
            timestamp: Utc::now(),
        }
    }

    fn endpoint(server: &MockServer) -> Endpoint {
        Endpoint { base_url: format!("{}/", server.base_url()), api_key: "sk-test".into() }
    }

    fn request(stream: bool) -> CompletionRequest {
        CompletionRequest::new(
            "m1",
            Some("Be brief."),
            &[message(1, Role::User, "hi")],
            RequestParams { stream, ..RequestParams::default() },
        )
    }

    #[test]
    fn test_request_body_shape() {
        let history = [
            message(1, Role::User, "q1"),
            message(2, Role::Assistant, "a1"),
            message(3, Role::Notice, "Network error. Check your connection."),
            message(4, Role::User, "q2"),
        ];
        let request = CompletionRequest::new(
            "gpt-test",
            Some("You are a helpful assistant."),
            &history,
            RequestParams { stream: true, temperature: Some(0.7), max_completion_tokens: None },
        );

        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["model"], "gpt-test");
        assert_eq!(body["stream"], true);
        assert!(body.get("max_completion_tokens").is_none());
        let roles: Vec<&str> = body["messages"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["role"].as_str().unwrap())
            .collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "user"]);
        assert_eq!(body["messages"][3]["content"], "q2");
    }

    #[test]
    fn test_endpoint_strips_trailing_slash() {
        let endpoint = Endpoint { base_url: "https://api.example.com/v1/".into(), api_key: String::new() };
        assert_eq!(endpoint.completions_url(), "https://api.example.com/v1/chat/completions");
    }

    #[tokio::test]
    async fn test_stream_request_returns_body_fragments() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/chat/completions")
                .header("authorization", "Bearer sk-test")
                .json_body_partial(r#"{"model":"m1","stream":true}"#);
            then.status(200)
                .header("content-type", "text/event-stream")
                .body("data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\ndata: [DONE]\n\n");
        });

        let transport = HttpTransport::new().unwrap();
        let response = transport.send(&endpoint(&server), &request(true)).await.unwrap();
        let CompletionResponse::Stream(mut body) = response else {
            panic!("expected a streaming response");
        };
        let mut collected = Vec::new();
        while let Some(chunk) = body.next().await {
            collected.extend_from_slice(&chunk.unwrap());
        }
        let text = String::from_utf8(collected).unwrap();
        assert!(text.contains("data: [DONE]"));
        mock.assert();
    }

    #[tokio::test]
    async fn test_non_stream_request_returns_whole_body() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/chat/completions").json_body_partial(r#"{"stream":false}"#);
            then.status(200).body(r#"{"choices":[{"message":{"content":"Done"}}]}"#);
        });

        let transport = HttpTransport::new().unwrap();
        let response = transport.send(&endpoint(&server), &request(false)).await.unwrap();
        assert!(matches!(response, CompletionResponse::Complete(body) if body.starts_with(b"{")));
    }

    #[tokio::test]
    async fn test_error_status_carries_api_message() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(429).body(r#"{"error":{"message":"slow down","type":"rate_limit"}}"#);
        });

        let transport = HttpTransport::new().unwrap();
        let err = transport.send(&endpoint(&server), &request(true)).await.err().unwrap();
        match err {
            ChatError::HttpStatus { status, detail } => {
                assert_eq!(status, 429);
                assert_eq!(detail, "slow down");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_error_status_falls_back_to_reason() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(500).body("<html>oops</html>");
        });

        let transport = HttpTransport::new().unwrap();
        let err = transport.send(&endpoint(&server), &request(true)).await.err().unwrap();
        assert_eq!(err.to_string(), "API error (500): Internal Server Error");
    }

    #[tokio::test]
    async fn test_unreachable_host_is_transport_error() {
        let endpoint = Endpoint { base_url: "http://127.0.0.1:9".into(), api_key: "k".into() };
        let transport = HttpTransport::new().unwrap();
        let err = transport.send(&endpoint, &request(true)).await.err().unwrap();
        assert!(matches!(err, ChatError::Transport(_)));
    }
}
