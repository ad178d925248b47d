//! Wire layer for the remote vision model.
//!
//! [`VisionTransport`] is the one network suspension point of the engine.
//! [`HttpTransport`] speaks the OpenAI-compatible `POST /chat/completions`
//! protocol with `response_format: json_object`, which most hosted vision
//! models (and local gateways such as LiteLLM or Ollama) accept.
//!
//! Cancellation races the HTTP future against the token: dropping the
//! reqwest future aborts the request, so a cancelled call settles at once
//! instead of waiting out the transport timeout.

use crate::error::ExtractionError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Chat-completions request body.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub response_format: ResponseFormat,
}

/// Response format constraint; always `json_object` for table extraction.
#[derive(Debug, Clone, Serialize)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub format_type: String,
}

impl ResponseFormat {
    pub fn json_object() -> Self {
        Self {
            format_type: "json_object".into(),
        }
    }
}

/// One chat message with multimodal content.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: Vec<ContentPart>,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: vec![ContentPart::Text { text: text.into() }],
        }
    }

    pub fn user_with_image(text: impl Into<String>, data_uri: String) -> Self {
        Self {
            role: "user".into(),
            content: vec![
                ContentPart::Text { text: text.into() },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: data_uri,
                        detail: Some("high".into()),
                    },
                },
            ],
        }
    }
}

/// Content part for multimodal messages.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

/// Image reference; always an inline data URI here.
#[derive(Debug, Clone, Serialize)]
pub struct ImageUrl {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// Carries one request to a vision model and returns the message content.
#[async_trait]
pub trait VisionTransport: Send + Sync {
    /// Whether requests can be issued at all.
    fn is_available(&self) -> bool {
        true
    }

    /// Send `request` and return the model's reply text.
    ///
    /// # Errors
    /// - [`ExtractionError::Cancelled`] when `cancel` fires first
    /// - [`ExtractionError::NetworkFailure`] on transport errors or non-2xx status
    /// - [`ExtractionError::MalformedResponse`] when the envelope has no content
    async fn complete(
        &self,
        request: &ChatRequest,
        credential: &str,
        cancel: &CancellationToken,
    ) -> Result<String, ExtractionError>;
}

/// reqwest-backed OpenAI-compatible transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    /// Build a transport with its own client.
    ///
    /// `timeout` bounds the whole HTTP exchange at the socket level; the
    /// orchestrator enforces its own timeout on top.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ExtractionError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ExtractionError::InvalidConfig(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_client(client, base_url))
    }

    /// Reuse an existing client (connection pool, proxies, custom TLS).
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    async fn send(&self, request: &ChatRequest, credential: &str) -> Result<String, ExtractionError> {
        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(credential)
            .json(request)
            .send()
            .await
            .map_err(|e| ExtractionError::NetworkFailure {
                message: describe_reqwest_error(&e),
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ExtractionError::NetworkFailure {
                message: format!("failed to read response body: {e}"),
            })?;
        debug!("Remote API responded {} ({} bytes)", status, body.len());

        if !status.is_success() {
            warn!("Remote API returned status {}", status.as_u16());
            return Err(status_error(status.as_u16(), &body));
        }

        message_content(&body)
    }
}

#[async_trait]
impl VisionTransport for HttpTransport {
    async fn complete(
        &self,
        request: &ChatRequest,
        credential: &str,
        cancel: &CancellationToken,
    ) -> Result<String, ExtractionError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ExtractionError::Cancelled {
                reason: "remote request aborted".into(),
            }),
            r = self.send(request, credential) => r,
        }
    }
}

/// Translate a non-success status into an error, preferring the body's message.
pub fn status_error(status: u16, body: &str) -> ExtractionError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| embedded_message(&v))
        .map(|m| format!("{m} (HTTP {status})"))
        .unwrap_or_else(|| format!("remote API returned HTTP status {status}"));
    ExtractionError::NetworkFailure { message }
}

/// `{"error":{"message":..}}`, `{"error":".."}` or `{"message":..}`.
fn embedded_message(v: &Value) -> Option<String> {
    let candidate = match v.get("error") {
        Some(Value::Object(obj)) => obj.get("message"),
        Some(s @ Value::String(_)) => Some(s),
        _ => v.get("message"),
    };
    candidate
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
}

/// Pull `choices[0].message.content` out of a chat-completions envelope.
pub fn message_content(body: &str) -> Result<String, ExtractionError> {
    let envelope: ChatResponse = serde_json::from_str(body)
        .map_err(|e| ExtractionError::malformed(format!("response envelope is not valid JSON: {e}")))?;
    envelope
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| ExtractionError::malformed("response contains no message content"))
}

fn describe_reqwest_error(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        format!("request timed out: {e}")
    } else if e.is_connect() {
        format!("could not connect: {e}")
    } else {
        e.to_string()
    }
}
