//! Primary summarizer backend: a chat model asked to return a JSON object.
//!
//! The default client reaches an Ollama-hosted model through `genai`, after
//! a quick HTTP reachability probe. Every failure mode collapses into an
//! [`InferenceOutcome`] so the caller can fall back without matching on
//! transport errors.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use genai::Client;
use genai::chat::{ChatMessage, ChatOptions, ChatRequest, ChatStreamEvent};
use serde_json::Value;

const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// One completion request.
#[derive(Debug, Clone)]
pub struct InferenceRequest {
    pub system: String,
    pub user: String,
    pub timeout: Duration,
}

/// What came back from the inference service.
#[derive(Debug, Clone, PartialEq)]
pub enum InferenceOutcome {
    /// A JSON object was extracted from the response.
    Parsed(Value),
    /// The service could not be reached, errored, or timed out.
    Unavailable(String),
    /// The service answered but no JSON object could be extracted.
    Malformed(String),
}

#[async_trait]
pub trait InferenceClient: Send + Sync {
    async fn complete_json(&self, request: &InferenceRequest) -> InferenceOutcome;
}

/// Always unavailable; used when the primary summarizer is disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledInference;

#[async_trait]
impl InferenceClient for DisabledInference {
    async fn complete_json(&self, _request: &InferenceRequest) -> InferenceOutcome {
        InferenceOutcome::Unavailable("primary summarizer disabled".to_string())
    }
}

/// `genai`-backed client.
pub struct GenaiInference {
    client: Client,
    http: reqwest::Client,
    model: String,
    health_url: Option<String>,
}

impl GenaiInference {
    /// Non-prefixed model names resolve to the local Ollama adapter.
    pub fn new(model: impl Into<String>, health_url: Option<String>) -> Self {
        Self {
            client: Client::default(),
            http: reqwest::Client::new(),
            model: model.into(),
            health_url,
        }
    }

    async fn probe(&self) -> Result<(), String> {
        let Some(url) = &self.health_url else {
            return Ok(());
        };
        self.http
            .get(url)
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| format!("inference service unreachable at {url}: {e}"))
    }

    async fn stream_text(&self, request: &InferenceRequest) -> Result<String, String> {
        let chat_req = ChatRequest::from_system(&request.system)
            .append_message(ChatMessage::user(&request.user));
        let options = ChatOptions::default().with_capture_content(true);

        let res = self
            .client
            .exec_chat_stream(&self.model, chat_req, Some(&options))
            .await
            .map_err(|e| format!("LLM stream error: {e}"))?;

        let mut stream = res.stream;
        let mut text = String::new();
        while let Some(event) = stream.next().await {
            match event {
                Ok(ChatStreamEvent::Chunk(chunk)) => text.push_str(&chunk.content),
                Ok(ChatStreamEvent::End(end)) => {
                    if text.is_empty() {
                        if let Some(captured) = end.captured_first_text() {
                            text = captured.to_string();
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => return Err(format!("LLM stream error: {e}")),
            }
        }
        Ok(text)
    }
}

#[async_trait]
impl InferenceClient for GenaiInference {
    async fn complete_json(&self, request: &InferenceRequest) -> InferenceOutcome {
        if let Err(e) = self.probe().await {
            return InferenceOutcome::Unavailable(e);
        }

        match tokio::time::timeout(request.timeout, self.stream_text(request)).await {
            Err(_) => InferenceOutcome::Unavailable(format!(
                "inference timed out after {}s",
                request.timeout.as_secs()
            )),
            Ok(Err(e)) => InferenceOutcome::Unavailable(e),
            Ok(Ok(text)) => parse_json_object(&text),
        }
    }
}

/// Extract a JSON object from model output that may wrap it in code fences
/// or surrounding prose.
pub fn parse_json_object(text: &str) -> InferenceOutcome {
    let trimmed = strip_fences(text.trim());
    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(trimmed) {
        return InferenceOutcome::Parsed(value);
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(&trimmed[start..=end]) {
                return InferenceOutcome::Parsed(value);
            }
        }
    }

    let preview: String = text.chars().take(120).collect();
    InferenceOutcome::Malformed(format!("no JSON object in response: {preview}"))
}

fn strip_fences(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
