//! Chat-completion bridge for the notes assistant.
//!
//! Prepends one instruction message carrying the notes context to the
//! caller's conversation and forwards it to the completion endpoint. A single
//! attempt per question; failures go back to the caller with a detail string.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::ChatConfig;
use crate::error::IntegrationError;
use crate::types::{ChatMessage, ChatRole};

pub const NO_NOTES_PLACEHOLDER: &str = "No notes available.";
pub const NO_ANSWER_PLACEHOLDER: &str = "No answer received.";

/// Posts a completion payload and returns the raw JSON answer.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, payload: &Value) -> Result<Value, IntegrationError>;
}

/// OpenAI-compatible `/v1/chat/completions` backend.
pub struct OpenAiBackend {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl OpenAiBackend {
    pub fn from_config(config: &ChatConfig) -> Result<Self, IntegrationError> {
        url::Url::parse(&config.endpoint).map_err(|e| {
            IntegrationError::NotConfigured(format!(
                "invalid completion endpoint {}: {}",
                config.endpoint, e
            ))
        })?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
            .build()
            .map_err(|e| IntegrationError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key().map(str::to_string),
        })
    }
}

#[async_trait]
impl CompletionBackend for OpenAiBackend {
    async fn complete(&self, payload: &Value) -> Result<Value, IntegrationError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| IntegrationError::NotConfigured("OPENAI_API_KEY is not set".into()))?;

        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .header("Content-Type", "application/json")
            .json(payload)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(IntegrationError::UpstreamStatus { status, body });
        }

        let text = resp.text().await?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Answers questions about a contact's notes.
#[derive(Clone)]
pub struct ChatBridge {
    backend: Arc<dyn CompletionBackend>,
    model: String,
    temperature: f64,
    max_tokens: u32,
}

impl ChatBridge {
    pub fn from_config(config: &ChatConfig) -> Result<Self, IntegrationError> {
        if config.api_key().is_none() {
            log::warn!("OPENAI_API_KEY is not configured; the notes assistant will be unavailable");
        }
        let backend = OpenAiBackend::from_config(config)?;
        Ok(Self::new(Arc::new(backend), config))
    }

    pub fn new(backend: Arc<dyn CompletionBackend>, config: &ChatConfig) -> Self {
        Self {
            backend,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    /// Ask the model about `notes_context`, continuing `history`.
    ///
    /// Fails with `InvalidInput` before any outbound call when `history` is empty.
    pub async fn ask(
        &self,
        history: &[ChatMessage],
        notes_context: &str,
    ) -> Result<String, IntegrationError> {
        if history.is_empty() {
            return Err(IntegrationError::invalid("messages are required"));
        }

        let payload = self.payload(history, notes_context);
        let answer = self.backend.complete(&payload).await.map_err(|e| {
            log::error!("Completion request failed: {}", e);
            e
        })?;
        Ok(extract_reply(&answer))
    }

    fn payload(&self, history: &[ChatMessage], notes_context: &str) -> Value {
        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(instruction_message(notes_context));
        messages.extend(history.iter().cloned());

        json!({
            "model": self.model,
            "messages": messages,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        })
    }
}

/// The leading system message that pins the model to the notes.
pub fn instruction_message(notes_context: &str) -> ChatMessage {
    let notes = if notes_context.trim().is_empty() {
        NO_NOTES_PLACEHOLDER
    } else {
        notes_context
    };
    ChatMessage::system(format!(
        "You are a helpful assistant that answers questions about a contact's notes.\n\
         Use only the following notes as context for your answers.\n\
         If the answer cannot be derived from the notes, say explicitly that this \
         information is not contained in the notes.\n\n\
         Notes:\n{}",
        notes
    ))
}

/// `choices[0].message.content`, or the placeholder when absent or empty.
pub fn extract_reply(answer: &Value) -> String {
    answer
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .filter(|text| !text.is_empty())
        .unwrap_or(NO_ANSWER_PLACEHOLDER)
        .to_string()
}

/// Validate a raw JSON conversation into role-tagged messages.
pub fn parse_history(value: &Value) -> Result<Vec<ChatMessage>, IntegrationError> {
    let items = value
        .as_array()
        .ok_or_else(|| IntegrationError::invalid("messages must be a list"))?;
    if items.is_empty() {
        return Err(IntegrationError::invalid("messages are required"));
    }

    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let role = match item.get("role").and_then(Value::as_str) {
                Some("user") => ChatRole::User,
                Some("assistant") => ChatRole::Assistant,
                Some("system") => ChatRole::System,
                Some(other) => {
                    return Err(IntegrationError::invalid(format!(
                        "messages[{}]: unknown role {}",
                        i, other
                    )))
                }
                None => {
                    return Err(IntegrationError::invalid(format!(
                        "messages[{}]: role is required",
                        i
                    )))
                }
            };
            let content = item
                .get("content")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    IntegrationError::invalid(format!("messages[{}]: content must be a string", i))
                })?;
            Ok(ChatMessage {
                role,
                content: content.to_string(),
            })
        })
        .collect()
}
