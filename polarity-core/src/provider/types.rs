//! Common types for chat-completion providers.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors that can occur when calling a provider.
///
/// `Timeout`, `TransportFailure` and `HttpStatus` are transport-level and
/// may succeed on a later attempt. `ApiError` means the vendor looked at the
/// request and refused it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChatError {
    #[error("Request timed out")]
    Timeout,

    #[error("Transport failure: {0}")]
    TransportFailure(String),

    #[error("HTTP {code}: {body}")]
    HttpStatus { code: u16, body: String },

    #[error("API error {code}: {message}")]
    ApiError { code: String, message: String },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

impl ChatError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ChatError::Timeout | ChatError::TransportFailure(_) => true,
            ChatError::HttpStatus { code, .. } => *code == 429 || *code >= 500,
            ChatError::ApiError { .. } | ChatError::MalformedResponse(_) => false,
        }
    }
}

impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ChatError::Timeout
        } else if err.is_decode() {
            ChatError::MalformedResponse(err.to_string())
        } else {
            ChatError::TransportFailure(err.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, ChatError>;

/// Provider trait for chat-completion backends.
///
/// A provider makes exactly one network call per method invocation and
/// never retries; see [`RetryPolicy`](super::RetryPolicy) for caller-side retries.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Generate a reply for the given conversation.
    async fn chat(&self, messages: &[Message], params: &SamplingParams) -> Result<Completion>;

    /// Generate an embedding vector for the given text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        };
        f.write_str(name)
    }
}

/// A single message in a chat conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Sampling parameters sent with every chat request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingParams {
    pub max_tokens: u32,
    pub temperature: f64,
    pub top_p: f64,
    pub top_k: u32,
    pub repeat_penalty: f64,
    pub stop_before: Vec<String>,
    pub include_ai_filters: bool,
}

impl SamplingParams {
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            max_tokens: 256,
            temperature: 0.7,
            top_p: 0.8,
            top_k: 0,
            repeat_penalty: 3.0,
            stop_before: Vec::new(),
            include_ai_filters: true,
        }
    }
}

/// Token accounting reported by the vendor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: u32,
    #[serde(default)]
    pub output_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

/// A generated reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub content: String,
    pub usage: Option<Usage>,
}

impl Completion {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            usage: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ChatError::Timeout.is_transient());
        assert!(ChatError::TransportFailure("reset".into()).is_transient());
        assert!(ChatError::HttpStatus { code: 500, body: String::new() }.is_transient());
        assert!(ChatError::HttpStatus { code: 429, body: String::new() }.is_transient());
        assert!(!ChatError::HttpStatus { code: 400, body: String::new() }.is_transient());
        assert!(!ChatError::ApiError { code: "40001".into(), message: "bad".into() }.is_transient());
        assert!(!ChatError::MalformedResponse("eof".into()).is_transient());
    }

    #[test]
    fn test_message_serializes_lowercase_role() {
        let json = serde_json::to_value(Message::assistant("hi")).unwrap();
        assert_eq!(json, serde_json::json!({"role": "assistant", "content": "hi"}));
    }

    #[test]
    fn test_sampling_defaults() {
        let params = SamplingParams::default();
        assert_eq!(params.max_tokens, 256);
        assert_eq!(params.top_k, 0);
        assert!(params.include_ai_filters);

        let params = params.with_max_tokens(512).with_temperature(0.3);
        assert_eq!(params.max_tokens, 512);
        assert_eq!(params.temperature, 0.3);
    }
}
