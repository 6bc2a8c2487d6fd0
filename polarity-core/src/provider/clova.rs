//! CLOVA Studio provider implementation.
//!
//! This module provides a CLOVA Studio HTTP API client that implements the Provider trait.

use super::types::*;
use crate::config::{ClovaConfig, Credentials};
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Status code CLOVA uses inside a successful envelope.
const SUCCESS_CODE: &str = "20000";

/// CLOVA Studio HTTP API provider.
#[derive(Debug, Clone)]
pub struct ClovaProvider {
    chat_url: String,
    embedding_url: String,
    api_key: String,
    http_client: reqwest::Client,
}

impl ClovaProvider {
    /// Creates a new provider for the configured endpoints.
    ///
    /// The timeout from `config` applies to every request.
    pub fn new(config: &ClovaConfig, credentials: &Credentials) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ChatError::TransportFailure(e.to_string()))?;

        Ok(Self {
            chat_url: config.chat_url.clone(),
            embedding_url: config.embedding_url.clone(),
            api_key: credentials.api_key().to_string(),
            http_client,
        })
    }

    /// Post a JSON body and unwrap the CLOVA status envelope.
    async fn post<B, R>(&self, url: &str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized + Sync,
        R: DeserializeOwned,
    {
        let response = self
            .http_client
            .post(url)
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
            .header(CONTENT_TYPE, "application/json")
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        debug!(url = %url, status = status.as_u16(), bytes = text.len(), "CLOVA response received");

        if !status.is_success() {
            return Err(ChatError::HttpStatus {
                code: status.as_u16(),
                body: text,
            });
        }

        let envelope: ClovaEnvelope<R> = serde_json::from_str(&text)
            .map_err(|e| ChatError::MalformedResponse(e.to_string()))?;
        envelope.into_result()
    }
}

#[async_trait]
impl Provider for ClovaProvider {
    async fn chat(&self, messages: &[Message], params: &SamplingParams) -> Result<Completion> {
        let request = ClovaChatRequest {
            messages,
            top_p: params.top_p,
            top_k: params.top_k,
            max_tokens: params.max_tokens,
            temperature: params.temperature,
            repeat_penalty: params.repeat_penalty,
            stop_before: &params.stop_before,
            include_ai_filters: params.include_ai_filters,
        };

        let result: ClovaChatResult = self.post(&self.chat_url, &request).await?;
        Ok(Completion {
            content: result.message.content,
            usage: result.usage,
        })
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let request = ClovaEmbedRequest { text };
        let result: ClovaEmbedResult = self.post(&self.embedding_url, &request).await?;

        if result.embedding.is_empty() {
            return Err(ChatError::MalformedResponse("empty embedding".to_string()));
        }
        Ok(result.embedding)
    }
}

// CLOVA-specific request/response types (internal)

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ClovaChatRequest<'a> {
    messages: &'a [Message],
    top_p: f64,
    top_k: u32,
    max_tokens: u32,
    temperature: f64,
    repeat_penalty: f64,
    stop_before: &'a [String],
    include_ai_filters: bool,
}

#[derive(Debug, Serialize)]
struct ClovaEmbedRequest<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct ClovaStatus {
    code: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ClovaEnvelope<R> {
    status: ClovaStatus,
    result: Option<R>,
}

impl<R> ClovaEnvelope<R> {
    fn into_result(self) -> Result<R> {
        if self.status.code != SUCCESS_CODE {
            return Err(ChatError::ApiError {
                code: self.status.code,
                message: self.status.message,
            });
        }
        self.result
            .ok_or_else(|| ChatError::MalformedResponse("missing result".to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct ClovaChatResult {
    message: ClovaMessage,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ClovaMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ClovaEmbedResult {
    #[serde(default)]
    embedding: Vec<f32>,
}
