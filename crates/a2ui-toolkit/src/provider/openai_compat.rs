//! Provider backed by an OpenAI-compatible HTTP API.
//!
//! One client serves chat completion, schema-constrained generation and
//! embeddings. Any server exposing `/chat/completions` and `/embeddings` in
//! the OpenAI wire format works.
//!
//! ```rust,no_run
//! use a2ui_toolkit::provider::openai_compat::OpenAiCompatProvider;
//! use a2ui_toolkit::provider::{ChatMessage, ChatModel, GenerationOptions};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let provider = OpenAiCompatProvider::try_from_env()?;
//! let reply = provider
//!     .complete(&[ChatMessage::user("什么是冈崎片段？")], &GenerationOptions::new())
//!     .await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::env;

use super::{
    ChatMessage, ChatModel, EmbeddingProvider, GenerationOptions, StructuredGenerationProvider,
};
use crate::error::ProviderError;
use crate::extract::{extract_json, parse_sanitized};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

#[derive(Debug, Clone, PartialEq)]
pub struct OpenAiCompatConfig {
    pub base_url: String,
    pub api_key: String,
    pub chat_model: String,
    pub embedding_model: String,
    /// Used when a call does not set its own limit.
    pub max_tokens: Option<u32>,
}

impl OpenAiCompatConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            max_tokens: None,
        }
    }

    /// Environment variables:
    /// - `LLM_API_KEY` (required)
    /// - `LLM_BASE_URL`, `LLM_CHAT_MODEL`, `LLM_EMBEDDING_MODEL` (optional)
    pub fn try_from_env() -> Result<Self, ProviderError> {
        let api_key = env::var("LLM_API_KEY").map_err(|_| {
            ProviderError::Unavailable("LLM_API_KEY environment variable not set".to_string())
        })?;

        let mut config = Self::new(api_key);
        if let Ok(base_url) = env::var("LLM_BASE_URL") {
            config.base_url = base_url;
        }
        if let Ok(model) = env::var("LLM_CHAT_MODEL") {
            config.chat_model = model;
        }
        if let Ok(model) = env::var("LLM_EMBEDDING_MODEL") {
            config.embedding_model = model;
        }
        Ok(config)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_chat_model(mut self, model: impl Into<String>) -> Self {
        self.chat_model = model.into();
        self
    }

    pub fn with_embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = model.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }
}

#[derive(Clone)]
pub struct OpenAiCompatProvider {
    client: Client,
    config: OpenAiCompatConfig,
}

impl OpenAiCompatProvider {
    pub fn new(config: OpenAiCompatConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    pub fn try_from_env() -> Result<Self, ProviderError> {
        Ok(Self::new(OpenAiCompatConfig::try_from_env()?))
    }

    pub fn config(&self) -> &OpenAiCompatConfig {
        &self.config
    }

    fn chat_request<'a>(
        &'a self,
        messages: &'a [ChatMessage],
        options: &GenerationOptions,
        response_format: Option<Value>,
    ) -> ChatCompletionRequest<'a> {
        ChatCompletionRequest {
            model: &self.config.chat_model,
            messages,
            temperature: options.temperature,
            max_tokens: options.max_tokens.or(self.config.max_tokens),
            response_format,
        }
    }

    async fn post<B: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, ProviderError> {
        let response = self
            .client
            .post(self.config.endpoint(path))
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("content-type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|err| ProviderError::Request(format!("{path} request failed: {err}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            return Err(map_http_error(status, body_text));
        }

        response
            .json()
            .await
            .map_err(|err| ProviderError::Decode(format!("{path} response: {err}")))
    }
}

#[async_trait]
impl ChatModel for OpenAiCompatProvider {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &GenerationOptions,
    ) -> Result<String, ProviderError> {
        let request = self.chat_request(messages, options, None);
        let response: ChatCompletionResponse = self.post("chat/completions", &request).await?;
        extract_text_response(response)
    }
}

#[async_trait]
impl StructuredGenerationProvider for OpenAiCompatProvider {
    async fn generate(
        &self,
        messages: &[ChatMessage],
        schema: &Value,
        options: &GenerationOptions,
    ) -> Result<Value, ProviderError> {
        let request = self.chat_request(messages, options, Some(response_format(schema)));
        let response: ChatCompletionResponse = self.post("chat/completions", &request).await?;
        let text = extract_text_response(response)?;

        let json = extract_json(&text).map_err(|err| ProviderError::Decode(err.to_string()))?;
        parse_sanitized(&json).map_err(|err| ProviderError::Decode(err.to_string()))
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiCompatProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let request = EmbeddingRequest {
            model: &self.config.embedding_model,
            input: text,
        };
        let response: EmbeddingResponse = self.post("embeddings", &request).await?;
        response
            .data
            .into_iter()
            .next()
            .map(|item| item.embedding)
            .filter(|embedding| !embedding.is_empty())
            .ok_or(ProviderError::EmptyResponse)
    }
}

fn response_format(schema: &Value) -> Value {
    json!({
        "type": "json_schema",
        "json_schema": {
            "name": "a2ui_response",
            "schema": schema,
            "strict": false
        }
    })
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<Value>,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

fn extract_text_response(response: ChatCompletionResponse) -> Result<String, ProviderError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or(ProviderError::EmptyResponse)
}

fn map_http_error(status: StatusCode, body: String) -> ProviderError {
    let message = serde_json::from_str::<ErrorResponse>(&body)
        .map(|wrapper| wrapper.error.message)
        .unwrap_or(body);

    ProviderError::Http {
        status: status.as_u16(),
        message,
    }
}
