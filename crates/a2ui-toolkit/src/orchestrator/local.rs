//! Payload synthesis with a local chat model.

use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::catalog::Template;
use crate::error::ProviderError;
use crate::extract::{ParseError, fenced_or_whole, parse_sanitized};
use crate::payload::{PAYLOAD_VERSION, Payload, PayloadError, PayloadMetadata};
use crate::prompts::{LocalSynthesisRequest, ToPrompt};
use crate::provider::{ChatMessage, ChatModel, GenerationOptions};

const TEMPERATURE: f32 = 0.3;
const MAX_TOKENS: u32 = 3000;

/// Why a local synthesis attempt produced nothing usable.
///
/// The orchestrator recovers from every variant by building the template
/// deterministically.
#[derive(Debug, Error)]
pub enum LocalSynthesisError {
    #[error("Failed to render prompt: {0}")]
    Prompt(#[from] minijinja::Error),

    #[error("Model call failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("Unparseable model output: {0}")]
    Parse(#[from] ParseError),

    #[error("Model output has no surface components")]
    EmptySurface,

    #[error("Model output violates the surface invariants: {0}")]
    InvalidPayload(#[from] PayloadError),
}

pub struct LocalSynthesizer {
    model: Arc<dyn ChatModel>,
}

impl LocalSynthesizer {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }

    pub async fn synthesize(
        &self,
        template: &Template,
        data: &Map<String, Value>,
        question: Option<&str>,
    ) -> Result<Payload, LocalSynthesisError> {
        let request = LocalSynthesisRequest {
            template_id: template.template_id.clone(),
            visualization_type: template.visualization_type.clone(),
            complexity: template.complexity.as_str().to_string(),
            question: question.map(str::to_string),
            data_json: serde_json::to_string_pretty(data)
                .map_err(|err| LocalSynthesisError::Parse(err.into()))?,
        };
        let prompt = request.to_prompt()?;

        let options = GenerationOptions::new()
            .with_temperature(TEMPERATURE)
            .with_max_tokens(MAX_TOKENS);
        let reply = self
            .model
            .complete(&[ChatMessage::user(prompt)], &options)
            .await?;
        debug!(
            template_id = %template.template_id,
            reply_len = reply.len(),
            "Local model replied"
        );

        let mut payload = parse_payload(&reply)?;
        let metadata = payload.metadata.get_or_insert_with(PayloadMetadata::default);
        metadata
            .template_id
            .get_or_insert_with(|| template.template_id.clone());
        metadata
            .version
            .get_or_insert_with(|| PAYLOAD_VERSION.to_string());
        Ok(payload)
    }
}

/// Fenced block (or the whole reply) parsed as a payload with a non-empty,
/// valid surface.
pub(crate) fn parse_payload(reply: &str) -> Result<Payload, LocalSynthesisError> {
    let json = fenced_or_whole(reply);
    let value: Value = parse_sanitized(&json)?;

    let has_components = value
        .get("surface")
        .and_then(|surface| surface.get("components"))
        .and_then(Value::as_object)
        .is_some_and(|components| !components.is_empty());
    if !has_components {
        return Err(LocalSynthesisError::EmptySurface);
    }

    let payload: Payload = serde_json::from_value(value).map_err(ParseError::from)?;
    payload.validate()?;
    Ok(payload)
}
