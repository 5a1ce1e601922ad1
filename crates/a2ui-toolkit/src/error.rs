//! Error taxonomy for payload generation.

use std::time::Duration;
use thiserror::Error;

use crate::catalog::{CatalogError, SchemaViolation};
use crate::dynamic::DynamicError;
use crate::payload::PayloadError;

/// Errors surfaced by the generation pipeline.
///
/// Only missing templates and failed schema validation are rejected up
/// front. Remote delegation failures surface after retries are exhausted and
/// only when fallback is disabled. Structured-generation parse failures are
/// recovered internally and never appear here.
#[derive(Debug, Error)]
pub enum A2uiError {
    #[error("Template not found: {template_id}")]
    TemplateNotFound { template_id: String },

    #[error("No template registered for visualization type: {visualization_type}")]
    VisualizationTypeNotFound { visualization_type: String },

    #[error("Schema validation failed: {0}")]
    SchemaValidation(#[from] SchemaViolation),

    #[error("Remote delegation failed after {attempts} attempts: {last_error}")]
    RemoteDelegation {
        attempts: u32,
        last_error: RemoteError,
    },

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Invalid payload: {0}")]
    InvalidPayload(#[from] PayloadError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Dynamic generation failed: {0}")]
    Dynamic(#[from] DynamicError),
}

impl A2uiError {
    /// True for the errors that are rejected before any generation attempt.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            A2uiError::TemplateNotFound { .. }
                | A2uiError::VisualizationTypeNotFound { .. }
                | A2uiError::SchemaValidation(_)
        )
    }
}

/// Why a single remote generation attempt failed.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RemoteError {
    #[error("Remote call timed out after {after:?}")]
    Timeout { after: Duration },

    #[error("Remote call was cancelled")]
    Cancelled,

    #[error("Remote agent returned HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error(
        "Remote agent response carried no payload: {}",
        .error.as_deref().unwrap_or("unknown error")
    )]
    MissingPayload { error: Option<String> },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Failed to decode remote response: {0}")]
    Decode(String),
}

impl RemoteError {
    /// Any HTTP status, a missing payload, a timeout or a transport failure
    /// is an attempt failure worth retrying. A cancelled call is final.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, RemoteError::Cancelled)
    }
}

/// Failures reported by model, embedding and retrieval collaborators.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Failed to decode provider response: {0}")]
    Decode(String),

    #[error("Provider returned an empty response")]
    EmptyResponse,

    #[error("Provider unavailable: {0}")]
    Unavailable(String),
}

impl ProviderError {
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Request(_) | ProviderError::Unavailable(_) => true,
            ProviderError::Http { status, .. } => *status == 429 || *status >= 500,
            ProviderError::Decode(_) | ProviderError::EmptyResponse => false,
        }
    }
}
