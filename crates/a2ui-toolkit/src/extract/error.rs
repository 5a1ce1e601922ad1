use thiserror::Error;

/// Failures while pulling structured data out of a model reply.
///
/// These never leave the crate through `GenerationOrchestrator::generate`;
/// the local synthesis path recovers from them by building deterministically.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Tag extraction failed: {0}")]
    TagExtractionFailed(String),

    #[error("All extraction strategies failed: {0:?}")]
    AllStrategiesFailed(Vec<String>),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// JSON parsed but does not have the structure the caller needs.
    #[error("Unexpected shape: {0}")]
    Shape(String),
}
