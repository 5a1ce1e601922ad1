//! 'a2ui-toolkit' - Agent-to-UI payload generation with graceful degradation.
//!
//! This library turns teaching questions into renderable A2UI payloads: flat,
//! id-addressed component graphs plus a parallel data model. It covers the
//! whole path from free text to a surface a renderer can draw, and back down
//! again when rendering fails.
//!
//! - [`catalog`]: the immutable template catalog and component registry.
//! - [`builder`]: template substitution and tree flattening.
//! - [`matcher`]: keyword and concept scoring against the rule table.
//! - [`orchestrator`]: remote, local-model and deterministic generation with
//!   retry, backoff and per-attempt timeouts.
//! - [`dynamic`]: embedding-ranked templates and structured generation for
//!   questions no rule matches.
//! - [`fallback`]: the four-level render fallback state machine.
//! - [`pipeline`]: the question-to-payload flow over all of the above.
//!
//! External collaborators (chat models, embeddings, knowledge retrieval and
//! the remote UI agent) are async traits; HTTP implementations ship behind
//! the `http` feature.

pub mod builder;
pub mod catalog;
pub mod dynamic;
pub mod error;
pub mod extract;
pub mod fallback;
pub mod matcher;
pub mod observability;
pub mod orchestrator;
pub mod payload;
pub mod pipeline;
pub mod prompts;
pub mod provider;
pub mod similarity;

pub use builder::{IdSource, SequentialIds, build, build_with_ids};
pub use catalog::{Catalog, CatalogError, ComponentRegistry, Template, TemplateCatalog};
pub use dynamic::{
    DynamicConfig, DynamicError, DynamicGenerator, DynamicRequest, DynamicVizResponse,
};
pub use error::{A2uiError, ProviderError, RemoteError};
pub use extract::{FlexibleExtractor, MarkdownCodeBlockExtractor, ParseError};
pub use fallback::{FallbackConfig, FallbackLevel, RenderFallbackManager, WarningSummary};
pub use matcher::{MatchResult, MatcherConfig, TemplateMatcher};
pub use orchestrator::{
    GenerationContext, GenerationOrchestrator, GenerationReport, GenerationStrategy,
    OrchestratorConfig, RemoteUiAgent,
};
pub use payload::{Component, ComponentKind, Payload, PayloadCache, PayloadError, PayloadMetadata};
pub use pipeline::{PipelineOutcome, PipelineRoute, VisualizationPipeline};
pub use provider::{ChatModel, EmbeddingProvider, KnowledgeRetriever, StructuredGenerationProvider};
pub use similarity::cosine_similarity;
