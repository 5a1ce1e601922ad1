//! Visualization synthesis for questions no static template matches.
//!
//! The generator retrieves supporting knowledge, ranks visualization
//! templates by embedding similarity and asks a structured-generation model
//! for a [`DynamicVizResponse`]. Template embeddings are recomputed for every
//! request; there is no persistent index.

pub mod response;
pub mod templates;

pub use response::{
    Citation, DynamicVizResponse, KnowledgePoints, SelectedTemplate, TextAnswer, parse_response,
    response_schema,
};
pub use templates::VizTemplate;

use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::error::ProviderError;
use crate::matcher::extract_concept;
use crate::prompts::{
    CandidateTemplate, ConceptExtractionRequest, DynamicGenerationRequest, ToPrompt,
};
use crate::provider::{
    ChatMessage, ChatModel, EmbeddingProvider, GenerationOptions, KnowledgeChunk,
    KnowledgeRetriever, StructuredGenerationProvider,
};
use crate::similarity::cosine_similarity;

#[derive(Debug, Error)]
pub enum DynamicError {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Failed to render prompt: {0}")]
    Prompt(#[from] minijinja::Error),

    #[error("Structured response has the wrong shape: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DynamicConfig {
    /// Knowledge chunks requested from the retriever.
    pub knowledge_top_k: usize,
    pub knowledge_threshold: f32,
    /// Templates kept after similarity ranking.
    pub template_top_k: usize,
    /// Minimum weighted similarity for a template to be kept.
    pub template_threshold: f32,
    pub concept_weight: f32,
    pub question_weight: f32,
    /// Sampling temperature of the structured-generation call.
    pub temperature: f32,
}

impl Default for DynamicConfig {
    fn default() -> Self {
        Self {
            knowledge_top_k: 5,
            knowledge_threshold: 0.6,
            template_top_k: 3,
            template_threshold: 0.6,
            concept_weight: 0.7,
            question_weight: 0.3,
            temperature: 0.3,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserLevel {
    Beginner,
    #[default]
    Intermediate,
    Advanced,
}

impl UserLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserLevel::Beginner => "beginner",
            UserLevel::Intermediate => "intermediate",
            UserLevel::Advanced => "advanced",
        }
    }
}

impl fmt::Display for UserLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "beginner" => Ok(UserLevel::Beginner),
            "intermediate" => Ok(UserLevel::Intermediate),
            "advanced" => Ok(UserLevel::Advanced),
            other => Err(format!("unknown user level: {other}")),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DynamicRequest {
    pub question: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concept: Option<String>,
    #[serde(default)]
    pub user_level: UserLevel,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<ChatMessage>,
}

impl DynamicRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            ..Default::default()
        }
    }

    pub fn with_concept(mut self, concept: impl Into<String>) -> Self {
        self.concept = Some(concept.into());
        self
    }

    pub fn with_user_level(mut self, level: UserLevel) -> Self {
        self.user_level = level;
        self
    }

    pub fn with_history(mut self, history: Vec<ChatMessage>) -> Self {
        self.history = history;
        self
    }
}

/// A visualization template ranked against a question.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateMatch {
    pub template: VizTemplate,
    pub similarity: f32,
    pub match_reason: String,
}

pub struct DynamicGenerator {
    chat: Arc<dyn ChatModel>,
    structured: Arc<dyn StructuredGenerationProvider>,
    embedder: Arc<dyn EmbeddingProvider>,
    retriever: Arc<dyn KnowledgeRetriever>,
    templates: Vec<VizTemplate>,
    config: DynamicConfig,
}

impl DynamicGenerator {
    /// A generator over the built-in visualization templates.
    pub fn new(
        chat: Arc<dyn ChatModel>,
        structured: Arc<dyn StructuredGenerationProvider>,
        embedder: Arc<dyn EmbeddingProvider>,
        retriever: Arc<dyn KnowledgeRetriever>,
    ) -> Self {
        Self {
            chat,
            structured,
            embedder,
            retriever,
            templates: templates::builtin(),
            config: DynamicConfig::default(),
        }
    }

    pub fn with_templates(mut self, templates: Vec<VizTemplate>) -> Self {
        self.templates = templates;
        self
    }

    pub fn with_config(mut self, config: DynamicConfig) -> Self {
        self.config = config;
        self
    }

    pub fn templates(&self) -> &[VizTemplate] {
        &self.templates
    }

    pub fn config(&self) -> &DynamicConfig {
        &self.config
    }

    #[tracing::instrument(skip(self, request), fields(user_level = %request.user_level))]
    pub async fn generate(
        &self,
        request: &DynamicRequest,
    ) -> Result<DynamicVizResponse, DynamicError> {
        let concept = match request.concept.as_deref().map(str::trim) {
            Some(concept) if !concept.is_empty() => concept.to_string(),
            _ => self.extract_concept(&request.question).await,
        };

        let chunks = self.retrieve_knowledge(&request.question).await;
        let matches = self.retrieve_templates(&concept, &request.question).await?;
        info!(
            concept = %concept,
            knowledge_chunks = chunks.len(),
            candidate_templates = matches.len(),
            "Retrieved generation context"
        );

        let prompt = DynamicGenerationRequest {
            knowledge: chunks
                .iter()
                .map(|chunk| chunk.content.as_str())
                .collect::<Vec<_>>()
                .join("\n\n"),
            question: request.question.clone(),
            concept,
            user_level: request.user_level.to_string(),
            templates: matches
                .iter()
                .map(|m| CandidateTemplate::new(&m.template, m.similarity, &m.match_reason))
                .collect(),
            history: request.history.clone(),
        }
        .to_prompt()?;

        let options = GenerationOptions::new().with_temperature(self.config.temperature);
        let value = self
            .structured
            .generate(&[ChatMessage::user(prompt)], &response_schema(), &options)
            .await?;

        let mut response =
            parse_response(value).map_err(|err| DynamicError::InvalidResponse(err.to_string()))?;
        if response.citations.is_empty() {
            response.citations = chunks.iter().map(Citation::from).collect();
        }
        debug!(
            applicable = response.visualization_applicable,
            selected = ?response.selected_template.as_ref().map(|s| &s.template_id),
            "Structured response parsed"
        );
        Ok(response)
    }

    /// Ranks templates by `w_c * cos(concept, t) + w_q * cos(question, t)`
    /// and keeps the best ones above the threshold, best first.
    pub async fn retrieve_templates(
        &self,
        concept: &str,
        question: &str,
    ) -> Result<Vec<TemplateMatch>, ProviderError> {
        let (concept_vec, question_vec) =
            futures::try_join!(self.embedder.embed(concept), self.embedder.embed(question))?;

        let texts: Vec<String> = self.templates.iter().map(VizTemplate::embedding_text).collect();
        let template_vecs =
            try_join_all(texts.iter().map(|text| self.embedder.embed(text))).await?;

        let mut matches: Vec<TemplateMatch> = self
            .templates
            .iter()
            .zip(&template_vecs)
            .map(|(template, vector)| {
                let concept_sim = cosine_similarity(&concept_vec, vector);
                let question_sim = cosine_similarity(&question_vec, vector);
                TemplateMatch {
                    template: template.clone(),
                    similarity: concept_sim * self.config.concept_weight
                        + question_sim * self.config.question_weight,
                    match_reason: format!(
                        "概念相似度: {concept_sim:.2}, 问题相似度: {question_sim:.2}"
                    ),
                }
            })
            .filter(|m| m.similarity >= self.config.template_threshold)
            .collect();

        matches.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(Ordering::Equal)
        });
        matches.truncate(self.config.template_top_k);

        for m in &matches {
            debug!(
                template_id = %m.template.template_id,
                similarity = m.similarity,
                "Template candidate"
            );
        }
        Ok(matches)
    }

    async fn extract_concept(&self, question: &str) -> String {
        let prompt = match (ConceptExtractionRequest {
            question: question.to_string(),
        })
        .to_prompt()
        {
            Ok(prompt) => prompt,
            Err(err) => {
                warn!(error = %err, "Failed to render concept prompt");
                return fallback_concept(question);
            }
        };

        let options = GenerationOptions::new().with_temperature(0.1);
        match self.chat.complete(&[ChatMessage::user(prompt)], &options).await {
            Ok(reply) if !reply.trim().is_empty() => reply.trim().to_string(),
            Ok(_) => fallback_concept(question),
            Err(err) => {
                warn!(error = %err, "Concept extraction failed, using pattern match");
                fallback_concept(question)
            }
        }
    }

    async fn retrieve_knowledge(&self, question: &str) -> Vec<KnowledgeChunk> {
        match self
            .retriever
            .query(
                question,
                self.config.knowledge_top_k,
                self.config.knowledge_threshold,
            )
            .await
        {
            Ok(chunks) => chunks,
            Err(err) => {
                warn!(error = %err, "Knowledge retrieval failed, continuing without it");
                Vec::new()
            }
        }
    }
}

fn fallback_concept(question: &str) -> String {
    extract_concept(question).unwrap_or_else(|| question.trim().to_string())
}
