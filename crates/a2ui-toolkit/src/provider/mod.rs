//! Collaborator interfaces: chat and structured generation, embeddings and
//! knowledge retrieval.
//!
//! All of them are async traits taking `&self`, so one instance can serve
//! concurrent requests behind an `Arc`.

#[cfg(feature = "http")]
pub mod openai_compat;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProviderError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
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

/// Sampling knobs passed through to the model.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationOptions {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl GenerationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Free-text chat completion.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &GenerationOptions,
    ) -> Result<String, ProviderError>;
}

/// Generation constrained by a JSON schema.
///
/// Conformance is best effort; callers validate the returned shape.
#[async_trait]
pub trait StructuredGenerationProvider: Send + Sync {
    async fn generate(
        &self,
        messages: &[ChatMessage],
        schema: &Value,
        options: &GenerationOptions,
    ) -> Result<Value, ProviderError>;
}

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Fixed-length embedding of `text`.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError>;
}

/// A ranked piece of supporting content from the knowledge base.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeChunk {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    pub score: f32,
}

impl KnowledgeChunk {
    pub fn new(content: impl Into<String>, score: f32) -> Self {
        Self {
            content: content.into(),
            chapter: None,
            section: None,
            score,
        }
    }

    pub fn with_chapter(mut self, chapter: impl Into<String>) -> Self {
        self.chapter = Some(chapter.into());
        self
    }

    pub fn with_section(mut self, section: impl Into<String>) -> Self {
        self.section = Some(section.into());
        self
    }

    /// "chapter - section", whichever parts are known.
    pub fn source_label(&self) -> Option<String> {
        match (&self.chapter, &self.section) {
            (Some(chapter), Some(section)) => Some(format!("{chapter} - {section}")),
            (Some(chapter), None) => Some(chapter.clone()),
            (None, Some(section)) => Some(section.clone()),
            (None, None) => None,
        }
    }
}

#[async_trait]
pub trait KnowledgeRetriever: Send + Sync {
    /// Up to `top_k` chunks scoring at least `threshold`, best first.
    async fn query(
        &self,
        text: &str,
        top_k: usize,
        threshold: f32,
    ) -> Result<Vec<KnowledgeChunk>, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_chat_message_serialization() {
        let message = ChatMessage::system("你是遗传学助教");
        assert_eq!(
            serde_json::to_value(&message).unwrap(),
            json!({"role": "system", "content": "你是遗传学助教"})
        );
    }

    #[test]
    fn test_generation_options_builder() {
        let options = GenerationOptions::new()
            .with_temperature(0.3)
            .with_max_tokens(3000);
        assert_eq!(options.temperature, Some(0.3));
        assert_eq!(options.max_tokens, Some(3000));
    }

    #[test]
    fn test_knowledge_chunk_source_label() {
        let chunk = KnowledgeChunk::new("DNA复制是半保留的", 0.82)
            .with_chapter("第三章")
            .with_section("DNA复制");
        assert_eq!(chunk.source_label().as_deref(), Some("第三章 - DNA复制"));
        assert_eq!(KnowledgeChunk::new("x", 0.7).source_label(), None);
    }
}
