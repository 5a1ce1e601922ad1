//! Integration tests for the question-to-payload pipeline.

use a2ui_toolkit::catalog::Catalog;
use a2ui_toolkit::dynamic::DynamicGenerator;
use a2ui_toolkit::error::ProviderError;
use a2ui_toolkit::matcher::TemplateMatcher;
use a2ui_toolkit::orchestrator::{GenerationContext, GenerationOrchestrator, OrchestratorConfig};
use a2ui_toolkit::pipeline::{PipelineRoute, VisualizationPipeline};
use a2ui_toolkit::provider::{
    ChatMessage, ChatModel, EmbeddingProvider, GenerationOptions, KnowledgeChunk,
    KnowledgeRetriever, StructuredGenerationProvider,
};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

// ============================================================================
// Mock Collaborators
// ============================================================================

struct ConceptChat;

#[async_trait]
impl ChatModel for ConceptChat {
    async fn complete(
        &self,
        _messages: &[ChatMessage],
        _options: &GenerationOptions,
    ) -> Result<String, ProviderError> {
        Ok("分离定律".to_string())
    }
}

struct CannedStructured {
    reply: Value,
    calls: AtomicU32,
}

impl CannedStructured {
    fn new(reply: Value) -> Arc<Self> {
        Arc::new(Self {
            reply,
            calls: AtomicU32::new(0),
        })
    }
}

#[async_trait]
impl StructuredGenerationProvider for CannedStructured {
    async fn generate(
        &self,
        _messages: &[ChatMessage],
        _schema: &Value,
        _options: &GenerationOptions,
    ) -> Result<Value, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.reply.clone())
    }
}

/// Every text maps to the same direction, so every template is a perfect
/// candidate.
struct FlatEmbedder;

#[async_trait]
impl EmbeddingProvider for FlatEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, ProviderError> {
        Ok(vec![1.0, 1.0, 1.0])
    }
}

struct OneChunkRetriever;

#[async_trait]
impl KnowledgeRetriever for OneChunkRetriever {
    async fn query(
        &self,
        _text: &str,
        _top_k: usize,
        _threshold: f32,
    ) -> Result<Vec<KnowledgeChunk>, ProviderError> {
        Ok(vec![
            KnowledgeChunk::new("F2代表型比例为3:1", 0.88).with_chapter("第一章"),
        ])
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn orchestrator(catalog: &Arc<Catalog>) -> GenerationOrchestrator {
    GenerationOrchestrator::new(Arc::clone(catalog), OrchestratorConfig::default())
}

/// A matcher with no rules never matches.
fn pipeline_without_rules(structured: Arc<CannedStructured>) -> VisualizationPipeline {
    let catalog = Catalog::builtin().unwrap();
    let matcher = TemplateMatcher::new(Arc::clone(&catalog)).with_rules(Vec::new());
    let generator = DynamicGenerator::new(
        Arc::new(ConceptChat),
        structured,
        Arc::new(FlatEmbedder),
        Arc::new(OneChunkRetriever),
    );
    VisualizationPipeline::new(matcher, orchestrator(&catalog)).with_dynamic(generator)
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_confident_match_skips_dynamic_generation() {
    let catalog = Catalog::builtin().unwrap();
    let structured = CannedStructured::new(json!({}));
    let generator = DynamicGenerator::new(
        Arc::new(ConceptChat),
        structured.clone(),
        Arc::new(FlatEmbedder),
        Arc::new(OneChunkRetriever),
    );
    let pipeline = VisualizationPipeline::new(
        TemplateMatcher::new(Arc::clone(&catalog)),
        orchestrator(&catalog),
    )
    .with_dynamic(generator);

    let outcome = pipeline
        .answer("请解释冈崎片段的合成过程", None, &GenerationContext::new())
        .await
        .unwrap();

    assert_eq!(outcome.route, PipelineRoute::TemplateMatch);
    assert_eq!(outcome.match_result.confidence, 1.0);
    let payload = outcome.payload.unwrap();
    assert_eq!(payload.root_id(), "viz_dna_replication_okazaki");
    assert!(outcome.dynamic_response.is_none());
    assert_eq!(structured.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_unmatched_without_generator_has_no_payload() {
    let catalog = Catalog::builtin().unwrap();
    let pipeline = VisualizationPipeline::new(
        TemplateMatcher::new(Arc::clone(&catalog)),
        orchestrator(&catalog),
    );

    let outcome = pipeline
        .answer("今天天气怎么样", None, &GenerationContext::new())
        .await
        .unwrap();

    assert_eq!(outcome.route, PipelineRoute::Unmatched);
    assert!(outcome.payload.is_none());
    assert!(!outcome.match_result.matched);
}

#[tokio::test]
async fn test_dynamic_selection_renders_linked_catalog_template() {
    let structured = CannedStructured::new(json!({
        "visualizationApplicable": true,
        "applicableReason": "单基因杂交适合用方格展示",
        "selectedTemplate": {"templateId": "punnett-monohybrid-basic", "reason": "单基因杂交"},
        "extractedData": {"maleGametes": ["B", "b"], "femaleGametes": ["B", "b"]},
        "knowledgePoints": {
            "keyPoints": ["F2代表型比例为3:1"],
            "checkQuestions": ["Bb自交后代中bb占多少？"]
        }
    }));
    let pipeline = pipeline_without_rules(structured.clone());

    let outcome = pipeline
        .answer(
            "两只黑毛杂合豚鼠交配，后代毛色如何分布",
            None,
            &GenerationContext::new().with_user_level("beginner"),
        )
        .await
        .unwrap();

    assert_eq!(outcome.route, PipelineRoute::Dynamic);
    assert_eq!(structured.calls.load(Ordering::SeqCst), 1);

    let payload = outcome.payload.unwrap();
    assert_eq!(payload.root_id(), "viz_punnett_square");
    let square = payload.component("punnett_square_component").unwrap();
    assert_eq!(square.properties["maleGametes"], json!(["B", "b"]));
    assert_eq!(
        payload.data_model["_knowledgePoints"]["keyPoints"],
        json!(["F2代表型比例为3:1"])
    );
    assert_eq!(
        payload.metadata.unwrap().template_id.as_deref(),
        Some("punnett_square_v1")
    );

    let response = outcome.dynamic_response.unwrap();
    assert_eq!(response.citations.len(), 1);
    assert_eq!(response.citations[0].chapter.as_deref(), Some("第一章"));
}

#[tokio::test]
async fn test_not_applicable_answers_without_payload() {
    let structured = CannedStructured::new(json!({
        "visualizationApplicable": false,
        "applicableReason": "概念辨析题，不需要图示",
        "knowledgePoints": {"keyPoints": ["显性不等于常见"]},
        "textAnswer": {"mainAnswer": "显性描述的是表型关系，与频率无关。"}
    }));
    let pipeline = pipeline_without_rules(structured);

    let outcome = pipeline
        .answer("显性性状就是更常见的性状吗", Some("显隐性"), &GenerationContext::new())
        .await
        .unwrap();

    assert_eq!(outcome.route, PipelineRoute::Dynamic);
    assert!(outcome.payload.is_none());
    let response = outcome.dynamic_response.unwrap();
    assert_eq!(
        response.text_answer.unwrap().main_answer,
        "显性描述的是表型关系，与频率无关。"
    );
}

#[tokio::test]
async fn test_rejected_dynamic_data_yields_no_payload() {
    let structured = CannedStructured::new(json!({
        "visualizationApplicable": true,
        "applicableReason": "r",
        "selectedTemplate": {"templateId": "allele_v1", "reason": "直接命中目录模板"},
        "extractedData": {"alleles": "A/a"},
        "knowledgePoints": {}
    }));
    let pipeline = pipeline_without_rules(structured);

    let outcome = pipeline
        .answer("花色基因有几种等位基因", None, &GenerationContext::new())
        .await
        .unwrap();

    assert_eq!(outcome.route, PipelineRoute::Dynamic);
    assert!(outcome.payload.is_none());
    assert!(outcome.dynamic_response.is_some());
}

#[tokio::test]
async fn test_unknown_selection_has_no_payload() {
    let structured = CannedStructured::new(json!({
        "visualizationApplicable": true,
        "applicableReason": "r",
        "selectedTemplate": {"templateId": "hologram-v9", "reason": "?"},
        "knowledgePoints": {}
    }));
    let pipeline = pipeline_without_rules(structured);

    let outcome = pipeline
        .answer("问题", None, &GenerationContext::new())
        .await
        .unwrap();
    assert!(outcome.payload.is_none());
}
