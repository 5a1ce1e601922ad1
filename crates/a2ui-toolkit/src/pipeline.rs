//! Question-to-payload flow.
//!
//! The matcher runs first because it is cheap and deterministic. Only when
//! it cannot commit to a template does the dynamic generator get involved,
//! and its choice is rendered through the same orchestrator.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::dynamic::{DynamicGenerator, DynamicRequest, DynamicVizResponse, UserLevel};
use crate::error::A2uiError;
use crate::matcher::{MatchResult, TemplateMatcher};
use crate::orchestrator::{GenerationContext, GenerationOrchestrator};
use crate::payload::Payload;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineRoute {
    /// The matcher picked a catalog template.
    TemplateMatch,
    /// The dynamic generator decided.
    Dynamic,
    /// Nothing could pick a template.
    Unmatched,
}

#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    /// `None` when no template applies or the generated data was rejected.
    pub payload: Option<Payload>,
    pub route: PipelineRoute,
    pub match_result: MatchResult,
    pub dynamic_response: Option<DynamicVizResponse>,
}

pub struct VisualizationPipeline {
    matcher: TemplateMatcher,
    orchestrator: GenerationOrchestrator,
    dynamic: Option<DynamicGenerator>,
}

impl VisualizationPipeline {
    pub fn new(matcher: TemplateMatcher, orchestrator: GenerationOrchestrator) -> Self {
        Self {
            matcher,
            orchestrator,
            dynamic: None,
        }
    }

    pub fn with_dynamic(mut self, generator: DynamicGenerator) -> Self {
        self.dynamic = Some(generator);
        self
    }

    pub fn orchestrator(&self) -> &GenerationOrchestrator {
        &self.orchestrator
    }

    #[tracing::instrument(skip(self, context))]
    pub async fn answer(
        &self,
        question: &str,
        concept: Option<&str>,
        context: &GenerationContext,
    ) -> Result<PipelineOutcome, A2uiError> {
        let mut context = context.clone();
        if context.question().is_none() {
            context.question = Some(question.to_string());
        }

        let match_result = self.matcher.match_question(question, concept);
        if let Some(template_id) = match_result.template_id.clone()
            && match_result.matched
        {
            let payload = self
                .orchestrator
                .generate(&template_id, &match_result.suggested_parameters, &context)
                .await?;
            return Ok(PipelineOutcome {
                payload: Some(payload),
                route: PipelineRoute::TemplateMatch,
                match_result,
                dynamic_response: None,
            });
        }

        let Some(generator) = &self.dynamic else {
            info!("No template matched and no dynamic generator configured");
            return Ok(PipelineOutcome {
                payload: None,
                route: PipelineRoute::Unmatched,
                match_result,
                dynamic_response: None,
            });
        };

        let mut request = DynamicRequest::new(question).with_user_level(
            context
                .user_level
                .as_deref()
                .and_then(|level| level.parse().ok())
                .unwrap_or(UserLevel::Intermediate),
        );
        if let Some(concept) = concept.or(context.concept.as_deref()) {
            request = request.with_concept(concept);
        }

        let response = generator.generate(&request).await?;
        let payload = match self.catalog_template_for(generator, &response) {
            Some(template_id) if response.visualization_applicable => {
                let data = dynamic_data(&response);
                match self.orchestrator.generate(&template_id, &data, &context).await {
                    Ok(payload) => Some(payload),
                    Err(err) if err.is_rejection() => {
                        warn!(
                            template_id = %template_id,
                            error = %err,
                            "Generated data rejected, answering without a visualization"
                        );
                        None
                    }
                    Err(err) => return Err(err),
                }
            }
            _ => None,
        };

        Ok(PipelineOutcome {
            payload,
            route: PipelineRoute::Dynamic,
            match_result,
            dynamic_response: Some(response),
        })
    }

    /// The catalog template behind the model's selection, either named
    /// directly or through a visualization template's link.
    fn catalog_template_for(
        &self,
        generator: &DynamicGenerator,
        response: &DynamicVizResponse,
    ) -> Option<String> {
        let selected = &response.selected_template.as_ref()?.template_id;
        let templates = &self.orchestrator.catalog().templates;
        if templates.contains(selected) {
            return Some(selected.clone());
        }
        generator
            .templates()
            .iter()
            .find(|t| &t.template_id == selected)
            .and_then(|t| t.catalog_template_id.clone())
            .filter(|id| templates.contains(id))
    }
}

/// `extractedData ⊕ visualizationData ⊕ knowledgePoints`, later sources win.
/// Template defaults are applied underneath by the orchestrator.
fn dynamic_data(response: &DynamicVizResponse) -> Map<String, Value> {
    let mut data = Map::new();
    for source in [&response.extracted_data, &response.visualization_data]
        .into_iter()
        .flatten()
    {
        data.extend(source.clone());
    }
    if !response.knowledge_points.is_empty() {
        data.extend(response.knowledge_points.to_data());
    }
    data
}
