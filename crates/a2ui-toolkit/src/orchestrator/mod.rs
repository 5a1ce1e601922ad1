//! Generation orchestration: one strategy per request, with resilience.
//!
//! [`GenerationOrchestrator::generate`] validates the request data against
//! the template schema, optionally enriches it with a chat model, and then
//! runs exactly one strategy, the first that applies:
//!
//! 1. **Remote**: a remote UI agent is configured. Attempts are retried with
//!    exponential backoff and a hard per-attempt timeout. When every attempt
//!    fails, a text-only fallback payload is returned if fallback is enabled.
//! 2. **Local**: a chat model is available and the context carries a
//!    question. Any failure to obtain a well-formed payload from the model
//!    falls back to the deterministic builder; this path never errors
//!    outward.
//! 3. **Deterministic**: [`builder::build`] on `defaults ⊕ data`.
//!
//! Missing templates and schema violations are rejected before any strategy
//! runs.

pub mod config;
pub mod local;
pub mod remote;
pub mod retry;

pub use config::OrchestratorConfig;
pub use local::{LocalSynthesisError, LocalSynthesizer};
#[cfg(feature = "http")]
pub use remote::HttpRemoteUiAgent;
pub use remote::{RemoteGenerateRequest, RemoteGenerateResponse, RemoteUiAgent};
pub use retry::{RetryOutcome, RetryPolicy, retry_with_timeout};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::builder;
use crate::catalog::{Catalog, Template, TemplateSummary};
use crate::error::A2uiError;
use crate::extract::{extract_json, parse_sanitized};
use crate::payload::{Payload, PayloadMetadata};
use crate::prompts::{EnrichmentRequest, ToPrompt};
use crate::provider::{ChatMessage, ChatModel, GenerationOptions};

const ENRICHMENT_MAX_TOKENS: u32 = 500;

/// Caller context forwarded to every strategy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concept: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl GenerationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_question(question: impl Into<String>) -> Self {
        Self {
            question: Some(question.into()),
            ..Default::default()
        }
    }

    pub fn with_user_level(mut self, level: impl Into<String>) -> Self {
        self.user_level = Some(level.into());
        self
    }

    pub fn with_concept(mut self, concept: impl Into<String>) -> Self {
        self.concept = Some(concept.into());
        self
    }

    /// The question, when present and not blank.
    pub fn question(&self) -> Option<&str> {
        self.question
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationStrategy {
    Remote,
    Local,
    Deterministic,
}

impl GenerationStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationStrategy::Remote => "remote",
            GenerationStrategy::Local => "local",
            GenerationStrategy::Deterministic => "deterministic",
        }
    }
}

impl fmt::Display for GenerationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a payload was produced.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationReport {
    pub strategy: GenerationStrategy,
    /// Remote attempts made; zero for the other strategies.
    pub attempts: u32,
    /// Total delay slept before remote attempts.
    pub total_backoff: Duration,
    /// The payload is the synthetic text-only fallback.
    pub used_fallback: bool,
}

impl GenerationReport {
    fn without_remote(strategy: GenerationStrategy) -> Self {
        Self {
            strategy,
            attempts: 0,
            total_backoff: Duration::ZERO,
            used_fallback: false,
        }
    }
}

pub struct GenerationOrchestrator {
    catalog: Arc<Catalog>,
    config: OrchestratorConfig,
    remote: Option<Arc<dyn RemoteUiAgent>>,
    chat_model: Option<Arc<dyn ChatModel>>,
    cancel: CancellationToken,
}

impl GenerationOrchestrator {
    /// With the `http` feature, a configured remote endpoint and key yield an
    /// [`HttpRemoteUiAgent`].
    pub fn new(catalog: Arc<Catalog>, config: OrchestratorConfig) -> Self {
        let remote = Self::remote_from_config(&config);
        Self {
            catalog,
            config,
            remote,
            chat_model: None,
            cancel: CancellationToken::new(),
        }
    }

    #[cfg(feature = "http")]
    fn remote_from_config(config: &OrchestratorConfig) -> Option<Arc<dyn RemoteUiAgent>> {
        match (&config.remote_base_url, &config.remote_api_key) {
            (Some(url), Some(key)) => Some(Arc::new(
                HttpRemoteUiAgent::new(url.clone(), key.clone())
                    .with_health_timeout(config.health_timeout),
            )),
            _ => None,
        }
    }

    #[cfg(not(feature = "http"))]
    fn remote_from_config(_config: &OrchestratorConfig) -> Option<Arc<dyn RemoteUiAgent>> {
        None
    }

    /// Uses `agent` for remote generation. An injected agent counts as a
    /// configured remote.
    pub fn with_remote_agent(mut self, agent: Arc<dyn RemoteUiAgent>) -> Self {
        self.remote = Some(agent);
        self
    }

    /// Enables local synthesis and data enrichment.
    pub fn with_chat_model(mut self, model: Arc<dyn ChatModel>) -> Self {
        self.chat_model = Some(model);
        self
    }

    /// Cancelling `token` aborts in-flight remote attempts and the retry loop.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub async fn generate(
        &self,
        template_id: &str,
        data: &Map<String, Value>,
        context: &GenerationContext,
    ) -> Result<Payload, A2uiError> {
        self.generate_with_report(template_id, data, context)
            .await
            .map(|(payload, _)| payload)
    }

    /// Resolves the first template registered for `visualization_type`.
    pub async fn generate_from_visualization(
        &self,
        visualization_type: &str,
        data: &Map<String, Value>,
        context: &GenerationContext,
    ) -> Result<Payload, A2uiError> {
        let template = self
            .catalog
            .templates
            .by_visualization_type(visualization_type)
            .ok_or_else(|| A2uiError::VisualizationTypeNotFound {
                visualization_type: visualization_type.to_string(),
            })?;
        self.generate(&template.template_id, data, context).await
    }

    #[tracing::instrument(skip(self, data, context), fields(template_id = %template_id))]
    pub async fn generate_with_report(
        &self,
        template_id: &str,
        data: &Map<String, Value>,
        context: &GenerationContext,
    ) -> Result<(Payload, GenerationReport), A2uiError> {
        let template = self.catalog.templates.get(template_id).ok_or_else(|| {
            A2uiError::TemplateNotFound {
                template_id: template_id.to_string(),
            }
        })?;

        let merged = template.merged_with(data);
        self.catalog.templates.validate(template, &merged)?;

        let data = self.enrich_data(template, merged, context).await;

        let (mut payload, report) = if let Some(remote) = &self.remote {
            self.generate_remote(remote, template, data, context).await?
        } else if let Some(model) = &self.chat_model
            && let Some(question) = context.question()
        {
            let payload = self.generate_local(model, template, &data, question).await?;
            (payload, GenerationReport::without_remote(GenerationStrategy::Local))
        } else {
            let payload = builder::build(template, &data)?;
            (
                payload,
                GenerationReport::without_remote(GenerationStrategy::Deterministic),
            )
        };

        stamp(&mut payload, template, report.strategy);
        info!(
            strategy = %report.strategy,
            attempts = report.attempts,
            used_fallback = report.used_fallback,
            components = payload.len(),
            "Generated payload"
        );
        Ok((payload, report))
    }

    async fn generate_remote(
        &self,
        remote: &Arc<dyn RemoteUiAgent>,
        template: &Template,
        data: Map<String, Value>,
        context: &GenerationContext,
    ) -> Result<(Payload, GenerationReport), A2uiError> {
        let request = RemoteGenerateRequest {
            template_id: template.template_id.clone(),
            data,
            context: context.clone(),
        };
        let request = &request;
        let policy = RetryPolicy::from_config(&self.config);

        let outcome = retry_with_timeout(&policy, &self.cancel, |_, token| {
            let remote = Arc::clone(remote);
            async move { remote.generate(request, token).await?.into_payload() }
        })
        .await;

        let mut report = GenerationReport {
            strategy: GenerationStrategy::Remote,
            attempts: outcome.attempts,
            total_backoff: outcome.total_backoff,
            used_fallback: false,
        };

        match outcome.result {
            Ok(payload) => Ok((payload, report)),
            Err(last_error) if self.config.enable_fallback => {
                warn!(
                    template_id = %template.template_id,
                    attempts = outcome.attempts,
                    error = %last_error,
                    "Remote generation exhausted, returning fallback payload"
                );
                report.used_fallback = true;
                let payload = Payload::text_fallback(
                    format!("可视化数据生成失败。模板ID: {}", template.template_id),
                    last_error.to_string(),
                );
                Ok((payload, report))
            }
            Err(last_error) => Err(A2uiError::RemoteDelegation {
                attempts: outcome.attempts,
                last_error,
            }),
        }
    }

    async fn generate_local(
        &self,
        model: &Arc<dyn ChatModel>,
        template: &Template,
        data: &Map<String, Value>,
        question: &str,
    ) -> Result<Payload, A2uiError> {
        let synthesizer = LocalSynthesizer::new(Arc::clone(model));
        match synthesizer.synthesize(template, data, Some(question)).await {
            Ok(payload) => Ok(payload),
            Err(err) => {
                warn!(
                    template_id = %template.template_id,
                    error = %err,
                    "Local synthesis failed, building from template"
                );
                Ok(builder::build(template, data)?)
            }
        }
    }

    /// Asks the chat model to improve `data` for the context's question and
    /// merges the returned object over it.
    ///
    /// Without a chat model or a question, or on any failure, `data` comes
    /// back unchanged. An enrichment that breaks the template schema is
    /// discarded.
    pub async fn enrich_data(
        &self,
        template: &Template,
        data: Map<String, Value>,
        context: &GenerationContext,
    ) -> Map<String, Value> {
        let (Some(model), Some(question)) = (&self.chat_model, context.question()) else {
            return data;
        };

        match request_enrichment(model.as_ref(), question, &data).await {
            Ok(enhanced) => {
                let mut enriched = data.clone();
                enriched.extend(enhanced);
                match self.catalog.templates.validate(template, &enriched) {
                    Ok(()) => {
                        debug!(template_id = %template.template_id, "Enriched request data");
                        enriched
                    }
                    Err(violation) => {
                        warn!(
                            template_id = %template.template_id,
                            error = %violation,
                            "Discarding enrichment that breaks the schema"
                        );
                        data
                    }
                }
            }
            Err(err) => {
                warn!(
                    template_id = %template.template_id,
                    error = %err,
                    "Data enrichment failed"
                );
                data
            }
        }
    }

    /// `true` without a remote agent; otherwise the agent's health within
    /// the configured timeout.
    pub async fn health_check(&self) -> bool {
        let Some(remote) = &self.remote else {
            return true;
        };
        match tokio::time::timeout(self.config.health_timeout, remote.health()).await {
            Ok(Ok(healthy)) => healthy,
            Ok(Err(err)) => {
                warn!(error = %err, "Remote health check failed");
                false
            }
            Err(_) => {
                warn!(timeout = ?self.config.health_timeout, "Remote health check timed out");
                false
            }
        }
    }

    pub fn available_templates(&self) -> Vec<TemplateSummary> {
        self.catalog.templates.summaries()
    }
}

async fn request_enrichment(
    model: &dyn ChatModel,
    question: &str,
    data: &Map<String, Value>,
) -> Result<Map<String, Value>, Box<dyn std::error::Error + Send + Sync>> {
    let prompt = EnrichmentRequest {
        question: question.to_string(),
        data_json: serde_json::to_string(data)?,
    }
    .to_prompt()?;

    let options = GenerationOptions::new().with_max_tokens(ENRICHMENT_MAX_TOKENS);
    let reply = model.complete(&[ChatMessage::user(prompt)], &options).await?;
    let json = extract_json(&reply)?;
    Ok(parse_sanitized(&json)?)
}

fn stamp(payload: &mut Payload, template: &Template, strategy: GenerationStrategy) {
    let metadata = payload.metadata.get_or_insert_with(PayloadMetadata::default);
    metadata
        .template_id
        .get_or_insert_with(|| template.template_id.clone());
    metadata.generated_by = Some(strategy.as_str().to_string());
    metadata.generated_at_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .ok()
        .map(|elapsed| elapsed.as_millis() as u64);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn orchestrator() -> GenerationOrchestrator {
        GenerationOrchestrator::new(Catalog::builtin().unwrap(), OrchestratorConfig::default())
    }

    #[test]
    fn test_context_question_ignores_blank() {
        assert_eq!(GenerationContext::with_question("  ").question(), None);
        assert_eq!(
            GenerationContext::with_question(" 为什么 ").question(),
            Some("为什么")
        );
    }

    #[test]
    fn test_context_extra_fields_flatten() {
        let context: GenerationContext =
            serde_json::from_value(json!({"question": "q", "sessionId": "s1"})).unwrap();
        assert_eq!(context.extra["sessionId"], "s1");
        assert_eq!(serde_json::to_value(&context).unwrap()["sessionId"], "s1");
    }

    #[tokio::test]
    async fn test_deterministic_without_collaborators() {
        let (payload, report) = orchestrator()
            .generate_with_report("punnett_square_v1", &Map::new(), &GenerationContext::new())
            .await
            .unwrap();

        assert_eq!(
            report,
            GenerationReport::without_remote(GenerationStrategy::Deterministic)
        );
        assert_eq!(payload.root_id(), "viz_punnett_square");
        let metadata = payload.metadata.unwrap();
        assert_eq!(metadata.generated_by.as_deref(), Some("deterministic"));
        assert!(metadata.generated_at_ms.is_some());
    }

    #[tokio::test]
    async fn test_unknown_template_rejected() {
        let err = orchestrator()
            .generate("nope_v1", &Map::new(), &GenerationContext::new())
            .await
            .unwrap_err();
        assert!(matches!(err, A2uiError::TemplateNotFound { .. }));
    }

    #[tokio::test]
    async fn test_schema_violation_rejected() {
        let mut data = Map::new();
        data.insert("maleGametes".into(), json!("A"));
        let err = orchestrator()
            .generate("punnett_square_v1", &data, &GenerationContext::new())
            .await
            .unwrap_err();
        assert!(matches!(err, A2uiError::SchemaValidation(_)));
        assert!(err.is_rejection());
    }

    #[tokio::test]
    async fn test_unknown_visualization_type() {
        let err = orchestrator()
            .generate_from_visualization("hologram", &Map::new(), &GenerationContext::new())
            .await
            .unwrap_err();
        assert!(matches!(err, A2uiError::VisualizationTypeNotFound { .. }));
    }

    #[tokio::test]
    async fn test_health_without_remote() {
        assert!(orchestrator().health_check().await);
    }

    #[test]
    fn test_available_templates() {
        let summaries = orchestrator().available_templates();
        assert_eq!(summaries.len(), 8);
        assert_eq!(summaries[0].template_id, "punnett_square_v1");
    }

    #[tokio::test]
    async fn test_enrich_without_model_is_identity() {
        let orchestrator = orchestrator();
        let template = orchestrator
            .catalog()
            .templates
            .get("allele_v1")
            .unwrap()
            .clone();
        let data = template.default_values.clone();
        let enriched = orchestrator
            .enrich_data(&template, data.clone(), &GenerationContext::with_question("q"))
            .await;
        assert_eq!(enriched, data);
    }
}
