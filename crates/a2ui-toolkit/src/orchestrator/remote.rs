//! Remote UI agent contract.
//!
//! `POST {baseUrl}/generate` takes `{templateId, data, context}` and answers
//! `{success, payload?, error?, metadata?}`. `GET {baseUrl}/health` is a
//! health check.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use super::GenerationContext;
use crate::error::RemoteError;
use crate::payload::Payload;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteGenerateRequest {
    pub template_id: String,
    pub data: Map<String, Value>,
    pub context: GenerationContext,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteGenerateResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Payload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<RemoteResponseMetadata>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteResponseMetadata {
    /// Milliseconds spent by the remote agent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_time: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_used: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_processed: Option<u64>,
}

impl RemoteGenerateResponse {
    pub fn ok(payload: Payload) -> Self {
        Self {
            success: true,
            payload: Some(payload),
            error: None,
            metadata: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            payload: None,
            error: Some(error.into()),
            metadata: None,
        }
    }

    /// The payload of a successful response, checked against the surface
    /// invariants. Anything else is an attempt failure.
    pub fn into_payload(self) -> Result<Payload, RemoteError> {
        match (self.success, self.payload) {
            (true, Some(payload)) => {
                payload
                    .validate()
                    .map_err(|err| RemoteError::Decode(err.to_string()))?;
                Ok(payload)
            }
            _ => Err(RemoteError::MissingPayload { error: self.error }),
        }
    }
}

/// A service that generates payloads on behalf of the orchestrator.
#[async_trait]
pub trait RemoteUiAgent: Send + Sync {
    /// One generation attempt. Implementations stop their I/O when `cancel`
    /// fires and return [`RemoteError::Cancelled`].
    async fn generate(
        &self,
        request: &RemoteGenerateRequest,
        cancel: CancellationToken,
    ) -> Result<RemoteGenerateResponse, RemoteError>;

    /// Liveness of the remote service.
    async fn health(&self) -> Result<bool, RemoteError>;
}

#[cfg(feature = "http")]
pub use http::HttpRemoteUiAgent;

#[cfg(feature = "http")]
mod http {
    use super::*;
    use reqwest::Client;
    use std::time::Duration;

    /// [`RemoteUiAgent`] over HTTP with bearer authentication.
    #[derive(Clone)]
    pub struct HttpRemoteUiAgent {
        client: Client,
        base_url: String,
        api_key: String,
        health_timeout: Duration,
    }

    impl HttpRemoteUiAgent {
        pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
            Self {
                client: Client::new(),
                base_url: base_url.into(),
                api_key: api_key.into(),
                health_timeout: Duration::from_millis(5_000),
            }
        }

        pub fn with_health_timeout(mut self, timeout: Duration) -> Self {
            self.health_timeout = timeout;
            self
        }

        pub(crate) fn endpoint(&self, path: &str) -> String {
            format!("{}/{}", self.base_url.trim_end_matches('/'), path)
        }

        async fn post_generate(
            &self,
            request: &RemoteGenerateRequest,
        ) -> Result<RemoteGenerateResponse, RemoteError> {
            let response = self
                .client
                .post(self.endpoint("generate"))
                .bearer_auth(&self.api_key)
                .json(request)
                .send()
                .await
                .map_err(|err| RemoteError::Transport(err.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Failed to read error body".to_string());
                return Err(RemoteError::HttpStatus {
                    status: status.as_u16(),
                    body,
                });
            }

            response
                .json()
                .await
                .map_err(|err| RemoteError::Decode(err.to_string()))
        }
    }

    #[async_trait]
    impl RemoteUiAgent for HttpRemoteUiAgent {
        async fn generate(
            &self,
            request: &RemoteGenerateRequest,
            cancel: CancellationToken,
        ) -> Result<RemoteGenerateResponse, RemoteError> {
            tokio::select! {
                _ = cancel.cancelled() => Err(RemoteError::Cancelled),
                result = self.post_generate(request) => result,
            }
        }

        async fn health(&self) -> Result<bool, RemoteError> {
            let response = self
                .client
                .get(self.endpoint("health"))
                .timeout(self.health_timeout)
                .send()
                .await
                .map_err(|err| {
                    if err.is_timeout() {
                        RemoteError::Timeout {
                            after: self.health_timeout,
                        }
                    } else {
                        RemoteError::Transport(err.to_string())
                    }
                })?;
            Ok(response.status().is_success())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_payload() -> Payload {
        Payload::text_fallback("占位", "test")
    }

    #[test]
    fn test_request_wire_shape() {
        let request = RemoteGenerateRequest {
            template_id: "punnett_square_v1".to_string(),
            data: Map::new(),
            context: GenerationContext::with_question("3:1是怎么来的"),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["templateId"], "punnett_square_v1");
        assert_eq!(json["context"]["question"], "3:1是怎么来的");
        assert!(json["data"].as_object().unwrap().is_empty());
    }

    #[test]
    fn test_response_parses_metadata() {
        let response: RemoteGenerateResponse = serde_json::from_value(json!({
            "success": false,
            "error": "overloaded",
            "metadata": {"processingTime": 120, "modelUsed": "glm-4", "tokensProcessed": 900}
        }))
        .unwrap();

        let metadata = response.metadata.clone().unwrap();
        assert_eq!(metadata.processing_time, Some(120));
        assert_eq!(metadata.model_used.as_deref(), Some("glm-4"));
        assert_eq!(
            response.into_payload().unwrap_err(),
            RemoteError::MissingPayload {
                error: Some("overloaded".to_string())
            }
        );
    }

    #[test]
    fn test_success_without_payload_is_failure() {
        let response = RemoteGenerateResponse {
            success: true,
            payload: None,
            error: None,
            metadata: None,
        };
        assert!(matches!(
            response.into_payload(),
            Err(RemoteError::MissingPayload { error: None })
        ));
    }

    #[test]
    fn test_invalid_payload_is_decode_failure() {
        let mut payload = valid_payload();
        payload.surface.root_id = "nowhere".to_string();

        let result = RemoteGenerateResponse::ok(payload).into_payload();
        assert!(matches!(result, Err(RemoteError::Decode(_))));
    }

    #[test]
    fn test_ok_response_yields_payload() {
        let payload = RemoteGenerateResponse::ok(valid_payload())
            .into_payload()
            .unwrap();
        assert_eq!(payload.root_id(), "fallback");
    }

    #[cfg(feature = "http")]
    #[test]
    fn test_http_endpoint_join() {
        let agent = HttpRemoteUiAgent::new("http://agent:8080/", "key");
        assert_eq!(agent.endpoint("generate"), "http://agent:8080/generate");
        assert_eq!(agent.endpoint("health"), "http://agent:8080/health");
    }
}
