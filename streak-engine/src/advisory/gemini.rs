//! Gemini `generateContent` transport.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use streak_common::AdvisoryConfig;
use tracing::{debug, info, warn};

use super::{AdvisoryError, ModelReply, ModelTier, StructuredRequest, StructuredTransport};

/// HTTP transport for the Gemini API with retry and fixed backoff.
pub struct GeminiTransport {
    config: AdvisoryConfig,
    client: Client,
}

// ============================================================================
// API request/response types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "GenerationConfig::is_empty")]
    generation_config: GenerationConfig<'a>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Tool>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize, Default)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_schema: Option<&'a serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thinking_config: Option<ThinkingConfig>,
}

impl GenerationConfig<'_> {
    fn is_empty(&self) -> bool {
        self.response_mime_type.is_none()
            && self.response_schema.is_none()
            && self.thinking_config.is_none()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ThinkingConfig {
    thinking_budget: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Tool {
    google_search: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroundingMetadata {
    #[serde(default)]
    grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Debug, Deserialize)]
struct GroundingChunk {
    web: Option<WebSource>,
}

#[derive(Debug, Deserialize)]
struct WebSource {
    uri: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

impl GeminiTransport {
    pub fn new(config: AdvisoryConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { config, client }
    }

    fn model_for(&self, tier: ModelTier) -> &str {
        match tier {
            ModelTier::Fast => &self.config.model,
            ModelTier::Deep => &self.config.coaching_model,
        }
    }

    fn url_for(&self, model: &str) -> String {
        let model = model.strip_prefix("models/").unwrap_or(model);
        format!(
            "{}/models/{}:generateContent",
            self.config.endpoint.trim_end_matches('/'),
            model
        )
    }

    /// Try to send a single request.
    async fn try_send(
        &self,
        url: &str,
        api_key: &str,
        request: &StructuredRequest,
    ) -> Result<ModelReply, AdvisoryError> {
        let body = GenerateContentRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![Part {
                    text: &request.prompt,
                }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: request.schema.as_ref().map(|_| "application/json"),
                response_schema: request.schema.as_ref(),
                thinking_config: request
                    .thinking_budget
                    .map(|thinking_budget| ThinkingConfig { thinking_budget }),
            },
            tools: if request.grounded {
                vec![Tool {
                    google_search: serde_json::Map::new(),
                }]
            } else {
                Vec::new()
            },
        };

        debug!(url, operation = request.operation, "Sending advisory request");
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AdvisoryError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AdvisoryError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| AdvisoryError::Transport(format!("failed to parse response: {}", e)))?;

        if let Some(err) = parsed.error {
            return Err(AdvisoryError::Service(err.message));
        }

        // An empty candidate list is a valid (empty) answer; callers fall back
        let Some(candidate) = parsed.candidates.and_then(|c| c.into_iter().next()) else {
            return Ok(ModelReply::default());
        };

        let text = candidate
            .content
            .map(|c| {
                c.parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();
        let sources = candidate
            .grounding_metadata
            .map(|g| {
                g.grounding_chunks
                    .into_iter()
                    .filter_map(|c| c.web.and_then(|w| w.uri))
                    .collect()
            })
            .unwrap_or_default();

        Ok(ModelReply { text, sources })
    }
}

#[async_trait]
impl StructuredTransport for GeminiTransport {
    async fn send(&self, request: &StructuredRequest) -> Result<ModelReply, AdvisoryError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or(AdvisoryError::MissingCredentials)?;
        let url = self.url_for(self.model_for(request.tier));
        let max_attempts = self.config.max_retries + 1;
        let backoff = Duration::from_millis(self.config.retry_backoff_ms);
        let start = Instant::now();

        let mut last_error = None;
        for attempt in 1..=max_attempts {
            match self.try_send(&url, api_key, request).await {
                Ok(reply) => {
                    info!(
                        operation = request.operation,
                        attempt,
                        latency_ms = start.elapsed().as_millis() as u64,
                        "Advisory request successful"
                    );
                    return Ok(reply);
                }
                Err(e) => {
                    warn!(
                        operation = request.operation,
                        attempt,
                        max_attempts,
                        error = %e,
                        "Advisory request failed"
                    );
                    let retryable = e.is_retryable();
                    last_error = Some(e);
                    if !retryable {
                        break;
                    }
                    if attempt < max_attempts {
                        tokio::time::sleep(backoff).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| AdvisoryError::Transport("no attempt made".into())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> AdvisoryConfig {
        AdvisoryConfig {
            endpoint: server.uri(),
            model: "fast-model".into(),
            coaching_model: "deep-model".into(),
            api_key: Some("test-key".into()),
            timeout_secs: 5,
            max_retries: 2,
            retry_backoff_ms: 1,
        }
    }

    fn text_response(text: &str) -> serde_json::Value {
        json!({
            "candidates": [{
                "content": { "parts": [{ "text": text }] },
                "groundingMetadata": {
                    "groundingChunks": [{ "web": { "uri": "https://example.com/ada" } }]
                }
            }]
        })
    }

    #[tokio::test]
    async fn test_json_request_sets_schema_and_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/fast-model:generateContent"))
            .and(header("x-goog-api-key", "test-key"))
            .and(body_partial_json(json!({
                "generationConfig": { "responseMimeType": "application/json" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_response("{}")))
            .expect(1)
            .mount(&server)
            .await;

        let transport = GeminiTransport::new(config_for(&server));
        let request = StructuredRequest::json("test", "prompt".into(), json!({"type": "OBJECT"}));
        let reply = transport.send(&request).await.unwrap();
        assert_eq!(reply.text, "{}");
        assert_eq!(reply.sources, vec!["https://example.com/ada".to_string()]);
    }

    #[tokio::test]
    async fn test_deep_tier_uses_coaching_model() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/deep-model:generateContent"))
            .and(body_partial_json(json!({
                "generationConfig": { "thinkingConfig": { "thinkingBudget": 1024 } }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_response("Rest well.")))
            .expect(1)
            .mount(&server)
            .await;

        let transport = GeminiTransport::new(config_for(&server));
        let request = StructuredRequest {
            tier: ModelTier::Deep,
            thinking_budget: Some(1024),
            ..StructuredRequest::text("coach", "prompt".into())
        };
        assert_eq!(transport.send(&request).await.unwrap().text, "Rest well.");
    }

    #[tokio::test]
    async fn test_retries_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_response("ok")))
            .mount(&server)
            .await;

        let transport = GeminiTransport::new(config_for(&server));
        let reply = transport
            .send(&StructuredRequest::text("test", "p".into()))
            .await
            .unwrap();
        assert_eq!(reply.text, "ok");
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
            .expect(1)
            .mount(&server)
            .await;

        let transport = GeminiTransport::new(config_for(&server));
        let err = transport
            .send(&StructuredRequest::text("test", "p".into()))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            AdvisoryError::Status {
                status: 400,
                body: "bad request".into()
            }
        );
    }

    #[tokio::test]
    async fn test_missing_key_fails_fast() {
        let mut config = AdvisoryConfig::default();
        config.api_key = None;
        let transport = GeminiTransport::new(config);
        assert_eq!(
            transport
                .send(&StructuredRequest::text("test", "p".into()))
                .await
                .unwrap_err(),
            AdvisoryError::MissingCredentials
        );
    }
}
