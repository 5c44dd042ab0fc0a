//! AI service client for the Gemini text-generation API.
//!
//! Provides:
//! - Spec extraction (material systems from specification text)
//! - Estimate analysis (cost rollup and risks over priced line items)
//! - A shared call-with-retry primitive over a pluggable transport
//!
//! Neither public operation returns an error. Anything that goes wrong with
//! the remote model ends up as a failure marker with an explanation.

use anyhow::{Context, Result};
use futures::future::BoxFuture;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, instrument, warn};

use super::retry::{RetryPolicy, Sleeper, TokioSleeper};
use crate::config::Settings;
use crate::domain::ai::{AiAnalysisResult, AiExtractionResult, EstimateAnalysis, SpecData};
use crate::domain::EstimateLineItem;

/// Longest slice of an error body kept in a failure marker.
const ERROR_BODY_EXCERPT: usize = 200;

/// Tolerance when checking the model's grand total against the item totals.
const GRAND_TOTAL_TOLERANCE: f64 = 0.01;

// =============================================================================
// Wire types
// =============================================================================

/// Request body for `generateContent`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub contents: Vec<Content>,
    pub generation_config: GenerationConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct Content {
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_mime_type: String,
}

impl GenerateRequest {
    /// A single-prompt request asking for a JSON-only reply.
    pub fn json_prompt(prompt: String) -> Self {
        Self {
            contents: vec![Content {
                parts: vec![Part { text: Some(prompt) }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_string(),
            },
        }
    }

    pub fn prompt_text(&self) -> Option<&str> {
        self.contents.first()?.parts.first()?.text.as_deref()
    }
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

/// Raw HTTP outcome of one attempt.
#[derive(Debug, Clone)]
pub struct ModelResponse {
    pub status: StatusCode,
    pub body: String,
}

// =============================================================================
// Transport
// =============================================================================

/// Sends one request to the model endpoint.
///
/// `Err` means a transport-level fault (connection refused, timeout, ...);
/// any HTTP status, including errors, comes back as `Ok`.
pub trait ModelTransport: Send + Sync {
    fn send<'a>(&'a self, request: &'a GenerateRequest) -> BoxFuture<'a, Result<ModelResponse>>;
}

/// Transport for the public Gemini REST API.
pub struct GeminiTransport {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl GeminiTransport {
    pub fn new(base_url: &str, model: &str, api_key: &str, timeout_seconds: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .context("Failed to create HTTP client")?;

        let endpoint = format!(
            "{}/models/{}:generateContent",
            base_url.trim_end_matches('/'),
            model
        );

        tracing::info!(endpoint = %endpoint, "AI transport initialized");

        Ok(Self {
            client,
            endpoint,
            api_key: api_key.to_string(),
        })
    }
}

impl ModelTransport for GeminiTransport {
    fn send<'a>(&'a self, request: &'a GenerateRequest) -> BoxFuture<'a, Result<ModelResponse>> {
        Box::pin(async move {
            debug!(url = %self.endpoint, "AI service request");

            let response = self
                .client
                .post(&self.endpoint)
                .query(&[("key", self.api_key.as_str())])
                .json(request)
                .send()
                .await
                .context("AI service request failed")?;

            let status = response.status();
            let body = response
                .text()
                .await
                .context("Failed to read AI service response body")?;

            Ok(ModelResponse { status, body })
        })
    }
}

// =============================================================================
// Client
// =============================================================================

/// Client for the AI service.
#[derive(Clone)]
pub struct AiClient {
    transport: Arc<dyn ModelTransport>,
    sleeper: Arc<dyn Sleeper>,
    policy: RetryPolicy,
    model: String,
}

impl AiClient {
    /// Create a client against the configured Gemini endpoint.
    pub fn new(settings: &Settings) -> Result<Self> {
        let transport = GeminiTransport::new(
            &settings.gemini_api_url,
            &settings.gemini_model,
            &settings.gemini_api_key,
            settings.ai_timeout_seconds,
        )?;

        Ok(Self::with_transport(
            Arc::new(transport),
            Arc::new(TokioSleeper),
            RetryPolicy::new(settings.ai_max_attempts, settings.ai_retry_base_delay()),
        )
        .with_model_name(&settings.gemini_model))
    }

    pub fn with_transport(
        transport: Arc<dyn ModelTransport>,
        sleeper: Arc<dyn Sleeper>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            transport,
            sleeper,
            policy,
            model: "unknown".to_string(),
        }
    }

    pub fn with_model_name(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn model_name(&self) -> &str {
        &self.model
    }

    /// Send a request, retrying 5xx responses and transport faults.
    ///
    /// 4xx and 2xx responses return immediately. When attempts run out the
    /// last 5xx response is returned, or the last transport fault re-raised.
    pub async fn call_with_retry(&self, request: &GenerateRequest) -> Result<ModelResponse> {
        use backoff::backoff::Backoff;

        let mut schedule = self.policy.schedule();
        loop {
            let outcome = self.transport.send(request).await;

            let reason = match &outcome {
                Ok(response) if response.status.is_server_error() => {
                    Some(format!("server error {}", response.status))
                }
                Ok(_) => None,
                Err(e) => Some(format!("transport fault: {:#}", e)),
            };
            let Some(reason) = reason else {
                return outcome;
            };

            match schedule.next_backoff() {
                Some(delay) => {
                    warn!(
                        attempt = schedule.attempts_made(),
                        delay_ms = delay.as_millis() as u64,
                        reason = %reason,
                        "AI service call failed, retrying"
                    );
                    self.sleeper.sleep(delay).await;
                }
                None => {
                    error!(
                        attempts = schedule.attempts_made(),
                        reason = %reason,
                        "AI service call failed, giving up"
                    );
                    return outcome;
                }
            }
        }
    }

    /// Run a prompt and return the model's reply text with code fences removed.
    async fn generate_json(&self, prompt: String) -> Result<String, String> {
        let request = GenerateRequest::json_prompt(prompt);
        debug!(
            prompt_chars = request.prompt_text().map_or(0, str::len),
            "Sending prompt"
        );

        let response = self
            .call_with_retry(&request)
            .await
            .map_err(|e| format!("Failed to communicate with the AI model: {:#}", e))?;

        if !response.status.is_success() {
            let excerpt: String = response.body.chars().take(ERROR_BODY_EXCERPT).collect();
            return Err(format!(
                "AI service returned {}: {}",
                response.status,
                excerpt.trim()
            ));
        }

        let envelope: GenerateResponse = serde_json::from_str(&response.body).map_err(|e| {
            format!("Could not understand the response from the AI model: {}", e)
        })?;

        let text = envelope
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .and_then(|c| c.parts.into_iter().next())
            .and_then(|p| p.text)
            .ok_or_else(|| "AI model returned no content".to_string())?;

        Ok(strip_code_fences(&text).to_string())
    }

    /// Extract structured material-system data from specification text.
    #[instrument(skip(self, text), fields(text_len = text.len()))]
    pub async fn extract_spec_data(&self, text: &str) -> AiExtractionResult {
        let reply = match self.generate_json(spec_extraction_prompt(text)).await {
            Ok(reply) => reply,
            Err(reason) => {
                warn!(reason = %reason, "Spec extraction failed");
                return AiExtractionResult::failure(reason);
            }
        };

        match serde_json::from_str::<SpecData>(&reply) {
            Ok(data) => {
                debug!(systems = data.material_systems.len(), "Spec extraction succeeded");
                AiExtractionResult::Success(data)
            }
            Err(e) => {
                warn!(error = %e, "AI model returned an unexpected spec shape");
                AiExtractionResult::failure(format!("AI model returned invalid JSON: {}", e))
            }
        }
    }

    /// Categorize priced line items into a cost rollup with risks.
    #[instrument(skip(self, items), fields(items = items.len()))]
    pub async fn analyze_estimate(&self, items: &[EstimateLineItem]) -> AiAnalysisResult {
        let prompt = match estimate_analysis_prompt(items) {
            Ok(prompt) => prompt,
            Err(e) => return AiAnalysisResult::failure(format!("Failed to build prompt: {}", e)),
        };

        let reply = match self.generate_json(prompt).await {
            Ok(reply) => reply,
            Err(reason) => {
                warn!(reason = %reason, "Estimate analysis failed");
                return AiAnalysisResult::failure(reason);
            }
        };

        match serde_json::from_str::<EstimateAnalysis>(&reply) {
            Ok(mut analysis) => {
                reconcile_grand_total(&mut analysis, items);
                AiAnalysisResult::Success(analysis)
            }
            Err(e) => {
                warn!(error = %e, "AI model returned an unexpected analysis shape");
                AiAnalysisResult::failure(format!("AI model returned invalid JSON: {}", e))
            }
        }
    }
}

/// The grand total must equal the sum of item totals regardless of what the
/// model computed.
fn reconcile_grand_total(analysis: &mut EstimateAnalysis, items: &[EstimateLineItem]) {
    let expected: f64 = items.iter().filter_map(|i| i.total).sum();
    if (analysis.grand_total - expected).abs() > GRAND_TOTAL_TOLERANCE {
        warn!(
            reported = analysis.grand_total,
            expected = expected,
            "AI grand total disagrees with line items, correcting"
        );
        analysis.grand_total = expected;
    }
}

fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json") on the opening fence line
    let body = rest.split_once('\n').map(|(_, b)| b).unwrap_or("");
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

// =============================================================================
// Prompts
// =============================================================================

fn spec_extraction_prompt(text: &str) -> String {
    format!(
        r#"You are an expert construction estimator analyzing a specification document.
Based ONLY on the text provided below, extract the material systems it specifies.

Respond with a single JSON object matching this schema and nothing else:
{{
  "project_name": "string, the project named in the document, if any",
  "spec_section": "string, the CSI section number and title",
  "addendum": "string, any addendum referenced, if any",
  "material_systems": [
    {{
      "system_name": "string, e.g. Metal Roof Panels",
      "attributes": {{
        "<attribute name>": "<value, or a nested object of further attributes>"
      }}
    }}
  ]
}}

Attributes should capture Basis of Design products and manufacturers, material
thickness and gauge, dimensions, and performance ratings (wind uplift, UL
ratings, warranties).

Here is the specification text:
---
{text}
---
"#
    )
}

fn estimate_analysis_prompt(items: &[EstimateLineItem]) -> serde_json::Result<String> {
    let items_json = serde_json::to_string_pretty(items)?;
    Ok(format!(
        r#"You are an expert construction estimator reviewing a priced takeoff.

Group the line items below into cost categories, putting related descriptions
together (for example flashing, coping and trim belong in one category). For
each category, sum the "total" of its items. The grand total must equal the
sum of every item's "total". Then list one to three of the most important
risks you see in the estimate.

Respond with a single JSON object matching this schema and nothing else:
{{
  "summary": "one sentence describing the estimate overall",
  "cost_breakdown": [{{ "category": "string", "total_cost": number }}],
  "grand_total": number,
  "risks": ["string"]
}}

Line items:
{items_json}
"#
    ))
}

// =============================================================================
// Test doubles
// =============================================================================



#[cfg(test)]
mod http_tests {
    use super::*;
    use crate::services::retry::RetryPolicy;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn http_client(server: &MockServer) -> AiClient {
        let transport =
            GeminiTransport::new(&format!("{}/v1beta", server.uri()), "test-model", "secret", 5)
                .unwrap();
        AiClient::with_transport(
            Arc::new(transport),
            Arc::new(TokioSleeper),
            RetryPolicy::new(3, Duration::from_millis(1)),
        )
    }

    #[tokio::test]
    async fn posts_to_generate_content_with_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/test-model:generateContent"))
            .and(query_param("key", "secret"))
            .and(body_partial_json(json!({
                "generationConfig": { "responseMimeType": "application/json" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{ "content": { "parts": [{
                    "text": "{\"material_systems\":[]}"
                }] } }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let result = http_client(&server).extract_spec_data("spec text").await;
        assert!(result.is_success());
    }

    #[tokio::test]
    async fn unavailable_service_is_tried_three_times() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .expect(3)
            .mount(&server)
            .await;

        match http_client(&server).extract_spec_data("spec text").await {
            AiExtractionResult::Failure { error } => {
                assert!(error.contains("503"));
                assert!(error.contains("overloaded"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }
}
