//! OpenAI-compatible generator implementation.
//!
//! Works with: OpenAI, OpenRouter, Together AI, Fireworks AI, Nebius,
//! SambaNova, DeepSeek, Ollama, vLLM and any other endpoint exposing
//! `/chat/completions`.
//!
//! Invocations are not requested through the API's native tool calling:
//! the tool definitions live in the system prompt and the model writes
//! `<function_calls>` blocks into its answer, which
//! [`function_calls::parse`](crate::function_calls::parse) extracts.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use stepwise_config::ProviderConfig;
use stepwise_core::error::GenerationError;
use stepwise_core::generation::{GenerationPort, GenerationResult, Usage};
use tracing::{debug, warn};

use crate::function_calls;
use crate::pricing::ModelPricing;

/// A generator backed by one model on one OpenAI-compatible endpoint.
pub struct OpenAiCompatGenerator {
    name: String,
    base_url: String,
    api_key: Option<String>,
    model: String,
    pricing: ModelPricing,
    client: reqwest::Client,
}

impl OpenAiCompatGenerator {
    /// Create a new OpenAI-compatible generator.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
            model: model.into(),
            pricing: ModelPricing::default(),
            client: reqwest::Client::new(),
        }
    }

    /// Build from a `[[providers]]` entry; `api_key` is the resolved key.
    pub fn from_config(config: &ProviderConfig, api_key: Option<&str>) -> Self {
        Self::new(
            &config.name,
            &config.api_url,
            api_key.map(String::from),
            &config.model,
        )
        .with_pricing(ModelPricing::new(config.input_per_m, config.output_per_m))
    }

    pub fn with_pricing(mut self, pricing: ModelPricing) -> Self {
        self.pricing = pricing;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request_body(&self, prompt: &str, system_prompt: &str) -> serde_json::Value {
        let messages = vec![
            ApiMessage {
                role: "system".into(),
                content: Some(system_prompt.into()),
            },
            ApiMessage {
                role: "user".into(),
                content: Some(prompt.into()),
            },
        ];
        serde_json::json!({
            "model": self.model,
            "messages": messages,
            "stream": false,
        })
    }

    /// Turn a decoded completion into a result: text, parsed invocations, cost.
    fn to_result(&self, api_response: ApiResponse) -> Result<GenerationResult, GenerationError> {
        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| GenerationError::MalformedResponse("No choices in response".into()))?;

        let response = choice.message.content.unwrap_or_default();
        let invocations = function_calls::parse(&response)?;

        let usage = api_response.usage.map(|u| Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        });
        let cost = usage.as_ref().map_or(0.0, |u| self.pricing.cost_of(u));

        Ok(GenerationResult {
            response,
            invocations,
            cost,
            usage,
        })
    }
}

#[async_trait]
impl GenerationPort for OpenAiCompatGenerator {
    fn display_name(&self) -> &str {
        &self.name
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some() && !self.base_url.is_empty()
    }

    async fn generate(
        &self,
        prompt: &str,
        system_prompt: &str,
    ) -> Result<GenerationResult, GenerationError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| GenerationError::NotConfigured(format!("{} has no API key", self.name)))?;

        let url = format!("{}/chat/completions", self.base_url);
        let body = self.request_body(prompt, system_prompt);

        debug!(generator = %self.name, model = %self.model, "Sending completion request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {api_key}"))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerationError::Network(e.to_string()))?;

        let status = response.status().as_u16();

        if status == 429 {
            let retry_after_secs = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(5);
            return Err(GenerationError::RateLimited { retry_after_secs });
        }

        if status == 401 || status == 403 {
            return Err(GenerationError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            ));
        }

        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(generator = %self.name, status, body = %error_body, "Generator returned error");
            return Err(GenerationError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::MalformedResponse(format!("Failed to parse response: {e}")))?;

        let result = self.to_result(api_response)?;
        debug!(
            generator = %self.name,
            invocations = result.invocations.len(),
            cost = result.cost,
            "Completion received"
        );
        Ok(result)
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}
