//! Local backend: Ollama inference server.

use super::{
    build_provider_http_client, ensure_success, map_http_error, resolve_model, unreachable,
    CompletionOptions, ModelInfo, ModelProviderClient, ProviderConfig,
};
use crate::error::{ApiError, ConfigError};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_MODEL: &str = "gemma3:1b";
pub const DEFAULT_ENDPOINT: &str = "http://localhost:11434";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Sampling defaults for local generation.
pub fn default_options() -> CompletionOptions {
    CompletionOptions {
        temperature: Some(0.3),
        top_p: Some(0.9),
        max_tokens: Some(2000),
    }
}

pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
    options: CompletionOptions,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TaggedModel>,
}

#[derive(Deserialize)]
struct TaggedModel {
    name: String,
}

impl OllamaClient {
    pub fn new(config: &ProviderConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            client: build_provider_http_client(config.timeout())?,
            base_url: config.endpoint().to_string(),
            model: config.model().to_string(),
            options: config.completion_options(),
        })
    }
}

#[async_trait]
impl ModelProviderClient for OllamaClient {
    async fn generate(&self, prompt: &str) -> Result<String, ApiError> {
        let url = format!("{}/api/generate", self.base_url);
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: GenerateOptions {
                temperature: self.options.temperature,
                top_p: self.options.top_p,
                num_predict: self.options.max_tokens,
            },
        };

        debug!(model = %self.model, prompt_chars = prompt.len(), "Ollama generate");
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(map_http_error)?;
        let response = ensure_success(response).await?;

        let body: GenerateResponse = response.json().await.map_err(|e| {
            ApiError::ProviderError(format!("Failed to parse Ollama response: {}", e))
        })?;
        Ok(body.response)
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, ApiError> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self.client.get(&url).send().await.map_err(map_http_error)?;
        let response = ensure_success(response).await?;
        let tags: TagsResponse = response.json().await.map_err(|e| {
            ApiError::ProviderError(format!("Failed to parse Ollama tags: {}", e))
        })?;

        Ok(tags
            .models
            .into_iter()
            .map(|model| ModelInfo {
                name: model.name,
                supports_generation: true,
            })
            .collect())
    }

    async fn validate(&self) -> Result<(), ConfigError> {
        let available = self
            .list_models()
            .await
            .map_err(|e| unreachable(&self.base_url, e))?;
        resolve_model(&self.model, &available)
    }

    fn provider_name(&self) -> &str {
        "ollama"
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
