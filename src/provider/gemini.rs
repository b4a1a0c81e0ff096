//! Cloud backend: Google Gemini `generateContent` REST API.

use super::{
    build_provider_http_client, ensure_success, map_http_error, resolve_model, unreachable,
    CompletionOptions, ModelInfo, ModelProviderClient, ProviderConfig,
};
use crate::error::{ApiError, ConfigError};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com";
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

const API_KEY_HEADER: &str = "x-goog-api-key";
const GENERATE_METHOD: &str = "generateContent";

pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    options: CompletionOptions,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListModelsResponse {
    #[serde(default)]
    models: Vec<ListedModel>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListedModel {
    name: String,
    #[serde(default)]
    supported_generation_methods: Vec<String>,
}

impl GeminiClient {
    /// Build the client. Fails when no API key is configured.
    pub fn new(config: &ProviderConfig) -> Result<Self, ConfigError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                ConfigError::MissingCredential(format!(
                    "Gemini API key not set (configure api_key or {})",
                    API_KEY_ENV
                ))
            })?;

        Ok(Self {
            client: build_provider_http_client(config.timeout())?,
            api_key,
            base_url: config.endpoint().to_string(),
            model: config.model().to_string(),
            options: config.completion_options(),
        })
    }

    fn model_path(&self) -> String {
        if self.model.starts_with("models/") {
            self.model.clone()
        } else {
            format!("models/{}", self.model)
        }
    }

    fn generation_config(&self) -> Option<GenerationConfig> {
        if self.options == CompletionOptions::default() {
            return None;
        }
        Some(GenerationConfig {
            temperature: self.options.temperature,
            top_p: self.options.top_p,
            max_output_tokens: self.options.max_tokens,
        })
    }
}

#[async_trait]
impl ModelProviderClient for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String, ApiError> {
        let url = format!("{}/v1beta/{}:{}", self.base_url, self.model_path(), GENERATE_METHOD);
        let request = GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![RequestPart { text: prompt }],
            }],
            generation_config: self.generation_config(),
        };

        debug!(model = %self.model, prompt_chars = prompt.len(), "Gemini generate");
        let response = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(map_http_error)?;
        let response = ensure_success(response).await?;

        let body: GenerateResponse = response.json().await.map_err(|e| {
            ApiError::ProviderError(format!("Failed to parse Gemini response: {}", e))
        })?;

        let text: String = body
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect()
            })
            .unwrap_or_default();

        if text.is_empty() {
            return Err(ApiError::ProviderError(
                "Gemini returned no candidate text".to_string(),
            ));
        }
        Ok(text)
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, ApiError> {
        let url = format!("{}/v1beta/models", self.base_url);
        let mut models = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .get(&url)
                .header(API_KEY_HEADER, &self.api_key)
                .query(&[("pageSize", "1000")]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let response = request.send().await.map_err(map_http_error)?;
            let response = ensure_success(response).await?;
            let page: ListModelsResponse = response.json().await.map_err(|e| {
                ApiError::ProviderError(format!("Failed to parse Gemini model list: {}", e))
            })?;

            models.extend(page.models.into_iter().map(|model| ModelInfo {
                supports_generation: model
                    .supported_generation_methods
                    .iter()
                    .any(|method| method == GENERATE_METHOD),
                name: model.name,
            }));

            match page.next_page_token.filter(|token| !token.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(models)
    }

    async fn validate(&self) -> Result<(), ConfigError> {
        let available = self
            .list_models()
            .await
            .map_err(|e| unreachable(&self.base_url, e))?;
        resolve_model(&self.model, &available)
    }

    fn provider_name(&self) -> &str {
        "gemini"
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
