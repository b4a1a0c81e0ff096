//! Model Provider Abstraction
//!
//! Text-generation backends used by the batch processor. A backend turns one
//! prompt into one blob of text; batching is logical and happens above this
//! layer. Two variants exist: a cloud client (Gemini) and a local inference
//! server client (Ollama). Both validate their configured model at
//! construction and refuse to start if it is unavailable.

use crate::error::{ApiError, ConfigError};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

pub mod gemini;
pub mod ollama;
pub mod registry;

pub use gemini::GeminiClient;
pub use ollama::OllamaClient;
pub use registry::{ProviderConnector, ProviderRegistry, ProviderStatus};

/// Backend kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    Gemini,
    Ollama,
}

impl ProviderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderType::Gemini => "gemini",
            ProviderType::Ollama => "ollama",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderType::Gemini => gemini::DEFAULT_MODEL,
            ProviderType::Ollama => ollama::DEFAULT_MODEL,
        }
    }

    pub fn default_endpoint(&self) -> &'static str {
        match self {
            ProviderType::Gemini => gemini::DEFAULT_ENDPOINT,
            ProviderType::Ollama => ollama::DEFAULT_ENDPOINT,
        }
    }

    pub fn default_timeout(&self) -> Duration {
        match self {
            ProviderType::Gemini => PROVIDER_HTTP_REQUEST_TIMEOUT,
            ProviderType::Ollama => ollama::DEFAULT_TIMEOUT,
        }
    }
}

impl std::fmt::Display for ProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sampling options sent with each generation call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionOptions {
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl CompletionOptions {
    /// Fill unset fields from `defaults`.
    pub fn or(self, defaults: &CompletionOptions) -> Self {
        Self {
            temperature: self.temperature.or(defaults.temperature),
            top_p: self.top_p.or(defaults.top_p),
            max_tokens: self.max_tokens.or(defaults.max_tokens),
        }
    }
}

/// Provider configuration as read from config files and environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub provider_name: Option<String>,
    pub provider_type: ProviderType,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub options: CompletionOptions,
}

impl ProviderConfig {
    pub fn new(provider_type: ProviderType) -> Self {
        Self {
            provider_name: None,
            provider_type,
            model: None,
            api_key: None,
            endpoint: None,
            timeout_secs: None,
            options: CompletionOptions::default(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = Some(timeout.as_secs().max(1));
        self
    }

    pub fn model(&self) -> &str {
        self.model
            .as_deref()
            .unwrap_or_else(|| self.provider_type.default_model())
    }

    pub fn endpoint(&self) -> &str {
        self.endpoint
            .as_deref()
            .unwrap_or_else(|| self.provider_type.default_endpoint())
            .trim_end_matches('/')
    }

    pub fn timeout(&self) -> Duration {
        self.timeout_secs
            .map(Duration::from_secs)
            .unwrap_or_else(|| self.provider_type.default_timeout())
    }

    /// Configured options over the backend's own defaults.
    pub fn completion_options(&self) -> CompletionOptions {
        let defaults = match self.provider_type {
            ProviderType::Gemini => CompletionOptions::default(),
            ProviderType::Ollama => ollama::default_options(),
        };
        self.options.clone().or(&defaults)
    }

    /// Structural validation; credentials and model availability are checked at connect time.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(model) = &self.model {
            if model.trim().is_empty() {
                return Err("Model name cannot be empty".to_string());
            }
        }
        if let Some(endpoint) = &self.endpoint {
            if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
                return Err(format!(
                    "Endpoint must start with http:// or https://, got '{}'",
                    endpoint
                ));
            }
        }
        if self.timeout_secs == Some(0) {
            return Err("timeout_secs must be greater than zero".to_string());
        }
        Ok(())
    }
}

/// A model as reported by a backend's listing endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub supports_generation: bool,
}

/// Text-generation backend
#[async_trait]
pub trait ModelProviderClient: Send + Sync {
    /// Turn one prompt into raw text. Per-call failures are transient.
    async fn generate(&self, prompt: &str) -> Result<String, ApiError>;

    /// Models the backend currently serves.
    async fn list_models(&self) -> Result<Vec<ModelInfo>, ApiError>;

    /// Confirm the configured model is served and can generate content.
    async fn validate(&self) -> Result<(), ConfigError>;

    fn provider_name(&self) -> &str;

    fn model_name(&self) -> &str;
}

/// Exact-match model resolution. No substitution of a "close enough" model.
pub(crate) fn resolve_model(configured: &str, available: &[ModelInfo]) -> Result<(), ConfigError> {
    let wanted = strip_model_prefix(configured);
    match available
        .iter()
        .find(|model| strip_model_prefix(&model.name) == wanted)
    {
        Some(model) if model.supports_generation => Ok(()),
        Some(_) => Err(ConfigError::UnsupportedModel(configured.to_string())),
        None => {
            let names: Vec<&str> = available.iter().map(|m| m.name.as_str()).collect();
            Err(ConfigError::UnknownModel {
                model: configured.to_string(),
                available: if names.is_empty() {
                    "<none>".to_string()
                } else {
                    names.join(", ")
                },
            })
        }
    }
}

fn strip_model_prefix(name: &str) -> &str {
    name.strip_prefix("models/").unwrap_or(name)
}

/// Map a reqwest transport error onto the provider taxonomy.
pub(crate) fn map_http_error(error: reqwest::Error) -> ApiError {
    if let Some(status) = error.status() {
        return map_status(status, &error.to_string());
    }
    if error.is_timeout() {
        ApiError::ProviderRequestFailed(format!("Request timeout: {}", error))
    } else if error.is_connect() {
        ApiError::ProviderRequestFailed(format!("Connection error: {}", error))
    } else {
        ApiError::ProviderError(format!("HTTP error: {}", error))
    }
}

pub(crate) fn map_status(status: StatusCode, body: &str) -> ApiError {
    match status.as_u16() {
        401 | 403 => ApiError::ProviderAuthFailed(format!("Authentication failed: {}", body)),
        429 => ApiError::ProviderRateLimit(format!("Rate limit exceeded: {}", body)),
        404 => ApiError::ProviderModelNotFound(format!("Model not found: {}", body)),
        _ => ApiError::ProviderRequestFailed(format!(
            "Request failed with status {}: {}",
            status, body
        )),
    }
}

/// Turn a non-2xx response into an error, reading its body for context.
pub(crate) async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let error_text = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    Err(map_status(status, &error_text))
}

/// Connection failures during validation are configuration errors, not transient ones.
pub(crate) fn unreachable(endpoint: &str, error: ApiError) -> ConfigError {
    match error {
        ApiError::ProviderAuthFailed(reason) => ConfigError::MissingCredential(reason),
        other => ConfigError::Unreachable {
            endpoint: endpoint.to_string(),
            reason: other.to_string(),
        },
    }
}

const PROVIDER_HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const PROVIDER_HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

pub(crate) fn build_provider_http_client(timeout: Duration) -> Result<Client, ConfigError> {
    Client::builder()
        .no_proxy()
        .connect_timeout(PROVIDER_HTTP_CONNECT_TIMEOUT.min(timeout))
        .timeout(timeout)
        .build()
        .map_err(|e| ConfigError::InvalidSetting(format!("Failed to create HTTP client: {}", e)))
}

/// Builds validated backend clients from configuration
pub struct ProviderFactory;

impl ProviderFactory {
    /// Construct the client without contacting the backend.
    pub fn create_client(config: &ProviderConfig) -> Result<Arc<dyn ModelProviderClient>, ConfigError> {
        config.validate().map_err(ConfigError::InvalidSetting)?;
        match config.provider_type {
            ProviderType::Gemini => Ok(Arc::new(GeminiClient::new(config)?)),
            ProviderType::Ollama => Ok(Arc::new(OllamaClient::new(config)?)),
        }
    }

    /// Construct and validate. Fails fast on credential, model or endpoint problems.
    pub async fn connect(config: &ProviderConfig) -> Result<Arc<dyn ModelProviderClient>, ConfigError> {
        let client = Self::create_client(config)?;
        client.validate().await?;
        tracing::info!(
            provider = client.provider_name(),
            model = client.model_name(),
            "Provider validated"
        );
        Ok(client)
    }
}
