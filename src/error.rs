//! Error types for the summarization pipeline.

use crate::types::ItemId;
use thiserror::Error;

/// Length of the raw-text prefix kept on a [`ParseError`].
pub const PARSE_ERROR_PREFIX_CHARS: usize = 100;

/// Fatal construction-time errors. Never retried.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing credential: {0}")]
    MissingCredential(String),

    #[error("Model '{model}' not available. Available: {available}")]
    UnknownModel { model: String, available: String },

    #[error("Model '{0}' does not support content generation")]
    UnsupportedModel(String),

    #[error("Backend unreachable at {endpoint}: {reason}")]
    Unreachable { endpoint: String, reason: String },

    #[error("Invalid setting: {0}")]
    InvalidSetting(String),

    #[error("Provider not configured: {0}")]
    ProviderNotConfigured(String),
}

/// Backend output from which no array of entries could be recovered.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Could not parse JSON from text: {prefix}...")]
pub struct ParseError {
    pub prefix: String,
}

impl ParseError {
    pub fn from_raw(raw: &str) -> Self {
        Self {
            prefix: raw.chars().take(PARSE_ERROR_PREFIX_CHARS).collect(),
        }
    }
}

/// Crate-wide error
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Provider error: {0}")]
    ProviderError(String),

    #[error("Provider request failed: {0}")]
    ProviderRequestFailed(String),

    #[error("Provider authentication failed: {0}")]
    ProviderAuthFailed(String),

    #[error("Provider rate limit exceeded: {0}")]
    ProviderRateLimit(String),

    #[error("Provider model not found: {0}")]
    ProviderModelNotFound(String),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Duplicate item id in input: {0}")]
    DuplicateItem(ItemId),

    #[error("Invariant violated: {0}")]
    InvariantViolation(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ApiError {
    /// Per-call failures the batch processor may retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ApiError::ProviderError(_)
                | ApiError::ProviderRequestFailed(_)
                | ApiError::ProviderRateLimit(_)
                | ApiError::Parse(_)
        )
    }
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::InvalidSetting(err.to_string())
    }
}

impl From<config::ConfigError> for ApiError {
    fn from(err: config::ConfigError) -> Self {
        ApiError::Config(ConfigError::InvalidSetting(err.to_string()))
    }
}
