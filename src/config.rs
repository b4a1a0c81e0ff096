//! Configuration System
//!
//! Layered configuration for the pipeline, its backends and logging.
//! Precedence, lowest to highest: built-in defaults, the global file
//! (`$XDG_CONFIG_HOME/summa/config.toml`), the workspace file
//! (`<workspace>/summa.toml`), `SUMMA__SECTION__KEY` environment variables,
//! then the flat legacy variables (`MAX_BATCH_CHARS`, `GEMINI_API_KEY`, ...).

use crate::error::ConfigError;
use crate::logging::LoggingConfig;
use crate::planner::RampPolicy;
use crate::provider::gemini;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub use crate::provider::{ProviderConfig, ProviderType};

mod merge;
mod sources;

/// Name of the built-in cloud provider entry.
pub const GEMINI_PROVIDER: &str = "gemini";
/// Name of the built-in local provider entry.
pub const OLLAMA_PROVIDER: &str = "ollama";

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SummaConfig {
    /// Batching, retry and quality settings
    #[serde(default)]
    pub pipeline: PipelineSettings,

    /// Backend configurations by name
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    /// Backend used when none is named explicitly
    #[serde(default)]
    pub default_provider: Option<String>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Pipeline tuning knobs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub max_batch_chars: usize,
    pub max_items_per_batch: usize,
    /// Batches in flight at once
    pub concurrency: usize,
    pub max_summary_words: usize,
    pub max_attempts: u32,
    /// Fraction of a batch that must succeed before it stops retrying
    pub success_threshold: f64,
    /// Backoff before retry n (0-based) is `backoff_base_ms * 2^n`
    pub backoff_base_ms: u64,
    /// Prompt framing cost charged per item against `max_batch_chars`
    pub item_overhead_chars: usize,
    pub min_summary_chars: usize,
    pub ramp: RampPolicy,
}

impl PipelineSettings {
    pub const DEFAULT_MAX_BATCH_CHARS: usize = 18_000;
    pub const DEFAULT_MAX_ITEMS_PER_BATCH: usize = 200;
    pub const DEFAULT_CONCURRENCY: usize = 3;
    pub const DEFAULT_MAX_SUMMARY_WORDS: usize = 20;
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
    pub const DEFAULT_SUCCESS_THRESHOLD: f64 = 0.9;
    pub const DEFAULT_BACKOFF_BASE_MS: u64 = 1_000;
    pub const DEFAULT_ITEM_OVERHEAD_CHARS: usize = 64;
    pub const DEFAULT_MIN_SUMMARY_CHARS: usize = 5;

    /// Validate settings; violations are fatal.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("max_batch_chars", self.max_batch_chars),
            ("max_items_per_batch", self.max_items_per_batch),
            ("concurrency", self.concurrency),
            ("max_summary_words", self.max_summary_words),
            ("max_attempts", self.max_attempts as usize),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(ConfigError::InvalidSetting(format!(
                    "pipeline.{} must be greater than zero",
                    name
                )));
            }
        }

        if !(self.success_threshold > 0.0 && self.success_threshold <= 1.0) {
            return Err(ConfigError::InvalidSetting(format!(
                "pipeline.success_threshold must be in (0, 1], got {}",
                self.success_threshold
            )));
        }

        self.ramp
            .validate()
            .map_err(|e| ConfigError::InvalidSetting(format!("pipeline.{}", e)))
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_batch_chars: Self::DEFAULT_MAX_BATCH_CHARS,
            max_items_per_batch: Self::DEFAULT_MAX_ITEMS_PER_BATCH,
            concurrency: Self::DEFAULT_CONCURRENCY,
            max_summary_words: Self::DEFAULT_MAX_SUMMARY_WORDS,
            max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
            success_threshold: Self::DEFAULT_SUCCESS_THRESHOLD,
            backoff_base_ms: Self::DEFAULT_BACKOFF_BASE_MS,
            item_overhead_chars: Self::DEFAULT_ITEM_OVERHEAD_CHARS,
            min_summary_chars: Self::DEFAULT_MIN_SUMMARY_CHARS,
            ramp: RampPolicy::default(),
        }
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    Provider(String, String),
    Pipeline(String),
    Default(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Provider(name, msg) => write!(f, "Provider '{}': {}", name, msg),
            ValidationError::Pipeline(msg) => write!(f, "Pipeline: {}", msg),
            ValidationError::Default(msg) => write!(f, "Default provider: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl SummaConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        for (name, provider) in &self.providers {
            if let Err(e) = provider.validate() {
                errors.push(ValidationError::Provider(name.clone(), e));
            }
        }

        if let Err(e) = self.pipeline.validate() {
            errors.push(ValidationError::Pipeline(e.to_string()));
        }

        if let Some(default) = &self.default_provider {
            if !self.providers.contains_key(default) {
                errors.push(ValidationError::Default(format!(
                    "'{}' is not a configured provider",
                    default
                )));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate and fold all errors into one `ConfigError`.
    pub fn ensure_valid(&self) -> Result<(), ConfigError> {
        self.validate().map_err(|errors| {
            let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
            ConfigError::InvalidSetting(format!(
                "Configuration validation failed:\n{}",
                messages.join("\n")
            ))
        })
    }

    /// Add the built-in `gemini` and `ollama` entries when absent.
    fn with_builtin_providers(mut self) -> Self {
        self.providers
            .entry(GEMINI_PROVIDER.to_string())
            .or_insert_with(|| ProviderConfig::new(ProviderType::Gemini));
        self.providers
            .entry(OLLAMA_PROVIDER.to_string())
            .or_insert_with(|| ProviderConfig::new(ProviderType::Ollama));
        self
    }

    /// Cloud backend when it has credentials, local backend otherwise.
    fn with_resolved_default(mut self) -> Self {
        if self.default_provider.is_none() {
            let gemini_ready = self
                .providers
                .get(GEMINI_PROVIDER)
                .map(|p| p.api_key.as_deref().is_some_and(|k| !k.trim().is_empty()))
                .unwrap_or(false);
            self.default_provider = Some(
                if gemini_ready {
                    GEMINI_PROVIDER
                } else {
                    OLLAMA_PROVIDER
                }
                .to_string(),
            );
        }
        self
    }
}

/// Flat variable names recognised for compatibility with existing deployments.
const FLAT_ENV_VARS: &[&str] = &[
    "MAX_BATCH_CHARS",
    "MAX_COMMENTS_PER_BATCH",
    "SUM_CONCURRENCY",
    "SUM_MAX_WORDS",
    "GEMINI_MODEL",
    gemini::API_KEY_ENV,
    "OLLAMA_URL",
];

/// Loads [`SummaConfig`] from all layers.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration for `workspace_root`.
    pub fn load(workspace_root: &Path) -> Result<SummaConfig, ConfigError> {
        let builder = merge::builder_with_defaults()?;
        let builder = sources::global_file::add_to_builder(builder)?;
        let builder = sources::workspace_file::add_to_builder(builder, workspace_root)?;
        let builder = sources::environment::add_to_builder(builder);

        let config: SummaConfig = builder.build()?.try_deserialize()?;
        Self::finish(config, |name| std::env::var(name).ok())
    }

    /// Load a single TOML file over the built-in defaults; no environment layers.
    pub fn load_from_file(path: &Path) -> Result<SummaConfig, ConfigError> {
        let builder = merge::builder_with_defaults()?
            .add_source(config::File::from(path.to_path_buf()).required(true));
        let config: SummaConfig = builder.build()?.try_deserialize()?;
        Self::finish(config, |_| None)
    }

    /// Global config file path, when a home or XDG directory is known.
    pub fn xdg_config_path() -> Option<PathBuf> {
        sources::global_file::global_config_path()
    }

    /// Workspace config file path.
    pub fn workspace_config_path(workspace_root: &Path) -> PathBuf {
        sources::workspace_file::workspace_config_path(workspace_root)
    }

    fn finish(
        config: SummaConfig,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<SummaConfig, ConfigError> {
        let mut config = config.with_builtin_providers();
        apply_flat_env(&mut config, lookup)?;
        let config = config.with_resolved_default();
        config.ensure_valid()?;
        Ok(config)
    }
}

/// Apply the flat variables. Unparseable numbers are configuration errors.
pub fn apply_flat_env(
    config: &mut SummaConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(), ConfigError> {
    for &name in FLAT_ENV_VARS {
        let Some(raw) = lookup(name) else { continue };
        // Some editors prepend a byte-order mark to the first line of .env files.
        let value = raw.trim_start_matches('\u{feff}').trim().to_string();
        if value.is_empty() {
            continue;
        }
        let pipeline = &mut config.pipeline;
        match name {
            "MAX_BATCH_CHARS" => pipeline.max_batch_chars = parse_count(name, &value)?,
            "MAX_COMMENTS_PER_BATCH" => pipeline.max_items_per_batch = parse_count(name, &value)?,
            "SUM_CONCURRENCY" => pipeline.concurrency = parse_count(name, &value)?,
            "SUM_MAX_WORDS" => pipeline.max_summary_words = parse_count(name, &value)?,
            "GEMINI_MODEL" => provider_entry(config, GEMINI_PROVIDER).model = Some(value),
            "OLLAMA_URL" => provider_entry(config, OLLAMA_PROVIDER).endpoint = Some(value),
            _ => provider_entry(config, GEMINI_PROVIDER).api_key = Some(value),
        }
    }
    Ok(())
}

fn provider_entry<'a>(config: &'a mut SummaConfig, name: &str) -> &'a mut ProviderConfig {
    let provider_type = if name == GEMINI_PROVIDER {
        ProviderType::Gemini
    } else {
        ProviderType::Ollama
    };
    config
        .providers
        .entry(name.to_string())
        .or_insert_with(|| ProviderConfig::new(provider_type))
}

fn parse_count(name: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| {
        ConfigError::InvalidSetting(format!("{} must be a non-negative integer, got '{}'", name, value))
    })
}
