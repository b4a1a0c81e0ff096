//! Built-in defaults: the lowest configuration layer.

use crate::config::PipelineSettings;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError};

/// Create a Config builder with pipeline defaults applied.
pub fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default(
            "pipeline.max_batch_chars",
            PipelineSettings::DEFAULT_MAX_BATCH_CHARS as u64,
        )?
        .set_default(
            "pipeline.max_items_per_batch",
            PipelineSettings::DEFAULT_MAX_ITEMS_PER_BATCH as u64,
        )?
        .set_default("pipeline.concurrency", PipelineSettings::DEFAULT_CONCURRENCY as u64)?
        .set_default(
            "pipeline.max_summary_words",
            PipelineSettings::DEFAULT_MAX_SUMMARY_WORDS as u64,
        )?
        .set_default("pipeline.max_attempts", PipelineSettings::DEFAULT_MAX_ATTEMPTS as u64)?
        .set_default(
            "pipeline.success_threshold",
            PipelineSettings::DEFAULT_SUCCESS_THRESHOLD,
        )?
        .set_default("pipeline.backoff_base_ms", PipelineSettings::DEFAULT_BACKOFF_BASE_MS)
}
