//! Command dispatch for one CLI invocation.

use crate::cli::input::{load_items, write_outcomes};
use crate::cli::parse::{Commands, ProviderCommands};
use crate::cli::presentation::{format_provider_status_table, format_run_summary, RunSummary};
use crate::config::{ConfigLoader, SummaConfig};
use crate::error::ApiError;
use crate::pipeline::SummaryPipeline;
use crate::provider::{ModelProviderClient, ProviderRegistry};
use crate::types::{Item, ItemId, Outcome};
use futures::StreamExt;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Configuration and provider registry for one CLI invocation.
pub struct RunContext {
    config: SummaConfig,
    registry: ProviderRegistry,
    workspace_root: PathBuf,
}

impl RunContext {
    /// Load configuration from `config_path`, or the layered sources for `workspace_root`.
    pub fn new(workspace_root: PathBuf, config_path: Option<PathBuf>) -> Result<Self, ApiError> {
        let config = match config_path {
            Some(ref path) => ConfigLoader::load_from_file(path)?,
            None => ConfigLoader::load(&workspace_root)?,
        };
        let mut registry = ProviderRegistry::new();
        registry.load_from_config(&config);
        Ok(Self {
            config,
            registry,
            workspace_root,
        })
    }

    /// Build from an already loaded config and a prepared registry.
    pub fn with_registry(config: SummaConfig, registry: ProviderRegistry) -> Self {
        Self {
            config,
            registry,
            workspace_root: PathBuf::from("."),
        }
    }

    pub fn config(&self) -> &SummaConfig {
        &self.config
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    pub async fn execute(&self, command: &Commands) -> Result<String, ApiError> {
        match command {
            Commands::Run {
                input,
                provider,
                output,
                stream,
            } => {
                self.handle_run(input, provider.as_deref(), output.as_deref(), *stream)
                    .await
            }
            Commands::Providers { command } => self.handle_providers(command).await,
        }
    }

    async fn connect(&self, provider: Option<&str>) -> Result<Arc<dyn ModelProviderClient>, ApiError> {
        let client = match provider {
            Some(name) => self.registry.connect(name).await?,
            None => self.registry.connect_default().await?,
        };
        Ok(client)
    }

    async fn handle_run(
        &self,
        input: &Path,
        provider: Option<&str>,
        output: Option<&Path>,
        stream: bool,
    ) -> Result<String, ApiError> {
        let items = load_items(input)?;
        let client = self.connect(provider).await?;
        let pipeline = SummaryPipeline::new(Arc::clone(&client), &self.config.pipeline);
        info!(items = items.len(), provider = client.provider_name(), "Run started");

        let started = Instant::now();
        let mut summary = RunSummary {
            provider: client.provider_name().to_string(),
            model: client.model_name().to_string(),
            items: items.len(),
            batches: pipeline.planner().batch_count(&items),
            ..RunSummary::default()
        };

        let mut writer: Box<dyn Write + Send> = match output {
            Some(path) => Box::new(BufWriter::new(File::create(path)?)),
            None => Box::new(std::io::stdout()),
        };

        let outcomes = if stream {
            stream_to_writer(&pipeline, &items, writer.as_mut()).await?
        } else {
            let outcomes = pipeline.run_all(&items).await?;
            write_outcomes(writer.as_mut(), &items, &outcomes)?;
            outcomes
        };
        writer.flush()?;

        summary.tally(&outcomes);
        summary.elapsed = started.elapsed();
        info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            "Run finished"
        );

        // With results on stdout the table would corrupt the JSON.
        Ok(match output {
            Some(_) => format_run_summary(&summary),
            None => String::new(),
        })
    }

    async fn handle_providers(&self, command: &ProviderCommands) -> Result<String, ApiError> {
        match command {
            ProviderCommands::List => Ok(format_provider_status_table(&self.registry.status())),
            ProviderCommands::Check { name } => {
                let client = self.registry.connect(name).await?;
                Ok(format!(
                    "Provider '{}' OK: {} model '{}' is available.",
                    name,
                    client.provider_name(),
                    client.model_name()
                ))
            }
        }
    }
}

/// One JSON line per completed batch: `{"batch": n, "progress": pct, "results": {...}}`.
async fn stream_to_writer(
    pipeline: &SummaryPipeline,
    items: &[Item],
    writer: &mut dyn Write,
) -> Result<HashMap<ItemId, Outcome>, ApiError> {
    let mut stream = pipeline.run_streaming(items)?;
    let mut collected: HashMap<ItemId, Outcome> = HashMap::with_capacity(items.len());

    while let Some(result) = stream.next().await {
        let progress = if stream.total_items() == 0 {
            100
        } else {
            stream.completed_items() * 100 / stream.total_items()
        };
        let results: serde_json::Map<String, serde_json::Value> = result
            .iter()
            .map(|(id, outcome)| {
                serde_json::to_value(outcome).map(|value| (id.to_string(), value))
            })
            .collect::<Result<_, _>>()
            .map_err(|e| ApiError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
        let line = serde_json::json!({
            "batch": result.batch_index,
            "progress": progress,
            "results": results,
        });
        writeln!(writer, "{}", line)?;
        writer.flush()?;
        collected.extend(result.into_outcomes());
    }

    Ok(collected)
}
