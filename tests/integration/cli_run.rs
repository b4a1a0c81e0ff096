//! Integration tests for CLI command dispatch

use crate::integration::test_utils::StubClient;
use async_trait::async_trait;
use clap::Parser;
use std::sync::Arc;
use summa::cli::{Cli, Commands, ProviderCommands, RunContext};
use summa::config::SummaConfig;
use summa::error::{ApiError, ConfigError};
use summa::provider::{
    ModelProviderClient, ProviderConfig, ProviderConnector, ProviderRegistry, ProviderType,
};
use tempfile::TempDir;

struct StubConnector;

#[async_trait]
impl ProviderConnector for StubConnector {
    async fn connect(
        &self,
        config: &ProviderConfig,
    ) -> Result<Arc<dyn ModelProviderClient>, ConfigError> {
        if config.model() == "missing" {
            return Err(ConfigError::UnknownModel {
                model: "missing".to_string(),
                available: "<none>".to_string(),
            });
        }
        Ok(Arc::new(StubClient::with_bad(&["r2"])))
    }
}

fn context() -> RunContext {
    let mut registry = ProviderRegistry::with_connector(Arc::new(StubConnector));
    registry.register("local", ProviderConfig::new(ProviderType::Ollama));
    registry.register(
        "broken",
        ProviderConfig::new(ProviderType::Ollama).with_model("missing"),
    );
    registry.set_default("local");
    RunContext::with_registry(SummaConfig::default(), registry)
}

fn write_input(dir: &TempDir) -> std::path::PathBuf {
    let path = dir.path().join("reviews.jsonl");
    let lines: Vec<String> = (0..12)
        .map(|i| format!("{{\"id\": \"r{i}\", \"text\": \"Review {i}: decent food, slow service\"}}"))
        .collect();
    std::fs::write(&path, lines.join("\n")).unwrap();
    path
}

#[test]
fn test_cli_parses_run_command() {
    let cli = Cli::try_parse_from([
        "summa", "run", "--input", "in.json", "--provider", "gemini", "--stream",
    ])
    .unwrap();
    match cli.command {
        Commands::Run {
            input,
            provider,
            output,
            stream,
        } => {
            assert_eq!(input.to_str(), Some("in.json"));
            assert_eq!(provider.as_deref(), Some("gemini"));
            assert!(output.is_none());
            assert!(stream);
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[tokio::test]
async fn test_run_writes_collected_results() {
    let dir = TempDir::new().unwrap();
    let input = write_input(&dir);
    let output = dir.path().join("out.json");

    let summary = context()
        .execute(&Commands::Run {
            input,
            provider: None,
            output: Some(output.clone()),
            stream: false,
        })
        .await
        .unwrap();

    assert!(summary.contains("Summarization run"));
    assert!(summary.contains("stub (stub-1)"));

    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
    let results = written.as_object().unwrap();
    assert_eq!(results.len(), 12);
    assert_eq!(results["r0"]["ok"], true);
    assert_eq!(results["r0"]["summary"], "Summary of item r0.");
    assert_eq!(results["r2"]["ok"], false);
}

#[tokio::test]
async fn test_run_streams_one_line_per_batch() {
    let dir = TempDir::new().unwrap();
    let input = write_input(&dir);
    let output = dir.path().join("out.jsonl");

    context()
        .execute(&Commands::Run {
            input,
            provider: Some("local".to_string()),
            output: Some(output.clone()),
            stream: true,
        })
        .await
        .unwrap();

    let text = std::fs::read_to_string(&output).unwrap();
    let lines: Vec<serde_json::Value> = text
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    // 12 items ramp as 10 + 2
    assert_eq!(lines.len(), 2);
    let total: usize = lines
        .iter()
        .map(|line| line["results"].as_object().unwrap().len())
        .sum();
    assert_eq!(total, 12);
    assert!(lines.iter().any(|line| line["progress"] == 100));
}

#[tokio::test]
async fn test_providers_list_and_check() {
    let ctx = context();

    let listing = ctx
        .execute(&Commands::Providers {
            command: ProviderCommands::List,
        })
        .await
        .unwrap();
    assert!(listing.contains("local"));
    assert!(listing.contains("not checked"));

    let checked = ctx
        .execute(&Commands::Providers {
            command: ProviderCommands::Check {
                name: "local".to_string(),
            },
        })
        .await
        .unwrap();
    assert!(checked.contains("OK"));

    let err = ctx
        .execute(&Commands::Providers {
            command: ProviderCommands::Check {
                name: "broken".to_string(),
            },
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Config(ConfigError::UnknownModel { .. })));

    let listing = ctx
        .execute(&Commands::Providers {
            command: ProviderCommands::List,
        })
        .await
        .unwrap();
    assert!(listing.contains("connected"));
    assert!(listing.contains("error: Model 'missing' not available"));
}

#[tokio::test]
async fn test_unknown_provider_is_reported() {
    let dir = TempDir::new().unwrap();
    let err = context()
        .execute(&Commands::Run {
            input: write_input(&dir),
            provider: Some("nowhere".to_string()),
            output: None,
            stream: false,
        })
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ApiError::Config(ConfigError::ProviderNotConfigured(_))
    ));
}
