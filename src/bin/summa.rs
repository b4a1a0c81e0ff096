//! Summa CLI Binary
//!
//! Command-line interface for adaptive batch summarization.

use anyhow::Context;
use clap::Parser;
use std::process;
use summa::cli::{map_error, Cli, RunContext};
use summa::config::ConfigLoader;
use summa::logging::{init_logging, LogFormat, LogOutput, LoggingConfig};
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let logging_config = build_logging_config(&cli)?;
    init_logging(Some(&logging_config)).context("Failed to initialize logging")?;

    info!("Summa CLI starting");

    let context = match RunContext::new(cli.workspace.clone(), cli.config.clone()) {
        Ok(ctx) => ctx,
        Err(e) => {
            error!("Error loading configuration: {}", e);
            eprintln!("{}", map_error(&e));
            process::exit(1);
        }
    };

    match context.execute(&cli.command).await {
        Ok(output) => {
            info!("Command completed successfully");
            if !output.is_empty() {
                println!("{}", output);
            }
            Ok(())
        }
        Err(e) => {
            error!("Command failed: {}", e);
            eprintln!("{}", map_error(&e));
            process::exit(1);
        }
    }
}

/// CLI flags override the config file, which overrides defaults.
fn build_logging_config(cli: &Cli) -> anyhow::Result<LoggingConfig> {
    let loaded = match cli.config {
        Some(ref path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(&cli.workspace),
    };
    // A broken config is reported by RunContext once logging is up.
    let mut config = loaded.map(|c| c.logging).unwrap_or_default();

    if cli.verbose {
        config.level = "debug".to_string();
    }
    if let Some(ref level) = cli.log_level {
        config.level = level.clone();
    }
    if let Some(ref format) = cli.log_format {
        config.format = format.parse::<LogFormat>()?;
    }
    if let Some(ref output) = cli.log_output {
        config.output = output.parse::<LogOutput>()?;
    }
    Ok(config)
}
