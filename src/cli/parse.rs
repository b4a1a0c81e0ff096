//! CLI parse: clap types for summa. No behavior; definitions only.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// summa - batch summarization of short texts with an LLM backend
#[derive(Parser, Debug)]
#[command(name = "summa")]
#[command(about = "Summarize batches of short texts with a cloud or local LLM backend")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root directory (holds summa.toml)
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, short)]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file)
    #[arg(long)]
    pub log_output: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Summarize items from a JSON array or JSON Lines file
    Run {
        /// Input file: [{"id": ..., "text": ...}] (.json) or one object per line (.jsonl)
        #[arg(long)]
        input: PathBuf,

        /// Provider name (defaults to the configured default provider)
        #[arg(long)]
        provider: Option<String>,

        /// Write results here instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,

        /// Emit one JSON line per batch as batches complete
        #[arg(long)]
        stream: bool,
    },
    /// Inspect configured providers
    Providers {
        #[command(subcommand)]
        command: ProviderCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum ProviderCommands {
    /// List configured providers
    List,
    /// Connect to a provider and validate its model
    Check {
        /// Provider name
        name: String,
    },
}
