//! Logging System
//!
//! Structured logging with `tracing`. Level, format and destination come from
//! configuration, overridden by `SUMMA_LOG`, `SUMMA_LOG_MODULES`,
//! `SUMMA_LOG_FORMAT` and `SUMMA_LOG_OUTPUT`.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

pub const LOG_ENV: &str = "SUMMA_LOG";
pub const LOG_MODULES_ENV: &str = "SUMMA_LOG_MODULES";
pub const LOG_FORMAT_ENV: &str = "SUMMA_LOG_FORMAT";
pub const LOG_OUTPUT_ENV: &str = "SUMMA_LOG_OUTPUT";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(ConfigError::InvalidSetting(format!(
                "Invalid log format: {} (must be 'json' or 'text')",
                other
            ))),
        }
    }
}

/// Where log lines go. Stdout is reserved for command output by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    Stdout,
    Stderr,
    File,
}

impl FromStr for LogOutput {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stdout" => Ok(LogOutput::Stdout),
            "stderr" => Ok(LogOutput::Stderr),
            "file" => Ok(LogOutput::File),
            other => Err(ConfigError::InvalidSetting(format!(
                "Invalid log output: {} (must be 'stdout', 'stderr' or 'file')",
                other
            ))),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// trace, debug, info, warn, error, off
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_format")]
    pub format: LogFormat,

    #[serde(default = "default_output")]
    pub output: LogOutput,

    /// Used when `output = "file"`
    #[serde(default = "default_log_file")]
    pub file: PathBuf,

    /// ANSI colors for text output to a terminal
    #[serde(default = "default_true")]
    pub color: bool,

    /// Per-module levels, e.g. `summa::processor = "debug"`
    #[serde(default)]
    pub modules: BTreeMap<String, String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_format() -> LogFormat {
    LogFormat::Text
}

fn default_output() -> LogOutput {
    LogOutput::Stderr
}

fn default_log_file() -> PathBuf {
    PathBuf::from("summa.log")
}

fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_format(),
            output: default_output(),
            file: default_log_file(),
            color: default_true(),
            modules: BTreeMap::new(),
        }
    }
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Install the global subscriber.
///
/// Priority (highest first): environment variables, `config`, defaults.
/// Fails if a subscriber is already installed.
pub fn init_logging(config: Option<&LoggingConfig>) -> Result<(), ConfigError> {
    let defaults = LoggingConfig::default();
    let config = config.unwrap_or(&defaults);

    let filter = build_env_filter(
        config,
        std::env::var(LOG_ENV).ok().as_deref(),
        std::env::var(LOG_MODULES_ENV).ok().as_deref(),
    )?;
    let format = match std::env::var(LOG_FORMAT_ENV) {
        Ok(value) => value.parse()?,
        Err(_) => config.format,
    };
    let output = match std::env::var(LOG_OUTPUT_ENV) {
        Ok(value) => value.parse()?,
        Err(_) => config.output,
    };

    let layer = build_layer(format, output, config.color, &config.file)?;
    Registry::default()
        .with(layer.with_filter(filter))
        .try_init()
        .map_err(|e| ConfigError::InvalidSetting(format!("Logging already initialized: {}", e)))
}

fn build_layer(
    format: LogFormat,
    output: LogOutput,
    color: bool,
    file: &Path,
) -> Result<BoxedLayer, ConfigError> {
    let base = fmt::layer()
        .with_target(true)
        .with_timer(ChronoUtc::rfc_3339());

    let layer: BoxedLayer = match (format, output) {
        (LogFormat::Json, LogOutput::Stdout) => base.json().with_writer(std::io::stdout).boxed(),
        (LogFormat::Json, LogOutput::Stderr) => base.json().with_writer(std::io::stderr).boxed(),
        (LogFormat::Json, LogOutput::File) => {
            let writer = open_log_file(file)?;
            base.json().with_writer(writer).boxed()
        }
        (LogFormat::Text, LogOutput::Stdout) => {
            base.with_ansi(color).with_writer(std::io::stdout).boxed()
        }
        (LogFormat::Text, LogOutput::Stderr) => {
            base.with_ansi(color).with_writer(std::io::stderr).boxed()
        }
        (LogFormat::Text, LogOutput::File) => {
            let writer = open_log_file(file)?;
            base.with_ansi(false).with_writer(writer).boxed()
        }
    };
    Ok(layer)
}

fn open_log_file(path: &Path) -> Result<std::sync::Mutex<std::fs::File>, ConfigError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| {
            ConfigError::InvalidSetting(format!("Failed to create log directory: {}", e))
        })?;
    }
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| {
            ConfigError::InvalidSetting(format!("Failed to open log file {:?}: {}", path, e))
        })?;
    Ok(std::sync::Mutex::new(file))
}

/// `env_filter` (SUMMA_LOG) wins outright; otherwise the configured level plus
/// module directives from config and `env_modules` (`module=level,...`).
fn build_env_filter(
    config: &LoggingConfig,
    env_filter: Option<&str>,
    env_modules: Option<&str>,
) -> Result<EnvFilter, ConfigError> {
    if let Some(directives) = env_filter.filter(|d| !d.trim().is_empty()) {
        return EnvFilter::try_new(directives)
            .map_err(|e| ConfigError::InvalidSetting(format!("Invalid {}: {}", LOG_ENV, e)));
    }

    if config.level == "off" {
        return Ok(EnvFilter::new("off"));
    }

    let mut filter = EnvFilter::try_new(&config.level)
        .map_err(|e| ConfigError::InvalidSetting(format!("Invalid log level: {}", e)))?;

    let env_pairs = env_modules
        .into_iter()
        .flat_map(|spec| spec.split(','))
        .filter_map(|pair| pair.split_once('='));
    let config_pairs = config
        .modules
        .iter()
        .map(|(module, level)| (module.as_str(), level.as_str()));

    for (module, level) in config_pairs.chain(env_pairs) {
        let directive = format!("{}={}", module.trim(), level.trim());
        filter = filter.add_directive(directive.parse().map_err(|e| {
            ConfigError::InvalidSetting(format!("Invalid log directive '{}': {}", directive, e))
        })?);
    }

    Ok(filter)
}
