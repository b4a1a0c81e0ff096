//! CLI output: error mapping from domain errors to stable CLI surface.

use crate::error::{ApiError, ConfigError};

/// Map domain errors to a one-line message for the terminal.
pub fn map_error(e: &ApiError) -> String {
    match e {
        ApiError::Config(ConfigError::MissingCredential(detail)) => {
            format!("{} (set the key in summa.toml or the environment)", detail)
        }
        ApiError::Config(inner) => inner.to_string(),
        other => other.to_string(),
    }
}
