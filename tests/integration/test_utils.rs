//! Shared test utilities for integration tests
//!
//! Centralized isolation of the process environment (XDG/HOME plus the flat
//! configuration variables) so configuration tests see only what they set.

use std::sync::Mutex;
use tempfile::TempDir;

/// Serializes environment access across all integration tests
static ENV_MUTEX: Mutex<()> = Mutex::new(());

/// Variables that feed configuration loading
const ISOLATED_VARS: &[&str] = &[
    "HOME",
    "XDG_CONFIG_HOME",
    "GEMINI_API_KEY",
    "GEMINI_MODEL",
    "OLLAMA_URL",
    "MAX_BATCH_CHARS",
    "MAX_COMMENTS_PER_BATCH",
    "SUM_CONCURRENCY",
    "SUM_MAX_WORDS",
    "SUMMA__PIPELINE__CONCURRENCY",
    "SUMMA__PIPELINE__MAX_BATCH_CHARS",
    "SUMMA__DEFAULT_PROVIDER",
];

struct EnvState(Vec<(&'static str, Option<String>)>);

impl EnvState {
    fn capture() -> Self {
        Self(
            ISOLATED_VARS
                .iter()
                .map(|&name| (name, std::env::var(name).ok()))
                .collect(),
        )
    }

    fn restore(self) {
        for (name, value) in self.0 {
            match value {
                Some(value) => std::env::set_var(name, value),
                None => std::env::remove_var(name),
            }
        }
    }
}

/// Run `f` with an isolated XDG config home under `test_dir` and the given
/// extra variables set. The original environment is restored afterwards.
///
/// Returns the XDG config home so tests can place a global config file.
pub fn with_isolated_env<F, R>(test_dir: &TempDir, vars: &[(&str, &str)], f: F) -> R
where
    F: FnOnce(&std::path::Path) -> R,
{
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let env_state = EnvState::capture();

    let config_home = test_dir.path().join("config");
    let home = test_dir.path().join("home");
    std::fs::create_dir_all(&config_home).unwrap();
    std::fs::create_dir_all(&home).unwrap();

    for &name in ISOLATED_VARS {
        std::env::remove_var(name);
    }
    std::env::set_var("HOME", &home);
    std::env::set_var("XDG_CONFIG_HOME", &config_home);
    for (name, value) in vars {
        std::env::set_var(name, value);
    }

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| f(&config_home)));
    env_state.restore();

    match result {
        Ok(value) => value,
        Err(panic) => std::panic::resume_unwind(panic),
    }
}

/// Backend stub that answers from the ids it finds in the prompt.
///
/// Items listed in `bad` get an empty summary on every attempt. Items listed
/// in `flaky` get an empty summary on their first appearance only. When
/// `down` is set every call fails at the transport layer.
#[derive(Default)]
pub struct StubClient {
    pub bad: std::collections::HashSet<String>,
    pub flaky: std::collections::HashSet<String>,
    pub down: bool,
    seen: parking_lot::Mutex<std::collections::HashSet<String>>,
    prompts: parking_lot::Mutex<Vec<Vec<String>>>,
}

impl StubClient {
    pub fn with_bad(ids: &[&str]) -> Self {
        Self {
            bad: ids.iter().map(|id| id.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn with_flaky(ids: &[&str]) -> Self {
        Self {
            flaky: ids.iter().map(|id| id.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn unreachable() -> Self {
        Self {
            down: true,
            ..Self::default()
        }
    }

    /// Ids of every prompt sent, in call order.
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.prompts.lock().clone()
    }

    fn prompt_ids(prompt: &str) -> Vec<String> {
        prompt
            .lines()
            .filter_map(|line| line.strip_prefix("--ITEM--ID:"))
            .filter_map(|rest| rest.split("--TEXT--").next())
            .map(str::to_string)
            .collect()
    }
}

#[async_trait::async_trait]
impl summa::provider::ModelProviderClient for StubClient {
    async fn generate(&self, prompt: &str) -> Result<String, summa::error::ApiError> {
        let ids = Self::prompt_ids(prompt);
        self.prompts.lock().push(ids.clone());
        if self.down {
            return Err(summa::error::ApiError::ProviderRequestFailed(
                "Connection error: refused".to_string(),
            ));
        }

        let mut seen = self.seen.lock();
        let summaries: Vec<serde_json::Value> = ids
            .iter()
            .map(|id| {
                let first_time = seen.insert(id.clone());
                let summary = if self.bad.contains(id) || (first_time && self.flaky.contains(id)) {
                    String::new()
                } else {
                    format!("Summary of item {id}")
                };
                serde_json::json!({ "id": id, "summary": summary })
            })
            .collect();
        Ok(serde_json::to_string(&summaries).unwrap_or_default())
    }

    async fn list_models(
        &self,
    ) -> Result<Vec<summa::provider::ModelInfo>, summa::error::ApiError> {
        Ok(Vec::new())
    }

    async fn validate(&self) -> Result<(), summa::error::ConfigError> {
        Ok(())
    }

    fn provider_name(&self) -> &str {
        "stub"
    }

    fn model_name(&self) -> &str {
        "stub-1"
    }
}

/// `count` items with ids `c0..c{count-1}`.
pub fn numbered_items(count: usize) -> Vec<summa::types::Item> {
    (0..count)
        .map(|i| summa::types::Item::new(format!("c{i}"), format!("Comment number {i} about the food")))
        .collect()
}
