//! Explicit backend registry.
//!
//! Created once at process start from configuration. Backends are connected
//! (constructed and validated) on first use and cached for later runs.
//! Construction failures are remembered per backend for status reporting.

use super::{ModelProviderClient, ProviderConfig, ProviderFactory, ProviderType};
use crate::config::SummaConfig;
use crate::error::ConfigError;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Turns a provider configuration into a validated client.
#[async_trait]
pub trait ProviderConnector: Send + Sync {
    async fn connect(&self, config: &ProviderConfig)
        -> Result<Arc<dyn ModelProviderClient>, ConfigError>;
}

/// Connects over HTTP via [`ProviderFactory::connect`].
pub struct HttpConnector;

#[async_trait]
impl ProviderConnector for HttpConnector {
    async fn connect(
        &self,
        config: &ProviderConfig,
    ) -> Result<Arc<dyn ModelProviderClient>, ConfigError> {
        ProviderFactory::connect(config).await
    }
}

/// One row of [`ProviderRegistry::status`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderStatus {
    pub name: String,
    pub provider_type: ProviderType,
    pub model: String,
    pub is_default: bool,
    pub connected: bool,
    pub last_error: Option<String>,
}

pub struct ProviderRegistry {
    providers: HashMap<String, ProviderConfig>,
    default_provider: Option<String>,
    connector: Arc<dyn ProviderConnector>,
    connected: RwLock<HashMap<String, Arc<dyn ModelProviderClient>>>,
    last_errors: RwLock<HashMap<String, ConfigError>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::with_connector(Arc::new(HttpConnector))
    }

    pub fn with_connector(connector: Arc<dyn ProviderConnector>) -> Self {
        Self {
            providers: HashMap::new(),
            default_provider: None,
            connector,
            connected: RwLock::new(HashMap::new()),
            last_errors: RwLock::new(HashMap::new()),
        }
    }

    /// Register every configured provider and the default selection.
    pub fn load_from_config(&mut self, config: &SummaConfig) {
        for (name, provider_config) in &config.providers {
            self.register(name.clone(), provider_config.clone());
        }
        if let Some(default) = &config.default_provider {
            self.default_provider = Some(default.clone());
        }
    }

    /// Add or replace a provider configuration. Replacing drops any cached client.
    pub fn register(&mut self, name: impl Into<String>, mut config: ProviderConfig) {
        let name = name.into();
        if config.provider_name.is_none() {
            config.provider_name = Some(name.clone());
        }
        self.evict(&name);
        self.providers.insert(name, config);
    }

    pub fn set_default(&mut self, name: impl Into<String>) {
        self.default_provider = Some(name.into());
    }

    /// Explicit default, or the only registered provider.
    pub fn default_name(&self) -> Option<&str> {
        if let Some(name) = &self.default_provider {
            return Some(name.as_str());
        }
        if self.providers.len() == 1 {
            return self.providers.keys().next().map(String::as_str);
        }
        None
    }

    pub fn get(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.get(name)
    }

    pub fn get_or_error(&self, name: &str) -> Result<&ProviderConfig, ConfigError> {
        self.get(name)
            .ok_or_else(|| ConfigError::ProviderNotConfigured(name.to_string()))
    }

    /// Registered provider names, sorted.
    pub fn list_all(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Cached client for `name`, connecting on first use.
    pub async fn connect(&self, name: &str) -> Result<Arc<dyn ModelProviderClient>, ConfigError> {
        if let Some(client) = self.connected.read().get(name) {
            return Ok(Arc::clone(client));
        }

        let config = self.get_or_error(name)?.clone();
        match self.connector.connect(&config).await {
            Ok(client) => {
                info!(provider = name, model = client.model_name(), "Provider connected");
                self.last_errors.write().remove(name);
                let mut connected = self.connected.write();
                let cached = connected
                    .entry(name.to_string())
                    .or_insert_with(|| Arc::clone(&client));
                Ok(Arc::clone(cached))
            }
            Err(err) => {
                warn!(provider = name, error = %err, "Provider connection failed");
                self.last_errors.write().insert(name.to_string(), err.clone());
                Err(err)
            }
        }
    }

    pub async fn connect_default(&self) -> Result<Arc<dyn ModelProviderClient>, ConfigError> {
        let name = self.default_name().ok_or_else(|| {
            ConfigError::ProviderNotConfigured(
                "no default provider (set default_provider or register exactly one)".to_string(),
            )
        })?;
        let name = name.to_string();
        self.connect(&name).await
    }

    /// Drop the cached client so the next `connect` reconstructs and revalidates.
    pub fn evict(&self, name: &str) -> bool {
        self.last_errors.write().remove(name);
        self.connected.write().remove(name).is_some()
    }

    pub fn is_connected(&self, name: &str) -> bool {
        self.connected.read().contains_key(name)
    }

    /// Connection state and last construction error of every provider, sorted by name.
    pub fn status(&self) -> Vec<ProviderStatus> {
        let connected = self.connected.read();
        let last_errors = self.last_errors.read();
        let default_name = self.default_name();
        self.list_all()
            .into_iter()
            .filter_map(|name| {
                self.providers.get(name).map(|config| ProviderStatus {
                    name: name.to_string(),
                    provider_type: config.provider_type,
                    model: config.model().to_string(),
                    is_default: default_name == Some(name),
                    connected: connected.contains_key(name),
                    last_error: last_errors.get(name).map(ToString::to_string),
                })
            })
            .collect()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}
