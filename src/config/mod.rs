//! Configuration management for Thing Shadow
//!
//! Handles loading, parsing, and hot-reloading of YAML configuration files.

pub mod watcher;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tokio::fs;

pub use watcher::ConfigWatcher;

use crate::shadow::DEFAULT_OPTIMIZE_TIMEOUT_MS;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub shadow: ShadowConfig,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub things: Vec<ThingConfig>,
}

/// Shadow engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ShadowConfig {
    /// When false the whole engine is inert
    #[serde(default = "default_true")]
    pub enable: bool,
    /// Batch rapid changes into one notification
    #[serde(default)]
    pub optimize: bool,
    /// Debounce window length; non-positive values use the default
    #[serde(default = "default_optimize_timeout")]
    pub optimize_timeout_ms: i64,
}

/// Thing declared in the configuration, used to seed the registry
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ThingConfig {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default)]
    pub private: bool,
    /// Whether applied states are accepted (actuator) or rejected (sensor)
    #[serde(default = "default_true")]
    pub writable: bool,
    #[serde(default)]
    pub state: serde_json::Value,
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            enable: true,
            optimize: false,
            optimize_timeout_ms: default_optimize_timeout(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file with validation
    pub async fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let config = Self::from_yaml(&contents)
            .with_context(|| format!("Invalid config file: {}", path))?;

        Ok(config)
    }

    /// Parse and validate configuration from YAML text
    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: AppConfig =
            serde_yaml::from_str(contents).context("Failed to parse YAML config")?;

        config.validate()?;

        Ok(config)
    }

    /// Save configuration to file
    pub async fn save(&self, path: &str) -> Result<()> {
        let yaml = serde_yaml::to_string(self).context("Failed to serialize config to YAML")?;

        fs::write(path, yaml)
            .await
            .with_context(|| format!("Failed to write config file: {}", path))?;

        Ok(())
    }

    /// Validate configuration for correctness and consistency
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        let mut domains = HashSet::new();
        let mut ungrouped = HashSet::new();

        for (idx, thing) in self.things.iter().enumerate() {
            if thing.id.is_empty() {
                anyhow::bail!("Thing {} id cannot be empty", idx);
            }
            if thing.id.contains('.') {
                anyhow::bail!("Thing '{}' id cannot contain '.'", thing.id);
            }
            if let Some(domain) = &thing.domain {
                if domain.is_empty() {
                    anyhow::bail!("Thing '{}' domain cannot be empty", thing.id);
                }
                if domain.contains('.') {
                    anyhow::bail!("Thing '{}' domain '{}' cannot contain '.'", thing.id, domain);
                }
            }

            if !seen.insert((thing.domain.as_deref(), thing.id.as_str())) {
                anyhow::bail!("Thing '{}' is declared twice", uid(thing));
            }

            // Private things never reach the shadow, so they cannot collide
            if thing.private {
                continue;
            }
            match &thing.domain {
                Some(domain) => {
                    domains.insert(domain.as_str());
                }
                None => {
                    ungrouped.insert(thing.id.as_str());
                }
            }
        }

        if let Some(name) = domains.intersection(&ungrouped).next() {
            anyhow::bail!(
                "'{}' is used both as a domain and as the id of a thing without domain",
                name
            );
        }

        Ok(())
    }
}

fn uid(thing: &ThingConfig) -> String {
    match &thing.domain {
        Some(domain) => format!("{}.{}", domain, thing.id),
        None => thing.id.clone(),
    }
}

// Default value functions
fn default_true() -> bool { true }
fn default_optimize_timeout() -> i64 { DEFAULT_OPTIMIZE_TIMEOUT_MS as i64 }
