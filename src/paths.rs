//! Application path management for local and installed modes.
//!
//! ## Resolution order
//!
//! - **Explicit**: the `--config` argument (or `SHADOW_CONFIG`) wins.
//! - **Local mode**: a `shadow.yaml` in the current working directory is used
//!   as is, with logs next to it.
//! - **Installed mode** (default): the config lives in the platform config
//!   directory (`~/.config/thing-shadow` on Linux) and logs in the platform
//!   data directory.

use anyhow::Context;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::AppConfig;

/// Application name used for directories in installed mode
const APP_NAME: &str = "thing-shadow";

/// Configuration file name looked up in local and installed modes
pub const CONFIG_FILE: &str = "shadow.yaml";

/// Application paths for config and logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    /// Path to the configuration file
    pub config: PathBuf,
    /// Path to the logs directory
    pub logs_dir: PathBuf,
    /// Whether files live next to the config given or found locally
    pub is_local: bool,
}

impl AppPaths {
    /// Detect the appropriate paths based on environment.
    ///
    /// Note: This is called before logging is initialized, so nothing is
    /// logged here.
    pub fn detect(explicit: Option<&str>) -> Self {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::resolve(explicit, &cwd, dirs::config_dir(), dirs::data_dir())
    }

    /// Pure resolution used by [`detect`](Self::detect)
    pub fn resolve(
        explicit: Option<&str>,
        cwd: &Path,
        config_dir: Option<PathBuf>,
        data_dir: Option<PathBuf>,
    ) -> Self {
        if let Some(path) = explicit {
            let config = cwd.join(path);
            let base = config
                .parent()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| cwd.to_path_buf());
            return Self {
                config,
                logs_dir: base.join("logs"),
                is_local: true,
            };
        }

        let cwd_config = cwd.join(CONFIG_FILE);
        if cwd_config.exists() {
            return Self {
                config: cwd_config,
                logs_dir: cwd.join("logs"),
                is_local: true,
            };
        }

        let config_base = config_dir.unwrap_or_else(|| cwd.to_path_buf()).join(APP_NAME);
        let data_base = data_dir
            .unwrap_or_else(|| config_base.clone())
            .join(APP_NAME);

        Self {
            config: config_base.join(CONFIG_FILE),
            logs_dir: data_base.join("logs"),
            is_local: false,
        }
    }

    /// Config path as the string the loaders expect
    pub fn config_str(&self) -> String {
        self.config.to_string_lossy().into_owned()
    }

    /// Ensure all required directories exist.
    ///
    /// In installed mode, also writes a default configuration if the config
    /// file doesn't exist, so that it can be watched.
    pub fn ensure_directories(&self) -> anyhow::Result<()> {
        if !self.logs_dir.exists() {
            debug!("Creating logs directory: {}", self.logs_dir.display());
            std::fs::create_dir_all(&self.logs_dir).with_context(|| {
                format!("Failed to create logs directory {}", self.logs_dir.display())
            })?;
        }

        if self.is_local {
            return Ok(());
        }

        if let Some(config_parent) = self.config.parent() {
            if !config_parent.exists() {
                debug!("Creating config directory: {}", config_parent.display());
                std::fs::create_dir_all(config_parent)?;
            }
        }

        if !self.config.exists() {
            self.write_default_config()?;
        }

        Ok(())
    }

    fn write_default_config(&self) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(&AppConfig::default())
            .context("Failed to serialize default config")?;
        std::fs::write(&self.config, yaml).with_context(|| {
            format!("Failed to write default config to {}", self.config.display())
        })?;
        info!("Default config written to {}", self.config.display());
        Ok(())
    }
}
