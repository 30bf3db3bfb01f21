//! Hot reload of the `shadow` section
//!
//! Things seed the registry once at startup, so only the shadow settings are
//! handed back on a reload.

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::Path;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{AppConfig, ShadowConfig};

/// Delay letting editors finish writing before the file is re-read
const RELOAD_SETTLE_MS: u64 = 100;

/// Watches the config file and yields the shadow settings after each write
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
    path: String,
    changed_rx: mpsc::UnboundedReceiver<()>,
    /// A change was seen but not reloaded yet
    pending: bool,
}

impl ConfigWatcher {
    /// Load the config file and start watching it
    pub async fn new(path: String) -> Result<(Self, AppConfig)> {
        let initial = AppConfig::load(&path)
            .await
            .context("Failed to load initial config")?;

        let (changed_tx, changed_rx) = mpsc::unbounded_channel();
        // Runs on the notify thread, only signals the async side
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) if matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) => {
                let _ = changed_tx.send(());
            }
            Ok(_) => {}
            Err(e) => warn!("Config watch error: {}", e),
        })?;
        watcher
            .watch(Path::new(&path), RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch config file: {}", path))?;

        info!("Watching {} for shadow settings", path);
        Ok((
            Self {
                _watcher: watcher,
                path,
                changed_rx,
                pending: false,
            },
            initial,
        ))
    }

    /// Wait for the next valid reload
    ///
    /// Invalid files are logged and skipped. Returns `None` once the watcher
    /// has stopped. Cancel safe: a change seen by a dropped call is reloaded
    /// by the next one.
    pub async fn next_shadow_config(&mut self) -> Option<ShadowConfig> {
        loop {
            if !self.pending {
                self.changed_rx.recv().await?;
                self.pending = true;
            }
            tokio::time::sleep(Duration::from_millis(RELOAD_SETTLE_MS)).await;
            // One write often raises several events
            while self.changed_rx.try_recv().is_ok() {}
            self.pending = false;

            match AppConfig::load(&self.path).await {
                Ok(config) => {
                    debug!(shadow = ?config.shadow, "Config reloaded");
                    return Some(config.shadow);
                }
                Err(e) => warn!("Ignoring invalid config reload: {:#}", e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_reload_yields_shadow_section() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config_path = temp_dir.path().join("shadow.yaml");
        fs::write(&config_path, "shadow:\n  optimize: false\nthings:\n  - id: door\n")?;

        let (mut watcher, config) =
            ConfigWatcher::new(config_path.to_string_lossy().to_string()).await?;
        assert!(!config.shadow.optimize);
        assert_eq!(config.things[0].id, "door");

        tokio::time::sleep(Duration::from_millis(100)).await;
        fs::write(
            &config_path,
            "shadow:\n  optimize: true\n  optimize_timeout_ms: 200\nthings:\n  - id: door\n",
        )?;

        let reloaded =
            tokio::time::timeout(Duration::from_secs(2), watcher.next_shadow_config()).await?;
        if let Some(shadow) = reloaded {
            assert!(shadow.optimize);
            assert_eq!(shadow.optimize_timeout_ms, 200);
        }

        Ok(())
    }
}
