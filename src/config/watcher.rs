//! Configuration file watcher for hot reload.
//!
//! The parent directory is watched rather than the file itself, so editors
//! that save by renaming a temp file over the existing one are still picked up.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::parse_config;
use crate::config::schema::GatewayConfig;

/// Watches one gateway config file and emits every valid new version.
pub struct ConfigWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<GatewayConfig>,
}

impl ConfigWatcher {
    /// Returns the watcher and a receiver for validated configuration updates.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<GatewayConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        let watcher = Self {
            path: path.to_path_buf(),
            update_tx,
        };
        (watcher, update_rx)
    }

    /// Start watching. The returned watcher must be kept alive.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let Self { path, update_tx } = self;
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let file_name = path.file_name().map(|n| n.to_os_string());
        // Identical saves must not trigger an adapter reload.
        let mut last_applied = std::fs::read_to_string(&path).ok();

        let watched = path.clone();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                let event = match res {
                    Ok(event) => event,
                    Err(e) => {
                        tracing::error!(error = %e, "Config watch error");
                        return;
                    }
                };
                if !(event.kind.is_modify() || event.kind.is_create()) {
                    return;
                }
                let touches_config = event
                    .paths
                    .iter()
                    .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
                if !touches_config {
                    return;
                }

                let content = match std::fs::read_to_string(&watched) {
                    Ok(content) => content,
                    Err(e) => {
                        tracing::warn!(path = ?watched, error = %e, "Config file unreadable, will retry on next change");
                        return;
                    }
                };
                if last_applied.as_deref() == Some(content.as_str()) {
                    return;
                }

                match parse_config(&content) {
                    Ok(config) => {
                        tracing::info!(
                            path = ?watched,
                            adapters = config.adapters.len(),
                            "Config file changed, applying"
                        );
                        last_applied = Some(content);
                        let _ = update_tx.send(config);
                    }
                    Err(e) => {
                        tracing::error!(
                            path = ?watched,
                            error = %e,
                            "Rejected config change, keeping current configuration"
                        );
                    }
                }
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?path, "Config watcher started");
        Ok(watcher)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = r#"
[[adapters]]
name = "faq"
source = { type = "static" }
"#;

    #[tokio::test]
    async fn test_emits_new_valid_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gateway.toml");
        std::fs::write(&path, BASE).unwrap();

        let (watcher, mut updates) = ConfigWatcher::new(&path);
        let _guard = watcher.run().unwrap();

        std::fs::write(&path, "[fault_tolerance.execution]\nmax_concurrent_adapters = 0\n").unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        std::fs::write(&path, format!("{BASE}\n[[adapters]]\nname = \"docs\"\nsource = {{ type = \"static\" }}\n"))
            .unwrap();

        // A truncating write can surface an intermediate empty file first.
        let wait = async {
            while let Some(config) = updates.recv().await {
                if config.adapters.len() == 2 {
                    return config;
                }
            }
            panic!("watcher stopped");
        };
        let config = tokio::time::timeout(Duration::from_secs(10), wait)
            .await
            .expect("config update");
        assert_eq!(config.adapters[1].name, "docs");
    }
}
