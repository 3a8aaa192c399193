//! Configuration file watcher for hot reload.
//!
//! Every change notification re-reads the file. Content identical to the
//! last version seen is dropped, so the burst of events an editor emits per
//! save yields one update. Unusable content is handed to the caller as
//! [`ConfigUpdate::Rejected`] instead of being swallowed here.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::{parse_config, ConfigError};
use crate::config::schema::ShieldConfig;

/// Result of re-reading the watched file.
#[derive(Debug)]
pub enum ConfigUpdate {
    /// New, validated configuration.
    Loaded(ShieldConfig),
    /// The file changed but cannot be used; the current configuration stays.
    Rejected(ConfigError),
}

/// Re-reads one file, remembering the last content seen.
#[derive(Debug)]
struct Reloader {
    path: PathBuf,
    last: Option<String>,
}

impl Reloader {
    /// Starts from the file's current content, so an unchanged file never
    /// produces an update.
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            last: fs::read_to_string(path).ok(),
        }
    }

    fn poll(&mut self) -> Option<ConfigUpdate> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) => return Some(ConfigUpdate::Rejected(ConfigError::Io(e))),
        };
        if self.last.as_deref() == Some(content.as_str()) {
            return None;
        }

        let update = match parse_config(&content) {
            Ok(config) => ConfigUpdate::Loaded(config),
            Err(e) => ConfigUpdate::Rejected(e),
        };
        self.last = Some(content);
        Some(update)
    }
}

/// A watcher that monitors the configuration file for changes.
pub struct ConfigWatcher {
    reloader: Reloader,
    update_tx: mpsc::UnboundedSender<ConfigUpdate>,
}

impl ConfigWatcher {
    /// Returns the watcher and a receiver for every distinct file change.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<ConfigUpdate>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        (
            Self {
                reloader: Reloader::new(path),
                update_tx,
            },
            update_rx,
        )
    }

    /// Start watching the file. The returned watcher must be kept alive.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let path = self.reloader.path.clone();
        let tx = self.update_tx;
        let mut reloader = self.reloader;

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                    if let Some(update) = reloader.poll() {
                        tracing::info!(path = ?reloader.path, "Config file changed");
                        let _ = tx.send(update);
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = ?e, "Config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?path, "Config watcher started");
        Ok(watcher)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"
        [[services]]
        name = "helius"
    "#;

    #[test]
    fn test_reloader_reports_each_distinct_change() {
        let path = std::env::temp_dir().join("provider_shield_watcher_test.toml");
        fs::write(&path, VALID).unwrap();
        let mut reloader = Reloader::new(&path);

        // Unchanged content is not an update.
        assert!(reloader.poll().is_none());

        fs::write(&path, "[[services]]\nname = \"helius\"\nfallback = \"helius\"\n").unwrap();
        match reloader.poll() {
            Some(ConfigUpdate::Rejected(ConfigError::Validation(errors))) => {
                assert!(errors[0].message.contains("itself"));
            }
            other => panic!("expected a rejected update, got {:?}", other),
        }
        // The same broken content is reported once.
        assert!(reloader.poll().is_none());

        fs::write(&path, "[[services]]\nname = \"solscan\"\n").unwrap();
        match reloader.poll() {
            Some(ConfigUpdate::Loaded(config)) => assert_eq!(config.services[0].name, "solscan"),
            other => panic!("expected a loaded update, got {:?}", other),
        }

        fs::remove_file(&path).unwrap_or_default();
        assert!(matches!(
            reloader.poll(),
            Some(ConfigUpdate::Rejected(ConfigError::Io(_)))
        ));
    }
}
