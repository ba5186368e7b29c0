//! Configuration hot-reload watcher.
//!
//! ## Responsibility
//! Watch a TOML config file for changes and broadcast validated new
//! configs to subscribers. Invalid reloads are logged and rejected; the
//! current config remains unchanged.
//!
//! ## Guarantees
//! - Only validated configs are broadcast
//! - Invalid file edits are logged but do not disrupt the running router
//! - File watching is debounced to avoid rapid re-reads on multi-write editors
//! - Subscribers receive the new config via a `broadcast` channel
//!
//! ## NOT Responsible For
//! - Applying the config to a running router (consumers decide what to do)
//! - Initial config loading (that belongs to `loader`)

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{broadcast, Mutex};

use super::loader::load_from_file;
use super::validation::ConfigError;
use super::RouterConfig;

/// Watches a config file for changes and broadcasts validated updates.
///
/// Subscribers receive new [`RouterConfig`] values via a
/// [`broadcast::Receiver`].
///
/// # Panics
///
/// This type never panics.
pub struct ConfigWatcher {
    /// Broadcast sender for config updates.
    _tx: broadcast::Sender<RouterConfig>,
    /// Retained watcher handle; dropping this stops file watching.
    _watcher: Arc<Mutex<RecommendedWatcher>>,
}

impl ConfigWatcher {
    /// Create a new [`ConfigWatcher`] for the given config file path.
    ///
    /// Returns the watcher and a receiver for config change notifications.
    /// The initial config is **not** broadcast; use
    /// `loader::load_from_file` for the initial load.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the TOML config file to watch.
    ///
    /// # Returns
    ///
    /// - `Ok((ConfigWatcher, Receiver))` on success.
    /// - `Err(ConfigError)` if the file watcher cannot be created.
    ///
    /// # Panics
    ///
    /// This function never panics.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// use backend_router::config::watcher::ConfigWatcher;
    /// use std::path::PathBuf;
    ///
    /// let (watcher, mut rx) = ConfigWatcher::new(PathBuf::from("router.toml"))?;
    /// tokio::spawn(async move {
    ///     while let Ok(config) = rx.recv().await {
    ///         println!("Config reloaded: {} providers", config.providers.len());
    ///     }
    /// });
    /// ```
    pub fn new(path: PathBuf) -> Result<(Self, broadcast::Receiver<RouterConfig>), ConfigError> {
        let (tx, rx) = broadcast::channel(8);
        let tx_clone = tx.clone();
        let watch_path = path.clone();

        // Forward notify events into async context through a std channel.
        let (notify_tx, notify_rx) = std::sync::mpsc::channel();

        let mut watcher = RecommendedWatcher::new(
            move |res: Result<notify::Event, notify::Error>| {
                if let Ok(event) = res {
                    let _ = notify_tx.send(event);
                }
            },
            notify::Config::default(),
        )
        .map_err(|e| ConfigError::Io {
            file: path.display().to_string(),
            source: std::io::Error::other(e.to_string()),
        })?;

        // Watch the parent directory to handle editors that do atomic saves
        // (write temp file, rename over original).
        let watch_dir = watch_path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        watcher
            .watch(&watch_dir, RecursiveMode::NonRecursive)
            .map_err(|e| ConfigError::Io {
                file: watch_dir.display().to_string(),
                source: std::io::Error::other(e.to_string()),
            })?;

        let watcher = Arc::new(Mutex::new(watcher));

        // Background task: debounce events and broadcast validated reloads.
        let config_path = watch_path.clone();
        tokio::spawn(async move {
            let debounce = Duration::from_millis(500);
            let mut last_reload = std::time::Instant::now()
                .checked_sub(debounce)
                .unwrap_or_else(std::time::Instant::now);

            loop {
                tokio::time::sleep(Duration::from_millis(100)).await;

                let mut should_reload = false;
                while let Ok(event) = notify_rx.try_recv() {
                    match event.kind {
                        EventKind::Modify(_) | EventKind::Create(_) => {
                            let is_our_file = event
                                .paths
                                .iter()
                                .any(|p| p.file_name() == config_path.file_name());
                            if is_our_file {
                                should_reload = true;
                            }
                        }
                        _ => {}
                    }
                }

                if should_reload && last_reload.elapsed() >= debounce {
                    last_reload = std::time::Instant::now();
                    match load_from_file(&config_path) {
                        Ok(new_config) => {
                            tracing::info!(
                                path = %config_path.display(),
                                providers = new_config.providers.len(),
                                "config reloaded successfully"
                            );
                            // No receivers is fine; the config was still
                            // validated.
                            let _ = tx_clone.send(new_config);
                        }
                        Err(e) => {
                            tracing::warn!(
                                path = %config_path.display(),
                                error = %e,
                                "config reload rejected, keeping current config"
                            );
                        }
                    }
                }
            }
        });

        Ok((
            Self {
                _tx: tx,
                _watcher: watcher,
            },
            rx,
        ))
    }

    /// Subscribe to config change notifications.
    ///
    /// Returns a new receiver. Multiple subscribers are supported.
    ///
    /// # Panics
    ///
    /// This function never panics.
    pub fn subscribe(&self) -> broadcast::Receiver<RouterConfig> {
        self._tx.subscribe()
    }
}

// ── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_TOML: &str = r#"
[[providers]]
id = "primary"
weight = 1.0
capacity = 4
unit_cost_usd = 0.01
"#;

    const INVALID_TOML: &str = r#"
[[providers]]
id = "primary"
weight = -5.0
"#;

    #[tokio::test]
    async fn test_config_watcher_creation_succeeds() {
        let dir = tempfile::tempdir().expect("test: create tempdir");
        let path = dir.path().join("router.toml");
        std::fs::write(&path, VALID_TOML).expect("test: write");

        let result = ConfigWatcher::new(path);
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_config_watcher_subscribe_returns_receiver() {
        let dir = tempfile::tempdir().expect("test: create tempdir");
        let path = dir.path().join("router.toml");
        std::fs::write(&path, VALID_TOML).expect("test: write");

        let (watcher, _rx) = ConfigWatcher::new(path).expect("test: create watcher");
        let _rx2 = watcher.subscribe();
    }

    #[tokio::test]
    async fn test_config_watcher_detects_file_change() {
        let dir = tempfile::tempdir().expect("test: create tempdir");
        let path = dir.path().join("router.toml");
        std::fs::write(&path, VALID_TOML).expect("test: write");

        let (_watcher, mut rx) =
            ConfigWatcher::new(path.clone()).expect("test: create watcher");

        // Give the watcher a moment to install, then edit the file.
        tokio::time::sleep(Duration::from_millis(200)).await;
        let updated = VALID_TOML.replace("capacity = 4", "capacity = 16");
        std::fs::write(&path, updated).expect("test: rewrite");

        let received =
            tokio::time::timeout(Duration::from_secs(5), rx.recv()).await;
        match received {
            Ok(Ok(config)) => assert_eq!(config.providers[0].capacity, 16),
            other => std::panic::panic_any(format!(
                "expected reloaded config, got {other:?}"
            )),
        }
    }

    #[tokio::test]
    async fn test_invalid_edit_is_not_broadcast() {
        let dir = tempfile::tempdir().expect("test: create tempdir");
        let path = dir.path().join("router.toml");
        std::fs::write(&path, VALID_TOML).expect("test: write");

        let (_watcher, mut rx) =
            ConfigWatcher::new(path.clone()).expect("test: create watcher");

        tokio::time::sleep(Duration::from_millis(200)).await;
        std::fs::write(&path, INVALID_TOML).expect("test: rewrite");

        // The invalid edit must be rejected, so no broadcast arrives.
        let received =
            tokio::time::timeout(Duration::from_secs(2), rx.recv()).await;
        assert!(received.is_err(), "invalid config must not be broadcast");
    }
}
