//! Configuration file watcher for hot reload.
//!
//! Watches the configuration file for changes and hands every successfully
//! loaded configuration to a callback. A file that fails to load or validate
//! leaves the running configuration untouched.

use crate::config::{Config, load_config};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// Callback type for config reload.
pub type ReloadCallback = Box<dyn Fn(Config) + Send + Sync>;

/// Configuration file watcher.
pub struct ConfigWatcher {
    /// Path to the config file.
    config_path: PathBuf,
    /// Callback to invoke when config is reloaded.
    reload_callback: ReloadCallback,
}

impl ConfigWatcher {
    /// Create a new config watcher.
    pub fn new(config_path: PathBuf, reload_callback: ReloadCallback) -> Self {
        Self {
            config_path,
            reload_callback,
        }
    }

    /// Get the path being watched.
    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Run the config watcher.
    ///
    /// Reloads on modification of the config file and, on unix, on SIGHUP.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!(path = %self.config_path.display(), "config watcher starting");

        let (tx, rx) = mpsc::channel();

        let watcher_result: Result<RecommendedWatcher, _> = Watcher::new(
            move |res: Result<Event, notify::Error>| {
                if let Ok(event) = res {
                    let _ = tx.send(event);
                }
            },
            notify::Config::default().with_poll_interval(Duration::from_secs(2)),
        );

        let mut watcher = match watcher_result {
            Ok(w) => w,
            Err(e) => {
                error!(error = %e, "failed to create file watcher");
                let _ = shutdown.recv().await;
                return;
            }
        };

        // Editors often replace the file, so watch the directory rather than the inode.
        let watch_dir = match self.config_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        if let Err(e) = watcher.watch(&watch_dir, RecursiveMode::NonRecursive) {
            error!(error = %e, dir = %watch_dir.display(), "failed to watch config directory");
            let _ = shutdown.recv().await;
            return;
        }

        #[cfg(unix)]
        let mut sighup = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup())
        {
            Ok(s) => Some(s),
            Err(e) => {
                warn!(error = %e, "failed to setup SIGHUP handler");
                None
            }
        };

        info!("config watcher ready, watching for changes");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(100)) => {
                    // Coalesce a burst of events into a single reload.
                    let mut pending = false;
                    while let Ok(event) = rx.try_recv() {
                        pending |= self.should_reload(&event);
                    }
                    if pending {
                        self.try_reload();
                    }
                }

                _ = async {
                    #[cfg(unix)]
                    {
                        if let Some(ref mut sig) = sighup {
                            sig.recv().await
                        } else {
                            std::future::pending::<Option<()>>().await
                        }
                    }
                    #[cfg(not(unix))]
                    {
                        std::future::pending::<Option<()>>().await
                    }
                } => {
                    info!("received SIGHUP, reloading configuration");
                    self.try_reload();
                }

                _ = shutdown.recv() => {
                    info!("config watcher shutting down");
                    break;
                }
            }
        }
    }

    /// Check if this event should trigger a reload.
    fn should_reload(&self, event: &Event) -> bool {
        let is_our_file = event
            .paths
            .iter()
            .any(|p| p.file_name() == self.config_path.file_name());

        let is_modify_or_create = matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_));

        is_our_file && is_modify_or_create
    }

    /// Try to reload the configuration.
    fn try_reload(&self) {
        info!(path = %self.config_path.display(), "attempting config reload");

        let new_config = match load_config(&self.config_path) {
            Ok(config) => config,
            Err(e) => {
                error!(error = %e, "failed to load new config, keeping current");
                return;
            }
        };

        info!(
            policy = %new_config.load_balancing.policy,
            servers = new_config.load_balancing.servers.len(),
            "configuration reloaded successfully"
        );
        (self.reload_callback)(new_config);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::NamedTempFile;

    fn noop_watcher(path: &str) -> ConfigWatcher {
        ConfigWatcher::new(PathBuf::from(path), Box::new(|_| {}))
    }

    #[test]
    fn test_should_reload_modify() {
        let watcher = noop_watcher("/test/config.yaml");

        let event = Event {
            kind: EventKind::Modify(notify::event::ModifyKind::Data(
                notify::event::DataChange::Content,
            )),
            paths: vec![PathBuf::from("/test/config.yaml")],
            attrs: Default::default(),
        };

        assert!(watcher.should_reload(&event));
    }

    #[test]
    fn test_should_reload_create() {
        let watcher = noop_watcher("/test/config.yaml");

        let event = Event {
            kind: EventKind::Create(notify::event::CreateKind::File),
            paths: vec![PathBuf::from("/test/config.yaml")],
            attrs: Default::default(),
        };

        assert!(watcher.should_reload(&event));
    }

    #[test]
    fn test_should_reload_wrong_file() {
        let watcher = noop_watcher("/test/config.yaml");

        let event = Event {
            kind: EventKind::Modify(notify::event::ModifyKind::Data(
                notify::event::DataChange::Content,
            )),
            paths: vec![PathBuf::from("/test/other.yaml")],
            attrs: Default::default(),
        };

        assert!(!watcher.should_reload(&event));
    }

    #[test]
    fn test_should_reload_delete_ignored() {
        let watcher = noop_watcher("/test/config.yaml");

        let event = Event {
            kind: EventKind::Remove(notify::event::RemoveKind::File),
            paths: vec![PathBuf::from("/test/config.yaml")],
            attrs: Default::default(),
        };

        assert!(!watcher.should_reload(&event));
    }

    #[test]
    fn test_try_reload_invokes_callback() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"load_balancing:\n  policy: RoundRobin\n  servers: [\"http://a:1\"]\n")
            .unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let watcher = ConfigWatcher::new(
            file.path().to_path_buf(),
            Box::new(move |config| {
                assert_eq!(config.load_balancing.servers, vec!["http://a:1".to_string()]);
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        watcher.try_reload();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_try_reload_keeps_current_on_error() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"global:\n  log_level: verbose\n").unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let watcher = ConfigWatcher::new(
            file.path().to_path_buf(),
            Box::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        watcher.try_reload();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
