//! Hot reload of the guard configuration.
//!
//! The parent directory is watched rather than the file itself: editors and
//! config-management tools usually replace the file by rename, which would
//! orphan a watch on the old inode.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::GuardConfig;

pub struct ConfigWatcher {
    path: PathBuf,
    updates: mpsc::UnboundedSender<GuardConfig>,
}

impl ConfigWatcher {
    /// Returns the watcher and the receiving end for validated configs.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<GuardConfig>) {
        let (updates, rx) = mpsc::unbounded_channel();
        let watcher = Self {
            path: path.to_path_buf(),
            updates,
        };
        (watcher, rx)
    }

    /// Start watching. Drop the returned handle to stop.
    ///
    /// A config that fails to parse or validate is logged and skipped; the
    /// server keeps its current settings.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let file_name = self.path.file_name().map(OsString::from);
        let path = self.path.clone();
        let updates = self.updates;

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                let event = match res {
                    Ok(event) => event,
                    Err(e) => {
                        tracing::error!(error = %e, "Config watch error");
                        return;
                    }
                };
                if !is_write(&event.kind) || !touches(&event, file_name.as_deref()) {
                    return;
                }
                match load_config(&path) {
                    Ok(config) => {
                        tracing::info!(path = %path.display(), "Config change detected");
                        let _ = updates.send(config);
                    }
                    Err(e) => tracing::error!(
                        error = %e,
                        "Rejected config change, keeping current settings"
                    ),
                }
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        tracing::info!(path = %self.path.display(), "Config watcher started");
        Ok(watcher)
    }
}

fn is_write(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Modify(_) | EventKind::Create(_))
}

fn touches(event: &Event, file_name: Option<&std::ffi::OsStr>) -> bool {
    let Some(file_name) = file_name else {
        return false;
    };
    event
        .paths
        .iter()
        .any(|p| p.file_name() == Some(file_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, ModifyKind, RemoveKind};

    #[test]
    fn test_only_writes_to_the_config_file_count() {
        let file = std::ffi::OsStr::new("guardrail.toml");

        let modify = Event::new(EventKind::Modify(ModifyKind::Any))
            .add_path(PathBuf::from("/etc/guardrail/guardrail.toml"));
        assert!(is_write(&modify.kind) && touches(&modify, Some(file)));

        let sibling = Event::new(EventKind::Create(CreateKind::File))
            .add_path(PathBuf::from("/etc/guardrail/other.toml"));
        assert!(!touches(&sibling, Some(file)));

        let removed = Event::new(EventKind::Remove(RemoveKind::File))
            .add_path(PathBuf::from("/etc/guardrail/guardrail.toml"));
        assert!(!is_write(&removed.kind));
    }

    #[tokio::test]
    async fn test_rewritten_file_is_delivered() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("guardrail.toml");
        std::fs::write(&path, "[prompts]\nmax_chars = 100\n").unwrap();

        let (watcher, mut updates) = ConfigWatcher::new(&path);
        let _handle = watcher.run().unwrap();

        std::fs::write(&path, "[prompts]\nmax_chars = 250\n").unwrap();
        let config = tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                let config = updates.recv().await.unwrap();
                if config.prompts.max_chars == 250 {
                    break config;
                }
            }
        })
        .await
        .expect("no config update delivered");
        assert_eq!(config.prompts.max_chars, 250);
    }
}
