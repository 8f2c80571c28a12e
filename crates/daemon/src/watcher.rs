//! Folder watcher for the watch root.
//!
//! Emits one [`FolderNotice`] per delivery unit per process lifetime: first
//! for every folder already present (backfill), then for folders created or
//! moved into the root while running. Live notices are delayed by a settle
//! interval so a transfer still writing into the folder has a head start.
//! The settle delay is a heuristic; it does not prove the transfer is done.

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::scan::{is_delivery_unit, list_delivery_units};
use crate::shutdown::Shutdown;

/// Errors that stop the watcher
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("Failed to list watch root {path}: {source}")]
    Backfill {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to watch {path}: {source}")]
    Subscribe {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
}

/// How a folder was discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeOrigin {
    Backfill,
    Live,
}

/// A delivery unit ready to be processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderNotice {
    pub folder: PathBuf,
    pub origin: NoticeOrigin,
}

/// Folders in `event` that are direct children of `root`.
///
/// Only creations and rename targets count. Anything nested deeper, and
/// plain files, are ignored; file arrivals are found by the folder walk.
pub fn qualifying_folders(root: &Path, event: &Event) -> Vec<PathBuf> {
    let relevant = matches!(
        event.kind,
        EventKind::Create(_)
            | EventKind::Modify(ModifyKind::Name(
                RenameMode::To | RenameMode::Both | RenameMode::Any
            ))
    );
    if !relevant {
        return Vec::new();
    }

    event
        .paths
        .iter()
        .filter(|path| path.parent() == Some(root) && is_delivery_unit(path))
        .cloned()
        .collect()
}

/// Watches the root and forwards folder notices to the orchestrator.
pub struct FolderWatcher {
    root: PathBuf,
    settle: Duration,
    tx: mpsc::Sender<FolderNotice>,
    notified: Arc<Mutex<HashSet<PathBuf>>>,
}

impl FolderWatcher {
    pub fn new(root: impl Into<PathBuf>, settle: Duration, tx: mpsc::Sender<FolderNotice>) -> Self {
        Self {
            root: root.into(),
            settle,
            tx,
            notified: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Record `folder` as notified. Returns false if it already was.
    fn claim(&self, folder: &Path) -> bool {
        match self.notified.lock() {
            Ok(mut set) => set.insert(folder.to_path_buf()),
            Err(poisoned) => poisoned.into_inner().insert(folder.to_path_buf()),
        }
    }

    /// Notify every existing delivery unit that has not been notified yet.
    ///
    /// Returns the number of notices sent.
    pub async fn backfill(&self) -> Result<usize, WatchError> {
        let units = list_delivery_units(&self.root).map_err(|source| WatchError::Backfill {
            path: self.root.clone(),
            source,
        })?;

        let mut sent = 0;
        for folder in units {
            if !self.claim(&folder) {
                continue;
            }
            debug!(folder = %folder.display(), "Backfill folder");
            let notice = FolderNotice {
                folder,
                origin: NoticeOrigin::Backfill,
            };
            if self.tx.send(notice).await.is_err() {
                break;
            }
            sent += 1;
        }

        Ok(sent)
    }

    /// Run until shutdown.
    ///
    /// The notify subscription is registered before the backfill listing so
    /// a folder created in between is not lost; events are only processed
    /// once the backfill has been sent.
    pub async fn run(self, mut shutdown: Shutdown) -> Result<(), WatchError> {
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let _ = event_tx.send(res);
        })
        .map_err(|source| WatchError::Subscribe {
            path: self.root.clone(),
            source,
        })?;
        watcher
            .watch(&self.root, RecursiveMode::NonRecursive)
            .map_err(|source| WatchError::Subscribe {
                path: self.root.clone(),
                source,
            })?;

        let backfilled = self.backfill().await?;
        info!(root = %self.root.display(), backfilled, "Watching for new folders");

        let settle_shutdown = shutdown.clone();
        loop {
            tokio::select! {
                received = event_rx.recv() => {
                    match received {
                        Some(Ok(event)) => self.handle_event(&event, &settle_shutdown),
                        Some(Err(e)) => warn!(error = %e, "Watch error"),
                        None => break,
                    }
                }
                _ = shutdown.wait() => break,
            }
        }

        drop(watcher);
        info!(root = %self.root.display(), "Folder watcher stopped");
        Ok(())
    }

    fn handle_event(&self, event: &Event, shutdown: &Shutdown) {
        for folder in qualifying_folders(&self.root, event) {
            if !self.claim(&folder) {
                debug!(folder = %folder.display(), "Folder already notified");
                continue;
            }

            info!(folder = %folder.display(), settle_secs = self.settle.as_secs_f64(), "New folder detected");
            let tx = self.tx.clone();
            let settle = self.settle;
            let mut shutdown = shutdown.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(settle) => {
                        let notice = FolderNotice { folder, origin: NoticeOrigin::Live };
                        let _ = tx.send(notice).await;
                    }
                    _ = shutdown.wait() => {}
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shutdown;
    use notify::event::{CreateKind, ModifyKind};
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_qualifying_folders_direct_children_only() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("Drop1/nested")).unwrap();
        fs::write(root.join("loose xx.mp4"), b"").unwrap();

        let create = |path: PathBuf| Event::new(EventKind::Create(CreateKind::Any)).add_path(path);

        assert_eq!(qualifying_folders(root, &create(root.join("Drop1"))), vec![root.join("Drop1")]);
        assert!(qualifying_folders(root, &create(root.join("Drop1/nested"))).is_empty());
        assert!(qualifying_folders(root, &create(root.join("loose xx.mp4"))).is_empty());
        assert!(qualifying_folders(root, &create(root.join("vanished"))).is_empty());
    }

    #[test]
    fn test_qualifying_folders_rename_and_other_kinds() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir(root.join("Moved")).unwrap();

        let moved_in = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::To)))
            .add_path(root.join("Moved"));
        assert_eq!(qualifying_folders(root, &moved_in), vec![root.join("Moved")]);

        let moved_out = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::From)))
            .add_path(root.join("Moved"));
        assert!(qualifying_folders(root, &moved_out).is_empty());

        let removed = Event::new(EventKind::Remove(notify::event::RemoveKind::Folder))
            .add_path(root.join("Moved"));
        assert!(qualifying_folders(root, &removed).is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_live_and_backfill_agree_on_links_and_hidden_dirs() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("watch");
        fs::create_dir_all(root.join(".partial")).unwrap();
        fs::create_dir_all(temp_dir.path().join("target")).unwrap();
        std::os::unix::fs::symlink(temp_dir.path().join("target"), root.join("Linked")).unwrap();

        let create = |path: PathBuf| Event::new(EventKind::Create(CreateKind::Any)).add_path(path);
        assert_eq!(
            qualifying_folders(&root, &create(root.join("Linked"))),
            vec![root.join("Linked")]
        );
        assert!(qualifying_folders(&root, &create(root.join(".partial"))).is_empty());
        assert_eq!(list_delivery_units(&root).unwrap(), vec![root.join("Linked")]);
    }

    #[tokio::test]
    async fn test_backfill_notifies_each_folder_once() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir(root.join("B")).unwrap();
        fs::create_dir(root.join("A")).unwrap();

        let (tx, mut rx) = mpsc::channel(8);
        let watcher = FolderWatcher::new(root, Duration::from_millis(10), tx);

        assert_eq!(watcher.backfill().await.unwrap(), 2);
        assert_eq!(watcher.backfill().await.unwrap(), 0);

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.folder, root.join("A"));
        assert_eq!(second.folder, root.join("B"));
        assert_eq!(first.origin, NoticeOrigin::Backfill);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_live_event_for_backfilled_folder_is_not_renotified() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir(root.join("Drop1")).unwrap();

        let (tx, mut rx) = mpsc::channel(8);
        let (_trigger, shutdown) = shutdown::channel();
        let watcher = FolderWatcher::new(root, Duration::from_millis(10), tx);

        assert_eq!(watcher.backfill().await.unwrap(), 1);
        let backfilled = rx.recv().await.unwrap();
        assert_eq!(backfilled.folder, root.join("Drop1"));

        let created = Event::new(EventKind::Create(CreateKind::Folder)).add_path(root.join("Drop1"));
        let moved_in = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::To)))
            .add_path(root.join("Drop1"));
        watcher.handle_event(&created, &shutdown);
        watcher.handle_event(&moved_in, &shutdown);

        // A genuinely new folder still gets through
        fs::create_dir(root.join("Drop2")).unwrap();
        let fresh = Event::new(EventKind::Create(CreateKind::Folder)).add_path(root.join("Drop2"));
        watcher.handle_event(&fresh, &shutdown);

        let live = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(live.folder, root.join("Drop2"));
        assert_eq!(live.origin, NoticeOrigin::Live);

        assert!(tokio::time::timeout(Duration::from_millis(200), rx.recv())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_backfill_missing_root_fails() {
        let (tx, _rx) = mpsc::channel(1);
        let watcher = FolderWatcher::new("/nonexistent/dropcoder/root", Duration::ZERO, tx);
        assert!(matches!(watcher.backfill().await, Err(WatchError::Backfill { .. })));
    }

    #[tokio::test]
    async fn test_live_folder_is_notified_after_settle() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().to_path_buf();
        fs::create_dir(root.join("Existing")).unwrap();

        let (tx, mut rx) = mpsc::channel(8);
        let (trigger, shutdown) = shutdown::channel();
        let watcher = FolderWatcher::new(&root, Duration::from_millis(50), tx);
        let handle = tokio::spawn(watcher.run(shutdown));

        let backfilled = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(backfilled.folder, root.join("Existing"));
        assert_eq!(backfilled.origin, NoticeOrigin::Backfill);

        // Nested directories and loose files are not delivery units
        fs::create_dir(root.join("Existing/inner")).unwrap();
        fs::write(root.join("loose.txt"), b"x").unwrap();
        fs::create_dir(root.join("Fresh")).unwrap();

        let live = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(live.folder, root.join("Fresh"));
        assert_eq!(live.origin, NoticeOrigin::Live);

        assert!(tokio::time::timeout(Duration::from_millis(200), rx.recv())
            .await
            .is_err());

        trigger.trigger();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }
}
