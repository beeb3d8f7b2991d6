//! Directory subscriptions over the sync tree.
//!
//! The OS watcher is registered non-recursively on every directory so that
//! ignored subtrees are never subscribed. The set of watched directories only
//! grows while the pipeline runs; it is released wholesale by [`WatchSet::stop`].

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use walkdir::WalkDir;

use super::error::WatchError;
use super::ignore::IgnorePolicy;

#[derive(Default)]
struct WatchSetInner {
    watcher: Option<RecommendedWatcher>,
    watched: HashSet<PathBuf>,
}

/// Outcome of extending the watch set from a newly created directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Subscribed {
    pub added: usize,
    pub failed: usize,
}

/// Insert-only set of OS subscriptions, guarded by one mutex.
pub struct WatchSet {
    policy: Arc<IgnorePolicy>,
    inner: Mutex<WatchSetInner>,
}

impl WatchSet {
    pub fn new(policy: Arc<IgnorePolicy>) -> Self {
        Self {
            policy,
            inner: Mutex::new(WatchSetInner::default()),
        }
    }

    /// Create the OS watcher and subscribe every non-ignored directory under `root`.
    ///
    /// The root is created if missing. Returns the canonical root, which is the
    /// prefix of every path the watcher reports afterwards. Any failure here is
    /// fatal and leaves the set stopped.
    pub fn start<H>(&self, root: &Path, handler: H) -> Result<PathBuf, WatchError>
    where
        H: notify::EventHandler,
    {
        std::fs::create_dir_all(root).map_err(|source| WatchError::RootUnavailable {
            path: root.to_path_buf(),
            source,
        })?;
        let root = root
            .canonicalize()
            .map_err(|source| WatchError::RootUnavailable {
                path: root.to_path_buf(),
                source,
            })?;

        let mut inner = self.inner.lock();
        if inner.watcher.is_some() {
            return Err(WatchError::InitFailed {
                reason: "watch set already started".to_string(),
            });
        }

        let mut watcher = notify::recommended_watcher(handler)?;
        let mut watched = HashSet::new();

        for entry in WalkDir::new(&root)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !self.policy.is_ignored(e.path()))
        {
            let entry = entry.map_err(|source| WatchError::Walk {
                path: root.clone(),
                source,
            })?;
            if !entry.file_type().is_dir() {
                continue;
            }
            watcher
                .watch(entry.path(), RecursiveMode::NonRecursive)
                .map_err(|e| WatchError::PathWatchFailed {
                    path: entry.path().to_path_buf(),
                    reason: e.to_string(),
                })?;
            watched.insert(entry.into_path());
        }

        crate::log_event!(
            "watcher",
            "watching",
            "{} directories under {}",
            watched.len(),
            root.display()
        );

        inner.watcher = Some(watcher);
        inner.watched = watched;
        Ok(root)
    }

    /// Subscribe a newly created directory and everything beneath it.
    ///
    /// Failures are logged, counted, and skipped; they never stop the walk or
    /// the pipeline.
    pub fn on_create(&self, path: &Path) -> Subscribed {
        let mut report = Subscribed::default();
        if !path.is_dir() || self.policy.is_ignored(path) {
            return report;
        }

        let mut inner = self.inner.lock();
        let WatchSetInner { watcher, watched } = &mut *inner;
        let Some(watcher) = watcher.as_mut() else {
            crate::debug_event!("watcher", "stopped, skipping", "{}", path.display());
            return report;
        };

        for entry in WalkDir::new(path)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !self.policy.is_ignored(e.path()))
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    crate::warn_event!("watcher", "walk failed", "{}: {e}", path.display());
                    report.failed += 1;
                    continue;
                }
            };
            if !entry.file_type().is_dir() || watched.contains(entry.path()) {
                continue;
            }
            match watcher.watch(entry.path(), RecursiveMode::NonRecursive) {
                Ok(()) => {
                    crate::debug_event!("watcher", "watching", "{}", entry.path().display());
                    watched.insert(entry.into_path());
                    report.added += 1;
                }
                Err(e) => {
                    crate::warn_event!("watcher", "watch failed", "{}: {e}", entry.path().display());
                    report.failed += 1;
                }
            }
        }
        report
    }

    /// Release every subscription. Safe to call repeatedly or before `start`.
    pub fn stop(&self) {
        let mut inner = self.inner.lock();
        if let Some(watcher) = inner.watcher.take() {
            drop(watcher);
            crate::log_event!("watcher", "stopped", "{} directories released", inner.watched.len());
        }
        inner.watched.clear();
    }

    pub fn is_running(&self) -> bool {
        self.inner.lock().watcher.is_some()
    }

    pub fn is_watching(&self, dir: &Path) -> bool {
        self.inner.lock().watched.contains(dir)
    }

    pub fn watched_count(&self) -> usize {
        self.inner.lock().watched.len()
    }
}

impl Drop for WatchSet {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn policy() -> Arc<IgnorePolicy> {
        Arc::new(IgnorePolicy::new().with_patterns(&["node_modules"]))
    }

    #[test]
    fn test_start_subscribes_non_ignored_dirs() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("a/b")).unwrap();
        fs::create_dir_all(temp.path().join("node_modules/pkg")).unwrap();
        fs::write(temp.path().join("a/file.txt"), "x").unwrap();

        let set = WatchSet::new(policy());
        let root = set.start(temp.path(), |_res: notify::Result<notify::Event>| {}).unwrap();

        assert!(set.is_running());
        assert!(set.is_watching(&root));
        assert!(set.is_watching(&root.join("a")));
        assert!(set.is_watching(&root.join("a/b")));
        assert!(!set.is_watching(&root.join("node_modules")));
        assert!(!set.is_watching(&root.join("node_modules/pkg")));
        assert_eq!(set.watched_count(), 3);
    }

    #[test]
    fn test_start_creates_missing_root() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("not/yet/there");

        let set = WatchSet::new(policy());
        set.start(&root, |_res: notify::Result<notify::Event>| {}).unwrap();
        assert!(root.is_dir());
    }

    #[test]
    fn test_start_fails_when_root_is_a_file() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("plain");
        fs::write(&file, "x").unwrap();

        let set = WatchSet::new(policy());
        let err = set
            .start(&file, |_res: notify::Result<notify::Event>| {})
            .unwrap_err();
        assert!(matches!(err, WatchError::RootUnavailable { .. }));
        assert!(!set.is_running());
    }

    #[test]
    fn test_on_create_extends_set() {
        let temp = TempDir::new().unwrap();
        let set = WatchSet::new(policy());
        let root = set.start(temp.path(), |_res: notify::Result<notify::Event>| {}).unwrap();

        fs::create_dir_all(root.join("new/deeper")).unwrap();
        fs::create_dir_all(root.join("new/node_modules")).unwrap();

        assert_eq!(set.on_create(&root.join("new")).added, 2);
        assert!(set.is_watching(&root.join("new/deeper")));
        assert!(!set.is_watching(&root.join("new/node_modules")));

        // Already watched directories are not subscribed twice
        assert_eq!(set.on_create(&root.join("new")), Subscribed::default());
    }

    #[test]
    fn test_on_create_ignores_files_and_ignored_dirs() {
        let temp = TempDir::new().unwrap();
        let set = WatchSet::new(policy());
        let root = set.start(temp.path(), |_res: notify::Result<notify::Event>| {}).unwrap();

        fs::write(root.join("file.txt"), "x").unwrap();
        fs::create_dir(root.join("node_modules")).unwrap();

        assert_eq!(set.on_create(&root.join("file.txt")).added, 0);
        assert_eq!(set.on_create(&root.join("node_modules")).added, 0);
        assert_eq!(set.on_create(&root.join("missing")).added, 0);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let set = WatchSet::new(policy());
        set.stop();

        let temp = TempDir::new().unwrap();
        set.start(temp.path(), |_res: notify::Result<notify::Event>| {}).unwrap();
        set.stop();
        set.stop();

        assert!(!set.is_running());
        assert_eq!(set.watched_count(), 0);
    }
}
