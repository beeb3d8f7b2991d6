//! Turns raw OS events into logical operations.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::status::{StatusStore, StatusUpdate, SyncState};

use super::ignore::IgnorePolicy;
use super::operation::{LogicalOperation, RawEvent};
use super::watch_set::{Subscribed, WatchSet};

/// A normalized change on its way to the debouncer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observed {
    pub path: PathBuf,
    pub operation: LogicalOperation,
}

/// Applies the ignore policy, maps bitmasks, and extends the watch set.
pub struct Normalizer {
    policy: Arc<IgnorePolicy>,
    watch_set: Arc<WatchSet>,
    status: Arc<StatusStore>,
}

impl Normalizer {
    pub fn new(
        policy: Arc<IgnorePolicy>,
        watch_set: Arc<WatchSet>,
        status: Arc<StatusStore>,
    ) -> Self {
        Self {
            policy,
            watch_set,
            status,
        }
    }

    /// Normalize one raw event.
    ///
    /// Ignored paths and `Unknown` operations yield `None`. A `Create` on a
    /// directory subscribes it before returning, so events inside it can be seen;
    /// a failed subscription moves the status store to `Error`.
    pub fn normalize(&self, raw: RawEvent) -> Option<Observed> {
        if self.policy.is_ignored(&raw.path) {
            return None;
        }

        let operation = LogicalOperation::from_raw(raw.ops);
        if operation == LogicalOperation::Unknown {
            return None;
        }

        if operation == LogicalOperation::Create && raw.path.is_dir() {
            let report = self.watch_set.on_create(&raw.path);
            self.record_subscription(&raw.path, report);
        }

        Some(Observed {
            path: raw.path,
            operation,
        })
    }

    /// Log what extending the watch set achieved; failures flag the store.
    fn record_subscription(&self, dir: &Path, report: Subscribed) {
        if report.added > 0 {
            crate::debug_event!(
                "watcher",
                "subscribed",
                "{} new directories under {}",
                report.added,
                dir.display()
            );
        }
        if report.failed > 0 {
            self.status.update(StatusUpdate::new(
                SyncState::Error,
                format!("failed to watch {}", dir.display()),
            ));
        }
    }
}
