//! Per-path coalescing of change events.
//!
//! Editors and sync clients tend to touch a file several times in a burst
//! (create, write, write, chmod). The debouncer keeps one pending record per
//! path, merges operations by priority, and only releases the record after the
//! path has been quiet for the configured window.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use super::operation::LogicalOperation;
use crate::queue::QueuedChange;

/// Trailing quiet period before a change is considered final.
pub const DEFAULT_DEBOUNCE_WINDOW: Duration = Duration::from_millis(300);

/// How often pending records are checked against their release time.
pub const DEFAULT_TICK_PERIOD: Duration = Duration::from_millis(200);

/// One path's coalesced, not yet released change.
#[derive(Debug, Clone)]
pub struct PendingChange {
    pub path: PathBuf,
    pub operation: LogicalOperation,
    pub release_at: Instant,
    /// Wall-clock time of the most recent event merged into this record.
    pub observed_at: DateTime<Utc>,
}

/// Debounces change events by path with priority merge.
#[derive(Debug)]
pub struct Debouncer {
    pending: HashMap<PathBuf, PendingChange>,
    window: Duration,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            pending: HashMap::new(),
            window,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Record an operation observed now.
    pub fn record(&mut self, path: PathBuf, operation: LogicalOperation) {
        self.record_at(path, operation, Instant::now());
    }

    /// Record an operation observed at `now`.
    ///
    /// The stored operation is replaced only when the new one ranks at least as
    /// high. The release time always slides to `now + window`.
    pub fn record_at(&mut self, path: PathBuf, operation: LogicalOperation, now: Instant) {
        let release_at = now + self.window;
        let observed_at = Utc::now();

        match self.pending.get_mut(&path) {
            Some(existing) => {
                existing.operation = existing.operation.merge(operation);
                existing.release_at = release_at;
                existing.observed_at = observed_at;
            }
            None => {
                self.pending.insert(
                    path.clone(),
                    PendingChange {
                        path,
                        operation,
                        release_at,
                        observed_at,
                    },
                );
            }
        }
    }

    /// Take all changes whose window has elapsed.
    pub fn take_ready(&mut self) -> Vec<QueuedChange> {
        self.take_ready_at(Instant::now())
    }

    /// Take all changes with `release_at <= now`, removing them from pending.
    pub fn take_ready_at(&mut self, now: Instant) -> Vec<QueuedChange> {
        let mut ready = Vec::new();

        self.pending.retain(|_, change| {
            if change.release_at <= now {
                ready.push(QueuedChange {
                    path: change.path.clone(),
                    operation: change.operation,
                    observed_at: change.observed_at,
                });
                false
            } else {
                true
            }
        });

        ready
    }

    pub fn pending(&self, path: &Path) -> Option<&PendingChange> {
        self.pending.get(path)
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE_WINDOW)
    }
}
