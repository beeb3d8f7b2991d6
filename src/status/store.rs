//! Concurrency-safe holder of the latest status snapshot.

use std::collections::VecDeque;
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::watcher::LogicalOperation;

/// Ring size used until [`StatusStore::set_max_events`] is called.
pub const DEFAULT_MAX_EVENTS: usize = 20;

/// High-level pipeline state shown to operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    #[default]
    Unspecified,
    Idle,
    Syncing,
    Error,
    Paused,
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SyncState::Unspecified => "UNSPECIFIED",
            SyncState::Idle => "IDLE",
            SyncState::Syncing => "SYNCING",
            SyncState::Error => "ERROR",
            SyncState::Paused => "PAUSED",
        };
        f.write_str(label)
    }
}

/// One entry of the recent-event ring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentEvent {
    pub operation: LogicalOperation,
    pub path: PathBuf,
    pub occurred_at: DateTime<Utc>,
}

impl RecentEvent {
    pub fn new(operation: LogicalOperation, path: impl Into<PathBuf>) -> Self {
        Self {
            operation,
            path: path.into(),
            occurred_at: Utc::now(),
        }
    }

    /// Human-readable `"OP path"` line.
    pub fn summary(&self) -> String {
        format!("{} {}", self.operation, self.path.display())
    }
}

/// Immutable copy of the store's state at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub state: SyncState,
    pub message: String,
    pub last_event: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub recent_events: Vec<RecentEvent>,
}

/// Replacement snapshot passed to [`StatusStore::update`].
///
/// Fields left as `None` are filled in by the store: `updated_at` with the
/// current time, `last_event` and `recent_events` with their previous values.
#[derive(Debug, Clone, Default)]
pub struct StatusUpdate {
    pub state: SyncState,
    pub message: String,
    pub last_event: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
    pub recent_events: Option<Vec<RecentEvent>>,
}

impl StatusUpdate {
    pub fn new(state: SyncState, message: impl Into<String>) -> Self {
        Self {
            state,
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn last_event(mut self, summary: impl Into<String>) -> Self {
        self.last_event = Some(summary.into());
        self
    }

    pub fn updated_at(mut self, at: DateTime<Utc>) -> Self {
        self.updated_at = Some(at);
        self
    }

    pub fn recent_events(mut self, events: Vec<RecentEvent>) -> Self {
        self.recent_events = Some(events);
        self
    }
}

#[derive(Debug)]
struct StoreInner {
    state: SyncState,
    message: String,
    last_event: Option<String>,
    updated_at: DateTime<Utc>,
    ring: VecDeque<RecentEvent>,
    max_events: usize,
}

impl StoreInner {
    fn trim(&mut self) {
        while self.ring.len() > self.max_events {
            self.ring.pop_front();
        }
    }

    fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            state: self.state,
            message: self.message.clone(),
            last_event: self.last_event.clone(),
            updated_at: self.updated_at,
            recent_events: self.ring.iter().cloned().collect(),
        }
    }
}

/// Latest status plus a bounded ring of recent events.
///
/// Constructed once per pipeline and shared as `Arc<StatusStore>`. Every
/// operation takes the same lock, so readers always see a whole snapshot.
#[derive(Debug)]
pub struct StatusStore {
    inner: Mutex<StoreInner>,
}

impl StatusStore {
    /// New store in the `Idle` state.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(StoreInner {
                state: SyncState::Idle,
                message: "idle".to_string(),
                last_event: None,
                updated_at: Utc::now(),
                ring: VecDeque::with_capacity(DEFAULT_MAX_EVENTS),
                max_events: DEFAULT_MAX_EVENTS,
            }),
        }
    }

    pub fn with_max_events(max: usize) -> Self {
        let store = Self::new();
        store.set_max_events(max);
        store
    }

    /// Copy of the latest snapshot, including the recent-event ring.
    pub fn current(&self) -> StatusSnapshot {
        self.inner.lock().snapshot()
    }

    /// Replace the snapshot wholesale.
    pub fn update(&self, update: StatusUpdate) {
        let mut inner = self.inner.lock();

        if inner.state != update.state {
            crate::debug_event!(
                "status",
                "transition",
                "{} -> {} ({})",
                inner.state,
                update.state,
                update.message
            );
        }

        inner.state = update.state;
        inner.message = update.message;
        inner.updated_at = update.updated_at.unwrap_or_else(Utc::now);
        if let Some(summary) = update.last_event {
            inner.last_event = Some(summary);
        }
        if let Some(events) = update.recent_events {
            inner.ring = events.into();
            inner.trim();
        }
    }

    /// Append to the ring, evicting the oldest entries past the maximum.
    pub fn add_event(&self, event: RecentEvent) {
        let mut inner = self.inner.lock();
        inner.last_event = Some(event.summary());
        inner.ring.push_back(event);
        inner.trim();
        inner.updated_at = Utc::now();
    }

    /// Resize the ring, dropping the oldest entries when shrinking.
    ///
    /// A size of zero is ignored.
    pub fn set_max_events(&self, max: usize) {
        if max == 0 {
            return;
        }
        let mut inner = self.inner.lock();
        inner.max_events = max;
        inner.trim();
    }

    pub fn max_events(&self) -> usize {
        self.inner.lock().max_events
    }
}

impl Default for StatusStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn event(n: usize) -> RecentEvent {
        RecentEvent::new(LogicalOperation::Write, format!("file{n}.txt"))
    }

    fn paths(snapshot: &StatusSnapshot) -> Vec<String> {
        snapshot
            .recent_events
            .iter()
            .map(|e| e.path.display().to_string())
            .collect()
    }

    #[test]
    fn test_initial_state_is_idle() {
        let store = StatusStore::new();
        let snapshot = store.current();
        assert_eq!(snapshot.state, SyncState::Idle);
        assert_eq!(snapshot.message, "idle");
        assert!(snapshot.last_event.is_none());
        assert!(snapshot.recent_events.is_empty());
        assert_eq!(store.max_events(), DEFAULT_MAX_EVENTS);
    }

    #[test]
    fn test_shrinking_ring_keeps_newest() {
        let store = StatusStore::new();
        store.set_max_events(3);
        for n in 1..=5 {
            store.add_event(event(n));
        }

        let snapshot = store.current();
        assert_eq!(paths(&snapshot), vec!["file3.txt", "file4.txt", "file5.txt"]);
        assert_eq!(snapshot.last_event.as_deref(), Some("WRITE file5.txt"));
    }

    #[test]
    fn test_ring_length_is_min_of_count_and_max() {
        for (count, max) in [(0, 4), (3, 4), (4, 4), (9, 4), (25, 20)] {
            let store = StatusStore::with_max_events(max);
            for n in 0..count {
                store.add_event(event(n));
            }
            let snapshot = store.current();
            assert_eq!(snapshot.recent_events.len(), count.min(max));
            let expected: Vec<String> = (count.saturating_sub(max)..count)
                .map(|n| format!("file{n}.txt"))
                .collect();
            assert_eq!(paths(&snapshot), expected);
        }
    }

    #[test]
    fn test_set_max_events_truncates_oldest_and_ignores_zero() {
        let store = StatusStore::new();
        for n in 0..10 {
            store.add_event(event(n));
        }
        store.set_max_events(0);
        assert_eq!(store.max_events(), DEFAULT_MAX_EVENTS);
        assert_eq!(store.current().recent_events.len(), 10);

        store.set_max_events(2);
        assert_eq!(paths(&store.current()), vec!["file8.txt", "file9.txt"]);
    }

    #[test]
    fn test_update_carries_forward_last_event_and_ring() {
        let store = StatusStore::new();
        store.add_event(event(1));

        store.update(StatusUpdate::new(SyncState::Syncing, "processing event"));

        let snapshot = store.current();
        assert_eq!(snapshot.state, SyncState::Syncing);
        assert_eq!(snapshot.message, "processing event");
        assert_eq!(snapshot.last_event.as_deref(), Some("WRITE file1.txt"));
        assert_eq!(paths(&snapshot), vec!["file1.txt"]);
    }

    #[test]
    fn test_update_explicit_fields_replace() {
        let store = StatusStore::with_max_events(2);
        store.add_event(event(1));

        let at = Utc::now() - chrono::Duration::hours(1);
        store.update(
            StatusUpdate::new(SyncState::Paused, "paused")
                .last_event("REMOVE gone.txt")
                .updated_at(at)
                .recent_events(vec![event(7), event(8), event(9)]),
        );

        let snapshot = store.current();
        assert_eq!(snapshot.state, SyncState::Paused);
        assert_eq!(snapshot.updated_at, at);
        assert_eq!(snapshot.last_event.as_deref(), Some("REMOVE gone.txt"));
        assert_eq!(paths(&snapshot), vec!["file8.txt", "file9.txt"]);
    }

    #[test]
    fn test_update_stamps_time_when_unset() {
        let store = StatusStore::new();
        let before = Utc::now();
        store.update(StatusUpdate::new(SyncState::Error, "fswatch error"));
        assert!(store.current().updated_at >= before);
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let store = StatusStore::new();
        store.add_event(event(1));
        let mut snapshot = store.current();
        snapshot.recent_events.clear();
        assert_eq!(store.current().recent_events.len(), 1);
    }

    #[test]
    fn test_concurrent_writers_and_readers() {
        let store = Arc::new(StatusStore::with_max_events(50));
        let mut handles = Vec::new();

        for t in 0..4 {
            let store = store.clone();
            handles.push(std::thread::spawn(move || {
                for n in 0..100 {
                    store.add_event(event(t * 1000 + n));
                    if n % 10 == 0 {
                        store.update(StatusUpdate::new(SyncState::Syncing, "busy"));
                    }
                }
            }));
        }
        for _ in 0..2 {
            let store = store.clone();
            handles.push(std::thread::spawn(move || {
                for _ in 0..200 {
                    let snapshot = store.current();
                    assert!(snapshot.recent_events.len() <= 50);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.current().recent_events.len(), 50);
    }
}
