//! Change-detection pipeline: OS watcher → normalizer → debouncer → queue.
//!
//! Two tasks run per pipeline, both parented to one cancellation token:
//!
//! ```text
//! notify callback ──raw──> receiver loop ──observed──> debounce loop ──> RelayQueue
//!                          (ignore, map,               (pending table,       │
//!                           extend WatchSet)            fixed tick)          └─> StatusStore
//! ```
//!
//! The pending table lives inside the debounce loop and is touched by nothing
//! else. The status store and the relay queue are the only state shared with
//! the outside world.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::Settings;
use crate::queue::{DEFAULT_QUEUE_CAPACITY, RelayConsumer, RelayQueue};
use crate::status::{RecentEvent, StatusStore, StatusUpdate, SyncState};

use super::debouncer::{DEFAULT_DEBOUNCE_WINDOW, DEFAULT_TICK_PERIOD, Debouncer};
use super::error::WatchError;
use super::ignore::IgnorePolicy;
use super::normalizer::{Normalizer, Observed};
use super::operation::RawEvent;
use super::watch_set::WatchSet;

/// A configured, not yet running pipeline.
pub struct Pipeline {
    root: PathBuf,
    policy: IgnorePolicy,
    status: Arc<StatusStore>,
    queue: RelayQueue,
    window: Duration,
    tick: Duration,
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    pub fn status(&self) -> Arc<StatusStore> {
        self.status.clone()
    }

    pub fn queue(&self) -> &RelayQueue {
        &self.queue
    }

    /// Consume-only handle on the output queue.
    pub fn consumer(&self) -> RelayConsumer {
        self.queue.consumer()
    }

    /// Subscribe the tree and spawn the receiver and debounce loops.
    ///
    /// Must be called from within a tokio runtime. Setup failures (root cannot
    /// be created, walked, or subscribed) are returned here; after this point
    /// faults only show up in logs and the status store.
    pub fn start(&self, cancel: CancellationToken) -> Result<PipelineHandle, WatchError> {
        let (raw_tx, raw_rx) = mpsc::unbounded_channel::<notify::Result<notify::Event>>();
        let (observed_tx, observed_rx) = mpsc::unbounded_channel::<Observed>();

        // Reserved paths are compared against canonical event paths, so
        // resolve them once the root exists.
        std::fs::create_dir_all(&self.root).map_err(|source| WatchError::RootUnavailable {
            path: self.root.clone(),
            source,
        })?;
        let policy = Arc::new(self.policy.resolved());

        let watch_set = Arc::new(WatchSet::new(policy.clone()));
        let root = watch_set.start(&self.root, move |res: notify::Result<notify::Event>| {
            let _ = raw_tx.send(res);
        })?;

        self.status
            .update(StatusUpdate::new(SyncState::Idle, "watching"));

        let normalizer = Normalizer::new(policy, watch_set.clone(), self.status.clone());

        let receiver = tokio::spawn(run_receiver(
            raw_rx,
            normalizer,
            watch_set.clone(),
            observed_tx,
            self.status.clone(),
            cancel.clone(),
        ));

        let debounce = tokio::spawn(run_debouncer(
            observed_rx,
            Debouncer::new(self.window),
            self.tick,
            self.queue.clone(),
            self.status.clone(),
            root.clone(),
            cancel.clone(),
        ));

        crate::log_event!(
            "pipeline",
            "started",
            "window {}ms, tick {}ms",
            self.window.as_millis(),
            self.tick.as_millis()
        );

        Ok(PipelineHandle {
            root,
            cancel,
            watch_set,
            tasks: vec![receiver, debounce],
        })
    }
}

/// Running pipeline. Dropping the handle does not stop it; cancel the token
/// or call [`stop`](Self::stop).
pub struct PipelineHandle {
    root: PathBuf,
    cancel: CancellationToken,
    watch_set: Arc<WatchSet>,
    tasks: Vec<JoinHandle<()>>,
}

impl PipelineHandle {
    /// Canonical sync root; every emitted path starts with it.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn watched_dirs(&self) -> usize {
        self.watch_set.watched_count()
    }

    pub fn is_watching(&self, dir: &Path) -> bool {
        self.watch_set.is_watching(dir)
    }

    /// Cancel both loops and release every subscription. Idempotent.
    pub fn stop(&self) {
        self.cancel.cancel();
        self.watch_set.stop();
    }

    /// Stop and wait for both loops to exit.
    pub async fn shutdown(self) {
        self.stop();
        for task in self.tasks {
            if let Err(e) = task.await {
                crate::warn_event!("pipeline", "task ended abnormally", "{e}");
            }
        }
        crate::log_event!("pipeline", "stopped");
    }
}

async fn run_receiver(
    mut raw_rx: mpsc::UnboundedReceiver<notify::Result<notify::Event>>,
    normalizer: Normalizer,
    watch_set: Arc<WatchSet>,
    observed_tx: mpsc::UnboundedSender<Observed>,
    status: Arc<StatusStore>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            res = raw_rx.recv() => match res {
                Some(res) => {
                    if !handle_notification(res, &normalizer, &observed_tx, &status) {
                        break;
                    }
                }
                None => break,
            }
        }
    }

    watch_set.stop();
    crate::debug_event!("watcher", "receiver loop exited");
}

/// Normalize one message from the notify callback and forward the results.
///
/// Source errors move the status store to `Error` and are otherwise skipped.
/// Returns `false` once the debounce loop has gone away.
fn handle_notification(
    res: notify::Result<notify::Event>,
    normalizer: &Normalizer,
    observed_tx: &mpsc::UnboundedSender<Observed>,
    status: &StatusStore,
) -> bool {
    let event = match res {
        Ok(event) => event,
        Err(e) => {
            let err = WatchError::EventError {
                details: e.to_string(),
            };
            crate::warn_event!("watcher", "notification failed", "{err}");
            status.update(StatusUpdate::new(SyncState::Error, "fswatch error"));
            return true;
        }
    };

    for raw in RawEvent::from_notify(&event) {
        let Some(observed) = normalizer.normalize(raw) else {
            continue;
        };
        if observed_tx.send(observed).is_err() {
            return false;
        }
    }
    true
}

async fn run_debouncer(
    mut observed_rx: mpsc::UnboundedReceiver<Observed>,
    mut debouncer: Debouncer,
    tick: Duration,
    queue: RelayQueue,
    status: Arc<StatusStore>,
    root: PathBuf,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(tick);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                flush(&mut debouncer, &queue, &status, &root);
            }
            Some(observed) = observed_rx.recv() => {
                debouncer.record(observed.path, observed.operation);
            }
        }
    }

    if debouncer.has_pending() {
        crate::debug_event!(
            "debounce",
            "abandoned",
            "{} pending changes",
            debouncer.pending_count()
        );
    }
}

/// Release every due change: summary to the status store, item to the queue.
fn flush(debouncer: &mut Debouncer, queue: &RelayQueue, status: &StatusStore, root: &Path) {
    for change in debouncer.take_ready() {
        let relative = relative_to_root(&change.path, root);
        status.add_event(RecentEvent {
            operation: change.operation,
            path: relative.clone(),
            occurred_at: change.observed_at,
        });
        crate::debug_event!(
            "debounce",
            "flushed",
            "{} {}",
            change.operation,
            relative.display()
        );
        queue.enqueue(change);
    }
}

/// Path as shown to operators; the root itself reads as `.`.
fn relative_to_root(path: &Path, root: &Path) -> PathBuf {
    match path.strip_prefix(root) {
        Ok(rel) if rel.as_os_str().is_empty() => PathBuf::from("."),
        Ok(rel) => rel.to_path_buf(),
        Err(_) => path.to_path_buf(),
    }
}

/// Builder for constructing a [`Pipeline`].
pub struct PipelineBuilder {
    root: Option<PathBuf>,
    policy: IgnorePolicy,
    status: Option<Arc<StatusStore>>,
    max_events: Option<usize>,
    queue_capacity: usize,
    window: Duration,
    tick: Duration,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self {
            root: None,
            policy: IgnorePolicy::new(),
            status: None,
            max_events: None,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            window: DEFAULT_DEBOUNCE_WINDOW,
            tick: DEFAULT_TICK_PERIOD,
        }
    }

    /// Take root, ignore policy, queue capacity, and event log size from settings.
    pub fn settings(mut self, settings: &Settings) -> Self {
        self.root = Some(settings.sync_root.clone());
        self.policy = IgnorePolicy::from_settings(settings);
        self.queue_capacity = settings.sync_queue_size;
        self.max_events = Some(settings.event_log_size);
        self
    }

    pub fn root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    pub fn ignore_policy(mut self, policy: IgnorePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Share an existing store instead of creating one.
    pub fn status_store(mut self, status: Arc<StatusStore>) -> Self {
        self.status = Some(status);
        self
    }

    pub fn max_events(mut self, max: usize) -> Self {
        self.max_events = Some(max);
        self
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn debounce_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    pub fn tick_period(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    pub fn build(self) -> Result<Pipeline, WatchError> {
        let root = self.root.ok_or_else(|| WatchError::InitFailed {
            reason: "Sync root is required".to_string(),
        })?;
        if self.tick.is_zero() {
            return Err(WatchError::InitFailed {
                reason: "Tick period must be non-zero".to_string(),
            });
        }

        let status = self.status.unwrap_or_default();
        if let Some(max) = self.max_events {
            status.set_max_events(max);
        }

        Ok(Pipeline {
            root,
            policy: self.policy,
            status,
            queue: RelayQueue::new(self.queue_capacity),
            window: self.window,
            tick: self.tick,
        })
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watcher::LogicalOperation;
    use chrono::Utc;
    use std::time::Instant;

    #[test]
    fn test_build_requires_root() {
        let err = Pipeline::builder().build().err().unwrap();
        assert!(matches!(err, WatchError::InitFailed { .. }));
    }

    #[test]
    fn test_build_applies_max_events_to_shared_store() {
        let status = Arc::new(StatusStore::new());
        let _pipeline = Pipeline::builder()
            .root("/sync")
            .status_store(status.clone())
            .max_events(5)
            .build()
            .unwrap();
        assert_eq!(status.max_events(), 5);
    }

    fn detached_normalizer(status: Arc<StatusStore>) -> Normalizer {
        let policy = Arc::new(IgnorePolicy::new());
        let watch_set = Arc::new(WatchSet::new(policy.clone()));
        Normalizer::new(policy, watch_set, status)
    }

    #[test]
    fn test_source_error_sets_status_and_later_events_flow() {
        let status = Arc::new(StatusStore::new());
        let normalizer = detached_normalizer(status.clone());
        let (tx, mut rx) = mpsc::unbounded_channel();

        let keep_going = handle_notification(
            Err(notify::Error::generic("inotify queue overflow")),
            &normalizer,
            &tx,
            &status,
        );
        assert!(keep_going);
        let snapshot = status.current();
        assert_eq!(snapshot.state, SyncState::Error);
        assert_eq!(snapshot.message, "fswatch error");
        assert!(rx.try_recv().is_err());

        let event = notify::Event::new(notify::EventKind::Create(
            notify::event::CreateKind::File,
        ))
        .add_path(PathBuf::from("/sync/a.txt"));
        assert!(handle_notification(Ok(event), &normalizer, &tx, &status));

        let observed = rx.try_recv().unwrap();
        assert_eq!(observed.path, PathBuf::from("/sync/a.txt"));
        assert_eq!(observed.operation, LogicalOperation::Create);
    }

    #[test]
    fn test_notification_reports_closed_debouncer() {
        let status = Arc::new(StatusStore::new());
        let normalizer = detached_normalizer(status.clone());
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);

        let event = notify::Event::new(notify::EventKind::Create(
            notify::event::CreateKind::File,
        ))
        .add_path(PathBuf::from("/sync/a.txt"));
        assert!(!handle_notification(Ok(event), &normalizer, &tx, &status));
    }

    #[test]
    fn test_change_on_root_reads_as_dot() {
        let status = StatusStore::new();
        let queue = RelayQueue::new(4);
        let mut debouncer = Debouncer::new(Duration::ZERO);
        debouncer.record_at(
            PathBuf::from("/sync"),
            LogicalOperation::AttributeChange,
            Instant::now(),
        );

        flush(&mut debouncer, &queue, &status, Path::new("/sync"));

        assert_eq!(status.current().last_event.as_deref(), Some("CHMOD ."));
        assert_eq!(
            relative_to_root(Path::new("/elsewhere/x"), Path::new("/sync")),
            PathBuf::from("/elsewhere/x")
        );
    }

    #[tokio::test]
    async fn test_due_change_released_during_event_flood() {
        let (observed_tx, observed_rx) = mpsc::unbounded_channel();
        let queue = RelayQueue::new(16);
        let consumer = queue.consumer();
        let cancel = CancellationToken::new();

        observed_tx
            .send(Observed {
                path: PathBuf::from("/sync/quiet.txt"),
                operation: LogicalOperation::Write,
            })
            .unwrap();

        let debounce = tokio::spawn(run_debouncer(
            observed_rx,
            Debouncer::new(Duration::from_millis(100)),
            Duration::from_millis(20),
            queue.clone(),
            Arc::new(StatusStore::new()),
            PathBuf::from("/sync"),
            cancel.clone(),
        ));

        // Keep one path busy so its window never closes
        let flood_cancel = cancel.clone();
        let flood = tokio::spawn(async move {
            while !flood_cancel.is_cancelled() {
                for _ in 0..256 {
                    let busy = Observed {
                        path: PathBuf::from("/sync/busy.log"),
                        operation: LogicalOperation::Write,
                    };
                    if observed_tx.send(busy).is_err() {
                        return;
                    }
                }
                tokio::task::yield_now().await;
            }
        });

        let started = Instant::now();
        let released = tokio::time::timeout(
            Duration::from_secs(2),
            consumer.dequeue(&CancellationToken::new()),
        )
        .await
        .expect("due change starved by incoming events")
        .unwrap();
        assert_eq!(released.path, PathBuf::from("/sync/quiet.txt"));
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(!flood.is_finished());

        cancel.cancel();
        debounce.await.unwrap();
        flood.await.unwrap();
    }

    #[test]
    fn test_flush_writes_relative_summary_even_when_queue_full() {
        let queue = RelayQueue::new(1);
        queue.enqueue(crate::queue::QueuedChange {
            path: PathBuf::from("/sync/filler"),
            operation: LogicalOperation::Write,
            observed_at: Utc::now(),
        });
        let status = StatusStore::new();
        let mut debouncer = Debouncer::new(Duration::ZERO);
        debouncer.record_at(
            PathBuf::from("/sync/docs/a.txt"),
            LogicalOperation::Create,
            Instant::now(),
        );

        flush(&mut debouncer, &queue, &status, Path::new("/sync"));

        let snapshot = status.current();
        assert_eq!(snapshot.last_event.as_deref(), Some("CREATE docs/a.txt"));
        assert_eq!(snapshot.recent_events.len(), 1);
        assert_eq!(queue.len(), 1);
        assert!(!debouncer.has_pending());
    }
}
