//! Status exposure seam for external transports.
//!
//! A transport (RPC server, socket, HTTP) implements nothing itself: it calls
//! a [`StatusService`] for point queries and forwards the snapshots produced by
//! [`StatusService::watch_status`] to its subscriber.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::store::{StatusSnapshot, StatusStore};

/// Poll period of a status watch exchange.
pub const DEFAULT_WATCH_PERIOD: Duration = Duration::from_secs(2);

#[async_trait]
pub trait StatusService: Send + Sync {
    /// Point query for the latest snapshot.
    async fn get_status(&self) -> StatusSnapshot;

    /// Start a server-streamed watch.
    ///
    /// A snapshot is sent immediately and then once per period until the
    /// receiver is dropped or `cancel` fires.
    async fn watch_status(&self, cancel: CancellationToken) -> mpsc::Receiver<StatusSnapshot>;
}

/// In-process [`StatusService`] backed by a shared [`StatusStore`].
#[derive(Debug, Clone)]
pub struct LocalStatusService {
    store: Arc<StatusStore>,
    period: Duration,
}

impl LocalStatusService {
    pub fn new(store: Arc<StatusStore>) -> Self {
        Self {
            store,
            period: DEFAULT_WATCH_PERIOD,
        }
    }

    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }
}

#[async_trait]
impl StatusService for LocalStatusService {
    async fn get_status(&self) -> StatusSnapshot {
        self.store.current()
    }

    async fn watch_status(&self, cancel: CancellationToken) -> mpsc::Receiver<StatusSnapshot> {
        let (tx, rx) = mpsc::channel(1);
        let store = self.store.clone();
        let period = self.period;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        crate::debug_event!("status", "watch cancelled");
                        break;
                    }
                    _ = tx.closed() => {
                        crate::debug_event!("status", "watcher disconnected");
                        break;
                    }
                    _ = ticker.tick() => {}
                }

                let sent = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    sent = tx.send(store.current()) => sent,
                };
                if sent.is_err() {
                    crate::debug_event!("status", "watcher disconnected");
                    break;
                }
            }
        });

        rx
    }
}
