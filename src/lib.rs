//! Local filesystem change detection and propagation for sync daemons.
//!
//! The pipeline watches a sync root, normalizes OS notifications into a small
//! set of [`LogicalOperation`]s, coalesces bursts per path, and hands the
//! result to a sync engine through a bounded [`RelayQueue`]. A shared
//! [`StatusStore`] keeps operators informed.

pub mod cli;
pub mod config;
pub mod logging;
pub mod queue;
pub mod status;
pub mod watcher;

pub use config::{LoggingConfig, Settings};
pub use queue::{Enqueued, QueuedChange, RelayConsumer, RelayQueue};
pub use status::{
    LocalStatusService, RecentEvent, StatusService, StatusSnapshot, StatusStore, StatusUpdate,
    SyncState,
};
pub use watcher::{
    IgnorePolicy, LogicalOperation, Pipeline, PipelineBuilder, PipelineHandle, WatchError,
};
