//! Operator-facing pipeline status.
//!
//! [`StatusStore`] holds the latest snapshot and a ring of recent events;
//! [`StatusService`] is the seam external transports use to read it.

mod service;
mod store;

pub use service::{DEFAULT_WATCH_PERIOD, LocalStatusService, StatusService};
pub use store::{
    DEFAULT_MAX_EVENTS, RecentEvent, StatusSnapshot, StatusStore, StatusUpdate, SyncState,
};
