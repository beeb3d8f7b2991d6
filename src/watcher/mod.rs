//! Filesystem change detection for the sync root.
//!
//! # Architecture
//!
//! ```text
//! Pipeline
//!   - WatchSet     (non-recursive notify subscriptions, insert-only)
//!   - Normalizer   (IgnorePolicy + RawOps -> LogicalOperation)
//!   - Debouncer    (one pending change per path, priority merge)
//!         |
//!    +----+----------------+
//!    |                     |
//! RelayQueue          StatusStore
//! (sync engine)       (operators)
//! ```

mod debouncer;
mod error;
mod ignore;
mod normalizer;
mod operation;
mod pipeline;
mod watch_set;

pub use debouncer::{DEFAULT_DEBOUNCE_WINDOW, DEFAULT_TICK_PERIOD, Debouncer, PendingChange};
pub use error::WatchError;
pub use ignore::IgnorePolicy;
pub use normalizer::{Normalizer, Observed};
pub use operation::{LogicalOperation, RawEvent, RawOps};
pub use pipeline::{Pipeline, PipelineBuilder, PipelineHandle};
pub use watch_set::{Subscribed, WatchSet};
