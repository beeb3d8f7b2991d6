//! Raw OS event flags and the closed set of logical operations.
//!
//! `notify` reports an [`EventKind`] per event; it is first flattened into a
//! [`RawOps`] bitmask per path and then collapsed to a single
//! [`LogicalOperation`] by fixed priority.

use std::fmt;
use std::path::PathBuf;

use bitflags::bitflags;
use notify::event::{EventKind, ModifyKind, RenameMode};
use serde::{Deserialize, Serialize};

bitflags! {
    /// Raw operation bits observed for one path in one OS notification.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RawOps: u8 {
        const CREATE = 0b0000_0001;
        const WRITE  = 0b0000_0010;
        const REMOVE = 0b0000_0100;
        const RENAME = 0b0000_1000;
        const CHMOD  = 0b0001_0000;
    }
}

impl RawOps {
    /// Bits carried by a notify event kind.
    ///
    /// The destination side of a rename is reported as `CREATE` so a directory
    /// moved into the tree gets subscribed like a freshly created one.
    pub fn from_kind(kind: &EventKind) -> Self {
        match kind {
            EventKind::Create(_) => RawOps::CREATE,
            EventKind::Remove(_) => RawOps::REMOVE,
            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => RawOps::CREATE,
            EventKind::Modify(ModifyKind::Name(_)) => RawOps::RENAME,
            EventKind::Modify(ModifyKind::Metadata(_)) => RawOps::CHMOD,
            EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Any | ModifyKind::Other) => {
                RawOps::WRITE
            }
            EventKind::Access(_) | EventKind::Any | EventKind::Other => RawOps::empty(),
        }
    }
}

/// Ephemeral `(path, bitmask)` pair handed to the normalizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    pub path: PathBuf,
    pub ops: RawOps,
}

impl RawEvent {
    pub fn new(path: impl Into<PathBuf>, ops: RawOps) -> Self {
        Self {
            path: path.into(),
            ops,
        }
    }

    /// Split a notify event into one raw event per affected path.
    ///
    /// A `RenameMode::Both` event lists `[from, to]`: the source is a rename,
    /// the destination a create.
    pub fn from_notify(event: &notify::Event) -> Vec<RawEvent> {
        if matches!(
            event.kind,
            EventKind::Modify(ModifyKind::Name(RenameMode::Both))
        ) && event.paths.len() == 2
        {
            return vec![
                RawEvent::new(event.paths[0].clone(), RawOps::RENAME),
                RawEvent::new(event.paths[1].clone(), RawOps::CREATE),
            ];
        }

        let ops = RawOps::from_kind(&event.kind);
        event
            .paths
            .iter()
            .map(|path| RawEvent::new(path.clone(), ops))
            .collect()
    }
}

/// Normalized change kind communicated downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicalOperation {
    Create,
    Write,
    Remove,
    Rename,
    AttributeChange,
    Unknown,
}

impl LogicalOperation {
    /// Merge priority: `Remove > Rename > Create > Write > AttributeChange`.
    pub fn priority(self) -> u8 {
        match self {
            LogicalOperation::Remove => 5,
            LogicalOperation::Rename => 4,
            LogicalOperation::Create => 3,
            LogicalOperation::Write => 2,
            LogicalOperation::AttributeChange => 1,
            LogicalOperation::Unknown => 0,
        }
    }

    /// Collapse a bitmask to one operation, highest priority bit first.
    pub fn from_raw(ops: RawOps) -> Self {
        if ops.contains(RawOps::REMOVE) {
            LogicalOperation::Remove
        } else if ops.contains(RawOps::RENAME) {
            LogicalOperation::Rename
        } else if ops.contains(RawOps::CREATE) {
            LogicalOperation::Create
        } else if ops.contains(RawOps::WRITE) {
            LogicalOperation::Write
        } else if ops.contains(RawOps::CHMOD) {
            LogicalOperation::AttributeChange
        } else {
            LogicalOperation::Unknown
        }
    }

    /// Keep `self` unless `next` ranks at least as high.
    pub fn merge(self, next: LogicalOperation) -> LogicalOperation {
        if next.priority() >= self.priority() {
            next
        } else {
            self
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            LogicalOperation::Create => "CREATE",
            LogicalOperation::Write => "WRITE",
            LogicalOperation::Remove => "REMOVE",
            LogicalOperation::Rename => "RENAME",
            LogicalOperation::AttributeChange => "CHMOD",
            LogicalOperation::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for LogicalOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.label())
    }
}
