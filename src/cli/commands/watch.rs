//! Watch command - run the pipeline in the foreground.
//!
//! The command doubles as a minimal sync engine: it drains the relay queue,
//! marks the status store `Syncing` around each change, and prints it. A
//! status watch streams snapshots to stderr on a fixed period.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::Settings;
use crate::queue::{QueuedChange, RelayConsumer};
use crate::status::{
    LocalStatusService, StatusService, StatusSnapshot, StatusStore, StatusUpdate, SyncState,
};
use crate::watcher::Pipeline;

/// Arguments for the watch command.
pub struct WatchArgs {
    pub root: Option<PathBuf>,
    pub status_interval: u64,
    pub json: bool,
}

/// Run the watch command until Ctrl-C.
pub async fn run(args: WatchArgs, settings: Settings) -> anyhow::Result<()> {
    let WatchArgs {
        root,
        status_interval,
        json,
    } = args;

    let mut builder = Pipeline::builder().settings(&settings);
    if let Some(root) = root {
        builder = builder.root(root);
    }
    let pipeline = builder.build()?;
    let status = pipeline.status();

    let cancel = CancellationToken::new();
    let handle = pipeline.start(cancel.clone())?;
    eprintln!("Watching {}", handle.root().display());

    let engine = tokio::spawn(drain_queue(
        pipeline.consumer(),
        status.clone(),
        cancel.clone(),
        json,
    ));

    if status_interval > 0 {
        let service = LocalStatusService::new(status.clone())
            .with_period(Duration::from_secs(status_interval));
        let mut snapshots = service.watch_status(cancel.child_token()).await;
        tokio::spawn(async move {
            while let Some(snapshot) = snapshots.recv().await {
                print_snapshot(&snapshot, json);
            }
        });
    }

    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            if let Err(e) = res {
                crate::warn_event!("pipeline", "Ctrl-C listener failed", "{e}");
            }
            crate::log_event!("pipeline", "shutdown requested");
        }
        _ = cancel.cancelled() => {}
    }

    cancel.cancel();
    handle.shutdown().await;
    if let Err(e) = engine.await {
        crate::warn_event!("queue", "consumer ended abnormally", "{e}");
    }
    status.update(StatusUpdate::new(SyncState::Idle, "idle"));
    eprintln!("Stopped");

    Ok(())
}

/// Consume changes until cancelled, then report what was left behind.
async fn drain_queue(
    consumer: RelayConsumer,
    status: Arc<StatusStore>,
    cancel: CancellationToken,
    json: bool,
) {
    while let Some(change) = consumer.dequeue(&cancel).await {
        status.update(StatusUpdate::new(SyncState::Syncing, "processing event"));
        print_change(&change, json);
        status.update(StatusUpdate::new(SyncState::Idle, "idle"));
    }

    let mut abandoned = 0usize;
    while consumer.try_dequeue().is_some() {
        abandoned += 1;
    }
    if abandoned > 0 {
        crate::log_event!("queue", "abandoned", "{abandoned} queued changes at shutdown");
    }
}

fn print_change(change: &QueuedChange, json: bool) {
    if json {
        match serde_json::to_string(change) {
            Ok(line) => println!("{line}"),
            Err(e) => crate::warn_event!("queue", "encode failed", "{e}"),
        }
    } else {
        println!(
            "{} {:<6} {}",
            change.observed_at.format("%H:%M:%S%.3f"),
            change.operation,
            change.path.display()
        );
    }
}

fn print_snapshot(snapshot: &StatusSnapshot, json: bool) {
    if json {
        match serde_json::to_string(snapshot) {
            Ok(line) => eprintln!("{line}"),
            Err(e) => crate::warn_event!("status", "encode failed", "{e}"),
        }
    } else {
        let last = snapshot.last_event.as_deref().unwrap_or("-");
        eprintln!(
            "{}: {} (last: {last}, recent: {})",
            snapshot.state,
            snapshot.message,
            snapshot.recent_events.len()
        );
    }
}
