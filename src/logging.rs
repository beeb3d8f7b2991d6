//! Logging setup for the daemon and CLI.
//!
//! Everything goes to stderr so stdout stays free for change and snapshot
//! output. Levels come from the `[logging]` settings section:
//!
//! ```toml
//! [logging]
//! default = "warn"
//!
//! [logging.modules]
//! "treesync::watcher" = "debug"
//! "treesync::queue" = "trace"
//! ```
//!
//! `RUST_LOG` replaces the configured levels entirely when set.

use std::sync::Once;

use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::LoggingConfig;

const FALLBACK_LEVEL: &str = "warn";

static INIT: Once = Once::new();

/// Wall-clock time of day with milliseconds.
struct ClockTime;

impl FormatTime for ClockTime {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%H:%M:%S%.3f"))
    }
}

/// Filter built from the settings section.
///
/// A bad module override is dropped in favour of the default level, and a bad
/// default level falls back to `warn`, so a typo never silences errors.
fn config_filter(config: &LoggingConfig) -> EnvFilter {
    let mut directives = vec![config.default.clone()];
    directives.extend(
        config
            .modules
            .iter()
            .map(|(target, level)| format!("{target}={level}")),
    );

    EnvFilter::try_new(directives.join(","))
        .or_else(|_| EnvFilter::try_new(&config.default))
        .unwrap_or_else(|_| EnvFilter::new(FALLBACK_LEVEL))
}

/// Install the global subscriber. Only the first call has any effect.
pub fn init_with_config(config: &LoggingConfig) {
    INIT.call_once(|| {
        let filter = match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => config_filter(config),
        };

        let layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_timer(ClockTime)
            .with_target(true)
            .with_filter(filter);

        // A test harness may already own the global subscriber.
        let _ = tracing_subscriber::registry().with(layer).try_init();
    });
}

pub fn init() {
    init_with_config(&LoggingConfig::default());
}

/// Info-level event tagged with a component, e.g.
/// `log_event!("watcher", "watching", "{count} directories")`.
#[macro_export]
macro_rules! log_event {
    ($component:expr, $event:expr) => {
        tracing::info!("[{}] {}", $component, $event)
    };
    ($component:expr, $event:expr, $($arg:tt)*) => {
        tracing::info!("[{}] {}: {}", $component, $event, format!($($arg)*))
    };
}

/// Debug-level counterpart of [`log_event!`].
#[macro_export]
macro_rules! debug_event {
    ($component:expr, $event:expr) => {
        tracing::debug!("[{}] {}", $component, $event)
    };
    ($component:expr, $event:expr, $($arg:tt)*) => {
        tracing::debug!("[{}] {}: {}", $component, $event, format!($($arg)*))
    };
}

/// Warn-level counterpart of [`log_event!`], for recoverable faults.
#[macro_export]
macro_rules! warn_event {
    ($component:expr, $event:expr) => {
        tracing::warn!("[{}] {}", $component, $event)
    };
    ($component:expr, $event:expr, $($arg:tt)*) => {
        tracing::warn!("[{}] {}: {}", $component, $event, format!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_overrides_join_default() {
        let mut config = LoggingConfig::default();
        config
            .modules
            .insert("treesync::queue".to_string(), "trace".to_string());

        let filter = config_filter(&config).to_string();
        assert!(filter.contains("treesync::queue=trace"));
        assert!(filter.contains("warn"));
    }

    #[test]
    fn test_bad_override_keeps_default_level() {
        let mut config = LoggingConfig::default();
        config.default = "info".to_string();
        config
            .modules
            .insert("treesync::watcher".to_string(), "loud".to_string());

        let filter = config_filter(&config).to_string();
        assert!(!filter.contains("loud"));
        assert!(filter.contains("info"));
    }

    #[test]
    fn test_init_is_idempotent() {
        init();
        init_with_config(&LoggingConfig::default());
        crate::warn_event!("logging", "still usable");
    }
}
