//! Ignore policy applied to every path before normalization.

use std::borrow::Cow;
use std::path::{Path, PathBuf};

use glob::Pattern;

use crate::config::Settings;

/// Suffixes of editor swap files and OS metadata that never sync.
const BUILTIN_SUFFIXES: &[&str] = &[".swp", ".tmp", "~", ".DS_Store"];

/// Decides whether a path is invisible to the pipeline.
///
/// Rules are evaluated in order and short-circuit on the first match:
/// 1. base name is `.` or `..`
/// 2. path equals a reserved operational path (log file, metadata store, socket)
/// 3. base name matches a configured glob pattern
/// 4. base name ends with a built-in suffix
#[derive(Debug, Clone, Default)]
pub struct IgnorePolicy {
    reserved: Vec<PathBuf>,
    patterns: Vec<Pattern>,
}

impl IgnorePolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the policy from settings: three reserved paths plus glob patterns.
    pub fn from_settings(settings: &Settings) -> Self {
        let mut policy = Self::new();
        for path in [
            settings.log_file_path.as_ref(),
            settings.database_path.as_ref(),
            settings.socket_path.as_ref(),
        ]
        .into_iter()
        .flatten()
        {
            policy = policy.with_reserved(path.clone());
        }
        policy.with_patterns(&settings.ignore_patterns)
    }

    /// Add a path that is always ignored. Empty paths are skipped.
    pub fn with_reserved(mut self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        if !path.as_os_str().is_empty() {
            self.reserved.push(path);
        }
        self
    }

    /// Add glob patterns matched against the base name.
    ///
    /// Invalid patterns are logged and skipped; they never match anything.
    pub fn with_patterns<S: AsRef<str>>(mut self, patterns: &[S]) -> Self {
        for raw in patterns {
            match Pattern::new(raw.as_ref()) {
                Ok(pattern) => self.patterns.push(pattern),
                Err(e) => {
                    crate::warn_event!(
                        "watcher",
                        "invalid ignore pattern",
                        "'{}': {e}",
                        raw.as_ref()
                    );
                }
            }
        }
        self
    }

    /// Copy of the policy where every reserved path also appears under its
    /// canonical parent directory.
    ///
    /// Notification paths are reported under the canonical sync root, so a
    /// reserved path reached through a symlink would otherwise never match.
    /// Paths whose parent does not exist yet are kept as written.
    pub fn resolved(&self) -> Self {
        let mut policy = self.clone();
        for path in &self.reserved {
            let Some(canonical) = canonical_location(path) else {
                continue;
            };
            if !policy.reserved.contains(&canonical) {
                policy.reserved.push(canonical);
            }
        }
        policy
    }

    pub fn is_ignored(&self, path: &Path) -> bool {
        let base = base_name(path);
        if base == "." || base == ".." {
            return true;
        }

        if self.reserved.iter().any(|reserved| reserved == path) {
            return true;
        }

        if self.patterns.iter().any(|pattern| pattern.matches(&base)) {
            return true;
        }

        BUILTIN_SUFFIXES.iter().any(|suffix| base.ends_with(suffix))
    }
}

/// `path` with its parent directory canonicalized and the file name kept.
fn canonical_location(path: &Path) -> Option<PathBuf> {
    let name = path.file_name()?;
    let parent = path.parent().filter(|p| !p.as_os_str().is_empty())?;
    parent.canonicalize().ok().map(|dir| dir.join(name))
}

/// Last element of the path as written, keeping a trailing `.` or `..`.
///
/// `Path::file_name` normalizes those away, so the raw string is split instead.
fn base_name(path: &Path) -> Cow<'_, str> {
    let raw = path.to_string_lossy();
    let trimmed = raw.trim_end_matches(std::path::is_separator);
    if trimmed.is_empty() {
        return raw;
    }
    match trimmed.rfind(std::path::is_separator) {
        Some(idx) => Cow::Owned(trimmed[idx + 1..].to_string()),
        None => Cow::Owned(trimmed.to_string()),
    }
}
