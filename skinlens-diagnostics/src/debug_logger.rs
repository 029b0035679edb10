//! Structured debug logging and the bounded diagnostic log

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use skinlens_core::SkinLensError;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Number of entries kept by [`DiagnosticLog::default`]
pub const DEFAULT_LOG_CAPACITY: usize = 100;

/// One timestamped lifecycle message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiagnosticLogEntry {
    /// When the entry was recorded
    pub timestamp: DateTime<Utc>,
    /// Human readable description of the event
    pub message: String,
}

impl fmt::Display for DiagnosticLogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.timestamp.format("%H:%M:%S%.3f"), self.message)
    }
}

/// Bounded, append-only log of stream and video lifecycle events.
///
/// Clones share the same buffer. Once full, the oldest entry is dropped for
/// every new one. Nothing here is persisted and nothing reads it to make
/// control decisions.
#[derive(Debug, Clone)]
pub struct DiagnosticLog {
    entries: Arc<RwLock<VecDeque<DiagnosticLogEntry>>>,
    capacity: usize,
}

impl DiagnosticLog {
    /// Create a log holding at most `capacity` entries (minimum 1)
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Arc::new(RwLock::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    /// Append a message stamped with the current time
    pub fn record(&self, message: impl Into<String>) {
        let entry = DiagnosticLogEntry {
            timestamp: Utc::now(),
            message: message.into(),
        };
        tracing::trace!(target: "skinlens::diagnostics", "{}", entry.message);

        let mut entries = self.entries.write();
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Copy of the current entries, oldest first
    pub fn snapshot(&self) -> Vec<DiagnosticLogEntry> {
        self.entries.read().iter().cloned().collect()
    }

    /// Most recent entry, if any
    pub fn last(&self) -> Option<DiagnosticLogEntry> {
        self.entries.read().back().cloned()
    }

    /// Number of entries currently held
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the log holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Maximum number of retained entries
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

impl Default for DiagnosticLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_LOG_CAPACITY)
    }
}

/// Initialize the global `tracing` subscriber.
///
/// `RUST_LOG` wins over `default_directive` when set. Returns `Ok(false)` when
/// a global subscriber was already installed.
pub fn init_logging(default_directive: &str) -> Result<bool, SkinLensError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_directive).map_err(|e| {
            SkinLensError::InvalidConfiguration {
                message: format!("invalid log directive '{}': {}", default_directive, e),
            }
        })?,
    };

    match tracing_subscriber::fmt().with_env_filter(filter).try_init() {
        Ok(()) => Ok(true),
        Err(_) => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    #[test]
    fn test_log_drops_oldest_when_full() {
        let log = DiagnosticLog::with_capacity(3);
        for i in 0..5 {
            log.record(format!("event {}", i));
        }

        let messages: Vec<String> = log.snapshot().into_iter().map(|e| e.message).collect();
        assert_eq!(messages, vec!["event 2", "event 3", "event 4"]);
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn test_clones_share_buffer() {
        let log = DiagnosticLog::default();
        let other = log.clone();
        other.record("playing");

        assert_eq!(log.len(), 1);
        assert_eq!(log.last().unwrap().message, "playing");
        assert_eq!(log.capacity(), DEFAULT_LOG_CAPACITY);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let log = DiagnosticLog::with_capacity(0);
        log.record("a");
        log.record("b");
        assert_eq!(log.len(), 1);
        assert_eq!(log.last().unwrap().message, "b");
    }

    #[test]
    fn test_clear() {
        let log = DiagnosticLog::default();
        log.record("stalled");
        log.clear();
        assert!(log.is_empty());
    }

    #[test]
    fn test_entry_display_contains_message() {
        let log = DiagnosticLog::default();
        log.record("loadedmetadata 1280x720");
        let rendered = log.last().unwrap().to_string();
        assert!(rendered.ends_with("loadedmetadata 1280x720"));
        assert!(rendered.starts_with('['));
    }

    #[test]
    fn test_init_logging_twice_is_not_an_error() {
        assert_ok!(init_logging("info"));
        let installed_again = assert_ok!(init_logging("info"));
        assert!(!installed_again);
    }
}
