//! Collection counters.
//!
//! Tracks what the agent has done without storing any of the data itself;
//! with persistence enabled the totals accumulate across runs. Counters are
//! lock-free so the poll loop and the inference worker can both update them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counters for the current agent session.
#[derive(Debug)]
pub struct SessionStats {
    /// Frames received from the collector
    frames_read: AtomicU64,
    /// Labeled records handed to the accumulator
    records_labeled: AtomicU64,
    /// Full or partial batches persisted
    batches_stored: AtomicU64,
    /// Predictions served by the inference worker
    predictions_made: AtomicU64,
    /// Inference requests that found no usable model
    predictions_unavailable: AtomicU64,
    session_start: DateTime<Utc>,
    persist_path: Option<PathBuf>,
}

impl SessionStats {
    pub fn new() -> Self {
        Self {
            frames_read: AtomicU64::new(0),
            records_labeled: AtomicU64::new(0),
            batches_stored: AtomicU64::new(0),
            predictions_made: AtomicU64::new(0),
            predictions_unavailable: AtomicU64::new(0),
            session_start: Utc::now(),
            persist_path: None,
        }
    }

    /// Create stats with persistence, resuming counters from a previous run
    /// when the file exists.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut stats = Self::new();
        stats.persist_path = Some(path);

        if let Err(e) = stats.load() {
            eprintln!("Note: Could not load previous session stats: {e}");
        }

        stats
    }

    pub fn record_frame(&self) {
        self.frames_read.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_labeled(&self) {
        self.records_labeled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_batch_stored(&self) {
        self.batches_stored.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_prediction(&self) {
        self.predictions_made.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_prediction_unavailable(&self) {
        self.predictions_unavailable.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the current counter values.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_read: self.frames_read.load(Ordering::Relaxed),
            records_labeled: self.records_labeled.load(Ordering::Relaxed),
            batches_stored: self.batches_stored.load(Ordering::Relaxed),
            predictions_made: self.predictions_made.load(Ordering::Relaxed),
            predictions_unavailable: self.predictions_unavailable.load(Ordering::Relaxed),
            session_start: self.session_start,
            session_duration_secs: (Utc::now() - self.session_start).num_seconds() as u64,
        }
    }

    /// Get a summary string for display.
    ///
    /// Counters resume from disk when persistence is enabled, so the totals
    /// are cumulative across runs; only the duration is this run's.
    pub fn summary(&self) -> String {
        let s = self.snapshot();
        format!(
            "Collection Statistics (cumulative):\n\
             - Frames read: {}\n\
             - Records labeled: {}\n\
             - Batches stored: {}\n\
             - Predictions made: {}\n\
             - Predictions unavailable: {}\n\
             - This run: {} seconds",
            s.frames_read,
            s.records_labeled,
            s.batches_stored,
            s.predictions_made,
            s.predictions_unavailable,
            s.session_duration_secs
        )
    }

    /// Save counters to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let snapshot = self.snapshot();
            let persisted = PersistedStats {
                frames_read: snapshot.frames_read,
                records_labeled: snapshot.records_labeled,
                batches_stored: snapshot.batches_stored,
                predictions_made: snapshot.predictions_made,
                predictions_unavailable: snapshot.predictions_unavailable,
                last_updated: Utc::now(),
            };

            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;
            std::fs::write(path, json)?;
        }
        Ok(())
    }

    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let persisted: PersistedStats =
                    serde_json::from_str(&content).map_err(std::io::Error::other)?;

                self.frames_read
                    .store(persisted.frames_read, Ordering::Relaxed);
                self.records_labeled
                    .store(persisted.records_labeled, Ordering::Relaxed);
                self.batches_stored
                    .store(persisted.batches_stored, Ordering::Relaxed);
                self.predictions_made
                    .store(persisted.predictions_made, Ordering::Relaxed);
                self.predictions_unavailable
                    .store(persisted.predictions_unavailable, Ordering::Relaxed);
            }
        }
        Ok(())
    }

    /// Reset all counters.
    pub fn reset(&self) {
        self.frames_read.store(0, Ordering::Relaxed);
        self.records_labeled.store(0, Ordering::Relaxed);
        self.batches_stored.store(0, Ordering::Relaxed);
        self.predictions_made.store(0, Ordering::Relaxed);
        self.predictions_unavailable.store(0, Ordering::Relaxed);
    }
}

impl Default for SessionStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of session counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub frames_read: u64,
    pub records_labeled: u64,
    pub batches_stored: u64,
    pub predictions_made: u64,
    pub predictions_unavailable: u64,
    pub session_start: DateTime<Utc>,
    pub session_duration_secs: u64,
}

/// Stats format for persistence.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedStats {
    frames_read: u64,
    records_labeled: u64,
    batches_stored: u64,
    predictions_made: u64,
    predictions_unavailable: u64,
    last_updated: DateTime<Utc>,
}

/// Thread-safe shared session stats.
pub type SharedStats = Arc<SessionStats>;

pub fn create_shared_stats() -> SharedStats {
    Arc::new(SessionStats::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counting() {
        let stats = SessionStats::new();

        stats.record_frame();
        stats.record_frame();
        stats.record_prediction();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.frames_read, 2);
        assert_eq!(snapshot.predictions_made, 1);
        assert_eq!(snapshot.batches_stored, 0);
    }

    #[test]
    fn test_reset() {
        let stats = SessionStats::new();
        stats.record_labeled();
        stats.record_batch_stored();
        stats.reset();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.records_labeled, 0);
        assert_eq!(snapshot.batches_stored, 0);
    }

    #[test]
    fn test_save_and_resume() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.json");

        let stats = SessionStats::with_persistence(path.clone());
        stats.record_frame();
        stats.record_prediction_unavailable();
        stats.save().unwrap();

        let resumed = SessionStats::with_persistence(path);
        let snapshot = resumed.snapshot();
        assert_eq!(snapshot.frames_read, 1);
        assert_eq!(snapshot.predictions_unavailable, 1);
    }

    #[test]
    fn test_summary_labels_totals_as_cumulative() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.json");

        let stats = SessionStats::with_persistence(path.clone());
        stats.record_frame();
        stats.save().unwrap();

        // A second run resumes the counters, so the summary must not claim
        // the totals belong to one session.
        let resumed = SessionStats::with_persistence(path);
        resumed.record_frame();
        let summary = resumed.summary();
        assert!(summary.contains("Collection Statistics (cumulative)"));
        assert!(summary.contains("Frames read: 2"));
        assert!(summary.contains("Predictions made"));
        assert!(!summary.contains("Session Statistics"));
    }
}
