//! Replay collector: re-emits recorded frames from a JSONL capture.
//!
//! Reads one `SensorFrame` per line and feeds them through the same channel
//! interface the live pipeline consumes, optionally paced to simulate the
//! original polling cadence. When the file is exhausted the sender drops
//! and the downstream receiver disconnects, which is how the pipeline
//! learns the session ended.

use crate::collector::types::SensorFrame;
use crossbeam_channel::{bounded, Receiver, Sender};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::warn;

/// Configuration for frame replay.
#[derive(Debug, Clone)]
pub struct ReplayConfig {
    pub path: PathBuf,
    /// Delay between frames; `None` replays as fast as possible
    pub interval: Option<Duration>,
}

/// Errors that can occur during replay.
#[derive(Debug)]
pub enum ReplayError {
    AlreadyRunning,
    /// The replay ran once and its channel is spent; it cannot restart
    Finished,
    Io(String),
}

impl std::fmt::Display for ReplayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReplayError::AlreadyRunning => write!(f, "Replay is already running"),
            ReplayError::Finished => {
                write!(f, "Replay has already run and cannot be restarted")
            }
            ReplayError::Io(e) => write!(f, "Replay input error: {e}"),
        }
    }
}

impl std::error::Error for ReplayError {}

/// Replays frames from a capture file on a background thread.
pub struct ReplayCollector {
    config: ReplayConfig,
    sender: Option<Sender<SensorFrame>>,
    receiver: Receiver<SensorFrame>,
    running: Arc<AtomicBool>,
}

impl ReplayCollector {
    pub fn new(config: ReplayConfig) -> Self {
        let (sender, receiver) = bounded(10_000);
        Self {
            config,
            sender: Some(sender),
            receiver,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start replaying frames.
    ///
    /// The input file is opened up front so a bad path fails here rather
    /// than silently on the thread. Unparseable lines are skipped with a
    /// warning; a capture interrupted mid-write should not kill the replay.
    pub fn start(&mut self) -> Result<(), ReplayError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(ReplayError::AlreadyRunning);
        }
        let Some(sender) = self.sender.take() else {
            return Err(ReplayError::Finished);
        };

        let file = File::open(&self.config.path).map_err(|e| ReplayError::Io(e.to_string()))?;
        let interval = self.config.interval;
        let running = Arc::clone(&self.running);
        running.store(true, Ordering::SeqCst);

        thread::spawn(move || {
            let reader = BufReader::new(file);
            for (index, line) in reader.lines().enumerate() {
                if !running.load(Ordering::SeqCst) {
                    break;
                }
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        warn!(error = %e, "replay read failed, stopping");
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<SensorFrame>(&line) {
                    Ok(frame) => {
                        if sender.send(frame).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(line = index + 1, error = %e, "skipping unparseable frame");
                    }
                }
                if let Some(delay) = interval {
                    thread::sleep(delay);
                }
            }
            running.store(false, Ordering::SeqCst);
            // sender drops here, disconnecting the receiver
        });
        Ok(())
    }

    /// Stop replaying.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Get the receiver for replayed frames.
    pub fn receiver(&self) -> &Receiver<SensorFrame> {
        &self.receiver
    }
}
