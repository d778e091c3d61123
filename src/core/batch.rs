//! Batch accumulation for labeled records.
//!
//! Ingestion runs at roughly one frame per second; persistence and
//! inference both run slower. The accumulator groups records into
//! fixed-size batches for storage and marks every Nth completed batch as an
//! inference trigger, so neither cadence is coupled to the polling tick.

/// A completed batch of records ready for persistence.
#[derive(Debug)]
pub struct Batch<T> {
    pub records: Vec<T>,
    /// Whether this batch should also trigger an inference pass
    pub trigger_inference: bool,
}

/// Groups records into fixed-size batches.
#[derive(Debug)]
pub struct BatchAccumulator<T> {
    batch_size: usize,
    infer_every_batches: u64,
    buffer: Vec<T>,
    completed_batches: u64,
}

impl<T> BatchAccumulator<T> {
    /// Create an accumulator. `batch_size` and `infer_every_batches` are
    /// both clamped to at least 1.
    pub fn new(batch_size: usize, infer_every_batches: u64) -> Self {
        Self {
            batch_size: batch_size.max(1),
            infer_every_batches: infer_every_batches.max(1),
            buffer: Vec::new(),
            completed_batches: 0,
        }
    }

    /// Add a record; returns a batch once `batch_size` records accumulated.
    pub fn push(&mut self, record: T) -> Option<Batch<T>> {
        self.buffer.push(record);
        if self.buffer.len() >= self.batch_size {
            Some(self.complete())
        } else {
            None
        }
    }

    /// Flush whatever is buffered, e.g. on session end or disconnect.
    ///
    /// Partial batches are delivered, never dropped. A flush does not
    /// trigger inference: the session producing the data is already gone.
    pub fn flush(&mut self) -> Option<Batch<T>> {
        if self.buffer.is_empty() {
            return None;
        }
        Some(Batch {
            records: std::mem::take(&mut self.buffer),
            trigger_inference: false,
        })
    }

    /// Number of records currently buffered.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Number of full batches completed so far.
    pub fn completed_batches(&self) -> u64 {
        self.completed_batches
    }

    fn complete(&mut self) -> Batch<T> {
        self.completed_batches += 1;
        Batch {
            records: std::mem::take(&mut self.buffer),
            trigger_inference: self.completed_batches % self.infer_every_batches == 0,
        }
    }
}
