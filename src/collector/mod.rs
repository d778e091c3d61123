//! Frame sources for the vehicle health agent.
//!
//! Both sources feed the pipeline through the same channel interface:
//! frames arrive on a bounded crossbeam channel and a disconnect means the
//! source is done.

pub mod replay;
pub mod synthetic;
pub mod types;

pub use replay::{ReplayCollector, ReplayConfig, ReplayError};
pub use synthetic::{SyntheticCollector, SyntheticGenerator};
pub use types::SensorFrame;
