//! Core pipeline: feature derivation, auto-labeling, batching.

pub mod batch;
pub mod features;
pub mod labeler;

pub use batch::{Batch, BatchAccumulator};
pub use features::{DerivedFeatures, SessionContext};
pub use labeler::{assess, HealthLabel, StressReport};
