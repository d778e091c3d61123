//! Vehicle Health Agent - on-device OBD-II telemetry labeling and diagnosis.
//!
//! This library turns a stream of diagnostic-bus sensor frames into a
//! labeled training dataset and serves live health predictions from a model
//! trained on that dataset. Labels come from a deterministic rule table, so
//! the agent bootstraps its own ground truth without manual annotation.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     Vehicle Health Agent                     │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌───────────┐   ┌───────────┐   ┌──────────┐   ┌────────┐  │
//! │  │ Collector │──▶│ Features  │──▶│ Labeler  │──▶│ Batch  │  │
//! │  │(replay/   │   │ (derived) │   │ (rules)  │   │ (store)│  │
//! │  │ synthetic)│   └───────────┘   └──────────┘   └────────┘  │
//! │  └───────────┘                                      │       │
//! │                                                     ▼       │
//! │  ┌───────────┐   ┌───────────────┐          ┌───────────┐  │
//! │  │ Inference │◀──│ Model artifact│◀─────────│ Training  │  │
//! │  │  worker   │   │ (hot reload)  │          │ pipeline  │  │
//! │  └───────────┘   └───────────────┘          └───────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use vehicle_health_agent::collector::SyntheticGenerator;
//! use vehicle_health_agent::core::{assess, SessionContext};
//!
//! let mut generator = SyntheticGenerator::new(42);
//! let mut context = SessionContext::new(generator.session_id().to_string());
//!
//! let frame = generator.next_frame();
//! let derived = context.derive(&frame);
//! let report = assess(&frame, &derived);
//! println!("{} (score {})", report.label, report.score);
//! ```

pub mod collector;
pub mod config;
pub mod core;
pub mod model;
pub mod stats;

// Re-export key types at crate root for convenience
pub use collector::{ReplayCollector, SensorFrame, SyntheticGenerator};
pub use config::Config;
pub use core::{assess, BatchAccumulator, DerivedFeatures, HealthLabel, SessionContext};
pub use model::{InferenceService, ModelArtifact, PredictionOutcome, TrainingRecord};
pub use stats::{SessionStats, SharedStats, StatsSnapshot};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
