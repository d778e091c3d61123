//! Model lifecycle: dataset, scaling, ensemble, training, inference.

pub mod artifact;
pub mod dataset;
pub mod forest;
pub mod predictor;
pub mod scaler;
pub mod train;

pub use artifact::{ArtifactMetadata, ModelArtifact};
pub use dataset::{TrainingRecord, FEATURE_COLUMNS};
pub use forest::{ForestParams, HealthForest};
pub use predictor::{InferenceRequest, InferenceService, PredictionOutcome, PredictionResult};
pub use scaler::StandardScaler;
pub use train::{train, TrainError, TrainReport};
