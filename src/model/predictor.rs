//! Inference service: live predictions with artifact hot-reload.
//!
//! Prediction itself is a pure function of an artifact and a frame. The
//! service wraps it with lazy loading keyed on the metadata file's
//! modification time: whenever a retrain publishes a new artifact, the next
//! prediction picks it up without a restart. A missing or unreadable
//! artifact degrades to `Unavailable`; the data pipeline never depends on a
//! model existing.

use crate::collector::types::SensorFrame;
use crate::core::features::DerivedFeatures;
use crate::core::labeler::HealthLabel;
use crate::model::artifact::ModelArtifact;
use crate::model::dataset::feature_vector;
use crate::stats::SharedStats;
use crossbeam_channel::Receiver;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::thread::{self, JoinHandle};
use std::time::SystemTime;
use tracing::{debug, info, warn};

/// One prediction over a frame.
#[derive(Debug, Clone)]
pub struct PredictionResult {
    pub label: HealthLabel,
    /// Vote fraction behind the winning label
    pub confidence: f64,
    /// Full distribution over the classes the model was trained on
    pub probabilities: Vec<(HealthLabel, f64)>,
}

/// What the service produced for a request.
#[derive(Debug, Clone)]
pub enum PredictionOutcome {
    Ready(PredictionResult),
    Unavailable { reason: String },
}

/// One unit of work for the inference worker.
#[derive(Debug, Clone)]
pub struct InferenceRequest {
    pub frame: SensorFrame,
    pub derived: DerivedFeatures,
    pub stress_score: u32,
}

struct LoadedModel {
    artifact: Arc<ModelArtifact>,
    modified: SystemTime,
}

/// Serves predictions from the newest artifact in a model directory.
pub struct InferenceService {
    model_dir: PathBuf,
    loaded: RwLock<Option<LoadedModel>>,
}

impl InferenceService {
    /// Create a service over `model_dir`. The directory does not need to
    /// contain a model yet.
    pub fn new(model_dir: impl Into<PathBuf>) -> Self {
        Self {
            model_dir: model_dir.into(),
            loaded: RwLock::new(None),
        }
    }

    pub fn model_dir(&self) -> &Path {
        &self.model_dir
    }

    /// The artifact currently serving, if any.
    pub fn current(&self) -> Option<Arc<ModelArtifact>> {
        self.loaded
            .read()
            .ok()
            .and_then(|guard| guard.as_ref().map(|l| Arc::clone(&l.artifact)))
    }

    /// Reload the artifact if the one on disk is newer than the one in
    /// memory. Returns whether a (re)load happened. A failed load keeps the
    /// previous model serving.
    pub fn refresh(&self) -> bool {
        let Ok(disk_modified) = ModelArtifact::modified_at(&self.model_dir) else {
            return false;
        };

        let up_to_date = self
            .loaded
            .read()
            .ok()
            .and_then(|guard| guard.as_ref().map(|l| l.modified == disk_modified))
            .unwrap_or(false);
        if up_to_date {
            return false;
        }

        match ModelArtifact::load(&self.model_dir) {
            Ok(artifact) => {
                info!(
                    accuracy = artifact.metadata.accuracy,
                    classes = artifact.metadata.classes.len(),
                    "model artifact loaded"
                );
                if let Ok(mut guard) = self.loaded.write() {
                    *guard = Some(LoadedModel {
                        artifact: Arc::new(artifact),
                        modified: disk_modified,
                    });
                    return true;
                }
                false
            }
            Err(e) => {
                warn!(error = %e, "model artifact on disk is unusable, keeping previous");
                false
            }
        }
    }

    /// Predict over a frame, reloading the artifact first if it changed.
    pub fn predict(
        &self,
        frame: &SensorFrame,
        derived: &DerivedFeatures,
        stress_score: u32,
    ) -> PredictionOutcome {
        self.refresh();
        match self.current() {
            Some(artifact) => {
                PredictionOutcome::Ready(predict_with(&artifact, frame, derived, stress_score))
            }
            None => PredictionOutcome::Unavailable {
                reason: format!("no trained model in {}", self.model_dir.display()),
            },
        }
    }
}

/// Pure prediction against a specific artifact.
///
/// The input vector is assembled from the artifact's own feature name list,
/// so a model always sees its features in the order it was trained with.
pub fn predict_with(
    artifact: &ModelArtifact,
    frame: &SensorFrame,
    derived: &DerivedFeatures,
    stress_score: u32,
) -> PredictionResult {
    let vector = feature_vector(
        frame,
        derived,
        stress_score,
        &artifact.metadata.feature_names,
    );
    let scaled = artifact.scaler.transform_row(&vector);
    let (class, probabilities) = artifact.forest.predict(&scaled);

    let label = artifact
        .metadata
        .classes
        .get(class)
        .copied()
        .unwrap_or(HealthLabel::Normal);
    let confidence = probabilities.get(class).copied().unwrap_or(0.0);
    let probabilities = artifact
        .metadata
        .classes
        .iter()
        .copied()
        .zip(probabilities)
        .collect();

    PredictionResult {
        label,
        confidence,
        probabilities,
    }
}

/// Spawn the inference worker thread.
///
/// The worker drains requests until the channel's senders are dropped. It
/// only reads the frames it is handed; dropped requests (the loop uses
/// `try_send`) are fine because every labeled record was already persisted
/// before inference was attempted.
pub fn spawn_inference_worker(
    service: Arc<InferenceService>,
    requests: Receiver<InferenceRequest>,
    stats: SharedStats,
) -> JoinHandle<()> {
    thread::spawn(move || {
        for request in requests.iter() {
            match service.predict(&request.frame, &request.derived, request.stress_score) {
                PredictionOutcome::Ready(result) => {
                    stats.record_prediction();
                    info!(
                        session = request.frame.session_id.as_str(),
                        label = result.label.as_str(),
                        confidence = result.confidence,
                        "health prediction"
                    );
                }
                PredictionOutcome::Unavailable { reason } => {
                    stats.record_prediction_unavailable();
                    debug!(reason = reason.as_str(), "prediction skipped");
                }
            }
        }
        debug!("inference worker stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::labeler::assess;
    use crate::model::dataset::TrainingRecord;
    use crate::model::forest::ForestParams;
    use crate::model::train::train;
    use crossbeam_channel::bounded;

    fn labeled(frame: SensorFrame) -> TrainingRecord {
        let derived = DerivedFeatures::default();
        let report = assess(&frame, &derived);
        TrainingRecord {
            frame,
            derived,
            engine_stress_score: report.score,
            health_status: report.label,
        }
    }

    fn calm_frame(rpm: f64) -> SensorFrame {
        let mut frame = SensorFrame::new("s1");
        frame.rpm = Some(rpm);
        frame.speed = Some(50.0);
        frame.coolant_temp = Some(88.0);
        frame.engine_load = Some(25.0);
        frame.throttle_pos = Some(12.0);
        frame.control_module_voltage = Some(14.0);
        frame
    }

    fn hot_frame(rpm: f64) -> SensorFrame {
        let mut frame = calm_frame(rpm);
        frame.coolant_temp = Some(112.0);
        frame.engine_load = Some(90.0);
        frame
    }

    fn toy_artifact() -> ModelArtifact {
        let mut records = Vec::new();
        for i in 0..20 {
            records.push(labeled(calm_frame(1000.0 + 40.0 * i as f64)));
            records.push(labeled(hot_frame(3000.0 + 40.0 * i as f64)));
        }
        let params = ForestParams {
            n_trees: 25,
            max_depth: 5,
            min_weight_split: 2.0,
            min_weight_leaf: 1.0,
            seed: 42,
        };
        train(&records, params).unwrap().0
    }

    #[test]
    fn test_predict_with_separates_regimes() {
        let artifact = toy_artifact();
        let derived = DerivedFeatures::default();

        let calm = predict_with(&artifact, &calm_frame(1500.0), &derived, 0);
        assert_eq!(calm.label, HealthLabel::Normal);
        assert!(calm.confidence > 0.5);

        let hot = predict_with(&artifact, &hot_frame(3500.0), &derived, 15);
        assert_eq!(hot.label, HealthLabel::Critical);

        let total: f64 = hot.probabilities.iter().map(|(_, p)| p).sum();
        assert!((total - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_service_unavailable_without_model() {
        let dir = tempfile::tempdir().unwrap();
        let service = InferenceService::new(dir.path());

        let outcome = service.predict(&calm_frame(1500.0), &DerivedFeatures::default(), 0);
        assert!(matches!(outcome, PredictionOutcome::Unavailable { .. }));
        assert!(service.current().is_none());
    }

    #[test]
    fn test_service_loads_published_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let service = InferenceService::new(dir.path());
        assert!(!service.refresh());

        toy_artifact().save(dir.path()).unwrap();
        assert!(service.refresh());
        // Unchanged on disk: no reload.
        assert!(!service.refresh());

        let outcome = service.predict(&hot_frame(3200.0), &DerivedFeatures::default(), 15);
        match outcome {
            PredictionOutcome::Ready(result) => assert_eq!(result.label, HealthLabel::Critical),
            other => panic!("expected Ready, got {other:?}"),
        }
    }

    #[test]
    fn test_service_picks_up_republished_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let service = InferenceService::new(dir.path());

        toy_artifact().save(dir.path()).unwrap();
        assert!(service.refresh());

        std::thread::sleep(std::time::Duration::from_millis(20));
        toy_artifact().save(dir.path()).unwrap();
        assert!(service.refresh(), "newer metadata mtime should reload");
    }

    #[test]
    fn test_worker_counts_outcomes() {
        let dir = tempfile::tempdir().unwrap();
        toy_artifact().save(dir.path()).unwrap();

        let service = Arc::new(InferenceService::new(dir.path()));
        let stats = crate::stats::create_shared_stats();
        let (tx, rx) = bounded(8);
        let handle = spawn_inference_worker(service, rx, Arc::clone(&stats));

        tx.send(InferenceRequest {
            frame: calm_frame(1500.0),
            derived: DerivedFeatures::default(),
            stress_score: 0,
        })
        .unwrap();
        drop(tx);
        handle.join().unwrap();

        assert_eq!(stats.snapshot().predictions_made, 1);
        assert_eq!(stats.snapshot().predictions_unavailable, 0);
    }
}
