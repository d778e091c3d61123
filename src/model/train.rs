//! Training pipeline: quality filter, stratified split, scaling, fitting.
//!
//! The pipeline is deterministic end to end. Filtering keeps records with at
//! most two missing critical channels, the split is stratified per class
//! from a fixed seed, the scaler is fitted on the training split only, and
//! the forest is fitted with balanced bootstrap sampling. The hold-out
//! accuracy recorded in the artifact metadata is measured here.

use crate::core::labeler::HealthLabel;
use crate::model::artifact::{ArtifactError, ArtifactMetadata, ModelArtifact};
use crate::model::dataset::{
    feature_vector, passes_quality_filter, DatasetError, TrainingRecord, FEATURE_COLUMNS,
};
use crate::model::forest::{ForestError, ForestParams, HealthForest};
use crate::model::scaler::StandardScaler;
use chrono::Utc;
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::fmt;
use tracing::info;

/// Fraction of each class held out for evaluation.
pub const TEST_FRACTION: f64 = 0.2;

/// Seed for the stratified split shuffle.
pub const SPLIT_SEED: u64 = 42;

/// A class needs at least this many usable records to be trained on.
pub const MIN_CLASS_SAMPLES: usize = 2;

/// Errors from the training pipeline.
#[derive(Debug)]
pub enum TrainError {
    Dataset(DatasetError),
    NoUsableRecords,
    /// Fewer than two classes survived the quality filter and the
    /// per-class minimum
    TooFewClasses {
        found: usize,
    },
    Forest(ForestError),
    Artifact(ArtifactError),
}

impl fmt::Display for TrainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrainError::Dataset(e) => write!(f, "dataset error: {e}"),
            TrainError::NoUsableRecords => {
                write!(f, "no records survive the quality filter")
            }
            TrainError::TooFewClasses { found } => write!(
                f,
                "need at least 2 trainable classes, found {found}"
            ),
            TrainError::Forest(e) => write!(f, "forest fitting failed: {e}"),
            TrainError::Artifact(e) => write!(f, "artifact error: {e}"),
        }
    }
}

impl std::error::Error for TrainError {}

impl From<DatasetError> for TrainError {
    fn from(e: DatasetError) -> Self {
        TrainError::Dataset(e)
    }
}

impl From<ForestError> for TrainError {
    fn from(e: ForestError) -> Self {
        TrainError::Forest(e)
    }
}

impl From<ArtifactError> for TrainError {
    fn from(e: ArtifactError) -> Self {
        TrainError::Artifact(e)
    }
}

/// The outcome of a stratified split over a slice of labels.
#[derive(Debug)]
pub struct SplitPlan {
    /// Indices into the labeled slice assigned to the training split
    pub train: Vec<usize>,
    /// Indices assigned to the hold-out split
    pub test: Vec<usize>,
    /// Classes that will be trained on, in severity order
    pub classes: Vec<HealthLabel>,
    /// Classes dropped for having too few samples
    pub excluded: Vec<HealthLabel>,
}

/// Stratified train/test split.
///
/// Each class is shuffled and split independently, so every surviving class
/// appears in both splits: the hold-out takes `round(fraction * n)` samples,
/// at least 1 and at most `n - 1`. Classes with fewer than
/// [`MIN_CLASS_SAMPLES`] records are excluded entirely.
pub fn stratified_split(labels: &[HealthLabel], test_fraction: f64, seed: u64) -> SplitPlan {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut plan = SplitPlan {
        train: Vec::new(),
        test: Vec::new(),
        classes: Vec::new(),
        excluded: Vec::new(),
    };

    for class in HealthLabel::ALL {
        let mut indices: Vec<usize> = labels
            .iter()
            .enumerate()
            .filter(|(_, l)| **l == class)
            .map(|(i, _)| i)
            .collect();
        if indices.is_empty() {
            continue;
        }
        if indices.len() < MIN_CLASS_SAMPLES {
            plan.excluded.push(class);
            continue;
        }

        indices.shuffle(&mut rng);
        let n = indices.len();
        let n_test = ((test_fraction * n as f64).round() as usize).clamp(1, n - 1);
        plan.test.extend_from_slice(&indices[..n_test]);
        plan.train.extend_from_slice(&indices[n_test..]);
        plan.classes.push(class);
    }

    plan.train.sort_unstable();
    plan.test.sort_unstable();
    plan
}

/// Summary of a training run, for reporting.
#[derive(Debug)]
pub struct TrainReport {
    pub total_records: usize,
    pub usable_records: usize,
    /// Usable record count per trained class, in severity order
    pub class_counts: Vec<(HealthLabel, usize)>,
    pub excluded_classes: Vec<HealthLabel>,
    pub accuracy: f64,
    pub training_records: usize,
    pub testing_records: usize,
}

/// Run the full pipeline over a labeled dataset.
pub fn train(
    records: &[TrainingRecord],
    params: ForestParams,
) -> Result<(ModelArtifact, TrainReport), TrainError> {
    let usable: Vec<&TrainingRecord> = records
        .iter()
        .filter(|r| passes_quality_filter(r))
        .collect();
    if usable.is_empty() {
        return Err(TrainError::NoUsableRecords);
    }
    info!(
        total = records.len(),
        usable = usable.len(),
        "quality filter applied"
    );

    let labels: Vec<HealthLabel> = usable.iter().map(|r| r.health_status).collect();
    let plan = stratified_split(&labels, TEST_FRACTION, SPLIT_SEED);
    if plan.classes.len() < 2 {
        return Err(TrainError::TooFewClasses {
            found: plan.classes.len(),
        });
    }

    let feature_names: Vec<String> = FEATURE_COLUMNS.iter().map(|s| s.to_string()).collect();
    let class_index = |label: HealthLabel| -> usize {
        plan.classes
            .iter()
            .position(|c| *c == label)
            .unwrap_or(0)
    };

    let matrix_for = |indices: &[usize]| -> (Array2<f64>, Array1<usize>) {
        let mut rows = Vec::with_capacity(indices.len() * feature_names.len());
        let mut targets = Vec::with_capacity(indices.len());
        for &i in indices {
            let record = usable[i];
            rows.extend(feature_vector(
                &record.frame,
                &record.derived,
                record.engine_stress_score,
                &feature_names,
            ));
            targets.push(class_index(record.health_status));
        }
        let records = Array2::from_shape_vec((indices.len(), feature_names.len()), rows)
            .unwrap_or_else(|_| Array2::zeros((0, feature_names.len())));
        (records, Array1::from_vec(targets))
    };

    let (train_records, train_targets) = matrix_for(&plan.train);
    let (test_records, test_targets) = matrix_for(&plan.test);

    let scaler = StandardScaler::fit(&train_records);
    let train_scaled = scaler.transform(&train_records);
    let test_scaled = scaler.transform(&test_records);

    let forest = HealthForest::fit(&train_scaled, &train_targets, plan.classes.len(), params)?;

    let predicted = forest.predict_batch(&test_scaled);
    let correct = predicted
        .iter()
        .zip(test_targets.iter())
        .filter(|(p, t)| *p == *t)
        .count();
    let accuracy = correct as f64 / test_targets.len().max(1) as f64;
    info!(accuracy, trees = forest.n_trees(), "forest trained");

    let class_counts: Vec<(HealthLabel, usize)> = plan
        .classes
        .iter()
        .map(|&class| (class, labels.iter().filter(|l| **l == class).count()))
        .collect();

    let metadata = ArtifactMetadata {
        model_type: "random_forest".into(),
        feature_names,
        classes: plan.classes.clone(),
        excluded_classes: plan.excluded.clone(),
        hyperparameters: params,
        accuracy,
        trained_at: Utc::now(),
        total_records: records.len(),
        training_records: plan.train.len(),
        testing_records: plan.test.len(),
    };

    let report = TrainReport {
        total_records: records.len(),
        usable_records: usable.len(),
        class_counts,
        excluded_classes: plan.excluded,
        accuracy,
        training_records: plan.train.len(),
        testing_records: plan.test.len(),
    };

    Ok((
        ModelArtifact {
            forest,
            scaler,
            metadata,
        },
        report,
    ))
}

/// Accuracy of an artifact against a labeled dataset.
///
/// Records whose label the model was not trained on are skipped.
pub fn evaluate(artifact: &ModelArtifact, records: &[TrainingRecord]) -> f64 {
    let mut total = 0usize;
    let mut correct = 0usize;
    for record in records {
        let Some(expected) = artifact
            .metadata
            .classes
            .iter()
            .position(|c| *c == record.health_status)
        else {
            continue;
        };
        let vector = feature_vector(
            &record.frame,
            &record.derived,
            record.engine_stress_score,
            &artifact.metadata.feature_names,
        );
        let scaled = artifact.scaler.transform_row(&vector);
        let (predicted, _) = artifact.forest.predict(&scaled);
        total += 1;
        if predicted == expected {
            correct += 1;
        }
    }
    correct as f64 / total.max(1) as f64
}
