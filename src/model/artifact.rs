//! Model artifact persistence.
//!
//! A trained model is three JSON files in one directory: the forest, the
//! fitted scaler, and a metadata document. The metadata's feature name list
//! is the authoritative input contract; loading validates that the three
//! files agree with each other before the model is allowed to serve.

use crate::core::labeler::HealthLabel;
use crate::model::forest::{ForestParams, HealthForest};
use crate::model::scaler::StandardScaler;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::time::SystemTime;

pub const FOREST_FILE: &str = "forest.json";
pub const SCALER_FILE: &str = "scaler.json";
pub const METADATA_FILE: &str = "metadata.json";

/// Description of a trained model, stored alongside it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    pub model_type: String,
    /// Ordered feature names; inference builds its input vector from these
    pub feature_names: Vec<String>,
    /// Classes the model can emit, indexed by the forest's class indices
    pub classes: Vec<HealthLabel>,
    /// Classes dropped before training for having too few samples
    pub excluded_classes: Vec<HealthLabel>,
    pub hyperparameters: ForestParams,
    /// Hold-out accuracy measured at training time
    pub accuracy: f64,
    pub trained_at: DateTime<Utc>,
    pub total_records: usize,
    pub training_records: usize,
    pub testing_records: usize,
}

/// Errors from saving or loading an artifact.
#[derive(Debug)]
pub enum ArtifactError {
    Io(String),
    Missing(String),
    Malformed(String),
}

impl fmt::Display for ArtifactError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactError::Io(e) => write!(f, "artifact IO error: {e}"),
            ArtifactError::Missing(what) => write!(f, "artifact file missing: {what}"),
            ArtifactError::Malformed(why) => write!(f, "artifact inconsistent: {why}"),
        }
    }
}

impl std::error::Error for ArtifactError {}

/// A complete, validated model: forest, scaler, and metadata.
pub struct ModelArtifact {
    pub forest: HealthForest,
    pub scaler: StandardScaler,
    pub metadata: ArtifactMetadata,
}

impl ModelArtifact {
    /// Write all three files into `dir`, creating it if needed.
    pub fn save(&self, dir: &Path) -> Result<(), ArtifactError> {
        fs::create_dir_all(dir).map_err(|e| ArtifactError::Io(e.to_string()))?;
        write_json(&dir.join(FOREST_FILE), &self.forest)?;
        write_json(&dir.join(SCALER_FILE), &self.scaler)?;
        // Metadata goes last so a watcher keying on its mtime never sees
        // newer metadata with an older forest.
        write_json(&dir.join(METADATA_FILE), &self.metadata)?;
        Ok(())
    }

    /// Load and cross-validate the three files from `dir`.
    pub fn load(dir: &Path) -> Result<Self, ArtifactError> {
        let forest: HealthForest = read_json(&dir.join(FOREST_FILE))?;
        let scaler: StandardScaler = read_json(&dir.join(SCALER_FILE))?;
        let metadata: ArtifactMetadata = read_json(&dir.join(METADATA_FILE))?;

        if scaler.len() != metadata.feature_names.len() {
            return Err(ArtifactError::Malformed(format!(
                "scaler covers {} columns but metadata names {} features",
                scaler.len(),
                metadata.feature_names.len()
            )));
        }
        if forest.n_classes() != metadata.classes.len() {
            return Err(ArtifactError::Malformed(format!(
                "forest has {} classes but metadata names {}",
                forest.n_classes(),
                metadata.classes.len()
            )));
        }

        Ok(Self {
            forest,
            scaler,
            metadata,
        })
    }

    /// Modification time of the metadata file, used to detect a newly
    /// published artifact.
    pub fn modified_at(dir: &Path) -> Result<SystemTime, ArtifactError> {
        let path = dir.join(METADATA_FILE);
        let meta = fs::metadata(&path)
            .map_err(|_| ArtifactError::Missing(path.display().to_string()))?;
        meta.modified().map_err(|e| ArtifactError::Io(e.to_string()))
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), ArtifactError> {
    let json = serde_json::to_string(value).map_err(|e| ArtifactError::Io(e.to_string()))?;
    fs::write(path, json).map_err(|e| ArtifactError::Io(e.to_string()))
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, ArtifactError> {
    let data = fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ArtifactError::Missing(path.display().to_string())
        } else {
            ArtifactError::Io(e.to_string())
        }
    })?;
    serde_json::from_str(&data)
        .map_err(|e| ArtifactError::Malformed(format!("{}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn toy_artifact() -> ModelArtifact {
        let records = array![
            [0.0, 0.1],
            [0.2, 0.0],
            [0.1, 0.3],
            [0.3, 0.2],
            [5.0, 5.1],
            [5.2, 4.9],
            [4.8, 5.0],
            [5.1, 5.2],
        ];
        let targets = ndarray::array![0, 0, 0, 0, 1, 1, 1, 1];
        let params = ForestParams {
            n_trees: 10,
            max_depth: 3,
            min_weight_split: 2.0,
            min_weight_leaf: 1.0,
            seed: 1,
        };
        let forest = HealthForest::fit(&records, &targets, 2, params).unwrap();
        let scaler = StandardScaler::fit(&records);
        let metadata = ArtifactMetadata {
            model_type: "random_forest".into(),
            feature_names: vec!["a".into(), "b".into()],
            classes: vec![HealthLabel::Normal, HealthLabel::Critical],
            excluded_classes: vec![],
            hyperparameters: params,
            accuracy: 1.0,
            trained_at: Utc::now(),
            total_records: 8,
            training_records: 6,
            testing_records: 2,
        };
        ModelArtifact {
            forest,
            scaler,
            metadata,
        }
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = toy_artifact();
        artifact.save(dir.path()).unwrap();

        let loaded = ModelArtifact::load(dir.path()).unwrap();
        assert_eq!(loaded.metadata.feature_names, vec!["a", "b"]);
        assert_eq!(loaded.forest.n_trees(), artifact.forest.n_trees());
        for row in [[0.1, 0.1], [5.0, 5.0]] {
            assert_eq!(
                loaded.forest.predict_proba(&row),
                artifact.forest.predict_proba(&row)
            );
        }
    }

    #[test]
    fn test_missing_file_reported() {
        let dir = tempfile::tempdir().unwrap();
        match ModelArtifact::load(dir.path()) {
            Err(ArtifactError::Missing(_)) => {}
            other => panic!("expected Missing, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_feature_count_mismatch_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut artifact = toy_artifact();
        artifact.metadata.feature_names.push("c".into());
        artifact.save(dir.path()).unwrap();

        match ModelArtifact::load(dir.path()) {
            Err(ArtifactError::Malformed(_)) => {}
            other => panic!("expected Malformed, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_class_count_mismatch_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut artifact = toy_artifact();
        artifact.metadata.classes.push(HealthLabel::Warning);
        artifact.save(dir.path()).unwrap();

        match ModelArtifact::load(dir.path()) {
            Err(ArtifactError::Malformed(_)) => {}
            other => panic!("expected Malformed, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_modified_at_tracks_metadata() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ModelArtifact::modified_at(dir.path()).is_err());

        toy_artifact().save(dir.path()).unwrap();
        assert!(ModelArtifact::modified_at(dir.path()).is_ok());
    }
}
