//! Bagged decision-tree ensemble.
//!
//! A forest of bounded-depth trees, each fitted on a weighted bootstrap
//! sample of the training data. Class imbalance is corrected by sampling
//! with inverse-frequency class weights, and the whole procedure is
//! reproducible from a fixed seed. Per-class probabilities are the fraction
//! of trees voting for each class.

use linfa::prelude::*;
use linfa_trees::{DecisionTree, SplitQuality};
use ndarray::{Array1, Array2, Axis};
use rand::distributions::WeightedIndex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Hyperparameters for the ensemble.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_trees: usize,
    pub max_depth: usize,
    pub min_weight_split: f32,
    pub min_weight_leaf: f32,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 200,
            max_depth: 15,
            min_weight_split: 10.0,
            min_weight_leaf: 5.0,
            seed: 42,
        }
    }
}

/// Errors from ensemble fitting.
#[derive(Debug)]
pub enum ForestError {
    EmptyTrainingSet,
    Fit(String),
}

impl fmt::Display for ForestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForestError::EmptyTrainingSet => write!(f, "cannot fit a forest on no samples"),
            ForestError::Fit(e) => write!(f, "tree fitting failed: {e}"),
        }
    }
}

impl std::error::Error for ForestError {}

/// A fitted ensemble.
#[derive(Serialize, Deserialize)]
pub struct HealthForest {
    trees: Vec<DecisionTree<f64, usize>>,
    n_classes: usize,
    params: ForestParams,
}

impl HealthForest {
    /// Fit the ensemble on a scaled design matrix and class-index targets.
    ///
    /// Each tree sees a bootstrap sample drawn with per-sample weights
    /// `n / (k * n_c)` (inverse class frequency), the standard "balanced"
    /// correction.
    pub fn fit(
        records: &Array2<f64>,
        targets: &Array1<usize>,
        n_classes: usize,
        params: ForestParams,
    ) -> Result<Self, ForestError> {
        let n_samples = records.nrows();
        if n_samples == 0 || n_classes == 0 {
            return Err(ForestError::EmptyTrainingSet);
        }

        let mut class_counts = vec![0usize; n_classes];
        for &class in targets {
            class_counts[class] += 1;
        }
        let sample_weights: Vec<f64> = targets
            .iter()
            .map(|&class| n_samples as f64 / (n_classes as f64 * class_counts[class].max(1) as f64))
            .collect();
        let sampler = WeightedIndex::new(&sample_weights)
            .map_err(|e| ForestError::Fit(e.to_string()))?;

        let mut rng = StdRng::seed_from_u64(params.seed);
        let mut trees = Vec::with_capacity(params.n_trees);

        for _ in 0..params.n_trees {
            let indices: Vec<usize> = (0..n_samples).map(|_| rng.sample(&sampler)).collect();

            let boot_records = records.select(Axis(0), &indices);
            let boot_targets: Array1<usize> =
                indices.iter().map(|&i| targets[i]).collect();

            let dataset = Dataset::new(boot_records, boot_targets);
            let tree = DecisionTree::params()
                .split_quality(SplitQuality::Gini)
                .max_depth(Some(params.max_depth))
                .min_weight_split(params.min_weight_split)
                .min_weight_leaf(params.min_weight_leaf)
                .fit(&dataset)
                .map_err(|e| ForestError::Fit(e.to_string()))?;
            trees.push(tree);
        }

        Ok(Self {
            trees,
            n_classes,
            params,
        })
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn params(&self) -> ForestParams {
        self.params
    }

    /// Per-class vote fractions for a single scaled feature vector.
    pub fn predict_proba(&self, row: &[f64]) -> Vec<f64> {
        let records = ndarray::aview1(row).insert_axis(Axis(0));
        let mut votes = vec![0usize; self.n_classes];
        for tree in &self.trees {
            let predicted = tree.predict(&records);
            let class = predicted[0];
            if class < self.n_classes {
                votes[class] += 1;
            }
        }
        let total = self.trees.len().max(1) as f64;
        votes.into_iter().map(|v| v as f64 / total).collect()
    }

    /// Arg-max class and the full distribution for a scaled vector.
    ///
    /// Ties resolve to the lowest class index, keeping predictions
    /// deterministic.
    pub fn predict(&self, row: &[f64]) -> (usize, Vec<f64>) {
        let probabilities = self.predict_proba(row);
        let mut best = 0;
        for (class, &p) in probabilities.iter().enumerate() {
            if p > probabilities[best] {
                best = class;
            }
        }
        (best, probabilities)
    }

    /// Majority-vote predictions for every row of a scaled matrix.
    pub fn predict_batch(&self, records: &Array2<f64>) -> Vec<usize> {
        let mut votes = vec![vec![0usize; self.n_classes]; records.nrows()];
        for tree in &self.trees {
            let predicted = tree.predict(records);
            for (i, &class) in predicted.iter().enumerate() {
                if class < self.n_classes {
                    votes[i][class] += 1;
                }
            }
        }
        votes
            .into_iter()
            .map(|row| {
                let mut best = 0;
                for (class, &count) in row.iter().enumerate() {
                    if count > row[best] {
                        best = class;
                    }
                }
                best
            })
            .collect()
    }
}
