//! Zero-mean/unit-variance feature scaling.
//!
//! Fitted on the training split only; the same fitted parameters are
//! applied to the test split and at inference time, and travel with the
//! model artifact.

use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

/// A fitted standard scaler: per-column mean and standard deviation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandardScaler {
    means: Vec<f64>,
    scales: Vec<f64>,
}

impl StandardScaler {
    /// Fit per-column statistics on a design matrix.
    ///
    /// A constant column gets scale 1.0 so transforming it yields 0 rather
    /// than a division by zero.
    pub fn fit(records: &Array2<f64>) -> Self {
        let mut means = Vec::with_capacity(records.ncols());
        let mut scales = Vec::with_capacity(records.ncols());

        for column in records.axis_iter(Axis(1)) {
            let values: Vec<f64> = column.iter().copied().collect();
            let mean = if values.is_empty() {
                0.0
            } else {
                (&values).mean()
            };
            let std_dev = if values.len() < 2 {
                0.0
            } else {
                (&values).population_std_dev()
            };
            means.push(mean);
            scales.push(if std_dev > 0.0 { std_dev } else { 1.0 });
        }

        Self { means, scales }
    }

    /// Number of columns this scaler was fitted on.
    pub fn len(&self) -> usize {
        self.means.len()
    }

    pub fn is_empty(&self) -> bool {
        self.means.is_empty()
    }

    /// Transform a matrix: (x - mean) / scale per column.
    pub fn transform(&self, records: &Array2<f64>) -> Array2<f64> {
        let mut scaled = records.clone();
        for (mut column, (mean, scale)) in scaled
            .axis_iter_mut(Axis(1))
            .zip(self.means.iter().zip(self.scales.iter()))
        {
            column.mapv_inplace(|v| (v - mean) / scale);
        }
        scaled
    }

    /// Transform a single row vector.
    pub fn transform_row(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .zip(self.means.iter().zip(self.scales.iter()))
            .map(|(v, (mean, scale))| (v - mean) / scale)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_fit_transform_zero_mean_unit_variance() {
        let x = array![[1.0, 10.0], [2.0, 20.0], [3.0, 30.0], [4.0, 40.0]];
        let scaler = StandardScaler::fit(&x);
        let scaled = scaler.transform(&x);

        for col in 0..2 {
            let column: Vec<f64> = scaled.column(col).iter().copied().collect();
            let mean: f64 = column.iter().sum::<f64>() / column.len() as f64;
            let var: f64 =
                column.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / column.len() as f64;
            assert!(mean.abs() < 1e-12);
            assert!((var - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_constant_column_scales_to_zero() {
        let x = array![[5.0, 1.0], [5.0, 2.0], [5.0, 3.0]];
        let scaler = StandardScaler::fit(&x);
        let scaled = scaler.transform(&x);

        for v in scaled.column(0) {
            assert_eq!(*v, 0.0);
        }
    }

    #[test]
    fn test_row_transform_matches_matrix_transform() {
        let x = array![[1.0, -4.0], [3.0, 0.0], [5.0, 4.0]];
        let scaler = StandardScaler::fit(&x);
        let scaled = scaler.transform(&x);

        let row = scaler.transform_row(&[3.0, 0.0]);
        assert!((row[0] - scaled[[1, 0]]).abs() < 1e-12);
        assert!((row[1] - scaled[[1, 1]]).abs() < 1e-12);
    }
}
