//! k-nearest-neighbors classification and regression.

use ndarray::{Array1, Array2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StudioError};

fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

/// Indices of the k nearest training rows, closest first.
fn nearest(train: &Array2<f64>, query: &[f64], k: usize) -> Vec<usize> {
    let mut dists: Vec<(usize, f64)> = train
        .rows()
        .into_iter()
        .enumerate()
        .map(|(i, row)| (i, euclidean(row.as_slice().unwrap_or(&[]), query)))
        .collect();
    dists.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
    dists.into_iter().take(k).map(|(i, _)| i).collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnnClassifier {
    pub n_neighbors: usize,
    x_train: Option<Array2<f64>>,
    y_train: Option<Array1<f64>>,
    classes: Vec<i64>,
    pub is_fitted: bool,
}

impl KnnClassifier {
    pub fn new(n_neighbors: usize) -> Self {
        Self {
            n_neighbors: n_neighbors.max(1),
            x_train: None,
            y_train: None,
            classes: Vec::new(),
            is_fitted: false,
        }
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        if x.nrows() == 0 {
            return Err(StudioError::TrainingError(
                "Cannot fit KNN on an empty matrix".to_string(),
            ));
        }
        let mut classes: Vec<i64> = y.iter().map(|v| v.round() as i64).collect();
        classes.sort_unstable();
        classes.dedup();
        self.x_train = Some(x.clone());
        self.y_train = Some(y.clone());
        self.classes = classes;
        self.is_fitted = true;
        Ok(())
    }

    pub fn classes(&self) -> &[i64] {
        &self.classes
    }

    /// Neighbor vote fractions per class.
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let x_train = self.x_train.as_ref().ok_or(StudioError::ModelNotFitted)?;
        let y_train = self.y_train.as_ref().ok_or(StudioError::ModelNotFitted)?;
        let k = self.n_neighbors.min(x_train.nrows());

        let rows: Vec<Vec<f64>> = x
            .rows()
            .into_iter()
            .map(|r| r.to_vec())
            .collect::<Vec<_>>()
            .into_par_iter()
            .map(|query| {
                let idx = nearest(x_train, &query, k);
                let mut counts = vec![0.0; self.classes.len()];
                for i in idx {
                    let label = y_train[i].round() as i64;
                    if let Some(c) = self.classes.iter().position(|&v| v == label) {
                        counts[c] += 1.0;
                    }
                }
                for c in &mut counts {
                    *c /= k as f64;
                }
                counts
            })
            .collect();

        let mut out = Array2::zeros((x.nrows(), self.classes.len()));
        for (i, row) in rows.iter().enumerate() {
            for (j, &v) in row.iter().enumerate() {
                out[[i, j]] = v;
            }
        }
        Ok(out)
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let proba = self.predict_proba(x)?;
        let labels = proba
            .rows()
            .into_iter()
            .map(|row| {
                let mut best = 0;
                let mut best_v = f64::MIN;
                for (idx, &v) in row.iter().enumerate() {
                    if v > best_v {
                        best_v = v;
                        best = idx;
                    }
                }
                self.classes[best] as f64
            })
            .collect();
        Ok(Array1::from_vec(labels))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnnRegressor {
    pub n_neighbors: usize,
    x_train: Option<Array2<f64>>,
    y_train: Option<Array1<f64>>,
    pub is_fitted: bool,
}

impl KnnRegressor {
    pub fn new(n_neighbors: usize) -> Self {
        Self {
            n_neighbors: n_neighbors.max(1),
            x_train: None,
            y_train: None,
            is_fitted: false,
        }
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        if x.nrows() == 0 {
            return Err(StudioError::TrainingError(
                "Cannot fit KNN on an empty matrix".to_string(),
            ));
        }
        self.x_train = Some(x.clone());
        self.y_train = Some(y.clone());
        self.is_fitted = true;
        Ok(())
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let x_train = self.x_train.as_ref().ok_or(StudioError::ModelNotFitted)?;
        let y_train = self.y_train.as_ref().ok_or(StudioError::ModelNotFitted)?;
        let k = self.n_neighbors.min(x_train.nrows());

        let preds: Vec<f64> = x
            .rows()
            .into_iter()
            .map(|r| r.to_vec())
            .collect::<Vec<_>>()
            .into_par_iter()
            .map(|query| {
                let idx = nearest(x_train, &query, k);
                idx.iter().map(|&i| y_train[i]).sum::<f64>() / k as f64
            })
            .collect();
        Ok(Array1::from_vec(preds))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_classifier_votes() {
        let x = array![[0.0], [0.1], [0.2], [9.0], [9.1], [9.2]];
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];
        let mut knn = KnnClassifier::new(3);
        knn.fit(&x, &y).unwrap();
        let pred = knn.predict(&array![[0.05], [9.05]]).unwrap();
        assert_eq!(pred[0], 0.0);
        assert_eq!(pred[1], 1.0);
    }

    #[test]
    fn test_proba_fractions() {
        let x = array![[0.0], [1.0], [2.0]];
        let y = array![0.0, 0.0, 1.0];
        let mut knn = KnnClassifier::new(3);
        knn.fit(&x, &y).unwrap();
        let proba = knn.predict_proba(&array![[1.0]]).unwrap();
        assert!((proba[[0, 0]] - 2.0 / 3.0).abs() < 1e-9);
        assert!((proba[[0, 1]] - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_k_capped_at_sample_count() {
        let x = array![[0.0], [1.0]];
        let y = array![1.0, 3.0];
        let mut knn = KnnRegressor::new(10);
        knn.fit(&x, &y).unwrap();
        let pred = knn.predict(&array![[0.5]]).unwrap();
        assert!((pred[0] - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_regressor_local_mean() {
        let x = array![[0.0], [1.0], [10.0], [11.0]];
        let y = array![2.0, 4.0, 20.0, 22.0];
        let mut knn = KnnRegressor::new(2);
        knn.fit(&x, &y).unwrap();
        let pred = knn.predict(&array![[0.5], [10.5]]).unwrap();
        assert!((pred[0] - 3.0).abs() < 1e-9);
        assert!((pred[1] - 21.0).abs() < 1e-9);
    }
}
