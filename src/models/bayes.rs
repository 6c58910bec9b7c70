//! Gaussian naive Bayes with log-space likelihoods.

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StudioError};

const VAR_SMOOTHING: f64 = 1e-9;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GaussianNaiveBayes {
    classes: Vec<i64>,
    priors: Vec<f64>,
    /// Per-class feature means, `means[class][feature]`.
    means: Vec<Vec<f64>>,
    variances: Vec<Vec<f64>>,
    pub is_fitted: bool,
}

impl Default for GaussianNaiveBayes {
    fn default() -> Self {
        Self::new()
    }
}

impl GaussianNaiveBayes {
    pub fn new() -> Self {
        Self {
            classes: Vec::new(),
            priors: Vec::new(),
            means: Vec::new(),
            variances: Vec::new(),
            is_fitted: false,
        }
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        if x.nrows() == 0 {
            return Err(StudioError::TrainingError(
                "Cannot fit naive Bayes on an empty matrix".to_string(),
            ));
        }
        let mut classes: Vec<i64> = y.iter().map(|v| v.round() as i64).collect();
        classes.sort_unstable();
        classes.dedup();

        let n_features = x.ncols();
        let n = x.nrows() as f64;

        // Smoothing floor scaled by the largest feature variance, as in sklearn
        let mut global_var_max = 0.0f64;
        for j in 0..n_features {
            let col = x.column(j);
            let mean = col.mean().unwrap_or(0.0);
            let var = col.mapv(|v| (v - mean) * (v - mean)).mean().unwrap_or(0.0);
            global_var_max = global_var_max.max(var);
        }
        let smoothing = VAR_SMOOTHING * global_var_max.max(1.0);

        let mut priors = Vec::with_capacity(classes.len());
        let mut means = Vec::with_capacity(classes.len());
        let mut variances = Vec::with_capacity(classes.len());

        for &class in &classes {
            let rows: Vec<usize> = y
                .iter()
                .enumerate()
                .filter(|(_, &v)| v.round() as i64 == class)
                .map(|(i, _)| i)
                .collect();
            let count = rows.len() as f64;
            priors.push(count / n);

            let mut class_means = vec![0.0; n_features];
            let mut class_vars = vec![0.0; n_features];
            for j in 0..n_features {
                let sum: f64 = rows.iter().map(|&i| x[[i, j]]).sum();
                let mean = sum / count;
                let var: f64 = rows
                    .iter()
                    .map(|&i| (x[[i, j]] - mean) * (x[[i, j]] - mean))
                    .sum::<f64>()
                    / count;
                class_means[j] = mean;
                class_vars[j] = var + smoothing;
            }
            means.push(class_means);
            variances.push(class_vars);
        }

        self.classes = classes;
        self.priors = priors;
        self.means = means;
        self.variances = variances;
        self.is_fitted = true;
        Ok(())
    }

    pub fn classes(&self) -> &[i64] {
        &self.classes
    }

    fn log_likelihoods(&self, row: &[f64]) -> Vec<f64> {
        self.classes
            .iter()
            .enumerate()
            .map(|(c, _)| {
                let mut ll = self.priors[c].max(f64::MIN_POSITIVE).ln();
                for (j, &v) in row.iter().enumerate() {
                    let mean = self.means[c][j];
                    let var = self.variances[c][j];
                    ll += -0.5 * (2.0 * std::f64::consts::PI * var).ln()
                        - (v - mean) * (v - mean) / (2.0 * var);
                }
                ll
            })
            .collect()
    }

    /// Normalized posteriors via the log-sum-exp trick.
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if !self.is_fitted {
            return Err(StudioError::ModelNotFitted);
        }
        let mut out = Array2::zeros((x.nrows(), self.classes.len()));
        for (i, row) in x.rows().into_iter().enumerate() {
            let lls = self.log_likelihoods(&row.to_vec());
            let max_ll = lls.iter().cloned().fold(f64::MIN, f64::max);
            let exp: Vec<f64> = lls.iter().map(|&l| (l - max_ll).exp()).collect();
            let total: f64 = exp.iter().sum();
            for (j, &e) in exp.iter().enumerate() {
                out[[i, j]] = e / total;
            }
        }
        Ok(out)
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if !self.is_fitted {
            return Err(StudioError::ModelNotFitted);
        }
        let preds = x
            .rows()
            .into_iter()
            .map(|row| {
                let lls = self.log_likelihoods(&row.to_vec());
                let mut best = 0;
                let mut best_ll = f64::MIN;
                for (idx, &ll) in lls.iter().enumerate() {
                    if ll > best_ll {
                        best_ll = ll;
                        best = idx;
                    }
                }
                self.classes[best] as f64
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
    fn test_separable_gaussians() {
        let x = array![
            [0.0, 0.1], [0.1, 0.0], [0.2, 0.2], [-0.1, 0.1],
            [5.0, 5.1], [5.1, 5.0], [5.2, 5.2], [4.9, 5.1]
        ];
        let y = array![0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0];
        let mut nb = GaussianNaiveBayes::new();
        nb.fit(&x, &y).unwrap();
        let pred = nb.predict(&x).unwrap();
        for (p, t) in pred.iter().zip(y.iter()) {
            assert_eq!(*p, *t);
        }
    }

    #[test]
    fn test_proba_sums_to_one() {
        let x = array![[0.0], [0.1], [5.0], [5.1]];
        let y = array![0.0, 0.0, 1.0, 1.0];
        let mut nb = GaussianNaiveBayes::new();
        nb.fit(&x, &y).unwrap();
        let proba = nb.predict_proba(&array![[2.5]]).unwrap();
        assert!((proba.row(0).sum() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_constant_feature_does_not_blow_up() {
        let x = array![[1.0, 3.0], [1.0, 3.1], [2.0, 8.0], [2.0, 8.1]];
        let y = array![0.0, 0.0, 1.0, 1.0];
        let mut nb = GaussianNaiveBayes::new();
        nb.fit(&x, &y).unwrap();
        let pred = nb.predict(&x).unwrap();
        assert_eq!(pred[0], 0.0);
        assert_eq!(pred[3], 1.0);
    }

    #[test]
    fn test_unfitted_errors() {
        let nb = GaussianNaiveBayes::new();
        assert!(nb.predict(&array![[1.0]]).is_err());
    }
}
