//! Random forests built from bootstrap-sampled CART trees.
//!
//! Trees train in parallel with rayon; each tree gets its own seeded RNG
//! stream so results are reproducible for a fixed `random_state`.

use ndarray::{Array1, Array2};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StudioError};
use crate::models::tree::{DecisionTreeClassifier, DecisionTreeRegressor};

fn bootstrap_rows(rng: &mut ChaCha8Rng, n: usize) -> Vec<usize> {
    (0..n).map(|_| rng.gen_range(0..n)).collect()
}

/// sqrt(p) features for classification, p/3 (min 1) for regression.
fn feature_subset(rng: &mut ChaCha8Rng, n_features: usize, classification: bool) -> Vec<usize> {
    let k = if classification {
        (n_features as f64).sqrt().round() as usize
    } else {
        n_features / 3
    }
    .clamp(1, n_features);
    let mut all: Vec<usize> = (0..n_features).collect();
    all.shuffle(rng);
    all.truncate(k);
    all
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForestClassifier {
    pub n_estimators: usize,
    pub max_depth: usize,
    pub random_state: u64,
    trees: Vec<DecisionTreeClassifier>,
    classes: Vec<i64>,
    importances: Vec<f64>,
    pub is_fitted: bool,
}

impl RandomForestClassifier {
    pub fn new(n_estimators: usize, random_state: u64) -> Self {
        Self {
            n_estimators,
            max_depth: 10,
            random_state,
            trees: Vec::new(),
            classes: Vec::new(),
            importances: Vec::new(),
            is_fitted: false,
        }
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        if x.nrows() == 0 {
            return Err(StudioError::TrainingError(
                "Cannot fit a forest on an empty matrix".to_string(),
            ));
        }
        let mut classes: Vec<i64> = y.iter().map(|v| v.round() as i64).collect();
        classes.sort_unstable();
        classes.dedup();

        let n = x.nrows();
        let n_features = x.ncols();
        let base_seed = self.random_state;
        let max_depth = self.max_depth;

        let trees: Vec<Result<DecisionTreeClassifier>> = (0..self.n_estimators)
            .into_par_iter()
            .map(|t| {
                let mut rng = ChaCha8Rng::seed_from_u64(base_seed.wrapping_add(t as u64));
                let rows = bootstrap_rows(&mut rng, n);
                let subset = feature_subset(&mut rng, n_features, true);
                let mut tree = DecisionTreeClassifier::new(max_depth);
                tree.fit_on_subset(x, y, &rows, Some(subset))?;
                Ok(tree)
            })
            .collect();
        let trees = trees.into_iter().collect::<Result<Vec<_>>>()?;

        let mut importances = vec![0.0; n_features];
        for tree in &trees {
            for (j, v) in tree.raw_importances().iter().enumerate() {
                importances[j] += v;
            }
        }
        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            for v in &mut importances {
                *v /= total;
            }
        }

        self.trees = trees;
        self.classes = classes;
        self.importances = importances;
        self.is_fitted = true;
        Ok(())
    }

    pub fn classes(&self) -> &[i64] {
        &self.classes
    }

    /// Fraction of trees voting for each class.
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if self.trees.is_empty() {
            return Err(StudioError::ModelNotFitted);
        }
        let mut votes = Array2::zeros((x.nrows(), self.classes.len()));
        for tree in &self.trees {
            let preds = tree.predict(x)?;
            for (i, &p) in preds.iter().enumerate() {
                let label = p.round() as i64;
                if let Some(c) = self.classes.iter().position(|&k| k == label) {
                    votes[[i, c]] += 1.0;
                }
            }
        }
        votes.mapv_inplace(|v| v / self.trees.len() as f64);
        Ok(votes)
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

    pub fn feature_importances(&self) -> Result<Array1<f64>> {
        if !self.is_fitted {
            return Err(StudioError::ModelNotFitted);
        }
        Ok(Array1::from_vec(self.importances.clone()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForestRegressor {
    pub n_estimators: usize,
    pub max_depth: usize,
    pub random_state: u64,
    trees: Vec<DecisionTreeRegressor>,
    importances: Vec<f64>,
    pub is_fitted: bool,
}

impl RandomForestRegressor {
    pub fn new(n_estimators: usize, random_state: u64) -> Self {
        Self {
            n_estimators,
            max_depth: 10,
            random_state,
            trees: Vec::new(),
            importances: Vec::new(),
            is_fitted: false,
        }
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        if x.nrows() == 0 {
            return Err(StudioError::TrainingError(
                "Cannot fit a forest on an empty matrix".to_string(),
            ));
        }
        let n = x.nrows();
        let n_features = x.ncols();
        let base_seed = self.random_state;
        let max_depth = self.max_depth;

        let trees: Vec<Result<DecisionTreeRegressor>> = (0..self.n_estimators)
            .into_par_iter()
            .map(|t| {
                let mut rng = ChaCha8Rng::seed_from_u64(base_seed.wrapping_add(t as u64));
                let rows = bootstrap_rows(&mut rng, n);
                let subset = feature_subset(&mut rng, n_features, false);
                let mut tree = DecisionTreeRegressor::new(max_depth);
                tree.fit_on_subset(x, y, &rows, Some(subset))?;
                Ok(tree)
            })
            .collect();
        let trees = trees.into_iter().collect::<Result<Vec<_>>>()?;

        let mut importances = vec![0.0; n_features];
        for tree in &trees {
            for (j, v) in tree.raw_importances().iter().enumerate() {
                importances[j] += v;
            }
        }
        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            for v in &mut importances {
                *v /= total;
            }
        }

        self.trees = trees;
        self.importances = importances;
        self.is_fitted = true;
        Ok(())
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.trees.is_empty() {
            return Err(StudioError::ModelNotFitted);
        }
        let mut acc: Array1<f64> = Array1::zeros(x.nrows());
        for tree in &self.trees {
            acc = acc + tree.predict(x)?;
        }
        Ok(acc / self.trees.len() as f64)
    }

    pub fn feature_importances(&self) -> Result<Array1<f64>> {
        if !self.is_fitted {
            return Err(StudioError::ModelNotFitted);
        }
        Ok(Array1::from_vec(self.importances.clone()))
    }
}
