//! Gradient boosting over shallow regression trees.
//!
//! The regressor boosts on squared-error residuals. The classifier boosts
//! log-odds for binary targets and falls back to one-vs-rest binary boosters
//! for more than two classes.

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StudioError};
use crate::models::tree::DecisionTreeRegressor;

const BOOSTING_TREE_DEPTH: usize = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostingRegressor {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub random_state: u64,
    init_value: f64,
    trees: Vec<DecisionTreeRegressor>,
    importances: Vec<f64>,
    pub is_fitted: bool,
}

impl GradientBoostingRegressor {
    pub fn new(n_estimators: usize, random_state: u64) -> Self {
        Self {
            n_estimators,
            learning_rate: 0.1,
            random_state,
            init_value: 0.0,
            trees: Vec::new(),
            importances: Vec::new(),
            is_fitted: false,
        }
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        if x.nrows() == 0 {
            return Err(StudioError::TrainingError(
                "Cannot boost on an empty matrix".to_string(),
            ));
        }
        self.init_value = y.mean().unwrap_or(0.0);
        let mut current: Array1<f64> = Array1::from_elem(y.len(), self.init_value);
        let mut trees = Vec::with_capacity(self.n_estimators);
        let mut importances = vec![0.0; x.ncols()];

        for _ in 0..self.n_estimators {
            let residuals = y - &current;
            let mut tree = DecisionTreeRegressor::new(BOOSTING_TREE_DEPTH);
            tree.fit(x, &residuals)?;
            let update = tree.predict(x)?;
            current = current + self.learning_rate * &update;
            for (j, v) in tree.raw_importances().iter().enumerate() {
                importances[j] += v;
            }
            trees.push(tree);
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
        if !self.is_fitted {
            return Err(StudioError::ModelNotFitted);
        }
        let mut out: Array1<f64> = Array1::from_elem(x.nrows(), self.init_value);
        for tree in &self.trees {
            out = out + self.learning_rate * &tree.predict(x)?;
        }
        Ok(out)
    }

    pub fn feature_importances(&self) -> Result<Array1<f64>> {
        if !self.is_fitted {
            return Err(StudioError::ModelNotFitted);
        }
        Ok(Array1::from_vec(self.importances.clone()))
    }
}

/// One binary log-odds booster. Targets are 0/1.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct BinaryBooster {
    init_log_odds: f64,
    learning_rate: f64,
    trees: Vec<DecisionTreeRegressor>,
}

impl BinaryBooster {
    fn fit(
        x: &Array2<f64>,
        y01: &Array1<f64>,
        n_estimators: usize,
        learning_rate: f64,
    ) -> Result<(Self, Vec<f64>)> {
        let pos = y01.sum();
        let n = y01.len() as f64;
        let p = (pos / n).clamp(1e-6, 1.0 - 1e-6);
        let init_log_odds = (p / (1.0 - p)).ln();

        let mut scores: Array1<f64> = Array1::from_elem(y01.len(), init_log_odds);
        let mut trees = Vec::with_capacity(n_estimators);
        let mut importances = vec![0.0; x.ncols()];

        for _ in 0..n_estimators {
            let probs = scores.mapv(|s| 1.0 / (1.0 + (-s).exp()));
            let residuals = y01 - &probs;
            let mut tree = DecisionTreeRegressor::new(BOOSTING_TREE_DEPTH);
            tree.fit(x, &residuals)?;
            let update = tree.predict(x)?;
            scores = scores + learning_rate * &update;
            for (j, v) in tree.raw_importances().iter().enumerate() {
                importances[j] += v;
            }
            trees.push(tree);
        }

        Ok((
            Self {
                init_log_odds,
                learning_rate,
                trees,
            },
            importances,
        ))
    }

    fn decision(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let mut scores: Array1<f64> = Array1::from_elem(x.nrows(), self.init_log_odds);
        for tree in &self.trees {
            scores = scores + self.learning_rate * &tree.predict(x)?;
        }
        Ok(scores)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostingClassifier {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub random_state: u64,
    classes: Vec<i64>,
    boosters: Vec<BinaryBooster>,
    importances: Vec<f64>,
    pub is_fitted: bool,
}

impl GradientBoostingClassifier {
    pub fn new(n_estimators: usize, random_state: u64) -> Self {
        Self {
            n_estimators,
            learning_rate: 0.1,
            random_state,
            classes: Vec::new(),
            boosters: Vec::new(),
            importances: Vec::new(),
            is_fitted: false,
        }
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        let mut classes: Vec<i64> = y.iter().map(|v| v.round() as i64).collect();
        classes.sort_unstable();
        classes.dedup();
        if classes.len() < 2 {
            return Err(StudioError::TrainingError(
                "Gradient boosting needs at least two classes".to_string(),
            ));
        }

        let mut importances = vec![0.0; x.ncols()];
        let mut boosters = Vec::new();

        if classes.len() == 2 {
            let positive = classes[1];
            let y01 = y.mapv(|v| if v.round() as i64 == positive { 1.0 } else { 0.0 });
            let (booster, imp) =
                BinaryBooster::fit(x, &y01, self.n_estimators, self.learning_rate)?;
            for (j, v) in imp.iter().enumerate() {
                importances[j] += v;
            }
            boosters.push(booster);
        } else {
            for &class in &classes {
                let y01 = y.mapv(|v| if v.round() as i64 == class { 1.0 } else { 0.0 });
                let (booster, imp) =
                    BinaryBooster::fit(x, &y01, self.n_estimators, self.learning_rate)?;
                for (j, v) in imp.iter().enumerate() {
                    importances[j] += v;
                }
                boosters.push(booster);
            }
        }

        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            for v in &mut importances {
                *v /= total;
            }
        }
        self.classes = classes;
        self.boosters = boosters;
        self.importances = importances;
        self.is_fitted = true;
        Ok(())
    }

    pub fn classes(&self) -> &[i64] {
        &self.classes
    }

    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if !self.is_fitted {
            return Err(StudioError::ModelNotFitted);
        }
        let n = x.nrows();
        if self.classes.len() == 2 {
            let scores = self.boosters[0].decision(x)?;
            let mut out = Array2::zeros((n, 2));
            for (i, &s) in scores.iter().enumerate() {
                let p = 1.0 / (1.0 + (-s).exp());
                out[[i, 0]] = 1.0 - p;
                out[[i, 1]] = p;
            }
            return Ok(out);
        }

        let mut out = Array2::zeros((n, self.classes.len()));
        for (idx, booster) in self.boosters.iter().enumerate() {
            let scores = booster.decision(x)?;
            for i in 0..n {
                out[[i, idx]] = 1.0 / (1.0 + (-scores[i]).exp());
            }
        }
        for mut row in out.rows_mut() {
            let total: f64 = row.sum();
            if total > 0.0 {
                row.mapv_inplace(|v| v / total);
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
                let mut best_p = f64::MIN;
                for (idx, &p) in row.iter().enumerate() {
                    if p > best_p {
                        best_p = p;
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

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_regressor_fits_linear_trend() {
        let x = array![[1.0], [2.0], [3.0], [4.0], [5.0], [6.0], [7.0], [8.0]];
        let y = array![2.0, 4.0, 6.0, 8.0, 10.0, 12.0, 14.0, 16.0];
        let mut model = GradientBoostingRegressor::new(50, 42);
        model.fit(&x, &y).unwrap();
        let pred = model.predict(&x).unwrap();
        for (p, t) in pred.iter().zip(y.iter()) {
            assert!((p - t).abs() < 2.0);
        }
    }

    #[test]
    fn test_binary_classifier() {
        let x = array![
            [0.0], [0.5], [1.0], [1.5],
            [8.0], [8.5], [9.0], [9.5]
        ];
        let y = array![0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0];
        let mut model = GradientBoostingClassifier::new(30, 42);
        model.fit(&x, &y).unwrap();
        let pred = model.predict(&x).unwrap();
        for (p, t) in pred.iter().zip(y.iter()) {
            assert_eq!(*p, *t);
        }
        let proba = model.predict_proba(&x).unwrap();
        assert!(proba[[0, 0]] > 0.5);
        assert!(proba[[7, 1]] > 0.5);
    }

    #[test]
    fn test_multiclass_one_vs_rest() {
        let x = array![
            [0.0], [0.2], [0.4],
            [5.0], [5.2], [5.4],
            [10.0], [10.2], [10.4]
        ];
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 2.0, 2.0, 2.0];
        let mut model = GradientBoostingClassifier::new(30, 42);
        model.fit(&x, &y).unwrap();
        assert_eq!(model.classes(), &[0, 1, 2]);
        let pred = model.predict(&x).unwrap();
        let correct = pred.iter().zip(y.iter()).filter(|(p, t)| p == t).count();
        assert!(correct >= 8);
    }

    #[test]
    fn test_importances_normalized() {
        let x = array![[1.0, 0.0], [2.0, 0.0], [8.0, 0.0], [9.0, 0.0]];
        let y = array![0.0, 0.0, 1.0, 1.0];
        let mut model = GradientBoostingClassifier::new(10, 42);
        model.fit(&x, &y).unwrap();
        let imp = model.feature_importances().unwrap();
        assert!((imp.sum() - 1.0).abs() < 1e-9);
        assert!(imp[0] > imp[1]);
    }
}
