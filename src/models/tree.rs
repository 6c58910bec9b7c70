//! CART decision trees for classification and regression.
//!
//! Classification leaves keep the full class distribution so the tree can
//! report probabilities; both variants accumulate impurity-decrease feature
//! importances during growth.

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StudioError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TreeNode {
    Leaf {
        /// Majority class (classification) or mean target (regression).
        value: f64,
        /// Per-class sample fractions, aligned with the tree's class list.
        /// Empty for regression leaves.
        distribution: Vec<f64>,
    },
    Internal {
        feature: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
}

impl TreeNode {
    fn descend(&self, row: &[f64]) -> &TreeNode {
        match self {
            TreeNode::Leaf { .. } => self,
            TreeNode::Internal {
                feature,
                threshold,
                left,
                right,
            } => {
                if row[*feature] <= *threshold {
                    left.descend(row)
                } else {
                    right.descend(row)
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SplitCriterion {
    Gini,
    Variance,
}

/// Candidate split thresholds: midpoints between consecutive distinct values.
fn candidate_thresholds(values: &mut Vec<f64>) -> Vec<f64> {
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    values.dedup();
    values
        .windows(2)
        .map(|w| (w[0] + w[1]) / 2.0)
        .collect()
}

fn gini(counts: &[usize], total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let t = total as f64;
    1.0 - counts
        .iter()
        .map(|&c| {
            let p = c as f64 / t;
            p * p
        })
        .sum::<f64>()
}

fn variance(sum: f64, sum_sq: f64, n: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let mean = sum / n as f64;
    (sum_sq / n as f64) - mean * mean
}

struct Grower<'a> {
    x: &'a Array2<f64>,
    y: &'a Array1<f64>,
    classes: Vec<i64>,
    criterion: SplitCriterion,
    max_depth: usize,
    min_samples_split: usize,
    feature_subset: Option<Vec<usize>>,
    importances: Vec<f64>,
    n_total: usize,
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    gain: f64,
    left: Vec<usize>,
    right: Vec<usize>,
}

impl<'a> Grower<'a> {
    fn class_index(&self, label: f64) -> Option<usize> {
        let l = label.round() as i64;
        self.classes.iter().position(|&c| c == l)
    }

    fn node_impurity(&self, indices: &[usize]) -> f64 {
        match self.criterion {
            SplitCriterion::Gini => {
                let mut counts = vec![0usize; self.classes.len()];
                for &i in indices {
                    if let Some(c) = self.class_index(self.y[i]) {
                        counts[c] += 1;
                    }
                }
                gini(&counts, indices.len())
            }
            SplitCriterion::Variance => {
                let (mut sum, mut sum_sq) = (0.0, 0.0);
                for &i in indices {
                    sum += self.y[i];
                    sum_sq += self.y[i] * self.y[i];
                }
                variance(sum, sum_sq, indices.len())
            }
        }
    }

    fn best_split(&self, indices: &[usize]) -> Option<BestSplit> {
        let parent_impurity = self.node_impurity(indices);
        let n = indices.len() as f64;
        let mut best: Option<BestSplit> = None;

        let features: Vec<usize> = match &self.feature_subset {
            Some(subset) => subset.clone(),
            None => (0..self.x.ncols()).collect(),
        };

        for feature in features {
            let mut values: Vec<f64> = indices.iter().map(|&i| self.x[[i, feature]]).collect();
            for threshold in candidate_thresholds(&mut values) {
                let (mut left, mut right) = (Vec::new(), Vec::new());
                for &i in indices {
                    if self.x[[i, feature]] <= threshold {
                        left.push(i);
                    } else {
                        right.push(i);
                    }
                }
                if left.is_empty() || right.is_empty() {
                    continue;
                }
                let weighted = (left.len() as f64 / n) * self.node_impurity(&left)
                    + (right.len() as f64 / n) * self.node_impurity(&right);
                let gain = parent_impurity - weighted;
                if gain > best.as_ref().map_or(1e-12, |b| b.gain) {
                    best = Some(BestSplit {
                        feature,
                        threshold,
                        gain,
                        left,
                        right,
                    });
                }
            }
        }
        best
    }

    fn leaf(&self, indices: &[usize]) -> TreeNode {
        match self.criterion {
            SplitCriterion::Gini => {
                let mut counts = vec![0usize; self.classes.len()];
                for &i in indices {
                    if let Some(c) = self.class_index(self.y[i]) {
                        counts[c] += 1;
                    }
                }
                let total = indices.len().max(1) as f64;
                let distribution: Vec<f64> = counts.iter().map(|&c| c as f64 / total).collect();
                let majority = counts
                    .iter()
                    .enumerate()
                    .max_by_key(|(_, &c)| c)
                    .map(|(idx, _)| self.classes[idx] as f64)
                    .unwrap_or(0.0);
                TreeNode::Leaf {
                    value: majority,
                    distribution,
                }
            }
            SplitCriterion::Variance => {
                let mean = if indices.is_empty() {
                    0.0
                } else {
                    indices.iter().map(|&i| self.y[i]).sum::<f64>() / indices.len() as f64
                };
                TreeNode::Leaf {
                    value: mean,
                    distribution: Vec::new(),
                }
            }
        }
    }

    fn grow(&mut self, indices: &[usize], depth: usize) -> TreeNode {
        if depth >= self.max_depth
            || indices.len() < self.min_samples_split
            || self.node_impurity(indices) < 1e-12
        {
            return self.leaf(indices);
        }
        match self.best_split(indices) {
            Some(split) => {
                self.importances[split.feature] +=
                    split.gain * indices.len() as f64 / self.n_total as f64;
                let left = self.grow(&split.left, depth + 1);
                let right = self.grow(&split.right, depth + 1);
                TreeNode::Internal {
                    feature: split.feature,
                    threshold: split.threshold,
                    left: Box::new(left),
                    right: Box::new(right),
                }
            }
            None => self.leaf(indices),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTreeClassifier {
    pub max_depth: usize,
    pub min_samples_split: usize,
    root: Option<TreeNode>,
    classes: Vec<i64>,
    importances: Vec<f64>,
    pub is_fitted: bool,
}

impl DecisionTreeClassifier {
    pub fn new(max_depth: usize) -> Self {
        Self {
            max_depth,
            min_samples_split: 2,
            root: None,
            classes: Vec::new(),
            importances: Vec::new(),
            is_fitted: false,
        }
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        self.fit_on_subset(x, y, &(0..x.nrows()).collect::<Vec<_>>(), None)
    }

    /// Fit on a row subset with an optional feature subset. The forest uses
    /// this entry point for bootstrap samples.
    pub fn fit_on_subset(
        &mut self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        rows: &[usize],
        feature_subset: Option<Vec<usize>>,
    ) -> Result<()> {
        if rows.is_empty() {
            return Err(StudioError::TrainingError(
                "Cannot fit a tree on an empty sample".to_string(),
            ));
        }
        let mut classes: Vec<i64> = rows.iter().map(|&i| y[i].round() as i64).collect();
        classes.sort_unstable();
        classes.dedup();

        let mut grower = Grower {
            x,
            y,
            classes: classes.clone(),
            criterion: SplitCriterion::Gini,
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split,
            feature_subset,
            importances: vec![0.0; x.ncols()],
            n_total: rows.len(),
        };
        let root = grower.grow(rows, 0);
        self.root = Some(root);
        self.classes = classes;
        self.importances = grower.importances;
        self.is_fitted = true;
        Ok(())
    }

    pub fn classes(&self) -> &[i64] {
        &self.classes
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let root = self.root.as_ref().ok_or(StudioError::ModelNotFitted)?;
        let preds = x
            .rows()
            .into_iter()
            .map(|row| {
                let slice: Vec<f64> = row.to_vec();
                match root.descend(&slice) {
                    TreeNode::Leaf { value, .. } => *value,
                    TreeNode::Internal { .. } => unreachable!(),
                }
            })
            .collect();
        Ok(Array1::from_vec(preds))
    }

    /// Leaf class distributions, one column per class in sorted class order.
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let root = self.root.as_ref().ok_or(StudioError::ModelNotFitted)?;
        let mut out = Array2::zeros((x.nrows(), self.classes.len()));
        for (i, row) in x.rows().into_iter().enumerate() {
            let slice: Vec<f64> = row.to_vec();
            if let TreeNode::Leaf { distribution, .. } = root.descend(&slice) {
                for (j, &p) in distribution.iter().enumerate() {
                    out[[i, j]] = p;
                }
            }
        }
        Ok(out)
    }

    /// Impurity-decrease importances, normalized to sum to 1 when non-zero.
    pub fn feature_importances(&self) -> Result<Array1<f64>> {
        if !self.is_fitted {
            return Err(StudioError::ModelNotFitted);
        }
        let total: f64 = self.importances.iter().sum();
        let values = if total > 0.0 {
            self.importances.iter().map(|v| v / total).collect()
        } else {
            self.importances.clone()
        };
        Ok(Array1::from_vec(values))
    }

    /// Raw (unnormalized) importances for forest averaging.
    pub fn raw_importances(&self) -> &[f64] {
        &self.importances
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTreeRegressor {
    pub max_depth: usize,
    pub min_samples_split: usize,
    root: Option<TreeNode>,
    importances: Vec<f64>,
    pub is_fitted: bool,
}

impl DecisionTreeRegressor {
    pub fn new(max_depth: usize) -> Self {
        Self {
            max_depth,
            min_samples_split: 2,
            root: None,
            importances: Vec::new(),
            is_fitted: false,
        }
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        self.fit_on_subset(x, y, &(0..x.nrows()).collect::<Vec<_>>(), None)
    }

    pub fn fit_on_subset(
        &mut self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        rows: &[usize],
        feature_subset: Option<Vec<usize>>,
    ) -> Result<()> {
        if rows.is_empty() {
            return Err(StudioError::TrainingError(
                "Cannot fit a tree on an empty sample".to_string(),
            ));
        }
        let mut grower = Grower {
            x,
            y,
            classes: Vec::new(),
            criterion: SplitCriterion::Variance,
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split,
            feature_subset,
            importances: vec![0.0; x.ncols()],
            n_total: rows.len(),
        };
        let root = grower.grow(rows, 0);
        self.root = Some(root);
        self.importances = grower.importances;
        self.is_fitted = true;
        Ok(())
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let root = self.root.as_ref().ok_or(StudioError::ModelNotFitted)?;
        let preds = x
            .rows()
            .into_iter()
            .map(|row| {
                let slice: Vec<f64> = row.to_vec();
                match root.descend(&slice) {
                    TreeNode::Leaf { value, .. } => *value,
                    TreeNode::Internal { .. } => unreachable!(),
                }
            })
            .collect();
        Ok(Array1::from_vec(preds))
    }

    pub fn feature_importances(&self) -> Result<Array1<f64>> {
        if !self.is_fitted {
            return Err(StudioError::ModelNotFitted);
        }
        let total: f64 = self.importances.iter().sum();
        let values = if total > 0.0 {
            self.importances.iter().map(|v| v / total).collect()
        } else {
            self.importances.clone()
        };
        Ok(Array1::from_vec(values))
    }

    pub fn raw_importances(&self) -> &[f64] {
        &self.importances
    }
}
