//! Evaluation plans: holdout splits and k-fold cross-validation indices.
//!
//! All shuffling is seeded so repeated requests over the same dataset produce
//! identical partitions.

use ndarray::{Array1, Array2, Axis};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::error::{Result, StudioError};

pub const SPLIT_SEED: u64 = 42;

/// How a supervised algorithm gets validated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EvalPlan {
    Holdout { test_fraction: f64 },
    CrossValidation { folds: usize },
}

impl EvalPlan {
    pub fn from_request(cv_enabled: bool, cv_folds: usize, test_size: f64) -> Self {
        if cv_enabled {
            EvalPlan::CrossValidation { folds: cv_folds }
        } else {
            EvalPlan::Holdout {
                test_fraction: test_size,
            }
        }
    }
}

/// Train/test split of row indices.
#[derive(Debug, Clone)]
pub struct Split {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

fn validate_fraction(test_fraction: f64, n: usize) -> Result<usize> {
    if !(0.0..1.0).contains(&test_fraction) || test_fraction <= 0.0 {
        return Err(StudioError::ValidationError(format!(
            "testSize must be between 0 and 1, got {test_fraction}"
        )));
    }
    if n < 2 {
        return Err(StudioError::ValidationError(
            "Need at least 2 samples to split".to_string(),
        ));
    }
    let n_test = ((n as f64) * test_fraction).round() as usize;
    Ok(n_test.clamp(1, n - 1))
}

/// Plain shuffled holdout split.
pub fn holdout_split(n: usize, test_fraction: f64, seed: u64) -> Result<Split> {
    let n_test = validate_fraction(test_fraction, n)?;
    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    indices.shuffle(&mut rng);
    let (test, train) = indices.split_at(n_test);
    Ok(Split {
        train: train.to_vec(),
        test: test.to_vec(),
    })
}

/// Holdout split that keeps class proportions: shuffle within each class,
/// then take the test fraction from each group.
pub fn stratified_holdout_split(
    y: &Array1<f64>,
    test_fraction: f64,
    seed: u64,
) -> Result<Split> {
    let n = y.len();
    validate_fraction(test_fraction, n)?;

    let mut classes: Vec<i64> = y.iter().map(|v| v.round() as i64).collect();
    classes.sort_unstable();
    classes.dedup();

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut train = Vec::new();
    let mut test = Vec::new();

    for class in classes {
        let mut members: Vec<usize> = y
            .iter()
            .enumerate()
            .filter(|(_, &v)| v.round() as i64 == class)
            .map(|(i, _)| i)
            .collect();
        members.shuffle(&mut rng);
        let k = ((members.len() as f64) * test_fraction).round() as usize;
        // Keep at least one sample of the class on each side when possible
        let k = if members.len() > 1 {
            k.clamp(1, members.len() - 1)
        } else {
            0
        };
        let (t, tr) = members.split_at(k);
        test.extend_from_slice(t);
        train.extend_from_slice(tr);
    }

    if train.is_empty() || test.is_empty() {
        return Err(StudioError::ValidationError(
            "Stratified split produced an empty partition".to_string(),
        ));
    }
    Ok(Split { train, test })
}

/// Shuffled k-fold index sets. Errors when there are fewer samples than folds.
pub fn k_fold_splits(n: usize, folds: usize, seed: u64) -> Result<Vec<Split>> {
    if folds < 2 {
        return Err(StudioError::ValidationError(format!(
            "cvFolds must be at least 2, got {folds}"
        )));
    }
    if n < folds {
        return Err(StudioError::ValidationError(format!(
            "Cannot have number of splits {folds} greater than the number of samples {n}"
        )));
    }
    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let base = n / folds;
    let extra = n % folds;
    let mut splits = Vec::with_capacity(folds);
    let mut start = 0;
    for f in 0..folds {
        let size = base + usize::from(f < extra);
        let test: Vec<usize> = indices[start..start + size].to_vec();
        let train: Vec<usize> = indices[..start]
            .iter()
            .chain(indices[start + size..].iter())
            .cloned()
            .collect();
        splits.push(Split { train, test });
        start += size;
    }
    Ok(splits)
}

/// k-fold indices that keep class proportions: members of each class are
/// shuffled and dealt round-robin across the folds.
pub fn stratified_k_fold_splits(
    y: &Array1<f64>,
    folds: usize,
    seed: u64,
) -> Result<Vec<Split>> {
    let n = y.len();
    if folds < 2 {
        return Err(StudioError::ValidationError(format!(
            "cvFolds must be at least 2, got {folds}"
        )));
    }
    if n < folds {
        return Err(StudioError::ValidationError(format!(
            "Cannot have number of splits {folds} greater than the number of samples {n}"
        )));
    }

    let mut classes: Vec<i64> = y.iter().map(|v| v.round() as i64).collect();
    classes.sort_unstable();
    classes.dedup();

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut fold_test: Vec<Vec<usize>> = vec![Vec::new(); folds];

    // The slot counter runs across classes so every fold ends up within one
    // sample of the others and none is left empty.
    let mut slot = 0usize;
    for class in classes {
        let mut members: Vec<usize> = y
            .iter()
            .enumerate()
            .filter(|(_, &v)| v.round() as i64 == class)
            .map(|(i, _)| i)
            .collect();
        members.shuffle(&mut rng);
        for idx in members {
            fold_test[slot % folds].push(idx);
            slot += 1;
        }
    }

    let splits = fold_test
        .iter()
        .map(|test| {
            let in_test: std::collections::HashSet<usize> = test.iter().cloned().collect();
            let train: Vec<usize> = (0..n).filter(|i| !in_test.contains(i)).collect();
            Split {
                train,
                test: test.clone(),
            }
        })
        .collect();
    Ok(splits)
}

/// Materialize feature/target subsets for a list of row indices.
pub fn take_rows(x: &Array2<f64>, y: &Array1<f64>, rows: &[usize]) -> (Array2<f64>, Array1<f64>) {
    let xs = x.select(Axis(0), rows);
    let ys = Array1::from_iter(rows.iter().map(|&i| y[i]));
    (xs, ys)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_holdout_partitions_everything() {
        let split = holdout_split(10, 0.2, SPLIT_SEED).unwrap();
        assert_eq!(split.test.len(), 2);
        assert_eq!(split.train.len(), 8);
        let mut all: Vec<usize> = split.train.iter().chain(split.test.iter()).cloned().collect();
        all.sort_unstable();
        assert_eq!(all, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_holdout_deterministic() {
        let a = holdout_split(20, 0.25, SPLIT_SEED).unwrap();
        let b = holdout_split(20, 0.25, SPLIT_SEED).unwrap();
        assert_eq!(a.test, b.test);
    }

    #[test]
    fn test_invalid_fraction_rejected() {
        assert!(holdout_split(10, 0.0, SPLIT_SEED).is_err());
        assert!(holdout_split(10, 1.5, SPLIT_SEED).is_err());
    }

    #[test]
    fn test_holdout_rejects_tiny_datasets() {
        let err = holdout_split(1, 0.2, SPLIT_SEED).unwrap_err();
        assert!(matches!(err, StudioError::ValidationError(_)));
        assert!(holdout_split(0, 0.2, SPLIT_SEED).is_err());
    }

    #[test]
    fn test_stratified_keeps_both_classes_in_train() {
        let y = array![0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0, 1.0];
        let split = stratified_holdout_split(&y, 0.2, SPLIT_SEED).unwrap();
        let train_classes: std::collections::HashSet<i64> =
            split.train.iter().map(|&i| y[i] as i64).collect();
        assert_eq!(train_classes.len(), 2);
        let test_classes: std::collections::HashSet<i64> =
            split.test.iter().map(|&i| y[i] as i64).collect();
        assert_eq!(test_classes.len(), 2);
    }

    #[test]
    fn test_k_fold_rejects_too_few_samples() {
        let err = k_fold_splits(3, 5, SPLIT_SEED).unwrap_err();
        assert!(matches!(err, StudioError::ValidationError(_)));
    }

    #[test]
    fn test_k_fold_covers_all_rows_once() {
        let splits = k_fold_splits(11, 3, SPLIT_SEED).unwrap();
        assert_eq!(splits.len(), 3);
        let mut all_test: Vec<usize> = splits.iter().flat_map(|s| s.test.clone()).collect();
        all_test.sort_unstable();
        assert_eq!(all_test, (0..11).collect::<Vec<_>>());
        for s in &splits {
            assert_eq!(s.train.len() + s.test.len(), 11);
        }
    }

    #[test]
    fn test_stratified_k_fold_keeps_minority_in_every_train_set() {
        // 12 majority samples, 3 minority samples, 3 folds: each fold's
        // training set must still see the minority class.
        let mut values = vec![0.0; 12];
        values.extend_from_slice(&[1.0, 1.0, 1.0]);
        let y = Array1::from_vec(values);
        let splits = stratified_k_fold_splits(&y, 3, SPLIT_SEED).unwrap();
        assert_eq!(splits.len(), 3);
        let mut all_test: Vec<usize> = splits.iter().flat_map(|s| s.test.clone()).collect();
        all_test.sort_unstable();
        assert_eq!(all_test, (0..15).collect::<Vec<_>>());
        for s in &splits {
            let train_classes: std::collections::HashSet<i64> =
                s.train.iter().map(|&i| y[i] as i64).collect();
            assert_eq!(train_classes.len(), 2);
            assert_eq!(s.test.len(), 5);
        }
    }

    #[test]
    fn test_stratified_k_fold_rejects_too_few_samples() {
        let y = array![0.0, 1.0, 0.0];
        assert!(stratified_k_fold_splits(&y, 5, SPLIT_SEED).is_err());
        assert!(stratified_k_fold_splits(&y, 1, SPLIT_SEED).is_err());
    }

    #[test]
    fn test_take_rows() {
        let x = array![[1.0], [2.0], [3.0]];
        let y = array![10.0, 20.0, 30.0];
        let (xs, ys) = take_rows(&x, &y, &[2, 0]);
        assert_eq!(xs, array![[3.0], [1.0]]);
        assert_eq!(ys, array![30.0, 10.0]);
    }
}
