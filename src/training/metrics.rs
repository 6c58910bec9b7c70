//! Metric engines for the three task types.
//!
//! Numeric metrics are rounded to 4 decimal places before they leave this
//! module. Clustering metrics are individually guarded: a degenerate labeling
//! never fails the algorithm, it just withholds the affected scores.

use ndarray::{Array1, Array2};
use std::collections::BTreeMap;

use crate::error::{Result, StudioError};

pub fn round4(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}

/// Sorted distinct class labels across truth and predictions.
pub fn observed_classes(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Vec<i64> {
    let mut classes: Vec<i64> = y_true
        .iter()
        .chain(y_pred.iter())
        .map(|v| v.round() as i64)
        .collect();
    classes.sort_unstable();
    classes.dedup();
    classes
}

/// Row = true class, column = predicted class.
pub fn confusion_matrix(y_true: &Array1<f64>, y_pred: &Array1<f64>, classes: &[i64]) -> Array2<u64> {
    let mut matrix = Array2::zeros((classes.len(), classes.len()));
    for (t, p) in y_true.iter().zip(y_pred.iter()) {
        let ti = classes.iter().position(|&c| c == t.round() as i64);
        let pi = classes.iter().position(|&c| c == p.round() as i64);
        if let (Some(ti), Some(pi)) = (ti, pi) {
            matrix[[ti, pi]] += 1;
        }
    }
    matrix
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationScores {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

/// Accuracy plus support-weighted precision/recall/F1. Classes with no
/// predicted (or true) samples contribute 0 for the undefined ratio.
pub fn classification_scores(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<ClassificationScores> {
    if y_true.len() != y_pred.len() || y_true.is_empty() {
        return Err(StudioError::ComputationError(
            "Prediction and truth vectors must be non-empty and equal length".to_string(),
        ));
    }
    let classes = observed_classes(y_true, y_pred);
    let cm = confusion_matrix(y_true, y_pred, &classes);
    let n = y_true.len() as f64;

    let correct: u64 = (0..classes.len()).map(|i| cm[[i, i]]).sum();
    let accuracy = correct as f64 / n;

    let mut precision = 0.0;
    let mut recall = 0.0;
    let mut f1 = 0.0;
    for i in 0..classes.len() {
        let tp = cm[[i, i]] as f64;
        let support: f64 = (0..classes.len()).map(|j| cm[[i, j]] as f64).sum();
        let predicted: f64 = (0..classes.len()).map(|j| cm[[j, i]] as f64).sum();
        let p = if predicted > 0.0 { tp / predicted } else { 0.0 };
        let r = if support > 0.0 { tp / support } else { 0.0 };
        let f = if p + r > 0.0 { 2.0 * p * r / (p + r) } else { 0.0 };
        let weight = support / n;
        precision += weight * p;
        recall += weight * r;
        f1 += weight * f;
    }

    Ok(ClassificationScores {
        accuracy: round4(accuracy),
        precision: round4(precision),
        recall: round4(recall),
        f1: round4(f1),
    })
}

/// ROC curve points and AUC for a binary problem. `scores` are probabilities
/// of the positive class; `positive` is the higher of the two labels.
pub fn roc_curve(
    y_true: &Array1<f64>,
    scores: &Array1<f64>,
    positive: i64,
) -> Result<(Vec<(f64, f64)>, f64)> {
    let n_pos = y_true.iter().filter(|&&v| v.round() as i64 == positive).count();
    let n_neg = y_true.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return Err(StudioError::ComputationError(
            "ROC needs both classes present".to_string(),
        ));
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| {
        scores[b]
            .partial_cmp(&scores[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut points = vec![(0.0, 0.0)];
    let (mut tp, mut fp) = (0usize, 0usize);
    let mut prev_score = f64::INFINITY;
    for &i in &order {
        if scores[i] != prev_score {
            points.push((fp as f64 / n_neg as f64, tp as f64 / n_pos as f64));
            prev_score = scores[i];
        }
        if y_true[i].round() as i64 == positive {
            tp += 1;
        } else {
            fp += 1;
        }
    }
    points.push((1.0, 1.0));

    // Trapezoid rule over the curve
    let mut auc = 0.0;
    for w in points.windows(2) {
        let (x0, y0) = w[0];
        let (x1, y1) = w[1];
        auc += (x1 - x0) * (y0 + y1) / 2.0;
    }
    Ok((points, round4(auc)))
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegressionScores {
    pub r2: f64,
    pub mse: f64,
    pub rmse: f64,
}

pub fn regression_scores(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<RegressionScores> {
    if y_true.len() != y_pred.len() || y_true.is_empty() {
        return Err(StudioError::ComputationError(
            "Prediction and truth vectors must be non-empty and equal length".to_string(),
        ));
    }
    let n = y_true.len() as f64;
    let mse = y_true
        .iter()
        .zip(y_pred.iter())
        .map(|(t, p)| (t - p) * (t - p))
        .sum::<f64>()
        / n;
    let mean = y_true.mean().unwrap_or(0.0);
    let ss_tot: f64 = y_true.iter().map(|t| (t - mean) * (t - mean)).sum();
    let ss_res: f64 = y_true
        .iter()
        .zip(y_pred.iter())
        .map(|(t, p)| (t - p) * (t - p))
        .sum();
    let r2 = if ss_tot > 0.0 { 1.0 - ss_res / ss_tot } else { 0.0 };

    Ok(RegressionScores {
        r2: round4(r2),
        mse: round4(mse),
        rmse: round4(mse.sqrt()),
    })
}

/// Clustering metrics with per-metric guards.
///
/// `metrics` holds numeric values (or None for a withheld/failed metric);
/// `info` always carries a status line, `reasons` lists why metrics were
/// withheld, one tag per affected metric.
#[derive(Debug, Clone)]
pub struct ClusteringReport {
    pub n_clusters: usize,
    pub silhouette: Option<f64>,
    pub calinski_harabasz: Option<f64>,
    pub davies_bouldin: Option<f64>,
    pub info: String,
    pub reasons: Vec<String>,
    /// Cluster label -> member count, noise (-1) included.
    pub cluster_sizes: BTreeMap<i64, usize>,
}

fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

fn silhouette_score(rows: &[Vec<f64>], labels: &[i64]) -> Result<f64> {
    let n = rows.len();
    let mut clusters: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
    for (i, &l) in labels.iter().enumerate() {
        clusters.entry(l).or_default().push(i);
    }
    if clusters.len() < 2 {
        return Err(StudioError::ComputationError(
            "Silhouette requires at least 2 clusters".to_string(),
        ));
    }

    let mut total = 0.0;
    for i in 0..n {
        let own = &clusters[&labels[i]];
        let a = if own.len() > 1 {
            own.iter()
                .filter(|&&j| j != i)
                .map(|&j| euclidean(&rows[i], &rows[j]))
                .sum::<f64>()
                / (own.len() - 1) as f64
        } else {
            0.0
        };
        let b = clusters
            .iter()
            .filter(|(&l, _)| l != labels[i])
            .map(|(_, members)| {
                members
                    .iter()
                    .map(|&j| euclidean(&rows[i], &rows[j]))
                    .sum::<f64>()
                    / members.len() as f64
            })
            .fold(f64::MAX, f64::min);
        let denom = a.max(b);
        total += if denom > 0.0 { (b - a) / denom } else { 0.0 };
    }
    Ok(total / n as f64)
}

fn calinski_harabasz_score(rows: &[Vec<f64>], labels: &[i64]) -> Result<f64> {
    let n = rows.len();
    let d = rows[0].len();
    let mut clusters: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
    for (i, &l) in labels.iter().enumerate() {
        clusters.entry(l).or_default().push(i);
    }
    let k = clusters.len();
    if k < 2 || n <= k {
        return Err(StudioError::ComputationError(
            "Calinski-Harabasz requires 2 <= k < n".to_string(),
        ));
    }

    let mut global = vec![0.0; d];
    for row in rows {
        for (j, v) in row.iter().enumerate() {
            global[j] += v;
        }
    }
    for v in &mut global {
        *v /= n as f64;
    }

    let mut between = 0.0;
    let mut within = 0.0;
    for members in clusters.values() {
        let mut center = vec![0.0; d];
        for &i in members {
            for (j, v) in rows[i].iter().enumerate() {
                center[j] += v;
            }
        }
        for v in &mut center {
            *v /= members.len() as f64;
        }
        between += members.len() as f64 * euclidean(&center, &global).powi(2);
        for &i in members {
            within += euclidean(&rows[i], &center).powi(2);
        }
    }
    if within <= 0.0 {
        return Err(StudioError::ComputationError(
            "Zero within-cluster dispersion".to_string(),
        ));
    }
    Ok((between / (k - 1) as f64) / (within / (n - k) as f64))
}

fn davies_bouldin_score(rows: &[Vec<f64>], labels: &[i64]) -> Result<f64> {
    let d = rows[0].len();
    let mut clusters: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
    for (i, &l) in labels.iter().enumerate() {
        clusters.entry(l).or_default().push(i);
    }
    let k = clusters.len();
    if k < 2 {
        return Err(StudioError::ComputationError(
            "Davies-Bouldin requires at least 2 clusters".to_string(),
        ));
    }

    let mut centers = Vec::with_capacity(k);
    let mut scatters = Vec::with_capacity(k);
    for members in clusters.values() {
        let mut center = vec![0.0; d];
        for &i in members {
            for (j, v) in rows[i].iter().enumerate() {
                center[j] += v;
            }
        }
        for v in &mut center {
            *v /= members.len() as f64;
        }
        let scatter = members
            .iter()
            .map(|&i| euclidean(&rows[i], &center))
            .sum::<f64>()
            / members.len() as f64;
        centers.push(center);
        scatters.push(scatter);
    }

    let mut total = 0.0;
    for i in 0..k {
        let mut worst = 0.0f64;
        for j in 0..k {
            if i == j {
                continue;
            }
            let sep = euclidean(&centers[i], &centers[j]);
            if sep > 0.0 {
                worst = worst.max((scatters[i] + scatters[j]) / sep);
            }
        }
        total += worst;
    }
    Ok(total / k as f64)
}

/// Evaluate a clustering labeling over the numeric matrix it was fit on.
pub fn clustering_report(x: &Array2<f64>, labels: &Array1<i64>) -> ClusteringReport {
    let rows: Vec<Vec<f64>> = x.rows().into_iter().map(|r| r.to_vec()).collect();

    let mut cluster_sizes: BTreeMap<i64, usize> = BTreeMap::new();
    for &l in labels.iter() {
        *cluster_sizes.entry(l).or_insert(0) += 1;
    }
    let has_noise = cluster_sizes.contains_key(&-1);
    let n_clusters = cluster_sizes.keys().filter(|&&l| l != -1).count();

    // Noise points are excluded from the internal metrics
    let kept: Vec<usize> = labels
        .iter()
        .enumerate()
        .filter(|(_, &l)| l != -1)
        .map(|(i, _)| i)
        .collect();
    let kept_rows: Vec<Vec<f64>> = kept.iter().map(|&i| rows[i].clone()).collect();
    let kept_labels: Vec<i64> = kept.iter().map(|&i| labels[i]).collect();

    let mut reasons = Vec::new();
    let (silhouette, calinski, davies);
    if n_clusters < 2 || kept_rows.len() < 2 {
        silhouette = None;
        calinski = None;
        davies = None;
        reasons.push("insufficient_clusters".to_string());
    } else {
        silhouette = match silhouette_score(&kept_rows, &kept_labels) {
            Ok(v) => Some(round4(v)),
            Err(_) => {
                reasons.push("silhouette_failed".to_string());
                None
            }
        };
        calinski = match calinski_harabasz_score(&kept_rows, &kept_labels) {
            Ok(v) => Some(round4(v)),
            Err(_) => {
                reasons.push("calinski_harabasz_failed".to_string());
                None
            }
        };
        davies = match davies_bouldin_score(&kept_rows, &kept_labels) {
            Ok(v) => Some(round4(v)),
            Err(_) => {
                reasons.push("davies_bouldin_failed".to_string());
                None
            }
        };
    }

    let info = if n_clusters < 2 {
        format!(
            "Found {n_clusters} cluster(s){}; internal validity metrics need at least 2",
            if has_noise { " plus noise" } else { "" }
        )
    } else {
        format!(
            "Found {n_clusters} clusters{}",
            if has_noise { " plus noise" } else { "" }
        )
    };

    ClusteringReport {
        n_clusters,
        silhouette,
        calinski_harabasz: calinski,
        davies_bouldin: davies,
        info,
        reasons,
        cluster_sizes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_perfect_classification() {
        let y = array![0.0, 1.0, 1.0, 0.0];
        let s = classification_scores(&y, &y).unwrap();
        assert_eq!(s.accuracy, 1.0);
        assert_eq!(s.f1, 1.0);
    }

    #[test]
    fn test_weighted_scores_with_missing_predicted_class() {
        // Class 1 never predicted: its precision is 0, not NaN
        let y_true = array![0.0, 0.0, 0.0, 1.0];
        let y_pred = array![0.0, 0.0, 0.0, 0.0];
        let s = classification_scores(&y_true, &y_pred).unwrap();
        assert_eq!(s.accuracy, 0.75);
        assert!(s.precision.is_finite());
        assert!(s.f1.is_finite());
    }

    #[test]
    fn test_rounding_to_four_decimals() {
        let y_true = array![0.0, 0.0, 1.0];
        let y_pred = array![0.0, 1.0, 1.0];
        let s = classification_scores(&y_true, &y_pred).unwrap();
        assert_eq!(s.accuracy, 0.6667);
    }

    #[test]
    fn test_confusion_matrix_layout() {
        let y_true = array![0.0, 0.0, 1.0];
        let y_pred = array![0.0, 1.0, 1.0];
        let cm = confusion_matrix(&y_true, &y_pred, &[0, 1]);
        assert_eq!(cm[[0, 0]], 1);
        assert_eq!(cm[[0, 1]], 1);
        assert_eq!(cm[[1, 1]], 1);
    }

    #[test]
    fn test_roc_perfect_separation() {
        let y = array![0.0, 0.0, 1.0, 1.0];
        let scores = array![0.1, 0.2, 0.8, 0.9];
        let (_, auc) = roc_curve(&y, &scores, 1).unwrap();
        assert_eq!(auc, 1.0);
    }

    #[test]
    fn test_roc_single_class_errors() {
        let y = array![1.0, 1.0];
        let scores = array![0.5, 0.6];
        assert!(roc_curve(&y, &scores, 1).is_err());
    }

    #[test]
    fn test_regression_perfect_fit() {
        let y = array![1.0, 2.0, 3.0];
        let s = regression_scores(&y, &y).unwrap();
        assert_eq!(s.r2, 1.0);
        assert_eq!(s.mse, 0.0);
    }

    #[test]
    fn test_regression_constant_target_r2_zero() {
        let y_true = array![5.0, 5.0, 5.0];
        let y_pred = array![4.0, 5.0, 6.0];
        let s = regression_scores(&y_true, &y_pred).unwrap();
        assert_eq!(s.r2, 0.0);
    }

    #[test]
    fn test_clustering_two_clean_clusters() {
        let x = array![[0.0, 0.0], [0.1, 0.1], [9.0, 9.0], [9.1, 9.1]];
        let labels = array![0i64, 0, 1, 1];
        let report = clustering_report(&x, &labels);
        assert_eq!(report.n_clusters, 2);
        assert!(report.silhouette.unwrap() > 0.8);
        assert!(report.calinski_harabasz.is_some());
        assert!(report.davies_bouldin.is_some());
        assert!(report.reasons.is_empty());
    }

    #[test]
    fn test_clustering_single_cluster_withholds_metrics() {
        let x = array![[0.0], [0.1], [0.2]];
        let labels = array![0i64, 0, 0];
        let report = clustering_report(&x, &labels);
        assert_eq!(report.n_clusters, 1);
        assert!(report.silhouette.is_none());
        assert!(report.calinski_harabasz.is_none());
        assert!(report.davies_bouldin.is_none());
        assert_eq!(report.reasons, vec!["insufficient_clusters".to_string()]);
        assert!(!report.info.is_empty());
    }

    #[test]
    fn test_clustering_noise_excluded_from_count() {
        let x = array![[0.0], [0.1], [9.0], [9.1], [50.0]];
        let labels = array![0i64, 0, 1, 1, -1];
        let report = clustering_report(&x, &labels);
        assert_eq!(report.n_clusters, 2);
        assert_eq!(report.cluster_sizes[&-1], 1);
        assert!(report.silhouette.is_some());
    }
}
