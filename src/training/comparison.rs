//! Cross-algorithm comparison artifacts.
//!
//! Classification and regression batches with at least two numeric result
//! entries get a ranked bar chart over the leading metric and a summary
//! table image with values scaled to percentages. Everything here is
//! best-effort: failures are logged and the artifacts simply stay absent.

use serde_json::Value;
use tracing::warn;

use crate::plot;
use crate::training::registry::TaskType;
use crate::training::trainer::AlgorithmEntry;

/// Stable metric column order per task; the first column ranks the chart.
fn metric_order(task: TaskType) -> &'static [&'static str] {
    match task {
        TaskType::Classification => &["accuracy", "precision", "recall", "f1"],
        TaskType::Regression => &["r2", "mse", "rmse"],
        TaskType::Clustering => &[],
    }
}

/// Build (comparison_plot, metrics_table) for a finished batch.
pub fn build(task: TaskType, results: &[AlgorithmEntry]) -> (Option<String>, Option<String>) {
    let order = metric_order(task);
    if order.is_empty() {
        return (None, None);
    }

    // Only entries whose leading metric is numeric participate
    let lead = order[0];
    let mut ranked: Vec<(&AlgorithmEntry, f64)> = results
        .iter()
        .filter_map(|entry| {
            entry
                .metrics
                .get(lead)
                .and_then(Value::as_f64)
                .map(|v| (entry, v))
        })
        .collect();
    if ranked.len() < 2 {
        return (None, None);
    }
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let bars: Vec<(String, f64)> = ranked
        .iter()
        .map(|(entry, v)| (entry.algorithm.clone(), *v))
        .collect();
    let comparison_plot = match plot::comparison_bar(&bars, lead) {
        Ok(b64) => Some(b64),
        Err(err) => {
            warn!(error = %err, "comparison chart failed");
            None
        }
    };

    let mut headers = vec!["model".to_string()];
    headers.extend(order.iter().map(|s| s.to_string()));
    let rows: Vec<Vec<String>> = ranked
        .iter()
        .map(|(entry, _)| {
            let mut row = vec![entry.algorithm.clone()];
            for key in order {
                let cell = entry
                    .metrics
                    .get(*key)
                    .and_then(Value::as_f64)
                    .map(|v| format!("{:.2}", v * 100.0))
                    .unwrap_or_else(|| "-".to_string());
                row.push(cell);
            }
            row
        })
        .collect();
    let metrics_table = match plot::metrics_table(&headers, &rows) {
        Ok(b64) => Some(b64),
        Err(err) => {
            warn!(error = %err, "metrics table failed");
            None
        }
    };

    (comparison_plot, metrics_table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn entry(name: &str, metrics: &[(&str, Option<f64>)]) -> AlgorithmEntry {
        let mut m = Map::new();
        for (k, v) in metrics {
            let value = v
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .unwrap_or(Value::Null);
            m.insert(k.to_string(), value);
        }
        AlgorithmEntry {
            algorithm: name.to_string(),
            metrics: m,
            importance_plot: None,
            plots: Vec::new(),
            error: None,
        }
    }

    #[test]
    fn test_two_numeric_entries_produce_artifacts() {
        let results = vec![
            entry("KNN", &[("accuracy", Some(0.8)), ("precision", Some(0.79)), ("recall", Some(0.8)), ("f1", Some(0.79))]),
            entry("RandomForest", &[("accuracy", Some(0.95)), ("precision", Some(0.94)), ("recall", Some(0.95)), ("f1", Some(0.94))]),
        ];
        let (plot, table) = build(TaskType::Classification, &results);
        assert!(plot.is_some());
        assert!(table.is_some());
    }

    #[test]
    fn test_single_entry_produces_nothing() {
        let results = vec![entry("KNN", &[("accuracy", Some(0.8))])];
        let (plot, table) = build(TaskType::Classification, &results);
        assert!(plot.is_none());
        assert!(table.is_none());
    }

    #[test]
    fn test_failed_entries_do_not_count() {
        let results = vec![
            entry("KNN", &[("accuracy", Some(0.8))]),
            entry("SVM", &[("accuracy", None)]),
        ];
        let (plot, table) = build(TaskType::Classification, &results);
        assert!(plot.is_none());
        assert!(table.is_none());
    }

    #[test]
    fn test_clustering_never_compares() {
        let results = vec![
            entry("KMeans", &[("silhouette", Some(0.5))]),
            entry("DBSCAN", &[("silhouette", Some(0.4))]),
        ];
        let (plot, table) = build(TaskType::Clustering, &results);
        assert!(plot.is_none());
        assert!(table.is_none());
    }
}
