//! Integration test: training batches end-to-end

use polars::prelude::*;
use serde_json::{Map, Value};

use mlstudio::store::{ModelStore, PersistedModel};
use mlstudio::training::registry::TaskType;
use mlstudio::training::trainer::{run_batch, TrainingJob};

fn classification_df() -> DataFrame {
    let mut f1 = Vec::new();
    let mut f2 = Vec::new();
    let mut target = Vec::new();
    for i in 0..30 {
        let group = (i % 2) as f64;
        f1.push(group * 6.0 + (i as f64) * 0.07);
        f2.push(group * 6.0 - (i as f64) * 0.05);
        target.push(group);
    }
    df!("f1" => f1, "f2" => f2, "target" => target).unwrap()
}

fn regression_df() -> DataFrame {
    let x1: Vec<f64> = (1..=24).map(|i| i as f64).collect();
    let x2: Vec<f64> = (1..=24).map(|i| i as f64 * 2.0).collect();
    let target: Vec<f64> = (1..=24).map(|i| i as f64 * 3.0 + 1.0).collect();
    df!("x1" => x1, "x2" => x2, "target" => target).unwrap()
}

fn job(task: TaskType, algorithms: &[&str]) -> TrainingJob {
    TrainingJob {
        task,
        algorithms: algorithms.iter().map(|s| s.to_string()).collect(),
        params: Map::new(),
        target: Some("target".to_string()),
        test_size: 0.2,
        cv_enabled: false,
        cv_folds: 5,
    }
}

fn store(name: &str) -> ModelStore {
    ModelStore::new(std::env::temp_dir().join(format!("mlstudio_it_{name}")))
}

#[test]
fn test_classification_batch_with_comparison() {
    let df = classification_df();
    let j = job(TaskType::Classification, &["DecisionTree", "NaiveBayes"]);
    let outcome = run_batch(&df, &j, &store("cls_batch")).unwrap();

    assert_eq!(outcome.results.len(), 2);
    for entry in &outcome.results {
        assert!(entry.error.is_none(), "unexpected failure: {:?}", entry.error);
        let acc = entry.metrics.get("accuracy").and_then(Value::as_f64).unwrap();
        assert!((0.0..=1.0).contains(&acc));
        // Confusion heatmap always present for a successful classifier
        assert!(!entry.plots.is_empty());
    }
    assert!(outcome.comparison_plot.is_some());
    assert!(outcome.metrics_table.is_some());
}

#[test]
fn test_tree_models_carry_importance_plot() {
    let df = classification_df();
    let j = job(TaskType::Classification, &["DecisionTree", "KNN"]);
    let outcome = run_batch(&df, &j, &store("importance")).unwrap();
    let tree = &outcome.results[0];
    let knn = &outcome.results[1];
    assert!(tree.importance_plot.is_some());
    assert!(knn.importance_plot.is_none());
}

#[test]
fn test_unknown_algorithm_is_skipped() {
    let df = classification_df();
    let j = job(TaskType::Classification, &["NaiveBayes", "QuantumForest"]);
    let outcome = run_batch(&df, &j, &store("skip")).unwrap();
    assert_eq!(outcome.results.len(), 1);
    assert_eq!(outcome.results[0].algorithm, "NaiveBayes");
}

#[test]
fn test_cv_handles_small_minority_class() {
    // 3 minority samples across 3 folds: plain shuffled folds could drop
    // the minority class from a training set, stratified folds cannot.
    let mut f1 = Vec::new();
    let mut f2 = Vec::new();
    let mut target = Vec::new();
    for i in 0..27 {
        f1.push(i as f64 * 0.1);
        f2.push(-(i as f64) * 0.1);
        target.push(0.0);
    }
    for i in 0..3 {
        f1.push(9.0 + i as f64 * 0.1);
        f2.push(9.0 - i as f64 * 0.1);
        target.push(1.0);
    }
    let df = df!("f1" => f1, "f2" => f2, "target" => target).unwrap();

    let mut j = job(TaskType::Classification, &["LogisticRegression", "DecisionTree"]);
    j.cv_enabled = true;
    j.cv_folds = 3;
    let outcome = run_batch(&df, &j, &store("minority_cv")).unwrap();
    assert_eq!(outcome.results.len(), 2);
    for entry in &outcome.results {
        assert!(entry.error.is_none(), "unexpected failure: {:?}", entry.error);
        let acc = entry.metrics.get("accuracy").and_then(Value::as_f64).unwrap();
        assert!((0.0..=1.0).contains(&acc));
    }
}

#[test]
fn test_cv_folds_exceeding_samples_fails_per_algorithm() {
    let df = classification_df();
    let mut j = job(TaskType::Classification, &["NaiveBayes", "DecisionTree"]);
    j.cv_enabled = true;
    j.cv_folds = 1000;
    let outcome = run_batch(&df, &j, &store("folds")).unwrap();
    assert_eq!(outcome.results.len(), 2);
    for entry in &outcome.results {
        assert!(entry.error.is_some());
        assert!(entry.metrics.values().all(Value::is_null));
        assert!(entry.plots.is_empty());
    }
    // Failed entries hold no numeric metrics, so no comparison artifacts
    assert!(outcome.comparison_plot.is_none());
}

#[test]
fn test_regression_batch_metrics() {
    let df = regression_df();
    let j = job(TaskType::Regression, &["LinearRegression", "Ridge"]);
    let outcome = run_batch(&df, &j, &store("reg")).unwrap();
    assert_eq!(outcome.results.len(), 2);
    for entry in &outcome.results {
        assert!(entry.error.is_none());
        let r2 = entry.metrics.get("r2").and_then(Value::as_f64).unwrap();
        assert!(r2 > 0.99, "linear data should fit almost perfectly, got {r2}");
        assert!(entry.metrics.get("mse").and_then(Value::as_f64).is_some());
        assert!(entry.metrics.get("rmse").and_then(Value::as_f64).is_some());
    }
    assert!(outcome.comparison_plot.is_some());
}

#[test]
fn test_regression_cv_uses_out_of_fold_predictions() {
    let df = regression_df();
    let mut j = job(TaskType::Regression, &["LinearRegression"]);
    j.cv_enabled = true;
    j.cv_folds = 4;
    let outcome = run_batch(&df, &j, &store("reg_cv")).unwrap();
    let entry = &outcome.results[0];
    assert!(entry.error.is_none());
    assert!(entry.metrics.get("r2").and_then(Value::as_f64).unwrap() > 0.9);
}

#[test]
fn test_cv_classification_metrics_stay_honest_while_plots_refit() {
    // Cross-validated metrics are averaged over held-out folds, while the
    // diagnostic plots come from a full-data refit. On noisy data the refit
    // (training-set) accuracy reads higher than the cross-validated number.
    let mut f1 = Vec::new();
    let mut target = Vec::new();
    for i in 0..40 {
        let group = (i % 2) as f64;
        // Heavy overlap between the groups
        f1.push(group * 0.4 + ((i * 7) % 11) as f64);
        target.push(group);
    }
    let df = df!("f1" => f1.clone(), "target" => target.clone()).unwrap();

    let mut j = job(TaskType::Classification, &["DecisionTree"]);
    j.cv_enabled = true;
    j.cv_folds = 5;
    let outcome = run_batch(&df, &j, &store("cv_optimism")).unwrap();
    let entry = &outcome.results[0];
    assert!(entry.error.is_none());
    let cv_accuracy = entry.metrics.get("accuracy").and_then(Value::as_f64).unwrap();

    // Refit on all rows, exactly as the plot path does
    use mlstudio::training::registry::{ClassificationAlgo, Hyperparams};
    use ndarray::{Array1, Array2};
    let x = Array2::from_shape_fn((40, 1), |(r, _)| f1[r]);
    let y = Array1::from_vec(target.clone());
    let mut params = Hyperparams::from_user(None);
    ClassificationAlgo::DecisionTree.defaults(&mut params);
    let mut model = ClassificationAlgo::DecisionTree.build(&params, 1);
    model.fit(&x, &y).unwrap();
    let pred = model.predict(&x).unwrap();
    let train_accuracy =
        pred.iter().zip(y.iter()).filter(|(p, t)| p == t).count() as f64 / 40.0;

    assert!(
        train_accuracy >= cv_accuracy,
        "full-data refit accuracy {train_accuracy} should not be below cv accuracy {cv_accuracy}"
    );
}

#[test]
fn test_clustering_batch_reports_and_guards() {
    let mut a = Vec::new();
    let mut b = Vec::new();
    for i in 0..20 {
        let group = (i % 2) as f64;
        a.push(group * 10.0 + i as f64 * 0.01);
        b.push(group * 10.0 - i as f64 * 0.01);
    }
    let df = df!("a" => a, "b" => b).unwrap();

    let mut j = job(TaskType::Clustering, &["KMeans", "AgglomerativeClustering"]);
    j.target = None;
    let mut params = Map::new();
    let mut km = Map::new();
    km.insert("n_clusters".to_string(), Value::from(2));
    params.insert("KMeans".to_string(), Value::Object(km));
    j.params = params;

    let outcome = run_batch(&df, &j, &store("cluster")).unwrap();
    assert_eq!(outcome.results.len(), 2);
    for entry in &outcome.results {
        assert!(entry.error.is_none());
        assert_eq!(
            entry.metrics.get("n_clusters").and_then(Value::as_u64),
            Some(2)
        );
        assert!(entry.metrics.get("silhouette").and_then(Value::as_f64).is_some());
        assert!(entry.metrics.get("info").and_then(Value::as_str).is_some());
        assert!(!entry.plots.is_empty());
    }
    // Clustering never produces comparison artifacts
    assert!(outcome.comparison_plot.is_none());
    assert!(outcome.metrics_table.is_none());
}

#[test]
fn test_dbscan_degenerate_labeling_withholds_metrics() {
    // Points far apart relative to eps: everything is noise
    let a: Vec<f64> = (0..10).map(|i| i as f64 * 100.0).collect();
    let df = df!("a" => a).unwrap();
    let mut j = job(TaskType::Clustering, &["DBSCAN"]);
    j.target = None;
    let outcome = run_batch(&df, &j, &store("dbscan")).unwrap();
    let entry = &outcome.results[0];
    assert!(entry.error.is_none());
    assert_eq!(entry.metrics.get("n_clusters").and_then(Value::as_u64), Some(0));
    assert!(entry.metrics.get("silhouette").unwrap().is_null());
    assert!(entry.metrics.get("calinski_harabasz").unwrap().is_null());
    assert!(entry.metrics.get("davies_bouldin").unwrap().is_null());
    assert!(entry.metrics.get("reason").and_then(Value::as_str).is_some());
}

#[test]
fn test_successful_fit_persists_loadable_model() {
    let df = classification_df();
    let s = store("persist");
    let j = job(TaskType::Classification, &["RandomForest"]);
    let outcome = run_batch(&df, &j, &s).unwrap();
    assert!(outcome.results[0].error.is_none());

    let loaded = s.load("RandomForest", TaskType::Classification).unwrap();
    match loaded {
        PersistedModel::Classifier(model) => {
            use ndarray::array;
            let pred = model.predict(&array![[0.0, 0.0], [7.0, 5.0]]).unwrap();
            assert_eq!(pred.len(), 2);
        }
        _ => panic!("expected a classifier artifact"),
    }
    let _ = std::fs::remove_dir_all(s.dir());
}

#[test]
fn test_duplicate_algorithms_get_separate_entries() {
    let df = classification_df();
    let j = job(TaskType::Classification, &["NaiveBayes", "NaiveBayes"]);
    let outcome = run_batch(&df, &j, &store("dup")).unwrap();
    assert_eq!(outcome.results.len(), 2);
    assert_eq!(outcome.results[0].algorithm, outcome.results[1].algorithm);
}
