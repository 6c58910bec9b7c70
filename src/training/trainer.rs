//! Batch training orchestration.
//!
//! One `TrainingJob` runs an ordered list of algorithms over a single
//! dataset. Failures stay scoped to the algorithm that raised them: the
//! entry records the error with null metric values and the batch moves on.
//! Unknown algorithm names are logged and skipped without an entry.

use ndarray::{Array1, Array2};
use polars::prelude::DataFrame;
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::data;
use crate::error::{Result, StudioError};
use crate::plot;
use crate::store::{ModelStore, PersistedModel};
use crate::training::comparison;
use crate::training::evaluation::{
    holdout_split, k_fold_splits, stratified_holdout_split, stratified_k_fold_splits, take_rows,
    EvalPlan, SPLIT_SEED,
};
use crate::training::metrics::{
    classification_scores, clustering_report, confusion_matrix, observed_classes,
    regression_scores, roc_curve, ClassificationScores,
};
use crate::training::registry::{
    ClassificationAlgo, ClusteringAlgo, Hyperparams, RegressionAlgo, TaskType,
};

#[derive(Debug, Clone)]
pub struct TrainingJob {
    pub task: TaskType,
    pub algorithms: Vec<String>,
    /// Per-algorithm hyperparameter objects keyed by algorithm name.
    pub params: Map<String, Value>,
    pub target: Option<String>,
    pub test_size: f64,
    pub cv_enabled: bool,
    pub cv_folds: usize,
}

#[derive(Debug, Clone)]
pub struct AlgorithmEntry {
    pub algorithm: String,
    /// Metric name -> number, null (failed/withheld) or string (info/reason).
    pub metrics: Map<String, Value>,
    pub importance_plot: Option<String>,
    pub plots: Vec<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub results: Vec<AlgorithmEntry>,
    pub comparison_plot: Option<String>,
    pub metrics_table: Option<String>,
}

fn null_metrics(keys: &[&str]) -> Map<String, Value> {
    keys.iter()
        .map(|k| (k.to_string(), Value::Null))
        .collect()
}

const CLASSIFICATION_KEYS: [&str; 4] = ["accuracy", "precision", "recall", "f1"];
const REGRESSION_KEYS: [&str; 3] = ["r2", "mse", "rmse"];
const CLUSTERING_KEYS: [&str; 4] = ["n_clusters", "silhouette", "calinski_harabasz", "davies_bouldin"];

fn failure_entry(algorithm: &str, task: TaskType, err: &StudioError) -> AlgorithmEntry {
    warn!(algorithm, error = %err, "algorithm failed, continuing batch");
    let keys: &[&str] = match task {
        TaskType::Classification => &CLASSIFICATION_KEYS,
        TaskType::Regression => &REGRESSION_KEYS,
        TaskType::Clustering => &CLUSTERING_KEYS,
    };
    AlgorithmEntry {
        algorithm: algorithm.to_string(),
        metrics: null_metrics(keys),
        importance_plot: None,
        plots: Vec::new(),
        error: Some(err.to_string()),
    }
}

fn number(v: f64) -> Value {
    serde_json::Number::from_f64(v).map(Value::Number).unwrap_or(Value::Null)
}

fn opt_number(v: Option<f64>) -> Value {
    v.map(number).unwrap_or(Value::Null)
}

/// Render the importance bar when the model exposes importances; log and
/// drop any rendering failure.
fn try_importance_plot(
    importances: Option<Result<Array1<f64>>>,
    feature_names: &[String],
    algorithm: &str,
) -> Option<String> {
    let values = match importances {
        Some(Ok(values)) => values,
        Some(Err(err)) => {
            warn!(algorithm, error = %err, "feature importances unavailable");
            return None;
        }
        None => return None,
    };
    match plot::importance_bar(feature_names, &values) {
        Ok(b64) => Some(b64),
        Err(err) => {
            warn!(algorithm, error = %err, "importance plot failed");
            None
        }
    }
}

fn persist(store: &ModelStore, algorithm: &str, task: TaskType, model: PersistedModel) {
    match store.save(algorithm, task, &model) {
        Ok(path) => info!(algorithm, path = %path.display(), "model saved"),
        Err(err) => warn!(algorithm, error = %err, "model save failed"),
    }
}

fn scores_to_map(s: &ClassificationScores) -> Map<String, Value> {
    let mut m = Map::new();
    m.insert("accuracy".to_string(), number(s.accuracy));
    m.insert("precision".to_string(), number(s.precision));
    m.insert("recall".to_string(), number(s.recall));
    m.insert("f1".to_string(), number(s.f1));
    m
}

/// Classification diagnostics from one prediction set: confusion heatmap
/// always, ROC only for binary problems with probability estimates.
fn classification_plots(
    model: &crate::training::registry::ClassifierModel,
    x_eval: &Array2<f64>,
    y_true: &Array1<f64>,
    y_pred: &Array1<f64>,
    algorithm: &str,
) -> Vec<String> {
    let mut plots = Vec::new();
    let classes = observed_classes(y_true, y_pred);
    let cm = confusion_matrix(y_true, y_pred, &classes);
    match plot::confusion_heatmap(&cm, &classes) {
        Ok(b64) => plots.push(b64),
        Err(err) => warn!(algorithm, error = %err, "confusion heatmap failed"),
    }

    if classes.len() == 2 {
        if let Some(proba) = model.class_probabilities(x_eval) {
            match proba {
                Ok(proba) => {
                    let positive = classes[1];
                    // Probability columns follow the model's class order, which
                    // can be wider than the classes observed in this split.
                    let col = model
                        .classes()
                        .iter()
                        .position(|&c| c == positive)
                        .unwrap_or(proba.ncols() - 1);
                    let scores = proba.column(col).to_owned();
                    match roc_curve(y_true, &scores, positive) {
                        Ok((points, auc)) => match plot::roc_plot(&points, auc) {
                            Ok(b64) => plots.push(b64),
                            Err(err) => warn!(algorithm, error = %err, "roc plot failed"),
                        },
                        Err(err) => warn!(algorithm, error = %err, "roc computation failed"),
                    }
                }
                Err(err) => warn!(algorithm, error = %err, "probability estimates failed"),
            }
        }
    }
    plots
}

fn run_classification_with_params(
    algo: ClassificationAlgo,
    name: &str,
    params: &Hyperparams,
    x: &Array2<f64>,
    y: &Array1<f64>,
    feature_names: &[String],
    plan: EvalPlan,
    store: &ModelStore,
) -> Result<AlgorithmEntry> {
    let n_features = x.ncols();
    match plan {
        EvalPlan::Holdout { test_fraction } => {
            let split = stratified_holdout_split(y, test_fraction, SPLIT_SEED)?;
            let (x_train, y_train) = take_rows(x, y, &split.train);
            let (x_test, y_test) = take_rows(x, y, &split.test);

            let mut model = algo.build(params, n_features);
            model.fit(&x_train, &y_train)?;
            let y_pred = model.predict(&x_test)?;
            let scores = classification_scores(&y_test, &y_pred)?;

            let plots = classification_plots(&model, &x_test, &y_test, &y_pred, name);
            let importance_plot =
                try_importance_plot(model.feature_importances(), feature_names, name);
            persist(
                store,
                name,
                TaskType::Classification,
                PersistedModel::Classifier(model),
            );

            Ok(AlgorithmEntry {
                algorithm: name.to_string(),
                metrics: scores_to_map(&scores),
                importance_plot,
                plots,
                error: None,
            })
        }
        EvalPlan::CrossValidation { folds } => {
            let splits = stratified_k_fold_splits(y, folds, SPLIT_SEED)?;
            let mut sums = ClassificationScores {
                accuracy: 0.0,
                precision: 0.0,
                recall: 0.0,
                f1: 0.0,
            };
            for split in &splits {
                let (x_train, y_train) = take_rows(x, y, &split.train);
                let (x_test, y_test) = take_rows(x, y, &split.test);
                let mut model = algo.build(params, n_features);
                model.fit(&x_train, &y_train)?;
                let y_pred = model.predict(&x_test)?;
                let s = classification_scores(&y_test, &y_pred)?;
                sums.accuracy += s.accuracy;
                sums.precision += s.precision;
                sums.recall += s.recall;
                sums.f1 += s.f1;
            }
            let k = splits.len() as f64;
            let averaged = ClassificationScores {
                accuracy: crate::training::metrics::round4(sums.accuracy / k),
                precision: crate::training::metrics::round4(sums.precision / k),
                recall: crate::training::metrics::round4(sums.recall / k),
                f1: crate::training::metrics::round4(sums.f1 / k),
            };

            // Refit on the full matrix for persistence and diagnostics. The
            // diagnostic plots therefore show training-set predictions and
            // read optimistic relative to the cross-validated metrics.
            let mut model = algo.build(params, n_features);
            model.fit(x, y)?;
            let y_pred_full = model.predict(x)?;
            let plots = classification_plots(&model, x, y, &y_pred_full, name);
            let importance_plot =
                try_importance_plot(model.feature_importances(), feature_names, name);
            persist(
                store,
                name,
                TaskType::Classification,
                PersistedModel::Classifier(model),
            );

            Ok(AlgorithmEntry {
                algorithm: name.to_string(),
                metrics: scores_to_map(&averaged),
                importance_plot,
                plots,
                error: None,
            })
        }
    }
}

fn run_regression_with_params(
    algo: RegressionAlgo,
    name: &str,
    params: &Hyperparams,
    x: &Array2<f64>,
    y: &Array1<f64>,
    feature_names: &[String],
    plan: EvalPlan,
    store: &ModelStore,
) -> Result<AlgorithmEntry> {
    let n_features = x.ncols();
    match plan {
        EvalPlan::Holdout { test_fraction } => {
            let split = holdout_split(x.nrows(), test_fraction, SPLIT_SEED)?;
            let (x_train, y_train) = take_rows(x, y, &split.train);
            let (x_test, y_test) = take_rows(x, y, &split.test);

            let mut model = algo.build(params, n_features);
            model.fit(&x_train, &y_train)?;
            let y_pred = model.predict(&x_test)?;
            let scores = regression_scores(&y_test, &y_pred)?;

            let mut plots = Vec::new();
            match plot::actual_vs_predicted(&y_test, &y_pred) {
                Ok(b64) => plots.push(b64),
                Err(err) => warn!(algorithm = name, error = %err, "scatter plot failed"),
            }
            let importance_plot =
                try_importance_plot(model.feature_importances(), feature_names, name);
            persist(
                store,
                name,
                TaskType::Regression,
                PersistedModel::Regressor(model),
            );

            let mut metrics = Map::new();
            metrics.insert("r2".to_string(), number(scores.r2));
            metrics.insert("mse".to_string(), number(scores.mse));
            metrics.insert("rmse".to_string(), number(scores.rmse));
            Ok(AlgorithmEntry {
                algorithm: name.to_string(),
                metrics,
                importance_plot,
                plots,
                error: None,
            })
        }
        EvalPlan::CrossValidation { folds } => {
            // Out-of-fold predictions assembled back into original row order
            let splits = k_fold_splits(x.nrows(), folds, SPLIT_SEED)?;
            let mut y_oof = Array1::zeros(y.len());
            for split in &splits {
                let (x_train, y_train) = take_rows(x, y, &split.train);
                let mut model = algo.build(params, n_features);
                model.fit(&x_train, &y_train)?;
                let (x_test, _) = take_rows(x, y, &split.test);
                let fold_pred = model.predict(&x_test)?;
                for (slot, &row) in split.test.iter().enumerate() {
                    y_oof[row] = fold_pred[slot];
                }
            }
            let scores = regression_scores(y, &y_oof)?;

            let mut plots = Vec::new();
            match plot::actual_vs_predicted(y, &y_oof) {
                Ok(b64) => plots.push(b64),
                Err(err) => warn!(algorithm = name, error = %err, "scatter plot failed"),
            }

            // Full-data refit feeds persistence and importances only
            let mut importance_plot = None;
            let mut full_model = algo.build(params, n_features);
            match full_model.fit(x, y) {
                Ok(()) => {
                    importance_plot =
                        try_importance_plot(full_model.feature_importances(), feature_names, name);
                    persist(
                        store,
                        name,
                        TaskType::Regression,
                        PersistedModel::Regressor(full_model),
                    );
                }
                Err(err) => warn!(algorithm = name, error = %err, "full-data refit failed"),
            }

            let mut metrics = Map::new();
            metrics.insert("r2".to_string(), number(scores.r2));
            metrics.insert("mse".to_string(), number(scores.mse));
            metrics.insert("rmse".to_string(), number(scores.rmse));
            Ok(AlgorithmEntry {
                algorithm: name.to_string(),
                metrics,
                importance_plot,
                plots,
                error: None,
            })
        }
    }
}

fn run_clustering_with_params(
    algo: ClusteringAlgo,
    name: &str,
    params: &Hyperparams,
    x: &Array2<f64>,
    store: &ModelStore,
) -> Result<AlgorithmEntry> {
    let mut model = algo.build(params);
    let labels = model.fit_predict(x)?;
    let report = clustering_report(x, &labels);

    let mut metrics = Map::new();
    metrics.insert("n_clusters".to_string(), Value::from(report.n_clusters));
    metrics.insert("silhouette".to_string(), opt_number(report.silhouette));
    metrics.insert(
        "calinski_harabasz".to_string(),
        opt_number(report.calinski_harabasz),
    );
    metrics.insert(
        "davies_bouldin".to_string(),
        opt_number(report.davies_bouldin),
    );
    metrics.insert("info".to_string(), Value::from(report.info.clone()));
    if !report.reasons.is_empty() {
        metrics.insert("reason".to_string(), Value::from(report.reasons.join("; ")));
    }

    let mut plots = Vec::new();
    match plot::cluster_counts(&report.cluster_sizes) {
        Ok(b64) => plots.push(b64),
        Err(err) => warn!(algorithm = name, error = %err, "cluster count plot failed"),
    }

    persist(
        store,
        name,
        TaskType::Clustering,
        PersistedModel::Clusterer(model),
    );

    Ok(AlgorithmEntry {
        algorithm: name.to_string(),
        metrics,
        importance_plot: None,
        plots,
        error: None,
    })
}

fn user_params<'a>(job: &'a TrainingJob, name: &str) -> Option<&'a Map<String, Value>> {
    job.params.get(name).and_then(Value::as_object)
}

/// Run the whole batch over an already-loaded frame.
///
/// Request-level validation errors (bad target, no numeric columns, bad task
/// setup) propagate; per-algorithm errors become failure entries.
pub fn run_batch(df: &DataFrame, job: &TrainingJob, store: &ModelStore) -> Result<BatchOutcome> {
    info!(
        task = job.task.as_str(),
        algorithms = job.algorithms.len(),
        cv_enabled = job.cv_enabled,
        "starting training batch"
    );

    let mut results: Vec<AlgorithmEntry> = Vec::new();

    match job.task {
        TaskType::Classification | TaskType::Regression => {
            let target = job.target.as_deref().ok_or_else(|| {
                StudioError::ValidationError(
                    "target column is required for supervised tasks".to_string(),
                )
            })?;
            let (x, y, feature_names) = data::supervised_views(df, target)?;
            let plan = EvalPlan::from_request(job.cv_enabled, job.cv_folds, job.test_size);

            for name in &job.algorithms {
                if job.task == TaskType::Classification {
                    let Some(algo) = ClassificationAlgo::from_name(name) else {
                        warn!(algorithm = %name, "unknown classification algorithm, skipping");
                        continue;
                    };
                    let mut params = Hyperparams::from_user(user_params(job, name));
                    algo.defaults(&mut params);
                    let entry = run_classification_with_params(
                        algo,
                        name,
                        &params,
                        &x,
                        &y,
                        &feature_names,
                        plan,
                        store,
                    )
                    .unwrap_or_else(|err| failure_entry(name, job.task, &err));
                    results.push(entry);
                } else {
                    let Some(algo) = RegressionAlgo::from_name(name) else {
                        warn!(algorithm = %name, "unknown regression algorithm, skipping");
                        continue;
                    };
                    let mut params = Hyperparams::from_user(user_params(job, name));
                    algo.defaults(&mut params);
                    let entry = run_regression_with_params(
                        algo,
                        name,
                        &params,
                        &x,
                        &y,
                        &feature_names,
                        plan,
                        store,
                    )
                    .unwrap_or_else(|err| failure_entry(name, job.task, &err));
                    results.push(entry);
                }
            }
        }
        TaskType::Clustering => {
            let (x, _numeric_names) = data::numeric_matrix(df)?;
            for name in &job.algorithms {
                let Some(algo) = ClusteringAlgo::from_name(name) else {
                    warn!(algorithm = %name, "unknown clustering algorithm, skipping");
                    continue;
                };
                let mut params = Hyperparams::from_user(user_params(job, name));
                algo.defaults(&mut params);
                let entry = run_clustering_with_params(algo, name, &params, &x, store)
                    .unwrap_or_else(|err| failure_entry(name, job.task, &err));
                results.push(entry);
            }
        }
    }

    let (comparison_plot, metrics_table) = comparison::build(job.task, &results);

    info!(entries = results.len(), "training batch finished");
    Ok(BatchOutcome {
        results,
        comparison_plot,
        metrics_table,
    })
}
