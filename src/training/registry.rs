//! Algorithm registry: the closed set of trainable algorithms per task,
//! their default hyperparameters, and model construction.
//!
//! Algorithm names match the public API strings exactly. Unknown names parse
//! to `None` and the caller decides how to skip them. User-supplied
//! hyperparameters always win over defaults.

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;
use crate::models::bayes::GaussianNaiveBayes;
use crate::models::boosting::{GradientBoostingClassifier, GradientBoostingRegressor};
use crate::models::cluster::{Agglomerative, Dbscan, KMeans};
use crate::models::forest::{RandomForestClassifier, RandomForestRegressor};
use crate::models::knn::{KnnClassifier, KnnRegressor};
use crate::models::linear::{
    LassoRegression, LinearRegression, LogisticRegression, RidgeRegression,
};
use crate::models::svm::{default_gamma, Kernel, SvmClassifier, SvmRegressor};
use crate::models::tree::{DecisionTreeClassifier, DecisionTreeRegressor};

/// Task type as named by the request body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Classification,
    Regression,
    Clustering,
}

impl TaskType {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "classification" => Some(TaskType::Classification),
            "regression" => Some(TaskType::Regression),
            "clustering" => Some(TaskType::Clustering),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Classification => "classification",
            TaskType::Regression => "regression",
            TaskType::Clustering => "clustering",
        }
    }
}

/// Hyperparameter bag: user values overlaid on algorithm defaults.
#[derive(Debug, Clone, Default)]
pub struct Hyperparams(Map<String, Value>);

impl Hyperparams {
    pub fn from_user(user: Option<&Map<String, Value>>) -> Self {
        Self(user.cloned().unwrap_or_default())
    }

    /// Fill a default without overriding a user-supplied value.
    pub fn default_entry(&mut self, key: &str, value: Value) {
        self.0.entry(key.to_string()).or_insert(value);
    }

    pub fn get_f64(&self, key: &str, fallback: f64) -> f64 {
        self.0.get(key).and_then(Value::as_f64).unwrap_or(fallback)
    }

    pub fn get_usize(&self, key: &str, fallback: usize) -> usize {
        self.0
            .get(key)
            .and_then(Value::as_u64)
            .map(|v| v as usize)
            .unwrap_or(fallback)
    }

    pub fn get_u64(&self, key: &str, fallback: u64) -> u64 {
        self.0.get(key).and_then(Value::as_u64).unwrap_or(fallback)
    }

    pub fn get_str<'a>(&'a self, key: &str, fallback: &'a str) -> &'a str {
        self.0.get(key).and_then(Value::as_str).unwrap_or(fallback)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassificationAlgo {
    RandomForest,
    LogisticRegression,
    DecisionTree,
    Knn,
    Svm,
    NaiveBayes,
    GradientBoosting,
}

impl ClassificationAlgo {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "RandomForest" => Some(Self::RandomForest),
            "LogisticRegression" => Some(Self::LogisticRegression),
            "DecisionTree" => Some(Self::DecisionTree),
            "KNN" => Some(Self::Knn),
            "SVM" => Some(Self::Svm),
            "NaiveBayes" => Some(Self::NaiveBayes),
            "GradientBoosting" => Some(Self::GradientBoosting),
            _ => None,
        }
    }

    pub fn defaults(&self, params: &mut Hyperparams) {
        match self {
            Self::RandomForest | Self::GradientBoosting => {
                params.default_entry("n_estimators", Value::from(100));
                params.default_entry("random_state", Value::from(42));
            }
            Self::LogisticRegression => {
                params.default_entry("max_iter", Value::from(1000));
                params.default_entry("solver", Value::from("lbfgs"));
            }
            Self::DecisionTree => {
                params.default_entry("max_depth", Value::from(5));
            }
            Self::Knn => {
                params.default_entry("n_neighbors", Value::from(5));
            }
            Self::Svm => {
                params.default_entry("kernel", Value::from("rbf"));
                params.default_entry("C", Value::from(1));
            }
            Self::NaiveBayes => {}
        }
    }

    pub fn build(&self, params: &Hyperparams, n_features: usize) -> ClassifierModel {
        match self {
            Self::RandomForest => {
                let mut model = RandomForestClassifier::new(
                    params.get_usize("n_estimators", 100),
                    params.get_u64("random_state", 42),
                );
                if let Some(depth) = params.0.get("max_depth").and_then(Value::as_u64) {
                    model.max_depth = depth as usize;
                }
                ClassifierModel::RandomForest(model)
            }
            Self::LogisticRegression => ClassifierModel::LogisticRegression(
                LogisticRegression::new().with_max_iter(params.get_usize("max_iter", 1000)),
            ),
            Self::DecisionTree => ClassifierModel::DecisionTree(DecisionTreeClassifier::new(
                params.get_usize("max_depth", 5),
            )),
            Self::Knn => {
                ClassifierModel::Knn(KnnClassifier::new(params.get_usize("n_neighbors", 5)))
            }
            Self::Svm => {
                let kernel =
                    Kernel::parse(params.get_str("kernel", "rbf"), default_gamma(n_features));
                ClassifierModel::Svm(SvmClassifier::new(kernel, params.get_f64("C", 1.0)))
            }
            Self::NaiveBayes => ClassifierModel::NaiveBayes(GaussianNaiveBayes::new()),
            Self::GradientBoosting => {
                ClassifierModel::GradientBoosting(GradientBoostingClassifier::new(
                    params.get_usize("n_estimators", 100),
                    params.get_u64("random_state", 42),
                ))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegressionAlgo {
    LinearRegression,
    RandomForest,
    DecisionTree,
    Knn,
    Svr,
    Ridge,
    Lasso,
    GradientBoosting,
}

impl RegressionAlgo {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "LinearRegression" => Some(Self::LinearRegression),
            "RandomForest" => Some(Self::RandomForest),
            "DecisionTree" => Some(Self::DecisionTree),
            "KNN" => Some(Self::Knn),
            "SVR" => Some(Self::Svr),
            "Ridge" => Some(Self::Ridge),
            "Lasso" => Some(Self::Lasso),
            "GradientBoosting" => Some(Self::GradientBoosting),
            _ => None,
        }
    }

    pub fn defaults(&self, params: &mut Hyperparams) {
        match self {
            Self::RandomForest | Self::GradientBoosting => {
                params.default_entry("n_estimators", Value::from(100));
                params.default_entry("random_state", Value::from(42));
            }
            Self::DecisionTree => {
                params.default_entry("max_depth", Value::from(5));
            }
            Self::Knn => {
                params.default_entry("n_neighbors", Value::from(5));
            }
            Self::Svr => {
                params.default_entry("kernel", Value::from("rbf"));
                params.default_entry("C", Value::from(1));
            }
            Self::Ridge | Self::Lasso => {
                params.default_entry("alpha", Value::from(1));
            }
            Self::LinearRegression => {}
        }
    }

    pub fn build(&self, params: &Hyperparams, n_features: usize) -> RegressorModel {
        match self {
            Self::LinearRegression => RegressorModel::Linear(LinearRegression::new()),
            Self::RandomForest => {
                let mut model = RandomForestRegressor::new(
                    params.get_usize("n_estimators", 100),
                    params.get_u64("random_state", 42),
                );
                if let Some(depth) = params.0.get("max_depth").and_then(Value::as_u64) {
                    model.max_depth = depth as usize;
                }
                RegressorModel::RandomForest(model)
            }
            Self::DecisionTree => RegressorModel::DecisionTree(DecisionTreeRegressor::new(
                params.get_usize("max_depth", 5),
            )),
            Self::Knn => RegressorModel::Knn(KnnRegressor::new(params.get_usize("n_neighbors", 5))),
            Self::Svr => {
                let kernel =
                    Kernel::parse(params.get_str("kernel", "rbf"), default_gamma(n_features));
                RegressorModel::Svr(SvmRegressor::new(kernel, params.get_f64("C", 1.0)))
            }
            Self::Ridge => RegressorModel::Ridge(RidgeRegression::new(params.get_f64("alpha", 1.0))),
            Self::Lasso => RegressorModel::Lasso(LassoRegression::new(params.get_f64("alpha", 1.0))),
            Self::GradientBoosting => RegressorModel::GradientBoosting(
                GradientBoostingRegressor::new(
                    params.get_usize("n_estimators", 100),
                    params.get_u64("random_state", 42),
                ),
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusteringAlgo {
    KMeans,
    Dbscan,
    Agglomerative,
}

impl ClusteringAlgo {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "KMeans" => Some(Self::KMeans),
            "DBSCAN" => Some(Self::Dbscan),
            "AgglomerativeClustering" => Some(Self::Agglomerative),
            _ => None,
        }
    }

    pub fn defaults(&self, params: &mut Hyperparams) {
        match self {
            Self::KMeans => {
                params.default_entry("n_clusters", Value::from(4));
                params.default_entry("random_state", Value::from(42));
            }
            Self::Dbscan => {
                params.default_entry("eps", Value::from(0.5));
            }
            Self::Agglomerative => {
                params.default_entry("n_clusters", Value::from(2));
            }
        }
    }

    pub fn build(&self, params: &Hyperparams) -> ClustererModel {
        match self {
            Self::KMeans => ClustererModel::KMeans(KMeans::new(
                params.get_usize("n_clusters", 4),
                params.get_u64("random_state", 42),
            )),
            Self::Dbscan => {
                let mut model = Dbscan::new(params.get_f64("eps", 0.5));
                model.min_samples = params.get_usize("min_samples", 5);
                ClustererModel::Dbscan(model)
            }
            Self::Agglomerative => {
                ClustererModel::Agglomerative(Agglomerative::new(params.get_usize("n_clusters", 2)))
            }
        }
    }
}

/// Fitted or fittable classifier, dispatched by match.
///
/// Capability probes (`class_probabilities`, `feature_importances`) return
/// `None` for variants that do not support them; callers branch on that
/// instead of downcasting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ClassifierModel {
    RandomForest(RandomForestClassifier),
    LogisticRegression(LogisticRegression),
    DecisionTree(DecisionTreeClassifier),
    Knn(KnnClassifier),
    Svm(SvmClassifier),
    NaiveBayes(GaussianNaiveBayes),
    GradientBoosting(GradientBoostingClassifier),
}

impl ClassifierModel {
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        match self {
            Self::RandomForest(m) => m.fit(x, y),
            Self::LogisticRegression(m) => m.fit(x, y),
            Self::DecisionTree(m) => m.fit(x, y),
            Self::Knn(m) => m.fit(x, y),
            Self::Svm(m) => m.fit(x, y),
            Self::NaiveBayes(m) => m.fit(x, y),
            Self::GradientBoosting(m) => m.fit(x, y),
        }
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        match self {
            Self::RandomForest(m) => m.predict(x),
            Self::LogisticRegression(m) => m.predict(x),
            Self::DecisionTree(m) => m.predict(x),
            Self::Knn(m) => m.predict(x),
            Self::Svm(m) => m.predict(x),
            Self::NaiveBayes(m) => m.predict(x),
            Self::GradientBoosting(m) => m.predict(x),
        }
    }

    pub fn classes(&self) -> &[i64] {
        match self {
            Self::RandomForest(m) => m.classes(),
            Self::LogisticRegression(m) => m.classes(),
            Self::DecisionTree(m) => m.classes(),
            Self::Knn(m) => m.classes(),
            Self::Svm(m) => m.classes(),
            Self::NaiveBayes(m) => m.classes(),
            Self::GradientBoosting(m) => m.classes(),
        }
    }

    /// Per-class probabilities for models that estimate them. SVM does not.
    pub fn class_probabilities(&self, x: &Array2<f64>) -> Option<Result<Array2<f64>>> {
        match self {
            Self::RandomForest(m) => Some(m.predict_proba(x)),
            Self::LogisticRegression(m) => Some(m.predict_proba(x)),
            Self::DecisionTree(m) => Some(m.predict_proba(x)),
            Self::Knn(m) => Some(m.predict_proba(x)),
            Self::NaiveBayes(m) => Some(m.predict_proba(x)),
            Self::GradientBoosting(m) => Some(m.predict_proba(x)),
            Self::Svm(_) => None,
        }
    }

    /// Importances for the tree family only.
    pub fn feature_importances(&self) -> Option<Result<Array1<f64>>> {
        match self {
            Self::RandomForest(m) => Some(m.feature_importances()),
            Self::DecisionTree(m) => Some(m.feature_importances()),
            Self::GradientBoosting(m) => Some(m.feature_importances()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RegressorModel {
    Linear(LinearRegression),
    RandomForest(RandomForestRegressor),
    DecisionTree(DecisionTreeRegressor),
    Knn(KnnRegressor),
    Svr(SvmRegressor),
    Ridge(RidgeRegression),
    Lasso(LassoRegression),
    GradientBoosting(GradientBoostingRegressor),
}

impl RegressorModel {
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        match self {
            Self::Linear(m) => m.fit(x, y),
            Self::RandomForest(m) => m.fit(x, y),
            Self::DecisionTree(m) => m.fit(x, y),
            Self::Knn(m) => m.fit(x, y),
            Self::Svr(m) => m.fit(x, y),
            Self::Ridge(m) => m.fit(x, y),
            Self::Lasso(m) => m.fit(x, y),
            Self::GradientBoosting(m) => m.fit(x, y),
        }
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        match self {
            Self::Linear(m) => m.predict(x),
            Self::RandomForest(m) => m.predict(x),
            Self::DecisionTree(m) => m.predict(x),
            Self::Knn(m) => m.predict(x),
            Self::Svr(m) => m.predict(x),
            Self::Ridge(m) => m.predict(x),
            Self::Lasso(m) => m.predict(x),
            Self::GradientBoosting(m) => m.predict(x),
        }
    }

    pub fn feature_importances(&self) -> Option<Result<Array1<f64>>> {
        match self {
            Self::RandomForest(m) => Some(m.feature_importances()),
            Self::DecisionTree(m) => Some(m.feature_importances()),
            Self::GradientBoosting(m) => Some(m.feature_importances()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ClustererModel {
    KMeans(KMeans),
    Dbscan(Dbscan),
    Agglomerative(Agglomerative),
}

impl ClustererModel {
    pub fn fit_predict(&mut self, x: &Array2<f64>) -> Result<Array1<i64>> {
        match self {
            Self::KMeans(m) => m.fit_predict(x),
            Self::Dbscan(m) => m.fit_predict(x),
            Self::Agglomerative(m) => m.fit_predict(x),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_unknown_names_parse_to_none() {
        assert!(ClassificationAlgo::from_name("XGBoost").is_none());
        assert!(RegressionAlgo::from_name("LogisticRegression").is_none());
        assert!(ClusteringAlgo::from_name("Spectral").is_none());
    }

    #[test]
    fn test_user_params_win_over_defaults() {
        let mut user = Map::new();
        user.insert("n_estimators".to_string(), Value::from(7));
        let mut params = Hyperparams::from_user(Some(&user));
        ClassificationAlgo::RandomForest.defaults(&mut params);
        assert_eq!(params.get_usize("n_estimators", 0), 7);
        assert_eq!(params.get_u64("random_state", 0), 42);
    }

    #[test]
    fn test_defaults_fill_gaps() {
        let mut params = Hyperparams::from_user(None);
        ClusteringAlgo::KMeans.defaults(&mut params);
        assert_eq!(params.get_usize("n_clusters", 0), 4);
    }

    #[test]
    fn test_svm_has_no_probabilities() {
        let mut params = Hyperparams::from_user(None);
        ClassificationAlgo::Svm.defaults(&mut params);
        let model = ClassificationAlgo::Svm.build(&params, 2);
        assert!(model.class_probabilities(&array![[0.0, 0.0]]).is_none());
    }

    #[test]
    fn test_only_tree_family_has_importances() {
        let params = Hyperparams::from_user(None);
        let knn = ClassificationAlgo::Knn.build(&params, 2);
        assert!(knn.feature_importances().is_none());
        let tree = ClassificationAlgo::DecisionTree.build(&params, 2);
        // Unfitted, but the capability is present
        assert!(tree.feature_importances().is_some());
    }

    #[test]
    fn test_build_and_fit_round_trip() {
        let params = Hyperparams::from_user(None);
        let mut model = ClassificationAlgo::NaiveBayes.build(&params, 1);
        let x = array![[0.0], [0.1], [5.0], [5.1]];
        let y = array![0.0, 0.0, 1.0, 1.0];
        model.fit(&x, &y).unwrap();
        let pred = model.predict(&x).unwrap();
        assert_eq!(pred[0], 0.0);
        assert_eq!(pred[3], 1.0);
    }
}
