//! Model persistence keyed by (algorithm, task type).
//!
//! Each successful fit overwrites the previous artifact for the same key.
//! Saving is best-effort at the call site; this module just reports the
//! outcome explicitly.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, StudioError};
use crate::training::registry::{ClassifierModel, ClustererModel, RegressorModel, TaskType};

/// Serialized form of any fitted model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PersistedModel {
    Classifier(ClassifierModel),
    Regressor(RegressorModel),
    Clusterer(ClustererModel),
}

#[derive(Debug, Clone)]
pub struct ModelStore {
    dir: PathBuf,
}

impl ModelStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_name(algorithm: &str, task: TaskType) -> String {
        format!("{}_{}.bin", algorithm, task.as_str())
    }

    pub fn path_for(&self, algorithm: &str, task: TaskType) -> PathBuf {
        self.dir.join(Self::file_name(algorithm, task))
    }

    pub fn save(&self, algorithm: &str, task: TaskType, model: &PersistedModel) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let bytes = bincode::serialize(model)
            .map_err(|e| StudioError::SerializationError(e.to_string()))?;
        let path = self.path_for(algorithm, task);
        fs::write(&path, bytes)?;
        Ok(path)
    }

    pub fn load(&self, algorithm: &str, task: TaskType) -> Result<PersistedModel> {
        let path = self.path_for(algorithm, task);
        let bytes = fs::read(&path)?;
        bincode::deserialize(&bytes).map_err(|e| StudioError::SerializationError(e.to_string()))
    }

    /// Raw bytes for the download endpoint. None when no artifact exists.
    pub fn raw_bytes(&self, algorithm: &str, task: TaskType) -> Option<Vec<u8>> {
        fs::read(self.path_for(algorithm, task)).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::registry::{ClassificationAlgo, Hyperparams};
    use ndarray::array;

    #[test]
    fn test_save_load_round_trip() {
        let tmp = std::env::temp_dir().join("mlstudio_store_test_rt");
        let store = ModelStore::new(&tmp);

        let params = Hyperparams::from_user(None);
        let mut model = ClassificationAlgo::NaiveBayes.build(&params, 1);
        let x = array![[0.0], [0.1], [5.0], [5.1]];
        let y = array![0.0, 0.0, 1.0, 1.0];
        model.fit(&x, &y).unwrap();
        let expected = model.predict(&x).unwrap();

        store
            .save(
                "NaiveBayes",
                TaskType::Classification,
                &PersistedModel::Classifier(model),
            )
            .unwrap();
        let loaded = store.load("NaiveBayes", TaskType::Classification).unwrap();
        match loaded {
            PersistedModel::Classifier(m) => {
                assert_eq!(m.predict(&x).unwrap(), expected);
            }
            _ => panic!("wrong variant"),
        }
        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn test_missing_artifact() {
        let store = ModelStore::new(std::env::temp_dir().join("mlstudio_store_test_missing"));
        assert!(store.load("RandomForest", TaskType::Regression).is_err());
        assert!(store.raw_bytes("RandomForest", TaskType::Regression).is_none());
    }

    #[test]
    fn test_file_name_layout() {
        let store = ModelStore::new("/tmp/models");
        let path = store.path_for("KMeans", TaskType::Clustering);
        assert!(path.ends_with("KMeans_clustering.bin"));
    }
}
