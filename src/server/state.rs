//! Application state shared across handlers

use std::path::PathBuf;

use crate::store::ModelStore;

use super::ServerConfig;

pub struct AppState {
    pub config: ServerConfig,
    pub store: ModelStore,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        let store = ModelStore::new(PathBuf::from(&config.models_dir));
        Self { config, store }
    }

    pub fn uploads_dir(&self) -> PathBuf {
        PathBuf::from(&self.config.data_dir)
    }

    pub fn processed_dir(&self) -> PathBuf {
        PathBuf::from(&self.config.processed_dir)
    }
}
