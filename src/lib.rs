//! ML Studio backend: no-code model training and evaluation over tabular
//! datasets.
//!
//! The crate centers on the training orchestrator: given an uploaded CSV, a
//! task type and a list of algorithms, it fits models, validates them with a
//! holdout split or cross-validation, computes task metrics, renders
//! diagnostic plots and persists the fitted models, isolating failures per
//! algorithm.
//!
//! # Modules
//! - [`data`] - dataset loading and feature/target matrix extraction
//! - [`models`] - the algorithm implementations, grouped by family
//! - [`training`] - registry, evaluation plans, metrics and the batch trainer
//! - [`plot`] - base64 PNG chart rendering
//! - [`store`] - fitted model persistence
//! - [`server`] - HTTP API

pub mod data;
pub mod error;
pub mod models;
pub mod plot;
pub mod server;
pub mod store;
pub mod training;

pub use error::{Result, StudioError};
