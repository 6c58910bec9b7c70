//! Error types shared across the crate

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StudioError {
    #[error("Model has not been fitted yet")]
    ModelNotFitted,

    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("Data error: {0}")]
    DataError(String),

    #[error("Shape mismatch: expected {expected}, actual {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Training error: {0}")]
    TrainingError(String),

    #[error("Computation error: {0}")]
    ComputationError(String),

    #[error("Plot error: {0}")]
    PlotError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),
}

pub type Result<T> = std::result::Result<T, StudioError>;
