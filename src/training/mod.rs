//! Training and evaluation orchestration.

pub mod comparison;
pub mod evaluation;
pub mod metrics;
pub mod registry;
pub mod trainer;
