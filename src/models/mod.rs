//! Model implementations grouped by family.

pub mod bayes;
pub mod boosting;
pub mod cluster;
pub mod forest;
pub mod knn;
pub mod linear;
pub mod svm;
pub mod tree;
