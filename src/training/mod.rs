//! Model training
//!
//! - [`cross_validation`]: fold splitters and parallel fold evaluation
//! - [`metrics`]: balanced accuracy, weighted F1, one-vs-one ROC AUC
//! - [`trainer`]: a tracked cross-validated run that dumps the refit pipeline
//! - [`hypersearch`]: grid search with nested cross-validation

pub mod cross_validation;
pub mod hypersearch;
pub mod metrics;
pub mod trainer;

pub use cross_validation::{cross_validate, CVResults, CVSplit, CVStrategy, CrossValidator};
pub use hypersearch::{default_grid, hypersearch, parse_grid, ParamGrid, SearchReport, SearchSpace};
pub use metrics::Scores;
pub use trainer::{run_name, train, TrainReport};
