//! Experiment tracking
//!
//! Training runs record their parameters, metrics and model artifact through
//! the append-only [`TrackingSink`] trait. [`ExperimentTracker`] is the
//! file-backed implementation used by the shell.

mod storage;
mod tracker;

pub use storage::LocalStorage;
pub use tracker::{ExperimentTracker, Run, RunStatus};

use crate::error::Result;
use std::collections::BTreeMap;
use std::path::Path;

/// Destination for run records
pub trait TrackingSink {
    /// Open a run and return its id.
    fn start_run(&mut self, run_name: &str) -> Result<String>;

    fn log_params(&mut self, params: &BTreeMap<String, String>) -> Result<()>;

    fn log_metrics(&mut self, metrics: &BTreeMap<String, f64>) -> Result<()>;

    /// Record a model artifact that already exists on disk.
    fn log_model(&mut self, artifact: &Path) -> Result<()>;

    /// Close the active run and return its final record.
    fn end_run(&mut self, status: RunStatus) -> Result<Run>;
}
