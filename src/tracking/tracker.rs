//! Run bookkeeping on top of a storage backend

use super::storage::LocalStorage;
use super::TrackingSink;
use crate::error::{CanopyError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

/// Final state of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Finished,
    Failed,
}

/// One tracked training run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub run_id: String,
    pub run_name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub params: BTreeMap<String, String>,
    pub metrics: BTreeMap<String, f64>,
    pub artifacts: Vec<String>,
}

impl Run {
    fn new(run_name: &str) -> Self {
        Self {
            run_id: Uuid::new_v4().simple().to_string(),
            run_name: run_name.to_string(),
            start_time: Utc::now(),
            end_time: None,
            status: RunStatus::Running,
            params: BTreeMap::new(),
            metrics: BTreeMap::new(),
            artifacts: Vec::new(),
        }
    }
}

/// File-backed tracker for a single named experiment
#[derive(Debug)]
pub struct ExperimentTracker {
    experiment: String,
    storage: LocalStorage,
    active: Option<Run>,
}

impl ExperimentTracker {
    pub fn new(base_dir: impl Into<PathBuf>, experiment: &str) -> Self {
        Self {
            experiment: experiment.to_string(),
            storage: LocalStorage::new(base_dir.into().join(experiment)),
            active: None,
        }
    }

    pub fn experiment(&self) -> &str {
        &self.experiment
    }

    /// All finished runs of this experiment, oldest first.
    pub fn runs(&self) -> Result<Vec<Run>> {
        self.storage.load_runs()
    }

    fn active_mut(&mut self) -> Result<&mut Run> {
        self.active
            .as_mut()
            .ok_or_else(|| CanopyError::TrainingError("no active tracking run".to_string()))
    }
}

impl TrackingSink for ExperimentTracker {
    fn start_run(&mut self, run_name: &str) -> Result<String> {
        if let Some(stale) = self.active.take() {
            debug!("Discarding unfinished run {}", stale.run_id);
        }
        let run = Run::new(run_name);
        let id = run.run_id.clone();
        info!("Started run '{}' ({}) in experiment '{}'", run_name, id, self.experiment);
        self.active = Some(run);
        Ok(id)
    }

    fn log_params(&mut self, params: &BTreeMap<String, String>) -> Result<()> {
        let run = self.active_mut()?;
        run.params
            .extend(params.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(())
    }

    fn log_metrics(&mut self, metrics: &BTreeMap<String, f64>) -> Result<()> {
        let run = self.active_mut()?;
        run.metrics.extend(metrics.iter().map(|(k, v)| (k.clone(), *v)));
        Ok(())
    }

    fn log_model(&mut self, artifact: &Path) -> Result<()> {
        let run_id = self.active_mut()?.run_id.clone();
        let stored = self.storage.store_artifact(&run_id, artifact)?;
        self.active_mut()?
            .artifacts
            .push(stored.display().to_string());
        Ok(())
    }

    fn end_run(&mut self, status: RunStatus) -> Result<Run> {
        let mut run = self
            .active
            .take()
            .ok_or_else(|| CanopyError::TrainingError("no active tracking run".to_string()))?;
        run.status = status;
        run.end_time = Some(Utc::now());
        self.storage.append_run(&run)?;
        info!("Run {} ended with status {:?}", run.run_id, status);
        Ok(run)
    }
}
