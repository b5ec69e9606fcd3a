//! Interactive session state
//!
//! A [`Session`] owns the configuration, the cached dataset and the
//! experiment tracker. Every setter validates its input completely before
//! writing, so a failed command leaves the configuration as it was.
//!
//! The dataset is loaded on first use and kept until a command changes the
//! data source (`setpath load`, `targetcolumn`) or resets feature
//! engineering (`feateng none`).

use crate::config::Config;
use crate::data;
use crate::error::{CanopyError, Result};
use crate::feateng::{self, FeatEngMode, PreparedData};
use crate::models::{new_model, Algorithm, ParamSource};
use crate::params::{coerce, merge_and_validate, ParamMap};
use crate::paths;
use crate::persist;
use crate::pipeline::Pipeline;
use crate::preprocessing::{DimReductKind, ScalerKind};
use crate::tracking::{ExperimentTracker, TrackingSink};
use crate::training::{self, SearchReport, SearchSpace, TrainReport};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Result of a `feateng` command
#[derive(Debug, Clone, PartialEq)]
pub enum FeatEngOutcome {
    Applied { before: usize, after: usize },
    AlreadyApplied,
    /// The loaded dataset is not the Forest Cover Type data
    Unsupported,
    Reset,
}

pub struct Session {
    config: Config,
    data: Option<PreparedData>,
    tracker: Box<dyn TrackingSink>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

impl Session {
    /// Session tracking runs under `config.tracking_dir`.
    pub fn new(config: Config) -> Self {
        let tracker = ExperimentTracker::new(&config.tracking_dir, &config.experiment);
        Self::with_tracker(config, Box::new(tracker))
    }

    pub fn with_tracker(config: Config, tracker: Box<dyn TrackingSink>) -> Self {
        Self {
            config,
            data: None,
            tracker,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn is_loaded(&self) -> bool {
        self.data.is_some()
    }

    fn invalidate(&mut self) {
        if self.data.take().is_some() {
            debug!("Dropped cached dataset");
        }
    }

    pub fn set_model(&mut self, name: &str) -> Result<Algorithm> {
        let algorithm: Algorithm = name.parse()?;
        self.config.model = algorithm;
        Ok(algorithm)
    }

    pub fn set_scaler(&mut self, name: &str) -> Result<ScalerKind> {
        let scaler: ScalerKind = name.parse()?;
        self.config.scaler = scaler;
        Ok(scaler)
    }

    pub fn set_dimreduct(&mut self, name: &str) -> Result<DimReductKind> {
        let reducer: DimReductKind = name.parse()?;
        self.config.dimreduct = reducer;
        Ok(reducer)
    }

    /// Point the session at a new training CSV.
    pub fn set_load_path(&mut self, path: impl AsRef<Path>) -> Result<PathBuf> {
        paths::require_extension(&path, "csv")?;
        let resolved = paths::require_file(&path)?;
        self.config.loadpath = resolved.clone();
        self.config.feateng = FeatEngMode::None;
        self.invalidate();
        Ok(resolved)
    }

    pub fn set_dump_path(&mut self, path: impl AsRef<Path>) -> Result<PathBuf> {
        paths::require_extension(&path, "bin")?;
        let resolved = paths::require_parent_dir(&path)?;
        self.config.dumppath = resolved.clone();
        Ok(resolved)
    }

    pub fn set_export_path(&mut self, path: impl AsRef<Path>) -> Result<PathBuf> {
        paths::require_extension(&path, "csv")?;
        let resolved = paths::require_parent_dir(&path)?;
        self.config.exportpath = resolved.clone();
        Ok(resolved)
    }

    /// Change the label column; it must appear in the training file header.
    pub fn set_target_column(&mut self, column: &str) -> Result<()> {
        let header = data::read_header(&self.config.loadpath)?;
        if !header.iter().any(|c| c == column) {
            return Err(CanopyError::MissingColumnError(column.to_string()));
        }
        self.config.targetcolumn = column.to_string();
        self.config.feateng = FeatEngMode::None;
        self.invalidate();
        Ok(())
    }

    pub fn set_random_state(&mut self, seed: i64) -> Result<()> {
        if seed <= 0 {
            return Err(CanopyError::ConfigurationError(format!(
                "random state must be positive, got {}",
                seed
            )));
        }
        self.config.randomstate = seed as u64;
        Ok(())
    }

    pub fn set_eval(&mut self, folds: usize) -> Result<()> {
        if folds < 2 {
            return Err(CanopyError::ConfigurationError(format!(
                "number of folds must be at least 2, got {}",
                folds
            )));
        }
        self.config.eval = folds;
        Ok(())
    }

    pub fn set_feateng(&mut self, mode: &str) -> Result<FeatEngOutcome> {
        match mode.parse::<FeatEngMode>()? {
            FeatEngMode::None => {
                self.config.feateng = FeatEngMode::None;
                self.invalidate();
                Ok(FeatEngOutcome::Reset)
            }
            FeatEngMode::Auto if self.config.feateng == FeatEngMode::Auto => {
                Ok(FeatEngOutcome::AlreadyApplied)
            }
            FeatEngMode::Auto => {
                let raw = match self.data.take() {
                    Some(prepared) if !prepared.is_engineered() => prepared.dataset,
                    _ => self.load_raw()?,
                };
                if !feateng::is_forest_cover(&raw.feature_names) {
                    self.data = Some(PreparedData::raw(raw));
                    return Ok(FeatEngOutcome::Unsupported);
                }

                let before = raw.n_features();
                let prepared = PreparedData::engineered(raw)?;
                let after = prepared.dataset.n_features();
                self.data = Some(prepared);
                self.config.feateng = FeatEngMode::Auto;
                Ok(FeatEngOutcome::Applied { before, after })
            }
        }
    }

    fn load_raw(&self) -> Result<data::Dataset> {
        data::load_data(&self.config.loadpath, &self.config.targetcolumn)
    }

    /// The training data, loading it on first use.
    pub fn prepared(&mut self) -> Result<&PreparedData> {
        if self.data.is_none() {
            let raw = self.load_raw()?;
            let prepared = match self.config.feateng {
                FeatEngMode::Auto => PreparedData::engineered(raw)?,
                FeatEngMode::None => PreparedData::raw(raw),
            };
            self.data = Some(prepared);
        }
        self.data
            .as_ref()
            .ok_or_else(|| CanopyError::DataError("dataset is not loaded".to_string()))
    }

    /// Merge structured flags with free-form tokens, validate, and train.
    ///
    /// Baseline parameters are used only when neither source supplied any.
    pub fn train(&mut self, known: &ParamMap, unknown: &[String]) -> Result<TrainReport> {
        let algorithm = self.config.model;
        let coerced = coerce(unknown)?;
        let merged = merge_and_validate(algorithm, coerced, known)?;
        let source = if merged.is_empty() {
            ParamSource::Baseline
        } else {
            ParamSource::Merged(merged)
        };

        let model = new_model(algorithm, &source)?;
        let pipeline = Pipeline::new(self.config.scaler, self.config.dimreduct, model);
        info!("Training pipeline {:?}", pipeline.stage_names());

        self.prepared()?;
        let prepared = self
            .data
            .as_ref()
            .ok_or_else(|| CanopyError::DataError("dataset is not loaded".to_string()))?;
        training::train(pipeline, prepared, &self.config, self.tracker.as_mut())
    }

    /// Nested-CV grid search over `grid` or the algorithm's default grid.
    pub fn hypersearch(&mut self, grid: Option<&str>) -> Result<SearchReport> {
        let grid = match grid {
            Some(text) => training::parse_grid(text)?,
            None => training::default_grid(self.config.model),
        };
        let space = SearchSpace {
            algorithm: self.config.model,
            scaler: self.config.scaler,
            dimreduct: self.config.dimreduct,
            random_state: self.config.randomstate,
        };
        let dataset = &self.prepared()?.dataset;
        training::hypersearch(&space, &grid, &dataset.features, &dataset.target)
    }

    /// Predict `input` with the dumped pipeline and write the export file.
    pub fn predict(&self, input: impl AsRef<Path>) -> Result<(PathBuf, usize)> {
        paths::require_file(&input)?;
        let model = persist::load_pipeline(&self.config.dumppath)?;
        let written = persist::predict_to_csv(&model, input, &self.config.exportpath)?;
        Ok((paths::resolve(&self.config.exportpath), written))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_in(dir: &tempfile::TempDir) -> Session {
        let csv = dir.path().join("train.csv");
        std::fs::write(&csv, "a,b,Cover_Type\n1,2,1\n2,3,2\n").unwrap();
        let config = Config::default()
            .with_loadpath(&csv)
            .with_tracking_dir(dir.path().join("mlruns"));
        Session::new(config)
    }

    #[test]
    fn test_default_model_is_logit() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(session_in(&dir).config().model, Algorithm::Logit);
    }

    #[test]
    fn test_failed_setters_leave_config_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session_in(&dir);
        let before = session.config().clone();

        assert!(session.set_model("svm").is_err());
        assert!(session.set_scaler("zscore").is_err());
        assert!(session.set_dimreduct("umap").is_err());
        assert!(session.set_random_state(0).is_err());
        assert!(session.set_random_state(-3).is_err());
        assert!(session.set_eval(1).is_err());
        assert!(session.set_load_path(dir.path().join("absent.csv")).is_err());
        assert!(session.set_load_path(dir.path().join("train.txt")).is_err());
        assert!(session.set_dump_path(dir.path().join("model.pkl")).is_err());
        assert!(session.set_target_column("label").is_err());

        assert_eq!(session.config(), &before);
    }

    #[test]
    fn test_target_column_checked_against_header() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session_in(&dir);
        session.set_target_column("b").unwrap();
        assert_eq!(session.config().targetcolumn, "b");
        assert_eq!(session.prepared().unwrap().dataset.feature_names, vec!["a", "Cover_Type"]);
    }

    #[test]
    fn test_dataset_cached_until_invalidated() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session_in(&dir);
        assert!(!session.is_loaded());
        session.prepared().unwrap();
        assert!(session.is_loaded());

        session.set_model("tree").unwrap();
        session.set_scaler("standard").unwrap();
        assert!(session.is_loaded());

        assert_eq!(session.set_feateng("none").unwrap(), FeatEngOutcome::Reset);
        assert!(!session.is_loaded());
    }

    #[test]
    fn test_feateng_rejects_other_datasets() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session_in(&dir);
        assert_eq!(session.set_feateng("auto").unwrap(), FeatEngOutcome::Unsupported);
        assert_eq!(session.config().feateng, FeatEngMode::None);
    }
}
