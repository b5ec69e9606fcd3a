//! Session configuration

use crate::error::{CanopyError, Result};
use crate::feateng::FeatEngMode;
use crate::models::Algorithm;
use crate::paths;
use crate::preprocessing::{DimReductKind, ScalerKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Everything a training run reads from the session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Training data CSV
    pub loadpath: PathBuf,
    /// Where `predict` writes its output
    pub exportpath: PathBuf,
    /// Where `train` dumps the fitted pipeline
    pub dumppath: PathBuf,

    pub model: Algorithm,
    pub scaler: ScalerKind,
    pub dimreduct: DimReductKind,
    pub feateng: FeatEngMode,

    /// Number of cross-validation folds
    pub eval: usize,
    pub targetcolumn: String,
    pub randomstate: u64,

    /// Root directory of the experiment tracker
    pub tracking_dir: PathBuf,
    pub experiment: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            loadpath: PathBuf::from("data/train.csv"),
            exportpath: PathBuf::from("data/submission.csv"),
            dumppath: PathBuf::from("data/model.bin"),
            model: Algorithm::Logit,
            scaler: ScalerKind::None,
            dimreduct: DimReductKind::None,
            feateng: FeatEngMode::None,
            eval: 5,
            targetcolumn: "Cover_Type".to_string(),
            randomstate: 42,
            tracking_dir: PathBuf::from("mlruns"),
            experiment: "canopy".to_string(),
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a JSON file; keys it omits keep their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let resolved = paths::require_file(path)?;
        let text = std::fs::read_to_string(&resolved)?;
        let config: Config = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Range checks that serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.eval < 2 {
            return Err(CanopyError::ConfigurationError(format!(
                "eval must be at least 2, got {}",
                self.eval
            )));
        }
        if self.randomstate == 0 {
            return Err(CanopyError::ConfigurationError(
                "randomstate must be positive".to_string(),
            ));
        }
        if self.targetcolumn.is_empty() {
            return Err(CanopyError::ConfigurationError(
                "targetcolumn must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn with_loadpath(mut self, path: impl Into<PathBuf>) -> Self {
        self.loadpath = path.into();
        self
    }

    pub fn with_dumppath(mut self, path: impl Into<PathBuf>) -> Self {
        self.dumppath = path.into();
        self
    }

    pub fn with_exportpath(mut self, path: impl Into<PathBuf>) -> Self {
        self.exportpath = path.into();
        self
    }

    pub fn with_model(mut self, model: Algorithm) -> Self {
        self.model = model;
        self
    }

    pub fn with_eval(mut self, folds: usize) -> Self {
        self.eval = folds;
        self
    }

    pub fn with_tracking_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.tracking_dir = dir.into();
        self
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rows: [(&str, String); 12] = [
            ("model", self.model.to_string()),
            ("scaler", self.scaler.to_string()),
            ("dimreduct", self.dimreduct.to_string()),
            ("feateng", self.feateng.to_string()),
            ("eval", self.eval.to_string()),
            ("randomstate", self.randomstate.to_string()),
            ("targetcolumn", self.targetcolumn.clone()),
            ("loadpath", self.loadpath.display().to_string()),
            ("dumppath", self.dumppath.display().to_string()),
            ("exportpath", self.exportpath.display().to_string()),
            ("tracking_dir", self.tracking_dir.display().to_string()),
            ("experiment", self.experiment.clone()),
        ];
        for (key, value) in rows {
            writeln!(f, "  {:<14} {}", key, value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.model, Algorithm::Logit);
        assert_eq!(config.eval, 5);
        assert_eq!(config.randomstate, 42);
        assert_eq!(config.targetcolumn, "Cover_Type");
        assert_eq!(config.dumppath, PathBuf::from("data/model.bin"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("canopy.json");
        std::fs::write(&path, r#"{"model": "forest", "scaler": "standard", "eval": 3}"#).unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.model, Algorithm::Forest);
        assert_eq!(config.scaler, ScalerKind::Standard);
        assert_eq!(config.eval, 3);
        assert_eq!(config.targetcolumn, "Cover_Type");
    }

    #[test]
    fn test_unknown_model_in_json_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("canopy.json");
        std::fs::write(&path, r#"{"model": "svm"}"#).unwrap();
        assert!(matches!(
            Config::from_file(&path),
            Err(CanopyError::SerializationError(_))
        ));
    }

    #[test]
    fn test_invalid_ranges() {
        assert!(Config::default().with_eval(1).validate().is_err());
        let mut config = Config::default();
        config.randomstate = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_display_lists_every_key() {
        let text = Config::default().to_string();
        for key in ["model", "scaler", "dimreduct", "feateng", "eval", "loadpath"] {
            assert!(text.contains(key));
        }
    }
}
