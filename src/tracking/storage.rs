//! Storage backend for experiment tracking
//!
//! One directory per experiment holding `runs.jsonl` (one finished run per
//! line) and a subdirectory per run for artifacts.

use super::tracker::Run;
use crate::error::{CanopyError, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

const RUNS_FILE: &str = "runs.jsonl";

/// Local file system storage backend
#[derive(Debug, Clone)]
pub struct LocalStorage {
    base_dir: PathBuf,
}

impl LocalStorage {
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    fn runs_file(&self) -> PathBuf {
        self.base_dir.join(RUNS_FILE)
    }

    fn run_dir(&self, run_id: &str) -> PathBuf {
        self.base_dir.join(run_id)
    }

    /// Append a finished run to `runs.jsonl`.
    pub fn append_run(&self, run: &Run) -> Result<()> {
        fs::create_dir_all(&self.base_dir)?;
        let line = serde_json::to_string(run)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.runs_file())?;
        writeln!(file, "{}", line)?;
        Ok(())
    }

    pub fn load_runs(&self) -> Result<Vec<Run>> {
        let path = self.runs_file();
        if !path.exists() {
            return Ok(Vec::new());
        }
        BufReader::new(File::open(path)?)
            .lines()
            .filter(|line| line.as_ref().map_or(true, |l| !l.trim().is_empty()))
            .map(|line| Ok(serde_json::from_str(&line?)?))
            .collect()
    }

    /// Copy `artifact` into the run's directory and return the new path.
    pub fn store_artifact(&self, run_id: &str, artifact: &Path) -> Result<PathBuf> {
        let file_name = artifact
            .file_name()
            .ok_or_else(|| CanopyError::PathNotFound(artifact.to_path_buf()))?;
        if !artifact.is_file() {
            return Err(CanopyError::PathNotFound(artifact.to_path_buf()));
        }
        let dir = self.run_dir(run_id);
        fs::create_dir_all(&dir)?;
        let target = dir.join(file_name);
        fs::copy(artifact, &target)?;
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_storage_has_no_runs() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path().join("exp"));
        assert!(storage.load_runs().unwrap().is_empty());
    }

    #[test]
    fn test_missing_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path().to_path_buf());
        let missing = dir.path().join("nope.bin");
        assert!(matches!(
            storage.store_artifact("run", &missing),
            Err(CanopyError::PathNotFound(_))
        ));
    }
}
