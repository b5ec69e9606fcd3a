//! Cross-validation splitters and fold evaluation

use crate::error::{CanopyError, Result};
use crate::models::encode_labels;
use crate::pipeline::Pipeline;
use crate::training::metrics::Scores;
use ndarray::{Array1, Array2, Axis};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Cross-validation strategy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CVStrategy {
    /// K-Fold cross-validation
    KFold { n_splits: usize, shuffle: bool },
    /// Stratified K-Fold (maintains class distribution)
    StratifiedKFold { n_splits: usize, shuffle: bool },
}

impl Default for CVStrategy {
    fn default() -> Self {
        CVStrategy::StratifiedKFold { n_splits: 5, shuffle: true }
    }
}

/// A single train/test split
#[derive(Debug, Clone)]
pub struct CVSplit {
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
    pub fold_idx: usize,
}

/// Cross-validation splitter
#[derive(Debug, Clone)]
pub struct CrossValidator {
    strategy: CVStrategy,
    random_state: Option<u64>,
}

impl CrossValidator {
    pub fn new(strategy: CVStrategy) -> Self {
        Self {
            strategy,
            random_state: None,
        }
    }

    /// Set random state for reproducibility
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    pub fn n_splits(&self) -> usize {
        match self.strategy {
            CVStrategy::KFold { n_splits, .. } | CVStrategy::StratifiedKFold { n_splits, .. } => {
                n_splits
            }
        }
    }

    fn rng(&self) -> ChaCha8Rng {
        match self.random_state {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        }
    }

    /// Generate train/test splits
    pub fn split(&self, y: &Array1<f64>) -> Result<Vec<CVSplit>> {
        let n_samples = y.len();
        let n_splits = self.n_splits();
        if n_splits < 2 {
            return Err(CanopyError::ConfigurationError(
                "number of folds must be at least 2".to_string(),
            ));
        }
        if n_samples < n_splits {
            return Err(CanopyError::TrainingError(format!(
                "cannot split {} samples into {} folds",
                n_samples, n_splits
            )));
        }

        match self.strategy {
            CVStrategy::KFold { shuffle, .. } => Ok(self.k_fold_split(n_samples, n_splits, shuffle)),
            CVStrategy::StratifiedKFold { shuffle, .. } => {
                Ok(self.stratified_k_fold_split(y, n_splits, shuffle))
            }
        }
    }

    fn k_fold_split(&self, n_samples: usize, n_splits: usize, shuffle: bool) -> Vec<CVSplit> {
        let mut indices: Vec<usize> = (0..n_samples).collect();
        if shuffle {
            indices.shuffle(&mut self.rng());
        }

        let base = n_samples / n_splits;
        let remainder = n_samples % n_splits;
        let mut folds = Vec::with_capacity(n_splits);
        let mut current = 0;
        for fold_idx in 0..n_splits {
            let fold_size = if fold_idx < remainder { base + 1 } else { base };
            folds.push(indices[current..current + fold_size].to_vec());
            current += fold_size;
        }
        splits_from_folds(folds)
    }

    fn stratified_k_fold_split(&self, y: &Array1<f64>, n_splits: usize, shuffle: bool) -> Vec<CVSplit> {
        let (classes, labels) = encode_labels(y);
        let mut class_indices: Vec<Vec<usize>> = vec![Vec::new(); classes.len()];
        for (idx, &label) in labels.iter().enumerate() {
            class_indices[label].push(idx);
        }

        let smallest = class_indices.iter().map(Vec::len).min().unwrap_or(0);
        if smallest < n_splits {
            warn!(
                "The least populated class has only {} members, fewer than {} folds",
                smallest, n_splits
            );
        }

        if shuffle {
            let mut rng = self.rng();
            for indices in &mut class_indices {
                indices.shuffle(&mut rng);
            }
        }

        // Each class continues where the previous one stopped so folds stay balanced
        let mut folds: Vec<Vec<usize>> = vec![Vec::new(); n_splits];
        let mut offset = 0;
        for indices in &class_indices {
            for &idx in indices {
                folds[offset % n_splits].push(idx);
                offset += 1;
            }
        }
        splits_from_folds(folds)
    }
}

fn splits_from_folds(folds: Vec<Vec<usize>>) -> Vec<CVSplit> {
    (0..folds.len())
        .map(|fold_idx| {
            let train_indices = folds
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != fold_idx)
                .flat_map(|(_, f)| f.iter().copied())
                .collect();
            CVSplit {
                train_indices,
                test_indices: folds[fold_idx].clone(),
                fold_idx,
            }
        })
        .collect()
}

/// Cross-validation results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CVResults {
    /// Scores for each fold
    pub folds: Vec<Scores>,
    /// Mean of every metric across folds
    pub mean: Scores,
    /// Standard deviation of balanced accuracy
    pub std_balanced_accuracy: f64,
}

impl CVResults {
    pub fn from_folds(folds: Vec<Scores>) -> Self {
        let mean = Scores::mean(&folds);
        let n = folds.len().max(1) as f64;
        let variance = folds
            .iter()
            .map(|s| (s.balanced_accuracy - mean.balanced_accuracy).powi(2))
            .sum::<f64>()
            / n;

        Self {
            folds,
            mean,
            std_balanced_accuracy: variance.sqrt(),
        }
    }

    pub fn n_folds(&self) -> usize {
        self.folds.len()
    }
}

/// Fit a fresh copy of `pipeline` on every training split and score it on
/// the held-out rows. Folds run in parallel.
pub fn cross_validate(
    pipeline: &Pipeline,
    x: &Array2<f64>,
    y: &Array1<f64>,
    cv: &CrossValidator,
) -> Result<CVResults> {
    let splits = cv.split(y)?;
    let classes = encode_labels(y).0;

    let folds = splits
        .par_iter()
        .map(|split| {
            let fitted = fit_on(pipeline, x, y, &split.train_indices)?;
            let x_test = x.select(Axis(0), &split.test_indices);
            let y_test = y.select(Axis(0), &split.test_indices);
            let proba = aligned_proba(&fitted, &x_test, &classes)?;
            let scores = Scores::compute(&y_test, &proba, &classes);
            debug!("Fold {}: {:?}", split.fold_idx, scores);
            Ok(scores)
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(CVResults::from_folds(folds))
}

/// Clone `pipeline` and fit it on the given rows.
pub fn fit_on(
    pipeline: &Pipeline,
    x: &Array2<f64>,
    y: &Array1<f64>,
    rows: &[usize],
) -> Result<Pipeline> {
    let mut fitted = pipeline.clone();
    fitted.fit(&x.select(Axis(0), rows), &y.select(Axis(0), rows))?;
    Ok(fitted)
}

/// Class probabilities laid out over `classes`; classes the fitted model
/// never saw get probability zero.
pub fn aligned_proba(pipeline: &Pipeline, x: &Array2<f64>, classes: &[f64]) -> Result<Array2<f64>> {
    let proba = pipeline.predict_proba(x)?;
    let seen = pipeline.classes();
    if seen == classes {
        return Ok(proba);
    }

    let mut aligned = Array2::<f64>::zeros((x.nrows(), classes.len()));
    for (j, class) in seen.iter().enumerate() {
        if let Some(target) = classes.iter().position(|c| c == class) {
            aligned.column_mut(target).assign(&proba.column(j));
        }
    }
    Ok(aligned)
}
