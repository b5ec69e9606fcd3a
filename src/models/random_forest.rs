//! Random Forest classifier

use super::decision_tree::{Criterion, DecisionTree};
use super::{encode_labels, limit_value, param_bool, param_limit, param_str, param_usize};
use crate::error::{CanopyError, Result};
use crate::params::{ParamMap, ParamValue};
use ndarray::{Array1, Array2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Random Forest model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    trees: Vec<DecisionTree>,
    /// Number of trees
    pub n_estimators: usize,
    /// Maximum depth per tree
    pub max_depth: Option<usize>,
    /// Minimum samples to split
    pub min_samples_split: usize,
    /// Minimum samples in leaf
    pub min_samples_leaf: usize,
    /// Features considered per split
    pub max_features: MaxFeatures,
    /// Bootstrap sampling
    pub bootstrap: bool,
    pub criterion: Criterion,
    pub random_state: u64,
    classes: Vec<f64>,
}

/// Strategy for max features
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MaxFeatures {
    /// Square root of n_features
    Sqrt,
    /// Log2 of n_features
    Log2,
    /// All features
    All,
}

impl MaxFeatures {
    pub fn as_str(&self) -> &'static str {
        match self {
            MaxFeatures::Sqrt => "sqrt",
            MaxFeatures::Log2 => "log2",
            MaxFeatures::All => "all",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "sqrt" => Some(MaxFeatures::Sqrt),
            "log2" => Some(MaxFeatures::Log2),
            "all" => Some(MaxFeatures::All),
            _ => None,
        }
    }

    fn resolve(&self, n_features: usize) -> usize {
        match self {
            MaxFeatures::Sqrt => (n_features as f64).sqrt().ceil() as usize,
            MaxFeatures::Log2 => (n_features as f64).log2().ceil() as usize,
            MaxFeatures::All => n_features,
        }
        .max(1)
    }
}

impl Default for RandomForest {
    fn default() -> Self {
        Self::new(100)
    }
}

impl RandomForest {
    pub fn new(n_estimators: usize) -> Self {
        Self {
            trees: Vec::new(),
            n_estimators,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::Sqrt,
            bootstrap: true,
            criterion: Criterion::Gini,
            random_state: 0,
            classes: Vec::new(),
        }
    }

    /// Library defaults overridden by `params`.
    pub fn from_params(params: &ParamMap) -> Self {
        let defaults = Self::default();
        Self {
            n_estimators: param_usize(params, "n_estimators").unwrap_or(defaults.n_estimators),
            max_depth: param_limit(params, "max_depth").unwrap_or(defaults.max_depth),
            min_samples_split: param_usize(params, "min_samples_split")
                .unwrap_or(defaults.min_samples_split),
            min_samples_leaf: param_usize(params, "min_samples_leaf")
                .unwrap_or(defaults.min_samples_leaf),
            max_features: param_str(params, "max_features")
                .and_then(MaxFeatures::parse)
                .unwrap_or(defaults.max_features),
            bootstrap: param_bool(params, "bootstrap").unwrap_or(defaults.bootstrap),
            criterion: param_str(params, "criterion")
                .and_then(Criterion::parse)
                .unwrap_or(defaults.criterion),
            ..defaults
        }
    }

    pub fn with_max_features(mut self, max_features: MaxFeatures) -> Self {
        self.max_features = max_features;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    pub fn params(&self) -> ParamMap {
        let mut params = ParamMap::new();
        params.insert("n_estimators".into(), ParamValue::Int(self.n_estimators as i64));
        params.insert("max_depth".into(), limit_value(self.max_depth));
        params.insert(
            "min_samples_split".into(),
            ParamValue::Int(self.min_samples_split as i64),
        );
        params.insert(
            "min_samples_leaf".into(),
            ParamValue::Int(self.min_samples_leaf as i64),
        );
        params.insert("max_features".into(), ParamValue::from(self.max_features.as_str()));
        params.insert("bootstrap".into(), ParamValue::Bool(self.bootstrap));
        params.insert("criterion".into(), ParamValue::from(self.criterion.as_str()));
        params
    }

    pub fn classes(&self) -> &[f64] {
        &self.classes
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        let n_samples = x.nrows();
        if n_samples == 0 {
            return Err(CanopyError::TrainingError("no training samples".to_string()));
        }
        let (classes, labels) = encode_labels(y);
        let max_features = self.max_features.resolve(x.ncols());
        debug!(
            "Growing {} trees over {} samples, {} features per split",
            self.n_estimators, n_samples, max_features
        );

        let trees: Vec<DecisionTree> = (0..self.n_estimators)
            .into_par_iter()
            .map(|tree_idx| {
                let seed = self.random_state.wrapping_add(tree_idx as u64);
                let mut rng = ChaCha8Rng::seed_from_u64(seed);

                let rows: Vec<usize> = if self.bootstrap {
                    (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect()
                } else {
                    (0..n_samples).collect()
                };

                let mut tree = DecisionTree::new()
                    .with_max_features(Some(max_features))
                    .with_criterion(self.criterion)
                    .with_random_state(rng.gen());
                tree.max_depth = self.max_depth;
                tree.min_samples_split = self.min_samples_split;
                tree.min_samples_leaf = self.min_samples_leaf;
                tree.fit_encoded(x, &labels, &classes, &rows).map(|_| tree)
            })
            .collect::<Result<Vec<_>>>()?;

        self.trees = trees;
        self.classes = classes;
        Ok(())
    }

    /// Mean of the per-tree class distributions.
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if self.trees.is_empty() {
            return Err(CanopyError::ModelNotFitted);
        }

        let per_tree: Vec<Array2<f64>> = self
            .trees
            .par_iter()
            .map(|tree| tree.predict_proba(x))
            .collect::<Result<Vec<_>>>()?;

        let mut proba = Array2::<f64>::zeros((x.nrows(), self.classes.len()));
        for p in &per_tree {
            proba += p;
        }
        proba /= self.trees.len() as f64;
        Ok(proba)
    }
}
