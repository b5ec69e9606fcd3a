//! Classifier registry
//!
//! Every training invocation asks [`new_model`] for a fresh, independently
//! owned [`Classifier`]. Parameters come either from the per-algorithm
//! baseline or from a validated [`ParamMap`].

pub mod decision_tree;
pub mod knn;
pub mod linear;
pub mod random_forest;

pub use decision_tree::{Criterion, DecisionTree};
pub use knn::{DistanceMetric, KnnClassifier, WeightScheme};
pub use linear::LogisticRegression;
pub use random_forest::{MaxFeatures, RandomForest};

use crate::error::{CanopyError, Result};
use crate::params::{schema, ParamMap, ParamValue};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Supported classification algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    /// Logistic regression
    Logit,
    /// Decision tree
    Tree,
    /// Random forest
    Forest,
    /// k-nearest neighbors
    Knn,
}

impl Algorithm {
    pub const ALL: [Algorithm; 4] = [
        Algorithm::Logit,
        Algorithm::Tree,
        Algorithm::Forest,
        Algorithm::Knn,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::Logit => "logit",
            Algorithm::Tree => "tree",
            Algorithm::Forest => "forest",
            Algorithm::Knn => "knn",
        }
    }
}

impl Default for Algorithm {
    fn default() -> Self {
        Algorithm::Logit
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = CanopyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "logit" => Ok(Algorithm::Logit),
            "tree" => Ok(Algorithm::Tree),
            "forest" => Ok(Algorithm::Forest),
            "knn" => Ok(Algorithm::Knn),
            other => Err(CanopyError::ConfigurationError(format!(
                "unknown model '{}', expected one of logit, tree, forest, knn",
                other
            ))),
        }
    }
}

/// Where a new model takes its hyperparameters from
#[derive(Debug, Clone, PartialEq)]
pub enum ParamSource {
    /// Tuned per-algorithm starting point
    Baseline,
    /// Exactly these validated parameters on top of library defaults
    Merged(ParamMap),
}

/// Baseline hyperparameters used when the user supplies none.
pub fn baseline_params(algorithm: Algorithm) -> ParamMap {
    let entries: Vec<(&str, ParamValue)> = match algorithm {
        Algorithm::Logit => vec![("max_iter", ParamValue::Int(1000))],
        Algorithm::Tree => vec![
            ("max_depth", ParamValue::Int(20)),
            ("min_samples_leaf", ParamValue::Int(5)),
        ],
        Algorithm::Forest => vec![
            ("n_estimators", ParamValue::Int(150)),
            ("max_depth", ParamValue::Int(25)),
        ],
        Algorithm::Knn => vec![
            ("n_neighbors", ParamValue::Int(10)),
            ("weights", ParamValue::Str("distance".to_string())),
        ],
    };
    entries
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

/// Build a fresh, unfitted classifier.
pub fn new_model(algorithm: Algorithm, source: &ParamSource) -> Result<Classifier> {
    let params = match source {
        ParamSource::Baseline => baseline_params(algorithm),
        ParamSource::Merged(params) => params.clone(),
    };
    schema::validate(algorithm, &params)?;
    debug!("Building {} with {} parameters", algorithm, params.len());

    let model = match algorithm {
        Algorithm::Logit => Classifier::Logit(LogisticRegression::from_params(&params)),
        Algorithm::Tree => Classifier::Tree(DecisionTree::from_params(&params)),
        Algorithm::Forest => Classifier::Forest(RandomForest::from_params(&params)),
        Algorithm::Knn => Classifier::Knn(KnnClassifier::from_params(&params)),
    };
    Ok(model)
}

/// Parse `name` and build a fresh classifier for it.
pub fn select(name: &str, source: &ParamSource) -> Result<Classifier> {
    let algorithm: Algorithm = name.parse()?;
    new_model(algorithm, source)
}

/// A configured classifier of any supported algorithm
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Classifier {
    Logit(LogisticRegression),
    Tree(DecisionTree),
    Forest(RandomForest),
    Knn(KnnClassifier),
}

impl Classifier {
    pub fn algorithm(&self) -> Algorithm {
        match self {
            Classifier::Logit(_) => Algorithm::Logit,
            Classifier::Tree(_) => Algorithm::Tree,
            Classifier::Forest(_) => Algorithm::Forest,
            Classifier::Knn(_) => Algorithm::Knn,
        }
    }

    /// Seed the stochastic parts of the model, if any.
    pub fn with_random_state(self, seed: u64) -> Self {
        match self {
            Classifier::Tree(m) => Classifier::Tree(m.with_random_state(seed)),
            Classifier::Forest(m) => Classifier::Forest(m.with_random_state(seed)),
            other => other,
        }
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_shapes(x, y)?;
        match self {
            Classifier::Logit(m) => m.fit(x, y),
            Classifier::Tree(m) => m.fit(x, y),
            Classifier::Forest(m) => m.fit(x, y),
            Classifier::Knn(m) => m.fit(x, y),
        }
    }

    /// Class probabilities, one column per entry of [`Classifier::classes`].
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        match self {
            Classifier::Logit(m) => m.predict_proba(x),
            Classifier::Tree(m) => m.predict_proba(x),
            Classifier::Forest(m) => m.predict_proba(x),
            Classifier::Knn(m) => m.predict_proba(x),
        }
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let proba = self.predict_proba(x)?;
        Ok(labels_from_proba(&proba, self.classes()))
    }

    /// Sorted class labels seen during fit
    pub fn classes(&self) -> &[f64] {
        match self {
            Classifier::Logit(m) => m.classes(),
            Classifier::Tree(m) => m.classes(),
            Classifier::Forest(m) => m.classes(),
            Classifier::Knn(m) => m.classes(),
        }
    }

    /// Effective hyperparameters, including library defaults.
    pub fn params(&self) -> ParamMap {
        match self {
            Classifier::Logit(m) => m.params(),
            Classifier::Tree(m) => m.params(),
            Classifier::Forest(m) => m.params(),
            Classifier::Knn(m) => m.params(),
        }
    }
}

fn check_shapes(x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
    if x.nrows() != y.len() {
        return Err(CanopyError::ShapeError {
            expected: format!("y length = {}", x.nrows()),
            actual: format!("y length = {}", y.len()),
        });
    }
    if x.nrows() == 0 {
        return Err(CanopyError::TrainingError("no training samples".to_string()));
    }
    Ok(())
}

/// Sorted distinct labels and each sample's index into them.
pub fn encode_labels(y: &Array1<f64>) -> (Vec<f64>, Vec<usize>) {
    let mut classes: Vec<f64> = y.iter().copied().collect();
    classes.sort_by(|a, b| a.total_cmp(b));
    classes.dedup();
    let encoded = y
        .iter()
        .map(|label| class_index(&classes, *label).unwrap_or(0))
        .collect();
    (classes, encoded)
}

/// Position of `label` in a sorted class list.
pub fn class_index(classes: &[f64], label: f64) -> Option<usize> {
    classes.binary_search_by(|c| c.total_cmp(&label)).ok()
}

/// Argmax of each probability row mapped back to its class label.
pub fn labels_from_proba(proba: &Array2<f64>, classes: &[f64]) -> Array1<f64> {
    proba
        .rows()
        .into_iter()
        .map(|row| {
            let best = row
                .iter()
                .enumerate()
                .fold((0, f64::NEG_INFINITY), |acc, (i, &p)| if p > acc.1 { (i, p) } else { acc })
                .0;
            classes.get(best).copied().unwrap_or(f64::NAN)
        })
        .collect()
}

pub(crate) fn param_usize(params: &ParamMap, key: &str) -> Option<usize> {
    params
        .get(key)
        .and_then(ParamValue::as_i64)
        .map(|v| v.max(0) as usize)
}

pub(crate) fn param_f64(params: &ParamMap, key: &str) -> Option<f64> {
    params.get(key).and_then(ParamValue::as_f64)
}

pub(crate) fn param_bool(params: &ParamMap, key: &str) -> Option<bool> {
    params.get(key).and_then(ParamValue::as_bool)
}

pub(crate) fn param_str<'a>(params: &'a ParamMap, key: &str) -> Option<&'a str> {
    params.get(key).and_then(ParamValue::as_str)
}

/// `Some(Some(n))` for a limit, `Some(None)` for an explicit `none`.
pub(crate) fn param_limit(params: &ParamMap, key: &str) -> Option<Option<usize>> {
    match params.get(key) {
        Some(ParamValue::Int(v)) => Some(Some((*v).max(0) as usize)),
        Some(ParamValue::None) => Some(None),
        _ => None,
    }
}

pub(crate) fn limit_value(limit: Option<usize>) -> ParamValue {
    limit.map_or(ParamValue::None, |v| ParamValue::Int(v as i64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_algorithm_parse() {
        assert_eq!("forest".parse::<Algorithm>().unwrap(), Algorithm::Forest);
        assert_eq!("KNN".parse::<Algorithm>().unwrap(), Algorithm::Knn);
        assert!(matches!(
            "svm".parse::<Algorithm>(),
            Err(CanopyError::ConfigurationError(_))
        ));
    }

    #[test]
    fn test_baselines_are_valid() {
        for algorithm in Algorithm::ALL {
            let model = new_model(algorithm, &ParamSource::Baseline).unwrap();
            assert_eq!(model.algorithm(), algorithm);
        }
    }

    #[test]
    fn test_baseline_differs_from_empty_merge() {
        let baseline = new_model(Algorithm::Tree, &ParamSource::Baseline).unwrap();
        let empty = new_model(Algorithm::Tree, &ParamSource::Merged(ParamMap::new())).unwrap();
        assert_eq!(baseline.params().get("max_depth"), Some(&ParamValue::Int(20)));
        assert_eq!(empty.params().get("max_depth"), Some(&ParamValue::None));
    }

    #[test]
    fn test_merged_applies_exactly() {
        let mut params = ParamMap::new();
        params.insert("n_neighbors".into(), ParamValue::Int(3));
        let model = select("knn", &ParamSource::Merged(params)).unwrap();
        assert_eq!(model.params().get("n_neighbors"), Some(&ParamValue::Int(3)));
        assert_eq!(model.params().get("weights"), Some(&ParamValue::Str("uniform".into())));
    }

    #[test]
    fn test_models_are_independent() {
        let a = new_model(Algorithm::Forest, &ParamSource::Baseline).unwrap();
        let mut params = ParamMap::new();
        params.insert("n_estimators".into(), ParamValue::Int(5));
        let b = new_model(Algorithm::Forest, &ParamSource::Merged(params)).unwrap();
        assert_eq!(a.params().get("n_estimators"), Some(&ParamValue::Int(150)));
        assert_eq!(b.params().get("n_estimators"), Some(&ParamValue::Int(5)));
    }

    #[test]
    fn test_encode_labels() {
        let y = Array1::from_vec(vec![7.0, 2.0, 7.0, 5.0]);
        let (classes, encoded) = encode_labels(&y);
        assert_eq!(classes, vec![2.0, 5.0, 7.0]);
        assert_eq!(encoded, vec![2, 0, 2, 1]);
    }

    #[test]
    fn test_every_algorithm_separates_blobs() {
        let x = Array2::from_shape_vec(
            (12, 2),
            vec![
                0.0, 0.1, 0.2, 0.0, 0.1, 0.3, 0.3, 0.2, 0.0, 0.4, 0.2, 0.2,
                5.0, 5.1, 5.2, 5.0, 5.1, 5.3, 5.3, 5.2, 5.0, 5.4, 5.2, 5.2,
            ],
        )
        .unwrap();
        let y = Array1::from_vec(vec![1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 2.0, 2.0, 2.0, 2.0, 2.0, 2.0]);

        for algorithm in Algorithm::ALL {
            let mut model = new_model(algorithm, &ParamSource::Merged(ParamMap::new()))
                .unwrap()
                .with_random_state(7);
            model.fit(&x, &y).unwrap();
            let pred = model.predict(&x).unwrap();
            assert_eq!(pred, y, "{} failed to separate blobs", algorithm);
            let proba = model.predict_proba(&x).unwrap();
            assert_eq!(proba.dim(), (12, 2));
        }
    }

    #[test]
    fn test_unfitted_predict_fails() {
        let x = Array2::zeros((2, 2));
        for algorithm in Algorithm::ALL {
            let model = new_model(algorithm, &ParamSource::Baseline).unwrap();
            assert!(matches!(model.predict(&x), Err(CanopyError::ModelNotFitted)));
        }
    }
}
