//! Grid search with nested cross-validation
//!
//! The inner loop picks the candidate with the best mean accuracy over 4
//! shuffled folds. The outer loop runs that inner search on each of 8 folds
//! and scores the winner on the held-out part with the training metrics, so
//! the reported scores are not biased by the selection. A last inner search
//! on all rows yields the recommended parameters.

use crate::error::{CanopyError, Result};
use crate::models::{baseline_params, encode_labels, new_model, Algorithm, ParamSource};
use crate::params::{coerce_value, schema, ParamMap, ParamValue};
use crate::pipeline::Pipeline;
use crate::preprocessing::{DimReductKind, ScalerKind};
use crate::training::cross_validation::{aligned_proba, fit_on, CVResults, CVStrategy, CrossValidator};
use crate::training::metrics::{accuracy, Scores};
use ndarray::{Array1, Array2, Axis};
use rayon::prelude::*;
use std::collections::BTreeMap;
use tracing::{debug, info};

pub const INNER_FOLDS: usize = 4;
pub const OUTER_FOLDS: usize = 8;

/// Prefix accepted (and stripped) on grid keys
const ESTIMATOR_PREFIX: &str = "clf__";

/// Candidate values per parameter
pub type ParamGrid = BTreeMap<String, Vec<ParamValue>>;

/// Grid searched when the user gives none
pub fn default_grid(algorithm: Algorithm) -> ParamGrid {
    let ints = |values: &[i64]| values.iter().map(|&v| ParamValue::Int(v)).collect::<Vec<_>>();
    let entries: Vec<(&str, Vec<ParamValue>)> = match algorithm {
        Algorithm::Logit => vec![(
            "c",
            vec![ParamValue::Float(0.1), ParamValue::Float(1.0), ParamValue::Float(10.0)],
        )],
        Algorithm::Tree => vec![
            ("max_depth", ints(&[3, 5, 10, 20, 35])),
            ("min_samples_leaf", ints(&[5, 10, 20, 50])),
        ],
        Algorithm::Forest => vec![
            ("n_estimators", ints(&[50, 150, 250])),
            ("max_depth", ints(&[3, 15, 50])),
        ],
        Algorithm::Knn => vec![
            ("n_neighbors", ints(&[5, 10, 20])),
            ("weights", vec![ParamValue::from("uniform"), ParamValue::from("distance")]),
        ],
    };
    entries
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

/// Parse a dict literal such as `{'clf__C': [0.1, 1], 'max_depth': [3, None]}`.
///
/// Keys lose the optional `clf__` prefix and are lower-cased. A scalar value
/// is a one-element list. Strings that look like numbers or keywords are
/// coerced the same way command-line values are.
pub fn parse_grid(text: &str) -> Result<ParamGrid> {
    let json = literal_to_json(text)?;
    let raw: BTreeMap<String, serde_json::Value> = serde_json::from_str(&json)
        .map_err(|e| CanopyError::ArgumentFormatError(format!("invalid parameter grid: {}", e)))?;

    let mut grid = ParamGrid::new();
    for (key, value) in raw {
        let name = key
            .strip_prefix(ESTIMATOR_PREFIX)
            .unwrap_or(&key)
            .to_lowercase();
        let items = match value {
            serde_json::Value::Array(items) => items,
            scalar => vec![scalar],
        };
        if items.is_empty() {
            return Err(CanopyError::ArgumentFormatError(format!(
                "parameter grid entry '{}' has no values",
                name
            )));
        }
        let values = items
            .iter()
            .map(|item| match item {
                serde_json::Value::String(s) => Ok(coerce_value(s)),
                other => ParamValue::from_json(other).ok_or_else(|| {
                    CanopyError::ArgumentFormatError(format!(
                        "unsupported value {} for '{}'",
                        other, name
                    ))
                }),
            })
            .collect::<Result<Vec<_>>>()?;
        if grid.insert(name.clone(), values).is_some() {
            return Err(CanopyError::DuplicateParameterError(name));
        }
    }
    Ok(grid)
}

/// Rewrite Python literal syntax as JSON: quotes, tuples and keywords.
fn literal_to_json(text: &str) -> Result<String> {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\'' | '"' => {
                out.push('"');
                loop {
                    match chars.next() {
                        Some(ch) if ch == c => break,
                        Some('\\') => {
                            out.push('\\');
                            if let Some(escaped) = chars.next() {
                                out.push(escaped);
                            }
                        }
                        Some('"') => out.push_str("\\\""),
                        Some(ch) => out.push(ch),
                        None => {
                            return Err(CanopyError::ArgumentFormatError(
                                "unterminated string in parameter grid".to_string(),
                            ))
                        }
                    }
                }
                out.push('"');
            }
            '(' => out.push('['),
            ')' => out.push(']'),
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut word = String::from(c);
                while let Some(&next) = chars.peek() {
                    if !(next.is_ascii_alphanumeric() || next == '_') {
                        break;
                    }
                    word.push(next);
                    chars.next();
                }
                out.push_str(match word.as_str() {
                    "None" => "null",
                    "True" => "true",
                    "False" => "false",
                    other => other,
                });
            }
            other => out.push(other),
        }
    }
    Ok(out)
}

/// Every combination of grid values laid over the algorithm's baseline.
///
/// Each candidate is schema-checked before any fitting starts.
pub fn candidates(algorithm: Algorithm, grid: &ParamGrid) -> Result<Vec<ParamMap>> {
    let mut combos: Vec<ParamMap> = vec![ParamMap::new()];
    for (name, values) in grid {
        combos = combos
            .into_iter()
            .flat_map(|combo| {
                values.iter().map(move |value| {
                    let mut next = combo.clone();
                    next.insert(name.clone(), value.clone());
                    next
                })
            })
            .collect();
    }

    for combo in &combos {
        schema::validate(algorithm, combo)?;
    }
    Ok(combos)
}

/// What the search is run over
#[derive(Debug, Clone, Copy)]
pub struct SearchSpace {
    pub algorithm: Algorithm,
    pub scaler: ScalerKind,
    pub dimreduct: DimReductKind,
    pub random_state: u64,
}

impl SearchSpace {
    fn pipeline(&self, candidate: &ParamMap) -> Result<Pipeline> {
        let mut params = baseline_params(self.algorithm);
        params.extend(candidate.iter().map(|(k, v)| (k.clone(), v.clone())));
        let model = new_model(self.algorithm, &ParamSource::Merged(params))?;
        Ok(Pipeline::new(self.scaler, self.dimreduct, model).with_random_state(self.random_state))
    }

    fn folds(&self, n_splits: usize) -> CrossValidator {
        CrossValidator::new(CVStrategy::KFold { n_splits, shuffle: true })
            .with_random_state(self.random_state)
    }
}

/// Result of a nested grid search
#[derive(Debug, Clone)]
pub struct SearchReport {
    /// Winning grid point on the full data
    pub best_params: ParamMap,
    /// Its mean inner-fold accuracy
    pub best_score: f64,
    /// Outer-fold scores of the whole selection procedure
    pub outer: CVResults,
    pub n_candidates: usize,
}

pub fn hypersearch(
    space: &SearchSpace,
    grid: &ParamGrid,
    x: &Array2<f64>,
    y: &Array1<f64>,
) -> Result<SearchReport> {
    let candidates = candidates(space.algorithm, grid)?;
    info!(
        "Searching {} candidates for {} with {}x{} nested folds",
        candidates.len(),
        space.algorithm,
        OUTER_FOLDS,
        INNER_FOLDS
    );

    let classes = encode_labels(y).0;
    let outer_splits = space.folds(OUTER_FOLDS).split(y)?;
    let mut outer_scores = Vec::with_capacity(outer_splits.len());
    for split in &outer_splits {
        let x_train = x.select(Axis(0), &split.train_indices);
        let y_train = y.select(Axis(0), &split.train_indices);
        let (best, _) = search(space, &candidates, &x_train, &y_train)?;

        let fitted = fit_on(&space.pipeline(best)?, x, y, &split.train_indices)?;
        let x_test = x.select(Axis(0), &split.test_indices);
        let y_test = y.select(Axis(0), &split.test_indices);
        let proba = aligned_proba(&fitted, &x_test, &classes)?;
        let scores = Scores::compute(&y_test, &proba, &classes);
        debug!("Outer fold {}: {:?}", split.fold_idx, scores);
        outer_scores.push(scores);
    }

    let (best, best_score) = search(space, &candidates, x, y)?;
    Ok(SearchReport {
        best_params: best.clone(),
        best_score,
        outer: CVResults::from_folds(outer_scores),
        n_candidates: candidates.len(),
    })
}

/// Inner grid search: the first candidate with the highest mean accuracy.
fn search<'a>(
    space: &SearchSpace,
    candidates: &'a [ParamMap],
    x: &Array2<f64>,
    y: &Array1<f64>,
) -> Result<(&'a ParamMap, f64)> {
    let splits = space.folds(INNER_FOLDS).split(y)?;
    let scores = candidates
        .par_iter()
        .map(|candidate| {
            let pipeline = space.pipeline(candidate)?;
            let fold_scores = splits
                .iter()
                .map(|split| {
                    let fitted = fit_on(&pipeline, x, y, &split.train_indices)?;
                    let predicted = fitted.predict(&x.select(Axis(0), &split.test_indices))?;
                    Ok(accuracy(&y.select(Axis(0), &split.test_indices), &predicted))
                })
                .collect::<Result<Vec<f64>>>()?;
            Ok(fold_scores.iter().sum::<f64>() / fold_scores.len() as f64)
        })
        .collect::<Result<Vec<f64>>>()?;

    scores
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f64)>, (i, &score)| match best {
            Some((_, top)) if top >= score => best,
            _ => Some((i, score)),
        })
        .map(|(i, score)| (&candidates[i], score))
        .ok_or_else(|| CanopyError::TrainingError("parameter grid is empty".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_python_dict() {
        let grid = parse_grid("{'clf__C': [0.1, 1], 'Fit_Intercept': (True, False)}").unwrap();
        assert_eq!(grid["c"], vec![ParamValue::Float(0.1), ParamValue::Int(1)]);
        assert_eq!(grid["fit_intercept"], vec![ParamValue::Bool(true), ParamValue::Bool(false)]);
    }

    #[test]
    fn test_parse_none_and_strings() {
        let grid = parse_grid(r#"{"max_depth": [3, None], 'criterion': 'entropy'}"#).unwrap();
        assert_eq!(grid["max_depth"], vec![ParamValue::Int(3), ParamValue::None]);
        assert_eq!(grid["criterion"], vec![ParamValue::from("entropy")]);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(parse_grid("{'c': [0.1"), Err(CanopyError::ArgumentFormatError(_))));
        assert!(matches!(parse_grid("{'c': []}"), Err(CanopyError::ArgumentFormatError(_))));
        assert!(matches!(
            parse_grid("{'clf__c': [1], 'c': [2]}"),
            Err(CanopyError::DuplicateParameterError(_))
        ));
    }

    #[test]
    fn test_candidates_cartesian_product() {
        let grid = default_grid(Algorithm::Tree);
        let combos = candidates(Algorithm::Tree, &grid).unwrap();
        assert_eq!(combos.len(), 20);
        assert!(combos.iter().all(|c| c.len() == 2));
    }

    #[test]
    fn test_candidates_are_validated() {
        let grid = parse_grid("{'n_neighbors': [0, 3]}").unwrap();
        assert!(matches!(
            candidates(Algorithm::Knn, &grid),
            Err(CanopyError::UnrecognizedParameterError { .. })
        ));
        let grid = parse_grid("{'max_depth': [3]}").unwrap();
        assert!(candidates(Algorithm::Logit, &grid).is_err());
    }

    #[test]
    fn test_default_grids_are_valid() {
        for algorithm in Algorithm::ALL {
            assert!(candidates(algorithm, &default_grid(algorithm)).is_ok());
        }
    }

    #[test]
    fn test_knn_grid_searches_weights() {
        let grid = default_grid(Algorithm::Knn);
        assert_eq!(grid.keys().collect::<Vec<_>>(), vec!["n_neighbors", "weights"]);
        assert_eq!(candidates(Algorithm::Knn, &grid).unwrap().len(), 6);
    }

    #[test]
    fn test_nested_search_picks_a_grid_point() {
        let x = Array2::from_shape_fn((48, 2), |(r, c)| {
            (r % 2) as f64 * 3.0 + ((r * 5 + c * 11) % 7) as f64 * 0.1
        });
        let y = Array1::from_iter((0..48).map(|r| (r % 2) as f64));
        let space = SearchSpace {
            algorithm: Algorithm::Knn,
            scaler: ScalerKind::Standard,
            dimreduct: DimReductKind::None,
            random_state: 42,
        };
        let grid = parse_grid("{'n_neighbors': [1, 3]}").unwrap();

        let report = hypersearch(&space, &grid, &x, &y).unwrap();
        assert_eq!(report.n_candidates, 2);
        assert_eq!(report.outer.n_folds(), OUTER_FOLDS);
        assert!(report.best_params.contains_key("n_neighbors"));
        assert!(report.best_score > 0.9);
    }
}
