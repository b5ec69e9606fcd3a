//! Automatic feature synthesis for the Forest Cover Type dataset
//!
//! `feateng auto` derives pairwise sums and differences of the numeric
//! columns, products of numeric and binary columns, and a percentile rank of
//! every numeric column. Candidates highly correlated with an earlier kept
//! feature are dropped. `Soil_Type1..40` indicators are passed through
//! untouched and appended last.
//!
//! The result is a [`FeatureRecipe`] that can be replayed on unseen rows so a
//! persisted pipeline sees the same columns at prediction time.

use crate::data::Dataset;
use crate::error::{CanopyError, Result};
use ndarray::{Array2, ArrayView1, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

/// Absolute Pearson correlation above which a candidate is dropped
pub const CORRELATION_THRESHOLD: f64 = 0.96;

const SOIL_PREFIX: &str = "Soil_Type";
const SOIL_COUNT: usize = 40;
const ID_COLUMN: &str = "Id";

/// Feature engineering mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatEngMode {
    #[default]
    None,
    Auto,
}

impl FeatEngMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeatEngMode::None => "none",
            FeatEngMode::Auto => "auto",
        }
    }
}

impl fmt::Display for FeatEngMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeatEngMode {
    type Err = CanopyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(FeatEngMode::None),
            "auto" => Ok(FeatEngMode::Auto),
            other => Err(CanopyError::ConfigurationError(format!(
                "unknown feature engineering mode '{}', expected none or auto",
                other
            ))),
        }
    }
}

/// True if every `Soil_Type1..Soil_Type40` column is present.
pub fn is_forest_cover(feature_names: &[String]) -> bool {
    (1..=SOIL_COUNT).all(|i| {
        let name = format!("{}{}", SOIL_PREFIX, i);
        feature_names.iter().any(|n| *n == name)
    })
}

fn is_soil_column(name: &str) -> bool {
    name.strip_prefix(SOIL_PREFIX)
        .and_then(|rest| rest.parse::<usize>().ok())
        .map_or(false, |i| (1..=SOIL_COUNT).contains(&i))
}

/// One derived column, expressed over source column names
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FeatureOp {
    Original(String),
    Add(String, String),
    Subtract(String, String),
    Multiply(String, String),
    /// Percentile rank against the sorted training values
    Percentile { column: String, reference: Vec<f64> },
}

impl FeatureOp {
    pub fn name(&self) -> String {
        match self {
            FeatureOp::Original(c) => c.clone(),
            FeatureOp::Add(a, b) => format!("{} + {}", a, b),
            FeatureOp::Subtract(a, b) => format!("{} - {}", a, b),
            FeatureOp::Multiply(a, b) => format!("{} * {}", a, b),
            FeatureOp::Percentile { column, .. } => format!("PERCENTILE({})", column),
        }
    }

    fn sources(&self) -> Vec<&str> {
        match self {
            FeatureOp::Original(c) | FeatureOp::Percentile { column: c, .. } => vec![c],
            FeatureOp::Add(a, b) | FeatureOp::Subtract(a, b) | FeatureOp::Multiply(a, b) => {
                vec![a, b]
            }
        }
    }

    fn evaluate(&self, x: &Array2<f64>, names: &[String]) -> Vec<f64> {
        let column = |name: &str| {
            let idx = names.iter().position(|n| n == name).unwrap_or_default();
            x.column(idx)
        };
        match self {
            FeatureOp::Original(c) => column(c).to_vec(),
            FeatureOp::Add(a, b) => (&column(a) + &column(b)).to_vec(),
            FeatureOp::Subtract(a, b) => (&column(a) - &column(b)).to_vec(),
            FeatureOp::Multiply(a, b) => (&column(a) * &column(b)).to_vec(),
            FeatureOp::Percentile { column: c, reference } => column(c)
                .iter()
                .map(|&v| percentile_rank(reference, v))
                .collect(),
        }
    }
}

/// Average-rank percentile of `value` within sorted `reference`.
fn percentile_rank(reference: &[f64], value: f64) -> f64 {
    if reference.is_empty() {
        return 0.0;
    }
    let below = reference.partition_point(|&r| r < value);
    let at_or_below = reference.partition_point(|&r| r <= value);
    let rank = (below + 1 + at_or_below) as f64 / 2.0;
    rank.min(reference.len() as f64) / reference.len() as f64
}

/// Replayable list of derived columns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecipe {
    ops: Vec<FeatureOp>,
}

impl FeatureRecipe {
    /// Synthesize candidates from `dataset`, then drop correlated ones.
    pub fn fit(dataset: &Dataset) -> Result<Self> {
        if !is_forest_cover(&dataset.feature_names) {
            return Err(CanopyError::ConfigurationError(
                "automatic feature engineering is only available for the Forest Cover Type dataset"
                    .to_string(),
            ));
        }

        let x = &dataset.features;
        let names = &dataset.feature_names;
        let (mut binary, mut numeric) = (Vec::new(), Vec::new());
        for (j, name) in names.iter().enumerate() {
            if is_soil_column(name) || name == ID_COLUMN {
                continue;
            }
            if x.column(j).iter().all(|&v| v == 0.0 || v == 1.0) {
                binary.push(name.clone());
            } else {
                numeric.push(name.clone());
            }
        }
        debug!("{} numeric and {} binary source columns", numeric.len(), binary.len());

        let mut candidates: Vec<FeatureOp> = names
            .iter()
            .filter(|n| !is_soil_column(n))
            .map(|n| FeatureOp::Original(n.clone()))
            .collect();
        for (i, a) in numeric.iter().enumerate() {
            for b in &numeric[i + 1..] {
                candidates.push(FeatureOp::Add(a.clone(), b.clone()));
                candidates.push(FeatureOp::Subtract(a.clone(), b.clone()));
            }
        }
        for a in &numeric {
            for b in &binary {
                candidates.push(FeatureOp::Multiply(a.clone(), b.clone()));
            }
        }
        for a in &numeric {
            let idx = dataset
                .column_index(a)
                .ok_or_else(|| CanopyError::MissingColumnError(a.clone()))?;
            let mut reference = x.column(idx).to_vec();
            reference.sort_by(|p, q| p.total_cmp(q));
            candidates.push(FeatureOp::Percentile {
                column: a.clone(),
                reference,
            });
        }

        let candidate_recipe = FeatureRecipe { ops: candidates };
        let matrix = candidate_recipe.evaluate(x, names)?;
        let kept = correlation_filter(&matrix, CORRELATION_THRESHOLD);

        let mut ops: Vec<FeatureOp> = kept
            .into_iter()
            .map(|j| candidate_recipe.ops[j].clone())
            .collect();
        ops.extend(
            names
                .iter()
                .filter(|n| is_soil_column(n))
                .map(|n| FeatureOp::Original(n.clone())),
        );

        info!(
            "Feature engineering: {} candidates, {} features kept",
            candidate_recipe.ops.len() + SOIL_COUNT,
            ops.len()
        );
        Ok(FeatureRecipe { ops })
    }

    pub fn feature_names(&self) -> Vec<String> {
        self.ops.iter().map(FeatureOp::name).collect()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Compute every recipe column over `x`, whose columns are named `names`.
    pub fn evaluate(&self, x: &Array2<f64>, names: &[String]) -> Result<Array2<f64>> {
        for op in &self.ops {
            for source in op.sources() {
                if !names.iter().any(|n| n == source) {
                    return Err(CanopyError::MissingColumnError(source.to_string()));
                }
            }
        }

        let columns: Vec<Vec<f64>> = self
            .ops
            .par_iter()
            .map(|op| op.evaluate(x, names))
            .collect();

        Ok(Array2::from_shape_fn((x.nrows(), columns.len()), |(r, c)| {
            columns[c][r]
        }))
    }

    /// Replace a dataset's features with the recipe's columns.
    pub fn apply(&self, dataset: &Dataset) -> Result<Dataset> {
        Ok(Dataset {
            features: self.evaluate(&dataset.features, &dataset.feature_names)?,
            target: dataset.target.clone(),
            feature_names: self.feature_names(),
            target_column: dataset.target_column.clone(),
        })
    }
}

/// Dataset ready for training plus what is needed to rebuild its features
/// from raw input columns.
#[derive(Debug, Clone)]
pub struct PreparedData {
    pub dataset: Dataset,
    /// Feature columns of the raw file, before any synthesis
    pub input_columns: Vec<String>,
    pub recipe: Option<FeatureRecipe>,
}

impl PreparedData {
    pub fn raw(dataset: Dataset) -> Self {
        Self {
            input_columns: dataset.feature_names.clone(),
            dataset,
            recipe: None,
        }
    }

    /// Fit a recipe on the raw dataset and apply it.
    pub fn engineered(dataset: Dataset) -> Result<Self> {
        let recipe = FeatureRecipe::fit(&dataset)?;
        Ok(Self {
            input_columns: dataset.feature_names.clone(),
            dataset: recipe.apply(&dataset)?,
            recipe: Some(recipe),
        })
    }

    pub fn is_engineered(&self) -> bool {
        self.recipe.is_some()
    }
}

/// Indices of columns kept after dropping any column whose absolute
/// correlation with an earlier kept column exceeds `threshold`.
pub fn correlation_filter(x: &Array2<f64>, threshold: f64) -> Vec<usize> {
    let standardized: Vec<Option<Vec<f64>>> = x
        .axis_iter(Axis(1))
        .into_par_iter()
        .map(|col| standardize(col))
        .collect();

    let mut kept: Vec<usize> = Vec::new();
    for (j, candidate) in standardized.iter().enumerate() {
        let Some(candidate) = candidate else {
            // Constant columns have no defined correlation
            kept.push(j);
            continue;
        };
        let redundant = kept.par_iter().any(|&k| {
            standardized[k].as_ref().map_or(false, |other| {
                let corr: f64 = candidate.iter().zip(other).map(|(a, b)| a * b).sum::<f64>()
                    / candidate.len() as f64;
                corr.abs() > threshold
            })
        });
        if !redundant {
            kept.push(j);
        }
    }
    kept
}

/// Zero-mean, unit-variance copy of a column, or `None` if it is constant.
fn standardize(col: ArrayView1<f64>) -> Option<Vec<f64>> {
    let mean = col.mean()?;
    let std = col.std(0.0);
    if std <= f64::EPSILON * mean.abs().max(1.0) {
        return None;
    }
    Some(col.iter().map(|v| (v - mean) / std).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array1};

    fn forest_like(rows: usize) -> Dataset {
        let mut names: Vec<String> = vec![
            "Id".into(),
            "Elevation".into(),
            "Slope".into(),
            "Wilderness_Area1".into(),
        ];
        names.extend((1..=40).map(|i| format!("Soil_Type{}", i)));

        let features = Array2::from_shape_fn((rows, names.len()), |(r, c)| match c {
            0 => r as f64 + 1.0,
            1 => 2000.0 + ((r * 37) % 101) as f64,
            2 => ((r * 13) % 17) as f64,
            3 => (r % 2) as f64,
            c => ((r + c) % 40 == 0) as u8 as f64,
        });
        let target = Array1::from_iter((0..rows).map(|r| (r % 3) as f64 + 1.0));
        Dataset {
            features,
            target,
            feature_names: names,
            target_column: "Cover_Type".into(),
        }
    }

    #[test]
    fn test_detects_forest_cover() {
        assert!(is_forest_cover(&forest_like(4).feature_names));
        let names = vec!["a".to_string(), "Soil_Type1".to_string()];
        assert!(!is_forest_cover(&names));
    }

    #[test]
    fn test_fit_rejects_other_datasets() {
        let dataset = Dataset {
            features: array![[1.0, 2.0], [3.0, 4.0]],
            target: array![0.0, 1.0],
            feature_names: vec!["a".into(), "b".into()],
            target_column: "y".into(),
        };
        assert!(matches!(
            FeatureRecipe::fit(&dataset),
            Err(CanopyError::ConfigurationError(_))
        ));
    }

    #[test]
    fn test_recipe_keeps_soil_columns_last() {
        let dataset = forest_like(60);
        let recipe = FeatureRecipe::fit(&dataset).unwrap();
        let names = recipe.feature_names();

        assert_eq!(names[0], "Id");
        let tail: Vec<&String> = names.iter().rev().take(40).collect();
        assert!(tail.iter().all(|n| n.starts_with("Soil_Type")));
        assert!(names.iter().any(|n| n == "Slope * Wilderness_Area1"));

        let engineered = recipe.apply(&dataset).unwrap();
        assert_eq!(engineered.n_features(), recipe.len());
        assert_eq!(engineered.n_samples(), 60);
    }

    #[test]
    fn test_recipe_replays_on_new_rows() {
        let dataset = forest_like(60);
        let recipe = FeatureRecipe::fit(&dataset).unwrap();
        let subset = dataset.features.slice(ndarray::s![..5, ..]).to_owned();
        let replayed = recipe.evaluate(&subset, &dataset.feature_names).unwrap();
        let full = recipe.apply(&dataset).unwrap();
        assert_eq!(replayed, full.features.slice(ndarray::s![..5, ..]).to_owned());
    }

    #[test]
    fn test_replay_requires_source_columns() {
        let recipe = FeatureRecipe {
            ops: vec![FeatureOp::Add("a".into(), "b".into())],
        };
        let err = recipe.evaluate(&array![[1.0]], &["a".to_string()]).unwrap_err();
        assert!(matches!(err, CanopyError::MissingColumnError(name) if name == "b"));
    }

    #[test]
    fn test_correlation_filter_drops_duplicates() {
        let x = array![
            [1.0, 2.0, 5.0, 3.0],
            [2.0, 4.0, 1.0, 3.0],
            [3.0, 6.0, 4.0, 3.0],
            [4.0, 8.0, 2.0, 3.0]
        ];
        assert_eq!(correlation_filter(&x, 0.96), vec![0, 2, 3]);
    }

    #[test]
    fn test_percentile_rank_averages_ties() {
        let reference = vec![1.0, 2.0, 2.0, 4.0];
        assert_eq!(percentile_rank(&reference, 1.0), 0.25);
        assert_eq!(percentile_rank(&reference, 2.0), 0.625);
        assert_eq!(percentile_rank(&reference, 4.0), 1.0);
        assert_eq!(percentile_rank(&reference, 9.0), 1.0);
    }

    #[test]
    fn test_prepared_data_keeps_input_columns() {
        let dataset = forest_like(60);
        let raw_names = dataset.feature_names.clone();
        let prepared = PreparedData::engineered(dataset).unwrap();
        assert!(prepared.is_engineered());
        assert_eq!(prepared.input_columns, raw_names);
        assert_ne!(prepared.dataset.feature_names, raw_names);
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!("AUTO".parse::<FeatEngMode>().unwrap(), FeatEngMode::Auto);
        assert!("complicated".parse::<FeatEngMode>().is_err());
    }
}
