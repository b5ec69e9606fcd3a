//! Dataset loading
//!
//! Reads a headered CSV with polars and splits it into a feature matrix and
//! a target vector. Every non-target column becomes a feature.

use crate::error::{CanopyError, Result};
use crate::paths;
use ndarray::{Array1, Array2};
use polars::prelude::*;
use std::path::Path;
use tracing::{debug, info};

/// Features and target of a loaded dataset
#[derive(Debug, Clone)]
pub struct Dataset {
    pub features: Array2<f64>,
    pub target: Array1<f64>,
    pub feature_names: Vec<String>,
    pub target_column: String,
}

impl Dataset {
    pub fn n_samples(&self) -> usize {
        self.features.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.features.ncols()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.feature_names.iter().position(|n| n == name)
    }

    /// Distinct target labels, sorted
    pub fn classes(&self) -> Vec<f64> {
        crate::models::encode_labels(&self.target).0
    }
}

/// Read a CSV file into a DataFrame.
pub fn read_frame(path: impl AsRef<Path>) -> Result<DataFrame> {
    let resolved = paths::require_file(path)?;
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(1000))
        .try_into_reader_with_file_path(Some(resolved.clone()))?
        .finish()?;
    debug!(
        "Read {} rows x {} columns from {}",
        df.height(),
        df.width(),
        resolved.display()
    );
    Ok(df)
}

/// Column names of a CSV file, read from its header.
pub fn read_header(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let resolved = paths::require_file(path)?;
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_n_rows(Some(1))
        .try_into_reader_with_file_path(Some(resolved))?
        .finish()?;
    Ok(column_names(&df))
}

pub fn column_names(df: &DataFrame) -> Vec<String> {
    df.get_column_names()
        .into_iter()
        .map(|s| s.to_string())
        .collect()
}

/// Load `path` and split off `target` as the label column.
pub fn load_data(path: impl AsRef<Path>, target: &str) -> Result<Dataset> {
    let df = read_frame(&path)?;
    let dataset = split_frame(&df, target)?;
    info!(
        "Loaded {} samples with {} features, target '{}'",
        dataset.n_samples(),
        dataset.n_features(),
        target
    );
    Ok(dataset)
}

/// Split an in-memory frame into features and target.
pub fn split_frame(df: &DataFrame, target: &str) -> Result<Dataset> {
    let names = column_names(df);
    if !names.iter().any(|n| n == target) {
        return Err(CanopyError::MissingColumnError(target.to_string()));
    }

    let feature_names: Vec<String> = names.into_iter().filter(|n| n != target).collect();
    let features = columns_to_array2(df, &feature_names)?;
    let target_values = column_values(df, target)?;

    Ok(Dataset {
        features,
        target: Array1::from_vec(target_values),
        feature_names,
        target_column: target.to_string(),
    })
}

/// Extract one column as `f64`; non-numeric or missing values are errors.
pub fn column_values(df: &DataFrame, name: &str) -> Result<Vec<f64>> {
    let column = df
        .column(name)
        .map_err(|_| CanopyError::MissingColumnError(name.to_string()))?;
    let series = column
        .as_materialized_series()
        .strict_cast(&DataType::Float64)
        .map_err(|_| CanopyError::DataError(format!("column '{}' is not numeric", name)))?;

    series
        .f64()?
        .into_iter()
        .map(|v| {
            v.ok_or_else(|| CanopyError::DataError(format!("column '{}' has missing values", name)))
        })
        .collect()
}

/// Extract named columns into a row-major `Array2<f64>`.
pub fn columns_to_array2(df: &DataFrame, names: &[String]) -> Result<Array2<f64>> {
    let n_rows = df.height();
    let col_data: Vec<Vec<f64>> = names
        .iter()
        .map(|name| column_values(df, name))
        .collect::<Result<_>>()?;

    Ok(Array2::from_shape_fn((n_rows, names.len()), |(r, c)| {
        col_data[c][r]
    }))
}
