//! Persisting fitted pipelines and exporting predictions

use crate::data;
use crate::error::{CanopyError, Result};
use crate::feateng::{FeatureRecipe, PreparedData};
use crate::models::Algorithm;
use crate::params::ParamMap;
use crate::paths;
use crate::pipeline::Pipeline;
use chrono::{DateTime, Utc};
use ndarray::Array1;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing::info;

const ID_COLUMN: &str = "Id";

/// A fitted pipeline together with what is needed to feed it raw rows
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainedModel {
    pub pipeline: Pipeline,
    pub algorithm: Algorithm,
    pub params: ParamMap,
    /// Raw feature columns expected in prediction input
    pub input_columns: Vec<String>,
    pub recipe: Option<FeatureRecipe>,
    pub target_column: String,
    pub trained_at: DateTime<Utc>,
}

impl TrainedModel {
    pub fn new(pipeline: Pipeline, algorithm: Algorithm, params: ParamMap, prepared: &PreparedData) -> Self {
        Self {
            pipeline,
            algorithm,
            params,
            input_columns: prepared.input_columns.clone(),
            recipe: prepared.recipe.clone(),
            target_column: prepared.dataset.target_column.clone(),
            trained_at: Utc::now(),
        }
    }

    /// Predict labels for the rows of `df`, which must carry every input column.
    pub fn predict_frame(&self, df: &DataFrame) -> Result<Array1<f64>> {
        let available = data::column_names(df);
        if let Some(missing) = self.input_columns.iter().find(|c| !available.contains(c)) {
            return Err(CanopyError::MissingColumnError(missing.clone()));
        }

        let raw = data::columns_to_array2(df, &self.input_columns)?;
        let x = match &self.recipe {
            Some(recipe) => recipe.evaluate(&raw, &self.input_columns)?,
            None => raw,
        };
        self.pipeline.predict(&x)
    }
}

/// Serialize `model` to `path`, which must end in `.bin` inside an existing directory.
pub fn dump_pipeline(model: &TrainedModel, path: impl AsRef<Path>) -> Result<PathBuf> {
    paths::require_extension(&path, "bin")?;
    let resolved = paths::require_parent_dir(&path)?;

    let writer = BufWriter::new(File::create(&resolved)?);
    bincode::serialize_into(writer, model)?;
    info!("Dumped {} pipeline to {}", model.algorithm, resolved.display());
    Ok(resolved)
}

pub fn load_pipeline(path: impl AsRef<Path>) -> Result<TrainedModel> {
    let resolved = paths::require_file(&path)?;
    let reader = BufReader::new(File::open(&resolved)?);
    Ok(bincode::deserialize_from(reader)?)
}

/// Predict every row of the CSV at `input` and write `export` with the `Id`
/// column (when the input has one) and the predicted target column.
pub fn predict_to_csv(model: &TrainedModel, input: impl AsRef<Path>, export: impl AsRef<Path>) -> Result<usize> {
    paths::require_extension(&export, "csv")?;
    let export = paths::require_parent_dir(&export)?;

    let df = data::read_frame(input)?;
    let predictions = model.predict_frame(&df)?;
    let ids = if data::column_names(&df).iter().any(|c| c == ID_COLUMN) {
        Some(data::column_values(&df, ID_COLUMN)?)
    } else {
        None
    };

    let mut columns: Vec<Column> = Vec::with_capacity(2);
    if let Some(ids) = ids {
        columns.push(as_label_column(ID_COLUMN, ids.into_iter()));
    }
    columns.push(as_label_column(&model.target_column, predictions.iter().copied()));
    let mut out = DataFrame::new(columns)?;

    let mut file = File::create(&export)?;
    CsvWriter::new(&mut file).include_header(true).finish(&mut out)?;
    info!("Wrote {} predictions to {}", out.height(), export.display());
    Ok(out.height())
}

/// Integral values are written as integers, anything else as floats.
fn as_label_column(name: &str, values: impl Iterator<Item = f64>) -> Column {
    let values: Vec<f64> = values.collect();
    if values.iter().all(|v| v.fract() == 0.0 && v.abs() < i64::MAX as f64) {
        let ints: Vec<i64> = values.iter().map(|&v| v as i64).collect();
        Series::new(name.into(), ints).into()
    } else {
        Series::new(name.into(), values).into()
    }
}
