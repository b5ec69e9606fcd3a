//! Feature scaling implementations

use crate::error::{CanopyError, Result};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Type of scaler to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalerKind {
    /// No scaling
    #[default]
    None,
    /// Standard scaling (z-score normalization): (x - mean) / std
    Standard,
    /// Min-Max scaling: (x - min) / (max - min)
    MinMax,
    /// Max absolute scaling: x / max(|x|)
    MaxAbs,
    /// Robust scaling using median and IQR
    Robust,
}

impl ScalerKind {
    pub const NAMES: [&'static str; 5] = ["none", "standard", "minmax", "maxabs", "robust"];

    pub fn as_str(&self) -> &'static str {
        match self {
            ScalerKind::None => "none",
            ScalerKind::Standard => "standard",
            ScalerKind::MinMax => "minmax",
            ScalerKind::MaxAbs => "maxabs",
            ScalerKind::Robust => "robust",
        }
    }
}

impl fmt::Display for ScalerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScalerKind {
    type Err = CanopyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(ScalerKind::None),
            "standard" => Ok(ScalerKind::Standard),
            "minmax" => Ok(ScalerKind::MinMax),
            "maxabs" => Ok(ScalerKind::MaxAbs),
            "robust" => Ok(ScalerKind::Robust),
            other => Err(CanopyError::ConfigurationError(format!(
                "unknown scaler '{}', expected one of {}",
                other,
                Self::NAMES.join(", ")
            ))),
        }
    }
}

/// Per-column center and scale of a fitted scaler
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ScalerParams {
    center: Array1<f64>,
    scale: Array1<f64>,
}

/// Column-wise feature scaler
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scaler {
    kind: ScalerKind,
    params: Option<ScalerParams>,
}

impl Scaler {
    pub fn new(kind: ScalerKind) -> Self {
        Self { kind, params: None }
    }

    pub fn kind(&self) -> ScalerKind {
        self.kind
    }

    pub fn fit(&mut self, x: &Array2<f64>) -> Result<&mut Self> {
        if x.nrows() == 0 {
            return Err(CanopyError::DataError("cannot fit a scaler on zero rows".to_string()));
        }

        let (center, scale): (Vec<f64>, Vec<f64>) = x
            .axis_iter(Axis(1))
            .map(|column| self.compute_params(column))
            .unzip();

        self.params = Some(ScalerParams {
            center: Array1::from_vec(center),
            scale: Array1::from_vec(scale),
        });
        Ok(self)
    }

    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let params = self.params.as_ref().ok_or(CanopyError::ModelNotFitted)?;
        if x.ncols() != params.center.len() {
            return Err(CanopyError::ShapeError {
                expected: format!("{} columns", params.center.len()),
                actual: format!("{} columns", x.ncols()),
            });
        }
        Ok((x - &params.center) / &params.scale)
    }

    pub fn fit_transform(&mut self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.fit(x)?;
        self.transform(x)
    }

    /// `(center, scale)` for one column; a zero scale is replaced by 1.
    fn compute_params(&self, column: ArrayView1<f64>) -> (f64, f64) {
        let nonzero = |s: f64| if s == 0.0 || !s.is_finite() { 1.0 } else { s };

        match self.kind {
            ScalerKind::Standard => {
                let mean = column.mean().unwrap_or(0.0);
                (mean, nonzero(column.std(0.0)))
            }
            ScalerKind::MinMax => {
                let min = column.iter().copied().fold(f64::INFINITY, f64::min);
                let max = column.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                (min, nonzero(max - min))
            }
            ScalerKind::MaxAbs => {
                let max_abs = column.iter().fold(0.0f64, |a, b| a.max(b.abs()));
                (0.0, nonzero(max_abs))
            }
            ScalerKind::Robust => {
                let mut sorted: Vec<f64> = column.to_vec();
                sorted.sort_by(|a, b| a.total_cmp(b));
                let q1 = quantile(&sorted, 0.25);
                let q3 = quantile(&sorted, 0.75);
                (quantile(&sorted, 0.5), nonzero(q3 - q1))
            }
            ScalerKind::None => (0.0, 1.0),
        }
    }
}

/// Linear-interpolated quantile of sorted values
pub(crate) fn quantile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn column() -> Array2<f64> {
        array![[1.0], [2.0], [3.0], [4.0], [5.0]]
    }

    #[test]
    fn test_standard_scaler() {
        let mut scaler = Scaler::new(ScalerKind::Standard);
        let result = scaler.fit_transform(&column()).unwrap();
        assert_abs_diff_eq!(result.mean().unwrap(), 0.0, epsilon = 1e-10);
        assert_abs_diff_eq!(result.std(0.0), 1.0, epsilon = 1e-10);
    }

    #[test]
    fn test_minmax_scaler() {
        let mut scaler = Scaler::new(ScalerKind::MinMax);
        let result = scaler.fit_transform(&column()).unwrap();
        assert_abs_diff_eq!(result[[0, 0]], 0.0, epsilon = 1e-10);
        assert_abs_diff_eq!(result[[4, 0]], 1.0, epsilon = 1e-10);
    }

    #[test]
    fn test_maxabs_scaler() {
        let x = array![[-4.0], [2.0]];
        let mut scaler = Scaler::new(ScalerKind::MaxAbs);
        let result = scaler.fit_transform(&x).unwrap();
        assert_eq!(result, array![[-1.0], [0.5]]);
    }

    #[test]
    fn test_robust_scaler() {
        let mut scaler = Scaler::new(ScalerKind::Robust);
        let result = scaler.fit_transform(&column()).unwrap();
        // median 3, IQR 4 - 2
        assert_abs_diff_eq!(result[[4, 0]], 1.0, epsilon = 1e-10);
        assert_abs_diff_eq!(result[[2, 0]], 0.0, epsilon = 1e-10);
    }

    #[test]
    fn test_constant_column_is_safe() {
        let x = array![[7.0, 1.0], [7.0, 2.0]];
        let mut scaler = Scaler::new(ScalerKind::Standard);
        let result = scaler.fit_transform(&x).unwrap();
        assert!(result.iter().all(|v| v.is_finite()));
        assert_eq!(result[[0, 0]], 0.0);
    }

    #[test]
    fn test_parse_names() {
        for name in ScalerKind::NAMES {
            assert_eq!(name.parse::<ScalerKind>().unwrap().as_str(), name);
        }
        assert!("zscore".parse::<ScalerKind>().is_err());
    }

    #[test]
    fn test_transform_before_fit() {
        let scaler = Scaler::new(ScalerKind::Standard);
        assert!(matches!(scaler.transform(&column()), Err(CanopyError::ModelNotFitted)));
    }
}
