//! Logistic regression
//!
//! Multiclass problems are handled one-vs-rest: one binary model per class,
//! trained in parallel, with the per-class scores normalized into a
//! probability distribution.

use super::{encode_labels, param_bool, param_f64, param_usize};
use crate::error::{CanopyError, Result};
use crate::params::{ParamMap, ParamValue};
use ndarray::{Array1, Array2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// L2-regularized logistic regression fitted by gradient descent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegression {
    /// Inverse regularization strength
    pub c: f64,
    /// Maximum iterations
    pub max_iter: usize,
    /// Convergence tolerance on the gradient norm
    pub tol: f64,
    /// Learning rate
    pub learning_rate: f64,
    /// Whether to fit intercept
    pub fit_intercept: bool,
    /// One coefficient row per class
    coefficients: Option<Array2<f64>>,
    intercepts: Option<Array1<f64>>,
    classes: Vec<f64>,
}

impl Default for LogisticRegression {
    fn default() -> Self {
        Self::new()
    }
}

impl LogisticRegression {
    pub fn new() -> Self {
        Self {
            c: 1.0,
            max_iter: 100,
            tol: 1e-4,
            learning_rate: 0.1,
            fit_intercept: true,
            coefficients: None,
            intercepts: None,
            classes: Vec::new(),
        }
    }

    /// Library defaults overridden by `params`.
    pub fn from_params(params: &ParamMap) -> Self {
        let defaults = Self::new();
        Self {
            c: param_f64(params, "c").unwrap_or(defaults.c),
            max_iter: param_usize(params, "max_iter").unwrap_or(defaults.max_iter),
            tol: param_f64(params, "tol").unwrap_or(defaults.tol),
            learning_rate: param_f64(params, "learning_rate").unwrap_or(defaults.learning_rate),
            fit_intercept: param_bool(params, "fit_intercept").unwrap_or(defaults.fit_intercept),
            ..defaults
        }
    }

    pub fn params(&self) -> ParamMap {
        let mut params = ParamMap::new();
        params.insert("c".into(), ParamValue::Float(self.c));
        params.insert("max_iter".into(), ParamValue::Int(self.max_iter as i64));
        params.insert("tol".into(), ParamValue::Float(self.tol));
        params.insert("learning_rate".into(), ParamValue::Float(self.learning_rate));
        params.insert("fit_intercept".into(), ParamValue::Bool(self.fit_intercept));
        params
    }

    pub fn classes(&self) -> &[f64] {
        &self.classes
    }

    /// Numerically stable sigmoid
    fn sigmoid(z: f64) -> f64 {
        if z >= 0.0 {
            1.0 / (1.0 + (-z).exp())
        } else {
            let e = z.exp();
            e / (1.0 + e)
        }
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        let (classes, encoded) = encode_labels(y);
        if classes.len() < 2 {
            return Err(CanopyError::TrainingError(
                "logistic regression needs at least two classes".to_string(),
            ));
        }

        let n_samples = x.nrows() as f64;
        let alpha = 1.0 / (self.c * n_samples);

        let fitted: Vec<(Array1<f64>, f64)> = (0..classes.len())
            .into_par_iter()
            .map(|class_idx| {
                let target: Array1<f64> = encoded
                    .iter()
                    .map(|&c| if c == class_idx { 1.0 } else { 0.0 })
                    .collect();
                self.fit_binary(x, &target, alpha)
            })
            .collect();

        let n_features = x.ncols();
        let mut coefficients = Array2::zeros((classes.len(), n_features));
        let mut intercepts = Array1::zeros(classes.len());
        for (i, (weights, bias)) in fitted.into_iter().enumerate() {
            coefficients.row_mut(i).assign(&weights);
            intercepts[i] = bias;
        }

        self.coefficients = Some(coefficients);
        self.intercepts = Some(intercepts);
        self.classes = classes;
        Ok(())
    }

    fn fit_binary(&self, x: &Array2<f64>, y: &Array1<f64>, alpha: f64) -> (Array1<f64>, f64) {
        let n_samples = x.nrows() as f64;
        let mut weights = Array1::zeros(x.ncols());
        let mut bias = 0.0;
        let lr = self.learning_rate;

        for _iter in 0..self.max_iter {
            let linear = x.dot(&weights) + bias;
            let errors = linear.mapv(Self::sigmoid) - y;

            let dw = (x.t().dot(&errors) / n_samples) + (alpha * &weights);
            let db = if self.fit_intercept {
                errors.mean().unwrap_or(0.0)
            } else {
                0.0
            };

            let grad_norm = (dw.mapv(|v| v * v).sum() + db * db).sqrt();
            if grad_norm < self.tol {
                break;
            }

            weights = weights - lr * dw;
            bias -= lr * db;
        }

        (weights, bias)
    }

    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let (coefficients, intercepts) = match (&self.coefficients, &self.intercepts) {
            (Some(c), Some(i)) => (c, i),
            _ => return Err(CanopyError::ModelNotFitted),
        };
        if x.ncols() != coefficients.ncols() {
            return Err(CanopyError::ShapeError {
                expected: format!("{} features", coefficients.ncols()),
                actual: format!("{} features", x.ncols()),
            });
        }

        let mut scores = (x.dot(&coefficients.t()) + intercepts).mapv(Self::sigmoid);
        for mut row in scores.axis_iter_mut(Axis(0)) {
            let total = row.sum();
            if total > 0.0 {
                row.mapv_inplace(|p| p / total);
            } else {
                row.fill(1.0 / coefficients.nrows() as f64);
            }
        }
        Ok(scores)
    }
}
