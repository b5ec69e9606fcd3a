//! Dimensionality reduction: PCA and LDA
//!
//! Both reducers extract eigenvectors with power iteration and deflation.
//! LDA first whitens the within-class scatter through its Cholesky factor so
//! the generalized problem becomes a symmetric one.

use crate::error::{CanopyError, Result};
use crate::models::encode_labels;
use ndarray::{Array1, Array2, Axis};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

const MAX_ITER: usize = 300;
const TOL: f64 = 1e-10;

/// Type of dimensionality reducer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DimReductKind {
    #[default]
    None,
    /// Principal component analysis
    Pca,
    /// Linear discriminant analysis
    Lda,
}

impl DimReductKind {
    pub const NAMES: [&'static str; 3] = ["none", "pca", "lda"];

    pub fn as_str(&self) -> &'static str {
        match self {
            DimReductKind::None => "none",
            DimReductKind::Pca => "pca",
            DimReductKind::Lda => "lda",
        }
    }
}

impl fmt::Display for DimReductKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DimReductKind {
    type Err = CanopyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(DimReductKind::None),
            "pca" => Ok(DimReductKind::Pca),
            "lda" => Ok(DimReductKind::Lda),
            other => Err(CanopyError::ConfigurationError(format!(
                "unknown dimensionality reduction '{}', expected one of {}",
                other,
                Self::NAMES.join(", ")
            ))),
        }
    }
}

/// Fitted linear projection
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Projection {
    mean: Array1<f64>,
    /// n_features x n_components
    components: Array2<f64>,
    explained_variance_ratio: Vec<f64>,
}

/// Linear dimensionality reducer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reducer {
    kind: DimReductKind,
    random_state: u64,
    projection: Option<Projection>,
}

impl Reducer {
    pub fn new(kind: DimReductKind) -> Self {
        Self {
            kind,
            random_state: 42,
            projection: None,
        }
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    pub fn kind(&self) -> DimReductKind {
        self.kind
    }

    pub fn n_components(&self) -> Option<usize> {
        self.projection.as_ref().map(|p| p.components.ncols())
    }

    pub fn explained_variance_ratio(&self) -> Option<&[f64]> {
        self.projection
            .as_ref()
            .map(|p| p.explained_variance_ratio.as_slice())
    }

    /// Fit the projection. `y` is only consulted by LDA.
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        if x.nrows() < 2 {
            return Err(CanopyError::DataError(
                "dimensionality reduction requires at least 2 samples".to_string(),
            ));
        }

        let projection = match self.kind {
            DimReductKind::None => {
                let d = x.ncols();
                Projection {
                    mean: Array1::zeros(d),
                    components: Array2::eye(d),
                    explained_variance_ratio: Vec::new(),
                }
            }
            DimReductKind::Pca => self.fit_pca(x)?,
            DimReductKind::Lda => self.fit_lda(x, y)?,
        };
        debug!(
            "Fitted {} projection: {} -> {} features",
            self.kind,
            x.ncols(),
            projection.components.ncols()
        );
        self.projection = Some(projection);
        Ok(self)
    }

    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let projection = self.projection.as_ref().ok_or(CanopyError::ModelNotFitted)?;
        if x.ncols() != projection.mean.len() {
            return Err(CanopyError::ShapeError {
                expected: format!("{} columns", projection.mean.len()),
                actual: format!("{} columns", x.ncols()),
            });
        }
        Ok((x - &projection.mean).dot(&projection.components))
    }

    pub fn fit_transform(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<Array2<f64>> {
        self.fit(x, y)?;
        self.transform(x)
    }

    fn fit_pca(&self, x: &Array2<f64>) -> Result<Projection> {
        let n = x.nrows();
        let d = x.ncols();
        let mean = x.mean_axis(Axis(0)).ok_or_else(|| {
            CanopyError::DataError("cannot center an empty matrix".to_string())
        })?;
        let centered = x - &mean;
        let cov = centered.t().dot(&centered) / (n as f64 - 1.0).max(1.0);

        let total_variance = cov.diag().sum().max(1e-12);
        let k = d.min(n);
        let (eigenvalues, components) = power_iteration(&cov, k, self.random_state);

        let explained_variance_ratio = eigenvalues
            .iter()
            .map(|&ev| (ev / total_variance).max(0.0))
            .collect();

        Ok(Projection {
            mean,
            components,
            explained_variance_ratio,
        })
    }

    fn fit_lda(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<Projection> {
        let n = x.nrows();
        let d = x.ncols();
        let (classes, labels) = encode_labels(y);
        if classes.len() < 2 {
            return Err(CanopyError::DataError(
                "LDA requires at least two classes".to_string(),
            ));
        }

        let mean = x.mean_axis(Axis(0)).ok_or_else(|| {
            CanopyError::DataError("cannot center an empty matrix".to_string())
        })?;

        let mut class_sums = Array2::<f64>::zeros((classes.len(), d));
        let mut class_counts = vec![0usize; classes.len()];
        for (row, &label) in x.rows().into_iter().zip(labels.iter()) {
            let mut acc = class_sums.row_mut(label);
            acc += &row;
            class_counts[label] += 1;
        }

        let mut within = Array2::<f64>::zeros((d, d));
        let mut between = Array2::<f64>::zeros((d, d));
        for (c, &count) in class_counts.iter().enumerate() {
            let class_mean = class_sums.row(c).mapv(|v| v / count.max(1) as f64);
            let offset = (&class_mean - &mean).insert_axis(Axis(1));
            between = between + (count as f64 / n as f64) * offset.dot(&offset.t());

            let members: Vec<usize> = labels
                .iter()
                .enumerate()
                .filter(|(_, &l)| l == c)
                .map(|(i, _)| i)
                .collect();
            let centered = x.select(Axis(0), &members) - &class_mean;
            within = within + centered.t().dot(&centered) / n as f64;
        }

        let chol = cholesky(&within).ok_or_else(|| {
            CanopyError::TrainingError("within-class scatter is not positive definite".to_string())
        })?;

        // M = L^-1 Sb L^-T is symmetric with the same eigenvalues as Sw^-1 Sb
        let half = forward_solve_columns(&chol, &between);
        let whitened = forward_solve_columns(&chol, &half.t().to_owned());

        let k = (classes.len() - 1).min(d);
        let (eigenvalues, vectors) = power_iteration(&whitened, k, self.random_state);
        let components = backward_solve_columns(&chol, &vectors);

        let total = eigenvalues.iter().sum::<f64>().max(1e-12);
        Ok(Projection {
            mean,
            components,
            explained_variance_ratio: eigenvalues.iter().map(|ev| ev / total).collect(),
        })
    }
}

/// Top-`k` eigenpairs of a symmetric matrix, eigenvectors as columns.
///
/// Extraction stops early once the deflated matrix carries no variance.
fn power_iteration(matrix: &Array2<f64>, k: usize, seed: u64) -> (Vec<f64>, Array2<f64>) {
    let d = matrix.nrows();
    let mut work = matrix.clone();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let initial_trace = matrix.diag().iter().map(|v| v.abs()).sum::<f64>().max(1e-300);

    let mut eigenvalues = Vec::with_capacity(k);
    let mut vectors: Vec<Array1<f64>> = Vec::with_capacity(k);

    for _component in 0..k {
        if work.diag().iter().map(|v| v.abs()).sum::<f64>() / initial_trace < 1e-12 {
            break;
        }

        let mut v: Array1<f64> = (0..d).map(|_| rng.gen_range(-1.0..1.0)).collect();
        let norm = v.dot(&v).sqrt().max(1e-12);
        v /= norm;

        let mut eigenvalue = 0.0f64;
        for _iter in 0..MAX_ITER {
            let w = work.dot(&v);
            let new_eigenvalue = v.dot(&w);
            let w_norm = w.dot(&w).sqrt().max(1e-12);
            let new_v = w / w_norm;

            let diff = (&v - &new_v).mapv(|x| x * x).sum().sqrt();
            v = new_v;
            eigenvalue = new_eigenvalue;
            if diff < TOL {
                break;
            }
        }

        eigenvalue = eigenvalue.max(0.0);
        let outer = v
            .view()
            .insert_axis(Axis(1))
            .dot(&v.view().insert_axis(Axis(0)));
        work = work - eigenvalue * outer;

        eigenvalues.push(eigenvalue);
        vectors.push(v);
    }

    let mut columns = Array2::zeros((d, vectors.len()));
    for (j, v) in vectors.iter().enumerate() {
        columns.column_mut(j).assign(v);
    }
    (eigenvalues, columns)
}

/// Lower Cholesky factor, retried once with a small ridge.
fn cholesky(a: &Array2<f64>) -> Option<Array2<f64>> {
    factor(a).or_else(|| {
        let n = a.nrows();
        let ridge = 1e-6 * a.diag().iter().map(|v| v.abs()).sum::<f64>() / n.max(1) as f64 + 1e-12;
        let regularized = a + &(Array2::<f64>::eye(n) * ridge);
        factor(&regularized)
    })
}

fn factor(a: &Array2<f64>) -> Option<Array2<f64>> {
    let n = a.nrows();
    let mut l = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        for j in 0..=i {
            let mut sum = 0.0;
            for k in 0..j {
                sum += l[[i, k]] * l[[j, k]];
            }
            if i == j {
                let diag = a[[i, i]] - sum;
                if diag <= 0.0 {
                    return None;
                }
                l[[i, j]] = diag.sqrt();
            } else {
                l[[i, j]] = (a[[i, j]] - sum) / l[[j, j]];
            }
        }
    }
    Some(l)
}

/// Solve `L X = B` column by column.
fn forward_solve_columns(l: &Array2<f64>, b: &Array2<f64>) -> Array2<f64> {
    let n = l.nrows();
    let mut out = Array2::<f64>::zeros(b.raw_dim());
    for col in 0..b.ncols() {
        for i in 0..n {
            let mut sum = 0.0;
            for j in 0..i {
                sum += l[[i, j]] * out[[j, col]];
            }
            out[[i, col]] = (b[[i, col]] - sum) / l[[i, i]];
        }
    }
    out
}

/// Solve `L^T X = B` column by column.
fn backward_solve_columns(l: &Array2<f64>, b: &Array2<f64>) -> Array2<f64> {
    let n = l.nrows();
    let mut out = Array2::<f64>::zeros(b.raw_dim());
    for col in 0..b.ncols() {
        for i in (0..n).rev() {
            let mut sum = 0.0;
            for j in (i + 1)..n {
                sum += l[[j, i]] * out[[j, col]];
            }
            out[[i, col]] = (b[[i, col]] - sum) / l[[i, i]];
        }
    }
    out
}
