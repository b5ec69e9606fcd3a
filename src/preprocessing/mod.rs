//! Data preprocessing module
//!
//! Pipeline stages that run before the classifier:
//! - Feature scaling (standard, min-max, max-abs, robust)
//! - Dimensionality reduction (PCA, LDA)

pub mod reduction;
pub mod scaler;

pub use reduction::{DimReductKind, Reducer};
pub use scaler::{Scaler, ScalerKind};
