//! canopy - interactive shell for tabular classification
//!
//! The crate turns shell commands into a configured, cross-validated and
//! tracked scikit-style pipeline.
//!
//! # Modules
//!
//! ## Parameter ingestion
//! - [`paths`] - path resolution and existence/extension checks
//! - [`params`] - token coercion, parameter schemas, merge and validation
//!
//! ## Modelling
//! - [`models`] - classifier factory (logistic regression, tree, forest, kNN)
//! - [`preprocessing`] - scalers and dimensionality reduction
//! - [`pipeline`] - scaler → reducer → classifier composition
//! - [`feateng`] - Forest Cover Type feature synthesis
//! - [`training`] - cross-validation, metrics, tracked training, grid search
//!
//! ## Session and I/O
//! - [`data`] - CSV loading
//! - [`persist`] - pipeline dump/load and CSV prediction export
//! - [`tracking`] - local experiment tracking
//! - [`config`] - session configuration
//! - [`session`] - mutable session state behind the shell commands
//!
//! ## Front ends
//! - [`shell`] - command grammar and interactive loop
//! - [`cli`] - process arguments and terminal styling

pub mod error;

pub mod paths;
pub mod params;

pub mod models;
pub mod preprocessing;
pub mod pipeline;
pub mod feateng;
pub mod training;

pub mod data;
pub mod persist;
pub mod tracking;
pub mod config;
pub mod session;

pub mod shell;
pub mod cli;

pub use error::{CanopyError, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{CanopyError, Result};
    pub use crate::models::{new_model, Algorithm, Classifier, ParamSource};
    pub use crate::params::{coerce, merge_and_validate, ParamMap, ParamValue};
    pub use crate::pipeline::{build_pipeline, Pipeline};
    pub use crate::preprocessing::{DimReductKind, ScalerKind};
    pub use crate::session::{FeatEngOutcome, Session};
    pub use crate::training::{Scores, TrainReport};
}
