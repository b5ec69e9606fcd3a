//! Declarative per-algorithm parameter schemas
//!
//! Each algorithm lists the hyperparameters it accepts together with the
//! value kind and range. Validation is a pure lookup against these tables.

use super::{ParamMap, ParamValue};
use crate::error::{CanopyError, Result};
use crate::models::Algorithm;

/// Kind and range of a single hyperparameter
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamKind {
    /// Integer with an inclusive lower bound
    Int { min: i64 },
    /// Integer with an inclusive lower bound, or `none` for unbounded
    OptionalInt { min: i64 },
    /// Float strictly greater than `min_exclusive`; integers are widened
    Float { min_exclusive: f64 },
    Bool,
    /// One of a fixed set of strings
    Choice(&'static [&'static str]),
}

/// A named hyperparameter with its kind
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub help: &'static str,
}

const CRITERIA: &[&str] = &["gini", "entropy"];
const MAX_FEATURES: &[&str] = &["sqrt", "log2", "all"];
const WEIGHTS: &[&str] = &["uniform", "distance"];
const METRICS: &[&str] = &["euclidean", "manhattan", "cosine"];

const LOGIT: &[ParamSpec] = &[
    ParamSpec {
        name: "c",
        kind: ParamKind::Float { min_exclusive: 0.0 },
        help: "inverse regularization strength",
    },
    ParamSpec {
        name: "max_iter",
        kind: ParamKind::Int { min: 1 },
        help: "gradient descent iterations",
    },
    ParamSpec {
        name: "tol",
        kind: ParamKind::Float { min_exclusive: 0.0 },
        help: "convergence tolerance",
    },
    ParamSpec {
        name: "learning_rate",
        kind: ParamKind::Float { min_exclusive: 0.0 },
        help: "gradient step size",
    },
    ParamSpec {
        name: "fit_intercept",
        kind: ParamKind::Bool,
        help: "learn a bias term",
    },
];

const TREE: &[ParamSpec] = &[
    ParamSpec {
        name: "max_depth",
        kind: ParamKind::OptionalInt { min: 1 },
        help: "maximum tree depth",
    },
    ParamSpec {
        name: "min_samples_split",
        kind: ParamKind::Int { min: 2 },
        help: "minimum samples to split a node",
    },
    ParamSpec {
        name: "min_samples_leaf",
        kind: ParamKind::Int { min: 1 },
        help: "minimum samples in a leaf",
    },
    ParamSpec {
        name: "criterion",
        kind: ParamKind::Choice(CRITERIA),
        help: "split quality measure",
    },
];

const FOREST: &[ParamSpec] = &[
    ParamSpec {
        name: "n_estimators",
        kind: ParamKind::Int { min: 1 },
        help: "number of trees",
    },
    ParamSpec {
        name: "max_depth",
        kind: ParamKind::OptionalInt { min: 1 },
        help: "maximum tree depth",
    },
    ParamSpec {
        name: "min_samples_split",
        kind: ParamKind::Int { min: 2 },
        help: "minimum samples to split a node",
    },
    ParamSpec {
        name: "min_samples_leaf",
        kind: ParamKind::Int { min: 1 },
        help: "minimum samples in a leaf",
    },
    ParamSpec {
        name: "max_features",
        kind: ParamKind::Choice(MAX_FEATURES),
        help: "features considered per split",
    },
    ParamSpec {
        name: "bootstrap",
        kind: ParamKind::Bool,
        help: "sample rows with replacement per tree",
    },
    ParamSpec {
        name: "criterion",
        kind: ParamKind::Choice(CRITERIA),
        help: "split quality measure",
    },
];

const KNN: &[ParamSpec] = &[
    ParamSpec {
        name: "n_neighbors",
        kind: ParamKind::Int { min: 1 },
        help: "neighbors consulted per prediction",
    },
    ParamSpec {
        name: "weights",
        kind: ParamKind::Choice(WEIGHTS),
        help: "neighbor vote weighting",
    },
    ParamSpec {
        name: "metric",
        kind: ParamKind::Choice(METRICS),
        help: "distance function",
    },
];

/// Hyperparameters accepted by `algorithm`.
pub fn schema(algorithm: Algorithm) -> &'static [ParamSpec] {
    match algorithm {
        Algorithm::Logit => LOGIT,
        Algorithm::Tree => TREE,
        Algorithm::Forest => FOREST,
        Algorithm::Knn => KNN,
    }
}

/// Look up a single parameter spec by name.
pub fn lookup(algorithm: Algorithm, name: &str) -> Option<&'static ParamSpec> {
    schema(algorithm).iter().find(|spec| spec.name == name)
}

impl ParamSpec {
    /// Check `value` against this spec's kind and range.
    pub fn check(&self, value: &ParamValue) -> std::result::Result<(), String> {
        match (self.kind, value) {
            (ParamKind::Int { min }, ParamValue::Int(v))
            | (ParamKind::OptionalInt { min }, ParamValue::Int(v)) => {
                if *v >= min {
                    Ok(())
                } else {
                    Err(format!("must be at least {}, got {}", min, v))
                }
            }
            (ParamKind::OptionalInt { .. }, ParamValue::None) => Ok(()),
            (ParamKind::Float { min_exclusive }, v) if v.as_f64().is_some() => {
                let v = v.as_f64().unwrap_or_default();
                if v > min_exclusive && v.is_finite() {
                    Ok(())
                } else {
                    Err(format!("must be greater than {}, got {}", min_exclusive, v))
                }
            }
            (ParamKind::Bool, ParamValue::Bool(_)) => Ok(()),
            (ParamKind::Choice(options), ParamValue::Str(s)) => {
                if options.contains(&s.as_str()) {
                    Ok(())
                } else {
                    Err(format!("must be one of [{}], got '{}'", options.join(", "), s))
                }
            }
            (kind, other) => Err(format!(
                "expected {}, got {} '{}'",
                kind.describe(),
                other.type_name(),
                other
            )),
        }
    }
}

impl ParamKind {
    /// Human readable description for help output
    pub fn describe(&self) -> String {
        match self {
            ParamKind::Int { min } => format!("integer >= {}", min),
            ParamKind::OptionalInt { min } => format!("integer >= {} or none", min),
            ParamKind::Float { min_exclusive } => format!("number > {}", min_exclusive),
            ParamKind::Bool => "true or false".to_string(),
            ParamKind::Choice(options) => options.join("|"),
        }
    }
}

/// Validate every entry of `params` against `algorithm`'s schema.
pub fn validate(algorithm: Algorithm, params: &ParamMap) -> Result<()> {
    for (name, value) in params {
        let spec = lookup(algorithm, name).ok_or_else(|| {
            CanopyError::unrecognized(
                name,
                format!("not a parameter of {}", algorithm.as_str()),
            )
        })?;
        spec.check(value)
            .map_err(|reason| CanopyError::unrecognized(name, reason))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(entries: &[(&str, ParamValue)]) -> ParamMap {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_every_algorithm_has_schema() {
        for algorithm in Algorithm::ALL {
            assert!(!schema(algorithm).is_empty());
        }
    }

    #[test]
    fn test_unknown_key_rejected() {
        let params = map(&[("max_depth", ParamValue::Int(30))]);
        match validate(Algorithm::Logit, &params) {
            Err(CanopyError::UnrecognizedParameterError { name, .. }) => {
                assert_eq!(name, "max_depth")
            }
            other => panic!("expected UnrecognizedParameterError, got {:?}", other),
        }
    }

    #[test]
    fn test_float_accepts_int() {
        let params = map(&[("c", ParamValue::Int(10))]);
        assert!(validate(Algorithm::Logit, &params).is_ok());
    }

    #[test]
    fn test_range_enforced() {
        let params = map(&[("c", ParamValue::Float(0.0))]);
        assert!(validate(Algorithm::Logit, &params).is_err());
        let params = map(&[("min_samples_split", ParamValue::Int(1))]);
        assert!(validate(Algorithm::Tree, &params).is_err());
    }

    #[test]
    fn test_optional_int_accepts_none() {
        let params = map(&[("max_depth", ParamValue::None)]);
        assert!(validate(Algorithm::Forest, &params).is_ok());
        let params = map(&[("n_estimators", ParamValue::None)]);
        assert!(validate(Algorithm::Forest, &params).is_err());
    }

    #[test]
    fn test_choice_enforced() {
        let ok = map(&[("weights", "distance".into())]);
        assert!(validate(Algorithm::Knn, &ok).is_ok());
        let bad = map(&[("weights", "heaviest".into())]);
        assert!(validate(Algorithm::Knn, &bad).is_err());
    }

    #[test]
    fn test_wrong_type_names_key() {
        let params = map(&[("max_iter", ParamValue::Str("many".into()))]);
        let err = validate(Algorithm::Logit, &params).unwrap_err();
        assert!(err.to_string().contains("max_iter"));
    }
}
