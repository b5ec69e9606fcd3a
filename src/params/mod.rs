//! Parameter ingestion
//!
//! Turns free-form `--name value` tokens and structured shell flags into one
//! validated parameter mapping:
//! - [`coerce`] - token list to typed values
//! - [`schema`] - declarative per-algorithm parameter schemas
//! - [`merge`] - precedence merge and schema validation

pub mod coerce;
pub mod merge;
pub mod schema;

pub use coerce::{coerce, coerce_value};
pub use merge::{filter_internal, merge_and_validate};
pub use schema::{ParamKind, ParamSpec};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Prefix every flag token must carry.
pub const FLAG_MARKER: &str = "--";

/// Prefix of bookkeeping keys the structured flag parser adds.
pub const INTERNAL_PREFIX: &str = "cmd_";

/// A typed parameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    None,
    Str(String),
}

/// Parameter name to typed value, ordered for stable logging.
pub type ParamMap = BTreeMap<String, ParamValue>;

impl ParamValue {
    /// Integer view; floats are not truncated.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParamValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric view, widening integers.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Int(v) => Some(*v as f64),
            ParamValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Str(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, ParamValue::None)
    }

    /// Short type name used in validation messages
    pub fn type_name(&self) -> &'static str {
        match self {
            ParamValue::Int(_) => "integer",
            ParamValue::Float(_) => "float",
            ParamValue::Bool(_) => "boolean",
            ParamValue::None => "none",
            ParamValue::Str(_) => "string",
        }
    }

    /// Convert a JSON scalar. Arrays and objects are not parameter values.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Null => Some(ParamValue::None),
            serde_json::Value::Bool(b) => Some(ParamValue::Bool(*b)),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(ParamValue::Int)
                .or_else(|| n.as_f64().map(ParamValue::Float)),
            serde_json::Value::String(s) => Some(ParamValue::Str(s.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Int(v) => write!(f, "{}", v),
            ParamValue::Float(v) => write!(f, "{}", v),
            ParamValue::Bool(v) => write!(f, "{}", v),
            ParamValue::None => write!(f, "none"),
            ParamValue::Str(v) => write!(f, "{}", v),
        }
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Str(v.to_string())
    }
}

/// Render a map as `key=value` pairs for log lines.
pub fn describe(params: &ParamMap) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_views() {
        assert_eq!(ParamValue::Int(3).as_f64(), Some(3.0));
        assert_eq!(ParamValue::Float(2.5).as_i64(), None);
        assert_eq!(ParamValue::Bool(true).as_f64(), None);
    }

    #[test]
    fn test_from_json_scalars() {
        let v: serde_json::Value = serde_json::json!([1, 0.5, true, null, "gini"]);
        let parsed: Vec<ParamValue> = v
            .as_array()
            .unwrap()
            .iter()
            .map(|x| ParamValue::from_json(x).unwrap())
            .collect();
        assert_eq!(
            parsed,
            vec![
                ParamValue::Int(1),
                ParamValue::Float(0.5),
                ParamValue::Bool(true),
                ParamValue::None,
                ParamValue::Str("gini".to_string()),
            ]
        );
        assert!(ParamValue::from_json(&serde_json::json!([1])).is_none());
    }

    #[test]
    fn test_describe_is_sorted() {
        let mut params = ParamMap::new();
        params.insert("max_depth".to_string(), ParamValue::Int(5));
        params.insert("criterion".to_string(), "gini".into());
        assert_eq!(describe(&params), "criterion=gini, max_depth=5");
    }
}
