//! Free-form flag coercion
//!
//! `train` accepts flags the algorithm's typed parser does not know about.
//! They arrive as raw `--name value` tokens and are sniffed into typed values
//! here: integer, then float, then `none`/`true`/`false`, else string.
//! Names are lower-cased, so `--C` and `--c` are the same parameter.

use super::{ParamMap, ParamValue, FLAG_MARKER};
use crate::error::{CanopyError, Result};

/// Coerce a flat `--name value` token list into a typed mapping.
pub fn coerce(tokens: &[String]) -> Result<ParamMap> {
    if tokens.len() % 2 != 0 {
        let dangling = tokens.last().map(String::as_str).unwrap_or_default();
        return Err(CanopyError::ArgumentFormatError(format!(
            "expected '--name value' pairs, '{}' has no value",
            dangling
        )));
    }

    let mut params = ParamMap::new();
    for pair in tokens.chunks_exact(2) {
        let (name, raw) = (&pair[0], &pair[1]);
        let key = name
            .strip_prefix(FLAG_MARKER)
            .filter(|key| !key.is_empty())
            .map(str::to_ascii_lowercase)
            .ok_or_else(|| {
                CanopyError::ArgumentFormatError(format!(
                    "'{}' is not a flag, flags start with '{}'",
                    name, FLAG_MARKER
                ))
            })?;

        if params.contains_key(&key) {
            return Err(CanopyError::DuplicateParameterError(key));
        }
        params.insert(key, coerce_value(raw));
    }

    Ok(params)
}

/// Sniff the type of a single raw value. First match wins.
pub fn coerce_value(raw: &str) -> ParamValue {
    if let Ok(v) = raw.parse::<i64>() {
        return ParamValue::Int(v);
    }
    if let Ok(v) = raw.parse::<f64>() {
        return ParamValue::Float(v);
    }
    match raw.to_ascii_lowercase().as_str() {
        "none" => ParamValue::None,
        "true" => ParamValue::Bool(true),
        "false" => ParamValue::Bool(false),
        _ => ParamValue::Str(raw.to_string()),
    }
}
