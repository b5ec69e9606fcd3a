//! Precedence merge of structured and free-form parameters

use super::{schema, ParamMap, INTERNAL_PREFIX};
use crate::error::Result;
use crate::models::Algorithm;
use tracing::debug;

/// Drop bookkeeping entries added by the structured flag parser.
pub fn filter_internal(known: &ParamMap) -> ParamMap {
    known
        .iter()
        .filter(|(key, _)| !key.starts_with(INTERNAL_PREFIX))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Merge `coerced` with `known` and validate the result.
///
/// Structured flags win over free-form tokens with the same name. The merged
/// map is checked against `algorithm`'s schema and returned unchanged.
pub fn merge_and_validate(
    algorithm: Algorithm,
    coerced: ParamMap,
    known: &ParamMap,
) -> Result<ParamMap> {
    let mut merged = coerced;
    for (key, value) in filter_internal(known) {
        if let Some(previous) = merged.insert(key.clone(), value) {
            debug!("Structured flag '{}' overrides free-form value {}", key, previous);
        }
    }

    schema::validate(algorithm, &merged)?;
    debug!(
        "Validated {} parameters for {}: {}",
        merged.len(),
        algorithm,
        super::describe(&merged)
    );
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CanopyError;
    use crate::params::ParamValue;

    #[test]
    fn test_internal_keys_dropped() {
        let mut known = ParamMap::new();
        known.insert("cmd_statement".into(), "train".into());
        known.insert("max_depth".into(), ParamValue::Int(4));
        let filtered = filter_internal(&known);
        assert_eq!(filtered.len(), 1);
        assert!(filtered.contains_key("max_depth"));
    }

    #[test]
    fn test_known_wins_on_collision() {
        let mut coerced = ParamMap::new();
        coerced.insert("max_depth".into(), ParamValue::Int(3));
        coerced.insert("criterion".into(), "entropy".into());
        let mut known = ParamMap::new();
        known.insert("max_depth".into(), ParamValue::Int(8));

        let merged = merge_and_validate(Algorithm::Tree, coerced, &known).unwrap();
        assert_eq!(merged.get("max_depth"), Some(&ParamValue::Int(8)));
        assert_eq!(merged.get("criterion"), Some(&ParamValue::Str("entropy".into())));
    }

    #[test]
    fn test_both_empty_is_empty() {
        let merged = merge_and_validate(Algorithm::Knn, ParamMap::new(), &ParamMap::new()).unwrap();
        assert!(merged.is_empty());
    }

    #[test]
    fn test_invalid_merge_names_key() {
        let mut coerced = ParamMap::new();
        coerced.insert("max_depth".into(), ParamValue::Int(30));
        let err = merge_and_validate(Algorithm::Logit, coerced, &ParamMap::new()).unwrap_err();
        match err {
            CanopyError::UnrecognizedParameterError { name, .. } => assert_eq!(name, "max_depth"),
            other => panic!("expected UnrecognizedParameterError, got {:?}", other),
        }
    }
}
