//! Integration test: parameter ingestion from tokens to a built model

use canopy::error::CanopyError;
use canopy::models::{new_model, Algorithm, ParamSource};
use canopy::params::{coerce, coerce_value, merge_and_validate, ParamMap, ParamValue};
use proptest::prelude::*;

fn tokens(line: &str) -> Vec<String> {
    line.split_whitespace().map(String::from).collect()
}

#[test]
fn test_free_form_tokens_build_a_forest() {
    let coerced = coerce(&tokens("--n_estimators 20 --max_features log2 --bootstrap false")).unwrap();
    let merged = merge_and_validate(Algorithm::Forest, coerced, &ParamMap::new()).unwrap();
    assert_eq!(merged["n_estimators"], ParamValue::Int(20));
    assert_eq!(merged["bootstrap"], ParamValue::Bool(false));

    let model = new_model(Algorithm::Forest, &ParamSource::Merged(merged)).unwrap();
    assert_eq!(model.params()["n_estimators"], ParamValue::Int(20));
    assert_eq!(model.params()["max_features"], ParamValue::Str("log2".into()));
}

#[test]
fn test_structured_flags_override_tokens() {
    let coerced = coerce(&tokens("--n_neighbors 3")).unwrap();
    let mut known = ParamMap::new();
    known.insert("n_neighbors".into(), ParamValue::Int(7));
    known.insert("cmd_statement".into(), ParamValue::Str("train --n_neighbors 7".into()));

    let merged = merge_and_validate(Algorithm::Knn, coerced, &known).unwrap();
    assert_eq!(merged.len(), 1);
    assert_eq!(merged["n_neighbors"], ParamValue::Int(7));
}

#[test]
fn test_unknown_parameter_is_rejected() {
    let coerced = coerce(&tokens("--gamma 0.1")).unwrap();
    let err = merge_and_validate(Algorithm::Logit, coerced, &ParamMap::new()).unwrap_err();
    assert!(matches!(err, CanopyError::UnrecognizedParameterError { .. }), "{err:?}");
}

#[test]
fn test_malformed_tokens() {
    assert!(matches!(coerce(&tokens("--c")), Err(CanopyError::ArgumentFormatError(_))));
    assert!(matches!(coerce(&tokens("c 1")), Err(CanopyError::ArgumentFormatError(_))));
    assert!(matches!(
        coerce(&tokens("--c 1 --c 2")),
        Err(CanopyError::DuplicateParameterError(_))
    ));
}

#[test]
fn test_baseline_used_without_parameters() {
    let merged = merge_and_validate(Algorithm::Tree, ParamMap::new(), &ParamMap::new()).unwrap();
    assert!(merged.is_empty());
    let model = new_model(Algorithm::Tree, &ParamSource::Baseline).unwrap();
    assert_eq!(model.params()["max_depth"], ParamValue::Int(20));
}

proptest! {
    #[test]
    fn prop_integers_coerce_to_int(v in any::<i64>()) {
        prop_assert_eq!(coerce_value(&v.to_string()), ParamValue::Int(v));
    }

    #[test]
    fn prop_words_stay_strings(word in "[a-z]{1,8}") {
        prop_assume!(!["none", "true", "false", "inf", "nan", "infinity"].contains(&word.as_str()));
        prop_assert_eq!(coerce_value(&word), ParamValue::Str(word.clone()));
    }

    #[test]
    fn prop_coerced_keys_lose_marker(names in prop::collection::btree_set("[a-z_]{1,10}", 1..5)) {
        let mut line = Vec::new();
        for name in &names {
            line.push(format!("--{name}"));
            line.push("1".to_string());
        }
        let params = coerce(&line).unwrap();
        prop_assert_eq!(params.keys().cloned().collect::<Vec<_>>(), names.into_iter().collect::<Vec<_>>());
    }

    #[test]
    fn prop_odd_length_rejected(
        pairs in prop::collection::vec(("--[a-z_]{1,8}", "[A-Za-z0-9_.]{1,8}"), 0..6),
        dangling in "(--)?[A-Za-z0-9_.]{1,8}",
    ) {
        let mut words: Vec<String> = pairs.into_iter().flat_map(|(k, v)| [k, v]).collect();
        words.push(dangling);
        prop_assert!(matches!(coerce(&words), Err(CanopyError::ArgumentFormatError(_))));
    }
}
