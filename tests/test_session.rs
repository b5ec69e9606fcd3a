//! Integration test: session end-to-end on a small CSV

use canopy::config::Config;
use canopy::error::CanopyError;
use canopy::params::{ParamMap, ParamValue};
use canopy::session::Session;
use std::path::Path;
use tempfile::TempDir;

/// Three well separated classes, 12 rows each.
fn write_training_csv(path: &Path) {
    let mut csv = String::from("Id,Elevation,Slope,Cover_Type\n");
    let mut id = 1;
    for (label, center) in [(1, 0.0), (2, 10.0), (3, 20.0)] {
        for i in 0..12 {
            let jitter = (i as f64) * 0.1;
            csv.push_str(&format!("{},{},{},{}\n", id, center + jitter, center - jitter, label));
            id += 1;
        }
    }
    std::fs::write(path, csv).unwrap();
}

fn session_in(dir: &TempDir) -> Session {
    let train = dir.path().join("train.csv");
    write_training_csv(&train);
    let config = Config::default()
        .with_loadpath(&train)
        .with_dumppath(dir.path().join("model.bin"))
        .with_exportpath(dir.path().join("submission.csv"))
        .with_tracking_dir(dir.path().join("mlruns"));
    Session::new(config)
}

fn tokens(line: &str) -> Vec<String> {
    line.split_whitespace().map(String::from).collect()
}

#[test]
fn test_train_forest_with_scaler() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = session_in(&dir);
    session.set_model("forest").unwrap();
    session.set_scaler("standard").unwrap();

    let report = session
        .train(&ParamMap::new(), &tokens("--n_estimators 10 --max_depth 4"))
        .unwrap();

    assert_eq!(report.stages, vec!["scaler", "classifier"]);
    assert_eq!(report.params["n_estimators"], ParamValue::Int(10));
    let scores = report.cv.mean;
    assert!((0.0..=1.0).contains(&scores.balanced_accuracy));
    assert!(scores.balanced_accuracy > 0.9);
    assert!(dir.path().join("model.bin").exists());
}

#[test]
fn test_train_then_predict_writes_export() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = session_in(&dir);
    session.set_model("knn").unwrap();
    session.train(&ParamMap::new(), &[]).unwrap();

    let test = dir.path().join("test.csv");
    std::fs::write(&test, "Id,Elevation,Slope\n3,0.5,-0.5\n30,20.3,19.7\n").unwrap();
    let (path, rows) = session.predict(&test).unwrap();

    assert_eq!(rows, 2);
    let written = std::fs::read_to_string(path).unwrap();
    assert_eq!(written.lines().collect::<Vec<_>>(), vec!["Id,Cover_Type", "3,1", "30,3"]);
}

#[test]
fn test_structured_and_free_form_parameters_merge() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = session_in(&dir);
    session.set_model("tree").unwrap();

    let mut known = ParamMap::new();
    known.insert("max_depth".into(), ParamValue::Int(3));
    known.insert("cmd_statement".into(), ParamValue::Str("train --max_depth 3".into()));
    let report = session.train(&known, &tokens("--max_depth 9 --criterion entropy")).unwrap();

    assert_eq!(report.params["max_depth"], ParamValue::Int(3));
    assert_eq!(report.params["criterion"], ParamValue::Str("entropy".into()));
}

#[test]
fn test_invalid_parameter_stops_training() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = session_in(&dir);
    let err = session.train(&ParamMap::new(), &tokens("--n_neighbors 5")).unwrap_err();
    assert!(matches!(err, CanopyError::UnrecognizedParameterError { .. }), "{err:?}");
    assert!(!dir.path().join("model.bin").exists());
}

#[test]
fn test_missing_target_column() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = session_in(&dir);
    let err = session.set_target_column("Label").unwrap_err();
    assert!(matches!(err, CanopyError::MissingColumnError(ref c) if c == "Label"));
    assert_eq!(session.config().targetcolumn, "Cover_Type");
}

#[test]
fn test_missing_training_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::default()
        .with_loadpath(dir.path().join("absent.csv"))
        .with_tracking_dir(dir.path().join("mlruns"));
    let mut session = Session::new(config);
    let err = session.train(&ParamMap::new(), &[]).unwrap_err();
    assert!(matches!(err, CanopyError::PathNotFound(_)), "{err:?}");
}

#[test]
fn test_predict_without_dump_fails() {
    let dir = tempfile::tempdir().unwrap();
    let session = session_in(&dir);
    let err = session.predict(dir.path().join("train.csv")).unwrap_err();
    assert!(matches!(err, CanopyError::PathNotFound(_)), "{err:?}");
}

#[test]
fn test_hypersearch_with_custom_grid() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = session_in(&dir);
    session.set_model("knn").unwrap();
    let report = session
        .hypersearch(Some("{'clf__n_neighbors': [1, 3], 'clf__weights': 'uniform'}"))
        .unwrap();
    assert_eq!(report.n_candidates, 2);
    assert!(report.best_score > 0.9);
}
