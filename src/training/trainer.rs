//! A tracked training run: cross-validate, refit, persist

use crate::config::Config;
use crate::error::Result;
use crate::feateng::PreparedData;
use crate::params::ParamMap;
use crate::persist::{self, TrainedModel};
use crate::pipeline::Pipeline;
use crate::tracking::{RunStatus, TrackingSink};
use crate::training::cross_validation::{cross_validate, CVResults, CVStrategy, CrossValidator};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, warn};

/// Outcome of a successful training run
#[derive(Debug, Clone)]
pub struct TrainReport {
    pub run_id: String,
    pub run_name: String,
    pub stages: Vec<&'static str>,
    /// Effective classifier parameters
    pub params: ParamMap,
    pub cv: CVResults,
    pub dump_path: PathBuf,
    pub elapsed_secs: f64,
}

/// Name under which a run is tracked
pub fn run_name(config: &Config) -> String {
    format!(
        "{} (folds={}, rand={})",
        config.model, config.eval, config.randomstate
    )
}

/// Cross-validate `pipeline` on `prepared`, refit it on all rows, dump it to
/// `config.dumppath` and record the run with `tracker`.
///
/// A run that fails after it was opened is closed with [`RunStatus::Failed`].
pub fn train(
    pipeline: Pipeline,
    prepared: &PreparedData,
    config: &Config,
    tracker: &mut dyn TrackingSink,
) -> Result<TrainReport> {
    let name = run_name(config);
    let run_id = tracker.start_run(&name)?;
    let start = Instant::now();

    match run(pipeline, prepared, config, tracker) {
        Ok((stages, params, cv, dump_path)) => {
            tracker.end_run(RunStatus::Finished)?;
            Ok(TrainReport {
                run_id,
                run_name: name,
                stages,
                params,
                cv,
                dump_path,
                elapsed_secs: start.elapsed().as_secs_f64(),
            })
        }
        Err(err) => {
            if let Err(close_err) = tracker.end_run(RunStatus::Failed) {
                warn!("Could not close failed run {}: {}", run_id, close_err);
            }
            Err(err)
        }
    }
}

type RunOutput = (Vec<&'static str>, ParamMap, CVResults, PathBuf);

fn run(
    pipeline: Pipeline,
    prepared: &PreparedData,
    config: &Config,
    tracker: &mut dyn TrackingSink,
) -> Result<RunOutput> {
    let mut pipeline = pipeline.with_random_state(config.randomstate);
    let params = pipeline.classifier().map(|c| c.params()).unwrap_or_default();

    let mut logged: BTreeMap<String, String> = BTreeMap::from([
        ("SCALER".to_string(), pipeline.scaler_kind().to_string()),
        ("FEATENG".to_string(), config.feateng.to_string()),
        ("DIMREDUCT".to_string(), pipeline.dimreduct_kind().to_string()),
    ]);
    logged.extend(params.iter().map(|(k, v)| (k.clone(), v.to_string())));
    tracker.log_params(&logged)?;

    let dataset = &prepared.dataset;
    info!(
        "Cross-validating {} on {} samples x {} features ({} folds)",
        config.model,
        dataset.n_samples(),
        dataset.n_features(),
        config.eval
    );
    let cv = CrossValidator::new(CVStrategy::StratifiedKFold {
        n_splits: config.eval,
        shuffle: true,
    })
    .with_random_state(config.randomstate);
    let results = cross_validate(&pipeline, &dataset.features, &dataset.target, &cv)?;

    let metrics: BTreeMap<String, f64> = results
        .mean
        .named()
        .iter()
        .map(|(k, v)| (k.to_string(), *v))
        .collect();
    tracker.log_metrics(&metrics)?;

    pipeline.fit(&dataset.features, &dataset.target)?;
    let stages = pipeline.stage_names();
    let model = TrainedModel::new(pipeline, config.model, params.clone(), prepared);
    let dump_path = persist::dump_pipeline(&model, &config.dumppath)?;
    tracker.log_model(&dump_path)?;

    Ok((stages, params, results, dump_path))
}
