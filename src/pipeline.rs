//! Processing pipeline: optional scaler, optional reducer, classifier
//!
//! Stages always appear in that order and the classifier is always last.
//! A pipeline is built fresh for every training invocation and owned by it.

use crate::error::{CanopyError, Result};
use crate::models::Classifier;
use crate::preprocessing::{DimReductKind, Reducer, Scaler, ScalerKind};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use tracing::debug;

/// A single pipeline stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Stage {
    Scaler(Scaler),
    DimReduct(Reducer),
    Classifier(Classifier),
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Scaler(_) => "scaler",
            Stage::DimReduct(_) => "dimreduct",
            Stage::Classifier(_) => "classifier",
        }
    }
}

/// Ordered chain of stages ending in a classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

/// Build a pipeline from configuration names.
///
/// `"none"` omits the corresponding stage; any other unknown name is a
/// configuration error.
pub fn build_pipeline(scaler: &str, dimreduct: &str, model: Classifier) -> Result<Pipeline> {
    let scaler: ScalerKind = scaler.parse()?;
    let dimreduct: DimReductKind = dimreduct.parse()?;
    Ok(Pipeline::new(scaler, dimreduct, model))
}

impl Pipeline {
    pub fn new(scaler: ScalerKind, dimreduct: DimReductKind, model: Classifier) -> Self {
        let mut stages = Vec::with_capacity(3);
        if scaler != ScalerKind::None {
            stages.push(Stage::Scaler(Scaler::new(scaler)));
        }
        if dimreduct != DimReductKind::None {
            stages.push(Stage::DimReduct(Reducer::new(dimreduct)));
        }
        stages.push(Stage::Classifier(model));
        Self { stages }
    }

    /// Seed every stochastic stage.
    pub fn with_random_state(self, seed: u64) -> Self {
        let stages = self
            .stages
            .into_iter()
            .map(|stage| match stage {
                Stage::DimReduct(r) => Stage::DimReduct(r.with_random_state(seed)),
                Stage::Classifier(c) => Stage::Classifier(c.with_random_state(seed)),
                other => other,
            })
            .collect();
        Self { stages }
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(Stage::name).collect()
    }

    /// Kind of the scaler stage, `None` when the pipeline has none.
    pub fn scaler_kind(&self) -> ScalerKind {
        self.stages
            .iter()
            .find_map(|stage| match stage {
                Stage::Scaler(s) => Some(s.kind()),
                _ => None,
            })
            .unwrap_or(ScalerKind::None)
    }

    pub fn dimreduct_kind(&self) -> DimReductKind {
        self.stages
            .iter()
            .find_map(|stage| match stage {
                Stage::DimReduct(r) => Some(r.kind()),
                _ => None,
            })
            .unwrap_or(DimReductKind::None)
    }

    pub fn classifier(&self) -> Option<&Classifier> {
        match self.stages.last() {
            Some(Stage::Classifier(model)) => Some(model),
            _ => None,
        }
    }

    fn require_classifier(&self) -> Result<&Classifier> {
        self.classifier().ok_or_else(|| {
            CanopyError::ConfigurationError("pipeline has no classifier stage".to_string())
        })
    }

    pub fn classes(&self) -> &[f64] {
        self.classifier().map(Classifier::classes).unwrap_or_default()
    }

    /// Fit every stage left to right, each on the previous stage's output.
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        if x.nrows() != y.len() {
            return Err(CanopyError::ShapeError {
                expected: format!("y length = {}", x.nrows()),
                actual: format!("y length = {}", y.len()),
            });
        }

        let mut current = Cow::Borrowed(x);
        for stage in &mut self.stages {
            debug!("Fitting stage '{}' on {:?}", stage.name(), current.dim());
            match stage {
                Stage::Scaler(scaler) => {
                    current = Cow::Owned(scaler.fit_transform(&current)?);
                }
                Stage::DimReduct(reducer) => {
                    current = Cow::Owned(reducer.fit_transform(&current, y)?);
                }
                Stage::Classifier(model) => model.fit(&current, y)?,
            }
        }
        Ok(())
    }

    /// Apply the non-classifier stages.
    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let mut current = Cow::Borrowed(x);
        for stage in &self.stages {
            match stage {
                Stage::Scaler(scaler) => current = Cow::Owned(scaler.transform(&current)?),
                Stage::DimReduct(reducer) => current = Cow::Owned(reducer.transform(&current)?),
                Stage::Classifier(_) => {}
            }
        }
        Ok(current.into_owned())
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.require_classifier()?.predict(&self.transform(x)?)
    }

    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.require_classifier()?.predict_proba(&self.transform(x)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{new_model, Algorithm, ParamSource};
    use ndarray::array;

    fn model() -> Classifier {
        new_model(Algorithm::Knn, &ParamSource::Baseline).unwrap()
    }

    #[test]
    fn test_stage_order() {
        let cases = [
            ("none", "none", vec!["classifier"]),
            ("standard", "none", vec!["scaler", "classifier"]),
            ("none", "pca", vec!["dimreduct", "classifier"]),
            ("robust", "lda", vec!["scaler", "dimreduct", "classifier"]),
        ];
        for (scaler, reduct, expected) in cases {
            let pipeline = build_pipeline(scaler, reduct, model()).unwrap();
            assert_eq!(pipeline.stage_names(), expected);
        }
    }

    #[test]
    fn test_stage_kinds() {
        let pipeline = build_pipeline("maxabs", "none", model()).unwrap();
        assert_eq!(pipeline.scaler_kind(), ScalerKind::MaxAbs);
        assert_eq!(pipeline.dimreduct_kind(), DimReductKind::None);
        let pipeline = build_pipeline("none", "pca", model()).unwrap();
        assert_eq!(pipeline.scaler_kind(), ScalerKind::None);
        assert_eq!(pipeline.dimreduct_kind(), DimReductKind::Pca);
    }

    #[test]
    fn test_unknown_names_rejected() {
        assert!(matches!(
            build_pipeline("zscore", "none", model()),
            Err(CanopyError::ConfigurationError(_))
        ));
        assert!(matches!(
            build_pipeline("none", "umap", model()),
            Err(CanopyError::ConfigurationError(_))
        ));
    }

    #[test]
    fn test_fit_predict_through_stages() {
        let x = array![
            [0.0, 100.0],
            [0.1, 110.0],
            [0.2, 105.0],
            [5.0, 900.0],
            [5.1, 950.0],
            [5.2, 920.0]
        ];
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];
        let classifier = new_model(Algorithm::Knn, &ParamSource::Merged(Default::default())).unwrap();
        let mut pipeline = Pipeline::new(ScalerKind::Standard, DimReductKind::Pca, classifier);
        pipeline.fit(&x, &y).unwrap();

        assert_eq!(pipeline.classes(), &[0.0, 1.0]);
        let transformed = pipeline.transform(&x).unwrap();
        assert_eq!(transformed.nrows(), 6);
        let proba = pipeline.predict_proba(&x).unwrap();
        assert_eq!(proba.dim(), (6, 2));
    }

    #[test]
    fn test_predict_before_fit_fails() {
        let pipeline = build_pipeline("standard", "none", model()).unwrap();
        assert!(pipeline.predict(&array![[1.0, 2.0]]).is_err());
    }
}
