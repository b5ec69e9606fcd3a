//! K-Nearest Neighbors classifier

use super::{encode_labels, param_str, param_usize};
use crate::error::{CanopyError, Result};
use crate::params::{ParamMap, ParamValue};
use ndarray::{Array1, Array2, ArrayView1};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Distance metric for KNN
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum DistanceMetric {
    /// Euclidean distance (L2)
    #[default]
    Euclidean,
    /// Manhattan distance (L1)
    Manhattan,
    /// Cosine similarity converted to a distance
    Cosine,
}

impl DistanceMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            DistanceMetric::Euclidean => "euclidean",
            DistanceMetric::Manhattan => "manhattan",
            DistanceMetric::Cosine => "cosine",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "euclidean" => Some(DistanceMetric::Euclidean),
            "manhattan" => Some(DistanceMetric::Manhattan),
            "cosine" => Some(DistanceMetric::Cosine),
            _ => None,
        }
    }
}

/// Weighting scheme for neighbors
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum WeightScheme {
    /// All neighbors have equal weight
    #[default]
    Uniform,
    /// Inverse distance weighting
    Distance,
}

impl WeightScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            WeightScheme::Uniform => "uniform",
            WeightScheme::Distance => "distance",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "uniform" => Some(WeightScheme::Uniform),
            "distance" => Some(WeightScheme::Distance),
            _ => None,
        }
    }

    fn weight(&self, dist: f64) -> f64 {
        match self {
            WeightScheme::Uniform => 1.0,
            WeightScheme::Distance => 1.0 / (dist + 1e-10),
        }
    }
}

/// K-Nearest Neighbors classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnnClassifier {
    pub n_neighbors: usize,
    pub metric: DistanceMetric,
    pub weights: WeightScheme,
    x_train: Option<Array2<f64>>,
    /// Training labels encoded as indices into `classes`
    y_train: Vec<usize>,
    classes: Vec<f64>,
}

impl Default for KnnClassifier {
    fn default() -> Self {
        Self::with_k(5)
    }
}

impl KnnClassifier {
    pub fn with_k(k: usize) -> Self {
        Self {
            n_neighbors: k,
            metric: DistanceMetric::default(),
            weights: WeightScheme::default(),
            x_train: None,
            y_train: Vec::new(),
            classes: Vec::new(),
        }
    }

    /// Library defaults overridden by `params`.
    pub fn from_params(params: &ParamMap) -> Self {
        let defaults = Self::default();
        Self {
            n_neighbors: param_usize(params, "n_neighbors").unwrap_or(defaults.n_neighbors),
            metric: param_str(params, "metric")
                .and_then(DistanceMetric::parse)
                .unwrap_or(defaults.metric),
            weights: param_str(params, "weights")
                .and_then(WeightScheme::parse)
                .unwrap_or(defaults.weights),
            ..defaults
        }
    }

    pub fn params(&self) -> ParamMap {
        let mut params = ParamMap::new();
        params.insert("n_neighbors".into(), ParamValue::Int(self.n_neighbors as i64));
        params.insert("weights".into(), ParamValue::from(self.weights.as_str()));
        params.insert("metric".into(), ParamValue::from(self.metric.as_str()));
        params
    }

    pub fn classes(&self) -> &[f64] {
        &self.classes
    }

    /// Store the training data
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        let (classes, encoded) = encode_labels(y);
        self.x_train = Some(x.clone());
        self.y_train = encoded;
        self.classes = classes;
        Ok(())
    }

    /// Weighted neighbor votes per class (parallelized over query rows)
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let x_train = self.x_train.as_ref().ok_or(CanopyError::ModelNotFitted)?;
        if x.ncols() != x_train.ncols() {
            return Err(CanopyError::ShapeError {
                expected: format!("{} features", x_train.ncols()),
                actual: format!("{} features", x.ncols()),
            });
        }

        let k = self.n_neighbors.clamp(1, x_train.nrows().max(1));
        let n_classes = self.classes.len();

        let probs: Vec<Vec<f64>> = (0..x.nrows())
            .into_par_iter()
            .map(|i| {
                let neighbors = find_k_nearest(x.row(i), x_train, &self.y_train, k, self.metric);
                class_probs_from(&neighbors, n_classes, self.weights)
            })
            .collect();

        let flat: Vec<f64> = probs.into_iter().flatten().collect();
        Ok(Array2::from_shape_vec((x.nrows(), n_classes), flat)?)
    }
}

/// Max-heap entry keeping the k smallest distances
#[derive(PartialEq)]
struct DistLabel(f64, usize);

impl Eq for DistLabel {}

impl PartialOrd for DistLabel {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DistLabel {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

fn find_k_nearest(
    point: ArrayView1<f64>,
    x_train: &Array2<f64>,
    y_train: &[usize],
    k: usize,
    metric: DistanceMetric,
) -> Vec<(f64, usize)> {
    let mut heap = BinaryHeap::with_capacity(k + 1);

    for (i, row) in x_train.rows().into_iter().enumerate() {
        let dist = compute_distance(point, row, metric);
        if heap.len() < k {
            heap.push(DistLabel(dist, y_train[i]));
        } else if let Some(top) = heap.peek() {
            if dist < top.0 {
                heap.pop();
                heap.push(DistLabel(dist, y_train[i]));
            }
        }
    }

    heap.into_iter().map(|dl| (dl.0, dl.1)).collect()
}

fn compute_distance(a: ArrayView1<f64>, b: ArrayView1<f64>, metric: DistanceMetric) -> f64 {
    match metric {
        DistanceMetric::Euclidean => a
            .iter()
            .zip(b.iter())
            .map(|(ai, bi)| {
                let d = ai - bi;
                d * d
            })
            .sum::<f64>()
            .sqrt(),
        DistanceMetric::Manhattan => a.iter().zip(b.iter()).map(|(ai, bi)| (ai - bi).abs()).sum(),
        DistanceMetric::Cosine => {
            let mut dot = 0.0;
            let mut norm_a = 0.0;
            let mut norm_b = 0.0;
            for (ai, bi) in a.iter().zip(b.iter()) {
                dot += ai * bi;
                norm_a += ai * ai;
                norm_b += bi * bi;
            }
            let denom = norm_a.sqrt() * norm_b.sqrt();
            if denom > 0.0 {
                1.0 - (dot / denom)
            } else {
                1.0
            }
        }
    }
}

fn class_probs_from(neighbors: &[(f64, usize)], n_classes: usize, weights: WeightScheme) -> Vec<f64> {
    let mut votes = vec![0.0; n_classes];
    for &(dist, class_idx) in neighbors {
        votes[class_idx] += weights.weight(dist);
    }
    let total: f64 = votes.iter().sum();
    if total > 0.0 {
        votes.iter_mut().for_each(|v| *v /= total);
    }
    votes
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn create_classification_data() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_vec(
            (20, 2),
            vec![
                1.0, 1.0, 1.5, 1.5, 2.0, 2.0, 2.5, 2.5, 1.0, 2.0, 1.5, 2.5, 2.0, 1.5, 2.5, 1.0,
                1.2, 1.8, 1.8, 1.2, 8.0, 8.0, 8.5, 8.5, 9.0, 9.0, 9.5, 9.5, 8.0, 9.0, 8.5, 9.5,
                9.0, 8.5, 9.5, 8.0, 8.2, 8.8, 8.8, 8.2,
            ],
        )
        .unwrap();
        let y = Array1::from_iter((0..20).map(|i| if i < 10 { 0.0 } else { 1.0 }));
        (x, y)
    }

    #[test]
    fn test_knn_classifier() {
        let (x, y) = create_classification_data();
        let mut knn = KnnClassifier::with_k(3);
        knn.fit(&x, &y).unwrap();

        let proba = knn.predict_proba(&x).unwrap();
        let pred = super::super::labels_from_proba(&proba, knn.classes());
        assert_eq!(pred, y);
    }

    #[test]
    fn test_k_larger_than_training_set() {
        let (x, y) = create_classification_data();
        let mut knn = KnnClassifier::with_k(500);
        knn.fit(&x, &y).unwrap();
        let proba = knn.predict_proba(&x).unwrap();
        assert!((proba[[0, 0]] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_distance_metrics() {
        let a = array![0.0, 0.0];
        let b = array![3.0, 4.0];
        let d = compute_distance(a.view(), b.view(), DistanceMetric::Euclidean);
        assert!((d - 5.0).abs() < 1e-12);
        let d = compute_distance(a.view(), b.view(), DistanceMetric::Manhattan);
        assert!((d - 7.0).abs() < 1e-12);
        let c = array![6.0, 8.0];
        let d = compute_distance(b.view(), c.view(), DistanceMetric::Cosine);
        assert!(d.abs() < 1e-12);
    }

    #[test]
    fn test_weighted_votes_favor_closer() {
        let x = array![[0.0], [1.0], [1.1]];
        let y = array![0.0, 1.0, 1.0];
        let mut knn = KnnClassifier::with_k(3);
        knn.weights = WeightScheme::Distance;
        knn.fit(&x, &y).unwrap();
        let proba = knn.predict_proba(&array![[0.01]]).unwrap();
        assert!(proba[[0, 0]] > 0.9);
    }
}
