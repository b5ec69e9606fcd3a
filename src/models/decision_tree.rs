//! Decision tree classifier

use super::{encode_labels, limit_value, param_limit, param_str, param_usize};
use crate::error::{CanopyError, Result};
use crate::params::{ParamMap, ParamValue};
use ndarray::{Array1, Array2, ArrayView1};
use rand::seq::index::sample;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Decision tree node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TreeNode {
    /// Leaf node with the class distribution of its samples
    Leaf {
        distribution: Vec<f64>,
        n_samples: usize,
    },
    /// Internal node with split
    Split {
        feature_idx: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
        n_samples: usize,
    },
}

/// Impurity criterion
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum Criterion {
    Gini,
    Entropy,
}

impl Criterion {
    pub fn as_str(&self) -> &'static str {
        match self {
            Criterion::Gini => "gini",
            Criterion::Entropy => "entropy",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "gini" => Some(Criterion::Gini),
            "entropy" => Some(Criterion::Entropy),
            _ => None,
        }
    }

    fn impurity(&self, counts: &[usize], total: usize) -> f64 {
        if total == 0 {
            return 0.0;
        }
        let n = total as f64;
        match self {
            Criterion::Gini => {
                1.0 - counts
                    .iter()
                    .map(|&c| {
                        let p = c as f64 / n;
                        p * p
                    })
                    .sum::<f64>()
            }
            Criterion::Entropy => counts
                .iter()
                .filter(|&&c| c > 0)
                .map(|&c| {
                    let p = c as f64 / n;
                    -p * p.ln()
                })
                .sum(),
        }
    }
}

/// Decision tree classification model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    root: Option<TreeNode>,
    /// Maximum depth, unbounded when `None`
    pub max_depth: Option<usize>,
    /// Minimum samples to split
    pub min_samples_split: usize,
    /// Minimum samples in leaf
    pub min_samples_leaf: usize,
    /// Features considered per split, all when `None`
    pub max_features: Option<usize>,
    pub criterion: Criterion,
    pub random_state: u64,
    n_features: usize,
    classes: Vec<f64>,
}

impl Default for DecisionTree {
    fn default() -> Self {
        Self::new()
    }
}

/// Samples addressed by a node, as row indices with their encoded labels.
struct NodeSamples<'a> {
    x: &'a Array2<f64>,
    labels: &'a [usize],
    n_classes: usize,
}

impl DecisionTree {
    pub fn new() -> Self {
        Self {
            root: None,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            criterion: Criterion::Gini,
            random_state: 0,
            n_features: 0,
            classes: Vec::new(),
        }
    }

    /// Library defaults overridden by `params`.
    pub fn from_params(params: &ParamMap) -> Self {
        let defaults = Self::new();
        Self {
            max_depth: param_limit(params, "max_depth").unwrap_or(defaults.max_depth),
            min_samples_split: param_usize(params, "min_samples_split")
                .unwrap_or(defaults.min_samples_split),
            min_samples_leaf: param_usize(params, "min_samples_leaf")
                .unwrap_or(defaults.min_samples_leaf),
            criterion: param_str(params, "criterion")
                .and_then(Criterion::parse)
                .unwrap_or(defaults.criterion),
            ..defaults
        }
    }

    pub fn with_max_features(mut self, max_features: Option<usize>) -> Self {
        self.max_features = max_features;
        self
    }

    pub fn with_criterion(mut self, criterion: Criterion) -> Self {
        self.criterion = criterion;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    pub fn params(&self) -> ParamMap {
        let mut params = ParamMap::new();
        params.insert("max_depth".into(), limit_value(self.max_depth));
        params.insert(
            "min_samples_split".into(),
            ParamValue::Int(self.min_samples_split as i64),
        );
        params.insert(
            "min_samples_leaf".into(),
            ParamValue::Int(self.min_samples_leaf as i64),
        );
        params.insert("criterion".into(), ParamValue::from(self.criterion.as_str()));
        params
    }

    pub fn classes(&self) -> &[f64] {
        &self.classes
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        let (classes, labels) = encode_labels(y);
        let rows: Vec<usize> = (0..x.nrows()).collect();
        self.fit_encoded(x, &labels, &classes, &rows)
    }

    /// Fit on the rows listed in `rows` (repeats allowed) with labels already
    /// encoded against `classes`.
    pub fn fit_encoded(
        &mut self,
        x: &Array2<f64>,
        labels: &[usize],
        classes: &[f64],
        rows: &[usize],
    ) -> Result<()> {
        if rows.is_empty() {
            return Err(CanopyError::TrainingError("no training samples".to_string()));
        }

        self.n_features = x.ncols();
        self.classes = classes.to_vec();

        let samples = NodeSamples {
            x,
            labels,
            n_classes: classes.len(),
        };
        let mut rng = ChaCha8Rng::seed_from_u64(self.random_state);
        self.root = Some(self.build_tree(&samples, rows, 0, &mut rng));
        Ok(())
    }

    fn class_counts(samples: &NodeSamples, rows: &[usize]) -> Vec<usize> {
        let mut counts = vec![0; samples.n_classes];
        for &row in rows {
            counts[samples.labels[row]] += 1;
        }
        counts
    }

    fn leaf(counts: &[usize], n_samples: usize) -> TreeNode {
        let total = n_samples.max(1) as f64;
        TreeNode::Leaf {
            distribution: counts.iter().map(|&c| c as f64 / total).collect(),
            n_samples,
        }
    }

    fn build_tree(
        &self,
        samples: &NodeSamples,
        rows: &[usize],
        depth: usize,
        rng: &mut ChaCha8Rng,
    ) -> TreeNode {
        let n_samples = rows.len();
        let counts = Self::class_counts(samples, rows);
        let is_pure = counts.iter().filter(|&&c| c > 0).count() <= 1;

        let should_stop = n_samples < self.min_samples_split
            || n_samples < 2 * self.min_samples_leaf
            || self.max_depth.map_or(false, |d| depth >= d)
            || is_pure;
        if should_stop {
            return Self::leaf(&counts, n_samples);
        }

        let parent_impurity = self.criterion.impurity(&counts, n_samples);
        let Some((feature_idx, threshold, _gain)) =
            self.find_best_split(samples, rows, parent_impurity, rng)
        else {
            return Self::leaf(&counts, n_samples);
        };

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .iter()
            .partition(|&&i| samples.x[[i, feature_idx]] <= threshold);

        let left = Box::new(self.build_tree(samples, &left_rows, depth + 1, rng));
        let right = Box::new(self.build_tree(samples, &right_rows, depth + 1, rng));

        TreeNode::Split {
            feature_idx,
            threshold,
            left,
            right,
            n_samples,
        }
    }

    /// Best `(feature, threshold, gain)` over a random feature subset.
    fn find_best_split(
        &self,
        samples: &NodeSamples,
        rows: &[usize],
        parent_impurity: f64,
        rng: &mut ChaCha8Rng,
    ) -> Option<(usize, f64, f64)> {
        let n_features = samples.x.ncols();
        let n_try = self.max_features.unwrap_or(n_features).clamp(1, n_features.max(1));
        let candidates: Vec<usize> = if n_try < n_features {
            sample(rng, n_features, n_try).into_vec()
        } else {
            (0..n_features).collect()
        };

        // Each feature is swept independently over its sorted values
        candidates
            .into_par_iter()
            .filter_map(|feature_idx| self.best_threshold(samples, rows, feature_idx, parent_impurity))
            .max_by(|a, b| a.2.total_cmp(&b.2).then(b.0.cmp(&a.0)))
    }

    fn best_threshold(
        &self,
        samples: &NodeSamples,
        rows: &[usize],
        feature_idx: usize,
        parent_impurity: f64,
    ) -> Option<(usize, f64, f64)> {
        let mut column: Vec<(f64, usize)> = rows
            .iter()
            .map(|&i| (samples.x[[i, feature_idx]], samples.labels[i]))
            .collect();
        column.sort_by(|a, b| a.0.total_cmp(&b.0));

        let n = column.len();
        let mut left_counts = vec![0usize; samples.n_classes];
        let mut right_counts = vec![0usize; samples.n_classes];
        for &(_, label) in &column {
            right_counts[label] += 1;
        }

        let mut best: Option<(f64, f64)> = None;
        for i in 0..n.saturating_sub(1) {
            let label = column[i].1;
            left_counts[label] += 1;
            right_counts[label] -= 1;

            let left_n = i + 1;
            let right_n = n - left_n;
            if column[i].0 == column[i + 1].0
                || left_n < self.min_samples_leaf
                || right_n < self.min_samples_leaf
            {
                continue;
            }

            let weighted = (left_n as f64 * self.criterion.impurity(&left_counts, left_n)
                + right_n as f64 * self.criterion.impurity(&right_counts, right_n))
                / n as f64;
            let gain = parent_impurity - weighted;
            if gain > best.map_or(0.0, |b| b.1) {
                best = Some(((column[i].0 + column[i + 1].0) / 2.0, gain));
            }
        }

        best.map(|(threshold, gain)| (feature_idx, threshold, gain))
    }

    fn leaf_distribution<'a>(node: &'a TreeNode, row: ArrayView1<f64>) -> &'a [f64] {
        let mut node = node;
        loop {
            match node {
                TreeNode::Leaf { distribution, .. } => return distribution,
                TreeNode::Split {
                    feature_idx,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    node = if row[*feature_idx] <= *threshold { left } else { right };
                }
            }
        }
    }

    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let root = self.root.as_ref().ok_or(CanopyError::ModelNotFitted)?;
        if x.ncols() != self.n_features {
            return Err(CanopyError::ShapeError {
                expected: format!("{} features", self.n_features),
                actual: format!("{} features", x.ncols()),
            });
        }

        let n_classes = self.classes.len();
        let mut proba = Array2::zeros((x.nrows(), n_classes));
        for (i, row) in x.rows().into_iter().enumerate() {
            let distribution = Self::leaf_distribution(root, row);
            for (j, p) in distribution.iter().enumerate() {
                proba[[i, j]] = *p;
            }
        }
        Ok(proba)
    }

    /// Depth of the fitted tree
    pub fn depth(&self) -> usize {
        fn node_depth(node: &TreeNode) -> usize {
            match node {
                TreeNode::Leaf { .. } => 0,
                TreeNode::Split { left, right, .. } => 1 + node_depth(left).max(node_depth(right)),
            }
        }
        self.root.as_ref().map_or(0, node_depth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn xor_like() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_vec(
            (8, 2),
            vec![
                0.0, 0.0, 0.1, 0.1, 1.0, 1.0, 1.1, 1.1, 0.0, 1.0, 0.1, 1.1, 1.0, 0.0, 1.1, 0.1,
            ],
        )
        .unwrap();
        let y = Array1::from_vec(vec![0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0]);
        (x, y)
    }

    #[test]
    fn test_tree_fits_training_data() {
        let x = Array2::from_shape_vec((6, 1), vec![1.0, 2.0, 3.0, 10.0, 11.0, 12.0]).unwrap();
        let y = Array1::from_vec(vec![3.0, 3.0, 3.0, 7.0, 7.0, 7.0]);
        let mut tree = DecisionTree::new();
        tree.fit(&x, &y).unwrap();

        assert_eq!(tree.classes(), &[3.0, 7.0]);
        assert_eq!(tree.depth(), 1);
        let proba = tree.predict_proba(&x).unwrap();
        assert_eq!(proba[[0, 0]], 1.0);
        assert_eq!(proba[[5, 1]], 1.0);
    }

    #[test]
    fn test_max_depth_limits_tree() {
        let (x, y) = xor_like();
        let mut tree = DecisionTree::new();
        tree.max_depth = Some(1);
        tree.fit(&x, &y).unwrap();
        assert!(tree.depth() <= 1);
    }

    #[test]
    fn test_min_samples_leaf_respected() {
        let x = Array2::from_shape_vec((6, 1), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let y = Array1::from_vec(vec![0.0, 1.0, 1.0, 1.0, 1.0, 1.0]);
        let mut tree = DecisionTree::new();
        tree.min_samples_leaf = 2;
        tree.fit(&x, &y).unwrap();
        match tree.root.as_ref().unwrap() {
            TreeNode::Split { left, .. } => match left.as_ref() {
                TreeNode::Leaf { n_samples, .. } => assert!(*n_samples >= 2),
                TreeNode::Split { n_samples, .. } => assert!(*n_samples >= 2),
            },
            TreeNode::Leaf { .. } => {}
        }
    }

    #[test]
    fn test_entropy_criterion() {
        let (x, y) = xor_like();
        let mut tree = DecisionTree::new().with_criterion(Criterion::Entropy);
        tree.fit(&x, &y).unwrap();
        let proba = tree.predict_proba(&x).unwrap();
        assert_eq!(proba.dim(), (8, 2));
    }
}
