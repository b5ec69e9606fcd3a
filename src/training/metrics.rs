//! Classification metrics used to score cross-validation folds
//!
//! Labels are mapped onto indices of a shared class list so every fold is
//! scored against the same columns, even when a class is missing from it.

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Per-fold (or averaged) training metrics
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Scores {
    pub balanced_accuracy: f64,
    pub f1_weighted: f64,
    pub roc_auc: f64,
}

impl Scores {
    /// Score probabilities whose columns follow `classes`.
    pub fn compute(y_true: &Array1<f64>, proba: &Array2<f64>, classes: &[f64]) -> Self {
        let truth: Vec<usize> = y_true.iter().map(|&v| class_position(classes, v)).collect();
        let predicted: Vec<usize> = proba
            .rows()
            .into_iter()
            .map(|row| {
                row.iter()
                    .enumerate()
                    .fold((0, f64::NEG_INFINITY), |best, (j, &p)| if p > best.1 { (j, p) } else { best })
                    .0
            })
            .collect();

        let cm = ConfusionMatrix::from_predictions(&predicted, &truth, classes.len());
        Self {
            balanced_accuracy: cm.balanced_accuracy(),
            f1_weighted: cm.f1_weighted(),
            roc_auc: roc_auc_ovo_weighted(&truth, proba),
        }
    }

    pub fn mean(scores: &[Scores]) -> Self {
        if scores.is_empty() {
            return Self::default();
        }
        let n = scores.len() as f64;
        Self {
            balanced_accuracy: scores.iter().map(|s| s.balanced_accuracy).sum::<f64>() / n,
            f1_weighted: scores.iter().map(|s| s.f1_weighted).sum::<f64>() / n,
            roc_auc: scores.iter().map(|s| s.roc_auc).sum::<f64>() / n,
        }
    }

    /// Metric names as recorded by the tracker
    pub fn named(&self) -> [(&'static str, f64); 3] {
        [
            ("accuracy_balanced", self.balanced_accuracy),
            ("F1_weighted", self.f1_weighted),
            ("ROC_AUC", self.roc_auc),
        ]
    }
}

/// Fraction of exactly matching labels
pub fn accuracy(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }
    let correct = y_true.iter().zip(y_pred).filter(|(t, p)| t == p).count();
    correct as f64 / y_true.len() as f64
}

fn class_position(classes: &[f64], value: f64) -> usize {
    classes
        .iter()
        .position(|&c| c == value)
        .unwrap_or(classes.len())
}

/// Confusion matrix: `matrix[true][predicted]`
#[derive(Debug, Clone)]
pub struct ConfusionMatrix {
    matrix: Vec<Vec<usize>>,
}

impl ConfusionMatrix {
    /// Labels outside `0..n_classes` are ignored.
    pub fn from_predictions(y_pred: &[usize], y_true: &[usize], n_classes: usize) -> Self {
        let mut matrix = vec![vec![0; n_classes]; n_classes];
        for (&pred, &truth) in y_pred.iter().zip(y_true) {
            if pred < n_classes && truth < n_classes {
                matrix[truth][pred] += 1;
            }
        }
        Self { matrix }
    }

    pub fn n_classes(&self) -> usize {
        self.matrix.len()
    }

    pub fn get(&self, truth: usize, predicted: usize) -> usize {
        self.matrix[truth][predicted]
    }

    pub fn support(&self, class: usize) -> usize {
        self.matrix[class].iter().sum()
    }

    fn true_positives(&self, class: usize) -> usize {
        self.matrix[class][class]
    }

    fn predicted_count(&self, class: usize) -> usize {
        self.matrix.iter().map(|row| row[class]).sum()
    }

    fn recall(&self, class: usize) -> f64 {
        let support = self.support(class);
        if support == 0 {
            0.0
        } else {
            self.true_positives(class) as f64 / support as f64
        }
    }

    fn precision(&self, class: usize) -> f64 {
        let predicted = self.predicted_count(class);
        if predicted == 0 {
            0.0
        } else {
            self.true_positives(class) as f64 / predicted as f64
        }
    }

    fn f1(&self, class: usize) -> f64 {
        let (p, r) = (self.precision(class), self.recall(class));
        if p + r > 0.0 {
            2.0 * p * r / (p + r)
        } else {
            0.0
        }
    }

    /// Mean recall over the classes present in the ground truth
    pub fn balanced_accuracy(&self) -> f64 {
        let present: Vec<usize> = (0..self.n_classes()).filter(|&c| self.support(c) > 0).collect();
        if present.is_empty() {
            return 0.0;
        }
        present.iter().map(|&c| self.recall(c)).sum::<f64>() / present.len() as f64
    }

    /// Per-class F1 weighted by support
    pub fn f1_weighted(&self) -> f64 {
        let total: usize = (0..self.n_classes()).map(|c| self.support(c)).sum();
        if total == 0 {
            return 0.0;
        }
        (0..self.n_classes())
            .map(|c| self.f1(c) * self.support(c) as f64)
            .sum::<f64>()
            / total as f64
    }
}

/// Area under the ROC curve of `scores` separating `positive` from the rest,
/// via the rank-sum statistic with tied scores sharing their average rank.
pub fn binary_auc(scores: &[f64], positive: &[bool]) -> Option<f64> {
    let n_pos = positive.iter().filter(|&&p| p).count();
    let n_neg = positive.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut rank_sum = 0.0;
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        let avg_rank = (i + j) as f64 / 2.0 + 1.0;
        rank_sum += order[i..=j].iter().filter(|&&k| positive[k]).count() as f64 * avg_rank;
        i = j + 1;
    }

    let u = rank_sum - (n_pos * (n_pos + 1)) as f64 / 2.0;
    Some(u / (n_pos * n_neg) as f64)
}

/// One-vs-one ROC AUC averaged over class pairs, each pair weighted by how
/// many samples it covers. Binary problems reduce to the plain AUC.
pub fn roc_auc_ovo_weighted(truth: &[usize], proba: &Array2<f64>) -> f64 {
    let n_classes = proba.ncols();
    let mut weighted_sum = 0.0;
    let mut total_weight = 0.0;

    for a in 0..n_classes {
        for b in (a + 1)..n_classes {
            let rows: Vec<usize> = (0..truth.len())
                .filter(|&i| truth[i] == a || truth[i] == b)
                .collect();
            let is_a: Vec<bool> = rows.iter().map(|&i| truth[i] == a).collect();
            let is_b: Vec<bool> = is_a.iter().map(|p| !p).collect();
            let score_a: Vec<f64> = rows.iter().map(|&i| proba[[i, a]]).collect();
            let score_b: Vec<f64> = rows.iter().map(|&i| proba[[i, b]]).collect();

            if let (Some(ab), Some(ba)) = (binary_auc(&score_a, &is_a), binary_auc(&score_b, &is_b)) {
                let weight = rows.len() as f64;
                weighted_sum += weight * (ab + ba) / 2.0;
                total_weight += weight;
            }
        }
    }

    if total_weight > 0.0 {
        weighted_sum / total_weight
    } else {
        0.5
    }
}
