//! Classification metrics for a single test fold.
//!
//! [`score`] combines two measurements:
//!
//! - a macro-averaged one-vs-one ROC AUC over every class in the truth
//!   (Hand & Till), reported as [`AucScore::Undefined`] when it cannot be
//!   computed rather than as an error;
//! - an operating point on the precision/recall curve of one class: the
//!   first curve point whose precision reaches a floor.

use crate::types::{distinct_labels, Label};
use serde::{Deserialize, Serialize};
use std::fmt;

/// ROC AUC, or the sentinel for folds where it is not defined.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AucScore {
    Value(f64),
    Undefined,
}

impl AucScore {
    pub fn value(&self) -> Option<f64> {
        match self {
            AucScore::Value(v) => Some(*v),
            AucScore::Undefined => None,
        }
    }

    pub fn is_defined(&self) -> bool {
        matches!(self, AucScore::Value(_))
    }
}

impl fmt::Display for AucScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AucScore::Value(v) => write!(f, "{:.3}", v),
            AucScore::Undefined => write!(f, "AUC undefined"),
        }
    }
}

/// Metrics for one fold. Precision, recall and threshold are `None` when no
/// curve point reaches the precision floor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FoldScores {
    pub auc: AucScore,
    pub precision: Option<f64>,
    pub recall: Option<f64>,
    pub threshold: Option<f64>,
}

/// Precision/recall pairs per decision threshold.
///
/// `precision` and `recall` have one more entry than `thresholds`: the last
/// point is always `(1.0, 0.0)` and has no threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrecisionRecallCurve {
    pub precision: Vec<f64>,
    pub recall: Vec<f64>,
    pub thresholds: Vec<f64>,
}

/// First curve point at or above a precision floor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OperatingPoint {
    pub index: usize,
    pub precision: f64,
    pub recall: f64,
    /// `thresholds[index - 1]`; absent for the first point.
    pub threshold: Option<f64>,
}

pub(crate) fn round3(x: f64) -> f64 {
    (x * 1000.0).round() / 1000.0
}

/// Ranks starting at 1, ties receive the mean of the ranks they span.
fn average_ranks(scores: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut ranks = vec![0.0; scores.len()];
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && scores[order[end]] == scores[order[start]] {
            end += 1;
        }
        // positions start..end hold ranks start+1..=end
        let rank = (start + 1 + end) as f64 / 2.0;
        for &i in &order[start..end] {
            ranks[i] = rank;
        }
        start = end;
    }
    ranks
}

/// Binary ROC AUC via the Mann-Whitney rank sum. `None` unless both classes
/// are present.
pub fn roc_auc_binary(truth: &[bool], scores: &[f64]) -> Option<f64> {
    if truth.len() != scores.len() {
        return None;
    }
    let n_pos = truth.iter().filter(|&&t| t).count();
    let n_neg = truth.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return None;
    }

    let ranks = average_ranks(scores);
    let rank_sum: f64 = truth
        .iter()
        .zip(&ranks)
        .filter(|(t, _)| **t)
        .map(|(_, r)| r)
        .sum();
    let n_pos = n_pos as f64;
    let u = rank_sum - n_pos * (n_pos + 1.0) / 2.0;
    Some(u / (n_pos * n_neg as f64))
}

/// Macro-averaged one-vs-one ROC AUC.
///
/// For each unordered pair of classes present in `true_labels`, the rows of
/// either class are scored twice (a against b with column a, b against a with
/// column b) and the two AUCs averaged; the result is the mean over pairs.
pub fn roc_auc_ovo_macro(
    probabilities: &[Vec<f64>],
    true_labels: &[Label],
    classes: &[Label],
) -> AucScore {
    if probabilities.len() != true_labels.len() {
        return AucScore::Undefined;
    }
    if probabilities.iter().any(|row| row.len() != classes.len()) {
        return AucScore::Undefined;
    }

    let present = distinct_labels(true_labels);
    if present.len() < 2 {
        return AucScore::Undefined;
    }
    let mut columns = Vec::with_capacity(present.len());
    for label in &present {
        match classes.iter().position(|c| c == label) {
            Some(col) => columns.push(col),
            None => return AucScore::Undefined,
        }
    }

    let mut total = 0.0;
    let mut pairs = 0;
    for a in 0..present.len() {
        for b in (a + 1)..present.len() {
            let rows: Vec<usize> = (0..true_labels.len())
                .filter(|&i| true_labels[i] == present[a] || true_labels[i] == present[b])
                .collect();
            let is_a: Vec<bool> = rows.iter().map(|&i| true_labels[i] == present[a]).collect();
            let is_b: Vec<bool> = is_a.iter().map(|t| !t).collect();
            let score_a: Vec<f64> = rows.iter().map(|&i| probabilities[i][columns[a]]).collect();
            let score_b: Vec<f64> = rows.iter().map(|&i| probabilities[i][columns[b]]).collect();

            match (roc_auc_binary(&is_a, &score_a), roc_auc_binary(&is_b, &score_b)) {
                (Some(ab), Some(ba)) => total += (ab + ba) / 2.0,
                _ => return AucScore::Undefined,
            }
            pairs += 1;
        }
    }

    AucScore::Value(total / pairs as f64)
}

/// Precision/recall for every distinct score used as a threshold.
///
/// Thresholds ascend; point `k` predicts positive when `score >= thresholds[k]`.
/// Precision is 0 when nothing is predicted positive and recall is 1 when
/// there are no positives. The point `(1.0, 0.0)` is appended.
pub fn precision_recall_curve(truth: &[bool], scores: &[f64]) -> PrecisionRecallCurve {
    let n = truth.len().min(scores.len());
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    let total_pos = truth[..n].iter().filter(|&&t| t).count() as f64;

    // Walk scores high to low; at the end of each run of equal scores the
    // cumulative counts are those of `score >= run value`.
    let mut thresholds = Vec::new();
    let mut precision = Vec::new();
    let mut recall = Vec::new();
    let (mut tp, mut fp) = (0.0, 0.0);
    for (pos, &i) in order.iter().enumerate() {
        if truth[i] {
            tp += 1.0;
        } else {
            fp += 1.0;
        }
        let run_ends = pos + 1 == order.len() || scores[order[pos + 1]] != scores[i];
        if run_ends {
            thresholds.push(scores[i]);
            precision.push(if tp + fp > 0.0 { tp / (tp + fp) } else { 0.0 });
            recall.push(if total_pos > 0.0 { tp / total_pos } else { 1.0 });
        }
    }

    thresholds.reverse();
    precision.reverse();
    recall.reverse();
    precision.push(1.0);
    recall.push(0.0);

    PrecisionRecallCurve {
        precision,
        recall,
        thresholds,
    }
}

/// First point, in curve order, with `precision >= floor`.
pub fn first_operating_point(curve: &PrecisionRecallCurve, floor: f64) -> Option<OperatingPoint> {
    let index = curve.precision.iter().position(|&p| p >= floor)?;
    let threshold = match index {
        0 => None,
        i => curve.thresholds.get(i - 1).copied(),
    };
    Some(OperatingPoint {
        index,
        precision: curve.precision[index],
        recall: curve.recall[index],
        threshold,
    })
}

/// Score one fold's predictions.
///
/// `probabilities` is N x C with columns in the order of `classes`.
/// `positive_class_index` is the column of `positive_class`; `None` (the
/// model never saw the class) scores every row 0.
pub fn score(
    probabilities: &[Vec<f64>],
    true_labels: &[Label],
    classes: &[Label],
    positive_class: Label,
    positive_class_index: Option<usize>,
    precision_threshold: f64,
) -> FoldScores {
    let auc = match roc_auc_ovo_macro(probabilities, true_labels, classes) {
        AucScore::Value(v) => AucScore::Value(round3(v)),
        AucScore::Undefined => AucScore::Undefined,
    };

    let truth: Vec<bool> = true_labels.iter().map(|&l| l == positive_class).collect();
    let scores: Vec<f64> = probabilities
        .iter()
        .map(|row| {
            positive_class_index
                .and_then(|col| row.get(col).copied())
                .unwrap_or(0.0)
        })
        .collect();

    let curve = precision_recall_curve(&truth, &scores);
    match first_operating_point(&curve, precision_threshold) {
        Some(point) => FoldScores {
            auc,
            precision: Some(round3(point.precision)),
            recall: Some(round3(point.recall)),
            threshold: point.threshold.map(round3),
        },
        None => FoldScores {
            auc,
            precision: None,
            recall: None,
            threshold: None,
        },
    }
}
