//! Probability models used by the walk-forward evaluator.
//!
//! The evaluator only needs [`ProbabilityModel`]: fit on a dense feature
//! matrix and labels, then return one probability per class for new rows.
//! [`RandomForest`] is the built-in implementation.
//!
//! # Custom models
//!
//! ```
//! use heron::error::Result;
//! use heron::model::ProbabilityModel;
//! use heron::types::Label;
//!
//! /// Predicts the training class frequencies for every row.
//! struct Prior {
//!     classes: Vec<Label>,
//!     freqs: Vec<f64>,
//! }
//!
//! impl ProbabilityModel for Prior {
//!     fn name(&self) -> &str {
//!         "prior"
//!     }
//!
//!     fn fit(&mut self, _features: &[Vec<f64>], labels: &[Label]) -> Result<()> {
//!         self.classes = heron::types::distinct_labels(labels);
//!         self.freqs = self
//!             .classes
//!             .iter()
//!             .map(|c| labels.iter().filter(|l| *l == c).count() as f64 / labels.len() as f64)
//!             .collect();
//!         Ok(())
//!     }
//!
//!     fn predict_proba(&self, features: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
//!         Ok(vec![self.freqs.clone(); features.len()])
//!     }
//!
//!     fn classes(&self) -> &[Label] {
//!         &self.classes
//!     }
//! }
//! ```

use crate::error::{Error, Result};
use crate::types::{distinct_labels, Label};
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A classifier that outputs class probabilities.
pub trait ProbabilityModel: Send {
    /// Model name for logs and reports.
    fn name(&self) -> &str;

    /// Train on row-major `features` and matching `labels`.
    fn fit(&mut self, features: &[Vec<f64>], labels: &[Label]) -> Result<()>;

    /// One row per input row, one column per entry of [`classes`](Self::classes).
    fn predict_proba(&self, features: &[Vec<f64>]) -> Result<Vec<Vec<f64>>>;

    /// Class of each probability column, fixed after `fit`.
    fn classes(&self) -> &[Label];

    /// Column index of a class, if the model knows it.
    fn class_index(&self, label: Label) -> Option<usize> {
        self.classes().iter().position(|&c| c == label)
    }
}

/// Number of features considered at each split.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaxFeatures {
    /// `ceil(sqrt(n_features))`.
    Sqrt,
    /// Every feature.
    All,
    /// A fixed count (clamped to the number of features).
    Count(usize),
}

impl MaxFeatures {
    fn resolve(&self, n_features: usize) -> usize {
        let k = match self {
            MaxFeatures::Sqrt => (n_features as f64).sqrt().ceil() as usize,
            MaxFeatures::All => n_features,
            MaxFeatures::Count(k) => *k,
        };
        k.clamp(1, n_features.max(1))
    }
}

/// Random forest hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestConfig {
    /// Number of trees.
    pub n_trees: usize,
    /// Maximum tree depth (None = grow until pure or too small).
    pub max_depth: Option<usize>,
    /// Minimum samples in a node before it may split.
    pub min_samples_split: usize,
    /// Minimum samples in each child of a split.
    pub min_samples_leaf: usize,
    /// Features considered per split.
    pub max_features: MaxFeatures,
    /// Weight classes inversely to their frequency.
    pub balanced: bool,
    /// Draw a bootstrap sample per tree.
    pub bootstrap: bool,
    /// Base RNG seed; tree `t` uses `seed + t`.
    pub seed: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_trees: 200,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::Sqrt,
            balanced: true,
            bootstrap: true,
            seed: 42,
        }
    }
}

impl ForestConfig {
    /// A small forest for tests and quick runs.
    pub fn fast() -> Self {
        Self {
            n_trees: 25,
            max_depth: Some(8),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.n_trees == 0 {
            return Err(Error::ConfigError("n_trees must be positive".to_string()));
        }
        if self.min_samples_split < 2 {
            return Err(Error::ConfigError(
                "min_samples_split must be at least 2".to_string(),
            ));
        }
        if self.min_samples_leaf == 0 {
            return Err(Error::ConfigError(
                "min_samples_leaf must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        distribution: Vec<f64>,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// A single CART tree stored as a flat node arena (root at 0).
#[derive(Debug, Clone)]
struct DecisionTree {
    nodes: Vec<Node>,
}

impl DecisionTree {
    fn predict(&self, row: &[f64]) -> &[f64] {
        let mut id = 0;
        loop {
            match &self.nodes[id] {
                Node::Leaf { distribution } => return distribution,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    id = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }
}

/// Training data shared by every tree of a forest.
struct TrainingSet<'a> {
    features: &'a [Vec<f64>],
    targets: Vec<usize>,
    class_weights: Vec<f64>,
    n_classes: usize,
    n_features: usize,
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    score: f64,
}

fn gini(weights: &[f64]) -> f64 {
    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return 0.0;
    }
    1.0 - weights.iter().map(|w| (w / total).powi(2)).sum::<f64>()
}

fn normalized(weights: &[f64]) -> Vec<f64> {
    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        let n = weights.len() as f64;
        return vec![1.0 / n; weights.len()];
    }
    weights.iter().map(|w| w / total).collect()
}

impl TrainingSet<'_> {
    fn class_totals(&self, samples: &[usize]) -> Vec<f64> {
        let mut totals = vec![0.0; self.n_classes];
        for &s in samples {
            let c = self.targets[s];
            totals[c] += self.class_weights[c];
        }
        totals
    }

    fn best_split(
        &self,
        samples: &[usize],
        config: &ForestConfig,
        rng: &mut StdRng,
    ) -> Option<SplitCandidate> {
        let parent = self.class_totals(samples);
        let parent_weight: f64 = parent.iter().sum();
        let parent_impurity = gini(&parent);
        if parent_impurity <= 0.0 {
            return None;
        }

        let k = config.max_features.resolve(self.n_features);
        let mut best: Option<SplitCandidate> = None;
        let mut order = samples.to_vec();

        for feature in sample(rng, self.n_features, k).into_iter() {
            order.sort_by(|&a, &b| {
                self.features[a][feature].total_cmp(&self.features[b][feature])
            });

            let mut left = vec![0.0; self.n_classes];
            for pos in 0..order.len() - 1 {
                let s = order[pos];
                let c = self.targets[s];
                left[c] += self.class_weights[c];

                let n_left = pos + 1;
                let n_right = order.len() - n_left;
                if n_left < config.min_samples_leaf || n_right < config.min_samples_leaf {
                    continue;
                }

                let here = self.features[s][feature];
                let next = self.features[order[pos + 1]][feature];
                if here >= next {
                    continue;
                }

                let right: Vec<f64> = parent.iter().zip(&left).map(|(p, l)| p - l).collect();
                let left_weight: f64 = left.iter().sum();
                let right_weight = parent_weight - left_weight;
                let child_impurity = (left_weight * gini(&left) + right_weight * gini(&right))
                    / parent_weight;
                let score = parent_impurity - child_impurity;

                if score > 1e-12 && best.as_ref().map_or(true, |b| score > b.score) {
                    best = Some(SplitCandidate {
                        feature,
                        threshold: here + (next - here) / 2.0,
                        score,
                    });
                }
            }
        }

        best
    }

    fn grow_tree(&self, config: &ForestConfig, seed: u64) -> DecisionTree {
        let mut rng = StdRng::seed_from_u64(seed);
        let n = self.features.len();
        let samples: Vec<usize> = if config.bootstrap {
            (0..n).map(|_| rng.gen_range(0..n)).collect()
        } else {
            (0..n).collect()
        };

        let mut nodes: Vec<Node> = vec![Node::Leaf {
            distribution: Vec::new(),
        }];
        let mut stack: Vec<(usize, Vec<usize>, usize)> = vec![(0, samples, 0)];

        while let Some((id, samples, depth)) = stack.pop() {
            let depth_ok = config.max_depth.map_or(true, |d| depth < d);
            let split = if depth_ok && samples.len() >= config.min_samples_split {
                self.best_split(&samples, config, &mut rng)
            } else {
                None
            };

            match split {
                Some(candidate) => {
                    let (left_samples, right_samples): (Vec<usize>, Vec<usize>) = samples
                        .iter()
                        .partition(|&&s| self.features[s][candidate.feature] <= candidate.threshold);

                    let left = nodes.len();
                    let right = left + 1;
                    nodes.push(Node::Leaf {
                        distribution: Vec::new(),
                    });
                    nodes.push(Node::Leaf {
                        distribution: Vec::new(),
                    });
                    nodes[id] = Node::Split {
                        feature: candidate.feature,
                        threshold: candidate.threshold,
                        left,
                        right,
                    };
                    stack.push((left, left_samples, depth + 1));
                    stack.push((right, right_samples, depth + 1));
                }
                None => {
                    nodes[id] = Node::Leaf {
                        distribution: normalized(&self.class_totals(&samples)),
                    };
                }
            }
        }

        DecisionTree { nodes }
    }
}

/// Bagged CART classifier with optional balanced class weights.
#[derive(Debug, Clone)]
pub struct RandomForest {
    config: ForestConfig,
    classes: Vec<Label>,
    n_features: usize,
    trees: Vec<DecisionTree>,
}

impl RandomForest {
    pub fn new(config: ForestConfig) -> Self {
        Self {
            config,
            classes: Vec::new(),
            n_features: 0,
            trees: Vec::new(),
        }
    }

    /// Forest with default hyperparameters (200 balanced trees).
    pub fn default_forest() -> Self {
        Self::new(ForestConfig::default())
    }

    pub fn config(&self) -> &ForestConfig {
        &self.config
    }

    pub fn is_fitted(&self) -> bool {
        !self.trees.is_empty()
    }
}

fn check_rectangular(features: &[Vec<f64>], width: usize) -> Result<()> {
    if let Some((i, row)) = features.iter().enumerate().find(|(_, r)| r.len() != width) {
        return Err(Error::ModelError(format!(
            "Row {} has {} features, expected {}",
            i,
            row.len(),
            width
        )));
    }
    Ok(())
}

impl ProbabilityModel for RandomForest {
    fn name(&self) -> &str {
        "random_forest"
    }

    fn fit(&mut self, features: &[Vec<f64>], labels: &[Label]) -> Result<()> {
        self.config.validate()?;
        if features.is_empty() {
            return Err(Error::ModelError(
                "Cannot fit on an empty training set".to_string(),
            ));
        }
        if features.len() != labels.len() {
            return Err(Error::ModelError(format!(
                "{} feature rows but {} labels",
                features.len(),
                labels.len()
            )));
        }
        if labels.contains(&Label::Unknown) {
            return Err(Error::ModelError(
                "Training labels must not contain 'unknown'".to_string(),
            ));
        }
        let n_features = features[0].len();
        if n_features == 0 {
            return Err(Error::ModelError("No feature columns".to_string()));
        }
        check_rectangular(features, n_features)?;

        let classes = distinct_labels(labels);
        let targets: Vec<usize> = labels
            .iter()
            .map(|l| classes.iter().position(|c| c == l).unwrap_or(0))
            .collect();

        let class_weights: Vec<f64> = if self.config.balanced {
            let n = labels.len() as f64;
            let k = classes.len() as f64;
            (0..classes.len())
                .map(|c| {
                    let count = targets.iter().filter(|&&t| t == c).count() as f64;
                    n / (k * count)
                })
                .collect()
        } else {
            vec![1.0; classes.len()]
        };

        let training = TrainingSet {
            features,
            targets,
            class_weights,
            n_classes: classes.len(),
            n_features,
        };

        let config = &self.config;
        let trees: Vec<DecisionTree> = (0..config.n_trees)
            .into_par_iter()
            .map(|t| training.grow_tree(config, config.seed.wrapping_add(t as u64)))
            .collect();

        debug!(
            "Fitted {} trees on {} rows x {} features ({} classes)",
            trees.len(),
            features.len(),
            n_features,
            classes.len()
        );

        self.classes = classes;
        self.n_features = n_features;
        self.trees = trees;
        Ok(())
    }

    fn predict_proba(&self, features: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        if !self.is_fitted() {
            return Err(Error::ModelError("Model has not been fitted".to_string()));
        }
        check_rectangular(features, self.n_features)?;

        let n_trees = self.trees.len() as f64;
        Ok(features
            .iter()
            .map(|row| {
                let mut probs = vec![0.0; self.classes.len()];
                for tree in &self.trees {
                    for (p, q) in probs.iter_mut().zip(tree.predict(row)) {
                        *p += q;
                    }
                }
                probs.iter_mut().for_each(|p| *p /= n_trees);
                probs
            })
            .collect())
    }

    fn classes(&self) -> &[Label] {
        &self.classes
    }
}
