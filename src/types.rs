//! Core data types shared by labeling, scoring and evaluation.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Forecast class assigned to a row from its forward price excursions.
///
/// `Unknown` marks rows whose excursions are undefined. It is never a model
/// class and never survives target construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Negative,
    Positive,
    Stable,
    Volatile,
    Unknown,
}

impl Label {
    /// The four classes a model can be trained on, in lexical order.
    pub const CLASSES: [Label; 4] = [
        Label::Negative,
        Label::Positive,
        Label::Stable,
        Label::Volatile,
    ];

    /// Lowercase name used in files and reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Negative => "negative",
            Label::Positive => "positive",
            Label::Stable => "stable",
            Label::Volatile => "volatile",
            Label::Unknown => "unknown",
        }
    }

    /// Whether this label is one of the four trainable classes.
    pub fn is_known(&self) -> bool {
        !matches!(self, Label::Unknown)
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Label {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "negative" => Ok(Label::Negative),
            "positive" => Ok(Label::Positive),
            "stable" => Ok(Label::Stable),
            "volatile" => Ok(Label::Volatile),
            "unknown" => Ok(Label::Unknown),
            other => Err(Error::InvalidInput(format!("Unknown label: '{}'", other))),
        }
    }
}

/// Count of each label in a slice, ordered by label.
pub fn label_counts(labels: &[Label]) -> BTreeMap<Label, usize> {
    let mut counts = BTreeMap::new();
    for &label in labels {
        *counts.entry(label).or_insert(0) += 1;
    }
    counts
}

/// Sorted, de-duplicated labels present in a slice.
pub fn distinct_labels(labels: &[Label]) -> Vec<Label> {
    label_counts(labels).into_keys().collect()
}
