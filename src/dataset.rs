//! Column-oriented time-indexed table.
//!
//! A [`Dataset`] holds one timestamp per row plus any number of named numeric
//! columns (missing values are `None`) and label columns. All operations
//! return new tables; a dataset is never mutated in place once shared.

use crate::error::{Error, Result};
use crate::types::Label;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Numeric column with missing values.
pub type Values = Vec<Option<f64>>;

/// A time-indexed table of numeric and label columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    time_column: String,
    timestamps: Vec<DateTime<Utc>>,
    columns: Vec<(String, Values)>,
    labels: Vec<(String, Vec<Label>)>,
}

impl Dataset {
    /// Create a dataset with only a time index.
    pub fn new(time_column: impl Into<String>, timestamps: Vec<DateTime<Utc>>) -> Self {
        Self {
            time_column: time_column.into(),
            timestamps,
            columns: Vec::new(),
            labels: Vec::new(),
        }
    }

    /// Add (or replace) a numeric column.
    pub fn with_column(mut self, name: impl Into<String>, values: Values) -> Result<Self> {
        let name = name.into();
        self.check_len(&name, values.len())?;
        match self.columns.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => *existing = values,
            None => self.columns.push((name, values)),
        }
        Ok(self)
    }

    /// Add (or replace) a numeric column with no missing values.
    pub fn with_dense_column(self, name: impl Into<String>, values: Vec<f64>) -> Result<Self> {
        self.with_column(name, values.into_iter().map(Some).collect())
    }

    /// Add (or replace) a label column.
    pub fn with_label_column(mut self, name: impl Into<String>, labels: Vec<Label>) -> Result<Self> {
        let name = name.into();
        self.check_len(&name, labels.len())?;
        match self.labels.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => *existing = labels,
            None => self.labels.push((name, labels)),
        }
        Ok(self)
    }

    fn check_len(&self, name: &str, len: usize) -> Result<()> {
        if len != self.timestamps.len() {
            return Err(Error::InvalidInput(format!(
                "Column '{}' has {} values but the dataset has {} rows",
                name,
                len,
                self.timestamps.len()
            )));
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Name of the time index.
    pub fn time_column(&self) -> &str {
        &self.time_column
    }

    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    /// Names of the numeric columns, in insertion order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|(n, _)| n.as_str()).collect()
    }

    /// Names of the label columns, in insertion order.
    pub fn label_column_names(&self) -> Vec<&str> {
        self.labels.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|(n, _)| n == name)
    }

    /// Get a numeric column by name.
    pub fn column(&self, name: &str) -> Result<&[Option<f64>]> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_slice())
            .ok_or_else(|| Error::ColumnNotFound(name.to_string()))
    }

    /// Get a label column by name.
    pub fn label_column(&self, name: &str) -> Result<&[Label]> {
        self.labels
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_slice())
            .ok_or_else(|| Error::ColumnNotFound(name.to_string()))
    }

    /// Keep only the named numeric columns (label columns are kept).
    pub fn select(&self, names: &[&str]) -> Result<Self> {
        let mut columns = Vec::with_capacity(names.len());
        for &name in names {
            columns.push((name.to_string(), self.column(name)?.to_vec()));
        }
        Ok(Self {
            time_column: self.time_column.clone(),
            timestamps: self.timestamps.clone(),
            columns,
            labels: self.labels.clone(),
        })
    }

    /// Rows at the given indices, in the given order.
    pub fn take(&self, indices: &[usize]) -> Self {
        let pick_values = |v: &Values| indices.iter().map(|&i| v[i]).collect::<Values>();
        Self {
            time_column: self.time_column.clone(),
            timestamps: indices.iter().map(|&i| self.timestamps[i]).collect(),
            columns: self
                .columns
                .iter()
                .map(|(n, v)| (n.clone(), pick_values(v)))
                .collect(),
            labels: self
                .labels
                .iter()
                .map(|(n, v)| (n.clone(), indices.iter().map(|&i| v[i]).collect()))
                .collect(),
        }
    }

    /// Rows for which `predicate(row_index)` holds.
    pub fn filter<F>(&self, predicate: F) -> Self
    where
        F: Fn(usize) -> bool,
    {
        let indices: Vec<usize> = (0..self.len()).filter(|&i| predicate(i)).collect();
        self.take(&indices)
    }

    /// Rows strictly before `cutoff`.
    pub fn before(&self, cutoff: DateTime<Utc>) -> Self {
        self.filter(|i| self.timestamps[i] < cutoff)
    }

    /// Rows ordered by timestamp; ties keep their original order.
    pub fn sorted_by_time(&self) -> Self {
        let mut indices: Vec<usize> = (0..self.len()).collect();
        indices.sort_by_key(|&i| self.timestamps[i]);
        self.take(&indices)
    }

    /// Whether timestamps are non-decreasing.
    pub fn is_time_ordered(&self) -> bool {
        self.timestamps.windows(2).all(|w| w[0] <= w[1])
    }

    /// A copy with `name` forward-filled.
    pub fn forward_filled(&self, name: &str) -> Result<Self> {
        let filled = forward_fill(self.column(name)?);
        self.clone().with_column(name, filled)
    }

    /// Dense row-major feature matrix for the named columns.
    ///
    /// Missing values are rejected; impute before building a matrix.
    pub fn feature_matrix(&self, names: &[&str]) -> Result<Vec<Vec<f64>>> {
        let columns = names
            .iter()
            .map(|&n| self.column(n))
            .collect::<Result<Vec<_>>>()?;

        let mut matrix = Vec::with_capacity(self.len());
        for row in 0..self.len() {
            let mut values = Vec::with_capacity(columns.len());
            for (col, name) in columns.iter().zip(names) {
                match col[row] {
                    Some(v) if v.is_finite() => values.push(v),
                    _ => {
                        return Err(Error::DataError(format!(
                            "Missing value in feature column '{}' at {}",
                            name, self.timestamps[row]
                        )))
                    }
                }
            }
            matrix.push(values);
        }
        Ok(matrix)
    }

    /// Join `right` onto `self` by nearest prior timestamp.
    ///
    /// Each left row takes the right row with the greatest timestamp that is
    /// less than or equal to its own. Left rows with no such right row get
    /// missing values. Right column names that clash with left names are
    /// suffixed with `_right`. Both tables must be time-ordered.
    pub fn merge_asof(&self, right: &Dataset) -> Result<Self> {
        if !self.is_time_ordered() || !right.is_time_ordered() {
            return Err(Error::InvalidInput(
                "merge_asof requires both datasets to be sorted by time".to_string(),
            ));
        }

        let mut matches: Vec<Option<usize>> = Vec::with_capacity(self.len());
        let mut j = 0;
        let mut last: Option<usize> = None;
        for ts in &self.timestamps {
            while j < right.len() && right.timestamps[j] <= *ts {
                last = Some(j);
                j += 1;
            }
            matches.push(last);
        }

        let mut merged = self.clone();
        for (name, values) in &right.columns {
            let joined: Values = matches.iter().map(|m| m.and_then(|k| values[k])).collect();
            let target = if merged.has_column(name) {
                format!("{}_right", name)
            } else {
                name.clone()
            };
            merged = merged.with_column(target, joined)?;
        }

        let unmatched = matches.iter().filter(|m| m.is_none()).count();
        debug!(
            "merge_asof joined {} rows ({} without a prior match)",
            merged.len(),
            unmatched
        );
        Ok(merged)
    }

    /// Write the dataset to a CSV file (time column first, RFC 3339).
    pub fn write_csv(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)?;

        let mut header = vec![self.time_column.clone()];
        header.extend(self.columns.iter().map(|(n, _)| n.clone()));
        header.extend(self.labels.iter().map(|(n, _)| n.clone()));
        writer.write_record(&header)?;

        for row in 0..self.len() {
            let mut record = vec![self.timestamps[row].to_rfc3339()];
            for (_, values) in &self.columns {
                record.push(values[row].map(|v| v.to_string()).unwrap_or_default());
            }
            for (_, labels) in &self.labels {
                record.push(labels[row].to_string());
            }
            writer.write_record(&record)?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Carry the last known value forward over missing (or NaN) entries.
///
/// A leading run of missing values stays missing.
pub fn forward_fill(values: &[Option<f64>]) -> Values {
    let mut last = None;
    values
        .iter()
        .map(|v| {
            if let Some(x) = v.filter(|x| !x.is_nan()) {
                last = Some(x);
            }
            last
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn hours(n: usize) -> Vec<DateTime<Utc>> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        (0..n).map(|i| start + Duration::hours(i as i64)).collect()
    }

    #[test]
    fn test_forward_fill_keeps_leading_gap() {
        let filled = forward_fill(&[None, Some(1.0), None, Some(f64::NAN), Some(3.0), None]);
        assert_eq!(filled, vec![None, Some(1.0), Some(1.0), Some(1.0), Some(3.0), Some(3.0)]);
    }

    #[test]
    fn test_with_column_rejects_wrong_length() {
        let ds = Dataset::new("datetime", hours(3));
        assert!(ds.with_dense_column("price", vec![1.0, 2.0]).is_err());
    }

    #[test]
    fn test_column_lookup() {
        let ds = Dataset::new("datetime", hours(2))
            .with_dense_column("price", vec![1.0, 2.0])
            .unwrap();
        assert_eq!(ds.column("price").unwrap(), &[Some(1.0), Some(2.0)]);
        assert!(matches!(ds.column("volume"), Err(Error::ColumnNotFound(_))));
    }

    #[test]
    fn test_sort_is_stable_for_ties() {
        let ts = hours(3);
        let timestamps = vec![ts[1], ts[0], ts[1]];
        let ds = Dataset::new("datetime", timestamps)
            .with_dense_column("order", vec![0.0, 1.0, 2.0])
            .unwrap()
            .sorted_by_time();
        assert_eq!(ds.column("order").unwrap(), &[Some(1.0), Some(0.0), Some(2.0)]);
        assert!(ds.is_time_ordered());
    }

    #[test]
    fn test_before_is_strict() {
        let ts = hours(4);
        let ds = Dataset::new("datetime", ts.clone());
        assert_eq!(ds.before(ts[2]).len(), 2);
    }

    #[test]
    fn test_feature_matrix_rejects_missing() {
        let ds = Dataset::new("datetime", hours(2))
            .with_column("hour", vec![Some(0.0), None])
            .unwrap();
        assert!(matches!(ds.feature_matrix(&["hour"]), Err(Error::DataError(_))));
    }

    #[test]
    fn test_merge_asof_backward() {
        let ts = hours(6);
        let left = Dataset::new("datetime", vec![ts[0], ts[2], ts[3], ts[5]])
            .with_dense_column("system_price", vec![10.0, 11.0, 12.0, 13.0])
            .unwrap();
        let right = Dataset::new("datetime", vec![ts[1], ts[3]])
            .with_dense_column("day_ahead", vec![50.0, 60.0])
            .unwrap();

        let merged = left.merge_asof(&right).unwrap();
        assert_eq!(
            merged.column("day_ahead").unwrap(),
            &[None, Some(50.0), Some(60.0), Some(60.0)]
        );
        assert_eq!(merged.len(), 4);
    }

    #[test]
    fn test_merge_asof_suffixes_clashing_names() {
        let ts = hours(2);
        let left = Dataset::new("datetime", ts.clone())
            .with_dense_column("price", vec![1.0, 2.0])
            .unwrap();
        let right = Dataset::new("datetime", ts)
            .with_dense_column("price", vec![3.0, 4.0])
            .unwrap();
        let merged = left.merge_asof(&right).unwrap();
        assert_eq!(merged.column("price_right").unwrap(), &[Some(3.0), Some(4.0)]);
    }
}
