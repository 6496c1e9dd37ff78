//! Factor matrix: `(timestamp, instrument)`-indexed named columns

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};

/// Row index: one observation slot per `(timestamp, instrument)` pair.
pub type IndexKey = (DateTime<Utc>, String);

/// A table of factor values indexed by `(timestamp, instrument)`.
///
/// Rows are kept sorted by index at all times (`BTreeMap` ordering on
/// the key). Cells may be missing before a merge; a merged matrix has
/// had incomplete rows dropped.
///
/// # Example
///
/// ```rust
/// use chrono::{TimeZone, Utc};
/// use factor_forge::factor::FactorMatrix;
///
/// let mut m = FactorMatrix::new();
/// let day = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
/// m.insert(day, "AAPL", "momentum", 0.42);
/// assert_eq!(m.num_rows(), 1);
/// assert_eq!(m.columns(), ["momentum"]);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FactorMatrix {
    columns: Vec<String>,
    rows: BTreeMap<IndexKey, Vec<Option<f64>>>,
}

impl FactorMatrix {
    /// Create an empty matrix.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Column names, in column order. Names are unique except
    /// transiently during a merge concatenation.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Number of rows (distinct `(timestamp, instrument)` keys).
    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    /// Number of columns.
    #[must_use]
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// True when the matrix holds no usable data (no columns or no rows).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty() || self.rows.is_empty()
    }

    /// Set one cell, creating the column and row as needed.
    pub fn insert(
        &mut self,
        timestamp: DateTime<Utc>,
        instrument: impl Into<String>,
        column: &str,
        value: f64,
    ) {
        let col = match self.columns.iter().position(|c| c == column) {
            Some(col) => col,
            None => {
                self.columns.push(column.to_string());
                for row in self.rows.values_mut() {
                    row.push(None);
                }
                self.columns.len() - 1
            }
        };
        let width = self.columns.len();
        let row = self
            .rows
            .entry((timestamp, instrument.into()))
            .or_insert_with(|| vec![None; width]);
        row[col] = Some(value);
    }

    /// Read one cell.
    #[must_use]
    pub fn get(&self, timestamp: DateTime<Utc>, instrument: &str, column: &str) -> Option<f64> {
        let col = self.columns.iter().position(|c| c == column)?;
        self.rows
            .get(&(timestamp, instrument.to_string()))
            .and_then(|row| row.get(col).copied().flatten())
    }

    /// Concatenate matrices column-wise, aligning rows on the union of
    /// their indices. Missing cells stay missing. Duplicate column
    /// names are preserved here; resolve them with
    /// [`dedup_column_names`](Self::dedup_column_names).
    #[must_use]
    pub fn concat_columns<I>(parts: I) -> Self
    where
        I: IntoIterator<Item = Self>,
    {
        let mut combined = Self::new();
        for part in parts {
            let offset = combined.columns.len();
            combined.columns.extend(part.columns.iter().cloned());
            let width = combined.columns.len();
            for row in combined.rows.values_mut() {
                row.resize(width, None);
            }
            for (key, values) in part.rows {
                let row = combined.rows.entry(key).or_insert_with(|| vec![None; width]);
                row.resize(width, None);
                row[offset..offset + values.len()].copy_from_slice(&values);
            }
        }
        combined
    }

    /// Resolve duplicate column names, keeping the last occurrence of
    /// each name (later columns shadow earlier ones).
    pub fn dedup_column_names(&mut self) {
        let keep: Vec<bool> = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, name)| !self.columns[i + 1..].contains(name))
            .collect();
        if keep.iter().all(|&k| k) {
            return;
        }
        self.columns = self
            .columns
            .iter()
            .zip(&keep)
            .filter_map(|(name, &k)| k.then(|| name.clone()))
            .collect();
        for row in self.rows.values_mut() {
            *row = row
                .iter()
                .zip(&keep)
                .filter_map(|(value, &k)| k.then_some(*value))
                .collect();
        }
    }

    /// Drop every row with a missing value in any column.
    pub fn drop_missing(&mut self) {
        let width = self.columns.len();
        self.rows
            .retain(|_, row| row.len() == width && row.iter().all(Option::is_some));
    }

    /// Retain only the named columns, in the order given. Unknown names
    /// are ignored.
    pub fn select_columns(&mut self, names: &[String]) {
        let positions: Vec<usize> = names
            .iter()
            .filter_map(|name| self.columns.iter().position(|c| c == name))
            .collect();
        self.columns = positions
            .iter()
            .map(|&p| self.columns[p].clone())
            .collect();
        for row in self.rows.values_mut() {
            *row = positions
                .iter()
                .map(|&p| row.get(p).copied().flatten())
                .collect();
        }
    }

    /// Smallest positive spacing between consecutive distinct
    /// timestamps, or `None` with fewer than two timestamps.
    #[must_use]
    pub fn min_timestamp_spacing(&self) -> Option<Duration> {
        let timestamps = self.timestamps();
        timestamps
            .windows(2)
            .map(|pair| pair[1] - pair[0])
            .min()
    }

    /// Distinct timestamps in ascending order.
    #[must_use]
    pub fn timestamps(&self) -> Vec<DateTime<Utc>> {
        let mut out: Vec<DateTime<Utc>> = Vec::new();
        for (ts, _) in self.rows.keys() {
            if out.last() != Some(ts) {
                out.push(*ts);
            }
        }
        out
    }

    /// Iterate rows in index order.
    pub(crate) fn rows(&self) -> impl Iterator<Item = (&IndexKey, &Vec<Option<f64>>)> {
        self.rows.iter()
    }

    /// Cell value by column position, tolerating short rows.
    pub(crate) fn cell(row: &[Option<f64>], col: usize) -> Option<f64> {
        row.get(col).copied().flatten()
    }
}
