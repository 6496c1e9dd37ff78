//! Dedup and merge of candidate factors against the accepted baseline
//!
//! Similarity between a baseline column and a candidate column is the
//! mean of per-timestamp-bucket Pearson correlations (cross-sectional
//! over instruments). The two-level aggregation tolerates time-varying
//! relationships; a single global correlation could mask bucketed
//! structure.

use tracing::debug;

use crate::config::Settings;
use crate::factor::FactorMatrix;
use crate::{Error, Result};

/// Combines a baseline factor matrix with candidate factors,
/// deduplicating near-identical candidate columns.
#[derive(Debug, Clone)]
pub struct FactorMerger {
    threshold: f64,
}

impl FactorMerger {
    /// Create a merger using the configured similarity cutoff.
    #[must_use]
    pub fn new(settings: &Settings) -> Self {
        Self {
            threshold: settings.threshold(),
        }
    }

    /// Merge candidate factors into the baseline.
    ///
    /// With a non-empty baseline, every candidate column whose maximum
    /// similarity against any baseline column reaches the threshold is
    /// dropped as a duplicate. Surviving candidates are concatenated
    /// after the baseline columns, rows incomplete in either input are
    /// dropped, the index stays sorted, and duplicate column names keep
    /// the last occurrence.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyFactor`] when the candidate matrix is
    /// empty or when dedup eliminates every candidate column. The
    /// result is never silently empty.
    pub fn merge(
        &self,
        baseline: Option<&FactorMatrix>,
        candidate: FactorMatrix,
    ) -> Result<FactorMatrix> {
        if candidate.is_empty() {
            return Err(Error::EmptyFactor("candidate matrix is empty".to_string()));
        }

        let baseline = baseline.filter(|base| !base.is_empty());
        let survivors = match baseline {
            Some(base) => self.deduplicate(base, &candidate)?,
            None => candidate,
        };

        let mut combined = match baseline {
            Some(base) => FactorMatrix::concat_columns([base.clone(), survivors]),
            None => survivors,
        };
        combined.dedup_column_names();
        combined.drop_missing();
        Ok(combined)
    }

    /// Drop candidate columns that duplicate a baseline column.
    ///
    /// Retention requires the maximum similarity to be *strictly*
    /// below the threshold. A candidate sharing no complete bucket
    /// with the baseline has undefined similarity and is dropped.
    fn deduplicate(&self, baseline: &FactorMatrix, candidate: &FactorMatrix) -> Result<FactorMatrix> {
        let scores = max_similarity(baseline, candidate);
        let keep: Vec<String> = candidate
            .columns()
            .iter()
            .zip(&scores)
            .filter_map(|(name, score)| match score {
                Some(s) if *s < self.threshold => Some(name.clone()),
                Some(s) => {
                    debug!(column = %name, similarity = s, "dropping duplicate candidate");
                    None
                }
                None => {
                    debug!(column = %name, "dropping candidate with undefined similarity");
                    None
                }
            })
            .collect();

        if keep.is_empty() {
            return Err(Error::EmptyFactor(
                "all candidate columns were deduplicated against the baseline".to_string(),
            ));
        }

        let mut kept = candidate.clone();
        kept.select_columns(&keep);
        Ok(kept)
    }
}

/// For each candidate column, the maximum similarity score against all
/// baseline columns, or `None` when no pair has a defined score.
fn max_similarity(baseline: &FactorMatrix, candidate: &FactorMatrix) -> Vec<Option<f64>> {
    let n_base = baseline.num_columns();
    let n_cand = candidate.num_columns();
    let combined = FactorMatrix::concat_columns([baseline.clone(), candidate.clone()]);

    // Per (baseline, candidate) pair: sum and count of bucket correlations.
    let mut sums = vec![0.0_f64; n_base * n_cand];
    let mut counts = vec![0_usize; n_base * n_cand];

    let mut bucket: Vec<&Vec<Option<f64>>> = Vec::new();
    let mut bucket_ts = None;
    for (key, row) in combined.rows() {
        if bucket_ts != Some(key.0) {
            accumulate_bucket(&bucket, n_base, n_cand, &mut sums, &mut counts);
            bucket.clear();
            bucket_ts = Some(key.0);
        }
        bucket.push(row);
    }
    accumulate_bucket(&bucket, n_base, n_cand, &mut sums, &mut counts);

    (0..n_cand)
        .map(|j| {
            (0..n_base)
                .filter_map(|i| {
                    let idx = i * n_cand + j;
                    (counts[idx] > 0).then(|| sums[idx] / counts[idx] as f64)
                })
                .fold(None, |acc: Option<f64>, s| {
                    Some(acc.map_or(s, |a| a.max(s)))
                })
        })
        .collect()
}

/// Add one timestamp bucket's pairwise correlations to the accumulators.
fn accumulate_bucket(
    bucket: &[&Vec<Option<f64>>],
    n_base: usize,
    n_cand: usize,
    sums: &mut [f64],
    counts: &mut [usize],
) {
    if bucket.len() < 2 {
        return;
    }
    for i in 0..n_base {
        for j in 0..n_cand {
            let pairs: Vec<(f64, f64)> = bucket
                .iter()
                .filter_map(|row| {
                    let x = FactorMatrix::cell(row, i)?;
                    let y = FactorMatrix::cell(row, n_base + j)?;
                    Some((x, y))
                })
                .collect();
            if let Some(corr) = pearson(&pairs) {
                let idx = i * n_cand + j;
                sums[idx] += corr;
                counts[idx] += 1;
            }
        }
    }
}

/// Pearson correlation over paired observations. `None` with fewer
/// than two points or zero variance on either side.
fn pearson(pairs: &[(f64, f64)]) -> Option<f64> {
    if pairs.len() < 2 {
        return None;
    }
    #[allow(clippy::cast_precision_loss)]
    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|(_, y)| y).sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (x, y) in pairs {
        let dx = x - mean_x;
        let dy = y - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    let denom = (var_x * var_y).sqrt();
    if denom == 0.0 {
        return None;
    }
    Some(cov / denom)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, d, 0, 0, 0).unwrap()
    }

    const INSTRUMENTS: [&str; 3] = ["AAPL", "MSFT", "NVDA"];

    /// One column over 3 days x 3 instruments, values supplied per
    /// (day, instrument) slot.
    fn matrix(column: &str, values: [[f64; 3]; 3]) -> FactorMatrix {
        let mut m = FactorMatrix::new();
        for (d, row) in values.iter().enumerate() {
            for (i, value) in row.iter().enumerate() {
                m.insert(day(u32::try_from(d).unwrap() + 1), INSTRUMENTS[i], column, *value);
            }
        }
        m
    }

    fn merger() -> FactorMerger {
        FactorMerger::new(&Settings::new())
    }

    #[test]
    fn test_pearson_basic() {
        let perfect = [(1.0, 2.0), (2.0, 4.0), (3.0, 6.0)];
        assert!((pearson(&perfect).unwrap() - 1.0).abs() < 1e-12);

        let inverse = [(1.0, 3.0), (2.0, 2.0), (3.0, 1.0)];
        assert!((pearson(&inverse).unwrap() + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_pearson_degenerate() {
        assert_eq!(pearson(&[(1.0, 2.0)]), None);
        // zero variance on one side
        assert_eq!(pearson(&[(1.0, 5.0), (2.0, 5.0), (3.0, 5.0)]), None);
    }

    #[test]
    fn test_empty_candidate_fails() {
        let err = merger()
            .merge(None, FactorMatrix::new())
            .unwrap_err();
        assert!(err.is_empty_factor());
    }

    #[test]
    fn test_no_baseline_passes_candidate_through() {
        let candidate = matrix("f1", [[1.0, 2.0, 3.0], [2.0, 3.0, 4.0], [3.0, 4.0, 5.0]]);
        let merged = merger().merge(None, candidate.clone()).unwrap();
        assert_eq!(merged.columns(), ["f1"]);
        assert_eq!(merged.num_rows(), 9);
    }

    #[test]
    fn test_dedup_threshold_keeps_low_drops_high() {
        let baseline = matrix("b", [[1.0, 2.0, 3.0], [4.0, 5.0, 6.0], [7.0, 8.0, 9.0]]);
        // c1 duplicates b exactly (similarity 1.0)
        let c1 = matrix("c1", [[1.0, 2.0, 3.0], [4.0, 5.0, 6.0], [7.0, 8.0, 9.0]]);
        // c2 has cross-sectional correlation 0.5 with b in every bucket
        let c2 = matrix("c2", [[1.0, 3.0, 2.0], [4.0, 6.0, 5.0], [7.0, 9.0, 8.0]]);
        let candidate = FactorMatrix::concat_columns([c1, c2]);

        let merged = merger().merge(Some(&baseline), candidate).unwrap();
        assert_eq!(merged.columns(), ["b", "c2"]);
    }

    #[test]
    fn test_all_candidates_deduplicated_fails() {
        let baseline = matrix("b", [[1.0, 2.0, 3.0], [4.0, 5.0, 6.0], [7.0, 8.0, 9.0]]);
        // scaled copy: correlation 1.0 in every bucket
        let candidate = matrix("c", [[2.0, 4.0, 6.0], [8.0, 10.0, 12.0], [14.0, 16.0, 18.0]]);

        let err = merger().merge(Some(&baseline), candidate).unwrap_err();
        assert!(err.is_empty_factor());
    }

    #[test]
    fn test_merged_rows_complete_and_sorted() {
        let baseline = matrix("b", [[1.0, 2.0, 3.0], [4.0, 5.0, 6.0], [7.0, 8.0, 9.0]]);
        // candidate missing day 3 entirely: merged rows shrink to the
        // intersection once incomplete rows are dropped
        let mut candidate = FactorMatrix::new();
        for (d, values) in [[1.0, 3.0, 2.0], [5.0, 4.0, 6.0]].iter().enumerate() {
            for (i, value) in values.iter().enumerate() {
                candidate.insert(day(u32::try_from(d).unwrap() + 1), INSTRUMENTS[i], "c", *value);
            }
        }

        let merged = merger().merge(Some(&baseline), candidate).unwrap();
        assert_eq!(merged.columns(), ["b", "c"]);
        assert_eq!(merged.num_rows(), 6);
        assert_eq!(merged.timestamps(), vec![day(1), day(2)]);
    }

    #[test]
    fn test_custom_threshold() {
        let baseline = matrix("b", [[1.0, 2.0, 3.0], [4.0, 5.0, 6.0], [7.0, 8.0, 9.0]]);
        // similarity 0.5 per bucket, below default cutoff but not 0.4
        let candidate = matrix("c", [[1.0, 3.0, 2.0], [4.0, 6.0, 5.0], [7.0, 9.0, 8.0]]);

        let strict = FactorMerger::new(&Settings::new().correlation_threshold(0.4));
        assert!(strict
            .merge(Some(&baseline), candidate.clone())
            .unwrap_err()
            .is_empty_factor());

        let lenient = FactorMerger::new(&Settings::new().correlation_threshold(0.6));
        let merged = lenient.merge(Some(&baseline), candidate).unwrap();
        assert_eq!(merged.columns(), ["b", "c"]);
    }

    #[test]
    fn test_threshold_boundary_is_exclusive() {
        let baseline = matrix("b", [[1.0, 2.0, 3.0], [4.0, 5.0, 6.0], [7.0, 8.0, 9.0]]);
        // similarity exactly 0.5 in every bucket
        let candidate = matrix("c", [[1.0, 3.0, 2.0], [4.0, 6.0, 5.0], [7.0, 9.0, 8.0]]);

        // retention requires strictly-below: a candidate at the cutoff
        // is dropped
        let at_cutoff = FactorMerger::new(&Settings::new().correlation_threshold(0.5));
        assert!(at_cutoff
            .merge(Some(&baseline), candidate)
            .unwrap_err()
            .is_empty_factor());
    }
}
