//! Result cache keyed by task fingerprints
//!
//! One serialized JSON blob per fingerprint under a cache root. Entries
//! are created on first successful development and never auto-
//! invalidated. A corrupt entry is logged and treated as a miss, never
//! surfaced to the caller.
//!
//! Concurrency: there is no cross-process lock around the check/compute/
//! store sequence. Concurrent callers with the same fingerprint may both
//! run the expensive path; the last writer's blob wins. Blobs are
//! written to a temp file and atomically renamed so a reader never sees
//! a torn entry.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::fingerprint::experiment_fingerprint;
use crate::task::Experiment;
use crate::Result;

/// File-backed memoization of expensive develop calls.
#[derive(Debug, Clone)]
pub struct ResultCache {
    root: PathBuf,
}

impl ResultCache {
    /// Create a cache rooted at `root`. The directory is created on
    /// first write.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Cache root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_path(&self, fp: &str) -> PathBuf {
        self.root.join(format!("{fp}.json"))
    }

    /// True if an entry exists for the fingerprint (readable or not).
    #[must_use]
    pub fn contains(&self, fp: &str) -> bool {
        self.entry_path(fp).exists()
    }

    /// Look up a cached experiment. Absent entries miss; unreadable or
    /// undeserializable entries are logged and miss as well.
    #[must_use]
    pub fn get(&self, fp: &str) -> Option<Experiment> {
        let path = self.entry_path(fp);
        if !path.exists() {
            return None;
        }
        let blob = match std::fs::read_to_string(&path) {
            Ok(blob) => blob,
            Err(err) => {
                warn!(fingerprint = fp, error = %err, "unreadable cache entry, treating as miss");
                return None;
            }
        };
        match serde_json::from_str(&blob) {
            Ok(exp) => Some(exp),
            Err(err) => {
                warn!(fingerprint = fp, error = %err, "corrupt cache entry, treating as miss");
                None
            }
        }
    }

    /// Persist the whole experiment under the fingerprint, overwriting
    /// any previous entry. Written via temp file + atomic rename.
    ///
    /// # Errors
    ///
    /// Returns an error if the blob cannot be serialized or written.
    pub fn put(&self, fp: &str, exp: &Experiment) -> Result<()> {
        std::fs::create_dir_all(&self.root)?;
        let blob = serde_json::to_string(exp)?;
        let path = self.entry_path(fp);
        let tmp = self.root.join(format!("{fp}.json.tmp"));
        std::fs::write(&tmp, blob)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Memoize a develop call.
    ///
    /// On a hit, only the cached `result` field is copied onto the live
    /// experiment (every other freshly-set attribute is preserved) and
    /// `develop` is skipped. On a miss (or a corrupt entry),
    /// `develop` runs and the entire experiment is persisted under the
    /// fingerprint.
    ///
    /// # Errors
    ///
    /// Propagates errors from `develop`; a failed develop stores
    /// nothing.
    pub fn get_or_develop<F>(&self, exp: &mut Experiment, develop: F) -> Result<()>
    where
        F: FnOnce(&mut Experiment) -> Result<()>,
    {
        let fp = experiment_fingerprint(exp);
        if let Some(cached) = self.get(&fp) {
            info!(fingerprint = %fp, "cache hit, skipping develop");
            exp.result = cached.result;
            return Ok(());
        }
        info!(fingerprint = %fp, "cache miss, developing");
        develop(exp)?;
        self.put(&fp, exp)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{TaskDescriptor, TaskKind};

    fn experiment(name: &str) -> Experiment {
        Experiment::new(vec![TaskDescriptor::new(name, "test factor", TaskKind::Factor)])
    }

    fn cache() -> (tempfile::TempDir, ResultCache) {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResultCache::new(dir.path().join("cache"));
        (dir, cache)
    }

    #[test]
    fn test_miss_then_hit() {
        let (_dir, cache) = cache();
        let mut exp = experiment("f1");

        let mut calls = 0;
        cache
            .get_or_develop(&mut exp, |exp| {
                calls += 1;
                exp.result = Some(serde_json::json!({"ic": 0.03}));
                Ok(())
            })
            .unwrap();
        assert_eq!(calls, 1);

        // identical task sequence: warmed cache skips the expensive path
        let mut second = experiment("f1");
        cache
            .get_or_develop(&mut second, |_| {
                calls += 1;
                Ok(())
            })
            .unwrap();
        assert_eq!(calls, 1);
        assert_eq!(second.result, Some(serde_json::json!({"ic": 0.03})));
    }

    #[test]
    fn test_hit_copies_only_result() {
        let (_dir, cache) = cache();
        let mut exp = experiment("f1");
        cache
            .get_or_develop(&mut exp, |exp| {
                exp.result = Some(serde_json::json!(1));
                Ok(())
            })
            .unwrap();

        let mut second = experiment("f1").with_workspace_root("/tmp/live-workspace");
        second.feedback = vec![true];
        cache.get_or_develop(&mut second, |_| Ok(())).unwrap();

        // freshly-set attributes of the live call survive the hit
        assert_eq!(second.workspace_root.to_str(), Some("/tmp/live-workspace"));
        assert_eq!(second.feedback, vec![true]);
        assert_eq!(second.result, Some(serde_json::json!(1)));
    }

    #[test]
    fn test_different_tasks_miss() {
        let (_dir, cache) = cache();
        let mut exp = experiment("f1");
        cache
            .get_or_develop(&mut exp, |exp| {
                exp.result = Some(serde_json::json!("a"));
                Ok(())
            })
            .unwrap();

        let mut other = experiment("f2");
        cache
            .get_or_develop(&mut other, |exp| {
                exp.result = Some(serde_json::json!("b"));
                Ok(())
            })
            .unwrap();
        assert_eq!(other.result, Some(serde_json::json!("b")));
    }

    #[test]
    fn test_corrupt_entry_treated_as_miss() {
        let (_dir, cache) = cache();
        let exp = experiment("f1");
        let fp = experiment_fingerprint(&exp);
        cache.put(&fp, &exp).unwrap();

        // clobber the entry
        std::fs::write(cache.root().join(format!("{fp}.json")), "{not json").unwrap();
        assert!(cache.get(&fp).is_none());

        // and the develop path recovers by recomputing
        let mut live = experiment("f1");
        let mut calls = 0;
        cache
            .get_or_develop(&mut live, |exp| {
                calls += 1;
                exp.result = Some(serde_json::json!(2));
                Ok(())
            })
            .unwrap();
        assert_eq!(calls, 1);
        assert_eq!(live.result, Some(serde_json::json!(2)));
    }

    #[test]
    fn test_failed_develop_stores_nothing() {
        let (_dir, cache) = cache();
        let mut exp = experiment("f1");
        let fp = experiment_fingerprint(&exp);

        let result = cache.get_or_develop(&mut exp, |_| {
            Err(crate::Error::Execution("backtest failed".to_string()))
        });
        assert!(result.is_err());
        assert!(!cache.contains(&fp));
    }

    #[test]
    fn test_put_overwrites() {
        let (_dir, cache) = cache();
        let mut exp = experiment("f1");
        let fp = experiment_fingerprint(&exp);

        exp.result = Some(serde_json::json!(1));
        cache.put(&fp, &exp).unwrap();
        exp.result = Some(serde_json::json!(2));
        cache.put(&fp, &exp).unwrap();

        assert_eq!(cache.get(&fp).unwrap().result, Some(serde_json::json!(2)));
    }
}
