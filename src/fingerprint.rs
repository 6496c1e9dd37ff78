//! Stable task fingerprints
//!
//! A fingerprint is the SHA-256 hex digest of the ordered concatenation
//! of task information summaries. It is run-independent: the same
//! ordered sequence of summaries always produces the same digest, and
//! any change in content *or order* produces a different one. Encounter
//! order is preserved deliberately: upstream task order can be
//! semantically meaningful, so no canonicalizing sort is applied.

use sha2::{Digest, Sha256};

use crate::task::{Experiment, TaskDescriptor};

/// Separator between task summaries in the hashed rendering.
const TASK_SEPARATOR: &str = "\n";

/// Compute the fingerprint of an ordered task sequence.
#[must_use]
pub fn fingerprint<'a, I>(tasks: I) -> String
where
    I: IntoIterator<Item = &'a TaskDescriptor>,
{
    let joined = tasks
        .into_iter()
        .map(TaskDescriptor::information)
        .collect::<Vec<_>>()
        .join(TASK_SEPARATOR);
    let digest = Sha256::digest(joined.as_bytes());
    hex::encode(digest)
}

/// Fingerprint an experiment: every sub-task of every baseline
/// experiment in baseline order, then the experiment's own sub-tasks in
/// their defined order.
#[must_use]
pub fn experiment_fingerprint(exp: &Experiment) -> String {
    fingerprint(exp.all_tasks().into_iter())
}
