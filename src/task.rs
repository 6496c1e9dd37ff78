//! Task and experiment records
//!
//! A task is one unit of generated work (a factor or a model). Its
//! *information summary*, the canonical text rendering produced by
//! [`TaskDescriptor::information`], is the unit that gets fingerprinted,
//! not the object identity.
//!
//! An [`Experiment`] aggregates the tasks of one development round
//! together with its baseline chain and the live collaborators (sub-task
//! workspaces, feedback signals) that produce factor data.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::factor::FactorMatrix;

/// What kind of artifact a task produces.
///
/// A single task type with an explicit kind field; dispatch happens via
/// `match`, never via downcasting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// A derived, time-indexed numeric feature column
    Factor,
    /// A trained model artifact
    Model,
}

impl TaskKind {
    /// Kind name as it appears in the information summary.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Factor => "factor",
            Self::Model => "model",
        }
    }
}

/// One generated sub-task: name, free-text description, and
/// kind-specific parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    name: String,
    description: String,
    kind: TaskKind,
    /// Kind-specific parameters; `BTreeMap` keeps the rendering stable.
    params: BTreeMap<String, String>,
}

impl TaskDescriptor {
    /// Create a task with no parameters.
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>, kind: TaskKind) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            kind,
            params: BTreeMap::new(),
        }
    }

    /// Attach a kind-specific parameter.
    #[must_use]
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Task name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Task kind.
    #[must_use]
    pub const fn kind(&self) -> TaskKind {
        self.kind
    }

    /// Canonical text rendering of this task. Identical renderings mean
    /// identical tasks as far as the cache is concerned.
    #[must_use]
    pub fn information(&self) -> String {
        let mut out = format!(
            "kind:{}\nname:{}\ndescription:{}",
            self.kind.as_str(),
            self.name,
            self.description
        );
        for (key, value) in &self.params {
            out.push_str(&format!("\nparam:{key}={value}"));
        }
        out
    }
}

/// Result of executing one sub-task workspace: a human-readable
/// execution message and the factor data it produced.
pub type WorkspaceOutput = (String, FactorMatrix);

/// One sub-task's isolated execution unit, implemented by the code
/// generation layer. `execute` runs the generated artifact and returns
/// its output; it may fail or panic, and callers isolate both.
pub trait Workspace: Send + Sync {
    /// Run the generated artifact for the given column selector
    /// (`"All"` selects every produced column).
    ///
    /// # Errors
    ///
    /// Returns any error raised by the generated code.
    fn execute(&self, selector: &str) -> anyhow::Result<WorkspaceOutput>;
}

/// Runs a full experiment (e.g. a containerized backtest over the merged
/// factor artifact) and returns its result payload. Implemented by the
/// scenario layer.
pub trait ExperimentBackend {
    /// Run the experiment configuration named by `selector` and return
    /// the result object.
    ///
    /// # Errors
    ///
    /// Returns any error raised by the run.
    fn run(&self, selector: &str) -> anyhow::Result<serde_json::Value>;
}

/// One development round: its sub-tasks, the chain of previously
/// accepted baseline experiments, and the live collaborators used to
/// produce candidate factor data.
///
/// Serialization covers the durable fields only (tasks, baselines,
/// result); live collaborators are skipped and restored empty.
#[derive(Default, Serialize, Deserialize)]
pub struct Experiment {
    /// Sub-tasks of this round, in their defined order.
    pub sub_tasks: Vec<TaskDescriptor>,
    /// Baseline-experiment chain, oldest first. The last entry is the
    /// current SOTA the candidates are deduplicated against.
    pub based_experiments: Vec<Experiment>,
    /// Result payload, set after a successful (or cache-hit) develop.
    pub result: Option<serde_json::Value>,
    /// One workspace per sub-task, aligned by index.
    #[serde(skip)]
    pub sub_workspaces: Vec<Box<dyn Workspace>>,
    /// Per-sub-task success signal from the previous development step,
    /// aligned by index. Sub-tasks without positive feedback are not
    /// eligible for execution.
    #[serde(skip)]
    pub feedback: Vec<bool>,
    /// Directory the merged factor artifact is written into.
    #[serde(skip)]
    pub workspace_root: PathBuf,
}

impl Experiment {
    /// Create an experiment from its sub-tasks.
    #[must_use]
    pub fn new(sub_tasks: Vec<TaskDescriptor>) -> Self {
        Self {
            sub_tasks,
            ..Self::default()
        }
    }

    /// Attach the live collaborators for this round.
    #[must_use]
    pub fn with_workspaces(
        mut self,
        sub_workspaces: Vec<Box<dyn Workspace>>,
        feedback: Vec<bool>,
    ) -> Self {
        self.sub_workspaces = sub_workspaces;
        self.feedback = feedback;
        self
    }

    /// Set the artifact target directory.
    #[must_use]
    pub fn with_workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace_root = root.into();
        self
    }

    /// Every task in the fingerprinting order: the sub-tasks of every
    /// baseline experiment, in baseline order, followed by this
    /// experiment's own sub-tasks.
    #[must_use]
    pub fn all_tasks(&self) -> Vec<&TaskDescriptor> {
        let mut tasks: Vec<&TaskDescriptor> = Vec::new();
        for based in &self.based_experiments {
            tasks.extend(based.sub_tasks.iter());
        }
        tasks.extend(self.sub_tasks.iter());
        tasks
    }
}
