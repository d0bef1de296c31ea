// src/core/types.rs — Core domain types

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::infra::config::Config;
use crate::infra::errors::SearchError;
use crate::program::Function;

/// Opaque island identifier, interpreted only by the population store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IslandId(pub usize);

impl std::fmt::Display for IslandId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "island-{}", self.0)
    }
}

/// Generation context handed to a sampler worker.
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub code: String,
    pub island_id: Option<IslandId>,
}

/// Score and wall-clock time of one evaluation. `score == None` marks an
/// invalid or non-functional candidate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvaluationResult {
    pub score: Option<f64>,
    pub eval_time: Duration,
}

impl EvaluationResult {
    pub fn invalid(eval_time: Duration) -> Self {
        Self {
            score: None,
            eval_time,
        }
    }
}

/// A function together with everything learned about it while sampling and
/// evaluating. Built once, then handed to telemetry.
#[derive(Debug, Clone)]
pub struct FunctionWithOutcome {
    pub function: Function,
    pub score: Option<f64>,
    pub sample_time: Option<Duration>,
    pub evaluate_time: Option<Duration>,
}

/// Where evaluation tasks run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum IsolationMode {
    /// Blocking threads inside this process; cheap, running tasks can't be preempted.
    #[serde(alias = "thread")]
    #[value(alias = "thread")]
    InProcess,
    /// One child process per task; in-flight tasks are killed on shutdown.
    #[serde(alias = "process")]
    #[value(alias = "process")]
    IsolatedProcess,
}

impl std::fmt::Display for IsolationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IsolationMode::InProcess => write!(f, "in_process"),
            IsolationMode::IsolatedProcess => write!(f, "isolated_process"),
        }
    }
}

/// What a sampler worker does with an unexpected failure inside an iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Log and move on to the next iteration.
    Continue,
    /// Log the full error chain and stop the whole run.
    Abort,
}

impl FailurePolicy {
    pub fn from_debug_mode(debug_mode: bool) -> Self {
        if debug_mode {
            FailurePolicy::Abort
        } else {
            FailurePolicy::Continue
        }
    }
}

/// Engine-level view of the `[search]` section.
#[derive(Debug, Clone)]
pub struct SearchSettings {
    pub num_samplers: usize,
    pub num_evaluators: usize,
    pub samples_per_prompt: usize,
    pub max_sample_nums: Option<usize>,
    pub resume_mode: bool,
    pub failure_policy: FailurePolicy,
    pub isolation_mode: IsolationMode,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for SearchSettings {
    fn from(config: &Config) -> Self {
        let s = &config.search;
        Self {
            num_samplers: s.num_samplers,
            num_evaluators: s.num_evaluators,
            samples_per_prompt: s.samples_per_prompt,
            max_sample_nums: (s.max_sample_nums > 0).then_some(s.max_sample_nums),
            resume_mode: s.resume_mode,
            failure_policy: FailurePolicy::from_debug_mode(s.debug_mode),
            isolation_mode: s.isolation_mode,
        }
    }
}

impl SearchSettings {
    /// Reject settings under which no worker could ever make progress.
    pub fn validate(&self) -> Result<(), SearchError> {
        for (name, value) in [
            ("num_samplers", self.num_samplers),
            ("num_evaluators", self.num_evaluators),
            ("samples_per_prompt", self.samples_per_prompt),
        ] {
            if value == 0 {
                return Err(SearchError::Config(format!("search.{name} must be > 0")));
            }
        }
        Ok(())
    }
}

/// What a finished run reports back to the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    /// Final value of the sample budget counter.
    pub samples: usize,
    /// Functions registered by sampler workers (the seed is not counted).
    pub registered: usize,
    pub interrupted: bool,
}
