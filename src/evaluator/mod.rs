// src/evaluator/mod.rs — Evaluation pool
//
// A bounded set of execution slots that score candidate programs. Two
// implementations sit behind `EvaluationPool`, chosen once at construction:
// in-process (blocking threads) and isolated-process (one child per task).

pub mod command;
pub mod in_process;
pub mod isolated;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::core::types::{EvaluationResult, IsolationMode, SearchSettings};
use crate::infra::config::EvaluationConfig;
use crate::infra::errors::SearchError;
use crate::program::Program;

pub use command::{parse_score_output, CommandEvaluator, EvaluationCommand};
pub use in_process::InProcessPool;
pub use isolated::IsolatedProcessPool;

/// Scores a program in-process. `None` means the candidate is invalid or
/// did not run; that is a result, not an error.
pub trait Evaluator: Send + Sync {
    fn evaluate(&self, program: &Program) -> Option<f64>;
}

impl<F> Evaluator for F
where
    F: Fn(&Program) -> Option<f64> + Send + Sync,
{
    fn evaluate(&self, program: &Program) -> Option<f64> {
        self(program)
    }
}

/// A bounded pool accepting one task per candidate program.
#[async_trait]
pub trait EvaluationPool: Send + Sync {
    /// Queue a program for evaluation. Must be called from within a tokio runtime.
    /// After shutdown the returned handle resolves to `PoolClosed`.
    fn submit(&self, program: Program) -> EvalHandle;

    /// Stop accepting work. With `cancel_pending`, tasks still waiting for a
    /// slot are cancelled (and, where the mode allows it, running ones too).
    /// Returns true only for the call that actually performed the shutdown.
    fn shutdown(&self, cancel_pending: bool) -> bool;

    fn is_shut_down(&self) -> bool;

    fn mode(&self) -> IsolationMode;
}

/// How a single pool task ended.
#[derive(Debug)]
pub(crate) enum TaskOutcome {
    Done(EvaluationResult),
    Cancelled,
}

/// Receipt for one submitted program.
#[derive(Debug)]
pub struct EvalHandle {
    rx: oneshot::Receiver<TaskOutcome>,
}

impl EvalHandle {
    pub(crate) fn channel() -> (oneshot::Sender<TaskOutcome>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { rx })
    }

    /// A handle that is already cancelled (submission to a closed pool).
    pub(crate) fn cancelled() -> Self {
        let (tx, handle) = Self::channel();
        let _ = tx.send(TaskOutcome::Cancelled);
        handle
    }

    /// Wait for this task's result.
    pub async fn result(self) -> Result<EvaluationResult, SearchError> {
        match self.rx.await {
            Ok(TaskOutcome::Done(result)) => Ok(result),
            Ok(TaskOutcome::Cancelled) | Err(_) => Err(SearchError::PoolClosed),
        }
    }
}

/// Wait for a whole batch. The i-th result belongs to the i-th handle; any
/// cancelled task fails the batch with `PoolClosed`.
pub async fn wait_all(handles: Vec<EvalHandle>) -> Result<Vec<EvaluationResult>, SearchError> {
    futures::future::join_all(handles.into_iter().map(EvalHandle::result))
        .await
        .into_iter()
        .collect()
}

/// Submit one program and wait for it.
pub async fn evaluate_one(
    pool: &dyn EvaluationPool,
    program: Program,
) -> Result<EvaluationResult, SearchError> {
    pool.submit(program).result().await
}

/// Build the pool for the configured isolation mode. `in_process` is only
/// used in `InProcess` mode; isolated mode runs `config.command` per task.
pub fn build_pool(
    settings: &SearchSettings,
    config: &EvaluationConfig,
    in_process: Arc<dyn Evaluator>,
) -> Arc<dyn EvaluationPool> {
    let command = EvaluationCommand::from(config);
    match settings.isolation_mode {
        IsolationMode::InProcess => {
            let mut pool = InProcessPool::new(in_process, settings.num_evaluators);
            if let Some(timeout) = command.timeout {
                pool = pool.with_timeout(timeout);
            }
            Arc::new(pool)
        }
        IsolationMode::IsolatedProcess => {
            Arc::new(IsolatedProcessPool::new(command, settings.num_evaluators))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cancelled_handle() {
        let handle = EvalHandle::cancelled();
        assert!(matches!(handle.result().await, Err(SearchError::PoolClosed)));
    }

    #[tokio::test]
    async fn test_dropped_sender_is_closed() {
        let (tx, handle) = EvalHandle::channel();
        drop(tx);
        assert!(matches!(handle.result().await, Err(SearchError::PoolClosed)));
    }

    #[tokio::test]
    async fn test_wait_all_empty_batch() {
        let results = wait_all(Vec::new()).await.unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_closure_is_evaluator() {
        let eval = |p: &Program| Some(p.functions.len() as f64);
        let program = Program {
            preface: String::new(),
            functions: vec![],
        };
        assert_eq!(eval.evaluate(&program), Some(0.0));
    }

    #[tokio::test]
    async fn test_build_pool_selects_mode() {
        let evaluator: Arc<dyn Evaluator> = Arc::new(|_: &Program| Some(1.0));
        let mut settings = SearchSettings::default();
        let config = EvaluationConfig::default();

        let pool = build_pool(&settings, &config, evaluator.clone());
        assert_eq!(pool.mode(), IsolationMode::InProcess);

        settings.isolation_mode = IsolationMode::IsolatedProcess;
        let pool = build_pool(&settings, &config, evaluator);
        assert_eq!(pool.mode(), IsolationMode::IsolatedProcess);
    }
}
