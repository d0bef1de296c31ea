// src/evaluator/in_process.rs — Evaluation on tokio's blocking threads

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Semaphore;

use super::{EvalHandle, EvaluationPool, Evaluator, TaskOutcome};
use crate::core::types::{EvaluationResult, IsolationMode};
use crate::program::Program;

/// Runs an [`Evaluator`] on the blocking thread pool, at most `num_evaluators`
/// at a time. Only tasks still waiting for a slot can be cancelled; a running
/// evaluation always runs to completion (a timeout only stops waiting for it).
pub struct InProcessPool {
    evaluator: Arc<dyn Evaluator>,
    slots: Arc<Semaphore>,
    timeout: Option<Duration>,
    shut_down: AtomicBool,
}

impl InProcessPool {
    pub fn new(evaluator: Arc<dyn Evaluator>, num_evaluators: usize) -> Self {
        Self {
            evaluator,
            slots: Arc::new(Semaphore::new(std::cmp::max(1, num_evaluators))),
            timeout: None,
            shut_down: AtomicBool::new(false),
        }
    }

    /// Give up on an evaluation after `timeout` and score it `None`. The slot
    /// stays occupied until the evaluator actually returns.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Free slots right now.
    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }
}

#[async_trait]
impl EvaluationPool for InProcessPool {
    fn submit(&self, program: Program) -> EvalHandle {
        if self.is_shut_down() {
            return EvalHandle::cancelled();
        }

        let (tx, handle) = EvalHandle::channel();
        let slots = self.slots.clone();
        let evaluator = self.evaluator.clone();
        let timeout = self.timeout;

        tokio::spawn(async move {
            // A closed semaphore means shutdown cancelled this queued task
            let Ok(permit) = slots.acquire_owned().await else {
                let _ = tx.send(TaskOutcome::Cancelled);
                return;
            };

            let start = Instant::now();
            let task = tokio::task::spawn_blocking(move || {
                let _permit = permit;
                evaluator.evaluate(&program)
            });

            let score = match timeout {
                Some(limit) => match tokio::time::timeout(limit, task).await {
                    Ok(joined) => joined_score(joined),
                    Err(_) => {
                        tracing::debug!(timeout_ms = limit.as_millis() as u64, "Evaluation timed out");
                        None
                    }
                },
                None => joined_score(task.await),
            };

            let _ = tx.send(TaskOutcome::Done(EvaluationResult {
                score,
                eval_time: start.elapsed(),
            }));
        });

        handle
    }

    fn shutdown(&self, cancel_pending: bool) -> bool {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return false;
        }
        if cancel_pending {
            self.slots.close();
        }
        tracing::debug!(cancel_pending, "In-process evaluation pool shut down");
        true
    }

    fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    fn mode(&self) -> IsolationMode {
        IsolationMode::InProcess
    }
}

/// A panicking evaluator scores `None`.
fn joined_score(joined: Result<Option<f64>, tokio::task::JoinError>) -> Option<f64> {
    match joined {
        Ok(score) => score.filter(|s| s.is_finite()),
        Err(e) => {
            tracing::warn!("Evaluator panicked: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::{evaluate_one, wait_all};
    use crate::infra::errors::SearchError;

    fn program() -> Program {
        crate::program::text_to_program("def f(x):\n    return x\n").unwrap()
    }

    #[tokio::test]
    async fn test_scores_program() {
        let pool = InProcessPool::new(Arc::new(|_: &Program| Some(3.0)), 2);
        let result = evaluate_one(&pool, program()).await.unwrap();
        assert_eq!(result.score, Some(3.0));
    }

    #[tokio::test]
    async fn test_panic_scores_none() {
        let pool = InProcessPool::new(
            Arc::new(|_: &Program| -> Option<f64> { panic!("evaluator bug") }),
            1,
        );
        let result = evaluate_one(&pool, program()).await.unwrap();
        assert_eq!(result.score, None);
        // The slot is released after the panic
        assert_eq!(pool.available_slots(), 1);
    }

    #[tokio::test]
    async fn test_nan_scores_none() {
        let pool = InProcessPool::new(Arc::new(|_: &Program| Some(f64::NAN)), 1);
        assert_eq!(evaluate_one(&pool, program()).await.unwrap().score, None);
    }

    #[tokio::test]
    async fn test_timeout_scores_none() {
        let pool = InProcessPool::new(
            Arc::new(|_: &Program| {
                std::thread::sleep(Duration::from_millis(300));
                Some(1.0)
            }),
            1,
        )
        .with_timeout(Duration::from_millis(20));
        let result = evaluate_one(&pool, program()).await.unwrap();
        assert_eq!(result.score, None);
        assert!(result.eval_time < Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_is_cancelled() {
        let pool = InProcessPool::new(Arc::new(|_: &Program| Some(1.0)), 1);
        assert!(pool.shutdown(true));
        assert!(pool.is_shut_down());
        let err = wait_all(vec![pool.submit(program())]).await.unwrap_err();
        assert!(matches!(err, SearchError::PoolClosed));
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let pool = InProcessPool::new(Arc::new(|_: &Program| Some(1.0)), 1);
        assert!(pool.shutdown(true));
        assert!(!pool.shutdown(true));
        assert!(!pool.shutdown(false));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_shutdown_wins_once() {
        for _ in 0..50 {
            let pool = Arc::new(InProcessPool::new(Arc::new(|_: &Program| Some(1.0)), 1));
            let queued = pool.submit(program());
            let start = Arc::new(tokio::sync::Barrier::new(2));

            let racers: Vec<_> = (0..2)
                .map(|_| {
                    let pool = pool.clone();
                    let start = start.clone();
                    tokio::spawn(async move {
                        start.wait().await;
                        pool.shutdown(true)
                    })
                })
                .collect();

            let mut wins = 0;
            for racer in racers {
                if racer.await.unwrap() {
                    wins += 1;
                }
            }
            assert_eq!(wins, 1);
            assert!(pool.is_shut_down());
            assert!(pool.submit(program()).result().await.is_err());
            // Whatever was submitted before still resolves
            let _ = queued.result().await;
        }
    }
}
