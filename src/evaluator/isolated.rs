// src/evaluator/isolated.rs — One child process per evaluation
//
// Each task spawns the evaluation command, writes the program to its stdin and
// reads the score from stdout. Unlike the in-process pool, running tasks can be
// stopped: a timeout or a cancelling shutdown kills the child.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::{watch, Semaphore};

use super::command::{parse_score_output, EvaluationCommand};
use super::{EvalHandle, EvaluationPool, TaskOutcome};
use crate::core::types::{EvaluationResult, IsolationMode};
use crate::program::Program;

pub struct IsolatedProcessPool {
    command: Arc<EvaluationCommand>,
    slots: Arc<Semaphore>,
    kill_tx: watch::Sender<bool>,
    shut_down: AtomicBool,
}

impl IsolatedProcessPool {
    pub fn new(command: EvaluationCommand, num_evaluators: usize) -> Self {
        let (kill_tx, _) = watch::channel(false);
        Self {
            command: Arc::new(command),
            slots: Arc::new(Semaphore::new(std::cmp::max(1, num_evaluators))),
            kill_tx,
            shut_down: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl EvaluationPool for IsolatedProcessPool {
    fn submit(&self, program: Program) -> EvalHandle {
        if self.is_shut_down() {
            return EvalHandle::cancelled();
        }

        let (tx, handle) = EvalHandle::channel();
        let slots = self.slots.clone();
        let command = self.command.clone();
        let mut kill_rx = self.kill_tx.subscribe();
        let source = program.to_string();

        tokio::spawn(async move {
            let Ok(_permit) = slots.acquire_owned().await else {
                let _ = tx.send(TaskOutcome::Cancelled);
                return;
            };

            let start = Instant::now();
            let outcome = tokio::select! {
                // Dropping the child future kills the process (kill_on_drop)
                Ok(_) = kill_rx.wait_for(|killed| *killed) => TaskOutcome::Cancelled,
                score = run_with_timeout(&command, &source) => TaskOutcome::Done(EvaluationResult {
                    score,
                    eval_time: start.elapsed(),
                }),
            };
            let _ = tx.send(outcome);
        });

        handle
    }

    fn shutdown(&self, cancel_pending: bool) -> bool {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return false;
        }
        if cancel_pending {
            self.slots.close();
            let _ = self.kill_tx.send(true);
        }
        tracing::debug!(cancel_pending, "Isolated evaluation pool shut down");
        true
    }

    fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    fn mode(&self) -> IsolationMode {
        IsolationMode::IsolatedProcess
    }
}

async fn run_with_timeout(command: &EvaluationCommand, source: &str) -> Option<f64> {
    let result = match command.timeout {
        Some(limit) => match tokio::time::timeout(limit, run_child(command, source)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::debug!(timeout_ms = limit.as_millis() as u64, "Evaluation process timed out");
                return None;
            }
        },
        None => run_child(command, source).await,
    };

    match result {
        Ok(score) => score,
        Err(e) => {
            tracing::warn!("Evaluation process '{}' failed: {}", command.program, e);
            None
        }
    }
}

async fn run_child(command: &EvaluationCommand, source: &str) -> anyhow::Result<Option<f64>> {
    let mut child = Command::new(&command.program)
        .args(&command.args)
        .envs(&command.env)
        .stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::null())
        .kill_on_drop(true)
        .spawn()?;

    if let Some(mut stdin) = child.stdin.take() {
        // Closing stdin on drop signals end of program
        let _ = stdin.write_all(source.as_bytes()).await;
    }

    let output = child.wait_with_output().await?;
    if !output.status.success() {
        tracing::debug!(status = %output.status, "Evaluation process exited with failure");
        return Ok(None);
    }
    Ok(parse_score_output(&String::from_utf8_lossy(&output.stdout)))
}
