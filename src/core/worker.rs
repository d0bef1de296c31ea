// src/core/worker.rs — Sampler worker loop

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::budget::SampleBudget;
use super::shutdown::ShutdownSignal;
use super::types::{EvaluationResult, FailurePolicy, FunctionWithOutcome, Prompt};
use crate::database::PopulationStore;
use crate::evaluator::{wait_all, EvaluationPool};
use crate::infra::errors::SearchError;
use crate::profiler::Profiler;
use crate::program::{program_to_function, sample_to_program, Program};
use crate::sampler::Sampler;

/// Everything the workers of one run share.
pub struct SearchContext {
    pub template: Program,
    pub sampler: Arc<dyn Sampler>,
    pub store: Arc<dyn PopulationStore>,
    pub pool: Arc<dyn EvaluationPool>,
    pub profiler: Arc<dyn Profiler>,
    pub budget: Arc<SampleBudget>,
    pub samples_per_prompt: usize,
    pub failure_policy: FailurePolicy,
    /// Functions registered by workers.
    pub registered: AtomicUsize,
}

/// One producer: prompt, sample, evaluate, register, repeat until the budget
/// runs out or shutdown is requested.
pub struct SamplerWorker {
    id: usize,
    ctx: Arc<SearchContext>,
    shutdown: ShutdownSignal,
}

impl SamplerWorker {
    pub fn new(id: usize, ctx: Arc<SearchContext>, shutdown: ShutdownSignal) -> Self {
        Self { id, ctx, shutdown }
    }

    /// Run until done. Only returns `Err` under `FailurePolicy::Abort`.
    /// The pool is shut down (cancelling pending work) on every exit path.
    pub async fn run(mut self) -> Result<(), SearchError> {
        tracing::debug!(worker = self.id, "Sampler worker started");
        let result = self.run_loop().await;
        self.ctx.pool.shutdown(true);
        tracing::debug!(worker = self.id, ok = result.is_ok(), "Sampler worker stopped");
        result
    }

    async fn run_loop(&mut self) -> Result<(), SearchError> {
        loop {
            if self.shutdown.is_triggered() || self.ctx.budget.is_exhausted() {
                return Ok(());
            }

            match self.iteration().await {
                Ok(()) => {}
                Err(e) if e.is_interruption() => {
                    tracing::debug!(worker = self.id, "Interrupted: {}", e);
                    return Ok(());
                }
                Err(e) => match self.ctx.failure_policy {
                    FailurePolicy::Abort => {
                        tracing::error!(worker = self.id, "Sampler iteration failed: {:?}", e);
                        return Err(e);
                    }
                    FailurePolicy::Continue => {
                        tracing::warn!(worker = self.id, "Sampler iteration failed: {}", e);
                        tokio::task::yield_now().await;
                    }
                },
            }
        }
    }

    /// One prompt, one batch.
    async fn iteration(&mut self) -> Result<(), SearchError> {
        let ctx = self.ctx.clone();

        let prompt = tokio::select! {
            _ = self.shutdown.cancelled() => return Err(SearchError::Interrupted),
            prompt = ctx.store.get_prompt() => prompt?,
        };

        let prompts = vec![prompt.code.clone(); ctx.samples_per_prompt];
        let start = Instant::now();
        let samples = tokio::select! {
            _ = self.shutdown.cancelled() => return Err(SearchError::Interrupted),
            samples = ctx.sampler.draw_samples(&prompts) => samples?,
        };
        if samples.is_empty() {
            tracing::debug!(worker = self.id, "Sampler returned no samples");
            return Ok(());
        }
        let sample_time = start.elapsed() / samples.len() as u32;

        let programs: Vec<Program> = samples
            .iter()
            .filter_map(|s| sample_to_program(s, &ctx.template))
            .collect();
        tracing::debug!(
            worker = self.id,
            samples = samples.len(),
            converted = programs.len(),
            "Batch sampled"
        );
        if programs.is_empty() {
            return Ok(());
        }

        let handles = programs
            .iter()
            .map(|p| ctx.pool.submit(p.clone()))
            .collect();
        let results = tokio::select! {
            _ = self.shutdown.cancelled() => return Err(SearchError::Interrupted),
            results = wait_all(handles) => results?,
        };

        self.record_batch(&prompt, programs, results, sample_time)
    }

    fn record_batch(
        &self,
        prompt: &Prompt,
        programs: Vec<Program>,
        results: Vec<EvaluationResult>,
        sample_time: Duration,
    ) -> Result<(), SearchError> {
        let ctx = &self.ctx;
        let mut registered_any = false;

        for (program, result) in programs.iter().zip(results) {
            let total = ctx.budget.record();

            let Some(function) = program_to_function(program) else {
                continue;
            };

            if let Some(score) = result.score {
                ctx.store.register(&function, prompt.island_id, score)?;
                ctx.registered.fetch_add(1, Ordering::SeqCst);
                registered_any = true;
            }
            tracing::debug!(worker = self.id, sample = total, score = ?result.score, "Sample evaluated");

            ctx.profiler.register_function(&FunctionWithOutcome {
                function,
                score: result.score,
                sample_time: Some(sample_time),
                evaluate_time: Some(result.eval_time),
            });
        }

        if registered_any {
            ctx.profiler.register_population(&ctx.store.snapshot());
        }
        Ok(())
    }
}
