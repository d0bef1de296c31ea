// src/core/orchestrator.rs — Search loop controller

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinSet;

use super::budget::SampleBudget;
use super::shutdown::Shutdown;
use super::types::*;
use super::worker::{SamplerWorker, SearchContext};
use crate::database::PopulationStore;
use crate::evaluator::{evaluate_one, EvaluationPool};
use crate::infra::errors::SearchError;
use crate::profiler::{Profiler, TracingProfiler};
use crate::program::{program_to_function, Program};
use crate::sampler::Sampler;

/// Seeds the population, runs `num_samplers` workers against one evaluation
/// pool, and tears everything down once they stop.
pub struct Orchestrator {
    template: Program,
    settings: SearchSettings,
    sampler: Arc<dyn Sampler>,
    store: Arc<dyn PopulationStore>,
    pool: Arc<dyn EvaluationPool>,
    profiler: Arc<dyn Profiler>,
    shutdown: Arc<Shutdown>,
    budget: Arc<SampleBudget>,
}

impl Orchestrator {
    pub fn new(
        template: Program,
        settings: SearchSettings,
        sampler: Arc<dyn Sampler>,
        store: Arc<dyn PopulationStore>,
        pool: Arc<dyn EvaluationPool>,
    ) -> Self {
        let budget = Arc::new(SampleBudget::new(settings.max_sample_nums));
        Self {
            template,
            settings,
            sampler,
            store,
            pool,
            profiler: Arc::new(TracingProfiler::new()),
            shutdown: Arc::new(Shutdown::new()),
            budget,
        }
    }

    pub fn with_profiler(mut self, profiler: Arc<dyn Profiler>) -> Self {
        self.profiler = profiler;
        self
    }

    /// Share an externally owned shutdown (e.g. wired to Ctrl+C).
    pub fn with_shutdown(mut self, shutdown: Arc<Shutdown>) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Continue counting from a previous run's sample total.
    pub fn with_initial_samples(mut self, count: usize) -> Self {
        self.budget = Arc::new(SampleBudget::starting_at(
            count,
            self.settings.max_sample_nums,
        ));
        self
    }

    pub fn shutdown_handle(&self) -> Arc<Shutdown> {
        self.shutdown.clone()
    }

    pub fn budget(&self) -> Arc<SampleBudget> {
        self.budget.clone()
    }

    /// Run the search to completion.
    ///
    /// Interruption is not an error: the summary reports `interrupted = true`.
    /// Under `FailurePolicy::Abort` the first worker failure stops the other
    /// workers and is returned once everything has been joined.
    pub async fn run(self) -> Result<RunSummary, SearchError> {
        if let Err(e) = self.settings.validate() {
            self.pool.shutdown(true);
            self.profiler.finish();
            return Err(e);
        }

        let start = Instant::now();
        tracing::info!(
            samplers = self.settings.num_samplers,
            evaluators = self.settings.num_evaluators,
            samples_per_prompt = self.settings.samples_per_prompt,
            max_samples = ?self.settings.max_sample_nums,
            isolation = %self.pool.mode(),
            "Starting search"
        );

        // Cancels pool work as soon as shutdown is requested, from anywhere
        let coordinator = {
            let mut signal = self.shutdown.signal();
            let pool = self.pool.clone();
            tokio::spawn(async move {
                signal.cancelled().await;
                pool.shutdown(true);
            })
        };

        let result = self.run_inner().await;

        coordinator.abort();
        self.pool.shutdown(true);
        self.profiler.finish();

        match &result {
            Ok(summary) => tracing::info!(
                samples = summary.samples,
                registered = summary.registered,
                interrupted = summary.interrupted,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Search finished"
            ),
            Err(e) => tracing::error!("Search failed: {}", e),
        }
        result
    }

    async fn run_inner(&self) -> Result<RunSummary, SearchError> {
        if self.settings.resume_mode {
            tracing::info!("Resume mode: skipping template evaluation");
        } else {
            match self.seed().await {
                Ok(()) => {}
                Err(e) if e.is_interruption() && self.shutdown.is_triggered() => {
                    return Ok(RunSummary {
                        samples: self.budget.count(),
                        registered: 0,
                        interrupted: true,
                    });
                }
                Err(e) => return Err(e),
            }
        }

        let ctx = Arc::new(SearchContext {
            template: self.template.clone(),
            sampler: self.sampler.clone(),
            store: self.store.clone(),
            pool: self.pool.clone(),
            profiler: self.profiler.clone(),
            budget: self.budget.clone(),
            samples_per_prompt: self.settings.samples_per_prompt,
            failure_policy: self.settings.failure_policy,
            registered: AtomicUsize::new(0),
        });

        let mut workers = JoinSet::new();
        for id in 0..self.settings.num_samplers {
            let worker = SamplerWorker::new(id, ctx.clone(), self.shutdown.signal());
            workers.spawn(worker.run());
        }

        // Joined in completion order so a failure stops the rest right away
        let mut first_error: Option<SearchError> = None;
        while let Some(joined) = workers.join_next().await {
            let failure = match joined {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e),
                Err(e) => {
                    tracing::error!("Sampler worker panicked: {}", e);
                    match self.settings.failure_policy {
                        FailurePolicy::Abort => Some(SearchError::Other(anyhow::anyhow!(
                            "sampler worker panicked: {e}"
                        ))),
                        FailurePolicy::Continue => None,
                    }
                }
            };
            if let Some(e) = failure {
                self.shutdown.trigger();
                first_error.get_or_insert(e);
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }

        Ok(RunSummary {
            samples: self.budget.count(),
            registered: ctx.registered.load(Ordering::SeqCst),
            interrupted: self.shutdown.is_triggered(),
        })
    }

    /// Score the template and register it on every island.
    async fn seed(&self) -> Result<(), SearchError> {
        let function = program_to_function(&self.template).ok_or_else(|| {
            SearchError::Template("no function to evolve after rendering".into())
        })?;

        let result = evaluate_one(self.pool.as_ref(), self.template.clone()).await?;
        let Some(score) = result.score else {
            return Err(SearchError::SeedScore);
        };
        tracing::info!(score, function = %function.name, "Template scored");

        self.store.register(&function, None, score)?;
        self.profiler.register_function(&FunctionWithOutcome {
            function,
            score: Some(score),
            sample_time: None,
            evaluate_time: Some(result.eval_time),
        });
        self.profiler.register_population(&self.store.snapshot());
        Ok(())
    }
}
