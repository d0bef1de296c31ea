// src/cli/run.rs — `funsearch run`: wire config into a search and run it

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;

use super::progress::{self, TerminalProgress};
use super::RunArgs;
use crate::core::types::{RunSummary, SearchSettings};
use crate::core::{Orchestrator, Shutdown};
use crate::database::{PopulationStore, ProgramsDatabase};
use crate::evaluator::{build_pool, CommandEvaluator, EvaluationCommand};
use crate::infra::config::Config;
use crate::infra::errors::SearchError;
use crate::infra::paths;
use crate::profiler::{JsonlProfiler, MultiProfiler, Profiler, TracingProfiler};
use crate::program::{text_to_program, Program};
use crate::provider::resolver;
use crate::sampler::LlmSampler;

/// File inside the log directory holding the population between sessions.
pub const CHECKPOINT_FILE: &str = "database.json";

/// Run a search with `args` applied on top of `config`.
pub async fn run_search(args: &RunArgs, mut config: Config) -> anyhow::Result<RunSummary> {
    args.apply(&mut config);
    config.validate()?;
    let settings = SearchSettings::from(&config);

    let template_path = config
        .search
        .template
        .clone()
        .ok_or_else(|| SearchError::Config("no template program (use --template)".into()))?;
    let template = load_template(Path::new(&template_path))?;

    let log_dir = resolve_log_dir(&config, settings.resume_mode)?;
    let checkpoint_path = log_dir.join(CHECKPOINT_FILE);

    let database = Arc::new(ProgramsDatabase::new(config.database.clone(), &template)?);
    let mut initial_samples = 0;
    if settings.resume_mode {
        initial_samples = database
            .load_checkpoint(&checkpoint_path)
            .with_context(|| format!("cannot resume from {}", checkpoint_path.display()))?;
        if !args.quiet {
            let restored: usize = database
                .population_snapshot()
                .islands
                .iter()
                .map(|i| i.num_programs)
                .sum();
            eprintln!(
                "[resume] {} sample(s) already taken, {} program(s) restored",
                initial_samples, restored
            );
        }
    }

    let (provider, model_ref) = resolver::build_provider(&config.sampler)?;
    let sampler = Arc::new(LlmSampler::from_config(provider, &model_ref, &config.sampler)?);

    let evaluator = Arc::new(CommandEvaluator::new(EvaluationCommand::from(
        &config.evaluation,
    )));
    let pool = build_pool(&settings, &config.evaluation, evaluator);

    let mut profilers: Vec<Arc<dyn Profiler>> = vec![
        Arc::new(TracingProfiler::new()),
        Arc::new(JsonlProfiler::new(&log_dir, config.profiler.snapshot_interval)?),
    ];
    if !args.quiet {
        profilers.push(Arc::new(TerminalProgress::new(
            settings.max_sample_nums,
            initial_samples,
        )));
    }

    let shutdown = Arc::new(Shutdown::new());
    shutdown.trigger_on_ctrl_c();

    if !args.quiet {
        eprintln!(
            "[search] {} via {} | {} sampler(s), {} evaluator(s), {} | log: {}",
            template_path,
            model_ref,
            settings.num_samplers,
            settings.num_evaluators,
            settings.isolation_mode,
            log_dir.display(),
        );
    }

    let store: Arc<dyn PopulationStore> = database.clone();
    let orchestrator = Orchestrator::new(template, settings, sampler, store, pool)
        .with_profiler(Arc::new(MultiProfiler::new(profilers)))
        .with_shutdown(shutdown)
        .with_initial_samples(initial_samples);
    let budget = orchestrator.budget();

    let result = orchestrator.run().await;

    // Save whatever was learned, even when the run failed
    if let Err(e) = database.save_checkpoint(&checkpoint_path, budget.count()) {
        tracing::warn!("Failed to save database checkpoint: {}", e);
    }

    let summary = result?;
    let population = database.population_snapshot();
    if !args.quiet {
        eprintln!("{}", progress::format_done(&summary, &population));
    }
    if let Some(best) = &population.best_function {
        println!("{}", best);
    }
    Ok(summary)
}

/// Read and parse the template program.
pub fn load_template(path: &Path) -> anyhow::Result<Program> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read template {}", path.display()))?;
    let program = text_to_program(&text).ok_or_else(|| {
        SearchError::Template(format!("{} is not a valid program", path.display()))
    })?;
    if program.function_to_evolve().is_none() {
        return Err(SearchError::Template(format!("{} defines no function", path.display())).into());
    }
    Ok(program)
}

/// The configured log directory, or a fresh timestamped one under the runs dir.
fn resolve_log_dir(config: &Config, resume: bool) -> anyhow::Result<PathBuf> {
    match &config.profiler.log_dir {
        Some(dir) => Ok(PathBuf::from(dir)),
        None if resume => Err(SearchError::Config("--resume needs --log-dir".into()).into()),
        None => {
            let stamp = chrono::Utc::now().format("%Y%m%d-%H%M%S");
            let id = uuid::Uuid::new_v4().simple().to_string();
            Ok(paths::runs_dir().join(format!("{}-{}", stamp, &id[..8])))
        }
    }
}
