// src/cli/eval.rs — `funsearch eval`: score one program through the pool

use std::path::Path;
use std::sync::Arc;

use super::run::load_template;
use crate::core::types::{EvaluationResult, IsolationMode, SearchSettings};
use crate::evaluator::{build_pool, evaluate_one, CommandEvaluator, EvaluationCommand};
use crate::infra::config::Config;

/// Evaluate `file` once, exactly as the search would score a candidate.
pub async fn run_eval(
    file: &Path,
    isolation: Option<IsolationMode>,
    mut config: Config,
) -> anyhow::Result<EvaluationResult> {
    if let Some(mode) = isolation {
        config.search.isolation_mode = mode;
    }
    config.validate()?;
    let program = load_template(file)?;

    let mut settings = SearchSettings::from(&config);
    settings.num_evaluators = 1;
    let evaluator = Arc::new(CommandEvaluator::new(EvaluationCommand::from(
        &config.evaluation,
    )));
    let pool = build_pool(&settings, &config.evaluation, evaluator);

    let result = evaluate_one(pool.as_ref(), program).await;
    pool.shutdown(false);
    let result = result?;

    tracing::debug!(
        score = ?result.score,
        eval_ms = result.eval_time.as_millis() as u64,
        mode = %settings.isolation_mode,
        "Evaluated"
    );
    match result.score {
        Some(score) => println!("{}", score),
        None => println!("None"),
    }
    Ok(result)
}
