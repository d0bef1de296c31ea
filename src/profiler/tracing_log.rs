// src/profiler/tracing_log.rs — Log-only profiler

use std::sync::Mutex;
use std::time::Duration;

use super::Profiler;
use crate::core::types::FunctionWithOutcome;
use crate::database::PopulationSnapshot;

/// Running totals kept by [`TracingProfiler`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileStats {
    pub samples: usize,
    pub valid: usize,
    pub best_score: Option<f64>,
    pub best_function: Option<String>,
    pub total_sample_time: Duration,
    pub total_evaluate_time: Duration,
}

/// Logs new best scores at info and every sample at debug.
#[derive(Default)]
pub struct TracingProfiler {
    stats: Mutex<ProfileStats>,
}

impl TracingProfiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> ProfileStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl Profiler for TracingProfiler {
    fn register_function(&self, outcome: &FunctionWithOutcome) {
        let Ok(mut stats) = self.stats.lock() else {
            return;
        };
        stats.samples += 1;
        stats.total_sample_time += outcome.sample_time.unwrap_or_default();
        stats.total_evaluate_time += outcome.evaluate_time.unwrap_or_default();

        tracing::debug!(
            sample = stats.samples,
            score = ?outcome.score,
            sample_ms = outcome.sample_time.map(|d| d.as_millis() as u64),
            evaluate_ms = outcome.evaluate_time.map(|d| d.as_millis() as u64),
            "Function registered"
        );

        let Some(score) = outcome.score else {
            return;
        };
        stats.valid += 1;
        if stats.best_score.map_or(true, |best| score > best) {
            stats.best_score = Some(score);
            stats.best_function = Some(outcome.function.to_string());
            tracing::info!(sample = stats.samples, score, "New best score");
        }
    }

    fn register_population(&self, snapshot: &PopulationSnapshot) {
        tracing::debug!(
            islands = snapshot.islands.len(),
            registered = snapshot.registered,
            best = ?snapshot.best_score,
            "Population updated"
        );
    }

    fn finish(&self) {
        let stats = self.stats();
        tracing::info!(
            samples = stats.samples,
            valid = stats.valid,
            best = ?stats.best_score,
            "Profiling finished"
        );
    }
}
