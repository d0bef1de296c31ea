// src/profiler/mod.rs — Run telemetry
//
// Profilers observe the search; they never fail it. Every method is
// fire-and-forget and swallows its own I/O errors.

pub mod jsonl;
pub mod tracing_log;

use std::sync::Arc;

use crate::core::types::FunctionWithOutcome;
use crate::database::PopulationSnapshot;

pub use jsonl::JsonlProfiler;
pub use tracing_log::{ProfileStats, TracingProfiler};

pub trait Profiler: Send + Sync {
    /// Called once per converted sample (and once for the seed).
    fn register_function(&self, outcome: &FunctionWithOutcome);

    fn register_population(&self, _snapshot: &PopulationSnapshot) {}

    /// Called once when the run ends, whatever the reason.
    fn finish(&self) {}
}

/// Fans every event out to several profilers, in order.
pub struct MultiProfiler {
    profilers: Vec<Arc<dyn Profiler>>,
}

impl MultiProfiler {
    pub fn new(profilers: Vec<Arc<dyn Profiler>>) -> Self {
        Self { profilers }
    }
}

impl Profiler for MultiProfiler {
    fn register_function(&self, outcome: &FunctionWithOutcome) {
        for p in &self.profilers {
            p.register_function(outcome);
        }
    }

    fn register_population(&self, snapshot: &PopulationSnapshot) {
        for p in &self.profilers {
            p.register_population(snapshot);
        }
    }

    fn finish(&self) {
        for p in &self.profilers {
            p.finish();
        }
    }
}
