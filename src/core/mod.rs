// src/core/mod.rs — Search engine: budget, shutdown, workers, orchestrator

pub mod budget;
pub mod orchestrator;
pub mod shutdown;
pub mod types;
pub mod worker;

pub use budget::SampleBudget;
pub use orchestrator::Orchestrator;
pub use shutdown::{Shutdown, ShutdownSignal};
