// src/database/mod.rs — Population store
//
// The archive of scored functions that prompts are built from. The search loop
// only sees the `PopulationStore` trait; `ProgramsDatabase` is the island-model
// implementation shipped with the binary.

pub mod island;
pub mod programs;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::types::{IslandId, Prompt};
use crate::program::Function;

pub use programs::{DatabaseCheckpoint, ProgramsDatabase};

/// Thread-safe population archive shared by all sampler workers.
#[async_trait]
pub trait PopulationStore: Send + Sync {
    /// Build the next prompt.
    async fn get_prompt(&self) -> anyhow::Result<Prompt>;

    /// Add a scored function. `island = None` registers it on every island.
    fn register(&self, function: &Function, island: Option<IslandId>, score: f64)
        -> anyhow::Result<()>;

    fn snapshot(&self) -> PopulationSnapshot;
}

/// Point-in-time summary of the population, for telemetry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PopulationSnapshot {
    pub islands: Vec<IslandSnapshot>,
    pub best_score: Option<f64>,
    /// Source of the best function seen so far.
    pub best_function: Option<String>,
    /// Registrations accepted since the store was created.
    pub registered: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IslandSnapshot {
    pub id: usize,
    pub best_score: Option<f64>,
    pub num_programs: usize,
    pub num_clusters: usize,
}
