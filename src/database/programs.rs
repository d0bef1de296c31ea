// src/database/programs.rs — Island-model programs database
//
// Functions live on `num_islands` independent islands. Prompts are built from
// one random island at a time; registrations from a prompt go back to the
// island it came from. Periodically the weaker half of the islands is wiped
// and re-seeded from the best function of a surviving island.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::island::Island;
use super::{IslandSnapshot, PopulationSnapshot, PopulationStore};
use crate::core::types::{IslandId, Prompt};
use crate::infra::config::DatabaseConfig;
use crate::program::{Function, Program};

/// Serializable copy of the whole population, used to resume a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseCheckpoint {
    pub islands: Vec<Vec<(Function, f64)>>,
    /// Sample budget count at the time of saving.
    #[serde(default)]
    pub samples: usize,
    pub saved_at: String,
}

struct State {
    islands: Vec<Island>,
    best_score_per_island: Vec<f64>,
    best_function_per_island: Vec<Option<Function>>,
    last_reset: Instant,
    rng: StdRng,
    registered: usize,
}

pub struct ProgramsDatabase {
    config: DatabaseConfig,
    template: Arc<Program>,
    function_name: String,
    reset_period: Duration,
    state: Mutex<State>,
}

impl ProgramsDatabase {
    /// `template` provides the preface for prompts and the name of the
    /// function under evolution (its first function).
    pub fn new(config: DatabaseConfig, template: &Program) -> anyhow::Result<Self> {
        let function_name = template
            .function_to_evolve()
            .map(|f| f.name.clone())
            .ok_or_else(|| anyhow::anyhow!("template program has no function to evolve"))?;
        if config.num_islands == 0 {
            anyhow::bail!("database.num_islands must be > 0");
        }

        let template = Arc::new(template.clone());
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let islands = (0..config.num_islands)
            .map(|_| Island::new(template.clone(), function_name.clone(), &config))
            .collect();

        Ok(Self {
            reset_period: Duration::from_secs(config.reset_period_seconds),
            state: Mutex::new(State {
                islands,
                best_score_per_island: vec![f64::NEG_INFINITY; config.num_islands],
                best_function_per_island: vec![None; config.num_islands],
                last_reset: Instant::now(),
                rng,
                registered: 0,
            }),
            config,
            template,
            function_name,
        })
    }

    /// Override the island reset period (mainly for tests).
    pub fn with_reset_period(mut self, period: Duration) -> Self {
        self.reset_period = period;
        self
    }

    pub fn num_islands(&self) -> usize {
        self.config.num_islands
    }

    pub fn function_name(&self) -> &str {
        &self.function_name
    }

    fn lock(&self) -> anyhow::Result<std::sync::MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| anyhow::anyhow!("programs database lock poisoned"))
    }

    /// Build a prompt from a uniformly chosen island.
    pub fn next_prompt(&self) -> anyhow::Result<Prompt> {
        let mut state = self.lock()?;
        let state = &mut *state;
        let island_id = state.rng.gen_range(0..state.islands.len());
        let (code, version) = state.islands[island_id].get_prompt(&mut state.rng)?;
        tracing::trace!(island = island_id, version, "Prompt built");
        Ok(Prompt {
            code,
            island_id: Some(IslandId(island_id)),
        })
    }

    pub fn register_function(
        &self,
        function: &Function,
        island: Option<IslandId>,
        score: f64,
    ) -> anyhow::Result<()> {
        if !score.is_finite() {
            anyhow::bail!("refusing to register non-finite score {score}");
        }
        let mut state = self.lock()?;

        match island {
            None => {
                for id in 0..state.islands.len() {
                    register_in(&mut state, id, function.clone(), score);
                }
            }
            Some(IslandId(id)) => {
                if id >= state.islands.len() {
                    anyhow::bail!("unknown island {id}");
                }
                register_in(&mut state, id, function.clone(), score);
            }
        }
        state.registered += 1;

        if state.last_reset.elapsed() >= self.reset_period {
            state.last_reset = Instant::now();
            self.reset_islands(&mut state);
        }
        Ok(())
    }

    /// Wipe the weaker half of the islands and seed each from the best
    /// function of a random survivor.
    fn reset_islands(&self, state: &mut State) {
        let n = state.islands.len();
        // Tiny noise breaks ties between equally scored islands
        let mut order: Vec<(usize, f64)> = state
            .best_score_per_island
            .iter()
            .enumerate()
            .map(|(i, s)| (i, *s + state.rng.gen_range(-1e-6..1e-6)))
            .collect();
        order.sort_by(|a, b| a.1.total_cmp(&b.1));

        let num_reset = n / 2;
        let (reset, keep): (Vec<usize>, Vec<usize>) = {
            let (r, k) = order.split_at(num_reset);
            (r.iter().map(|(i, _)| *i).collect(), k.iter().map(|(i, _)| *i).collect())
        };
        tracing::info!(reset = ?reset, "Resetting weaker islands");

        for id in reset {
            state.islands[id] = Island::new(self.template.clone(), self.function_name.clone(), &self.config);
            state.best_score_per_island[id] = f64::NEG_INFINITY;
            state.best_function_per_island[id] = None;

            let Some(&founder) = keep.choose(&mut state.rng) else {
                continue;
            };
            if let Some(function) = state.best_function_per_island[founder].clone() {
                let score = state.best_score_per_island[founder];
                register_in(state, id, function, score);
            }
        }
    }

    pub fn population_snapshot(&self) -> PopulationSnapshot {
        let Ok(state) = self.lock() else {
            return PopulationSnapshot::default();
        };

        let islands = state
            .islands
            .iter()
            .enumerate()
            .map(|(id, island)| IslandSnapshot {
                id,
                best_score: finite(state.best_score_per_island[id]),
                num_programs: island.num_programs(),
                num_clusters: island.num_clusters(),
            })
            .collect();

        let best = state
            .best_score_per_island
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_finite())
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, s)| (i, *s));

        PopulationSnapshot {
            islands,
            best_score: best.map(|(_, s)| s),
            best_function: best
                .and_then(|(i, _)| state.best_function_per_island[i].as_ref())
                .map(|f| f.to_string()),
            registered: state.registered,
        }
    }

    pub fn checkpoint(&self, samples: usize) -> anyhow::Result<DatabaseCheckpoint> {
        let state = self.lock()?;
        Ok(DatabaseCheckpoint {
            islands: state.islands.iter().map(Island::entries).collect(),
            samples,
            saved_at: chrono::Utc::now().to_rfc3339(),
        })
    }

    /// Load a checkpoint into this (empty) database. Islands beyond the
    /// configured count are dropped.
    pub fn restore(&self, checkpoint: &DatabaseCheckpoint) -> anyhow::Result<()> {
        let mut state = self.lock()?;
        let n = state.islands.len();
        for (id, entries) in checkpoint.islands.iter().enumerate().take(n) {
            for (function, score) in entries {
                register_in(&mut state, id, function.clone(), *score);
            }
        }
        tracing::info!(islands = checkpoint.islands.len().min(n), "Population restored");
        Ok(())
    }

    pub fn save_checkpoint(&self, path: &Path, samples: usize) -> anyhow::Result<()> {
        let json = serde_json::to_string(&self.checkpoint(samples)?)?;
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Restore from a saved checkpoint. Returns the saved sample count.
    pub fn load_checkpoint(&self, path: &Path) -> anyhow::Result<usize> {
        let content = std::fs::read_to_string(path)?;
        let checkpoint: DatabaseCheckpoint = serde_json::from_str(&content)?;
        self.restore(&checkpoint)?;
        Ok(checkpoint.samples)
    }
}

fn register_in(state: &mut State, id: usize, function: Function, score: f64) {
    if score > state.best_score_per_island[id] {
        state.best_score_per_island[id] = score;
        state.best_function_per_island[id] = Some(function.clone());
        tracing::debug!(island = id, score, "New best on island");
    }
    state.islands[id].register(function, score);
}

fn finite(score: f64) -> Option<f64> {
    score.is_finite().then_some(score)
}

#[async_trait]
impl PopulationStore for ProgramsDatabase {
    async fn get_prompt(&self) -> anyhow::Result<Prompt> {
        self.next_prompt()
    }

    fn register(&self, function: &Function, island: Option<IslandId>, score: f64) -> anyhow::Result<()> {
        self.register_function(function, island, score)
    }

    fn snapshot(&self) -> PopulationSnapshot {
        self.population_snapshot()
    }
}
