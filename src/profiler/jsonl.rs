// src/profiler/jsonl.rs — Run log directory writer
//
// Layout of a run directory:
//   samples.jsonl    one line per reported sample
//   best.json        best function so far, rewritten on improvement
//   population.json  latest population snapshot, every `snapshot_interval` samples
//   summary.json     written by finish()
// JSON files are replaced atomically (temp file + rename).

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Profiler;
use crate::core::types::FunctionWithOutcome;
use crate::database::PopulationSnapshot;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleRecord {
    pub order: usize,
    pub function_name: String,
    pub score: Option<f64>,
    pub sample_time_ms: Option<u64>,
    pub evaluate_time_ms: Option<u64>,
    pub function: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BestRecord {
    pub order: usize,
    pub score: f64,
    pub function: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummaryRecord {
    pub samples: usize,
    pub valid: usize,
    pub best_score: Option<f64>,
    pub started_at: String,
    pub finished_at: String,
    pub elapsed_secs: i64,
}

struct JsonlState {
    samples: File,
    order: usize,
    valid: usize,
    best_score: Option<f64>,
    population_written_at: Option<usize>,
    latest_population: Option<PopulationSnapshot>,
}

pub struct JsonlProfiler {
    dir: PathBuf,
    snapshot_interval: usize,
    started_at: DateTime<Utc>,
    state: Mutex<JsonlState>,
}

impl JsonlProfiler {
    /// Open (or continue) a run directory. Sample numbering continues after
    /// any records already in `samples.jsonl`.
    pub fn new(dir: impl Into<PathBuf>, snapshot_interval: usize) -> anyhow::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;

        let samples_path = dir.join("samples.jsonl");
        let (order, valid, best_score) = read_existing(&samples_path);
        let samples = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&samples_path)?;

        if order > 0 {
            tracing::info!(existing = order, dir = %dir.display(), "Continuing run log");
        }

        Ok(Self {
            dir,
            snapshot_interval,
            started_at: Utc::now(),
            state: Mutex::new(JsonlState {
                samples,
                order,
                valid,
                best_score,
                population_written_at: None,
                latest_population: None,
            }),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_sample(&self, state: &mut JsonlState, outcome: &FunctionWithOutcome) -> anyhow::Result<()> {
        state.order += 1;
        let now = Utc::now().to_rfc3339();
        let record = SampleRecord {
            order: state.order,
            function_name: outcome.function.name.clone(),
            score: outcome.score,
            sample_time_ms: outcome.sample_time.map(|d| d.as_millis() as u64),
            evaluate_time_ms: outcome.evaluate_time.map(|d| d.as_millis() as u64),
            function: outcome.function.to_string(),
            timestamp: now.clone(),
        };
        writeln!(state.samples, "{}", serde_json::to_string(&record)?)?;
        state.samples.flush()?;

        let Some(score) = outcome.score else {
            return Ok(());
        };
        state.valid += 1;
        if state.best_score.map_or(true, |best| score > best) {
            state.best_score = Some(score);
            let best = BestRecord {
                order: state.order,
                score,
                function: outcome.function.to_string(),
                timestamp: now,
            };
            write_json_atomic(&self.dir.join("best.json"), &best)?;
        }
        Ok(())
    }

    fn write_summary(&self, state: &JsonlState) -> anyhow::Result<()> {
        let finished = Utc::now();
        let summary = RunSummaryRecord {
            samples: state.order,
            valid: state.valid,
            best_score: state.best_score,
            started_at: self.started_at.to_rfc3339(),
            finished_at: finished.to_rfc3339(),
            elapsed_secs: (finished - self.started_at).num_seconds().max(0),
        };
        write_json_atomic(&self.dir.join("summary.json"), &summary)
    }
}

impl Profiler for JsonlProfiler {
    fn register_function(&self, outcome: &FunctionWithOutcome) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        if let Err(e) = self.record_sample(&mut state, outcome) {
            tracing::warn!("Failed to write sample record: {}", e);
        }
    }

    fn register_population(&self, snapshot: &PopulationSnapshot) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        state.latest_population = Some(snapshot.clone());

        if self.snapshot_interval == 0 {
            return;
        }
        let due = match state.population_written_at {
            None => true,
            Some(at) => state.order >= at + self.snapshot_interval,
        };
        if due {
            match write_json_atomic(&self.dir.join("population.json"), snapshot) {
                Ok(()) => state.population_written_at = Some(state.order),
                Err(e) => tracing::debug!("Failed to write population.json: {}", e),
            }
        }
    }

    fn finish(&self) {
        let Ok(state) = self.state.lock() else {
            return;
        };
        if let Some(snapshot) = &state.latest_population {
            if let Err(e) = write_json_atomic(&self.dir.join("population.json"), snapshot) {
                tracing::debug!("Failed to write population.json: {}", e);
            }
        }
        if let Err(e) = self.write_summary(&state) {
            tracing::warn!("Failed to write summary.json: {}", e);
        }
    }
}

/// Count, valid count and best score of an existing samples file.
fn read_existing(path: &Path) -> (usize, usize, Option<f64>) {
    let Ok(file) = File::open(path) else {
        return (0, 0, None);
    };
    let mut order = 0;
    let mut valid = 0;
    let mut best: Option<f64> = None;
    for line in BufReader::new(file).lines().map_while(Result::ok) {
        let Ok(record) = serde_json::from_str::<SampleRecord>(&line) else {
            continue;
        };
        order = order.max(record.order);
        if let Some(score) = record.score {
            valid += 1;
            best = Some(best.map_or(score, |b: f64| b.max(score)));
        }
    }
    (order, valid, best)
}

fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    let mut f = File::create(&tmp)?;
    f.write_all(json.as_bytes())?;
    f.flush()?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Read `summary.json` from a run directory, if the run got that far.
pub fn read_summary(dir: &Path) -> Option<RunSummaryRecord> {
    let content = std::fs::read_to_string(dir.join("summary.json")).ok()?;
    serde_json::from_str(&content).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::IslandSnapshot;
    use crate::program::text_to_function;
    use std::time::Duration;

    fn outcome(score: Option<f64>) -> FunctionWithOutcome {
        FunctionWithOutcome {
            function: text_to_function("def f(x):\n    return x\n").unwrap(),
            score,
            sample_time: Some(Duration::from_millis(12)),
            evaluate_time: Some(Duration::from_millis(3)),
        }
    }

    fn snapshot(registered: usize) -> PopulationSnapshot {
        PopulationSnapshot {
            islands: vec![IslandSnapshot {
                id: 0,
                best_score: Some(1.0),
                num_programs: registered,
                num_clusters: 1,
            }],
            best_score: Some(1.0),
            best_function: None,
            registered,
        }
    }

    #[test]
    fn test_writes_samples_best_and_summary() {
        let dir = tempfile::tempdir().unwrap();
        let p = JsonlProfiler::new(dir.path(), 0).unwrap();
        p.register_function(&outcome(Some(1.0)));
        p.register_function(&outcome(None));
        p.register_function(&outcome(Some(0.5)));
        p.finish();

        let lines = std::fs::read_to_string(dir.path().join("samples.jsonl")).unwrap();
        let records: Vec<SampleRecord> = lines
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].order, 1);
        assert_eq!(records[1].score, None);
        assert_eq!(records[0].sample_time_ms, Some(12));

        let best: BestRecord =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join("best.json")).unwrap())
                .unwrap();
        assert_eq!(best.score, 1.0);
        assert_eq!(best.order, 1);

        let summary = read_summary(dir.path()).unwrap();
        assert_eq!(summary.samples, 3);
        assert_eq!(summary.valid, 2);
        assert_eq!(summary.best_score, Some(1.0));
        assert!(!dir.path().join("population.json").exists());
    }

    #[test]
    fn test_population_written_on_interval() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("population.json");
        let p = JsonlProfiler::new(dir.path(), 2).unwrap();

        p.register_function(&outcome(Some(1.0)));
        p.register_population(&snapshot(1));
        let first: PopulationSnapshot = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(first.registered, 1);

        p.register_function(&outcome(Some(1.0)));
        p.register_population(&snapshot(2));
        let still: PopulationSnapshot = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(still.registered, 1);

        p.register_function(&outcome(Some(1.0)));
        p.register_population(&snapshot(3));
        let next: PopulationSnapshot = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(next.registered, 3);
    }

    #[test]
    fn test_continues_existing_log() {
        let dir = tempfile::tempdir().unwrap();
        {
            let p = JsonlProfiler::new(dir.path(), 0).unwrap();
            p.register_function(&outcome(Some(2.0)));
            p.register_function(&outcome(Some(1.0)));
        }
        let p = JsonlProfiler::new(dir.path(), 0).unwrap();
        p.register_function(&outcome(Some(1.5)));
        p.finish();

        let lines = std::fs::read_to_string(dir.path().join("samples.jsonl")).unwrap();
        let last: SampleRecord = serde_json::from_str(lines.lines().last().unwrap()).unwrap();
        assert_eq!(last.order, 3);
        // 1.5 did not beat the 2.0 from the earlier session
        let best: BestRecord =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join("best.json")).unwrap())
                .unwrap();
        assert_eq!(best.score, 2.0);
    }
}
