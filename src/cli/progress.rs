// src/cli/progress.rs — Terminal progress for a running search
//
// All progress output goes to stderr so stdout stays clean for the best
// function printed at the end.

use std::sync::Mutex;

use crate::core::types::{FunctionWithOutcome, RunSummary};
use crate::database::PopulationSnapshot;
use crate::profiler::Profiler;

/// Profiler that prints one line per sample and one per new best score.
pub struct TerminalProgress {
    max_samples: Option<usize>,
    state: Mutex<(usize, Option<f64>)>,
}

impl TerminalProgress {
    /// `initial_samples` is the budget count a resumed run starts from.
    pub fn new(max_samples: Option<usize>, initial_samples: usize) -> Self {
        Self {
            max_samples,
            state: Mutex::new((initial_samples, None)),
        }
    }

    /// Update the counters for one report and return the lines to print.
    fn lines_for(&self, outcome: &FunctionWithOutcome) -> Vec<String> {
        let Ok(mut state) = self.state.lock() else {
            return Vec::new();
        };
        let (seen, best) = &mut *state;
        let mut lines = Vec::new();

        // The seed has no sample time and is not part of the budget
        if outcome.sample_time.is_none() {
            lines.push(format!("[seed] score={}", format_score(outcome.score)));
            if outcome.score.is_some() {
                *best = outcome.score;
            }
            return lines;
        }

        *seen += 1;
        lines.push(format_sample(*seen, self.max_samples, outcome.score));
        if let Some(score) = outcome.score {
            if best.map_or(true, |b| score > b) {
                *best = Some(score);
                lines.push(format!("[best] score={}", format_score(Some(score))));
            }
        }
        lines
    }
}

impl Profiler for TerminalProgress {
    fn register_function(&self, outcome: &FunctionWithOutcome) {
        for line in self.lines_for(outcome) {
            eprintln!("{}", line);
        }
    }
}

pub fn format_score(score: Option<f64>) -> String {
    match score {
        Some(s) => format!("{:.4}", s),
        None => "invalid".to_string(),
    }
}

pub fn format_sample(seen: usize, max: Option<usize>, score: Option<f64>) -> String {
    match max {
        Some(max) => format!("[sample {}/{}] score={}", seen, max, format_score(score)),
        None => format!("[sample {}] score={}", seen, format_score(score)),
    }
}

pub fn format_done(summary: &RunSummary, population: &PopulationSnapshot) -> String {
    let status = if summary.interrupted { "interrupted" } else { "done" };
    format!(
        "[{}] samples={} registered={} best={}",
        status,
        summary.samples,
        summary.registered,
        format_score(population.best_score),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::text_to_function;
    use std::time::Duration;

    fn outcome(score: Option<f64>, sampled: bool) -> FunctionWithOutcome {
        FunctionWithOutcome {
            function: text_to_function("def f(x):\n    return x\n").unwrap(),
            score,
            sample_time: sampled.then_some(Duration::from_millis(5)),
            evaluate_time: Some(Duration::from_millis(1)),
        }
    }

    #[test]
    fn test_seed_is_not_counted_as_sample() {
        let progress = TerminalProgress::new(Some(4), 0);
        assert_eq!(progress.lines_for(&outcome(Some(1.0), false)), vec!["[seed] score=1.0000"]);
        assert_eq!(
            progress.lines_for(&outcome(Some(0.5), true)),
            vec!["[sample 1/4] score=0.5000"]
        );
        assert_eq!(
            progress.lines_for(&outcome(Some(2.0), true)),
            vec!["[sample 2/4] score=2.0000", "[best] score=2.0000"]
        );
        assert_eq!(
            progress.lines_for(&outcome(None, true)),
            vec!["[sample 3/4] score=invalid"]
        );
    }

    #[test]
    fn test_resumed_count_continues() {
        let progress = TerminalProgress::new(Some(10), 6);
        assert_eq!(
            progress.lines_for(&outcome(Some(3.0), true)),
            vec!["[sample 7/10] score=3.0000", "[best] score=3.0000"]
        );
    }

    #[test]
    fn test_sample_format() {
        assert_eq!(format_sample(3, Some(20), Some(1.5)), "[sample 3/20] score=1.5000");
        assert_eq!(format_sample(7, None, None), "[sample 7] score=invalid");
    }

    #[test]
    fn test_done_format() {
        let summary = RunSummary {
            samples: 21,
            registered: 9,
            interrupted: false,
        };
        let population = PopulationSnapshot {
            best_score: Some(-2.0),
            ..Default::default()
        };
        assert_eq!(
            format_done(&summary, &population),
            "[done] samples=21 registered=9 best=-2.0000"
        );

        let summary = RunSummary {
            interrupted: true,
            ..summary
        };
        assert!(format_done(&summary, &PopulationSnapshot::default())
            .starts_with("[interrupted] samples=21"));
    }
}
