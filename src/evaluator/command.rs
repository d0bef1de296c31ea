// src/evaluator/command.rs — External evaluation command
//
// Protocol: the program source is written to the command's stdin; the score
// is the last non-empty stdout line, either a bare number or `{"score": x}`.
// `None`, `null`, non-finite numbers and non-zero exit codes all mean "invalid".

use std::collections::HashMap;
use std::io::Write;
use std::process::{Command, Stdio};
use std::time::Duration;

use super::Evaluator;
use crate::infra::config::EvaluationConfig;
use crate::program::Program;

/// Command line used to score one program.
#[derive(Debug, Clone)]
pub struct EvaluationCommand {
    pub program: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub timeout: Option<Duration>,
}

impl EvaluationCommand {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            env: HashMap::new(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl From<&EvaluationConfig> for EvaluationCommand {
    fn from(config: &EvaluationConfig) -> Self {
        Self {
            program: config.command.clone(),
            args: config.args.clone(),
            env: config.env.clone(),
            timeout: (config.timeout_seconds > 0)
                .then(|| Duration::from_secs(config.timeout_seconds)),
        }
    }
}

/// Parse the score printed by an evaluation command.
pub fn parse_score_output(stdout: &str) -> Option<f64> {
    let line = stdout.lines().rev().map(str::trim).find(|l| !l.is_empty())?;

    let score = if line.starts_with('{') {
        let value: serde_json::Value = serde_json::from_str(line).ok()?;
        value.get("score")?.as_f64()?
    } else {
        line.parse::<f64>().ok()?
    };

    score.is_finite().then_some(score)
}

/// Runs the evaluation command synchronously inside the calling thread.
/// Used by the in-process pool, which cannot kill it once started.
pub struct CommandEvaluator {
    command: EvaluationCommand,
}

impl CommandEvaluator {
    pub fn new(command: EvaluationCommand) -> Self {
        Self { command }
    }

    fn run(&self, program: &Program) -> anyhow::Result<Option<f64>> {
        let mut child = Command::new(&self.command.program)
            .args(&self.command.args)
            .envs(&self.command.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            // The command may exit without reading; a broken pipe is its answer
            let _ = stdin.write_all(program.to_string().as_bytes());
        }

        let output = child.wait_with_output()?;
        if !output.status.success() {
            tracing::debug!(status = %output.status, "Evaluation command failed");
            return Ok(None);
        }
        Ok(parse_score_output(&String::from_utf8_lossy(&output.stdout)))
    }
}

impl Evaluator for CommandEvaluator {
    fn evaluate(&self, program: &Program) -> Option<f64> {
        match self.run(program) {
            Ok(score) => score,
            Err(e) => {
                tracing::warn!("Could not run evaluation command '{}': {}", self.command.program, e);
                None
            }
        }
    }
}
