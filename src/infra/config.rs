// src/infra/config.rs — Configuration loading (TOML)

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::core::types::{IsolationMode, SearchSettings};
use crate::infra::errors::SearchError;
use crate::infra::paths;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub evaluation: EvaluationConfig,

    #[serde(default)]
    pub sampler: SamplerConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub profiler: ProfilerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Path to the template (seed) program.
    pub template: Option<String>,
    pub num_samplers: usize,
    pub num_evaluators: usize,
    pub samples_per_prompt: usize,
    /// 0 = unbounded.
    pub max_sample_nums: usize,
    pub resume_mode: bool,
    pub debug_mode: bool,
    pub isolation_mode: IsolationMode,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            template: None,
            num_samplers: 4,
            num_evaluators: 4,
            samples_per_prompt: 4,
            max_sample_nums: 20,
            resume_mode: false,
            debug_mode: false,
            isolation_mode: IsolationMode::InProcess,
        }
    }
}

/// How a candidate program is scored: the program source is written to the
/// command's stdin and the score is read from the last line of stdout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    pub command: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    /// 0 = no timeout.
    pub timeout_seconds: u64,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            command: "python3".into(),
            args: vec!["evaluate.py".into()],
            env: HashMap::new(),
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// "provider/model", e.g. "ollama/qwen2.5-coder" or "openai/gpt-4o-mini".
    pub model: String,
    pub base_url: Option<String>,
    /// Name of the environment variable holding the API key.
    pub api_key_env: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: u32,
    pub max_retries: u32,
    /// Overrides the built-in instruction template (minijinja, `{{ code }}`).
    pub instruction: Option<String>,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            model: "ollama/qwen2.5-coder".into(),
            base_url: None,
            api_key_env: None,
            temperature: None,
            max_tokens: 1024,
            max_retries: 3,
            instruction: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub functions_per_prompt: usize,
    pub num_islands: usize,
    pub reset_period_seconds: u64,
    pub cluster_sampling_temperature_init: f64,
    pub cluster_sampling_temperature_period: usize,
    /// Fixed RNG seed for reproducible prompt selection.
    pub seed: Option<u64>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            functions_per_prompt: 2,
            num_islands: 10,
            reset_period_seconds: 4 * 60 * 60,
            cluster_sampling_temperature_init: 0.1,
            cluster_sampling_temperature_period: 30_000,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfilerConfig {
    /// Directory for samples.jsonl / best.json / summary.json. None = log only.
    pub log_dir: Option<String>,
    /// Write population.json every N reported samples (0 = never).
    pub snapshot_interval: usize,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            log_dir: None,
            snapshot_interval: 50,
        }
    }
}

impl Config {
    /// Load config from file, falling back to defaults.
    pub fn load() -> anyhow::Result<Self> {
        let path = paths::config_file_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<(), SearchError> {
        SearchSettings::from(self).validate()?;
        if self.database.num_islands == 0 {
            return Err(SearchError::Config(
                "database.num_islands must be > 0".into(),
            ));
        }
        if self.database.functions_per_prompt == 0 {
            return Err(SearchError::Config(
                "database.functions_per_prompt must be > 0".into(),
            ));
        }
        let temperature = self.database.cluster_sampling_temperature_init;
        if !(temperature > 0.0 && temperature.is_finite()) {
            return Err(SearchError::Config(
                "database.cluster_sampling_temperature_init must be > 0".into(),
            ));
        }
        // Both pool modes score programs by running this command
        if self.evaluation.command.trim().is_empty() {
            return Err(SearchError::Config(
                "evaluation.command must not be empty".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_reasonable() {
        let c = Config::default();
        assert_eq!(c.search.num_samplers, 4);
        assert_eq!(c.search.num_evaluators, 4);
        assert_eq!(c.search.samples_per_prompt, 4);
        assert_eq!(c.search.max_sample_nums, 20);
        assert!(!c.search.resume_mode);
        assert!(!c.search.debug_mode);
        assert_eq!(c.search.isolation_mode, IsolationMode::InProcess);
        assert_eq!(c.database.num_islands, 10);
        assert_eq!(c.database.functions_per_prompt, 2);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_parse_minimal_toml() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.search.num_samplers, 4);
        assert_eq!(config.evaluation.timeout_seconds, 30);
    }

    #[test]
    fn test_parse_full_toml() {
        let toml_str = r#"
[search]
template = "spec.py"
num_samplers = 2
num_evaluators = 8
samples_per_prompt = 3
max_sample_nums = 1000
resume_mode = true
debug_mode = true
isolation_mode = "isolated_process"

[evaluation]
command = "python3"
args = ["-u", "eval.py"]
timeout_seconds = 5

[sampler]
model = "openai/gpt-4o-mini"
api_key_env = "OPENAI_API_KEY"
temperature = 0.8

[database]
num_islands = 4
seed = 7

[profiler]
log_dir = "runs/demo"
snapshot_interval = 10
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.search.template.as_deref(), Some("spec.py"));
        assert_eq!(config.search.num_samplers, 2);
        assert_eq!(config.search.num_evaluators, 8);
        assert_eq!(config.search.max_sample_nums, 1000);
        assert!(config.search.resume_mode);
        assert_eq!(config.search.isolation_mode, IsolationMode::IsolatedProcess);
        assert_eq!(config.evaluation.args, vec!["-u", "eval.py"]);
        assert_eq!(config.evaluation.timeout_seconds, 5);
        assert_eq!(config.sampler.model, "openai/gpt-4o-mini");
        assert_eq!(config.sampler.max_tokens, 1024);
        assert_eq!(config.database.num_islands, 4);
        assert_eq!(config.database.functions_per_prompt, 2);
        assert_eq!(config.database.seed, Some(7));
        assert_eq!(config.profiler.snapshot_interval, 10);
    }

    #[test]
    fn test_isolation_mode_aliases() {
        let config: Config = toml::from_str("[search]\nisolation_mode = \"process\"").unwrap();
        assert_eq!(config.search.isolation_mode, IsolationMode::IsolatedProcess);
        let config: Config = toml::from_str("[search]\nisolation_mode = \"thread\"").unwrap();
        assert_eq!(config.search.isolation_mode, IsolationMode::InProcess);
    }

    #[test]
    fn test_validate_rejects_zero_parallelism() {
        let mut c = Config::default();
        c.search.num_samplers = 0;
        assert!(c.validate().is_err());

        let mut c = Config::default();
        c.search.num_evaluators = 0;
        assert!(c.validate().is_err());

        let mut c = Config::default();
        c.search.samples_per_prompt = 0;
        assert!(c.validate().is_err());

        let mut c = Config::default();
        c.database.cluster_sampling_temperature_init = 0.0;
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_validate_needs_command_in_every_mode() {
        for mode in [IsolationMode::InProcess, IsolationMode::IsolatedProcess] {
            let mut c = Config::default();
            c.search.isolation_mode = mode;
            assert!(c.validate().is_ok());

            c.evaluation.command.clear();
            assert!(matches!(c.validate(), Err(SearchError::Config(_))), "{mode}");

            c.evaluation.command = "   ".into();
            assert!(c.validate().is_err(), "{mode}");
        }
    }

    #[test]
    fn test_serialize_roundtrip() {
        let config = Config::default();
        let serialized = toml::to_string(&config).unwrap();
        let deserialized: Config = toml::from_str(&serialized).unwrap();
        assert_eq!(deserialized.search.num_samplers, config.search.num_samplers);
        assert_eq!(deserialized.sampler.model, config.sampler.model);
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = Config::load_from(Path::new("/nonexistent/config.toml"));
        assert!(result.is_err());
    }
}
