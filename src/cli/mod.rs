// src/cli/mod.rs — CLI definition (clap derive)

pub mod eval;
pub mod progress;
pub mod run;

use clap::{ArgAction, Args, Parser, Subcommand};

use crate::core::types::IsolationMode;
use crate::infra::config::Config;

#[derive(Parser)]
#[command(
    name = "funsearch",
    about = "Evolve a program with a language model under a sample budget",
    version
)]
pub struct Cli {
    /// Config file path
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a search from a template program
    Run(RunArgs),
    /// Score a single program with the configured evaluator
    Eval {
        /// Program file to score
        file: String,
        /// Where to run the evaluation
        #[arg(long, value_enum)]
        isolation: Option<IsolationMode>,
    },
    /// Print the effective configuration as TOML
    Config,
}

/// Command-line overrides for the `[search]`, `[sampler]` and `[profiler]`
/// sections of the config file.
#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Template program (seed function is its first function)
    #[arg(short, long)]
    pub template: Option<String>,

    /// Sample budget (0 = unbounded)
    #[arg(short = 'n', long)]
    pub max_samples: Option<usize>,

    /// Number of concurrent sampler workers
    #[arg(long)]
    pub samplers: Option<usize>,

    /// Number of evaluation slots
    #[arg(long)]
    pub evaluators: Option<usize>,

    /// Samples drawn per prompt
    #[arg(long)]
    pub samples_per_prompt: Option<usize>,

    /// Model to sample from (provider/model format)
    #[arg(short, long)]
    pub model: Option<String>,

    /// Continue the run stored in --log-dir instead of starting fresh
    #[arg(long)]
    pub resume: bool,

    /// Stop the whole run on the first unexpected worker error
    #[arg(long)]
    pub debug: bool,

    /// Where evaluation tasks run
    #[arg(long, value_enum)]
    pub isolation: Option<IsolationMode>,

    /// Directory for the run log and database checkpoint
    #[arg(long)]
    pub log_dir: Option<String>,

    /// Seed for prompt selection
    #[arg(long)]
    pub seed: Option<u64>,

    /// Suppress progress output (only emit the best function)
    #[arg(long)]
    pub quiet: bool,
}

impl RunArgs {
    /// Apply the flags that were given on top of `config`.
    pub fn apply(&self, config: &mut Config) {
        let search = &mut config.search;
        if let Some(ref template) = self.template {
            search.template = Some(template.clone());
        }
        if let Some(n) = self.max_samples {
            search.max_sample_nums = n;
        }
        if let Some(n) = self.samplers {
            search.num_samplers = n;
        }
        if let Some(n) = self.evaluators {
            search.num_evaluators = n;
        }
        if let Some(n) = self.samples_per_prompt {
            search.samples_per_prompt = n;
        }
        if let Some(mode) = self.isolation {
            search.isolation_mode = mode;
        }
        search.resume_mode |= self.resume;
        search.debug_mode |= self.debug;

        if let Some(ref model) = self.model {
            config.sampler.model = model.clone();
        }
        if let Some(ref dir) = self.log_dir {
            config.profiler.log_dir = Some(dir.clone());
        }
        if self.seed.is_some() {
            config.database.seed = self.seed;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_flags() {
        let cli = Cli::try_parse_from([
            "funsearch",
            "-vv",
            "run",
            "--template",
            "spec.py",
            "-n",
            "100",
            "--isolation",
            "process",
            "--debug",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.template.as_deref(), Some("spec.py"));
        assert_eq!(args.max_samples, Some(100));
        assert_eq!(args.isolation, Some(IsolationMode::IsolatedProcess));
        assert!(args.debug);
        assert!(!args.resume);
    }

    #[test]
    fn test_apply_overrides_only_given_flags() {
        let mut config = Config::default();
        config.search.num_samplers = 7;
        let args = RunArgs {
            max_samples: Some(0),
            evaluators: Some(2),
            model: Some("openai/gpt-4o-mini".into()),
            resume: true,
            ..Default::default()
        };
        args.apply(&mut config);

        assert_eq!(config.search.num_samplers, 7);
        assert_eq!(config.search.num_evaluators, 2);
        assert_eq!(config.search.max_sample_nums, 0);
        assert!(config.search.resume_mode);
        assert!(!config.search.debug_mode);
        assert_eq!(config.sampler.model, "openai/gpt-4o-mini");
        assert!(config.profiler.log_dir.is_none());
    }

    #[test]
    fn test_parse_eval_and_config() {
        let cli = Cli::try_parse_from(["funsearch", "eval", "cand.py"]).unwrap();
        assert!(matches!(cli.command, Commands::Eval { ref file, isolation: None } if file == "cand.py"));

        let cli = Cli::try_parse_from(["funsearch", "--config", "c.toml", "config"]).unwrap();
        assert_eq!(cli.config.as_deref(), Some("c.toml"));
        assert!(matches!(cli.command, Commands::Config));
    }
}
