// src/main.rs — funsearch entry point

use clap::Parser;

use funsearch::cli::{Cli, Commands};
use funsearch::infra::config::Config;
use funsearch::infra::logger;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Respects RUST_LOG; -v / -vv raise the default level
    logger::init_logging(logger::level_for_verbosity(cli.verbose));

    if let Err(e) = run(cli).await {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    // Falls back to defaults if no config.toml
    let config = if let Some(ref path) = cli.config {
        Config::load_from(std::path::Path::new(path))?
    } else {
        Config::load()?
    };

    match cli.command {
        Commands::Run(args) => {
            funsearch::cli::run::run_search(&args, config).await?;
        }
        Commands::Eval { file, isolation } => {
            funsearch::cli::eval::run_eval(std::path::Path::new(&file), isolation, config).await?;
        }
        Commands::Config => {
            print!("{}", toml::to_string_pretty(&config)?);
        }
    }
    Ok(())
}
