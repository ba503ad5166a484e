use anyhow::Context;
use clap::Parser;
use std::process;
use tracing::error;

use quorum_wait::cli::{Cli, CliHandler, Commands};
use quorum_wait::config::LoggingConfig;
use quorum_wait::logging;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let handler = CliHandler::new(cli.config.clone());

    if let Err(e) = run(&cli, &handler).await {
        error!("{:#}", e);
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

async fn run(cli: &Cli, handler: &CliHandler) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Configs {
            with_crash_faults,
            max_n,
            json,
        } => {
            logging::init(&LoggingConfig::default())?;
            println!("{}", handler.configs(*with_crash_faults, *max_n, *json)?);
        }
        Commands::Quorum { n, f, c } => {
            logging::init(&LoggingConfig::default())?;
            println!("{}", handler.quorum(*n, *f, *c)?);
        }
        Commands::InitConfig { force } => {
            logging::init(&LoggingConfig::default())?;
            let path = handler.init_config(*force)?;
            println!("Wrote {}", path.display());
        }
        Commands::Simulate(args) => {
            let config = handler
                .load_config()
                .with_context(|| format!("loading {}", handler.config_path().display()))?;
            logging::init(&config.logging)?;
            let report = handler.simulate(args).await.context("simulation failed")?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", report.render());
            }
        }
    }
    Ok(())
}
