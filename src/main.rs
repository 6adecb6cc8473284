//! Temporal-Datalog: Main entry point

use clap::Parser;
use temporal_datalog::cli::{self, Cli, Commands};
use temporal_datalog::config::Config;
use temporal_datalog::error::Result;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    Config::from_cli(&cli).init_tracing()?;

    let mut stdout = std::io::stdout().lock();
    match &cli.command {
        Commands::Demo => cli::demo(&mut stdout).await,
        Commands::Run(args) => cli::run(args, &mut stdout).await,
    }
}
