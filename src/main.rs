mod cli;

use anyhow::{Error, Result};
use clap::Parser;
use cli::{command, Cli, Commands};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Error> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = cli.ingest_config();

    let result = match &cli.command {
        Commands::Live { dimension, fetch } => {
            command::live(dimension, fetch, &config).await
        }
        Commands::Archive { date, fetch } => {
            command::archive(*date, fetch, &config).await
        }
        Commands::Ldm {
            dir,
            products,
            range,
        } => command::ldm(dir, products, range).await,
        Commands::Inspect { path, convention } => command::inspect(path, convention),
    };

    match result {
        Ok(summary) => println!("{}", summary),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }

    Ok(())
}
