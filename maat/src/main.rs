//! maat: operator CLI for the MAAT compliance-and-integrity pipeline
//!
//! Compiles rulesets, evaluates permission cells, runs the language firewall
//! over files, and produces or verifies report + audit packet pairs.

mod cli;

use std::path::PathBuf;

use clap::Parser;
use tracing::info;

use cli::Commands;
use maat::MaatConfig;

#[derive(Parser)]
#[command(name = "maat")]
#[command(about = "Compliance-and-integrity pipeline for jury research")]
struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "MAAT_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("maat=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => {
            info!(path = %path.display(), "Loading config");
            MaatConfig::from_file(path)?
        }
        None => MaatConfig::default(),
    };

    match cli::execute_command(config, cli.command).await {
        Ok(outcome) => {
            println!("{}", outcome.output);
            if !outcome.success {
                std::process::exit(2);
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(1);
        }
    }
}
