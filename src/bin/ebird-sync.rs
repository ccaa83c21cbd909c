mod commands;

use clap::Parser;
use commands::{execute_command, Commands};
use std::path::PathBuf;

/// eBird checklist ledger, photo uploader and BirdReport sync
#[derive(Parser)]
#[command(
    name = "ebird-sync",
    about = "eBird checklist ledger, photo uploader and BirdReport sync",
    long_about = None
)]
struct Cli {
    /// Credential file (defaults to ./secrets.ini, then the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Show detailed debug information
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Cli::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    if let Err(e) = execute_command(args.command, args.config).await {
        eprintln!("❌ Command failed: {e}");
        std::process::exit(1);
    }

    Ok(())
}
