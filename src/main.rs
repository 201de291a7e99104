//! embedhost - remote UI embedding host
//!
//! Serves an editor core to external UIs over RPC channels (`embed`,
//! `listen`) and offers a one-shot client (`remote`).

use std::path::PathBuf;

use clap::Parser;
use embedhost::{cli, commands::Commands};

#[derive(Parser)]
#[command(name = "embedhost", about = "Attach external UIs to an editor core")]
#[command(version, long_about = None)]
struct Cli {
    /// Configuration file (default: config.toml in the config dir)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Logging is set up per command: the host must never write logs to stdout
    if let Err(e) = cli::dispatch(cli.command, cli.config.as_deref()).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
