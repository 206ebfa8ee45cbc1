use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use gator::commands::{run_command, Command, State};
use gator::config::Config;
use gator::storage::{Database, DatabaseError};

#[derive(Parser, Debug)]
#[command(name = "gator", version, about = "RSS feed aggregator for the command line")]
struct Args {
    /// Config file (defaults to ~/.gatorconfig.json)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() {
    // Logs go to stderr so command output on stdout stays clean
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("gator=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if let Err(e) = run(args).await {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let config_path = match args.config {
        Some(path) => path,
        None => Config::default_path()?,
    };
    let config = Config::load(&config_path)?;

    let db = match Database::open(&config.db_url).await {
        Ok(db) => db,
        Err(DatabaseError::InstanceLocked) => {
            anyhow::bail!("{}", DatabaseError::InstanceLocked);
        }
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to open database {}", config.db_url));
        }
    };

    let mut state = State {
        config,
        config_path,
        db,
    };

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    run_command(&mut state, args.command, &mut out).await
}
