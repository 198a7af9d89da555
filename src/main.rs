use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use chain::{MemoryDb, SyncConfig};
use clap::{Parser, Subcommand};
use networking::sync::Skeleton;
use tracing::info;

#[derive(Parser, Debug)]
#[command(about = "Execution client sync core")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the effective sync configuration as YAML.
    Config {
        /// YAML file overriding the defaults.
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
    /// Print the skeleton status persisted in a file-backed store.
    Status {
        #[arg(short, long)]
        db: PathBuf,
    },
}

fn load_config(file: Option<PathBuf>) -> Result<SyncConfig> {
    match file {
        Some(path) => SyncConfig::load_from_file(&path)
            .map_err(|error| anyhow!("failed to load {}: {error}", path.display())),
        None => Ok(SyncConfig::default()),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    match args.command {
        Command::Config { file } => {
            let config = load_config(file)?;
            print!("{}", serde_yaml::to_string(&config)?);
        }
        Command::Status { db } => {
            let store = MemoryDb::open(&db)
                .with_context(|| format!("failed to open {}", db.display()))?;
            info!(entries = store.len(), "Opened skeleton store");
            let status = Skeleton::load_status(&store)?;
            print!("{}", serde_yaml::to_string(&status)?);
        }
    }

    Ok(())
}
