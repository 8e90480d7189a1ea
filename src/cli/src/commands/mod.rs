//! CLI command definitions and dispatch.

mod import;
mod inspect;
mod version;

use std::path::{Path, PathBuf};

use a3s_image_core::ImportConfig;
use clap::{Parser, Subcommand};

/// A3S Image: disk image inspection and import.
#[derive(Parser)]
#[command(name = "a3s-image", version, about)]
pub struct Cli {
    /// Import configuration file (YAML, or JSON by extension)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Command {
    /// Show format, compression and size of disk images
    Inspect(inspect::InspectArgs),
    /// Import a disk image into a storage pool
    Import(import::ImportArgs),
    /// Show version information
    Version(version::VersionArgs),
}

/// Return the default pool directory (~/.a3s/pools).
pub(crate) fn pools_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".a3s"))
        .unwrap_or_else(|| PathBuf::from(".a3s"))
        .join("pools")
}

/// Load the import configuration, falling back to defaults.
pub(crate) fn load_config(path: Option<&Path>) -> Result<ImportConfig, Box<dyn std::error::Error>> {
    match path {
        Some(path) => Ok(ImportConfig::from_file(path)?),
        None => Ok(ImportConfig::default()),
    }
}

/// Dispatch a parsed CLI to the appropriate command handler.
pub async fn dispatch(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(cli.config.as_deref())?;
    match cli.command {
        Command::Inspect(args) => inspect::execute(args, config).await,
        Command::Import(args) => import::execute(args, config).await,
        Command::Version(args) => version::execute(args).await,
    }
}
