//! `a3s-image import` command.

use std::path::PathBuf;

use a3s_image_core::ImportConfig;
use a3s_image_runtime::VolumeImporter;
use clap::Args;

use crate::output;

#[derive(Args)]
pub struct ImportArgs {
    /// Image source: local path, file:// or http(s):// URL
    pub source: String,

    /// Storage pool to import into
    #[arg(long)]
    pub pool: String,

    /// Volume name within the pool
    #[arg(long)]
    pub volume: String,

    /// Directory holding the pools (default: ~/.a3s/pools)
    #[arg(long)]
    pub pool_dir: Option<PathBuf>,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn execute(
    args: ImportArgs,
    config: ImportConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let pool_dir = args.pool_dir.clone().unwrap_or_else(super::pools_dir);
    let importer = VolumeImporter::new(pool_dir, config);

    if !args.json {
        println!("Importing {} into {}/{}...", args.source, args.pool, args.volume);
    }

    let source = args.source.clone();
    let pool = args.pool.clone();
    let volume = args.volume.clone();
    let report =
        tokio::task::spawn_blocking(move || importer.import(&source, &pool, &volume)).await??;

    if args.json {
        let output = serde_json::json!({
            "Source": args.source,
            "Pool": args.pool,
            "Volume": args.volume,
            "Path": report.path.display().to_string(),
            "Format": report.format.to_string(),
            "Compression": report.codec.to_string(),
            "Size": report.bytes,
            "Sha256": report.sha256,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("Imported: {}", report.path.display());
    println!("  Format:      {}", report.format);
    println!("  Compression: {}", report.codec);
    println!("  Size:        {}", output::format_bytes(report.bytes));
    println!("  SHA256:      {}", report.sha256);
    Ok(())
}
