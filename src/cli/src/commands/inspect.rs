//! `a3s-image inspect` command.
//!
//! Each source is opened in its own pipeline on a blocking worker thread, so
//! slow downloads and retry waits do not hold up the other sources.

use a3s_image_core::{ImageError, ImportConfig};
use a3s_image_runtime::{Close, DiskImage, Size};
use clap::Args;
use serde::Serialize;

use crate::output;

#[derive(Args)]
pub struct InspectArgs {
    /// Image sources: local paths, file:// or http(s):// URLs
    #[arg(required = true)]
    pub sources: Vec<String>,

    /// Read each image fully and report the SHA-256 of the decoded bytes
    #[arg(long)]
    pub digest: bool,

    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

/// What was learned about one source.
#[derive(Debug, Serialize)]
pub(crate) struct InspectReport {
    pub source: String,
    pub format: Option<String>,
    pub codec: Option<String>,
    pub size: Option<u64>,
    pub sha256: Option<String>,
    pub error: Option<String>,
}

impl InspectReport {
    fn failed(source: String, error: String) -> Self {
        Self {
            source,
            format: None,
            codec: None,
            size: None,
            sha256: None,
            error: Some(error),
        }
    }
}

pub async fn execute(
    args: InspectArgs,
    config: ImportConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let handles: Vec<_> = args
        .sources
        .iter()
        .map(|source| {
            let source = source.clone();
            let config = config.clone();
            let digest = args.digest;
            tokio::task::spawn_blocking(move || {
                match inspect_source(&source, &config, digest) {
                    Ok(report) => report,
                    Err(e) => InspectReport::failed(source, e.to_string()),
                }
            })
        })
        .collect();

    let mut reports = Vec::with_capacity(handles.len());
    for handle in handles {
        reports.push(handle.await?);
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        print_table(&reports, args.digest);
    }

    let failed = reports.iter().filter(|r| r.error.is_some()).count();
    if failed > 0 {
        return Err(format!("{} of {} sources could not be inspected", failed, reports.len()).into());
    }
    Ok(())
}

/// Open one source and describe it. The image is closed on every path.
pub(crate) fn inspect_source(
    source: &str,
    config: &ImportConfig,
    digest: bool,
) -> Result<InspectReport, ImageError> {
    let mut image = DiskImage::open(source, config)?;
    let described = describe(&mut image, source, digest);
    let closed = image.close();
    let report = described?;
    closed?;
    Ok(report)
}

fn describe(image: &mut DiskImage, source: &str, digest: bool) -> Result<InspectReport, ImageError> {
    let codec = image.codec()?;
    let size = image.try_size();
    let sha256 = if digest { Some(image.sha256()?) } else { None };

    tracing::debug!(source, format = %image.format(), codec = %codec, "Inspected image");

    Ok(InspectReport {
        source: source.to_string(),
        format: Some(image.format().to_string()),
        codec: Some(codec.to_string()),
        size,
        sha256,
        error: None,
    })
}

fn print_table(reports: &[InspectReport], digest: bool) {
    let mut headers = vec!["SOURCE", "FORMAT", "COMPRESSION", "SIZE"];
    if digest {
        headers.push("SHA256");
    }
    headers.push("ERROR");

    let mut table = output::new_table(&headers);
    for report in reports {
        let mut row = vec![
            report.source.clone(),
            report.format.clone().unwrap_or_else(|| "-".to_string()),
            report.codec.clone().unwrap_or_else(|| "-".to_string()),
            if report.error.is_some() {
                "-".to_string()
            } else {
                output::format_size(report.size)
            },
        ];
        if digest {
            row.push(
                report
                    .sha256
                    .as_deref()
                    .map(output::short_digest)
                    .unwrap_or("-")
                    .to_string(),
            );
        }
        row.push(report.error.clone().unwrap_or_default());
        table.add_row(row);
    }
    println!("{table}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_inspect_local_qcow2() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("disk.qcow2");
        let mut data = b"QFI\xfb\x00\x00\x00\x03".to_vec();
        data.resize(1024, 0);
        std::fs::write(&path, &data).unwrap();

        let report =
            inspect_source(path.to_str().unwrap(), &ImportConfig::default(), true).unwrap();
        assert_eq!(report.format.as_deref(), Some("qcow2"));
        assert_eq!(report.codec.as_deref(), Some("none"));
        assert_eq!(report.size, Some(1024));
        assert_eq!(report.sha256.as_ref().map(String::len), Some(64));
        assert!(report.error.is_none());
    }

    #[test]
    fn test_inspect_without_digest() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("disk.img");
        std::fs::write(&path, b"raw bytes").unwrap();

        let report =
            inspect_source(path.to_str().unwrap(), &ImportConfig::default(), false).unwrap();
        assert_eq!(report.format.as_deref(), Some("raw"));
        assert!(report.sha256.is_none());
    }

    #[test]
    fn test_inspect_missing_source() {
        let err = inspect_source("/nonexistent/disk.img", &ImportConfig::default(), false)
            .unwrap_err();
        assert_eq!(err.kind(), a3s_image_core::ErrorKind::Io);
    }

    #[test]
    fn test_failed_report_serializes() {
        let report = InspectReport::failed("ftp://x".to_string(), "bad scheme".to_string());
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["source"], "ftp://x");
        assert_eq!(json["error"], "bad scheme");
        assert!(json["format"].is_null());
    }
}
