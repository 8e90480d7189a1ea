//! Table formatting helpers for CLI output.

use comfy_table::{ContentArrangement, Table};

/// Create a styled table with the given headers.
pub fn new_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.load_preset(comfy_table::presets::NOTHING);
    table.set_header(headers);
    table
}

/// Format a byte count as a human-readable string.
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * KB;
    const GB: u64 = 1024 * MB;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Format a size that may not be known up front.
pub fn format_size(bytes: Option<u64>) -> String {
    bytes.map(format_bytes).unwrap_or_else(|| "unknown".to_string())
}

/// Shorten a hex digest for table display.
pub fn short_digest(digest: &str) -> &str {
    digest.get(..12).unwrap_or(digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes_zero() {
        assert_eq!(format_bytes(0), "0 B");
    }

    #[test]
    fn test_format_bytes_units() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(196_616), "192.0 KB");
        assert_eq!(format_bytes(10 * 1024 * 1024), "10.0 MB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3.0 GB");
    }

    #[test]
    fn test_format_size_unknown() {
        assert_eq!(format_size(None), "unknown");
        assert_eq!(format_size(Some(2048)), "2.0 KB");
    }

    #[test]
    fn test_short_digest() {
        assert_eq!(
            short_digest("99fdfa690de93cdc66966a9a89566487d63bc7776e98b5da7d0b8bb6fa0bea28"),
            "99fdfa690de9"
        );
        assert_eq!(short_digest("abc"), "abc");
    }

    #[test]
    fn test_new_table_renders_headers() {
        let mut table = new_table(&["SOURCE", "FORMAT"]);
        table.add_row(vec!["disk.qcow2", "qcow2"]);
        let rendered = table.to_string();
        assert!(rendered.contains("SOURCE"));
        assert!(rendered.contains("qcow2"));
    }
}
