use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{ImageError, Result};

/// Image import configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// Remote source settings
    pub http: HttpConfig,

    /// Decompression settings
    pub decompress: DecompressConfig,
}

impl ImportConfig {
    /// Load configuration from a YAML or JSON file, chosen by extension.
    pub fn from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| {
            ImageError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;

        let config: ImportConfig = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::from_str(&data)?,
            _ => serde_yaml::from_str(&data)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.http.max_attempts == 0 {
            return Err(ImageError::Config(
                "http.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.decompress.xz_command.trim().is_empty() {
            return Err(ImageError::Config(
                "decompress.xz_command must not be empty".to_string(),
            ));
        }
        if self.decompress.pipe_buffer_size == 0 {
            return Err(ImageError::Config(
                "decompress.pipe_buffer_size must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Remote HTTP source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Attempts per fetch; only 5xx responses are retried
    pub max_attempts: u32,

    /// Fixed wait between attempts, in milliseconds
    pub retry_wait_ms: u64,

    /// Connect timeout in seconds (no whole-request timeout is applied)
    pub connect_timeout_secs: u64,

    /// User-Agent header
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_wait_ms: 2000,
            connect_timeout_secs: 30,
            user_agent: format!("a3s-image/{}", crate::VERSION),
        }
    }
}

impl HttpConfig {
    /// Wait between attempts as a duration.
    pub fn retry_wait(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.retry_wait_ms)
    }

    /// Connect timeout as a duration.
    pub fn connect_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.connect_timeout_secs)
    }
}

/// External decompressor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecompressConfig {
    /// Command used to decode xz streams
    pub xz_command: String,

    /// Extra arguments passed to `xz_command`
    pub xz_args: Vec<String>,

    /// Chunk size used when feeding the decompressor's stdin
    pub pipe_buffer_size: usize,
}

impl Default for DecompressConfig {
    fn default() -> Self {
        Self {
            xz_command: "xzcat".to_string(),
            xz_args: Vec::new(),
            pipe_buffer_size: 64 * 1024,
        }
    }
}
