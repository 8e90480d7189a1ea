//! Streams disk images into pool directories.
//!
//! Volume data is written to `<pool_dir>/<pool>/<volume>.partial` and renamed
//! into place once fully written, so a volume path never holds a truncated
//! image.

use a3s_image_core::config::ImportConfig;
use a3s_image_core::error::{ImageError, Result};
use sha2::{Digest, Sha256};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::decompress::Codec;
use crate::image::{DiskImage, Format};
use crate::pool::{PoolGuard, PoolLocks};
use crate::source::Close;

const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// Outcome of a successful import.
#[derive(Debug, Clone)]
pub struct ImportReport {
    pub format: Format,
    pub codec: Codec,
    /// Decoded bytes written
    pub bytes: u64,
    /// Lowercase hex SHA-256 of the written bytes
    pub sha256: String,
    pub path: PathBuf,
}

/// Imports disk images as volumes of a storage pool.
#[derive(Debug)]
pub struct VolumeImporter {
    pool_dir: PathBuf,
    config: ImportConfig,
    pools: Arc<PoolLocks>,
}

impl VolumeImporter {
    /// Create an importer writing under `pool_dir`, with its own lock registry.
    pub fn new(pool_dir: impl Into<PathBuf>, config: ImportConfig) -> Self {
        Self::with_locks(pool_dir, config, Arc::new(PoolLocks::new()))
    }

    /// Create an importer sharing `pools` with other importers.
    pub fn with_locks(
        pool_dir: impl Into<PathBuf>,
        config: ImportConfig,
        pools: Arc<PoolLocks>,
    ) -> Self {
        Self {
            pool_dir: pool_dir.into(),
            config,
            pools,
        }
    }

    /// Path the volume's data lives at.
    pub fn volume_path(&self, pool: &str, volume: &str) -> PathBuf {
        self.pool_dir.join(pool).join(volume)
    }

    /// Open `src` and write its decoded image to `pool`/`volume`.
    pub fn import(&self, src: &str, pool: &str, volume: &str) -> Result<ImportReport> {
        validate_name(volume, "volume", volume)?;
        validate_name(volume, "pool", pool)?;

        let mut image = DiskImage::open(src, &self.config)?;
        tracing::info!(source = src, pool, volume, format = %image.format(), "Importing volume");
        self.import_image(&mut image, pool, volume)
    }

    /// Write an already opened image to `pool`/`volume`.
    ///
    /// The image is closed before returning, whether or not the import
    /// succeeded.
    pub fn import_image<S>(
        &self,
        image: &mut DiskImage<S>,
        pool: &str,
        volume: &str,
    ) -> Result<ImportReport>
    where
        S: Read + Close + Send + 'static,
    {
        let written = validate_name(volume, "volume", volume)
            .and_then(|()| validate_name(volume, "pool", pool))
            .and_then(|()| self.write_volume(image, pool, volume));
        let closed = image.close();

        let report = written?;
        closed?;
        tracing::info!(
            pool,
            volume,
            bytes = report.bytes,
            sha256 = %report.sha256,
            "Volume imported"
        );
        Ok(report)
    }

    fn write_volume<S>(
        &self,
        image: &mut DiskImage<S>,
        pool: &str,
        volume: &str,
    ) -> Result<ImportReport>
    where
        S: Read + Close + Send + 'static,
    {
        let format = image.format();
        let codec = image.codec()?;

        let lock = self.pools.lock(pool);
        let _guard: PoolGuard<'_> = lock.lock();

        let pool_path = self.pool_dir.join(pool);
        std::fs::create_dir_all(&pool_path).map_err(|e| {
            import_error(
                volume,
                format!("failed to create pool directory {}: {}", pool_path.display(), e),
            )
        })?;

        let path = pool_path.join(volume);
        let tmp_path = pool_path.join(format!("{}.partial", volume));

        let copied = copy_to_file(image, &tmp_path, volume);
        let (bytes, sha256) = match copied {
            Ok(done) => done,
            Err(e) => {
                std::fs::remove_file(&tmp_path).ok();
                return Err(e);
            }
        };

        std::fs::rename(&tmp_path, &path).map_err(|e| {
            std::fs::remove_file(&tmp_path).ok();
            import_error(
                volume,
                format!(
                    "failed to rename {} -> {}: {}",
                    tmp_path.display(),
                    path.display(),
                    e
                ),
            )
        })?;

        Ok(ImportReport {
            format,
            codec,
            bytes,
            sha256,
            path,
        })
    }
}

/// Copy `reader` into a new file at `path`, returning the byte count and
/// SHA-256 of what was written.
fn copy_to_file(mut reader: impl Read, path: &Path, volume: &str) -> Result<(u64, String)> {
    let mut file = std::fs::File::create(path).map_err(|e| {
        import_error(
            volume,
            format!("failed to create {}: {}", path.display(), e),
        )
    })?;

    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; COPY_BUFFER_SIZE];
    let mut bytes = 0u64;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            // Pipeline conditions pass through with their original kind
            Err(e) => return Err(ImageError::from(e)),
        };
        file.write_all(&buf[..n]).map_err(|e| {
            import_error(volume, format!("failed to write {}: {}", path.display(), e))
        })?;
        hasher.update(&buf[..n]);
        bytes += n as u64;
    }

    file.sync_all().map_err(|e| {
        import_error(volume, format!("failed to sync {}: {}", path.display(), e))
    })?;

    Ok((bytes, hex::encode(hasher.finalize())))
}

fn validate_name(volume: &str, what: &str, name: &str) -> Result<()> {
    let invalid = name.is_empty()
        || name == "."
        || name.contains("..")
        || name.contains('/')
        || name.contains('\\');
    if invalid {
        return Err(import_error(volume, format!("invalid {} name '{}'", what, name)));
    }
    Ok(())
}

fn import_error(volume: &str, message: String) -> ImageError {
    ImageError::Import {
        volume: volume.to_string(),
        message,
    }
}
