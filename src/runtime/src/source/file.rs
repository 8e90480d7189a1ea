//! Local filesystem source.

use a3s_image_core::error::{ImageError, Result};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use super::{Close, Size};

/// A disk image stored on the local filesystem.
///
/// The file is opened eagerly so that a missing path or a permission problem
/// surfaces from [`FileSource::open`] rather than from the first read.
#[derive(Debug)]
pub struct FileSource {
    path: PathBuf,
    file: Option<File>,
}

impl FileSource {
    /// Open `path` for reading.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(ImageError::Io)?;

        tracing::debug!(path = %path.display(), "Opened local image source");

        Ok(Self {
            path,
            file: Some(file),
        })
    }

    /// Path this source reads from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn file_mut(&mut self) -> std::io::Result<&mut File> {
        let path = &self.path;
        self.file.as_mut().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("{} is closed", path.display()),
            )
        })
    }
}

impl Read for FileSource {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.file_mut()?.read(buf)
    }
}

impl Size for FileSource {
    fn size(&mut self) -> Result<u64> {
        let metadata = self.file_mut()?.metadata().map_err(ImageError::Io)?;
        Ok(metadata.len())
    }
}

impl Close for FileSource {
    fn close(&mut self) -> Result<()> {
        if self.file.take().is_some() {
            tracing::debug!(path = %self.path.display(), "Closed local image source");
        }
        Ok(())
    }
}

impl std::fmt::Display for FileSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.path.display())
    }
}
