//! Disk image format classification.
//!
//! The outermost pipeline stage. It sits on top of the decoded stream so a
//! compressed QCOW2 image still classifies as QCOW2.

use a3s_image_core::config::{DecompressConfig, ImportConfig};
use a3s_image_core::error::{ImageError, Result};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::io::{self, Read};

use crate::decompress::{Codec, DecodedStream};
use crate::peek::PeekReader;
use crate::source::{self, Close, ImageSource, Size};

/// QCOW2 magic (`QFI\xfb`) followed by big-endian version 3.
pub const QCOW2_MAGIC: [u8; 8] = *b"QFI\xfb\x00\x00\x00\x03";

/// On-disk layout of a virtual disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    Qcow2,
    Raw,
}

impl Format {
    /// Classify from the first bytes of a decoded image.
    pub fn detect(header: &[u8]) -> Self {
        if header == QCOW2_MAGIC {
            Format::Qcow2
        } else {
            Format::Raw
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Format::Qcow2 => "qcow2",
            Format::Raw => "raw",
        }
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified, decompressed disk image.
///
/// Reading yields the decoded image from its first byte; the bytes inspected
/// for classification are replayed.
pub struct DiskImage<S: Read + Send + 'static = Box<dyn ImageSource>> {
    reader: PeekReader<DecodedStream<S>>,
    format: Format,
}

impl DiskImage {
    /// Resolve `src`, open it, and classify the decoded stream.
    pub fn open(src: &str, config: &ImportConfig) -> Result<Self> {
        Self::open_conditional(src, config, None)
    }

    /// Like [`DiskImage::open`], but remote sources are fetched only when
    /// modified after `since`.
    pub fn open_conditional(
        src: &str,
        config: &ImportConfig,
        since: Option<DateTime<Utc>>,
    ) -> Result<Self> {
        let source = source::open_conditional(src, config, since)?;
        let image = Self::from_source(source, &config.decompress)?;
        tracing::debug!(source = src, format = %image.format, "Opened disk image");
        Ok(image)
    }
}

impl<S: Read + Close + Send + 'static> DiskImage<S> {
    /// Wrap an already opened source.
    ///
    /// The source is closed before returning if classification fails.
    pub fn from_source(source: S, config: &DecompressConfig) -> Result<Self> {
        let mut reader = PeekReader::new(DecodedStream::new(source, config));
        let detected = reader.peek(QCOW2_MAGIC.len()).map(Format::detect);
        let format = match detected {
            Ok(format) => format,
            Err(e) => {
                let error = ImageError::from(e);
                if let Err(close_err) = reader.get_mut().close() {
                    tracing::warn!(error = %close_err, "Failed to close image source");
                }
                return Err(error);
            }
        };
        Ok(Self { reader, format })
    }
}

impl<S: Read + Send + 'static> DiskImage<S> {
    pub fn format(&self) -> Format {
        self.format
    }

    /// Compression removed from the source.
    pub fn codec(&mut self) -> Result<Codec> {
        self.reader.get_mut().codec()
    }

    /// Read the remaining image and return the lowercase hex SHA-256 of the
    /// decoded bytes.
    pub fn sha256(&mut self) -> Result<String> {
        let mut hasher = Sha256::new();
        io::copy(self, &mut hasher)?;
        Ok(hex::encode(hasher.finalize()))
    }
}

impl<S: Read + Send + 'static> Read for DiskImage<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

impl<S: Read + Size + Send + 'static> Size for DiskImage<S> {
    fn size(&mut self) -> Result<u64> {
        self.reader.get_mut().size()
    }
}

impl<S: Read + Close + Send + 'static> Close for DiskImage<S> {
    fn close(&mut self) -> Result<()> {
        self.reader.get_mut().close()
    }
}

impl<S: Read + Send + 'static> std::fmt::Debug for DiskImage<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskImage")
            .field("format", &self.format)
            .field("codec", &self.reader.get_ref().detected_codec())
            .finish()
    }
}
