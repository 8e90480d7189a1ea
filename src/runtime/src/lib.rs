//! A3S Image Runtime - disk image ingestion pipeline.
//!
//! A disk image is opened from a source string, decompressed transparently and
//! classified as QCOW2 or raw:
//!
//! ```text
//! source (file | http) -> DecodedStream (codec detection) -> DiskImage (format)
//! ```
//!
//! Every stage implements `std::io::Read` plus the [`Close`] and [`Size`]
//! capabilities, so the importer consumes a [`DiskImage`] without knowing
//! which transport or codec sits underneath.

#![allow(clippy::result_large_err)]

pub mod decompress;
pub mod image;
pub mod peek;
pub mod pool;
pub mod source;
pub mod volume;

// Re-export common types
pub use decompress::{Codec, DecodedStream, FilterProcess};
pub use image::{DiskImage, Format, QCOW2_MAGIC};
pub use peek::PeekReader;
pub use pool::{PoolGuard, PoolLocks};
pub use source::{
    open, open_conditional, Close, FileSource, HttpSource, ImageSource, RemoteMetadata, Size,
};
pub use volume::{ImportReport, VolumeImporter};

/// A3S Image Runtime version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
