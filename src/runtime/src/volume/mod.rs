//! Volume import.
//!
//! Provides `VolumeImporter`, which streams a disk image from any supported
//! source into a pool directory.

mod importer;

pub use importer::{ImportReport, VolumeImporter};
