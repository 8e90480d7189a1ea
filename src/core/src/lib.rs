//! A3S Image Core - Foundational Types
//!
//! This module provides the error taxonomy and configuration types shared
//! by the disk image pipeline and its command line front end.

pub mod config;
pub mod error;

// Re-export commonly used types
pub use config::{DecompressConfig, HttpConfig, ImportConfig};
pub use error::{ErrorKind, ImageError, Result};

/// A3S Image version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
