//! Byte sources for disk images.
//!
//! Every pipeline stage speaks the same narrow capability set:
//!
//! - [`std::io::Read`] to pull bytes
//! - [`Close`] to release the underlying descriptor, socket or process
//! - [`Size`] to report the stream length, which may legitimately fail with
//!   [`ImageError::UnknownSize`](a3s_image_core::ImageError::UnknownSize)
//!
//! Stages that need a length declare the `Size` bound; there is no runtime
//! probing for optional capabilities.

mod file;
mod http;
mod uri;

pub use file::FileSource;
pub use http::{HttpSource, RemoteMetadata};
pub use uri::{open, open_conditional};

use a3s_image_core::error::Result;
use std::io::Read;

/// Releases the resource behind a stream.
///
/// Closing twice, or closing a stream that never opened anything, is a no-op.
pub trait Close {
    fn close(&mut self) -> Result<()>;
}

/// Reports the number of bytes a full read of the stream yields.
pub trait Size {
    fn size(&mut self) -> Result<u64>;

    /// Length if it can be determined, `None` otherwise.
    fn try_size(&mut self) -> Option<u64> {
        self.size().ok()
    }
}

/// A concrete source the URI resolver can hand out.
pub trait ImageSource: Read + Close + Size + Send {}

impl<T: Read + Close + Size + Send> ImageSource for T {}

impl<T: Close + ?Sized> Close for Box<T> {
    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

impl<T: Size + ?Sized> Size for Box<T> {
    fn size(&mut self) -> Result<u64> {
        (**self).size()
    }

    fn try_size(&mut self) -> Option<u64> {
        (**self).try_size()
    }
}
