//! Transparent decompression of image streams.
//!
//! The codec is chosen once per stream from at most [`SIGNATURE_WIDTH`]
//! leading bytes, tested against a fixed table:
//!
//! | Signature              | Codec                           |
//! |------------------------|---------------------------------|
//! | `1F 9D`                | unsupported (`compress`, LZW)   |
//! | `1F 8B`                | gzip, in process                |
//! | `42 5A 68` (`BZh`)     | bzip2, in process               |
//! | `78 9C`                | zlib, in process                |
//! | `4C 5A 49 50` (`LZIP`) | unsupported (lzip)              |
//! | `FD 37 7A 58 5A 00`    | xz, through an external process |
//!
//! Anything else passes through unmodified.

mod process;
mod stream;

pub use process::FilterProcess;
pub use stream::DecodedStream;

/// Compression applied to a byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Codec {
    /// Not compressed
    None,
    Gzip,
    Bzip2,
    Zlib,
    Xz,
    /// Recognized, but no decoder is available
    Unsupported(&'static str),
}

impl Codec {
    /// Whether bytes flow through unmodified.
    pub fn is_passthrough(&self) -> bool {
        matches!(self, Codec::None)
    }

    /// Short lowercase name.
    pub fn name(&self) -> &'static str {
        match self {
            Codec::None => "none",
            Codec::Gzip => "gzip",
            Codec::Bzip2 => "bzip2",
            Codec::Zlib => "zlib",
            Codec::Xz => "xz",
            Codec::Unsupported(name) => name,
        }
    }
}

impl std::fmt::Display for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Signatures in priority order. The order is the tie-break rule.
const SIGNATURES: [(&[u8], Codec); 6] = [
    (b"\x1f\x9d", Codec::Unsupported("compress")),
    (b"\x1f\x8b", Codec::Gzip),
    (b"BZh", Codec::Bzip2),
    (b"\x78\x9c", Codec::Zlib),
    (b"LZIP", Codec::Unsupported("lzip")),
    (b"\xfd7zXZ\x00", Codec::Xz),
];

/// Bytes of look-ahead needed to test every signature.
pub const SIGNATURE_WIDTH: usize = 6;

/// Pick the codec for a stream starting with `header`.
///
/// `header` may be shorter than [`SIGNATURE_WIDTH`] when the stream is short;
/// signatures longer than the header never match.
pub fn detect(header: &[u8]) -> Codec {
    SIGNATURES
        .iter()
        .find(|(magic, _)| header.starts_with(magic))
        .map(|(_, codec)| *codec)
        .unwrap_or(Codec::None)
}
