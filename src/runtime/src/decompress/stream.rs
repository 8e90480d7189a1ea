//! Lazily decided decoding stage.

use a3s_image_core::config::DecompressConfig;
use a3s_image_core::error::{ImageError, Result};
use bzip2::read::MultiBzDecoder;
use flate2::read::{MultiGzDecoder, ZlibDecoder};
use std::io::{self, Read};

use super::process::FilterProcess;
use super::{detect, Codec, SIGNATURE_WIDTH};
use crate::peek::PeekReader;
use crate::source::{Close, Size};

enum Decoder<S: Read + Send + 'static> {
    Plain(PeekReader<S>),
    Gzip(MultiGzDecoder<PeekReader<S>>),
    Bzip2(MultiBzDecoder<PeekReader<S>>),
    Zlib(ZlibDecoder<PeekReader<S>>),
    Xz(FilterProcess<PeekReader<S>>),
}

impl<S: Read + Send + 'static> Decoder<S> {
    /// The raw source, when this stage still holds it directly.
    fn source_mut(&mut self) -> Option<&mut S> {
        match self {
            Decoder::Plain(r) => Some(r.get_mut()),
            Decoder::Gzip(d) => Some(d.get_mut().get_mut()),
            Decoder::Bzip2(d) => Some(d.get_mut().get_mut()),
            Decoder::Zlib(d) => Some(d.get_mut().get_mut()),
            // Owned by the feeder thread while the process runs
            Decoder::Xz(_) => None,
        }
    }

    fn into_source(self) -> Option<S> {
        let reader = match self {
            Decoder::Plain(r) => Some(r),
            Decoder::Gzip(d) => Some(d.into_inner()),
            Decoder::Bzip2(d) => Some(d.into_inner()),
            Decoder::Zlib(d) => Some(d.into_inner()),
            Decoder::Xz(mut process) => process.shutdown(),
        };
        reader.map(PeekReader::into_inner)
    }
}

impl<S: Read + Send + 'static> Read for Decoder<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Decoder::Plain(r) => r.read(buf),
            Decoder::Gzip(d) => d.read(buf),
            Decoder::Bzip2(d) => d.read(buf),
            Decoder::Zlib(d) => d.read(buf),
            Decoder::Xz(p) => p.read(buf),
        }
    }
}

enum State<S: Read + Send + 'static> {
    Undetermined(PeekReader<S>),
    Resolved { codec: Codec, decoder: Decoder<S> },
    Failed {
        source: Option<PeekReader<S>>,
        error: ImageError,
    },
    Closed,
}

/// A source with its compression removed.
///
/// The codec is detected on the first read, size query or [`codec`] call,
/// exactly once. Until then no bytes are consumed from the source; the
/// signature bytes are buffered and replayed to the decoder.
///
/// [`codec`]: DecodedStream::codec
pub struct DecodedStream<S: Read + Send + 'static> {
    state: State<S>,
    config: DecompressConfig,
}

impl<S: Read + Send + 'static> DecodedStream<S> {
    pub fn new(source: S, config: &DecompressConfig) -> Self {
        Self {
            state: State::Undetermined(PeekReader::new(source)),
            config: config.clone(),
        }
    }

    /// Detect the codec if that has not happened yet, and return it.
    pub fn codec(&mut self) -> Result<Codec> {
        self.resolve()
    }

    /// The codec, if detection already ran successfully.
    pub fn detected_codec(&self) -> Option<Codec> {
        match &self.state {
            State::Resolved { codec, .. } => Some(*codec),
            _ => None,
        }
    }

    fn resolve(&mut self) -> Result<Codec> {
        let detected = match &mut self.state {
            State::Resolved { codec, .. } => return Ok(*codec),
            State::Failed { error, .. } => return Err(error.clone()),
            State::Closed => return Err(closed_error()),
            State::Undetermined(reader) => reader
                .peek(SIGNATURE_WIDTH)
                .map(detect)
                .map_err(ImageError::from),
        };

        let reader = match std::mem::replace(&mut self.state, State::Closed) {
            State::Undetermined(reader) => reader,
            other => {
                self.state = other;
                return Err(closed_error());
            }
        };

        let codec = match detected {
            Ok(codec) => codec,
            Err(error) => {
                self.state = State::Failed {
                    source: Some(reader),
                    error: error.clone(),
                };
                return Err(error);
            }
        };

        tracing::debug!(codec = %codec, "Detected stream compression");

        match self.build_decoder(codec, reader) {
            Ok(decoder) => {
                self.state = State::Resolved { codec, decoder };
                Ok(codec)
            }
            Err((source, error)) => {
                self.state = State::Failed {
                    source: Some(source),
                    error: error.clone(),
                };
                Err(error)
            }
        }
    }

    fn build_decoder(
        &self,
        codec: Codec,
        reader: PeekReader<S>,
    ) -> std::result::Result<Decoder<S>, (PeekReader<S>, ImageError)> {
        let decoder = match codec {
            // Unsupported streams keep the source only so it can be closed;
            // reads are refused before reaching it.
            Codec::None | Codec::Unsupported(_) => Decoder::Plain(reader),
            Codec::Gzip => Decoder::Gzip(MultiGzDecoder::new(reader)),
            Codec::Bzip2 => Decoder::Bzip2(MultiBzDecoder::new(reader)),
            Codec::Zlib => Decoder::Zlib(ZlibDecoder::new(reader)),
            Codec::Xz => Decoder::Xz(FilterProcess::spawn(
                &self.config.xz_command,
                &self.config.xz_args,
                reader,
                self.config.pipe_buffer_size,
            )?),
        };
        Ok(decoder)
    }
}

impl<S: Read + Send + 'static> Read for DecodedStream<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if let Codec::Unsupported(name) = self.resolve()? {
            return Err(ImageError::UnsupportedFormat(name.to_string()).into());
        }
        if let State::Resolved { decoder, .. } = &mut self.state {
            return decoder.read(buf);
        }
        Err(closed_error().into())
    }
}

impl<S: Read + Size + Send + 'static> Size for DecodedStream<S> {
    /// Pass-through streams report the source length. Decoded length is not
    /// derivable from compressed length, so every real codec reports
    /// `UnknownSize`.
    fn size(&mut self) -> Result<u64> {
        match self.resolve()? {
            Codec::None => {}
            Codec::Unsupported(name) => {
                return Err(ImageError::UnsupportedFormat(name.to_string()))
            }
            _ => return Err(ImageError::UnknownSize),
        }
        match &mut self.state {
            State::Resolved { decoder, .. } => decoder
                .source_mut()
                .ok_or(ImageError::UnknownSize)?
                .size(),
            _ => Err(closed_error()),
        }
    }
}

impl<S: Read + Close + Send + 'static> Close for DecodedStream<S> {
    fn close(&mut self) -> Result<()> {
        let source = match std::mem::replace(&mut self.state, State::Closed) {
            State::Undetermined(reader) => Some(reader.into_inner()),
            State::Resolved { decoder, .. } => decoder.into_source(),
            State::Failed { source, .. } => source.map(PeekReader::into_inner),
            State::Closed => None,
        };
        match source {
            Some(mut source) => source.close(),
            None => Ok(()),
        }
    }
}

fn closed_error() -> ImageError {
    ImageError::Io(io::Error::new(io::ErrorKind::Other, "stream is closed"))
}
