use thiserror::Error;

/// Disk image pipeline error types
#[derive(Error, Debug)]
pub enum ImageError {
    /// Source string is not a usable URI
    #[error("Can't parse source '{input}': {message}")]
    Parse { input: String, message: String },

    /// Remote rejected the request with a 4xx status
    #[error("Client error while downloading {url}: HTTP {status}")]
    Client { url: String, status: u16 },

    /// Remote kept answering 5xx until the retry budget ran out
    #[error("Server error while downloading {url}: HTTP {status} after {attempts} attempts")]
    ServerErrorExhausted {
        url: String,
        status: u16,
        attempts: u32,
    },

    /// Conditional fetch answered 304
    #[error("Not modified: {url}")]
    NotModified { url: String },

    /// Network-level failure (DNS, connection refused, reset)
    #[error("Transport error while downloading {url}: {message}")]
    Transport { url: String, message: String },

    /// Metadata request failed or returned unparseable headers
    #[error("Error accessing metadata of {url}: {message}")]
    Metadata { url: String, message: String },

    /// Recognized compression signature without a decoder
    #[error("Unsupported compression format: {0}")]
    UnsupportedFormat(String),

    /// Size requested on a stream whose decoded length cannot be known
    #[error("Size of stream can't be determined")]
    UnknownSize,

    /// External decompressor failed or is absent
    #[error("Decompressor '{command}' failed: {message}")]
    Process { command: String, message: String },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[source] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Volume import error
    #[error("Import of volume '{volume}' failed: {message}")]
    Import { volume: String, message: String },
}

/// Discriminator for [`ImageError`], for callers that branch on the condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Parse,
    Client,
    ServerErrorExhausted,
    NotModified,
    Transport,
    Metadata,
    UnsupportedFormat,
    UnknownSize,
    Process,
    Io,
    Config,
    Import,
}

impl ImageError {
    /// The condition this error represents.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ImageError::Parse { .. } => ErrorKind::Parse,
            ImageError::Client { .. } => ErrorKind::Client,
            ImageError::ServerErrorExhausted { .. } => ErrorKind::ServerErrorExhausted,
            ImageError::NotModified { .. } => ErrorKind::NotModified,
            ImageError::Transport { .. } => ErrorKind::Transport,
            ImageError::Metadata { .. } => ErrorKind::Metadata,
            ImageError::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
            ImageError::UnknownSize => ErrorKind::UnknownSize,
            ImageError::Process { .. } => ErrorKind::Process,
            ImageError::Io(_) => ErrorKind::Io,
            ImageError::Config(_) => ErrorKind::Config,
            ImageError::Import { .. } => ErrorKind::Import,
        }
    }

    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            ImageError::Client { status, .. } | ImageError::ServerErrorExhausted { status, .. } => {
                Some(*status)
            }
            ImageError::NotModified { .. } => Some(304),
            _ => None,
        }
    }
}

// Failed pipeline stages replay their terminal condition on every later call,
// so errors need to be duplicable. `std::io::Error` is not `Clone`; its kind and
// message are carried over instead.
impl Clone for ImageError {
    fn clone(&self) -> Self {
        match self {
            ImageError::Parse { input, message } => ImageError::Parse {
                input: input.clone(),
                message: message.clone(),
            },
            ImageError::Client { url, status } => ImageError::Client {
                url: url.clone(),
                status: *status,
            },
            ImageError::ServerErrorExhausted {
                url,
                status,
                attempts,
            } => ImageError::ServerErrorExhausted {
                url: url.clone(),
                status: *status,
                attempts: *attempts,
            },
            ImageError::NotModified { url } => ImageError::NotModified { url: url.clone() },
            ImageError::Transport { url, message } => ImageError::Transport {
                url: url.clone(),
                message: message.clone(),
            },
            ImageError::Metadata { url, message } => ImageError::Metadata {
                url: url.clone(),
                message: message.clone(),
            },
            ImageError::UnsupportedFormat(name) => ImageError::UnsupportedFormat(name.clone()),
            ImageError::UnknownSize => ImageError::UnknownSize,
            ImageError::Process { command, message } => ImageError::Process {
                command: command.clone(),
                message: message.clone(),
            },
            ImageError::Io(e) => ImageError::Io(std::io::Error::new(e.kind(), e.to_string())),
            ImageError::Config(msg) => ImageError::Config(msg.clone()),
            ImageError::Import { volume, message } => ImageError::Import {
                volume: volume.clone(),
                message: message.clone(),
            },
        }
    }
}

/// Unwraps pipeline errors that travelled through a `std::io::Read` boundary.
impl From<std::io::Error> for ImageError {
    fn from(err: std::io::Error) -> Self {
        if err.get_ref().is_some_and(|inner| inner.is::<ImageError>()) {
            let kind = err.kind();
            return match err.into_inner().map(|inner| inner.downcast::<ImageError>()) {
                Some(Ok(inner)) => *inner,
                _ => ImageError::Io(std::io::Error::from(kind)),
            };
        }
        ImageError::Io(err)
    }
}

impl From<ImageError> for std::io::Error {
    fn from(err: ImageError) -> Self {
        match err {
            ImageError::Io(e) => e,
            other => std::io::Error::other(other),
        }
    }
}

impl From<serde_json::Error> for ImageError {
    fn from(err: serde_json::Error) -> Self {
        ImageError::Config(err.to_string())
    }
}

impl From<serde_yaml::Error> for ImageError {
    fn from(err: serde_yaml::Error) -> Self {
        ImageError::Config(err.to_string())
    }
}

/// Result type alias for disk image pipeline operations
pub type Result<T> = std::result::Result<T, ImageError>;
