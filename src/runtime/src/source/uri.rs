//! Source string resolution.

use a3s_image_core::config::ImportConfig;
use a3s_image_core::error::{ImageError, Result};
use chrono::{DateTime, Utc};
use url::Url;

use super::{FileSource, HttpSource, ImageSource};

enum Target {
    Local(std::path::PathBuf),
    Remote(Url),
}

/// Open the source named by `src`.
///
/// `http://` and `https://` URLs become an [`HttpSource`]; `file://` URLs and
/// bare paths become a [`FileSource`]. Any other scheme is a parse error.
pub fn open(src: &str, config: &ImportConfig) -> Result<Box<dyn ImageSource>> {
    open_conditional(src, config, None)
}

/// Like [`open`], but a remote source only downloads data modified after
/// `since`. Ignored for local files.
pub fn open_conditional(
    src: &str,
    config: &ImportConfig,
    since: Option<DateTime<Utc>>,
) -> Result<Box<dyn ImageSource>> {
    match resolve(src)? {
        Target::Remote(url) => {
            tracing::debug!(url = %url, "Resolved remote image source");
            let mut source = HttpSource::open(url.as_str(), &config.http)?;
            if let Some(since) = since {
                source.set_if_modified_since(since);
            }
            Ok(Box::new(source))
        }
        Target::Local(path) => Ok(Box::new(FileSource::open(path)?)),
    }
}

fn resolve(src: &str) -> Result<Target> {
    let url = match Url::parse(src) {
        Ok(url) => url,
        // No scheme at all: a plain filesystem path
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            return bare_path(src).map(Target::Local);
        }
        Err(e) => return Err(parse_error(src, e.to_string())),
    };

    match url.scheme() {
        "http" | "https" => Ok(Target::Remote(url)),
        "file" => url
            .to_file_path()
            .map(Target::Local)
            .map_err(|_| parse_error(src, "file URL does not name a local path".to_string())),
        other => Err(parse_error(
            src,
            format!("don't know how to read from scheme '{}'", other),
        )),
    }
}

/// Path component of a scheme-less source: query and fragment are cut off and
/// percent escapes decoded, the same way a `file://` URL path is read.
fn bare_path(src: &str) -> Result<std::path::PathBuf> {
    let path = src.split(|c| c == '?' || c == '#').next().unwrap_or_default();
    let decoded = urlencoding::decode(path)
        .map_err(|e| parse_error(src, format!("invalid percent-encoding: {}", e)))?;
    Ok(std::path::PathBuf::from(decoded.into_owned()))
}

fn parse_error(src: &str, message: String) -> ImageError {
    ImageError::Parse {
        input: src.to_string(),
        message,
    }
}
