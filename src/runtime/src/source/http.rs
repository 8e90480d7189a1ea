//! Remote HTTP(S) source.
//!
//! Treats a full request/response cycle as a reader. The data fetch happens on
//! the first read and is committed exactly once; the length is discovered by a
//! separate metadata request.
//!
//! ```text
//!  Idle ──read──► Fetching ──200──► Streaming
//!                    │  ▲
//!                    │  └─5xx, wait, retry
//!                    ├──304────────► Failed(NotModified)
//!                    ├──4xx────────► Failed(Client)
//!                    ├──5xx × N────► Failed(ServerErrorExhausted)
//!                    └──network────► Failed(Transport)
//! ```

use a3s_image_core::config::HttpConfig;
use a3s_image_core::error::{ImageError, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, CONTENT_LENGTH, IF_MODIFIED_SINCE, LAST_MODIFIED};
use reqwest::StatusCode;
use std::io::Read;

use super::{Close, Size};

/// Metadata reported by the remote for a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteMetadata {
    /// `Content-Length` of the resource
    pub size: u64,
    /// `Last-Modified` of the resource
    pub modified: DateTime<Utc>,
}

enum FetchState {
    Idle,
    Streaming(Response),
    Failed(ImageError),
    Closed,
}

/// A disk image served over HTTP(S).
pub struct HttpSource {
    url: String,
    client: Client,
    config: HttpConfig,
    if_modified_since: Option<DateTime<Utc>>,
    state: FetchState,
}

impl HttpSource {
    /// Prepare a source for `url`. No request is issued until the first read
    /// or metadata request.
    pub fn open(url: impl Into<String>, config: &HttpConfig) -> Result<Self> {
        let url = url.into();
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .connect_timeout(config.connect_timeout())
            .timeout(None::<std::time::Duration>)
            .build()
            .map_err(|e| ImageError::Transport {
                url: url.clone(),
                message: error_chain(&e),
            })?;

        Ok(Self {
            url,
            client,
            config: config.clone(),
            if_modified_since: None,
            state: FetchState::Idle,
        })
    }

    /// Only download the data if it was modified server-side after `since`.
    ///
    /// If it was not, reading fails with `ImageError::NotModified` and yields
    /// no bytes.
    pub fn set_if_modified_since(&mut self, since: DateTime<Utc>) {
        self.if_modified_since = Some(since);
    }

    /// Builder form of [`HttpSource::set_if_modified_since`].
    pub fn with_if_modified_since(mut self, since: DateTime<Utc>) -> Self {
        self.set_if_modified_since(since);
        self
    }

    /// The resource URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Query the resource with HEAD, falling back to a body-less GET when
    /// the server forbids HEAD.
    pub fn metadata(&self) -> Result<RemoteMetadata> {
        let headers = self.fetch_headers()?;

        let length = header_str(&headers, CONTENT_LENGTH.as_str());
        let size = length.parse::<u64>().map_err(|e| ImageError::Metadata {
            url: self.url.clone(),
            message: format!("invalid Content-Length '{}': {}", length, e),
        })?;

        let last_modified = header_str(&headers, LAST_MODIFIED.as_str());
        let modified = parse_http_date(last_modified).ok_or_else(|| ImageError::Metadata {
            url: self.url.clone(),
            message: format!("invalid Last-Modified '{}'", last_modified),
        })?;

        Ok(RemoteMetadata { size, modified })
    }

    fn fetch_headers(&self) -> Result<HeaderMap> {
        let mut response = self
            .client
            .head(&self.url)
            .send()
            .map_err(|e| self.transport_error(&e))?;

        if response.status() == StatusCode::FORBIDDEN {
            tracing::debug!(url = %self.url, "HEAD forbidden, retrying metadata with GET");
            response = self
                .client
                .get(&self.url)
                .send()
                .map_err(|e| self.transport_error(&e))?;
        }

        let status = response.status();
        let headers = response.headers().clone();
        // Only the headers are wanted; dropping the response closes the body.
        drop(response);

        if status != StatusCode::OK {
            return Err(ImageError::Metadata {
                url: self.url.clone(),
                message: format!("remote answered {}", status),
            });
        }
        Ok(headers)
    }

    /// Make sure the data response is committed, fetching it on first use.
    fn fetch(&mut self) -> Result<()> {
        match &self.state {
            FetchState::Idle => {}
            FetchState::Streaming(_) => return Ok(()),
            FetchState::Failed(err) => return Err(err.clone()),
            FetchState::Closed => return Err(self.closed_error()),
        }

        match self.request_with_retry() {
            Ok(response) => {
                self.state = FetchState::Streaming(response);
                Ok(())
            }
            Err(err) => {
                self.state = FetchState::Failed(err.clone());
                Err(err)
            }
        }
    }

    fn request_with_retry(&self) -> Result<Response> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let mut request = self.client.get(&self.url);
            if let Some(since) = &self.if_modified_since {
                request = request.header(IF_MODIFIED_SINCE, format_http_date(since));
            }

            let response = request.send().map_err(|e| self.transport_error(&e))?;
            let status = response.status();

            tracing::debug!(
                url = %self.url,
                status = status.as_u16(),
                attempt,
                "Image download response"
            );

            if status == StatusCode::OK {
                return Ok(response);
            }
            if status == StatusCode::NOT_MODIFIED {
                return Err(ImageError::NotModified {
                    url: self.url.clone(),
                });
            }
            if !status.is_server_error() {
                return Err(ImageError::Client {
                    url: self.url.clone(),
                    status: status.as_u16(),
                });
            }

            // The problem is on the server side; wait and try again
            if attempt >= max_attempts {
                return Err(ImageError::ServerErrorExhausted {
                    url: self.url.clone(),
                    status: status.as_u16(),
                    attempts: attempt,
                });
            }

            tracing::warn!(
                url = %self.url,
                status = status.as_u16(),
                attempt,
                wait_ms = self.config.retry_wait_ms,
                "Server error, retrying download"
            );
            drop(response);
            std::thread::sleep(self.config.retry_wait());
            attempt += 1;
        }
    }

    fn transport_error(&self, err: &reqwest::Error) -> ImageError {
        ImageError::Transport {
            url: self.url.clone(),
            message: error_chain(err),
        }
    }

    fn closed_error(&self) -> ImageError {
        ImageError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("{} is closed", self.url),
        ))
    }
}

impl Read for HttpSource {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.fetch()?;
        if let FetchState::Streaming(response) = &mut self.state {
            let url = &self.url;
            return response.read(buf).map_err(|e| body_error(url, e));
        }
        Err(self.closed_error().into())
    }
}

impl Size for HttpSource {
    fn size(&mut self) -> Result<u64> {
        if let FetchState::Closed = self.state {
            return Err(self.closed_error());
        }
        self.metadata().map(|meta| meta.size)
    }
}

impl Close for HttpSource {
    fn close(&mut self) -> Result<()> {
        if let FetchState::Streaming(_) = self.state {
            tracing::debug!(url = %self.url, "Closing image download");
        }
        self.state = FetchState::Closed;
        Ok(())
    }
}

impl std::fmt::Display for HttpSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.url)
    }
}

impl std::fmt::Debug for HttpSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self.state {
            FetchState::Idle => "idle",
            FetchState::Streaming(_) => "streaming",
            FetchState::Failed(_) => "failed",
            FetchState::Closed => "closed",
        };
        f.debug_struct("HttpSource")
            .field("url", &self.url)
            .field("if_modified_since", &self.if_modified_since)
            .field("state", &state)
            .finish()
    }
}

/// A failed body read is a network failure of the download.
fn body_error(url: &str, err: std::io::Error) -> std::io::Error {
    if err.kind() == std::io::ErrorKind::Interrupted {
        return err;
    }
    ImageError::Transport {
        url: url.to_string(),
        message: error_chain(&err),
    }
    .into()
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
}

/// Render an error and its causes on one line.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut cause = err.source();
    while let Some(inner) = cause {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        cause = inner.source();
    }
    message
}

/// Format a timestamp as an HTTP date (IMF-fixdate).
pub(crate) fn format_http_date(time: &DateTime<Utc>) -> String {
    time.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Parse any of the three date forms HTTP/1.1 allows.
pub(crate) fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    const LEGACY_FORMATS: [&str; 2] = [
        // RFC 850
        "%A, %d-%b-%y %H:%M:%S GMT",
        // asctime
        "%a %b %e %H:%M:%S %Y",
    ];

    let value = value.trim();
    if let Ok(time) = DateTime::parse_from_rfc2822(value) {
        return Some(time.with_timezone(&Utc));
    }
    LEGACY_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| naive.and_utc())
}
