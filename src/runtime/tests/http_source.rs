//! Remote source behavior against a mock HTTP server.

mod common;

use a3s_image_core::{ErrorKind, HttpConfig, ImageError, ImportConfig};
use a3s_image_runtime::{Close, DiskImage, Format, HttpSource, Size};
use chrono::{TimeZone, Utc};
use common::*;
use mockito::{Matcher, Mock, ServerGuard};
use std::io::Read;
use std::time::{Duration, Instant};

const LAST_MODIFIED: &str = "Sun, 06 Nov 1994 08:49:37 GMT";

fn read_all(source: &mut HttpSource) -> (Vec<u8>, Option<ImageError>) {
    let mut out = Vec::new();
    let err = source.read_to_end(&mut out).err().map(ImageError::from);
    (out, err)
}

fn open(server: &ServerGuard, path: &str) -> HttpSource {
    HttpSource::open(format!("{}{}", server.url(), path), &HttpConfig::default()).unwrap()
}

/// Serve `body` at `path` the way a static file server would. The GET mock
/// expects a single download.
fn serve_file(server: &mut ServerGuard, path: &str, body: &[u8]) -> (Mock, Mock) {
    let length = body.len().to_string();
    let head = server
        .mock("HEAD", path)
        .with_status(200)
        .with_header("content-length", &length)
        .with_header("last-modified", LAST_MODIFIED)
        .create();
    let get = server
        .mock("GET", path)
        .with_status(200)
        .with_header("last-modified", LAST_MODIFIED)
        .with_body(body)
        .expect(1)
        .create();
    (head, get)
}

#[test]
fn test_retries_server_errors_then_succeeds() {
    let mut server = mockito::Server::new();
    let unavailable = server
        .mock("GET", "/disk.img")
        .with_status(503)
        .expect(2)
        .create();
    let ok = server
        .mock("GET", "/disk.img")
        .with_status(200)
        .with_body("payload")
        .expect(1)
        .create();
    let mut source = open(&server, "/disk.img");

    let start = Instant::now();
    let (body, err) = read_all(&mut source);
    assert!(err.is_none());
    assert_eq!(body, b"payload");
    assert!(start.elapsed() >= Duration::from_secs(4));
    unavailable.assert();
    ok.assert();
}

#[test]
fn test_server_error_then_client_error() {
    let mut server = mockito::Server::new();
    let unavailable = server
        .mock("GET", "/disk.img")
        .with_status(503)
        .expect(1)
        .create();
    let missing = server
        .mock("GET", "/disk.img")
        .with_status(404)
        .expect(1)
        .create();
    let mut source = open(&server, "/disk.img");

    let start = Instant::now();
    let (body, err) = read_all(&mut source);
    let err = err.unwrap();
    assert_eq!(err.kind(), ErrorKind::Client);
    assert_eq!(err.status(), Some(404));
    assert!(body.is_empty());
    assert!(start.elapsed() >= Duration::from_secs(2));
    unavailable.assert();
    missing.assert();
}

#[test]
fn test_server_errors_exhaust_budget() {
    let mut server = mockito::Server::new();
    let failing = server
        .mock("GET", "/disk.img")
        .with_status(500)
        .expect(3)
        .create();
    let config = HttpConfig {
        retry_wait_ms: 10,
        ..Default::default()
    };
    let url = format!("{}/disk.img", server.url());
    let mut source = HttpSource::open(url, &config).unwrap();

    let (_, err) = read_all(&mut source);
    match err.unwrap() {
        ImageError::ServerErrorExhausted {
            status, attempts, ..
        } => {
            assert_eq!(status, 500);
            assert_eq!(attempts, 3);
        }
        other => panic!("unexpected error: {}", other),
    }
    failing.assert();
}

#[test]
fn test_client_error_not_retried() {
    let mut server = mockito::Server::new();
    let missing = server
        .mock("GET", "/missing")
        .with_status(404)
        .expect(1)
        .create();
    let mut source = open(&server, "/missing");

    let start = Instant::now();
    let (_, err) = read_all(&mut source);
    assert_eq!(err.unwrap().kind(), ErrorKind::Client);
    assert!(start.elapsed() < Duration::from_secs(2));
    missing.assert();
}

#[test]
fn test_failure_is_replayed_without_refetch() {
    let mut server = mockito::Server::new();
    let missing = server
        .mock("GET", "/missing")
        .with_status(404)
        .expect(1)
        .create();
    let mut source = open(&server, "/missing");

    let mut buf = [0u8; 16];
    assert!(source.read(&mut buf).is_err());
    assert!(source.read(&mut buf).is_err());
    missing.assert();
}

#[test]
fn test_not_modified() {
    let mut server = mockito::Server::new();
    let not_modified = server
        .mock("GET", "/disk.img")
        .match_header("if-modified-since", LAST_MODIFIED)
        .with_status(304)
        .expect(1)
        .create();
    let since = Utc.with_ymd_and_hms(1994, 11, 6, 8, 49, 37).unwrap();
    let mut source = open(&server, "/disk.img").with_if_modified_since(since);

    let start = Instant::now();
    let (body, err) = read_all(&mut source);
    assert_eq!(err.unwrap().kind(), ErrorKind::NotModified);
    assert!(body.is_empty());
    assert!(start.elapsed() < Duration::from_secs(2));
    not_modified.assert();
}

#[test]
fn test_unconditional_fetch_sends_no_if_modified_since() {
    let mut server = mockito::Server::new();
    let ok = server
        .mock("GET", "/disk.img")
        .match_header("if-modified-since", Matcher::Missing)
        .with_status(200)
        .with_body("payload")
        .expect(1)
        .create();
    let mut source = open(&server, "/disk.img");

    let (body, err) = read_all(&mut source);
    assert!(err.is_none());
    assert_eq!(body, b"payload");
    ok.assert();
}

#[test]
fn test_metadata_from_head() {
    let mut server = mockito::Server::new();
    let head = server
        .mock("HEAD", "/disk.img")
        .with_status(200)
        .with_header("content-length", "10")
        .with_header("last-modified", LAST_MODIFIED)
        .expect(1)
        .create();
    let get = server.mock("GET", "/disk.img").expect(0).create();
    let source = open(&server, "/disk.img");

    let meta = source.metadata().unwrap();
    assert_eq!(meta.size, 10);
    assert_eq!(
        meta.modified,
        Utc.with_ymd_and_hms(1994, 11, 6, 8, 49, 37).unwrap()
    );
    head.assert();
    get.assert();
}

#[test]
fn test_metadata_falls_back_to_get_on_forbidden_head() {
    let mut server = mockito::Server::new();
    let head = server
        .mock("HEAD", "/disk.img")
        .with_status(403)
        .expect(1)
        .create();
    let get = server
        .mock("GET", "/disk.img")
        .with_status(200)
        .with_header("last-modified", LAST_MODIFIED)
        .with_body("abcdef")
        .expect(1)
        .create();
    let mut source = open(&server, "/disk.img");

    assert_eq!(source.size().unwrap(), 6);
    head.assert();
    get.assert();
}

#[test]
fn test_metadata_non_ok_status() {
    let mut server = mockito::Server::new();
    let head = server
        .mock("HEAD", "/disk.img")
        .with_status(404)
        .expect(2)
        .create();
    let mut source = open(&server, "/disk.img");

    assert_eq!(source.size().unwrap_err().kind(), ErrorKind::Metadata);
    assert_eq!(source.try_size(), None);
    head.assert();
}

#[test]
fn test_metadata_missing_last_modified() {
    let mut server = mockito::Server::new();
    let head = server
        .mock("HEAD", "/disk.img")
        .with_status(200)
        .with_header("content-length", "3")
        .expect(1)
        .create();
    let source = open(&server, "/disk.img");

    let err = source.metadata().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Metadata);
    assert!(err.to_string().contains("Last-Modified"));
    head.assert();
}

#[test]
fn test_connection_refused_is_transport_error() {
    // Bind and release a port so nothing is listening on it
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let url = format!("http://127.0.0.1:{}/disk.img", port);
    let mut source = HttpSource::open(url, &HttpConfig::default()).unwrap();

    let start = Instant::now();
    let (_, err) = read_all(&mut source);
    assert_eq!(err.unwrap().kind(), ErrorKind::Transport);
    // Transport failures are not retried
    assert!(start.elapsed() < Duration::from_secs(2));
}

#[test]
fn test_close_stops_stream() {
    let mut server = mockito::Server::new();
    let ok = server
        .mock("GET", "/disk.img")
        .with_status(200)
        .with_body(vec![1u8; 1 << 20])
        .expect(1)
        .create();
    let mut source = open(&server, "/disk.img");

    let mut buf = [0u8; 1024];
    source.read_exact(&mut buf).unwrap();
    source.close().unwrap();
    source.close().unwrap();
    assert!(source.read(&mut buf).is_err());
    assert!(source.size().is_err());
    ok.assert();
}

#[test]
fn test_http_gzip_image_matches_local() {
    let mut server = mockito::Server::new();
    let (_head, get) = serve_file(&mut server, "/disk.qcow2.gz", &gzip(&qcow2_fixture()));

    let url = format!("{}/disk.qcow2.gz", server.url());
    let mut image = DiskImage::open(&url, &ImportConfig::default()).unwrap();
    assert_eq!(image.format(), Format::Qcow2);
    assert_eq!(image.size().unwrap_err().kind(), ErrorKind::UnknownSize);
    assert_eq!(image.sha256().unwrap(), QCOW2_FIXTURE_SHA256);
    image.close().unwrap();
    get.assert();
}

#[test]
fn test_http_plain_image_size_from_metadata() {
    let mut server = mockito::Server::new();
    let (_head, get) = serve_file(&mut server, "/disk.qcow2", &qcow2_fixture());

    let url = format!("{}/disk.qcow2", server.url());
    let mut image = DiskImage::open(&url, &ImportConfig::default()).unwrap();
    assert_eq!(image.format(), Format::Qcow2);
    assert_eq!(image.size().unwrap(), QCOW2_FIXTURE_LEN as u64);
    assert_eq!(image.sha256().unwrap(), QCOW2_FIXTURE_SHA256);
    get.assert();
}

#[test]
fn test_conditional_open_not_modified() {
    let mut server = mockito::Server::new();
    let not_modified = server
        .mock("GET", "/disk.qcow2")
        .match_header("if-modified-since", "Mon, 01 Jan 2024 00:00:00 GMT")
        .with_status(304)
        .expect(1)
        .create();
    let since = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

    let url = format!("{}/disk.qcow2", server.url());
    let err = DiskImage::open_conditional(&url, &ImportConfig::default(), Some(since))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotModified);
    not_modified.assert();
}
