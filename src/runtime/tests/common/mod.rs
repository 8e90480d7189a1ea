//! Shared fixtures for runtime integration tests.

#![allow(dead_code)]

use std::io::Write;

/// Length of the generated QCOW2 fixture.
pub const QCOW2_FIXTURE_LEN: usize = 196_616;

/// SHA-256 of [`qcow2_fixture`].
pub const QCOW2_FIXTURE_SHA256: &str =
    "99fdfa690de93cdc66966a9a89566487d63bc7776e98b5da7d0b8bb6fa0bea28";

/// Deterministic QCOW2-signed image.
pub fn qcow2_fixture() -> Vec<u8> {
    let mut data = b"QFI\xfb\x00\x00\x00\x03".to_vec();
    data.extend((8..QCOW2_FIXTURE_LEN).map(|i| ((i * 31 + 7) % 251) as u8));
    data
}

pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut enc = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    enc.write_all(data).unwrap();
    enc.finish().unwrap()
}

pub fn zlib(data: &[u8]) -> Vec<u8> {
    let mut enc = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
    enc.write_all(data).unwrap();
    enc.finish().unwrap()
}

pub fn bzip2(data: &[u8]) -> Vec<u8> {
    let mut enc = bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
    enc.write_all(data).unwrap();
    enc.finish().unwrap()
}

pub fn xz(data: &[u8]) -> Vec<u8> {
    let mut enc = xz2::write::XzEncoder::new(Vec::new(), 6);
    enc.write_all(data).unwrap();
    enc.finish().unwrap()
}

/// Whether the external xz decompressor is installed.
pub fn xzcat_available() -> bool {
    std::process::Command::new("xzcat")
        .arg("--version")
        .output()
        .map(|out| out.status.success())
        .unwrap_or(false)
}
