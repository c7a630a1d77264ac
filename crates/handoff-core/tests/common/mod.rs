//! Common test utilities for `Handoff` integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use handoff_core::transfer::TransferConfig;

/// Create a temporary directory for test files.
///
/// The directory will be automatically cleaned up when the returned
/// `TempDir` is dropped.
pub fn create_temp_dir() -> tempfile::TempDir {
    tempfile::tempdir().expect("Failed to create temp directory")
}

/// Create a test file with the given content.
pub fn create_test_file(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("Failed to create parent directories");
    }
    std::fs::write(&path, content).expect("Failed to write test file");
    path
}

/// Generate random bytes for testing.
pub fn random_bytes(size: usize) -> Vec<u8> {
    use rand::RngCore;
    let mut bytes = vec![0u8; size];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

/// Assert that two files have identical content.
pub fn assert_files_equal(path1: &Path, path2: &Path) {
    let content1 = std::fs::read(path1).expect("Failed to read first file");
    let content2 = std::fs::read(path2).expect("Failed to read second file");
    assert_eq!(content1, content2, "File contents differ");
}

/// Ask the OS for a port that is free right now.
pub fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("0.0.0.0:0").expect("Failed to bind scratch socket");
    listener.local_addr().expect("Failed to read scratch address").port()
}

/// Transfer settings for loopback tests: bind localhost only and never hang.
pub fn test_config() -> TransferConfig {
    TransferConfig {
        bind_address: "127.0.0.1".to_string(),
        connect_timeout: Duration::from_secs(5),
        io_timeout: Some(Duration::from_secs(10)),
        ..TransferConfig::default()
    }
}

/// A fresh recorder shared between the test and the code under test.
pub fn recorder() -> Arc<handoff_core::progress::RecordingReporter> {
    Arc::new(handoff_core::progress::RecordingReporter::new())
}
