//! Tests for BlobStore
//!
//! These tests verify:
//! - Content addressing and idempotent publish
//! - Failed writes leave nothing behind
//! - Listing ignores staging and foreign files
//! - Tamper detection
//! - Concurrent publishers of the same content

use std::fs;
use std::io::{self, Read};
use std::sync::Arc;
use std::thread;

use layerstore::blob::BlobStore;
use layerstore::config::SyncStrategy;
use layerstore::{Digest, StoreError};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_store() -> (TempDir, BlobStore) {
    let temp_dir = TempDir::new().unwrap();
    let store = BlobStore::open(&temp_dir.path().join("blobs"), SyncStrategy::Never).unwrap();
    (temp_dir, store)
}

fn dir_entries(store: &BlobStore) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(store.dir())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().into_string().unwrap())
        .collect();
    names.sort();
    names
}

/// Yields some bytes, then fails
struct FailingReader {
    sent: bool,
}

impl Read for FailingReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.sent {
            return Err(io::Error::new(io::ErrorKind::ConnectionReset, "upload dropped"));
        }
        self.sent = true;
        let n = buf.len().min(16);
        buf[..n].fill(b'x');
        Ok(n)
    }
}

// =============================================================================
// Publish Tests
// =============================================================================

#[test]
fn test_open_creates_directory() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path().join("nested").join("blobs");

    let _store = BlobStore::open(&dir, SyncStrategy::Always).unwrap();

    assert!(dir.is_dir());
}

#[test]
fn test_put_names_blob_by_sha256() {
    let (_temp, store) = setup_temp_store();

    let digest = store.put_bytes(b"").unwrap();

    assert_eq!(
        digest.to_string(),
        "sha256-e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
    );
    assert_eq!(dir_entries(&store), vec![digest.to_string()]);
}

#[test]
fn test_put_is_idempotent() {
    let (_temp, store) = setup_temp_store();

    let first = store.put_bytes(b"hello world").unwrap();
    let second = store.put(&b"hello world"[..]).unwrap();

    assert_eq!(first, second);
    assert_eq!(store.list().unwrap(), vec![first]);
    assert_eq!(store.size(&first).unwrap(), 11);
}

#[test]
fn test_read_and_stream_back() {
    let (_temp, store) = setup_temp_store();
    let data = vec![42u8; 100_000];

    let digest = store.put_bytes(&data).unwrap();

    assert_eq!(store.read(&digest).unwrap().as_ref(), data.as_slice());

    let mut streamed = Vec::new();
    store.open_blob(&digest).unwrap().read_to_end(&mut streamed).unwrap();
    assert_eq!(streamed, data);
}

#[test]
fn test_failing_reader_leaves_nothing() {
    let (_temp, store) = setup_temp_store();

    let err = store.put(FailingReader { sent: false }).unwrap_err();

    assert!(matches!(err, StoreError::Io(_)));
    assert!(dir_entries(&store).is_empty());
    assert!(store.list().unwrap().is_empty());
}

// =============================================================================
// Lookup Tests
// =============================================================================

#[test]
fn test_missing_blob_is_not_found() {
    let (_temp, store) = setup_temp_store();
    let digest = Digest::of(b"never stored");

    assert!(!store.exists(&digest));
    assert!(matches!(store.read(&digest), Err(StoreError::BlobNotFound(d)) if d == digest));
    assert!(matches!(store.open_blob(&digest), Err(StoreError::BlobNotFound(_))));
    assert!(matches!(store.size(&digest), Err(StoreError::BlobNotFound(_))));
}

#[test]
fn test_list_skips_foreign_files() {
    let (_temp, store) = setup_temp_store();
    let digest = store.put_bytes(b"real").unwrap();

    fs::write(store.dir().join(".partial-abc123"), b"half").unwrap();
    fs::write(store.dir().join("README"), b"not a blob").unwrap();
    let upper = format!("sha256-{}", Digest::of(b"x").hex().to_uppercase());
    fs::write(store.dir().join(upper), b"x").unwrap();
    fs::create_dir(store.dir().join(Digest::of(b"dir").to_string())).unwrap();

    assert_eq!(store.list().unwrap(), vec![digest]);
}

#[test]
fn test_verify_detects_tampering() {
    let (_temp, store) = setup_temp_store();
    let digest = store.put_bytes(b"original").unwrap();
    store.verify(&digest).unwrap();

    fs::write(store.path(&digest), b"tampered").unwrap();

    let err = store.verify(&digest).unwrap_err();
    assert!(matches!(err, StoreError::Corruption(_)));
}

// =============================================================================
// Removal Tests
// =============================================================================

#[test]
fn test_delete_is_idempotent() {
    let (_temp, store) = setup_temp_store();
    let digest = store.put_bytes(b"short lived").unwrap();

    assert!(store.delete(&digest).unwrap());
    assert!(!store.delete(&digest).unwrap());
    assert!(!store.exists(&digest));
}

#[test]
fn test_remove_partials_only_touches_staging_files() {
    let (_temp, store) = setup_temp_store();
    let digest = store.put_bytes(b"keep me").unwrap();
    fs::write(store.dir().join(".partial-one"), b"1").unwrap();
    fs::write(store.dir().join(".partial-two"), b"2").unwrap();
    fs::write(store.dir().join("notes.txt"), b"3").unwrap();

    assert_eq!(store.remove_partials().unwrap(), 2);
    assert_eq!(dir_entries(&store), vec!["notes.txt".to_string(), digest.to_string()]);
}

// =============================================================================
// Pin Tests
// =============================================================================

#[test]
fn test_put_pinned_holds_pin_until_dropped() {
    let (_temp, store) = setup_temp_store();

    let pin = store.put_pinned(&b"in flight"[..]).unwrap();
    let digest = pin.digest();
    assert!(store.exists(&digest));
    assert!(store.pins().is_pinned(&digest));

    drop(pin);
    assert!(!store.pins().is_pinned(&digest));
}

#[test]
fn test_pin_missing_blob_fails_and_releases() {
    let (_temp, store) = setup_temp_store();
    let digest = Digest::of(b"absent");

    let err = store.pin(&digest).unwrap_err();

    assert!(matches!(err, StoreError::BlobNotFound(_)));
    assert!(store.pins().is_empty());
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_concurrent_identical_puts_converge() {
    let (_temp, store) = setup_temp_store();
    let store = Arc::new(store);
    let data: Arc<Vec<u8>> = Arc::new((0..64 * 1024).map(|i| (i % 251) as u8).collect());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store = Arc::clone(&store);
            let data = Arc::clone(&data);
            thread::spawn(move || store.put_bytes(&data).unwrap())
        })
        .collect();

    let digests: Vec<Digest> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert!(digests.iter().all(|d| *d == digests[0]));
    assert_eq!(dir_entries(&store), vec![digests[0].to_string()]);
    store.verify(&digests[0]).unwrap();
}
