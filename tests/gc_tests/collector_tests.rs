//! Tests for Collector
//!
//! These tests verify:
//! - Reachability is a set union over committed manifests
//! - Shared blobs survive until their last reference goes
//! - Pinned blobs survive sweeps
//! - An unreadable manifest stops the sweep from deleting anything
//! - Pin/sweep interplay under concurrent commits, pinned or not

use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use layerstore::blob::BlobStore;
use layerstore::config::SyncStrategy;
use layerstore::gc::Collector;
use layerstore::manifest::{Layer, Manifest, ManifestStore, MediaType};
use layerstore::{Digest, Name, StoreError};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

struct Fixture {
    _temp: TempDir,
    blobs: Arc<BlobStore>,
    manifests: Arc<ManifestStore>,
    collector: Collector,
}

fn setup() -> Fixture {
    let temp = TempDir::new().unwrap();
    let blobs = Arc::new(BlobStore::open(&temp.path().join("blobs"), SyncStrategy::Never).unwrap());
    let manifests = Arc::new(
        ManifestStore::open(&temp.path().join("manifests"), Arc::clone(&blobs), SyncStrategy::Never)
            .unwrap(),
    );
    let collector = Collector::new(Arc::clone(&blobs), Arc::clone(&manifests));
    Fixture {
        _temp: temp,
        blobs,
        manifests,
        collector,
    }
}

fn layer(blobs: &BlobStore, data: &[u8], media_type: MediaType) -> Layer {
    let digest = blobs.put_bytes(data).unwrap();
    Layer::for_blob(blobs, digest, media_type).unwrap()
}

fn name(s: &str) -> Name {
    Name::parse(s).unwrap()
}

// =============================================================================
// Reachability Tests
// =============================================================================

#[test]
fn test_reachable_is_union_without_duplicates() {
    let fx = setup();
    let config = layer(&fx.blobs, b"config", MediaType::Config);
    let shared = layer(&fx.blobs, b"shared", MediaType::Model);
    let own = layer(&fx.blobs, b"own", MediaType::Template);

    let m1 = Manifest::new(config.clone(), vec![shared.clone(), shared.clone(), config.clone()]);
    let m2 = Manifest::new(config.clone(), vec![shared.clone(), own.clone()]);
    fx.manifests.write(&name("m1"), &m1).unwrap();
    fx.manifests.write(&name("m2"), &m2).unwrap();

    let reachable = fx.collector.reachable().unwrap();

    assert_eq!(reachable.len(), 3);
    assert!(reachable.contains(&config.digest));
    assert!(reachable.contains(&shared.digest));
    assert!(reachable.contains(&own.digest));
}

#[test]
fn test_reachable_is_recomputed_each_time() {
    let fx = setup();
    let m = Manifest::new(layer(&fx.blobs, b"config", MediaType::Config), vec![]);

    assert!(fx.collector.reachable().unwrap().is_empty());
    fx.manifests.write(&name("m"), &m).unwrap();
    assert_eq!(fx.collector.reachable().unwrap().len(), 1);
    fx.manifests.delete(&name("m")).unwrap();
    assert!(fx.collector.reachable().unwrap().is_empty());
}

// =============================================================================
// Sweep Tests
// =============================================================================

#[test]
fn test_sweep_removes_only_unreferenced() {
    let fx = setup();
    let config1 = layer(&fx.blobs, b"config 1", MediaType::Config);
    let config2 = layer(&fx.blobs, b"config 2", MediaType::Config);
    let shared = layer(&fx.blobs, b"shared weights", MediaType::Model);
    let own = layer(&fx.blobs, b"template", MediaType::Template);

    fx.manifests
        .write(&name("m1"), &Manifest::new(config1.clone(), vec![shared.clone(), own.clone()]))
        .unwrap();
    fx.manifests
        .write(&name("m2"), &Manifest::new(config2.clone(), vec![shared.clone()]))
        .unwrap();

    fx.manifests.delete(&name("m1")).unwrap();
    let report = fx.collector.sweep();

    assert!(report.is_clean());
    assert_eq!(report.scanned, 4);
    assert_eq!(report.referenced, 2);
    let mut removed = report.removed.clone();
    removed.sort();
    let mut expected = vec![config1.digest, own.digest];
    expected.sort();
    assert_eq!(removed, expected);
    assert_eq!(report.reclaimed_bytes, config1.size + own.size);
    assert!(fx.blobs.exists(&shared.digest));
    assert!(fx.blobs.exists(&config2.digest));

    // Nothing left to do
    let again = fx.collector.sweep();
    assert!(again.removed.is_empty());
    assert_eq!(again.scanned, 2);
}

#[test]
fn test_pinned_blob_survives_until_released() {
    let fx = setup();
    let pin = fx.blobs.put_pinned(&b"uploading"[..]).unwrap();
    let digest = pin.digest();

    let report = fx.collector.sweep();
    assert_eq!(report.pinned, 1);
    assert!(report.removed.is_empty());
    assert!(fx.blobs.exists(&digest));

    drop(pin);
    let report = fx.collector.sweep();
    assert_eq!(report.removed, vec![digest]);
    assert!(!fx.blobs.exists(&digest));
}

#[test]
fn test_unreadable_manifest_aborts_sweep() {
    let fx = setup();
    let good = Manifest::new(layer(&fx.blobs, b"config", MediaType::Config), vec![]);
    fx.manifests.write(&name("good"), &good).unwrap();
    fx.manifests.write(&name("bad"), &good).unwrap();
    let orphan = fx.blobs.put_bytes(b"orphan").unwrap();

    fs::write(fx.manifests.path(&name("bad")), b"garbage").unwrap();
    let report = fx.collector.sweep();

    assert!(report.aborted.is_some());
    assert!(!report.is_clean());
    assert!(report.removed.is_empty());
    assert!(fx.blobs.exists(&orphan));

    // Repairing the document lets the next sweep proceed
    fx.manifests.delete(&name("bad")).unwrap();
    let report = fx.collector.sweep();
    assert_eq!(report.removed, vec![orphan]);
}

#[test]
fn test_sweep_on_empty_store() {
    let fx = setup();

    let report = fx.collector.sweep();

    assert!(report.is_clean());
    assert_eq!(report.scanned, 0);
    assert!(report.removed.is_empty());
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_commits_under_concurrent_sweeps_keep_their_blobs() {
    let fx = setup();
    let stop = Arc::new(AtomicBool::new(false));

    let sweeper = {
        let blobs = Arc::clone(&fx.blobs);
        let manifests = Arc::clone(&fx.manifests);
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            let collector = Collector::new(blobs, manifests);
            let mut sweeps = 0;
            while !stop.load(Ordering::Relaxed) {
                assert!(collector.sweep().is_clean());
                sweeps += 1;
            }
            sweeps
        })
    };

    let writers: Vec<_> = (0..4)
        .map(|w| {
            let blobs = Arc::clone(&fx.blobs);
            let manifests = Arc::clone(&fx.manifests);
            thread::spawn(move || {
                for i in 0..25 {
                    let config = blobs.put_pinned(format!("config {w} {i}").as_bytes()).unwrap();
                    let weights = blobs.put_pinned(format!("weights {w} {i}").as_bytes()).unwrap();
                    let manifest = Manifest::new(
                        Layer::new(MediaType::Config, config.digest(), 0),
                        vec![Layer::new(MediaType::Model, weights.digest(), 0)],
                    );
                    manifests.write(&name(&format!("w{w}:t{i}")), &manifest).unwrap();
                    // Pins are released only after the commit
                    drop((config, weights));
                }
            })
        })
        .collect();

    for writer in writers {
        writer.join().unwrap();
    }
    stop.store(true, Ordering::Relaxed);
    sweeper.join().unwrap();

    let names = fx.manifests.list(&layerstore::NamePattern::any()).unwrap();
    assert_eq!(names.len(), 100);
    for n in names {
        let manifest = fx.manifests.read(&n).unwrap();
        let missing: Vec<Digest> = manifest.digests().filter(|d| !fx.blobs.exists(d)).collect();
        assert!(missing.is_empty(), "{n} lost {missing:?}");
    }
}

#[test]
fn test_unpinned_writes_under_concurrent_sweeps_never_dangle() {
    let fx = setup();
    let stop = Arc::new(AtomicBool::new(false));

    let sweeper = {
        let blobs = Arc::clone(&fx.blobs);
        let manifests = Arc::clone(&fx.manifests);
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            let collector = Collector::new(blobs, manifests);
            while !stop.load(Ordering::Relaxed) {
                assert!(collector.sweep().is_clean());
            }
        })
    };

    let writers: Vec<_> = (0..4)
        .map(|w| {
            let blobs = Arc::clone(&fx.blobs);
            let manifests = Arc::clone(&fx.manifests);
            thread::spawn(move || {
                for i in 0..25 {
                    // A sweep may take the blobs before the write sees them;
                    // the write must then refuse rather than commit
                    loop {
                        let config = blobs.put_bytes(format!("config {w} {i}").as_bytes()).unwrap();
                        let weights = blobs.put_bytes(format!("weights {w} {i}").as_bytes()).unwrap();
                        let manifest = Manifest::new(
                            Layer::new(MediaType::Config, config, 0),
                            vec![Layer::new(MediaType::Model, weights, 0)],
                        );
                        match manifests.write(&name(&format!("u{w}:t{i}")), &manifest) {
                            Ok(_) => break,
                            Err(StoreError::BlobNotFound(_)) => continue,
                            Err(e) => panic!("unexpected error: {e}"),
                        }
                    }
                }
            })
        })
        .collect();

    for writer in writers {
        writer.join().unwrap();
    }
    stop.store(true, Ordering::Relaxed);
    sweeper.join().unwrap();

    let names = fx.manifests.list(&layerstore::NamePattern::any()).unwrap();
    assert_eq!(names.len(), 100);
    for n in names {
        let manifest = fx.manifests.read(&n).unwrap();
        let missing: Vec<Digest> = manifest.digests().filter(|d| !fx.blobs.exists(d)).collect();
        assert!(missing.is_empty(), "{n} lost {missing:?}");
    }
}
