//! Garbage Collector
//!
//! Reclaims blobs that no committed manifest references.
//!
//! ## Algorithm
//! 1. R = union of `Manifest::digests()` over every committed manifest,
//!    recomputed from disk on every sweep
//! 2. Every stored digest not in R and not pinned is deleted
//!
//! Reachability is set membership, never a per-manifest decrement, so a
//! digest listed twice by one manifest, or used as both config and content,
//! counts exactly once.
//!
//! A sweep is best-effort: a failed removal is logged and reported, and the
//! blob stays behind as an orphan for the next sweep. If any manifest cannot
//! be decoded the sweep deletes nothing at all, since R would be incomplete.

use std::collections::HashSet;
use std::sync::Arc;

use crate::blob::BlobStore;
use crate::digest::Digest;
use crate::error::{Result, StoreError};
use crate::manifest::ManifestStore;
use crate::name::NamePattern;

/// Outcome of one sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Stored blobs considered
    pub scanned: usize,

    /// Distinct digests referenced by committed manifests
    pub referenced: usize,

    /// Blobs removed by this sweep
    pub removed: Vec<Digest>,

    /// Bytes freed by the removals
    pub reclaimed_bytes: u64,

    /// Unreferenced blobs kept because in-flight work pinned them
    pub pinned: usize,

    /// Removals that failed, with the error
    pub failures: Vec<(Digest, String)>,

    /// Set when the reference scan failed and nothing was removed
    pub aborted: Option<String>,
}

impl SweepReport {
    /// True if the sweep ran to completion without failed removals
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.aborted.is_none()
    }
}

/// Reference-scanning collector over one blob store and one manifest store
pub struct Collector {
    blobs: Arc<BlobStore>,
    manifests: Arc<ManifestStore>,
}

impl Collector {
    pub fn new(blobs: Arc<BlobStore>, manifests: Arc<ManifestStore>) -> Self {
        Self { blobs, manifests }
    }

    /// Union of digests referenced by every committed manifest
    pub fn reachable(&self) -> Result<HashSet<Digest>> {
        let mut reachable = HashSet::new();

        for name in self.manifests.list(&NamePattern::any())? {
            match self.manifests.read(&name) {
                Ok(manifest) => reachable.extend(manifest.digests()),
                // Deleted between listing and reading
                Err(StoreError::ManifestNotFound(_)) => continue,
                Err(e) => return Err(e),
            }
        }

        Ok(reachable)
    }

    /// Delete every stored, unpinned blob outside the reachable set
    pub fn sweep(&self) -> SweepReport {
        let pins = self.blobs.pins();
        let _sweep = pins.begin_sweep();
        let mut report = SweepReport::default();

        let reachable = match self.reachable() {
            Ok(reachable) => reachable,
            Err(e) => return abort(report, "reference scan failed", e),
        };
        report.referenced = reachable.len();

        let stored = match self.blobs.list() {
            Ok(stored) => stored,
            Err(e) => return abort(report, "blob listing failed", e),
        };
        report.scanned = stored.len();

        for digest in stored.into_iter().filter(|d| !reachable.contains(d)) {
            let size = self.blobs.size(&digest).unwrap_or(0);

            match pins.remove_unpinned(&digest, || self.blobs.delete(&digest)) {
                None => {
                    tracing::debug!(digest = %digest, "keeping pinned blob");
                    report.pinned += 1;
                }
                Some(Ok(true)) => {
                    tracing::debug!(digest = %digest, size, "removed unreferenced blob");
                    report.removed.push(digest);
                    report.reclaimed_bytes += size;
                }
                Some(Ok(false)) => {}
                Some(Err(e)) => {
                    tracing::warn!(digest = %digest, error = %e, "failed to remove unreferenced blob");
                    report.failures.push((digest, e.to_string()));
                }
            }
        }

        if !report.removed.is_empty() {
            tracing::info!(
                removed = report.removed.len(),
                bytes = report.reclaimed_bytes,
                "swept unreferenced blobs"
            );
        }
        report
    }
}

fn abort(mut report: SweepReport, what: &str, e: StoreError) -> SweepReport {
    tracing::warn!(error = %e, "{what}, sweep aborted");
    report.aborted = Some(format!("{what}: {e}"));
    report
}
