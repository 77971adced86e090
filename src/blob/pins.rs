//! Blob pins
//!
//! Pins protect blobs that are published but not yet referenced by any
//! committed manifest. The collector skips pinned digests.
//!
//! ## Ordering Rules
//! - A sweep holds the `sweep` lock from its reference scan to its last
//!   deletion, and checks "unpinned" and unlinks under the `pins` lock.
//! - Pinning only takes the `pins` lock, so it never waits for a sweep.
//! - Releasing a pin takes the `sweep` lock first. A release therefore never
//!   lands between a sweep's scan and its deletions, so work that commits a
//!   manifest before releasing its pins is always seen by the next scan.
//!
//! Lock order is always `sweep` → `pins`.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::digest::Digest;

/// Refcounted set of pinned digests
#[derive(Default)]
pub struct PinSet {
    pins: Mutex<HashMap<Digest, usize>>,
    sweep: Mutex<()>,
}

impl PinSet {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Pin a digest until the returned guard is dropped
    pub fn pin(self: &Arc<Self>, digest: Digest) -> Pin {
        *self.pins.lock().entry(digest).or_insert(0) += 1;
        Pin {
            set: Arc::clone(self),
            digest,
        }
    }

    pub fn is_pinned(&self, digest: &Digest) -> bool {
        self.pins.lock().contains_key(digest)
    }

    /// Number of distinct pinned digests
    pub fn len(&self) -> usize {
        self.pins.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pins.lock().is_empty()
    }

    /// Exclusive section covering one whole sweep
    pub(crate) fn begin_sweep(&self) -> MutexGuard<'_, ()> {
        self.sweep.lock()
    }

    /// Run `remove` only if `digest` is unpinned, atomically with pinning
    pub(crate) fn remove_unpinned<T>(&self, digest: &Digest, remove: impl FnOnce() -> T) -> Option<T> {
        let pins = self.pins.lock();
        if pins.contains_key(digest) {
            return None;
        }
        let out = remove();
        drop(pins);
        Some(out)
    }

    fn release(&self, digest: &Digest) {
        let _sweep = self.sweep.lock();
        let mut pins = self.pins.lock();
        if let Some(count) = pins.get_mut(digest) {
            *count -= 1;
            if *count == 0 {
                pins.remove(digest);
            }
        }
    }
}

impl fmt::Debug for PinSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PinSet").field("pinned", &self.len()).finish()
    }
}

/// Guard keeping one digest out of collection
#[must_use = "a pin protects its blob only while it is alive"]
pub struct Pin {
    set: Arc<PinSet>,
    digest: Digest,
}

impl Pin {
    pub fn digest(&self) -> Digest {
        self.digest
    }
}

impl Drop for Pin {
    fn drop(&mut self) {
        self.set.release(&self.digest);
    }
}

impl fmt::Debug for Pin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pin({})", self.digest)
    }
}
