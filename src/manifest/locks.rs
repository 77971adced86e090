//! Per-name critical sections
//!
//! Writes and deletes of the same name are serialized; different names
//! proceed in parallel. A slot lives only while someone holds or waits on it.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, RawMutex};

use crate::name::Name;

/// Lazily created mutex per name
#[derive(Default)]
pub struct NameLocks {
    slots: Mutex<HashMap<Name, Arc<Mutex<()>>>>,
}

impl NameLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until `name`'s section is free, then hold it until the guard drops
    pub fn lock(&self, name: &Name) -> NameGuard<'_> {
        let slot = Arc::clone(self.slots.lock().entry(name.clone()).or_default());
        let guard = slot.lock_arc();

        NameGuard {
            locks: self,
            name: name.clone(),
            guard: Some(guard),
        }
    }

    /// Number of live slots
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }
}

/// Held section for one name
pub struct NameGuard<'a> {
    locks: &'a NameLocks,
    name: Name,
    guard: Option<ArcMutexGuard<RawMutex, ()>>,
}

impl Drop for NameGuard<'_> {
    fn drop(&mut self) {
        // Release first; the map only keeps a slot nobody else references
        drop(self.guard.take());

        let mut slots = self.locks.slots.lock();
        if slots
            .get(&self.name)
            .is_some_and(|slot| Arc::strong_count(slot) == 1)
        {
            slots.remove(&self.name);
        }
    }
}
