//! Bounded cache for properties found on a prototype.
//!
//! Speculative code may only take the fast path for an inherited property
//! once the holder has a slot here; when the cache is full the generic
//! accessor is used instead.

use super::{MapId, ObjectRef};
use parking_lot::RwLock;
use std::sync::Arc;

/// A cached inherited property: receiver layout, holder identity and slot.
#[derive(Debug, Clone)]
pub struct InheritedEntry {
    pub receiver_map: MapId,
    /// The receiver's direct prototype, which must be the holder.
    pub holder: ObjectRef,
    pub holder_map: MapId,
    pub slot: u32,
}

impl InheritedEntry {
    fn same_site(&self, other: &InheritedEntry) -> bool {
        self.receiver_map == other.receiver_map
            && Arc::ptr_eq(&self.holder, &other.holder)
            && self.holder_map == other.holder_map
            && self.slot == other.slot
    }
}

/// Fixed-capacity table of inherited-property entries.
pub struct InheritedPropertyCache {
    entries: RwLock<Vec<InheritedEntry>>,
    capacity: usize,
}

impl InheritedPropertyCache {
    /// Default number of entries.
    pub const DEFAULT_CAPACITY: usize = 64;

    pub fn new(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(Vec::with_capacity(capacity)),
            capacity,
        }
    }

    /// Index of `entry`, inserting it if there is room.
    pub fn insert(&self, entry: InheritedEntry) -> Option<u32> {
        let mut entries = self.entries.write();
        if let Some(index) = entries.iter().position(|e| e.same_site(&entry)) {
            return Some(index as u32);
        }
        if entries.len() >= self.capacity {
            return None;
        }
        entries.push(entry);
        Some(entries.len() as u32 - 1)
    }

    pub fn get(&self, index: u32) -> Option<InheritedEntry> {
        self.entries.read().get(index as usize).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InheritedPropertyCache {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}
