//! Monomorphic inline caches for property and global access.
//!
//! A cache is created at compile time from a monomorphic map profile and
//! never updated afterwards. On a hit it reads or writes the property slot
//! directly; on a miss the caller takes the generic accessor, so a stale
//! cache costs speed but never correctness.
//!
//! ```text
//!   receiver map == cached map ─────────────────────────▶ own slot
//!   receiver map == entry map
//!     && prototype is entry holder
//!     && holder map == entry holder map ─────────────────▶ holder slot
//!   otherwise ───────────────────────────────────────────▶ miss
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tierjit_runtime::{
    FieldId, InheritedEntry, MapId, ObjectRef, PropertyObservation, Runtime, Value,
};

/// What a cache checks before taking the fast path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKind {
    /// Own property at `slot` of objects with map `map`.
    Own { map: MapId, slot: u32 },
    /// Property on the receiver's prototype, described by an entry of the
    /// runtime's inherited-property cache.
    Inherited { entry: u32 },
}

/// One cached property access site.
#[derive(Debug)]
pub struct InlineCache {
    pub field: FieldId,
    pub kind: CacheKind,
    hits: AtomicU32,
    misses: AtomicU32,
}

impl InlineCache {
    pub fn new(field: FieldId, kind: CacheKind) -> Self {
        Self {
            field,
            kind,
            hits: AtomicU32::new(0),
            misses: AtomicU32::new(0),
        }
    }

    /// Cache for a read site, if the observed layout is cacheable.
    ///
    /// Inherited properties need an entry in the runtime's bounded cache;
    /// when it is full the site stays generic.
    pub fn for_load(runtime: &Runtime, field: FieldId, observation: &PropertyObservation) -> Option<Self> {
        if !observation.is_data {
            return None;
        }
        let kind = match &observation.inherited {
            None => CacheKind::Own {
                map: observation.map,
                slot: observation.slot,
            },
            Some((holder, holder_map)) => {
                let entry = runtime.inherited_cache().insert(InheritedEntry {
                    receiver_map: observation.map,
                    holder: holder.clone(),
                    holder_map: *holder_map,
                    slot: observation.slot,
                })?;
                CacheKind::Inherited { entry }
            }
        };
        Some(Self::new(field, kind))
    }

    /// Cache for a write site. Only writable own data properties qualify.
    pub fn for_store(field: FieldId, observation: &PropertyObservation) -> Option<Self> {
        if !observation.is_data || !observation.is_writable || observation.inherited.is_some() {
            return None;
        }
        Some(Self::new(
            field,
            CacheKind::Own {
                map: observation.map,
                slot: observation.slot,
            },
        ))
    }

    /// Fast-path read; `None` on a miss.
    pub fn load(&self, runtime: &Runtime, receiver: &Value) -> Option<Value> {
        let value = receiver_object(receiver).and_then(|object| self.probe(runtime, &object));
        self.count(value.is_some());
        value
    }

    /// Fast-path read of a global binding.
    pub fn load_global(&self, runtime: &Runtime) -> Option<Value> {
        let value = self.probe(runtime, runtime.global());
        self.count(value.is_some());
        value
    }

    /// Fast-path write. On a miss the value is handed back.
    pub fn store(&self, receiver: &Value, value: Value) -> Result<(), Value> {
        let CacheKind::Own { map, slot } = self.kind else {
            self.count(false);
            return Err(value);
        };
        let Some(object) = receiver_object(receiver) else {
            self.count(false);
            return Err(value);
        };
        let mut object = object.write();
        if object.map_id() != map {
            drop(object);
            self.count(false);
            return Err(value);
        }
        object.set_slot(slot, value);
        self.count(true);
        Ok(())
    }

    fn probe(&self, runtime: &Runtime, object: &ObjectRef) -> Option<Value> {
        match self.kind {
            CacheKind::Own { map, slot } => {
                let object = object.read();
                if object.map_id() != map {
                    return None;
                }
                object.slot(slot).cloned()
            }
            CacheKind::Inherited { entry } => {
                let entry = runtime.inherited_cache().get(entry)?;
                let holder = {
                    let receiver = object.read();
                    if receiver.map_id() != entry.receiver_map {
                        return None;
                    }
                    // Maps do not encode the prototype, so identity is checked too.
                    let prototype = receiver.prototype()?;
                    if !Arc::ptr_eq(prototype, &entry.holder) {
                        return None;
                    }
                    prototype.clone()
                };
                let holder = holder.read();
                if holder.map_id() != entry.holder_map {
                    return None;
                }
                holder.slot(entry.slot).cloned()
            }
        }
    }

    #[inline]
    fn count(&self, hit: bool) {
        let counter = if hit { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn hits(&self) -> u32 {
        self.hits.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn misses(&self) -> u32 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Hit rate as a percentage.
    pub fn hit_rate(&self) -> f32 {
        let hits = self.hits();
        let total = hits + self.misses();
        if total == 0 {
            0.0
        } else {
            hits as f32 / total as f32 * 100.0
        }
    }
}

/// Object backing property access on `value`.
fn receiver_object(value: &Value) -> Option<ObjectRef> {
    match value {
        Value::Object(object) => Some(object.clone()),
        Value::Function(closure) => Some(closure.properties.clone()),
        _ => None,
    }
}
