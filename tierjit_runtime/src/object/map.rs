//! Property maps (hidden classes).
//!
//! Objects built by the same sequence of property additions share a
//! `PropertyMap`. Each map has a process-unique `MapId` that inline caches
//! key on; adding a property follows (or creates) a transition edge.
//!
//! ```text
//!     root(#0)
//!       | +x
//!     #1 {x:0}
//!       | +y
//!     #2 {x:0, y:1}
//! ```

use crate::field::FieldId;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::{Arc, LazyLock};
use std::sync::atomic::{AtomicU32, Ordering};

// =============================================================================
// Property Attributes
// =============================================================================

bitflags::bitflags! {
    /// Property descriptor attributes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PropertyFlags: u8 {
        /// Property value can be changed.
        const WRITABLE = 1 << 0;
        /// Property appears in enumeration.
        const ENUMERABLE = 1 << 1;
        /// Property can be deleted or have attributes changed.
        const CONFIGURABLE = 1 << 2;
        /// Property holds a plain value in its slot.
        const DATA = 1 << 3;
    }
}

impl PropertyFlags {
    /// Attributes of an ordinary assignment-created property.
    pub const fn default_data() -> Self {
        Self::WRITABLE
            .union(Self::ENUMERABLE)
            .union(Self::CONFIGURABLE)
            .union(Self::DATA)
    }

    /// Attributes of a declared global binding.
    pub const fn declared_global() -> Self {
        Self::WRITABLE.union(Self::ENUMERABLE).union(Self::DATA)
    }

    /// Attributes of a read-only builtin such as `NaN`.
    pub const fn read_only() -> Self {
        Self::DATA
    }
}

/// Location and attributes of one property within a map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyDescriptor {
    /// Slot index in the owning object's storage.
    pub slot: u32,
    pub flags: PropertyFlags,
}

impl PropertyDescriptor {
    #[inline]
    pub fn is_data(&self) -> bool {
        self.flags.contains(PropertyFlags::DATA)
    }

    #[inline]
    pub fn is_writable(&self) -> bool {
        self.flags.contains(PropertyFlags::WRITABLE)
    }
}

// =============================================================================
// Map Identity
// =============================================================================

/// Unique identity of a property map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MapId(pub u32);

impl fmt::Display for MapId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "map#{}", self.0)
    }
}

static NEXT_MAP_ID: AtomicU32 = AtomicU32::new(0);

static EMPTY_MAP: LazyLock<Arc<PropertyMap>> = LazyLock::new(PropertyMap::root);

fn next_map_id() -> MapId {
    MapId(NEXT_MAP_ID.fetch_add(1, Ordering::Relaxed))
}

// =============================================================================
// Property Map
// =============================================================================

/// Shared layout description for objects.
pub struct PropertyMap {
    id: MapId,
    properties: FxHashMap<FieldId, PropertyDescriptor>,
    order: Vec<FieldId>,
    transitions: Mutex<FxHashMap<(FieldId, PropertyFlags), Arc<PropertyMap>>>,
}

impl PropertyMap {
    /// A fresh root map with no properties.
    pub fn root() -> Arc<Self> {
        Arc::new(Self {
            id: next_map_id(),
            properties: FxHashMap::default(),
            order: Vec::new(),
            transitions: Mutex::new(FxHashMap::default()),
        })
    }

    /// The shared empty map every new object starts from.
    pub fn empty() -> Arc<Self> {
        EMPTY_MAP.clone()
    }

    #[inline]
    pub fn id(&self) -> MapId {
        self.id
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    #[inline]
    pub fn get(&self, field: FieldId) -> Option<PropertyDescriptor> {
        self.properties.get(&field).copied()
    }

    /// Fields in insertion order.
    pub fn fields(&self) -> &[FieldId] {
        &self.order
    }

    /// Map reached by adding `field` with `flags`. Cached per edge, so two
    /// objects growing the same way end up sharing one map.
    pub fn with_property(self: &Arc<Self>, field: FieldId, flags: PropertyFlags) -> Arc<Self> {
        let mut transitions = self.transitions.lock();
        if let Some(next) = transitions.get(&(field, flags)) {
            return next.clone();
        }
        let mut properties = self.properties.clone();
        properties.insert(
            field,
            PropertyDescriptor {
                slot: self.order.len() as u32,
                flags,
            },
        );
        let mut order = self.order.clone();
        order.push(field);
        let next = Arc::new(Self {
            id: next_map_id(),
            properties,
            order,
            transitions: Mutex::new(FxHashMap::default()),
        });
        transitions.insert((field, flags), next.clone());
        next
    }
}

impl fmt::Debug for PropertyMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyMap")
            .field("id", &self.id)
            .field("fields", &self.order)
            .finish()
    }
}
