//! Objects, property maps and the inherited-property cache.
//!
//! Objects are reference-counted and shared (`ObjectRef`). Closure contexts
//! are ordinary objects whose prototype is the enclosing context, so a
//! scope-chain walk is a prototype-chain walk that ends at the global object.

mod cache;
mod map;

pub use cache::{InheritedEntry, InheritedPropertyCache};
pub use map::{MapId, PropertyDescriptor, PropertyFlags, PropertyMap};

use crate::field::FieldId;
use crate::value::Value;
use parking_lot::RwLock;
use std::sync::Arc;

/// Shared handle to an object.
pub type ObjectRef = Arc<RwLock<JsObject>>;

/// Result of a property lookup along the prototype chain.
#[derive(Debug, Clone)]
pub struct PropertyLookup {
    pub value: Value,
    pub descriptor: PropertyDescriptor,
    /// Map of the object the lookup started on.
    pub receiver_map: MapId,
    /// Object actually holding the property.
    pub holder: ObjectRef,
    pub holder_map: MapId,
    /// Found on a prototype rather than on the receiver itself.
    pub inherited: bool,
}

/// An object: a map, a slot vector and an optional prototype.
#[derive(Debug)]
pub struct JsObject {
    map: Arc<PropertyMap>,
    slots: Vec<Value>,
    prototype: Option<ObjectRef>,
}

impl JsObject {
    pub fn new(prototype: Option<ObjectRef>) -> Self {
        Self {
            map: PropertyMap::empty(),
            slots: Vec::new(),
            prototype,
        }
    }

    /// Allocate a new shared object.
    pub fn new_ref(prototype: Option<ObjectRef>) -> ObjectRef {
        Arc::new(RwLock::new(Self::new(prototype)))
    }

    #[inline]
    pub fn map(&self) -> &Arc<PropertyMap> {
        &self.map
    }

    #[inline]
    pub fn map_id(&self) -> MapId {
        self.map.id()
    }

    #[inline]
    pub fn prototype(&self) -> Option<&ObjectRef> {
        self.prototype.as_ref()
    }

    pub fn set_prototype(&mut self, prototype: Option<ObjectRef>) {
        self.prototype = prototype;
    }

    #[inline]
    pub fn has_own(&self, field: FieldId) -> bool {
        self.map.get(field).is_some()
    }

    pub fn get_own(&self, field: FieldId) -> Option<Value> {
        let descriptor = self.map.get(field)?;
        self.slots.get(descriptor.slot as usize).cloned()
    }

    #[inline]
    pub fn slot(&self, slot: u32) -> Option<&Value> {
        self.slots.get(slot as usize)
    }

    /// Overwrite a slot in place. Returns `false` if the slot does not exist.
    pub fn set_slot(&mut self, slot: u32, value: Value) -> bool {
        match self.slots.get_mut(slot as usize) {
            Some(existing) => {
                *existing = value;
                true
            }
            None => false,
        }
    }

    /// Add an own property, or overwrite an existing one regardless of its
    /// attributes.
    pub fn define_own(&mut self, field: FieldId, value: Value, flags: PropertyFlags) {
        if let Some(descriptor) = self.map.get(field) {
            self.set_slot(descriptor.slot, value);
            return;
        }
        self.map = self.map.with_property(field, flags);
        self.slots.push(value);
    }

    /// Assignment semantics on an own property: writable properties are
    /// updated, read-only ones are left alone, missing ones are added.
    pub fn put_own(&mut self, field: FieldId, value: Value) {
        match self.map.get(field) {
            Some(descriptor) if descriptor.is_writable() => {
                self.set_slot(descriptor.slot, value);
            }
            Some(_) => {}
            None => self.define_own(field, value, PropertyFlags::default_data()),
        }
    }
}

/// Look `field` up on `object` and its prototypes.
pub fn lookup(object: &ObjectRef, field: FieldId) -> Option<PropertyLookup> {
    let receiver_map = object.read().map_id();
    let mut current = object.clone();
    let mut inherited = false;
    loop {
        let next = {
            let guard = current.read();
            if let Some(descriptor) = guard.map.get(field) {
                let value = guard.slots.get(descriptor.slot as usize).cloned()?;
                let holder_map = guard.map_id();
                drop(guard);
                return Some(PropertyLookup {
                    value,
                    descriptor,
                    receiver_map,
                    holder: current,
                    holder_map,
                    inherited,
                });
            }
            guard.prototype.clone()
        };
        current = next?;
        inherited = true;
    }
}

/// Find the object on the chain that owns `field`.
pub fn find_holder(object: &ObjectRef, field: FieldId) -> Option<ObjectRef> {
    lookup(object, field).map(|found| found.holder)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_define_and_get_own() {
        let object = JsObject::new_ref(None);
        object
            .write()
            .define_own(FieldId(0), Value::Int32(4), PropertyFlags::default_data());
        assert!(matches!(object.read().get_own(FieldId(0)), Some(Value::Int32(4))));
        assert!(object.read().get_own(FieldId(1)).is_none());
    }

    #[test]
    fn test_put_respects_read_only() {
        let object = JsObject::new_ref(None);
        object
            .write()
            .define_own(FieldId(0), Value::Int32(1), PropertyFlags::read_only());
        object.write().put_own(FieldId(0), Value::Int32(2));
        assert!(matches!(object.read().get_own(FieldId(0)), Some(Value::Int32(1))));
    }

    #[test]
    fn test_lookup_through_prototype() {
        let proto = JsObject::new_ref(None);
        proto
            .write()
            .define_own(FieldId(5), Value::string("inherited"), PropertyFlags::default_data());
        let child = JsObject::new_ref(Some(proto.clone()));
        let found = lookup(&child, FieldId(5)).unwrap();
        assert!(found.inherited);
        assert!(Arc::ptr_eq(&found.holder, &proto));
        assert_eq!(found.receiver_map, child.read().map_id());
        assert!(lookup(&child, FieldId(6)).is_none());
    }

    #[test]
    fn test_same_shape_objects_share_map() {
        let a = JsObject::new_ref(None);
        let b = JsObject::new_ref(None);
        a.write().put_own(FieldId(1), Value::Int32(1));
        b.write().put_own(FieldId(1), Value::Int32(2));
        assert_eq!(a.read().map_id(), b.read().map_id());
    }
}
