//! The runtime: field table, global object and generic accessors.
//!
//! Every tier can fall back to the accessors here. Inline caches in
//! speculative code skip them only after checking map identity.

use crate::builtins;
use crate::error::{RuntimeError, RuntimeResult};
use crate::field::{FieldId, FieldTable};
use crate::object::{self, InheritedPropertyCache, JsObject, ObjectRef, PropertyFlags, PropertyLookup};
use crate::profile::PropertyObservation;
use crate::value::Value;
use std::sync::Arc;
use tracing::trace;

/// Shared runtime state.
pub struct Runtime {
    fields: FieldTable,
    global: ObjectRef,
    inherited: InheritedPropertyCache,
    length: FieldId,
}

impl Runtime {
    /// Create a runtime with builtins installed.
    pub fn new() -> Self {
        Self::with_inherited_capacity(InheritedPropertyCache::DEFAULT_CAPACITY)
    }

    pub fn with_inherited_capacity(capacity: usize) -> Self {
        let fields = FieldTable::new();
        let length = fields.intern("length");
        let runtime = Self {
            fields,
            global: JsObject::new_ref(None),
            inherited: InheritedPropertyCache::new(capacity),
            length,
        };
        builtins::install(&runtime);
        runtime
    }

    #[inline]
    pub fn fields(&self) -> &FieldTable {
        &self.fields
    }

    #[inline]
    pub fn intern(&self, name: &str) -> FieldId {
        self.fields.intern(name)
    }

    pub fn field_name(&self, field: FieldId) -> Arc<str> {
        self.fields
            .name(field)
            .unwrap_or_else(|| Arc::from(field.to_string()))
    }

    #[inline]
    pub fn global(&self) -> &ObjectRef {
        &self.global
    }

    #[inline]
    pub fn inherited_cache(&self) -> &InheritedPropertyCache {
        &self.inherited
    }

    // =========================================================================
    // Global Namespace
    // =========================================================================

    pub fn has_global(&self, field: FieldId) -> bool {
        self.global.read().has_own(field)
    }

    /// Existence check by name; never interns.
    pub fn has_global_name(&self, name: &str) -> bool {
        self.fields
            .lookup(name)
            .is_some_and(|field| self.has_global(field))
    }

    /// Register a declared global as an own data property initialized to
    /// `undefined`. Returns `false` if it already existed.
    pub fn register_global(&self, field: FieldId) -> bool {
        let mut global = self.global.write();
        if global.has_own(field) {
            return false;
        }
        global.define_own(field, Value::Undefined, PropertyFlags::declared_global());
        trace!(field = %field, "registered global binding");
        true
    }

    pub fn define_global(&self, name: &str, value: Value, flags: PropertyFlags) {
        let field = self.intern(name);
        self.global.write().define_own(field, value, flags);
    }

    pub fn get_global(&self, field: FieldId) -> RuntimeResult<Value> {
        self.global
            .read()
            .get_own(field)
            .ok_or_else(|| RuntimeError::Reference(self.field_name(field)))
    }

    pub fn set_global(&self, field: FieldId, value: Value) {
        self.global.write().put_own(field, value);
    }

    /// Layout of a global binding, for profiling global reads.
    pub fn global_observation(&self, field: FieldId) -> Option<PropertyObservation> {
        object::lookup(&self.global, field).and_then(|found| observe(&self.global, &found))
    }

    // =========================================================================
    // Scope Chain
    // =========================================================================

    /// Read a binding by walking the context chain; the chain ends at the
    /// global object.
    pub fn load_scoped(&self, context: &ObjectRef, field: FieldId) -> RuntimeResult<Value> {
        object::lookup(context, field)
            .map(|found| found.value)
            .ok_or_else(|| RuntimeError::Reference(self.field_name(field)))
    }

    /// Write a binding on whichever context on the chain holds it, or create
    /// a global if none does.
    pub fn store_scoped(&self, context: &ObjectRef, field: FieldId, value: Value) {
        match object::find_holder(context, field) {
            Some(holder) => holder.write().put_own(field, value),
            None => self.set_global(field, value),
        }
    }

    // =========================================================================
    // Properties
    // =========================================================================

    fn receiver(&self, target: &Value, field: FieldId) -> RuntimeResult<Option<ObjectRef>> {
        match target {
            Value::Object(object) => Ok(Some(object.clone())),
            Value::Function(closure) => Ok(Some(closure.properties.clone())),
            Value::Undefined | Value::Null => Err(RuntimeError::type_error(format!(
                "cannot access property '{}' of {target}",
                self.field_name(field)
            ))),
            _ => Ok(None),
        }
    }

    pub fn get_property(&self, target: &Value, field: FieldId) -> RuntimeResult<Value> {
        self.get_property_observed(target, field).map(|(value, _)| value)
    }

    /// Generic read that also reports the layout it found.
    pub fn get_property_observed(
        &self,
        target: &Value,
        field: FieldId,
    ) -> RuntimeResult<(Value, Option<PropertyObservation>)> {
        if let Some(receiver) = self.receiver(target, field)? {
            return Ok(match object::lookup(&receiver, field) {
                Some(found) => {
                    let observation = observe(&receiver, &found);
                    (found.value, observation)
                }
                None => (Value::Undefined, None),
            });
        }
        let value = match target {
            Value::Array(items) if field == self.length => Value::Int32(items.read().len() as i32),
            Value::String(s) if field == self.length => Value::Int32(s.chars().count() as i32),
            _ => Value::Undefined,
        };
        Ok((value, None))
    }

    pub fn set_property(&self, target: &Value, field: FieldId, value: Value) -> RuntimeResult<()> {
        self.set_property_observed(target, field, value).map(|_| ())
    }

    /// Generic write that reports the pre-write layout when it updated an
    /// existing own property in place.
    pub fn set_property_observed(
        &self,
        target: &Value,
        field: FieldId,
        value: Value,
    ) -> RuntimeResult<Option<PropertyObservation>> {
        let Some(receiver) = self.receiver(target, field)? else {
            return Ok(None);
        };
        let mut object = receiver.write();
        let observation = object.map().get(field).map(|descriptor| PropertyObservation {
            map: object.map_id(),
            slot: descriptor.slot,
            is_data: descriptor.is_data(),
            is_writable: descriptor.is_writable(),
            inherited: None,
        });
        object.put_own(field, value);
        Ok(observation.filter(|o| o.is_writable))
    }

    pub fn get_index(&self, target: &Value, key: &Value) -> RuntimeResult<Value> {
        match (target, array_index(key)) {
            (Value::Array(items), Some(index)) => {
                Ok(items.read().get(index).cloned().unwrap_or_default())
            }
            (Value::String(s), Some(index)) => Ok(s
                .chars()
                .nth(index)
                .map(|c| Value::String(Arc::from(c.to_string())))
                .unwrap_or_default()),
            _ => {
                let field = self.intern(&key.to_js_string());
                self.get_property(target, field)
            }
        }
    }

    pub fn set_index(&self, target: &Value, key: &Value, value: Value) -> RuntimeResult<()> {
        match (target, array_index(key)) {
            (Value::Array(items), Some(index)) => {
                let mut items = items.write();
                if index >= items.len() {
                    items.resize(index + 1, Value::Undefined);
                }
                items[index] = value;
                Ok(())
            }
            _ => {
                let field = self.intern(&key.to_js_string());
                self.set_property(target, field, value)
            }
        }
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

/// Profile-facing view of a lookup. Inherited properties are only described
/// when they live on the receiver's direct prototype.
fn observe(receiver: &ObjectRef, found: &PropertyLookup) -> Option<PropertyObservation> {
    let inherited = if found.inherited {
        let direct = receiver.read().prototype().cloned()?;
        if !Arc::ptr_eq(&direct, &found.holder) {
            return None;
        }
        Some((found.holder.clone(), found.holder_map))
    } else {
        None
    };
    Some(PropertyObservation {
        map: found.receiver_map,
        slot: found.descriptor.slot,
        is_data: found.descriptor.is_data(),
        is_writable: found.descriptor.is_writable(),
        inherited,
    })
}

fn array_index(key: &Value) -> Option<usize> {
    let n = key.as_number()?;
    (n >= 0.0 && n.fract() == 0.0 && n < u32::MAX as f64).then_some(n as usize)
}
