//! Field identifiers.
//!
//! Every property name and every closed-over or global binding is addressed
//! through a `FieldId`. Interning is idempotent: the same name always maps to
//! the same id for the lifetime of the table.

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;

/// Interned property/binding name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldId(pub u32);

impl FieldId {
    /// Index into the field table.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Default)]
struct FieldTableInner {
    names: Vec<Arc<str>>,
    ids: FxHashMap<Arc<str>, FieldId>,
}

/// Thread-safe name ↔ `FieldId` interner.
#[derive(Default)]
pub struct FieldTable {
    inner: RwLock<FieldTableInner>,
}

impl FieldTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern `name`, returning its existing id if already present.
    pub fn intern(&self, name: &str) -> FieldId {
        if let Some(id) = self.inner.read().ids.get(name) {
            return *id;
        }
        let mut inner = self.inner.write();
        // Another thread may have interned it between the locks.
        if let Some(id) = inner.ids.get(name) {
            return *id;
        }
        let id = FieldId(inner.names.len() as u32);
        let name: Arc<str> = Arc::from(name);
        inner.names.push(name.clone());
        inner.ids.insert(name, id);
        id
    }

    /// Look up a name without interning it.
    pub fn lookup(&self, name: &str) -> Option<FieldId> {
        self.inner.read().ids.get(name).copied()
    }

    /// Name of an interned field.
    pub fn name(&self, id: FieldId) -> Option<Arc<str>> {
        self.inner.read().names.get(id.index()).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.read().names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_is_idempotent() {
        let table = FieldTable::new();
        let a = table.intern("x");
        let b = table.intern("y");
        assert_ne!(a, b);
        assert_eq!(table.intern("x"), a);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_lookup_does_not_intern() {
        let table = FieldTable::new();
        assert_eq!(table.lookup("missing"), None);
        assert!(table.is_empty());
        let id = table.intern("present");
        assert_eq!(table.lookup("present"), Some(id));
        assert_eq!(table.name(id).as_deref(), Some("present"));
    }
}
