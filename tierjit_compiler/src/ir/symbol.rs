//! Symbols and binding kinds.

use super::{NodeId, ScopeId, SymbolId};
use parking_lot::{Mutex, MutexGuard};
use std::fmt;
use std::sync::Arc;
use tierjit_runtime::FieldId;

/// Resolved role of a binding.
///
/// A kind only moves forward within a resolution pass:
///
/// ```text
/// Unknown ──▶ Local ──▶ ClosedOnLocal
///    │
///    ├──▶ ClosedOnLocal, ParentLocal, Global, OuterDuplicate
///    └──▶ Arguments, HiddenLocal
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolKind {
    /// Not yet resolved; left this way it is resolved at runtime.
    Unknown,
    /// Frame-local binding.
    Local,
    /// Local captured by a sub-function; stored in the context object.
    ClosedOnLocal,
    /// Reference to an ancestor function's captured local.
    ParentLocal,
    /// Property of the global object.
    Global,
    /// The per-call argument bundle.
    Arguments,
    /// Compiler-introduced frame local.
    HiddenLocal,
    /// Alias of a binding in an enclosing scope of the same function.
    OuterDuplicate,
}

impl SymbolKind {
    /// Kinds that only point at another binding.
    #[inline]
    pub const fn is_alias(self) -> bool {
        matches!(self, Self::ParentLocal | Self::OuterDuplicate)
    }

    /// Kinds stored in the function's own frame.
    #[inline]
    pub const fn is_frame_local(self) -> bool {
        matches!(self, Self::Local | Self::HiddenLocal)
    }
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Resolution state of a symbol.
///
/// This is the only part of a symbol that can change while sibling
/// sub-functions resolve concurrently, so it lives behind the symbol's lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolState {
    pub kind: SymbolKind,
    /// Target of an alias (`OuterDuplicate`, `ParentLocal`).
    pub resolved: Option<SymbolId>,
    /// Storage key in the object model; assigned lazily.
    pub field: Option<FieldId>,
    /// Writes performed from other functions through closures.
    pub non_local_writers: u32,
    /// Frame value slot within the container function.
    pub value_index: Option<u32>,
}

/// A named binding in exactly one scope.
#[derive(Debug)]
pub struct Symbol {
    pub name: Arc<str>,
    pub scope: ScopeId,
    /// Position within the scope's symbol list.
    pub index: u32,
    /// Formal parameter position.
    pub param_index: Option<u32>,
    /// Slot in the container function's sub-function list when the symbol
    /// is bound by a function declaration.
    pub sub_function: Option<u32>,
    pub readers: Vec<NodeId>,
    pub writers: Vec<NodeId>,
    state: Mutex<SymbolState>,
}

impl Symbol {
    pub fn new(name: Arc<str>, scope: ScopeId, index: u32, kind: SymbolKind) -> Self {
        Self {
            name,
            scope,
            index,
            param_index: None,
            sub_function: None,
            readers: Vec::new(),
            writers: Vec::new(),
            state: Mutex::new(SymbolState {
                kind,
                resolved: None,
                field: None,
                non_local_writers: 0,
                value_index: None,
            }),
        }
    }

    #[inline]
    pub fn kind(&self) -> SymbolKind {
        self.state.lock().kind
    }

    #[inline]
    pub fn resolved(&self) -> Option<SymbolId> {
        self.state.lock().resolved
    }

    #[inline]
    pub fn field(&self) -> Option<FieldId> {
        self.state.lock().field
    }

    #[inline]
    pub fn value_index(&self) -> Option<u32> {
        self.state.lock().value_index
    }

    #[inline]
    pub fn non_local_writers(&self) -> u32 {
        self.state.lock().non_local_writers
    }

    #[inline]
    pub fn is_param(&self) -> bool {
        self.param_index.is_some()
    }

    /// Copy of the current state.
    pub fn snapshot(&self) -> SymbolState {
        self.state.lock().clone()
    }

    /// Exclusive access to the resolution state.
    pub fn lock(&self) -> MutexGuard<'_, SymbolState> {
        self.state.lock()
    }

    pub(crate) fn set_kind(&self, kind: SymbolKind) {
        self.state.lock().kind = kind;
    }

    pub(crate) fn set_alias(&self, kind: SymbolKind, target: SymbolId) {
        let mut state = self.state.lock();
        state.kind = kind;
        state.resolved = Some(target);
    }
}

impl Clone for Symbol {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            scope: self.scope,
            index: self.index,
            param_index: self.param_index,
            sub_function: self.sub_function,
            readers: self.readers.clone(),
            writers: self.writers.clone(),
            state: Mutex::new(self.snapshot()),
        }
    }
}
