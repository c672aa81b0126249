//! Scope definitions.

use super::{NodeId, ScopeId, SymbolId};
use std::sync::atomic::{AtomicU16, Ordering};
use tierjit_runtime::FunctionId;

/// The kind of scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    /// Top-level script scope.
    Program,
    /// Function body scope.
    Function,
    /// Non-function block (loop or try body).
    Block,
    /// Private scope of a callee body spliced into a call site.
    Inlined,
}

bitflags::bitflags! {
    /// Flags describing what a scope contains.
    ///
    /// Within one compilation every flag is only ever set, never reset, with
    /// the single exception of `HAS_LOCAL_SYMBOL` on the Program scope.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ScopeFlags: u16 {
        /// A direct `eval` call appears in this scope.
        const HAS_EVAL = 1 << 0;
        /// A sub-function may escape analysis (it has eval, or an unknown sub-function).
        const HAS_UNKNOWN_SUB_FUNCTION = 1 << 1;
        /// The per-call `arguments` bundle is bound here.
        const HAS_ARGUMENTS_SYMBOL = 1 << 2;
        /// At least one symbol stayed a plain frame local.
        const HAS_LOCAL_SYMBOL = 1 << 3;
        /// At least one symbol is captured by a sub-function.
        const HAS_CLOSED_ON_SYMBOL = 1 << 4;
        /// At least one symbol refers to an ancestor function's binding.
        const HAS_PARENT_LOCAL_SYMBOL = 1 << 5;
        /// `this` is used in this scope.
        const HAS_THIS = 1 << 6;
        /// The scope contains a loop.
        const HAS_LOOP = 1 << 7;
    }
}

/// Set-only flag cell shared by concurrent resolutions.
#[derive(Debug, Default)]
pub struct AtomicScopeFlags(AtomicU16);

impl AtomicScopeFlags {
    pub fn new(flags: ScopeFlags) -> Self {
        Self(AtomicU16::new(flags.bits()))
    }

    #[inline]
    pub fn get(&self) -> ScopeFlags {
        ScopeFlags::from_bits_retain(self.0.load(Ordering::Acquire))
    }

    #[inline]
    pub fn contains(&self, flags: ScopeFlags) -> bool {
        self.get().contains(flags)
    }

    #[inline]
    pub fn insert(&self, flags: ScopeFlags) {
        self.0.fetch_or(flags.bits(), Ordering::AcqRel);
    }

    /// Program-only reset of `HAS_LOCAL_SYMBOL`.
    pub(crate) fn clear_local_symbol(&self) {
        self.0
            .fetch_and(!ScopeFlags::HAS_LOCAL_SYMBOL.bits(), Ordering::AcqRel);
    }
}

impl Clone for AtomicScopeFlags {
    fn clone(&self) -> Self {
        Self::new(self.get())
    }
}

/// A lexical scope.
#[derive(Debug, Clone)]
pub struct Scope {
    pub kind: ScopeKind,
    /// Enclosing scope, if any.
    pub parent: Option<ScopeId>,
    /// Nearest enclosing function (the function itself for its own scope).
    pub function: FunctionId,
    /// Symbols in declaration order.
    pub symbols: Vec<SymbolId>,
    /// Nested non-function scopes and sub-function scopes.
    pub inner: Vec<ScopeId>,
    /// Call and `new` expressions located directly in this scope.
    pub invocations: Vec<NodeId>,
    pub flags: AtomicScopeFlags,
}

impl Scope {
    pub fn new(kind: ScopeKind, parent: Option<ScopeId>, function: FunctionId) -> Self {
        Self {
            kind,
            parent,
            function,
            symbols: Vec::new(),
            inner: Vec::new(),
            invocations: Vec::new(),
            flags: AtomicScopeFlags::default(),
        }
    }

    #[inline]
    pub fn is_program(&self) -> bool {
        self.kind == ScopeKind::Program
    }

    /// Program and Function scopes both own a frame.
    #[inline]
    pub fn is_function(&self) -> bool {
        matches!(self.kind, ScopeKind::Program | ScopeKind::Function)
    }

    #[inline]
    pub fn has(&self, flags: ScopeFlags) -> bool {
        self.flags.contains(flags)
    }
}
