//! Type inference.
//!
//! Assigns every symbol and expression of a function a value representation
//! from the [`ValueType`] lattice. The result is a [`TypeTable`] consumed by
//! the code generators to choose storage and to decide which guarded casts
//! need a runtime check.
//!
//! # Stages
//!
//! ```text
//!   seed symbols ──▶ definite-init ──▶ syntax-directed pass ──▶ worklist
//!        │                                                        │
//!        └─────────── default unset symbols, drain once more ◀────┘
//! ```
//!
//! Types only rise in the lattice, which has finite height, so the worklist
//! always drains. The default-and-rerun step runs exactly once.

mod calculator;
mod inferer;
mod init;

pub use inferer::{InferStats, TypeInferer};
pub use init::maybe_uninitialized;

use crate::ir::{NodeId, SymbolId};
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;
use std::sync::Arc;
use tierjit_runtime::{FunctionId, FunctionProfile, ValueType};

// =============================================================================
// Signature
// =============================================================================

/// Declared argument types of a compilation.
///
/// An unknown signature types every parameter as generic storage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Signature {
    args: Option<SmallVec<[ValueType; 4]>>,
}

impl Signature {
    pub fn unknown() -> Self {
        Self::default()
    }

    pub fn of(args: &[ValueType]) -> Self {
        Self {
            args: Some(args.iter().copied().collect()),
        }
    }

    /// Declared type of argument `index`. Arguments the caller does not
    /// pass are `Undefined`.
    pub fn arg(&self, index: u32) -> ValueType {
        match &self.args {
            None => ValueType::Unknown,
            Some(args) => args.get(index as usize).copied().unwrap_or(ValueType::Undefined),
        }
    }

    #[inline]
    pub fn is_known(&self) -> bool {
        self.args.is_some()
    }
}

// =============================================================================
// Profile Source
// =============================================================================

/// Read access to collected guard profiles.
pub trait ProfileSource {
    /// Dominant concrete type observed at guard `index` of `function`.
    fn hot_type(&self, function: FunctionId, index: u32) -> Option<ValueType>;
}

/// No profile data at all.
impl ProfileSource for () {
    fn hot_type(&self, _: FunctionId, _: u32) -> Option<ValueType> {
        None
    }
}

impl ProfileSource for FxHashMap<FunctionId, Arc<FunctionProfile>> {
    fn hot_type(&self, function: FunctionId, index: u32) -> Option<ValueType> {
        self.get(&function)?.hot_type(index)
    }
}

impl<P: ProfileSource + ?Sized> ProfileSource for &P {
    fn hot_type(&self, function: FunctionId, index: u32) -> Option<ValueType> {
        (**self).hot_type(function, index)
    }
}

// =============================================================================
// Type Table
// =============================================================================

/// Inferred representations of one function's symbols and expressions.
///
/// Entries missing from the table read as the generic representation, so an
/// empty table is what a compilation without inference uses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeTable {
    symbols: FxHashMap<SymbolId, ValueType>,
    nodes: FxHashMap<NodeId, ValueType>,
    /// Guarded casts typed from profile data; these need a runtime check.
    checked: FxHashSet<NodeId>,
}

impl TypeTable {
    /// Table with every entry generic.
    pub fn generic() -> Self {
        Self::default()
    }

    /// Storage representation of `symbol`.
    pub fn symbol(&self, symbol: SymbolId) -> ValueType {
        match self.symbols.get(&symbol) {
            Some(ValueType::Unknown) | None => ValueType::BoxedRef,
            Some(ty) => *ty,
        }
    }

    /// Representation of the value `node` produces.
    pub fn node(&self, node: NodeId) -> ValueType {
        match self.nodes.get(&node) {
            Some(ValueType::Unknown) | None => ValueType::Boxed,
            Some(ty) => *ty,
        }
    }

    /// Type a guarded cast must check at runtime, if any.
    pub fn guard_check(&self, node: NodeId) -> Option<ValueType> {
        if !self.checked.contains(&node) {
            return None;
        }
        let ty = self.node(node);
        ty.is_concrete().then_some(ty)
    }

    pub fn checked_guards(&self) -> usize {
        self.checked.len()
    }

    pub(crate) fn raw_symbol(&self, symbol: SymbolId) -> ValueType {
        self.symbols.get(&symbol).copied().unwrap_or_default()
    }

    pub(crate) fn raw_node(&self, node: NodeId) -> ValueType {
        self.nodes.get(&node).copied().unwrap_or_default()
    }

    pub(crate) fn set_symbol(&mut self, symbol: SymbolId, ty: ValueType) {
        self.symbols.insert(symbol, ty);
    }

    pub(crate) fn set_node(&mut self, node: NodeId, ty: ValueType) {
        self.nodes.insert(node, ty);
    }

    pub(crate) fn mark_checked(&mut self, node: NodeId) {
        self.checked.insert(node);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_defaults() {
        let unknown = Signature::unknown();
        assert_eq!(unknown.arg(0), ValueType::Unknown);
        let sig = Signature::of(&[ValueType::Int32]);
        assert_eq!(sig.arg(0), ValueType::Int32);
        assert_eq!(sig.arg(1), ValueType::Undefined);
    }

    #[test]
    fn test_generic_table_reads_boxed() {
        let table = TypeTable::generic();
        assert_eq!(table.symbol(SymbolId(3)), ValueType::BoxedRef);
        assert_eq!(table.node(NodeId(7)), ValueType::Boxed);
        assert_eq!(table.guard_check(NodeId(7)), None);
    }
}
