//! Worklist-driven type inference.
//!
//! # Algorithm Overview
//!
//! 1. Seed symbols: parameters from the signature, the `arguments` bundle as
//!    an array, non-frame bindings as generic storage, locals that may be
//!    read uninitialised as `undefined`
//! 2. Visit every expression once, operands before users
//! 3. Process the worklist:
//!    - a symbol that changes re-enqueues its readers
//!    - an expression that changes re-enqueues its user
//! 4. Default symbols still unset to generic storage and drain once more
//!
//! # Key Properties
//!
//! - **Monotonic**: every update is a lattice join
//! - **Sparse**: nodes are revisited only when an input changed
//! - **Total**: after step 4 no symbol is left unset

use super::calculator::expression_type;
use super::init::maybe_uninitialized;
use super::{ProfileSource, Signature, TypeTable};
use crate::config::CompilerConfig;
use crate::ir::{Module, NodeId, NodeKind, ProfileSlot, SymbolId, SymbolKind};
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;
use std::collections::VecDeque;
use tierjit_runtime::{FunctionId, ValueType};
use tracing::{debug, trace};

/// Counters from the last inference run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InferStats {
    pub nodes_visited: usize,
    pub type_changes: usize,
    /// Symbols that were still unset when the worklist first drained.
    pub defaulted_symbols: usize,
}

/// Inputs of one inference run.
struct Request<'a> {
    module: &'a Module,
    function: FunctionId,
    /// Profile data, present only for speculative compilation.
    speculation: Option<&'a dyn ProfileSource>,
    config: &'a CompilerConfig,
}

/// Re-entrant type inferer. Holds only scratch space.
#[derive(Default)]
pub struct TypeInferer {
    worklist: VecDeque<NodeId>,
    queued: FxHashSet<NodeId>,
    /// Readers of every storage symbol, aliases included.
    readers: FxHashMap<SymbolId, SmallVec<[NodeId; 4]>>,
    symbols: Vec<SymbolId>,
    stats: InferStats,
}

impl std::fmt::Debug for TypeInferer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeInferer")
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl TypeInferer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> InferStats {
        self.stats
    }

    /// Infer types for `function`, which must already be resolved and, if
    /// inlining is on, inlined.
    ///
    /// Guarded casts consult `speculation` for their observed type; without
    /// it they keep their operand's type.
    pub fn infer(
        &mut self,
        module: &Module,
        function: FunctionId,
        signature: &Signature,
        speculation: Option<&dyn ProfileSource>,
        config: &CompilerConfig,
    ) -> TypeTable {
        let request = Request {
            module,
            function,
            speculation,
            config,
        };
        let mut table = TypeTable::default();
        self.reset(module, function);

        self.seed_symbols(&request, signature, &mut table);
        for symbol in maybe_uninitialized(module, function) {
            self.update_symbol(&request, &mut table, symbol, ValueType::Undefined);
        }

        let body = module.function(function).body;
        for node in module.walk(body).into_iter().rev() {
            self.visit(&request, &mut table, node);
        }
        self.drain(&request, &mut table);

        // Anything still unset gets generic storage; let that propagate once.
        for i in 0..self.symbols.len() {
            let symbol = self.symbols[i];
            if table.raw_symbol(symbol) == ValueType::Unknown {
                self.stats.defaulted_symbols += 1;
                table.set_symbol(symbol, ValueType::BoxedRef);
                self.enqueue_readers(symbol);
            }
        }
        self.drain(&request, &mut table);

        debug!(
            function = %module.function(function).name,
            visited = self.stats.nodes_visited,
            changes = self.stats.type_changes,
            defaulted = self.stats.defaulted_symbols,
            checked_guards = table.checked_guards(),
            "type inference done"
        );
        table
    }

    /// Revisit every node of a finished table and count the changes. A
    /// drained table yields zero.
    pub fn changes_on_rerun(
        &mut self,
        module: &Module,
        function: FunctionId,
        speculation: Option<&dyn ProfileSource>,
        config: &CompilerConfig,
        table: &TypeTable,
    ) -> usize {
        let request = Request {
            module,
            function,
            speculation,
            config,
        };
        let mut table = table.clone();
        self.reset(module, function);
        for node in module.walk(module.function(function).body) {
            self.enqueue(node);
        }
        self.drain(&request, &mut table);
        self.stats.type_changes
    }

    fn reset(&mut self, module: &Module, function: FunctionId) {
        self.worklist.clear();
        self.queued.clear();
        self.readers.clear();
        self.symbols.clear();
        self.stats = InferStats::default();

        for scope in module.function_scopes(function) {
            for &symbol in &module.scope(scope).symbols {
                let root = module.storage_symbol(symbol);
                self.readers
                    .entry(root)
                    .or_default()
                    .extend(module.symbol(symbol).readers.iter().copied());
                if root == symbol {
                    self.symbols.push(symbol);
                }
            }
        }
    }

    fn seed_symbols(&mut self, request: &Request<'_>, signature: &Signature, table: &mut TypeTable) {
        let module = request.module;
        for i in 0..self.symbols.len() {
            let symbol = self.symbols[i];
            let sym = module.symbol(symbol);
            let seed = match sym.kind() {
                SymbolKind::Local | SymbolKind::HiddenLocal => {
                    if let Some(index) = sym.param_index {
                        match signature.arg(index) {
                            ValueType::Unknown => ValueType::BoxedRef,
                            ty => ty,
                        }
                    } else if sym.sub_function.is_some() {
                        // Bound on entry by a hoisted declaration.
                        ValueType::Function
                    } else {
                        ValueType::Unknown
                    }
                }
                SymbolKind::Unknown | SymbolKind::ClosedOnLocal | SymbolKind::ParentLocal | SymbolKind::Global => {
                    ValueType::BoxedRef
                }
                SymbolKind::Arguments => ValueType::Array,
                // Typed through its root.
                SymbolKind::OuterDuplicate => ValueType::Unknown,
            };
            self.update_symbol(request, table, symbol, seed);
        }
    }

    fn drain(&mut self, request: &Request<'_>, table: &mut TypeTable) {
        while let Some(node) = self.worklist.pop_front() {
            self.queued.remove(&node);
            self.visit(request, table, node);
        }
    }

    fn enqueue(&mut self, node: NodeId) {
        if self.queued.insert(node) {
            self.worklist.push_back(node);
        }
    }

    fn enqueue_readers(&mut self, symbol: SymbolId) {
        if let Some(readers) = self.readers.get(&symbol) {
            for &reader in readers {
                if self.queued.insert(reader) {
                    self.worklist.push_back(reader);
                }
            }
        }
    }

    fn visit(&mut self, request: &Request<'_>, table: &mut TypeTable, node: NodeId) {
        self.stats.nodes_visited += 1;
        let module = request.module;
        let ty = match &module.node(node).kind {
            NodeKind::GuardedCast { operand, profile } => {
                match self.guard_type(request, table, node, *operand, *profile) {
                    Some(ty) => ty,
                    None => return,
                }
            }
            _ => match expression_type(module, table, node) {
                Some(ty) => ty,
                None => return,
            },
        };
        self.update_node(request, table, node, ty);

        if let NodeKind::WriteIdentifier { symbol, .. } = module.node(node).kind {
            let written = table.raw_node(node);
            self.update_symbol(request, table, module.storage_symbol(symbol), written);
        }
    }

    /// Type of a guarded cast; `None` while the operand is pending.
    fn guard_type(
        &mut self,
        request: &Request<'_>,
        table: &mut TypeTable,
        node: NodeId,
        operand: NodeId,
        profile: ProfileSlot,
    ) -> Option<ValueType> {
        let operand_type = table.raw_node(operand);
        if operand_type == ValueType::Unknown {
            return None;
        }
        if request.config.enable_guard_elimination && operand_type.is_concrete() {
            return Some(operand_type);
        }
        let hot = request.speculation.and_then(|source| {
            source
                .hot_type(request.function, profile.index)
                .or_else(|| profile.origin.and_then(|(callee, index)| source.hot_type(callee, index)))
        });
        match hot {
            Some(hot) if hot.is_concrete() => {
                table.mark_checked(node);
                Some(hot)
            }
            _ if operand_type.is_concrete() => Some(operand_type),
            _ => Some(ValueType::Boxed),
        }
    }

    fn update_node(&mut self, request: &Request<'_>, table: &mut TypeTable, node: NodeId, ty: ValueType) {
        if ty == ValueType::Unknown {
            return;
        }
        let old = table.raw_node(node);
        let new = old.join(ty);
        if new == old {
            return;
        }
        table.set_node(node, new);
        self.stats.type_changes += 1;
        if let Some(user) = request.module.node(node).parent {
            self.enqueue(user);
        }
    }

    fn update_symbol(&mut self, request: &Request<'_>, table: &mut TypeTable, symbol: SymbolId, ty: ValueType) {
        if ty == ValueType::Unknown {
            return;
        }
        let old = table.raw_symbol(symbol);
        let new = match old.join(ty) {
            // Only generic storage can hold the initial `undefined`.
            ValueType::Undefined | ValueType::Null | ValueType::Unknown => ValueType::BoxedRef,
            // The caller already supplies a boxed slot for a parameter.
            ValueType::Boxed if request.module.symbol(symbol).is_param() => ValueType::BoxedRef,
            joined => joined,
        };
        if new == old {
            return;
        }
        trace!(symbol = %request.module.symbol(symbol).name, from = %old, to = %new, "symbol type changed");
        table.set_symbol(symbol, new);
        self.stats.type_changes += 1;
        self.enqueue_readers(symbol);
    }
}
