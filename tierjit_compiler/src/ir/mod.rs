//! Arena-based intermediate representation.
//!
//! Functions, scopes, symbols and nodes live in flat vectors inside a
//! [`Module`] and refer to each other through `Copy` handles. Back-references
//! (a scope's container function, a symbol's alias target, a node's parent)
//! are plain handles, so the temporary cycles created while inlining need no
//! special ownership handling.

mod builder;
mod function;
mod node;
mod scope;
mod symbol;

pub use builder::IrBuilder;
pub use function::{FunctionMeta, FunctionStatus};
pub use node::{
    ConversionKind, InlinedBody, Invocation, LabelId, Literal, LogicalOp, Node, NodeKind,
    ProfileSlot,
};
pub use scope::{AtomicScopeFlags, Scope, ScopeFlags, ScopeKind};
pub use symbol::{Symbol, SymbolKind, SymbolState};

use std::fmt;
use std::sync::Arc;
use tierjit_runtime::{FieldId, FieldTable, FunctionId};

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u32);

        impl $name {
            #[inline]
            pub const fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

handle!(
    /// Handle of a scope in a module.
    ScopeId,
    "scope#"
);
handle!(
    /// Handle of a symbol in a module.
    SymbolId,
    "sym#"
);
handle!(
    /// Handle of a node in a module.
    NodeId,
    "node#"
);

/// A compilation unit: the Program function and everything nested in it.
#[derive(Debug, Clone)]
pub struct Module {
    pub(crate) functions: Vec<FunctionMeta>,
    pub(crate) scopes: Vec<Scope>,
    pub(crate) symbols: Vec<Symbol>,
    pub(crate) nodes: Vec<Node>,
    pub(crate) next_label: u32,
    pub(crate) program: FunctionId,
}

impl Module {
    #[inline]
    pub fn program(&self) -> FunctionId {
        self.program
    }

    #[inline]
    pub fn function(&self, id: FunctionId) -> &FunctionMeta {
        &self.functions[id.index()]
    }

    #[inline]
    pub(crate) fn function_mut(&mut self, id: FunctionId) -> &mut FunctionMeta {
        &mut self.functions[id.index()]
    }

    #[inline]
    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.index()]
    }

    #[inline]
    pub(crate) fn scope_mut(&mut self, id: ScopeId) -> &mut Scope {
        &mut self.scopes[id.index()]
    }

    #[inline]
    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.index()]
    }

    #[inline]
    pub(crate) fn symbol_mut(&mut self, id: SymbolId) -> &mut Symbol {
        &mut self.symbols[id.index()]
    }

    #[inline]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    #[inline]
    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    pub fn function_count(&self) -> usize {
        self.functions.len()
    }

    pub fn function_ids(&self) -> impl Iterator<Item = FunctionId> + '_ {
        (0..self.functions.len() as u32).map(FunctionId)
    }

    pub fn symbol_count(&self) -> usize {
        self.symbols.len()
    }

    pub fn symbol_ids(&self) -> impl Iterator<Item = SymbolId> + '_ {
        (0..self.symbols.len() as u32).map(SymbolId)
    }

    /// First function with the given name.
    pub fn function_by_name(&self, name: &str) -> Option<FunctionId> {
        self.functions
            .iter()
            .find(|f| &*f.name == name)
            .map(|f| f.id)
    }

    /// Symbol declared directly in `scope` under `name`.
    pub fn lookup_in_scope(&self, scope: ScopeId, name: &str) -> Option<SymbolId> {
        self.scope(scope)
            .symbols
            .iter()
            .copied()
            .find(|s| &*self.symbol(*s).name == name)
    }

    /// Follow alias links to the binding that owns the storage.
    ///
    /// The walk is bounded by the number of symbols, so a malformed chain
    /// cannot loop forever.
    pub fn root_symbol(&self, symbol: SymbolId) -> SymbolId {
        let mut current = symbol;
        for _ in 0..self.symbols.len() {
            let state = self.symbol(current).snapshot();
            match (state.kind.is_alias(), state.resolved) {
                (true, Some(next)) if next != current => current = next,
                _ => break,
            }
        }
        current
    }

    /// Symbol owning the frame storage of `symbol`: a same-function alias
    /// shares its target's storage, anything else owns its own.
    pub fn storage_symbol(&self, symbol: SymbolId) -> SymbolId {
        let state = self.symbol(symbol).snapshot();
        match (state.kind, state.resolved) {
            (SymbolKind::OuterDuplicate, Some(target)) => target,
            _ => symbol,
        }
    }

    /// Field id of a symbol, assigned on first request.
    pub fn symbol_field(&self, symbol: SymbolId, fields: &FieldTable) -> FieldId {
        let symbol = self.symbol(symbol);
        let mut state = symbol.lock();
        *state.field.get_or_insert_with(|| fields.intern(&symbol.name))
    }

    /// Scopes belonging to `function`: its own scope plus nested block
    /// scopes (including private inlining scopes), but not sub-function
    /// scopes.
    pub fn function_scopes(&self, function: FunctionId) -> Vec<ScopeId> {
        let mut out = Vec::new();
        let mut stack = vec![self.function(function).scope];
        while let Some(scope) = stack.pop() {
            out.push(scope);
            for inner in self.scope(scope).inner.iter().rev() {
                let inner_scope = self.scope(*inner);
                if !inner_scope.is_function() && inner_scope.function == function {
                    stack.push(*inner);
                }
            }
        }
        out
    }

    /// Nearest enclosing function scope (a scope is its own if it is one).
    pub fn function_scope_of(&self, scope: ScopeId) -> ScopeId {
        let mut current = scope;
        loop {
            let s = self.scope(current);
            match s.parent {
                Some(parent) if !s.is_function() => current = parent,
                _ => return current,
            }
        }
    }

    pub(crate) fn add_scope(&mut self, scope: Scope) -> ScopeId {
        let id = ScopeId(self.scopes.len() as u32);
        if let Some(parent) = scope.parent {
            self.scopes[parent.index()].inner.push(id);
        }
        self.scopes.push(scope);
        id
    }

    pub(crate) fn add_symbol(&mut self, scope: ScopeId, name: Arc<str>, kind: SymbolKind) -> SymbolId {
        let id = SymbolId(self.symbols.len() as u32);
        let index = self.scopes[scope.index()].symbols.len() as u32;
        self.symbols.push(Symbol::new(name, scope, index, kind));
        self.scopes[scope.index()].symbols.push(id);
        id
    }

    /// Append a node and point its children back at it.
    pub(crate) fn add_node(&mut self, kind: NodeKind, scope: ScopeId) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        for child in kind.children() {
            self.nodes[child.index()].parent = Some(id);
        }
        self.nodes.push(Node {
            kind,
            parent: None,
            scope,
        });
        id
    }

    /// Replace a node's payload, re-linking children.
    pub(crate) fn replace_node(&mut self, id: NodeId, kind: NodeKind) {
        for child in kind.children() {
            self.nodes[child.index()].parent = Some(id);
        }
        self.nodes[id.index()].kind = kind;
    }

    pub(crate) fn new_label(&mut self) -> LabelId {
        let label = LabelId(self.next_label);
        self.next_label += 1;
        label
    }

    /// All nodes reachable from `root` in evaluation order, following
    /// inlined bodies but not sub-function bodies.
    pub fn walk(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            out.push(id);
            let children = self.node(id).kind.children();
            stack.extend(children.iter().rev().copied());
        }
        out
    }
}
