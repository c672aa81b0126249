//! Static call-target resolution.
//!
//! Matches call and `new` expressions to the function they must invoke,
//! using the binding kinds computed by the resolver. Rules, in order:
//!
//! 1. look through parentheses and callee coercions;
//! 2. a function literal is its own target;
//! 3. an identifier whose storage root is a function declaration in a
//!    non-Program scope, never reassigned, names that sub-function;
//! 4. an identifier whose storage root is assigned exactly once, from a
//!    function literal, names that literal.
//!
//! Bindings stored in the Program scope are never resolved: any script
//! sharing the global namespace may overwrite them.

use crate::ir::{ConversionKind, Module, NodeId, NodeKind, SymbolId, SymbolKind};
use tierjit_runtime::FunctionId;
use tracing::trace;

/// Re-entrant call-target resolver. Holds only scratch space.
#[derive(Debug, Default)]
pub struct CallTargetResolver {
    resolved: Vec<(NodeId, FunctionId)>,
}

impl CallTargetResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach static targets to every invocation owned by `function`,
    /// including invocations inside inlined bodies. Returns how many were
    /// resolved.
    pub fn resolve_function(&mut self, module: &mut Module, function: FunctionId) -> usize {
        self.resolved.clear();
        for scope in module.function_scopes(function) {
            for &node in &module.scope(scope).invocations {
                let (NodeKind::Call(inv) | NodeKind::New(inv)) = &module.node(node).kind else {
                    continue;
                };
                if inv.target.is_some() {
                    continue;
                }
                if let Some(target) = call_target(module, inv.callee) {
                    self.resolved.push((node, target));
                }
            }
        }
        for &(node, target) in &self.resolved {
            if let NodeKind::Call(inv) | NodeKind::New(inv) = &mut module.node_mut(node).kind {
                inv.target = Some(target);
            }
            trace!(%node, target = %module.function(target).name, "resolved call target");
        }
        self.resolved.len()
    }
}

/// Statically known function a callee expression evaluates to.
pub fn call_target(module: &Module, callee: NodeId) -> Option<FunctionId> {
    match &module.node(unwrap_callee(module, callee)).kind {
        NodeKind::FunctionExpr(function) => Some(*function),
        NodeKind::ReadIdentifier { symbol, .. } => symbol_target(module, *symbol),
        _ => None,
    }
}

fn unwrap_callee(module: &Module, mut node: NodeId) -> NodeId {
    loop {
        match module.node(node).kind {
            NodeKind::Paren(inner)
            | NodeKind::Convert {
                kind: ConversionKind::ToFunction,
                operand: inner,
            } => node = inner,
            _ => return node,
        }
    }
}

fn symbol_target(module: &Module, symbol: SymbolId) -> Option<FunctionId> {
    let root = module.root_symbol(symbol);
    let root_symbol = module.symbol(root);
    let state = root_symbol.snapshot();
    if !matches!(state.kind, SymbolKind::Local | SymbolKind::ClosedOnLocal | SymbolKind::HiddenLocal) {
        return None;
    }
    let scope = module.scope(root_symbol.scope);
    if scope.is_program() || state.non_local_writers > 0 {
        return None;
    }

    let writers = all_writers(module, root);
    if let Some(slot) = root_symbol.sub_function {
        if !writers.is_empty() {
            return None;
        }
        let owner = module.function(scope.function);
        return owner.sub_functions.get(slot as usize).copied();
    }

    match writers.as_slice() {
        [single] => match module.node(*single).kind {
            NodeKind::WriteIdentifier { value, .. } => match module.node(unwrap_callee(module, value)).kind {
                NodeKind::FunctionExpr(function) => Some(function),
                _ => None,
            },
            _ => None,
        },
        _ => None,
    }
}

/// Writers of `root` plus writers of the same-function aliases pointing at it.
fn all_writers(module: &Module, root: SymbolId) -> Vec<NodeId> {
    let mut writers = module.symbol(root).writers.clone();
    let function = module.scope(module.symbol(root).scope).function;
    for scope in module.function_scopes(function) {
        for &symbol in &module.scope(scope).symbols {
            if symbol == root {
                continue;
            }
            let alias = module.symbol(symbol);
            let state = alias.snapshot();
            if state.kind == SymbolKind::OuterDuplicate && state.resolved == Some(root) {
                writers.extend(alias.writers.iter().copied());
            }
        }
    }
    writers
}
