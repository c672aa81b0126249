//! Pre-resolution fixups that need exclusive access to the module.
//!
//! Resolution itself runs over a shared `&Module` so that sibling
//! sub-functions can be resolved concurrently. The only structural change it
//! would otherwise need, creating the `arguments` binding, is made here
//! beforehand.

use crate::ir::{Module, ScopeFlags, SymbolId, SymbolKind};
use std::sync::Arc;
use tierjit_runtime::FunctionId;
use tracing::trace;

/// Name of the implicit per-call argument bundle.
pub const ARGUMENTS: &str = "arguments";

/// Bind `arguments` in every function that mentions it or contains `eval`.
///
/// The binding lives in the function's own scope with kind `Arguments`;
/// same-named symbols in nested block scopes become `OuterDuplicate`
/// aliases of it. Running this twice changes nothing.
pub fn prepare(module: &mut Module) {
    let functions: Vec<FunctionId> = module.function_ids().collect();
    for function in functions {
        if module.function(function).parent.is_none() {
            continue;
        }
        bind_arguments(module, function);
    }
}

fn bind_arguments(module: &mut Module, function: FunctionId) {
    let scopes = module.function_scopes(function);
    let function_scope = module.function(function).scope;

    let mut mentions: Vec<SymbolId> = Vec::new();
    let mut has_eval = false;
    for &scope in &scopes {
        has_eval |= module.scope(scope).has(ScopeFlags::HAS_EVAL);
        if let Some(symbol) = module.lookup_in_scope(scope, ARGUMENTS) {
            mentions.push(symbol);
        }
    }
    if mentions.is_empty() && !has_eval {
        return;
    }

    let bundle = match module.lookup_in_scope(function_scope, ARGUMENTS) {
        Some(symbol) => symbol,
        None => module.add_symbol(function_scope, Arc::from(ARGUMENTS), SymbolKind::Arguments),
    };
    {
        let symbol = module.symbol(bundle);
        // A parameter named `arguments` shadows the bundle.
        if !symbol.is_param() {
            symbol.set_kind(SymbolKind::Arguments);
        }
    }
    module
        .scope(function_scope)
        .flags
        .insert(ScopeFlags::HAS_ARGUMENTS_SYMBOL);

    for symbol in mentions {
        if symbol == bundle {
            continue;
        }
        let sym = module.symbol(symbol);
        if matches!(sym.kind(), SymbolKind::Unknown | SymbolKind::Local) {
            sym.set_alias(SymbolKind::OuterDuplicate, bundle);
        }
    }
    trace!(function = %module.function(function).name, "bound arguments");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{IrBuilder, NodeKind};

    #[test]
    fn test_arguments_in_block_aliases_function_binding() {
        let mut b = IrBuilder::new();
        let f = b.begin_function("f", &[]);
        b.begin_block();
        let args = b.read(ARGUMENTS);
        let stmt = b.expr_stmt(args);
        let block = b.end_block(vec![stmt]);
        b.end_function(vec![block]);
        let mut module = b.finish(vec![]).unwrap();

        prepare(&mut module);
        prepare(&mut module);

        let scope = module.function(f).scope;
        let bundle = module.lookup_in_scope(scope, ARGUMENTS).unwrap();
        assert_eq!(module.symbol(bundle).kind(), SymbolKind::Arguments);
        assert!(module.scope(scope).has(ScopeFlags::HAS_ARGUMENTS_SYMBOL));

        let NodeKind::ReadIdentifier { symbol, .. } = module.node(args).kind else {
            panic!("expected identifier read");
        };
        assert_eq!(module.symbol(symbol).kind(), SymbolKind::OuterDuplicate);
        assert_eq!(module.root_symbol(symbol), bundle);
    }

    #[test]
    fn test_eval_forces_arguments_binding() {
        let mut b = IrBuilder::new();
        let f = b.begin_function("f", &[]);
        let src = b.string("x");
        let call = b.eval_call(vec![src]);
        let stmt = b.expr_stmt(call);
        b.end_function(vec![stmt]);
        let mut module = b.finish(vec![]).unwrap();

        prepare(&mut module);
        let scope = module.function(f).scope;
        assert!(module.lookup_in_scope(scope, ARGUMENTS).is_some());
    }
}
