//! Scope and symbol resolution.
//!
//! Classifies every symbol of a function tree into a binding kind. Functions
//! are resolved bottom-up (sub-functions before their parent) and, within a
//! function, scopes are visited top-down in declaration order:
//!
//! ```text
//!   program ─┐            1. program scope (all top-level bindings global)
//!            ├─ f ─┐      3. f, after its sub-functions
//!            │     └─ g   2. g
//!            └─ h         2. h (siblings may run in parallel)
//! ```
//!
//! # Binding kinds
//!
//! | kind            | storage                                   |
//! |-----------------|-------------------------------------------|
//! | `Local`         | frame slot                                |
//! | `ClosedOnLocal` | context object of the declaring call       |
//! | `ParentLocal`   | ancestor's context, reached via the chain  |
//! | `Global`        | global object                             |
//! | `Unknown`       | looked up by name at runtime               |
//!
//! The only state shared between concurrently resolved siblings is an
//! ancestor symbol being promoted to `ClosedOnLocal`; that update happens
//! under the symbol's own lock, and no two symbol locks are ever held at
//! once.

mod call_target;
mod prepare;

pub use call_target::{CallTargetResolver, call_target};
pub use prepare::{ARGUMENTS, prepare};

use crate::config::CompilerConfig;
use crate::error::{CompileError, CompileResult};
use crate::ir::{Module, ScopeFlags, ScopeId, SymbolId, SymbolKind};
use crate::pool::AlgorithmPool;
use rayon::prelude::*;
use tierjit_runtime::{FunctionId, Runtime};
use tracing::{debug, trace};

/// Inputs shared by every resolution in one request.
pub struct ResolveContext<'a> {
    pub module: &'a Module,
    pub runtime: &'a Runtime,
    pub config: &'a CompilerConfig,
    pub pool: &'a AlgorithmPool<Resolver>,
}

/// Re-entrant scope resolver. Holds only scratch space.
#[derive(Debug, Default)]
pub struct Resolver {
    scopes: Vec<ScopeId>,
}

impl Resolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `function` and everything nested in it.
    ///
    /// Already analyzed functions are left untouched, so resolving twice
    /// gives the same result as resolving once.
    pub fn resolve(&mut self, cx: &ResolveContext<'_>, function: FunctionId) -> CompileResult<()> {
        let meta = cx.module.function(function);
        if meta.is_analyzed() {
            return Ok(());
        }
        let scope = cx.module.scope(meta.scope);

        if scope.is_program() {
            // Other scripts may share the global namespace.
            scope.flags.insert(ScopeFlags::HAS_UNKNOWN_SUB_FUNCTION);
            self.analyze_function(cx, function)?;
            scope.flags.clear_local_symbol();
            // Top-level bindings are registered as globals before any
            // sub-function looks for them.
            resolve_sub_functions(cx, function)?;
            meta.mark_analyzed();
        } else {
            resolve_sub_functions(cx, function)?;
            for &sub in &meta.sub_functions {
                let sub_meta = cx.module.function(sub);
                if !sub_meta.is_analyzed() {
                    return Err(CompileError::SubFunctionNotAnalyzed {
                        function,
                        sub_function: sub,
                    });
                }
                let sub_scope = cx.module.scope(sub_meta.scope);
                if sub_scope.has(ScopeFlags::HAS_EVAL)
                    || sub_scope.has(ScopeFlags::HAS_UNKNOWN_SUB_FUNCTION)
                {
                    scope.flags.insert(ScopeFlags::HAS_UNKNOWN_SUB_FUNCTION);
                }
            }
            self.analyze_function(cx, function)?;
            meta.mark_analyzed();
        }
        debug!(function = %meta.name, slots = meta.symbol_count(), "resolved");
        Ok(())
    }

    fn analyze_function(&mut self, cx: &ResolveContext<'_>, function: FunctionId) -> CompileResult<()> {
        let module = cx.module;
        let meta = module.function(function);
        let function_scope = module.scope(meta.scope);

        self.scopes.clear();
        self.scopes.extend(module.function_scopes(function));

        // Dynamic evaluation anywhere in the function taints the whole function.
        for &id in self.scopes.iter().skip(1) {
            let inner = module.scope(id);
            if inner.has(ScopeFlags::HAS_EVAL) {
                function_scope
                    .flags
                    .insert(ScopeFlags::HAS_EVAL | ScopeFlags::HAS_UNKNOWN_SUB_FUNCTION);
            }
            if inner.has(ScopeFlags::HAS_UNKNOWN_SUB_FUNCTION) {
                function_scope
                    .flags
                    .insert(ScopeFlags::HAS_UNKNOWN_SUB_FUNCTION);
            }
        }

        for i in 0..self.scopes.len() {
            let scope_id = self.scopes[i];
            let scope = module.scope(scope_id);
            let base = meta.reserve_slots(scope.symbols.len() as u32);
            for &symbol in &scope.symbols {
                {
                    let mut state = module.symbol(symbol).lock();
                    if state.value_index.is_none() {
                        state.value_index = Some(base + module.symbol(symbol).index);
                    }
                }
                self.analyze_symbol(cx, scope_id, symbol)?;
            }
        }
        Ok(())
    }

    fn analyze_symbol(&self, cx: &ResolveContext<'_>, scope_id: ScopeId, id: SymbolId) -> CompileResult<()> {
        let module = cx.module;
        let scope = module.scope(scope_id);
        let symbol = module.symbol(id);
        let is_eval_body = module.function(scope.function).is_eval_body;

        match symbol.kind() {
            SymbolKind::Local => {
                let tainted = scope.has(ScopeFlags::HAS_EVAL)
                    || scope.has(ScopeFlags::HAS_UNKNOWN_SUB_FUNCTION)
                    || is_eval_body;
                if tainted {
                    // Access sites cannot be proven contained.
                    symbol.set_kind(SymbolKind::ClosedOnLocal);
                    self.closed_on(cx, scope_id, id)
                } else {
                    scope.flags.insert(ScopeFlags::HAS_LOCAL_SYMBOL);
                    Ok(())
                }
            }
            SymbolKind::ClosedOnLocal => self.closed_on(cx, scope_id, id),
            SymbolKind::Unknown => {
                if scope.is_function() && scope.has(ScopeFlags::HAS_EVAL) {
                    // `eval` may still introduce it.
                    return Ok(());
                }
                resolve_outward(cx, scope_id, id);
                Ok(())
            }
            SymbolKind::Arguments | SymbolKind::HiddenLocal | SymbolKind::OuterDuplicate | SymbolKind::Global => {
                Ok(())
            }
            kind @ SymbolKind::ParentLocal => Err(CompileError::UnexpectedSymbolKind {
                stage: "resolve",
                symbol: id,
                name: symbol.name.clone(),
                kind,
            }),
        }
    }

    fn closed_on(&self, cx: &ResolveContext<'_>, scope_id: ScopeId, id: SymbolId) -> CompileResult<()> {
        let scope = cx.module.scope(scope_id);
        if !scope.is_function() {
            return Err(CompileError::ClosureOnBlockScope {
                symbol: id,
                name: cx.module.symbol(id).name.clone(),
            });
        }
        scope.flags.insert(ScopeFlags::HAS_CLOSED_ON_SYMBOL);
        if scope.is_program() {
            let field = cx.module.symbol_field(id, cx.runtime.fields());
            if cx.runtime.register_global(field) {
                trace!(name = %cx.module.symbol(id).name, "registered global");
            }
        }
        Ok(())
    }
}

fn resolve_sub_functions(cx: &ResolveContext<'_>, function: FunctionId) -> CompileResult<()> {
    let subs = &cx.module.function(function).sub_functions;
    if cx.config.enable_parallel_analysis && subs.len() > 1 {
        subs.par_iter()
            .try_for_each(|&sub| cx.pool.checkout().resolve(cx, sub))
    } else {
        let mut worker = cx.pool.checkout();
        subs.iter().try_for_each(|&sub| worker.resolve(cx, sub))
    }
}

/// Search enclosing scopes for a binding of an `Unknown` symbol's name.
fn resolve_outward(cx: &ResolveContext<'_>, scope_id: ScopeId, id: SymbolId) {
    let module = cx.module;
    let symbol = module.symbol(id);
    let home = module.scope(scope_id);
    let container = home.function;

    let mut runtime_only = false;
    let mut outer = home.parent;
    while let Some(outer_id) = outer {
        let outer_scope = module.scope(outer_id);
        let Some(found) = module.lookup_in_scope(outer_id, &symbol.name) else {
            if outer_scope.is_function() && outer_scope.has(ScopeFlags::HAS_EVAL) {
                runtime_only = true;
                break;
            }
            outer = outer_scope.parent;
            continue;
        };

        if outer_scope.function == container {
            let target = module.symbol(found).snapshot();
            let root = match (target.kind, target.resolved) {
                (SymbolKind::OuterDuplicate, Some(root)) => root,
                _ => found,
            };
            if module.symbol(root).kind() == SymbolKind::ParentLocal {
                let storage = module.root_symbol(root);
                module.symbol(storage).lock().non_local_writers += symbol.writers.len() as u32;
            }
            symbol.set_alias(SymbolKind::OuterDuplicate, root);
            return;
        }

        let found_kind = module.symbol(found).kind();
        match found_kind {
            SymbolKind::Local | SymbolKind::ClosedOnLocal => {
                let field = module.symbol_field(found, cx.runtime.fields());
                {
                    let mut state = module.symbol(found).lock();
                    state.kind = SymbolKind::ClosedOnLocal;
                    state.non_local_writers += symbol.writers.len() as u32;
                }
                let kind = if outer_scope.is_program() {
                    SymbolKind::Global
                } else {
                    SymbolKind::ParentLocal
                };
                let mut state = symbol.lock();
                state.kind = kind;
                state.resolved = Some(found);
                state.field = Some(field);
                drop(state);
                home.flags.insert(ScopeFlags::HAS_PARENT_LOCAL_SYMBOL);
                return;
            }
            SymbolKind::ParentLocal => {
                let root = module.root_symbol(found);
                let field = module.symbol_field(found, cx.runtime.fields());
                module.symbol(root).lock().non_local_writers += symbol.writers.len() as u32;
                let mut state = symbol.lock();
                state.kind = SymbolKind::ParentLocal;
                state.resolved = Some(root);
                state.field = Some(field);
                drop(state);
                home.flags.insert(ScopeFlags::HAS_PARENT_LOCAL_SYMBOL);
                return;
            }
            SymbolKind::Global => {
                let target = module.symbol(found).snapshot();
                let field = module.symbol_field(found, cx.runtime.fields());
                let mut state = symbol.lock();
                state.kind = SymbolKind::Global;
                if !outer_scope.is_program() {
                    state.resolved = target.resolved;
                }
                state.field = Some(field);
                return;
            }
            SymbolKind::Unknown => {
                if outer_scope.has(ScopeFlags::HAS_EVAL) {
                    runtime_only = true;
                    break;
                }
                outer = outer_scope.parent;
            }
            SymbolKind::Arguments | SymbolKind::HiddenLocal | SymbolKind::OuterDuplicate => {
                // Another function's private binding; keep looking.
                outer = outer_scope.parent;
            }
        }
    }

    if !runtime_only && cx.runtime.has_global_name(&symbol.name) {
        let field = module.symbol_field(id, cx.runtime.fields());
        let mut state = symbol.lock();
        state.kind = SymbolKind::Global;
        state.field = Some(field);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::IrBuilder;

    fn resolve_all(module: &Module, runtime: &Runtime) -> CompileResult<()> {
        let config = CompilerConfig::for_testing();
        let pool = AlgorithmPool::new(Resolver::new);
        let cx = ResolveContext {
            module,
            runtime,
            config: &config,
            pool: &pool,
        };
        pool.checkout().resolve(&cx, module.program())
    }

    #[test]
    fn test_plain_locals_stay_local() {
        let mut b = IrBuilder::new();
        let f = b.begin_function("f", &["a"]);
        let a = b.read("a");
        let decl = b.var_decl("x", Some(a));
        let x = b.read("x");
        let ret = b.ret(Some(x));
        b.end_function(vec![decl, ret]);
        let fd = b.function_decl(f);
        let mut module = b.finish(vec![fd]).unwrap();
        prepare(&mut module);
        let runtime = Runtime::new();
        resolve_all(&module, &runtime).unwrap();

        let scope = module.function(f).scope;
        for &symbol in &module.scope(scope).symbols {
            assert_eq!(module.symbol(symbol).kind(), SymbolKind::Local);
        }
        assert!(module.scope(scope).has(ScopeFlags::HAS_LOCAL_SYMBOL));
        assert!(module.function(f).is_analyzed());
    }

    #[test]
    fn test_program_symbols_become_globals() {
        let mut b = IrBuilder::new();
        let one = b.int(1);
        let decl = b.var_decl("counter", Some(one));
        let module = b.finish(vec![decl]).unwrap();
        let runtime = Runtime::new();
        resolve_all(&module, &runtime).unwrap();

        let program_scope = module.function(module.program()).scope;
        let counter = module.lookup_in_scope(program_scope, "counter").unwrap();
        assert_eq!(module.symbol(counter).kind(), SymbolKind::ClosedOnLocal);
        assert!(runtime.has_global_name("counter"));
        assert!(!module.scope(program_scope).has(ScopeFlags::HAS_LOCAL_SYMBOL));
    }

    #[test]
    fn test_builtin_name_binds_global() {
        let mut b = IrBuilder::new();
        let f = b.begin_function("f", &[]);
        let math = b.read("Math");
        let ret = b.ret(Some(math));
        b.end_function(vec![ret]);
        let module = b.finish(vec![]).unwrap();
        let runtime = Runtime::new();
        resolve_all(&module, &runtime).unwrap();

        let scope = module.function(f).scope;
        let symbol = module.lookup_in_scope(scope, "Math").unwrap();
        assert_eq!(module.symbol(symbol).kind(), SymbolKind::Global);
        assert!(module.symbol(symbol).field().is_some());
    }

    #[test]
    fn test_eval_leaves_free_names_dynamic() {
        let mut b = IrBuilder::new();
        let f = b.begin_function("f", &["p"]);
        let src = b.string("1");
        let call = b.eval_call(vec![src]);
        let stmt = b.expr_stmt(call);
        let free = b.read("Math");
        let ret = b.ret(Some(free));
        b.end_function(vec![stmt, ret]);
        let mut module = b.finish(vec![]).unwrap();
        prepare(&mut module);
        let runtime = Runtime::new();
        resolve_all(&module, &runtime).unwrap();

        let scope = module.function(f).scope;
        let free = module.lookup_in_scope(scope, "Math").unwrap();
        assert_eq!(module.symbol(free).kind(), SymbolKind::Unknown);
        let param = module.lookup_in_scope(scope, "p").unwrap();
        assert_eq!(module.symbol(param).kind(), SymbolKind::ClosedOnLocal);
    }

    #[test]
    fn test_closure_on_block_local_is_rejected() {
        let mut b = IrBuilder::new();
        let f = b.begin_function("f", &[]);
        b.begin_block();
        b.declare_lexical("hidden");
        b.begin_function("g", &[]);
        let read = b.read("hidden");
        let ret = b.ret(Some(read));
        let g = b.end_function(vec![ret]);
        let decl = b.function_decl(g);
        let block = b.end_block(vec![decl]);
        b.end_function(vec![block]);
        let module = b.finish(vec![]).unwrap();
        let runtime = Runtime::new();

        assert!(matches!(
            resolve_all(&module, &runtime),
            Err(CompileError::ClosureOnBlockScope { .. })
        ));
        // Neither the failing function nor the Program counts as resolved.
        assert!(!module.function(f).is_analyzed());
        assert!(!module.function(module.program()).is_analyzed());
    }
}
