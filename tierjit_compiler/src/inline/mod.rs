//! Function inlining.
//!
//! Splices small, statically resolved callees into their call sites. A call
//! site is either fully inlined, with its own renamed private scope, or left
//! untouched.
//!
//! # Inlining Process
//!
//! 1. **Discovery**: walk the invocations of every scope the function owns
//! 2. **Decision**: check eligibility and the cost ceiling
//! 3. **Renaming**: allocate the private scope, then one renamed symbol per
//!    callee symbol in declaration order
//! 4. **Cloning**: copy the callee body, rewriting returns into jumps
//! 5. **Recursion**: revisit calls inside the new body, with the callee on
//!    the inlining stack
//!
//! The spliced body has this shape:
//!
//! ```text
//! {
//!   var p0 = arg0; var p1 = undefined;   // missing arguments
//!   arg2;                                // extra arguments, for effects
//!   { ...cloned body... } exit:
//! }
//! ```
//!
//! and the call's value is the hidden result symbol.

mod clone;
mod cost;

pub use cost::InlineCost;

use crate::config::CompilerConfig;
use crate::error::{CompileError, CompileResult};
use crate::ir::{
    InlinedBody, Invocation, Literal, Module, NodeId, NodeKind, Scope, ScopeFlags, ScopeId, ScopeKind,
    SymbolId, SymbolKind,
};
use crate::resolve::call_target;
use clone::BodyCloner;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::sync::Arc;
use tierjit_runtime::FunctionId;
use tracing::{debug, trace};

/// Re-entrant inliner. Holds only scratch space.
#[derive(Debug, Default)]
pub struct Inliner {
    /// Functions currently being inlined, outermost first.
    stack: SmallVec<[FunctionId; 8]>,
    inlined: usize,
}

impl Inliner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inline eligible call sites of `function`. Returns the number of call
    /// sites newly inlined.
    pub fn run(&mut self, module: &mut Module, function: FunctionId, config: &CompilerConfig) -> CompileResult<usize> {
        self.stack.clear();
        self.inlined = 0;
        if !config.inlining_enabled() {
            strip_inlined(module, function);
            return Ok(0);
        }
        self.stack.push(function);
        let scopes = module.function_scopes(function);
        for scope in scopes {
            // Private scopes are visited through their call sites.
            if module.scope(scope).kind == ScopeKind::Inlined {
                continue;
            }
            self.inline_scope(module, scope, function, config)?;
        }
        self.stack.pop();
        debug!(function = %module.function(function).name, inlined = self.inlined, "inlining done");
        Ok(self.inlined)
    }

    fn inline_scope(
        &mut self,
        module: &mut Module,
        scope: ScopeId,
        owner: FunctionId,
        config: &CompilerConfig,
    ) -> CompileResult<()> {
        let invocations = module.scope(scope).invocations.clone();
        for call in invocations {
            let (existing, target, callee) = match &module.node(call).kind {
                NodeKind::Call(inv) => (
                    inv.inlined.as_ref().map(|body| (body.scope, body.callee)),
                    inv.target,
                    inv.callee,
                ),
                _ => continue,
            };
            if let Some((private, inlined_callee)) = existing {
                // Reuse the existing body; only refresh its profile owner.
                if let NodeKind::Call(Invocation {
                    inlined: Some(body), ..
                }) = &mut module.node_mut(call).kind
                {
                    body.profile_owner = owner;
                }
                self.stack.push(inlined_callee);
                self.inline_scope(module, private, owner, config)?;
                self.stack.pop();
                continue;
            }
            let Some(target) = target.or_else(|| call_target(module, callee)) else {
                continue;
            };
            if let NodeKind::Call(inv) = &mut module.node_mut(call).kind {
                inv.target = Some(target);
            }
            if !self.can_inline(module, target, config) {
                continue;
            }
            let private = self.inline_call(module, call, target, owner)?;
            self.inlined += 1;
            self.stack.push(target);
            self.inline_scope(module, private, owner, config)?;
            self.stack.pop();
        }
        Ok(())
    }

    /// Eligibility and cost checks; a `false` here is a heuristic rejection,
    /// never an error.
    fn can_inline(&self, module: &Module, target: FunctionId, config: &CompilerConfig) -> bool {
        let meta = module.function(target);
        let scope = module.scope(meta.scope);
        let reject = |reason: &str| {
            trace!(callee = %meta.name, reason, "not inlined");
            false
        };
        if !meta.is_analyzed() {
            return reject("unresolved");
        }
        if !meta.sub_functions.is_empty() {
            return reject("has sub-functions");
        }
        if scope.has(ScopeFlags::HAS_CLOSED_ON_SYMBOL)
            || scope.has(ScopeFlags::HAS_THIS)
            || scope.has(ScopeFlags::HAS_EVAL)
            || scope.has(ScopeFlags::HAS_ARGUMENTS_SYMBOL)
            || meta.is_eval_body
        {
            return reject("unsupported scope");
        }
        if self.stack.contains(&target) {
            return reject("recursive");
        }
        let renamable = source_scopes(module, target).iter().all(|&s| {
            module.scope(s).symbols.iter().all(|&sym| {
                matches!(
                    module.symbol(sym).kind(),
                    SymbolKind::Local | SymbolKind::HiddenLocal | SymbolKind::OuterDuplicate | SymbolKind::Global
                )
            })
        });
        if !renamable {
            return reject("context-dependent symbols");
        }
        if !InlineCost::of(module, meta.body).is_under(config.max_inline_cost) {
            return reject("too large");
        }
        true
    }

    fn inline_call(
        &mut self,
        module: &mut Module,
        call: NodeId,
        callee: FunctionId,
        owner: FunctionId,
    ) -> CompileResult<ScopeId> {
        let call_scope = module.node(call).scope;
        let caller = module.scope(call_scope).function;
        let round = module.new_label();
        let callee_name = module.function(callee).name.clone();
        let rename = |name: &str| -> Arc<str> { Arc::from(format!("{callee_name}#{}${name}", round.0)) };

        // Scope first, then symbols, then the body.
        let private = module.add_scope(Scope::new(ScopeKind::Inlined, Some(call_scope), caller));

        let mut symbols: FxHashMap<SymbolId, SymbolId> = FxHashMap::default();
        let mut aliases = Vec::new();
        for scope in source_scopes(module, callee) {
            for sym in module.scope(scope).symbols.clone() {
                let state = module.symbol(sym).snapshot();
                let name = module.symbol(sym).name.clone();
                let renamed = match state.kind {
                    SymbolKind::Local | SymbolKind::HiddenLocal => {
                        module.add_symbol(private, rename(&name), state.kind)
                    }
                    SymbolKind::Global => {
                        let global = module.add_symbol(private, name, SymbolKind::Global);
                        let mut copy = module.symbol(global).lock();
                        copy.field = state.field;
                        copy.resolved = state.resolved;
                        drop(copy);
                        global
                    }
                    SymbolKind::OuterDuplicate => {
                        aliases.push(sym);
                        continue;
                    }
                    kind => {
                        return Err(CompileError::UnexpectedSymbolKind {
                            stage: "inline",
                            symbol: sym,
                            name,
                            kind,
                        });
                    }
                };
                symbols.insert(sym, renamed);
            }
        }
        for alias in aliases {
            let root = module.root_symbol(alias);
            if let Some(renamed) = symbols.get(&root).copied() {
                symbols.insert(alias, renamed);
            }
        }
        let result = module.add_symbol(private, rename("result"), SymbolKind::HiddenLocal);

        // Frame slots for the renamed locals come from the caller.
        let locals: Vec<SymbolId> = module
            .scope(private)
            .symbols
            .iter()
            .copied()
            .filter(|&sym| module.symbol(sym).kind().is_frame_local())
            .collect();
        let base = module.function(caller).reserve_slots(locals.len() as u32);
        for (i, sym) in locals.into_iter().enumerate() {
            module.symbol(sym).lock().value_index = Some(base + i as u32);
        }

        let (args, params, callee_body) = {
            let NodeKind::Call(inv) = &module.node(call).kind else {
                return Err(CompileError::UnsupportedNode {
                    stage: "inline",
                    node: call,
                });
            };
            let meta = module.function(callee);
            (inv.args.clone(), meta.params.clone(), meta.body)
        };

        let exit = module.new_label();
        let mut cloner = BodyCloner {
            module,
            caller: owner,
            callee,
            scope: private,
            symbols,
            labels: FxHashMap::default(),
            exit,
            result,
        };

        let mut statements = Vec::with_capacity(params.len() + 1);
        for (i, &param) in params.iter().enumerate() {
            let renamed = cloner.symbols.get(&param).copied().ok_or(CompileError::UnsupportedNode {
                stage: "inline",
                node: call,
            })?;
            let value = match args.get(i) {
                Some(&arg) => arg,
                None => cloner.module.add_node(NodeKind::Literal(Literal::Undefined), private),
            };
            let write = cloner.module.add_node(
                NodeKind::WriteIdentifier {
                    symbol: renamed,
                    value,
                },
                private,
            );
            cloner.module.symbol_mut(renamed).writers.push(write);
            statements.push(cloner.module.add_node(
                NodeKind::VarDecl {
                    symbol: renamed,
                    init: Some(write),
                },
                private,
            ));
        }
        for &extra in args.iter().skip(params.len()) {
            statements.push(cloner.module.add_node(NodeKind::ExprStmt(extra), private));
        }
        let cloned = cloner.clone_node(callee_body)?;
        let module = cloner.module;
        statements.push(module.add_node(NodeKind::Label { label: exit, body: cloned }, private));
        let body = module.add_node(NodeKind::Block(statements), private);
        module.node_mut(body).parent = Some(call);

        module.symbol_mut(result).readers.push(call);
        if let NodeKind::Call(inv) = &mut module.node_mut(call).kind {
            inv.inlined = Some(InlinedBody {
                scope: private,
                body,
                result,
                callee,
                profile_owner: owner,
            });
        }
        debug!(callee = %callee_name, %call, "inlined call");
        Ok(private)
    }
}

/// Scopes holding the callee's own symbols: its function scope and nested
/// blocks, without private scopes of calls it inlined itself.
fn source_scopes(module: &Module, function: FunctionId) -> Vec<ScopeId> {
    let mut out = Vec::new();
    let mut stack = vec![module.function(function).scope];
    while let Some(scope) = stack.pop() {
        out.push(scope);
        for &inner in module.scope(scope).inner.iter().rev() {
            let inner_scope = module.scope(inner);
            if inner_scope.kind == ScopeKind::Block && inner_scope.function == function {
                stack.push(inner);
            }
        }
    }
    out
}

/// Drop every inlined body of `function`, restoring plain calls.
fn strip_inlined(module: &mut Module, function: FunctionId) {
    for scope in module.function_scopes(function) {
        for call in module.scope(scope).invocations.clone() {
            let (NodeKind::Call(inv) | NodeKind::New(inv)) = &mut module.node_mut(call).kind else {
                continue;
            };
            let Some(inlined) = inv.inlined.take() else {
                continue;
            };
            let mut children = vec![inv.callee];
            children.extend(inv.args.iter().copied());
            for child in children {
                module.node_mut(child).parent = Some(call);
            }
            if let Some(parent) = module.scope(inlined.scope).parent {
                module.scope_mut(parent).inner.retain(|s| *s != inlined.scope);
            }
            trace!(%call, "removed inlined body");
        }
    }
}
