//! Scope resolution tests: binding classification, aliasing and idempotence.

mod common;

use common::{FnShape, build, contains_eval, fn_shape, read_of, resolve};
use proptest::prelude::*;
use tierjit_compiler::ir::{NodeKind, ScopeFlags};
use tierjit_compiler::{CompileOptions, IrBuilder, Module, SymbolId, SymbolKind};
use tierjit_runtime::{BinaryOp, FunctionId, Runtime};

fn symbol_of_read(module: &Module, read: tierjit_compiler::NodeId) -> SymbolId {
    match module.node(read).kind {
        NodeKind::ReadIdentifier { symbol, .. } => symbol,
        _ => panic!("expected identifier read"),
    }
}

fn kinds(module: &Module) -> Vec<(SymbolKind, Option<tierjit_runtime::FieldId>)> {
    module
        .symbol_ids()
        .map(|s| {
            let state = module.symbol(s).snapshot();
            (state.kind, state.field)
        })
        .collect()
}

// =============================================================================
// Closures
// =============================================================================

/// `function outer() { var v = 1; function inner() { return v + 1; } return inner; }`
fn closure_module() -> (Module, FunctionId, FunctionId) {
    let mut b = IrBuilder::new();
    let outer = b.begin_function("outer", &[]);
    let one = b.int(1);
    let decl = b.var_decl("v", Some(one));
    let inner = b.begin_function("inner", &[]);
    let v = b.read("v");
    let one = b.int(1);
    let sum = b.binary(BinaryOp::Add, v, one);
    let ret = b.ret(Some(sum));
    b.end_function(vec![ret]);
    let inner_decl = b.function_decl(inner);
    let inner_ref = b.read("inner");
    let ret = b.ret(Some(inner_ref));
    b.end_function(vec![decl, inner_decl, ret]);
    let outer_decl = b.function_decl(outer);
    (b.finish(vec![outer_decl]).unwrap(), outer, inner)
}

#[test]
fn test_captured_local_is_closed_on_in_declaring_function() {
    let (module, outer, inner) = closure_module();
    let (module, _runtime, _) = resolve(module);

    let declared = module
        .lookup_in_scope(module.function(outer).scope, "v")
        .unwrap();
    assert_eq!(module.symbol(declared).kind(), SymbolKind::ClosedOnLocal);
    assert!(
        module
            .scope(module.function(outer).scope)
            .has(ScopeFlags::HAS_CLOSED_ON_SYMBOL)
    );

    let captured = symbol_of_read(&module, read_of(&module, inner, "v").unwrap());
    let state = module.symbol(captured).snapshot();
    assert_eq!(state.kind, SymbolKind::ParentLocal);
    assert_eq!(state.resolved, Some(declared));
    assert_eq!(state.field, module.symbol(declared).field());
    assert!(
        module
            .scope(module.function(inner).scope)
            .has(ScopeFlags::HAS_PARENT_LOCAL_SYMBOL)
    );
}

#[test]
fn test_top_level_capture_is_global() {
    // var v = 1; function inner() { return v; }
    let mut b = IrBuilder::new();
    let one = b.int(1);
    let decl = b.var_decl("v", Some(one));
    let inner = b.begin_function("inner", &[]);
    let v = b.read("v");
    let ret = b.ret(Some(v));
    b.end_function(vec![ret]);
    let inner_decl = b.function_decl(inner);
    let (module, runtime, _) = resolve(b.finish(vec![decl, inner_decl]).unwrap());

    let captured = symbol_of_read(&module, read_of(&module, inner, "v").unwrap());
    assert_eq!(module.symbol(captured).kind(), SymbolKind::Global);
    assert!(runtime.has_global_name("v"));
}

#[test]
fn test_write_through_closure_counts_non_local_writer() {
    // function outer() { var v; function set() { v = 2; } }
    let mut b = IrBuilder::new();
    let outer = b.begin_function("outer", &[]);
    let decl = b.var_decl("v", None);
    let set = b.begin_function("set", &[]);
    let two = b.int(2);
    let write = b.write("v", two);
    let stmt = b.expr_stmt(write);
    b.end_function(vec![stmt]);
    let set_decl = b.function_decl(set);
    b.end_function(vec![decl, set_decl]);
    let od = b.function_decl(outer);
    let (module, _runtime, _) = resolve(b.finish(vec![od]).unwrap());

    let declared = module
        .lookup_in_scope(module.function(outer).scope, "v")
        .unwrap();
    assert_eq!(module.symbol(declared).non_local_writers(), 1);
}

#[test]
fn test_eval_in_nested_function_taints_parent_locals() {
    // function outer(p) { function inner() { eval("p"); } }
    let mut b = IrBuilder::new();
    let outer = b.begin_function("outer", &["p"]);
    let inner = b.begin_function("inner", &[]);
    let source = b.string("p");
    let call = b.eval_call(vec![source]);
    let stmt = b.expr_stmt(call);
    b.end_function(vec![stmt]);
    let inner_decl = b.function_decl(inner);
    b.end_function(vec![inner_decl]);
    let od = b.function_decl(outer);
    let (module, _runtime, _) = resolve(b.finish(vec![od]).unwrap());

    let scope = module.scope(module.function(outer).scope);
    assert!(scope.has(ScopeFlags::HAS_UNKNOWN_SUB_FUNCTION));
    let p = module.function(outer).params[0];
    assert_eq!(module.symbol(p).kind(), SymbolKind::ClosedOnLocal);
}

// =============================================================================
// Block Scopes
// =============================================================================

#[test]
fn test_block_read_aliases_function_local() {
    // function f() { var x = 1; { x; } }
    let mut b = IrBuilder::new();
    let f = b.begin_function("f", &[]);
    let one = b.int(1);
    let decl = b.var_decl("x", Some(one));
    b.begin_block();
    let x = b.read("x");
    let stmt = b.expr_stmt(x);
    let block = b.end_block(vec![stmt]);
    b.end_function(vec![decl, block]);
    let fd = b.function_decl(f);
    let (module, _runtime, _) = resolve(b.finish(vec![fd]).unwrap());

    let declared = module.lookup_in_scope(module.function(f).scope, "x").unwrap();
    let alias = symbol_of_read(&module, x);
    assert_eq!(module.symbol(alias).kind(), SymbolKind::OuterDuplicate);
    assert_eq!(module.root_symbol(alias), declared);
    assert_eq!(module.storage_symbol(alias), declared);
    assert_eq!(module.symbol(declared).kind(), SymbolKind::Local);
}

// =============================================================================
// Idempotence
// =============================================================================

#[test]
fn test_resolving_twice_changes_nothing() {
    let (module, _, _) = closure_module();
    let (module, runtime, compiler) = resolve(module);
    let before = kinds(&module);
    compiler.resolve(&module, &runtime).unwrap();
    assert_eq!(kinds(&module), before);
}

#[test]
fn test_same_program_resolves_identically() {
    let runtime = Runtime::new();
    let compiler = tierjit_compiler::Compiler::default();
    let mut first = closure_module().0;
    let mut second = closure_module().0;
    compiler.prepare(&mut first);
    compiler.prepare(&mut second);
    compiler.resolve(&first, &runtime).unwrap();
    compiler.resolve(&second, &runtime).unwrap();
    assert_eq!(kinds(&first), kinds(&second));
}

// =============================================================================
// Properties
// =============================================================================

fn is_pure(module: &Module, function: FunctionId) -> bool {
    let scope = module.scope(module.function(function).scope);
    !scope.is_program()
        && !scope.has(ScopeFlags::HAS_UNKNOWN_SUB_FUNCTION)
        && !module.function(function).is_eval_body
        && !contains_eval(module, function)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn alias_chains_end_at_non_alias(shapes in prop::collection::vec(fn_shape(2), 1..4)) {
        let (module, _runtime, _) = resolve(build(&shapes));
        for symbol in module.symbol_ids() {
            let state = module.symbol(symbol).snapshot();
            if state.kind.is_alias() {
                prop_assert!(state.resolved.is_some(), "alias {} has no target", symbol);
            }
            let root = module.root_symbol(symbol);
            prop_assert!(
                !module.symbol(root).kind().is_alias(),
                "{} ends at alias {}", symbol, root
            );
        }
    }

    #[test]
    fn resolution_is_idempotent(shapes in prop::collection::vec(fn_shape(2), 1..4)) {
        let (module, runtime, compiler) = resolve(build(&shapes));
        let before = kinds(&module);
        compiler.resolve(&module, &runtime).unwrap();
        prop_assert_eq!(kinds(&module), before);
    }

    #[test]
    fn pure_locals_keep_their_kind(shapes in prop::collection::vec(fn_shape(2), 1..4)) {
        let (mut module, runtime, compiler) = resolve(build(&shapes));
        let functions: Vec<FunctionId> = module.function_ids().collect();
        let locals: Vec<SymbolId> = functions
            .iter()
            .filter(|&&f| is_pure(&module, f))
            .flat_map(|&f| module.function_scopes(f))
            .flat_map(|scope| module.scope(scope).symbols.clone())
            .filter(|&s| module.symbol(s).kind() == SymbolKind::Local)
            .collect();

        for &function in &functions {
            compiler.compile(&mut module, function, CompileOptions::baseline()).unwrap();
        }
        compiler.resolve(&module, &runtime).unwrap();

        for symbol in locals {
            prop_assert_eq!(module.symbol(symbol).kind(), SymbolKind::Local);
        }
    }
}

#[test]
fn test_generated_shape_smoke() {
    let shape = FnShape {
        params: vec![0],
        vars: vec![1],
        writes: vec![1],
        reads: vec![0, 1],
        eval: false,
        call_args: vec![0],
        children: vec![FnShape {
            params: vec![2],
            vars: vec![],
            writes: vec![],
            reads: vec![2],
            eval: false,
            call_args: vec![],
            children: vec![],
        }],
    };
    let (mut module, _runtime, compiler) = resolve(build(&[shape]));
    let top = module.function_by_name("fn0").unwrap();
    let compiled = compiler
        .compile(&mut module, top, CompileOptions::baseline())
        .unwrap();
    // `fn0_0(a) + 1` with a pure callee is inlined.
    assert_eq!(compiled.inlined, 1);
}
