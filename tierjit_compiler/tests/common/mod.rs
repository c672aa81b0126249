//! Shared helpers for the compiler integration tests.

#![allow(dead_code)]

use proptest::collection::vec;
use proptest::prelude::*;
use tierjit_compiler::ir::NodeKind;
use tierjit_compiler::{Compiler, CompilerConfig, IrBuilder, Module, NodeId};
use tierjit_runtime::{BinaryOp, FunctionId, Runtime};

/// Identifier pool for generated programs; small so that names collide
/// across nesting levels.
pub const NAMES: [&str; 5] = ["a", "b", "c", "d", "e"];

/// Build, prepare and resolve a module with the test configuration.
pub fn resolve(module: Module) -> (Module, Runtime, Compiler) {
    let mut module = module;
    let compiler = Compiler::new(CompilerConfig::for_testing());
    let runtime = Runtime::new();
    compiler.prepare(&mut module);
    compiler.resolve(&module, &runtime).expect("resolution failed");
    (module, runtime, compiler)
}

/// First identifier read of `name` in `function`'s own body.
pub fn read_of(module: &Module, function: FunctionId, name: &str) -> Option<NodeId> {
    module
        .walk(module.function(function).body)
        .into_iter()
        .find(|&node| match module.node(node).kind {
            NodeKind::ReadIdentifier { symbol, .. } => &*module.symbol(symbol).name == name,
            _ => false,
        })
}

// =============================================================================
// Generated Programs
// =============================================================================

/// Shape of a generated function. Indices refer to [`NAMES`].
#[derive(Debug, Clone)]
pub struct FnShape {
    pub params: Vec<usize>,
    pub vars: Vec<usize>,
    pub writes: Vec<usize>,
    pub reads: Vec<usize>,
    pub eval: bool,
    /// Call each child with these argument names after declaring it.
    pub call_args: Vec<usize>,
    pub children: Vec<FnShape>,
}

fn name_list(max: usize) -> impl Strategy<Value = Vec<usize>> {
    vec(0..NAMES.len(), 0..max)
}

/// Random function trees up to `depth` levels of nesting.
pub fn fn_shape(depth: u32) -> impl Strategy<Value = FnShape> {
    let leaf = (
        name_list(3),
        name_list(3),
        name_list(3),
        name_list(4),
        prop::bool::weighted(0.1),
        name_list(3),
    )
        .prop_map(|(params, vars, writes, reads, eval, call_args)| FnShape {
            params,
            vars,
            writes,
            reads,
            eval,
            call_args,
            children: Vec::new(),
        });
    leaf.prop_recursive(depth, 16, 3, |inner| {
        (
            name_list(3),
            name_list(3),
            name_list(3),
            name_list(4),
            prop::bool::weighted(0.1),
            name_list(3),
            vec(inner, 0..3),
        )
            .prop_map(|(params, vars, writes, reads, eval, call_args, children)| FnShape {
                params,
                vars,
                writes,
                reads,
                eval,
                call_args,
                children,
            })
    })
}

/// A Program with the generated functions declared at the top level.
pub fn build(shapes: &[FnShape]) -> Module {
    let mut b = IrBuilder::new();
    let mut body = Vec::new();
    for (i, shape) in shapes.iter().enumerate() {
        body.push(build_function(&mut b, shape, &format!("fn{i}")));
    }
    b.finish(body).expect("generated program is balanced")
}

fn build_function(b: &mut IrBuilder, shape: &FnShape, name: &str) -> NodeId {
    let mut params: Vec<&str> = Vec::new();
    for &p in &shape.params {
        if !params.contains(&NAMES[p]) {
            params.push(NAMES[p]);
        }
    }
    let function = b.begin_function(name, &params);
    let mut statements = Vec::new();

    for &v in &shape.vars {
        let init = b.int(v as i32);
        statements.push(b.var_decl(NAMES[v], Some(init)));
    }
    for (i, child) in shape.children.iter().enumerate() {
        let child_name = format!("{name}_{i}");
        statements.push(build_function(b, child, &child_name));
        let callee = b.read(&child_name);
        let args = shape.call_args.iter().map(|&a| b.read(NAMES[a])).collect();
        let call = b.call(callee, args);
        let one = b.int(1);
        let sum = b.binary(BinaryOp::Add, call, one);
        statements.push(b.expr_stmt(sum));
    }
    for &w in &shape.writes {
        let value = b.read(NAMES[(w + 1) % NAMES.len()]);
        let two = b.int(2);
        let product = b.binary(BinaryOp::Mul, value, two);
        let write = b.write(NAMES[w], product);
        statements.push(b.expr_stmt(write));
    }
    if shape.eval {
        let source = b.string("0");
        let call = b.eval_call(vec![source]);
        statements.push(b.expr_stmt(call));
    }
    let mut result = None;
    for &r in &shape.reads {
        let read = b.read(NAMES[r]);
        result = Some(match result {
            None => read,
            Some(acc) => b.binary(BinaryOp::Add, acc, read),
        });
    }
    statements.push(b.ret(result));

    b.end_function(statements);
    b.function_decl(function)
}

/// Whether `function` or anything nested in it contains `eval`.
pub fn contains_eval(module: &Module, function: FunctionId) -> bool {
    use tierjit_compiler::ir::ScopeFlags;
    module
        .function_scopes(function)
        .iter()
        .any(|&scope| module.scope(scope).has(ScopeFlags::HAS_EVAL))
        || module
            .function(function)
            .sub_functions
            .iter()
            .any(|&sub| contains_eval(module, sub))
}
