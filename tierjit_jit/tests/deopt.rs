//! Speculation failures, deoptimization and blacklisting.

mod common;

use common::{as_int, engine, engine_with, inc_module, object, warm};
use tierjit_compiler::IrBuilder;
use tierjit_jit::{DeoptReason, EngineConfig, JitError, Tier};
use tierjit_runtime::{BinaryOp, RuntimeError, Value, ValueType};

#[test]
fn test_type_guard_failure_resumes_in_fallback() {
    let engine = engine(inc_module());
    let inc = engine.function_id("inc").unwrap();
    warm(&engine, "inc", |i| vec![Value::Int32(i)]);

    let speculative = engine.code(inc, Tier::Speculative).unwrap();
    assert!(speculative.guard_count() > 0);
    assert!(speculative.fallback.is_some());

    let result = engine.call("inc", vec![Value::string("x")]).unwrap();
    assert_eq!(result.to_string(), "x1");

    let stats = engine.stats(inc);
    assert!(stats.blacklisted);
    assert_eq!(stats.deopts, 1);
    assert!(engine.code(inc, Tier::Speculative).is_none());
}

#[test]
fn test_blacklisted_function_stays_generic() {
    let engine = engine(inc_module());
    let inc = engine.function_id("inc").unwrap();
    warm(&engine, "inc", |i| vec![Value::Int32(i)]);
    engine.call("inc", vec![Value::string("x")]).unwrap();

    for i in 0..5 {
        let result = engine.call("inc", vec![Value::Int32(i)]).unwrap();
        assert_eq!(as_int(&result), i + 1);
        assert_eq!(engine.stats(inc).tier, Some(Tier::Profiling));
    }
    assert!(engine.code(inc, Tier::Speculative).is_none());
    assert_eq!(engine.stats(inc).deopts, 1);
}

#[test]
fn test_disabled_deoptimization_raises() {
    let mut config = EngineConfig::for_testing();
    config.tiers.enable_deoptimization = false;
    let engine = engine_with(inc_module(), config);
    let inc = engine.function_id("inc").unwrap();
    warm(&engine, "inc", |i| vec![Value::Int32(i)]);
    assert!(engine.code(inc, Tier::Speculative).unwrap().fallback.is_none());

    let err = engine.call("inc", vec![Value::string("x")]).unwrap_err();
    assert!(matches!(
        err,
        JitError::Runtime(RuntimeError::SpeculationFailed {
            expected: ValueType::Int32,
            observed: ValueType::String,
            ..
        })
    ));
    assert_eq!(engine.stats(inc).deopts, 0);
}

#[test]
fn test_int32_overflow_deoptimizes_to_double() {
    let engine = engine(inc_module());
    let inc = engine.function_id("inc").unwrap();
    warm(&engine, "inc", |i| vec![Value::Int32(i)]);

    let speculative = engine.code(inc, Tier::Speculative).unwrap();
    assert!(
        speculative
            .deopt_sites
            .iter()
            .any(|site| site.reason == DeoptReason::Overflow)
    );

    let result = engine.call("inc", vec![Value::Int32(i32::MAX)]).unwrap();
    assert!(matches!(result, Value::Double(d) if d == i32::MAX as f64 + 1.0));
    assert_eq!(engine.stats(inc).deopts, 1);
}

#[test]
fn test_side_effects_before_failed_guard_happen_once() {
    // function bump(o, x) { o.count = o.count + 1; return x + 1; }
    let mut b = IrBuilder::new();
    let f = b.begin_function("bump", &["o", "x"]);
    let o = b.read("o");
    let o2 = b.read("o");
    let count = b.property(o2, "count");
    let one = b.int(1);
    let next = b.binary(BinaryOp::Add, count, one);
    let store = b.set_property(o, "count", next);
    let stmt = b.expr_stmt(store);
    let x = b.read("x");
    let one = b.int(1);
    let sum = b.binary(BinaryOp::Add, x, one);
    let ret = b.ret(Some(sum));
    b.end_function(vec![stmt, ret]);
    let fd = b.function_decl(f);
    let engine = engine(b.finish(vec![fd]).unwrap());

    let counter = object(&engine, &[("count", Value::Int32(0))]);
    let target = Value::Object(counter.clone());
    warm(&engine, "bump", |i| vec![target.clone(), Value::Int32(i)]);
    let warm_calls = common::warmup(&engine) as i32;

    let result = engine.call("bump", vec![target.clone(), Value::Double(0.5)]).unwrap();
    assert!(matches!(result, Value::Double(d) if d == 1.5));
    let count = counter.read().get_own(engine.runtime().intern("count")).unwrap();
    assert_eq!(as_int(&count), warm_calls + 1);
    assert_eq!(engine.stats(engine.function_id("bump").unwrap()).deopts, 1);
}

#[test]
fn test_deopt_inside_loop_keeps_loop_state() {
    // function sum(n, step) { var s = 0; var i = 0; while (i < n) { s = s + step; i = i + 1; } return s; }
    let mut b = IrBuilder::new();
    let f = b.begin_function("sum", &["n", "step"]);
    let zero = b.int(0);
    let s_decl = b.var_decl("s", Some(zero));
    let zero = b.int(0);
    let i_decl = b.var_decl("i", Some(zero));
    let i = b.read("i");
    let n = b.read("n");
    let cond = b.binary(BinaryOp::Lt, i, n);
    let s = b.read("s");
    let step = b.read("step");
    let add = b.binary(BinaryOp::Add, s, step);
    let write_s = b.write("s", add);
    let s_stmt = b.expr_stmt(write_s);
    let i = b.read("i");
    let one = b.int(1);
    let inc = b.binary(BinaryOp::Add, i, one);
    let write_i = b.write("i", inc);
    let i_stmt = b.expr_stmt(write_i);
    let body = b.block(vec![s_stmt, i_stmt]);
    let while_loop = b.while_loop(cond, body);
    let s = b.read("s");
    let ret = b.ret(Some(s));
    b.end_function(vec![s_decl, i_decl, while_loop, ret]);
    let fd = b.function_decl(f);
    let engine = engine(b.finish(vec![fd]).unwrap());

    warm(&engine, "sum", |i| vec![Value::Int32(i + 1), Value::Int32(2)]);
    let result = engine
        .call("sum", vec![Value::Int32(4), Value::Double(0.25)])
        .unwrap();
    assert_eq!(result.to_number(), 1.0);
}
