//! Inline caches in speculative code.

mod common;

use common::{as_int, engine, engine_with, object, warm};
use tierjit_compiler::{IrBuilder, Module};
use tierjit_jit::{CacheKind, EngineConfig, Inst, Tier};
use tierjit_runtime::{JsObject, PropertyFlags, Value};

/// `function get(o) { return o.x; }`
fn getter_module() -> Module {
    let mut b = IrBuilder::new();
    let f = b.begin_function("get", &["o"]);
    let o = b.read("o");
    let x = b.property(o, "x");
    let ret = b.ret(Some(x));
    b.end_function(vec![ret]);
    let fd = b.function_decl(f);
    b.finish(vec![fd]).unwrap()
}

#[test]
fn test_own_property_cache_hits_and_misses() {
    let engine = engine(getter_module());
    let get = engine.function_id("get").unwrap();
    warm(&engine, "get", |i| {
        vec![Value::Object(object(&engine, &[("x", Value::Int32(i))]))]
    });

    let code = engine.code(get, Tier::Speculative).unwrap();
    assert_eq!(code.cached_access_count(), 1);
    assert!(matches!(code.ics[0].kind, CacheKind::Own { .. }));
    let hits = code.ics[0].hits();

    let same_shape = Value::Object(object(&engine, &[("x", Value::Int32(41))]));
    assert_eq!(as_int(&engine.call("get", vec![same_shape]).unwrap()), 41);
    assert_eq!(code.ics[0].hits(), hits + 1);

    // Different layout: the cache misses and the generic path answers.
    let other_shape = Value::Object(object(
        &engine,
        &[("y", Value::Int32(0)), ("x", Value::Int32(7))],
    ));
    assert_eq!(as_int(&engine.call("get", vec![other_shape]).unwrap()), 7);
    assert_eq!(code.ics[0].misses(), 1);
    assert_eq!(engine.stats(get).deopts, 0);
}

#[test]
fn test_inherited_property_cache_checks_holder() {
    let engine = engine(getter_module());
    let get = engine.function_id("get").unwrap();
    let proto = object(&engine, &[("x", Value::string("shared"))]);
    let child = || Value::Object(JsObject::new_ref(Some(proto.clone())));
    warm(&engine, "get", |_| vec![child()]);

    let code = engine.code(get, Tier::Speculative).unwrap();
    assert!(matches!(code.ics[0].kind, CacheKind::Inherited { .. }));
    assert_eq!(engine.call("get", vec![child()]).unwrap().to_string(), "shared");

    // Same receiver map, different prototype object.
    let impostor = object(&engine, &[("x", Value::string("impostor"))]);
    let other = Value::Object(JsObject::new_ref(Some(impostor)));
    assert_eq!(engine.call("get", vec![other]).unwrap().to_string(), "impostor");

    // Holder layout change.
    proto.write().define_own(
        engine.runtime().intern("extra"),
        Value::Null,
        PropertyFlags::default_data(),
    );
    assert_eq!(engine.call("get", vec![child()]).unwrap().to_string(), "shared");
    assert!(code.ics[0].misses() >= 2);
}

#[test]
fn test_full_inherited_cache_leaves_access_generic() {
    let mut config = EngineConfig::for_testing();
    config.tiers.inherited_cache_capacity = 0;
    let engine = engine_with(getter_module(), config);
    let get = engine.function_id("get").unwrap();
    let proto = object(&engine, &[("x", Value::Int32(1))]);
    warm(&engine, "get", |_| {
        vec![Value::Object(JsObject::new_ref(Some(proto.clone())))]
    });
    let code = engine.code(get, Tier::Speculative).unwrap();
    assert_eq!(code.cached_access_count(), 0);
}

#[test]
fn test_disabled_inline_cache() {
    let mut config = EngineConfig::for_testing();
    config.tiers.enable_inline_cache = false;
    let engine = engine_with(getter_module(), config);
    let get = engine.function_id("get").unwrap();
    warm(&engine, "get", |i| {
        vec![Value::Object(object(&engine, &[("x", Value::Int32(i))]))]
    });
    let code = engine.code(get, Tier::Speculative).unwrap();
    assert!(code.ics.is_empty());
    assert!(
        code.code
            .iter()
            .any(|inst| matches!(inst, Inst::GetProperty { profile: None, .. }))
    );
}

#[test]
fn test_cached_store_and_global_load() {
    // var limit = 10; function put(o, v) { o.x = v; return limit; }
    let mut b = IrBuilder::new();
    let ten = b.int(10);
    let limit = b.var_decl("limit", Some(ten));
    let f = b.begin_function("put", &["o", "v"]);
    let o = b.read("o");
    let v = b.read("v");
    let store = b.set_property(o, "x", v);
    let stmt = b.expr_stmt(store);
    let limit_read = b.read("limit");
    let ret = b.ret(Some(limit_read));
    b.end_function(vec![stmt, ret]);
    let fd = b.function_decl(f);
    let engine = engine(b.finish(vec![limit, fd]).unwrap());
    let put = engine.function_id("put").unwrap();

    let target = object(&engine, &[("x", Value::Int32(0))]);
    let value = Value::Object(target.clone());
    warm(&engine, "put", |i| vec![value.clone(), Value::Int32(i)]);

    let code = engine.code(put, Tier::Speculative).unwrap();
    assert!(code.code.iter().any(|inst| matches!(inst, Inst::SetPropertyCached { .. })));
    assert!(code.code.iter().any(|inst| matches!(inst, Inst::LoadGlobalCached { .. })));

    let result = engine.call("put", vec![value.clone(), Value::Int32(99)]).unwrap();
    assert_eq!(as_int(&result), 10);
    let x = target.read().get_own(engine.runtime().intern("x")).unwrap();
    assert_eq!(as_int(&x), 99);

    // Global writes keep the layout, so the cache sees the new value.
    engine
        .runtime()
        .set_global(engine.runtime().intern("limit"), Value::Int32(20));
    let result = engine.call("put", vec![value, Value::Int32(1)]).unwrap();
    assert_eq!(as_int(&result), 20);
}
