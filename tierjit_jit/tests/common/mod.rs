//! Shared helpers for the engine integration tests.

#![allow(dead_code)]

use tierjit_compiler::{IrBuilder, Module};
use tierjit_jit::{Engine, EngineConfig, Tier};
use tierjit_runtime::{BinaryOp, JsObject, ObjectRef, Value};
use tracing_subscriber::EnvFilter;

/// Route engine logs to the test output; `RUST_LOG` picks the level.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Engine with the test configuration, Program already run.
pub fn engine(module: Module) -> Engine {
    engine_with(module, EngineConfig::for_testing())
}

pub fn engine_with(module: Module, config: EngineConfig) -> Engine {
    init_tracing();
    let engine = Engine::new(module, config).expect("engine setup failed");
    engine.run().expect("program failed");
    engine
}

/// Invocations needed before a function reaches the speculative tier.
pub fn warmup(engine: &Engine) -> u32 {
    engine.tiers().hot_threshold + 1
}

/// Call `name` until it runs speculative code.
pub fn warm(engine: &Engine, name: &str, args: impl Fn(i32) -> Vec<Value>) {
    let function = engine.function_id(name).expect("no such function");
    for i in 0..warmup(engine) as i32 {
        engine.call(name, args(i)).expect("warmup call failed");
    }
    assert_eq!(engine.stats(function).tier, Some(Tier::Speculative));
}

/// Plain object with `properties` added in order.
pub fn object(engine: &Engine, properties: &[(&str, Value)]) -> ObjectRef {
    let runtime = engine.runtime();
    let object = JsObject::new_ref(None);
    {
        let mut object = object.write();
        for (name, value) in properties {
            object.put_own(runtime.intern(name), value.clone());
        }
    }
    object
}

pub fn as_int(value: &Value) -> i32 {
    match value {
        Value::Int32(n) => *n,
        other => panic!("expected an int32, got {other:?}"),
    }
}

/// `function inc(x) { return x + 1; }`
pub fn inc_module() -> Module {
    let mut b = IrBuilder::new();
    let f = b.begin_function("inc", &["x"]);
    let x = b.read("x");
    let one = b.int(1);
    let sum = b.binary(BinaryOp::Add, x, one);
    let ret = b.ret(Some(sum));
    b.end_function(vec![ret]);
    let fd = b.function_decl(f);
    b.finish(vec![fd]).expect("balanced builder")
}
