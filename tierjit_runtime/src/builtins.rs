//! Builtins installed on the global object.
//!
//! The resolver binds unresolved names to `Global` only if they exist here
//! (or were registered by Program-level declarations) at resolution time.

use crate::error::RuntimeResult;
use crate::object::{JsObject, PropertyFlags};
use crate::runtime::Runtime;
use crate::value::{NativeFn, NativeFunction, Value};

pub(crate) fn install(runtime: &Runtime) {
    runtime.define_global("undefined", Value::Undefined, PropertyFlags::read_only());
    runtime.define_global("NaN", Value::Double(f64::NAN), PropertyFlags::read_only());
    runtime.define_global("Infinity", Value::Double(f64::INFINITY), PropertyFlags::read_only());

    let math = JsObject::new_ref(None);
    {
        let mut math = math.write();
        let natives: [(&'static str, NativeFn); 5] = [
            ("abs", math_abs),
            ("floor", math_floor),
            ("max", math_max),
            ("min", math_min),
            ("sqrt", math_sqrt),
        ];
        for (name, func) in natives {
            math.define_own(
                runtime.intern(name),
                Value::Native(NativeFunction { name, func }),
                PropertyFlags::default_data(),
            );
        }
    }
    runtime.define_global("Math", Value::Object(math), PropertyFlags::default_data());
}

fn first_number(args: &[Value]) -> f64 {
    args.first().map_or(f64::NAN, Value::to_number)
}

fn math_abs(_this: &Value, args: &[Value]) -> RuntimeResult<Value> {
    Ok(Value::number(first_number(args).abs()))
}

fn math_floor(_this: &Value, args: &[Value]) -> RuntimeResult<Value> {
    Ok(Value::number(first_number(args).floor()))
}

fn math_sqrt(_this: &Value, args: &[Value]) -> RuntimeResult<Value> {
    Ok(Value::number(first_number(args).sqrt()))
}

fn math_max(_this: &Value, args: &[Value]) -> RuntimeResult<Value> {
    let mut result = f64::NEG_INFINITY;
    for n in args.iter().map(Value::to_number) {
        if n.is_nan() {
            return Ok(Value::Double(f64::NAN));
        }
        result = result.max(n);
    }
    Ok(Value::number(result))
}

fn math_min(_this: &Value, args: &[Value]) -> RuntimeResult<Value> {
    let mut result = f64::INFINITY;
    for n in args.iter().map(Value::to_number) {
        if n.is_nan() {
            return Ok(Value::Double(f64::NAN));
        }
        result = result.min(n);
    }
    Ok(Value::number(result))
}
