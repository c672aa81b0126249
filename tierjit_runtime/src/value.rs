//! Dynamic values and the value-representation lattice.
//!
//! `Value` is the uniform boxed representation every tier can fall back to.
//! `ValueType` is the representation tag the type inferer assigns to symbols
//! and expressions; the JIT picks instructions and storage from it.
//!
//! # Lattice
//!
//! ```text
//!                 BoxedRef
//!                /   |    \
//!           Boxed  Object  ...
//!          /  |  \    |  \
//!  Boolean Double String Array Function  Undefined Null
//!            |
//!          Int32
//!            |
//!         Unknown   (unset)
//! ```
//!
//! `Int32` widens to `Double`, `Array`/`Function` widen to `Object`, and every
//! other disagreement lands on `BoxedRef`, the always-sound generic kind.

use crate::error::RuntimeResult;
use crate::object::ObjectRef;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

// =============================================================================
// Function Identity
// =============================================================================

/// Index of a function's metadata in its module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunctionId(pub u32);

impl FunctionId {
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fn#{}", self.0)
    }
}

// =============================================================================
// Value Type Lattice
// =============================================================================

/// Value-representation tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum ValueType {
    /// Not yet inferred.
    #[default]
    Unknown = 0,
    Undefined = 1,
    Null = 2,
    Boolean = 3,
    Int32 = 4,
    Double = 5,
    String = 6,
    Object = 7,
    Array = 8,
    Function = 9,
    /// A freshly produced dynamic value of unknown kind.
    Boxed = 10,
    /// Storage holding a dynamic value of unknown kind.
    BoxedRef = 11,
}

impl ValueType {
    /// Convert from the raw tag.
    pub const fn from_u8(tag: u8) -> Option<Self> {
        Some(match tag {
            0 => Self::Unknown,
            1 => Self::Undefined,
            2 => Self::Null,
            3 => Self::Boolean,
            4 => Self::Int32,
            5 => Self::Double,
            6 => Self::String,
            7 => Self::Object,
            8 => Self::Array,
            9 => Self::Function,
            10 => Self::Boxed,
            11 => Self::BoxedRef,
            _ => return None,
        })
    }

    #[inline]
    pub const fn is_numeric(self) -> bool {
        matches!(self, Self::Int32 | Self::Double)
    }

    #[inline]
    pub const fn is_boxed(self) -> bool {
        matches!(self, Self::Boxed | Self::BoxedRef)
    }

    /// A concrete kind a guard can check for.
    #[inline]
    pub const fn is_concrete(self) -> bool {
        !matches!(self, Self::Unknown | Self::Boxed | Self::BoxedRef)
    }

    #[inline]
    pub const fn is_object_like(self) -> bool {
        matches!(self, Self::Object | Self::Array | Self::Function)
    }

    /// Least upper bound of two representations.
    ///
    /// `Unknown` is the bottom element. Mixing `Undefined` or `Null` with any
    /// other kind lands on `BoxedRef`.
    pub fn join(self, other: Self) -> Self {
        use ValueType::*;
        if self == other {
            return self;
        }
        match (self, other) {
            (Unknown, t) | (t, Unknown) => t,
            (Int32, Double) | (Double, Int32) => Double,
            (Object, Array | Function) | (Array | Function, Object) | (Array, Function) | (Function, Array) => {
                Object
            }
            _ => BoxedRef,
        }
    }

    /// Whether a value whose dynamic type is `actual` may live in storage of
    /// this representation without conversion.
    pub fn admits(self, actual: Self) -> bool {
        use ValueType::*;
        match self {
            Unknown | Boxed | BoxedRef => true,
            Double => actual.is_numeric(),
            Object => actual.is_object_like(),
            _ => self == actual,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Undefined => "undefined",
            Self::Null => "null",
            Self::Boolean => "boolean",
            Self::Int32 => "int32",
            Self::Double => "double",
            Self::String => "string",
            Self::Object => "object",
            Self::Array => "array",
            Self::Function => "function",
            Self::Boxed => "boxed",
            Self::BoxedRef => "boxed-ref",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Values
// =============================================================================

/// Shared, mutable array storage.
pub type ArrayRef = Arc<RwLock<Vec<Value>>>;

/// Signature of a builtin implemented in Rust: `(this, args)`.
pub type NativeFn = fn(&Value, &[Value]) -> RuntimeResult<Value>;

/// A builtin function value.
#[derive(Clone, Copy)]
pub struct NativeFunction {
    pub name: &'static str,
    pub func: NativeFn,
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeFunction({})", self.name)
    }
}

/// A script function value: code identity plus captured scope.
#[derive(Debug)]
pub struct Closure {
    pub function: FunctionId,
    /// Context object the function was created in.
    pub context: ObjectRef,
    /// Backing object for properties stored on the function itself.
    pub properties: ObjectRef,
}

/// A dynamic value.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Boolean(bool),
    Int32(i32),
    Double(f64),
    String(Arc<str>),
    Object(ObjectRef),
    Array(ArrayRef),
    Function(Arc<Closure>),
    Native(NativeFunction),
}

impl Value {
    /// Build a number, preferring the `Int32` representation when exact.
    pub fn number(n: f64) -> Value {
        if n.fract() == 0.0
            && n >= i32::MIN as f64
            && n <= i32::MAX as f64
            && !(n == 0.0 && n.is_sign_negative())
        {
            Value::Int32(n as i32)
        } else {
            Value::Double(n)
        }
    }

    pub fn string(s: &str) -> Value {
        Value::String(Arc::from(s))
    }

    pub fn new_array(values: Vec<Value>) -> Value {
        Value::Array(Arc::new(RwLock::new(values)))
    }

    /// Dynamic representation of this value.
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Undefined => ValueType::Undefined,
            Value::Null => ValueType::Null,
            Value::Boolean(_) => ValueType::Boolean,
            Value::Int32(_) => ValueType::Int32,
            Value::Double(_) => ValueType::Double,
            Value::String(_) => ValueType::String,
            Value::Object(_) => ValueType::Object,
            Value::Array(_) => ValueType::Array,
            Value::Function(_) | Value::Native(_) => ValueType::Function,
        }
    }

    #[inline]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Int32(i) => Some(*i as f64),
            Value::Double(d) => Some(*d),
            _ => None,
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Value::Function(_) | Value::Native(_))
    }

    pub fn to_number(&self) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Boolean(b) => *b as u8 as f64,
            Value::Int32(i) => *i as f64,
            Value::Double(d) => *d,
            Value::String(s) => parse_number(s),
            Value::Array(items) => {
                let items = items.read();
                match items.as_slice() {
                    [] => 0.0,
                    [single] => single.to_number(),
                    _ => f64::NAN,
                }
            }
            Value::Object(_) | Value::Function(_) | Value::Native(_) => f64::NAN,
        }
    }

    pub fn to_boolean(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Boolean(b) => *b,
            Value::Int32(i) => *i != 0,
            Value::Double(d) => !(*d == 0.0 || d.is_nan()),
            Value::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    /// ECMAScript ToInt32.
    pub fn to_int32(&self) -> i32 {
        match self {
            Value::Int32(i) => *i,
            other => f64_to_int32(other.to_number()),
        }
    }

    pub fn to_uint32(&self) -> u32 {
        self.to_int32() as u32
    }

    pub fn to_js_string(&self) -> Arc<str> {
        match self {
            Value::String(s) => s.clone(),
            other => Arc::from(other.to_string()),
        }
    }

    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null | Value::Object(_) | Value::Array(_) => "object",
            Value::Boolean(_) => "boolean",
            Value::Int32(_) | Value::Double(_) => "number",
            Value::String(_) => "string",
            Value::Function(_) | Value::Native(_) => "function",
        }
    }

    /// `===`
    pub fn strict_equals(&self, other: &Value) -> bool {
        if let (Some(a), Some(b)) = (self.as_number(), other.as_number()) {
            return a == b;
        }
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            (Value::Array(a), Value::Array(b)) => Arc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Arc::ptr_eq(a, b),
            (Value::Native(a), Value::Native(b)) => a.func as usize == b.func as usize,
            _ => false,
        }
    }

    /// `==`
    pub fn loose_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined | Value::Null, Value::Undefined | Value::Null) => true,
            (Value::Undefined | Value::Null, _) | (_, Value::Undefined | Value::Null) => false,
            _ if self.value_type() == other.value_type()
                || (self.as_number().is_some() && other.as_number().is_some()) =>
            {
                self.strict_equals(other)
            }
            (Value::String(_) | Value::Boolean(_), _) | (_, Value::String(_) | Value::Boolean(_))
                if !self.value_type().is_object_like() && !other.value_type().is_object_like() =>
            {
                self.to_number() == other.to_number()
            }
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("undefined"),
            Value::Null => f.write_str("null"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Int32(i) => write!(f, "{i}"),
            Value::Double(d) => f.write_str(&format_number(*d)),
            Value::String(s) => f.write_str(s),
            Value::Object(_) => f.write_str("[object Object]"),
            Value::Array(items) => {
                let items = items.read();
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    if !matches!(item, Value::Undefined | Value::Null) {
                        write!(f, "{item}")?;
                    }
                }
                Ok(())
            }
            Value::Function(closure) => write!(f, "function {}", closure.function),
            Value::Native(native) => write!(f, "function {}() {{ [native code] }}", native.name),
        }
    }
}

fn parse_number(s: &str) -> f64 {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    match trimmed {
        "Infinity" | "+Infinity" => f64::INFINITY,
        "-Infinity" => f64::NEG_INFINITY,
        _ => trimmed.parse::<f64>().unwrap_or(f64::NAN),
    }
}

fn f64_to_int32(n: f64) -> i32 {
    if !n.is_finite() {
        return 0;
    }
    let truncated = n.trunc();
    let modulo = truncated.rem_euclid(4_294_967_296.0);
    if modulo >= 2_147_483_648.0 {
        (modulo - 4_294_967_296.0) as i32
    } else {
        modulo as i32
    }
}

/// Format a double the way scripts print numbers.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_owned()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_owned()
    } else if n == 0.0 {
        "0".to_owned()
    } else {
        format!("{n}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_numeric_widening() {
        assert_eq!(ValueType::Int32.join(ValueType::Double), ValueType::Double);
        assert_eq!(ValueType::Unknown.join(ValueType::Int32), ValueType::Int32);
        assert_eq!(ValueType::Int32.join(ValueType::Int32), ValueType::Int32);
    }

    #[test]
    fn test_join_undefined_mix_is_generic() {
        assert_eq!(ValueType::Undefined.join(ValueType::Int32), ValueType::BoxedRef);
        assert_eq!(ValueType::Null.join(ValueType::Double), ValueType::BoxedRef);
        assert_eq!(ValueType::Boolean.join(ValueType::Int32), ValueType::BoxedRef);
        assert_eq!(ValueType::Boxed.join(ValueType::BoxedRef), ValueType::BoxedRef);
    }

    #[test]
    fn test_join_object_kinds() {
        assert_eq!(ValueType::Array.join(ValueType::Function), ValueType::Object);
        assert_eq!(ValueType::Object.join(ValueType::Array), ValueType::Object);
    }

    #[test]
    fn test_admits() {
        assert!(ValueType::Double.admits(ValueType::Int32));
        assert!(!ValueType::Int32.admits(ValueType::Double));
        assert!(ValueType::BoxedRef.admits(ValueType::String));
        assert!(ValueType::Object.admits(ValueType::Function));
        assert!(!ValueType::Int32.admits(ValueType::String));
    }

    #[test]
    fn test_number_normalization() {
        assert!(matches!(Value::number(3.0), Value::Int32(3)));
        assert!(matches!(Value::number(0.5), Value::Double(_)));
        assert!(matches!(Value::number(-0.0), Value::Double(_)));
        assert!(matches!(Value::number(4_294_967_296.0), Value::Double(_)));
    }

    #[test]
    fn test_to_int32_wraps() {
        assert_eq!(Value::Double(4_294_967_297.0).to_int32(), 1);
        assert_eq!(Value::Double(2_147_483_648.0).to_int32(), i32::MIN);
        assert_eq!(Value::Double(f64::NAN).to_int32(), 0);
        assert_eq!(Value::string("12").to_int32(), 12);
    }

    #[test]
    fn test_equality() {
        assert!(Value::Int32(3).strict_equals(&Value::Double(3.0)));
        assert!(!Value::Int32(3).strict_equals(&Value::string("3")));
        assert!(Value::Int32(3).loose_equals(&Value::string("3")));
        assert!(Value::Undefined.loose_equals(&Value::Null));
        assert!(!Value::Undefined.strict_equals(&Value::Null));
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Double(1.5).to_string(), "1.5");
        assert_eq!(Value::Double(f64::INFINITY).to_string(), "Infinity");
        assert_eq!(Value::new_array(vec![Value::Int32(1), Value::Null, Value::Int32(2)]).to_string(), "1,,2");
    }

    #[test]
    fn test_value_type_tag_roundtrip() {
        assert_eq!(ValueType::from_u8(ValueType::Array as u8), Some(ValueType::Array));
        assert_eq!(ValueType::from_u8(200), None);
    }
}
