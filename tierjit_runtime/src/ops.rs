//! Generic operator semantics.
//!
//! These are the slow paths every tier can use. Specialized code calls
//! [`numeric_binary`] and [`int32_binary`] directly once the operand
//! representations are known.

use crate::error::{RuntimeError, RuntimeResult};
use crate::value::{Value, ValueType};
use std::fmt;
use std::sync::Arc;

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    StrictEq,
    StrictNe,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    UShr,
}

impl BinaryOp {
    /// `+ - * / %`
    #[inline]
    pub const fn is_arithmetic(self) -> bool {
        matches!(self, Self::Add | Self::Sub | Self::Mul | Self::Div | Self::Mod)
    }

    #[inline]
    pub const fn is_relational(self) -> bool {
        matches!(self, Self::Lt | Self::Le | Self::Gt | Self::Ge)
    }

    #[inline]
    pub const fn is_equality(self) -> bool {
        matches!(self, Self::Eq | Self::Ne | Self::StrictEq | Self::StrictNe)
    }

    #[inline]
    pub const fn is_bitwise(self) -> bool {
        matches!(
            self,
            Self::BitAnd | Self::BitOr | Self::BitXor | Self::Shl | Self::Shr | Self::UShr
        )
    }

    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Mod => "%",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::StrictEq => "===",
            Self::StrictNe => "!==",
            Self::BitAnd => "&",
            Self::BitOr => "|",
            Self::BitXor => "^",
            Self::Shl => "<<",
            Self::Shr => ">>",
            Self::UShr => ">>>",
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    Plus,
    Not,
    BitNot,
    TypeOf,
    Void,
}

// =============================================================================
// Generic Paths
// =============================================================================

/// Evaluate a binary operator on arbitrary values.
pub fn binary(op: BinaryOp, left: &Value, right: &Value) -> RuntimeResult<Value> {
    use BinaryOp::*;
    Ok(match op {
        Add => {
            let stringy = |v: &Value| {
                matches!(v.value_type(), ValueType::String) || v.value_type().is_object_like()
            };
            if stringy(left) || stringy(right) {
                let mut joined = String::from(&*left.to_js_string());
                joined.push_str(&right.to_js_string());
                Value::String(Arc::from(joined))
            } else {
                Value::number(left.to_number() + right.to_number())
            }
        }
        Sub | Mul | Div | Mod => numeric_binary(op, left.to_number(), right.to_number()),
        Lt | Le | Gt | Ge => match (left, right) {
            (Value::String(a), Value::String(b)) => Value::Boolean(match op {
                Lt => a < b,
                Le => a <= b,
                Gt => a > b,
                _ => a >= b,
            }),
            _ => numeric_binary(op, left.to_number(), right.to_number()),
        },
        Eq => Value::Boolean(left.loose_equals(right)),
        Ne => Value::Boolean(!left.loose_equals(right)),
        StrictEq => Value::Boolean(left.strict_equals(right)),
        StrictNe => Value::Boolean(!left.strict_equals(right)),
        BitAnd | BitOr | BitXor | Shl | Shr => int32_binary(op, left.to_int32(), right.to_int32())?,
        UShr => {
            let shift = right.to_uint32() & 31;
            Value::number((left.to_uint32() >> shift) as f64)
        }
    })
}

/// Arithmetic and comparison on two numbers.
pub fn numeric_binary(op: BinaryOp, a: f64, b: f64) -> Value {
    use BinaryOp::*;
    match op {
        Add => Value::number(a + b),
        Sub => Value::number(a - b),
        Mul => Value::number(a * b),
        Div => Value::number(a / b),
        Mod => Value::number(a % b),
        Lt => Value::Boolean(a < b),
        Le => Value::Boolean(a <= b),
        Gt => Value::Boolean(a > b),
        Ge => Value::Boolean(a >= b),
        Eq | StrictEq => Value::Boolean(a == b),
        Ne | StrictNe => Value::Boolean(a != b),
        BitAnd | BitOr | BitXor | Shl | Shr | UShr => {
            let a = Value::Double(a);
            let b = Value::Double(b);
            match binary(op, &a, &b) {
                Ok(value) => value,
                Err(_) => Value::Double(f64::NAN),
            }
        }
    }
}

/// Bitwise operators and comparisons on two 32-bit integers.
pub fn int32_binary(op: BinaryOp, a: i32, b: i32) -> RuntimeResult<Value> {
    use BinaryOp::*;
    Ok(match op {
        BitAnd => Value::Int32(a & b),
        BitOr => Value::Int32(a | b),
        BitXor => Value::Int32(a ^ b),
        Shl => Value::Int32(a.wrapping_shl(b as u32 & 31)),
        Shr => Value::Int32(a.wrapping_shr(b as u32 & 31)),
        UShr => Value::number(((a as u32) >> (b as u32 & 31)) as f64),
        Lt => Value::Boolean(a < b),
        Le => Value::Boolean(a <= b),
        Gt => Value::Boolean(a > b),
        Ge => Value::Boolean(a >= b),
        Eq | StrictEq => Value::Boolean(a == b),
        Ne | StrictNe => Value::Boolean(a != b),
        Add | Sub | Mul | Div | Mod => {
            return Err(RuntimeError::type_error(format!(
                "operator {op} has no int32 form"
            )));
        }
    })
}

/// Evaluate a unary operator.
pub fn unary(op: UnaryOp, operand: &Value) -> Value {
    match op {
        UnaryOp::Neg => Value::number(-operand.to_number()),
        UnaryOp::Plus => Value::number(operand.to_number()),
        UnaryOp::Not => Value::Boolean(!operand.to_boolean()),
        UnaryOp::BitNot => Value::Int32(!operand.to_int32()),
        UnaryOp::TypeOf => Value::string(operand.type_of()),
        UnaryOp::Void => Value::Undefined,
    }
}
