//! Syntax-directed type rules.
//!
//! Computes the representation an expression produces from the current
//! types of its operands. An operand still `Unknown` makes the result
//! `Unknown` ("not done yet") wherever the result depends on it.

use super::TypeTable;
use crate::ir::{Module, NodeId, NodeKind};
use tierjit_runtime::{BinaryOp, UnaryOp, ValueType};

/// Type of the value `node` produces, or `None` for statements.
///
/// Guarded casts are typed by the inferer, which owns the profile data.
pub(crate) fn expression_type(module: &Module, table: &TypeTable, node: NodeId) -> Option<ValueType> {
    let of = |n: NodeId| table.raw_node(n);
    let ty = match &module.node(node).kind {
        NodeKind::Literal(literal) => literal.value_type(),
        NodeKind::This => ValueType::Boxed,
        NodeKind::ArrayLiteral(_) => ValueType::Array,
        NodeKind::ObjectLiteral(_) => ValueType::Object,
        NodeKind::FunctionExpr(_) => ValueType::Function,
        NodeKind::Paren(e) => of(*e),
        NodeKind::GuardedCast { operand, .. } => of(*operand),
        NodeKind::Convert { kind, .. } => kind.result_type(),
        NodeKind::ReadIdentifier { symbol, .. } => table.raw_symbol(module.storage_symbol(*symbol)),
        NodeKind::WriteIdentifier { value, .. } => of(*value),
        NodeKind::ReadProperty { .. } | NodeKind::ReadIndex { .. } => ValueType::Boxed,
        NodeKind::WriteProperty { value, .. } | NodeKind::WriteIndex { value, .. } => of(*value),
        NodeKind::Unary { op, .. } => unary(*op),
        NodeKind::Binary { op, left, right } => binary(*op, of(*left), of(*right)),
        NodeKind::Logical { left, right, .. } => pending_join(of(*left), of(*right)),
        NodeKind::Ternary { then, otherwise, .. } => pending_join(of(*then), of(*otherwise)),
        NodeKind::Comma(items) => items.last().map_or(ValueType::Undefined, |last| of(*last)),
        NodeKind::Call(inv) => match &inv.inlined {
            Some(inlined) => table.raw_symbol(inlined.result),
            None => ValueType::Boxed,
        },
        NodeKind::New(_) => ValueType::Object,
        _ => return None,
    };
    Some(ty)
}

fn unary(op: UnaryOp) -> ValueType {
    match op {
        UnaryOp::Neg | UnaryOp::Plus => ValueType::Double,
        UnaryOp::Not => ValueType::Boolean,
        UnaryOp::BitNot => ValueType::Int32,
        UnaryOp::TypeOf => ValueType::String,
        UnaryOp::Void => ValueType::Undefined,
    }
}

/// Result type of a binary operator.
///
/// Arithmetic is typed `Double`: the storage admits every number, so an
/// `Int32` result needs no separate overflow check.
pub(crate) fn binary(op: BinaryOp, left: ValueType, right: ValueType) -> ValueType {
    use ValueType::*;
    match op {
        BinaryOp::Add => {
            if left == Unknown || right == Unknown {
                Unknown
            } else if left == String || right == String {
                String
            } else if is_primitive(left) && is_primitive(right) {
                Double
            } else {
                // Objects convert through user-visible hooks.
                Boxed
            }
        }
        BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod | BinaryOp::UShr => Double,
        BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor | BinaryOp::Shl | BinaryOp::Shr => Int32,
        BinaryOp::Lt
        | BinaryOp::Le
        | BinaryOp::Gt
        | BinaryOp::Ge
        | BinaryOp::Eq
        | BinaryOp::Ne
        | BinaryOp::StrictEq
        | BinaryOp::StrictNe => Boolean,
    }
}

fn is_primitive(ty: ValueType) -> bool {
    matches!(
        ty,
        ValueType::Undefined | ValueType::Null | ValueType::Boolean | ValueType::Int32 | ValueType::Double
    )
}

fn pending_join(a: ValueType, b: ValueType) -> ValueType {
    if a == ValueType::Unknown || b == ValueType::Unknown {
        ValueType::Unknown
    } else {
        a.join(b)
    }
}
