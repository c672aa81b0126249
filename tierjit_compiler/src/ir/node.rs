//! IR nodes.
//!
//! Statements and expressions share one arena and one `NodeKind` sum type;
//! every pass dispatches with an exhaustive `match`.

use super::{NodeId, ScopeId, SymbolId};
use smallvec::SmallVec;
use std::sync::Arc;
use tierjit_runtime::{BinaryOp, FunctionId, UnaryOp, ValueType};

/// Jump target used by inlined returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LabelId(pub u32);

/// Literal constants.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Undefined,
    Null,
    Boolean(bool),
    Int32(i32),
    Double(f64),
    String(Arc<str>),
}

impl Literal {
    /// Intrinsic representation of the constant.
    pub fn value_type(&self) -> ValueType {
        match self {
            Literal::Undefined => ValueType::Undefined,
            Literal::Null => ValueType::Null,
            Literal::Boolean(_) => ValueType::Boolean,
            Literal::Int32(_) => ValueType::Int32,
            Literal::Double(_) => ValueType::Double,
            Literal::String(_) => ValueType::String,
        }
    }

    /// Numeric literal in its narrowest representation.
    pub fn number(n: f64) -> Literal {
        if n.fract() == 0.0
            && n >= i32::MIN as f64
            && n <= i32::MAX as f64
            && !(n == 0.0 && n.is_sign_negative())
        {
            Literal::Int32(n as i32)
        } else {
            Literal::Double(n)
        }
    }
}

/// Explicit coercions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionKind {
    ToNumber,
    ToBoolean,
    ToString,
    ToInt32,
    /// Callee coercion; raises if the value is not callable.
    ToFunction,
}

impl ConversionKind {
    pub const fn result_type(self) -> ValueType {
        match self {
            Self::ToNumber => ValueType::Double,
            Self::ToBoolean => ValueType::Boolean,
            Self::ToString => ValueType::String,
            Self::ToInt32 => ValueType::Int32,
            Self::ToFunction => ValueType::Function,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

/// A profile record index, plus the callee record it was cloned from when
/// the node came in through inlining.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfileSlot {
    pub index: u32,
    pub origin: Option<(FunctionId, u32)>,
}

impl ProfileSlot {
    pub const fn new(index: u32) -> Self {
        Self {
            index,
            origin: None,
        }
    }
}

/// A callee body spliced into a call site.
#[derive(Debug, Clone)]
pub struct InlinedBody {
    /// Private scope holding the renamed callee symbols.
    pub scope: ScopeId,
    /// Block with parameter initialisers and the labelled body.
    pub body: NodeId,
    /// Hidden symbol receiving the return value.
    pub result: SymbolId,
    pub callee: FunctionId,
    /// Function whose profile backs the cloned sites.
    pub profile_owner: FunctionId,
}

/// Call or `new` expression.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub callee: NodeId,
    pub args: Vec<NodeId>,
    pub profile: ProfileSlot,
    /// Statically known callee.
    pub target: Option<FunctionId>,
    pub inlined: Option<InlinedBody>,
}

/// Node payload.
#[derive(Debug, Clone)]
pub enum NodeKind {
    // ---- statements ----
    Block(Vec<NodeId>),
    /// `var x = init`; the initializer is a `WriteIdentifier`.
    VarDecl {
        symbol: SymbolId,
        init: Option<NodeId>,
    },
    ExprStmt(NodeId),
    If {
        cond: NodeId,
        then: NodeId,
        otherwise: Option<NodeId>,
    },
    While {
        cond: NodeId,
        body: NodeId,
    },
    DoWhile {
        body: NodeId,
        cond: NodeId,
    },
    For {
        init: Option<NodeId>,
        cond: Option<NodeId>,
        update: Option<NodeId>,
        body: NodeId,
    },
    Return(Option<NodeId>),
    Throw(NodeId),
    /// Statement followed by the position `label` names.
    Label {
        label: LabelId,
        body: NodeId,
    },
    Goto(LabelId),
    /// Hoisted function declaration binding `symbol`.
    FunctionDecl {
        function: FunctionId,
        symbol: SymbolId,
    },

    // ---- expressions ----
    Literal(Literal),
    This,
    ArrayLiteral(Vec<NodeId>),
    ObjectLiteral(Vec<(Arc<str>, NodeId)>),
    FunctionExpr(FunctionId),
    Paren(NodeId),
    /// Operand whose representation may be specialized from profile data.
    GuardedCast {
        operand: NodeId,
        profile: ProfileSlot,
    },
    Convert {
        kind: ConversionKind,
        operand: NodeId,
    },
    ReadIdentifier {
        symbol: SymbolId,
        profile: ProfileSlot,
    },
    WriteIdentifier {
        symbol: SymbolId,
        value: NodeId,
    },
    ReadProperty {
        object: NodeId,
        name: Arc<str>,
        profile: ProfileSlot,
    },
    WriteProperty {
        object: NodeId,
        name: Arc<str>,
        value: NodeId,
        profile: ProfileSlot,
    },
    ReadIndex {
        object: NodeId,
        index: NodeId,
    },
    WriteIndex {
        object: NodeId,
        index: NodeId,
        value: NodeId,
    },
    Unary {
        op: UnaryOp,
        operand: NodeId,
    },
    Binary {
        op: BinaryOp,
        left: NodeId,
        right: NodeId,
    },
    Logical {
        op: LogicalOp,
        left: NodeId,
        right: NodeId,
    },
    Ternary {
        cond: NodeId,
        then: NodeId,
        otherwise: NodeId,
    },
    Comma(Vec<NodeId>),
    Call(Invocation),
    New(Invocation),
}

impl NodeKind {
    /// Whether the node produces a value.
    pub fn is_expression(&self) -> bool {
        !matches!(
            self,
            NodeKind::Block(_)
                | NodeKind::VarDecl { .. }
                | NodeKind::ExprStmt(_)
                | NodeKind::If { .. }
                | NodeKind::While { .. }
                | NodeKind::DoWhile { .. }
                | NodeKind::For { .. }
                | NodeKind::Return(_)
                | NodeKind::Throw(_)
                | NodeKind::Label { .. }
                | NodeKind::Goto(_)
                | NodeKind::FunctionDecl { .. }
        )
    }

    /// Direct children in evaluation order. For an inlined invocation the
    /// spliced body replaces the callee and arguments.
    pub fn children(&self) -> SmallVec<[NodeId; 4]> {
        let mut out = SmallVec::new();
        match self {
            NodeKind::Block(items) | NodeKind::ArrayLiteral(items) | NodeKind::Comma(items) => {
                out.extend(items.iter().copied())
            }
            NodeKind::VarDecl { init, .. } => out.extend(*init),
            NodeKind::ExprStmt(e)
            | NodeKind::Throw(e)
            | NodeKind::Paren(e)
            | NodeKind::GuardedCast { operand: e, .. }
            | NodeKind::Convert { operand: e, .. }
            | NodeKind::Unary { operand: e, .. }
            | NodeKind::ReadProperty { object: e, .. }
            | NodeKind::WriteIdentifier { value: e, .. }
            | NodeKind::Label { body: e, .. } => out.push(*e),
            NodeKind::Return(e) => out.extend(*e),
            NodeKind::If {
                cond,
                then,
                otherwise,
            } => {
                out.push(*cond);
                out.push(*then);
                out.extend(*otherwise);
            }
            NodeKind::While { cond, body } => {
                out.push(*cond);
                out.push(*body);
            }
            NodeKind::DoWhile { body, cond } => {
                out.push(*body);
                out.push(*cond);
            }
            NodeKind::For {
                init,
                cond,
                update,
                body,
            } => {
                out.extend(*init);
                out.extend(*cond);
                out.push(*body);
                out.extend(*update);
            }
            NodeKind::ObjectLiteral(props) => out.extend(props.iter().map(|(_, v)| *v)),
            NodeKind::WriteProperty { object, value, .. } => {
                out.push(*object);
                out.push(*value);
            }
            NodeKind::ReadIndex { object, index } => {
                out.push(*object);
                out.push(*index);
            }
            NodeKind::WriteIndex {
                object,
                index,
                value,
            } => {
                out.push(*object);
                out.push(*index);
                out.push(*value);
            }
            NodeKind::Binary { left, right, .. } | NodeKind::Logical { left, right, .. } => {
                out.push(*left);
                out.push(*right);
            }
            NodeKind::Ternary {
                cond,
                then,
                otherwise,
            } => {
                out.push(*cond);
                out.push(*then);
                out.push(*otherwise);
            }
            NodeKind::Call(inv) | NodeKind::New(inv) => match &inv.inlined {
                Some(inlined) => out.push(inlined.body),
                None => {
                    out.push(inv.callee);
                    out.extend(inv.args.iter().copied());
                }
            },
            NodeKind::Literal(_)
            | NodeKind::This
            | NodeKind::FunctionExpr(_)
            | NodeKind::ReadIdentifier { .. }
            | NodeKind::Goto(_)
            | NodeKind::FunctionDecl { .. } => {}
        }
        out
    }
}

/// An IR node with its syntactic parent and lexical scope.
#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    pub parent: Option<NodeId>,
    pub scope: ScopeId,
}
