//! JIT error type.
//!
//! Script-level failures arrive as [`RuntimeError`]; analysis failures as
//! [`CompileError`]. The remaining variants are code generation or execution
//! invariants that only a bug in this crate can break.

use thiserror::Error;
use tierjit_compiler::{CompileError, NodeId, SymbolId};
use tierjit_runtime::{FunctionId, RuntimeError};

/// Result alias for code generation and execution.
pub type JitResult<T> = Result<T, JitError>;

#[derive(Debug, Clone, Error)]
pub enum JitError {
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    /// A jump target was never bound.
    #[error("label L{label} was never bound")]
    UnboundLabel { label: u32 },

    /// Two paths reach the same instruction with different stack depths,
    /// or a function ends with values left on the stack.
    #[error("stack imbalance at {pc}: expected depth {expected}, found {found}")]
    StackImbalance { pc: u32, expected: i32, found: i32 },

    /// An instruction popped an empty evaluation stack.
    #[error("evaluation stack underflow at {pc}")]
    StackUnderflow { pc: u32 },

    /// A frame-local symbol was never given a value slot.
    #[error("symbol {symbol} has no frame slot")]
    MissingSlot { symbol: SymbolId },

    /// A guarded cast has no matching position in the fallback code.
    #[error("no resume point for {node} in fallback code of {function}")]
    MissingResumePoint { function: FunctionId, node: NodeId },

    /// Speculative code has no fallback to resume in.
    #[error("no fallback code for {function}")]
    MissingFallback { function: FunctionId },

    /// A deoptimization was raised outside the code's protected region.
    #[error("deoptimization at {pc} outside the protected region of {function}")]
    UnprotectedDeopt { function: FunctionId, pc: u32 },

    /// An instruction names an inline cache or deopt site the code does not
    /// have.
    #[error("instruction {pc} of {function} refers to a missing table entry")]
    InvalidOperand { function: FunctionId, pc: u32 },

    /// Fallback code tried to deoptimize again.
    #[error("fallback code of {function} deoptimized")]
    NestedDeopt { function: FunctionId },

    /// No global function of that name exists.
    #[error("no function named '{0}'")]
    UnknownFunction(String),
}

impl JitError {
    /// Whether the error is an ordinary script exception rather than an
    /// engine fault.
    pub fn is_script_error(&self) -> bool {
        matches!(self, JitError::Runtime(_))
    }
}
