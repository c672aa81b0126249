//! Compilation errors.
//!
//! Everything here is an internal-consistency violation: a front-end bug or
//! a broken invariant from an earlier pass. Compilation of the affected
//! function aborts; no partial code is produced. Heuristic rejections
//! (ineligible inlines, types defaulted to the generic kind) are not errors.

use crate::ir::{NodeId, SymbolId, SymbolKind};
use std::sync::Arc;
use thiserror::Error;
use tierjit_runtime::FunctionId;

/// Result alias for compiler stages.
pub type CompileResult<T> = Result<T, CompileError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    /// A symbol reached a dispatch point in a kind that stage cannot accept.
    #[error("{stage}: symbol '{name}' ({symbol}) has unexpected kind {kind}")]
    UnexpectedSymbolKind {
        stage: &'static str,
        symbol: SymbolId,
        name: Arc<str>,
        kind: SymbolKind,
    },

    /// Resolution reached a function whose sub-function is still unanalyzed.
    #[error("function {function} resolved before sub-function {sub_function}")]
    SubFunctionNotAnalyzed {
        function: FunctionId,
        sub_function: FunctionId,
    },

    /// A function was compiled before scope resolution reached it.
    #[error("function {function} compiled before it was resolved")]
    Unresolved { function: FunctionId },

    /// A closed-over symbol lives in a scope that owns no frame.
    #[error("symbol '{name}' ({symbol}) is captured from a non-function scope")]
    ClosureOnBlockScope { symbol: SymbolId, name: Arc<str> },

    /// A node appeared where the current pass does not support it.
    #[error("{stage}: unsupported node {node}")]
    UnsupportedNode { stage: &'static str, node: NodeId },

    /// The IR builder was finished with functions or blocks still open.
    #[error("IR builder finished with {open} open scope(s)")]
    UnbalancedBuilder { open: usize },
}
