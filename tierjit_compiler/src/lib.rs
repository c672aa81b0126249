//! Analysis pipeline of the tierjit compiler core.
//!
//! Takes a function tree built with [`IrBuilder`] and prepares it for code
//! generation:
//!
//! ```text
//!   prepare ──▶ resolve ──▶ call targets ──▶ inline ──▶ infer ──▶ CompiledFunction
//!   (once)      (once)      └──────────── per compilation ─────────┘
//! ```
//!
//! - [`resolve`]: binding kinds for every symbol
//! - [`inline`]: splicing of small, statically known callees
//! - [`infer`]: value representations for symbols and expressions
//! - [`pipeline`]: the [`Compiler`] driving the stages through worker pools

pub mod config;
pub mod error;
pub mod infer;
pub mod inline;
pub mod ir;
pub mod pipeline;
pub mod pool;
pub mod resolve;

pub use config::CompilerConfig;
pub use error::{CompileError, CompileResult};
pub use infer::{ProfileSource, Signature, TypeInferer, TypeTable};
pub use inline::{InlineCost, Inliner};
pub use ir::{IrBuilder, Module, NodeId, NodeKind, ScopeId, SymbolId, SymbolKind};
pub use pipeline::{CompileOptions, CompiledFunction, Compiler};
pub use pool::AlgorithmPool;
pub use resolve::{CallTargetResolver, Resolver};
