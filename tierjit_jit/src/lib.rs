//! Code generation and execution tiers for the tierjit compiler core.
//!
//! Compiled functions are lowered to a compact stack-machine instruction
//! set ([`lir::Inst`]) and run by the [`exec::Executor`]. Three strategies
//! share one IR visitor:
//!
//! ```text
//!   Baseline ──▶ Profiling ──▶ Speculative ──┐
//!      ▲                                     │ guard failure
//!      │                                     ▼
//!      └──────── blacklist ◀──────── Deoptimizer ──▶ fallback code
//! ```
//!
//! - [`codegen`]: the shared visitor and the three strategies
//! - [`frame`]: frame layout and symbol storage mapping
//! - [`ic`]: monomorphic inline caches
//! - [`deopt`]: deoptimization sites and frame materialization
//! - [`engine`]: tiering, code cache and the public entry points

pub mod codegen;
pub mod config;
pub mod deopt;
pub mod engine;
pub mod error;
pub mod exec;
pub mod frame;
pub mod ic;
pub mod lir;

pub use codegen::{
    Baseline, CodeGenerator, NativeCode, ProfileLookup, Profiling, SpeculationOptions, Speculative,
    Strategy, Tier, generate_speculative,
};
pub use config::{EngineConfig, TierConfig};
pub use deopt::{DeoptReason, DeoptSite, DeoptState, Deoptimizer, ResumePoint, Resumption};
pub use engine::{Engine, FunctionStats, ProfileRegistry};
pub use error::{JitError, JitResult};
pub use exec::{ExecOutcome, Executor, Host};
pub use frame::{Frame, FrameLayout, Storage};
pub use ic::{CacheKind, InlineCache};
pub use lir::{Inst, Label};
