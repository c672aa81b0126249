//! Deoptimization: leaving speculative code mid-invocation.
//!
//! Speculative code is compiled together with generic fallback code for the
//! same function. Both come from the same IR walk, so every position that
//! can fail in the speculative code has a twin in the fallback code with an
//! identical frame: the same slots, the same context and the same values on
//! the evaluation stack.
//!
//! ```text
//!   speculative code                      fallback code
//!   ────────────────                      ─────────────
//!   LoadSlot x                            LoadSlot x
//!   Guard int32  ──── failure ─────┐      ◀── resume point of the cast
//!   Const 1                        │      Const 1
//!   NumericBinary +                └────▶ Binary +
//! ```
//!
//! The failing guard leaves its operand on the stack, the executor hands
//! the whole frame out as a [`DeoptState`], and [`Deoptimizer::materialize`]
//! maps it onto the fallback code's resume point. Nothing before the guard
//! is re-executed, so side effects happen exactly once.

use crate::codegen::NativeCode;
use crate::error::{JitError, JitResult};
use crate::frame::Frame;
use std::fmt;
use std::sync::Arc;
use tierjit_compiler::NodeId;
use tierjit_runtime::ValueType;
use tracing::debug;

// =============================================================================
// Deopt Reasons and Sites
// =============================================================================

/// Why speculative code gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeoptReason {
    /// A guarded value was not of the profiled type.
    TypeGuard,
    /// Integer arithmetic left the int32 range.
    Overflow,
}

impl DeoptReason {
    /// Get a human-readable description.
    #[inline]
    pub const fn description(&self) -> &'static str {
        match self {
            DeoptReason::TypeGuard => "type guard failed",
            DeoptReason::Overflow => "int32 overflow",
        }
    }
}

impl fmt::Display for DeoptReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// A position in speculative code that may deoptimize.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeoptSite {
    /// IR node whose resume point receives the frame.
    pub node: NodeId,
    pub reason: DeoptReason,
    /// Representation the speculative code assumed.
    pub expected: ValueType,
    /// Guard profile index, for type guards.
    pub profile: Option<u32>,
}

/// Where fallback code picks up a deoptimized frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResumePoint {
    pub pc: u32,
    /// Evaluation stack depth at `pc`.
    pub depth: u32,
}

/// A suspended speculative activation.
#[derive(Debug)]
pub struct DeoptState {
    /// Index into the code's deopt sites.
    pub index: u32,
    pub site: DeoptSite,
    /// Representation actually found.
    pub observed: ValueType,
    pub frame: Frame,
    /// Position of the failing instruction.
    pub pc: u32,
}

// =============================================================================
// Deoptimizer
// =============================================================================

/// Fallback code and frame to continue a deoptimized invocation with.
#[derive(Debug)]
pub struct Resumption {
    pub code: Arc<NativeCode>,
    pub frame: Frame,
    pub pc: u32,
}

/// Maps deoptimization states onto fallback code.
#[derive(Debug, Clone, Copy, Default)]
pub struct Deoptimizer;

impl Deoptimizer {
    pub fn new() -> Self {
        Self
    }

    /// Transfer the frame of a failed speculation into the fallback code of
    /// `code`.
    pub fn materialize(&self, code: &NativeCode, state: DeoptState) -> JitResult<Resumption> {
        let function = code.function;
        if code.is_fallback {
            return Err(JitError::NestedDeopt { function });
        }
        let protected = code
            .protected
            .as_ref()
            .is_some_and(|range| range.contains(&state.pc));
        if !protected {
            return Err(JitError::UnprotectedDeopt {
                function,
                pc: state.pc,
            });
        }
        let fallback = code
            .fallback
            .clone()
            .ok_or(JitError::MissingFallback { function })?;
        let resume = fallback
            .resume_points
            .get(&state.site.node)
            .copied()
            .ok_or(JitError::MissingResumePoint {
                function,
                node: state.site.node,
            })?;
        let depth = state.frame.stack.len() as i32;
        if depth != resume.depth as i32 {
            return Err(JitError::StackImbalance {
                pc: resume.pc,
                expected: resume.depth as i32,
                found: depth,
            });
        }

        debug!(
            function = %function,
            reason = %state.site.reason,
            expected = %state.site.expected,
            observed = %state.observed,
            from = state.pc,
            to = resume.pc,
            "materialized deoptimized frame"
        );
        Ok(Resumption {
            code: fallback,
            frame: state.frame,
            pc: resume.pc,
        })
    }
}
