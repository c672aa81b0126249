//! Speculative strategy.
//!
//! Specializes code from the profile record:
//!
//! - guarded casts whose inferred type came from a hot profile type become
//!   [`Inst::Guard`]s, each with a deopt site when deoptimization is on
//! - property and global accesses with a monomorphic layout profile use an
//!   [`InlineCache`]
//! - int32 `+ - *` is checked for overflow instead of widened to doubles
//!
//! [`generate_speculative`] also produces the generic fallback code every
//! deopt site resumes in. The fallback is this same strategy with all
//! specialization switched off, so both share the shape of the IR walk.

use super::{CodeGenerator, Emitter, NativeCode, Strategy, Tier};
use crate::deopt::{DeoptReason, DeoptSite};
use crate::error::JitResult;
use crate::ic::InlineCache;
use crate::lir::Inst;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use tierjit_compiler::ir::ProfileSlot;
use tierjit_compiler::{Module, NodeId, TypeTable};
use tierjit_runtime::{FieldId, FunctionId, FunctionProfile, PropertyObservation, Runtime, ValueType};
use tracing::trace;

// =============================================================================
// Profile Lookup
// =============================================================================

/// Access to the profile records of all functions.
pub trait ProfileLookup {
    fn profile(&self, function: FunctionId) -> Option<Arc<FunctionProfile>>;
}

impl ProfileLookup for FxHashMap<FunctionId, Arc<FunctionProfile>> {
    fn profile(&self, function: FunctionId) -> Option<Arc<FunctionProfile>> {
        self.get(&function).cloned()
    }
}

impl<P: ProfileLookup + ?Sized> ProfileLookup for &P {
    fn profile(&self, function: FunctionId) -> Option<Arc<FunctionProfile>> {
        (**self).profile(function)
    }
}

// =============================================================================
// Strategy
// =============================================================================

/// What speculative code may do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpeculationOptions {
    /// Emit deopt sites; otherwise failed guards raise.
    pub deoptimize: bool,
    pub inline_caches: bool,
}

impl Default for SpeculationOptions {
    fn default() -> Self {
        Self {
            deoptimize: true,
            inline_caches: true,
        }
    }
}

pub struct Speculative<'p> {
    profiles: &'p dyn ProfileLookup,
    options: SpeculationOptions,
    fallback: bool,
}

impl<'p> Speculative<'p> {
    pub fn new(profiles: &'p dyn ProfileLookup, options: SpeculationOptions) -> Self {
        Self {
            profiles,
            options,
            fallback: false,
        }
    }

    /// Generic twin of the speculative code, used as the deopt target.
    pub fn fallback(profiles: &'p dyn ProfileLookup) -> Self {
        Self {
            profiles,
            options: SpeculationOptions {
                deoptimize: false,
                inline_caches: false,
            },
            fallback: true,
        }
    }

    /// Monomorphic layout seen at `slot`, looking through to the callee's
    /// record for sites cloned by inlining.
    fn observation(&self, function: FunctionId, slot: ProfileSlot) -> Option<PropertyObservation> {
        let lookup = |function: FunctionId, index: u32| {
            self.profiles
                .profile(function)?
                .map(index)?
                .monomorphic()
                .cloned()
        };
        lookup(function, slot.index).or_else(|| {
            let (origin, index) = slot.origin?;
            lookup(origin, index)
        })
    }
}

impl Strategy for Speculative<'_> {
    fn tier(&self) -> Tier {
        Tier::Speculative
    }

    fn is_fallback(&self) -> bool {
        self.fallback
    }

    fn guarded_cast(&mut self, em: &mut Emitter<'_>, node: NodeId, profile: ProfileSlot) -> JitResult<()> {
        if self.fallback {
            return Ok(());
        }
        let Some(expected) = em.types().guard_check(node) else {
            return Ok(());
        };
        let deopt = self.options.deoptimize.then(|| {
            em.add_deopt_site(DeoptSite {
                node,
                reason: DeoptReason::TypeGuard,
                expected,
                profile: Some(profile.index),
            })
        });
        trace!(%node, %expected, deopt = deopt.is_some(), "guard");
        em.emit(Inst::Guard {
            site: profile.index,
            expected,
            deopt,
        })
    }

    fn load_property(&mut self, em: &mut Emitter<'_>, field: FieldId, profile: ProfileSlot) -> JitResult<()> {
        if self.options.inline_caches {
            let cache = self
                .observation(em.function(), profile)
                .and_then(|observation| InlineCache::for_load(em.runtime(), field, &observation));
            if let Some(cache) = cache {
                let cache = em.add_cache(cache);
                return em.emit(Inst::GetPropertyCached { field, cache });
            }
        }
        em.emit(Inst::GetProperty {
            field,
            profile: None,
        })
    }

    fn store_property(&mut self, em: &mut Emitter<'_>, field: FieldId, profile: ProfileSlot) -> JitResult<()> {
        if self.options.inline_caches {
            let cache = self
                .observation(em.function(), profile)
                .and_then(|observation| InlineCache::for_store(field, &observation));
            if let Some(cache) = cache {
                let cache = em.add_cache(cache);
                return em.emit(Inst::SetPropertyCached { field, cache });
            }
        }
        em.emit(Inst::SetProperty {
            field,
            profile: None,
        })
    }

    fn load_global(&mut self, em: &mut Emitter<'_>, field: FieldId, profile: ProfileSlot) -> JitResult<()> {
        if self.options.inline_caches {
            // Globals are own properties of the global object.
            let cache = self
                .observation(em.function(), profile)
                .filter(|observation| observation.inherited.is_none())
                .and_then(|observation| InlineCache::for_load(em.runtime(), field, &observation));
            if let Some(cache) = cache {
                let cache = em.add_cache(cache);
                return em.emit(Inst::LoadGlobalCached { field, cache });
            }
        }
        em.emit(Inst::LoadGlobal {
            field,
            profile: None,
        })
    }

    fn call_profile(&self, profile: ProfileSlot) -> Option<u32> {
        Some(profile.index)
    }

    fn checked_arithmetic(&mut self, em: &mut Emitter<'_>, node: NodeId) -> Option<u32> {
        if self.fallback || !self.options.deoptimize {
            return None;
        }
        Some(em.add_deopt_site(DeoptSite {
            node,
            reason: DeoptReason::Overflow,
            expected: ValueType::Int32,
            profile: None,
        }))
    }
}

/// Speculative code for `function` with its fallback attached when
/// deoptimization is enabled.
pub fn generate_speculative(
    module: &Module,
    runtime: &Runtime,
    types: &TypeTable,
    function: FunctionId,
    profiles: &dyn ProfileLookup,
    options: SpeculationOptions,
) -> JitResult<NativeCode> {
    let mut code = CodeGenerator::new(
        module,
        runtime,
        types,
        function,
        Speculative::new(profiles, options),
    )
    .generate()?;
    if options.deoptimize {
        let generic = TypeTable::generic();
        let fallback = CodeGenerator::new(
            module,
            runtime,
            &generic,
            function,
            Speculative::fallback(profiles),
        )
        .generate()?;
        code.fallback = Some(Arc::new(fallback));
    }
    Ok(code)
}
