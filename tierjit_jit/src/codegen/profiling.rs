//! Profiling strategy.
//!
//! Generic code that feeds the function's profile record: value types at
//! guarded casts, receiver layouts at property and global accesses, and
//! callees at call sites. Profile operands are the IR's own slot indices, so
//! the speculative tier reads back exactly the sites recorded here.

use super::{Emitter, Strategy, Tier};
use crate::error::JitResult;
use crate::lir::Inst;
use tierjit_compiler::NodeId;
use tierjit_compiler::ir::ProfileSlot;
use tierjit_runtime::FieldId;

#[derive(Debug, Clone, Copy, Default)]
pub struct Profiling;

impl Strategy for Profiling {
    fn tier(&self) -> Tier {
        Tier::Profiling
    }

    fn guarded_cast(&mut self, em: &mut Emitter<'_>, _node: NodeId, profile: ProfileSlot) -> JitResult<()> {
        em.emit(Inst::RecordType(profile.index))
    }

    fn load_property(&mut self, em: &mut Emitter<'_>, field: FieldId, profile: ProfileSlot) -> JitResult<()> {
        em.emit(Inst::GetProperty {
            field,
            profile: Some(profile.index),
        })
    }

    fn store_property(&mut self, em: &mut Emitter<'_>, field: FieldId, profile: ProfileSlot) -> JitResult<()> {
        em.emit(Inst::SetProperty {
            field,
            profile: Some(profile.index),
        })
    }

    fn load_global(&mut self, em: &mut Emitter<'_>, field: FieldId, profile: ProfileSlot) -> JitResult<()> {
        em.emit(Inst::LoadGlobal {
            field,
            profile: Some(profile.index),
        })
    }

    fn call_profile(&self, profile: ProfileSlot) -> Option<u32> {
        Some(profile.index)
    }
}
