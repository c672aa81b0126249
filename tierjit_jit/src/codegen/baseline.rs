//! Baseline strategy: generic code, no instrumentation.

use super::{Emitter, Strategy, Tier};
use crate::error::JitResult;
use crate::lir::Inst;
use tierjit_compiler::NodeId;
use tierjit_compiler::ir::ProfileSlot;
use tierjit_runtime::FieldId;

/// First-invocation code.
#[derive(Debug, Clone, Copy, Default)]
pub struct Baseline;

impl Strategy for Baseline {
    fn tier(&self) -> Tier {
        Tier::Baseline
    }

    fn guarded_cast(&mut self, _em: &mut Emitter<'_>, _node: NodeId, _profile: ProfileSlot) -> JitResult<()> {
        Ok(())
    }

    fn load_property(&mut self, em: &mut Emitter<'_>, field: FieldId, _profile: ProfileSlot) -> JitResult<()> {
        em.emit(Inst::GetProperty {
            field,
            profile: None,
        })
    }

    fn store_property(&mut self, em: &mut Emitter<'_>, field: FieldId, _profile: ProfileSlot) -> JitResult<()> {
        em.emit(Inst::SetProperty {
            field,
            profile: None,
        })
    }

    fn load_global(&mut self, em: &mut Emitter<'_>, field: FieldId, _profile: ProfileSlot) -> JitResult<()> {
        em.emit(Inst::LoadGlobal {
            field,
            profile: None,
        })
    }

    fn call_profile(&self, _profile: ProfileSlot) -> Option<u32> {
        None
    }
}
