//! Function metadata.

use super::{NodeId, ScopeId, SymbolId};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU32, Ordering};
use tierjit_runtime::{FunctionId, ProfileCounts};

/// Analysis status; only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FunctionStatus {
    Unanalyzed = 0,
    Analyzed = 1,
}

/// Per-function metadata: body, parameters, sub-functions, counters.
#[derive(Debug)]
pub struct FunctionMeta {
    pub id: FunctionId,
    pub name: Arc<str>,
    /// The function's own scope (Program-tagged for the top level).
    pub scope: ScopeId,
    pub parent: Option<FunctionId>,
    pub params: Vec<SymbolId>,
    pub body: NodeId,
    /// Directly nested functions, in source order.
    pub sub_functions: Vec<FunctionId>,
    /// Function declarations initialized on entry.
    pub hoisted: Vec<NodeId>,
    /// Code evaluated by `eval`.
    pub is_eval_body: bool,
    pub profile_counts: ProfileCounts,
    status: AtomicU8,
    symbol_count: AtomicU32,
}

impl FunctionMeta {
    pub fn new(id: FunctionId, name: Arc<str>, scope: ScopeId, parent: Option<FunctionId>, body: NodeId) -> Self {
        Self {
            id,
            name,
            scope,
            parent,
            params: Vec::new(),
            body,
            sub_functions: Vec::new(),
            hoisted: Vec::new(),
            is_eval_body: false,
            profile_counts: ProfileCounts::default(),
            status: AtomicU8::new(FunctionStatus::Unanalyzed as u8),
            symbol_count: AtomicU32::new(0),
        }
    }

    #[inline]
    pub fn status(&self) -> FunctionStatus {
        match self.status.load(Ordering::Acquire) {
            0 => FunctionStatus::Unanalyzed,
            _ => FunctionStatus::Analyzed,
        }
    }

    #[inline]
    pub fn is_analyzed(&self) -> bool {
        self.status() == FunctionStatus::Analyzed
    }

    pub(crate) fn mark_analyzed(&self) {
        self.status
            .store(FunctionStatus::Analyzed as u8, Ordering::Release);
    }

    /// Number of frame value slots handed out so far.
    #[inline]
    pub fn symbol_count(&self) -> u32 {
        self.symbol_count.load(Ordering::Acquire)
    }

    /// Reserve `n` consecutive value slots, returning the first.
    pub(crate) fn reserve_slots(&self, n: u32) -> u32 {
        self.symbol_count.fetch_add(n, Ordering::AcqRel)
    }

    pub(crate) fn next_guard_profile(&mut self) -> u32 {
        let index = self.profile_counts.guards;
        self.profile_counts.guards += 1;
        index
    }

    pub(crate) fn next_map_profile(&mut self) -> u32 {
        let index = self.profile_counts.maps;
        self.profile_counts.maps += 1;
        index
    }

    pub(crate) fn next_call_profile(&mut self) -> u32 {
        let index = self.profile_counts.calls;
        self.profile_counts.calls += 1;
        index
    }
}

impl Clone for FunctionMeta {
    fn clone(&self) -> Self {
        let mut copy = FunctionMeta::new(self.id, self.name.clone(), self.scope, self.parent, self.body);
        copy.params = self.params.clone();
        copy.sub_functions = self.sub_functions.clone();
        copy.hoisted = self.hoisted.clone();
        copy.is_eval_body = self.is_eval_body;
        copy.profile_counts = self.profile_counts;
        if self.is_analyzed() {
            copy.mark_analyzed();
        }
        copy.reserve_slots(self.symbol_count());
        copy
    }
}
