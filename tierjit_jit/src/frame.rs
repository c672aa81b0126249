//! Frame layout and symbol storage.
//!
//! Every invocation of generated code runs in a [`Frame`]. Baseline,
//! profiling, speculative and fallback code for one function share the same
//! layout, which is what lets a deoptimizing guard hand its frame to the
//! fallback code unchanged.
//!
//! # Frame Layout
//! ```text
//! ┌───────────────────────────────┐
//! │     Context                   │ ← innermost context object
//! ├───────────────────────────────┤
//! │     Arguments [slot 0]        │ ← filled when `arguments` is bound
//! ├───────────────────────────────┤
//! │     Value Slots [1..N]        │ ← Local and HiddenLocal symbols
//! ├───────────────────────────────┤
//! │     Evaluation Stack          │
//! └───────────────────────────────┘
//! ```

use crate::error::{JitError, JitResult};
use tierjit_compiler::ir::SymbolKind;
use tierjit_compiler::{Module, SymbolId};
use tierjit_runtime::{FieldId, FunctionId, ObjectRef, Runtime, Value};

/// Slot holding the materialized `arguments` array.
pub const ARGUMENTS_SLOT: u32 = 0;

/// First slot handed to symbols.
pub const FIRST_SYMBOL_SLOT: u32 = 1;

// =============================================================================
// Storage
// =============================================================================

/// Where generated code keeps a symbol's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Storage {
    /// Frame value slot.
    Slot(u32),
    /// Binding on the context chain (captured locals, parent locals and
    /// names only resolvable at runtime).
    Scoped(FieldId),
    /// Own property of the global object.
    Global(FieldId),
}

// =============================================================================
// Frame Layout
// =============================================================================

/// Slot assignment of one function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLayout {
    pub function: FunctionId,
    pub num_slots: u32,
}

impl FrameLayout {
    /// Layout of `function` as it stands after compilation. Inlining adds
    /// slots, so the layout must be taken after the function was compiled.
    pub fn of(module: &Module, function: FunctionId) -> Self {
        Self {
            function,
            num_slots: FIRST_SYMBOL_SLOT + module.function(function).symbol_count(),
        }
    }

    /// Storage of `symbol` in this function's code. Only the binding kind
    /// decides it; inferred types pick instructions, never slots, so every
    /// tier of a function shares one layout.
    pub fn storage(&self, module: &Module, runtime: &Runtime, symbol: SymbolId) -> JitResult<Storage> {
        let storage = module.storage_symbol(symbol);
        let state = module.symbol(storage).snapshot();
        match state.kind {
            SymbolKind::Local | SymbolKind::HiddenLocal => {
                let index = state.value_index.ok_or(JitError::MissingSlot { symbol: storage })?;
                Ok(Storage::Slot(FIRST_SYMBOL_SLOT + index))
            }
            SymbolKind::Arguments => Ok(Storage::Slot(ARGUMENTS_SLOT)),
            SymbolKind::Global => Ok(Storage::Global(module.symbol_field(storage, runtime.fields()))),
            SymbolKind::ClosedOnLocal
            | SymbolKind::ParentLocal
            | SymbolKind::Unknown
            | SymbolKind::OuterDuplicate => {
                Ok(Storage::Scoped(module.symbol_field(storage, runtime.fields())))
            }
        }
    }
}

// =============================================================================
// Frame
// =============================================================================

/// Activation record of one invocation.
#[derive(Debug, Clone)]
pub struct Frame {
    pub context: ObjectRef,
    pub slots: Vec<Value>,
    pub stack: Vec<Value>,
    pub this: Value,
    pub args: Vec<Value>,
}

impl Frame {
    pub fn new(layout: &FrameLayout, context: ObjectRef, this: Value, args: Vec<Value>) -> Self {
        Self {
            context,
            slots: vec![Value::Undefined; layout.num_slots as usize],
            stack: Vec::new(),
            this,
            args,
        }
    }

    #[inline]
    pub fn slot(&self, index: u32) -> Value {
        self.slots.get(index as usize).cloned().unwrap_or_default()
    }

    /// Write a slot, growing the frame if the layout was taken before a
    /// later compilation added slots.
    pub fn set_slot(&mut self, index: u32, value: Value) {
        let index = index as usize;
        if index >= self.slots.len() {
            self.slots.resize(index + 1, Value::Undefined);
        }
        self.slots[index] = value;
    }

    #[inline]
    pub fn arg(&self, index: u32) -> Value {
        self.args.get(index as usize).cloned().unwrap_or_default()
    }

    #[inline]
    pub fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    #[inline]
    pub fn pop(&mut self, pc: u32) -> JitResult<Value> {
        self.stack.pop().ok_or(JitError::StackUnderflow { pc })
    }

    #[inline]
    pub fn peek(&self, pc: u32) -> JitResult<&Value> {
        self.stack.last().ok_or(JitError::StackUnderflow { pc })
    }

    /// Pop `n` values, returned in push order.
    pub fn pop_n(&mut self, n: u32, pc: u32) -> JitResult<Vec<Value>> {
        let n = n as usize;
        if self.stack.len() < n {
            return Err(JitError::StackUnderflow { pc });
        }
        let at = self.stack.len() - n;
        Ok(self.stack.split_off(at))
    }
}
