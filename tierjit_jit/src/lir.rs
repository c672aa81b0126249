//! Low-level instruction set and assembler.
//!
//! Generated code targets a stack machine: operands are pushed on the
//! frame's evaluation stack and consumed by the instruction that uses them.
//! Calls expect `[callee, this, arg0, .., argN]` on the stack.
//!
//! The [`Assembler`] tracks the stack depth along every path and rejects
//! code where two paths meet with different depths, so a codegen bug is
//! reported at compile time instead of corrupting a frame at run time.

use crate::error::{JitError, JitResult};
use std::fmt;
use tierjit_compiler::ir::ConversionKind;
use tierjit_runtime::{BinaryOp, FieldId, FunctionId, UnaryOp, Value, ValueType};

// =============================================================================
// Labels
// =============================================================================

/// Jump target in a code buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(pub u32);

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

// =============================================================================
// Instructions
// =============================================================================

/// One instruction.
///
/// `profile` operands are indices into the executing function's profile
/// record; `cache` operands index the code's inline-cache table.
#[derive(Debug, Clone)]
pub enum Inst {
    // ---- stack ----
    Const(Value),
    Pop,
    Dup,
    Swap,

    // ---- frame ----
    LoadSlot(u32),
    StoreSlot(u32),
    /// Reset a slot to `undefined`.
    ClearSlot(u32),
    /// Push actual argument `n`, or `undefined` if it was not passed.
    LoadArg(u32),
    /// Fill the arguments slot with an array of the actual arguments.
    MaterializeArguments,
    LoadThis,
    /// Replace the context with a fresh one chained to it.
    EnterContext,
    /// Define an own binding on the current context.
    DeclareScoped(FieldId),
    LoadScoped(FieldId),
    StoreScoped(FieldId),
    LoadGlobal {
        field: FieldId,
        profile: Option<u32>,
    },
    LoadGlobalCached {
        field: FieldId,
        cache: u32,
    },
    StoreGlobal(FieldId),

    // ---- objects ----
    NewArray(u32),
    NewObject(Box<[FieldId]>),
    MakeClosure(FunctionId),
    GetProperty {
        field: FieldId,
        profile: Option<u32>,
    },
    GetPropertyCached {
        field: FieldId,
        cache: u32,
    },
    SetProperty {
        field: FieldId,
        profile: Option<u32>,
    },
    SetPropertyCached {
        field: FieldId,
        cache: u32,
    },
    GetIndex,
    SetIndex,

    // ---- operators ----
    Unary(UnaryOp),
    Binary(BinaryOp),
    /// Both operands are known to be numbers.
    NumericBinary(BinaryOp),
    /// Both operands are known to be 32-bit integers.
    Int32Binary(BinaryOp),
    /// Integer `+ - *` that deoptimizes when the result leaves the int32
    /// range (or would be negative zero).
    Int32Arith {
        op: BinaryOp,
        deopt: u32,
    },
    Convert(ConversionKind),

    // ---- profiling and speculation ----
    /// Record the type of the value on top of the stack.
    RecordType(u32),
    /// Check the value on top of the stack against `expected`.
    Guard {
        site: u32,
        expected: ValueType,
        /// Index into the code's deopt sites; `None` when deoptimization is
        /// disabled and a failure raises instead.
        deopt: Option<u32>,
    },

    // ---- control ----
    Jump(Label),
    JumpIfFalse(Label),
    JumpIfTrue(Label),
    /// Jump keeping the condition on the stack; pop it when falling through.
    JumpIfFalseKeep(Label),
    JumpIfTrueKeep(Label),
    Call {
        argc: u32,
        profile: Option<u32>,
    },
    New {
        argc: u32,
    },
    Return,
    Throw,
}

impl Inst {
    /// Values consumed and produced on the fall-through path.
    pub fn stack_effect(&self) -> (u32, u32) {
        match self {
            Inst::Const(_)
            | Inst::LoadSlot(_)
            | Inst::LoadArg(_)
            | Inst::LoadThis
            | Inst::LoadScoped(_)
            | Inst::LoadGlobal { .. }
            | Inst::LoadGlobalCached { .. }
            | Inst::MakeClosure(_) => (0, 1),
            Inst::Pop
            | Inst::StoreSlot(_)
            | Inst::StoreScoped(_)
            | Inst::StoreGlobal(_)
            | Inst::JumpIfFalse(_)
            | Inst::JumpIfTrue(_)
            | Inst::JumpIfFalseKeep(_)
            | Inst::JumpIfTrueKeep(_)
            | Inst::Return
            | Inst::Throw => (1, 0),
            Inst::Dup => (1, 2),
            Inst::Swap => (2, 2),
            Inst::ClearSlot(_)
            | Inst::MaterializeArguments
            | Inst::EnterContext
            | Inst::DeclareScoped(_)
            | Inst::RecordType(_)
            | Inst::Guard { .. }
            | Inst::Jump(_) => (0, 0),
            Inst::NewArray(n) => (*n, 1),
            Inst::NewObject(fields) => (fields.len() as u32, 1),
            Inst::GetProperty { .. }
            | Inst::GetPropertyCached { .. }
            | Inst::Unary(_)
            | Inst::Convert(_) => (1, 1),
            Inst::SetProperty { .. }
            | Inst::SetPropertyCached { .. }
            | Inst::GetIndex
            | Inst::Binary(_)
            | Inst::NumericBinary(_)
            | Inst::Int32Binary(_)
            | Inst::Int32Arith { .. } => (2, 1),
            Inst::SetIndex => (3, 1),
            Inst::Call { argc, .. } => (argc + 2, 1),
            Inst::New { argc } => (argc + 1, 1),
        }
    }

    /// Jump target and the stack depth change on the taken path, relative
    /// to the depth before the instruction.
    fn branch(&self) -> Option<(Label, i32)> {
        match self {
            Inst::Jump(label) => Some((*label, 0)),
            Inst::JumpIfFalse(label) | Inst::JumpIfTrue(label) => Some((*label, -1)),
            Inst::JumpIfFalseKeep(label) | Inst::JumpIfTrueKeep(label) => Some((*label, 0)),
            _ => None,
        }
    }

    /// Control never falls through to the next instruction.
    #[inline]
    pub fn is_terminator(&self) -> bool {
        matches!(self, Inst::Jump(_) | Inst::Return | Inst::Throw)
    }

    /// Whether this is a call to an unknown or non-inlined function.
    #[inline]
    pub fn is_call(&self) -> bool {
        matches!(self, Inst::Call { .. } | Inst::New { .. })
    }
}

// =============================================================================
// Assembler
// =============================================================================

#[derive(Debug, Clone, Copy, Default)]
struct LabelState {
    target: Option<u32>,
    depth: Option<i32>,
}

/// Finished instruction buffer.
#[derive(Debug)]
pub struct Assembly {
    pub code: Box<[Inst]>,
    /// Instruction index of every label.
    pub labels: Box<[u32]>,
    pub max_stack: u32,
}

/// Instruction buffer with label binding and stack-depth verification.
#[derive(Debug, Default)]
pub struct Assembler {
    code: Vec<Inst>,
    labels: Vec<LabelState>,
    depth: i32,
    max_depth: i32,
    reachable: bool,
}

impl Assembler {
    pub fn new() -> Self {
        Self {
            reachable: true,
            ..Default::default()
        }
    }

    /// Index the next instruction will get.
    #[inline]
    pub fn offset(&self) -> u32 {
        self.code.len() as u32
    }

    /// Current evaluation stack depth.
    #[inline]
    pub fn depth(&self) -> i32 {
        self.depth
    }

    pub fn create_label(&mut self) -> Label {
        self.labels.push(LabelState::default());
        Label(self.labels.len() as u32 - 1)
    }

    /// Bind `label` to the next instruction.
    pub fn bind(&mut self, label: Label) -> JitResult<()> {
        let pc = self.offset();
        let state = &mut self.labels[label.0 as usize];
        state.target = Some(pc);
        match state.depth {
            Some(expected) if self.reachable && expected != self.depth => {
                return Err(JitError::StackImbalance {
                    pc,
                    expected,
                    found: self.depth,
                });
            }
            Some(expected) => self.depth = expected,
            None => state.depth = Some(self.depth),
        }
        self.reachable = true;
        Ok(())
    }

    pub fn emit(&mut self, inst: Inst) -> JitResult<()> {
        let pc = self.offset();
        if let Some((label, delta)) = inst.branch() {
            let at_target = self.depth + delta;
            let state = &mut self.labels[label.0 as usize];
            match state.depth {
                Some(expected) if expected != at_target => {
                    return Err(JitError::StackImbalance {
                        pc,
                        expected,
                        found: at_target,
                    });
                }
                Some(_) => {}
                None => state.depth = Some(at_target),
            }
        }

        let (pops, pushes) = inst.stack_effect();
        self.depth -= pops as i32;
        if self.depth < 0 {
            return Err(JitError::StackUnderflow { pc });
        }
        self.depth += pushes as i32;
        self.max_depth = self.max_depth.max(self.depth);
        if inst.is_terminator() {
            self.reachable = false;
        }
        self.code.push(inst);
        Ok(())
    }

    /// Resolve labels and hand out the finished buffer.
    pub fn finalize(self) -> JitResult<Assembly> {
        if self.depth != 0 {
            return Err(JitError::StackImbalance {
                pc: self.offset(),
                expected: 0,
                found: self.depth,
            });
        }
        let labels = self
            .labels
            .iter()
            .enumerate()
            .map(|(i, state)| state.target.ok_or(JitError::UnboundLabel { label: i as u32 }))
            .collect::<JitResult<Vec<u32>>>()?;
        Ok(Assembly {
            code: self.code.into_boxed_slice(),
            labels: labels.into_boxed_slice(),
            max_stack: self.max_depth as u32,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_jump_resolves() {
        let mut asm = Assembler::new();
        let end = asm.create_label();
        asm.emit(Inst::Const(Value::Boolean(true))).unwrap();
        asm.emit(Inst::JumpIfFalse(end)).unwrap();
        asm.emit(Inst::Const(Value::Int32(1))).unwrap();
        asm.emit(Inst::Pop).unwrap();
        asm.bind(end).unwrap();
        asm.emit(Inst::Const(Value::Undefined)).unwrap();
        asm.emit(Inst::Return).unwrap();
        let assembly = asm.finalize().unwrap();
        assert_eq!(assembly.labels[end.0 as usize], 4);
        assert_eq!(assembly.max_stack, 1);
    }

    #[test]
    fn test_unbound_label_is_rejected() {
        let mut asm = Assembler::new();
        let nowhere = asm.create_label();
        asm.emit(Inst::Jump(nowhere)).unwrap();
        assert!(matches!(
            asm.finalize(),
            Err(JitError::UnboundLabel { label: 0 })
        ));
    }

    #[test]
    fn test_mismatched_depths_are_rejected() {
        let mut asm = Assembler::new();
        let join = asm.create_label();
        asm.emit(Inst::Const(Value::Boolean(true))).unwrap();
        asm.emit(Inst::JumpIfFalse(join)).unwrap();
        asm.emit(Inst::Const(Value::Int32(1))).unwrap();
        assert!(matches!(
            asm.bind(join),
            Err(JitError::StackImbalance {
                expected: 0,
                found: 1,
                ..
            })
        ));
    }

    #[test]
    fn test_keep_jumps_carry_the_condition() {
        // a || b
        let mut asm = Assembler::new();
        let end = asm.create_label();
        asm.emit(Inst::Const(Value::Int32(0))).unwrap();
        asm.emit(Inst::JumpIfTrueKeep(end)).unwrap();
        asm.emit(Inst::Const(Value::Int32(2))).unwrap();
        asm.bind(end).unwrap();
        assert_eq!(asm.depth(), 1);
        asm.emit(Inst::Return).unwrap();
        asm.finalize().unwrap();
    }

    #[test]
    fn test_underflow_is_rejected() {
        let mut asm = Assembler::new();
        assert!(matches!(
            asm.emit(Inst::Pop),
            Err(JitError::StackUnderflow { pc: 0 })
        ));
    }
}
