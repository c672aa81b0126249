//! Instruction executor.
//!
//! Runs [`NativeCode`] on a [`Frame`]. Calls to script functions go back
//! through the [`Host`], which picks the tier of the callee; native
//! functions are called directly.
//!
//! A deoptimizing instruction does not unwind anything: the executor stops
//! with the frame exactly as the instruction found it and returns it in
//! [`ExecOutcome::Deopt`], leaving the transfer to fallback code to the
//! caller.

use crate::codegen::NativeCode;
use crate::deopt::{DeoptSite, DeoptState};
use crate::error::{JitError, JitResult};
use crate::frame::{ARGUMENTS_SLOT, Frame};
use crate::ic::InlineCache;
use crate::lir::Inst;
use std::sync::Arc;
use tierjit_compiler::ir::ConversionKind;
use tierjit_runtime::ops::{self, BinaryOp};
use tierjit_runtime::{
    Closure, FunctionProfile, JsObject, PropertyFlags, Runtime, RuntimeError, Value, ValueType,
};

/// Services generated code needs from its embedder.
pub trait Host {
    fn runtime(&self) -> &Runtime;

    /// Invoke a script function.
    fn call(&self, closure: &Arc<Closure>, this: Value, args: Vec<Value>) -> JitResult<Value>;
}

/// How an activation ended.
#[derive(Debug)]
pub enum ExecOutcome {
    Return(Value),
    /// A speculation failed; the frame is suspended at the failing
    /// instruction.
    Deopt(Box<DeoptState>),
}

/// Interprets generated code for one function.
pub struct Executor<'a, H: Host + ?Sized> {
    host: &'a H,
    /// Record the profiling instructions write into.
    profile: Option<&'a FunctionProfile>,
}

impl<'a, H: Host + ?Sized> Executor<'a, H> {
    pub fn new(host: &'a H, profile: Option<&'a FunctionProfile>) -> Self {
        Self { host, profile }
    }

    pub fn run(&self, code: &NativeCode, frame: Frame) -> JitResult<ExecOutcome> {
        self.resume(code, frame, 0)
    }

    /// Continue `code` at `pc` with a frame prepared for that position.
    pub fn resume(&self, code: &NativeCode, mut frame: Frame, mut pc: u32) -> JitResult<ExecOutcome> {
        let runtime = self.host.runtime();
        let function = code.function;
        let invalid = move |pc: u32| JitError::InvalidOperand { function, pc };

        while let Some(inst) = code.code.get(pc as usize) {
            let mut next = pc + 1;
            match inst {
                // ---- stack ----
                Inst::Const(value) => frame.push(value.clone()),
                Inst::Pop => {
                    frame.pop(pc)?;
                }
                Inst::Dup => {
                    let top = frame.peek(pc)?.clone();
                    frame.push(top);
                }
                Inst::Swap => {
                    let len = frame.stack.len();
                    if len < 2 {
                        return Err(JitError::StackUnderflow { pc });
                    }
                    frame.stack.swap(len - 1, len - 2);
                }

                // ---- frame ----
                Inst::LoadSlot(slot) => {
                    let value = frame.slot(*slot);
                    frame.push(value);
                }
                Inst::StoreSlot(slot) => {
                    let value = frame.pop(pc)?;
                    frame.set_slot(*slot, value);
                }
                Inst::ClearSlot(slot) => frame.set_slot(*slot, Value::Undefined),
                Inst::LoadArg(index) => {
                    let value = frame.arg(*index);
                    frame.push(value);
                }
                Inst::MaterializeArguments => {
                    let arguments = Value::new_array(frame.args.clone());
                    frame.set_slot(ARGUMENTS_SLOT, arguments);
                }
                Inst::LoadThis => {
                    let this = frame.this.clone();
                    frame.push(this);
                }
                Inst::EnterContext => {
                    frame.context = JsObject::new_ref(Some(frame.context.clone()));
                }
                Inst::DeclareScoped(field) => {
                    frame
                        .context
                        .write()
                        .define_own(*field, Value::Undefined, PropertyFlags::default_data());
                }
                Inst::LoadScoped(field) => {
                    let value = runtime.load_scoped(&frame.context, *field)?;
                    frame.push(value);
                }
                Inst::StoreScoped(field) => {
                    let value = frame.pop(pc)?;
                    runtime.store_scoped(&frame.context, *field, value);
                }
                Inst::LoadGlobal { field, profile } => {
                    let value = runtime.get_global(*field)?;
                    if let (Some(index), Some(record)) = (profile, self.profile) {
                        record.record_property(*index, runtime.global_observation(*field));
                    }
                    frame.push(value);
                }
                Inst::LoadGlobalCached { field, cache } => {
                    let ic = cache_at(code, *cache).ok_or_else(|| invalid(pc))?;
                    let value = match ic.load_global(runtime) {
                        Some(value) => value,
                        None => runtime.get_global(*field)?,
                    };
                    frame.push(value);
                }
                Inst::StoreGlobal(field) => {
                    let value = frame.pop(pc)?;
                    runtime.set_global(*field, value);
                }

                // ---- objects ----
                Inst::NewArray(count) => {
                    let items = frame.pop_n(*count, pc)?;
                    frame.push(Value::new_array(items));
                }
                Inst::NewObject(fields) => {
                    let values = frame.pop_n(fields.len() as u32, pc)?;
                    let object = JsObject::new_ref(None);
                    {
                        let mut object = object.write();
                        for (field, value) in fields.iter().zip(values) {
                            object.put_own(*field, value);
                        }
                    }
                    frame.push(Value::Object(object));
                }
                Inst::MakeClosure(function) => {
                    frame.push(Value::Function(Arc::new(Closure {
                        function: *function,
                        context: frame.context.clone(),
                        properties: JsObject::new_ref(None),
                    })));
                }
                Inst::GetProperty { field, profile } => {
                    let object = frame.pop(pc)?;
                    let (value, observation) = runtime.get_property_observed(&object, *field)?;
                    if let (Some(index), Some(record)) = (profile, self.profile) {
                        record.record_property(*index, observation);
                    }
                    frame.push(value);
                }
                Inst::GetPropertyCached { field, cache } => {
                    let ic = cache_at(code, *cache).ok_or_else(|| invalid(pc))?;
                    let object = frame.pop(pc)?;
                    let value = match ic.load(runtime, &object) {
                        Some(value) => value,
                        None => runtime.get_property(&object, *field)?,
                    };
                    frame.push(value);
                }
                Inst::SetProperty { field, profile } => {
                    let value = frame.pop(pc)?;
                    let object = frame.pop(pc)?;
                    let observation = runtime.set_property_observed(&object, *field, value.clone())?;
                    if let (Some(index), Some(record)) = (profile, self.profile) {
                        record.record_property(*index, observation);
                    }
                    frame.push(value);
                }
                Inst::SetPropertyCached { field, cache } => {
                    let ic = cache_at(code, *cache).ok_or_else(|| invalid(pc))?;
                    let value = frame.pop(pc)?;
                    let object = frame.pop(pc)?;
                    if let Err(missed) = ic.store(&object, value.clone()) {
                        runtime.set_property(&object, *field, missed)?;
                    }
                    frame.push(value);
                }
                Inst::GetIndex => {
                    let index = frame.pop(pc)?;
                    let object = frame.pop(pc)?;
                    frame.push(runtime.get_index(&object, &index)?);
                }
                Inst::SetIndex => {
                    let value = frame.pop(pc)?;
                    let index = frame.pop(pc)?;
                    let object = frame.pop(pc)?;
                    runtime.set_index(&object, &index, value.clone())?;
                    frame.push(value);
                }

                // ---- operators ----
                Inst::Unary(op) => {
                    let operand = frame.pop(pc)?;
                    frame.push(ops::unary(*op, &operand));
                }
                Inst::Binary(op) => {
                    let right = frame.pop(pc)?;
                    let left = frame.pop(pc)?;
                    frame.push(ops::binary(*op, &left, &right)?);
                }
                Inst::NumericBinary(op) => {
                    let right = frame.pop(pc)?;
                    let left = frame.pop(pc)?;
                    let result = match (left.as_number(), right.as_number()) {
                        (Some(a), Some(b)) => ops::numeric_binary(*op, a, b),
                        _ => ops::binary(*op, &left, &right)?,
                    };
                    frame.push(result);
                }
                Inst::Int32Binary(op) => {
                    let right = frame.pop(pc)?;
                    let left = frame.pop(pc)?;
                    let result = match (&left, &right) {
                        (Value::Int32(a), Value::Int32(b)) => ops::int32_binary(*op, *a, *b)?,
                        _ => ops::binary(*op, &left, &right)?,
                    };
                    frame.push(result);
                }
                Inst::Int32Arith { op, deopt } => {
                    let len = frame.stack.len();
                    if len < 2 {
                        return Err(JitError::StackUnderflow { pc });
                    }
                    let checked = match (&frame.stack[len - 2], &frame.stack[len - 1]) {
                        (Value::Int32(a), Value::Int32(b)) => Some(checked_int32(*op, *a, *b)),
                        _ => None,
                    };
                    match checked {
                        Some(Some(result)) => {
                            frame.stack.truncate(len - 2);
                            frame.push(Value::Int32(result));
                        }
                        Some(None) => {
                            let site = site_at(code, *deopt).ok_or_else(|| invalid(pc))?;
                            return Ok(ExecOutcome::Deopt(Box::new(DeoptState {
                                index: *deopt,
                                site,
                                observed: ValueType::Double,
                                frame,
                                pc,
                            })));
                        }
                        None => {
                            let right = frame.pop(pc)?;
                            let left = frame.pop(pc)?;
                            frame.push(ops::binary(*op, &left, &right)?);
                        }
                    }
                }
                Inst::Convert(kind) => {
                    let value = frame.pop(pc)?;
                    frame.push(convert(*kind, value)?);
                }

                // ---- profiling and speculation ----
                Inst::RecordType(index) => {
                    if let Some(record) = self.profile {
                        record.record_type(*index, frame.peek(pc)?.value_type());
                    }
                }
                Inst::Guard {
                    site,
                    expected,
                    deopt,
                } => {
                    let observed = frame.peek(pc)?.value_type();
                    if !expected.admits(observed) {
                        let Some(index) = *deopt else {
                            return Err(RuntimeError::SpeculationFailed {
                                site: *site,
                                expected: *expected,
                                observed,
                            }
                            .into());
                        };
                        let site = site_at(code, index).ok_or_else(|| invalid(pc))?;
                        return Ok(ExecOutcome::Deopt(Box::new(DeoptState {
                            index,
                            site,
                            observed,
                            frame,
                            pc,
                        })));
                    }
                }

                // ---- control ----
                Inst::Jump(label) => next = code.target(*label)?,
                Inst::JumpIfFalse(label) => {
                    if !frame.pop(pc)?.to_boolean() {
                        next = code.target(*label)?;
                    }
                }
                Inst::JumpIfTrue(label) => {
                    if frame.pop(pc)?.to_boolean() {
                        next = code.target(*label)?;
                    }
                }
                Inst::JumpIfFalseKeep(label) => {
                    if frame.peek(pc)?.to_boolean() {
                        frame.pop(pc)?;
                    } else {
                        next = code.target(*label)?;
                    }
                }
                Inst::JumpIfTrueKeep(label) => {
                    if frame.peek(pc)?.to_boolean() {
                        next = code.target(*label)?;
                    } else {
                        frame.pop(pc)?;
                    }
                }
                Inst::Call { argc, profile } => {
                    let args = frame.pop_n(*argc, pc)?;
                    let this = frame.pop(pc)?;
                    let callee = frame.pop(pc)?;
                    if let (Some(index), Some(record), Value::Function(closure)) =
                        (profile, self.profile, &callee)
                    {
                        record.record_call(*index, closure.function);
                    }
                    frame.push(self.invoke(&callee, this, args)?);
                }
                Inst::New { argc } => {
                    let args = frame.pop_n(*argc, pc)?;
                    let callee = frame.pop(pc)?;
                    frame.push(self.construct(&callee, args)?);
                }
                Inst::Return => return Ok(ExecOutcome::Return(frame.pop(pc)?)),
                Inst::Throw => return Err(RuntimeError::Thrown(frame.pop(pc)?).into()),
            }
            pc = next;
        }
        Ok(ExecOutcome::Return(Value::Undefined))
    }

    fn invoke(&self, callee: &Value, this: Value, args: Vec<Value>) -> JitResult<Value> {
        match callee {
            Value::Function(closure) => self.host.call(closure, this, args),
            Value::Native(native) => Ok((native.func)(&this, &args)?),
            other => Err(RuntimeError::type_error(format!("{other} is not a function")).into()),
        }
    }

    fn construct(&self, callee: &Value, args: Vec<Value>) -> JitResult<Value> {
        if !callee.is_callable() {
            return Err(RuntimeError::type_error(format!("{callee} is not a constructor")).into());
        }
        let runtime = self.host.runtime();
        let prototype = match runtime.get_property(callee, runtime.intern("prototype"))? {
            Value::Object(prototype) => Some(prototype),
            _ => None,
        };
        let object = JsObject::new_ref(prototype);
        let result = self.invoke(callee, Value::Object(object.clone()), args)?;
        if result.value_type().is_object_like() {
            Ok(result)
        } else {
            Ok(Value::Object(object))
        }
    }
}

#[inline]
fn cache_at(code: &NativeCode, index: u32) -> Option<&InlineCache> {
    code.ics.get(index as usize)
}

#[inline]
fn site_at(code: &NativeCode, index: u32) -> Option<DeoptSite> {
    code.deopt_sites.get(index as usize).cloned()
}

/// Int32 `+ - *`, or `None` when the result is not an int32. A zero product
/// with a negative operand is `-0`, which only a double can hold.
fn checked_int32(op: BinaryOp, a: i32, b: i32) -> Option<i32> {
    match op {
        BinaryOp::Add => a.checked_add(b),
        BinaryOp::Sub => a.checked_sub(b),
        BinaryOp::Mul => a.checked_mul(b).filter(|&r| r != 0 || (a >= 0 && b >= 0)),
        _ => None,
    }
}

fn convert(kind: ConversionKind, value: Value) -> JitResult<Value> {
    Ok(match kind {
        ConversionKind::ToNumber => Value::number(value.to_number()),
        ConversionKind::ToBoolean => Value::Boolean(value.to_boolean()),
        ConversionKind::ToString => Value::String(value.to_js_string()),
        ConversionKind::ToInt32 => Value::Int32(value.to_int32()),
        ConversionKind::ToFunction => {
            if !value.is_callable() {
                return Err(RuntimeError::type_error(format!("{value} is not a function")).into());
            }
            value
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::Tier;
    use crate::deopt::{DeoptReason, ResumePoint};
    use crate::frame::FrameLayout;
    use crate::lir::Assembler;
    use rustc_hash::FxHashMap;
    use tierjit_compiler::NodeId;
    use tierjit_runtime::{FunctionId, NativeFunction, ProfileConfig, ProfileCounts};

    struct NoCalls(Runtime);

    impl Host for NoCalls {
        fn runtime(&self) -> &Runtime {
            &self.0
        }

        fn call(&self, _: &Arc<Closure>, _: Value, _: Vec<Value>) -> JitResult<Value> {
            Err(RuntimeError::type_error("no script calls here").into())
        }
    }

    fn code_of(build: impl FnOnce(&mut Assembler), sites: Vec<DeoptSite>) -> NativeCode {
        let mut asm = Assembler::new();
        build(&mut asm);
        let assembly = asm.finalize().unwrap();
        NativeCode {
            function: FunctionId(1),
            tier: Tier::Speculative,
            is_fallback: false,
            code: assembly.code,
            labels: assembly.labels,
            layout: FrameLayout {
                function: FunctionId(1),
                num_slots: 2,
            },
            max_stack: assembly.max_stack,
            ics: Box::new([]),
            deopt_sites: sites.into_boxed_slice(),
            resume_points: FxHashMap::default(),
            protected: None,
            fallback: None,
        }
    }

    fn frame(runtime: &Runtime, args: Vec<Value>) -> Frame {
        let layout = FrameLayout {
            function: FunctionId(1),
            num_slots: 2,
        };
        Frame::new(&layout, runtime.global().clone(), Value::Undefined, args)
    }

    fn returned(outcome: ExecOutcome) -> Value {
        match outcome {
            ExecOutcome::Return(value) => value,
            ExecOutcome::Deopt(state) => panic!("unexpected deopt at {}", state.pc),
        }
    }

    #[test]
    fn test_loop_with_slots_and_jumps() {
        // s = 0; i = arg0; while (i) { s = s + i; i = i - 1 } return s
        let host = NoCalls(Runtime::new());
        let code = code_of(
            |asm| {
                let top = asm.create_label();
                let end = asm.create_label();
                asm.emit(Inst::Const(Value::Int32(0))).unwrap();
                asm.emit(Inst::StoreSlot(1)).unwrap();
                asm.emit(Inst::LoadArg(0)).unwrap();
                asm.emit(Inst::StoreSlot(2)).unwrap();
                asm.bind(top).unwrap();
                asm.emit(Inst::LoadSlot(2)).unwrap();
                asm.emit(Inst::JumpIfFalse(end)).unwrap();
                asm.emit(Inst::LoadSlot(1)).unwrap();
                asm.emit(Inst::LoadSlot(2)).unwrap();
                asm.emit(Inst::Binary(BinaryOp::Add)).unwrap();
                asm.emit(Inst::StoreSlot(1)).unwrap();
                asm.emit(Inst::LoadSlot(2)).unwrap();
                asm.emit(Inst::Const(Value::Int32(1))).unwrap();
                asm.emit(Inst::Binary(BinaryOp::Sub)).unwrap();
                asm.emit(Inst::StoreSlot(2)).unwrap();
                asm.emit(Inst::Jump(top)).unwrap();
                asm.bind(end).unwrap();
                asm.emit(Inst::LoadSlot(1)).unwrap();
                asm.emit(Inst::Return).unwrap();
            },
            vec![],
        );
        let outcome = Executor::new(&host, None)
            .run(&code, frame(&host.0, vec![Value::Int32(4)]))
            .unwrap();
        assert!(matches!(returned(outcome), Value::Int32(10)));
    }

    #[test]
    fn test_logical_keep_jumps() {
        let host = NoCalls(Runtime::new());
        let code = code_of(
            |asm| {
                let end = asm.create_label();
                asm.emit(Inst::LoadArg(0)).unwrap();
                asm.emit(Inst::JumpIfFalseKeep(end)).unwrap();
                asm.emit(Inst::LoadArg(1)).unwrap();
                asm.bind(end).unwrap();
                asm.emit(Inst::Return).unwrap();
            },
            vec![],
        );
        let exec = Executor::new(&host, None);
        let and = |a: Value, b: Value| returned(exec.run(&code, frame(&host.0, vec![a, b])).unwrap());
        assert!(matches!(and(Value::Int32(0), Value::Int32(5)), Value::Int32(0)));
        assert!(matches!(and(Value::Int32(1), Value::Int32(5)), Value::Int32(5)));
    }

    #[test]
    fn test_guard_deopts_with_operand_on_stack() {
        let host = NoCalls(Runtime::new());
        let site = DeoptSite {
            node: NodeId(4),
            reason: DeoptReason::TypeGuard,
            expected: ValueType::Int32,
            profile: Some(0),
        };
        let code = code_of(
            |asm| {
                asm.emit(Inst::LoadArg(0)).unwrap();
                asm.emit(Inst::Guard {
                    site: 0,
                    expected: ValueType::Int32,
                    deopt: Some(0),
                })
                .unwrap();
                asm.emit(Inst::Return).unwrap();
            },
            vec![site.clone()],
        );
        let exec = Executor::new(&host, None);
        assert!(matches!(
            returned(exec.run(&code, frame(&host.0, vec![Value::Int32(2)])).unwrap()),
            Value::Int32(2)
        ));

        let ExecOutcome::Deopt(state) = exec.run(&code, frame(&host.0, vec![Value::string("x")])).unwrap() else {
            panic!("string should fail the int32 guard");
        };
        assert_eq!(state.pc, 1);
        assert_eq!(state.site, site);
        assert_eq!(state.observed, ValueType::String);
        assert_eq!(state.frame.stack.len(), 1);
    }

    #[test]
    fn test_guard_without_deopt_raises() {
        let host = NoCalls(Runtime::new());
        let code = code_of(
            |asm| {
                asm.emit(Inst::LoadArg(0)).unwrap();
                asm.emit(Inst::Guard {
                    site: 7,
                    expected: ValueType::Int32,
                    deopt: None,
                })
                .unwrap();
                asm.emit(Inst::Return).unwrap();
            },
            vec![],
        );
        let err = Executor::new(&host, None)
            .run(&code, frame(&host.0, vec![Value::Null]))
            .unwrap_err();
        assert!(matches!(
            err,
            JitError::Runtime(RuntimeError::SpeculationFailed {
                site: 7,
                expected: ValueType::Int32,
                observed: ValueType::Null,
            })
        ));
    }

    #[test]
    fn test_int32_arith_overflow_deopts() {
        let host = NoCalls(Runtime::new());
        let site = DeoptSite {
            node: NodeId(9),
            reason: DeoptReason::Overflow,
            expected: ValueType::Int32,
            profile: None,
        };
        let code = code_of(
            |asm| {
                asm.emit(Inst::LoadArg(0)).unwrap();
                asm.emit(Inst::LoadArg(1)).unwrap();
                asm.emit(Inst::Int32Arith {
                    op: BinaryOp::Mul,
                    deopt: 0,
                })
                .unwrap();
                asm.emit(Inst::Return).unwrap();
            },
            vec![site],
        );
        let exec = Executor::new(&host, None);
        let run = |a: Value, b: Value| exec.run(&code, frame(&host.0, vec![a, b])).unwrap();

        assert!(matches!(returned(run(Value::Int32(6), Value::Int32(7))), Value::Int32(42)));
        // Non-int operands take the generic path.
        assert!(matches!(returned(run(Value::Double(1.5), Value::Int32(2))), Value::Int32(3)));
        for (a, b) in [(i32::MAX, 2), (0, -1)] {
            let ExecOutcome::Deopt(state) = run(Value::Int32(a), Value::Int32(b)) else {
                panic!("{a} * {b} should deoptimize");
            };
            assert_eq!(state.frame.stack.len(), 2);
            assert_eq!(state.site.reason, DeoptReason::Overflow);
        }
    }

    #[test]
    fn test_profiling_records_types_and_native_calls() {
        let host = NoCalls(Runtime::new());
        let profile = FunctionProfile::new(
            FunctionId(1),
            ProfileCounts {
                guards: 1,
                maps: 0,
                calls: 1,
            },
            ProfileConfig::default(),
        );
        fn twice(_: &Value, args: &[Value]) -> tierjit_runtime::RuntimeResult<Value> {
            Ok(Value::number(args.first().map_or(0.0, Value::to_number) * 2.0))
        }
        let native = Value::Native(NativeFunction {
            name: "twice",
            func: twice,
        });
        let code = code_of(
            |asm| {
                asm.emit(Inst::Const(native)).unwrap();
                asm.emit(Inst::Const(Value::Undefined)).unwrap();
                asm.emit(Inst::LoadArg(0)).unwrap();
                asm.emit(Inst::RecordType(0)).unwrap();
                asm.emit(Inst::Call {
                    argc: 1,
                    profile: Some(0),
                })
                .unwrap();
                asm.emit(Inst::Return).unwrap();
            },
            vec![],
        );
        let exec = Executor::new(&host, Some(&profile));
        let result = returned(exec.run(&code, frame(&host.0, vec![Value::Int32(21)])).unwrap());
        assert!(matches!(result, Value::Int32(42)));
        assert_eq!(profile.hot_type(0), Some(ValueType::Int32));
        // Natives are not script callees.
        assert_eq!(profile.call(0).and_then(|c| c.target()), None);
    }

    #[test]
    fn test_calling_non_function_and_throw() {
        let host = NoCalls(Runtime::new());
        let code = code_of(
            |asm| {
                asm.emit(Inst::Const(Value::Int32(1))).unwrap();
                asm.emit(Inst::Const(Value::Undefined)).unwrap();
                asm.emit(Inst::Call { argc: 0, profile: None }).unwrap();
                asm.emit(Inst::Return).unwrap();
            },
            vec![],
        );
        let err = Executor::new(&host, None).run(&code, frame(&host.0, vec![])).unwrap_err();
        assert!(matches!(err, JitError::Runtime(RuntimeError::Type(_))));

        let code = code_of(
            |asm| {
                asm.emit(Inst::Const(Value::string("boom"))).unwrap();
                asm.emit(Inst::Throw).unwrap();
            },
            vec![],
        );
        let err = Executor::new(&host, None).run(&code, frame(&host.0, vec![])).unwrap_err();
        assert!(err.is_script_error());
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn test_resume_continues_mid_code() {
        let host = NoCalls(Runtime::new());
        let code = code_of(
            |asm| {
                asm.emit(Inst::LoadArg(0)).unwrap();
                asm.emit(Inst::Const(Value::Int32(1))).unwrap();
                asm.emit(Inst::Binary(BinaryOp::Add)).unwrap();
                asm.emit(Inst::Return).unwrap();
            },
            vec![],
        );
        let resume = ResumePoint { pc: 1, depth: 1 };
        let mut frame = frame(&host.0, vec![]);
        frame.push(Value::string("x"));
        let outcome = Executor::new(&host, None).resume(&code, frame, resume.pc).unwrap();
        assert_eq!(returned(outcome).to_string(), "x1");
    }
}
