//! Code generation driver.
//!
//! One IR walk serves every tier. [`CodeGenerator`] lowers statements and
//! expressions to [`Inst`]s and asks its [`Strategy`] only at the points
//! where tiers differ:
//!
//! ```text
//!                    Baseline        Profiling          Speculative
//!   guarded cast     -               RecordType         Guard (+ deopt site)
//!   property read    GetProperty     GetProperty+prof   GetPropertyCached
//!   property write   SetProperty     SetProperty+prof   SetPropertyCached
//!   global read      LoadGlobal      LoadGlobal+prof    LoadGlobalCached
//!   int32 + - *      NumericBinary   NumericBinary      Int32Arith (+ deopt site)
//! ```
//!
//! The flow for one function is:
//!
//! 1. Compute the frame layout (after inlining, which adds slots)
//! 2. Emit the prologue: context, `arguments`, parameters, hoisted functions
//! 3. Walk the body
//! 4. Emit the implicit `return undefined`
//! 5. Finalize: resolve labels, verify stack depths, compute the protected region

mod baseline;
mod profiling;
mod speculative;

pub use baseline::Baseline;
pub use profiling::Profiling;
pub use speculative::{ProfileLookup, SpeculationOptions, Speculative, generate_speculative};

use crate::deopt::{DeoptSite, ResumePoint};
use crate::error::{JitError, JitResult};
use crate::frame::{FrameLayout, Storage};
use crate::ic::InlineCache;
use crate::lir::{Assembler, Inst, Label};
use rustc_hash::FxHashMap;
use std::fmt;
use std::ops::Range;
use std::sync::Arc;
use tierjit_compiler::ir::{InlinedBody, Invocation, LabelId, Literal, LogicalOp, ProfileSlot, ScopeFlags};
use tierjit_compiler::{CompileError, Module, NodeId, NodeKind, SymbolId, SymbolKind, TypeTable};
use tierjit_runtime::{BinaryOp, FieldId, FunctionId, Runtime, Value, ValueType};
use tracing::debug;

// =============================================================================
// Tiers
// =============================================================================

/// Execution tier of a piece of generated code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Tier {
    /// Generic code, no instrumentation.
    Baseline,
    /// Generic code recording types, layouts and callees.
    Profiling,
    /// Code specialized from profiles, protected by guards.
    Speculative,
}

impl Tier {
    pub const fn name(self) -> &'static str {
        match self {
            Tier::Baseline => "baseline",
            Tier::Profiling => "profiling",
            Tier::Speculative => "speculative",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Generated Code
// =============================================================================

/// Executable code for one function at one tier.
#[derive(Debug)]
pub struct NativeCode {
    pub function: FunctionId,
    pub tier: Tier,
    /// Generic code a speculative sibling deoptimizes into.
    pub is_fallback: bool,
    pub code: Box<[Inst]>,
    /// Instruction index of every label.
    pub labels: Box<[u32]>,
    pub layout: FrameLayout,
    pub max_stack: u32,
    pub ics: Box<[InlineCache]>,
    pub deopt_sites: Box<[DeoptSite]>,
    /// Positions where a deoptimized frame can continue.
    pub resume_points: FxHashMap<NodeId, ResumePoint>,
    /// Instructions that may deoptimize.
    pub protected: Option<Range<u32>>,
    pub fallback: Option<Arc<NativeCode>>,
}

impl NativeCode {
    /// Instruction index of `label`.
    #[inline]
    pub fn target(&self, label: Label) -> JitResult<u32> {
        self.labels
            .get(label.0 as usize)
            .copied()
            .ok_or(JitError::UnboundLabel { label: label.0 })
    }

    pub fn count(&self, predicate: impl Fn(&Inst) -> bool) -> usize {
        self.code.iter().filter(|inst| predicate(inst)).count()
    }

    /// Out-of-line calls left in the code.
    pub fn call_count(&self) -> usize {
        self.count(Inst::is_call)
    }

    pub fn guard_count(&self) -> usize {
        self.count(|inst| matches!(inst, Inst::Guard { .. }))
    }

    pub fn cached_access_count(&self) -> usize {
        self.count(|inst| {
            matches!(
                inst,
                Inst::GetPropertyCached { .. }
                    | Inst::SetPropertyCached { .. }
                    | Inst::LoadGlobalCached { .. }
            )
        })
    }
}

// =============================================================================
// Strategy
// =============================================================================

/// Tier-specific lowering decisions.
pub trait Strategy {
    fn tier(&self) -> Tier;

    fn is_fallback(&self) -> bool {
        false
    }

    /// Called with the guarded operand on top of the stack.
    fn guarded_cast(&mut self, em: &mut Emitter<'_>, node: NodeId, profile: ProfileSlot) -> JitResult<()>;

    /// `[object] -> [value]`
    fn load_property(&mut self, em: &mut Emitter<'_>, field: FieldId, profile: ProfileSlot) -> JitResult<()>;

    /// `[object, value] -> [value]`
    fn store_property(&mut self, em: &mut Emitter<'_>, field: FieldId, profile: ProfileSlot) -> JitResult<()>;

    /// `[] -> [value]`
    fn load_global(&mut self, em: &mut Emitter<'_>, field: FieldId, profile: ProfileSlot) -> JitResult<()>;

    /// Call profile index the call instruction records into, if any.
    fn call_profile(&self, profile: ProfileSlot) -> Option<u32>;

    /// Deopt site for overflow-checked integer arithmetic at `node`, or
    /// `None` to use plain numeric arithmetic.
    fn checked_arithmetic(&mut self, _em: &mut Emitter<'_>, _node: NodeId) -> Option<u32> {
        None
    }
}

// =============================================================================
// Emitter
// =============================================================================

/// Code buffer plus the side tables filled while walking one function.
pub struct Emitter<'a> {
    module: &'a Module,
    runtime: &'a Runtime,
    types: &'a TypeTable,
    function: FunctionId,
    layout: FrameLayout,
    asm: Assembler,
    labels: FxHashMap<LabelId, Label>,
    ics: Vec<InlineCache>,
    deopt_sites: Vec<DeoptSite>,
    resume_points: FxHashMap<NodeId, ResumePoint>,
}

impl<'a> Emitter<'a> {
    #[inline]
    pub fn module(&self) -> &'a Module {
        self.module
    }

    #[inline]
    pub fn runtime(&self) -> &'a Runtime {
        self.runtime
    }

    #[inline]
    pub fn types(&self) -> &'a TypeTable {
        self.types
    }

    #[inline]
    pub fn function(&self) -> FunctionId {
        self.function
    }

    #[inline]
    pub fn emit(&mut self, inst: Inst) -> JitResult<()> {
        self.asm.emit(inst)
    }

    /// Register an inline cache, returning its index.
    pub fn add_cache(&mut self, cache: InlineCache) -> u32 {
        self.ics.push(cache);
        self.ics.len() as u32 - 1
    }

    /// Register a deopt site, returning its index.
    pub fn add_deopt_site(&mut self, site: DeoptSite) -> u32 {
        self.deopt_sites.push(site);
        self.deopt_sites.len() as u32 - 1
    }

    fn storage(&self, symbol: SymbolId) -> JitResult<Storage> {
        self.layout.storage(self.module, self.runtime, symbol)
    }

    fn label(&mut self, label: LabelId) -> Label {
        if let Some(&mapped) = self.labels.get(&label) {
            return mapped;
        }
        let mapped = self.asm.create_label();
        self.labels.insert(label, mapped);
        mapped
    }

    /// Remember the current position as where `node` resumes.
    fn mark_resume(&mut self, node: NodeId) {
        let point = ResumePoint {
            pc: self.asm.offset(),
            depth: self.asm.depth() as u32,
        };
        self.resume_points.insert(node, point);
    }
}

// =============================================================================
// Code Generator
// =============================================================================

/// Lowers one function with strategy `S`.
pub struct CodeGenerator<'a, S> {
    em: Emitter<'a>,
    strategy: S,
}

impl<'a, S: Strategy> CodeGenerator<'a, S> {
    pub fn new(
        module: &'a Module,
        runtime: &'a Runtime,
        types: &'a TypeTable,
        function: FunctionId,
        strategy: S,
    ) -> Self {
        Self {
            em: Emitter {
                module,
                runtime,
                types,
                function,
                layout: FrameLayout::of(module, function),
                asm: Assembler::new(),
                labels: FxHashMap::default(),
                ics: Vec::new(),
                deopt_sites: Vec::new(),
                resume_points: FxHashMap::default(),
            },
            strategy,
        }
    }

    pub fn generate(mut self) -> JitResult<NativeCode> {
        let body = self.em.module.function(self.em.function).body;
        self.prologue()?;
        self.statement(body)?;
        self.em.emit(Inst::Const(Value::Undefined))?;
        self.em.emit(Inst::Return)?;

        let Emitter {
            module,
            function,
            layout,
            asm,
            ics,
            deopt_sites,
            resume_points,
            ..
        } = self.em;
        let assembly = asm.finalize()?;
        let protected = protected_region(&assembly.code);
        let tier = self.strategy.tier();

        debug!(
            function = %module.function(function).name,
            tier = %tier,
            fallback = self.strategy.is_fallback(),
            insts = assembly.code.len(),
            ics = ics.len(),
            deopt_sites = deopt_sites.len(),
            "generated code"
        );
        Ok(NativeCode {
            function,
            tier,
            is_fallback: self.strategy.is_fallback(),
            code: assembly.code,
            labels: assembly.labels,
            layout,
            max_stack: assembly.max_stack,
            ics: ics.into_boxed_slice(),
            deopt_sites: deopt_sites.into_boxed_slice(),
            resume_points,
            protected,
            fallback: None,
        })
    }

    // =========================================================================
    // Prologue and Storage
    // =========================================================================

    fn prologue(&mut self) -> JitResult<()> {
        let module = self.em.module;
        let meta = module.function(self.em.function);
        let scope = module.scope(meta.scope);

        // The Program runs in the global object itself.
        if !scope.is_program() && scope.has(ScopeFlags::HAS_CLOSED_ON_SYMBOL) {
            self.em.emit(Inst::EnterContext)?;
            for &symbol in &scope.symbols {
                if module.symbol(symbol).kind() == SymbolKind::ClosedOnLocal {
                    let field = module.symbol_field(symbol, self.em.runtime.fields());
                    self.em.emit(Inst::DeclareScoped(field))?;
                }
            }
        }
        if scope.has(ScopeFlags::HAS_ARGUMENTS_SYMBOL) {
            self.em.emit(Inst::MaterializeArguments)?;
        }
        for (i, &param) in meta.params.iter().enumerate() {
            self.em.emit(Inst::LoadArg(i as u32))?;
            self.store(param)?;
        }
        for &decl in &meta.hoisted {
            if let NodeKind::FunctionDecl { function, symbol } = module.node(decl).kind {
                self.em.emit(Inst::MakeClosure(function))?;
                self.store(symbol)?;
            }
        }
        Ok(())
    }

    /// `[value] -> []`
    fn store(&mut self, symbol: SymbolId) -> JitResult<()> {
        let inst = match self.em.storage(symbol)? {
            Storage::Slot(slot) => Inst::StoreSlot(slot),
            Storage::Scoped(field) => Inst::StoreScoped(field),
            Storage::Global(field) => Inst::StoreGlobal(field),
        };
        self.em.emit(inst)
    }

    /// `[] -> [value]`
    fn load(&mut self, symbol: SymbolId, profile: ProfileSlot) -> JitResult<()> {
        match self.em.storage(symbol)? {
            Storage::Slot(slot) => self.em.emit(Inst::LoadSlot(slot)),
            Storage::Scoped(field) => self.em.emit(Inst::LoadScoped(field)),
            Storage::Global(field) => self.strategy.load_global(&mut self.em, field, profile),
        }
    }

    fn intern(&self, name: &str) -> FieldId {
        self.em.runtime.intern(name)
    }

    // =========================================================================
    // Statements
    // =========================================================================

    fn statement(&mut self, node: NodeId) -> JitResult<()> {
        let module = self.em.module;
        match &module.node(node).kind {
            NodeKind::Block(items) => {
                for &item in items {
                    self.statement(item)?;
                }
            }
            NodeKind::VarDecl { init, .. } => {
                if let Some(init) = *init {
                    self.effect(init)?;
                }
            }
            NodeKind::ExprStmt(expr) => self.effect(*expr)?,
            NodeKind::If {
                cond,
                then,
                otherwise,
            } => {
                let else_label = self.em.asm.create_label();
                self.expression(*cond)?;
                self.em.emit(Inst::JumpIfFalse(else_label))?;
                self.statement(*then)?;
                match otherwise {
                    Some(otherwise) => {
                        let end = self.em.asm.create_label();
                        self.em.emit(Inst::Jump(end))?;
                        self.em.asm.bind(else_label)?;
                        self.statement(*otherwise)?;
                        self.em.asm.bind(end)?;
                    }
                    None => self.em.asm.bind(else_label)?,
                }
            }
            NodeKind::While { cond, body } => {
                let top = self.em.asm.create_label();
                let end = self.em.asm.create_label();
                self.em.asm.bind(top)?;
                self.expression(*cond)?;
                self.em.emit(Inst::JumpIfFalse(end))?;
                self.statement(*body)?;
                self.em.emit(Inst::Jump(top))?;
                self.em.asm.bind(end)?;
            }
            NodeKind::DoWhile { body, cond } => {
                let top = self.em.asm.create_label();
                self.em.asm.bind(top)?;
                self.statement(*body)?;
                self.expression(*cond)?;
                self.em.emit(Inst::JumpIfTrue(top))?;
            }
            NodeKind::For {
                init,
                cond,
                update,
                body,
            } => {
                if let Some(init) = *init {
                    self.effect(init)?;
                }
                let top = self.em.asm.create_label();
                let end = self.em.asm.create_label();
                self.em.asm.bind(top)?;
                if let Some(cond) = *cond {
                    self.expression(cond)?;
                    self.em.emit(Inst::JumpIfFalse(end))?;
                }
                self.statement(*body)?;
                if let Some(update) = *update {
                    self.effect(update)?;
                }
                self.em.emit(Inst::Jump(top))?;
                self.em.asm.bind(end)?;
            }
            NodeKind::Return(value) => {
                match *value {
                    Some(value) => self.expression(value)?,
                    None => self.em.emit(Inst::Const(Value::Undefined))?,
                }
                self.em.emit(Inst::Return)?;
            }
            NodeKind::Throw(value) => {
                self.expression(*value)?;
                self.em.emit(Inst::Throw)?;
            }
            NodeKind::Label { label, body } => {
                let target = self.em.label(*label);
                self.statement(*body)?;
                self.em.asm.bind(target)?;
            }
            NodeKind::Goto(label) => {
                let target = self.em.label(*label);
                self.em.emit(Inst::Jump(target))?;
            }
            // Initialized in the prologue.
            NodeKind::FunctionDecl { .. } => {}
            _ => self.effect(node)?,
        }
        Ok(())
    }

    /// Evaluate for side effects only.
    fn effect(&mut self, node: NodeId) -> JitResult<()> {
        if self.em.module.node(node).kind.is_expression() {
            self.expression(node)?;
            self.em.emit(Inst::Pop)
        } else {
            self.statement(node)
        }
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    /// `[] -> [value]`
    fn expression(&mut self, node: NodeId) -> JitResult<()> {
        let module = self.em.module;
        match &module.node(node).kind {
            NodeKind::Literal(literal) => self.em.emit(Inst::Const(literal_value(literal))),
            NodeKind::This => self.em.emit(Inst::LoadThis),
            NodeKind::ArrayLiteral(items) => {
                for &item in items {
                    self.expression(item)?;
                }
                self.em.emit(Inst::NewArray(items.len() as u32))
            }
            NodeKind::ObjectLiteral(properties) => {
                for (_, value) in properties {
                    self.expression(*value)?;
                }
                let fields = properties.iter().map(|(name, _)| self.intern(name)).collect();
                self.em.emit(Inst::NewObject(fields))
            }
            NodeKind::FunctionExpr(function) => self.em.emit(Inst::MakeClosure(*function)),
            NodeKind::Paren(inner) => self.expression(*inner),
            NodeKind::GuardedCast { operand, profile } => {
                self.expression(*operand)?;
                self.em.mark_resume(node);
                self.strategy.guarded_cast(&mut self.em, node, *profile)
            }
            NodeKind::Convert { kind, operand } => {
                self.expression(*operand)?;
                self.em.emit(Inst::Convert(*kind))
            }
            NodeKind::ReadIdentifier { symbol, profile } => self.load(*symbol, *profile),
            NodeKind::WriteIdentifier { symbol, value } => {
                self.expression(*value)?;
                self.em.emit(Inst::Dup)?;
                self.store(*symbol)
            }
            NodeKind::ReadProperty {
                object,
                name,
                profile,
            } => {
                self.expression(*object)?;
                let field = self.intern(name);
                self.strategy.load_property(&mut self.em, field, *profile)
            }
            NodeKind::WriteProperty {
                object,
                name,
                value,
                profile,
            } => {
                self.expression(*object)?;
                self.expression(*value)?;
                let field = self.intern(name);
                self.strategy.store_property(&mut self.em, field, *profile)
            }
            NodeKind::ReadIndex { object, index } => {
                self.expression(*object)?;
                self.expression(*index)?;
                self.em.emit(Inst::GetIndex)
            }
            NodeKind::WriteIndex {
                object,
                index,
                value,
            } => {
                self.expression(*object)?;
                self.expression(*index)?;
                self.expression(*value)?;
                self.em.emit(Inst::SetIndex)
            }
            NodeKind::Unary { op, operand } => {
                self.expression(*operand)?;
                self.em.emit(Inst::Unary(*op))
            }
            NodeKind::Binary { op, left, right } => {
                self.expression(*left)?;
                self.expression(*right)?;
                self.binary(node, *op, *left, *right)
            }
            NodeKind::Logical { op, left, right } => {
                let end = self.em.asm.create_label();
                self.expression(*left)?;
                let jump = match op {
                    LogicalOp::And => Inst::JumpIfFalseKeep(end),
                    LogicalOp::Or => Inst::JumpIfTrueKeep(end),
                };
                self.em.emit(jump)?;
                self.expression(*right)?;
                self.em.asm.bind(end)
            }
            NodeKind::Ternary {
                cond,
                then,
                otherwise,
            } => {
                let else_label = self.em.asm.create_label();
                let end = self.em.asm.create_label();
                self.expression(*cond)?;
                self.em.emit(Inst::JumpIfFalse(else_label))?;
                self.expression(*then)?;
                self.em.emit(Inst::Jump(end))?;
                self.em.asm.bind(else_label)?;
                self.expression(*otherwise)?;
                self.em.asm.bind(end)
            }
            NodeKind::Comma(items) => match items.split_last() {
                Some((last, rest)) => {
                    for &item in rest {
                        self.effect(item)?;
                    }
                    self.expression(*last)
                }
                None => self.em.emit(Inst::Const(Value::Undefined)),
            },
            NodeKind::Call(invocation) => self.call(invocation),
            NodeKind::New(invocation) => {
                self.expression(invocation.callee)?;
                for &arg in &invocation.args {
                    self.expression(arg)?;
                }
                self.em.emit(Inst::New {
                    argc: invocation.args.len() as u32,
                })
            }
            NodeKind::Block(_)
            | NodeKind::VarDecl { .. }
            | NodeKind::ExprStmt(_)
            | NodeKind::If { .. }
            | NodeKind::While { .. }
            | NodeKind::DoWhile { .. }
            | NodeKind::For { .. }
            | NodeKind::Return(_)
            | NodeKind::Throw(_)
            | NodeKind::Label { .. }
            | NodeKind::Goto(_)
            | NodeKind::FunctionDecl { .. } => Err(CompileError::UnsupportedNode {
                stage: "codegen",
                node,
            }
            .into()),
        }
    }

    /// `[left, right] -> [result]`
    fn binary(&mut self, node: NodeId, op: BinaryOp, left: NodeId, right: NodeId) -> JitResult<()> {
        let types = self.em.types;
        let (lt, rt) = (types.node(left), types.node(right));
        let int32 = lt == ValueType::Int32 && rt == ValueType::Int32;

        // Overflow deopts resume here, with both operands on the stack.
        self.em.mark_resume(node);
        let inst = if int32 && matches!(op, BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul) {
            match self.strategy.checked_arithmetic(&mut self.em, node) {
                Some(deopt) => Inst::Int32Arith { op, deopt },
                None => Inst::NumericBinary(op),
            }
        } else if int32 && !op.is_arithmetic() {
            Inst::Int32Binary(op)
        } else if lt.is_numeric() && rt.is_numeric() && !op.is_bitwise() {
            Inst::NumericBinary(op)
        } else {
            Inst::Binary(op)
        };
        self.em.emit(inst)
    }

    // =========================================================================
    // Calls
    // =========================================================================

    /// Pushes `[callee, this, args...]` and calls, or splices an inlined
    /// body.
    fn call(&mut self, invocation: &Invocation) -> JitResult<()> {
        if let Some(inlined) = &invocation.inlined {
            return self.inlined(inlined);
        }
        let module = self.em.module;
        let mut callee = invocation.callee;
        while let NodeKind::Paren(inner) = module.node(callee).kind {
            callee = inner;
        }
        match &module.node(callee).kind {
            // Method call: the object is both receiver and `this`.
            NodeKind::ReadProperty {
                object,
                name,
                profile,
            } => {
                self.expression(*object)?;
                self.em.emit(Inst::Dup)?;
                let field = self.intern(name);
                self.strategy.load_property(&mut self.em, field, *profile)?;
                self.em.emit(Inst::Swap)?;
            }
            _ => {
                self.expression(callee)?;
                self.em.emit(Inst::Const(Value::Undefined))?;
            }
        }
        for &arg in &invocation.args {
            self.expression(arg)?;
        }
        let profile = self.strategy.call_profile(invocation.profile);
        self.em.emit(Inst::Call {
            argc: invocation.args.len() as u32,
            profile,
        })
    }

    fn inlined(&mut self, inlined: &InlinedBody) -> JitResult<()> {
        let module = self.em.module;
        // Every entry into the body starts from fresh locals.
        for &symbol in &module.scope(inlined.scope).symbols {
            if !module.symbol(symbol).kind().is_frame_local() {
                continue;
            }
            if let Storage::Slot(slot) = self.em.storage(symbol)? {
                self.em.emit(Inst::ClearSlot(slot))?;
            }
        }
        self.statement(inlined.body)?;
        match self.em.storage(inlined.result)? {
            Storage::Slot(slot) => self.em.emit(Inst::LoadSlot(slot)),
            _ => Err(JitError::MissingSlot {
                symbol: inlined.result,
            }),
        }
    }
}

fn literal_value(literal: &Literal) -> Value {
    match literal {
        Literal::Undefined => Value::Undefined,
        Literal::Null => Value::Null,
        Literal::Boolean(b) => Value::Boolean(*b),
        Literal::Int32(i) => Value::Int32(*i),
        Literal::Double(d) => Value::Double(*d),
        Literal::String(s) => Value::String(s.clone()),
    }
}

/// Smallest instruction range covering everything that can deoptimize.
fn protected_region(code: &[Inst]) -> Option<Range<u32>> {
    let mut deopting = code.iter().enumerate().filter_map(|(pc, inst)| {
        let deopts = matches!(inst, Inst::Guard { deopt: Some(_), .. } | Inst::Int32Arith { .. });
        deopts.then_some(pc as u32)
    });
    let first = deopting.next()?;
    let last = deopting.last().unwrap_or(first);
    Some(first..last + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tierjit_compiler::{CompileOptions, Compiler, CompilerConfig, IrBuilder};

    /// `function f(a) { var s = 0; for (...; a; ...) s = s + a; return s > 1 ? s : -1; }`
    fn looping_module() -> (Module, FunctionId) {
        let mut b = IrBuilder::new();
        let f = b.begin_function("f", &["a"]);
        let zero = b.int(0);
        let decl = b.var_decl("s", Some(zero));
        let cond = b.read("a");
        let s = b.read("s");
        let a = b.read("a");
        let sum = b.binary(BinaryOp::Add, s, a);
        let write = b.write("s", sum);
        let body = b.expr_stmt(write);
        let one = b.int(1);
        let a2 = b.read("a");
        let dec = b.binary(BinaryOp::Sub, a2, one);
        let update = b.write("a", dec);
        let for_loop = b.for_loop(None, Some(cond), Some(update), body);
        let s2 = b.read("s");
        let one = b.int(1);
        let test = b.binary(BinaryOp::Gt, s2, one);
        let s3 = b.read("s");
        let minus = b.int(-1);
        let pick = b.ternary(test, s3, minus);
        let ret = b.ret(Some(pick));
        b.end_function(vec![decl, for_loop, ret]);
        let fd = b.function_decl(f);
        (b.finish(vec![fd]).unwrap(), f)
    }

    fn compiled(module: &mut Module, function: FunctionId, runtime: &Runtime) -> TypeTable {
        let compiler = Compiler::new(CompilerConfig::for_testing());
        compiler.prepare(module);
        compiler.resolve(module, runtime).unwrap();
        compiler
            .compile(module, function, CompileOptions::baseline())
            .unwrap()
            .types
    }

    #[test]
    fn test_baseline_code_is_balanced_and_uninstrumented() {
        let (mut module, f) = looping_module();
        let runtime = Runtime::new();
        let types = compiled(&mut module, f, &runtime);
        let code = CodeGenerator::new(&module, &runtime, &types, f, Baseline)
            .generate()
            .unwrap();
        assert_eq!(code.tier, Tier::Baseline);
        assert!(!code.is_fallback);
        assert!(matches!(code.code.last(), Some(Inst::Return)));
        assert!(code.count(|i| matches!(i, Inst::RecordType(_))) == 0);
        assert_eq!(code.guard_count(), 0);
        assert!(code.protected.is_none());
        assert!(code.layout.num_slots >= 3);
    }

    #[test]
    fn test_profiling_code_records_guarded_operands() {
        let (mut module, f) = looping_module();
        let runtime = Runtime::new();
        let types = compiled(&mut module, f, &runtime);
        let code = CodeGenerator::new(&module, &runtime, &types, f, Profiling)
            .generate()
            .unwrap();
        let guards = module.function(f).profile_counts.guards as usize;
        assert_eq!(code.count(|i| matches!(i, Inst::RecordType(_))), guards);
        // Every guarded cast has a resume point, and so does every binary.
        assert!(code.resume_points.len() >= guards);
    }

    #[test]
    fn test_protected_region_spans_deopting_instructions() {
        let code = [
            Inst::Const(Value::Int32(1)),
            Inst::Guard {
                site: 0,
                expected: ValueType::Int32,
                deopt: Some(0),
            },
            Inst::Pop,
            Inst::Const(Value::Int32(2)),
            Inst::Const(Value::Int32(3)),
            Inst::Int32Arith {
                op: BinaryOp::Add,
                deopt: 1,
            },
            Inst::Return,
        ];
        assert_eq!(protected_region(&code), Some(1..6));
        assert_eq!(protected_region(&code[2..5]), None);
        let unprotected = [Inst::Guard {
            site: 0,
            expected: ValueType::Int32,
            deopt: None,
        }];
        assert_eq!(protected_region(&unprotected), None);
    }

    #[test]
    fn test_statement_in_expression_position_is_rejected() {
        let mut b = IrBuilder::new();
        let f = b.begin_function("f", &[]);
        let inner = b.block(vec![]);
        let stmt = b.ret(Some(inner));
        b.end_function(vec![stmt]);
        let fd = b.function_decl(f);
        let mut module = b.finish(vec![fd]).unwrap();
        let runtime = Runtime::new();
        let types = compiled(&mut module, f, &runtime);
        let err = CodeGenerator::new(&module, &runtime, &types, f, Baseline)
            .generate()
            .unwrap_err();
        assert!(matches!(
            err,
            JitError::Compile(CompileError::UnsupportedNode { stage: "codegen", .. })
        ));
    }
}
