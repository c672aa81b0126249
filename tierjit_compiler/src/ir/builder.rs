//! IR construction.
//!
//! `IrBuilder` plays the part of the front end: it creates functions, scopes
//! and symbols, records readers, writers and call sites, assigns profile
//! indices, and wraps operands that may be specialized later in
//! `GuardedCast` nodes.
//!
//! Construction follows a stack discipline: `begin_function`/`begin_block`
//! open a scope, expression and statement constructors target the innermost
//! open scope, and `end_function`/`end_block` close it.
//!
//! ```ignore
//! let mut b = IrBuilder::new();
//! let f = b.begin_function("f", &["a"]);
//! let a = b.read("a");
//! let one = b.int(1);
//! let sum = b.binary(BinaryOp::Add, a, one);
//! let ret = b.ret(Some(sum));
//! b.end_function(vec![ret]);
//! let decl = b.function_decl(f);
//! let module = b.finish(vec![decl])?;
//! ```

use super::{
    ConversionKind, FunctionMeta, Invocation, LabelId, Literal, LogicalOp, Module, NodeId, NodeKind,
    ProfileSlot, Scope, ScopeFlags, ScopeId, ScopeKind, SymbolId, SymbolKind,
};
use crate::error::{CompileError, CompileResult};
use std::sync::Arc;
use tierjit_runtime::{BinaryOp, FunctionId, UnaryOp};

struct Frame {
    function: FunctionId,
    scope: ScopeId,
}

/// Incremental builder for a [`Module`].
pub struct IrBuilder {
    module: Module,
    stack: Vec<Frame>,
}

impl Default for IrBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl IrBuilder {
    /// Start a module with an open Program function.
    pub fn new() -> Self {
        let mut module = Module {
            functions: Vec::new(),
            scopes: Vec::new(),
            symbols: Vec::new(),
            nodes: Vec::new(),
            next_label: 0,
            program: FunctionId(0),
        };
        let program = FunctionId(0);
        let scope = module.add_scope(Scope::new(ScopeKind::Program, None, program));
        let body = module.add_node(NodeKind::Block(Vec::new()), scope);
        module
            .functions
            .push(FunctionMeta::new(program, Arc::from("<program>"), scope, None, body));
        Self {
            module,
            stack: vec![Frame {
                function: program,
                scope,
            }],
        }
    }

    /// The module built so far.
    pub fn module(&self) -> &Module {
        &self.module
    }

    #[inline]
    pub fn program(&self) -> FunctionId {
        self.module.program
    }

    fn top(&self) -> &Frame {
        // The Program frame is never popped.
        &self.stack[self.stack.len() - 1]
    }

    #[inline]
    pub fn current_scope(&self) -> ScopeId {
        self.top().scope
    }

    #[inline]
    pub fn current_function(&self) -> FunctionId {
        self.top().function
    }

    fn node(&mut self, kind: NodeKind) -> NodeId {
        let scope = self.current_scope();
        self.module.add_node(kind, scope)
    }

    fn function_scope(&self) -> ScopeId {
        self.module.function(self.current_function()).scope
    }

    // =========================================================================
    // Functions and Scopes
    // =========================================================================

    /// Open a new function nested in the current scope.
    pub fn begin_function(&mut self, name: &str, params: &[&str]) -> FunctionId {
        let parent_function = self.current_function();
        let parent_scope = self.current_scope();
        let id = FunctionId(self.module.functions.len() as u32);
        let scope = self
            .module
            .add_scope(Scope::new(ScopeKind::Function, Some(parent_scope), id));
        let body = self.module.add_node(NodeKind::Block(Vec::new()), scope);
        let mut meta = FunctionMeta::new(id, Arc::from(name), scope, Some(parent_function), body);
        for (i, param) in params.iter().enumerate() {
            let symbol = self.module.add_symbol(scope, Arc::from(*param), SymbolKind::Local);
            self.module.symbol_mut(symbol).param_index = Some(i as u32);
            meta.params.push(symbol);
        }
        self.module.functions.push(meta);
        self.module.function_mut(parent_function).sub_functions.push(id);
        self.stack.push(Frame {
            function: id,
            scope,
        });
        id
    }

    /// Close the innermost function, installing its body.
    pub fn end_function(&mut self, body: Vec<NodeId>) -> FunctionId {
        let function = self.current_function();
        if self.stack.len() > 1 {
            self.stack.pop();
        }
        let body_node = self.module.function(function).body;
        self.module.replace_node(body_node, NodeKind::Block(body));
        function
    }

    /// Mark the function being built as code run by `eval`.
    pub fn mark_eval_body(&mut self) {
        let function = self.current_function();
        self.module.function_mut(function).is_eval_body = true;
    }

    /// Open a nested block scope.
    pub fn begin_block(&mut self) -> ScopeId {
        let function = self.current_function();
        let parent = self.current_scope();
        let scope = self
            .module
            .add_scope(Scope::new(ScopeKind::Block, Some(parent), function));
        self.stack.push(Frame { function, scope });
        scope
    }

    /// Close the innermost block scope, returning its block statement.
    pub fn end_block(&mut self, statements: Vec<NodeId>) -> NodeId {
        let node = self.node(NodeKind::Block(statements));
        if self.stack.len() > 1 {
            self.stack.pop();
        }
        node
    }

    /// Finish the module with the Program's top-level statements.
    pub fn finish(mut self, body: Vec<NodeId>) -> CompileResult<Module> {
        if self.stack.len() != 1 {
            return Err(CompileError::UnbalancedBuilder {
                open: self.stack.len() - 1,
            });
        }
        let body_node = self.module.function(self.module.program).body;
        self.module.replace_node(body_node, NodeKind::Block(body));
        Ok(self.module)
    }

    // =========================================================================
    // Symbols
    // =========================================================================

    fn symbol_in_current(&mut self, name: &str) -> SymbolId {
        let scope = self.current_scope();
        match self.module.lookup_in_scope(scope, name) {
            Some(symbol) => symbol,
            None => self.module.add_symbol(scope, Arc::from(name), SymbolKind::Unknown),
        }
    }

    /// Declare `name` as a local of the enclosing function (`var` hoisting).
    pub fn declare(&mut self, name: &str) -> SymbolId {
        let scope = self.function_scope();
        self.declare_in(scope, name)
    }

    /// Declare `name` as a local of the current block only.
    pub fn declare_lexical(&mut self, name: &str) -> SymbolId {
        let scope = self.current_scope();
        self.declare_in(scope, name)
    }

    fn declare_in(&mut self, scope: ScopeId, name: &str) -> SymbolId {
        let symbol = match self.module.lookup_in_scope(scope, name) {
            Some(symbol) => symbol,
            None => self.module.add_symbol(scope, Arc::from(name), SymbolKind::Local),
        };
        let sym = self.module.symbol(symbol);
        if sym.kind() == SymbolKind::Unknown {
            sym.set_kind(SymbolKind::Local);
        }
        symbol
    }

    /// `var name = init` in the current scope.
    pub fn var_decl(&mut self, name: &str, init: Option<NodeId>) -> NodeId {
        let symbol = self.declare(name);
        let init = init.map(|value| self.write(name, value));
        self.node(NodeKind::VarDecl { symbol, init })
    }

    /// Hoisted declaration of a function built with `begin_function`.
    pub fn function_decl(&mut self, function: FunctionId) -> NodeId {
        let name = self.module.function(function).name.clone();
        let symbol = self.declare(&name);
        let slot = self
            .module
            .function(self.current_function())
            .sub_functions
            .iter()
            .position(|f| *f == function)
            .map(|i| i as u32);
        self.module.symbol_mut(symbol).sub_function = slot;
        let node = self.node(NodeKind::FunctionDecl { function, symbol });
        let owner = self.current_function();
        self.module.function_mut(owner).hoisted.push(node);
        node
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    pub fn literal(&mut self, literal: Literal) -> NodeId {
        self.node(NodeKind::Literal(literal))
    }

    pub fn undefined(&mut self) -> NodeId {
        self.literal(Literal::Undefined)
    }

    pub fn null(&mut self) -> NodeId {
        self.literal(Literal::Null)
    }

    pub fn boolean(&mut self, value: bool) -> NodeId {
        self.literal(Literal::Boolean(value))
    }

    pub fn int(&mut self, value: i32) -> NodeId {
        self.literal(Literal::Int32(value))
    }

    pub fn number(&mut self, value: f64) -> NodeId {
        self.literal(Literal::number(value))
    }

    pub fn string(&mut self, value: &str) -> NodeId {
        self.literal(Literal::String(Arc::from(value)))
    }

    pub fn this(&mut self) -> NodeId {
        let scope = self.function_scope();
        self.module.scope(scope).flags.insert(ScopeFlags::HAS_THIS);
        self.node(NodeKind::This)
    }

    pub fn array(&mut self, items: Vec<NodeId>) -> NodeId {
        self.node(NodeKind::ArrayLiteral(items))
    }

    pub fn object(&mut self, properties: Vec<(&str, NodeId)>) -> NodeId {
        let properties = properties
            .into_iter()
            .map(|(name, value)| (Arc::from(name), value))
            .collect();
        self.node(NodeKind::ObjectLiteral(properties))
    }

    pub fn function_expr(&mut self, function: FunctionId) -> NodeId {
        self.node(NodeKind::FunctionExpr(function))
    }

    pub fn paren(&mut self, expr: NodeId) -> NodeId {
        self.node(NodeKind::Paren(expr))
    }

    pub fn convert(&mut self, kind: ConversionKind, operand: NodeId) -> NodeId {
        let operand = self.guard(operand);
        self.node(NodeKind::Convert { kind, operand })
    }

    /// Read of `name` as seen from the current scope.
    pub fn read(&mut self, name: &str) -> NodeId {
        let symbol = self.symbol_in_current(name);
        let function = self.current_function();
        let profile = ProfileSlot::new(self.module.function_mut(function).next_map_profile());
        let node = self.node(NodeKind::ReadIdentifier { symbol, profile });
        self.module.symbol_mut(symbol).readers.push(node);
        node
    }

    /// Assignment `name = value`.
    pub fn write(&mut self, name: &str, value: NodeId) -> NodeId {
        let symbol = self.symbol_in_current(name);
        let value = self.guard(value);
        let node = self.node(NodeKind::WriteIdentifier { symbol, value });
        self.module.symbol_mut(symbol).writers.push(node);
        node
    }

    pub fn property(&mut self, object: NodeId, name: &str) -> NodeId {
        let function = self.current_function();
        let profile = ProfileSlot::new(self.module.function_mut(function).next_map_profile());
        self.node(NodeKind::ReadProperty {
            object,
            name: Arc::from(name),
            profile,
        })
    }

    pub fn set_property(&mut self, object: NodeId, name: &str, value: NodeId) -> NodeId {
        let function = self.current_function();
        let profile = ProfileSlot::new(self.module.function_mut(function).next_map_profile());
        self.node(NodeKind::WriteProperty {
            object,
            name: Arc::from(name),
            value,
            profile,
        })
    }

    pub fn index(&mut self, object: NodeId, index: NodeId) -> NodeId {
        self.node(NodeKind::ReadIndex { object, index })
    }

    pub fn set_index(&mut self, object: NodeId, index: NodeId, value: NodeId) -> NodeId {
        self.node(NodeKind::WriteIndex {
            object,
            index,
            value,
        })
    }

    pub fn unary(&mut self, op: UnaryOp, operand: NodeId) -> NodeId {
        let operand = match op {
            UnaryOp::Neg | UnaryOp::Plus | UnaryOp::BitNot => self.guard(operand),
            UnaryOp::Not | UnaryOp::TypeOf | UnaryOp::Void => operand,
        };
        self.node(NodeKind::Unary { op, operand })
    }

    pub fn binary(&mut self, op: BinaryOp, left: NodeId, right: NodeId) -> NodeId {
        let guarded = !matches!(op, BinaryOp::Eq | BinaryOp::Ne);
        let (left, right) = if guarded {
            (self.guard(left), self.guard(right))
        } else {
            (left, right)
        };
        self.node(NodeKind::Binary { op, left, right })
    }

    pub fn logical(&mut self, op: LogicalOp, left: NodeId, right: NodeId) -> NodeId {
        self.node(NodeKind::Logical { op, left, right })
    }

    pub fn ternary(&mut self, cond: NodeId, then: NodeId, otherwise: NodeId) -> NodeId {
        self.node(NodeKind::Ternary {
            cond,
            then,
            otherwise,
        })
    }

    pub fn comma(&mut self, items: Vec<NodeId>) -> NodeId {
        self.node(NodeKind::Comma(items))
    }

    fn invocation(&mut self, callee: NodeId, args: Vec<NodeId>) -> Invocation {
        let function = self.current_function();
        let profile = ProfileSlot::new(self.module.function_mut(function).next_call_profile());
        Invocation {
            callee,
            args,
            profile,
            target: None,
            inlined: None,
        }
    }

    pub fn call(&mut self, callee: NodeId, args: Vec<NodeId>) -> NodeId {
        let invocation = self.invocation(callee, args);
        let node = self.node(NodeKind::Call(invocation));
        let scope = self.current_scope();
        self.module.scope_mut(scope).invocations.push(node);
        node
    }

    /// `object.name(args)`
    pub fn method_call(&mut self, object: NodeId, name: &str, args: Vec<NodeId>) -> NodeId {
        let callee = self.property(object, name);
        self.call(callee, args)
    }

    pub fn new_object(&mut self, callee: NodeId, args: Vec<NodeId>) -> NodeId {
        let invocation = self.invocation(callee, args);
        let node = self.node(NodeKind::New(invocation));
        let scope = self.current_scope();
        self.module.scope_mut(scope).invocations.push(node);
        node
    }

    /// Direct `eval(args)`; taints the current scope.
    pub fn eval_call(&mut self, args: Vec<NodeId>) -> NodeId {
        let scope = self.current_scope();
        self.module.scope(scope).flags.insert(ScopeFlags::HAS_EVAL);
        let callee = self.read("eval");
        self.call(callee, args)
    }

    /// Wrap `expr` for later specialization if it is a read, call or
    /// indexed read (looking through parentheses).
    fn guard(&mut self, expr: NodeId) -> NodeId {
        let mut inner = expr;
        while let NodeKind::Paren(e) = self.module.node(inner).kind {
            inner = e;
        }
        match self.module.node(inner).kind {
            NodeKind::ReadIdentifier { .. } | NodeKind::Call(_) | NodeKind::ReadIndex { .. } => {
                let function = self.current_function();
                let profile =
                    ProfileSlot::new(self.module.function_mut(function).next_guard_profile());
                self.node(NodeKind::GuardedCast {
                    operand: inner,
                    profile,
                })
            }
            _ => expr,
        }
    }

    // =========================================================================
    // Statements
    // =========================================================================

    pub fn block(&mut self, statements: Vec<NodeId>) -> NodeId {
        self.node(NodeKind::Block(statements))
    }

    pub fn expr_stmt(&mut self, expr: NodeId) -> NodeId {
        self.node(NodeKind::ExprStmt(expr))
    }

    pub fn if_stmt(&mut self, cond: NodeId, then: NodeId, otherwise: Option<NodeId>) -> NodeId {
        self.node(NodeKind::If {
            cond,
            then,
            otherwise,
        })
    }

    fn mark_loop(&mut self) {
        let scope = self.function_scope();
        self.module.scope(scope).flags.insert(ScopeFlags::HAS_LOOP);
    }

    pub fn while_loop(&mut self, cond: NodeId, body: NodeId) -> NodeId {
        self.mark_loop();
        self.node(NodeKind::While { cond, body })
    }

    pub fn do_while(&mut self, body: NodeId, cond: NodeId) -> NodeId {
        self.mark_loop();
        self.node(NodeKind::DoWhile { body, cond })
    }

    pub fn for_loop(
        &mut self,
        init: Option<NodeId>,
        cond: Option<NodeId>,
        update: Option<NodeId>,
        body: NodeId,
    ) -> NodeId {
        self.mark_loop();
        self.node(NodeKind::For {
            init,
            cond,
            update,
            body,
        })
    }

    /// Fresh jump target for `labeled`/`goto`.
    pub fn new_label(&mut self) -> LabelId {
        self.module.new_label()
    }

    /// `body` followed by the position `label` names.
    pub fn labeled(&mut self, label: LabelId, body: NodeId) -> NodeId {
        self.node(NodeKind::Label { label, body })
    }

    /// Jump forward to an enclosing `labeled` statement's end.
    pub fn goto(&mut self, label: LabelId) -> NodeId {
        self.node(NodeKind::Goto(label))
    }

    pub fn ret(&mut self, value: Option<NodeId>) -> NodeId {
        self.node(NodeKind::Return(value))
    }

    pub fn throw(&mut self, value: NodeId) -> NodeId {
        self.node(NodeKind::Throw(value))
    }
}
