//! Definite-initialisation analysis.
//!
//! Finds frame locals that some path may read before any write. Such a slot
//! can observe its initial `undefined`, so inference must not give it an
//! unboxed representation.
//!
//! The analysis walks the tree in evaluation order carrying the set of
//! locals written on every path so far. Branches meet by intersection;
//! loop bodies may run zero times; `return`, `throw` and `goto` end the
//! current path, and a label meets the paths that jump to it.

use crate::ir::{LabelId, Module, NodeId, NodeKind, SymbolId};
use rustc_hash::{FxHashMap, FxHashSet};
use tierjit_runtime::FunctionId;

/// Written set of the current path; `None` when the path is unreachable.
type Written = Option<FxHashSet<SymbolId>>;

/// Non-parameter frame locals of `function` that may be read uninitialised.
pub fn maybe_uninitialized(module: &Module, function: FunctionId) -> FxHashSet<SymbolId> {
    let mut tracked = FxHashSet::default();
    for scope in module.function_scopes(function) {
        for &symbol in &module.scope(scope).symbols {
            let sym = module.symbol(symbol);
            if sym.kind().is_frame_local() && !sym.is_param() && sym.sub_function.is_none() {
                tracked.insert(symbol);
            }
        }
    }
    let mut flow = Flow {
        module,
        tracked,
        written: Some(FxHashSet::default()),
        labels: FxHashMap::default(),
        uninitialized: FxHashSet::default(),
    };
    flow.visit(module.function(function).body);
    flow.uninitialized
}

struct Flow<'m> {
    module: &'m Module,
    tracked: FxHashSet<SymbolId>,
    written: Written,
    labels: FxHashMap<LabelId, Written>,
    uninitialized: FxHashSet<SymbolId>,
}

fn meet(a: Written, b: Written) -> Written {
    match (a, b) {
        (None, other) | (other, None) => other,
        (Some(a), Some(b)) => Some(a.intersection(&b).copied().collect()),
    }
}

impl Flow<'_> {
    fn read(&mut self, symbol: SymbolId) {
        let symbol = self.module.storage_symbol(symbol);
        if !self.tracked.contains(&symbol) {
            return;
        }
        let unwritten = match &self.written {
            Some(written) => !written.contains(&symbol),
            None => false,
        };
        if unwritten {
            self.uninitialized.insert(symbol);
        }
    }

    fn write(&mut self, symbol: SymbolId) {
        let symbol = self.module.storage_symbol(symbol);
        if let Some(written) = &mut self.written {
            written.insert(symbol);
        }
    }

    fn visit_all(&mut self, nodes: &[NodeId]) {
        for &node in nodes {
            self.visit(node);
        }
    }

    /// Visit `node` on a path that may be skipped.
    fn visit_maybe(&mut self, node: NodeId) {
        let before = self.written.clone();
        self.visit(node);
        self.written = meet(before, self.written.take());
    }

    fn visit(&mut self, node: NodeId) {
        let module = self.module;
        match &module.node(node).kind {
            NodeKind::Block(items) | NodeKind::ArrayLiteral(items) | NodeKind::Comma(items) => {
                self.visit_all(items)
            }
            NodeKind::VarDecl { init, .. } => {
                if let Some(init) = init {
                    self.visit(*init);
                }
            }
            NodeKind::ExprStmt(e)
            | NodeKind::Paren(e)
            | NodeKind::GuardedCast { operand: e, .. }
            | NodeKind::Convert { operand: e, .. }
            | NodeKind::Unary { operand: e, .. }
            | NodeKind::ReadProperty { object: e, .. } => self.visit(*e),
            NodeKind::Return(value) => {
                if let Some(value) = value {
                    self.visit(*value);
                }
                self.written = None;
            }
            NodeKind::Throw(e) => {
                self.visit(*e);
                self.written = None;
            }
            NodeKind::If {
                cond,
                then,
                otherwise,
            } => self.branches(*cond, *then, *otherwise),
            NodeKind::Ternary {
                cond,
                then,
                otherwise,
            } => self.branches(*cond, *then, Some(*otherwise)),
            NodeKind::While { cond, body } => {
                self.visit(*cond);
                self.visit_maybe(*body);
            }
            NodeKind::DoWhile { body, cond } => {
                self.visit(*body);
                self.visit(*cond);
            }
            NodeKind::For {
                init,
                cond,
                update,
                body,
            } => {
                if let Some(init) = init {
                    self.visit(*init);
                }
                if let Some(cond) = cond {
                    self.visit(*cond);
                }
                let before = self.written.clone();
                self.visit(*body);
                if let Some(update) = update {
                    self.visit(*update);
                }
                self.written = meet(before, self.written.take());
            }
            NodeKind::Label { label, body } => {
                self.visit(*body);
                let jumped = self.labels.remove(label).flatten();
                self.written = meet(self.written.take(), jumped);
            }
            NodeKind::Goto(label) => {
                let pending = self.labels.remove(label).flatten();
                let merged = meet(pending, self.written.take());
                self.labels.insert(*label, merged);
            }
            NodeKind::ObjectLiteral(props) => {
                for (_, value) in props {
                    self.visit(*value);
                }
            }
            NodeKind::ReadIdentifier { symbol, .. } => self.read(*symbol),
            NodeKind::WriteIdentifier { symbol, value } => {
                self.visit(*value);
                self.write(*symbol);
            }
            NodeKind::WriteProperty { object, value, .. } => {
                self.visit(*object);
                self.visit(*value);
            }
            NodeKind::ReadIndex { object, index } => {
                self.visit(*object);
                self.visit(*index);
            }
            NodeKind::WriteIndex {
                object,
                index,
                value,
            } => {
                self.visit(*object);
                self.visit(*index);
                self.visit(*value);
            }
            NodeKind::Binary { left, right, .. } => {
                self.visit(*left);
                self.visit(*right);
            }
            NodeKind::Logical { left, right, .. } => {
                self.visit(*left);
                self.visit_maybe(*right);
            }
            NodeKind::Call(inv) | NodeKind::New(inv) => match &inv.inlined {
                Some(inlined) => {
                    self.visit(inlined.body);
                    self.read(inlined.result);
                }
                None => {
                    self.visit(inv.callee);
                    self.visit_all(&inv.args);
                }
            },
            NodeKind::Literal(_)
            | NodeKind::This
            | NodeKind::FunctionExpr(_)
            | NodeKind::FunctionDecl { .. } => {}
        }
    }

    fn branches(&mut self, cond: NodeId, then: NodeId, otherwise: Option<NodeId>) {
        self.visit(cond);
        let before = self.written.clone();
        self.visit(then);
        let after_then = self.written.take();
        self.written = before;
        if let Some(otherwise) = otherwise {
            self.visit(otherwise);
        }
        self.written = meet(after_then, self.written.take());
    }
}
