//! Deep copy of a callee body into a caller's private inlining scope.
//!
//! Every node is duplicated with its symbols mapped to the renamed copies,
//! its profile slot re-allocated in the caller (remembering the callee slot
//! it came from), and every `return` rewritten into a write of the result
//! symbol followed by a jump to the exit label:
//!
//! ```text
//!   return e;   ──▶   { result = e; goto exit; }
//!   return;     ──▶   goto exit;
//! ```
//!
//! Calls that the callee had inlined itself are copied as ordinary calls;
//! the inliner revisits them in the caller's context.

use crate::error::{CompileError, CompileResult};
use crate::ir::{Invocation, LabelId, Module, NodeId, NodeKind, ProfileSlot, ScopeId, SymbolId};
use rustc_hash::FxHashMap;
use tierjit_runtime::FunctionId;

/// Which profile vector a slot indexes.
#[derive(Clone, Copy)]
enum SlotKind {
    Guard,
    Map,
    Call,
}

pub(crate) struct BodyCloner<'m> {
    pub(crate) module: &'m mut Module,
    /// Function that owns the new nodes' profile slots.
    pub(crate) caller: FunctionId,
    pub(crate) callee: FunctionId,
    pub(crate) scope: ScopeId,
    pub(crate) symbols: FxHashMap<SymbolId, SymbolId>,
    pub(crate) labels: FxHashMap<LabelId, LabelId>,
    pub(crate) exit: LabelId,
    pub(crate) result: SymbolId,
}

impl BodyCloner<'_> {
    fn symbol(&self, old: SymbolId, node: NodeId) -> CompileResult<SymbolId> {
        self.symbols
            .get(&old)
            .copied()
            .ok_or(CompileError::UnsupportedNode { stage: "inline", node })
    }

    fn label(&mut self, old: LabelId) -> LabelId {
        if let Some(label) = self.labels.get(&old) {
            return *label;
        }
        let label = self.module.new_label();
        self.labels.insert(old, label);
        label
    }

    fn slot(&mut self, old: ProfileSlot, kind: SlotKind) -> ProfileSlot {
        let caller = self.module.function_mut(self.caller);
        let index = match kind {
            SlotKind::Guard => caller.next_guard_profile(),
            SlotKind::Map => caller.next_map_profile(),
            SlotKind::Call => caller.next_call_profile(),
        };
        ProfileSlot {
            index,
            origin: old.origin.or(Some((self.callee, old.index))),
        }
    }

    fn add(&mut self, kind: NodeKind) -> NodeId {
        self.module.add_node(kind, self.scope)
    }

    fn opt(&mut self, node: Option<NodeId>) -> CompileResult<Option<NodeId>> {
        node.map(|n| self.clone_node(n)).transpose()
    }

    fn list(&mut self, nodes: &[NodeId]) -> CompileResult<Vec<NodeId>> {
        nodes.iter().map(|n| self.clone_node(*n)).collect()
    }

    /// Copy the tree rooted at `old`.
    pub(crate) fn clone_node(&mut self, old: NodeId) -> CompileResult<NodeId> {
        let kind = self.module.node(old).kind.clone();
        let cloned = match kind {
            NodeKind::Block(items) => {
                let items = self.list(&items)?;
                self.add(NodeKind::Block(items))
            }
            NodeKind::VarDecl { symbol, init } => {
                let symbol = self.symbol(symbol, old)?;
                let init = self.opt(init)?;
                self.add(NodeKind::VarDecl { symbol, init })
            }
            NodeKind::ExprStmt(e) => {
                let e = self.clone_node(e)?;
                self.add(NodeKind::ExprStmt(e))
            }
            NodeKind::If {
                cond,
                then,
                otherwise,
            } => {
                let cond = self.clone_node(cond)?;
                let then = self.clone_node(then)?;
                let otherwise = self.opt(otherwise)?;
                self.add(NodeKind::If {
                    cond,
                    then,
                    otherwise,
                })
            }
            NodeKind::While { cond, body } => {
                let cond = self.clone_node(cond)?;
                let body = self.clone_node(body)?;
                self.add(NodeKind::While { cond, body })
            }
            NodeKind::DoWhile { body, cond } => {
                let body = self.clone_node(body)?;
                let cond = self.clone_node(cond)?;
                self.add(NodeKind::DoWhile { body, cond })
            }
            NodeKind::For {
                init,
                cond,
                update,
                body,
            } => {
                let init = self.opt(init)?;
                let cond = self.opt(cond)?;
                let update = self.opt(update)?;
                let body = self.clone_node(body)?;
                self.add(NodeKind::For {
                    init,
                    cond,
                    update,
                    body,
                })
            }
            NodeKind::Return(value) => {
                let goto = self.add(NodeKind::Goto(self.exit));
                match value {
                    None => goto,
                    Some(value) => {
                        let value = self.clone_node(value)?;
                        let write = self.add(NodeKind::WriteIdentifier {
                            symbol: self.result,
                            value,
                        });
                        self.module.symbol_mut(self.result).writers.push(write);
                        let stmt = self.add(NodeKind::ExprStmt(write));
                        self.add(NodeKind::Block(vec![stmt, goto]))
                    }
                }
            }
            NodeKind::Throw(e) => {
                let e = self.clone_node(e)?;
                self.add(NodeKind::Throw(e))
            }
            NodeKind::Label { label, body } => {
                let label = self.label(label);
                let body = self.clone_node(body)?;
                self.add(NodeKind::Label { label, body })
            }
            NodeKind::Goto(label) => {
                let label = self.label(label);
                self.add(NodeKind::Goto(label))
            }
            NodeKind::Literal(literal) => self.add(NodeKind::Literal(literal)),
            NodeKind::ArrayLiteral(items) => {
                let items = self.list(&items)?;
                self.add(NodeKind::ArrayLiteral(items))
            }
            NodeKind::ObjectLiteral(props) => {
                let mut cloned = Vec::with_capacity(props.len());
                for (name, value) in props {
                    cloned.push((name, self.clone_node(value)?));
                }
                self.add(NodeKind::ObjectLiteral(cloned))
            }
            NodeKind::Paren(e) => {
                let e = self.clone_node(e)?;
                self.add(NodeKind::Paren(e))
            }
            NodeKind::GuardedCast { operand, profile } => {
                let operand = self.clone_node(operand)?;
                let profile = self.slot(profile, SlotKind::Guard);
                self.add(NodeKind::GuardedCast { operand, profile })
            }
            NodeKind::Convert { kind, operand } => {
                let operand = self.clone_node(operand)?;
                self.add(NodeKind::Convert { kind, operand })
            }
            NodeKind::ReadIdentifier { symbol, profile } => {
                let symbol = self.symbol(symbol, old)?;
                let profile = self.slot(profile, SlotKind::Map);
                let read = self.add(NodeKind::ReadIdentifier { symbol, profile });
                self.module.symbol_mut(symbol).readers.push(read);
                read
            }
            NodeKind::WriteIdentifier { symbol, value } => {
                let symbol = self.symbol(symbol, old)?;
                let value = self.clone_node(value)?;
                let write = self.add(NodeKind::WriteIdentifier { symbol, value });
                self.module.symbol_mut(symbol).writers.push(write);
                write
            }
            NodeKind::ReadProperty {
                object,
                name,
                profile,
            } => {
                let object = self.clone_node(object)?;
                let profile = self.slot(profile, SlotKind::Map);
                self.add(NodeKind::ReadProperty {
                    object,
                    name,
                    profile,
                })
            }
            NodeKind::WriteProperty {
                object,
                name,
                value,
                profile,
            } => {
                let object = self.clone_node(object)?;
                let value = self.clone_node(value)?;
                let profile = self.slot(profile, SlotKind::Map);
                self.add(NodeKind::WriteProperty {
                    object,
                    name,
                    value,
                    profile,
                })
            }
            NodeKind::ReadIndex { object, index } => {
                let object = self.clone_node(object)?;
                let index = self.clone_node(index)?;
                self.add(NodeKind::ReadIndex { object, index })
            }
            NodeKind::WriteIndex {
                object,
                index,
                value,
            } => {
                let object = self.clone_node(object)?;
                let index = self.clone_node(index)?;
                let value = self.clone_node(value)?;
                self.add(NodeKind::WriteIndex {
                    object,
                    index,
                    value,
                })
            }
            NodeKind::Unary { op, operand } => {
                let operand = self.clone_node(operand)?;
                self.add(NodeKind::Unary { op, operand })
            }
            NodeKind::Binary { op, left, right } => {
                let left = self.clone_node(left)?;
                let right = self.clone_node(right)?;
                self.add(NodeKind::Binary { op, left, right })
            }
            NodeKind::Logical { op, left, right } => {
                let left = self.clone_node(left)?;
                let right = self.clone_node(right)?;
                self.add(NodeKind::Logical { op, left, right })
            }
            NodeKind::Ternary {
                cond,
                then,
                otherwise,
            } => {
                let cond = self.clone_node(cond)?;
                let then = self.clone_node(then)?;
                let otherwise = self.clone_node(otherwise)?;
                self.add(NodeKind::Ternary {
                    cond,
                    then,
                    otherwise,
                })
            }
            NodeKind::Comma(items) => {
                let items = self.list(&items)?;
                self.add(NodeKind::Comma(items))
            }
            NodeKind::Call(inv) => {
                let inv = self.invocation(inv)?;
                let call = self.add(NodeKind::Call(inv));
                self.module.scope_mut(self.scope).invocations.push(call);
                call
            }
            NodeKind::New(inv) => {
                let inv = self.invocation(inv)?;
                let new = self.add(NodeKind::New(inv));
                self.module.scope_mut(self.scope).invocations.push(new);
                new
            }
            // Eligibility excludes `this` and nested functions.
            NodeKind::This | NodeKind::FunctionDecl { .. } | NodeKind::FunctionExpr(_) => {
                return Err(CompileError::UnsupportedNode {
                    stage: "inline",
                    node: old,
                });
            }
        };
        Ok(cloned)
    }

    fn invocation(&mut self, inv: Invocation) -> CompileResult<Invocation> {
        let callee = self.clone_node(inv.callee)?;
        let args = self.list(&inv.args)?;
        let profile = self.slot(inv.profile, SlotKind::Call);
        Ok(Invocation {
            callee,
            args,
            profile,
            target: inv.target,
            inlined: None,
        })
    }
}
