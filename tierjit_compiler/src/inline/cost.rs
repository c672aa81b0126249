//! Static size estimate of a function body.
//!
//! Each node contributes a weight; calls and property accesses dominate
//! because they expand into runtime calls once lowered.

use crate::ir::{Module, NodeId, NodeKind};

// =============================================================================
// Inline Cost
// =============================================================================

/// Weighted node count of a function body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct InlineCost(pub u32);

impl InlineCost {
    pub const CALL: u32 = 10;
    pub const PROPERTY: u32 = 3;
    pub const LOOP: u32 = 5;
    pub const DEFAULT: u32 = 1;

    /// Cost of the tree rooted at `root` as written in its own function:
    /// bodies spliced in by earlier inlining are costed as plain calls.
    pub fn of(module: &Module, root: NodeId) -> Self {
        let mut total = 0u32;
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let kind = &module.node(id).kind;
            total = total.saturating_add(Self::weight(kind));
            match kind {
                NodeKind::Call(inv) | NodeKind::New(inv) => {
                    stack.push(inv.callee);
                    stack.extend(inv.args.iter().copied());
                }
                _ => stack.extend(kind.children()),
            }
        }
        InlineCost(total)
    }

    fn weight(kind: &NodeKind) -> u32 {
        match kind {
            NodeKind::Call(_) | NodeKind::New(_) => Self::CALL,
            NodeKind::ReadProperty { .. }
            | NodeKind::WriteProperty { .. }
            | NodeKind::ReadIndex { .. }
            | NodeKind::WriteIndex { .. } => Self::PROPERTY,
            NodeKind::While { .. } | NodeKind::DoWhile { .. } | NodeKind::For { .. } => Self::LOOP,
            _ => Self::DEFAULT,
        }
    }

    /// Strictly below `ceiling`; a body costing exactly the ceiling is too
    /// large.
    #[inline]
    pub fn is_under(self, ceiling: u32) -> bool {
        self.0 < ceiling
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::IrBuilder;
    use tierjit_runtime::BinaryOp;

    #[test]
    fn test_calls_outweigh_arithmetic() {
        let mut b = IrBuilder::new();
        let f = b.begin_function("f", &["a"]);
        let a = b.read("a");
        let one = b.int(1);
        let sum = b.binary(BinaryOp::Add, a, one);
        let ret = b.ret(Some(sum));
        b.end_function(vec![ret]);
        let g = b.begin_function("g", &["a"]);
        let callee = b.read("a");
        let call = b.call(callee, vec![]);
        let ret = b.ret(Some(call));
        b.end_function(vec![ret]);
        let module = b.finish(vec![]).unwrap();

        // block, return, binary, guard, read, literal
        let arithmetic = InlineCost::of(&module, module.function(f).body);
        assert_eq!(arithmetic, InlineCost(6));
        let calling = InlineCost::of(&module, module.function(g).body);
        assert_eq!(calling, InlineCost(1 + 1 + InlineCost::CALL + 1));
        assert!(arithmetic < calling);
        assert!(arithmetic.is_under(150));
    }

    #[test]
    fn test_ceiling_is_exclusive() {
        assert!(InlineCost(149).is_under(150));
        assert!(!InlineCost(150).is_under(150));
        assert!(!InlineCost(151).is_under(150));
        assert!(!InlineCost(0).is_under(0));
    }
}
