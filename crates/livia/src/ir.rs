//! Lowered IR node types.
//!
//! The lowering pass (external to this crate) produces two things: bare
//! expression trees ([`ExprNode`]) and lowered method bodies
//! ([`LambdaInfo`]), whose `code` is an ordered statement sequence of plain
//! `Value`s. Compound nodes are heap-allocated so `Value` stays `Copy`; the
//! evaluator never mutates an expression's argument vector.

use crate::{
    heap::{Heap, HeapData},
    intern::Symbol,
    module::ModuleId,
    value::Value,
};

/// A compound IR node: a head symbol plus ordered arguments.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ExprNode {
    pub head: Symbol,
    pub args: Vec<Value>,
}

/// SSA temporary count for a lowered body.
///
/// The lowering pass emits either a plain count or (after inference, which
/// is not this crate's concern) a per-temporary type list whose length is
/// the count.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum SsaInfo {
    Count(u32),
    Types(Vec<Value>),
}

/// A lowered method body and its layout metadata.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct LambdaInfo {
    /// Ordered statement sequence.
    pub code: Vec<Value>,
    /// Per-slot flags; the length is the slot count.
    pub slotflags: Vec<u8>,
    /// Slot names, used for undefined-variable diagnostics.
    pub slotnames: Vec<Symbol>,
    pub ssavaluetypes: SsaInfo,
    /// Formal argument count, including the callee slot.
    pub nargs: usize,
    /// Whether the final formal argument collects trailing actuals.
    pub isva: bool,
    /// Static-parameter bindings, used when the frame does not override.
    pub sparam_vals: Vec<Value>,
    /// Module of the enclosing method definition; unqualified globals
    /// resolve here.
    pub module: Option<ModuleId>,
}

impl LambdaInfo {
    #[inline]
    pub fn nslots(&self) -> usize {
        self.slotflags.len()
    }

    #[inline]
    pub fn nssavalues(&self) -> usize {
        match &self.ssavaluetypes {
            SsaInfo::Count(n) => *n as usize,
            SsaInfo::Types(types) => types.len(),
        }
    }
}

/// Deep-copies an AST value.
///
/// Expressions, quote nodes, and simple vectors get fresh heap cells;
/// every other value is returned as-is (immediates are copies already, and
/// non-AST heap objects keep their identity).
pub fn copy_ast(heap: &mut Heap, v: Value) -> Value {
    match v {
        Value::Expr(id) => {
            let node = heap.expr(id).clone();
            let args = node.args.iter().map(|a| copy_ast(heap, *a)).collect();
            let copy = heap.alloc(HeapData::Expr(ExprNode { head: node.head, args }));
            Value::Expr(copy)
        }
        Value::Quote(id) => {
            let inner = heap.quoted(id);
            let copy = copy_ast(heap, inner);
            Value::Quote(heap.alloc(HeapData::Quote(copy)))
        }
        Value::Svec(id) => {
            let elts = heap.svec(id).to_vec();
            let copied = elts.into_iter().map(|e| copy_ast(heap, e)).collect();
            Value::Svec(heap.alloc(HeapData::Svec(copied)))
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use crate::{intern::StaticSyms, runtime::Runtime, value::Value};

    #[test]
    fn copy_ast_allocates_fresh_expr_nodes() {
        let mut rt = Runtime::new();
        let inner = rt.expr(StaticSyms::Call, vec![Value::Int(1)]);
        let outer = rt.expr(StaticSyms::Call, vec![inner, Value::Int(2)]);
        let copy = super::copy_ast(&mut rt.heap, outer);
        let (Value::Expr(orig_id), Value::Expr(copy_id)) = (outer, copy) else {
            panic!("expected exprs");
        };
        assert_ne!(orig_id, copy_id);
        let copied_inner = rt.heap.expr(copy_id).args[0];
        assert_ne!(copied_inner, inner);
        assert_eq!(rt.heap.expr(copy_id).args[1], Value::Int(2));
    }
}
