//! The runtime value representation.
//!
//! `Value` uses a hybrid design: small immediate values (ints, bools,
//! symbols, IR position nodes) are stored inline, while compound objects
//! (expressions, vectors, datatypes, struct instances) live in the arena and
//! are referenced by `HeapId`. Everything the evaluator touches is a
//! `Value`: lowered IR nodes are ordinary values, which is what makes
//! `quote` and `copyast` meaningful.
//!
//! NOTE: it's important to keep this type `Copy` and small - statement
//! fetching and argument evaluation copy values freely.

use crate::{
    builtins::Builtin,
    heap::{Heap, HeapId},
    intern::{StringId, Symbol},
    module::ModuleId,
};

/// Primary value type representing Livia objects at runtime.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Value {
    // Immediate values (stored inline, no heap allocation)
    Nothing,
    Bool(bool),
    Int(i64),
    Float(f64),
    Sym(Symbol),
    /// An interned string literal. Look the content up in `Interns`.
    Str(StringId),
    /// Reference to the `id`-th SSA temporary of the current frame (0-based).
    Ssa(u32),
    /// Reference to the `n`-th local slot of the current frame (1-based).
    Slot(u32),
    /// A module-qualified name, resolved in that module's binding table.
    GlobalRef { module: ModuleId, name: Symbol },
    /// Statement node: unconditional jump to a 1-based statement label.
    Goto(u32),
    /// Statement node: source line marker.
    Line(u32),
    /// Statement node: resets the referenced slot to uninitialized.
    NewVar(u32),
    Builtin(Builtin),
    Module(ModuleId),

    // Heap-allocated values (stored in the arena)
    Expr(HeapId),
    Quote(HeapId),
    Svec(HeapId),
    Tuple(HeapId),
    Lambda(HeapId),
    DataType(HeapId),
    TypeVar(HeapId),
    Struct(HeapId),
    Func(HeapId),
}

impl Value {
    #[inline]
    pub fn is_expr(self) -> bool {
        matches!(self, Self::Expr(_))
    }

    #[inline]
    pub fn is_symbol(self) -> bool {
        matches!(self, Self::Sym(_))
    }

    #[inline]
    pub fn is_long(self) -> bool {
        matches!(self, Self::Int(_))
    }

    #[inline]
    pub fn is_string(self) -> bool {
        matches!(self, Self::Str(_))
    }

    #[inline]
    pub fn is_datatype(self) -> bool {
        matches!(self, Self::DataType(_))
    }

    #[inline]
    pub fn is_typevar(self) -> bool {
        matches!(self, Self::TypeVar(_))
    }

    #[inline]
    pub fn is_svec(self) -> bool {
        matches!(self, Self::Svec(_))
    }

    #[inline]
    pub fn is_ssavalue(self) -> bool {
        matches!(self, Self::Ssa(_))
    }

    #[inline]
    pub fn is_slot(self) -> bool {
        matches!(self, Self::Slot(_))
    }

    #[inline]
    pub fn is_globalref(self) -> bool {
        matches!(self, Self::GlobalRef { .. })
    }

    #[inline]
    pub fn is_quotenode(self) -> bool {
        matches!(self, Self::Quote(_))
    }

    #[inline]
    pub fn is_gotonode(self) -> bool {
        matches!(self, Self::Goto(_))
    }

    #[inline]
    pub fn is_linenode(self) -> bool {
        matches!(self, Self::Line(_))
    }

    #[inline]
    pub fn is_newvarnode(self) -> bool {
        matches!(self, Self::NewVar(_))
    }

    /// True for values usable as a type: concrete and abstract datatypes.
    /// Type variables are deliberately not types; the composite field check
    /// accepts them separately.
    #[inline]
    pub fn is_type(self) -> bool {
        matches!(self, Self::DataType(_))
    }

    /// True for concrete composite datatypes, the only types `new` can
    /// instantiate.
    pub fn is_structtype(self, heap: &Heap) -> bool {
        match self {
            Self::DataType(id) => {
                let dt = heap.datatype(id);
                !dt.abstract_ && dt.nbits == 0
            }
            _ => false,
        }
    }

    #[inline]
    pub fn as_long(self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(n),
            _ => None,
        }
    }

    #[inline]
    pub fn as_symbol(self) -> Option<Symbol> {
        match self {
            Self::Sym(s) => Some(s),
            _ => None,
        }
    }
}

/// Structural equality on values, the language's `===`.
///
/// Immediates compare by value (floats by bit pattern, so `-0.0 !== 0.0` and
/// `NaN === NaN`). Simple vectors and tuples compare element-wise. Struct
/// instances of immutable types compare field-wise; instances of mutable
/// types, and every other heap object, compare by identity.
pub fn egal(heap: &Heap, a: Value, b: Value) -> bool {
    match (a, b) {
        (Value::Float(x), Value::Float(y)) => x.to_bits() == y.to_bits(),
        (Value::Svec(x), Value::Svec(y)) => x == y || egal_slices(heap, heap.svec(x), heap.svec(y)),
        (Value::Tuple(x), Value::Tuple(y)) => x == y || egal_slices(heap, heap.tuple(x), heap.tuple(y)),
        (Value::Struct(x), Value::Struct(y)) => {
            if x == y {
                return true;
            }
            let (sx, sy) = (heap.struct_data(x), heap.struct_data(y));
            if sx.ty != sy.ty || heap.datatype(sx.ty).mutable_ {
                return false;
            }
            sx.fields.len() == sy.fields.len()
                && sx.fields.iter().zip(&sy.fields).all(|(fx, fy)| match (fx, fy) {
                    (Some(vx), Some(vy)) => egal(heap, *vx, *vy),
                    (None, None) => true,
                    _ => false,
                })
        }
        _ => a == b,
    }
}

fn egal_slices(heap: &Heap, xs: &[Value], ys: &[Value]) -> bool {
    xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| egal(heap, *x, *y))
}
