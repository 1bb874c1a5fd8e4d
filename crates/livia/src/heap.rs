//! Arena storage for compound runtime objects.
//!
//! Every compound object (expression node, simple vector, datatype, struct
//! instance, ...) lives in one arena and is addressed by [`HeapId`]. `Value`
//! stays `Copy` by carrying ids instead of owned data, and id equality is the
//! language's object identity for mutable objects.
//!
//! The arena never frees during evaluation; reclaiming garbage is the
//! embedding host's concern. Snapshots serialize the whole arena, so ids
//! stay valid across a dump/load round trip.

use crate::{
    datatype::{DataType, TypeVar},
    dispatch::GenericFunc,
    ir::{ExprNode, LambdaInfo},
    value::Value,
};

/// Index of an object in the heap arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct HeapId(u32);

impl HeapId {
    #[inline]
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// A struct instance: its type plus field storage.
///
/// Fields are `None` until written; `new` fills a prefix in argument order
/// and the rest stay unset until a `setfield` call.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct StructInstance {
    pub ty: HeapId,
    pub fields: Vec<Option<Value>>,
}

/// One arena cell.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum HeapData {
    Expr(ExprNode),
    Quote(Value),
    Svec(Vec<Value>),
    Tuple(Vec<Value>),
    Lambda(LambdaInfo),
    DataType(DataType),
    TypeVar(TypeVar),
    Struct(StructInstance),
    Func(GenericFunc),
}

/// The arena.
#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct Heap {
    cells: Vec<HeapData>,
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, data: HeapData) -> HeapId {
        let id = HeapId(u32::try_from(self.cells.len()).expect("heap overflow"));
        self.cells.push(data);
        id
    }

    /// # Panics
    /// Panics if `id` is not a valid cell.
    pub fn get(&self, id: HeapId) -> &HeapData {
        &self.cells[id.index()]
    }

    /// # Panics
    /// Panics if `id` is not a valid cell.
    pub fn get_mut(&mut self, id: HeapId) -> &mut HeapData {
        &mut self.cells[id.index()]
    }

    // Typed accessors. Callers have already matched on the `Value` variant
    // carrying the id, so a kind mismatch is a corrupted heap.

    pub fn expr(&self, id: HeapId) -> &ExprNode {
        match self.get(id) {
            HeapData::Expr(e) => e,
            other => panic!("heap cell {id:?} is not an Expr: {other:?}"),
        }
    }

    pub fn quoted(&self, id: HeapId) -> Value {
        match self.get(id) {
            HeapData::Quote(v) => *v,
            other => panic!("heap cell {id:?} is not a Quote: {other:?}"),
        }
    }

    pub fn svec(&self, id: HeapId) -> &[Value] {
        match self.get(id) {
            HeapData::Svec(v) => v,
            other => panic!("heap cell {id:?} is not an Svec: {other:?}"),
        }
    }

    pub fn tuple(&self, id: HeapId) -> &[Value] {
        match self.get(id) {
            HeapData::Tuple(v) => v,
            other => panic!("heap cell {id:?} is not a Tuple: {other:?}"),
        }
    }

    pub fn lambda(&self, id: HeapId) -> &LambdaInfo {
        match self.get(id) {
            HeapData::Lambda(l) => l,
            other => panic!("heap cell {id:?} is not a Lambda: {other:?}"),
        }
    }

    pub fn datatype(&self, id: HeapId) -> &DataType {
        match self.get(id) {
            HeapData::DataType(d) => d,
            other => panic!("heap cell {id:?} is not a DataType: {other:?}"),
        }
    }

    pub fn datatype_mut(&mut self, id: HeapId) -> &mut DataType {
        match self.get_mut(id) {
            HeapData::DataType(d) => d,
            other => panic!("heap cell {id:?} is not a DataType: {other:?}"),
        }
    }

    pub fn typevar(&self, id: HeapId) -> &TypeVar {
        match self.get(id) {
            HeapData::TypeVar(t) => t,
            other => panic!("heap cell {id:?} is not a TypeVar: {other:?}"),
        }
    }

    pub fn struct_data(&self, id: HeapId) -> &StructInstance {
        match self.get(id) {
            HeapData::Struct(s) => s,
            other => panic!("heap cell {id:?} is not a Struct: {other:?}"),
        }
    }

    pub fn struct_data_mut(&mut self, id: HeapId) -> &mut StructInstance {
        match self.get_mut(id) {
            HeapData::Struct(s) => s,
            other => panic!("heap cell {id:?} is not a Struct: {other:?}"),
        }
    }

    pub fn func(&self, id: HeapId) -> &GenericFunc {
        match self.get(id) {
            HeapData::Func(f) => f,
            other => panic!("heap cell {id:?} is not a Func: {other:?}"),
        }
    }

    pub fn func_mut(&mut self, id: HeapId) -> &mut GenericFunc {
        match self.get_mut(id) {
            HeapData::Func(f) => f,
            other => panic!("heap cell {id:?} is not a Func: {other:?}"),
        }
    }
}
