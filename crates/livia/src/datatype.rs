//! Datatypes: the language's nominal type objects.
//!
//! Covers the three declarable flavors (abstract types, primitive "bits"
//! types, composite struct types), the supertype-legality rules enforced
//! when a definition installs its supertype, the subtype walk used by
//! dispatch, and field layout for composites.
//!
//! Parametric instantiation is intentionally rudimentary: the evaluator's
//! redefinition equivalence is restricted to non-parametric types, and the
//! inner-instantiation hooks (`reinstantiate_inner_types` /
//! `reset_instantiate_inner_types`) finalize or abandon a definition rather
//! than re-walk a parametric cache.

use crate::{
    exception::{EvalResult, typedef_error},
    heap::{HeapData, HeapId},
    intern::Symbol,
    runtime::Runtime,
    value::Value,
};

/// A type variable, as appears in parameter lists and static parameters.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TypeVar {
    pub name: Symbol,
    pub lb: Value,
    pub ub: Value,
}

/// A nominal type object.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DataType {
    pub name: Symbol,
    /// Installed by `set_datatype_super`; only the root `Any` is its own
    /// supertype.
    pub super_: Option<HeapId>,
    pub parameters: Vec<Value>,
    pub field_names: Vec<Symbol>,
    pub field_types: Vec<Value>,
    pub abstract_: bool,
    pub mutable_: bool,
    /// Bit width for primitive types; zero otherwise.
    pub nbits: u32,
    /// Byte size, filled by `compute_field_offsets` for composites.
    pub size: u32,
    pub ninitialized: u32,
    pub offsets: Vec<u32>,
    /// Canonical instance for singleton types.
    pub instance: Option<Value>,
}

impl DataType {
    fn named(name: Symbol, parameters: Vec<Value>) -> Self {
        Self {
            name,
            super_: None,
            parameters,
            field_names: Vec::new(),
            field_types: Vec::new(),
            abstract_: false,
            mutable_: false,
            nbits: 0,
            size: 0,
            ninitialized: 0,
            offsets: Vec::new(),
            instance: None,
        }
    }
}

impl Runtime {
    pub fn new_abstracttype(&mut self, name: Symbol, parameters: Vec<Value>) -> HeapId {
        let mut dt = DataType::named(name, parameters);
        dt.abstract_ = true;
        self.heap.alloc(HeapData::DataType(dt))
    }

    pub fn new_bitstype(&mut self, name: Symbol, parameters: Vec<Value>, nbits: u32) -> HeapId {
        let mut dt = DataType::named(name, parameters);
        dt.nbits = nbits;
        dt.size = nbits / 8;
        self.heap.alloc(HeapData::DataType(dt))
    }

    pub fn new_datatype(
        &mut self,
        name: Symbol,
        parameters: Vec<Value>,
        field_names: Vec<Symbol>,
        mutable_: bool,
        ninitialized: u32,
    ) -> HeapId {
        let mut dt = DataType::named(name, parameters);
        dt.field_names = field_names;
        dt.mutable_ = mutable_;
        dt.ninitialized = ninitialized;
        self.heap.alloc(HeapData::DataType(dt))
    }

    /// Installs the supertype of a datatype under definition.
    ///
    /// The supertype must be an abstract datatype distinct from the type
    /// being defined, and none of the special roots (`Vararg`, `Tuple`,
    /// `Type`, `Builtin`) may be extended.
    pub fn set_datatype_super(&mut self, dt: HeapId, super_val: Value) -> EvalResult<()> {
        let illegal = match super_val {
            Value::DataType(sup) => {
                let sup_dt = self.heap.datatype(sup);
                !sup_dt.abstract_
                    || sup_dt.name == self.heap.datatype(dt).name
                    || sup == self.prim.vararg
                    || sup == self.prim.tuple
                    || sup == self.prim.type_t
                    || sup == self.prim.builtin
            }
            _ => true,
        };
        if illegal {
            let name = self.interns.symbol_name(self.heap.datatype(dt).name);
            return Err(typedef_error(format!("invalid subtyping in definition of {name}")));
        }
        let Value::DataType(sup) = super_val else { unreachable!() };
        self.heap.datatype_mut(dt).super_ = Some(sup);
        Ok(())
    }

    /// Walks the supertype chain: is `a` a subtype of `b`?
    ///
    /// `Any` is the top of the lattice and its own supertype, which
    /// terminates the walk.
    pub fn subtype(&self, a: HeapId, b: HeapId) -> bool {
        let mut cur = a;
        loop {
            if cur == b {
                return true;
            }
            let dt = self.heap.datatype(cur);
            match dt.super_ {
                Some(sup) if sup != cur => cur = sup,
                _ => return cur == b,
            }
        }
    }

    /// Finalizes inner instantiations of a completed type definition.
    ///
    /// With parametric redefinition unsupported there is no instantiation
    /// cache to re-walk; what remains is validating that the freshly
    /// installed supertype chain terminates.
    pub fn reinstantiate_inner_types(&mut self, dt: HeapId) -> EvalResult<()> {
        let mut seen = 0usize;
        let mut cur = dt;
        while let Some(sup) = self.heap.datatype(cur).super_ {
            if sup == cur {
                return Ok(());
            }
            seen += 1;
            if seen > SUPER_CHAIN_LIMIT {
                let name = self.interns.symbol_name(self.heap.datatype(dt).name);
                return Err(typedef_error(format!("circular type declaration of {name}")));
            }
            cur = sup;
        }
        Ok(())
    }

    /// Abandons a failed type definition: no partially built structure may
    /// remain observable through the type object.
    pub fn reset_instantiate_inner_types(&mut self, dt: HeapId) {
        let data = self.heap.datatype_mut(dt);
        data.field_types.clear();
        data.offsets.clear();
        data.size = if data.nbits > 0 { data.nbits / 8 } else { 0 };
        data.instance = None;
    }

    /// Computes field offsets and total size for a composite type.
    ///
    /// Primitive fields are stored inline at their natural alignment;
    /// everything else is a word-sized reference.
    pub fn compute_field_offsets(&mut self, dt: HeapId) {
        let field_types = self.heap.datatype(dt).field_types.clone();
        let mut offsets = Vec::with_capacity(field_types.len());
        let mut offset = 0u32;
        let mut max_align = 1u32;
        for ft in field_types {
            let (size, align) = self.field_layout(ft);
            max_align = max_align.max(align);
            offset = offset.next_multiple_of(align);
            offsets.push(offset);
            offset += size;
        }
        let data = self.heap.datatype_mut(dt);
        data.offsets = offsets;
        data.size = offset.next_multiple_of(max_align);
    }

    fn field_layout(&self, field_type: Value) -> (u32, u32) {
        if let Value::DataType(id) = field_type {
            let dt = self.heap.datatype(id);
            if id == self.prim.bool_ {
                return (1, 1);
            }
            if dt.nbits > 0 {
                let size = dt.nbits / 8;
                return (size, size.min(8).next_power_of_two());
            }
        }
        (8, 8)
    }

    /// A datatype gets a canonical singleton instance when it is a concrete,
    /// immutable composite with no fields and no bit-level representation.
    pub fn is_datatype_make_singleton(&self, dt: HeapId) -> bool {
        let data = self.heap.datatype(dt);
        !data.abstract_ && !data.mutable_ && data.field_names.is_empty() && data.nbits == 0
    }

    /// The runtime type of a value.
    pub fn type_of(&self, v: Value) -> Value {
        let prim = &self.prim;
        let id = match v {
            Value::Nothing => prim.nothing_t,
            Value::Bool(_) => prim.bool_,
            Value::Int(_) => prim.int64,
            Value::Float(_) => prim.float64,
            Value::Sym(_) => prim.symbol,
            Value::Str(_) => prim.string,
            Value::Builtin(_) => prim.builtin,
            Value::Func(_) => prim.function,
            Value::Module(_) => prim.module,
            Value::Tuple(_) => prim.tuple,
            Value::DataType(_) => prim.datatype,
            Value::Struct(s) => self.heap.struct_data(s).ty,
            // IR nodes and the remaining runtime objects are only typed as
            // the top type at this layer.
            _ => prim.any,
        };
        Value::DataType(id)
    }
}

/// Bound on supertype-chain walks while finalizing a definition; a chain
/// longer than this is a cycle introduced by interleaved redefinitions.
const SUPER_CHAIN_LIMIT: usize = 10_000;

#[cfg(test)]
mod tests {
    use crate::{runtime::Runtime, value::Value};

    #[test]
    fn subtype_walks_super_chain() {
        let mut rt = Runtime::new();
        let animal = rt.symbol("Animal");
        let dog = rt.symbol("Dog");
        let abs = rt.new_abstracttype(animal, vec![]);
        rt.set_datatype_super(abs, Value::DataType(rt.prim.any)).unwrap();
        let concrete = rt.new_datatype(dog, vec![], vec![], false, 0);
        rt.set_datatype_super(concrete, Value::DataType(abs)).unwrap();
        assert!(rt.subtype(concrete, abs));
        assert!(rt.subtype(concrete, rt.prim.any));
        assert!(!rt.subtype(abs, concrete));
    }

    #[test]
    fn supertype_must_be_abstract_and_distinct() {
        let mut rt = Runtime::new();
        let name = rt.symbol("Leaf");
        let other_name = rt.symbol("Other");
        let concrete = rt.new_datatype(name, vec![], vec![], false, 0);
        let other = rt.new_datatype(other_name, vec![], vec![], false, 0);
        assert!(rt.set_datatype_super(other, Value::DataType(concrete)).is_err());
        assert!(rt.set_datatype_super(concrete, Value::DataType(rt.prim.tuple)).is_err());
        assert!(rt.set_datatype_super(concrete, Value::Int(1)).is_err());
    }

    #[test]
    fn field_offsets_respect_alignment() {
        let mut rt = Runtime::new();
        let name = rt.symbol("Mixed");
        let field_a = rt.symbol("a");
        let field_b = rt.symbol("b");
        let dt = rt.new_datatype(name, vec![], vec![field_a, field_b], false, 2);
        rt.heap.datatype_mut(dt).field_types = vec![Value::DataType(rt.prim.bool_), Value::DataType(rt.prim.int64)];
        rt.compute_field_offsets(dt);
        let data = rt.heap.datatype(dt);
        assert_eq!(data.offsets, vec![0, 8]);
        assert_eq!(data.size, 16);
    }
}
