//! The runtime: interner, heap, modules, and the evaluator's mutable cells.
//!
//! The current module, the task's current module, and the
//! typedef-in-progress flag behave like process-wide state, but live as
//! fields of [`Runtime`] and are threaded through evaluation as `&mut`.
//! Top-level evaluation saves and restores the module cells on every exit
//! path.
//!
//! `Runtime` also carries the IR builder surface (the contract the lowering
//! pass targets) and whole-runtime snapshotting: every id-addressed table
//! serializes, so `dump`/`load` round-trips evaluator state byte-for-byte.

use strum::IntoEnumIterator;

use crate::{
    builtins::Builtin,
    exception::Raised,
    heap::{Heap, HeapData, HeapId},
    intern::{Interns, StaticSyms, StringId, Symbol},
    ir::{ExprNode, LambdaInfo},
    module::{ModuleId, Modules},
    value::Value,
};

/// Heap ids of the primordial types, created once at startup.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct Primordials {
    pub any: HeapId,
    pub datatype: HeapId,
    pub bool_: HeapId,
    pub int64: HeapId,
    pub float64: HeapId,
    pub symbol: HeapId,
    pub string: HeapId,
    pub nothing_t: HeapId,
    pub tuple: HeapId,
    pub vararg: HeapId,
    pub type_t: HeapId,
    pub builtin: HeapId,
    pub function: HeapId,
    pub module: HeapId,
    /// The exception type thrown when dispatch finds no applicable method.
    pub method_error: HeapId,
}

/// Evaluator state: interner, arena, module table, and the mutable cells
/// the core reads and writes during evaluation.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct Runtime {
    pub(crate) interns: Interns,
    pub(crate) heap: Heap,
    pub(crate) modules: Modules,
    /// The root module; primordial types and builtins are bound here.
    pub main_module: ModuleId,
    pub(crate) current_module: ModuleId,
    pub(crate) task_current_module: ModuleId,
    pub(crate) inside_typedef: bool,
    pub(crate) exception_in_transit: Value,
    pub(crate) lineno: u32,
    pub(crate) prim: Primordials,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    /// Creates a runtime with the root module, primordial types, and
    /// builtins installed.
    pub fn new() -> Self {
        let mut interns = Interns::new();
        let mut heap = Heap::new();
        let mut modules = Modules::default();
        let main_module = modules.add(Symbol::from(StaticSyms::Main), None);

        // `Any` first: it is its own supertype, terminating every walk.
        let any = alloc_primordial(&mut heap, &mut interns, "Any", true);
        heap.datatype_mut(any).super_ = Some(any);
        let mut prim_type = |name: &str, abstract_: bool| {
            let id = alloc_primordial(&mut heap, &mut interns, name, abstract_);
            heap.datatype_mut(id).super_ = Some(any);
            id
        };
        let prim = Primordials {
            any,
            datatype: prim_type("DataType", false),
            bool_: prim_type("Bool", false),
            int64: prim_type("Int64", false),
            float64: prim_type("Float64", false),
            symbol: prim_type("Symbol", false),
            string: prim_type("String", false),
            nothing_t: prim_type("Nothing", false),
            tuple: prim_type("Tuple", false),
            vararg: prim_type("Vararg", true),
            type_t: prim_type("Type", true),
            builtin: prim_type("Builtin", true),
            function: prim_type("Function", true),
            module: prim_type("Module", false),
            method_error: prim_type("MethodError", false),
        };

        let f_sym = interns.symbol("f");
        let args_sym = interns.symbol("args");
        {
            let dt = heap.datatype_mut(prim.method_error);
            dt.field_names = vec![f_sym, args_sym];
            dt.field_types = vec![Value::DataType(any), Value::DataType(prim.tuple)];
            dt.ninitialized = 2;
        }

        for (id, nbits) in [(prim.bool_, 8), (prim.int64, 64), (prim.float64, 64)] {
            let dt = heap.datatype_mut(id);
            dt.nbits = nbits;
            dt.size = nbits / 8;
        }

        let mut rt = Self {
            interns,
            heap,
            modules,
            main_module,
            current_module: main_module,
            task_current_module: main_module,
            inside_typedef: false,
            exception_in_transit: Value::Nothing,
            lineno: 0,
            prim,
        };
        rt.install_root_bindings();
        rt
    }

    fn install_root_bindings(&mut self) {
        let main = self.main_module;
        for (name, id) in [
            ("Any", self.prim.any),
            ("DataType", self.prim.datatype),
            ("Bool", self.prim.bool_),
            ("Int64", self.prim.int64),
            ("Float64", self.prim.float64),
            ("Symbol", self.prim.symbol),
            ("String", self.prim.string),
            ("Nothing", self.prim.nothing_t),
            ("Tuple", self.prim.tuple),
            ("Vararg", self.prim.vararg),
            ("Type", self.prim.type_t),
            ("Builtin", self.prim.builtin),
            ("Function", self.prim.function),
            ("Module", self.prim.module),
            ("MethodError", self.prim.method_error),
        ] {
            let sym = self.interns.symbol(name);
            self.bind_const(main, sym, Value::DataType(id));
        }
        let nothing_sym = self.interns.symbol("nothing");
        self.bind_const(main, nothing_sym, Value::Nothing);
        for b in Builtin::iter() {
            let sym = self.interns.symbol(b.into());
            self.bind_const(main, sym, Value::Builtin(b));
        }
    }

    fn bind_const(&mut self, module: ModuleId, name: Symbol, value: Value) {
        let binding = self.modules.get_binding_wr(module, name);
        binding.constp = true;
        binding.value = Some(value);
    }

    // ------------------------------------------------------------------
    // IR builder surface
    // ------------------------------------------------------------------

    /// Interns a symbol name.
    pub fn symbol(&mut self, name: &str) -> Symbol {
        self.interns.symbol(name)
    }

    /// A bare symbol value.
    pub fn sym(&mut self, name: &str) -> Value {
        Value::Sym(self.interns.symbol(name))
    }

    /// An interned string value.
    pub fn str_value(&mut self, s: &str) -> Value {
        Value::Str(self.interns.string(s))
    }

    /// Allocates a compound expression node.
    pub fn expr(&mut self, head: impl Into<Symbol>, args: Vec<Value>) -> Value {
        Value::Expr(self.heap.alloc(HeapData::Expr(ExprNode { head: head.into(), args })))
    }

    /// Allocates a simple vector.
    pub fn svec(&mut self, elements: Vec<Value>) -> Value {
        Value::Svec(self.heap.alloc(HeapData::Svec(elements)))
    }

    /// Allocates a tuple.
    pub fn tuple(&mut self, elements: Vec<Value>) -> Value {
        Value::Tuple(self.heap.alloc(HeapData::Tuple(elements)))
    }

    /// Wraps a value in a quote node.
    pub fn quote(&mut self, inner: Value) -> Value {
        Value::Quote(self.heap.alloc(HeapData::Quote(inner)))
    }

    /// Allocates a lowered method body.
    pub fn lambda(&mut self, info: LambdaInfo) -> Value {
        Value::Lambda(self.heap.alloc(HeapData::Lambda(info)))
    }

    /// Allocates an unbounded type variable.
    pub fn typevar(&mut self, name: &str) -> Value {
        let sym = self.interns.symbol(name);
        let any = Value::DataType(self.prim.any);
        Value::TypeVar(self.heap.alloc(HeapData::TypeVar(crate::datatype::TypeVar {
            name: sym,
            lb: Value::Nothing,
            ub: any,
        })))
    }

    /// Creates a module and binds it const in its parent.
    pub fn add_module(&mut self, name: &str, parent: ModuleId) -> ModuleId {
        let sym = self.interns.symbol(name);
        let id = self.modules.add(sym, Some(parent));
        self.bind_const(parent, sym, Value::Module(id));
        id
    }

    // ------------------------------------------------------------------
    // Inspection helpers
    // ------------------------------------------------------------------

    /// Looks up a global by name, for hosts and tests.
    pub fn global(&mut self, module: ModuleId, name: &str) -> Option<Value> {
        let sym = self.interns.symbol(name);
        self.modules.get_global(module, sym)
    }

    /// The module top-level evaluation currently executes in.
    pub fn current_module(&self) -> ModuleId {
        self.current_module
    }

    /// The line most recently recorded by top-level execution.
    pub fn lineno(&self) -> u32 {
        self.lineno
    }

    /// The exception currently in transit, as read by `the_exception`.
    pub fn exception_in_transit(&self) -> Value {
        self.exception_in_transit
    }

    /// Structural equality on values, the language's `===`.
    pub fn egal(&self, a: Value, b: Value) -> bool {
        crate::value::egal(&self.heap, a, b)
    }

    /// The type object behind a datatype value, for hosts and tests.
    pub fn datatype_info(&self, v: Value) -> Option<&crate::datatype::DataType> {
        match v {
            Value::DataType(id) => Some(self.heap.datatype(id)),
            _ => None,
        }
    }

    /// The name of a symbol, for hosts and tests.
    pub fn symbol_name(&self, sym: Symbol) -> &str {
        self.interns.symbol_name(sym)
    }

    /// The content of an interned string value.
    pub fn string_content(&self, id: StringId) -> &str {
        self.interns.get_string(id)
    }

    /// Renders a value for diagnostics.
    pub fn display_value(&self, v: Value) -> String {
        match v {
            Value::Nothing => "nothing".to_owned(),
            Value::Bool(b) => b.to_string(),
            Value::Int(n) => n.to_string(),
            Value::Float(x) => x.to_string(),
            Value::Sym(s) => format!(":{}", self.interns.symbol_name(s)),
            Value::Str(id) => format!("{:?}", self.interns.get_string(id)),
            Value::Ssa(id) => format!("ssa({id})"),
            Value::Slot(n) => format!("slot({n})"),
            Value::GlobalRef { module, name } => format!(
                "{}.{}",
                self.interns.symbol_name(self.modules.get(module).name),
                self.interns.symbol_name(name)
            ),
            Value::Goto(label) => format!("goto {label}"),
            Value::Line(line) => format!("line {line}"),
            Value::NewVar(n) => format!("newvar slot({n})"),
            Value::Builtin(b) => b.to_string(),
            Value::Module(m) => format!("module {}", self.interns.symbol_name(self.modules.get(m).name)),
            Value::Expr(id) => format!("expr({})", self.interns.symbol_name(self.heap.expr(id).head)),
            Value::Quote(_) => "quote".to_owned(),
            Value::Svec(id) => format!("svec of {}", self.heap.svec(id).len()),
            Value::Tuple(id) => {
                let parts: Vec<String> = self.heap.tuple(id).iter().map(|e| self.display_value(*e)).collect();
                format!("({})", parts.join(", "))
            }
            Value::Lambda(_) => "lambda".to_owned(),
            Value::DataType(id) => self.interns.symbol_name(self.heap.datatype(id).name).to_owned(),
            Value::TypeVar(id) => self.interns.symbol_name(self.heap.typevar(id).name).to_owned(),
            Value::Struct(id) => {
                let data = self.heap.struct_data(id);
                let name = self.interns.symbol_name(self.heap.datatype(data.ty).name);
                let parts: Vec<String> = data
                    .fields
                    .iter()
                    .map(|f| f.map_or_else(|| "#undef".to_owned(), |v| self.display_value(v)))
                    .collect();
                format!("{name}({})", parts.join(", "))
            }
            Value::Func(id) => self.interns.symbol_name(self.heap.func(id).name).to_owned(),
        }
    }

    /// The value `the_exception` should observe for a caught raise.
    pub(crate) fn exception_value(&mut self, raised: &Raised) -> Value {
        match raised.kind {
            crate::exception::ExcKind::UserThrown(v) => v,
            _ => Value::Str(self.interns.string(&raised.msg)),
        }
    }

    // ------------------------------------------------------------------
    // Snapshotting
    // ------------------------------------------------------------------

    /// Serializes the whole runtime to a binary snapshot.
    pub fn dump(&self) -> Result<Vec<u8>, postcard::Error> {
        postcard::to_allocvec(self)
    }

    /// Restores a runtime from a snapshot produced by [`Runtime::dump`].
    pub fn load(bytes: &[u8]) -> Result<Self, postcard::Error> {
        postcard::from_bytes(bytes)
    }
}

fn alloc_primordial(heap: &mut Heap, interns: &mut Interns, name: &str, abstract_: bool) -> HeapId {
    let sym = interns.symbol(name);
    let mut dt = crate::datatype::DataType {
        name: sym,
        super_: None,
        parameters: Vec::new(),
        field_names: Vec::new(),
        field_types: Vec::new(),
        abstract_,
        mutable_: false,
        nbits: 0,
        size: 0,
        ninitialized: 0,
        offsets: Vec::new(),
        instance: None,
    };
    if !abstract_ {
        dt.size = 8;
    }
    heap.alloc(HeapData::DataType(dt))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_round_trips() {
        let mut rt = Runtime::new();
        let main = rt.main_module;
        let x = rt.symbol("x");
        rt.checked_assignment(main, x, Value::Int(7)).unwrap();
        let bytes = rt.dump().unwrap();
        let mut restored = Runtime::load(&bytes).unwrap();
        assert_eq!(restored.global(main, "x"), Some(Value::Int(7)));
        assert_eq!(restored.prim.any, rt.prim.any);
    }

    #[test]
    fn builtins_are_bound_in_main() {
        let mut rt = Runtime::new();
        let main = rt.main_module;
        assert_eq!(rt.global(main, "+"), Some(Value::Builtin(Builtin::Add)));
        assert_eq!(rt.global(main, "tuple"), Some(Value::Builtin(Builtin::Tuple)));
        assert!(matches!(rt.global(main, "Any"), Some(Value::DataType(_))));
    }
}
