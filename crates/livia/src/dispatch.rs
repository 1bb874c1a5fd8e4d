//! Generic functions and method dispatch.
//!
//! A generic function owns an ordered method table. The `method` IR form
//! declares the function (creating a constant binding) and installs methods;
//! `apply_generic` selects and invokes one for a set of evaluated arguments.
//!
//! Signatures follow the convention that element 0 is the generic function
//! value itself, so lowered method bodies receive the callee as their first
//! argument. Selection scans the table newest-first and takes the first
//! signature whose element types cover the argument types; a full
//! specificity lattice is a dispatch-layer concern outside this crate.

use crate::{
    builtins::call_builtin,
    exception::{EvalError, EvalResult, ExcKind, type_error},
    heap::{HeapData, HeapId, StructInstance},
    intern::Symbol,
    interp::Interp,
    module::ModuleId,
    runtime::Runtime,
    tracer::EvalTracer,
    value::{Value, egal},
};

/// One concrete method: its signature and lowered body.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Method {
    /// Signature types; element 0 is the owning generic function.
    pub sig: Vec<Value>,
    pub lam: HeapId,
}

/// A generic function: a name plus its method table, newest last.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct GenericFunc {
    pub name: Symbol,
    pub methods: Vec<Method>,
}

impl Runtime {
    /// Declares (or finds) the generic function bound to `name` in `module`.
    ///
    /// Creates a constant binding holding a fresh, method-less generic
    /// function when the name is unbound.
    pub fn generic_function_def(&mut self, name: Symbol, module: ModuleId) -> EvalResult<Value> {
        self.get_binding_for_method_def(module, name)?;
        if let Some(existing) = self.modules.get_global(module, name) {
            return Ok(existing);
        }
        let func = self.heap.alloc(HeapData::Func(GenericFunc { name, methods: Vec::new() }));
        let binding = self.modules.get_binding_wr(module, name);
        binding.constp = true;
        binding.value = Some(Value::Func(func));
        Ok(Value::Func(func))
    }

    /// Installs a method into the generic function named by the signature.
    ///
    /// A method whose signature is `egal` to an existing one replaces it;
    /// otherwise it is appended. The trailing `method` form argument is
    /// opaque data the original forwarded to its installer; it is accepted
    /// and ignored here.
    pub fn method_def(&mut self, sig: Value, meth: Value, _extra: Value) -> EvalResult<()> {
        let Value::Svec(sig_id) = sig else {
            return Err(type_error("method: expected a signature type vector"));
        };
        let sig_elts = self.heap.svec(sig_id).to_vec();
        let Some(&Value::Func(func)) = sig_elts.first() else {
            return Err(type_error("method: signature must name a generic function"));
        };
        for elt in &sig_elts[1..] {
            if !elt.is_type() && !elt.is_typevar() {
                return Err(type_error("method: signature elements must be types"));
            }
        }
        let Value::Lambda(lam) = meth else {
            return Err(type_error("method: expected a lambda for the method body"));
        };
        if let Some(existing) = self.find_method_mut(func, &sig_elts) {
            existing.lam = lam;
        } else {
            self.heap.func_mut(func).methods.push(Method { sig: sig_elts, lam });
        }
        Ok(())
    }

    /// Builds the exception value thrown for a failed dispatch: a
    /// `MethodError` instance holding the callee and an argument tuple.
    pub(crate) fn method_error_value(&mut self, f: Value, args: &[Value]) -> Value {
        let args_tuple = self.tuple(args.to_vec());
        let exc = self.heap.alloc(HeapData::Struct(StructInstance {
            ty: self.prim.method_error,
            fields: vec![Some(f), Some(args_tuple)],
        }));
        Value::Struct(exc)
    }

    /// A raised `MethodError` with the standard no-method message.
    pub(crate) fn method_error(&mut self, f: Value, args: &[Value]) -> EvalError {
        let shown: Vec<String> = args.iter().map(|a| self.display_value(*a)).collect();
        let msg = format!("no method matching {}({})", self.display_value(f), shown.join(", "));
        let exc = self.method_error_value(f, args);
        EvalError::raise(ExcKind::UserThrown(exc), msg)
    }

    fn find_method_mut(&mut self, func: HeapId, sig: &[Value]) -> Option<&mut Method> {
        let idx = self.heap.func(func).methods.iter().position(|m| {
            m.sig.len() == sig.len() && m.sig.iter().zip(sig).all(|(a, b)| egal(&self.heap, *a, *b))
        })?;
        Some(&mut self.heap.func_mut(func).methods[idx])
    }

    /// Whether a method signature covers the given argument values.
    fn sig_matches(&self, sig: &[Value], argv: &[Value]) -> bool {
        if sig.len() != argv.len() {
            return false;
        }
        sig.iter().zip(argv).skip(1).all(|(st, arg)| match st {
            Value::DataType(expected) => {
                let Value::DataType(actual) = self.type_of(*arg) else {
                    return false;
                };
                self.subtype(actual, *expected)
            }
            Value::TypeVar(_) => true,
            _ => false,
        })
    }
}

impl<T: EvalTracer> Interp<'_, T> {
    /// Invokes a callee on evaluated arguments (`argv[0]` is the callee).
    pub(crate) fn apply_generic(&mut self, argv: &[Value]) -> EvalResult<Value> {
        let Some(&callee) = argv.first() else {
            return Err(EvalError::internal("apply_generic: empty argument vector"));
        };
        match callee {
            Value::Builtin(b) => {
                self.tracer.on_builtin_call(b, argv.len() - 1);
                call_builtin(self.rt, b, &argv[1..])
            }
            Value::Func(func) => {
                let selected = self
                    .rt
                    .heap
                    .func(func)
                    .methods
                    .iter()
                    .rev()
                    .find(|m| self.rt.sig_matches(&m.sig, argv))
                    .map(|m| m.lam);
                match selected {
                    Some(lam) => {
                        self.tracer.on_method_call(self.rt.heap.func(func).name, argv.len() - 1);
                        self.call_method_internal(lam, argv)
                    }
                    None => Err(self.rt.method_error(callee, &argv[1..])),
                }
            }
            other => {
                let msg = format!(
                    "objects of type {} are not callable",
                    self.rt.display_value(self.rt.type_of(other))
                );
                let exc = self.rt.method_error_value(other, &argv[1..]);
                Err(EvalError::raise(ExcKind::UserThrown(exc), msg))
            }
        }
    }

    /// Runs a method body directly, bypassing dispatch.
    pub(crate) fn call_method_internal(&mut self, lam: HeapId, argv: &[Value]) -> EvalResult<Value> {
        self.interpret_call(lam, argv, None)
    }
}

#[cfg(test)]
mod tests {
    use crate::{runtime::Runtime, value::Value};

    #[test]
    fn generic_function_def_is_idempotent() {
        let mut rt = Runtime::new();
        let main = rt.main_module;
        let name = rt.symbol("area");
        let f1 = rt.generic_function_def(name, main).unwrap();
        let f2 = rt.generic_function_def(name, main).unwrap();
        assert_eq!(f1, f2);
        let binding = rt.modules.get(main).binding(name).unwrap();
        assert!(binding.constp);
    }

    #[test]
    fn generic_function_def_rejects_bound_values() {
        let mut rt = Runtime::new();
        let main = rt.main_module;
        let name = rt.symbol("width");
        rt.checked_assignment(main, name, Value::Int(3)).unwrap();
        assert!(rt.generic_function_def(name, main).is_err());
    }
}
