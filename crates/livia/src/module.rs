//! Modules and their binding tables.
//!
//! A binding is a named, writable cell in a module's symbol table, possibly
//! marked constant. Binding tables are insertion-ordered so module
//! inspection and snapshots are deterministic.
//!
//! All modules live in one [`Modules`] store and are addressed by
//! [`ModuleId`]; this keeps `Value::Module` copyable and lets frames name
//! their enclosing module without borrowing it.

use indexmap::IndexMap;

use crate::{
    exception::{EvalError, EvalResult, ExcKind},
    intern::Symbol,
    runtime::Runtime,
    value::{Value, egal},
};

/// Index of a module in the module store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ModuleId(u32);

impl ModuleId {
    #[inline]
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// A named, writable cell in a module's symbol table.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Binding {
    pub name: Symbol,
    pub value: Option<Value>,
    pub constp: bool,
    pub owner: ModuleId,
}

/// A module: a name plus its binding table.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct Module {
    pub name: Symbol,
    pub parent: Option<ModuleId>,
    bindings: IndexMap<Symbol, Binding, ahash::RandomState>,
}

impl Module {
    pub fn binding(&self, name: Symbol) -> Option<&Binding> {
        self.bindings.get(&name)
    }

    /// Iterates bindings in insertion order.
    pub fn bindings(&self) -> impl Iterator<Item = &Binding> {
        self.bindings.values()
    }
}

/// Storage for all modules of a runtime.
#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct Modules {
    list: Vec<Module>,
}

impl Modules {
    pub fn add(&mut self, name: Symbol, parent: Option<ModuleId>) -> ModuleId {
        let id = ModuleId(u32::try_from(self.list.len()).expect("module table overflow"));
        self.list.push(Module {
            name,
            parent,
            bindings: IndexMap::default(),
        });
        id
    }

    /// # Panics
    /// Panics if `id` is not a valid module.
    pub fn get(&self, id: ModuleId) -> &Module {
        &self.list[id.index()]
    }

    /// Looks a symbol up in a module's binding table.
    pub fn get_global(&self, module: ModuleId, name: Symbol) -> Option<Value> {
        self.get(module).bindings.get(&name).and_then(|b| b.value)
    }

    /// Returns the writable binding for `name`, creating an empty mutable
    /// binding if none exists.
    pub fn get_binding_wr(&mut self, module: ModuleId, name: Symbol) -> &mut Binding {
        self.list[module.index()].bindings.entry(name).or_insert(Binding {
            name,
            value: None,
            constp: false,
            owner: module,
        })
    }

    pub(crate) fn set_binding_value(&mut self, module: ModuleId, name: Symbol, value: Option<Value>) {
        self.get_binding_wr(module, name).value = value;
    }
}

impl Runtime {
    /// Assigns `value` to the binding, enforcing constancy.
    ///
    /// Reassigning a constant is allowed only when the new value is
    /// `egal`-identical to the old one, in which case the store is a no-op.
    pub fn checked_assignment(&mut self, module: ModuleId, name: Symbol, value: Value) -> EvalResult<()> {
        let binding = self.modules.get_binding_wr(module, name);
        if binding.constp {
            if let Some(old) = binding.value {
                if !egal(&self.heap, old, value) {
                    return Err(EvalError::raise(
                        ExcKind::TypeMismatch,
                        format!("invalid redefinition of constant {}", self.interns.symbol_name(name)),
                    ));
                }
                return Ok(());
            }
        }
        self.modules.set_binding_value(module, name, Some(value));
        Ok(())
    }

    /// Marks the binding constant.
    ///
    /// A binding that already holds a value cannot retroactively become
    /// constant.
    pub fn declare_constant(&mut self, module: ModuleId, name: Symbol) -> EvalResult<()> {
        let binding = self.modules.get_binding_wr(module, name);
        if binding.value.is_some() && !binding.constp {
            return Err(EvalError::raise(
                ExcKind::TypeMismatch,
                format!(
                    "cannot declare {} constant; it already has a value",
                    self.interns.symbol_name(name)
                ),
            ));
        }
        binding.constp = true;
        Ok(())
    }

    /// Resolves the binding a method definition for `name` should extend.
    ///
    /// Fails when the name is already bound to anything other than a generic
    /// function.
    pub fn get_binding_for_method_def(&mut self, module: ModuleId, name: Symbol) -> EvalResult<()> {
        let binding = self.modules.get_binding_wr(module, name);
        match binding.value {
            None | Some(Value::Func(_)) => Ok(()),
            Some(_) => Err(EvalError::raise(
                ExcKind::TypeMismatch,
                format!(
                    "cannot define function {}; it already has a value",
                    self.interns.symbol_name(name)
                ),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{runtime::Runtime, value::Value};

    #[test]
    fn constants_reject_different_values() {
        let mut rt = Runtime::new();
        let main = rt.main_module;
        let x = rt.symbol("x");
        rt.checked_assignment(main, x, Value::Int(1)).unwrap();
        rt.checked_assignment(main, x, Value::Int(2)).unwrap();

        let c = rt.symbol("c");
        rt.declare_constant(main, c).unwrap();
        rt.checked_assignment(main, c, Value::Int(1)).unwrap();
        // egal value: silently absorbed
        rt.checked_assignment(main, c, Value::Int(1)).unwrap();
        // different value: rejected
        assert!(rt.checked_assignment(main, c, Value::Int(2)).is_err());
        assert_eq!(rt.modules.get_global(main, c), Some(Value::Int(1)));
    }

    #[test]
    fn declare_constant_requires_unassigned_binding() {
        let mut rt = Runtime::new();
        let main = rt.main_module;
        let y = rt.symbol("y");
        rt.checked_assignment(main, y, Value::Int(5)).unwrap();
        assert!(rt.declare_constant(main, y).is_err());
    }
}
