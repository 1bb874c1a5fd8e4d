//! Top-level evaluation: the driver surface the body executor delegates to
//! for forms that only make sense at top level.
//!
//! `thunk` expressions run their lowered body as a zero-argument call;
//! `module` expressions create a module, switch the current-module cells to
//! it for the body, and restore them on every exit path.

use crate::{
    exception::{EvalResult, invalid_ir},
    intern::StaticSyms,
    interp::Interp,
    runtime::Runtime,
    tracer::{EvalTracer, NoopTracer},
    value::Value,
};

impl Runtime {
    /// Whether this form may only be evaluated at top level.
    pub fn is_toplevel_only_expr(&self, e: Value) -> bool {
        matches!(e, Value::Expr(id) if self.heap.expr(id).head.as_static() == Some(StaticSyms::Module))
    }

    /// Evaluates a top-level form: thunks run as zero-argument bodies,
    /// module expressions build modules, everything else evaluates with no
    /// frame.
    pub fn toplevel_eval(&mut self, e: Value) -> EvalResult<Value> {
        let mut tracer = NoopTracer;
        Interp { rt: self, tracer: &mut tracer }.toplevel_eval(e)
    }
}

impl<T: EvalTracer> Interp<'_, T> {
    pub(crate) fn toplevel_eval(&mut self, e: Value) -> EvalResult<Value> {
        if let Value::Expr(id) = e {
            match self.rt.heap.expr(id).head.as_static() {
                Some(StaticSyms::Thunk) => {
                    let arg = self.rt.heap.expr(id).args.first().copied();
                    let Some(Value::Lambda(lam)) = arg else {
                        return Err(invalid_ir("malformed \"thunk\" expression"));
                    };
                    return self.interpret_toplevel_thunk(lam);
                }
                Some(StaticSyms::Module) => {
                    let args = self.rt.heap.expr(id).args.clone();
                    return self.eval_module_expr(&args);
                }
                _ => {}
            }
        }
        self.eval(e, None)
    }

    /// Evaluates a `module` expression: `(module name (block stmts...))`.
    ///
    /// The new module is bound const in the enclosing module, the
    /// current-module cells point at it while the body runs, and they are
    /// restored whether the body completes or raises.
    pub(crate) fn eval_module_expr(&mut self, args: &[Value]) -> EvalResult<Value> {
        let &[name_v, body_v] = args else {
            return Err(invalid_ir("malformed \"module\" expression"));
        };
        let Value::Sym(name) = name_v else {
            return Err(invalid_ir("module name must be a symbol"));
        };
        let Value::Expr(body_id) = body_v else {
            return Err(invalid_ir("malformed \"module\" expression"));
        };
        let parent = self.rt.current_module;
        let module = self.rt.modules.add(name, Some(parent));
        self.rt.declare_constant(parent, name)?;
        self.rt.checked_assignment(parent, name, Value::Module(module))?;

        let stmts = self.rt.heap.expr(body_id).args.clone();
        let last_m = self.rt.current_module;
        let task_last_m = self.rt.task_current_module;
        self.rt.current_module = module;
        self.rt.task_current_module = module;
        let mut result = Ok(Value::Module(module));
        for stmt in stmts {
            if let Err(e) = self.toplevel_eval(stmt) {
                result = Err(e);
                break;
            }
        }
        self.rt.current_module = last_m;
        self.rt.task_current_module = task_last_m;
        result
    }
}
