//! The tree-walking evaluator core.
//!
//! Two cooperating pieces: [`Interp::eval`] resolves a single IR node to a
//! value, and [`Interp::eval_body`] walks a lowered statement sequence with
//! an instruction pointer, delegating value computation to `eval`. The
//! public entry adapters at the bottom wrap them for hosts: evaluate a bare
//! expression, evaluate in a given module, or invoke a lowered method body
//! with arguments.
//!
//! Non-local transfer is modeled with `Result` unwinding: `enter` recurses
//! into `eval_body` and catches a `Raise` at the `enter` site if its handler
//! registration is still live, then resumes at the catch label in the same
//! frame. `leave n` deregisters handlers without transferring control, so a
//! raise after `leave` passes the corresponding `enter` site untouched.

use smallvec::SmallVec;

use crate::{
    exception::{EvalError, EvalResult, ExcKind, invalid_ir, type_error, typedef_error},
    heap::{HeapData, HeapId, StructInstance},
    intern::{StaticSyms, Symbol},
    ir::copy_ast,
    module::ModuleId,
    runtime::Runtime,
    tracer::{EvalTracer, NoopTracer},
    value::{Value, egal},
};

/// Per-invocation interpreter state.
///
/// `locals` is one flat vector: entries `0..nslots` are slot locals, entries
/// `nslots..` are SSA temporaries. `None` is the uninitialized state. A
/// frame without locals is used when evaluating a bare expression against a
/// method's module and static parameters.
#[derive(Debug)]
pub(crate) struct Frame {
    pub lam: Option<HeapId>,
    pub locals: Option<Vec<Option<Value>>>,
    pub sparam_vals: Option<Vec<Value>>,
}

/// The evaluator: a runtime plus a tracer, monomorphized per tracer type.
pub(crate) struct Interp<'a, T: EvalTracer> {
    pub rt: &'a mut Runtime,
    pub tracer: &'a mut T,
}

/// Converts a 1-based statement label to a statement index.
fn label_index(label: i64) -> EvalResult<usize> {
    usize::try_from(label - 1).map_err(|_| invalid_ir("invalid goto label"))
}

impl<T: EvalTracer> Interp<'_, T> {
    fn frame_nslots(&self, f: &Frame) -> usize {
        f.lam.map_or(0, |l| self.rt.heap.lambda(l).nslots())
    }

    fn frame_nssavalues(&self, f: &Frame) -> usize {
        f.lam.map_or(0, |l| self.rt.heap.lambda(l).nssavalues())
    }

    fn slot_name(&self, f: &Frame, n: usize) -> Symbol {
        f.lam
            .and_then(|l| self.rt.heap.lambda(l).slotnames.get(n - 1).copied())
            .unwrap_or_else(|| Symbol::from(StaticSyms::Underscore))
    }

    /// The module unqualified names resolve in: the frame's enclosing method
    /// module when there is one, the runtime's current module otherwise.
    fn frame_module(&self, frame: Option<&Frame>) -> ModuleId {
        frame
            .and_then(|f| f.lam)
            .and_then(|l| self.rt.heap.lambda(l).module)
            .unwrap_or(self.rt.current_module)
    }

    fn undef_var(&self, name: Symbol) -> EvalError {
        EvalError::raise(
            ExcKind::UndefinedVar(name),
            format!("{} not defined", self.rt.interns.symbol_name(name)),
        )
    }

    fn eval_global(&self, module: ModuleId, name: Symbol) -> EvalResult<Value> {
        self.rt.modules.get_global(module, name).ok_or_else(|| self.undef_var(name))
    }

    // ------------------------------------------------------------------
    // Expression evaluation
    // ------------------------------------------------------------------

    /// Resolves one IR node to a value.
    pub(crate) fn eval(&mut self, e: Value, frame: Option<&Frame>) -> EvalResult<Value> {
        match e {
            Value::Ssa(id) => {
                let Some(f) = frame else {
                    return Err(invalid_ir("access to invalid SSAValue"));
                };
                if id as usize >= self.frame_nssavalues(f) {
                    return Err(invalid_ir("access to invalid SSAValue"));
                }
                let nslots = self.frame_nslots(f);
                let Some(locals) = &f.locals else {
                    return Err(invalid_ir("access to invalid SSAValue"));
                };
                locals[nslots + id as usize].ok_or_else(|| invalid_ir("access to invalid SSAValue"))
            }
            Value::Slot(n) => {
                let Some(f) = frame else {
                    return Err(invalid_ir("access to invalid slot number"));
                };
                if n < 1 || n as usize > self.frame_nslots(f) {
                    return Err(invalid_ir("access to invalid slot number"));
                }
                let Some(locals) = &f.locals else {
                    return Err(invalid_ir("access to invalid slot number"));
                };
                locals[n as usize - 1].ok_or_else(|| self.undef_var(self.slot_name(f, n as usize)))
            }
            Value::GlobalRef { module, name } => self.eval_global(module, name),
            Value::Quote(q) => Ok(self.rt.heap.quoted(q)),
            // bare symbols appear in toplevel exprs not wrapped in `thunk`
            Value::Sym(s) => self.eval_global(self.frame_module(frame), s),
            Value::Expr(ex) => self.eval_expr(ex, frame),
            other => Ok(other),
        }
    }

    fn unsupported(&self, head: Symbol) -> EvalError {
        invalid_ir(format!(
            "unsupported or misplaced expression {}",
            self.rt.interns.symbol_name(head)
        ))
    }

    fn eval_expr(&mut self, ex: HeapId, frame: Option<&Frame>) -> EvalResult<Value> {
        let node = self.rt.heap.expr(ex).clone();
        let (head, args) = (node.head, node.args);
        self.tracer.on_expr(head);
        let Some(h) = head.as_static() else {
            return Err(self.unsupported(head));
        };
        match h {
            StaticSyms::Call => self.do_call(&args, frame),
            StaticSyms::Invoke => self.do_invoke(&args, frame),
            StaticSyms::New => self.do_new(&args, frame),
            StaticSyms::StaticParameter => self.static_parameter(&args, frame),
            StaticSyms::Inert => args.first().copied().ok_or_else(|| invalid_ir("malformed \"inert\" expression")),
            StaticSyms::Copyast => {
                let arg = args.first().copied().ok_or_else(|| invalid_ir("malformed \"copyast\" expression"))?;
                let v = self.eval(arg, frame)?;
                Ok(copy_ast(&mut self.rt.heap, v))
            }
            StaticSyms::StaticTypeof => Ok(Value::DataType(self.rt.prim.any)),
            StaticSyms::TheException => Ok(self.rt.exception_in_transit),
            StaticSyms::Method => self.eval_method_def(&args, frame),
            StaticSyms::Const => {
                let Some(&Value::Sym(name)) = args.first() else {
                    return Err(invalid_ir("malformed \"const\" expression"));
                };
                let modu = self.frame_module(frame);
                self.rt.declare_constant(modu, name)?;
                Ok(Value::Nothing)
            }
            StaticSyms::Global => {
                // create uninitialized mutable bindings for a "global x" decl
                let modu = self.frame_module(frame);
                for a in &args {
                    let &Value::Sym(name) = a else {
                        return Err(invalid_ir("malformed \"global\" expression"));
                    };
                    self.rt.modules.get_binding_wr(modu, name);
                }
                Ok(Value::Nothing)
            }
            StaticSyms::AbstractType => self.eval_abstracttype(&args, frame),
            StaticSyms::BitsType => self.eval_bitstype(&args, frame),
            StaticSyms::CompositeType => self.eval_compositetype(&args, frame),
            StaticSyms::Module => self.eval_module_expr(&args),
            StaticSyms::Thunk => self.toplevel_eval(Value::Expr(ex)),
            StaticSyms::Error | StaticSyms::Incomplete => {
                let Some(&payload) = args.first() else {
                    return Err(invalid_ir("malformed \"error\" expression"));
                };
                if let Value::Str(id) = payload {
                    let msg = format!("syntax: {}", self.rt.interns.get_string(id));
                    return Err(EvalError::raise(ExcKind::Syntax, msg));
                }
                let msg = self.rt.display_value(payload);
                Err(EvalError::raise(ExcKind::UserThrown(payload), msg))
            }
            StaticSyms::Boundscheck
            | StaticSyms::Inbounds
            | StaticSyms::Fastmath
            | StaticSyms::Simdloop
            | StaticSyms::Meta
            | StaticSyms::TypeGoto => Ok(Value::Nothing),
            _ => Err(self.unsupported(head)),
        }
    }

    /// Evaluates every argument left-to-right, then dispatches.
    fn do_call(&mut self, args: &[Value], frame: Option<&Frame>) -> EvalResult<Value> {
        let mut argv: SmallVec<[Value; 8]> = SmallVec::with_capacity(args.len());
        for a in args {
            argv.push(self.eval(*a, frame)?);
        }
        self.apply_generic(&argv)
    }

    /// Invokes a pre-resolved method, bypassing dispatch.
    fn do_invoke(&mut self, args: &[Value], frame: Option<&Frame>) -> EvalResult<Value> {
        let Some(&Value::Lambda(meth)) = args.first() else {
            return Err(invalid_ir("invoke: expected a resolved method"));
        };
        let mut argv: SmallVec<[Value; 8]> = SmallVec::with_capacity(args.len() - 1);
        for a in &args[1..] {
            argv.push(self.eval(*a, frame)?);
        }
        self.call_method_internal(meth, &argv)
    }

    /// Allocates an uninitialized struct instance, then fills a field prefix
    /// in argument order.
    fn do_new(&mut self, args: &[Value], frame: Option<&Frame>) -> EvalResult<Value> {
        let Some(&ty_expr) = args.first() else {
            return Err(invalid_ir("malformed \"new\" expression"));
        };
        let ty_val = self.eval(ty_expr, frame)?;
        let Value::DataType(ty) = ty_val else {
            return Err(type_error(format!(
                "new: expected a datatype, got {}",
                self.rt.display_value(ty_val)
            )));
        };
        if !ty_val.is_structtype(&self.rt.heap) {
            let name = self.rt.interns.symbol_name(self.rt.heap.datatype(ty).name);
            return Err(type_error(format!("new: {name} is not a concrete struct type")));
        }
        let nfields = self.rt.heap.datatype(ty).field_names.len();
        if args.len() - 1 > nfields {
            return Err(invalid_ir("malformed \"new\" expression"));
        }
        let id = self.rt.heap.alloc(HeapData::Struct(StructInstance {
            ty,
            fields: vec![None; nfields],
        }));
        for (i, a) in args[1..].iter().enumerate() {
            let v = self.eval(*a, frame)?;
            self.rt.heap.struct_data_mut(id).fields[i] = Some(v);
        }
        Ok(Value::Struct(id))
    }

    fn static_parameter(&mut self, args: &[Value], frame: Option<&Frame>) -> EvalResult<Value> {
        let n = args
            .first()
            .and_then(|a| a.as_long())
            .filter(|&n| n > 0)
            .ok_or_else(|| invalid_ir("malformed \"static_parameter\" expression"))?;
        let idx = n as usize - 1;
        let unknown = || EvalError::raise(ExcKind::SparamUnknown, "could not determine static parameter value");
        let Some(f) = frame else { return Err(unknown()) };
        if let Some(sparams) = &f.sparam_vals {
            return sparams.get(idx).copied().ok_or_else(unknown);
        }
        if let Some(lam) = f.lam {
            let sparams = &self.rt.heap.lambda(lam).sparam_vals;
            if let Some(&sp) = sparams.get(idx) {
                if !sp.is_typevar() {
                    return Ok(sp);
                }
            }
        }
        Err(unknown())
    }

    /// The `method` form: declare a generic function and/or install a method.
    fn eval_method_def(&mut self, args: &[Value], frame: Option<&Frame>) -> EvalResult<Value> {
        let Some(&fname) = args.first() else {
            return Err(invalid_ir("malformed method definition"));
        };
        let modu = self.frame_module(frame);
        if let Value::Sym(name) = fname {
            let gf = self.rt.generic_function_def(name, modu)?;
            if args.len() == 1 {
                return Ok(gf);
            }
        } else if args.len() == 1 {
            return Err(invalid_ir("malformed method definition"));
        }
        // non-symbol names are tolerated in the installing form
        let &[_, sig_expr, meth_expr, extra] = args else {
            return Err(invalid_ir("malformed method definition"));
        };
        let atypes = self.eval(sig_expr, frame)?;
        let meth = self.eval(meth_expr, frame)?;
        self.rt.method_def(atypes, meth, extra)?;
        Ok(Value::Nothing)
    }

    // ------------------------------------------------------------------
    // Type definition forms
    // ------------------------------------------------------------------

    fn expect_param_svec(&mut self, v: Value, frame: Option<&Frame>) -> EvalResult<Vec<Value>> {
        let evaluated = self.eval(v, frame)?;
        let Value::Svec(id) = evaluated else {
            return Err(type_error("type definition: expected a parameter vector"));
        };
        Ok(self.rt.heap.svec(id).to_vec())
    }

    /// Snapshots the binding, verifies it may be replaced, and temporarily
    /// assigns the in-progress type so recursive references resolve.
    fn begin_typedef_binding(&mut self, modu: ModuleId, name: Symbol, dt: HeapId) -> EvalResult<Option<Value>> {
        let binding = self.rt.modules.get_binding_wr(modu, name);
        let temp = binding.value;
        if binding.constp && temp.is_some_and(|v| !v.is_datatype()) {
            return Err(typedef_error(format!(
                "invalid redefinition of constant {}",
                self.rt.interns.symbol_name(name)
            )));
        }
        self.rt.modules.set_binding_value(modu, name, Some(Value::DataType(dt)));
        Ok(temp)
    }

    /// Restores the snapshot and commits the new type unless an equivalent
    /// definition is already bound.
    fn finish_typedef(
        &mut self,
        modu: ModuleId,
        name: Symbol,
        dt: HeapId,
        temp: Option<Value>,
        result: EvalResult<()>,
    ) -> EvalResult<Value> {
        if let Err(e) = result {
            self.rt.reset_instantiate_inner_types(dt);
            self.rt.modules.set_binding_value(modu, name, temp);
            return Err(e);
        }
        self.rt.modules.set_binding_value(modu, name, temp);
        let absorb = matches!(temp, Some(Value::DataType(old)) if self.equiv_type(dt, old));
        if !absorb {
            self.rt.checked_assignment(modu, name, Value::DataType(dt))?;
        }
        Ok(Value::Nothing)
    }

    /// The failable tail of an abstract or bits type definition: supertype
    /// installation and inner-type finalization, with `inside_typedef` held
    /// for the scope.
    fn typedef_install_super(&mut self, dt: HeapId, super_expr: Value, frame: Option<&Frame>) -> EvalResult<()> {
        self.rt.inside_typedef = true;
        let result = (|| {
            let sup = self.eval(super_expr, frame)?;
            self.rt.set_datatype_super(dt, sup)?;
            self.rt.reinstantiate_inner_types(dt)
        })();
        self.rt.inside_typedef = false;
        result
    }

    fn eval_abstracttype(&mut self, args: &[Value], frame: Option<&Frame>) -> EvalResult<Value> {
        if self.rt.inside_typedef {
            return Err(typedef_error(
                "cannot eval a new abstract type definition while defining another type",
            ));
        }
        let &[name_v, para_v, super_v] = args else {
            return Err(invalid_ir("malformed \"abstract_type\" expression"));
        };
        let Value::Sym(name) = name_v else {
            return Err(invalid_ir("malformed \"abstract_type\" expression"));
        };
        let params = self.expect_param_svec(para_v, frame)?;
        let dt = self.rt.new_abstracttype(name, params);
        let modu = self.frame_module(frame);
        let temp = self.begin_typedef_binding(modu, name, dt)?;
        let result = self.typedef_install_super(dt, super_v, frame);
        self.finish_typedef(modu, name, dt, temp, result)
    }

    fn eval_bitstype(&mut self, args: &[Value], frame: Option<&Frame>) -> EvalResult<Value> {
        if self.rt.inside_typedef {
            return Err(typedef_error(
                "cannot eval a new bits type definition while defining another type",
            ));
        }
        let &[name_v, para_v, nbits_v, super_v] = args else {
            return Err(invalid_ir("malformed \"bits_type\" expression"));
        };
        let Value::Sym(name) = name_v else {
            return Err(invalid_ir("malformed \"bits_type\" expression"));
        };
        let params = self.expect_param_svec(para_v, frame)?;
        let vnb = self.eval(nbits_v, frame)?;
        let Some(nb) = vnb.as_long() else {
            return Err(typedef_error(format!(
                "invalid declaration of bits type {}",
                self.rt.interns.symbol_name(name)
            )));
        };
        if nb < 1 || nb >= (1 << 23) || (nb & 7) != 0 {
            return Err(typedef_error(format!(
                "invalid number of bits in type {}",
                self.rt.interns.symbol_name(name)
            )));
        }
        let dt = self.rt.new_bitstype(name, params, nb as u32);
        let modu = self.frame_module(frame);
        let temp = self.begin_typedef_binding(modu, name, dt)?;
        let result = self.typedef_install_super(dt, super_v, frame);
        self.finish_typedef(modu, name, dt, temp, result)
    }

    fn eval_compositetype(&mut self, args: &[Value], frame: Option<&Frame>) -> EvalResult<Value> {
        if self.rt.inside_typedef {
            return Err(typedef_error(
                "cannot eval a new data type definition while defining another type",
            ));
        }
        let &[name_v, para_v, fnames_v, super_v, ftypes_v, mutable_v, ninit_v] = args else {
            return Err(invalid_ir("malformed \"composite_type\" expression"));
        };
        let Value::Sym(name) = name_v else {
            return Err(invalid_ir("malformed \"composite_type\" expression"));
        };
        let params = self.expect_param_svec(para_v, frame)?;
        let fname_values = self.expect_param_svec(fnames_v, frame)?;
        let mut field_names = Vec::with_capacity(fname_values.len());
        for fv in fname_values {
            let Value::Sym(s) = fv else {
                return Err(type_error("composite_type: field names must be symbols"));
            };
            field_names.push(s);
        }
        let mutable_ = mutable_v == Value::Bool(true);
        let ninit = ninit_v
            .as_long()
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| invalid_ir("malformed \"composite_type\" expression"))?;
        let params_empty = params.is_empty();
        let dt = self.rt.new_datatype(name, params, field_names, mutable_, ninit);
        let modu = self.frame_module(frame);
        let temp = self.begin_typedef_binding(modu, name, dt)?;
        let result = self.composite_typedef_steps(dt, super_v, ftypes_v, frame);
        if result.is_ok() {
            self.rt.compute_field_offsets(dt);
            if params_empty && self.rt.is_datatype_make_singleton(dt) {
                let instance = self.rt.heap.alloc(HeapData::Struct(StructInstance {
                    ty: dt,
                    fields: Vec::new(),
                }));
                self.rt.heap.datatype_mut(dt).instance = Some(Value::Struct(instance));
            }
        }
        self.finish_typedef(modu, name, dt, temp, result)
    }

    /// The failable middle of a composite definition: supertype, field
    /// types, and inner-type finalization under `inside_typedef`.
    fn composite_typedef_steps(
        &mut self,
        dt: HeapId,
        super_expr: Value,
        ftypes_expr: Value,
        frame: Option<&Frame>,
    ) -> EvalResult<()> {
        self.rt.inside_typedef = true;
        let result = (|| {
            let sup = self.eval(super_expr, frame)?;
            self.rt.set_datatype_super(dt, sup)?;
            let ft = self.eval(ftypes_expr, frame)?;
            let Value::Svec(ft_id) = ft else {
                return Err(type_error("composite_type: expected a field type vector"));
            };
            let field_types = self.rt.heap.svec(ft_id).to_vec();
            if field_types.len() != self.rt.heap.datatype(dt).field_names.len() {
                return Err(invalid_ir("composite_type: field name and type counts differ"));
            }
            for elt in &field_types {
                if !elt.is_type() && !elt.is_typevar() {
                    let name = self.rt.interns.symbol_name(self.rt.heap.datatype(dt).name).to_owned();
                    return Err(type_error(format!(
                        "{name}: in type definition, expected Type, got {}",
                        self.rt.display_value(*elt)
                    )));
                }
            }
            self.rt.heap.datatype_mut(dt).field_types = field_types;
            self.rt.reinstantiate_inner_types(dt)
        })();
        self.rt.inside_typedef = false;
        result
    }

    /// Heuristic for allowing a type to be "redefined" to something
    /// identical. Parametric types are never considered equivalent.
    fn equiv_type(&self, dta: HeapId, dtb: HeapId) -> bool {
        let heap = &self.rt.heap;
        let (a, b) = (heap.datatype(dta), heap.datatype(dtb));
        a.parameters.is_empty()
            && b.parameters.is_empty()
            && a.name == b.name
            && a.field_types.len() == b.field_types.len()
            && a.field_types.iter().zip(&b.field_types).all(|(x, y)| egal(heap, *x, *y))
            && a.abstract_ == b.abstract_
            && a.mutable_ == b.mutable_
            && a.nbits == b.nbits
            && a.size == b.size
            && a.ninitialized == b.ninitialized
            && a.super_ == b.super_
            && a.field_names == b.field_names
    }

    // ------------------------------------------------------------------
    // Body execution
    // ------------------------------------------------------------------

    /// Walks a statement sequence from `start` until a `return`.
    ///
    /// `handlers` is the registration stack shared by the `enter` recursion
    /// within one body invocation; entries are catch labels.
    pub(crate) fn eval_body(
        &mut self,
        stmts: &[Value],
        mut frame: Option<&mut Frame>,
        start: usize,
        toplevel: bool,
        handlers: &mut Vec<i64>,
    ) -> EvalResult<Value> {
        let mut i = start;
        loop {
            if i >= stmts.len() {
                return Err(invalid_ir("`body` expression must terminate in `return`. Use `block` instead."));
            }
            self.tracer.on_statement(i);
            let stmt = stmts[i];
            match stmt {
                Value::Goto(label) => {
                    i = label_index(i64::from(label))?;
                    continue;
                }
                Value::Expr(ex) => {
                    let node = self.rt.heap.expr(ex).clone();
                    match node.head.as_static() {
                        Some(StaticSyms::Return) => {
                            let Some(&e) = node.args.first() else {
                                return Err(invalid_ir("malformed \"return\" expression"));
                            };
                            let v = if toplevel && self.rt.is_toplevel_only_expr(e) {
                                self.toplevel_eval(e)?
                            } else {
                                self.eval(e, frame.as_deref())?
                            };
                            self.tracer.on_return(v);
                            return Ok(v);
                        }
                        Some(StaticSyms::Assign) => {
                            let &[dest, rhs_expr] = node.args.as_slice() else {
                                return Err(invalid_ir("malformed assignment"));
                            };
                            let rhs = self.eval(rhs_expr, frame.as_deref())?;
                            self.assign(dest, rhs, frame.as_deref_mut())?;
                        }
                        Some(StaticSyms::GotoIfnot) => {
                            let &[cond_expr, label_v] = node.args.as_slice() else {
                                return Err(invalid_ir("malformed \"goto_ifnot\" expression"));
                            };
                            let cond = self.eval(cond_expr, frame.as_deref())?;
                            match cond {
                                Value::Bool(false) => {
                                    let label = label_v.as_long().ok_or_else(|| invalid_ir("invalid goto label"))?;
                                    i = label_index(label)?;
                                    continue;
                                }
                                Value::Bool(true) => {}
                                other => {
                                    return Err(type_error(format!(
                                        "in if, expected Bool, got a value of type {}",
                                        self.rt.display_value(self.rt.type_of(other))
                                    )));
                                }
                            }
                        }
                        Some(StaticSyms::Line) => {
                            if toplevel {
                                if let Some(line) = node.args.first().and_then(|a| a.as_long()) {
                                    self.rt.lineno = line as u32;
                                }
                            }
                        }
                        Some(StaticSyms::Enter) => {
                            let catch_label = node
                                .args
                                .first()
                                .and_then(|a| a.as_long())
                                .ok_or_else(|| invalid_ir("malformed \"enter\" expression"))?;
                            let depth = handlers.len();
                            handlers.push(catch_label);
                            self.tracer.on_handler_enter(label_index(catch_label)?);
                            match self.eval_body(stmts, frame.as_deref_mut(), i + 1, toplevel, handlers) {
                                Ok(v) => return Ok(v),
                                // catch only while this registration is live;
                                // a `leave` in the protected region pops it
                                Err(EvalError::Raise(raised)) if handlers.len() > depth => {
                                    handlers.truncate(depth);
                                    self.rt.exception_in_transit = self.rt.exception_value(&raised);
                                    i = label_index(catch_label)?;
                                    self.tracer.on_handler_catch(i);
                                    continue;
                                }
                                Err(e) => return Err(e),
                            }
                        }
                        Some(StaticSyms::Leave) => {
                            let n = node
                                .args
                                .first()
                                .and_then(|a| a.as_long())
                                .and_then(|n| usize::try_from(n).ok())
                                .ok_or_else(|| invalid_ir("malformed \"leave\" expression"))?;
                            handlers.truncate(handlers.len().saturating_sub(n));
                        }
                        _ => {
                            if toplevel && self.rt.is_toplevel_only_expr(stmt) {
                                self.toplevel_eval(stmt)?;
                            } else {
                                self.eval(stmt, frame.as_deref())?;
                            }
                        }
                    }
                }
                Value::Line(line) => {
                    if toplevel {
                        self.rt.lineno = line;
                    }
                }
                Value::NewVar(n) => {
                    let Some(f) = frame.as_deref_mut() else {
                        return Err(invalid_ir("access to invalid slot number"));
                    };
                    if n < 1 || n as usize > self.frame_nslots(f) {
                        return Err(invalid_ir("access to invalid slot number"));
                    }
                    if let Some(locals) = f.locals.as_mut() {
                        locals[n as usize - 1] = None;
                    }
                }
                other => {
                    self.eval(other, frame.as_deref())?;
                }
            }
            i += 1;
        }
    }

    /// Stores an assignment's right-hand side into its destination.
    fn assign(&mut self, dest: Value, rhs: Value, frame: Option<&mut Frame>) -> EvalResult<()> {
        match dest {
            Value::Ssa(id) => {
                let Some(f) = frame else {
                    return Err(invalid_ir("assignment to invalid GenSym location"));
                };
                if id as usize >= self.frame_nssavalues(f) {
                    return Err(invalid_ir("assignment to invalid GenSym location"));
                }
                let nslots = self.frame_nslots(f);
                let Some(locals) = f.locals.as_mut() else {
                    return Err(invalid_ir("assignment to invalid GenSym location"));
                };
                locals[nslots + id as usize] = Some(rhs);
                Ok(())
            }
            Value::Slot(n) => {
                let Some(f) = frame else {
                    return Err(invalid_ir("assignment to invalid slot number"));
                };
                if n < 1 || n as usize > self.frame_nslots(f) {
                    return Err(invalid_ir("assignment to invalid slot number"));
                }
                let Some(locals) = f.locals.as_mut() else {
                    return Err(invalid_ir("assignment to invalid slot number"));
                };
                locals[n as usize - 1] = Some(rhs);
                Ok(())
            }
            Value::GlobalRef { module, name } => self.rt.checked_assignment(module, name, rhs),
            Value::Sym(name) => {
                let modu = self.frame_module(frame.as_deref());
                self.rt.checked_assignment(modu, name, rhs)
            }
            _ => Err(invalid_ir("malformed assignment")),
        }
    }

    // ------------------------------------------------------------------
    // Entry adapters
    // ------------------------------------------------------------------

    pub(crate) fn interpret_toplevel_expr(&mut self, e: Value) -> EvalResult<Value> {
        self.eval(e, None)
    }

    /// Evaluates in `module`, restoring the current-module cells on every
    /// exit path.
    pub(crate) fn interpret_toplevel_expr_in(
        &mut self,
        module: ModuleId,
        e: Value,
        lam: Option<HeapId>,
    ) -> EvalResult<Value> {
        let last_m = self.rt.current_module;
        let task_last_m = self.rt.task_current_module;
        self.rt.current_module = module;
        self.rt.task_current_module = module;
        let frame = Frame {
            lam,
            locals: None,
            sparam_vals: None,
        };
        let result = self.eval(e, Some(&frame));
        self.rt.current_module = last_m;
        self.rt.task_current_module = task_last_m;
        result
    }

    pub(crate) fn toplevel_eval_body(&mut self, stmts: &[Value]) -> EvalResult<Value> {
        let mut handlers = Vec::new();
        self.eval_body(stmts, None, 0, true, &mut handlers)
    }

    /// Runs a lowered method body with the given arguments.
    ///
    /// `args` fills the leading formal slots; a variadic body's final formal
    /// receives a tuple of the trailing actuals. Zero-argument bodies run as
    /// top level.
    pub(crate) fn interpret_call(
        &mut self,
        lam: HeapId,
        args: &[Value],
        sparam_vals: Option<Vec<Value>>,
    ) -> EvalResult<Value> {
        let info = self.rt.heap.lambda(lam);
        let (nslots, nssavalues, nargs, isva) = (info.nslots(), info.nssavalues(), info.nargs, info.isva);
        let stmts = info.code.clone();
        if nargs > nslots {
            return Err(invalid_ir("malformed lambda: more arguments than slots"));
        }
        let enough = if isva { args.len() + 1 >= nargs } else { args.len() == nargs };
        if !enough {
            return Err(invalid_ir("wrong number of arguments"));
        }
        let mut locals = vec![None; nslots + nssavalues];
        for i in 0..nargs {
            if isva && i == nargs - 1 {
                let rest = args[i..].to_vec();
                locals[i] = Some(self.rt.tuple(rest));
            } else {
                locals[i] = Some(args[i]);
            }
        }
        let mut frame = Frame {
            lam: Some(lam),
            locals: Some(locals),
            sparam_vals,
        };
        let mut handlers = Vec::new();
        self.eval_body(&stmts, Some(&mut frame), 0, nargs == 0, &mut handlers)
    }

    pub(crate) fn interpret_toplevel_thunk(&mut self, lam: HeapId) -> EvalResult<Value> {
        self.interpret_call(lam, &[], None)
    }
}

/// Extracts the lambda id from a host-supplied value.
fn expect_lambda(v: Value) -> EvalResult<HeapId> {
    match v {
        Value::Lambda(id) => Ok(id),
        _ => Err(invalid_ir("expected a lambda")),
    }
}

impl Runtime {
    /// Evaluates a bare expression with no frame.
    pub fn interpret_toplevel_expr(&mut self, e: Value) -> EvalResult<Value> {
        let mut tracer = NoopTracer;
        Interp { rt: self, tracer: &mut tracer }.interpret_toplevel_expr(e)
    }

    /// Evaluates a bare expression, reporting into `tracer`.
    pub fn interpret_toplevel_expr_traced<T: EvalTracer>(&mut self, e: Value, tracer: &mut T) -> EvalResult<Value> {
        Interp { rt: self, tracer }.interpret_toplevel_expr(e)
    }

    /// Evaluates an expression in `module`, optionally against an enclosing
    /// method frame's lambda. The current-module cells are restored on both
    /// success and failure.
    pub fn interpret_toplevel_expr_in(&mut self, module: ModuleId, e: Value, lam: Option<Value>) -> EvalResult<Value> {
        let lam = lam.map(expect_lambda).transpose()?;
        let mut tracer = NoopTracer;
        Interp { rt: self, tracer: &mut tracer }.interpret_toplevel_expr_in(module, e, lam)
    }

    /// Evaluates an expression in `module`, reporting into `tracer`.
    pub fn interpret_toplevel_expr_in_traced<T: EvalTracer>(
        &mut self,
        module: ModuleId,
        e: Value,
        lam: Option<Value>,
        tracer: &mut T,
    ) -> EvalResult<Value> {
        let lam = lam.map(expect_lambda).transpose()?;
        Interp { rt: self, tracer }.interpret_toplevel_expr_in(module, e, lam)
    }

    /// Runs a top-level statement sequence with no frame.
    pub fn toplevel_eval_body(&mut self, stmts: &[Value]) -> EvalResult<Value> {
        let mut tracer = NoopTracer;
        Interp { rt: self, tracer: &mut tracer }.toplevel_eval_body(stmts)
    }

    /// Runs a top-level statement sequence, reporting into `tracer`.
    pub fn toplevel_eval_body_traced<T: EvalTracer>(&mut self, stmts: &[Value], tracer: &mut T) -> EvalResult<Value> {
        Interp { rt: self, tracer }.toplevel_eval_body(stmts)
    }

    /// Invokes a lowered method body with arguments and optional
    /// static-parameter bindings.
    pub fn interpret_call(&mut self, lam: Value, args: &[Value], sparam_vals: Option<Vec<Value>>) -> EvalResult<Value> {
        let lam = expect_lambda(lam)?;
        let mut tracer = NoopTracer;
        Interp { rt: self, tracer: &mut tracer }.interpret_call(lam, args, sparam_vals)
    }

    /// Invokes a lowered method body, reporting into `tracer`.
    pub fn interpret_call_traced<T: EvalTracer>(
        &mut self,
        lam: Value,
        args: &[Value],
        sparam_vals: Option<Vec<Value>>,
        tracer: &mut T,
    ) -> EvalResult<Value> {
        let lam = expect_lambda(lam)?;
        Interp { rt: self, tracer }.interpret_call(lam, args, sparam_vals)
    }

    /// Runs a zero-argument lowered body at top level.
    pub fn interpret_toplevel_thunk(&mut self, lam: Value) -> EvalResult<Value> {
        let lam = expect_lambda(lam)?;
        let mut tracer = NoopTracer;
        Interp { rt: self, tracer: &mut tracer }.interpret_toplevel_thunk(lam)
    }

    /// Runs a zero-argument lowered body at top level, reporting into
    /// `tracer`.
    pub fn interpret_toplevel_thunk_traced<T: EvalTracer>(&mut self, lam: Value, tracer: &mut T) -> EvalResult<Value> {
        let lam = expect_lambda(lam)?;
        Interp { rt: self, tracer }.interpret_toplevel_thunk(lam)
    }
}
