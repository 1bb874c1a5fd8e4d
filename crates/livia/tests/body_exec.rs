//! Tests for the statement-level body executor: straight-line execution,
//! gotos, conditional branches, slot/SSA storage, handler scopes, and the
//! top-level body entry point.

use livia::{Builtin, EvalError, ExcKind, LambdaInfo, Runtime, SsaInfo, StaticSyms, Value};
use pretty_assertions::assert_eq;

/// Builds a `(call f args...)` expression.
fn call(rt: &mut Runtime, f: Value, mut args: Vec<Value>) -> Value {
    let mut all = vec![f];
    all.append(&mut args);
    rt.expr(StaticSyms::Call, all)
}

fn assign(rt: &mut Runtime, dest: Value, rhs: Value) -> Value {
    rt.expr(StaticSyms::Assign, vec![dest, rhs])
}

fn ret(rt: &mut Runtime, v: Value) -> Value {
    rt.expr(StaticSyms::Return, vec![v])
}

fn goto_ifnot(rt: &mut Runtime, cond: Value, label: i64) -> Value {
    rt.expr(StaticSyms::GotoIfnot, vec![cond, Value::Int(label)])
}

fn enter(rt: &mut Runtime, catch_label: i64) -> Value {
    rt.expr(StaticSyms::Enter, vec![Value::Int(catch_label)])
}

fn leave(rt: &mut Runtime, n: i64) -> Value {
    rt.expr(StaticSyms::Leave, vec![Value::Int(n)])
}

fn throw_of(rt: &mut Runtime, v: Value) -> Value {
    call(rt, Value::Builtin(Builtin::Throw), vec![v])
}

/// A zero-argument lowered body with named slots and `nssa` temporaries.
fn thunk_lambda(rt: &mut Runtime, code: Vec<Value>, slotnames: &[&str], nssa: u32) -> Value {
    let slotnames: Vec<_> = slotnames.iter().map(|n| rt.symbol(n)).collect();
    rt.lambda(LambdaInfo {
        code,
        slotflags: vec![0; slotnames.len()],
        slotnames,
        ssavaluetypes: SsaInfo::Count(nssa),
        nargs: 0,
        isva: false,
        sparam_vals: vec![],
        module: None,
    })
}

fn kind_of(err: &EvalError) -> ExcKind {
    err.kind().expect("expected a catchable raise")
}

// =============================================================================
// 1. Straight-line execution and storage
// =============================================================================

/// An SSA store followed by a read of the same temporary returns the value.
#[test]
fn straight_line_ssa_return() {
    let mut rt = Runtime::new();
    let s0 = assign(&mut rt, Value::Ssa(0), Value::Int(7));
    let s1 = ret(&mut rt, Value::Ssa(0));
    let lam = thunk_lambda(&mut rt, vec![s0, s1], &[], 1);
    assert_eq!(rt.interpret_toplevel_thunk(lam).unwrap(), Value::Int(7));
}

/// A goto loop counts a slot up to three and returns it.
#[test]
fn goto_loop_counts_to_three() {
    let mut rt = Runtime::new();
    let add = Value::Builtin(Builtin::Add);
    let lt = Value::Builtin(Builtin::Lt);
    let s0 = assign(&mut rt, Value::Slot(1), Value::Int(0));
    let inc = call(&mut rt, add, vec![Value::Slot(1), Value::Int(1)]);
    let s1 = assign(&mut rt, Value::Slot(1), inc);
    let cond = call(&mut rt, lt, vec![Value::Slot(1), Value::Int(3)]);
    let s2 = goto_ifnot(&mut rt, cond, 5);
    let s3 = Value::Goto(2);
    let s4 = ret(&mut rt, Value::Slot(1));
    let lam = thunk_lambda(&mut rt, vec![s0, s1, s2, s3, s4], &["i"], 0);
    assert_eq!(rt.interpret_toplevel_thunk(lam).unwrap(), Value::Int(3));
}

/// Reading a slot that was never stored raises an undefined-variable error
/// naming the slot.
#[test]
fn undefined_slot_names_the_variable() {
    let mut rt = Runtime::new();
    let s0 = ret(&mut rt, Value::Slot(1));
    let lam = thunk_lambda(&mut rt, vec![s0], &["x"], 0);
    let err = rt.interpret_toplevel_thunk(lam).unwrap_err();
    let x = rt.symbol("x");
    assert_eq!(kind_of(&err), ExcKind::UndefinedVar(x));
    assert_eq!(err.message(), "x not defined");
}

/// A `newvar` statement resets an already-stored slot to uninitialized.
#[test]
fn newvar_resets_slot() {
    let mut rt = Runtime::new();
    let s0 = assign(&mut rt, Value::Slot(1), Value::Int(5));
    let s1 = Value::NewVar(1);
    let s2 = ret(&mut rt, Value::Slot(1));
    let lam = thunk_lambda(&mut rt, vec![s0, s1, s2], &["v"], 0);
    let err = rt.interpret_toplevel_thunk(lam).unwrap_err();
    let v = rt.symbol("v");
    assert_eq!(kind_of(&err), ExcKind::UndefinedVar(v));
}

/// Falling off the end of a body without a `return` is malformed IR.
#[test]
fn body_must_terminate_in_return() {
    let mut rt = Runtime::new();
    let s0 = assign(&mut rt, Value::Ssa(0), Value::Int(1));
    let lam = thunk_lambda(&mut rt, vec![s0], &[], 1);
    let err = rt.interpret_toplevel_thunk(lam).unwrap_err();
    assert_eq!(kind_of(&err), ExcKind::InvalidIR);
    assert!(err.message().contains("must terminate in `return`"));
}

/// SSA references outside any frame, or out of range, are malformed IR.
#[test]
fn invalid_ssa_access() {
    let mut rt = Runtime::new();
    let err = rt.interpret_toplevel_expr(Value::Ssa(0)).unwrap_err();
    assert_eq!(kind_of(&err), ExcKind::InvalidIR);
    assert_eq!(err.message(), "access to invalid SSAValue");

    // store to an SSA id the body does not declare
    let s0 = assign(&mut rt, Value::Ssa(3), Value::Int(1));
    let s1 = ret(&mut rt, Value::Nothing);
    let lam = thunk_lambda(&mut rt, vec![s0, s1], &[], 1);
    let err = rt.interpret_toplevel_thunk(lam).unwrap_err();
    assert_eq!(err.message(), "assignment to invalid GenSym location");

    // read of a declared temporary that no dynamic path has stored
    let s0 = ret(&mut rt, Value::Ssa(0));
    let lam = thunk_lambda(&mut rt, vec![s0], &[], 1);
    let err = rt.interpret_toplevel_thunk(lam).unwrap_err();
    assert_eq!(kind_of(&err), ExcKind::InvalidIR);
}

/// Slot references outside the declared range are malformed IR.
#[test]
fn invalid_slot_access() {
    let mut rt = Runtime::new();
    let err = rt.interpret_toplevel_expr(Value::Slot(1)).unwrap_err();
    assert_eq!(err.message(), "access to invalid slot number");

    let s0 = ret(&mut rt, Value::Slot(2));
    let lam = thunk_lambda(&mut rt, vec![s0], &["only"], 0);
    let err = rt.interpret_toplevel_thunk(lam).unwrap_err();
    assert_eq!(err.message(), "access to invalid slot number");
}

// =============================================================================
// 2. Conditional branches
// =============================================================================

/// `goto_ifnot` falls through on `true` and jumps on `false`; both arms are
/// exercised by the loop test above, so here we pin the branch-taken case.
#[test]
fn goto_ifnot_jumps_on_false() {
    let mut rt = Runtime::new();
    let s0 = goto_ifnot(&mut rt, Value::Bool(false), 3);
    let s1 = ret(&mut rt, Value::Int(1));
    let s2 = ret(&mut rt, Value::Int(2));
    let lam = thunk_lambda(&mut rt, vec![s0, s1, s2], &[], 0);
    assert_eq!(rt.interpret_toplevel_thunk(lam).unwrap(), Value::Int(2));
}

/// A non-boolean branch condition is a type error, not a truthiness test.
#[test]
fn goto_ifnot_requires_bool() {
    let mut rt = Runtime::new();
    let s0 = goto_ifnot(&mut rt, Value::Int(1), 2);
    let s1 = ret(&mut rt, Value::Nothing);
    let lam = thunk_lambda(&mut rt, vec![s0, s1], &[], 0);
    let err = rt.interpret_toplevel_thunk(lam).unwrap_err();
    assert_eq!(kind_of(&err), ExcKind::TypeMismatch);
    assert!(err.message().contains("expected Bool"));
}

// =============================================================================
// 3. Handler scopes
// =============================================================================

/// A throw inside an `enter`-protected region resumes at the catch label,
/// where `the_exception` observes the thrown value.
#[test]
fn enter_catches_and_resumes() {
    let mut rt = Runtime::new();
    let s0 = enter(&mut rt, 4);
    let s1 = throw_of(&mut rt, Value::Int(42));
    let s2 = ret(&mut rt, Value::Int(0));
    let exc = rt.expr(StaticSyms::TheException, vec![]);
    let s3 = ret(&mut rt, exc);
    let lam = thunk_lambda(&mut rt, vec![s0, s1, s2, s3], &[], 0);
    assert_eq!(rt.interpret_toplevel_thunk(lam).unwrap(), Value::Int(42));
    assert_eq!(rt.exception_in_transit(), Value::Int(42));
}

/// `leave` pops the handler without transferring control; the protected
/// region then completes normally.
#[test]
fn leave_then_normal_return() {
    let mut rt = Runtime::new();
    let s0 = enter(&mut rt, 5);
    let s1 = assign(&mut rt, Value::Ssa(0), Value::Int(1));
    let s2 = leave(&mut rt, 1);
    let s3 = ret(&mut rt, Value::Int(100));
    let s4 = ret(&mut rt, Value::Int(200));
    let lam = thunk_lambda(&mut rt, vec![s0, s1, s2, s3, s4], &[], 1);
    assert_eq!(rt.interpret_toplevel_thunk(lam).unwrap(), Value::Int(100));
}

/// A throw after `leave` escapes the popped handler entirely.
#[test]
fn throw_after_leave_escapes() {
    let mut rt = Runtime::new();
    let s0 = enter(&mut rt, 5);
    let s1 = leave(&mut rt, 1);
    let s2 = throw_of(&mut rt, Value::Int(7));
    let s3 = ret(&mut rt, Value::Int(0));
    let s4 = ret(&mut rt, Value::Int(99));
    let lam = thunk_lambda(&mut rt, vec![s0, s1, s2, s3, s4], &[], 0);
    let err = rt.interpret_toplevel_thunk(lam).unwrap_err();
    assert_eq!(kind_of(&err), ExcKind::UserThrown(Value::Int(7)));
}

/// Handlers nest: the innermost `enter` catches, and `leave` afterwards
/// deregisters the outer handler.
#[test]
fn nested_handlers_catch_innermost_first() {
    let mut rt = Runtime::new();
    let s0 = enter(&mut rt, 7);
    let s1 = enter(&mut rt, 5);
    let s2 = throw_of(&mut rt, Value::Int(1));
    let s3 = ret(&mut rt, Value::Int(10));
    let s4 = leave(&mut rt, 1);
    let exc = rt.expr(StaticSyms::TheException, vec![]);
    let s5 = ret(&mut rt, exc);
    let s6 = ret(&mut rt, Value::Int(999));
    let lam = thunk_lambda(&mut rt, vec![s0, s1, s2, s3, s4, s5, s6], &[], 0);
    assert_eq!(rt.interpret_toplevel_thunk(lam).unwrap(), Value::Int(1));
}

/// An error raised by the evaluator itself (not a user `throw`) is equally
/// catchable at an `enter` frame.
#[test]
fn evaluator_errors_are_catchable() {
    let mut rt = Runtime::new();
    let s0 = enter(&mut rt, 3);
    let s1 = ret(&mut rt, Value::Slot(1)); // undefined slot read
    let s2 = ret(&mut rt, Value::Int(-1));
    let lam = thunk_lambda(&mut rt, vec![s0, s1, s2], &["u"], 0);
    assert_eq!(rt.interpret_toplevel_thunk(lam).unwrap(), Value::Int(-1));
}

// =============================================================================
// 4. Top-level bodies
// =============================================================================

/// `toplevel_eval_body` runs with no frame; bare-symbol assignments land in
/// the current module.
#[test]
fn toplevel_body_assigns_globals() {
    let mut rt = Runtime::new();
    let main = rt.main_module;
    let x = rt.sym("x");
    let s0 = assign(&mut rt, x, Value::Int(10));
    let s1 = ret(&mut rt, x);
    assert_eq!(rt.toplevel_eval_body(&[s0, s1]).unwrap(), Value::Int(10));
    assert_eq!(rt.global(main, "x"), Some(Value::Int(10)));
}

/// Line nodes (and `line` expressions) update the process line counter only
/// at top level.
#[test]
fn line_markers_update_line_counter_at_toplevel() {
    let mut rt = Runtime::new();
    let line_expr = rt.expr(StaticSyms::Line, vec![Value::Int(33)]);
    let s1 = ret(&mut rt, Value::Nothing);
    rt.toplevel_eval_body(&[Value::Line(12), line_expr, s1]).unwrap();
    assert_eq!(rt.lineno(), 33);

    // inside a non-toplevel body the counter is untouched
    let s0 = Value::Line(77);
    let body_ret = ret(&mut rt, Value::Int(1));
    let slot_syms: Vec<_> = vec![rt.symbol("f")];
    let lam = rt.lambda(LambdaInfo {
        code: vec![s0, body_ret],
        slotflags: vec![0; 1],
        slotnames: slot_syms,
        ssavaluetypes: SsaInfo::Count(0),
        nargs: 1,
        isva: false,
        sparam_vals: vec![],
        module: None,
    });
    rt.interpret_call(lam, &[Value::Nothing], None).unwrap();
    assert_eq!(rt.lineno(), 33);
}

/// `const` marks a binding constant before its first store; a later
/// conflicting store fails.
#[test]
fn const_declaration_then_conflicting_store() {
    let mut rt = Runtime::new();
    let c = rt.sym("c");
    let const_expr = rt.expr(StaticSyms::Const, vec![c]);
    rt.interpret_toplevel_expr(const_expr).unwrap();
    let s0 = assign(&mut rt, c, Value::Int(2));
    let s1 = ret(&mut rt, c);
    assert_eq!(rt.toplevel_eval_body(&[s0, s1]).unwrap(), Value::Int(2));

    let s0 = assign(&mut rt, c, Value::Int(3));
    let s1 = ret(&mut rt, c);
    let err = rt.toplevel_eval_body(&[s0, s1]).unwrap_err();
    assert!(err.message().contains("invalid redefinition of constant c"));
}

/// `global` creates a writable binding without a value.
#[test]
fn global_declaration_creates_binding() {
    let mut rt = Runtime::new();
    let main = rt.main_module;
    let g = rt.sym("g");
    let global_expr = rt.expr(StaticSyms::Global, vec![g]);
    rt.interpret_toplevel_expr(global_expr).unwrap();
    assert_eq!(rt.global(main, "g"), None);
    let s0 = assign(&mut rt, g, Value::Int(1));
    let s1 = ret(&mut rt, g);
    rt.toplevel_eval_body(&[s0, s1]).unwrap();
    assert_eq!(rt.global(main, "g"), Some(Value::Int(1)));
}
