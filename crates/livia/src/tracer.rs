//! Execution tracing infrastructure.
//!
//! Provides a trait-based tracing system for the evaluator with zero-cost
//! abstraction: the interpreter is generic over [`EvalTracer`], so with
//! [`NoopTracer`] every hook compiles away entirely via monomorphization.
//!
//! | Tracer | Purpose |
//! |--------|---------|
//! | [`NoopTracer`] | Zero-cost no-op (production default) |
//! | [`StderrTracer`] | Human-readable execution log to stderr |
//! | [`RecordingTracer`] | Full event recording for post-mortem analysis |

use crate::{builtins::Builtin, intern::Symbol, value::Value};

/// Trace event emitted during evaluation.
///
/// Used by [`RecordingTracer`] to capture an execution trace.
#[derive(Debug, Clone, PartialEq)]
pub enum TraceEvent {
    /// A body statement was dispatched at the given instruction pointer.
    Statement { ip: usize },
    /// A compound expression with the given head was evaluated.
    Expr { head: Symbol },
    /// A builtin was invoked with `nargs` arguments.
    BuiltinCall { builtin: Builtin, nargs: usize },
    /// A generic-function method was invoked with `nargs` arguments.
    MethodCall { name: Symbol, nargs: usize },
    /// An `enter` statement registered a handler resuming at `catch_label`.
    HandlerEnter { catch_label: usize },
    /// An exception was caught; execution resumes at `catch_label`.
    HandlerCatch { catch_label: usize },
    /// A body returned the given value.
    Return { value: Value },
}

/// Hook points the evaluator reports into.
///
/// All methods have empty default implementations; implement only what you
/// need.
pub trait EvalTracer {
    fn on_statement(&mut self, ip: usize) {
        let _ = ip;
    }

    fn on_expr(&mut self, head: Symbol) {
        let _ = head;
    }

    fn on_builtin_call(&mut self, builtin: Builtin, nargs: usize) {
        let _ = (builtin, nargs);
    }

    fn on_method_call(&mut self, name: Symbol, nargs: usize) {
        let _ = (name, nargs);
    }

    fn on_handler_enter(&mut self, catch_label: usize) {
        let _ = catch_label;
    }

    fn on_handler_catch(&mut self, catch_label: usize) {
        let _ = catch_label;
    }

    fn on_return(&mut self, value: Value) {
        let _ = value;
    }
}

/// Zero-cost tracer: every hook is a no-op the optimizer removes.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracer;

impl EvalTracer for NoopTracer {}

/// Logs every event to stderr in a compact human-readable form.
#[derive(Debug, Clone, Copy, Default)]
pub struct StderrTracer;

impl EvalTracer for StderrTracer {
    fn on_statement(&mut self, ip: usize) {
        eprintln!("stmt   ip={ip}");
    }

    fn on_expr(&mut self, head: Symbol) {
        eprintln!("expr   head={head:?}");
    }

    fn on_builtin_call(&mut self, builtin: Builtin, nargs: usize) {
        eprintln!("call   builtin={builtin} nargs={nargs}");
    }

    fn on_method_call(&mut self, name: Symbol, nargs: usize) {
        eprintln!("call   method={name:?} nargs={nargs}");
    }

    fn on_handler_enter(&mut self, catch_label: usize) {
        eprintln!("enter  catch={catch_label}");
    }

    fn on_handler_catch(&mut self, catch_label: usize) {
        eprintln!("catch  resume={catch_label}");
    }

    fn on_return(&mut self, value: Value) {
        eprintln!("return {value:?}");
    }
}

/// Records every event for later inspection.
#[derive(Debug, Default)]
pub struct RecordingTracer {
    events: Vec<TraceEvent>,
}

impl RecordingTracer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    pub fn into_events(self) -> Vec<TraceEvent> {
        self.events
    }
}

impl EvalTracer for RecordingTracer {
    fn on_statement(&mut self, ip: usize) {
        self.events.push(TraceEvent::Statement { ip });
    }

    fn on_expr(&mut self, head: Symbol) {
        self.events.push(TraceEvent::Expr { head });
    }

    fn on_builtin_call(&mut self, builtin: Builtin, nargs: usize) {
        self.events.push(TraceEvent::BuiltinCall { builtin, nargs });
    }

    fn on_method_call(&mut self, name: Symbol, nargs: usize) {
        self.events.push(TraceEvent::MethodCall { name, nargs });
    }

    fn on_handler_enter(&mut self, catch_label: usize) {
        self.events.push(TraceEvent::HandlerEnter { catch_label });
    }

    fn on_handler_catch(&mut self, catch_label: usize) {
        self.events.push(TraceEvent::HandlerCatch { catch_label });
    }

    fn on_return(&mut self, value: Value) {
        self.events.push(TraceEvent::Return { value });
    }
}
