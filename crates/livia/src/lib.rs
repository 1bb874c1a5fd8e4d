#![doc = include_str!("../../../README.md")]
#![expect(clippy::cast_possible_truncation, reason = "id and label narrowing is validated at the boundaries")]
#![expect(clippy::cast_sign_loss, reason = "indices are range-checked before converting to unsigned")]
#![expect(clippy::must_use_candidate, reason = "builder and inspection APIs are used for effects too")]
#![expect(clippy::missing_panics_doc, reason = "reachable panics are documented; the rest are heap-corruption guards")]
#![expect(clippy::module_name_repetitions, reason = "id types are named after the table they index")]

mod builtins;
mod datatype;
mod dispatch;
mod exception;
mod heap;
mod intern;
mod interp;
mod ir;
mod module;
mod runtime;
mod toplevel;
mod tracer;
mod value;

pub use crate::{
    builtins::Builtin,
    datatype::{DataType, TypeVar},
    dispatch::{GenericFunc, Method},
    exception::{EvalError, EvalResult, ExcKind, Raised},
    heap::{HeapData, HeapId, StructInstance},
    intern::{StaticSyms, StringId, Symbol},
    ir::{ExprNode, LambdaInfo, SsaInfo},
    module::{Binding, Module, ModuleId},
    runtime::{Primordials, Runtime},
    tracer::{EvalTracer, NoopTracer, RecordingTracer, StderrTracer, TraceEvent},
    value::Value,
};
