//! Runtime error representation.
//!
//! Two layers, mirrored by the two `EvalError` variants:
//!
//! * `Internal` - a bug in the interpreter itself. Never catchable, never
//!   surfaced as a language exception.
//! * `Raise` - a language-level exception in flight. Catchable at
//!   `enter`-protected body frames; everything the evaluator raises
//!   (malformed IR, undefined variables, typedef failures, user `throw`s)
//!   travels this way.
//!
//! Messages are formatted at raise time; the evaluator adds no stack
//! context of its own.

use std::{
    borrow::Cow,
    fmt::{self, Display},
};

use crate::{intern::Symbol, value::Value};

/// Result type alias for operations that can raise.
pub type EvalResult<T> = Result<T, EvalError>;

/// Classification of a raised exception.
#[derive(Debug, Clone, Copy, PartialEq, strum::Display, strum::IntoStaticStr)]
pub enum ExcKind {
    /// Malformed IR: bad SSA/slot indices, unknown heads, return-less body.
    InvalidIR,
    /// A slot, global, or symbol lookup failed; carries the name.
    UndefinedVar(Symbol),
    /// A value had the wrong type for its position (non-boolean branch
    /// condition, non-type composite field, ...).
    TypeMismatch,
    /// A type definition was rejected or could not complete.
    InvalidTypedef,
    /// `static_parameter` could not be resolved to a value.
    SparamUnknown,
    /// An `error`/`incomplete` form carrying a source string.
    Syntax,
    /// A value thrown by user code or a collaborator; carries the payload.
    /// Failed dispatch travels this way too, carrying a method-error value.
    UserThrown(Value),
}

/// A language-level exception in flight.
#[derive(Debug, Clone)]
pub struct Raised {
    pub kind: ExcKind,
    pub msg: Cow<'static, str>,
}

/// Error produced by evaluation.
#[derive(Debug)]
pub enum EvalError {
    /// Internal interpreter error - indicates a bug in Livia, not user code.
    Internal(Cow<'static, str>),
    /// Catchable language exception.
    Raise(Box<Raised>),
}

impl EvalError {
    pub fn internal(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn raise(kind: ExcKind, msg: impl Into<Cow<'static, str>>) -> Self {
        Self::Raise(Box::new(Raised { kind, msg: msg.into() }))
    }

    /// The exception kind, if this is a catchable raise.
    pub fn kind(&self) -> Option<ExcKind> {
        match self {
            Self::Raise(raised) => Some(raised.kind),
            Self::Internal(_) => None,
        }
    }

    /// The formatted message.
    pub fn message(&self) -> &str {
        match self {
            Self::Internal(msg) => msg,
            Self::Raise(raised) => &raised.msg,
        }
    }
}

impl Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Internal(msg) => write!(f, "internal error in livia: {msg}"),
            Self::Raise(raised) => write!(f, "{}: {}", raised.kind, raised.msg),
        }
    }
}

impl std::error::Error for EvalError {}

pub(crate) fn invalid_ir(msg: impl Into<Cow<'static, str>>) -> EvalError {
    EvalError::raise(ExcKind::InvalidIR, msg)
}

pub(crate) fn type_error(msg: impl Into<Cow<'static, str>>) -> EvalError {
    EvalError::raise(ExcKind::TypeMismatch, msg)
}

pub(crate) fn typedef_error(msg: impl Into<Cow<'static, str>>) -> EvalError {
    EvalError::raise(ExcKind::InvalidTypedef, msg)
}
