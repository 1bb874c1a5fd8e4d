//! Builtin functions.
//!
//! The handful of primitives the evaluator's own tests and any embedding
//! host need before user code has defined a single generic function:
//! arithmetic and comparison on the numeric immediates, tuple construction
//! (also used for vararg packing), type queries, field access, and `throw`.
//!
//! Builtins are immediate values; `apply_generic` routes a call here when
//! the callee is a `Value::Builtin`. The string form of each variant is the
//! name it is bound to in the root module.

use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::{
    exception::{EvalError, EvalResult, ExcKind, type_error},
    intern::Symbol,
    runtime::Runtime,
    value::{Value, egal},
};

/// Builtin functions, bound by name in the root module.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, IntoStaticStr, serde::Serialize, serde::Deserialize,
)]
#[strum(serialize_all = "lowercase")]
pub enum Builtin {
    #[strum(serialize = "+")]
    Add,
    #[strum(serialize = "-")]
    Sub,
    #[strum(serialize = "*")]
    Mul,
    #[strum(serialize = "<")]
    Lt,
    #[strum(serialize = "<=")]
    Le,
    #[strum(serialize = "==")]
    Eq,
    #[strum(serialize = "===")]
    Egal,
    Tuple,
    Typeof,
    Isa,
    Getfield,
    #[strum(serialize = "setfield!")]
    Setfield,
    Throw,
}

fn no_method(rt: &mut Runtime, f: Builtin, args: &[Value]) -> EvalError {
    rt.method_error(Value::Builtin(f), args)
}

fn arity(rt: &mut Runtime, f: Builtin, args: &[Value], expected: usize) -> EvalResult<()> {
    if args.len() == expected {
        Ok(())
    } else {
        let exc = rt.method_error_value(Value::Builtin(f), args);
        Err(EvalError::raise(
            ExcKind::UserThrown(exc),
            format!("wrong number of arguments to {f}: expected {expected}, got {}", args.len()),
        ))
    }
}

/// Applies a builtin to already-evaluated arguments.
pub(crate) fn call_builtin(rt: &mut Runtime, f: Builtin, args: &[Value]) -> EvalResult<Value> {
    match f {
        Builtin::Add | Builtin::Sub | Builtin::Mul => {
            arity(rt, f, args, 2)?;
            numeric_op(f, args[0], args[1]).ok_or_else(|| no_method(rt, f, args))
        }
        Builtin::Lt | Builtin::Le | Builtin::Eq => {
            arity(rt, f, args, 2)?;
            compare(rt, f, args[0], args[1]).ok_or_else(|| no_method(rt, f, args))
        }
        Builtin::Egal => {
            arity(rt, f, args, 2)?;
            Ok(Value::Bool(egal(&rt.heap, args[0], args[1])))
        }
        Builtin::Tuple => Ok(rt.tuple(args.to_vec())),
        Builtin::Typeof => {
            arity(rt, f, args, 1)?;
            Ok(rt.type_of(args[0]))
        }
        Builtin::Isa => {
            arity(rt, f, args, 2)?;
            let Value::DataType(ty) = args[1] else {
                return Err(type_error("isa: expected a type as second argument"));
            };
            let Value::DataType(actual) = rt.type_of(args[0]) else {
                unreachable!("type_of always returns a datatype")
            };
            Ok(Value::Bool(rt.subtype(actual, ty)))
        }
        Builtin::Getfield => {
            arity(rt, f, args, 2)?;
            getfield(rt, args[0], args[1])
        }
        Builtin::Setfield => {
            arity(rt, f, args, 3)?;
            setfield(rt, args[0], args[1], args[2])
        }
        Builtin::Throw => {
            arity(rt, f, args, 1)?;
            let msg = rt.display_value(args[0]);
            Err(EvalError::raise(ExcKind::UserThrown(args[0]), msg))
        }
    }
}

fn numeric_op(f: Builtin, a: Value, b: Value) -> Option<Value> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Some(Value::Int(match f {
            Builtin::Add => x.wrapping_add(y),
            Builtin::Sub => x.wrapping_sub(y),
            Builtin::Mul => x.wrapping_mul(y),
            _ => return None,
        })),
        _ => {
            let (x, y) = (as_f64(a)?, as_f64(b)?);
            Some(Value::Float(match f {
                Builtin::Add => x + y,
                Builtin::Sub => x - y,
                Builtin::Mul => x * y,
                _ => return None,
            }))
        }
    }
}

fn compare(rt: &Runtime, f: Builtin, a: Value, b: Value) -> Option<Value> {
    match (as_f64(a), as_f64(b)) {
        (Some(x), Some(y)) => Some(Value::Bool(match f {
            Builtin::Lt => x < y,
            Builtin::Le => x <= y,
            Builtin::Eq => x == y,
            _ => return None,
        })),
        // non-numeric `==` falls back to identity
        _ if f == Builtin::Eq => Some(Value::Bool(egal(&rt.heap, a, b))),
        _ => None,
    }
}

fn as_f64(v: Value) -> Option<f64> {
    match v {
        Value::Int(n) => Some(n as f64),
        Value::Float(x) => Some(x),
        _ => None,
    }
}

/// Resolves a field spec (1-based index or symbol) to a field index.
fn field_index(rt: &Runtime, ty_name: Symbol, names: &[Symbol], spec: Value) -> EvalResult<usize> {
    match spec {
        Value::Int(n) if n >= 1 && (n as usize) <= names.len() => Ok(n as usize - 1),
        Value::Sym(s) => names.iter().position(|&n| n == s).ok_or_else(|| {
            type_error(format!(
                "type {} has no field {}",
                rt.interns.symbol_name(ty_name),
                rt.interns.symbol_name(s)
            ))
        }),
        _ => Err(type_error(format!(
            "invalid field specifier for type {}",
            rt.interns.symbol_name(ty_name)
        ))),
    }
}

fn getfield(rt: &mut Runtime, obj: Value, spec: Value) -> EvalResult<Value> {
    match obj {
        Value::Struct(id) => {
            let ty = rt.heap.struct_data(id).ty;
            let dt = rt.heap.datatype(ty);
            let idx = field_index(rt, dt.name, &dt.field_names, spec)?;
            match rt.heap.struct_data(id).fields[idx] {
                Some(v) => Ok(v),
                None => {
                    let name = rt.heap.datatype(ty).field_names[idx];
                    Err(EvalError::raise(
                        ExcKind::UndefinedVar(name),
                        format!("access to undefined reference {}", rt.interns.symbol_name(name)),
                    ))
                }
            }
        }
        Value::Tuple(id) => {
            let elts = rt.heap.tuple(id);
            match spec.as_long() {
                Some(n) if n >= 1 && (n as usize) <= elts.len() => Ok(elts[n as usize - 1]),
                _ => Err(type_error("tuple index out of range")),
            }
        }
        Value::Module(m) => {
            let Value::Sym(name) = spec else {
                return Err(type_error("getfield: module field must be a symbol"));
            };
            rt.modules.get_global(m, name).ok_or_else(|| {
                EvalError::raise(
                    ExcKind::UndefinedVar(name),
                    format!("{} not defined", rt.interns.symbol_name(name)),
                )
            })
        }
        _ => Err(no_method(rt, Builtin::Getfield, &[obj, spec])),
    }
}

fn setfield(rt: &mut Runtime, obj: Value, spec: Value, value: Value) -> EvalResult<Value> {
    let Value::Struct(id) = obj else {
        return Err(no_method(rt, Builtin::Setfield, &[obj, spec, value]));
    };
    let ty = rt.heap.struct_data(id).ty;
    let dt = rt.heap.datatype(ty);
    if !dt.mutable_ {
        return Err(type_error(format!(
            "type {} is immutable",
            rt.interns.symbol_name(dt.name)
        )));
    }
    let idx = field_index(rt, dt.name, &dt.field_names, spec)?;
    rt.heap.struct_data_mut(id).fields[idx] = Some(value);
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::Runtime;

    #[test]
    fn arithmetic_promotes_to_float() {
        let mut rt = Runtime::new();
        assert_eq!(call_builtin(&mut rt, Builtin::Add, &[Value::Int(2), Value::Int(3)]).unwrap(), Value::Int(5));
        assert_eq!(
            call_builtin(&mut rt, Builtin::Mul, &[Value::Int(2), Value::Float(1.5)]).unwrap(),
            Value::Float(3.0)
        );
        assert!(call_builtin(&mut rt, Builtin::Add, &[Value::Bool(true), Value::Int(1)]).is_err());
    }

    #[test]
    fn builtin_names_round_trip() {
        use std::str::FromStr;
        assert_eq!(Builtin::from_str("+").unwrap(), Builtin::Add);
        assert_eq!(Builtin::from_str("setfield!").unwrap(), Builtin::Setfield);
        assert_eq!(<&'static str>::from(Builtin::Tuple), "tuple");
    }
}
