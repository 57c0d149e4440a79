//! Built-in procedure registry.
//!
//! Every primitive is a plain function over already evaluated arguments, registered once
//! in [`BUILTIN_OPS`] with its name and [`Arity`]. The global environment binds each entry
//! as a [`Procedure::Primitive`](crate::ast::Procedure::Primitive), so primitives are
//! found through ordinary symbol lookup and can be passed around like any other value:
//!
//! ```scheme
//! (+ 1 2.5)              ; => 3.5
//! (< 1 2 3)              ; => #t
//! (cons 1 2)             ; => (1 . 2)
//! ((lambda (op) (op 6 3)) /)  ; => 2.0
//! ```
//!
//! ## Numeric rules
//!
//! - Integer-only arithmetic is checked; leaving the 64-bit range is an
//!   [`Error::Overflow`], never a wrapped or narrowed result.
//! - Any real operand makes the result real.
//! - `/` always produces a real, and a zero divisor (integer or real) is
//!   [`Error::DivisionByZero`].
//! - All comparison operators require at least two numeric operands.
//!
//! ## Adding New Operations
//!
//! 1. **Implement the function** with the [`PrimitiveFn`] signature
//! 2. **Add it to BUILTIN_OPS** with its name and arity
//! 3. **Add tests** covering edge cases and error conditions

use std::cmp::Ordering;
use std::io::Write;
use std::path::Path;

use tracing::debug;

use crate::Error;
use crate::ast::{Number, Value, compare_chain};
use crate::evaluator::{Arity, CallContext};
use crate::loader::load_file_at;

/// Canonical primitive signature: evaluated arguments and the context of the call site
pub type PrimitiveFn = fn(&[Value], &CallContext<'_>) -> Result<Value, Error>;

/// Definition of a built-in operation
#[derive(Clone, Copy)]
pub struct BuiltinOp {
    /// The identifier this operation is bound to in the global environment
    pub name: &'static str,
    /// Expected number of arguments, checked before `func` runs
    pub arity: Arity,
    pub func: PrimitiveFn,
}

impl std::fmt::Debug for BuiltinOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuiltinOp")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish_non_exhaustive()
    }
}

impl PartialEq for BuiltinOp {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl BuiltinOp {
    /// Validate the argument count, then run the operation
    pub fn call(&self, args: &[Value], ctx: &CallContext<'_>) -> Result<Value, Error> {
        self.arity
            .validate(args.len())
            .map_err(|_| Error::arity_error_in(self.arity, args.len(), self.name))?;
        (self.func)(args, ctx)
    }
}

//
// Builtin Function Implementations
//

/// Numeric view of an argument, with an error naming the operation
fn numeric_arg(op_name: &str, value: &Value) -> Result<Number, Error> {
    value.as_number().map_err(|_| {
        Error::TypeMismatch(format!(
            "can't apply '{op_name}' to {} {value}",
            value.type_name()
        ))
    })
}

fn builtin_add(args: &[Value], _ctx: &CallContext<'_>) -> Result<Value, Error> {
    let mut sum = Number::Integer(0);
    for arg in args {
        sum = sum.checked_add(numeric_arg("+", arg)?)?;
    }
    Ok(sum.into())
}

fn builtin_sub(args: &[Value], _ctx: &CallContext<'_>) -> Result<Value, Error> {
    let (first, rest) = args
        .split_first()
        .ok_or_else(|| Error::arity_error_in(Arity::AtLeast(1), 0, "-"))?;
    let first = numeric_arg("-", first)?;

    if rest.is_empty() {
        return Ok(first.checked_neg()?.into());
    }

    let mut result = first;
    for arg in rest {
        result = result.checked_sub(numeric_arg("-", arg)?)?;
    }
    Ok(result.into())
}

fn builtin_mul(args: &[Value], _ctx: &CallContext<'_>) -> Result<Value, Error> {
    let mut product = Number::Integer(1);
    for arg in args {
        product = product.checked_mul(numeric_arg("*", arg)?)?;
    }
    Ok(product.into())
}

/// Division always yields a real; `(/ x)` is the reciprocal of x
fn builtin_div(args: &[Value], _ctx: &CallContext<'_>) -> Result<Value, Error> {
    let (first, rest) = args
        .split_first()
        .ok_or_else(|| Error::arity_error_in(Arity::AtLeast(1), 0, "/"))?;
    let first = numeric_arg("/", first)?;

    let (mut quotient, divisors) = if rest.is_empty() {
        (1.0, std::slice::from_ref(&args[0]))
    } else {
        (first.to_f64(), rest)
    };

    for arg in divisors {
        let divisor = numeric_arg("/", arg)?;
        if divisor.is_zero() {
            return Err(Error::DivisionByZero("/".to_owned()));
        }
        quotient /= divisor.to_f64();
    }
    Ok(Value::Real(quotient))
}

/// Integer remainder with the sign of the dividend
fn builtin_remainder(args: &[Value], _ctx: &CallContext<'_>) -> Result<Value, Error> {
    let [dividend, divisor] = args else {
        return Err(Error::arity_error_in(Arity::Exact(2), args.len(), "remainder"));
    };
    let integer_arg = |value: &Value| {
        value.as_integer().map_err(|_| {
            Error::TypeMismatch(format!(
                "remainder only takes integers, got {} {value}",
                value.type_name()
            ))
        })
    };
    let (dividend, divisor) = (integer_arg(dividend)?, integer_arg(divisor)?);

    if divisor == 0 {
        return Err(Error::DivisionByZero("remainder".to_owned()));
    }
    dividend
        .checked_rem(divisor)
        .map(Value::Integer)
        .ok_or_else(|| Error::Overflow("remainder".to_owned()))
}

// Macro to generate chained numeric comparison functions
macro_rules! numeric_comparison {
    ($name:ident, $op_str:expr, $accept:expr) => {
        fn $name(args: &[Value], _ctx: &CallContext<'_>) -> Result<Value, Error> {
            // Every adjacent pair must satisfy the comparison
            compare_chain(args, $accept)
                .map(Value::Boolean)
                .map_err(|err| match err {
                    Error::TypeMismatch(msg) => {
                        Error::TypeMismatch(format!("'{}' {msg}", $op_str))
                    }
                    other => other,
                })
        }
    };
}

numeric_comparison!(builtin_num_eq, "=", |o: Ordering| o == Ordering::Equal);
numeric_comparison!(builtin_lt, "<", |o: Ordering| o == Ordering::Less);
numeric_comparison!(builtin_gt, ">", |o: Ordering| o == Ordering::Greater);
numeric_comparison!(builtin_le, "<=", |o: Ordering| o != Ordering::Greater);
numeric_comparison!(builtin_ge, ">=", |o: Ordering| o != Ordering::Less);

/// Structural equality; `eq?` shares this definition
fn builtin_equal(args: &[Value], _ctx: &CallContext<'_>) -> Result<Value, Error> {
    match args {
        [first, second] => Ok(Value::Boolean(first.equals(second))),
        _ => Err(Error::arity_error_in(Arity::Exact(2), args.len(), "equal?")),
    }
}

fn builtin_not(args: &[Value], _ctx: &CallContext<'_>) -> Result<Value, Error> {
    match args {
        [value] => Ok(Value::Boolean(!value.is_truthy())),
        _ => Err(Error::arity_error_in(Arity::Exact(1), args.len(), "not")),
    }
}

/// Prepends to a proper list, otherwise builds a dotted pair
fn builtin_cons(args: &[Value], _ctx: &CallContext<'_>) -> Result<Value, Error> {
    match args {
        [first, Value::Sequence(tail)] => {
            let mut list = Vec::with_capacity(tail.len() + 1);
            list.push(first.clone());
            list.extend_from_slice(tail);
            Ok(Value::Sequence(list))
        }
        [first, rest] => Ok(Value::pair(first.clone(), rest.clone())),
        _ => Err(Error::arity_error_in(Arity::Exact(2), args.len(), "cons")),
    }
}

fn builtin_car(args: &[Value], _ctx: &CallContext<'_>) -> Result<Value, Error> {
    match args {
        [Value::Pair(first, _)] => Ok((**first).clone()),
        [Value::Sequence(list)] => list
            .first()
            .cloned()
            .ok_or_else(|| Error::TypeMismatch("car of empty list".to_owned())),
        [other] => Err(Error::TypeMismatch(format!(
            "car expects a pair or list, got {} {other}",
            other.type_name()
        ))),
        _ => Err(Error::arity_error_in(Arity::Exact(1), args.len(), "car")),
    }
}

fn builtin_cdr(args: &[Value], _ctx: &CallContext<'_>) -> Result<Value, Error> {
    match args {
        [Value::Pair(_, rest)] => Ok((**rest).clone()),
        [Value::Sequence(list)] => match list.split_first() {
            Some((_, rest)) => Ok(Value::Sequence(rest.to_vec())),
            None => Err(Error::TypeMismatch("cdr of empty list".to_owned())),
        },
        [other] => Err(Error::TypeMismatch(format!(
            "cdr expects a pair or list, got {} {other}",
            other.type_name()
        ))),
        _ => Err(Error::arity_error_in(Arity::Exact(1), args.len(), "cdr")),
    }
}

fn builtin_list(args: &[Value], _ctx: &CallContext<'_>) -> Result<Value, Error> {
    Ok(Value::Sequence(args.to_vec()))
}

fn builtin_null(args: &[Value], _ctx: &CallContext<'_>) -> Result<Value, Error> {
    match args {
        [value] => Ok(Value::Boolean(value.is_nil())),
        _ => Err(Error::arity_error_in(Arity::Exact(1), args.len(), "null?")),
    }
}

fn stdout_failure(err: &std::io::Error) -> Error {
    Error::io_failure("<stdout>", err)
}

/// Writes the arguments separated by a space. Top-level strings are written without
/// quotes; strings nested inside lists keep their literal form.
fn write_display(out: &mut impl Write, args: &[Value]) -> std::io::Result<()> {
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            write!(out, " ")?;
        }
        match arg {
            Value::String(s) => write!(out, "{s}")?,
            other => write!(out, "{other}")?,
        }
    }
    Ok(())
}

fn builtin_display(args: &[Value], _ctx: &CallContext<'_>) -> Result<Value, Error> {
    let mut out = std::io::stdout().lock();
    write_display(&mut out, args)
        .and_then(|()| out.flush())
        .map_err(|e| stdout_failure(&e))?;
    Ok(Value::Unassigned)
}

fn builtin_newline(_args: &[Value], _ctx: &CallContext<'_>) -> Result<Value, Error> {
    let mut out = std::io::stdout().lock();
    writeln!(out).map_err(|e| stdout_failure(&e))?;
    Ok(Value::Unassigned)
}

/// Evaluates every form of a file in the global environment. The file's forms nest inside
/// the calling application, so a file that loads itself runs into the depth limit.
fn builtin_load(args: &[Value], ctx: &CallContext<'_>) -> Result<Value, Error> {
    let [path] = args else {
        return Err(Error::arity_error_in(Arity::Exact(1), args.len(), "load"));
    };
    let path = path.as_str().map_err(|_| {
        Error::TypeMismatch(format!(
            "load expects a file name string, got {} {path}",
            path.type_name()
        ))
    })?;

    load_file_at(Path::new(path), &ctx.env.global(), ctx.depth())?;
    Ok(Value::Unassigned)
}

fn builtin_quit(_args: &[Value], _ctx: &CallContext<'_>) -> Result<Value, Error> {
    debug!("quit requested");
    Err(Error::Quit)
}

/// Global registry of all built-in operations.
pub static BUILTIN_OPS: &[BuiltinOp] = &[
    // Arithmetic operations
    BuiltinOp {
        name: "+",
        arity: Arity::Any,
        func: builtin_add,
    },
    BuiltinOp {
        name: "-",
        arity: Arity::AtLeast(1),
        func: builtin_sub,
    },
    BuiltinOp {
        name: "*",
        arity: Arity::Any,
        func: builtin_mul,
    },
    BuiltinOp {
        name: "/",
        arity: Arity::AtLeast(1),
        func: builtin_div,
    },
    BuiltinOp {
        name: "remainder",
        arity: Arity::Exact(2),
        func: builtin_remainder,
    },
    // Comparison operations
    BuiltinOp {
        name: "=",
        arity: Arity::AtLeast(2),
        func: builtin_num_eq,
    },
    BuiltinOp {
        name: "<",
        arity: Arity::AtLeast(2),
        func: builtin_lt,
    },
    BuiltinOp {
        name: ">",
        arity: Arity::AtLeast(2),
        func: builtin_gt,
    },
    BuiltinOp {
        name: "<=",
        arity: Arity::AtLeast(2),
        func: builtin_le,
    },
    BuiltinOp {
        name: ">=",
        arity: Arity::AtLeast(2),
        func: builtin_ge,
    },
    BuiltinOp {
        name: "equal?",
        arity: Arity::Exact(2),
        func: builtin_equal,
    },
    BuiltinOp {
        name: "eq?",
        arity: Arity::Exact(2),
        func: builtin_equal,
    },
    // Logical operations
    BuiltinOp {
        name: "not",
        arity: Arity::Exact(1),
        func: builtin_not,
    },
    // Pair and list operations
    BuiltinOp {
        name: "cons",
        arity: Arity::Exact(2),
        func: builtin_cons,
    },
    BuiltinOp {
        name: "car",
        arity: Arity::Exact(1),
        func: builtin_car,
    },
    BuiltinOp {
        name: "cdr",
        arity: Arity::Exact(1),
        func: builtin_cdr,
    },
    BuiltinOp {
        name: "list",
        arity: Arity::Any,
        func: builtin_list,
    },
    BuiltinOp {
        name: "null?",
        arity: Arity::Exact(1),
        func: builtin_null,
    },
    // Output
    BuiltinOp {
        name: "display",
        arity: Arity::Any,
        func: builtin_display,
    },
    BuiltinOp {
        name: "newline",
        arity: Arity::Exact(0),
        func: builtin_newline,
    },
    // Driver interaction
    BuiltinOp {
        name: "load",
        arity: Arity::Exact(1),
        func: builtin_load,
    },
    BuiltinOp {
        name: "quit",
        arity: Arity::Exact(0),
        func: builtin_quit,
    },
    BuiltinOp {
        name: "exit",
        arity: Arity::Exact(0),
        func: builtin_quit,
    },
];

/// Get all builtin operations (used to populate the global environment)
pub fn get_builtin_ops() -> &'static [BuiltinOp] {
    BUILTIN_OPS
}
