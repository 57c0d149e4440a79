//! Schemelet - a small Scheme-like interpreter
//!
//! This crate provides the evaluator core of a minimal Scheme dialect together with the
//! reader and primitive library it plugs into:
//!
//! ```scheme
//! (define (square x) (* x x))
//! (square 12)             ; => 144
//! (/ 1 4)                 ; => 0.25 (division always yields a real)
//! (cons 1 2)              ; => (1 . 2)
//! (list 1 2.5 "three")    ; => (1 2.5 "three")
//! ```
//!
//! ## Semantics
//!
//! - Integers are 64-bit; an integer result outside that range is an error, never a
//!   silently narrowed value.
//! - Mixing an integer with a real promotes the whole operation to a real.
//! - Only `#f` is false. `0`, `""` and `()` are all true in a conditional.
//! - Procedures close over the environment they were created in. Frames are shared, so a
//!   `set!` through a closure is visible to every other closure holding that frame.
//! - Every failure travels back to the caller as an [`Error`]; evaluation never exits the
//!   process. The `quit` primitive raises [`Error::Quit`] for the driver to act on.
//!
//! ## Modules
//!
//! - `ast`: runtime values and procedures
//! - `scheme`: S-expression parsing from text
//! - `evaluator`: environments and the eval/apply engine
//! - `builtinops`: the primitive procedure registry
//! - `loader`: evaluating whole programs and files

use evaluator::Arity;

/// Maximum parsing depth to prevent stack overflow attacks
/// This limits deeply nested structures in the S-expression reader
pub const MAX_PARSE_DEPTH: usize = 128;

/// Default maximum evaluation depth.
/// Every nested `eval` call counts one level, so a recursive procedure uses several levels
/// per call, and a `load` from running code continues the count of its caller. Exceeding
/// the limit fails with [`Error::DepthExceeded`].
///
/// The default lets runaway recursion fail cleanly on an ordinary 8 MiB thread stack, debug
/// builds included; a chain of nested `load`s costs more stack per level. Deeper limits
/// through [`EvalConfig`] need a correspondingly larger stack; the `schemelet` binary runs
/// on a 256 MiB worker thread and defaults to 10 000.
pub const MAX_EVAL_DEPTH: usize = 1_000;

/// Error types for the interpreter
///
/// All variants carry a human-readable message through their `Display` implementation;
/// the driver prints that message and decides whether to continue.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// The reader could not turn source text into a datum
    #[error("ParseError: {0}")]
    Parse(String),
    /// A special form was malformed, or a datum cannot be evaluated as code
    #[error("SyntaxError: {0}")]
    Syntax(String),
    /// Operand variant unsuitable for the requested operation
    #[error("Type error: {0}")]
    TypeMismatch(String),
    #[error("Unbound variable: {0}")]
    UnboundVariable(String),
    #[error(
        "ArityError: {}expected {expected} arguments, got {got}",
        procedure_prefix(.procedure)
    )]
    ArityError {
        expected: Arity,
        got: usize,
        procedure: Option<String>,
    },
    #[error("Division by zero in {0}")]
    DivisionByZero(String),
    /// Integer result outside the 64-bit range
    #[error("Integer overflow in {0}")]
    Overflow(String),
    #[error("I/O failure: {path}: {message}")]
    IoFailure { path: String, message: String },
    #[error("Evaluation depth limit exceeded (max: {0})")]
    DepthExceeded(usize),
    /// Not a failure: raised by `quit` and `exit` so the driver can terminate
    #[error("Quit requested")]
    Quit,
}

fn procedure_prefix(procedure: &Option<String>) -> String {
    match procedure {
        Some(name) => format!("{name}: "),
        None => String::new(),
    }
}

impl Error {
    /// Create an ArityError without procedure context
    pub fn arity_error(expected: Arity, got: usize) -> Self {
        Error::ArityError {
            expected,
            got,
            procedure: None,
        }
    }

    /// Create an ArityError naming the procedure that rejected the call
    pub fn arity_error_in(expected: Arity, got: usize, procedure: impl Into<String>) -> Self {
        Error::ArityError {
            expected,
            got,
            procedure: Some(procedure.into()),
        }
    }

    pub(crate) fn io_failure(path: impl Into<String>, err: &std::io::Error) -> Self {
        Error::IoFailure {
            path: path.into(),
            message: err.to_string(),
        }
    }
}

pub mod ast;
pub mod builtinops;
pub mod evaluator;
pub mod loader;
pub mod scheme;

pub use ast::{Procedure, Value};
pub use evaluator::{Environment, EvalConfig, apply, create_global_env, eval};
pub use loader::{load_file, run_source};
pub use scheme::{ParseConfig, parse_program, parse_scheme};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let cases = vec![
            (Error::UnboundVariable("x".into()), "Unbound variable: x"),
            (
                Error::arity_error(Arity::Exact(2), 3),
                "ArityError: expected exactly 2 arguments, got 3",
            ),
            (
                Error::arity_error_in(Arity::AtLeast(2), 1, "<"),
                "ArityError: <: expected at least 2 arguments, got 1",
            ),
            (
                Error::DivisionByZero("/".into()),
                "Division by zero in /",
            ),
            (
                Error::IoFailure {
                    path: "missing.scm".into(),
                    message: "not found".into(),
                },
                "I/O failure: missing.scm: not found",
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.to_string(), expected);
        }
    }
}
