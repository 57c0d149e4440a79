use std::fmt;
use std::rc::Rc;

use tracing::trace;

use crate::Error;
use crate::MAX_EVAL_DEPTH;
use crate::ast::{Lambda, Procedure, Value};
use crate::builtinops::get_builtin_ops;

mod environment;

pub use environment::Environment;

/// Number of arguments a procedure accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// Exactly n arguments
    Exact(usize),
    /// At least n arguments
    AtLeast(usize),
    /// Between min and max arguments (inclusive)
    Range(usize, usize),
    /// Any number of arguments
    Any,
}

impl Arity {
    /// Check an argument count against this arity
    pub fn validate(&self, got: usize) -> Result<(), Error> {
        let ok = match *self {
            Arity::Exact(n) => got == n,
            Arity::AtLeast(n) => got >= n,
            Arity::Range(min, max) => (min..=max).contains(&got),
            Arity::Any => true,
        };
        if ok {
            Ok(())
        } else {
            Err(Error::arity_error(*self, got))
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exact(n) => write!(f, "exactly {n}"),
            Arity::AtLeast(n) => write!(f, "at least {n}"),
            Arity::Range(min, max) => write!(f, "between {min} and {max}"),
            Arity::Any => write!(f, "any number of"),
        }
    }
}

/// Runtime limits for evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvalConfig {
    /// Maximum nesting of `eval` calls before failing with [`Error::DepthExceeded`]
    pub max_depth: usize,
}

impl Default for EvalConfig {
    fn default() -> Self {
        EvalConfig {
            max_depth: MAX_EVAL_DEPTH,
        }
    }
}

/// Current nesting level, carried through every recursive call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Depth {
    current: usize,
    max: usize,
}

impl Depth {
    /// Depth of a fresh top-level evaluation
    pub(crate) fn start(config: &EvalConfig) -> Depth {
        Depth {
            current: 0,
            max: config.max_depth,
        }
    }

    fn enter(self) -> Result<Depth, Error> {
        if self.current >= self.max {
            return Err(Error::DepthExceeded(self.max));
        }
        Ok(Depth {
            current: self.current + 1,
            max: self.max,
        })
    }
}

/// What a primitive sees of the application that invoked it
#[derive(Debug, Clone, Copy)]
pub struct CallContext<'a> {
    /// Environment the application was evaluated in
    pub env: &'a Environment,
    depth: Depth,
}

impl<'a> CallContext<'a> {
    /// Context for calling a primitive outside of any running evaluation
    pub fn new(env: &'a Environment, config: &EvalConfig) -> Self {
        CallContext {
            env,
            depth: Depth::start(config),
        }
    }

    /// Nesting level of the call site; evaluation started from a primitive continues from it
    pub(crate) fn depth(&self) -> Depth {
        self.depth
    }
}

/// Signature shared by all special form handlers: unevaluated operands, the current
/// environment and the current depth
type SpecialForm = fn(&[Value], &Environment, Depth) -> Result<Value, Error>;

/// Special forms are recognized by their leading symbol before any operand is evaluated.
/// The set is reserved: binding one of these names does not turn the form into a call.
fn find_special_form(name: &str) -> Option<SpecialForm> {
    let form: SpecialForm = match name {
        "quote" => eval_quote,
        "if" => eval_if,
        "define" => eval_define,
        "lambda" => eval_lambda,
        "set!" => eval_set,
        "begin" => eval_begin,
        "let" => eval_let,
        "cond" => eval_cond,
        "and" => eval_and,
        "or" => eval_or,
        _ => return None,
    };
    Some(form)
}

/// Evaluate an expression with the default limits (public API)
pub fn eval(expr: &Value, env: &Environment) -> Result<Value, Error> {
    eval_with_config(expr, env, &EvalConfig::default())
}

/// Evaluate an expression with explicit limits
pub fn eval_with_config(
    expr: &Value,
    env: &Environment,
    config: &EvalConfig,
) -> Result<Value, Error> {
    eval_with_depth_tracking(expr, env, Depth::start(config))
}

/// Apply a procedure to already evaluated arguments (public API).
///
/// `env` is the environment of the call site. Compound procedures ignore it and run in a
/// child of the environment they captured; primitives such as `load` use it to reach the
/// global frame.
pub fn apply(procedure: &Procedure, args: Vec<Value>, env: &Environment) -> Result<Value, Error> {
    apply_with_depth_tracking(procedure, args, env, Depth::start(&EvalConfig::default()))
}

/// Evaluate an expression with depth tracking to prevent stack overflow
pub(crate) fn eval_with_depth_tracking(
    expr: &Value,
    env: &Environment,
    depth: Depth,
) -> Result<Value, Error> {
    let depth = depth.enter()?;
    match expr {
        // Self-evaluating forms
        Value::Integer(_)
        | Value::Real(_)
        | Value::String(_)
        | Value::Boolean(_)
        | Value::Procedure(_)
        | Value::Unassigned => Ok(expr.clone()),

        // Variable lookup
        Value::Symbol(name) => env.lookup(name),

        // Special form or application
        Value::Sequence(elements) => eval_list(elements, env, depth),

        Value::Pair(..) => Err(Error::Syntax(format!(
            "cannot evaluate dotted form: {expr}"
        ))),
    }
}

/// Helper function to evaluate a list of operand expressions left to right
fn eval_args(args: &[Value], env: &Environment, depth: Depth) -> Result<Vec<Value>, Error> {
    args.iter()
        .map(|arg| eval_with_depth_tracking(arg, env, depth))
        .collect()
}

/// Evaluate expressions in order, returning the value of the last one
fn eval_sequence(body: &[Value], env: &Environment, depth: Depth) -> Result<Value, Error> {
    let mut result = Value::Unassigned;
    for expr in body {
        result = eval_with_depth_tracking(expr, env, depth)?;
    }
    Ok(result)
}

/// Evaluate a list expression: special form dispatch, otherwise procedure application
fn eval_list(elements: &[Value], env: &Environment, depth: Depth) -> Result<Value, Error> {
    if let [Value::Symbol(name), operands @ ..] = elements
        && let Some(special_form) = find_special_form(name)
    {
        return special_form(operands, env, depth);
    }

    match elements {
        [] => Err(Error::Syntax("cannot evaluate empty combination ()".to_owned())),

        [operator, operand_exprs @ ..] => {
            let procedure = match eval_with_depth_tracking(operator, env, depth)? {
                Value::Procedure(procedure) => procedure,
                other => {
                    return Err(Error::TypeMismatch(format!(
                        "cannot apply non-procedure {} {other}",
                        other.type_name()
                    )));
                }
            };

            let args = eval_args(operand_exprs, env, depth)?;
            apply_with_depth_tracking(&procedure, args, env, depth)
        }
    }
}

fn apply_with_depth_tracking(
    procedure: &Procedure,
    args: Vec<Value>,
    env: &Environment,
    depth: Depth,
) -> Result<Value, Error> {
    match procedure {
        Procedure::Primitive(op) => {
            trace!(procedure = op.name, args = args.len(), "apply primitive");
            op.call(&args, &CallContext { env, depth })
        }
        Procedure::Compound(lambda) => {
            let name = lambda.name.as_deref().unwrap_or("#<procedure>");
            trace!(procedure = name, args = args.len(), "apply compound");

            if lambda.params.len() != args.len() {
                return Err(Error::arity_error_in(
                    Arity::Exact(lambda.params.len()),
                    args.len(),
                    name,
                ));
            }

            // The call frame hangs off the captured environment, not the caller's
            let frame = Environment::with_parent(&lambda.env);
            for (param, arg) in lambda.params.iter().zip(args) {
                frame.define(param.clone(), arg);
            }

            eval_sequence(&lambda.body, &frame, depth)
        }
    }
}

/// Evaluate quote special form
fn eval_quote(args: &[Value], _env: &Environment, _depth: Depth) -> Result<Value, Error> {
    match args {
        [expr] => Ok(expr.clone()),
        _ => Err(Error::Syntax(format!(
            "quote expects 1 operand, got {}",
            args.len()
        ))),
    }
}

/// Evaluate if special form
fn eval_if(args: &[Value], env: &Environment, depth: Depth) -> Result<Value, Error> {
    let (condition_expr, then_expr, else_expr) = match args {
        [condition, then_branch] => (condition, then_branch, None),
        [condition, then_branch, else_branch] => (condition, then_branch, Some(else_branch)),
        _ => {
            return Err(Error::Syntax(format!(
                "if expects 2 or 3 operands, got {}",
                args.len()
            )));
        }
    };

    if eval_with_depth_tracking(condition_expr, env, depth)?.is_truthy() {
        eval_with_depth_tracking(then_expr, env, depth)
    } else if let Some(else_expr) = else_expr {
        eval_with_depth_tracking(else_expr, env, depth)
    } else {
        Ok(Value::Unassigned)
    }
}

/// Evaluate define special form
fn eval_define(args: &[Value], env: &Environment, depth: Depth) -> Result<Value, Error> {
    match args {
        [Value::Symbol(name), expr] => {
            let value = eval_with_depth_tracking(expr, env, depth)?;
            trace!(name = name.as_str(), "define");
            env.define(name.clone(), value);
            Ok(Value::Unassigned)
        }
        // (define (name params...) body...) binds the procedure directly
        [Value::Sequence(signature), body @ ..] => match signature.as_slice() {
            [Value::Symbol(name), params @ ..] => {
                let lambda = make_lambda(Some(name.clone()), params, body, env)?;
                trace!(name = name.as_str(), "define procedure");
                env.define(name.clone(), lambda);
                Ok(Value::Unassigned)
            }
            _ => Err(Error::Syntax(
                "define requires a procedure name in (define (name params...) body...)"
                    .to_owned(),
            )),
        },
        [_, _] => Err(Error::Syntax("define requires a symbol".to_owned())),
        _ => Err(Error::Syntax(format!(
            "define expects a name and a value, got {} operands",
            args.len()
        ))),
    }
}

/// Evaluate lambda special form
fn eval_lambda(args: &[Value], env: &Environment, _depth: Depth) -> Result<Value, Error> {
    match args {
        [Value::Sequence(params), body @ ..] => make_lambda(None, params, body, env),
        [_, ..] => Err(Error::Syntax(
            "lambda parameters must be a list of symbols".to_owned(),
        )),
        [] => Err(Error::Syntax("lambda requires parameters and a body".to_owned())),
    }
}

/// Build a compound procedure capturing `env`
fn make_lambda(
    name: Option<String>,
    param_list: &[Value],
    body: &[Value],
    env: &Environment,
) -> Result<Value, Error> {
    let mut params = Vec::with_capacity(param_list.len());
    for param in param_list {
        match param {
            Value::Symbol(param_name) => {
                if params.contains(param_name) {
                    return Err(Error::Syntax(format!(
                        "duplicate parameter name: {param_name}"
                    )));
                }
                params.push(param_name.clone());
            }
            other => {
                return Err(Error::Syntax(format!(
                    "lambda parameters must be symbols, got {other}"
                )));
            }
        }
    }

    if body.is_empty() {
        return Err(Error::Syntax("lambda body cannot be empty".to_owned()));
    }

    Ok(Value::Procedure(Procedure::Compound(Rc::new(Lambda {
        name,
        params,
        body: body.to_vec(),
        env: env.clone(),
    }))))
}

/// Evaluate set! special form
fn eval_set(args: &[Value], env: &Environment, depth: Depth) -> Result<Value, Error> {
    match args {
        [Value::Symbol(name), expr] => {
            let value = eval_with_depth_tracking(expr, env, depth)?;
            env.set(name, value)?;
            Ok(Value::Unassigned)
        }
        [_, _] => Err(Error::Syntax("set! requires a symbol".to_owned())),
        _ => Err(Error::Syntax(format!(
            "set! expects a name and a value, got {} operands",
            args.len()
        ))),
    }
}

/// Evaluate begin special form
fn eval_begin(args: &[Value], env: &Environment, depth: Depth) -> Result<Value, Error> {
    eval_sequence(args, env, depth)
}

/// Evaluate let special form: initializers run in the outer environment, the body in a
/// fresh child frame
fn eval_let(args: &[Value], env: &Environment, depth: Depth) -> Result<Value, Error> {
    let [Value::Sequence(bindings), body @ ..] = args else {
        return Err(Error::Syntax(
            "let expects a binding list followed by a body".to_owned(),
        ));
    };
    if body.is_empty() {
        return Err(Error::Syntax("let body cannot be empty".to_owned()));
    }

    let frame = Environment::with_parent(env);
    let mut seen: Vec<&str> = Vec::with_capacity(bindings.len());
    for binding in bindings {
        let Value::Sequence(pair) = binding else {
            return Err(Error::Syntax(format!("malformed let binding: {binding}")));
        };
        let [Value::Symbol(name), init] = pair.as_slice() else {
            return Err(Error::Syntax(format!("malformed let binding: {binding}")));
        };
        if seen.contains(&name.as_str()) {
            return Err(Error::Syntax(format!("duplicate let binding: {name}")));
        }
        seen.push(name);
        frame.define(name.clone(), eval_with_depth_tracking(init, env, depth)?);
    }

    eval_sequence(body, &frame, depth)
}

/// Evaluate cond special form
fn eval_cond(args: &[Value], env: &Environment, depth: Depth) -> Result<Value, Error> {
    for (i, clause) in args.iter().enumerate() {
        let Value::Sequence(parts) = clause else {
            return Err(Error::Syntax(format!("malformed cond clause: {clause}")));
        };
        let [test, body @ ..] = parts.as_slice() else {
            return Err(Error::Syntax("cond clause cannot be empty".to_owned()));
        };

        if matches!(test, Value::Symbol(s) if s == "else") {
            if i + 1 != args.len() {
                return Err(Error::Syntax("else must be the last cond clause".to_owned()));
            }
            return eval_sequence(body, env, depth);
        }

        let test_value = eval_with_depth_tracking(test, env, depth)?;
        if test_value.is_truthy() {
            if body.is_empty() {
                return Ok(test_value);
            }
            return eval_sequence(body, env, depth);
        }
    }
    Ok(Value::Unassigned)
}

macro_rules! boolean_logic_op {
    ($name:ident, $stop_when_truthy:literal, $default:literal) => {
        /// Short-circuiting over truthiness; returns the value that decided the result
        fn $name(args: &[Value], env: &Environment, depth: Depth) -> Result<Value, Error> {
            let mut result = Value::Boolean($default);
            for arg in args {
                result = eval_with_depth_tracking(arg, env, depth)?;
                if result.is_truthy() == $stop_when_truthy {
                    return Ok(result);
                }
            }
            Ok(result)
        }
    };
}

boolean_logic_op!(eval_and, false, true);
boolean_logic_op!(eval_or, true, false);

/// Create a global environment with all builtin procedures bound
pub fn create_global_env() -> Environment {
    let env = Environment::new();
    for builtin_op in get_builtin_ops() {
        env.register_builtin(builtin_op);
    }
    env
}
