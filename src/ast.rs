//! This module defines the runtime value representation shared by the reader and the
//! evaluator. The main enum, [`Value`], covers every datum the interpreter manipulates:
//! integers, reals, booleans, strings, symbols, pairs, sequences and procedures. Parsed
//! programs are themselves `Value` trees, which is what lets `quote` hand code back as data.
//!
//! Equality is structural and variant-sensitive: a [`Value::Pair`] never equals a
//! [`Value::Sequence`], and the integer `1` never equals the real `1.0`. Numeric operands
//! are viewed through [`Number`], which owns the promotion rule (any real operand makes the
//! result real) and the checked integer arithmetic.

use std::cmp::Ordering;
use std::rc::Rc;

use crate::Error;
use crate::builtinops::BuiltinOp;
use crate::evaluator::Environment;

/// Type alias for integer values in interpreter
pub(crate) type IntegerType = i64;

/// Allowed non-alphanumeric characters in symbol names
pub(crate) const SYMBOL_SPECIAL_CHARS: &str = "+-*/<>=!?_$.:%&^~";

/// Check if a string is a valid symbol name
/// Valid: non-empty, not ".", no leading digit, no sign-or-dot followed by a digit,
/// alphanumeric + SYMBOL_SPECIAL_CHARS
pub(crate) fn is_valid_symbol(name: &str) -> bool {
    let mut chars = name.chars();

    match chars.next() {
        None => false,
        Some(first_char) => {
            if first_char.is_ascii_digit() || name == "." {
                return false;
            }

            if matches!(first_char, '-' | '+' | '.')
                && let Some(second_char) = chars.next()
                && second_char.is_ascii_digit()
            {
                return false;
            }

            name.chars()
                .all(|c| c.is_alphanumeric() || SYMBOL_SPECIAL_CHARS.contains(c))
        }
    }
}

/// Core value type in interpreter
///
/// To build values in code and tests, use the helper functions:
/// - `val(42)`, `val(2.5)`, `val("text")` for atoms, `sym("name")` for symbols
/// - `val([1, 2, 3])` for homogeneous sequences, `nil()` for the empty sequence
/// - `Value::pair(first, rest)` for dotted pairs
#[derive(Clone)]
pub enum Value {
    /// Result of forms evaluated for effect (`define`, `set!`, `display`)
    Unassigned,
    Integer(IntegerType),
    Real(f64),
    Boolean(bool),
    String(String),
    /// Identifiers; only produced by the reader and by `quote`
    Symbol(String),
    /// Two-slot cell, possibly improper: `(first . rest)`
    Pair(Box<Value>, Box<Value>),
    /// Proper list of any length; the empty sequence is `()`
    Sequence(Vec<Value>),
    Procedure(Procedure),
}

/// A callable value.
///
/// Call sites never branch on the variant; [`crate::evaluator::apply`] does.
#[derive(Clone)]
pub enum Procedure {
    /// Native operation from the builtin registry
    Primitive(&'static BuiltinOp),
    /// Closure created by `lambda` or `define`
    Compound(Rc<Lambda>),
}

/// Parameters, body and captured environment of a compound procedure
pub struct Lambda {
    /// Set by the `(define (name ...) ...)` form, used in messages only
    pub name: Option<String>,
    pub params: Vec<String>,
    pub body: Vec<Value>,
    pub env: Environment,
}

impl Procedure {
    pub fn name(&self) -> Option<&str> {
        match self {
            Procedure::Primitive(op) => Some(op.name),
            Procedure::Compound(lambda) => lambda.name.as_deref(),
        }
    }
}

impl PartialEq for Procedure {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Procedure::Primitive(a), Procedure::Primitive(b)) => a.name == b.name,
            // Closures have identity: two lambdas with the same text are distinct procedures
            (Procedure::Compound(a), Procedure::Compound(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl std::fmt::Debug for Procedure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Procedure::Primitive(op) => write!(f, "Primitive({})", op.name),
            // The captured environment is left out: it may contain this very procedure
            Procedure::Compound(lambda) => write!(
                f,
                "Compound(name={:?}, params={:?}, body={:?})",
                lambda.name, lambda.params, lambda.body
            ),
        }
    }
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Unassigned => write!(f, "Unassigned"),
            Value::Integer(n) => write!(f, "Integer({n})"),
            Value::Real(r) => write!(f, "Real({r:?})"),
            Value::Boolean(b) => write!(f, "Boolean({b})"),
            Value::String(s) => write!(f, "String({s:?})"),
            Value::Symbol(s) => write!(f, "Symbol({s})"),
            Value::Pair(first, rest) => write!(f, "Pair({first:?}, {rest:?})"),
            Value::Sequence(list) => {
                write!(f, "Sequence(")?;
                for (i, v) in list.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v:?}")?;
                }
                write!(f, ")")
            }
            Value::Procedure(p) => write!(f, "{p:?}"),
        }
    }
}

// From trait implementations for Value - enables .into() conversion
impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<f64> for Value {
    fn from(r: f64) -> Self {
        Value::Real(r)
    }
}

impl From<Number> for Value {
    fn from(n: Number) -> Self {
        match n {
            Number::Integer(i) => Value::Integer(i),
            Number::Real(r) => Value::Real(r),
        }
    }
}

impl From<Procedure> for Value {
    fn from(p: Procedure) -> Self {
        Value::Procedure(p)
    }
}

macro_rules! impl_from_integer {
    ($int_type:ty) => {
        impl From<$int_type> for Value {
            fn from(n: $int_type) -> Self {
                Value::Integer(IntegerType::from(n))
            }
        }
    };
}

impl_from_integer!(i8);
impl_from_integer!(i16);
impl_from_integer!(i32);
impl_from_integer!(IntegerType);
impl_from_integer!(u8);
impl_from_integer!(u16);
impl_from_integer!(u32);

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::Sequence(v.into_iter().map(|x| x.into()).collect())
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for Value {
    fn from(arr: [T; N]) -> Self {
        Value::Sequence(arr.into_iter().map(|x| x.into()).collect())
    }
}

/// Helper function for creating symbols
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn sym<S: AsRef<str>>(name: S) -> Value {
    Value::Symbol(name.as_ref().to_owned())
}

/// Helper function for creating Values from anything convertible
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn val<T: Into<Value>>(value: T) -> Value {
    value.into()
}

/// Helper function for creating the empty sequence
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn nil() -> Value {
    Value::Sequence(vec![])
}

impl Value {
    pub fn pair(first: impl Into<Value>, rest: impl Into<Value>) -> Self {
        Value::Pair(Box::new(first.into()), Box::new(rest.into()))
    }

    /// Name of the variant, as used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Unassigned => "unassigned",
            Value::Integer(_) => "integer",
            Value::Real(_) => "real",
            Value::Boolean(_) => "boolean",
            Value::String(_) => "string",
            Value::Symbol(_) => "symbol",
            Value::Pair(..) => "pair",
            Value::Sequence(_) => "list",
            Value::Procedure(_) => "procedure",
        }
    }

    fn mismatch(&self, expected: &str) -> Error {
        Error::TypeMismatch(format!(
            "expected {expected}, got {} {self}",
            self.type_name()
        ))
    }

    pub fn as_integer(&self) -> Result<IntegerType, Error> {
        match self {
            Value::Integer(n) => Ok(*n),
            other => Err(other.mismatch("integer")),
        }
    }

    /// Reals as-is, integers widened
    pub fn as_real(&self) -> Result<f64, Error> {
        self.as_number().map(Number::to_f64)
    }

    pub fn as_number(&self) -> Result<Number, Error> {
        match self {
            Value::Integer(n) => Ok(Number::Integer(*n)),
            Value::Real(r) => Ok(Number::Real(*r)),
            other => Err(other.mismatch("number")),
        }
    }

    pub fn as_bool(&self) -> Result<bool, Error> {
        match self {
            Value::Boolean(b) => Ok(*b),
            other => Err(other.mismatch("boolean")),
        }
    }

    pub fn as_str(&self) -> Result<&str, Error> {
        match self {
            Value::String(s) => Ok(s),
            other => Err(other.mismatch("string")),
        }
    }

    pub fn as_symbol(&self) -> Result<&str, Error> {
        match self {
            Value::Symbol(s) => Ok(s),
            other => Err(other.mismatch("symbol")),
        }
    }

    pub fn as_procedure(&self) -> Result<&Procedure, Error> {
        match self {
            Value::Procedure(p) => Ok(p),
            other => Err(other.mismatch("procedure")),
        }
    }

    /// Only `#f` is false; every other value, `0` and `()` included, is true
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Boolean(false))
    }

    /// Check if a value is the empty sequence
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Sequence(list) if list.is_empty())
    }

    /// Structural equality; see the `PartialEq` implementation
    pub fn equals(&self, other: &Value) -> bool {
        self == other
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Unassigned, Value::Unassigned) => true,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Real(a), Value::Real(b)) => a == b,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::Pair(f1, r1), Value::Pair(f2, r2)) => f1 == f2 && r1 == r2,
            (Value::Sequence(a), Value::Sequence(b)) => a == b,
            (Value::Procedure(a), Value::Procedure(b)) => a == b,
            _ => false, // Different variants are never equal
        }
    }
}

/// Numeric view of a value, used by arithmetic and comparison
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Integer(IntegerType),
    Real(f64),
}

impl Number {
    pub fn to_f64(self) -> f64 {
        match self {
            Number::Integer(n) => n as f64,
            Number::Real(r) => r,
        }
    }

    pub fn is_zero(self) -> bool {
        match self {
            Number::Integer(n) => n == 0,
            Number::Real(r) => r == 0.0,
        }
    }

    /// Combine two numbers: checked integer arithmetic when both are integers,
    /// f64 arithmetic as soon as either one is real.
    pub(crate) fn combine(
        self,
        other: Number,
        op_name: &str,
        int_op: fn(IntegerType, IntegerType) -> Option<IntegerType>,
        real_op: fn(f64, f64) -> f64,
    ) -> Result<Number, Error> {
        match (self, other) {
            (Number::Integer(a), Number::Integer(b)) => int_op(a, b)
                .map(Number::Integer)
                .ok_or_else(|| Error::Overflow(op_name.to_owned())),
            (a, b) => Ok(Number::Real(real_op(a.to_f64(), b.to_f64()))),
        }
    }

    pub fn checked_add(self, other: Number) -> Result<Number, Error> {
        self.combine(other, "+", IntegerType::checked_add, |a, b| a + b)
    }

    pub fn checked_sub(self, other: Number) -> Result<Number, Error> {
        self.combine(other, "-", IntegerType::checked_sub, |a, b| a - b)
    }

    pub fn checked_mul(self, other: Number) -> Result<Number, Error> {
        self.combine(other, "*", IntegerType::checked_mul, |a, b| a * b)
    }

    pub fn checked_neg(self) -> Result<Number, Error> {
        match self {
            Number::Integer(n) => n
                .checked_neg()
                .map(Number::Integer)
                .ok_or_else(|| Error::Overflow("-".to_owned())),
            Number::Real(r) => Ok(Number::Real(-r)),
        }
    }

    /// Integers compare exactly; any real operand moves both into f64.
    /// `None` when a NaN is involved.
    pub fn compare(self, other: Number) -> Option<Ordering> {
        match (self, other) {
            (Number::Integer(a), Number::Integer(b)) => Some(a.cmp(&b)),
            (a, b) => a.to_f64().partial_cmp(&b.to_f64()),
        }
    }
}

/// Chained numeric comparison: true when `accept` holds for every adjacent pair.
///
/// Every operand must be numeric, even past the first failing pair, so
/// `(< 2 1 "x")` is a type error rather than `#f`.
pub fn compare_chain(values: &[Value], accept: fn(Ordering) -> bool) -> Result<bool, Error> {
    let numbers = values
        .iter()
        .map(Value::as_number)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(numbers
        .windows(2)
        .all(|pair| pair[0].compare(pair[1]).is_some_and(accept)))
}

fn write_real(f: &mut std::fmt::Formatter<'_>, r: f64) -> std::fmt::Result {
    if r.is_nan() {
        write!(f, "+nan.0")
    } else if r.is_infinite() {
        write!(f, "{}inf.0", if r > 0.0 { "+" } else { "-" })
    } else if r.fract() == 0.0 {
        // Keep a fractional part or exponent so the rendering reads back as a real
        if r.abs() < 1e16 {
            write!(f, "{r:.1}")
        } else {
            write!(f, "{r:e}")
        }
    } else {
        write!(f, "{r}")
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Unassigned => write!(f, "#<unassigned>"),
            Value::Integer(n) => write!(f, "{n}"),
            Value::Real(r) => write_real(f, *r),
            Value::Boolean(b) => write!(f, "{}", if *b { "#t" } else { "#f" }),
            Value::String(s) => {
                write!(f, "\"")?;
                for ch in s.chars() {
                    match ch {
                        '"' => write!(f, "\\\"")?,
                        '\\' => write!(f, "\\\\")?,
                        '\n' => write!(f, "\\n")?,
                        '\t' => write!(f, "\\t")?,
                        '\r' => write!(f, "\\r")?,
                        c => write!(f, "{c}")?,
                    }
                }
                write!(f, "\"")
            }
            Value::Symbol(s) => write!(f, "{s}"),
            Value::Pair(first, rest) => write!(f, "({first} . {rest})"),
            Value::Sequence(elements) => {
                write!(f, "(")?;
                for (i, elem) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{elem}")?;
                }
                write!(f, ")")
            }
            Value::Procedure(Procedure::Primitive(op)) => write!(f, "#<primitive:{}>", op.name),
            Value::Procedure(Procedure::Compound(lambda)) => match &lambda.name {
                Some(name) => write!(f, "#<procedure:{name}>"),
                None => write!(f, "#<procedure>"),
            },
        }
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;

    #[test]
    fn test_helper_functions_data_driven() {
        let test_cases = vec![
            (val(42), Value::Integer(42)),
            (val(-17), Value::Integer(-17)),
            (val(255u8), Value::Integer(255)),
            (val(IntegerType::MAX), Value::Integer(IntegerType::MAX)),
            (val(2.5), Value::Real(2.5)),
            (val(true), Value::Boolean(true)),
            (val("hello"), Value::String("hello".to_owned())),
            (sym("foo-bar?"), Value::Symbol("foo-bar?".to_owned())),
            (nil(), Value::Sequence(vec![])),
            (
                val([1, 2, 3]),
                Value::Sequence(vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)]),
            ),
            (
                val(vec![sym("op"), val(1.5), val("s")]),
                Value::Sequence(vec![
                    Value::Symbol("op".to_owned()),
                    Value::Real(1.5),
                    Value::String("s".to_owned()),
                ]),
            ),
            (
                Value::pair(1, 2),
                Value::Pair(Box::new(Value::Integer(1)), Box::new(Value::Integer(2))),
            ),
        ];

        for (i, (actual, expected)) in test_cases.iter().enumerate() {
            assert_eq!(actual, expected, "Test case {} failed", i + 1);
        }
    }

    #[test]
    fn test_structural_equality() {
        // Independently built pairs compare equal
        assert!(Value::pair(1, 2).equals(&Value::pair(1, 2)));
        assert!(!Value::pair(1, 2).equals(&Value::pair(1, 3)));

        // Sequence vs pair with equal leaves is never equal
        let seq = val([1, 2, 3]);
        let pairs = Value::pair(1, Value::pair(2, 3));
        assert!(!seq.equals(&pairs));
        assert!(!val([1, 2]).equals(&Value::pair(1, 2)));

        // Nested structures compare element-wise
        let a = val(vec![val(1), Value::pair("x", nil()), val([2.5])]);
        let b = val(vec![val(1), Value::pair("x", nil()), val([2.5])]);
        assert_eq!(a, b);

        // Atoms compare by value but never across numeric variants
        assert_ne!(val(1), val(1.0));
        assert_ne!(val("a"), sym("a"));
        assert_eq!(Value::Unassigned, Value::Unassigned);
    }

    #[test]
    fn test_typed_accessors() {
        assert_eq!(val(7).as_integer().unwrap(), 7);
        assert_eq!(val(7).as_real().unwrap(), 7.0);
        assert_eq!(val(0.5).as_number().unwrap(), Number::Real(0.5));
        assert!(val(true).as_bool().unwrap());
        assert_eq!(val("s").as_str().unwrap(), "s");
        assert_eq!(sym("x").as_symbol().unwrap(), "x");

        let err = val("seven").as_integer().unwrap_err();
        assert!(matches!(err, Error::TypeMismatch(_)));
        assert!(err.to_string().contains("expected integer, got string"));
        assert!(matches!(val(1.5).as_integer(), Err(Error::TypeMismatch(_))));
        assert!(matches!(val(1).as_procedure(), Err(Error::TypeMismatch(_))));
        assert!(matches!(nil().as_number(), Err(Error::TypeMismatch(_))));
    }

    #[test]
    fn test_truthiness() {
        assert!(!val(false).is_truthy());
        for value in [val(true), val(0), val(0.0), val(""), nil(), Value::Unassigned] {
            assert!(value.is_truthy(), "{value:?} should be truthy");
        }
    }

    #[test]
    fn test_number_promotion_and_overflow() {
        let two = Number::Integer(2);
        let half = Number::Real(0.5);
        assert_eq!(two.checked_add(two).unwrap(), Number::Integer(4));
        assert_eq!(two.checked_add(half).unwrap(), Number::Real(2.5));
        assert_eq!(half.checked_mul(two).unwrap(), Number::Real(1.0));
        assert_eq!(two.checked_sub(half).unwrap(), Number::Real(1.5));

        let max = Number::Integer(IntegerType::MAX);
        assert_eq!(
            max.checked_add(Number::Integer(1)),
            Err(Error::Overflow("+".into()))
        );
        assert_eq!(
            Number::Integer(IntegerType::MIN).checked_neg(),
            Err(Error::Overflow("-".into()))
        );
        // Real arithmetic never overflows into an error
        assert!(max.checked_add(half).is_ok());
    }

    #[test]
    fn test_compare_chain() {
        let lt = |o: Ordering| o == Ordering::Less;
        let gt = |o: Ordering| o == Ordering::Greater;

        assert!(compare_chain(&[val(1), val(2), val(3), val(4)], lt).unwrap());
        assert!(!compare_chain(&[val(1), val(3), val(2), val(4)], lt).unwrap());
        assert!(compare_chain(&[val(4), val(3), val(2), val(1)], gt).unwrap());
        // Mixed integer and real operands share one numeric domain
        assert!(compare_chain(&[val(1), val(1.5), val(2)], lt).unwrap());
        assert!(!compare_chain(&[val(1), val(f64::NAN)], lt).unwrap());

        // Non-numeric operands are rejected even after a false pair
        assert!(matches!(
            compare_chain(&[val(2), val(1), val("x")], lt),
            Err(Error::TypeMismatch(_))
        ));
    }

    #[test]
    fn test_display() {
        let cases = vec![
            (val(42), "42"),
            (val(-3), "-3"),
            (val(2.5), "2.5"),
            (val(2.0), "2.0"),
            (val(-0.25), "-0.25"),
            (val(f64::INFINITY), "+inf.0"),
            (val(true), "#t"),
            (val(false), "#f"),
            (val("say \"hi\"\n"), "\"say \\\"hi\\\"\\n\""),
            (sym("lambda"), "lambda"),
            (nil(), "()"),
            (val([1, 2, 3]), "(1 2 3)"),
            (Value::pair(1, 2), "(1 . 2)"),
            (Value::pair(1, Value::pair(2, 3)), "(1 . (2 . 3))"),
            (val(vec![val(1), Value::pair("a", 2.5)]), "(1 (\"a\" . 2.5))"),
            (Value::Unassigned, "#<unassigned>"),
        ];

        for (value, expected) in cases {
            assert_eq!(value.to_string(), expected);
        }
    }

    #[test]
    fn test_debug_escapes_strings() {
        let cases = vec![
            (val("plain"), r#"String("plain")"#),
            (val("say \"hi\""), r#"String("say \"hi\"")"#),
            (val("a\nb"), r#"String("a\nb")"#),
            (val(vec![val("x\"")]), r#"Sequence(String("x\""))"#),
        ];

        for (value, expected) in cases {
            assert_eq!(format!("{value:?}"), expected);
        }
    }

    #[test]
    fn test_symbol_validity() {
        for name in ["x", "set!", "null?", "<=", "+", "-", "...", "a.b", "->x"] {
            assert!(is_valid_symbol(name), "{name} should be a valid symbol");
        }
        for name in ["", ".", "1x", "-1", "+2", ".5", "a(b", "a\"b"] {
            assert!(!is_valid_symbol(name), "{name} should not be a valid symbol");
        }
    }
}
