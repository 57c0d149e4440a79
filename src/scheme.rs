use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{tag, tag_no_case, take_till, take_while1},
    character::complete::{char, digit0, digit1, hex_digit1, multispace0, one_of},
    combinator::{eof, map, opt, recognize, value, verify},
    error::ErrorKind,
    sequence::{pair, preceded, terminated},
};

use crate::Error;
use crate::MAX_PARSE_DEPTH;
use crate::ast::{IntegerType, SYMBOL_SPECIAL_CHARS, Value, is_valid_symbol};

/// Configuration for the reader
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParseConfig {
    /// Treat `;` up to the end of the line as a comment
    pub handle_comments: bool,
}

impl Default for ParseConfig {
    fn default() -> Self {
        ParseConfig {
            handle_comments: true,
        }
    }
}

/// Characters that end an atom
fn is_delimiter(c: char) -> bool {
    c.is_whitespace() || matches!(c, '(' | ')' | '"' | ';' | '\'')
}

fn parse_failure(input: &str, kind: ErrorKind) -> nom::Err<nom::error::Error<&str>> {
    nom::Err::Error(nom::error::Error::new(input, kind))
}

/// Convert nom parsing errors to user-friendly messages
fn parse_error_to_message(input: &str, error: nom::Err<nom::error::Error<&str>>) -> String {
    match error {
        nom::Err::Error(e) | nom::Err::Failure(e) => {
            let position = input.len().saturating_sub(e.input.len());
            let near: String = e.input.chars().take(10).collect();
            match e.code {
                ErrorKind::TooLarge => {
                    format!("Expression too deeply nested (max depth: {MAX_PARSE_DEPTH})")
                }
                ErrorKind::Eof => "Unexpected end of input".into(),
                ErrorKind::Digit => format!("Integer literal out of range at position {position}"),
                ErrorKind::Verify => format!("Invalid token at position {position}: '{near}'"),
                ErrorKind::Char if e.input.starts_with(')') => {
                    format!("Unexpected ')' at position {position}")
                }
                ErrorKind::Char => format!("Expected character at position {position}"),
                ErrorKind::Escaped => format!("Invalid escape sequence at position {position}"),
                _ if position < input.len() => format!("Invalid syntax near '{near}'"),
                _ => "Unexpected end of input".into(),
            }
        }
        nom::Err::Incomplete(_) => "Incomplete input".into(),
    }
}

/// Skip whitespace and, when enabled, line comments
fn skip_atmosphere(mut input: &str, config: ParseConfig) -> IResult<&str, ()> {
    loop {
        let (rest, _) = multispace0.parse(input)?;
        input = rest;
        if config.handle_comments && input.starts_with(';') {
            let (rest, _) = take_till(|c: char| c == '\n').parse(input)?;
            input = rest;
        } else {
            return Ok((input, ()));
        }
    }
}

/// Classify an atom token: boolean, number or symbol.
/// The token runs up to the next delimiter and must match one alternative in full.
fn parse_atom(input: &str) -> IResult<&str, Value> {
    let (remaining, token) = take_while1(|c: char| !is_delimiter(c)).parse(input)?;

    let mut atom = alt((
        parse_boolean,
        parse_hexadecimal,
        parse_decimal,
        parse_real,
        parse_symbol,
    ));
    match atom.parse(token) {
        Ok((_, parsed)) => Ok((remaining, parsed)),
        Err(nom::Err::Failure(e)) if e.code == ErrorKind::Digit => {
            Err(parse_failure(input, ErrorKind::Digit))
        }
        Err(_) => Err(parse_failure(input, ErrorKind::Verify)),
    }
}

/// An integer literal that does not fit stops the alternatives
fn out_of_range(input: &str) -> nom::Err<nom::error::Error<&str>> {
    nom::Err::Failure(nom::error::Error::new(input, ErrorKind::Digit))
}

/// `#t`, `#true`, `#f` or `#false`
fn parse_boolean(input: &str) -> IResult<&str, Value> {
    terminated(
        alt((
            value(Value::Boolean(true), alt((tag("#true"), tag("#t")))),
            value(Value::Boolean(false), alt((tag("#false"), tag("#f")))),
        )),
        eof,
    )
    .parse(input)
}

/// Optionally signed hex digits after a `#x` or `#X` prefix
fn hexadecimal_literal(input: &str) -> IResult<&str, &str> {
    terminated(
        preceded(
            tag_no_case("#x"),
            recognize(pair(opt(one_of("+-")), hex_digit1)),
        ),
        eof,
    )
    .parse(input)
}

fn parse_hexadecimal(input: &str) -> IResult<&str, Value> {
    let (rest, digits) = hexadecimal_literal(input)?;
    let n = IntegerType::from_str_radix(digits, 16).map_err(|_| out_of_range(input))?;
    Ok((rest, Value::Integer(n)))
}

/// Optionally signed decimal digits
fn decimal_literal(input: &str) -> IResult<&str, &str> {
    terminated(recognize(pair(opt(one_of("+-")), digit1)), eof).parse(input)
}

fn parse_decimal(input: &str) -> IResult<&str, Value> {
    let (rest, digits) = decimal_literal(input)?;
    let n = digits
        .parse::<IntegerType>()
        .map_err(|_| out_of_range(input))?;
    Ok((rest, Value::Integer(n)))
}

fn exponent(input: &str) -> IResult<&str, &str> {
    recognize((one_of("eE"), opt(one_of("+-")), digit1)).parse(input)
}

/// Decimal reals: `1.5`, `-.5`, `2.`, `1e10`, `6.02e-23`
fn real_literal(input: &str) -> IResult<&str, &str> {
    let mantissa = alt((
        recognize((digit1, char('.'), digit0)),
        recognize(pair(char('.'), digit1)),
    ));
    terminated(
        recognize(pair(
            opt(one_of("+-")),
            alt((
                recognize(pair(mantissa, opt(exponent))),
                recognize(pair(digit1, exponent)),
            )),
        )),
        eof,
    )
    .parse(input)
}

fn parse_real(input: &str) -> IResult<&str, Value> {
    let (rest, literal) = real_literal(input)?;
    let r = literal
        .parse::<f64>()
        .map_err(|_| parse_failure(input, ErrorKind::Float))?;
    Ok((rest, Value::Real(r)))
}

/// Parse a symbol (identifier)
fn parse_symbol(input: &str) -> IResult<&str, Value> {
    let symbol_chars =
        take_while1(|c: char| c.is_alphanumeric() || SYMBOL_SPECIAL_CHARS.contains(c));

    map(
        terminated(verify(symbol_chars, |name: &str| is_valid_symbol(name)), eof),
        |name: &str| Value::Symbol(name.into()),
    )
    .parse(input)
}

/// Parse a string literal
fn parse_string(input: &str) -> IResult<&str, Value> {
    let (mut remaining, _) = char('"').parse(input)?;
    let mut chars = String::new();

    loop {
        let mut char_iter = remaining.chars();
        match char_iter.next() {
            Some('"') => {
                return Ok((char_iter.as_str(), Value::String(chars)));
            }
            Some('\\') => {
                match char_iter.next() {
                    Some('n') => chars.push('\n'),
                    Some('t') => chars.push('\t'),
                    Some('r') => chars.push('\r'),
                    Some('\\') => chars.push('\\'),
                    Some('"') => chars.push('"'),
                    Some(_) => return Err(parse_failure(remaining, ErrorKind::Escaped)),
                    None => return Err(parse_failure(remaining, ErrorKind::Eof)),
                }
                remaining = char_iter.as_str();
            }
            Some(ch) => {
                chars.push(ch);
                remaining = char_iter.as_str();
            }
            None => return Err(parse_failure(remaining, ErrorKind::Eof)),
        }
    }
}

/// True when the input starts with a lone `.` used as the dotted-pair marker
fn starts_with_dot_marker(input: &str) -> bool {
    let mut chars = input.chars();
    chars.next() == Some('.') && chars.next().is_none_or(is_delimiter)
}

/// Parse a list, proper or dotted. `(a b . c)` becomes nested pairs, and a dotted tail
/// that is itself a proper list folds back into one sequence.
fn parse_list(input: &str, config: ParseConfig, depth: usize) -> IResult<&str, Value> {
    let (mut input, _) = char('(').parse(input)?;
    let mut elements = Vec::new();

    loop {
        let (rest, _) = skip_atmosphere(input, config)?;
        input = rest;

        if let Some(rest) = input.strip_prefix(')') {
            return Ok((rest, Value::Sequence(elements)));
        }
        if input.is_empty() {
            return Err(parse_failure(input, ErrorKind::Eof));
        }

        if starts_with_dot_marker(input) {
            if elements.is_empty() {
                return Err(parse_failure(input, ErrorKind::Verify));
            }
            let (rest, tail) = parse_sexpr(&input[1..], config, depth + 1)?;
            let (rest, _) = skip_atmosphere(rest, config)?;
            let (rest, _) = char(')').parse(rest)?;
            return Ok((rest, build_dotted(elements, tail)));
        }

        let (rest, element) = parse_sexpr(input, config, depth + 1)?;
        elements.push(element);
        input = rest;
    }
}

fn build_dotted(mut elements: Vec<Value>, tail: Value) -> Value {
    match tail {
        Value::Sequence(rest) => {
            elements.extend(rest);
            Value::Sequence(elements)
        }
        tail => elements
            .into_iter()
            .rev()
            .fold(tail, |rest, first| Value::pair(first, rest)),
    }
}

/// Parse quoted expression ('expr -> (quote expr))
fn parse_quote(input: &str, config: ParseConfig, depth: usize) -> IResult<&str, Value> {
    let (input, _) = char('\'').parse(input)?;
    let (input, expr) = parse_sexpr(input, config, depth + 1)?;
    Ok((
        input,
        Value::Sequence(vec![Value::Symbol("quote".into()), expr]),
    ))
}

/// Parse one S-expression, skipping leading whitespace and comments
fn parse_sexpr(input: &str, config: ParseConfig, depth: usize) -> IResult<&str, Value> {
    if depth >= MAX_PARSE_DEPTH {
        return Err(parse_failure(input, ErrorKind::TooLarge));
    }
    let (input, _) = skip_atmosphere(input, config)?;

    match input.chars().next() {
        None => Err(parse_failure(input, ErrorKind::Eof)),
        Some('\'') => parse_quote(input, config, depth),
        Some('(') => parse_list(input, config, depth),
        Some(')') => Err(parse_failure(input, ErrorKind::Char)),
        Some('"') => parse_string(input),
        Some(_) => parse_atom(input),
    }
}

/// Parse a complete S-expression from input.
pub fn parse_scheme(input: &str) -> Result<Value, Error> {
    parse_scheme_with_config(input, ParseConfig::default())
}

/// Parse exactly one S-expression; anything but whitespace or comments after it is an error
pub fn parse_scheme_with_config(input: &str, config: ParseConfig) -> Result<Value, Error> {
    let parsed = parse_sexpr(input, config, 0)
        .and_then(|(rest, value)| skip_atmosphere(rest, config).map(|(rest, _)| (rest, value)));

    match parsed {
        Ok(("", value)) => Ok(value),
        Ok((remaining, _)) => Err(Error::Parse(format!(
            "Unexpected remaining input: '{remaining}'"
        ))),
        Err(e) => Err(Error::Parse(parse_error_to_message(input, e))),
    }
}

/// Lazily parse the top-level forms of a program.
///
/// Each form is read only when requested, so a syntax error late in a file does not
/// stop the forms before it from being evaluated. After the first error the iterator
/// is exhausted.
pub fn parse_program(input: &str) -> Program<'_> {
    parse_program_with_config(input, ParseConfig::default())
}

pub fn parse_program_with_config(input: &str, config: ParseConfig) -> Program<'_> {
    Program {
        source: input,
        remaining: input,
        config,
        failed: false,
    }
}

/// Iterator over the top-level forms of a program, see [`parse_program`]
#[derive(Debug, Clone)]
pub struct Program<'a> {
    source: &'a str,
    remaining: &'a str,
    config: ParseConfig,
    failed: bool,
}

impl Iterator for Program<'_> {
    type Item = Result<Value, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        let parsed = skip_atmosphere(self.remaining, self.config).and_then(|(rest, _)| {
            if rest.is_empty() {
                Ok((rest, None))
            } else {
                parse_sexpr(rest, self.config, 0).map(|(rest, value)| (rest, Some(value)))
            }
        });

        match parsed {
            Ok((rest, value)) => {
                self.remaining = rest;
                value.map(Ok)
            }
            Err(e) => {
                self.failed = true;
                Some(Err(Error::Parse(parse_error_to_message(self.source, e))))
            }
        }
    }
}

/// Whether `input` ends inside an open list or string, so an interactive reader should
/// keep collecting lines before parsing
pub fn needs_more_input(input: &str, config: ParseConfig) -> bool {
    let mut open_parens = 0_usize;
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        match c {
            '(' => open_parens += 1,
            ')' => open_parens = open_parens.saturating_sub(1),
            ';' if config.handle_comments => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        break;
                    }
                }
            }
            '"' => loop {
                match chars.next() {
                    Some('"') => break,
                    Some('\\') => {
                        chars.next();
                    }
                    Some(_) => {}
                    None => return true,
                }
            },
            _ => {}
        }
    }

    open_parens > 0
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::{nil, sym, val};

    /// Test result variants for comprehensive parsing tests
    #[derive(Debug)]
    enum ParseTestResult {
        Success(Value),              // Parsing should succeed with this value
        SpecificError(&'static str), // Parsing should fail with error containing this string
        Error,                       // Parsing should fail (any error)
    }
    use ParseTestResult::*;

    /// Helper for successful parse test cases
    fn success<T: Into<Value>>(value: T) -> ParseTestResult {
        Success(value.into())
    }

    /// Run comprehensive parse tests with round-trip validation
    fn run_parse_tests(test_cases: Vec<(&str, ParseTestResult)>) {
        for (i, (input, expected)) in test_cases.iter().enumerate() {
            let test_id = format!("Parse test #{} '{input}'", i + 1);
            let result = parse_scheme(input);

            match (result, expected) {
                (Ok(actual), Success(expected_val)) => {
                    assert_eq!(actual, *expected_val, "{test_id}: value mismatch");

                    // display -> parse must give back the same datum
                    let displayed = format!("{actual}");
                    let reparsed = parse_scheme(&displayed).unwrap_or_else(|e| {
                        panic!("{test_id}: round-trip parse failed for '{displayed}': {e:?}")
                    });
                    assert_eq!(reparsed, actual, "{test_id}: round-trip mismatch");
                }
                (Err(_), Error) => {}
                (Err(e), SpecificError(text)) => {
                    let msg = format!("{e}");
                    assert!(
                        msg.contains(text),
                        "{test_id}: error should contain '{text}', got: {msg}"
                    );
                }
                (Ok(actual), Error | SpecificError(_)) => {
                    panic!("{test_id}: expected error, got {actual:?}")
                }
                (Err(e), Success(expected_val)) => {
                    panic!("{test_id}: expected {expected_val:?}, got error {e:?}")
                }
            }
        }
    }

    #[test]
    #[expect(clippy::too_many_lines)] // Comprehensive test coverage is intentionally thorough
    fn test_parser_comprehensive() {
        run_parse_tests(vec![
            // Integers
            ("42", success(42)),
            ("-17", success(-17)),
            ("+5", success(5)),
            ("0", success(0)),
            ("9223372036854775807", success(i64::MAX)),
            ("-9223372036854775808", success(i64::MIN)),
            ("#x1F", success(31)),
            ("#XfF", success(255)),
            ("9223372036854775808", SpecificError("out of range")),
            ("-9223372036854775809", SpecificError("out of range")),
            ("#x-1F", success(-31)),
            ("#x7FFFFFFFFFFFFFFF", success(i64::MAX)),
            ("#x8000000000000000", SpecificError("out of range")),
            ("#x", SpecificError("Invalid token")),
            ("#x1G", SpecificError("Invalid token")),
            // Reals
            ("2.5", success(2.5)),
            ("-0.25", success(-0.25)),
            ("2.", success(2.0)),
            (".5", success(0.5)),
            ("-.5", success(-0.5)),
            ("1e3", success(1000.0)),
            ("6.02e-23", success(6.02e-23)),
            ("1.5E2", success(150.0)),
            ("+.5e1", success(5.0)),
            ("2.e-1", success(0.2)),
            ("99999999999999999999.5", success(99_999_999_999_999_999_999.5)),
            ("1.e", SpecificError("Invalid token")),
            ("1.2.3", SpecificError("Invalid token")),
            ("e5", Success(sym("e5"))),
            // Booleans
            ("#t", success(true)),
            ("#f", success(false)),
            ("#true", success(true)),
            ("#false", success(false)),
            ("#tx", SpecificError("Invalid token")),
            ("#", SpecificError("Invalid token")),
            // Strings
            ("\"hello\"", success("hello")),
            ("\"\"", success("")),
            ("\"a\\nb\\t\\\"c\\\"\\\\\"", success("a\nb\t\"c\"\\")),
            ("\"unterminated", SpecificError("Unexpected end of input")),
            ("\"bad \\q escape\"", SpecificError("Invalid escape")),
            // Symbols
            ("foo", Success(sym("foo"))),
            ("set!", Success(sym("set!"))),
            ("<=", Success(sym("<="))),
            ("+", Success(sym("+"))),
            ("-", Success(sym("-"))),
            ("...", Success(sym("..."))),
            ("null?", Success(sym("null?"))),
            ("1abc", SpecificError("Invalid token")),
            ("a@b", Error),
            // Lists
            ("()", Success(nil())),
            ("(1 2 3)", success([1, 2, 3])),
            ("( 1   2\n3 )", success([1, 2, 3])),
            (
                "(+ 1 (* 2 3))",
                success(vec![sym("+"), val(1), val(vec![sym("*"), val(2), val(3)])]),
            ),
            ("(a\"b\")", Success(val(vec![sym("a"), val("b")]))),
            (
                "(1 2.5 \"s\" #t)",
                Success(val(vec![val(1), val(2.5), val("s"), val(true)])),
            ),
            // Dotted lists
            ("(1 . 2)", Success(Value::pair(1, 2))),
            ("(1 2 . 3)", Success(Value::pair(1, Value::pair(2, 3)))),
            ("(1 . (2 . 3))", Success(Value::pair(1, Value::pair(2, 3)))),
            ("(1 . (2 3))", success([1, 2, 3])),
            ("(1 . ())", success([1])),
            ("(. 2)", Error),
            ("(1 . 2 3)", Error),
            ("(1 .)", Error),
            ("(1 .5)", success(vec![val(1), val(0.5)])),
            // Quote shorthand
            ("'x", Success(val(vec![sym("quote"), sym("x")]))),
            ("'(1 2)", Success(val(vec![sym("quote"), val([1, 2])]))),
            (
                "''x",
                Success(val(vec![sym("quote"), val(vec![sym("quote"), sym("x")])])),
            ),
            // Comments and whitespace
            ("  42  ", success(42)),
            ("42 ; the answer", success(42)),
            ("(1 ; one\n 2)", success([1, 2])),
            // Structural errors
            ("", SpecificError("Unexpected end of input")),
            ("(1 2", SpecificError("Unexpected end of input")),
            (")", SpecificError("Unexpected ')'")),
            ("1 2", SpecificError("Unexpected remaining input")),
            ("(1))", SpecificError("Unexpected remaining input")),
        ]);
    }

    #[test]
    fn test_parse_depth_limit() {
        let nested = |n: usize| format!("{}{}", "(".repeat(n), ")".repeat(n));

        let deep_ok = nested(MAX_PARSE_DEPTH - 1);
        assert!(parse_scheme(&deep_ok).is_ok());

        let too_deep = nested(MAX_PARSE_DEPTH + 1);
        let err = parse_scheme(&too_deep).unwrap_err();
        assert!(err.to_string().contains("too deeply nested"));
    }

    #[test]
    fn test_comments_can_be_disabled() {
        let config = ParseConfig {
            handle_comments: false,
        };
        assert!(parse_scheme_with_config("42 ; comment", config).is_err());
        assert_eq!(
            parse_scheme_with_config("42 ; comment", ParseConfig::default()).unwrap(),
            val(42)
        );
    }

    #[test]
    fn test_parse_program_is_lazy() {
        let source = "(define a 1)\n; comment\n(define b 2)\n(oops";
        let mut program = parse_program(source);

        assert_eq!(
            program.next().unwrap().unwrap(),
            val(vec![sym("define"), sym("a"), val(1)])
        );
        assert_eq!(
            program.next().unwrap().unwrap(),
            val(vec![sym("define"), sym("b"), val(2)])
        );
        assert!(matches!(program.next(), Some(Err(crate::Error::Parse(_)))));
        assert!(program.next().is_none());
    }

    #[test]
    fn test_parse_program_empty_and_trailing_comment() {
        assert_eq!(parse_program("").count(), 0);
        assert_eq!(parse_program("  ; nothing here\n").count(), 0);
        let forms: Vec<_> = parse_program("1 2.5 \"x\" ; end").collect();
        assert_eq!(forms, vec![Ok(val(1)), Ok(val(2.5)), Ok(val("x"))]);
    }

    #[test]
    fn test_needs_more_input() {
        let config = ParseConfig::default();
        assert!(needs_more_input("(define (f x)", config));
        assert!(needs_more_input("(display \"unclosed", config));
        assert!(needs_more_input("(a ; )\n", config));
        assert!(!needs_more_input("(define x 1)", config));
        assert!(!needs_more_input("\"(\"", config));
        assert!(!needs_more_input("42", config));
        assert!(!needs_more_input("())", config));
    }
}
