//! Cell input parser, built from `nom` combinators.
//!
//! Grammar, loosest binding first:
//!
//! ```text
//! statement  := IDENT "=" expr | IDENT "(" params ")" "=" expr | expr
//! expr       := additive (cmp additive)*
//! additive   := term (("+" | "-") term)*
//! term       := factor (("*" | "/" | "%") factor)*
//! factor     := unary <implicit product after a numeric literal>?
//! unary      := "-" unary | "+" unary | power
//! power      := postfix ("^" unary)?
//! postfix    := primary "!"*
//! primary    := NUMBER | STRING | IDENT | IDENT "(" args ")" | "(" expr ")" | "[" items "]"
//! ```
//!
//! Every nesting level passes through `unary`, which bounds the depth of the
//! tree at [`MAX_NESTING_DEPTH`].

use std::cell::Cell;

use nom::branch::alt;
use nom::bytes::complete::{tag, take_while};
use nom::character::complete::{digit0, digit1, one_of, satisfy};
use nom::combinator::{cut, map, not, opt, recognize};
use nom::error::{ErrorKind, ParseError};
use nom::multi::{fold_many0, separated_list0};
use nom::sequence::{pair, terminated, tuple};
use nom::IResult;

use super::ast::{BinaryOp, Expr, UnaryOp};
use crate::error::{MathError, Result};

/// Deepest nesting of brackets, calls, signs and exponents in one cell.
pub const MAX_NESTING_DEPTH: usize = 64;

/// Where parsing stopped, with a message once the failure is known.
#[derive(Debug)]
struct SyntaxError<'a> {
    input: &'a str,
    message: Option<String>,
}

impl<'a> ParseError<&'a str> for SyntaxError<'a> {
    fn from_error_kind(input: &'a str, _kind: ErrorKind) -> Self {
        SyntaxError {
            input,
            message: None,
        }
    }

    fn append(_input: &'a str, _kind: ErrorKind, other: Self) -> Self {
        other
    }
}

impl SyntaxError<'_> {
    fn into_math_error(self, source: &str) -> MathError {
        let rest = self.input.trim_start();
        let message = self
            .message
            .unwrap_or_else(|| format!("Value expected, found {}", describe(rest)));
        MathError::parse(position(source, rest), message)
    }
}

type PResult<'a, T> = IResult<&'a str, T, SyntaxError<'a>>;

/// Parses one cell of input into an expression tree.
pub fn parse(input: &str) -> Result<Expr> {
    let parser = Parser {
        depth: Cell::new(0),
    };
    match parser.statement(input) {
        Ok((rest, expr)) => {
            let rest = rest.trim_start();
            if rest.is_empty() {
                Ok(expr)
            } else {
                Err(MathError::parse(
                    position(input, rest),
                    format!("Unexpected {}", describe(rest)),
                ))
            }
        }
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(e.into_math_error(input)),
        Err(nom::Err::Incomplete(_)) => Err(MathError::parse(
            position(input, ""),
            "Unexpected end of expression",
        )),
    }
}

/// 1-based character position of `rest` inside `source`.
fn position(source: &str, rest: &str) -> usize {
    let offset = source.len().saturating_sub(rest.len());
    source.get(..offset).map_or(0, |head| head.chars().count()) + 1
}

fn describe(rest: &str) -> String {
    let rest = rest.trim_start();
    let Some(c) = rest.chars().next() else {
        return "end of expression".to_string();
    };
    if let Ok((_, name)) = identifier(rest) {
        return format!("symbol {}", name);
    }
    if let Ok((_, Expr::Number(n))) = number(rest) {
        return format!("number {}", n);
    }
    if rest.starts_with('=') && !rest.starts_with("==") {
        return "operator = (assignment is only allowed at the start of a cell)".to_string();
    }
    format!("\"{}\"", c)
}

fn fail<'a, T>(input: &'a str, message: impl Into<String>) -> PResult<'a, T> {
    Err(nom::Err::Failure(SyntaxError {
        input,
        message: Some(message.into()),
    }))
}

/// `token` after optional whitespace.
fn ws<'a>(token: &'static str) -> impl FnMut(&'a str) -> PResult<'a, &'a str> {
    move |input: &'a str| tag(token)(input.trim_start())
}

/// A closing token that must be there once its opener was consumed.
fn expect<'a>(input: &'a str, token: &'static str) -> PResult<'a, &'a str> {
    ws(token)(input).or_else(|_| {
        fail(
            input.trim_start(),
            format!("\"{}\" expected, found {}", token, describe(input)),
        )
    })
}

fn identifier(input: &str) -> PResult<'_, &str> {
    recognize(pair(
        satisfy(|c| c.is_alphabetic() || c == '_'),
        take_while(|c: char| c.is_alphanumeric() || c == '_'),
    ))(input.trim_start())
}

// 12, 2.5, 2., .5 and 1e-3. The exponent needs digits, so `2e` stays `2 * e`.
fn number(input: &str) -> PResult<'_, Expr> {
    let input = input.trim_start();
    let parsed: PResult<'_, &str> = recognize(pair(
        alt((
            recognize(pair(digit1, opt(pair(tag("."), digit0)))),
            recognize(pair(tag("."), digit1)),
        )),
        opt(tuple((one_of("eE"), opt(one_of("+-")), digit1))),
    ))(input);
    let (rest, text) = parsed?;
    match text.parse::<f64>() {
        Ok(value) => Ok((rest, Expr::Number(value))),
        Err(_) => fail(input, format!("Invalid number \"{}\"", text)),
    }
}

fn string_literal(input: &str) -> PResult<'_, Expr> {
    let start = input.trim_start();
    let (body, _) = ws("\"")(start)?;
    let mut text = String::new();
    let mut chars = body.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '"' => return Ok((&body[i + 1..], Expr::Text(text))),
            '\\' => match chars.next() {
                Some((_, 'n')) => text.push('\n'),
                Some((_, 't')) => text.push('\t'),
                Some((_, other)) => text.push(other),
                None => break,
            },
            c => text.push(c),
        }
    }
    fail(start, "End of string \" missing")
}

fn assign_op(input: &str) -> PResult<'_, &str> {
    terminated(ws("="), not(tag("=")))(input)
}

/// `name(p, q) =`, without the body.
fn function_header(input: &str) -> PResult<'_, (&str, Vec<&str>)> {
    let (input, name) = identifier(input)?;
    let (input, _) = ws("(")(input)?;
    let (input, params) = separated_list0(ws(","), identifier)(input)?;
    let (input, _) = ws(")")(input)?;
    let (input, _) = assign_op(input)?;
    Ok((input, (name, params)))
}

fn comparison_op(input: &str) -> PResult<'_, BinaryOp> {
    alt((
        map(ws("=="), |_| BinaryOp::Eq),
        map(ws("!="), |_| BinaryOp::NotEq),
        map(ws("<="), |_| BinaryOp::Le),
        map(ws(">="), |_| BinaryOp::Ge),
        map(ws("<"), |_| BinaryOp::Lt),
        map(ws(">"), |_| BinaryOp::Gt),
    ))(input)
}

fn additive_op(input: &str) -> PResult<'_, BinaryOp> {
    alt((map(ws("+"), |_| BinaryOp::Add), map(ws("-"), |_| BinaryOp::Sub)))(input)
}

fn multiplicative_op(input: &str) -> PResult<'_, BinaryOp> {
    alt((
        map(ws("*"), |_| BinaryOp::Mul),
        map(ws("/"), |_| BinaryOp::Div),
        map(ws("%"), |_| BinaryOp::Mod),
    ))(input)
}

// `!` but not the first half of `!=`.
fn factorial_bang(input: &str) -> PResult<'_, &str> {
    terminated(ws("!"), not(tag("=")))(input)
}

fn is_numeric_literal(expr: &Expr) -> bool {
    match expr {
        Expr::Number(_) => true,
        Expr::Unary {
            op: UnaryOp::Neg,
            operand,
        } => matches!(operand.as_ref(), Expr::Number(_)),
        _ => false,
    }
}

struct Parser {
    depth: Cell<usize>,
}

impl Parser {
    fn statement<'a>(&self, input: &'a str) -> PResult<'a, Expr> {
        if let Ok((rest, (name, params))) = function_header(input) {
            let (rest, body) = cut(|i: &'a str| self.expression(i))(rest)?;
            return Ok((
                rest,
                Expr::FunctionAssign {
                    name: name.to_string(),
                    params: params.into_iter().map(str::to_string).collect(),
                    body: Box::new(body),
                },
            ));
        }

        if let Ok((rest, name)) = terminated(identifier, assign_op)(input) {
            let (rest, value) = cut(|i: &'a str| self.expression(i))(rest)?;
            return Ok((
                rest,
                Expr::Assign {
                    name: name.to_string(),
                    value: Box::new(value),
                },
            ));
        }

        self.expression(input)
    }

    fn expression<'a>(&self, input: &'a str) -> PResult<'a, Expr> {
        let (input, first) = self.additive(input)?;
        fold_many0(
            pair(comparison_op, cut(|i: &'a str| self.additive(i))),
            move || first.clone(),
            |left, (op, right)| Expr::binary(op, left, right),
        )(input)
    }

    fn additive<'a>(&self, input: &'a str) -> PResult<'a, Expr> {
        let (input, first) = self.term(input)?;
        fold_many0(
            pair(additive_op, cut(|i: &'a str| self.term(i))),
            move || first.clone(),
            |left, (op, right)| Expr::binary(op, left, right),
        )(input)
    }

    fn term<'a>(&self, input: &'a str) -> PResult<'a, Expr> {
        let (input, first) = self.factor(input)?;
        fold_many0(
            pair(multiplicative_op, cut(|i: &'a str| self.factor(i))),
            move || first.clone(),
            |left, (op, right)| Expr::binary(op, left, right),
        )(input)
    }

    /// `2x`, `3(x + 1)` and `-2x`: a numeric literal directly followed by a
    /// symbol or parenthesis multiplies it.
    fn factor<'a>(&self, input: &'a str) -> PResult<'a, Expr> {
        let (input, left) = self.unary(input)?;
        let starts_operand = input
            .trim_start()
            .chars()
            .next()
            .is_some_and(|c| c.is_alphabetic() || c == '_' || c == '(');
        if !is_numeric_literal(&left) || !starts_operand {
            return Ok((input, left));
        }
        let (input, right) = self.power(input)?;
        Ok((input, Expr::binary(BinaryOp::Mul, left, right)))
    }

    fn unary<'a>(&self, input: &'a str) -> PResult<'a, Expr> {
        let depth = self.depth.get();
        if depth >= MAX_NESTING_DEPTH {
            return fail(
                input.trim_start(),
                format!(
                    "Expression is nested too deeply (more than {} levels)",
                    MAX_NESTING_DEPTH
                ),
            );
        }
        self.depth.set(depth + 1);
        let result = self.signed(input);
        self.depth.set(depth);
        result
    }

    fn signed<'a>(&self, input: &'a str) -> PResult<'a, Expr> {
        if let Ok((rest, _)) = ws("-")(input) {
            let (rest, operand) = cut(|i: &'a str| self.unary(i))(rest)?;
            return Ok((
                rest,
                Expr::Unary {
                    op: UnaryOp::Neg,
                    operand: Box::new(operand),
                },
            ));
        }
        if let Ok((rest, _)) = ws("+")(input) {
            return cut(|i: &'a str| self.unary(i))(rest);
        }
        self.power(input)
    }

    fn power<'a>(&self, input: &'a str) -> PResult<'a, Expr> {
        let (input, base) = self.postfix(input)?;
        match ws("^")(input) {
            Ok((rest, _)) => {
                let (rest, exponent) = cut(|i: &'a str| self.unary(i))(rest)?;
                Ok((rest, Expr::binary(BinaryOp::Pow, base, exponent)))
            }
            Err(_) => Ok((input, base)),
        }
    }

    fn postfix<'a>(&self, input: &'a str) -> PResult<'a, Expr> {
        let (input, operand) = self.primary(input)?;
        fold_many0(
            factorial_bang,
            move || operand.clone(),
            |acc, _| Expr::Unary {
                op: UnaryOp::Factorial,
                operand: Box::new(acc),
            },
        )(input)
    }

    fn primary<'a>(&self, input: &'a str) -> PResult<'a, Expr> {
        let input = input.trim_start();
        alt((
            number,
            string_literal,
            |i: &'a str| self.call_or_symbol(i),
            |i: &'a str| self.parenthesized(i),
            |i: &'a str| self.matrix(i),
        ))(input)
        .map_err(|err| match err {
            nom::Err::Error(_) => nom::Err::Error(SyntaxError {
                input,
                message: Some(format!("Value expected, found {}", describe(input))),
            }),
            other => other,
        })
    }

    fn call_or_symbol<'a>(&self, input: &'a str) -> PResult<'a, Expr> {
        let (input, name) = identifier(input)?;
        match ws("(")(input) {
            Ok((rest, _)) => {
                let (rest, args) = self.list(rest, ")")?;
                Ok((
                    rest,
                    Expr::Call {
                        name: name.to_string(),
                        args,
                    },
                ))
            }
            Err(_) => Ok((input, Expr::Symbol(name.to_string()))),
        }
    }

    fn parenthesized<'a>(&self, input: &'a str) -> PResult<'a, Expr> {
        let (input, _) = ws("(")(input)?;
        let (input, inner) = cut(|i: &'a str| self.expression(i))(input)?;
        let (input, _) = expect(input, ")")?;
        Ok((input, inner))
    }

    fn matrix<'a>(&self, input: &'a str) -> PResult<'a, Expr> {
        let (input, _) = ws("[")(input)?;
        let (input, items) = self.list(input, "]")?;
        Ok((input, Expr::Matrix(items)))
    }

    /// Comma-separated expressions up to and including `close`.
    fn list<'a>(&self, input: &'a str, close: &'static str) -> PResult<'a, Vec<Expr>> {
        let (input, items) = separated_list0(ws(","), |i: &'a str| self.expression(i))(input)?;
        let (input, _) = expect(input, close)?;
        Ok((input, items))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ast::NodeKind;

    #[test]
    fn test_precedence() {
        assert_eq!(parse("1 + 2 * 3").unwrap().to_string(), "1 + 2 * 3");
        assert_eq!(parse("(1 + 2) * 3").unwrap().to_string(), "(1 + 2) * 3");
        assert_eq!(parse("2^3^2").unwrap().to_string(), "2^3^2");
        assert_eq!(parse("(2^3)^2").unwrap().to_string(), "(2^3)^2");
    }

    #[test]
    fn test_negation_binds_looser_than_power() {
        let e = parse("-x^2").unwrap();
        assert!(matches!(
            e,
            Expr::Unary {
                op: UnaryOp::Neg,
                ..
            }
        ));
        assert_eq!(e.to_string(), "-x^2");
    }

    #[test]
    fn test_implicit_multiplication() {
        assert_eq!(parse("2x + 1").unwrap().to_string(), "2 * x + 1");
        assert_eq!(parse("3(x + 1)").unwrap().to_string(), "3 * (x + 1)");
        assert_eq!(parse("2x^2").unwrap().to_string(), "2 * x^2");
    }

    #[test]
    fn test_assignment_forms() {
        let e = parse("a = 5").unwrap();
        assert_eq!(e.kind(), NodeKind::Assignment);

        let e = parse("f(x) = x^2 + 1").unwrap();
        assert_eq!(e.kind(), NodeKind::FunctionAssignment);
        assert_eq!(e.to_string(), "f(x) = x^2 + 1");

        let e = parse("g(a, b) = a * b").unwrap();
        match e {
            Expr::FunctionAssign { name, params, .. } => {
                assert_eq!(name, "g");
                assert_eq!(params, vec!["a".to_string(), "b".to_string()]);
            }
            other => panic!("unexpected {:?}", other),
        }

        let e = parse("h() = 4").unwrap();
        assert_eq!(e.kind(), NodeKind::FunctionAssignment);
    }

    #[test]
    fn test_call_is_not_function_assignment() {
        let e = parse("f(2)").unwrap();
        assert!(matches!(e, Expr::Call { .. }));
        let e = parse("f(x) == 2").unwrap();
        assert_eq!(e.kind(), NodeKind::Other);
    }

    #[test]
    fn test_nested_assignment_rejected() {
        assert!(parse("a = b = 2").is_err());
        assert!(parse("1 + (a = 2)").is_err());
    }

    #[test]
    fn test_matrix_literal() {
        let e = parse("[[1, 2], [3, 4]]").unwrap();
        assert_eq!(e.to_string(), "[[1, 2], [3, 4]]");
        assert_eq!(parse("[]").unwrap(), Expr::Matrix(vec![]));
    }

    #[test]
    fn test_errors_report_position() {
        let err = parse("2 +").unwrap_err();
        assert!(matches!(err, MathError::Parse { position: 4, .. }));
        let err = parse("(1 + 2").unwrap_err();
        assert!(err.to_string().contains("expected"));
        assert!(parse("1 2").is_err());
    }

    #[test]
    fn test_number_literals() {
        assert_eq!(parse("2.5").unwrap(), Expr::Number(2.5));
        assert_eq!(parse(".5").unwrap(), Expr::Number(0.5));
        assert_eq!(parse("1e-3").unwrap(), Expr::Number(0.001));
        // No digits after `e`: the constant, multiplied.
        assert_eq!(parse("2e").unwrap().to_string(), "2 * e");
    }

    #[test]
    fn test_string_literal() {
        assert_eq!(parse(r#""a\"b""#).unwrap(), Expr::Text("a\"b".to_string()));
        let err = parse("\"open").unwrap_err();
        assert!(matches!(err, MathError::Parse { position: 1, .. }));
    }

    #[test]
    fn test_comparison_and_factorial() {
        assert_eq!(parse("a != b").unwrap().to_string(), "a != b");
        assert_eq!(parse("3! <= 6").unwrap().to_string(), "3! <= 6");
    }

    #[test]
    fn test_unknown_character() {
        let err = parse("2 # 3").unwrap_err();
        assert!(matches!(err, MathError::Parse { position: 3, .. }));
    }

    #[test]
    fn test_nesting_depth_is_bounded() {
        let shallow = format!("{}1{}", "(".repeat(50), ")".repeat(50));
        assert_eq!(parse(&shallow).unwrap(), Expr::Number(1.0));

        let deep = format!("{}1{}", "(".repeat(400), ")".repeat(400));
        match parse(&deep) {
            Err(MathError::Parse { message, .. }) => assert!(message.contains("nested too deeply")),
            other => panic!("unexpected {:?}", other),
        }
        assert!(parse(&format!("{}1", "-".repeat(500))).is_err());
        assert!(parse(&format!("{}2", "2^".repeat(300))).is_err());
        assert!(parse(&format!("{}1{}", "[".repeat(300), "]".repeat(300))).is_err());
    }
}
