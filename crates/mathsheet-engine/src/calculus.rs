//! Symbolic differentiation and simplification over [`Expr`] trees.

use std::collections::HashMap;

use crate::builtins;
use crate::engine::{BinaryOp, Expr, Scope, UnaryOp, Value};
use crate::error::{MathError, Result};

const MAX_SIMPLIFY_PASSES: usize = 8;
const MAX_INLINE_DEPTH: usize = 32;

// Constructors that drop literal zeros and ones, so raw derivatives stay readable.

fn is_num(e: &Expr, n: f64) -> bool {
    e.as_number() == Some(n)
}

fn add(a: Expr, b: Expr) -> Expr {
    if is_num(&a, 0.0) {
        b
    } else if is_num(&b, 0.0) {
        a
    } else {
        Expr::binary(BinaryOp::Add, a, b)
    }
}

fn sub(a: Expr, b: Expr) -> Expr {
    if is_num(&b, 0.0) {
        a
    } else if is_num(&a, 0.0) {
        neg(b)
    } else {
        Expr::binary(BinaryOp::Sub, a, b)
    }
}

fn mul(a: Expr, b: Expr) -> Expr {
    if is_num(&a, 0.0) || is_num(&b, 0.0) {
        Expr::num(0.0)
    } else if is_num(&a, 1.0) {
        b
    } else if is_num(&b, 1.0) {
        a
    } else {
        Expr::binary(BinaryOp::Mul, a, b)
    }
}

fn div(a: Expr, b: Expr) -> Expr {
    if is_num(&a, 0.0) {
        Expr::num(0.0)
    } else if is_num(&b, 1.0) {
        a
    } else {
        Expr::binary(BinaryOp::Div, a, b)
    }
}

fn pow(base: Expr, exponent: Expr) -> Expr {
    if is_num(&exponent, 1.0) {
        base
    } else if is_num(&exponent, 0.0) {
        Expr::num(1.0)
    } else {
        Expr::binary(BinaryOp::Pow, base, exponent)
    }
}

fn neg(e: Expr) -> Expr {
    match e {
        Expr::Number(n) => Expr::num(-n),
        Expr::Unary {
            op: UnaryOp::Neg,
            operand,
        } => *operand,
        other => Expr::neg(other),
    }
}

fn call(name: &str, arg: Expr) -> Expr {
    Expr::call(name, vec![arg])
}

/// Derivative of `expr` with respect to `var`, before simplification.
pub fn derivative(expr: &Expr, var: &str) -> Result<Expr> {
    if !expr.contains_symbol(var) {
        return match expr {
            Expr::Number(_) | Expr::Symbol(_) | Expr::Unary { .. } | Expr::Binary { .. } => {
                Ok(Expr::num(0.0))
            }
            Expr::Call { .. } => Ok(Expr::num(0.0)),
            other => Err(cannot_differentiate(other)),
        };
    }

    match expr {
        Expr::Symbol(_) => Ok(Expr::num(1.0)),
        Expr::Unary {
            op: UnaryOp::Neg,
            operand,
        } => Ok(neg(derivative(operand, var)?)),
        Expr::Binary { op, left, right } => {
            let (a, b) = (left.as_ref(), right.as_ref());
            match op {
                BinaryOp::Add => Ok(add(derivative(a, var)?, derivative(b, var)?)),
                BinaryOp::Sub => Ok(sub(derivative(a, var)?, derivative(b, var)?)),
                BinaryOp::Mul => Ok(add(
                    mul(derivative(a, var)?, b.clone()),
                    mul(a.clone(), derivative(b, var)?),
                )),
                BinaryOp::Div if !b.contains_symbol(var) => {
                    Ok(div(derivative(a, var)?, b.clone()))
                }
                BinaryOp::Div => Ok(div(
                    sub(
                        mul(derivative(a, var)?, b.clone()),
                        mul(a.clone(), derivative(b, var)?),
                    ),
                    pow(b.clone(), Expr::num(2.0)),
                )),
                BinaryOp::Pow => power_rule(a, b, var),
                _ => Err(cannot_differentiate(expr)),
            }
        }
        Expr::Call { name, args } => chain_rule(name, args, var),
        other => Err(cannot_differentiate(other)),
    }
}

fn cannot_differentiate(expr: &Expr) -> MathError {
    MathError::domain(format!("Cannot differentiate {}", expr))
}

fn power_rule(base: &Expr, exponent: &Expr, var: &str) -> Result<Expr> {
    match (base.contains_symbol(var), exponent.contains_symbol(var)) {
        (true, false) => {
            // d/dx u^n = n * u^(n-1) * u'
            let lowered = match exponent.as_number() {
                Some(n) => Expr::num(n - 1.0),
                None => Expr::binary(BinaryOp::Sub, exponent.clone(), Expr::num(1.0)),
            };
            Ok(mul(
                mul(exponent.clone(), pow(base.clone(), lowered)),
                derivative(base, var)?,
            ))
        }
        (false, true) => {
            // d/dx c^v = c^v * ln(c) * v'
            let ln_base = if matches!(base, Expr::Symbol(s) if s == "e") {
                Expr::num(1.0)
            } else {
                call("ln", base.clone())
            };
            Ok(mul(
                mul(pow(base.clone(), exponent.clone()), ln_base),
                derivative(exponent, var)?,
            ))
        }
        _ => {
            // d/dx u^v = u^v * (v' * ln(u) + v * u' / u)
            let whole = pow(base.clone(), exponent.clone());
            Ok(mul(
                whole,
                add(
                    mul(derivative(exponent, var)?, call("ln", base.clone())),
                    div(mul(exponent.clone(), derivative(base, var)?), base.clone()),
                ),
            ))
        }
    }
}

fn chain_rule(name: &str, args: &[Expr], var: &str) -> Result<Expr> {
    let Some(u) = args.first() else {
        return Err(MathError::domain(format!("Cannot differentiate {}()", name)));
    };
    let two = || Expr::num(2.0);
    let one = || Expr::num(1.0);
    let u2 = || pow(u.clone(), two());

    let outer = match (name, args.len()) {
        ("sin", 1) => call("cos", u.clone()),
        ("cos", 1) => neg(call("sin", u.clone())),
        ("tan", 1) => div(one(), pow(call("cos", u.clone()), two())),
        ("asin", 1) => div(one(), call("sqrt", sub(one(), u2()))),
        ("acos", 1) => neg(div(one(), call("sqrt", sub(one(), u2())))),
        ("atan", 1) => div(one(), add(one(), u2())),
        ("sinh", 1) => call("cosh", u.clone()),
        ("cosh", 1) => call("sinh", u.clone()),
        ("tanh", 1) => sub(one(), pow(call("tanh", u.clone()), two())),
        ("exp", 1) => call("exp", u.clone()),
        ("ln", 1) | ("log", 1) => div(one(), u.clone()),
        ("log", 2) if !args[1].contains_symbol(var) => {
            div(one(), mul(u.clone(), call("ln", args[1].clone())))
        }
        ("log10", 1) => div(one(), mul(u.clone(), call("ln", Expr::num(10.0)))),
        ("log2", 1) => div(one(), mul(u.clone(), call("ln", two()))),
        ("sqrt", 1) => div(one(), mul(two(), call("sqrt", u.clone()))),
        ("cbrt", 1) => div(
            one(),
            mul(Expr::num(3.0), pow(call("cbrt", u.clone()), two())),
        ),
        ("abs", 1) => call("sign", u.clone()),
        _ => {
            return Err(MathError::domain(format!(
                "Cannot differentiate function {}",
                name
            )));
        }
    };

    Ok(mul(outer, derivative(u, var)?))
}

/// Replace calls to user functions bound in `scope` with their bodies, so
/// `f(x) = x^2` then `derive f(x)` differentiates `x^2`.
pub fn inline_functions(expr: &Expr, scope: &Scope) -> Result<Expr> {
    inline_at(expr, scope, 0)
}

fn inline_at(expr: &Expr, scope: &Scope, depth: usize) -> Result<Expr> {
    if depth > MAX_INLINE_DEPTH {
        return Err(MathError::CallDepth(MAX_INLINE_DEPTH));
    }
    Ok(match expr {
        Expr::Call { name, args } => {
            let args = args
                .iter()
                .map(|a| inline_at(a, scope, depth))
                .collect::<Result<Vec<_>>>()?;
            match scope.get(name) {
                Some(Value::Function(f)) if f.params.len() == args.len() => {
                    let bindings: HashMap<&str, &Expr> =
                        f.params.iter().map(String::as_str).zip(args.iter()).collect();
                    let body = substitute_all(&f.body, &bindings);
                    inline_at(&body, scope, depth + 1)?
                }
                _ => Expr::Call {
                    name: name.clone(),
                    args,
                },
            }
        }
        Expr::Unary { op, operand } => Expr::Unary {
            op: *op,
            operand: Box::new(inline_at(operand, scope, depth)?),
        },
        Expr::Binary { op, left, right } => Expr::binary(
            *op,
            inline_at(left, scope, depth)?,
            inline_at(right, scope, depth)?,
        ),
        Expr::Matrix(items) => Expr::Matrix(
            items
                .iter()
                .map(|a| inline_at(a, scope, depth))
                .collect::<Result<Vec<_>>>()?,
        ),
        other => other.clone(),
    })
}

/// Simultaneous substitution, so `f(y, x)` against `f(x, y) = x - y` yields `y - x`.
fn substitute_all(expr: &Expr, bindings: &HashMap<&str, &Expr>) -> Expr {
    match expr {
        Expr::Symbol(s) => bindings
            .get(s.as_str())
            .map(|e| (*e).clone())
            .unwrap_or_else(|| expr.clone()),
        Expr::Unary { op, operand } => Expr::Unary {
            op: *op,
            operand: Box::new(substitute_all(operand, bindings)),
        },
        Expr::Binary { op, left, right } => Expr::binary(
            *op,
            substitute_all(left, bindings),
            substitute_all(right, bindings),
        ),
        Expr::Call { name, args } => Expr::Call {
            name: name.clone(),
            args: args.iter().map(|a| substitute_all(a, bindings)).collect(),
        },
        Expr::Matrix(items) => {
            Expr::Matrix(items.iter().map(|a| substitute_all(a, bindings)).collect())
        }
        other => other.clone(),
    }
}

/// Algebraic simplification: constant folding, neutral and absorbing
/// elements, like-term collection. Repeats until nothing changes.
pub fn simplify(expr: &Expr) -> Expr {
    let mut current = expr.clone();
    for _ in 0..MAX_SIMPLIFY_PASSES {
        let next = simplify_once(&current);
        if next == current {
            break;
        }
        current = next;
    }
    current
}

fn simplify_once(expr: &Expr) -> Expr {
    match expr {
        Expr::Unary {
            op: UnaryOp::Neg,
            operand,
        } => match simplify_once(operand) {
            Expr::Binary {
                op: BinaryOp::Mul,
                left,
                right,
            } if left.as_number().is_some() => {
                let c = left.as_number().unwrap_or(1.0);
                Expr::binary(BinaryOp::Mul, Expr::num(-c), *right)
            }
            other => neg(other),
        },
        Expr::Unary {
            op: UnaryOp::Factorial,
            operand,
        } => {
            let inner = simplify_once(operand);
            match inner.as_number().map(builtins::factorial) {
                Some(Ok(n)) => Expr::num(n),
                _ => Expr::Unary {
                    op: UnaryOp::Factorial,
                    operand: Box::new(inner),
                },
            }
        }
        Expr::Binary { op, left, right } => {
            let a = simplify_once(left);
            let b = simplify_once(right);
            match op {
                BinaryOp::Add | BinaryOp::Sub => collect_sum(Expr::binary(*op, a, b)),
                BinaryOp::Mul => collect_product(Expr::binary(*op, a, b)),
                BinaryOp::Div => simplify_quotient(a, b),
                BinaryOp::Pow => simplify_power(a, b),
                _ => match (a.as_number(), b.as_number()) {
                    (Some(x), Some(y)) => fold_binary(*op, x, y)
                        .unwrap_or_else(|| Expr::binary(*op, Expr::num(x), Expr::num(y))),
                    _ => Expr::binary(*op, a, b),
                },
            }
        }
        Expr::Call { name, args } => {
            let args: Vec<Expr> = args.iter().map(simplify_once).collect();
            fold_call(name, &args).unwrap_or_else(|| Expr::Call {
                name: name.clone(),
                args,
            })
        }
        Expr::Matrix(items) => Expr::Matrix(items.iter().map(simplify_once).collect()),
        other => other.clone(),
    }
}

fn fold_binary(op: BinaryOp, x: f64, y: f64) -> Option<Expr> {
    let v = match op {
        BinaryOp::Mod => builtins::modulo(x, y),
        _ => return None,
    };
    v.is_finite().then(|| Expr::num(v))
}

fn fold_call(name: &str, args: &[Expr]) -> Option<Expr> {
    if name == "random" || builtins::lookup(name).is_none() {
        return None;
    }
    let values: Vec<Value> = args
        .iter()
        .map(|a| a.as_number().map(Value::Number))
        .collect::<Option<_>>()?;
    match builtins::call_builtin(name, &values)? {
        Ok(Value::Number(n)) if n.is_finite() && is_clean(n) => Some(Expr::num(n)),
        _ => None,
    }
}

/// Only fold results that print exactly, so `sqrt(2)` stays symbolic.
fn is_clean(n: f64) -> bool {
    (n * 1e6).fract() == 0.0
}

fn simplify_quotient(a: Expr, b: Expr) -> Expr {
    match (a.as_number(), b.as_number()) {
        (Some(x), Some(y)) if y != 0.0 && is_clean(x / y) => Expr::num(x / y),
        (Some(0.0), _) if !is_num(&b, 0.0) => Expr::num(0.0),
        (_, Some(1.0)) => a,
        _ if a == b && !is_num(&a, 0.0) => Expr::num(1.0),
        _ => Expr::binary(BinaryOp::Div, a, b),
    }
}

fn simplify_power(base: Expr, exponent: Expr) -> Expr {
    match (base.as_number(), exponent.as_number()) {
        (Some(x), Some(y)) if x.powf(y).is_finite() && is_clean(x.powf(y)) => {
            Expr::num(x.powf(y))
        }
        (_, Some(0.0)) => Expr::num(1.0),
        (_, Some(1.0)) => base,
        (Some(1.0), _) => Expr::num(1.0),
        (_, Some(m)) => match base {
            Expr::Binary {
                op: BinaryOp::Pow,
                left,
                right,
            } if right.as_number().is_some() => {
                let k = right.as_number().unwrap_or(1.0);
                simplify_power(*left, Expr::num(k * m))
            }
            other => Expr::binary(BinaryOp::Pow, other, Expr::num(m)),
        },
        _ => Expr::binary(BinaryOp::Pow, base, exponent),
    }
}

/// Split a term into its numeric coefficient and the rest.
fn split_coefficient(term: Expr) -> (f64, Option<Expr>) {
    match term {
        Expr::Number(n) => (n, None),
        Expr::Unary {
            op: UnaryOp::Neg,
            operand,
        } => {
            let (c, rest) = split_coefficient(*operand);
            (-c, rest)
        }
        Expr::Binary {
            op: BinaryOp::Mul,
            left,
            right,
        } if left.as_number().is_some() => (left.as_number().unwrap_or(1.0), Some(*right)),
        other => (1.0, Some(other)),
    }
}

fn flatten_sum(expr: Expr, sign: f64, out: &mut Vec<(f64, Option<Expr>)>) {
    match expr {
        Expr::Binary {
            op: BinaryOp::Add,
            left,
            right,
        } => {
            flatten_sum(*left, sign, out);
            flatten_sum(*right, sign, out);
        }
        Expr::Binary {
            op: BinaryOp::Sub,
            left,
            right,
        } => {
            flatten_sum(*left, sign, out);
            flatten_sum(*right, -sign, out);
        }
        other => {
            let (c, rest) = split_coefficient(other);
            out.push((c * sign, rest));
        }
    }
}

/// Collect like terms; numeric constant goes last.
fn collect_sum(expr: Expr) -> Expr {
    let mut flat = Vec::new();
    flatten_sum(expr, 1.0, &mut flat);

    let mut constant = 0.0;
    let mut terms: Vec<(f64, Expr)> = Vec::new();
    for (c, rest) in flat {
        match rest {
            None => constant += c,
            Some(rest) => match terms.iter_mut().find(|(_, t)| *t == rest) {
                Some((existing, _)) => *existing += c,
                None => terms.push((c, rest)),
            },
        }
    }

    let mut result: Option<Expr> = None;
    for (c, rest) in terms {
        if c == 0.0 {
            continue;
        }
        let magnitude = if c.abs() == 1.0 {
            rest
        } else {
            Expr::binary(BinaryOp::Mul, Expr::num(c.abs()), rest)
        };
        result = Some(match result {
            None if c < 0.0 => match magnitude {
                Expr::Binary {
                    op: BinaryOp::Mul,
                    left,
                    right,
                } if left.as_number().is_some() => Expr::binary(BinaryOp::Mul, Expr::num(c), *right),
                other => Expr::neg(other),
            },
            None => magnitude,
            Some(acc) if c < 0.0 => Expr::binary(BinaryOp::Sub, acc, magnitude),
            Some(acc) => Expr::binary(BinaryOp::Add, acc, magnitude),
        });
    }

    match result {
        None => Expr::num(constant),
        Some(acc) if constant > 0.0 => Expr::binary(BinaryOp::Add, acc, Expr::num(constant)),
        Some(acc) if constant < 0.0 => Expr::binary(BinaryOp::Sub, acc, Expr::num(-constant)),
        Some(acc) => acc,
    }
}

fn flatten_product(expr: Expr, coefficient: &mut f64, factors: &mut Vec<(Expr, f64)>) {
    match expr {
        Expr::Binary {
            op: BinaryOp::Mul,
            left,
            right,
        } => {
            flatten_product(*left, coefficient, factors);
            flatten_product(*right, coefficient, factors);
        }
        Expr::Number(n) => *coefficient *= n,
        Expr::Unary {
            op: UnaryOp::Neg,
            operand,
        } => {
            *coefficient = -*coefficient;
            flatten_product(*operand, coefficient, factors);
        }
        Expr::Binary {
            op: BinaryOp::Pow,
            left,
            right,
        } if right.as_number().is_some() => {
            let k = right.as_number().unwrap_or(1.0);
            push_factor(factors, *left, k);
        }
        other => push_factor(factors, other, 1.0),
    }
}

fn push_factor(factors: &mut Vec<(Expr, f64)>, base: Expr, exponent: f64) {
    match factors.iter_mut().find(|(b, _)| *b == base) {
        Some((_, k)) => *k += exponent,
        None => factors.push((base, exponent)),
    }
}

/// Fold numeric factors into one leading coefficient and merge equal bases.
fn collect_product(expr: Expr) -> Expr {
    let mut coefficient = 1.0;
    let mut factors = Vec::new();
    flatten_product(expr, &mut coefficient, &mut factors);

    if coefficient == 0.0 {
        return Expr::num(0.0);
    }

    let product = factors
        .into_iter()
        .filter(|(_, k)| *k != 0.0)
        .map(|(base, k)| pow(base, Expr::num(k)))
        .reduce(|acc, f| Expr::binary(BinaryOp::Mul, acc, f));

    match product {
        None => Expr::num(coefficient),
        Some(p) if coefficient == 1.0 => p,
        Some(p) if coefficient == -1.0 => Expr::neg(p),
        Some(p) => Expr::binary(BinaryOp::Mul, Expr::num(coefficient), p),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{make_function, parse};

    fn d(input: &str) -> String {
        simplify(&derivative(&parse(input).unwrap(), "x").unwrap()).to_string()
    }

    #[test]
    fn test_polynomial_derivative() {
        assert_eq!(d("x^2 + 3*x"), "2 * x + 3");
        assert_eq!(d("x^3"), "3 * x^2");
        assert_eq!(d("5"), "0");
        assert_eq!(d("4*x - 7"), "4");
    }

    #[test]
    fn test_raw_derivative_drops_trivial_terms() {
        let raw = derivative(&parse("x^2 + 3*x").unwrap(), "x").unwrap();
        assert_eq!(raw.to_string(), "2 * x + 3");
    }

    #[test]
    fn test_chain_rule() {
        assert_eq!(d("sin(x)"), "cos(x)");
        assert_eq!(d("cos(2*x)"), "-2 * sin(2 * x)");
        assert_eq!(d("exp(x^2)"), "2 * exp(x^2) * x");
        assert_eq!(d("ln(x)"), "1 / x");
    }

    #[test]
    fn test_other_variable() {
        let e = parse("a*y^2 + x").unwrap();
        let dy = simplify(&derivative(&e, "y").unwrap());
        assert_eq!(dy.to_string(), "2 * a * y");
    }

    #[test]
    fn test_unsupported_function() {
        assert!(derivative(&parse("floor(x)").unwrap(), "x").is_err());
    }

    #[test]
    fn test_simplify_collects_like_terms() {
        let e = parse("x + x + 2 - 5 + 3*x").unwrap();
        assert_eq!(simplify(&e).to_string(), "5 * x - 3");
        let e = parse("x * x * 2").unwrap();
        assert_eq!(simplify(&e).to_string(), "2 * x^2");
        let e = parse("x - x").unwrap();
        assert_eq!(simplify(&e).to_string(), "0");
        let e = parse("sqrt(2) * 1").unwrap();
        assert_eq!(simplify(&e).to_string(), "sqrt(2)");
    }

    #[test]
    fn test_inline_user_functions() {
        let mut scope = Scope::new();
        if let Expr::FunctionAssign { name, params, body } = parse("f(x, y) = x - y").unwrap() {
            scope.set(name.clone(), make_function(&name, &params, &body));
        }
        let inlined = inline_functions(&parse("f(y, x)").unwrap(), &scope).unwrap();
        assert_eq!(inlined.to_string(), "y - x");

        if let Expr::FunctionAssign { name, params, body } = parse("g(t) = t^2").unwrap() {
            scope.set(name.clone(), make_function(&name, &params, &body));
        }
        let e = inline_functions(&parse("g(x)").unwrap(), &scope).unwrap();
        assert_eq!(simplify(&derivative(&e, "x").unwrap()).to_string(), "2 * x");
    }
}
