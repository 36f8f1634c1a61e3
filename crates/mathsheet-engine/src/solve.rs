//! Root finding for `expr = 0` in one unknown.
//!
//! Polynomials up to degree 2 are solved in closed form. Anything else falls
//! back to a sign-change scan with bisection over a bounded interval.

use std::collections::HashMap;
use std::time::Instant;

use tracing::debug;

use crate::calculus::inline_functions;
use crate::engine::{BinaryOp, EvalLimits, Expr, Scope, UnaryOp, Value, evaluate_since};
use crate::error::{MathError, Result};

const COEFFICIENT_EPSILON: f64 = 1e-12;
const MAX_EXPANDED_POWER: f64 = 16.0;
const BISECTION_STEPS: usize = 200;
const RESIDUAL_TOLERANCE: f64 = 1e-6;
const DUPLICATE_TOLERANCE: f64 = 1e-7;

#[derive(Clone, Debug, PartialEq)]
pub struct SolveOptions {
    pub search_min: f64,
    pub search_max: f64,
    pub samples: usize,
    pub max_roots: usize,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            search_min: -100.0,
            search_max: 100.0,
            samples: 4000,
            max_roots: 10,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
    /// Closed form from polynomial coefficients.
    Exact,
    /// Sign-change scan refined by bisection.
    Numeric,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Solution {
    Roots { roots: Vec<f64>, method: Method },
    /// The expression is identically zero: every value is a solution.
    Identity,
    NoSolution,
}

/// Solve `expr = 0` for `var`. Other free symbols are taken from `scope`.
/// The whole solve, every sample included, shares one time limit.
pub fn solve(
    expr: &Expr,
    var: &str,
    scope: &Scope,
    options: &SolveOptions,
    limits: &EvalLimits,
) -> Result<Solution> {
    let expr = inline_functions(expr, scope)?;
    let started = Instant::now();

    if let Some(coefficients) = polynomial_coefficients(&expr, var, scope, limits, started) {
        match closed_form(&coefficients) {
            Some(Solution::Roots { roots, .. }) if roots.is_empty() => {}
            Some(solution) => return Ok(solution),
            None => {}
        }
    }

    debug!(%expr, var, "no closed form, scanning numerically");
    let roots = numeric_roots(&expr, var, scope, options, limits, started)?;
    if roots.is_empty() {
        Ok(Solution::NoSolution)
    } else {
        Ok(Solution::Roots {
            roots,
            method: Method::Numeric,
        })
    }
}

/// Coefficients `[c0, c1, c2, ...]` when `expr` is a polynomial in `var`.
/// Constant parts are evaluated against the time limit counted from `started`.
pub fn polynomial_coefficients(
    expr: &Expr,
    var: &str,
    scope: &Scope,
    limits: &EvalLimits,
    started: Instant,
) -> Option<Vec<f64>> {
    let mut coefficients = expand(expr, var, scope, limits, started)?;
    while coefficients.len() > 1
        && coefficients
            .last()
            .is_some_and(|c| c.abs() < COEFFICIENT_EPSILON)
    {
        coefficients.pop();
    }
    Some(coefficients)
}

fn expand(
    expr: &Expr,
    var: &str,
    scope: &Scope,
    limits: &EvalLimits,
    started: Instant,
) -> Option<Vec<f64>> {
    if !expr.contains_symbol(var) {
        return match evaluate_since(expr, scope, &HashMap::new(), limits, started).ok()? {
            Value::Number(n) if n.is_finite() => Some(vec![n]),
            Value::Bool(b) => Some(vec![if b { 1.0 } else { 0.0 }]),
            _ => None,
        };
    }
    match expr {
        Expr::Symbol(_) => Some(vec![0.0, 1.0]),
        Expr::Unary {
            op: UnaryOp::Neg,
            operand,
        } => Some(
            expand(operand, var, scope, limits, started)?
                .into_iter()
                .map(|c| -c)
                .collect(),
        ),
        Expr::Binary { op, left, right } => {
            let a = || expand(left, var, scope, limits, started);
            let b = || expand(right, var, scope, limits, started);
            match op {
                BinaryOp::Add => Some(combine(&a()?, &b()?, 1.0)),
                BinaryOp::Sub => Some(combine(&a()?, &b()?, -1.0)),
                BinaryOp::Mul => Some(convolve(&a()?, &b()?)),
                BinaryOp::Div if !right.contains_symbol(var) => {
                    let divisor = b()?;
                    let d = *divisor.first()?;
                    if d == 0.0 {
                        return None;
                    }
                    Some(a()?.into_iter().map(|c| c / d).collect())
                }
                BinaryOp::Pow if !right.contains_symbol(var) => {
                    let n = *b()?.first()?;
                    if n < 0.0 || n.fract() != 0.0 || n > MAX_EXPANDED_POWER {
                        return None;
                    }
                    let base = a()?;
                    let mut result = vec![1.0];
                    for _ in 0..(n as usize) {
                        result = convolve(&result, &base);
                    }
                    Some(result)
                }
                _ => None,
            }
        }
        _ => None,
    }
}

fn combine(a: &[f64], b: &[f64], sign: f64) -> Vec<f64> {
    let mut out = vec![0.0; a.len().max(b.len())];
    for (i, c) in a.iter().enumerate() {
        out[i] += c;
    }
    for (i, c) in b.iter().enumerate() {
        out[i] += sign * c;
    }
    out
}

fn convolve(a: &[f64], b: &[f64]) -> Vec<f64> {
    let mut out = vec![0.0; a.len() + b.len() - 1];
    for (i, x) in a.iter().enumerate() {
        for (j, y) in b.iter().enumerate() {
            out[i + j] += x * y;
        }
    }
    out
}

/// Closed-form roots for degree 0 to 2; `None` for higher degrees.
fn closed_form(c: &[f64]) -> Option<Solution> {
    let roots = match c.len() {
        0 => return Some(Solution::Identity),
        1 if c[0].abs() < COEFFICIENT_EPSILON => return Some(Solution::Identity),
        1 => return Some(Solution::NoSolution),
        2 => vec![-c[0] / c[1]],
        3 => {
            let (a, b, k) = (c[2], c[1], c[0]);
            let disc = b * b - 4.0 * a * k;
            if disc < -COEFFICIENT_EPSILON {
                Vec::new()
            } else if disc.abs() <= COEFFICIENT_EPSILON {
                vec![-b / (2.0 * a)]
            } else {
                // Avoid cancellation between -b and sqrt(disc).
                let q = -0.5 * (b + b.signum() * disc.sqrt());
                let (r1, r2) = if q == 0.0 {
                    let r = (-k / a).sqrt();
                    (-r, r)
                } else {
                    (q / a, k / q)
                };
                let mut roots = vec![clean(r1), clean(r2)];
                roots.sort_by(f64::total_cmp);
                roots
            }
        }
        _ => return None,
    };
    Some(Solution::Roots {
        roots: roots.into_iter().map(clean).collect(),
        method: Method::Exact,
    })
}

/// Snap values within rounding noise of an integer.
fn clean(x: f64) -> f64 {
    let r = x.round();
    if (x - r).abs() < 1e-9 {
        if r == 0.0 { 0.0 } else { r }
    } else {
        x
    }
}

fn numeric_roots(
    expr: &Expr,
    var: &str,
    scope: &Scope,
    options: &SolveOptions,
    limits: &EvalLimits,
    started: Instant,
) -> Result<Vec<f64>> {
    if options.search_min >= options.search_max || options.samples == 0 {
        return Err(MathError::domain("invalid root search interval"));
    }

    let mut first_error: Option<MathError> = None;
    let mut timed_out: Option<MathError> = None;
    let mut any_finite = false;
    let mut f = |x: f64| -> Option<f64> {
        if timed_out.is_some() {
            return None;
        }
        let mut locals = HashMap::new();
        locals.insert(var.to_string(), Value::Number(x));
        match evaluate_since(expr, scope, &locals, limits, started) {
            Ok(v) => v.as_number().filter(|y| y.is_finite()),
            Err(e @ MathError::Timeout(_)) => {
                timed_out = Some(e);
                None
            }
            Err(e) => {
                if first_error.is_none() {
                    first_error = Some(e);
                }
                None
            }
        }
    };

    let step = (options.search_max - options.search_min) / options.samples as f64;
    let xs: Vec<f64> = (0..=options.samples)
        .map(|i| options.search_min + step * i as f64)
        .collect();
    let ys: Vec<Option<f64>> = xs.iter().map(|x| f(*x)).collect();

    let mut roots = Vec::new();
    for i in 0..xs.len() {
        let Some(y) = ys[i] else { continue };
        any_finite = true;
        if y == 0.0 {
            roots.push(xs[i]);
            continue;
        }
        // Sign change to the next sample.
        if let Some(Some(y_next)) = ys.get(i + 1)
            && *y_next != 0.0
            && y.signum() != y_next.signum()
            && let Some(root) = bisect(&mut f, xs[i], xs[i + 1], y)
        {
            roots.push(root);
        }
        // Touching zero without crossing: local minimum of |f|.
        if i > 0
            && let (Some(Some(prev)), Some(Some(next))) = (ys.get(i - 1), ys.get(i + 1))
            && y.abs() < prev.abs()
            && y.abs() < next.abs()
            && y.signum() == prev.signum()
            && y.signum() == next.signum()
            && let Some(root) = refine_minimum(&mut f, xs[i - 1], xs[i + 1])
        {
            roots.push(root);
        }
    }

    if let Some(err) = timed_out {
        return Err(err);
    }
    if !any_finite && let Some(err) = first_error {
        return Err(err);
    }

    roots.sort_by(f64::total_cmp);
    roots.dedup_by(|a, b| (*a - *b).abs() < DUPLICATE_TOLERANCE * b.abs().max(1.0));
    if roots.len() > options.max_roots {
        roots.sort_by(|a, b| a.abs().total_cmp(&b.abs()));
        roots.truncate(options.max_roots);
        roots.sort_by(f64::total_cmp);
    }
    Ok(roots.into_iter().map(clean).collect())
}

fn bisect(f: &mut impl FnMut(f64) -> Option<f64>, mut lo: f64, mut hi: f64, mut f_lo: f64) -> Option<f64> {
    for _ in 0..BISECTION_STEPS {
        let mid = 0.5 * (lo + hi);
        if mid == lo || mid == hi {
            break;
        }
        let f_mid = f(mid)?;
        if f_mid == 0.0 {
            return Some(mid);
        }
        if f_mid.signum() == f_lo.signum() {
            lo = mid;
            f_lo = f_mid;
        } else {
            hi = mid;
        }
    }
    let root = 0.5 * (lo + hi);
    // A sign change across a pole leaves a large residual.
    let residual = f(root)?;
    (residual.abs() < RESIDUAL_TOLERANCE).then_some(root)
}

fn refine_minimum(f: &mut impl FnMut(f64) -> Option<f64>, mut lo: f64, mut hi: f64) -> Option<f64> {
    for _ in 0..BISECTION_STEPS {
        let m1 = lo + (hi - lo) / 3.0;
        let m2 = hi - (hi - lo) / 3.0;
        if m1 >= m2 {
            break;
        }
        if f(m1)?.abs() < f(m2)?.abs() {
            hi = m2;
        } else {
            lo = m1;
        }
    }
    let x = 0.5 * (lo + hi);
    (f(x)?.abs() < 1e-9).then_some(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{make_function, parse};
    use std::time::Duration;

    fn run(input: &str) -> Solution {
        solve(
            &parse(input).unwrap(),
            "x",
            &Scope::new(),
            &SolveOptions::default(),
            &EvalLimits::default(),
        )
        .unwrap()
    }

    fn roots_of(input: &str) -> Vec<f64> {
        match run(input) {
            Solution::Roots { roots, .. } => roots,
            other => panic!("expected roots, got {:?}", other),
        }
    }

    #[test]
    fn test_linear_and_quadratic() {
        assert_eq!(roots_of("2*x + 4"), vec![-2.0]);
        assert_eq!(roots_of("x^2 - 4"), vec![-2.0, 2.0]);
        assert_eq!(roots_of("(x - 3)^2"), vec![3.0]);
        assert_eq!(
            run("x^2 - 5*x + 6"),
            Solution::Roots {
                roots: vec![2.0, 3.0],
                method: Method::Exact
            }
        );
    }

    #[test]
    fn test_identity_and_no_solution() {
        assert_eq!(run("x - x"), Solution::Identity);
        assert_eq!(run("x - x + 1"), Solution::NoSolution);
        assert_eq!(run("x^2 + 1"), Solution::NoSolution);
    }

    #[test]
    fn test_numeric_fallback() {
        match run("x^3 - 8") {
            Solution::Roots { roots, method } => {
                assert_eq!(method, Method::Numeric);
                assert_eq!(roots, vec![2.0]);
            }
            other => panic!("unexpected {:?}", other),
        }
        let roots = roots_of("sin(x) - 0.5");
        assert!(roots.len() <= SolveOptions::default().max_roots);
        assert!(roots.iter().all(|r| (r.sin() - 0.5).abs() < 1e-6));
    }

    #[test]
    fn test_pole_is_not_a_root() {
        // 1/x changes sign at 0 but never reaches it.
        assert_eq!(run("1/x"), Solution::NoSolution);
    }

    #[test]
    fn test_uses_scope_values() {
        let mut scope = Scope::new();
        scope.set("k", Value::Number(9.0));
        let solution = solve(
            &parse("x^2 - k").unwrap(),
            "x",
            &scope,
            &SolveOptions::default(),
            &EvalLimits::default(),
        )
        .unwrap();
        assert_eq!(
            solution,
            Solution::Roots {
                roots: vec![-3.0, 3.0],
                method: Method::Exact
            }
        );
    }

    #[test]
    fn test_undefined_symbol_is_reported() {
        let err = solve(
            &parse("x + y").unwrap(),
            "x",
            &Scope::new(),
            &SolveOptions::default(),
            &EvalLimits::default(),
        )
        .unwrap_err();
        assert_eq!(err, MathError::UndefinedSymbol("y".to_string()));
    }

    #[test]
    fn test_one_time_limit_for_whole_solve() {
        // Each sample needs 2^12 calls: quick alone, slow across 4000 samples.
        let mut scope = Scope::new();
        scope.set("g0", make_function("g0", &["x".to_string()], &parse("sin(x)").unwrap()));
        for n in 1..=12 {
            let body = parse(&format!("g{}(x) + g{}(x)", n - 1, n - 1)).unwrap();
            let name = format!("g{}", n);
            scope.set(name.clone(), make_function(&name, &["x".to_string()], &body));
        }
        let limits = EvalLimits {
            timeout: Some(Duration::from_millis(50)),
            max_call_depth: 256,
        };
        let started = Instant::now();
        let err = solve(
            &parse("g12(x) - 1").unwrap(),
            "x",
            &scope,
            &SolveOptions::default(),
            &limits,
        )
        .unwrap_err();
        assert_eq!(err, MathError::Timeout(50));
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
