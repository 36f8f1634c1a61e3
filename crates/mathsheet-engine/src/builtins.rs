//! Built-in functions and constants, with their metadata.
//!
//! Conventions:
//! - Built-in names are lowercase (`sin`, `det`), constants too (`pi`, `e`).
//! - Unary numeric functions apply elementwise to matrices.
//! - Every name here is reserved: cells cannot assign to it.
//! - If you add a built-in, list it in `BUILTINS` and dispatch it in `call_builtin`.

use rand::Rng;

use crate::engine::{Matrix, Value};
use crate::error::{MathError, Result};
use crate::matrix;

pub struct Builtin {
    pub name: &'static str,
    pub min_args: usize,
    pub max_args: usize,
    pub description: &'static str,
}

const fn builtin(
    name: &'static str,
    min_args: usize,
    max_args: usize,
    description: &'static str,
) -> Builtin {
    Builtin {
        name,
        min_args,
        max_args,
        description,
    }
}

pub const BUILTINS: &[Builtin] = &[
    builtin("sin", 1, 1, "Sine (radians)"),
    builtin("cos", 1, 1, "Cosine (radians)"),
    builtin("tan", 1, 1, "Tangent (radians)"),
    builtin("asin", 1, 1, "Inverse sine"),
    builtin("acos", 1, 1, "Inverse cosine"),
    builtin("atan", 1, 1, "Inverse tangent"),
    builtin("atan2", 2, 2, "Angle of the point (x, y): atan2(y, x)"),
    builtin("sinh", 1, 1, "Hyperbolic sine"),
    builtin("cosh", 1, 1, "Hyperbolic cosine"),
    builtin("tanh", 1, 1, "Hyperbolic tangent"),
    builtin("sqrt", 1, 1, "Square root"),
    builtin("cbrt", 1, 1, "Cube root"),
    builtin("abs", 1, 1, "Absolute value"),
    builtin("sign", 1, 1, "Sign: -1, 0 or 1"),
    builtin("exp", 1, 1, "e raised to x"),
    builtin("ln", 1, 1, "Natural logarithm"),
    builtin("log", 1, 2, "log(x) natural logarithm, log(x, base)"),
    builtin("log10", 1, 1, "Base-10 logarithm"),
    builtin("log2", 1, 1, "Base-2 logarithm"),
    builtin("floor", 1, 1, "Round down"),
    builtin("ceil", 1, 1, "Round up"),
    builtin("round", 1, 2, "round(x) or round(x, digits)"),
    builtin("min", 1, usize::MAX, "Smallest argument"),
    builtin("max", 1, usize::MAX, "Largest argument"),
    builtin("pow", 2, 2, "pow(x, y) = x^y"),
    builtin("mod", 2, 2, "mod(x, y), result has the sign of y"),
    builtin("factorial", 1, 1, "n! for non-negative integers"),
    builtin("det", 1, 1, "Matrix determinant"),
    builtin("inv", 1, 1, "Matrix inverse"),
    builtin("transpose", 1, 1, "Matrix transpose"),
    builtin("size", 1, 1, "Dimensions of a matrix"),
    builtin("random", 0, 2, "random(), random(max) or random(min, max)"),
];

pub const CONSTANTS: &[(&str, f64)] = &[
    ("pi", std::f64::consts::PI),
    ("e", std::f64::consts::E),
    ("tau", std::f64::consts::TAU),
    ("phi", 1.618_033_988_749_895),
    ("Infinity", f64::INFINITY),
    ("NaN", f64::NAN),
];

pub fn lookup(name: &str) -> Option<&'static Builtin> {
    BUILTINS.iter().find(|b| b.name == name)
}

pub fn constant(name: &str) -> Option<Value> {
    match name {
        "true" => Some(Value::Bool(true)),
        "false" => Some(Value::Bool(false)),
        _ => CONSTANTS
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| Value::Number(*v)),
    }
}

/// Names that cannot be redefined by an assignment.
pub fn is_reserved(name: &str) -> bool {
    lookup(name).is_some() || constant(name).is_some()
}

fn unary(name: &str, arg: &Value, f: fn(f64) -> f64) -> Result<Value> {
    match arg {
        Value::Matrix(m) => Ok(Value::Matrix(m.map(f))),
        other => Ok(Value::Number(f(other.expect_number(name)?))),
    }
}

pub fn factorial(n: f64) -> Result<f64> {
    if n < 0.0 || n.fract() != 0.0 {
        return Err(MathError::domain(format!(
            "Factorial is only defined for non-negative integers, got {}",
            crate::engine::format_number(n)
        )));
    }
    if n > 170.0 {
        return Ok(f64::INFINITY);
    }
    Ok((1..=(n as u64)).fold(1.0, |acc, k| acc * k as f64))
}

/// `x - y * floor(x / y)`; a zero divisor returns `x`.
pub fn modulo(x: f64, y: f64) -> f64 {
    if y == 0.0 { x } else { x - y * (x / y).floor() }
}

fn round_to(x: f64, digits: f64) -> Result<f64> {
    if digits < 0.0 || digits.fract() != 0.0 || digits > 15.0 {
        return Err(MathError::domain(
            "Number of decimals in function round must be an integer from 0 to 15",
        ));
    }
    let scale = 10f64.powi(digits as i32);
    Ok((x * scale).round() / scale)
}

fn numbers(name: &str, args: &[Value]) -> Result<Vec<f64>> {
    let mut out = Vec::new();
    for arg in args {
        match arg {
            Value::Matrix(m) => out.extend_from_slice(&m.data),
            other => out.push(other.expect_number(name)?),
        }
    }
    if out.is_empty() {
        return Err(MathError::domain(format!(
            "Cannot calculate {}, no values given",
            name
        )));
    }
    Ok(out)
}

/// Call a built-in by name. `None` means no built-in has that name.
pub fn call_builtin(name: &str, args: &[Value]) -> Option<Result<Value>> {
    let meta = lookup(name)?;
    if args.len() < meta.min_args || args.len() > meta.max_args {
        let expected = if args.len() < meta.min_args {
            meta.min_args
        } else {
            meta.max_args
        };
        return Some(Err(MathError::Arity {
            name: name.to_string(),
            expected,
            actual: args.len(),
        }));
    }
    Some(dispatch(name, args))
}

fn dispatch(name: &str, args: &[Value]) -> Result<Value> {
    let num = |i: usize| args[i].expect_number(name);
    match name {
        "sin" => unary(name, &args[0], f64::sin),
        "cos" => unary(name, &args[0], f64::cos),
        "tan" => unary(name, &args[0], f64::tan),
        "asin" => unary(name, &args[0], f64::asin),
        "acos" => unary(name, &args[0], f64::acos),
        "atan" => unary(name, &args[0], f64::atan),
        "sinh" => unary(name, &args[0], f64::sinh),
        "cosh" => unary(name, &args[0], f64::cosh),
        "tanh" => unary(name, &args[0], f64::tanh),
        "sqrt" => unary(name, &args[0], f64::sqrt),
        "cbrt" => unary(name, &args[0], f64::cbrt),
        "abs" => unary(name, &args[0], f64::abs),
        "sign" => unary(name, &args[0], |x| if x == 0.0 { 0.0 } else { x.signum() }),
        "exp" => unary(name, &args[0], f64::exp),
        "ln" => unary(name, &args[0], f64::ln),
        "log10" => unary(name, &args[0], f64::log10),
        "log2" => unary(name, &args[0], f64::log2),
        "floor" => unary(name, &args[0], f64::floor),
        "ceil" => unary(name, &args[0], f64::ceil),
        "log" if args.len() == 2 => Ok(Value::Number(num(0)?.ln() / num(1)?.ln())),
        "log" => unary(name, &args[0], f64::ln),
        "round" if args.len() == 2 => Ok(Value::Number(round_to(num(0)?, num(1)?)?)),
        "round" => unary(name, &args[0], f64::round),
        "atan2" => Ok(Value::Number(num(0)?.atan2(num(1)?))),
        "pow" => Ok(Value::Number(num(0)?.powf(num(1)?))),
        "mod" => Ok(Value::Number(modulo(num(0)?, num(1)?))),
        "factorial" => Ok(Value::Number(factorial(num(0)?)?)),
        "min" => Ok(Value::Number(
            numbers(name, args)?.into_iter().fold(f64::INFINITY, f64::min),
        )),
        "max" => Ok(Value::Number(
            numbers(name, args)?
                .into_iter()
                .fold(f64::NEG_INFINITY, f64::max),
        )),
        "det" => Ok(Value::Number(matrix::determinant(
            args[0].expect_matrix(name)?,
        )?)),
        "inv" => match &args[0] {
            Value::Matrix(m) => Ok(Value::Matrix(matrix::inverse(m)?)),
            other => {
                let x = other.expect_number(name)?;
                if x == 0.0 {
                    Err(MathError::SingularMatrix)
                } else {
                    Ok(Value::Number(1.0 / x))
                }
            }
        },
        "transpose" => Ok(Value::Matrix(matrix::transpose(
            args[0].expect_matrix(name)?,
        ))),
        "size" => {
            let dims: Vec<f64> = match &args[0] {
                Value::Matrix(m) => m.size().into_iter().map(|d| d as f64).collect(),
                _ => Vec::new(),
            };
            Ok(Value::Matrix(Matrix::vector(dims)))
        }
        "random" => {
            let (lo, hi) = match args.len() {
                0 => (0.0, 1.0),
                1 => (0.0, num(0)?),
                _ => (num(0)?, num(1)?),
            };
            let r: f64 = rand::thread_rng().r#gen();
            Ok(Value::Number(lo + r * (hi - lo)))
        }
        _ => Err(MathError::UndefinedFunction(name.to_string())),
    }
}
