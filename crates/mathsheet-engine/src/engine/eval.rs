//! Tree-walking evaluator.
//!
//! Evaluation never mutates the scope it reads from: assignments evaluate to
//! the value that *would* be bound and the caller decides whether to commit.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::ast::{BinaryOp, Expr, UnaryOp};
use super::scope::Scope;
use super::value::{Matrix, UserFunction, Value};
use crate::builtins;
use crate::error::{MathError, Result};
use crate::matrix;

/// Resource limits for one evaluation.
#[derive(Clone, Debug, PartialEq)]
pub struct EvalLimits {
    pub timeout: Option<Duration>,
    pub max_call_depth: usize,
}

impl Default for EvalLimits {
    fn default() -> Self {
        Self {
            timeout: Some(Duration::from_millis(5000)),
            max_call_depth: 256,
        }
    }
}

pub fn evaluate(expr: &Expr, scope: &Scope, limits: &EvalLimits) -> Result<Value> {
    evaluate_with_locals(expr, scope, &HashMap::new(), limits)
}

/// Evaluate with extra bindings that shadow the scope, e.g. the sample
/// variable of a plot.
pub fn evaluate_with_locals(
    expr: &Expr,
    scope: &Scope,
    locals: &HashMap<String, Value>,
    limits: &EvalLimits,
) -> Result<Value> {
    evaluate_since(expr, scope, locals, limits, Instant::now())
}

/// Evaluate with the time limit counted from `started`, so that several
/// evaluations (the samples of one solve) share a single budget.
pub fn evaluate_since(
    expr: &Expr,
    scope: &Scope,
    locals: &HashMap<String, Value>,
    limits: &EvalLimits,
    started: Instant,
) -> Result<Value> {
    let mut evaluator = Evaluator {
        scope,
        started,
        limits,
        depth: 0,
    };
    evaluator.eval(expr, locals)
}

/// Build the function value a `name(params) = body` definition binds.
pub fn make_function(name: &str, params: &[String], body: &Expr) -> Value {
    Value::Function(Arc::new(UserFunction {
        name: name.to_string(),
        params: params.to_vec(),
        body: body.clone(),
    }))
}

struct Evaluator<'a> {
    scope: &'a Scope,
    started: Instant,
    limits: &'a EvalLimits,
    depth: usize,
}

impl Evaluator<'_> {
    fn check_deadline(&self) -> Result<()> {
        if let Some(timeout) = self.limits.timeout {
            if self.started.elapsed() > timeout {
                return Err(MathError::Timeout(timeout.as_millis() as u64));
            }
        }
        Ok(())
    }

    fn lookup(&self, name: &str, locals: &HashMap<String, Value>) -> Result<Value> {
        if let Some(v) = locals.get(name) {
            return Ok(v.clone());
        }
        if let Some(v) = self.scope.get(name) {
            return Ok(v.clone());
        }
        builtins::constant(name).ok_or_else(|| MathError::UndefinedSymbol(name.to_string()))
    }

    fn eval(&mut self, expr: &Expr, locals: &HashMap<String, Value>) -> Result<Value> {
        self.check_deadline()?;
        match expr {
            Expr::Number(n) => Ok(Value::Number(*n)),
            Expr::Text(s) => Ok(Value::Text(s.clone())),
            Expr::Symbol(name) => self.lookup(name, locals),
            Expr::Unary { op, operand } => {
                let v = self.eval(operand, locals)?;
                match op {
                    UnaryOp::Neg => negate(v),
                    UnaryOp::Factorial => match v {
                        Value::Matrix(m) => {
                            let data = m
                                .data
                                .iter()
                                .map(|x| builtins::factorial(*x))
                                .collect::<Result<Vec<_>>>()?;
                            Ok(Value::Matrix(Matrix { data, ..m }))
                        }
                        other => Ok(Value::Number(builtins::factorial(
                            other.expect_number("factorial")?,
                        )?)),
                    },
                }
            }
            Expr::Binary { op, left, right } => {
                let l = self.eval(left, locals)?;
                let r = self.eval(right, locals)?;
                if *op == BinaryOp::Pow
                    && let Value::Matrix(m) = &l
                {
                    let y = r.expect_number("pow")?;
                    let result = matrix::power_with(m, y, || self.check_deadline())?;
                    return Ok(Value::Matrix(result));
                }
                binary(*op, l, r)
            }
            Expr::Call { name, args } => self.call(name, args, locals),
            Expr::Matrix(items) => {
                let values = items
                    .iter()
                    .map(|item| self.eval(item, locals))
                    .collect::<Result<Vec<_>>>()?;
                build_matrix(values)
            }
            Expr::Assign { value, .. } => self.eval(value, locals),
            Expr::FunctionAssign { name, params, body } => Ok(make_function(name, params, body)),
        }
    }

    fn call(&mut self, name: &str, args: &[Expr], locals: &HashMap<String, Value>) -> Result<Value> {
        let bound = locals.get(name).or_else(|| self.scope.get(name)).cloned();
        let values = args
            .iter()
            .map(|a| self.eval(a, locals))
            .collect::<Result<Vec<_>>>()?;

        match bound {
            Some(Value::Function(f)) => self.call_user(&f, values),
            Some(other) if builtins::lookup(name).is_none() => Err(MathError::Type {
                context: name.to_string(),
                expected: "function",
                actual: other.type_name(),
            }),
            _ => builtins::call_builtin(name, &values)
                .unwrap_or_else(|| Err(MathError::UndefinedFunction(name.to_string()))),
        }
    }

    fn call_user(&mut self, f: &UserFunction, args: Vec<Value>) -> Result<Value> {
        if args.len() != f.params.len() {
            return Err(MathError::Arity {
                name: f.name.clone(),
                expected: f.params.len(),
                actual: args.len(),
            });
        }
        if self.depth >= self.limits.max_call_depth {
            return Err(MathError::CallDepth(self.limits.max_call_depth));
        }
        // Parameters only; everything else resolves against the live scope.
        let frame: HashMap<String, Value> = f.params.iter().cloned().zip(args).collect();
        self.depth += 1;
        let result = self.eval(&f.body, &frame);
        self.depth -= 1;
        result
    }
}

fn negate(v: Value) -> Result<Value> {
    match v {
        Value::Matrix(m) => Ok(Value::Matrix(m.map(|x| -x))),
        other => Ok(Value::Number(-other.expect_number("unaryMinus")?)),
    }
}

fn build_matrix(values: Vec<Value>) -> Result<Value> {
    if values.is_empty() {
        return Ok(Value::Matrix(Matrix::vector(Vec::new())));
    }
    if values.iter().all(|v| matches!(v, Value::Matrix(m) if m.vector)) {
        let rows = values
            .into_iter()
            .filter_map(|v| match v {
                Value::Matrix(m) => Some(m.data),
                _ => None,
            })
            .collect();
        return Ok(Value::Matrix(Matrix::from_rows(rows)?));
    }
    let data = values
        .iter()
        .map(|v| match v {
            Value::Matrix(_) => Err(MathError::Dimension(
                "matrix rows must all be vectors of numbers".to_string(),
            )),
            other => other.expect_number("matrix"),
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Value::Matrix(Matrix::vector(data)))
}

fn op_context(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "add",
        BinaryOp::Sub => "subtract",
        BinaryOp::Mul => "multiply",
        BinaryOp::Div => "divide",
        BinaryOp::Mod => "mod",
        BinaryOp::Pow => "pow",
        BinaryOp::Eq => "equal",
        BinaryOp::NotEq => "unequal",
        BinaryOp::Lt => "smaller",
        BinaryOp::Le => "smallerEq",
        BinaryOp::Gt => "larger",
        BinaryOp::Ge => "largerEq",
    }
}

fn scalar(op: BinaryOp, x: f64, y: f64) -> Value {
    match op {
        BinaryOp::Add => Value::Number(x + y),
        BinaryOp::Sub => Value::Number(x - y),
        BinaryOp::Mul => Value::Number(x * y),
        BinaryOp::Div => Value::Number(x / y),
        BinaryOp::Mod => Value::Number(builtins::modulo(x, y)),
        BinaryOp::Pow => Value::Number(x.powf(y)),
        BinaryOp::Eq => Value::Bool(x == y),
        BinaryOp::NotEq => Value::Bool(x != y),
        BinaryOp::Lt => Value::Bool(x < y),
        BinaryOp::Le => Value::Bool(x <= y),
        BinaryOp::Gt => Value::Bool(x > y),
        BinaryOp::Ge => Value::Bool(x >= y),
    }
}

fn broadcast(op: BinaryOp, m: &Matrix, y: f64, matrix_left: bool) -> Result<Value> {
    let mut data = Vec::with_capacity(m.data.len());
    for x in &m.data {
        let (a, b) = if matrix_left { (*x, y) } else { (y, *x) };
        match scalar(op, a, b) {
            Value::Number(n) => data.push(n),
            _ => {
                return Err(MathError::Type {
                    context: op_context(op).to_string(),
                    expected: "number",
                    actual: "matrix",
                });
            }
        }
    }
    Ok(Value::Matrix(Matrix { data, ..m.clone() }))
}

/// Matrix powers never reach here; the evaluator runs them under its deadline.
fn binary(op: BinaryOp, l: Value, r: Value) -> Result<Value> {
    match (&l, &r) {
        (Value::Text(a), Value::Text(b)) => match op {
            BinaryOp::Add => Ok(Value::Text(format!("{}{}", a, b))),
            BinaryOp::Eq => Ok(Value::Bool(a == b)),
            BinaryOp::NotEq => Ok(Value::Bool(a != b)),
            _ => Err(MathError::Type {
                context: op_context(op).to_string(),
                expected: "number",
                actual: "string",
            }),
        },
        (Value::Matrix(a), Value::Matrix(b)) => match op {
            BinaryOp::Add => Ok(Value::Matrix(matrix::add(a, b)?)),
            BinaryOp::Sub => Ok(Value::Matrix(matrix::subtract(a, b)?)),
            BinaryOp::Mul if a.vector && b.vector => Ok(Value::Number(matrix::dot(a, b)?)),
            BinaryOp::Mul => Ok(Value::Matrix(matrix::multiply(a, b)?)),
            BinaryOp::Div => Ok(Value::Matrix(matrix::multiply(a, &matrix::inverse(b)?)?)),
            BinaryOp::Eq => Ok(Value::Bool(a == b)),
            BinaryOp::NotEq => Ok(Value::Bool(a != b)),
            _ => Err(MathError::Type {
                context: op_context(op).to_string(),
                expected: "number",
                actual: "matrix",
            }),
        },
        (Value::Matrix(m), other) => {
            let y = other.expect_number(op_context(op))?;
            broadcast(op, m, y, true)
        }
        (other, Value::Matrix(m)) => {
            let x = other.expect_number(op_context(op))?;
            if op == BinaryOp::Pow {
                return Err(MathError::Type {
                    context: "pow".to_string(),
                    expected: "number",
                    actual: "matrix",
                });
            }
            broadcast(op, m, x, false)
        }
        _ => {
            let context = op_context(op);
            Ok(scalar(op, l.expect_number(context)?, r.expect_number(context)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{format_value, parse};

    fn eval_in(scope: &Scope, input: &str) -> Result<Value> {
        evaluate(&parse(input)?, scope, &EvalLimits::default())
    }

    fn show(scope: &Scope, input: &str) -> String {
        format_value(&eval_in(scope, input).unwrap())
    }

    #[test]
    fn test_arithmetic() {
        let scope = Scope::new();
        assert_eq!(show(&scope, "1 + 2 * 3"), "7");
        assert_eq!(show(&scope, "2^3^2"), "512");
        assert_eq!(show(&scope, "-2^2"), "-4");
        assert_eq!(show(&scope, "7 % 3"), "1");
        assert_eq!(show(&scope, "5!"), "120");
        assert_eq!(show(&scope, "1/0"), "Infinity");
        assert_eq!(show(&scope, "2pi / pi"), "2");
        assert_eq!(show(&scope, "3 > 2"), "true");
    }

    #[test]
    fn test_scope_lookup_and_undefined() {
        let mut scope = Scope::new();
        scope.set("a", Value::Number(4.0));
        assert_eq!(show(&scope, "a * 2"), "8");
        assert_eq!(
            eval_in(&scope, "b + 1"),
            Err(MathError::UndefinedSymbol("b".to_string()))
        );
        assert_eq!(
            eval_in(&scope, "nothing(1)"),
            Err(MathError::UndefinedFunction("nothing".to_string()))
        );
    }

    #[test]
    fn test_user_function_live_binding() {
        let mut scope = Scope::new();
        let def = parse("f(x) = x^2 + k").unwrap();
        if let Expr::FunctionAssign { name, params, body } = &def {
            scope.set(name.clone(), make_function(name, params, body));
        }
        scope.set("k", Value::Number(1.0));
        assert_eq!(show(&scope, "f(3)"), "10");
        scope.set("k", Value::Number(2.0));
        assert_eq!(show(&scope, "f(3)"), "11");
        assert!(matches!(
            eval_in(&scope, "f(1, 2)"),
            Err(MathError::Arity { .. })
        ));
    }

    #[test]
    fn test_recursion_depth_limited() {
        let mut scope = Scope::new();
        let def = parse("r(x) = r(x + 1)").unwrap();
        if let Expr::FunctionAssign { name, params, body } = &def {
            scope.set(name.clone(), make_function(name, params, body));
        }
        let limits = EvalLimits {
            timeout: None,
            max_call_depth: 32,
        };
        let err = evaluate(&parse("r(0)").unwrap(), &scope, &limits).unwrap_err();
        assert_eq!(err, MathError::CallDepth(32));
    }

    #[test]
    fn test_timeout() {
        // f0 is trivial, each f<n> calls f<n-1> twice: 2^40 calls in total.
        let mut scope = Scope::new();
        let mut defs = vec!["f0(x) = x + 1".to_string()];
        for n in 1..=40 {
            defs.push(format!("f{}(x) = f{}(x) + f{}(x)", n, n - 1, n - 1));
        }
        for def in &defs {
            if let Expr::FunctionAssign { name, params, body } = parse(def).unwrap() {
                scope.set(name.clone(), make_function(&name, &params, &body));
            }
        }
        let limits = EvalLimits {
            timeout: Some(Duration::from_millis(20)),
            max_call_depth: 256,
        };
        let err = evaluate(&parse("f40(0)").unwrap(), &scope, &limits).unwrap_err();
        assert_eq!(err, MathError::Timeout(20));
    }

    #[test]
    fn test_matrices() {
        let scope = Scope::new();
        assert_eq!(show(&scope, "[[1, 2], [3, 4]] * [[1, 0], [0, 1]]"), "[[1, 2], [3, 4]]");
        assert_eq!(show(&scope, "[1, 2, 3] * 2"), "[2, 4, 6]");
        assert_eq!(show(&scope, "[1, 2] * [3, 4]"), "11");
        assert_eq!(show(&scope, "det([[2, 3], [1, 4]])"), "5");
        assert_eq!(show(&scope, "[[1, 1], [0, 1]]^2"), "[[1, 2], [0, 1]]");
        assert!(matches!(
            eval_in(&scope, "[[1, 2], [3]]"),
            Err(MathError::Dimension(_))
        ));
    }

    #[test]
    fn test_huge_matrix_power_finishes_within_limit() {
        let limits = EvalLimits {
            timeout: Some(Duration::from_millis(200)),
            max_call_depth: 256,
        };
        let started = Instant::now();
        let v = evaluate(&parse("[[1, 0], [0, 1]]^3e12").unwrap(), &Scope::new(), &limits);
        assert_eq!(v.map(|v| format_value(&v)), Ok("[[1, 0], [0, 1]]".to_string()));
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(matches!(
            eval_in(&Scope::new(), "[[1, 1], [0, 1]]^[[1, 0], [0, 1]]"),
            Err(MathError::Type { .. })
        ));
    }

    #[test]
    fn test_shared_start_time() {
        let scope = Scope::new();
        let limits = EvalLimits {
            timeout: Some(Duration::from_millis(10)),
            max_call_depth: 256,
        };
        let expr = parse("1 + 1").unwrap();
        let started = Instant::now() - Duration::from_millis(50);
        let err = evaluate_since(&expr, &scope, &HashMap::new(), &limits, started);
        assert_eq!(err, Err(MathError::Timeout(10)));
        assert_eq!(evaluate(&expr, &scope, &limits), Ok(Value::Number(2.0)));
    }

    #[test]
    fn test_assignment_does_not_bind() {
        let scope = Scope::new();
        assert_eq!(show(&scope, "a = 3 + 4"), "7");
        assert!(scope.is_empty());
    }

    #[test]
    fn test_locals_shadow_scope() {
        let mut scope = Scope::new();
        scope.set("x", Value::Number(100.0));
        let mut locals = HashMap::new();
        locals.insert("x".to_string(), Value::Number(2.0));
        let v = evaluate_with_locals(
            &parse("x^2").unwrap(),
            &scope,
            &locals,
            &EvalLimits::default(),
        )
        .unwrap();
        assert_eq!(v, Value::Number(4.0));
    }
}
