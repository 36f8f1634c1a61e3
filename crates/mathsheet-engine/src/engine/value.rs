use std::sync::Arc;

use super::ast::Expr;
use crate::error::{MathError, Result};

/// A user-defined function: parameter names plus an unevaluated body.
///
/// Free symbols in the body are resolved against the scope at call time.
#[derive(Clone, Debug, PartialEq)]
pub struct UserFunction {
    pub name: String,
    pub params: Vec<String>,
    pub body: Expr,
}

/// Dense row-major matrix. `vector` marks a one-dimensional literal like
/// `[1, 2, 3]`, stored as a single row.
#[derive(Clone, Debug, PartialEq)]
pub struct Matrix {
    pub rows: usize,
    pub cols: usize,
    pub data: Vec<f64>,
    pub vector: bool,
}

impl Matrix {
    pub fn new(rows: usize, cols: usize, data: Vec<f64>) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(MathError::Dimension(format!(
                "{} values for a {}x{} matrix",
                data.len(),
                rows,
                cols
            )));
        }
        Ok(Matrix {
            rows,
            cols,
            data,
            vector: false,
        })
    }

    pub fn vector(data: Vec<f64>) -> Self {
        Matrix {
            rows: 1,
            cols: data.len(),
            data,
            vector: true,
        }
    }

    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self> {
        let cols = rows.first().map(|r| r.len()).unwrap_or(0);
        if rows.iter().any(|r| r.len() != cols) {
            return Err(MathError::Dimension(
                "all rows of a matrix must have the same length".to_string(),
            ));
        }
        let height = rows.len();
        Matrix::new(height, cols, rows.into_iter().flatten().collect())
    }

    pub fn identity(n: usize) -> Self {
        let mut data = vec![0.0; n * n];
        for i in 0..n {
            data[i * n + i] = 1.0;
        }
        Matrix {
            rows: n,
            cols: n,
            data,
            vector: false,
        }
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.cols + col]
    }

    pub fn is_square(&self) -> bool {
        self.rows == self.cols
    }

    pub fn map(&self, f: impl Fn(f64) -> f64) -> Matrix {
        Matrix {
            rows: self.rows,
            cols: self.cols,
            data: self.data.iter().map(|v| f(*v)).collect(),
            vector: self.vector,
        }
    }

    pub fn size(&self) -> Vec<usize> {
        if self.vector {
            vec![self.cols]
        } else {
            vec![self.rows, self.cols]
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Number(f64),
    Bool(bool),
    Text(String),
    Matrix(Matrix),
    Function(Arc<UserFunction>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::Bool(_) => "boolean",
            Value::Text(_) => "string",
            Value::Matrix(_) => "matrix",
            Value::Function(_) => "function",
        }
    }

    /// Numeric view of a scalar; booleans count as 1 and 0.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn expect_number(&self, context: &str) -> Result<f64> {
        self.as_number().ok_or_else(|| MathError::Type {
            context: context.to_string(),
            expected: "number",
            actual: self.type_name(),
        })
    }

    pub fn expect_matrix(&self, context: &str) -> Result<&Matrix> {
        match self {
            Value::Matrix(m) => Ok(m),
            other => Err(MathError::Type {
                context: context.to_string(),
                expected: "matrix",
                actual: other.type_name(),
            }),
        }
    }

    pub fn is_function(&self) -> bool {
        matches!(self, Value::Function(_))
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<Matrix> for Value {
    fn from(m: Matrix) -> Self {
        Value::Matrix(m)
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", super::format::format_value(self))
    }
}
