//! Expression tree produced by the parser.
//!
//! The tree is also the representation the symbolic layer works on, so
//! `Display` renders it back to source form with minimal parentheses.

use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Factorial,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Pow => "^",
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
        }
    }

    fn precedence(self) -> u8 {
        match self {
            BinaryOp::Eq
            | BinaryOp::NotEq
            | BinaryOp::Lt
            | BinaryOp::Le
            | BinaryOp::Gt
            | BinaryOp::Ge => PREC_CMP,
            BinaryOp::Add | BinaryOp::Sub => PREC_ADD,
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => PREC_MUL,
            BinaryOp::Pow => PREC_POW,
        }
    }
}

const PREC_ASSIGN: u8 = 0;
const PREC_CMP: u8 = 1;
const PREC_ADD: u8 = 2;
const PREC_MUL: u8 = 3;
const PREC_NEG: u8 = 4;
const PREC_POW: u8 = 5;
const PREC_FACT: u8 = 6;
const PREC_ATOM: u8 = 7;

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Number(f64),
    Text(String),
    Symbol(String),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Call {
        name: String,
        args: Vec<Expr>,
    },
    /// Matrix literal; each element is either a row (itself a `Matrix`) or a scalar.
    Matrix(Vec<Expr>),
    Assign {
        name: String,
        value: Box<Expr>,
    },
    FunctionAssign {
        name: String,
        params: Vec<String>,
        body: Box<Expr>,
    },
}

/// Coarse classification of a parsed cell, used by the dispatcher.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeKind {
    FunctionAssignment,
    Assignment,
    SymbolReference,
    Other,
}

impl Expr {
    pub fn kind(&self) -> NodeKind {
        match self {
            Expr::FunctionAssign { .. } => NodeKind::FunctionAssignment,
            Expr::Assign { .. } => NodeKind::Assignment,
            Expr::Symbol(_) => NodeKind::SymbolReference,
            _ => NodeKind::Other,
        }
    }

    pub fn num(value: f64) -> Expr {
        Expr::Number(value)
    }

    pub fn sym(name: impl Into<String>) -> Expr {
        Expr::Symbol(name.into())
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn neg(operand: Expr) -> Expr {
        Expr::Unary {
            op: UnaryOp::Neg,
            operand: Box::new(operand),
        }
    }

    pub fn call(name: impl Into<String>, args: Vec<Expr>) -> Expr {
        Expr::Call {
            name: name.into(),
            args,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Expr::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// True when `name` occurs free anywhere in the expression.
    pub fn contains_symbol(&self, name: &str) -> bool {
        match self {
            Expr::Number(_) | Expr::Text(_) => false,
            Expr::Symbol(s) => s == name,
            Expr::Unary { operand, .. } => operand.contains_symbol(name),
            Expr::Binary { left, right, .. } => {
                left.contains_symbol(name) || right.contains_symbol(name)
            }
            Expr::Call { args, .. } | Expr::Matrix(args) => {
                args.iter().any(|a| a.contains_symbol(name))
            }
            Expr::Assign { value, .. } => value.contains_symbol(name),
            Expr::FunctionAssign { params, body, .. } => {
                !params.iter().any(|p| p == name) && body.contains_symbol(name)
            }
        }
    }

    /// Replaces every free occurrence of `name` with `replacement`.
    pub fn substitute(&self, name: &str, replacement: &Expr) -> Expr {
        match self {
            Expr::Symbol(s) if s == name => replacement.clone(),
            Expr::Number(_) | Expr::Text(_) | Expr::Symbol(_) => self.clone(),
            Expr::Unary { op, operand } => Expr::Unary {
                op: *op,
                operand: Box::new(operand.substitute(name, replacement)),
            },
            Expr::Binary { op, left, right } => Expr::Binary {
                op: *op,
                left: Box::new(left.substitute(name, replacement)),
                right: Box::new(right.substitute(name, replacement)),
            },
            Expr::Call { name: f, args } => Expr::Call {
                name: f.clone(),
                args: args.iter().map(|a| a.substitute(name, replacement)).collect(),
            },
            Expr::Matrix(items) => Expr::Matrix(
                items
                    .iter()
                    .map(|a| a.substitute(name, replacement))
                    .collect(),
            ),
            Expr::Assign { name: target, value } => Expr::Assign {
                name: target.clone(),
                value: Box::new(value.substitute(name, replacement)),
            },
            Expr::FunctionAssign {
                name: f,
                params,
                body,
            } => {
                if params.iter().any(|p| p == name) {
                    self.clone()
                } else {
                    Expr::FunctionAssign {
                        name: f.clone(),
                        params: params.clone(),
                        body: Box::new(body.substitute(name, replacement)),
                    }
                }
            }
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            Expr::Number(n) if *n < 0.0 => PREC_NEG,
            Expr::Number(_) | Expr::Text(_) | Expr::Symbol(_) => PREC_ATOM,
            Expr::Call { .. } | Expr::Matrix(_) => PREC_ATOM,
            Expr::Unary {
                op: UnaryOp::Neg, ..
            } => PREC_NEG,
            Expr::Unary {
                op: UnaryOp::Factorial,
                ..
            } => PREC_FACT,
            Expr::Binary { op, .. } => op.precedence(),
            Expr::Assign { .. } | Expr::FunctionAssign { .. } => PREC_ASSIGN,
        }
    }
}

fn write_operand(f: &mut fmt::Formatter<'_>, expr: &Expr, wrap: bool) -> fmt::Result {
    if wrap {
        write!(f, "({})", expr)
    } else {
        write!(f, "{}", expr)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Number(n) => write!(f, "{}", crate::engine::format_number(*n)),
            Expr::Text(s) => write!(f, "\"{}\"", s.replace('"', "\\\"")),
            Expr::Symbol(s) => write!(f, "{}", s),
            Expr::Unary {
                op: UnaryOp::Neg,
                operand,
            } => {
                write!(f, "-")?;
                write_operand(f, operand, operand.precedence() < PREC_NEG)
            }
            Expr::Unary {
                op: UnaryOp::Factorial,
                operand,
            } => {
                write_operand(f, operand, operand.precedence() < PREC_ATOM)?;
                write!(f, "!")
            }
            Expr::Binary { op, left, right } => {
                let prec = op.precedence();
                match op {
                    BinaryOp::Pow => {
                        // Right-associative: wrap the base at equal precedence.
                        write_operand(f, left, left.precedence() <= prec)?;
                        write!(f, "^")?;
                        write_operand(f, right, right.precedence() < prec)
                    }
                    _ => {
                        write_operand(f, left, left.precedence() < prec)?;
                        write!(f, " {} ", op.symbol())?;
                        let wrap_right = match op {
                            BinaryOp::Sub | BinaryOp::Div | BinaryOp::Mod => {
                                right.precedence() <= prec
                            }
                            _ => right.precedence() < prec,
                        };
                        write_operand(f, right, wrap_right)
                    }
                }
            }
            Expr::Call { name, args } => {
                write!(f, "{}(", name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
            Expr::Matrix(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Expr::Assign { name, value } => write!(f, "{} = {}", name, value),
            Expr::FunctionAssign { name, params, body } => {
                write!(f, "{}({}) = {}", name, params.join(", "), body)
            }
        }
    }
}
