use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use mathsheet_engine::engine::{Matrix, format_number, format_value_with_precision};
use mathsheet_engine::{Value, evaluate, matrix, parse};

use super::{Command, CommandContext, prefix_matcher};
use crate::error::{NotebookError, Result};
use crate::output::Outcome;
use crate::state::NotebookState;

const INVERSE_PRECISION: usize = 4;
const DISPLAY_PRECISION: usize = 14;

const OPERATIONS_HELP: &str = "Matrix operations:

Single matrix:
  matrix det [[1,2],[3,4]]          determinant
  matrix inv [[1,2],[3,4]]          inverse
  matrix transpose [[1,2,3],[4,5,6]]  transpose

Two matrices (literals or sheet variables):
  matrix multiply A B               product
  matrix add A B                    sum
  matrix subtract A B               difference

Examples:
  matrix det [[2,3],[1,4]]
  matrix inv [[1,0],[0,1]]";

/// Split on whitespace that is not inside brackets or parentheses, so a
/// literal like `[[1, 2], [3, 4]]` stays one argument.
fn split_operands(input: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    for c in input.chars() {
        match c {
            '[' | '(' => depth += 1,
            ']' | ')' => depth = depth.saturating_sub(1),
            _ => {}
        }
        if c.is_whitespace() && depth == 0 {
            if !current.is_empty() {
                parts.push(std::mem::take(&mut current));
            }
        } else {
            current.push(c);
        }
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

fn operand(state: &NotebookState, sheet_id: &str, text: &str) -> Result<Matrix> {
    let expr = parse(text)?;
    let limits = state.eval_limits();
    let value = state
        .scopes
        .with_scope(sheet_id, |scope| evaluate(&expr, scope, &limits))?;
    Ok(value.expect_matrix("matrix")?.clone())
}

fn block(title: &str, m: Matrix, precision: usize) -> Outcome {
    Outcome::Text(format!(
        "{}:\n```\n{}\n```",
        title,
        format_value_with_precision(&Value::Matrix(m), precision)
    ))
}

/// `matrix <operation> <matrix> [matrix]`
pub struct MatrixCommand;

impl Command for MatrixCommand {
    fn name(&self) -> &str {
        "matrix"
    }

    fn aliases(&self) -> &[&'static str] {
        &["mat"]
    }

    fn description(&self) -> &str {
        "Matrix operations: determinant, inverse, transpose, product, sum, difference"
    }

    fn usage(&self) -> &str {
        "matrix <operation> <matrix1> [matrix2]"
    }

    fn matches(&self, input: &str) -> bool {
        prefix_matcher(input, "matrix ")
    }

    fn parse_args(&self, input: &str) -> Vec<String> {
        let rest = input
            .trim()
            .split_once(char::is_whitespace)
            .map(|(_, rest)| rest)
            .unwrap_or("");
        split_operands(rest)
    }

    fn execute<'a>(&'a self, ctx: CommandContext<'a>) -> BoxFuture<'a, Result<Outcome>> {
        async move {
            if ctx.args.len() < 2 {
                return Ok(Outcome::text(OPERATIONS_HELP));
            }
            let operation = ctx.args[0].to_lowercase();
            let first = || operand(ctx.state, ctx.sheet_id, &ctx.args[1]);
            let second = || match ctx.args.get(2) {
                Some(text) => operand(ctx.state, ctx.sheet_id, text),
                None => Err(NotebookError::format(format!(
                    "'matrix {}' needs two operands: matrix {} A B",
                    operation, operation
                ))),
            };

            let outcome = match operation.as_str() {
                "det" | "determinant" => Outcome::Text(format!(
                    "Determinant: {}",
                    format_number(matrix::determinant(&first()?)?)
                )),
                "inv" | "inverse" => block(
                    "Inverse matrix",
                    matrix::inverse(&first()?)?,
                    INVERSE_PRECISION,
                ),
                "transpose" | "t" => block(
                    "Transposed matrix",
                    matrix::transpose(&first()?),
                    DISPLAY_PRECISION,
                ),
                "multiply" | "mul" => block(
                    "Product",
                    matrix::multiply(&first()?, &second()?)?,
                    DISPLAY_PRECISION,
                ),
                "add" => block(
                    "Sum",
                    matrix::add(&first()?, &second()?)?,
                    DISPLAY_PRECISION,
                ),
                "subtract" | "sub" => block(
                    "Difference",
                    matrix::subtract(&first()?, &second()?)?,
                    DISPLAY_PRECISION,
                ),
                _ => {
                    return Err(NotebookError::format(format!(
                        "Operation '{}' not recognized. Run 'matrix help' to see the available operations.",
                        ctx.args[0]
                    )));
                }
            };
            Ok(outcome)
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::CommandRegistry;
    use crate::output::CellOutput;

    async fn run(state: &NotebookState, input: &str) -> CellOutput {
        let registry = CommandRegistry::with_builtins();
        let mut out = CellOutput::default();
        assert!(registry.try_execute(input, "s", 1, state, &mut out).await);
        out
    }

    #[test]
    fn test_split_operands_keeps_literals_whole() {
        assert_eq!(
            split_operands("det [[1, 2], [3, 4]]"),
            vec!["det", "[[1, 2], [3, 4]]"]
        );
        assert_eq!(split_operands("  add A   B "), vec!["add", "A", "B"]);
    }

    #[tokio::test]
    async fn test_determinant() {
        let state = NotebookState::default();
        assert_eq!(
            run(&state, "matrix det [[2,3],[1,4]]").await,
            CellOutput::Text("Determinant: 5".into())
        );
    }

    #[tokio::test]
    async fn test_inverse_uses_four_digits() {
        let state = NotebookState::default();
        let CellOutput::Text(text) = run(&state, "matrix inv [[1,2],[3,4]]").await else {
            panic!("expected text");
        };
        assert_eq!(text, "Inverse matrix:\n```\n[[-2, 1], [1.5, -0.5]]\n```");
    }

    #[tokio::test]
    async fn test_transpose_accepts_upper_t() {
        let state = NotebookState::default();
        let CellOutput::Text(text) = run(&state, "matrix T [[1,2,3],[4,5,6]]").await else {
            panic!("expected text");
        };
        assert!(text.contains("[[1, 4], [2, 5], [3, 6]]"));
    }

    #[tokio::test]
    async fn test_binary_operations_with_variables() {
        let state = NotebookState::default();
        let a = Matrix::from_rows(vec![vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        state.scopes.bind("s", "A", Value::Matrix(a));
        let CellOutput::Text(text) = run(&state, "matrix multiply A [[1, 0], [0, 1]]").await else {
            panic!("expected text");
        };
        assert!(text.contains("[[1, 2], [3, 4]]"));

        let CellOutput::Text(text) = run(&state, "matrix subtract A A").await else {
            panic!("expected text");
        };
        assert!(text.contains("[[0, 0], [0, 0]]"));
    }

    #[tokio::test]
    async fn test_usage_and_errors() {
        let state = NotebookState::default();
        let CellOutput::Text(text) = run(&state, "matrix help").await else {
            panic!("expected usage text");
        };
        assert!(text.starts_with("Matrix operations:"));

        let CellOutput::Error(message) = run(&state, "matrix frob [[1]]").await else {
            panic!("expected an error");
        };
        assert!(message.starts_with("Operation 'frob' not recognized"));

        let CellOutput::Error(message) = run(&state, "matrix inv [[1,2],[2,4]]").await else {
            panic!("expected an error");
        };
        assert_eq!(
            message,
            "Error in command 'matrix': Cannot calculate inverse, determinant is zero"
        );

        let CellOutput::Error(message) = run(&state, "matrix add [[1]]").await else {
            panic!("expected an error");
        };
        assert!(message.contains("needs two operands"));
    }
}
