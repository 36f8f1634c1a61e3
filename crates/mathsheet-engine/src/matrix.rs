//! Dense matrix algebra used by the evaluator and the `matrix` command.

use crate::engine::Matrix;
use crate::error::{MathError, Result};

const PIVOT_EPSILON: f64 = 1e-12;
/// Beyond 2^53 an f64 exponent no longer names a single integer.
const MAX_EXACT_EXPONENT: f64 = 9_007_199_254_740_992.0;

fn require_square(m: &Matrix, op: &str) -> Result<()> {
    if m.is_square() {
        Ok(())
    } else {
        Err(MathError::Dimension(format!(
            "{} requires a square matrix, got {}x{}",
            op, m.rows, m.cols
        )))
    }
}

/// Determinant by LU decomposition with partial pivoting.
pub fn determinant(m: &Matrix) -> Result<f64> {
    require_square(m, "det")?;
    let n = m.rows;
    if n == 0 {
        return Ok(1.0);
    }
    let mut a = m.data.clone();
    let mut det = 1.0;

    for k in 0..n {
        let pivot_row = (k..n)
            .max_by(|&i, &j| a[i * n + k].abs().total_cmp(&a[j * n + k].abs()))
            .unwrap_or(k);
        let pivot = a[pivot_row * n + k];
        if pivot.abs() < PIVOT_EPSILON {
            return Ok(0.0);
        }
        if pivot_row != k {
            for c in 0..n {
                a.swap(k * n + c, pivot_row * n + c);
            }
            det = -det;
        }
        det *= pivot;
        for i in (k + 1)..n {
            let factor = a[i * n + k] / pivot;
            for c in k..n {
                a[i * n + c] -= factor * a[k * n + c];
            }
        }
    }

    Ok(det)
}

/// Inverse by Gauss-Jordan elimination.
pub fn inverse(m: &Matrix) -> Result<Matrix> {
    require_square(m, "inv")?;
    let n = m.rows;
    let mut a = m.data.clone();
    let mut inv = Matrix::identity(n).data;

    for k in 0..n {
        let pivot_row = (k..n)
            .max_by(|&i, &j| a[i * n + k].abs().total_cmp(&a[j * n + k].abs()))
            .unwrap_or(k);
        if a[pivot_row * n + k].abs() < PIVOT_EPSILON {
            return Err(MathError::SingularMatrix);
        }
        if pivot_row != k {
            for c in 0..n {
                a.swap(k * n + c, pivot_row * n + c);
                inv.swap(k * n + c, pivot_row * n + c);
            }
        }
        let pivot = a[k * n + k];
        for c in 0..n {
            a[k * n + c] /= pivot;
            inv[k * n + c] /= pivot;
        }
        for i in 0..n {
            if i == k {
                continue;
            }
            let factor = a[i * n + k];
            if factor == 0.0 {
                continue;
            }
            for c in 0..n {
                a[i * n + c] -= factor * a[k * n + c];
                inv[i * n + c] -= factor * inv[k * n + c];
            }
        }
    }

    Matrix::new(n, n, inv)
}

pub fn transpose(m: &Matrix) -> Matrix {
    if m.vector {
        // A 1-D vector becomes a column.
        return Matrix {
            rows: m.cols,
            cols: 1,
            data: m.data.clone(),
            vector: false,
        };
    }
    let mut data = Vec::with_capacity(m.data.len());
    for c in 0..m.cols {
        for r in 0..m.rows {
            data.push(m.get(r, c));
        }
    }
    Matrix {
        rows: m.cols,
        cols: m.rows,
        data,
        vector: false,
    }
}

fn elementwise(a: &Matrix, b: &Matrix, op: &str, f: impl Fn(f64, f64) -> f64) -> Result<Matrix> {
    if a.rows != b.rows || a.cols != b.cols {
        return Err(MathError::Dimension(format!(
            "cannot {} a {}x{} and a {}x{} matrix",
            op, a.rows, a.cols, b.rows, b.cols
        )));
    }
    Ok(Matrix {
        rows: a.rows,
        cols: a.cols,
        data: a.data.iter().zip(&b.data).map(|(x, y)| f(*x, *y)).collect(),
        vector: a.vector && b.vector,
    })
}

pub fn add(a: &Matrix, b: &Matrix) -> Result<Matrix> {
    elementwise(a, b, "add", |x, y| x + y)
}

pub fn subtract(a: &Matrix, b: &Matrix) -> Result<Matrix> {
    elementwise(a, b, "subtract", |x, y| x - y)
}

/// Matrix product. A vector on the right is treated as a column and a
/// vector on the left as a row; either way the result is a vector.
pub fn multiply(a: &Matrix, b: &Matrix) -> Result<Matrix> {
    let (b_rows, b_cols) = if b.vector { (b.cols, 1) } else { (b.rows, b.cols) };
    if a.cols != b_rows {
        return Err(MathError::Dimension(format!(
            "cannot multiply a {}x{} by a {}x{} matrix",
            a.rows, a.cols, b_rows, b_cols
        )));
    }
    let mut data = vec![0.0; a.rows * b_cols];
    for i in 0..a.rows {
        for j in 0..b_cols {
            let mut sum = 0.0;
            for k in 0..a.cols {
                sum += a.get(i, k) * b.data[k * b_cols + j];
            }
            data[i * b_cols + j] = sum;
        }
    }
    if a.vector || b.vector {
        return Ok(Matrix::vector(data));
    }
    Matrix::new(a.rows, b_cols, data)
}

pub fn dot(a: &Matrix, b: &Matrix) -> Result<f64> {
    if a.data.len() != b.data.len() {
        return Err(MathError::Dimension(format!(
            "dot product of vectors with lengths {} and {}",
            a.data.len(),
            b.data.len()
        )));
    }
    Ok(a.data.iter().zip(&b.data).map(|(x, y)| x * y).sum())
}

/// Integer power of a square matrix; negative exponents invert first.
pub fn power(m: &Matrix, exponent: f64) -> Result<Matrix> {
    power_with(m, exponent, || Ok(()))
}

/// [`power`] by repeated squaring, calling `check` before every
/// multiplication so the caller can abort a long run.
pub fn power_with(
    m: &Matrix,
    exponent: f64,
    mut check: impl FnMut() -> Result<()>,
) -> Result<Matrix> {
    require_square(m, "pow")?;
    if exponent.fract() != 0.0 {
        return Err(MathError::domain(
            "matrix power requires an integer exponent",
        ));
    }
    if exponent.abs() > MAX_EXACT_EXPONENT {
        return Err(MathError::domain("matrix power exponent is too large"));
    }
    let mut base = if exponent < 0.0 { inverse(m)? } else { m.clone() };
    let mut n = exponent.abs() as u64;
    let mut result = Matrix::identity(m.rows);
    while n > 0 {
        if n & 1 == 1 {
            check()?;
            result = multiply(&result, &base)?;
        }
        n >>= 1;
        if n > 0 {
            check()?;
            base = multiply(&base, &base)?;
        }
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(rows: Vec<Vec<f64>>) -> Matrix {
        Matrix::from_rows(rows).unwrap()
    }

    #[test]
    fn test_determinant() {
        let a = m(vec![vec![2.0, 3.0], vec![1.0, 4.0]]);
        assert!((determinant(&a).unwrap() - 5.0).abs() < 1e-12);

        let b = m(vec![
            vec![0.0, 2.0, 1.0],
            vec![1.0, 0.0, 0.0],
            vec![3.0, 1.0, 1.0],
        ]);
        assert!((determinant(&b).unwrap() - 1.0).abs() < 1e-12);

        let singular = m(vec![vec![1.0, 2.0], vec![2.0, 4.0]]);
        assert_eq!(determinant(&singular).unwrap(), 0.0);
    }

    #[test]
    fn test_determinant_requires_square() {
        let a = m(vec![vec![1.0, 2.0, 3.0]]);
        assert!(matches!(determinant(&a), Err(MathError::Dimension(_))));
    }

    #[test]
    fn test_inverse() {
        let a = m(vec![vec![4.0, 7.0], vec![2.0, 6.0]]);
        let inv = inverse(&a).unwrap();
        let product = multiply(&a, &inv).unwrap();
        for (i, v) in product.data.iter().enumerate() {
            let expected = if i == 0 || i == 3 { 1.0 } else { 0.0 };
            assert!((v - expected).abs() < 1e-12);
        }

        let singular = m(vec![vec![1.0, 2.0], vec![2.0, 4.0]]);
        assert_eq!(inverse(&singular), Err(MathError::SingularMatrix));
    }

    #[test]
    fn test_transpose_and_multiply() {
        let a = m(vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]);
        let t = transpose(&a);
        assert_eq!((t.rows, t.cols), (3, 2));
        assert_eq!(t.get(2, 1), 6.0);

        let p = multiply(&a, &t).unwrap();
        assert_eq!(p.data, vec![14.0, 32.0, 32.0, 77.0]);
        assert!(multiply(&a, &a).is_err());
    }

    #[test]
    fn test_matrix_vector_product() {
        let a = m(vec![vec![1.0, 2.0], vec![3.0, 4.0]]);
        let v = Matrix::vector(vec![1.0, 1.0]);
        let r = multiply(&a, &v).unwrap();
        assert!(r.vector);
        assert_eq!(r.data, vec![3.0, 7.0]);
    }

    #[test]
    fn test_power() {
        let a = m(vec![vec![1.0, 1.0], vec![0.0, 1.0]]);
        assert_eq!(power(&a, 3.0).unwrap().data, vec![1.0, 3.0, 0.0, 1.0]);
        assert_eq!(power(&a, 0.0).unwrap(), Matrix::identity(2));
        assert!(power(&a, 0.5).is_err());
        assert_eq!(power(&a, 10.0).unwrap().data, vec![1.0, 10.0, 0.0, 1.0]);
        let inv = power(&a, -2.0).unwrap();
        assert_eq!(inv.data, vec![1.0, -2.0, 0.0, 1.0]);
    }

    #[test]
    fn test_power_large_exponent_is_fast() {
        let id = Matrix::identity(2);
        let mut multiplications = 0;
        let result = power_with(&id, 3e12, || {
            multiplications += 1;
            Ok(())
        })
        .unwrap();
        assert_eq!(result, id);
        assert!(multiplications < 100);
        assert!(power(&id, 1e300).is_err());
    }

    #[test]
    fn test_power_stops_when_check_fails() {
        let a = m(vec![vec![1.0, 1.0], vec![0.0, 1.0]]);
        let mut calls = 0;
        let err = power_with(&a, 1000.0, || {
            calls += 1;
            if calls > 3 {
                Err(MathError::Timeout(1))
            } else {
                Ok(())
            }
        })
        .unwrap_err();
        assert_eq!(err, MathError::Timeout(1));
        assert_eq!(calls, 4);
    }
}
