use super::value::{Matrix, Value};

const DEFAULT_PRECISION: usize = 14;

/// Format a number for display: 14 significant digits, trailing zeros
/// removed, exponent notation outside `[1e-7, 1e21)`.
pub fn format_number(n: f64) -> String {
    format_number_with_precision(n, DEFAULT_PRECISION)
}

/// Format a number rounded to `precision` significant digits.
pub fn format_number_with_precision(n: f64, precision: usize) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }

    let precision = precision.max(1);
    let sci = format!("{:.*e}", precision - 1, n);
    let Some((mantissa, exponent)) = sci.split_once('e') else {
        return sci;
    };
    let exponent: i32 = exponent.parse().unwrap_or(0);

    if (-7..21).contains(&exponent) {
        // Re-parse the rounded value so Display yields the shortest form.
        let rounded: f64 = sci.parse().unwrap_or(n);
        let text = format!("{}", rounded);
        if text == "-0" { "0".to_string() } else { text }
    } else {
        let mantissa = trim_fraction(mantissa);
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{}e{}{}", mantissa, sign, exponent.abs())
    }
}

fn trim_fraction(text: &str) -> &str {
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.')
    } else {
        text
    }
}

pub fn format_value(value: &Value) -> String {
    format_value_with(value, DEFAULT_PRECISION)
}

pub fn format_value_with_precision(value: &Value, precision: usize) -> String {
    format_value_with(value, precision)
}

fn format_value_with(value: &Value, precision: usize) -> String {
    match value {
        Value::Number(n) => format_number_with_precision(*n, precision),
        Value::Bool(b) => b.to_string(),
        Value::Text(s) => format!("\"{}\"", s),
        Value::Matrix(m) => format_matrix(m, precision),
        Value::Function(f) => format!("{}({})", f.name, f.params.join(", ")),
    }
}

fn format_matrix(m: &Matrix, precision: usize) -> String {
    let row = |r: usize| {
        let cells: Vec<String> = (0..m.cols)
            .map(|c| format_number_with_precision(m.get(r, c), precision))
            .collect();
        format!("[{}]", cells.join(", "))
    };
    if m.vector {
        return row(0);
    }
    let rows: Vec<String> = (0..m.rows).map(row).collect();
    format!("[{}]", rows.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(5.0), "5");
        assert_eq!(format_number(-2.5), "-2.5");
        assert_eq!(format_number(0.1 + 0.2), "0.3");
        assert_eq!(format_number(1.0 / 3.0), "0.33333333333333");
        assert_eq!(format_number(1e21), "1e+21");
        assert_eq!(format_number(1.5e-8), "1.5e-8");
        assert_eq!(format_number(123456789.0), "123456789");
        assert_eq!(format_number(f64::INFINITY), "Infinity");
        assert_eq!(format_number(f64::NEG_INFINITY), "-Infinity");
        assert_eq!(format_number(f64::NAN), "NaN");
    }

    #[test]
    fn test_format_with_precision() {
        assert_eq!(format_number_with_precision(2.0 / 3.0, 4), "0.6667");
        assert_eq!(format_number_with_precision(-0.2, 4), "-0.2");
    }

    #[test]
    fn test_format_matrix() {
        let m = Matrix::from_rows(vec![vec![1.0, 2.0], vec![3.0, 4.5]]).unwrap();
        assert_eq!(format_value(&Value::Matrix(m)), "[[1, 2], [3, 4.5]]");
        let v = Matrix::vector(vec![1.0, 2.0]);
        assert_eq!(format_value(&Value::Matrix(v)), "[1, 2]");
        let empty = Matrix::from_rows(vec![]).unwrap();
        assert_eq!(format_value(&Value::Matrix(empty)), "[]");
    }
}
