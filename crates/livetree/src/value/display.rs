//! Display implementation and float formatting for Value

use std::fmt;

use super::Value;

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => f.write_str(s),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(n) => f.write_str(&format_float(*n)),
        }
    }
}

/// Render a float with six decimals, then strip trailing zeros.
///
/// One digit always stays after the decimal point, so `2.0` renders as
/// `"2.0"` rather than `"2."` or `"2"`. Non-finite values render as Rust
/// prints them.
pub fn format_float(n: f64) -> String {
    let mut s = format!("{:.6}", n);
    if !s.contains('.') {
        return s;
    }
    while s.ends_with('0') {
        s.pop();
    }
    if s.ends_with('.') {
        s.push('0');
    }
    s
}
