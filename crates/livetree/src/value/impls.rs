//! Value trait implementations: constructors, conversions, From traits

use super::*;
use crate::error::EvalError;

// ═══════════════════════════════════════════════════════════════════
// Convenience Constructors
// ═══════════════════════════════════════════════════════════════════

impl Value {
    /// Create a string value
    pub fn string(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }

    /// The declared type of this value
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::String(_) => ValueType::String,
            Value::Int(_) => ValueType::Int,
            Value::Float(_) => ValueType::Float,
        }
    }

    /// Borrow the string if this is a `String` value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Conversions
    // ═══════════════════════════════════════════════════════════════════

    /// Convert to a string, consuming the value.
    pub fn into_string(self) -> String {
        match self {
            Value::String(s) => s,
            other => other.to_string(),
        }
    }

    /// Convert to an integer.
    ///
    /// Floats round to the nearest integer. Strings must consist of an
    /// integer literal and nothing else (leading whitespace is skipped).
    pub fn to_int(&self) -> Result<i64, EvalError> {
        match self {
            Value::Int(n) => Ok(*n),
            Value::Float(n) if n.is_finite() => Ok(n.round() as i64),
            Value::Float(n) => Err(conversion(n.to_string(), ValueType::Int)),
            Value::String(s) => parse_int(s),
        }
    }

    /// Convert to a float.
    ///
    /// Strings must consist of a float literal and nothing else (leading
    /// whitespace is skipped).
    pub fn to_float(&self) -> Result<f64, EvalError> {
        match self {
            Value::Int(n) => Ok(*n as f64),
            Value::Float(n) => Ok(*n),
            Value::String(s) => parse_float(s),
        }
    }

    /// Convert to the given declared type.
    pub fn coerce(self, target: ValueType) -> Result<Value, EvalError> {
        match target {
            ValueType::String => Ok(Value::String(self.into_string())),
            ValueType::Int => self.to_int().map(Value::Int),
            ValueType::Float => self.to_float().map(Value::Float),
        }
    }
}

/// Parse an integer, rejecting trailing characters.
pub(crate) fn parse_int(s: &str) -> Result<i64, EvalError> {
    s.trim_start()
        .parse::<i64>()
        .map_err(|_| conversion(s, ValueType::Int))
}

/// Parse a float, rejecting trailing characters.
pub(crate) fn parse_float(s: &str) -> Result<f64, EvalError> {
    s.trim_start()
        .parse::<f64>()
        .map_err(|_| conversion(s, ValueType::Float))
}

fn conversion(value: impl Into<String>, target: ValueType) -> EvalError {
    EvalError::Conversion {
        value: value.into(),
        target: target.name(),
    }
}

// ═══════════════════════════════════════════════════════════════════
// From Implementations
// ═══════════════════════════════════════════════════════════════════

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n as i64)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_to_int_rounds() {
        assert_eq!(Value::Float(1.5).to_int().unwrap(), 2);
        assert_eq!(Value::Float(1.49).to_int().unwrap(), 1);
        assert_eq!(Value::Float(-2.5).to_int().unwrap(), -3);
    }

    #[test]
    fn test_string_to_int_requires_full_consumption() {
        assert_eq!(Value::from("42").to_int().unwrap(), 42);
        assert_eq!(Value::from("  -7").to_int().unwrap(), -7);
        assert!(Value::from("42abc").to_int().is_err());
        assert!(Value::from("4 2").to_int().is_err());
        assert!(Value::from("1.5").to_int().is_err());
        assert!(Value::from("").to_int().is_err());
    }

    #[test]
    fn test_string_to_float() {
        assert_eq!(Value::from("2.25").to_float().unwrap(), 2.25);
        assert_eq!(Value::from("3").to_float().unwrap(), 3.0);
        assert!(Value::from("2.25x").to_float().is_err());
    }

    #[test]
    fn test_coerce_to_string_uses_trimmed_float() {
        let v = Value::Float(3.0).coerce(ValueType::String).unwrap();
        assert_eq!(v, Value::string("3.0"));
    }

    #[test]
    fn test_conversion_error_names_target() {
        match Value::from("x").to_int() {
            Err(EvalError::Conversion { value, target }) => {
                assert_eq!(value, "x");
                assert_eq!(target, "int");
            }
            other => panic!("Expected Conversion error, got {:?}", other),
        }
    }
}
