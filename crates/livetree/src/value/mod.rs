//! Typed results produced by evaluating a node

mod display;
mod impls;

pub use display::format_float;

/// The result of evaluating a node.
///
/// Every node declares one of three result types. Conversions between them
/// follow fixed rules:
/// - `Float` converts to `Int` by rounding and to `String` by trimmed decimal
/// - `Int` converts to `String` and `Float` losslessly (within `f64`)
/// - `String` converts to `Int`/`Float` only if the whole string is a number
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// A string
    String(String),

    /// A 64-bit signed integer
    Int(i64),

    /// A 64-bit float
    Float(f64),
}

/// The declared result type of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    /// `String`
    String,
    /// `Int`
    Int,
    /// `Float`
    Float,
}

impl ValueType {
    /// Human-readable name used in error messages.
    pub fn name(self) -> &'static str {
        match self {
            ValueType::String => "string",
            ValueType::Int => "int",
            ValueType::Float => "float",
        }
    }
}
