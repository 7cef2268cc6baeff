//! Host representation of IDL constant values.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A constant value as held by the evaluator and the AST.
///
/// All integer family values share the `Int` representation; the owning
/// [`Type`](crate::Type) constrains the range through narrowing. Fixed-point
/// literals keep their source spelling so no precision is lost before a
/// backend decides how to render them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Bool(bool),
    Int(i128),
    Float(f64),
    Fixed(String),
    Char(u8),
    WChar(char),
    Str(String),
    WStr(String),
}

impl Value {
    pub fn as_int(&self) -> Option<i128> {
        match self {
            Value::Int(v) => Some(*v),
            Value::Char(c) => Some(*c as i128),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Numeric view used by floating point and fixed point arithmetic.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Int(v) => Some(*v as f64),
            Value::Fixed(s) => s.parse().ok(),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Fixed(v) => write!(f, "{v}d"),
            Value::Char(c) => write!(f, "'{}'", char::from(*c)),
            Value::WChar(c) => write!(f, "L'{c}'"),
            Value::Str(s) => write!(f, "\"{s}\""),
            Value::WStr(s) => write!(f, "L\"{s}\""),
        }
    }
}
