//! Runtime values shared by the compiler (constant pool) and the VM.

use core::fmt;

use ecow::EcoString;

/// Default prefix by which a host reply signals a soft failure.
pub const DEFAULT_ERROR_MARKER: &str = "Error:";

/// A DKV Script value.
///
/// Strings are immutable and reference counted, so cloning a value never
/// copies string contents.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Nil,
    Bool(bool),
    Number(f64),
    Str(EcoString),
}

/// The tag of a [`Value`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Nil,
    Bool,
    Number,
    Str,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ValueKind::Nil => "nil",
            ValueKind::Bool => "bool",
            ValueKind::Number => "number",
            ValueKind::Str => "string",
        })
    }
}

impl Value {
    pub fn str(s: impl Into<EcoString>) -> Self {
        Value::Str(s.into())
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Nil => ValueKind::Nil,
            Value::Bool(_) => ValueKind::Bool,
            Value::Number(_) => ValueKind::Number,
            Value::Str(_) => ValueKind::Str,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Whether this is a host reply carrying the given error marker.
    pub fn is_error_reply(&self, marker: &str) -> bool {
        matches!(self, Value::Str(s) if s.starts_with(marker))
    }

    /// Canonical string form, as produced by `print` and string concatenation.
    pub fn to_eco_string(&self) -> EcoString {
        match self {
            Value::Str(s) => s.clone(),
            other => ecow::eco_format!("{}", other),
        }
    }
}

/// Numbers render without superfluous trailing zeros (`3`, `2.5`), zero of
/// either sign renders as `0`, and non-finite values as `nan`, `inf`, `-inf`.
fn format_number(f: &mut fmt::Formatter<'_>, value: f64) -> fmt::Result {
    if value.is_nan() {
        write!(f, "nan")
    } else if value.is_infinite() {
        if value.is_sign_positive() {
            write!(f, "inf")
        } else {
            write!(f, "-inf")
        }
    } else if value == 0.0 {
        write!(f, "0")
    } else {
        write!(f, "{}", value)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => format_number(f, *n),
            Value::Str(s) => f.write_str(s),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s.into())
    }
}

impl From<EcoString> for Value {
    fn from(s: EcoString) -> Self {
        Value::Str(s)
    }
}

/// Type named in a `let` annotation.
///
/// `int` is a number with no fractional part; `float` is an alias of `number`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum DeclaredType {
    Number,
    Int,
    Str,
    Bool,
}

impl DeclaredType {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "number" | "float" => Some(DeclaredType::Number),
            "int" => Some(DeclaredType::Int),
            "string" => Some(DeclaredType::Str),
            "bool" => Some(DeclaredType::Bool),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DeclaredType::Number => "number",
            DeclaredType::Int => "int",
            DeclaredType::Str => "string",
            DeclaredType::Bool => "bool",
        }
    }

    pub fn admits(self, value: &Value) -> bool {
        match (self, value) {
            (DeclaredType::Number, Value::Number(_)) => true,
            (DeclaredType::Int, Value::Number(n)) => n.is_finite() && n.fract() == 0.0,
            (DeclaredType::Str, Value::Str(_)) => true,
            (DeclaredType::Bool, Value::Bool(_)) => true,
            _ => false,
        }
    }

    /// Value of a declared but uninitialized variable.
    pub fn default_value(self) -> Value {
        match self {
            DeclaredType::Number | DeclaredType::Int => Value::Number(0.0),
            DeclaredType::Str => Value::Str(EcoString::new()),
            DeclaredType::Bool => Value::Bool(false),
        }
    }
}

impl fmt::Display for DeclaredType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
