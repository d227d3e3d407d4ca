//! Builtin functions callable from scripts.

use crate::values::{Value, ValueKind};
use crate::vm::error::RuntimeError;
use crate::parser::Span;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Builtin {
    /// `str(x)`: canonical string form of any value.
    Str,
    /// `len(s)`: number of characters of a string.
    Len,
    /// `is_error(x)`: whether `x` is a host reply starting with the error marker.
    IsError,
}

impl Builtin {
    pub const ALL: [Builtin; 3] = [Builtin::Str, Builtin::Len, Builtin::IsError];

    pub fn lookup(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|b| b.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            Builtin::Str => "str",
            Builtin::Len => "len",
            Builtin::IsError => "is_error",
        }
    }

    pub fn arity(self) -> usize {
        1
    }

    pub(crate) fn call(
        self,
        arg: Value,
        error_marker: &str,
        span: &Span,
    ) -> Result<Value, RuntimeError> {
        match self {
            Builtin::Str => Ok(Value::Str(arg.to_eco_string())),
            Builtin::Len => match &arg {
                Value::Str(s) => Ok(Value::Number(s.chars().count() as f64)),
                other => Err(RuntimeError::UnexpectedType {
                    context: "len",
                    expected: ValueKind::Str,
                    found: other.kind(),
                    span: span.clone(),
                }),
            },
            Builtin::IsError => Ok(Value::Bool(arg.is_error_reply(error_marker))),
        }
    }
}
