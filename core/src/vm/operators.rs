//! Binary and comparison operator implementations.

use ecow::EcoString;

use crate::parser::{BinaryOp, ComparisonOp, Span};
use crate::values::Value;
use crate::vm::error::RuntimeError;

/// Apply an arithmetic operator.
///
/// Numbers follow IEEE 754 except that a zero divisor is an error for both
/// `/` and `%`. `+` concatenates when either operand is a string.
pub(super) fn binary_op(
    op: BinaryOp,
    left: Value,
    right: Value,
    span: impl FnOnce() -> Span,
) -> Result<Value, RuntimeError> {
    match (op, left, right) {
        (BinaryOp::Add, Value::Str(a), b) => Ok(Value::Str(concat(a, &b))),
        (BinaryOp::Add, a, Value::Str(b)) => {
            let mut s = a.to_eco_string();
            s.push_str(&b);
            Ok(Value::Str(s))
        }
        (op, Value::Number(a), Value::Number(b)) => match op {
            BinaryOp::Add => Ok(Value::Number(a + b)),
            BinaryOp::Sub => Ok(Value::Number(a - b)),
            BinaryOp::Mul => Ok(Value::Number(a * b)),
            BinaryOp::Div | BinaryOp::Rem if b == 0.0 => {
                Err(RuntimeError::DivisionByZero { span: span() })
            }
            BinaryOp::Div => Ok(Value::Number(a / b)),
            BinaryOp::Rem => Ok(Value::Number(a % b)),
        },
        (op, a, b) => Err(RuntimeError::InvalidOperands {
            op: op.symbol(),
            left: a.kind(),
            right: b.kind(),
            span: span(),
        }),
    }
}

fn concat(mut left: EcoString, right: &Value) -> EcoString {
    match right {
        Value::Str(s) => left.push_str(s),
        other => left.push_str(&other.to_eco_string()),
    }
    left
}

/// Apply a comparison operator.
///
/// Equality is defined for every pair (different tags are never equal).
/// Ordering is defined for two numbers or two strings only.
pub(super) fn compare_op(
    op: ComparisonOp,
    left: &Value,
    right: &Value,
    span: impl FnOnce() -> Span,
) -> Result<Value, RuntimeError> {
    let result = match op {
        ComparisonOp::Eq => left == right,
        ComparisonOp::Neq => left != right,
        _ => {
            let ordering = match (left, right) {
                (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
                (Value::Str(a), Value::Str(b)) => Some(a.as_str().cmp(b.as_str())),
                (a, b) => {
                    return Err(RuntimeError::InvalidOperands {
                        op: op.symbol(),
                        left: a.kind(),
                        right: b.kind(),
                        span: span(),
                    });
                }
            };
            // NaN compares false with everything
            ordering.is_some_and(|ordering| match op {
                ComparisonOp::Lt => ordering.is_lt(),
                ComparisonOp::Le => ordering.is_le(),
                ComparisonOp::Gt => ordering.is_gt(),
                ComparisonOp::Ge => ordering.is_ge(),
                ComparisonOp::Eq => ordering.is_eq(),
                ComparisonOp::Neq => ordering.is_ne(),
            })
        }
    };
    Ok(Value::Bool(result))
}
