//! Execution errors.
//!
//! # Error Categories
//!
//! - **Runtime errors**: failures caused by the script itself (type
//!   mismatches, division by zero, a host call with no handler). They carry
//!   the span of the failing instruction. Unbounded recursion ends here too,
//!   once the call depth limit is hit.
//!
//! - **Internal errors**: the bytecode violated an invariant the compiler is
//!   supposed to uphold. They never happen for compiler output.
//!
//! - **Terminated**: `run` was called on a VM that already ran.

use ecow::EcoString;
use thiserror::Error;

use crate::parser::Span;
use crate::values::{DeclaredType, ValueKind};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExecutionError {
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error(transparent)]
    Internal(#[from] InternalError),

    #[error("VM has already run to completion")]
    Terminated,
}

impl ExecutionError {
    pub fn span(&self) -> Option<&Span> {
        match self {
            ExecutionError::Runtime(e) => Some(e.span()),
            _ => None,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RuntimeError {
    #[error("type mismatch: cannot apply '{op}' to {left} and {right}")]
    InvalidOperands {
        op: &'static str,
        left: ValueKind,
        right: ValueKind,
        span: Span,
    },

    #[error("type mismatch: cannot apply '{op}' to {operand}")]
    InvalidOperand {
        op: &'static str,
        operand: ValueKind,
        span: Span,
    },

    #[error("type mismatch: {context} expects {expected}, found {found}")]
    UnexpectedType {
        context: &'static str,
        expected: ValueKind,
        found: ValueKind,
        span: Span,
    },

    #[error("type mismatch: expected {expected}, found {found}")]
    Annotation {
        expected: DeclaredType,
        found: EcoString,
        span: Span,
    },

    #[error("division by zero")]
    DivisionByZero { span: Span },

    #[error("handler not set")]
    HandlerNotSet { span: Span },

    #[error("failed to write output: {message}")]
    Output { message: String, span: Span },

    #[error("call depth exceeds maximum of {max_depth}")]
    CallDepthExceeded { max_depth: usize, span: Span },
}

impl RuntimeError {
    pub fn span(&self) -> &Span {
        match self {
            RuntimeError::InvalidOperands { span, .. }
            | RuntimeError::InvalidOperand { span, .. }
            | RuntimeError::UnexpectedType { span, .. }
            | RuntimeError::Annotation { span, .. }
            | RuntimeError::DivisionByZero { span }
            | RuntimeError::HandlerNotSet { span }
            | RuntimeError::Output { span, .. }
            | RuntimeError::CallDepthExceeded { span, .. } => span,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InternalError {
    #[error("operand stack underflow at instruction {ip}")]
    StackUnderflow { ip: usize },

    #[error("constant index {index} out of range at instruction {ip}")]
    BadConstant { index: u32, ip: usize },

    #[error("local index {index} out of range at instruction {ip}")]
    BadLocal { index: u32, ip: usize },

    #[error("instruction pointer {ip} out of range")]
    IpOutOfRange { ip: usize },

    #[error("function index {index} out of range at instruction {ip}")]
    BadFunction { index: u32, ip: usize },

    #[error("return outside of a function at instruction {ip}")]
    ReturnOutsideFunction { ip: usize },
}
