//! Bytecode compilation errors.

use thiserror::Error;

use crate::api::{Diagnostic, Severity};
use crate::parser::Span;

/// Errors that can occur during bytecode compilation.
///
/// Everything the compiler can decide without running the script: names,
/// arities, annotation types and function declarations, plus resource limits that only very large
/// programs hit.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    #[error("Unknown variable '{name}'")]
    UnknownVariable { name: String, span: Span },

    #[error("Unknown function '{name}'")]
    UnknownFunction { name: String, span: Span },

    #[error("Unknown type '{name}'")]
    UnknownType { name: String, span: Span },

    #[error("'{name}' expects {expected} argument(s), found {found}")]
    ArityMismatch {
        name: String,
        expected: String,
        found: usize,
        span: Span,
    },

    /// Too many constants in constant pool (limit: ~4 billion)
    #[error("Too many constants (limit: ~4 billion)")]
    TooManyConstants { span: Span },

    /// Too many local variables (limit: ~4 billion)
    #[error("Too many local variables (limit: ~4 billion)")]
    TooManyLocals { span: Span },

    #[error("Jump distance too large (limit: ~4 billion instructions)")]
    JumpTooFar { span: Span },

    #[error("Function '{name}' is already defined")]
    DuplicateFunction { name: String, span: Span },

    #[error("Duplicate parameter '{name}'")]
    DuplicateParameter { name: String, span: Span },

    #[error("'return' outside of a function")]
    ReturnOutsideFunction { span: Span },

    #[error("Too many functions (limit: ~4 billion)")]
    TooManyFunctions { span: Span },
}

impl CompileError {
    pub fn span(&self) -> &Span {
        match self {
            CompileError::UnknownVariable { span, .. }
            | CompileError::UnknownFunction { span, .. }
            | CompileError::UnknownType { span, .. }
            | CompileError::ArityMismatch { span, .. }
            | CompileError::TooManyConstants { span }
            | CompileError::TooManyLocals { span }
            | CompileError::JumpTooFar { span }
            | CompileError::DuplicateFunction { span, .. }
            | CompileError::DuplicateParameter { span, .. }
            | CompileError::ReturnOutsideFunction { span }
            | CompileError::TooManyFunctions { span } => span,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            CompileError::UnknownVariable { .. } => "C001",
            CompileError::UnknownFunction { .. } => "C002",
            CompileError::UnknownType { .. } => "C003",
            CompileError::ArityMismatch { .. } => "C004",
            CompileError::TooManyConstants { .. } => "C005",
            CompileError::TooManyLocals { .. } => "C006",
            CompileError::JumpTooFar { .. } => "C007",
            CompileError::DuplicateFunction { .. } => "C008",
            CompileError::DuplicateParameter { .. } => "C009",
            CompileError::ReturnOutsideFunction { .. } => "C010",
            CompileError::TooManyFunctions { .. } => "C011",
        }
    }

    fn help(&self) -> Vec<String> {
        match self {
            CompileError::UnknownVariable { name, .. } => {
                vec![format!("Declare it first with `let {};`", name)]
            }
            CompileError::UnknownFunction { .. } => {
                vec![
                    "Available functions: print, dkv, str, len, is_error, or one declared with `fn`"
                        .to_string(),
                ]
            }
            CompileError::DuplicateFunction { .. } => {
                vec!["Builtin names cannot be redefined".to_string()]
            }
            CompileError::UnknownType { .. } => {
                vec!["Available types: number, int, float, string, bool".to_string()]
            }
            _ => vec![],
        }
    }

    /// Convert to a Diagnostic for API boundary.
    pub fn to_diagnostic(&self, source: &str) -> Diagnostic {
        Diagnostic::new(Severity::Error, self.to_string(), self.span().clone(), source)
            .with_code(self.code())
            .with_help(self.help())
    }
}
