//! Public error types for the DKV Script API.
//!
//! This module defines the stable error types exposed to library users.
//! Internal errors (`ParseError`, `CompileError`, `ExecutionError`) are
//! converted to these public types at API boundaries.

use std::fmt;
use std::sync::Arc;

use crate::compiler::CompileError;
use crate::parser::{ParseError, Span};
use crate::vm::ExecutionError;

/// Public error type for all DKV Script operations.
#[derive(Debug, Clone)]
pub enum Error {
    /// Invalid API usage (e.g., running a VM twice).
    Api(String),

    /// Compilation errors (parse errors, static checks).
    ///
    /// Carries the source so diagnostics can be rendered with snippets.
    Compilation {
        diagnostics: Vec<Diagnostic>,
        source: Arc<str>,
    },

    /// Runtime errors raised by the script (type mismatch, division by zero,
    /// host call without handler, output failure).
    Runtime {
        diagnostic: Diagnostic,
        source: Arc<str>,
    },

    /// The VM detected inconsistent bytecode.
    Internal(String),
}

impl Error {
    /// Wrap an execution failure of a program compiled from `source`.
    pub fn from_execution(err: ExecutionError, source: Arc<str>) -> Self {
        match err {
            ExecutionError::Runtime(e) => {
                let span = e.span().clone();
                let diagnostic =
                    Diagnostic::new(Severity::Error, e.to_string(), span, &source).with_code("R001");
                Error::Runtime { diagnostic, source }
            }
            ExecutionError::Internal(e) => Error::Internal(e.to_string()),
            ExecutionError::Terminated => Error::Api(err.to_string()),
        }
    }

    pub fn from_parse(err: &ParseError, source: Arc<str>) -> Self {
        Error::Compilation {
            diagnostics: vec![err.to_diagnostic(&source)],
            source,
        }
    }

    pub fn from_compile(err: &CompileError, source: Arc<str>) -> Self {
        Error::Compilation {
            diagnostics: vec![err.to_diagnostic(&source)],
            source,
        }
    }

    /// All diagnostics carried by this error.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            Error::Compilation { diagnostics, .. } => diagnostics,
            Error::Runtime { diagnostic, .. } => core::slice::from_ref(diagnostic),
            Error::Api(_) | Error::Internal(_) => &[],
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Api(msg) => write!(f, "API error: {}", msg),
            Error::Compilation { diagnostics, .. } => {
                let error_count = diagnostics
                    .iter()
                    .filter(|d| d.severity == Severity::Error)
                    .count();
                write!(f, "Compilation failed with {} error(s)", error_count)
            }
            Error::Runtime { diagnostic, .. } => write!(
                f,
                "Runtime error: {} at {}:{}",
                diagnostic.message, diagnostic.line, diagnostic.column
            ),
            Error::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

/// A diagnostic message (error, warning, or info) with source location.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    /// Severity level (error, warning, info).
    pub severity: Severity,

    /// Primary diagnostic message.
    pub message: String,

    /// Source location of the primary issue.
    pub span: Span,

    /// 1-based line of `span.start`.
    pub line: usize,

    /// 1-based column (in characters) of `span.start`.
    pub column: usize,

    /// Help text suggesting how to fix the issue.
    pub help: Vec<String>,

    /// Optional error code (e.g., "P001") for documentation lookup.
    pub code: Option<String>,
}

impl Diagnostic {
    pub fn new(severity: Severity, message: impl Into<String>, span: Span, source: &str) -> Self {
        let (line, column) = span.line_col(source);
        Diagnostic {
            severity,
            message: message.into(),
            span,
            line,
            column,
            help: Vec::new(),
            code: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_help(mut self, help: Vec<String>) -> Self {
        self.help = help;
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.severity)?;
        if let Some(code) = &self.code {
            write!(f, "[{}]", code)?;
        }
        write!(f, " at {}:{}: {}", self.line, self.column, self.message)
    }
}

/// Severity level for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Error - compilation cannot succeed.
    Error,
    /// Warning - suspicious code that might be wrong.
    Warning,
    /// Info - informational message.
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Info => write!(f, "info"),
        }
    }
}
