mod ast;
pub mod error;
#[allow(clippy::module_inception)]
pub mod parser;
mod syntax;

// Re-export the parser and rule enum for external use
pub use parser::ScriptParser;
pub use parser::Rule;
pub use parser::{DEFAULT_MAX_DEPTH, parse, parse_with_max_depth};

pub use ast::{Expr, Literal, Param, ParsedScript, Stmt, TypeAnnotation};
pub use error::{ParseError, ParseErrorKind};
pub use syntax::AnnotatedSource;
pub use syntax::{BinaryOp, BoolOp, ComparisonOp, Span, StepOp, UnaryOp};


#[cfg(test)]
mod rule_valid_test;
