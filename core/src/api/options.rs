//! Configuration options for the DKV Script engine.

use crate::parser::DEFAULT_MAX_DEPTH;
use crate::values::DEFAULT_ERROR_MARKER;
use crate::vm::DEFAULT_MAX_CALL_DEPTH;

/// Configuration options for compilation.
///
/// # Example
///
/// ```
/// use dkv_script_core::api::CompilationOptions;
///
/// let options = CompilationOptions { max_nesting_depth: 64 };
/// assert_eq!(CompilationOptions::default().max_nesting_depth, 128);
/// ```
#[derive(Debug, Clone)]
pub struct CompilationOptions {
    /// Maximum nesting of blocks, parentheses and prefix operators.
    ///
    /// Default: 128
    pub max_nesting_depth: usize,
}

impl Default for CompilationOptions {
    fn default() -> Self {
        Self {
            max_nesting_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// Configuration options for script execution.
#[derive(Debug, Clone)]
pub struct ExecutionOptions {
    /// Prefix by which a host reply signals a soft failure (see `is_error`).
    ///
    /// Default: `"Error:"`
    pub error_marker: String,

    /// Nested function calls allowed before the run fails.
    ///
    /// Default: 256
    pub max_call_depth: usize,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            error_marker: DEFAULT_ERROR_MARKER.to_string(),
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }
}

/// Configuration options for the DKV Script engine.
///
/// # Example
///
/// ```
/// use dkv_script_core::api::{CompilationOptions, EngineOptions, ExecutionOptions};
///
/// let options = EngineOptions {
///     compilation: CompilationOptions::default(),
///     execution: ExecutionOptions {
///         error_marker: "ERR".to_string(),
///         ..Default::default()
///     },
/// };
/// ```
#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    /// Options used by `Engine::compile()`.
    pub compilation: CompilationOptions,

    /// Options given to every VM created from a compiled program.
    pub execution: ExecutionOptions,
}
