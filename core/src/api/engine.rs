//! The DKV Script compilation engine.

use std::sync::Arc;

use bumpalo::Bump;
use tracing::debug;

use super::{EngineOptions, Error, Program};
use crate::{compiler, parser};

/// The DKV Script compilation engine.
///
/// Parses and compiles scripts into [`Program`]s. The AST lives in a
/// temporary arena that is dropped as soon as the bytecode is produced.
///
/// # Example
///
/// ```
/// use dkv_script_core::api::{Engine, EngineOptions};
///
/// let engine = Engine::new(EngineOptions::default());
/// let program = engine.compile(r#"print("Hello from DKV Script!");"#).unwrap();
/// program.run().unwrap();
/// ```
#[derive(Debug, Clone, Default)]
pub struct Engine {
    options: EngineOptions,
}

impl Engine {
    pub fn new(options: EngineOptions) -> Self {
        Self { options }
    }

    /// Access the engine options.
    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Compile a script.
    ///
    /// Fails with [`Error::Compilation`] on the first syntax or static error.
    pub fn compile(&self, source: &str) -> Result<Program, Error> {
        let source: Arc<str> = Arc::from(source);
        let arena = Bump::new();

        let parsed = parser::parse_with_max_depth(
            &arena,
            &source,
            self.options.compilation.max_nesting_depth,
        )
        .map_err(|e| Error::from_parse(&e, source.clone()))?;

        let code = compiler::compile(&parsed).map_err(|e| Error::from_compile(&e, source.clone()))?;

        debug!(
            bytes = source.len(),
            arena_bytes = arena.allocated_bytes(),
            "Compiled program"
        );
        Ok(Program::new(
            Arc::new(code),
            source,
            self.options.execution.clone(),
        ))
    }
}
