//! Bytecode compiler for DKV Script.
//!
//! This module transforms a parsed script into VM bytecode.
//!
//! ## Design
//!
//! - Single pass over the statements, failing fast on the first error
//! - Tracks stack depth precisely to size the VM operand stack
//! - Implements jump patching for control flow (if/else, while, for, boolean short-circuit)
//! - Builds the `Code` struct for VM execution, with a span per instruction
//! - Function bodies follow the top-level `Halt`, each with its own locals and stack size
//! - `else if` arms and left-deep operator chains compile in loops, not by recursion

mod bytecode;
mod error;


pub use bytecode::BytecodeCompiler;
pub use error::CompileError;

use crate::parser::ParsedScript;
use crate::vm::Code;

/// Compile a parsed script into bytecode.
pub fn compile(script: &ParsedScript<'_>) -> Result<Code, CompileError> {
    BytecodeCompiler::compile(script)
}
