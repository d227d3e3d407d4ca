//! Public API for the DKV Script engine.
//!
//! This module provides the stable public API for compiling and executing
//! scripts:
//!
//! 1. [`Engine`] compiles source text into a [`Program`].
//! 2. A [`Program`] creates any number of [`Vm`](crate::vm::Vm)s, each of
//!    which runs once with at most one host command handler.
//!
//! # Example
//!
//! ```
//! use dkv_script_core::api::{Engine, EngineOptions};
//!
//! let engine = Engine::new(EngineOptions::default());
//! let program = engine.compile(r#"print(dkv("GET", "greeting"));"#).unwrap();
//!
//! let mut out = Vec::new();
//! let mut vm = program.vm().with_output(&mut out);
//! vm.set_command_handler(|command: &str| format!("you sent {}", command));
//! program.run_vm(&mut vm).unwrap();
//! drop(vm);
//!
//! assert_eq!(String::from_utf8(out).unwrap(), "you sent GET greeting\n");
//! ```

pub mod engine;
pub mod error;
pub mod options;
pub mod program;

pub use engine::Engine;
pub use error::{Diagnostic, Error, Severity};
pub use options::{CompilationOptions, EngineOptions, ExecutionOptions};
pub use program::Program;

#[cfg(test)]
mod engine_test;
