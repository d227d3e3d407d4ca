mod bridge;
mod builtins;
mod code;
mod error;
mod instruction_set;
mod operators;
mod runtime;

pub use bridge::CommandHandler;
pub use builtins::Builtin;
pub use code::{Code, Function};
pub use error::{ExecutionError, InternalError, RuntimeError};
pub use instruction_set::Instruction;
pub use runtime::{DEFAULT_MAX_CALL_DEPTH, Vm, VmState};

#[cfg(test)]
mod runtime_test;
