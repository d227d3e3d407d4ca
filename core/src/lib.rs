//! Core of the DKV Script engine: parser, bytecode compiler, stack VM and
//! the C ABI used by embedding hosts.

pub mod api;
pub mod compiler;
pub mod ffi;
pub mod parser;
pub mod syntax;
pub mod values;
pub mod vm;
