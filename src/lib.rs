//! DKV Script - a small embeddable scripting language for key-value stores
//!
//! # Overview
//!
//! Scripts are compiled once into immutable bytecode and run on lightweight
//! stack VMs. The only way a script talks to the outside world is the host
//! command `dkv(...)`, answered synchronously by a handler the host
//! registers on each VM:
//!
//! - Batching several store commands into one round trip
//! - Conditional updates ("set if the old value matches")
//! - Small maintenance jobs shipped as text
//!
//! # Quick Start
//!
//! ```
//! use dkv_script::{Engine, EngineOptions};
//! use std::collections::HashMap;
//!
//! let engine = Engine::new(EngineOptions::default());
//! let program = engine
//!     .compile(
//!         r#"
//!         let current = dkv("GET", "visits");
//!         if is_error(current) {
//!             dkv("SET", "visits", "1");
//!         }
//!         "#,
//!     )
//!     .unwrap();
//!
//! let mut store: HashMap<String, String> = HashMap::new();
//! program
//!     .run_with_handler(|command: &str| {
//!         let parts: Vec<&str> = command.split(' ').collect();
//!         match parts.as_slice() {
//!             ["GET", key] => store
//!                 .get(*key)
//!                 .cloned()
//!                 .unwrap_or_else(|| "Error: not found".to_string()),
//!             ["SET", key, value] => {
//!                 store.insert(key.to_string(), value.to_string());
//!                 "OK".to_string()
//!             }
//!             _ => "Error: unknown command".to_string(),
//!         }
//!     })
//!     .unwrap();
//!
//! assert_eq!(store["visits"], "1");
//! ```
//!
//! # Embedding from C
//!
//! The core library builds as a `cdylib`/`staticlib` exporting the functions
//! declared in `include/dkv_script.h`; see [`dkv_script_core::ffi`].

mod error_renderer;

// Re-export public API from dkv_script_core
pub use dkv_script_core::api::{
    CompilationOptions, Diagnostic, Engine, EngineOptions, Error, ExecutionOptions, Program,
    Severity,
};

// Re-export the pieces embedders touch directly
pub use dkv_script_core::values::{self, DeclaredType, Value, ValueKind};
pub use dkv_script_core::vm::{self, Code, CommandHandler, ExecutionError, RuntimeError, Vm, VmState};

pub use error_renderer::{
    render_error, render_error_to, render_error_to_string, render_error_to_string_no_color,
};
