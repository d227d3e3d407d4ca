mod value;

pub use value::{DEFAULT_ERROR_MARKER, DeclaredType, Value, ValueKind};
