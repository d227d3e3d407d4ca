//! In-memory key-value store answering host commands from scripts.

use std::collections::HashMap;

use tracing::debug;

/// A toy store speaking a Redis-like text protocol.
///
/// | Command       | Reply                        |
/// |---------------|------------------------------|
/// | `SET k v`     | `OK`                         |
/// | `GET k`       | the value, or `Error: not found` |
/// | `DEL k`       | `1` if removed, else `0`     |
/// | `EXISTS k`    | `1` or `0`                   |
///
/// Command names are case-insensitive. Everything after the key in `SET`
/// is the value, spaces included.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn execute(&mut self, command: &str) -> String {
        let mut parts = command.trim().splitn(3, char::is_whitespace);
        let name = parts.next().unwrap_or_default();
        let key = parts.next();
        let rest = parts.next();
        debug!(command, "Store command");

        match (name.to_ascii_uppercase().as_str(), key, rest) {
            ("SET", Some(key), Some(value)) => {
                self.entries.insert(key.to_string(), value.to_string());
                "OK".to_string()
            }
            ("GET", Some(key), None) => self
                .entries
                .get(key)
                .cloned()
                .unwrap_or_else(|| "Error: not found".to_string()),
            ("DEL", Some(key), None) => flag(self.entries.remove(key).is_some()),
            ("EXISTS", Some(key), None) => flag(self.entries.contains_key(key)),
            ("SET" | "GET" | "DEL" | "EXISTS", _, _) => {
                format!("Error: wrong number of arguments for '{}'", name)
            }
            _ => format!("Error: unknown command '{}'", name),
        }
    }
}

fn flag(value: bool) -> String {
    if value { "1" } else { "0" }.to_string()
}
