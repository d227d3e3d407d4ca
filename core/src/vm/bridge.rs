//! Host command bridge.
//!
//! A VM holds at most one [`CommandHandler`]. Each `dkv(...)` call site hands
//! the command text to it and blocks until it replies. Replies are plain
//! strings; a reply starting with the error marker is still a successful
//! call as far as the VM is concerned.

/// Host-side receiver of script commands.
pub trait CommandHandler {
    fn handle(&mut self, command: &str) -> String;
}

impl<F> CommandHandler for F
where
    F: FnMut(&str) -> String,
{
    fn handle(&mut self, command: &str) -> String {
        self(command)
    }
}
