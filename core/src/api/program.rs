//! Compiled programs.

use std::sync::Arc;

use super::{Error, ExecutionOptions};
use crate::vm::{Code, CommandHandler, Vm};

/// A compiled, immutable program.
///
/// Cloning is cheap and shares the bytecode. Each run happens on its own
/// [`Vm`]; VMs keep the bytecode alive, so a program may be dropped before
/// the VMs created from it.
#[derive(Debug, Clone)]
pub struct Program {
    code: Arc<Code>,
    source: Arc<str>,
    options: ExecutionOptions,
}

impl Program {
    pub(crate) fn new(code: Arc<Code>, source: Arc<str>, options: ExecutionOptions) -> Self {
        Self {
            code,
            source,
            options,
        }
    }

    pub fn code(&self) -> &Code {
        &self.code
    }

    pub fn shared_code(&self) -> Arc<Code> {
        Arc::clone(&self.code)
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Create a fresh VM for this program, with no handler and stdout output.
    pub fn vm<'h>(&self) -> Vm<'h> {
        Vm::with_options(Arc::clone(&self.code), &self.options)
    }

    /// Run on a fresh VM with no handler registered.
    pub fn run(&self) -> Result<(), Error> {
        self.run_vm(&mut self.vm())
    }

    /// Run on a fresh VM with `handler` answering host commands.
    pub fn run_with_handler(&self, handler: impl CommandHandler) -> Result<(), Error> {
        let mut vm = self.vm();
        vm.set_command_handler(handler);
        self.run_vm(&mut vm)
    }

    /// Run a VM created from this program, mapping failures to [`Error`].
    ///
    /// A VM created from another program is rejected with [`Error::Api`],
    /// since its error spans would not point into this program's source.
    pub fn run_vm(&self, vm: &mut Vm<'_>) -> Result<(), Error> {
        if !vm.runs_code(&self.code) {
            return Err(Error::Api(
                "VM was created from a different program".to_string(),
            ));
        }
        vm.run()
            .map_err(|e| Error::from_execution(e, Arc::clone(&self.source)))
    }
}
