use std::io::{self, Write};
use std::sync::Arc;

use ecow::{EcoString, eco_format};
use tracing::{debug, trace};

use crate::api::ExecutionOptions;
use crate::parser::{Span, StepOp};
use crate::values::{DeclaredType, Value, ValueKind};
use crate::vm::error::{ExecutionError, InternalError, RuntimeError};
use crate::vm::operators::{binary_op, compare_op};
use crate::vm::{Code, CommandHandler, Instruction};

/// Lifecycle of a [`Vm`]. Only a `Ready` VM can run; `Halted` and `Failed`
/// are terminal.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum VmState {
    Ready,
    Running,
    Halted,
    Failed,
}

/// Default limit on nested function calls.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 256;

/// Caller state saved by `Call` and restored by `Return`.
#[derive(Debug)]
struct Frame {
    return_ip: usize,
    locals_base: usize,
    stack_base: usize,
}

/// A single execution of a compiled program.
///
/// The VM shares the program's [`Code`] and owns everything else: operand
/// stack, locals, the registered host handler and the output sink. `'h` is
/// the lifetime of whatever the handler and the sink borrow.
///
/// Locals of every active call live in one vector; the running function sees
/// the slice starting at `locals_base`.
pub struct Vm<'h> {
    code: Arc<Code>,
    ip: usize,
    stack: Vec<Value>,
    locals: Vec<Value>,
    locals_base: usize,
    frames: Vec<Frame>,
    max_call_depth: usize,
    handler: Option<Box<dyn CommandHandler + 'h>>,
    output: Box<dyn Write + 'h>,
    error_marker: EcoString,
    state: VmState,
}

impl<'h> Vm<'h> {
    pub fn new(code: Arc<Code>) -> Self {
        Self::with_options(code, &ExecutionOptions::default())
    }

    pub fn with_options(code: Arc<Code>, options: &ExecutionOptions) -> Self {
        Vm {
            stack: Vec::with_capacity(code.max_stack_size),
            locals: vec![Value::Nil; code.num_locals],
            locals_base: 0,
            frames: Vec::new(),
            max_call_depth: options.max_call_depth,
            code,
            ip: 0,
            handler: None,
            output: Box::new(io::stdout()),
            error_marker: EcoString::from(options.error_marker.as_str()),
            state: VmState::Ready,
        }
    }

    pub fn code(&self) -> &Code {
        &self.code
    }

    pub fn state(&self) -> VmState {
        self.state
    }

    pub(crate) fn runs_code(&self, code: &Arc<Code>) -> bool {
        Arc::ptr_eq(&self.code, code)
    }

    /// Registers the host handler, replacing any previous one.
    pub fn set_command_handler(&mut self, handler: impl CommandHandler + 'h) {
        self.handler = Some(Box::new(handler));
    }

    pub fn clear_command_handler(&mut self) {
        self.handler = None;
    }

    pub fn has_command_handler(&self) -> bool {
        self.handler.is_some()
    }

    /// Redirects `print` output (stdout by default).
    pub fn set_output(&mut self, output: impl Write + 'h) {
        self.output = Box::new(output);
    }

    pub fn with_output(mut self, output: impl Write + 'h) -> Self {
        self.set_output(output);
        self
    }

    /// Runs the program until `Halt` or the first error.
    ///
    /// A VM runs at most once: afterwards it is `Halted` or `Failed` and every
    /// further call returns [`ExecutionError::Terminated`].
    pub fn run(&mut self) -> Result<(), ExecutionError> {
        if self.state != VmState::Ready {
            return Err(ExecutionError::Terminated);
        }
        self.state = VmState::Running;
        let result = self.execute();
        self.state = match result {
            Ok(()) => VmState::Halted,
            Err(_) => VmState::Failed,
        };
        result
    }

    fn execute(&mut self) -> Result<(), ExecutionError> {
        let code = Arc::clone(&self.code);
        loop {
            let ip = self.ip;
            let instruction = *code
                .instructions
                .get(ip)
                .ok_or(InternalError::IpOutOfRange { ip })?;
            self.ip += 1;
            trace!(ip, ?instruction, stack = self.stack.len(), "Executing");

            let span = || code.span_at(ip);

            use Instruction::*;
            match instruction {
                Halt => return Ok(()),
                ConstLoad(index) => {
                    let value = code
                        .constants
                        .get(index as usize)
                        .cloned()
                        .ok_or(InternalError::BadConstant { index, ip })?;
                    self.stack.push(value);
                }
                Pop => {
                    self.pop(ip)?;
                }
                LoadLocal(index) => {
                    let value = self
                        .locals
                        .get(self.locals_base + index as usize)
                        .cloned()
                        .ok_or(InternalError::BadLocal { index, ip })?;
                    self.stack.push(value);
                }
                StoreLocal(index) => {
                    let value = self.pop(ip)?;
                    let slot = self
                        .locals
                        .get_mut(self.locals_base + index as usize)
                        .ok_or(InternalError::BadLocal { index, ip })?;
                    *slot = value;
                }
                BinOp(op) => {
                    let right = self.pop(ip)?;
                    let left = self.pop(ip)?;
                    self.stack.push(binary_op(op, left, right, span)?);
                }
                CmpOp(op) => {
                    let right = self.pop(ip)?;
                    let left = self.pop(ip)?;
                    self.stack.push(compare_op(op, &left, &right, span)?);
                }
                Neg => match self.pop(ip)? {
                    Value::Number(n) => self.stack.push(Value::Number(-n)),
                    other => {
                        return Err(RuntimeError::InvalidOperand {
                            op: "-",
                            operand: other.kind(),
                            span: span(),
                        }
                        .into());
                    }
                },
                Not => match self.pop(ip)? {
                    Value::Bool(b) => self.stack.push(Value::Bool(!b)),
                    other => {
                        return Err(RuntimeError::InvalidOperand {
                            op: "!",
                            operand: other.kind(),
                            span: span(),
                        }
                        .into());
                    }
                },
                Step(op) => match self.pop(ip)? {
                    Value::Number(n) => {
                        let n = match op {
                            StepOp::Incr => n + 1.0,
                            StepOp::Decr => n - 1.0,
                        };
                        self.stack.push(Value::Number(n));
                    }
                    other => {
                        return Err(RuntimeError::InvalidOperand {
                            op: op.symbol(),
                            operand: other.kind(),
                            span: span(),
                        }
                        .into());
                    }
                },
                JumpForward(offset) => {
                    self.ip += offset as usize;
                }
                JumpBackward(offset) => {
                    self.ip = self
                        .ip
                        .checked_sub(offset as usize)
                        .ok_or(InternalError::IpOutOfRange { ip })?;
                }
                PopJumpIfFalse(offset) => {
                    let value = self.pop(ip)?;
                    if !expect_bool(&value, "condition", span)? {
                        self.ip += offset as usize;
                    }
                }
                JumpIfFalseOrPop(offset) => {
                    let value = self.peek(ip)?;
                    if expect_bool(value, "'&&'", span)? {
                        self.pop(ip)?;
                    } else {
                        self.ip += offset as usize;
                    }
                }
                JumpIfTrueOrPop(offset) => {
                    let value = self.peek(ip)?;
                    if expect_bool(value, "'||'", span)? {
                        self.ip += offset as usize;
                    } else {
                        self.pop(ip)?;
                    }
                }
                CheckType(ty) => {
                    let value = self.peek(ip)?;
                    if !ty.admits(value) {
                        return Err(RuntimeError::Annotation {
                            expected: ty,
                            found: describe_mismatch(ty, value),
                            span: span(),
                        }
                        .into());
                    }
                }
                Print => {
                    let value = self.pop(ip)?;
                    writeln!(self.output, "{}", value)
                        .and_then(|()| self.output.flush())
                        .map_err(|e| RuntimeError::Output {
                            message: e.to_string(),
                            span: span(),
                        })?;
                }
                HostCommand => {
                    let Some(handler) = self.handler.as_mut() else {
                        return Err(RuntimeError::HandlerNotSet { span: span() }.into());
                    };
                    let command = match self.stack.pop() {
                        Some(Value::Str(command)) => command,
                        Some(other) => {
                            return Err(RuntimeError::UnexpectedType {
                                context: "dkv",
                                expected: ValueKind::Str,
                                found: other.kind(),
                                span: span(),
                            }
                            .into());
                        }
                        None => return Err(InternalError::StackUnderflow { ip }.into()),
                    };
                    debug!(command = %command, "Dispatching host command");
                    let reply = handler.handle(&command);
                    debug!(reply = %reply, "Host command returned");
                    self.stack.push(Value::from(reply));
                }
                CallBuiltin(builtin) => {
                    let arg = self.pop(ip)?;
                    let result = builtin.call(arg, &self.error_marker, &span())?;
                    self.stack.push(result);
                }
                Call(index) => {
                    let function = code
                        .functions
                        .get(index as usize)
                        .ok_or(InternalError::BadFunction { index, ip })?;
                    if self.frames.len() >= self.max_call_depth {
                        return Err(RuntimeError::CallDepthExceeded {
                            max_depth: self.max_call_depth,
                            span: span(),
                        }
                        .into());
                    }
                    let args_start = self
                        .stack
                        .len()
                        .checked_sub(function.arity)
                        .ok_or(InternalError::StackUnderflow { ip })?;

                    self.frames.push(Frame {
                        return_ip: self.ip,
                        locals_base: self.locals_base,
                        stack_base: args_start,
                    });
                    self.locals_base = self.locals.len();
                    self.locals.extend(self.stack.drain(args_start..));
                    self.locals
                        .resize(self.locals_base + function.num_locals, Value::Nil);
                    self.ip = function.entry;
                    trace!(function = %function.name, depth = self.frames.len(), "Entering function");
                }
                Return => {
                    let result = self.pop(ip)?;
                    let frame = self
                        .frames
                        .pop()
                        .ok_or(InternalError::ReturnOutsideFunction { ip })?;
                    self.locals.truncate(self.locals_base);
                    self.stack.truncate(frame.stack_base);
                    self.locals_base = frame.locals_base;
                    self.ip = frame.return_ip;
                    self.stack.push(result);
                }
            }
        }
    }

    #[inline]
    fn pop(&mut self, ip: usize) -> Result<Value, InternalError> {
        self.stack.pop().ok_or(InternalError::StackUnderflow { ip })
    }

    #[inline]
    fn peek(&self, ip: usize) -> Result<&Value, InternalError> {
        self.stack.last().ok_or(InternalError::StackUnderflow { ip })
    }
}

impl core::fmt::Debug for Vm<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Vm")
            .field("ip", &self.ip)
            .field("state", &self.state)
            .field("stack", &self.stack)
            .field("locals", &self.locals)
            .field("call_depth", &self.frames.len())
            .field("has_handler", &self.handler.is_some())
            .finish_non_exhaustive()
    }
}

fn expect_bool(
    value: &Value,
    context: &'static str,
    span: impl FnOnce() -> Span,
) -> Result<bool, RuntimeError> {
    match value {
        Value::Bool(b) => Ok(*b),
        other => Err(RuntimeError::UnexpectedType {
            context,
            expected: ValueKind::Bool,
            found: other.kind(),
            span: span(),
        }),
    }
}

fn describe_mismatch(expected: DeclaredType, value: &Value) -> EcoString {
    match (expected, value) {
        (DeclaredType::Int, Value::Number(_)) => eco_format!("non-integral number {}", value),
        _ => eco_format!("{}", value.kind()),
    }
}
