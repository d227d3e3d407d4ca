//! DKV Script VM Instructions
//!
//! This module defines the instruction set for the stack-based virtual machine.
//!
//! # Operands
//!
//! Indices into the constant pool and the locals table, as well as jump
//! offsets, are `u32`. The compiler refuses programs that would overflow them.
//!
//! # Jumps
//!
//! Jump offsets are relative to the NEXT instruction and counted in
//! instructions:
//! - forward jumps land on `addr + 1 + offset`;
//! - backward jumps land on `addr + 1 - offset`.
//!
//! # Stack Discipline
//!
//! Stack effect notation: `[..., operand1, operand2] -> [..., result]`

use core::fmt;

use crate::parser::{BinaryOp, ComparisonOp, StepOp};
use crate::values::DeclaredType;
use crate::vm::Builtin;

/// A single VM instruction.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    // ========================================================================
    // Special
    // ========================================================================
    /// Halt execution
    /// Stack: [...] -> [...]
    Halt,

    // ========================================================================
    // Stack, Constants & Locals
    // ========================================================================
    /// Push constant from pool
    /// Operand: u32 index | Stack: [...] -> [..., value]
    ConstLoad(u32),

    /// Pop top value
    /// Stack: [..., a] -> [...]
    Pop,

    /// Load local variable
    /// Operand: u32 index | Stack: [...] -> [..., value]
    LoadLocal(u32),

    /// Store to local variable
    /// Operand: u32 index | Stack: [..., value] -> [...]
    StoreLocal(u32),

    // ========================================================================
    // Arithmetic & Comparison
    // ========================================================================
    /// Binary arithmetic operation.
    ///
    /// `+` adds two Numbers, or concatenates when either side is a String.
    /// The others require two Numbers. `/` and `%` fail on a zero divisor.
    ///
    /// Stack: [..., a, b] -> [..., result]
    BinOp(BinaryOp),

    /// Comparison operation
    /// Stack: [..., a, b] -> [..., result: Bool]
    CmpOp(ComparisonOp),

    /// Numeric negation: -a
    /// Stack: [..., a: Number] -> [..., -a: Number]
    Neg,

    /// Logical NOT: !a
    /// Stack: [..., a: Bool] -> [..., !a: Bool]
    Not,

    /// Add or subtract one (`x++`, `x--`)
    /// Stack: [..., a: Number] -> [..., a ± 1: Number]
    Step(StepOp),

    // ========================================================================
    // Control Flow
    // ========================================================================
    /// Unconditional forward jump
    /// Operand: u32 offset | Stack: [...] -> [...]
    JumpForward(u32),

    /// Unconditional backward jump (loops)
    /// Operand: u32 offset | Stack: [...] -> [...]
    JumpBackward(u32),

    /// Pop and jump forward if false
    /// Operand: u32 offset | Stack: [..., cond: Bool] -> [...]
    PopJumpIfFalse(u32),

    /// Jump forward keeping the condition if false, otherwise pop it (`&&`)
    /// Operand: u32 offset | Stack: [..., cond: Bool] -> [..., cond] or [...]
    JumpIfFalseOrPop(u32),

    /// Jump forward keeping the condition if true, otherwise pop it (`||`)
    /// Operand: u32 offset | Stack: [..., cond: Bool] -> [..., cond] or [...]
    JumpIfTrueOrPop(u32),

    // ========================================================================
    // Checks, Output & Calls
    // ========================================================================
    /// Verify that the top value has the declared type, leaving it in place.
    /// Stack: [..., a] -> [..., a]
    CheckType(DeclaredType),

    /// Write the canonical string form of the top value as one output line
    /// Stack: [..., a] -> [...]
    Print,

    /// Dispatch a command to the registered host handler
    /// Stack: [..., command: String] -> [..., reply: String]
    HostCommand,

    /// Call a builtin function with its fixed arity
    /// Stack: [..., a1, ..., aN] -> [..., result]
    CallBuiltin(Builtin),

    /// Call a declared function. The arguments become the first locals of a
    /// new frame and execution continues at the function's entry.
    /// Operand: u32 function index | Stack: [..., a1, ..., aN] -> [..., result] on return
    Call(u32),

    /// Leave the current function, discarding its frame.
    /// Stack: [..., result] -> caller's [..., result]
    Return,
}

impl Instruction {
    /// Check if this instruction can fail with a runtime error
    pub const fn can_error(&self) -> bool {
        !matches!(
            self,
            Self::Halt
                | Self::ConstLoad(_)
                | Self::Pop
                | Self::LoadLocal(_)
                | Self::StoreLocal(_)
                | Self::CmpOp(ComparisonOp::Eq)
                | Self::CmpOp(ComparisonOp::Neq)
                | Self::JumpForward(_)
                | Self::JumpBackward(_)
                | Self::Return
        )
    }

    /// Check if this is a control flow instruction
    pub const fn is_control_flow(&self) -> bool {
        matches!(
            self,
            Self::Halt
                | Self::JumpForward(_)
                | Self::JumpBackward(_)
                | Self::PopJumpIfFalse(_)
                | Self::JumpIfFalseOrPop(_)
                | Self::JumpIfTrueOrPop(_)
                | Self::Call(_)
                | Self::Return
        )
    }

    /// Absolute target of a jump located at `addr`, if this is a jump.
    pub fn jump_target(&self, addr: usize) -> Option<usize> {
        match *self {
            Self::JumpForward(offset)
            | Self::PopJumpIfFalse(offset)
            | Self::JumpIfFalseOrPop(offset)
            | Self::JumpIfTrueOrPop(offset) => Some(addr + 1 + offset as usize),
            Self::JumpBackward(offset) => (addr + 1).checked_sub(offset as usize),
            _ => None,
        }
    }
}

impl fmt::Debug for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Operators - show the source symbol
            Self::BinOp(op) => write!(f, "BinOp({})", op),
            Self::CmpOp(op) => write!(f, "CmpOp({})", op),

            Self::Halt => write!(f, "Halt"),
            Self::ConstLoad(idx) => write!(f, "ConstLoad({})", idx),
            Self::Pop => write!(f, "Pop"),
            Self::LoadLocal(idx) => write!(f, "LoadLocal({})", idx),
            Self::StoreLocal(idx) => write!(f, "StoreLocal({})", idx),
            Self::Neg => write!(f, "Neg"),
            Self::Not => write!(f, "Not"),
            Self::Step(op) => write!(f, "Step({})", op),
            Self::JumpForward(offset) => write!(f, "JumpForward({})", offset),
            Self::JumpBackward(offset) => write!(f, "JumpBackward({})", offset),
            Self::PopJumpIfFalse(offset) => write!(f, "PopJumpIfFalse({})", offset),
            Self::JumpIfFalseOrPop(offset) => write!(f, "JumpIfFalseOrPop({})", offset),
            Self::JumpIfTrueOrPop(offset) => write!(f, "JumpIfTrueOrPop({})", offset),
            Self::CheckType(ty) => write!(f, "CheckType({})", ty),
            Self::Print => write!(f, "Print"),
            Self::HostCommand => write!(f, "HostCommand"),
            Self::CallBuiltin(builtin) => write!(f, "CallBuiltin({})", builtin.name()),
            Self::Call(index) => write!(f, "Call({})", index),
            Self::Return => write!(f, "Return"),
        }
    }
}
