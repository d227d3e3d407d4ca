use std::sync::Arc;

use pretty_assertions::assert_eq;

use crate::api::ExecutionOptions;
use crate::parser::{BinaryOp, ComparisonOp, Span, StepOp};
use crate::test_utils::init_test_logging;
use crate::values::{DeclaredType, Value, ValueKind};
use crate::vm::{
    Builtin, Code, ExecutionError, Function, Instruction, InternalError, RuntimeError, Vm,
    VmState,
};

use Instruction::*;

fn code(constants: Vec<Value>, instructions: Vec<Instruction>, num_locals: usize) -> Arc<Code> {
    code_with_functions(constants, instructions, num_locals, vec![])
}

fn code_with_functions(
    constants: Vec<Value>,
    instructions: Vec<Instruction>,
    num_locals: usize,
    functions: Vec<Function>,
) -> Arc<Code> {
    let spans = (0..instructions.len()).map(|i| Span::new(i, i + 1)).collect();
    Arc::new(Code {
        constants,
        instructions,
        spans,
        num_locals,
        max_stack_size: 8,
        functions,
    })
}

fn function(name: &str, arity: usize, entry: usize, num_locals: usize) -> Function {
    Function {
        name: name.into(),
        arity,
        entry,
        num_locals,
        max_stack_size: 8,
    }
}

fn run_capturing(code: Arc<Code>) -> (Result<(), ExecutionError>, String) {
    let mut out = Vec::new();
    let result = Vm::new(code).with_output(&mut out).run();
    (result, String::from_utf8(out).unwrap())
}

#[test]
fn test_print_constant() {
    init_test_logging();
    let code = code(vec![Value::str("Hello from DKV Script!")], vec![ConstLoad(0), Print, Halt], 0);
    let (result, out) = run_capturing(code);
    assert_eq!(result, Ok(()));
    assert_eq!(out, "Hello from DKV Script!\n");
}

#[test]
fn test_locals_and_arithmetic() {
    let code = code(
        vec![Value::Number(2.0), Value::Number(3.0)],
        vec![
            ConstLoad(0),
            StoreLocal(0),
            LoadLocal(0),
            ConstLoad(1),
            BinOp(BinaryOp::Mul),
            Print,
            LoadLocal(1),
            Print,
            Halt,
        ],
        2,
    );
    let (result, out) = run_capturing(code);
    assert_eq!(result, Ok(()));
    assert_eq!(out, "6\nnil\n");
}

#[test]
fn test_state_transitions() {
    let mut out = Vec::new();
    let mut vm = Vm::new(code(vec![], vec![Halt], 0)).with_output(&mut out);
    assert_eq!(vm.state(), VmState::Ready);
    assert_eq!(vm.run(), Ok(()));
    assert_eq!(vm.state(), VmState::Halted);
    assert_eq!(vm.run(), Err(ExecutionError::Terminated));
    assert_eq!(vm.state(), VmState::Halted);
}

#[test]
fn test_failed_vm_is_terminal() {
    let mut vm = Vm::new(code(vec![], vec![HostCommand, Halt], 0));
    let err = vm.run().unwrap_err();
    assert_eq!(
        err,
        ExecutionError::Runtime(RuntimeError::HandlerNotSet {
            span: Span::new(0, 1)
        })
    );
    assert_eq!(err.to_string(), "handler not set");
    assert_eq!(vm.state(), VmState::Failed);
    assert_eq!(vm.run(), Err(ExecutionError::Terminated));
}

#[test]
fn test_host_command_roundtrip() {
    init_test_logging();
    let mut seen = Vec::new();
    let mut out = Vec::new();
    {
        let mut vm = Vm::new(code(
            vec![Value::str("GET a"), Value::str("GET b")],
            vec![ConstLoad(0), HostCommand, Print, ConstLoad(1), HostCommand, Print, Halt],
            0,
        ))
        .with_output(&mut out);
        vm.set_command_handler(|command: &str| {
            seen.push(command.to_string());
            format!("reply to {}", command)
        });
        assert_eq!(vm.run(), Ok(()));
    }
    assert_eq!(seen, vec!["GET a", "GET b"]);
    assert_eq!(String::from_utf8(out).unwrap(), "reply to GET a\nreply to GET b\n");
}

#[test]
fn test_last_handler_wins_and_clear() {
    let program = code(vec![Value::str("PING")], vec![ConstLoad(0), HostCommand, Print, Halt], 0);

    let mut out = Vec::new();
    let mut vm = Vm::new(program.clone()).with_output(&mut out);
    vm.set_command_handler(|_: &str| "first".to_string());
    vm.set_command_handler(|_: &str| "second".to_string());
    assert!(vm.has_command_handler());
    vm.run().unwrap();
    drop(vm);
    assert_eq!(String::from_utf8(out).unwrap(), "second\n");

    let mut vm = Vm::new(program);
    vm.set_command_handler(|_: &str| "unused".to_string());
    vm.clear_command_handler();
    assert!(matches!(
        vm.run(),
        Err(ExecutionError::Runtime(RuntimeError::HandlerNotSet { .. }))
    ));
}

#[test]
fn test_host_command_requires_string() {
    let mut vm = Vm::new(code(vec![Value::Number(1.0)], vec![ConstLoad(0), HostCommand, Halt], 0));
    vm.set_command_handler(|_: &str| "OK".to_string());
    assert_eq!(
        vm.run(),
        Err(ExecutionError::Runtime(RuntimeError::UnexpectedType {
            context: "dkv",
            expected: ValueKind::Str,
            found: ValueKind::Number,
            span: Span::new(1, 2),
        }))
    );
}

#[test]
fn test_error_marker_is_configurable() {
    let options = ExecutionOptions {
        error_marker: "ERR".to_string(),
        ..Default::default()
    };
    let mut out = Vec::new();
    let mut vm = Vm::with_options(
        code(
            vec![Value::str("ERR no such key")],
            vec![ConstLoad(0), CallBuiltin(Builtin::IsError), Print, Halt],
            0,
        ),
        &options,
    )
    .with_output(&mut out);
    vm.run().unwrap();
    drop(vm);
    assert_eq!(String::from_utf8(out).unwrap(), "true\n");
}

#[test]
fn test_check_type() {
    let (result, _) = run_capturing(code(
        vec![Value::Number(2.5)],
        vec![ConstLoad(0), CheckType(DeclaredType::Int), Halt],
        0,
    ));
    let err = result.unwrap_err();
    assert_eq!(
        err.to_string(),
        "type mismatch: expected int, found non-integral number 2.5"
    );
    assert_eq!(err.span(), Some(&Span::new(1, 2)));

    let (result, _) = run_capturing(code(
        vec![Value::Number(2.0)],
        vec![ConstLoad(0), CheckType(DeclaredType::Int), Pop, Halt],
        0,
    ));
    assert_eq!(result, Ok(()));
}

#[test]
fn test_short_circuit_jumps() {
    // false && <never evaluated>
    let (result, out) = run_capturing(code(
        vec![Value::Bool(false), Value::str("boom")],
        vec![ConstLoad(0), JumpIfFalseOrPop(2), ConstLoad(1), Neg, Print, Halt],
        0,
    ));
    assert_eq!(result, Ok(()));
    assert_eq!(out, "false\n");

    // true || <never evaluated>
    let (result, out) = run_capturing(code(
        vec![Value::Bool(true), Value::str("boom")],
        vec![ConstLoad(0), JumpIfTrueOrPop(2), ConstLoad(1), Neg, Print, Halt],
        0,
    ));
    assert_eq!(result, Ok(()));
    assert_eq!(out, "true\n");
}

#[test]
fn test_condition_must_be_bool() {
    let (result, _) = run_capturing(code(
        vec![Value::Number(1.0)],
        vec![ConstLoad(0), PopJumpIfFalse(0), Halt],
        0,
    ));
    assert_eq!(
        result.unwrap_err().to_string(),
        "type mismatch: condition expects bool, found number"
    );
}

#[test]
fn test_internal_errors() {
    let (result, _) = run_capturing(code(vec![], vec![Pop, Halt], 0));
    assert_eq!(
        result,
        Err(ExecutionError::Internal(InternalError::StackUnderflow { ip: 0 }))
    );

    let (result, _) = run_capturing(code(vec![], vec![ConstLoad(3), Halt], 0));
    assert_eq!(
        result,
        Err(ExecutionError::Internal(InternalError::BadConstant { index: 3, ip: 0 }))
    );

    let (result, _) = run_capturing(code(vec![], vec![LoadLocal(0), Halt], 0));
    assert_eq!(
        result,
        Err(ExecutionError::Internal(InternalError::BadLocal { index: 0, ip: 0 }))
    );

    let (result, _) = run_capturing(code(vec![], vec![JumpForward(5)], 0));
    assert_eq!(
        result,
        Err(ExecutionError::Internal(InternalError::IpOutOfRange { ip: 6 }))
    );

    let (result, _) = run_capturing(code(vec![], vec![Call(2), Halt], 0));
    assert_eq!(
        result,
        Err(ExecutionError::Internal(InternalError::BadFunction { index: 2, ip: 0 }))
    );

    let (result, _) = run_capturing(code(vec![Value::Nil], vec![ConstLoad(0), Return], 0));
    assert_eq!(
        result,
        Err(ExecutionError::Internal(InternalError::ReturnOutsideFunction { ip: 1 }))
    );
}

#[test]
fn test_step() {
    let (result, out) = run_capturing(code(
        vec![Value::Number(41.0)],
        vec![ConstLoad(0), Step(StepOp::Incr), Print, ConstLoad(0), Step(StepOp::Decr), Print, Halt],
        0,
    ));
    assert_eq!(result, Ok(()));
    assert_eq!(out, "42\n40\n");

    let (result, _) = run_capturing(code(
        vec![Value::str("a")],
        vec![ConstLoad(0), Step(StepOp::Incr), Halt],
        0,
    ));
    assert_eq!(
        result,
        Err(ExecutionError::Runtime(RuntimeError::InvalidOperand {
            op: "++",
            operand: ValueKind::Str,
            span: Span::new(1, 2),
        }))
    );
}

#[test]
fn test_call_and_return() {
    init_test_logging();
    // local0 = 10; print(sub(local0, 3)); print(local0)
    // fn sub(a, b) { let c = a - b; return c; }
    let code = code_with_functions(
        vec![Value::Number(10.0), Value::Number(3.0)],
        vec![
            ConstLoad(0),
            StoreLocal(0),
            LoadLocal(0),
            ConstLoad(1),
            Call(0),
            Print,
            LoadLocal(0),
            Print,
            Halt,
            // sub
            LoadLocal(0),
            LoadLocal(1),
            BinOp(BinaryOp::Sub),
            StoreLocal(2),
            LoadLocal(2),
            Return,
        ],
        1,
        vec![function("sub", 2, 9, 3)],
    );
    let (result, out) = run_capturing(code);
    assert_eq!(result, Ok(()));
    assert_eq!(out, "7\n10\n");
}

#[test]
fn test_return_discards_callee_stack() {
    // The callee leaves an extra operand below its result.
    let code = code_with_functions(
        vec![Value::str("junk"), Value::str("result"), Value::str("below")],
        vec![
            ConstLoad(2),
            Call(0),
            Print,
            Print,
            Halt,
            ConstLoad(0),
            ConstLoad(1),
            Return,
        ],
        0,
        vec![function("f", 0, 5, 0)],
    );
    let (result, out) = run_capturing(code);
    assert_eq!(result, Ok(()));
    assert_eq!(out, "result\nbelow\n");
}

#[test]
fn test_recursion_depth_is_limited() {
    // fn down(n) { return down(n - 1); }
    let code = code_with_functions(
        vec![Value::Number(0.0), Value::Number(1.0)],
        vec![
            ConstLoad(0),
            Call(0),
            Halt,
            LoadLocal(0),
            ConstLoad(1),
            BinOp(BinaryOp::Sub),
            Call(0),
            Return,
        ],
        0,
        vec![function("down", 1, 3, 1)],
    );
    let options = ExecutionOptions {
        max_call_depth: 10,
        ..Default::default()
    };
    let mut vm = Vm::with_options(code, &options);
    assert_eq!(
        vm.run(),
        Err(ExecutionError::Runtime(RuntimeError::CallDepthExceeded {
            max_depth: 10,
            span: Span::new(6, 7),
        }))
    );
    assert_eq!(vm.state(), VmState::Failed);
}

#[test]
fn test_recursive_calls_keep_separate_locals() {
    // fn count(n) { if n > 0 { count(n - 1); } print(n); return nil; }
    let code = code_with_functions(
        vec![Value::Number(3.0), Value::Number(0.0), Value::Number(1.0), Value::Nil],
        vec![
            ConstLoad(0),
            Call(0),
            Pop,
            Halt,
            LoadLocal(0),
            ConstLoad(1),
            CmpOp(ComparisonOp::Gt),
            PopJumpIfFalse(5),
            LoadLocal(0),
            ConstLoad(2),
            BinOp(BinaryOp::Sub),
            Call(0),
            Pop,
            LoadLocal(0),
            Print,
            ConstLoad(3),
            Return,
        ],
        0,
        vec![function("count", 1, 4, 1)],
    );
    let (result, out) = run_capturing(code);
    assert_eq!(result, Ok(()));
    assert_eq!(out, "0\n1\n2\n3\n");
}

#[test]
fn test_output_failure() {
    struct Broken;
    impl std::io::Write for Broken {
        fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::other("pipe closed"))
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    let mut vm = Vm::new(code(vec![Value::Nil], vec![ConstLoad(0), Print, Halt], 0)).with_output(Broken);
    assert!(matches!(
        vm.run(),
        Err(ExecutionError::Runtime(RuntimeError::Output { .. }))
    ));
}
