use std::thread;

use pretty_assertions::assert_eq;

use crate::api::{
    CompilationOptions, Engine, EngineOptions, Error, ExecutionOptions, Severity,
};
use crate::vm::VmState;

fn run_to_string(engine: &Engine, source: &str) -> Result<String, Error> {
    let program = engine.compile(source)?;
    let mut out = Vec::new();
    let mut vm = program.vm().with_output(&mut out);
    let result = program.run_vm(&mut vm);
    drop(vm);
    result.map(|()| String::from_utf8(out).unwrap())
}

#[test]
fn test_compile_and_run() {
    let engine = Engine::default();
    assert_eq!(
        run_to_string(&engine, "let a = 20; print(a + 22);").unwrap(),
        "42\n"
    );
}

#[test]
fn test_parse_error_becomes_compilation_error() {
    let engine = Engine::default();
    let err = engine.compile("print(\"unterminated);").unwrap_err();

    let Error::Compilation { diagnostics, source } = &err else {
        panic!("Expected compilation error, got {:?}", err);
    };
    assert_eq!(&**source, "print(\"unterminated);");
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].severity, Severity::Error);
    assert_eq!(diagnostics[0].code.as_deref(), Some("P002"));
    assert_eq!(diagnostics[0].message, "Unclosed delimiter '\"'");
    assert_eq!(err.to_string(), "Compilation failed with 1 error(s)");
}

#[test]
fn test_static_error_becomes_compilation_error() {
    let engine = Engine::default();
    let err = engine.compile("print(missing);").unwrap_err();
    assert_eq!(err.diagnostics()[0].code.as_deref(), Some("C001"));
}

#[test]
fn test_nesting_limit_comes_from_options() {
    let engine = Engine::new(EngineOptions {
        compilation: CompilationOptions { max_nesting_depth: 3 },
        ..Default::default()
    });
    assert!(engine.compile("print(((1)));").is_ok());
    let err = engine.compile("print((((1))));").unwrap_err();
    assert_eq!(err.diagnostics()[0].code.as_deref(), Some("P004"));
}

#[test]
fn test_runtime_error() {
    let engine = Engine::default();
    let err = run_to_string(&engine, "let x = 1;\nprint(x / 0);").unwrap_err();

    let Error::Runtime { diagnostic, .. } = &err else {
        panic!("Expected runtime error, got {:?}", err);
    };
    assert_eq!(diagnostic.message, "division by zero");
    assert_eq!((diagnostic.line, diagnostic.column), (2, 7));
    assert_eq!(err.to_string(), "Runtime error: division by zero at 2:7");
}

#[test]
fn test_run_with_handler() {
    let engine = Engine::default();
    let program = engine.compile(r#"dkv("SET a 1"); dkv("GET a");"#).unwrap();

    let mut seen = Vec::new();
    program
        .run_with_handler(|command: &str| {
            seen.push(command.to_string());
            "OK".to_string()
        })
        .unwrap();
    assert_eq!(seen, vec!["SET a 1", "GET a"]);

    let err = program.run().unwrap_err();
    assert!(matches!(&err, Error::Runtime { diagnostic, .. } if diagnostic.message == "handler not set"));
}

#[test]
fn test_rerun_is_an_api_error() {
    let program = Engine::default().compile("print(1);").unwrap();
    let mut out = Vec::new();
    let mut vm = program.vm().with_output(&mut out);
    program.run_vm(&mut vm).unwrap();
    assert_eq!(vm.state(), VmState::Halted);

    let err = program.run_vm(&mut vm).unwrap_err();
    assert!(matches!(err, Error::Api(_)));
}

#[test]
fn test_vm_from_another_program_is_rejected() {
    let engine = Engine::default();
    let first = engine.compile("print(1);").unwrap();
    let second = engine.compile("print(2);").unwrap();

    let mut vm = first.vm();
    let err = second.run_vm(&mut vm).unwrap_err();
    assert_eq!(
        err.to_string(),
        "API error: VM was created from a different program"
    );
    assert_eq!(vm.state(), VmState::Ready);

    // Clones share the bytecode, so they accept each other's VMs.
    let mut out = Vec::new();
    let mut vm = first.vm().with_output(&mut out);
    first.clone().run_vm(&mut vm).unwrap();
    drop(vm);
    assert_eq!(String::from_utf8(out).unwrap(), "1\n");
}

#[test]
fn test_error_marker_from_options() {
    let engine = Engine::new(EngineOptions {
        execution: ExecutionOptions {
            error_marker: "ERR".to_string(),
            ..Default::default()
        },
        ..Default::default()
    });
    let program = engine
        .compile(r#"print(is_error(dkv("GET a"))); print(is_error("Error: x"));"#)
        .unwrap();

    let mut out = Vec::new();
    let mut vm = program.vm().with_output(&mut out);
    vm.set_command_handler(|_: &str| "ERR missing".to_string());
    program.run_vm(&mut vm).unwrap();
    drop(vm);
    assert_eq!(String::from_utf8(out).unwrap(), "true\nfalse\n");
}

#[test]
fn test_vm_keeps_code_alive() {
    let program = Engine::default().compile("print(1);").unwrap();
    let vm = program.vm();
    drop(program);
    assert_eq!(vm.state(), VmState::Ready);
    assert_eq!(vm.code().instructions.len(), 3);
}

#[test]
fn test_vms_on_separate_threads() {
    let program = Engine::default()
        .compile("let i = 0; while i < 100 { i = i + 1; } print(i);")
        .unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let program = program.clone();
            thread::spawn(move || {
                let mut out = Vec::new();
                let mut vm = program.vm().with_output(&mut out);
                program.run_vm(&mut vm).unwrap();
                drop(vm);
                String::from_utf8(out).unwrap()
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), "100\n");
    }
}
