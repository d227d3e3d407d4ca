//! C ABI for embedding hosts.
//!
//! Mirrors `include/dkv_script.h`. Every entry point returns [`SUCCESS`] or
//! [`ERROR`]; details of a failure are logged with `tracing` and otherwise
//! dropped. Handles are boxed and tagged so that obviously foreign pointers
//! are rejected.
//!
//! Lifecycle:
//!
//! ```text
//! dkv_script_compile -> dkv_script_create_vm -> [set handler] -> dkv_script_run_vm
//!                     \-> dkv_script_free_compile_result    dkv_script_free_vm
//! ```
//!
//! A VM keeps its program alive, so the two handles may be freed in either
//! order.

use std::cell::{Cell, UnsafeCell};
use std::ffi::{CStr, CString, c_char, c_int, c_void};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::ptr;

use tracing::{debug, warn};

use crate::api::{Engine, Error, Program};
use crate::values::DEFAULT_ERROR_MARKER;
use crate::vm::{CommandHandler, Vm};

pub type ResultCode = c_int;
pub const SUCCESS: ResultCode = 0;
pub const ERROR: ResultCode = 1;

/// `char* (*)(const char* command, void* user_data)`
///
/// The returned buffer must come from the C allocator; it is freed with
/// `free` once copied.
pub type DkvCommandHandlerFn =
    Option<unsafe extern "C" fn(command: *const c_char, user_data: *mut c_void) -> *mut c_char>;

const COMPILE_RESULT_MAGIC: u32 = 0x444b_5643; // "DKVC"
const VM_MAGIC: u32 = 0x444b_5656; // "DKVV"

pub struct DkvScriptCompileResult {
    magic: u32,
    program: Program,
}

pub struct DkvScriptVM {
    magic: u32,
    running: Cell<bool>,
    program: Program,
    vm: UnsafeCell<Vm<'static>>,
}

struct ForeignHandler {
    func: unsafe extern "C" fn(*const c_char, *mut c_void) -> *mut c_char,
    user_data: *mut c_void,
}

impl CommandHandler for ForeignHandler {
    fn handle(&mut self, command: &str) -> String {
        let Ok(command) = CString::new(command) else {
            warn!("Host command contains an interior NUL");
            return format!("{} invalid command text", DEFAULT_ERROR_MARKER);
        };

        // SAFETY: the host promised a valid function pointer when registering it.
        let reply = unsafe { (self.func)(command.as_ptr(), self.user_data) };
        if reply.is_null() {
            warn!("Host command handler returned null");
            return format!("{} handler returned null", DEFAULT_ERROR_MARKER);
        }

        // SAFETY: non-null replies are NUL-terminated malloc'd buffers.
        let text = unsafe { CStr::from_ptr(reply) }.to_string_lossy().into_owned();
        unsafe { libc::free(reply.cast()) };
        text
    }
}

fn guarded(entry: &'static str, body: impl FnOnce() -> ResultCode) -> ResultCode {
    match catch_unwind(AssertUnwindSafe(body)) {
        Ok(code) => code,
        Err(_) => {
            warn!(entry, "Panic caught at the C boundary");
            ERROR
        }
    }
}

/// # Safety
///
/// `compile_result` must be null or a pointer this library handed out that
/// has not been freed.
unsafe fn compile_result_ref<'a>(
    compile_result: *const DkvScriptCompileResult,
) -> Option<&'a DkvScriptCompileResult> {
    let handle = unsafe { compile_result.as_ref() }?;
    (handle.magic == COMPILE_RESULT_MAGIC).then_some(handle)
}

/// # Safety
///
/// `vm` must be null or a pointer this library handed out that has not been
/// freed.
unsafe fn vm_ref<'a>(vm: *const DkvScriptVM) -> Option<&'a DkvScriptVM> {
    let handle = unsafe { vm.as_ref() }?;
    (handle.magic == VM_MAGIC).then_some(handle)
}

/// Compile a NUL-terminated UTF-8 script.
///
/// On ERROR `*result` is set to null.
///
/// # Safety
///
/// `source` must be null or a valid C string, `result` null or writable.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn dkv_script_compile(
    source: *const c_char,
    result: *mut *mut DkvScriptCompileResult,
) -> ResultCode {
    if result.is_null() {
        warn!("dkv_script_compile: null result pointer");
        return ERROR;
    }
    unsafe { *result = ptr::null_mut() };
    if source.is_null() {
        warn!("dkv_script_compile: null source");
        return ERROR;
    }

    guarded("dkv_script_compile", || {
        let Ok(source) = unsafe { CStr::from_ptr(source) }.to_str() else {
            warn!("dkv_script_compile: source is not valid UTF-8");
            return ERROR;
        };

        match Engine::default().compile(source) {
            Ok(program) => {
                let handle = Box::new(DkvScriptCompileResult {
                    magic: COMPILE_RESULT_MAGIC,
                    program,
                });
                unsafe { *result = Box::into_raw(handle) };
                SUCCESS
            }
            Err(err) => {
                log_error("dkv_script_compile", &err);
                ERROR
            }
        }
    })
}

/// Create a VM for a compiled program. The VM shares the program, which
/// stays alive until both handles are freed.
///
/// # Safety
///
/// `compile_result` must be null or a live compile result, `vm` null or
/// writable.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn dkv_script_create_vm(
    compile_result: *mut DkvScriptCompileResult,
    vm: *mut *mut DkvScriptVM,
) -> ResultCode {
    if vm.is_null() {
        warn!("dkv_script_create_vm: null vm pointer");
        return ERROR;
    }
    unsafe { *vm = ptr::null_mut() };

    let Some(compile_result) = (unsafe { compile_result_ref(compile_result) }) else {
        warn!("dkv_script_create_vm: null or invalid compile result");
        return ERROR;
    };

    let handle = Box::new(DkvScriptVM {
        magic: VM_MAGIC,
        running: Cell::new(false),
        program: compile_result.program.clone(),
        vm: UnsafeCell::new(compile_result.program.vm()),
    });
    unsafe { *vm = Box::into_raw(handle) };
    SUCCESS
}

/// Register (or, with a null `handler`, clear) the host command handler.
///
/// # Safety
///
/// `vm` must be null or a live VM. `handler` must stay callable with
/// `user_data` until it is replaced or the VM is freed.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn dkv_script_set_dkv_command_handler(
    vm: *mut DkvScriptVM,
    handler: DkvCommandHandlerFn,
    user_data: *mut c_void,
) -> ResultCode {
    let Some(handle) = (unsafe { vm_ref(vm) }) else {
        warn!("dkv_script_set_dkv_command_handler: null or invalid vm");
        return ERROR;
    };
    if handle.running.get() {
        warn!("dkv_script_set_dkv_command_handler: vm is running");
        return ERROR;
    }

    // SAFETY: not running, so nothing else borrows the VM.
    let vm = unsafe { &mut *handle.vm.get() };
    match handler {
        Some(func) => {
            debug!("Registered host command handler");
            vm.set_command_handler(ForeignHandler { func, user_data });
        }
        None => {
            debug!("Cleared host command handler");
            vm.clear_command_handler();
        }
    }
    SUCCESS
}

/// Run the VM to completion. A VM runs at most once.
///
/// # Safety
///
/// `vm` must be null or a live VM.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn dkv_script_run_vm(vm: *mut DkvScriptVM) -> ResultCode {
    let Some(handle) = (unsafe { vm_ref(vm) }) else {
        warn!("dkv_script_run_vm: null or invalid vm");
        return ERROR;
    };
    if handle.running.replace(true) {
        warn!("dkv_script_run_vm: reentrant run");
        return ERROR;
    }

    let code = guarded("dkv_script_run_vm", || {
        // SAFETY: `running` keeps any nested entry point away from the VM.
        let vm = unsafe { &mut *handle.vm.get() };
        match handle.program.run_vm(vm) {
            Ok(()) => SUCCESS,
            Err(err) => {
                log_error("dkv_script_run_vm", &err);
                ERROR
            }
        }
    });
    handle.running.set(false);
    code
}

/// # Safety
///
/// `result` must be null or a live compile result; it must not be used
/// afterwards.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn dkv_script_free_compile_result(result: *mut DkvScriptCompileResult) {
    if unsafe { compile_result_ref(result) }.is_some() {
        drop(unsafe { Box::from_raw(result) });
    }
}

/// # Safety
///
/// `vm` must be null or a live VM that is not running; it must not be used
/// afterwards.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn dkv_script_free_vm(vm: *mut DkvScriptVM) {
    if let Some(handle) = unsafe { vm_ref(vm) } {
        if handle.running.get() {
            warn!("dkv_script_free_vm: vm is running, leaking it");
            return;
        }
        drop(unsafe { Box::from_raw(vm) });
    }
}

fn log_error(entry: &'static str, err: &Error) {
    match err {
        Error::Compilation { diagnostics, .. } => {
            for diagnostic in diagnostics {
                warn!(entry, %diagnostic, "Compilation failed");
            }
        }
        _ => warn!(entry, error = %err, "Call failed"),
    }
}

#[cfg(test)]
#[path = "ffi_test.rs"]
mod ffi_test;
