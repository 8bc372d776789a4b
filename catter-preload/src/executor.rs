// SPDX-License-Identifier: GPL-3.0-or-later

//! The state machine every hook runs: validate the session, resolve the
//! executable, build the replacement command, inject the environment,
//! best-effort record, and invoke — a single routine every hook shares,
//! since every hook here routes through the proxy instead of calling libc
//! straight through.

use std::ffi::CStr;
use std::os::raw::c_char;
use std::path::Path;

use crate::buffer::Buffer;
use crate::command;
use crate::envinject;
use crate::error::HookError;
use crate::resolver::{self, ResolveError};
use crate::session::Session;

static EXE_SCRATCH: Buffer = Buffer::new();

/// Argument vectors wider than this are rejected with `BufferOverflow`
/// rather than truncated, matching the variadic C shim's own bound.
const MAX_TAIL_ARGS: usize = 256;

/// Stack storage for the `posix_spawn` path: an on-stack buffer rather
/// than the shared static arena, since
/// `posix_spawn` returns control to the caller instead of replacing the
/// process image. The caller (a hook in `hooks.rs`) declares one of these
/// as a local variable, so its lifetime spans exactly one intercepted call.
pub struct SpawnStorage {
    tail: [*const c_char; MAX_TAIL_ARGS],
    /// Holds only the resolved executable path's bytes, kept separate from
    /// `argv_diag` so `command::proxy_command_stack`/`error_command_stack`
    /// (which open their own fresh cursor over `argv_diag`) can't clobber it.
    exe_bytes: [u8; PATH_MAX_BYTES],
    argv_diag: [u8; command::MAX_SPAWN_DIAG_BYTES],
    argv_ptrs: [*const c_char; command::MAX_SPAWN_ARGV],
    env_bytes: [u8; envinject::MAX_STACK_ENV_BYTES],
    env_ptrs: [*const c_char; envinject::MAX_STACK_ENV_PTRS],
}

/// A few bytes over `libc::PATH_MAX` to comfortably hold one resolved path
/// plus its NUL terminator.
const PATH_MAX_BYTES: usize = 4096;

impl SpawnStorage {
    pub fn new() -> Self {
        SpawnStorage {
            tail: [std::ptr::null(); MAX_TAIL_ARGS],
            exe_bytes: [0u8; PATH_MAX_BYTES],
            argv_diag: [0u8; command::MAX_SPAWN_DIAG_BYTES],
            argv_ptrs: [std::ptr::null(); command::MAX_SPAWN_ARGV],
            env_bytes: [0u8; envinject::MAX_STACK_ENV_BYTES],
            env_ptrs: [std::ptr::null(); envinject::MAX_STACK_ENV_PTRS],
        }
    }
}

impl Default for SpawnStorage {
    fn default() -> Self {
        Self::new()
    }
}

/// The outcome of running the state machine: either the process image
/// should be replaced (`exe`, `argv`, `envp` to hand to the real
/// underlying `execve`), or the call should fail with the given error.
pub struct Plan {
    pub exe: *const c_char,
    pub argv: *const *const c_char,
    pub envp: *const *const c_char,
}

/// Runs the full validate/resolve/build/inject/record/invoke pipeline for
/// an `execve`-shaped call.
///
/// `file` is the command as the caller spelled it (may be a bare name, a
/// relative path, or absolute); `argv` is the caller's intended argument
/// vector (including `argv[0]`); `envp` is the caller's intended
/// environment. `use_path_search` distinguishes `execv`/`execve` (no
/// search) from `execvp`/`execvpe` (search `PATH`).
///
/// # Safety
/// `file` must be a valid, NUL-terminated C string. `argv` and `envp` must
/// be valid, null-terminated arrays of valid, NUL-terminated C strings.
pub unsafe fn plan_exec(
    file: *const c_char,
    argv: *const *const c_char,
    envp: *const *const c_char,
    use_path_search: bool,
    self_lib_path: *const c_char,
) -> Result<Plan, HookError> {
    if file.is_null() || argv.is_null() {
        return Err(HookError::InvalidArgument);
    }

    let session = crate::session::current();
    if !session.can_report() {
        return Err(HookError::InvalidSession);
    }

    let requested = unsafe { CStr::from_ptr(file) };
    let requested_path = Path::new(requested.to_str().map_err(|_| HookError::InvalidArgument)?);

    let mut tail_storage: [*const c_char; MAX_TAIL_ARGS] = [std::ptr::null(); MAX_TAIL_ARGS];
    let argv_tail = unsafe { collect_tail(argv, &mut tail_storage) }.ok_or(HookError::BufferOverflow)?;

    let mut error_message: Option<&'static str> = None;
    let (exe, built_argv) = if !session.is_valid() {
        error_message = Some(INVALID_SESSION_MESSAGE);
        build_invalid_session_invocation(session, requested_path, argv_tail)?
    } else {
        let path_var = unsafe { path_env_value(envp) };
        let resolution = if use_path_search {
            resolver::from_path(requested_path, path_var.as_deref())
        } else {
            resolver::from_current_directory(requested_path)
        };
        match resolution {
            Ok(resolved) => build_proxy_invocation(session, &resolved, argv_tail)?,
            Err(err) => {
                error_message = Some(resolve_error_message(err));
                build_error_invocation(session, err, requested_path, argv_tail)?
            }
        }
    };

    let injected_envp = unsafe { envinject::build(envp, session, self_lib_path) }
        .ok_or(HookError::BufferOverflow)?;

    record(requested_path, argv_tail, error_message);

    Ok(Plan { exe, argv: built_argv, envp: injected_envp })
}

/// Runs the same pipeline as `plan_exec` for `execvP`, which searches an
/// explicit colon-separated `search_path` given by the caller rather than
/// the process's own `PATH`, plumbing it straight to
/// `resolver::from_search_path` instead of reading the environment.
///
/// # Safety
/// Same contract as `plan_exec`; `search_path` must additionally be a
/// valid, NUL-terminated C string.
pub unsafe fn plan_exec_searched(
    file: *const c_char,
    search_path: *const c_char,
    argv: *const *const c_char,
    envp: *const *const c_char,
    self_lib_path: *const c_char,
) -> Result<Plan, HookError> {
    if file.is_null() || argv.is_null() || search_path.is_null() {
        return Err(HookError::InvalidArgument);
    }

    let session = crate::session::current();
    if !session.can_report() {
        return Err(HookError::InvalidSession);
    }

    let requested = unsafe { CStr::from_ptr(file) };
    let requested_path = Path::new(requested.to_str().map_err(|_| HookError::InvalidArgument)?);
    let search = unsafe { CStr::from_ptr(search_path) }.to_str().map_err(|_| HookError::InvalidArgument)?;

    let mut tail_storage: [*const c_char; MAX_TAIL_ARGS] = [std::ptr::null(); MAX_TAIL_ARGS];
    let argv_tail = unsafe { collect_tail(argv, &mut tail_storage) }.ok_or(HookError::BufferOverflow)?;

    let mut error_message: Option<&'static str> = None;
    let (exe, built_argv) = if !session.is_valid() {
        error_message = Some(INVALID_SESSION_MESSAGE);
        build_invalid_session_invocation(session, requested_path, argv_tail)?
    } else {
        match resolver::from_search_path(requested_path, search) {
            Ok(resolved) => build_proxy_invocation(session, &resolved, argv_tail)?,
            Err(err) => {
                error_message = Some(resolve_error_message(err));
                build_error_invocation(session, err, requested_path, argv_tail)?
            }
        }
    };

    let injected_envp = unsafe { envinject::build(envp, session, self_lib_path) }
        .ok_or(HookError::BufferOverflow)?;

    record(requested_path, argv_tail, error_message);

    Ok(Plan { exe, argv: built_argv, envp: injected_envp })
}

/// Runs the same validate/resolve/build/inject/record/invoke pipeline for a
/// `posix_spawn`/`posix_spawnp`-shaped call. Identical in shape to
/// `plan_exec`, but every scratch write lands in the caller-owned `storage`
/// instead of the shared static arenas.
///
/// # Safety
/// Same contract as `plan_exec`.
pub unsafe fn plan_posix_spawn(
    file: *const c_char,
    argv: *const *const c_char,
    envp: *const *const c_char,
    use_path_search: bool,
    self_lib_path: *const c_char,
    storage: &mut SpawnStorage,
) -> Result<Plan, HookError> {
    if file.is_null() || argv.is_null() {
        return Err(HookError::InvalidArgument);
    }

    let session = crate::session::current();
    if !session.can_report() {
        return Err(HookError::InvalidSession);
    }

    let requested = unsafe { CStr::from_ptr(file) };
    let requested_path = Path::new(requested.to_str().map_err(|_| HookError::InvalidArgument)?);

    let argv_tail = unsafe { collect_tail(argv, &mut storage.tail) }.ok_or(HookError::BufferOverflow)?;

    // Resolve the exe path before touching `storage.argv_diag`/`argv_ptrs`:
    // the no-allocator constructors below borrow those fields mutably, and
    // `resolved`/`display` must outlive that borrow.
    let resolved_exe;
    let error_message: Option<&str>;
    if !session.is_valid() {
        resolved_exe = None;
        error_message = Some(INVALID_SESSION_MESSAGE);
    } else {
        let path_var = unsafe { path_env_value(envp) };
        let resolution = if use_path_search {
            resolver::from_path(requested_path, path_var.as_deref())
        } else {
            resolver::from_current_directory(requested_path)
        };
        match resolution {
            Ok(resolved) => {
                resolved_exe = Some(resolved);
                error_message = None;
            }
            Err(err) => {
                resolved_exe = None;
                error_message = Some(resolve_error_message(err));
            }
        }
    }

    let (exe, built_argv) = if let Some(resolved) = &resolved_exe {
        let mut exe_cursor = crate::buffer::StackCursor::new(&mut storage.exe_bytes);
        let exe_ptr = exe_cursor.store(path_bytes(resolved)).ok_or(HookError::BufferOverflow)?;
        unsafe {
            command::proxy_command_stack(
                session,
                exe_ptr,
                argv_tail,
                &mut storage.argv_diag,
                &mut storage.argv_ptrs,
            )
        }
        .ok_or(HookError::BufferOverflow)?
    } else {
        let message = error_message.unwrap();
        let display = requested_path.to_string_lossy();
        unsafe {
            command::error_command_stack(
                session,
                message,
                &display,
                argv_tail,
                &mut storage.argv_diag,
                &mut storage.argv_ptrs,
            )
        }
        .ok_or(HookError::BufferOverflow)?
    };

    let injected_envp = unsafe {
        envinject::build_stack(envp, session, self_lib_path, &mut storage.env_bytes, &mut storage.env_ptrs)
    }
    .ok_or(HookError::BufferOverflow)?;

    record(requested_path, argv_tail, error_message);

    Ok(Plan { exe, argv: built_argv, envp: injected_envp })
}

/// The diagnostic shared by every hook when the session itself is missing
/// its command id, matching `command::error_command`'s own wording for the
/// same condition.
const INVALID_SESSION_MESSAGE: &str = "invalid environment of hook library, lost required value";

fn resolve_error_message(err: ResolveError) -> &'static str {
    match err {
        ResolveError::NotFound => "no such file or directory",
        ResolveError::NotRegularFile => "not a regular file",
        ResolveError::NotExecutable => "permission denied",
        ResolveError::TooLong => "path exceeds PATH_MAX",
    }
}

/// Best-effort, never-fatal recording of the intended command. Disabled
/// unless `CATTER_RECORD_DIR` is set. `error_message`, when present, routes
/// the line through `Recorder::record_error` instead, so a reader of the
/// file can tell a resolution failure apart from a successfully rewritten
/// command.
fn record(executable: &Path, argv_tail: &[*const c_char], error_message: Option<&str>) {
    let config = crate::lifecycle::config();
    if config.record_dir.is_none() {
        return;
    }
    let recorder = catter::recorder::Recorder::from_config(config, std::process::id(), current_tid());
    match error_message {
        Some(message) => recorder.record_error(message),
        None => {
            let arguments: Vec<String> = argv_tail
                .iter()
                .map(|&ptr| unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned())
                .collect();
            recorder.record(executable, &arguments);
        }
    }
}

#[cfg(target_os = "linux")]
fn current_tid() -> u64 {
    unsafe { libc::syscall(libc::SYS_gettid) as u64 }
}

#[cfg(target_os = "macos")]
fn current_tid() -> u64 {
    let mut tid: u64 = 0;
    unsafe {
        libc::pthread_threadid_np(std::ptr::null_mut(), &mut tid);
    }
    tid
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
fn current_tid() -> u64 {
    0
}

fn build_proxy_invocation(
    session: &Session,
    resolved: &Path,
    argv_tail: &[*const c_char],
) -> Result<(*const c_char, *const *const c_char), HookError> {
    let exe_ptr = unsafe { EXE_SCRATCH.store(path_bytes(resolved)) }.ok_or(HookError::BufferOverflow)?;
    unsafe { command::proxy_command(session, exe_ptr, argv_tail) }.ok_or(HookError::BufferOverflow)
}

fn build_error_invocation(
    session: &Session,
    err: ResolveError,
    requested_path: &Path,
    argv_tail: &[*const c_char],
) -> Result<(*const c_char, *const *const c_char), HookError> {
    let message = resolve_error_message(err);
    let display = requested_path.to_string_lossy();
    unsafe { command::error_command(session, message, &display, argv_tail) }.ok_or(HookError::BufferOverflow)
}

/// Builds the error report for a session whose proxy path resolved (via the
/// build-time default) but whose command id did not come from the
/// environment. Routes through the proxy with an empty `-p` argument rather
/// than failing the call outright, since `session.can_report()` guarantees
/// a proxy path exists.
fn build_invalid_session_invocation(
    session: &Session,
    requested_path: &Path,
    argv_tail: &[*const c_char],
) -> Result<(*const c_char, *const *const c_char), HookError> {
    let display = requested_path.to_string_lossy();
    unsafe { command::error_command(session, INVALID_SESSION_MESSAGE, &display, argv_tail) }
        .ok_or(HookError::BufferOverflow)
}

/// Copies pointers from `argv[1..]` into `storage` until the null
/// terminator, returning the filled prefix. Returns `None` if the argument
/// vector is wider than `storage`.
unsafe fn collect_tail<'a>(
    argv: *const *const c_char,
    storage: &'a mut [*const c_char; MAX_TAIL_ARGS],
) -> Option<&'a [*const c_char]> {
    let mut i = 1usize;
    let mut n = 0usize;
    loop {
        let ptr = unsafe { *argv.add(i) };
        if ptr.is_null() {
            break;
        }
        if n >= storage.len() {
            return None;
        }
        storage[n] = ptr;
        n += 1;
        i += 1;
    }
    Some(&storage[..n])
}

unsafe fn path_env_value(envp: *const *const c_char) -> Option<String> {
    let ptr = unsafe { crate::env::value_of(envp, b"PATH") };
    if ptr.is_null() {
        return None;
    }
    Some(unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned())
}

/// Borrows a path's raw bytes with no NUL terminator and no allocation;
/// `Buffer::store`/`StackCursor::store` append the terminator themselves.
fn path_bytes(path: &Path) -> &[u8] {
    use std::os::unix::ffi::OsStrExt;
    path.as_os_str().as_bytes()
}
