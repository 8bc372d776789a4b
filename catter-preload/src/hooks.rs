// SPDX-License-Identifier: GPL-3.0-or-later

//! The hook surface: one exported entry point per intercepted libc
//! function, the replacements every hooked process calls instead of the
//! real `exec*`/`posix_spawn*` family.
//!
//! On Linux and the BSDs these are plain `#[no_mangle] extern "C"`
//! exports; the dynamic linker resolves a later symbol lookup for the
//! same name to this library's definition instead of libc's, because
//! `LD_PRELOAD` puts this library ahead of libc in the search order. On
//! macOS there is no such by-name shadowing (`dyld`'s two-level
//! namespace), so the replacements here keep non-libc names
//! (`hook_execve`, and so on) and are wired into libc's address space by
//! the `__DATA,__interpose` table in `macos.rs` instead.
//!
//! Every function here does the same three things: check the
//! `exec_is_catter_proxy_v1` short-circuit, run the `executor` state
//! machine, and fall back to the real libc function on any error — never
//! fail a call outright, since the posture throughout is "never break the
//! host".

use std::ffi::{CStr, c_void};
use std::os::raw::{c_char, c_int};
use std::sync::atomic::AtomicPtr;

use libc::{pid_t, posix_spawn_file_actions_t, posix_spawnattr_t};

use catter::env_keys::KEY_IS_PROXY;

use crate::executor::{self, Plan, SpawnStorage};
use crate::symbol;

type ExecveFn = unsafe extern "C" fn(*const c_char, *const *const c_char, *const *const c_char) -> c_int;
type ExecvFn = unsafe extern "C" fn(*const c_char, *const *const c_char) -> c_int;
type ExecvPFn = unsafe extern "C" fn(*const c_char, *const c_char, *const *const c_char) -> c_int;
type PosixSpawnFn = unsafe extern "C" fn(
    *mut pid_t,
    *const c_char,
    *const posix_spawn_file_actions_t,
    *const posix_spawnattr_t,
    *const *const c_char,
    *const *const c_char,
) -> c_int;

static REAL_EXECVE: AtomicPtr<c_void> = AtomicPtr::new(std::ptr::null_mut());
static REAL_EXECV: AtomicPtr<c_void> = AtomicPtr::new(std::ptr::null_mut());
static REAL_EXECVP: AtomicPtr<c_void> = AtomicPtr::new(std::ptr::null_mut());
static REAL_EXECVPE: AtomicPtr<c_void> = AtomicPtr::new(std::ptr::null_mut());
static REAL_EXECVP_SEARCH: AtomicPtr<c_void> = AtomicPtr::new(std::ptr::null_mut());
static REAL_POSIX_SPAWN: AtomicPtr<c_void> = AtomicPtr::new(std::ptr::null_mut());
static REAL_POSIX_SPAWNP: AtomicPtr<c_void> = AtomicPtr::new(std::ptr::null_mut());

/// True when this process is the proxy itself. The proxy's own `execvp`
/// call (to finally run the real command under `INJECT`/`WRAP`) must not
/// be rewritten again, or every command would recurse through itself
/// forever.
unsafe fn is_proxy_process() -> bool {
    let env = unsafe { crate::lifecycle::raw_environ() };
    !unsafe { crate::env::value_of(env, KEY_IS_PROXY.as_bytes()) }.is_null()
}

unsafe fn resolve<T>(cache: &AtomicPtr<c_void>, name: &CStr) -> Option<T> {
    let ptr = unsafe { symbol::resolve_cached(cache, name) };
    if ptr.is_null() {
        None
    } else {
        Some(unsafe { std::mem::transmute_copy::<*mut c_void, T>(&ptr) })
    }
}

/// Shared dispatch for the 3-argument entry points (`execve`, `execvpe`,
/// and the `execle` trampoline), which already take an explicit `envp`.
///
/// On a successful rewrite the real call is always the real `execve`
/// (never the hook's own counterpart): the target has become the proxy
/// executable, which always needs an explicit, rewritten environment, a
/// property none of `execv`/`execvp`'s real implementations can express
/// (they inherit the calling process's own `environ`). The hook's own
/// real counterpart is used only for the proxy short-circuit and the
/// unrecoverable-session fallback, where the original call is replayed
/// unchanged.
unsafe fn dispatch_exec3(
    file: *const c_char,
    argv: *const *const c_char,
    envp: *const *const c_char,
    use_path_search: bool,
    real_cache: &AtomicPtr<c_void>,
    real_name: &CStr,
) -> c_int {
    if unsafe { is_proxy_process() } {
        return unsafe { call_real_execve(real_cache, real_name, file, argv, envp) };
    }

    let plan = unsafe {
        executor::plan_exec(file, argv, envp, use_path_search, crate::lifecycle::self_lib_path())
    };
    match plan {
        Ok(Plan { exe, argv, envp }) => unsafe { call_real_execve(&REAL_EXECVE, c"execve", exe, argv, envp) },
        Err(err) => {
            unsafe { *errno_location() = err.errno() };
            unsafe { call_real_execve(real_cache, real_name, file, argv, envp) }
        }
    }
}

/// Shared dispatch for the 2-argument entry points (`execv`, `execvp`, and
/// the `execl`/`execlp` trampolines), which have no explicit `envp` of
/// their own and inherit the process's current environment. Resolves the
/// rewrite using that live environment, then — same reasoning as
/// `dispatch_exec3` — always executes the rewrite via the real `execve`
/// with the freshly injected environment, since the target process
/// (the proxy) must receive it explicitly.
unsafe fn dispatch_exec2(
    file: *const c_char,
    argv: *const *const c_char,
    use_path_search: bool,
    real_cache: &AtomicPtr<c_void>,
    real_name: &CStr,
) -> c_int {
    if unsafe { is_proxy_process() } {
        return unsafe { call_real_execv(real_cache, real_name, file, argv) };
    }

    let envp = unsafe { crate::lifecycle::raw_environ() };
    let plan = unsafe {
        executor::plan_exec(file, argv, envp, use_path_search, crate::lifecycle::self_lib_path())
    };
    match plan {
        Ok(Plan { exe, argv, envp }) => unsafe { call_real_execve(&REAL_EXECVE, c"execve", exe, argv, envp) },
        Err(err) => {
            unsafe { *errno_location() = err.errno() };
            unsafe { call_real_execv(real_cache, real_name, file, argv) }
        }
    }
}

/// Dispatch for `execvP`: a BSD extension taking an explicit
/// colon-separated `search_path` instead of searching the process's own
/// `PATH`. Kept as its own entry point rather than folded into
/// `dispatch_exec2` since its resolution rule (the caller's `search_path`
/// argument) and its real-fallback signature (three arguments, no `envp`)
/// both differ from every other 2-argument entry point.
unsafe fn dispatch_execvp_search(
    file: *const c_char,
    search_path: *const c_char,
    argv: *const *const c_char,
    real_cache: &AtomicPtr<c_void>,
    real_name: &CStr,
) -> c_int {
    if unsafe { is_proxy_process() } {
        return unsafe { call_real_execvp_search(real_cache, real_name, file, search_path, argv) };
    }

    let envp = unsafe { crate::lifecycle::raw_environ() };
    let plan = unsafe {
        executor::plan_exec_searched(file, search_path, argv, envp, crate::lifecycle::self_lib_path())
    };
    match plan {
        Ok(Plan { exe, argv, envp }) => unsafe { call_real_execve(&REAL_EXECVE, c"execve", exe, argv, envp) },
        Err(err) => {
            unsafe { *errno_location() = err.errno() };
            unsafe { call_real_execvp_search(real_cache, real_name, file, search_path, argv) }
        }
    }
}

unsafe fn dispatch_posix_spawn(
    pid: *mut pid_t,
    file: *const c_char,
    file_actions: *const posix_spawn_file_actions_t,
    attrp: *const posix_spawnattr_t,
    argv: *const *const c_char,
    envp: *const *const c_char,
    use_path_search: bool,
    real_cache: &AtomicPtr<c_void>,
    real_name: &CStr,
) -> c_int {
    if unsafe { is_proxy_process() } {
        return unsafe {
            call_real_posix_spawn(real_cache, real_name, pid, file, file_actions, attrp, argv, envp)
        };
    }

    let mut storage = SpawnStorage::new();
    let plan = unsafe {
        executor::plan_posix_spawn(
            file,
            argv,
            envp,
            use_path_search,
            crate::lifecycle::self_lib_path(),
            &mut storage,
        )
    };
    match plan {
        Ok(Plan { exe, argv, envp }) => unsafe {
            call_real_posix_spawn(real_cache, real_name, pid, exe, file_actions, attrp, argv, envp)
        },
        Err(err) => unsafe {
            let rc = call_real_posix_spawn(real_cache, real_name, pid, file, file_actions, attrp, argv, envp);
            if rc != 0 { rc } else { err.errno() }
        },
    }
}

unsafe fn call_real_execve(
    cache: &AtomicPtr<c_void>,
    name: &CStr,
    file: *const c_char,
    argv: *const *const c_char,
    envp: *const *const c_char,
) -> c_int {
    match unsafe { resolve::<ExecveFn>(cache, name) } {
        Some(real) => unsafe { real(file, argv, envp) },
        None => {
            unsafe { *errno_location() = libc::ENOSYS };
            -1
        }
    }
}

unsafe fn call_real_execv(
    cache: &AtomicPtr<c_void>,
    name: &CStr,
    file: *const c_char,
    argv: *const *const c_char,
) -> c_int {
    match unsafe { resolve::<ExecvFn>(cache, name) } {
        Some(real) => unsafe { real(file, argv) },
        None => {
            unsafe { *errno_location() = libc::ENOSYS };
            -1
        }
    }
}

unsafe fn call_real_execvp_search(
    cache: &AtomicPtr<c_void>,
    name: &CStr,
    file: *const c_char,
    search_path: *const c_char,
    argv: *const *const c_char,
) -> c_int {
    match unsafe { resolve::<ExecvPFn>(cache, name) } {
        Some(real) => unsafe { real(file, search_path, argv) },
        None => {
            unsafe { *errno_location() = libc::ENOSYS };
            -1
        }
    }
}

unsafe fn call_real_posix_spawn(
    cache: &AtomicPtr<c_void>,
    name: &CStr,
    pid: *mut pid_t,
    file: *const c_char,
    file_actions: *const posix_spawn_file_actions_t,
    attrp: *const posix_spawnattr_t,
    argv: *const *const c_char,
    envp: *const *const c_char,
) -> c_int {
    match unsafe { resolve::<PosixSpawnFn>(cache, name) } {
        Some(real) => unsafe { real(pid, file, file_actions, attrp, argv, envp) },
        None => libc::ENOSYS,
    }
}

#[cfg(target_os = "macos")]
unsafe fn errno_location() -> *mut c_int {
    unsafe { libc::__error() }
}

#[cfg(not(target_os = "macos"))]
unsafe fn errno_location() -> *mut c_int {
    unsafe { libc::__errno_location() }
}

// Every entry point below is defined twice, gated on `target_os`: plain
// libc names (`execve`, `execv`, ...) exported by-name on Linux/BSD, where
// `LD_PRELOAD` relies on this library's symbol shadowing libc's in the
// dynamic linker's search order; `hook_`-prefixed, non-exported names on
// macOS, where `dyld`'s two-level namespace never looks up a replacement
// by name at all — `macos.rs`'s `__DATA,__interpose` table pairs these
// with their libc originals by address instead.

// --- execve ---------------------------------------------------------------

/// # Safety
/// Same contract as POSIX `execve`.
#[cfg(not(target_os = "macos"))]
#[unsafe(no_mangle)]
pub unsafe extern "C" fn execve(
    path: *const c_char,
    argv: *const *const c_char,
    envp: *const *const c_char,
) -> c_int {
    unsafe { dispatch_exec3(path, argv, envp, false, &REAL_EXECVE, c"execve") }
}

/// # Safety
/// Same contract as POSIX `execve`.
#[cfg(target_os = "macos")]
pub unsafe extern "C" fn hook_execve(
    path: *const c_char,
    argv: *const *const c_char,
    envp: *const *const c_char,
) -> c_int {
    unsafe { dispatch_exec3(path, argv, envp, false, &REAL_EXECVE, c"execve") }
}

// --- execv ------------------------------------------------------------------

/// # Safety
/// Same contract as POSIX `execv`.
#[cfg(not(target_os = "macos"))]
#[unsafe(no_mangle)]
pub unsafe extern "C" fn execv(path: *const c_char, argv: *const *const c_char) -> c_int {
    unsafe { dispatch_exec2(path, argv, false, &REAL_EXECV, c"execv") }
}

/// # Safety
/// Same contract as POSIX `execv`.
#[cfg(target_os = "macos")]
pub unsafe extern "C" fn hook_execv(path: *const c_char, argv: *const *const c_char) -> c_int {
    unsafe { dispatch_exec2(path, argv, false, &REAL_EXECV, c"execv") }
}

// --- execvp -----------------------------------------------------------------

/// # Safety
/// Same contract as POSIX `execvp`.
#[cfg(not(target_os = "macos"))]
#[unsafe(no_mangle)]
pub unsafe extern "C" fn execvp(file: *const c_char, argv: *const *const c_char) -> c_int {
    unsafe { dispatch_exec2(file, argv, true, &REAL_EXECVP, c"execvp") }
}

/// # Safety
/// Same contract as POSIX `execvp`.
#[cfg(target_os = "macos")]
pub unsafe extern "C" fn hook_execvp(file: *const c_char, argv: *const *const c_char) -> c_int {
    unsafe { dispatch_exec2(file, argv, true, &REAL_EXECVP, c"execvp") }
}

// --- execvpe (glibc extension, Linux-only) ---------------------------------

/// # Safety
/// Same contract as glibc's `execvpe`.
#[cfg(not(target_os = "macos"))]
#[unsafe(no_mangle)]
pub unsafe extern "C" fn execvpe(
    file: *const c_char,
    argv: *const *const c_char,
    envp: *const *const c_char,
) -> c_int {
    unsafe { dispatch_exec3(file, argv, envp, true, &REAL_EXECVPE, c"execvpe") }
}

// --- execvP (BSD extension: searches a caller-given path, not $PATH) ------

/// # Safety
/// Same contract as BSD's `execvP`.
#[cfg(not(target_os = "macos"))]
#[unsafe(no_mangle)]
pub unsafe extern "C" fn execvP(
    file: *const c_char,
    search_path: *const c_char,
    argv: *const *const c_char,
) -> c_int {
    unsafe { dispatch_execvp_search(file, search_path, argv, &REAL_EXECVP_SEARCH, c"execvP") }
}

/// # Safety
/// Same contract as BSD's `execvP`.
#[cfg(target_os = "macos")]
pub unsafe extern "C" fn hook_execvp_search(
    file: *const c_char,
    search_path: *const c_char,
    argv: *const *const c_char,
) -> c_int {
    unsafe { dispatch_execvp_search(file, search_path, argv, &REAL_EXECVP_SEARCH, c"execvP") }
}

// --- posix_spawn / posix_spawnp --------------------------------------------

/// # Safety
/// Same contract as POSIX `posix_spawn`.
#[cfg(not(target_os = "macos"))]
#[unsafe(no_mangle)]
pub unsafe extern "C" fn posix_spawn(
    pid: *mut pid_t,
    path: *const c_char,
    file_actions: *const posix_spawn_file_actions_t,
    attrp: *const posix_spawnattr_t,
    argv: *const *const c_char,
    envp: *const *const c_char,
) -> c_int {
    unsafe {
        dispatch_posix_spawn(pid, path, file_actions, attrp, argv, envp, false, &REAL_POSIX_SPAWN, c"posix_spawn")
    }
}

/// # Safety
/// Same contract as POSIX `posix_spawn`.
#[cfg(target_os = "macos")]
pub unsafe extern "C" fn hook_posix_spawn(
    pid: *mut pid_t,
    path: *const c_char,
    file_actions: *const posix_spawn_file_actions_t,
    attrp: *const posix_spawnattr_t,
    argv: *const *const c_char,
    envp: *const *const c_char,
) -> c_int {
    unsafe {
        dispatch_posix_spawn(pid, path, file_actions, attrp, argv, envp, false, &REAL_POSIX_SPAWN, c"posix_spawn")
    }
}

/// # Safety
/// Same contract as POSIX `posix_spawnp`.
#[cfg(not(target_os = "macos"))]
#[unsafe(no_mangle)]
pub unsafe extern "C" fn posix_spawnp(
    pid: *mut pid_t,
    file: *const c_char,
    file_actions: *const posix_spawn_file_actions_t,
    attrp: *const posix_spawnattr_t,
    argv: *const *const c_char,
    envp: *const *const c_char,
) -> c_int {
    unsafe {
        dispatch_posix_spawn(pid, file, file_actions, attrp, argv, envp, true, &REAL_POSIX_SPAWNP, c"posix_spawnp")
    }
}

/// # Safety
/// Same contract as POSIX `posix_spawnp`.
#[cfg(target_os = "macos")]
pub unsafe extern "C" fn hook_posix_spawnp(
    pid: *mut pid_t,
    file: *const c_char,
    file_actions: *const posix_spawn_file_actions_t,
    attrp: *const posix_spawnattr_t,
    argv: *const *const c_char,
    envp: *const *const c_char,
) -> c_int {
    unsafe {
        dispatch_posix_spawn(pid, file, file_actions, attrp, argv, envp, true, &REAL_POSIX_SPAWNP, c"posix_spawnp")
    }
}

// --- the variadic forms: execl/execlp/execle go through a C shim ----------
//
// `variadic.c` collects each call's C varargs into a fixed argv on its own
// stack and calls one of the two trampolines below, which just forward into
// the same dispatch used by the named entry points above.

/// # Safety
/// `path`/`file` and every pointer in `argv` must be valid, NUL-terminated
/// C strings; `argv` itself must be null-terminated.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn catter_hook_execv_trampoline(
    path: *const c_char,
    argv: *const *const c_char,
) -> c_int {
    unsafe { dispatch_exec2(path, argv, false, &REAL_EXECV, c"execv") }
}

/// # Safety
/// Same contract as `catter_hook_execv_trampoline`, but `file` is searched
/// for on `PATH` rather than used as-is.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn catter_hook_execvp_trampoline(
    file: *const c_char,
    argv: *const *const c_char,
) -> c_int {
    unsafe { dispatch_exec2(file, argv, true, &REAL_EXECVP, c"execvp") }
}

/// # Safety
/// Same contract as `catter_hook_execv_trampoline`, plus `envp` must be a
/// valid, null-terminated array of valid, NUL-terminated C strings.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn catter_hook_execve_trampoline(
    path: *const c_char,
    argv: *const *const c_char,
    envp: *const *const c_char,
) -> c_int {
    unsafe { dispatch_exec3(path, argv, envp, false, &REAL_EXECVE, c"execve") }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_a_real_symbol_through_the_cache() {
        let cache = AtomicPtr::new(std::ptr::null_mut());
        let real: Option<ExecvFn> = unsafe { resolve(&cache, c"execv") };
        assert!(real.is_some());
    }

    #[test]
    fn proxy_guard_reads_the_live_key() {
        // Exercised indirectly via `env::value_of`, already covered in
        // env.rs; this just checks the key constant lines up with the one
        // the proxy itself sets.
        assert_eq!(KEY_IS_PROXY, "exec_is_catter_proxy_v1");
    }
}
