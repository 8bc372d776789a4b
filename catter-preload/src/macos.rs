// SPDX-License-Identifier: GPL-3.0-or-later

//! macOS-specific symbol resolution and interposition wiring.
//!
//! `dyld` has no `RTLD_NEXT`-style "next definition" lookup, and macOS's
//! two-level namespace means a dylib exporting a symbol named `execve`
//! does not automatically shadow libc's own. Interposition instead works
//! by listing `{replacement, replacee}` address pairs in a dedicated
//! `__DATA,__interpose` section, which `dyld` consults for every image
//! loaded via `DYLD_INSERT_LIBRARIES`. Because the pairing is by address
//! rather than by name, the replacement functions in `hooks.rs` keep their
//! own (non-libc) names on this platform.

use std::ffi::{c_void, CStr};

#[repr(C)]
pub struct Interpose {
    pub replacement: *const c_void,
    pub replacee: *const c_void,
}

// Safety: both fields are plain function addresses, fixed for the life of
// the process; dyld only ever reads this table.
unsafe impl Sync for Interpose {}

const RTLD_DEFAULT: i32 = -2;

// `execvP` is a BSD extension not bound by the `libc` crate; declared here
// directly so the interpose table below has a real `replacee` address to
// pair against.
unsafe extern "C" {
    fn execvP(
        file: *const std::os::raw::c_char,
        search_path: *const std::os::raw::c_char,
        argv: *const *const std::os::raw::c_char,
    ) -> std::os::raw::c_int;
}

// `execl`/`execlp`/`execle` are C-variadic and the `libc` crate does not
// bind them. These declarations exist only so the interpose table below has
// real `replacee` addresses to pair against — dyld dispatches calls by
// address, not through this (deliberately non-variadic) Rust signature, so
// the argument-count mismatch is never actually exercised.
unsafe extern "C" {
    fn execl(path: *const std::os::raw::c_char, arg0: *const std::os::raw::c_char) -> std::os::raw::c_int;
    fn execlp(file: *const std::os::raw::c_char, arg0: *const std::os::raw::c_char) -> std::os::raw::c_int;
    fn execle(path: *const std::os::raw::c_char, arg0: *const std::os::raw::c_char) -> std::os::raw::c_int;
}

// The native-ABI C shim counterparts compiled by `variadic.c` on this
// platform (`hook_execl` et al., gated `#ifdef __APPLE__` there), which
// collect the variadic argv and forward into the Rust trampolines in
// `hooks.rs`. Declared here (rather than in `hooks.rs`, which only knows
// about the non-variadic entry points) since they are reached exclusively
// through this interpose table, never called from Rust directly.
unsafe extern "C" {
    fn hook_execl(path: *const std::os::raw::c_char, arg0: *const std::os::raw::c_char) -> std::os::raw::c_int;
    fn hook_execlp(file: *const std::os::raw::c_char, arg0: *const std::os::raw::c_char) -> std::os::raw::c_int;
    fn hook_execle(path: *const std::os::raw::c_char, arg0: *const std::os::raw::c_char) -> std::os::raw::c_int;
}

/// Resolves the genuine libc implementation of `name`. `RTLD_DEFAULT`
/// finds the first definition in the flat symbol namespace, which for the
/// handful of exec entry points this library interposes is libc's own:
/// the replacements in `hooks.rs` are reached only via the interpose
/// table, never by name, so they never shadow themselves here.
///
/// # Safety
/// `name` must be a NUL-terminated C string naming a libc symbol.
pub unsafe fn resolve_original(name: &CStr) -> *mut c_void {
    unsafe { libc::dlsym(RTLD_DEFAULT as *mut c_void, name.as_ptr()) }
}

macro_rules! interpose_entry {
    ($ident:ident, $replacement:path, $replacee:path) => {
        #[used]
        #[unsafe(link_section = "__DATA,__interpose")]
        static $ident: Interpose =
            Interpose { replacement: $replacement as *const c_void, replacee: $replacee as *const c_void };
    };
}

interpose_entry!(INTERPOSE_EXECVE, crate::hooks::hook_execve, libc::execve);
interpose_entry!(INTERPOSE_EXECV, crate::hooks::hook_execv, libc::execv);
interpose_entry!(INTERPOSE_EXECVP, crate::hooks::hook_execvp, libc::execvp);
interpose_entry!(INTERPOSE_POSIX_SPAWN, crate::hooks::hook_posix_spawn, libc::posix_spawn);
interpose_entry!(INTERPOSE_POSIX_SPAWNP, crate::hooks::hook_posix_spawnp, libc::posix_spawnp);
interpose_entry!(INTERPOSE_EXECVP_SEARCH, crate::hooks::hook_execvp_search, execvP);
interpose_entry!(INTERPOSE_EXECL, hook_execl, execl);
interpose_entry!(INTERPOSE_EXECLP, hook_execlp, execlp);
interpose_entry!(INTERPOSE_EXECLE, hook_execle, execle);
