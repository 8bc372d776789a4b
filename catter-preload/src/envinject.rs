// SPDX-License-Identifier: GPL-3.0-or-later

//! Building the `envp` a replacement command receives: the caller's own
//! environment, plus the session keys a still-interposed child needs to
//! keep going, plus this library's own path prepended to the preload
//! key so the child's dynamic linker loads it too.
//!
//! The prepend-and-dedupe logic moves this library's own path to the front
//! of the preload list, removing any existing occurrence, rather than
//! appending a second copy.

use std::os::raw::c_char;

use catter::env_keys::{KEY_COMMAND_ID, KEY_PRELOAD_PATH, KEY_PROXY_PATH};

use crate::buffer::{Buffer, PtrArena, StackCursor, StackPtrCursor};
use crate::env;
use crate::session::Session;

static ENV_SCRATCH: Buffer = Buffer::new();
static ENV_PTRS: PtrArena = PtrArena::new();

/// Bytes needed for the three rebuilt `KEY=VALUE` entries (proxy path,
/// command id, preload key) on the `posix_spawn` stack path.
pub const MAX_STACK_ENV_BYTES: usize = 3 * 4096;
/// Pointer slots needed for the rebuilt envp on the `posix_spawn` stack path.
pub const MAX_STACK_ENV_PTRS: usize = 512;

/// Builds the `envp` array for a command about to be routed through the
/// proxy: `original_env` with the session's proxy-path and command-id keys
/// set (overwriting any stale copies), and the preload key rewritten so
/// this library's own path is first.
///
/// # Safety
/// `original_env` must be null or point to a null-terminated array of
/// null-terminated C strings, valid for the duration of this call.
/// `self_lib_path` must be a null-terminated C string.
pub unsafe fn build(
    original_env: *const *const c_char,
    session: &Session,
    self_lib_path: *const c_char,
) -> Option<*const *const c_char> {
    let proxy_path_entry = unsafe { store_kv(KEY_PROXY_PATH.as_bytes(), session.proxy_path())? };
    let command_id_entry = unsafe { store_kv(KEY_COMMAND_ID.as_bytes(), session.self_id())? };
    let preload_entry = unsafe { build_preload_entry(original_env, session, self_lib_path)? };

    let count = unsafe { env::len(original_env) };
    let mut scratch: [*const c_char; 512] = [std::ptr::null(); 512];
    let mut n = 0usize;

    let push = |scratch: &mut [*const c_char; 512], n: &mut usize, ptr: *const c_char| -> bool {
        if *n >= scratch.len() - 1 {
            return false;
        }
        scratch[*n] = ptr;
        *n += 1;
        true
    };

    for i in 0..count {
        let entry = unsafe { *original_env.add(i) };
        if unsafe { has_key(entry, KEY_PROXY_PATH.as_bytes()) }
            || unsafe { has_key(entry, KEY_COMMAND_ID.as_bytes()) }
            || unsafe { has_key(entry, KEY_PRELOAD_PATH.as_bytes()) }
        {
            continue;
        }
        if !push(&mut scratch, &mut n, entry) {
            return None;
        }
    }
    if !push(&mut scratch, &mut n, proxy_path_entry) {
        return None;
    }
    if !push(&mut scratch, &mut n, command_id_entry) {
        return None;
    }
    if !push(&mut scratch, &mut n, preload_entry) {
        return None;
    }

    unsafe { ENV_PTRS.store(&scratch[..n]) }
}

/// Stack-storage variant of `build`, used on the `posix_spawn` path for the
/// same reason `command::proxy_command_stack` exists: `posix_spawn` returns
/// control to its caller, so the rewritten `envp` lives on the hook's own
/// stack frame rather than the shared static arena.
///
/// # Safety
/// Same contract as `build`.
pub unsafe fn build_stack(
    original_env: *const *const c_char,
    session: &Session,
    self_lib_path: *const c_char,
    byte_storage: &mut [u8],
    ptr_storage: &mut [*const c_char],
) -> Option<*const *const c_char> {
    let mut cursor = StackCursor::new(byte_storage);
    let proxy_path_entry = store_kv_in(&mut cursor, KEY_PROXY_PATH.as_bytes(), session.proxy_path())?;
    let command_id_entry = store_kv_in(&mut cursor, KEY_COMMAND_ID.as_bytes(), session.self_id())?;
    let preload_entry = build_preload_entry_in(&mut cursor, original_env, session, self_lib_path)?;

    let count = unsafe { env::len(original_env) };
    let mut scratch: [*const c_char; 512] = [std::ptr::null(); 512];
    let mut n = 0usize;
    for i in 0..count {
        let entry = unsafe { *original_env.add(i) };
        if unsafe { has_key(entry, KEY_PROXY_PATH.as_bytes()) }
            || unsafe { has_key(entry, KEY_COMMAND_ID.as_bytes()) }
            || unsafe { has_key(entry, KEY_PRELOAD_PATH.as_bytes()) }
        {
            continue;
        }
        if n >= scratch.len() - 1 {
            return None;
        }
        scratch[n] = entry;
        n += 1;
    }
    for extra in [proxy_path_entry, command_id_entry, preload_entry] {
        if n >= scratch.len() - 1 {
            return None;
        }
        scratch[n] = extra;
        n += 1;
    }

    let mut ptr_cursor = StackPtrCursor::new(ptr_storage);
    ptr_cursor.store(&scratch[..n])
}

fn store_kv_in(cursor: &mut StackCursor, key: &[u8], value: *const c_char) -> Option<*const c_char> {
    let mark = cursor.mark();
    if !cursor.push(key) || !cursor.push(b"=") {
        return None;
    }
    let value_bytes = unsafe { std::ffi::CStr::from_ptr(value) }.to_bytes();
    if !cursor.push(value_bytes) {
        return None;
    }
    cursor.finish(mark)
}

fn build_preload_entry_in(
    cursor: &mut StackCursor,
    original_env: *const *const c_char,
    session: &Session,
    self_lib_path: *const c_char,
) -> Option<*const c_char> {
    let self_lib = unsafe { std::ffi::CStr::from_ptr(self_lib_path) }.to_bytes();
    let existing = existing_preload_value(original_env, session);

    let mark = cursor.mark();
    if !cursor.push(KEY_PRELOAD_PATH.as_bytes()) || !cursor.push(b"=") || !cursor.push(self_lib) {
        return None;
    }
    for segment in existing.split(|&b| b == b':') {
        if segment.is_empty() || segment == self_lib {
            continue;
        }
        if !cursor.push(b":") || !cursor.push(segment) {
            return None;
        }
    }
    cursor.finish(mark)
}

/// The value half of the preload key's entry (the text after `=`), as
/// borrowed bytes — no allocation, since this sits on the hot path of every
/// hook. Read from `original_env` — the environment the *current* call
/// actually carries — rather than the session's load-time snapshot, so a
/// process that edits its own `LD_PRELOAD`/`DYLD_INSERT_LIBRARIES` between
/// load and a later exec still gets the idempotent-prepend treatment against
/// what it is about to hand the kernel, not what this library saw at load
/// time; spec.md §8 invariant 4 is stated in terms of the call's own env.
/// Falls back to the session's own cached entry only if the current call's
/// `envp` lacks the key entirely (e.g. a `posix_spawn` call built `envp`
/// fresh rather than inheriting it).
fn existing_preload_value<'a>(original_env: *const *const c_char, session: &'a Session) -> &'a [u8] {
    let current = unsafe { env::entry_of(original_env, KEY_PRELOAD_PATH.as_bytes()) };
    let source = if !current.is_null() { current } else { session.preload_entry() };
    if source.is_null() {
        return b"";
    }
    let entry = unsafe { std::ffi::CStr::from_ptr(source) }.to_bytes();
    match entry.iter().position(|&b| b == b'=') {
        Some(pos) => &entry[pos + 1..],
        None => b"",
    }
}

unsafe fn store_kv(key: &[u8], value: *const c_char) -> Option<*const c_char> {
    let mark = unsafe { ENV_SCRATCH.mark() };
    if !unsafe { ENV_SCRATCH.push(key) } {
        return None;
    }
    if !unsafe { ENV_SCRATCH.push(b"=") } {
        return None;
    }
    let value_bytes = unsafe { std::ffi::CStr::from_ptr(value) }.to_bytes();
    if !unsafe { ENV_SCRATCH.push(value_bytes) } {
        return None;
    }
    unsafe { ENV_SCRATCH.finish(mark) }
}

/// Prepends `self_lib_path` to the existing preload key's value, removing
/// any prior occurrence of the same path, mirroring `insert_to_path`.
unsafe fn build_preload_entry(
    original_env: *const *const c_char,
    session: &Session,
    self_lib_path: *const c_char,
) -> Option<*const c_char> {
    let self_lib = unsafe { std::ffi::CStr::from_ptr(self_lib_path) }.to_bytes();
    let existing = existing_preload_value(original_env, session);

    let mark = unsafe { ENV_SCRATCH.mark() };
    if !unsafe { ENV_SCRATCH.push(KEY_PRELOAD_PATH.as_bytes()) } || !unsafe { ENV_SCRATCH.push(b"=") } {
        return None;
    }
    if !unsafe { ENV_SCRATCH.push(self_lib) } {
        return None;
    }
    for segment in existing.split(|&b| b == b':') {
        if segment.is_empty() || segment == self_lib {
            continue;
        }
        if !unsafe { ENV_SCRATCH.push(b":") } || !unsafe { ENV_SCRATCH.push(segment) } {
            return None;
        }
    }
    unsafe { ENV_SCRATCH.finish(mark) }
}

unsafe fn has_key(entry: *const c_char, key: &[u8]) -> bool {
    let base = entry as *const u8;
    for (i, &expected) in key.iter().enumerate() {
        if unsafe { *base.add(i) } != expected {
            return false;
        }
    }
    unsafe { *base.add(key.len()) == b'=' }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;

    #[test]
    fn builds_an_env_with_session_keys_added() {
        let original = [CString::new("PATH=/bin").unwrap()];
        let mut ptrs: Vec<*const c_char> = original.iter().map(|c| c.as_ptr()).collect();
        ptrs.push(std::ptr::null());

        let proxy_path = CString::new("/opt/c/proxy").unwrap();
        let self_id = CString::new("42").unwrap();
        let session = unsafe {
            crate::session::test_session(proxy_path.as_ptr(), self_id.as_ptr())
        };
        let self_lib = CString::new("/opt/c/lib.so").unwrap();

        let built = unsafe { build(ptrs.as_ptr(), &session, self_lib.as_ptr()) }.unwrap();
        let mut found_path = false;
        let mut found_proxy = false;
        let mut i = 0;
        loop {
            let entry = unsafe { *built.add(i) };
            if entry.is_null() {
                break;
            }
            let text = unsafe { std::ffi::CStr::from_ptr(entry) }.to_string_lossy().into_owned();
            if text == "PATH=/bin" {
                found_path = true;
            }
            if text.starts_with("__key_catter_proxy_path_v1=") {
                found_proxy = true;
            }
            i += 1;
        }
        assert!(found_path);
        assert!(found_proxy);
    }

    #[test]
    fn build_stack_matches_the_static_variant() {
        let original = [CString::new("PATH=/bin").unwrap()];
        let mut ptrs: Vec<*const c_char> = original.iter().map(|c| c.as_ptr()).collect();
        ptrs.push(std::ptr::null());

        let proxy_path = CString::new("/opt/c/proxy").unwrap();
        let self_id = CString::new("42").unwrap();
        let session = unsafe { crate::session::test_session(proxy_path.as_ptr(), self_id.as_ptr()) };
        let self_lib = CString::new("/opt/c/lib.so").unwrap();

        let mut bytes = [0u8; MAX_STACK_ENV_BYTES];
        let mut out_ptrs = [std::ptr::null(); MAX_STACK_ENV_PTRS];
        let built = unsafe {
            build_stack(ptrs.as_ptr(), &session, self_lib.as_ptr(), &mut bytes, &mut out_ptrs)
        }
        .unwrap();

        let mut found_path = false;
        let mut found_proxy = false;
        let mut i = 0;
        loop {
            let entry = unsafe { *built.add(i) };
            if entry.is_null() {
                break;
            }
            let text = unsafe { std::ffi::CStr::from_ptr(entry) }.to_string_lossy().into_owned();
            if text == "PATH=/bin" {
                found_path = true;
            }
            if text.starts_with("__key_catter_proxy_path_v1=") {
                found_proxy = true;
            }
            i += 1;
        }
        assert!(found_path);
        assert!(found_proxy);
    }
}
