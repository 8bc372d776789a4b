// SPDX-License-Identifier: GPL-3.0-or-later

//! Building the `argv` that replaces the caller's original one: either a
//! proxy invocation (`proxy -p <parent-id> -- <resolved-exe> <args…>`) or
//! an error report (`proxy -p <parent-id> <diagnostic>`). Built entirely
//! out of the scratch arenas in `buffer.rs` — no heap allocation on this
//! path.

use std::ffi::CStr;
use std::os::raw::c_char;

use crate::buffer::{Buffer, PtrArena, StackCursor, StackPtrCursor};
use crate::session::Session;

static COMMAND_SCRATCH: Buffer = Buffer::new();
static COMMAND_PTRS: PtrArena = PtrArena::new();

const MAX_ARGV: usize = 256;

/// Width of the stack-allocated argv used by `proxy_command_stack`/
/// `error_command_stack`. Matches `MAX_ARGV` since the shape is identical,
/// only the backing storage differs.
pub const MAX_SPAWN_ARGV: usize = MAX_ARGV;
/// Width of the stack-allocated byte scratch backing the `posix_spawn`
/// error-diagnostic path.
pub const MAX_SPAWN_DIAG_BYTES: usize = 4096;

/// Builds the proxy invocation `proxy -p <id> -- <exe_path> <argv_tail…>`.
/// Returns the proxy's own path (the program to `exec`) and the built
/// `argv`, or `None` if the scratch arenas are exhausted.
///
/// # Safety
/// `exe_path` and every pointer in `argv_tail` must be valid,
/// null-terminated C strings for the duration of this call.
pub unsafe fn proxy_command(
    session: &Session,
    exe_path: *const c_char,
    argv_tail: &[*const c_char],
) -> Option<(*const c_char, *const *const c_char)> {
    let mut scratch: [*const c_char; MAX_ARGV] = [std::ptr::null(); MAX_ARGV];
    let mut n = 0usize;

    fn push(scratch: &mut [*const c_char; MAX_ARGV], n: &mut usize, ptr: *const c_char) -> bool {
        if *n >= scratch.len() - 1 {
            return false;
        }
        scratch[*n] = ptr;
        *n += 1;
        true
    }

    if !push(&mut scratch, &mut n, session.proxy_path()) {
        return None;
    }
    if !push(&mut scratch, &mut n, unsafe { COMMAND_SCRATCH.store(b"-p")? }) {
        return None;
    }
    if !push(&mut scratch, &mut n, session.self_id()) {
        return None;
    }
    if !push(&mut scratch, &mut n, unsafe { COMMAND_SCRATCH.store(b"--")? }) {
        return None;
    }
    if !push(&mut scratch, &mut n, exe_path) {
        return None;
    }
    for &arg in argv_tail {
        if !push(&mut scratch, &mut n, arg) {
            return None;
        }
    }

    let argv = unsafe { COMMAND_PTRS.store(&scratch[..n])? };
    Some((session.proxy_path(), argv))
}

/// Builds the error-report invocation `proxy -p <id> <diagnostic>`, where
/// `<diagnostic>` is `"Catter Proxy Error: <message>\n in command:
/// <exe_path> <args…>"`, so the controller-facing proxy can surface the
/// failure without re-deriving it.
///
/// # Safety
/// `exe_path_display` must be valid UTF-8-ish display text; every pointer
/// in `original_argv` must be a valid, null-terminated C string.
pub unsafe fn error_command(
    session: &Session,
    message: &str,
    exe_path_display: &str,
    original_argv: &[*const c_char],
) -> Option<(*const c_char, *const *const c_char)> {
    let mark = unsafe { COMMAND_SCRATCH.mark() };
    let mut ok = unsafe {
        COMMAND_SCRATCH.push(b"Catter Proxy Error: ")
            && COMMAND_SCRATCH.push(message.as_bytes())
            && COMMAND_SCRATCH.push(b"\n in command: ")
            && COMMAND_SCRATCH.push(exe_path_display.as_bytes())
    };
    if original_argv.is_empty() {
        ok = ok && unsafe { COMMAND_SCRATCH.push(b" ") };
    }
    for &arg in original_argv {
        if !ok {
            break;
        }
        let text = unsafe { CStr::from_ptr(arg) }.to_bytes();
        ok = unsafe { COMMAND_SCRATCH.push(b" ") && COMMAND_SCRATCH.push(text) };
    }
    if !ok {
        return None;
    }
    let diagnostic = unsafe { COMMAND_SCRATCH.finish(mark)? };

    let scratch = [
        session.proxy_path(),
        unsafe { COMMAND_SCRATCH.store(b"-p")? },
        session.self_id(),
        diagnostic,
    ];
    let argv = unsafe { COMMAND_PTRS.store(&scratch)? };
    Some((session.proxy_path(), argv))
}

/// Stack-storage variant of `proxy_command`, used on the `posix_spawn` path:
/// an on-stack buffer rather than the shared static arena, since
/// `posix_spawn` returns control to its caller instead of replacing the
/// process image.
///
/// `diag_bytes` backs the two literal tokens (`-p`, `--`); `ptrs` backs the
/// assembled argv itself.
///
/// # Safety
/// Same contract as `proxy_command`.
pub unsafe fn proxy_command_stack(
    session: &Session,
    exe_path: *const c_char,
    argv_tail: &[*const c_char],
    diag_bytes: &mut [u8],
    ptrs: &mut [*const c_char],
) -> Option<(*const c_char, *const *const c_char)> {
    let mut cursor = StackCursor::new(diag_bytes);
    let flag_p = cursor.store(b"-p")?;
    let separator = cursor.store(b"--")?;

    let mut built = [std::ptr::null::<c_char>(); MAX_SPAWN_ARGV];
    let mut n = 0usize;
    let mut push = |ptr: *const c_char| -> bool {
        if n >= built.len() - 1 {
            return false;
        }
        built[n] = ptr;
        n += 1;
        true
    };
    if !push(session.proxy_path()) || !push(flag_p) || !push(session.self_id()) || !push(separator) {
        return None;
    }
    if !push(exe_path) {
        return None;
    }
    for &arg in argv_tail {
        if !push(arg) {
            return None;
        }
    }

    let mut ptr_cursor = StackPtrCursor::new(ptrs);
    let argv = ptr_cursor.store(&built[..n])?;
    Some((session.proxy_path(), argv))
}

/// Stack-storage variant of `error_command`, used on the `posix_spawn` path
/// for the same reason as `proxy_command_stack`.
///
/// # Safety
/// Same contract as `error_command`.
pub unsafe fn error_command_stack(
    session: &Session,
    message: &str,
    exe_path_display: &str,
    original_argv: &[*const c_char],
    diag_bytes: &mut [u8],
    ptrs: &mut [*const c_char],
) -> Option<(*const c_char, *const *const c_char)> {
    let mut cursor = StackCursor::new(diag_bytes);
    let mark = cursor.mark();
    let mut ok = cursor.push(b"Catter Proxy Error: ")
        && cursor.push(message.as_bytes())
        && cursor.push(b"\n in command: ")
        && cursor.push(exe_path_display.as_bytes());
    if original_argv.is_empty() {
        ok = ok && cursor.push(b" ");
    }
    for &arg in original_argv {
        if !ok {
            break;
        }
        let text = unsafe { CStr::from_ptr(arg) }.to_bytes();
        ok = cursor.push(b" ") && cursor.push(text);
    }
    if !ok {
        return None;
    }
    let diagnostic = cursor.finish(mark)?;
    let flag_p = cursor.store(b"-p")?;

    let mut ptr_cursor = StackPtrCursor::new(ptrs);
    let argv = ptr_cursor.store(&[session.proxy_path(), flag_p, session.self_id(), diagnostic])?;
    Some((session.proxy_path(), argv))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;

    #[test]
    fn proxy_command_has_the_spec_shape() {
        let proxy_path = CString::new("/opt/c/proxy").unwrap();
        let self_id = CString::new("42").unwrap();
        let session = unsafe { crate::session::test_session(proxy_path.as_ptr(), self_id.as_ptr()) };
        let exe = CString::new("/usr/bin/cc").unwrap();
        let arg1 = CString::new("-c").unwrap();
        let tail = [arg1.as_ptr()];

        let (exe_out, argv) = unsafe { proxy_command(&session, exe.as_ptr(), &tail) }.unwrap();
        assert_eq!(exe_out, session.proxy_path());

        let words: Vec<String> = collect(argv);
        assert_eq!(words, vec!["/opt/c/proxy", "-p", "42", "--", "/usr/bin/cc", "-c"]);
    }

    #[test]
    fn error_command_has_the_spec_diagnostic_wording() {
        let proxy_path = CString::new("/opt/c/proxy").unwrap();
        let self_id = CString::new("42").unwrap();
        let session = unsafe { crate::session::test_session(proxy_path.as_ptr(), self_id.as_ptr()) };
        let arg0 = CString::new("gcc").unwrap();
        let argv = [arg0.as_ptr()];

        let (_exe, built) =
            unsafe { error_command(&session, "no such file", "/usr/bin/gcc", &argv) }.unwrap();
        let words = collect(built);
        assert_eq!(words[0], "/opt/c/proxy");
        assert_eq!(words[1], "-p");
        assert_eq!(words[2], "42");
        assert_eq!(words[3], "Catter Proxy Error: no such file\n in command: /usr/bin/gcc gcc");
    }

    #[test]
    fn error_command_with_no_args_still_has_a_trailing_space() {
        let proxy_path = CString::new("/opt/c/proxy").unwrap();
        let self_id = CString::new("42").unwrap();
        let session = unsafe { crate::session::test_session(proxy_path.as_ptr(), self_id.as_ptr()) };

        let (_exe, built) = unsafe { error_command(&session, "invalid session", "/bin/true", &[]) }.unwrap();
        let words = collect(built);
        assert_eq!(words[3], "Catter Proxy Error: invalid session\n in command: /bin/true ");
    }

    fn collect(argv: *const *const c_char) -> Vec<String> {
        let mut out = Vec::new();
        let mut i = 0;
        loop {
            let ptr = unsafe { *argv.add(i) };
            if ptr.is_null() {
                break;
            }
            out.push(unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned());
            i += 1;
        }
        out
    }

    #[test]
    fn proxy_command_stack_matches_the_static_variant() {
        let proxy_path = CString::new("/opt/c/proxy").unwrap();
        let self_id = CString::new("42").unwrap();
        let session = unsafe { crate::session::test_session(proxy_path.as_ptr(), self_id.as_ptr()) };
        let exe = CString::new("/usr/bin/cc").unwrap();
        let arg1 = CString::new("-c").unwrap();
        let tail = [arg1.as_ptr()];

        let mut diag = [0u8; 64];
        let mut ptrs = [std::ptr::null(); MAX_SPAWN_ARGV];
        let (_exe_out, argv) =
            unsafe { proxy_command_stack(&session, exe.as_ptr(), &tail, &mut diag, &mut ptrs) }.unwrap();
        let words = collect(argv);
        assert_eq!(words, vec!["/opt/c/proxy", "-p", "42", "--", "/usr/bin/cc", "-c"]);
    }

    #[test]
    fn error_command_stack_matches_the_static_variant() {
        let proxy_path = CString::new("/opt/c/proxy").unwrap();
        let self_id = CString::new("42").unwrap();
        let session = unsafe { crate::session::test_session(proxy_path.as_ptr(), self_id.as_ptr()) };
        let arg0 = CString::new("gcc").unwrap();
        let argv = [arg0.as_ptr()];

        let mut diag = [0u8; MAX_SPAWN_DIAG_BYTES];
        let mut ptrs = [std::ptr::null(); 8];
        let (_exe, built) = unsafe {
            error_command_stack(&session, "no such file", "/usr/bin/gcc", &argv, &mut diag, &mut ptrs)
        }
        .unwrap();
        let words = collect(built);
        assert_eq!(words[3], "Catter Proxy Error: no such file\n in command: /usr/bin/gcc gcc");
    }

    #[test]
    fn error_command_stack_with_no_args_still_has_a_trailing_space() {
        let proxy_path = CString::new("/opt/c/proxy").unwrap();
        let self_id = CString::new("42").unwrap();
        let session = unsafe { crate::session::test_session(proxy_path.as_ptr(), self_id.as_ptr()) };

        let mut diag = [0u8; MAX_SPAWN_DIAG_BYTES];
        let mut ptrs = [std::ptr::null(); 8];
        let (_exe, built) = unsafe {
            error_command_stack(&session, "invalid session", "/bin/true", &[], &mut diag, &mut ptrs)
        }
        .unwrap();
        let words = collect(built);
        assert_eq!(words[3], "Catter Proxy Error: invalid session\n in command: /bin/true ");
    }
}
