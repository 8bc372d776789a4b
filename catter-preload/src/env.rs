// SPDX-License-Identifier: GPL-3.0-or-later

//! Reading the raw `envp` array the hot path is handed.
//!
//! Deliberately avoids `getenv`/`strcmp`: both could themselves be
//! interposed, and `getenv` reads the process's *current* environment
//! pointer rather than a caller-supplied `envp` (the `execve`/`posix_spawn`
//! family take their own environment explicitly). Comparison is a manual
//! byte loop over the raw pointers instead.

use std::os::raw::c_char;

/// Returns a pointer to the value portion (after `=`) of the first
/// `KEY=VALUE` entry in `env` whose key matches `key` exactly, or null if
/// absent.
///
/// # Safety
/// `env` must be null or a pointer to a null-terminated array of
/// null-terminated C strings.
pub unsafe fn value_of(env: *const *const c_char, key: &[u8]) -> *const c_char {
    let entry = unsafe { entry_of(env, key) };
    if entry.is_null() {
        return std::ptr::null();
    }
    unsafe { entry.add(key.len() + 1) }
}

/// Returns a pointer to the full `KEY=VALUE` entry in `env` whose key
/// matches `key` exactly, or null if absent.
///
/// # Safety
/// Same contract as `value_of`.
pub unsafe fn entry_of(env: *const *const c_char, key: &[u8]) -> *const c_char {
    if env.is_null() {
        return std::ptr::null();
    }
    let mut cursor = env;
    loop {
        let entry = unsafe { *cursor };
        if entry.is_null() {
            return std::ptr::null();
        }
        if unsafe { matches_key(entry, key) } {
            return entry;
        }
        cursor = unsafe { cursor.add(1) };
    }
}

/// Counts the entries in a null-terminated array, not including the
/// terminator.
///
/// # Safety
/// Same contract as `value_of`.
pub unsafe fn len(env: *const *const c_char) -> usize {
    if env.is_null() {
        return 0;
    }
    let mut count = 0usize;
    loop {
        if unsafe { *env.add(count) }.is_null() {
            return count;
        }
        count += 1;
    }
}

unsafe fn matches_key(entry: *const c_char, key: &[u8]) -> bool {
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

    fn make_env(entries: &[&str]) -> (Vec<CString>, Vec<*const c_char>) {
        let owned: Vec<CString> = entries.iter().map(|s| CString::new(*s).unwrap()).collect();
        let mut ptrs: Vec<*const c_char> = owned.iter().map(|c| c.as_ptr()).collect();
        ptrs.push(std::ptr::null());
        (owned, ptrs)
    }

    #[test]
    fn finds_an_existing_key() {
        let (_owned, ptrs) = make_env(&["PATH=/bin:/usr/bin", "HOME=/root"]);
        let value = unsafe { value_of(ptrs.as_ptr(), b"HOME") };
        let text = unsafe { std::ffi::CStr::from_ptr(value) }.to_str().unwrap();
        assert_eq!(text, "/root");
    }

    #[test]
    fn missing_key_returns_null() {
        let (_owned, ptrs) = make_env(&["PATH=/bin"]);
        assert!(unsafe { value_of(ptrs.as_ptr(), b"HOME") }.is_null());
    }

    #[test]
    fn does_not_match_a_key_prefix() {
        let (_owned, ptrs) = make_env(&["PATHOLOGY=oops", "PATH=/bin"]);
        let value = unsafe { value_of(ptrs.as_ptr(), b"PATH") };
        let text = unsafe { std::ffi::CStr::from_ptr(value) }.to_str().unwrap();
        assert_eq!(text, "/bin");
    }

    #[test]
    fn null_env_is_empty() {
        assert!(unsafe { value_of(std::ptr::null(), b"PATH") }.is_null());
        assert_eq!(unsafe { len(std::ptr::null()) }, 0);
    }

    #[test]
    fn len_counts_entries() {
        let (_owned, ptrs) = make_env(&["A=1", "B=2", "C=3"]);
        assert_eq!(unsafe { len(ptrs.as_ptr()) }, 3);
    }
}
