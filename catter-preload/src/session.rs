// SPDX-License-Identifier: GPL-3.0-or-later

//! The per-process session: the handful of facts read once at load time
//! from the environment that made this library.
//!
//! Kept as two plain `KEY=VALUE` entries (`__key_catter_proxy_path_v1`,
//! `__key_catter_command_id_v1`) rather than one JSON blob behind a single
//! key, so that a child process's environment carries the session the same
//! way any other environment variable would, without a JSON decoder on the
//! hot path. One `OnceLock` singleton, populated once from `envp` at load.

use std::os::raw::c_char;
use std::sync::OnceLock;

use crate::buffer::Buffer;
use crate::env;

use catter::env_keys::{KEY_COMMAND_ID, KEY_PRELOAD_PATH, KEY_PROXY_PATH};

static SESSION_SCRATCH: Buffer = Buffer::new();
static SESSION: OnceLock<Session> = OnceLock::new();

/// The proxy path baked in at build time (`catter-preload/build.rs`),
/// overridable via the `CATTER_DEFAULT_PROXY_PATH` build-time env var.
/// Used whenever `__key_catter_proxy_path_v1` is absent from the process's
/// own environment: even a session otherwise missing its keys still needs
/// somewhere to route its error report, so the proxy's own location can't
/// be allowed to depend on the same keys it is meant to recover from
/// losing.
const DEFAULT_PROXY_PATH: &str = concat!(env!("CATTER_DEFAULT_PROXY_PATH"), "\0");

/// The facts an already-loaded hook library needs on every intercepted
/// call. `proxy_path` and `self_id` are copies made into `SESSION_SCRATCH`
/// at load time, so they stay valid independent of whatever happens to the
/// caller's own `envp` afterwards.
#[derive(Clone, Copy)]
pub struct Session {
    proxy_path: *const c_char,
    self_id: *const c_char,
    preload_entry: *const c_char,
    /// Whether `__key_catter_command_id_v1` was actually present in the
    /// environment. Distinguishes "route through the proxy normally"
    /// (`true`) from "proxy path resolved to the build-time default and the
    /// command id is an empty placeholder" (`false`) — the latter can still
    /// build an `error_command`, just never a `proxy_command`.
    has_command_id: bool,
}

// Safety: fields are write-once at load time (see `load_from`) and read-only
// thereafter; concurrent reads from multiple threads are fine.
unsafe impl Sync for Session {}
unsafe impl Send for Session {}

impl Session {
    /// A session with no proxy configured at all: not even the build-time
    /// default resolved to a valid C string. Only reachable if the scratch
    /// buffer itself is exhausted at load time, which given its size should
    /// not happen in practice.
    const fn invalid() -> Self {
        Session {
            proxy_path: std::ptr::null(),
            self_id: std::ptr::null(),
            preload_entry: std::ptr::null(),
            has_command_id: false,
        }
    }

    /// Whether this session carries a real, environment-supplied command id
    /// and can therefore route a call through the proxy normally. A session
    /// with a resolvable `proxy_path` but no command id can still build an
    /// `error_command`; a session with no resolvable `proxy_path` at all can
    /// do neither, and every hook falls back to calling the real libc
    /// function directly.
    pub fn is_valid(&self) -> bool {
        !self.proxy_path.is_null() && self.has_command_id
    }

    /// Whether this session can build *any* proxy invocation — a normal one
    /// if `is_valid`, or at minimum an error report if the proxy path
    /// resolved but the command id did not.
    pub fn can_report(&self) -> bool {
        !self.proxy_path.is_null()
    }

    pub fn proxy_path(&self) -> *const c_char {
        self.proxy_path
    }

    pub fn self_id(&self) -> *const c_char {
        self.self_id
    }

    /// The full `LD_PRELOAD`/`DYLD_INSERT_LIBRARIES`-style `KEY=VALUE`
    /// entry this process itself was launched with, reused verbatim when
    /// building a child's environment so the child keeps interposing too.
    pub fn preload_entry(&self) -> *const c_char {
        self.preload_entry
    }
}

/// Reads the process's real environment once and populates the global
/// session. Idempotent: subsequent calls return the already-loaded session
/// without touching `env` again.
///
/// # Safety
/// `env` must be null or a pointer to a null-terminated array of
/// null-terminated C strings, valid for the duration of this call.
pub unsafe fn load_from(env: *const *const c_char) -> &'static Session {
    SESSION.get_or_init(|| unsafe { build(env) })
}

/// Returns the already-loaded session, or an invalid one if `load_from` has
/// not run yet (should not happen once the loader bootstrap has completed).
pub fn current() -> &'static Session {
    SESSION.get_or_init(Session::invalid)
}

unsafe fn build(env: *const *const c_char) -> Session {
    let proxy_value = unsafe { env::value_of(env, KEY_PROXY_PATH.as_bytes()) };
    let id_value = unsafe { env::value_of(env, KEY_COMMAND_ID.as_bytes()) };
    let preload_entry = unsafe { env::entry_of(env, KEY_PRELOAD_PATH.as_bytes()) };

    let proxy_path = if proxy_value.is_null() {
        match unsafe { copy_cstr(DEFAULT_PROXY_PATH.as_ptr() as *const c_char) } {
            Some(ptr) => ptr,
            None => return Session::invalid(),
        }
    } else {
        match unsafe { copy_cstr(proxy_value) } {
            Some(ptr) => ptr,
            None => return Session::invalid(),
        }
    };

    let (self_id, has_command_id) = if id_value.is_null() {
        match unsafe { copy_cstr(b"\0".as_ptr() as *const c_char) } {
            Some(ptr) => (ptr, false),
            None => return Session::invalid(),
        }
    } else {
        match unsafe { copy_cstr(id_value) } {
            Some(ptr) => (ptr, true),
            None => return Session::invalid(),
        }
    };

    let preload_entry = if preload_entry.is_null() {
        std::ptr::null()
    } else {
        unsafe { copy_cstr(preload_entry) }.unwrap_or(std::ptr::null())
    };

    Session { proxy_path, self_id, preload_entry, has_command_id }
}

unsafe fn copy_cstr(src: *const c_char) -> Option<*const c_char> {
    let bytes = unsafe { std::ffi::CStr::from_ptr(src) }.to_bytes();
    unsafe { SESSION_SCRATCH.store(bytes) }
}

/// Builds a `Session` directly from already-owned C strings, for tests in
/// sibling modules that need a valid session without constructing a fake
/// `envp` array of their own.
#[cfg(test)]
pub(crate) unsafe fn test_session(proxy_path: *const c_char, self_id: *const c_char) -> Session {
    Session {
        proxy_path: unsafe { copy_cstr(proxy_path) }.expect("test scratch buffer has room"),
        self_id: unsafe { copy_cstr(self_id) }.expect("test scratch buffer has room"),
        preload_entry: std::ptr::null(),
        has_command_id: true,
    }
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
    fn missing_keys_fall_back_to_the_build_time_proxy_path() {
        let (_owned, ptrs) = make_env(&["PATH=/bin"]);
        let session = unsafe { build(ptrs.as_ptr()) };
        assert!(!session.is_valid());
        assert!(session.can_report());
        let proxy = unsafe { std::ffi::CStr::from_ptr(session.proxy_path()) }.to_str().unwrap();
        assert_eq!(proxy, DEFAULT_PROXY_PATH.trim_end_matches('\0'));
        let id = unsafe { std::ffi::CStr::from_ptr(session.self_id()) }.to_str().unwrap();
        assert_eq!(id, "");
    }

    #[test]
    fn present_keys_build_a_valid_session() {
        let (_owned, ptrs) = make_env(&[
            &format!("{KEY_PROXY_PATH}=/opt/c/proxy"),
            &format!("{KEY_COMMAND_ID}=42"),
        ]);
        let session = unsafe { build(ptrs.as_ptr()) };
        assert!(session.is_valid());
        let proxy = unsafe { std::ffi::CStr::from_ptr(session.proxy_path()) }.to_str().unwrap();
        assert_eq!(proxy, "/opt/c/proxy");
        let id = unsafe { std::ffi::CStr::from_ptr(session.self_id()) }.to_str().unwrap();
        assert_eq!(id, "42");
    }

    #[test]
    fn missing_command_id_alone_is_still_invalid() {
        let (_owned, ptrs) = make_env(&[&format!("{KEY_PROXY_PATH}=/opt/c/proxy")]);
        let session = unsafe { build(ptrs.as_ptr()) };
        assert!(!session.is_valid());
    }
}
