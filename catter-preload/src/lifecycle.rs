// SPDX-License-Identifier: GPL-3.0-or-later

//! Loader bootstrap.
//!
//! Runs exactly once per loaded library instance: reads the process's own
//! environment, populates the global `Session`, and initializes logging.
//! Guarded by a single atomic flag rather than a mutex, since a mutex
//! pulled in here could itself end up interposed if the host process ever
//! preloads something that hooks synchronization primitives, however
//! unlikely.

use std::ffi::CString;
use std::os::raw::c_char;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};

use catter::config::Config;
use ctor::{ctor, dtor};

static LOADED: AtomicBool = AtomicBool::new(false);
static UNLOADED: AtomicBool = AtomicBool::new(false);
static CONFIG: OnceLock<Config> = OnceLock::new();
static SELF_LIB_PATH: OnceLock<CString> = OnceLock::new();

/// The recorder/RPC tunables read once at load time. Reading the process
/// environment is safe here (we run well before any hook can fire), so the
/// hot path never has to touch `std::env` itself.
pub fn config() -> &'static Config {
    CONFIG.get_or_init(Config::from_env)
}

/// This library's own on-disk path, resolved once at load time via
/// `dladdr` against one of its own addresses, so `envinject::build`/
/// `build_stack` can prepend it to a child's preload key without querying
/// the dynamic linker again from the no-allocator hot path.
pub fn self_lib_path() -> *const c_char {
    SELF_LIB_PATH
        .get_or_init(|| resolve_self_lib_path().unwrap_or_else(|| CString::new("").unwrap()))
        .as_ptr()
}

fn resolve_self_lib_path() -> Option<CString> {
    let mut info: libc::Dl_info = unsafe { std::mem::zeroed() };
    let anchor = on_load as *const () as *const std::ffi::c_void;
    let found = unsafe { libc::dladdr(anchor, &mut info) };
    if found == 0 || info.dli_fname.is_null() {
        return None;
    }
    let path = unsafe { std::ffi::CStr::from_ptr(info.dli_fname) };
    CString::new(path.to_bytes()).ok()
}

#[ctor]
fn on_load() {
    if LOADED.swap(true, Ordering::SeqCst) {
        return;
    }
    let _ = env_logger::try_init();
    CONFIG.get_or_init(Config::from_env);
    let _ = self_lib_path();
    unsafe {
        crate::session::load_from(raw_environ());
    }
    log::debug!("catter-preload loaded into pid {}", std::process::id());
}

#[dtor]
fn on_unload() {
    if UNLOADED.swap(true, Ordering::SeqCst) {
        return;
    }
    log::debug!("catter-preload unloaded from pid {}", std::process::id());
}

/// Reads the libc-maintained `environ` global directly rather than going
/// through `std::env`, so the session is built from the exact array the
/// dynamic linker handed this process, independent of anything `std` caches.
pub(crate) unsafe fn raw_environ() -> *const *const std::os::raw::c_char {
    unsafe extern "C" {
        static environ: *const *const std::os::raw::c_char;
    }
    unsafe { environ }
}
