// SPDX-License-Identifier: GPL-3.0-or-later

//! Binding each hook to the real libc function it shadows.
//!
//! On Linux and the BSDs this is a single `dlsym(RTLD_NEXT, ...)` call per
//! symbol, cached afterwards, for every hooked function. macOS has no
//! `RTLD_NEXT` — interposition there is a build-time `__DATA,__interpose`
//! table instead, resolved in `macos.rs`.

use std::ffi::{c_void, CStr};
use std::sync::atomic::{AtomicPtr, Ordering};

/// Resolves `name`'s real implementation once, caching the result in
/// `cache`. Racing callers are benign: every thread resolves the same
/// address and writes it back, so no lock is needed.
///
/// # Safety
/// `name` must be a NUL-terminated C string naming a libc symbol.
pub unsafe fn resolve_cached(cache: &AtomicPtr<c_void>, name: &CStr) -> *mut c_void {
    let cached = cache.load(Ordering::Acquire);
    if !cached.is_null() {
        return cached;
    }
    let resolved = unsafe { resolve(name) };
    cache.store(resolved, Ordering::Release);
    resolved
}

#[cfg(not(target_os = "macos"))]
unsafe fn resolve(name: &CStr) -> *mut c_void {
    unsafe { libc::dlsym(libc::RTLD_NEXT, name.as_ptr()) }
}

#[cfg(target_os = "macos")]
unsafe fn resolve(name: &CStr) -> *mut c_void {
    unsafe { crate::macos::resolve_original(name) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;

    #[test]
    #[cfg(not(target_os = "macos"))]
    fn resolves_and_caches_a_real_libc_symbol() {
        let cache = AtomicPtr::new(std::ptr::null_mut());
        let name = CString::new("getpid").unwrap();
        let first = unsafe { resolve_cached(&cache, &name) };
        assert!(!first.is_null());
        let second = unsafe { resolve_cached(&cache, &name) };
        assert_eq!(first, second);
    }
}
