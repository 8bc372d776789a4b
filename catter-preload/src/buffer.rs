// SPDX-License-Identifier: GPL-3.0-or-later

//! The no-allocator scratch arenas backing the hot path of every hook.
//!
//! `execve` may run between `fork`/`vfork` and the replacement of the
//! process image, where the host's heap allocator cannot be assumed to be
//! in a safe state. Every byte the hooks need after library load comes from
//! one of these two statics instead: `Buffer` for C-string bytes, `PtrArena`
//! for the `argv`/`envp`-style null-terminated pointer arrays built on top
//! of them. Both are append-only and refuse to overflow silently.
//!
//! `store` copies bytes plus a NUL terminator; `push` copies bytes without
//! one, for assembling one long string — the error diagnostic — out of
//! several fragments.

use std::cell::UnsafeCell;
use std::os::raw::c_char;

/// A few multiples of `PATH_MAX` (4096).
const CAPACITY: usize = 64 * 4096;
const MAX_PTRS: usize = 512;

pub struct Buffer {
    data: UnsafeCell<[u8; CAPACITY]>,
    len: UnsafeCell<usize>,
}

// Safety: every hook call is single-writer for the duration of its own
// append sequence (it runs to completion, then immediately invokes the
// underlying exec/spawn). Concurrent callers on different
// threads racing on the same arena is a documented, accepted tradeoff for
// the `execve` family, where the arena content only needs to survive until
// this thread's own exec call; `posix_spawn`, which returns control to the
// caller, instead uses a stack-local array rather than this arena (see
// `executor::SpawnStorage`/`executor::plan_posix_spawn`).
unsafe impl Sync for Buffer {}

impl Buffer {
    pub const fn new() -> Self {
        Buffer { data: UnsafeCell::new([0u8; CAPACITY]), len: UnsafeCell::new(0) }
    }

    /// Returns the current write offset, to be passed to a later `finish`
    /// call when assembling a string out of several `push` fragments.
    ///
    /// # Safety
    /// Must only be read/written from a single hook invocation at a time.
    pub unsafe fn mark(&self) -> usize {
        unsafe { *self.len.get() }
    }

    /// Appends `bytes` without a terminator. Returns `false` on overflow,
    /// leaving previously written bytes untouched.
    ///
    /// # Safety
    /// Must only be called while no other append on this arena is in flight
    /// on this thread.
    pub unsafe fn push(&self, bytes: &[u8]) -> bool {
        unsafe {
            let len = *self.len.get();
            if len + bytes.len() > CAPACITY {
                return false;
            }
            let data = &mut *self.data.get();
            data[len..len + bytes.len()].copy_from_slice(bytes);
            *self.len.get() = len + bytes.len();
            true
        }
    }

    /// Appends `bytes` plus a trailing NUL and returns a pointer to the
    /// start of this store, or `None` on overflow.
    ///
    /// # Safety
    /// Same contract as `push`.
    pub unsafe fn store(&self, bytes: &[u8]) -> Option<*const c_char> {
        unsafe {
            let mark = self.mark();
            if !self.push(bytes) {
                return None;
            }
            self.finish(mark)
        }
    }

    /// Terminates the bytes written since `mark` with a NUL and returns a
    /// pointer to `mark`. Used after one or more `push` calls to finish
    /// assembling a single C string out of multiple fragments.
    ///
    /// # Safety
    /// Same contract as `push`.
    pub unsafe fn finish(&self, mark: usize) -> Option<*const c_char> {
        unsafe {
            if !self.push(&[0]) {
                return None;
            }
            let data = &*self.data.get();
            Some(data.as_ptr().add(mark) as *const c_char)
        }
    }
}

pub struct PtrArena {
    data: UnsafeCell<[*const c_char; MAX_PTRS]>,
    len: UnsafeCell<usize>,
}

unsafe impl Sync for PtrArena {}

impl PtrArena {
    pub const fn new() -> Self {
        PtrArena { data: UnsafeCell::new([std::ptr::null(); MAX_PTRS]), len: UnsafeCell::new(0) }
    }

    /// Copies `ptrs` into the arena, appends a trailing null pointer, and
    /// returns a pointer to the start of the copy. Returns `None` on
    /// overflow.
    ///
    /// # Safety
    /// Same single-writer-per-call contract as `Buffer`.
    pub unsafe fn store(&self, ptrs: &[*const c_char]) -> Option<*const *const c_char> {
        unsafe {
            let len = *self.len.get();
            let needed = ptrs.len() + 1;
            if len + needed > MAX_PTRS {
                return None;
            }
            let data = &mut *self.data.get();
            data[len..len + ptrs.len()].copy_from_slice(ptrs);
            data[len + ptrs.len()] = std::ptr::null();
            *self.len.get() = len + needed;
            Some(data.as_ptr().add(len))
        }
    }
}

/// A `Buffer`-equivalent backed by a caller-owned byte slice instead of
/// process-global static storage. `posix_spawn` returns control to its
/// caller rather than replacing the process image, so its argv/envp
/// scratch lives on the hook's own stack frame for the duration of the one
/// call instead of racing other threads over the shared static `Buffer`.
pub struct StackCursor<'a> {
    data: &'a mut [u8],
    len: usize,
}

impl<'a> StackCursor<'a> {
    pub fn new(data: &'a mut [u8]) -> Self {
        StackCursor { data, len: 0 }
    }

    pub fn mark(&self) -> usize {
        self.len
    }

    pub fn push(&mut self, bytes: &[u8]) -> bool {
        if self.len + bytes.len() > self.data.len() {
            return false;
        }
        self.data[self.len..self.len + bytes.len()].copy_from_slice(bytes);
        self.len += bytes.len();
        true
    }

    pub fn store(&mut self, bytes: &[u8]) -> Option<*const c_char> {
        let mark = self.mark();
        if !self.push(bytes) {
            return None;
        }
        self.finish(mark)
    }

    pub fn finish(&mut self, mark: usize) -> Option<*const c_char> {
        if !self.push(&[0]) {
            return None;
        }
        Some(unsafe { self.data.as_ptr().add(mark) as *const c_char })
    }
}

/// Stack-local equivalent of `PtrArena`, used by the `posix_spawn` path.
pub struct StackPtrCursor<'a> {
    data: &'a mut [*const c_char],
    len: usize,
}

impl<'a> StackPtrCursor<'a> {
    pub fn new(data: &'a mut [*const c_char]) -> Self {
        StackPtrCursor { data, len: 0 }
    }

    /// Copies `ptrs` in, appends a null terminator, returns a pointer to the
    /// start of the copy, or `None` on overflow.
    pub fn store(&mut self, ptrs: &[*const c_char]) -> Option<*const *const c_char> {
        let needed = ptrs.len() + 1;
        if self.len + needed > self.data.len() {
            return None;
        }
        let start = self.len;
        self.data[start..start + ptrs.len()].copy_from_slice(ptrs);
        self.data[start + ptrs.len()] = std::ptr::null();
        self.len += needed;
        Some(unsafe { self.data.as_ptr().add(start) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CStr;

    #[test]
    fn store_round_trips_a_string() {
        let buffer = Buffer::new();
        let ptr = unsafe { buffer.store(b"hello") }.unwrap();
        let text = unsafe { CStr::from_ptr(ptr) }.to_str().unwrap();
        assert_eq!(text, "hello");
    }

    #[test]
    fn push_then_finish_assembles_fragments() {
        let buffer = Buffer::new();
        let mark = unsafe { buffer.mark() };
        assert!(unsafe { buffer.push(b"foo") });
        assert!(unsafe { buffer.push(b"bar") });
        let ptr = unsafe { buffer.finish(mark) }.unwrap();
        let text = unsafe { CStr::from_ptr(ptr) }.to_str().unwrap();
        assert_eq!(text, "foobar");
    }

    #[test]
    fn store_reports_overflow_without_panicking() {
        let buffer = Buffer::new();
        let huge = vec![b'x'; CAPACITY + 1];
        assert!(unsafe { buffer.store(&huge) }.is_none());
    }

    #[test]
    fn ptr_arena_null_terminates() {
        let arena = PtrArena::new();
        let a = b"a\0".as_ptr() as *const c_char;
        let b = b"b\0".as_ptr() as *const c_char;
        let ptr = unsafe { arena.store(&[a, b]) }.unwrap();
        unsafe {
            assert_eq!(*ptr, a);
            assert_eq!(*ptr.add(1), b);
            assert!((*ptr.add(2)).is_null());
        }
    }

    #[test]
    fn stack_cursor_round_trips_a_string() {
        let mut bytes = [0u8; 64];
        let mut cursor = StackCursor::new(&mut bytes);
        let ptr = cursor.store(b"hello").unwrap();
        let text = unsafe { CStr::from_ptr(ptr) }.to_str().unwrap();
        assert_eq!(text, "hello");
    }

    #[test]
    fn stack_cursor_reports_overflow() {
        let mut bytes = [0u8; 4];
        let mut cursor = StackCursor::new(&mut bytes);
        assert!(cursor.store(b"too long").is_none());
    }

    #[test]
    fn stack_ptr_cursor_null_terminates() {
        let mut ptrs = [std::ptr::null(); 4];
        let mut cursor = StackPtrCursor::new(&mut ptrs);
        let a = b"a\0".as_ptr() as *const c_char;
        let out = cursor.store(&[a]).unwrap();
        unsafe {
            assert_eq!(*out, a);
            assert!((*out.add(1)).is_null());
        }
    }
}
