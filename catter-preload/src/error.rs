// SPDX-License-Identifier: GPL-3.0-or-later

//! The hook library's own error taxonomy. Distinct
//! from `catter::CatterError`: everything here can be raised from the
//! no-allocator hot path, so variants carry no heap-owned data, only the
//! `errno` value a hook should report back to its caller on failure.

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum HookError {
    #[error("invalid argument")]
    InvalidArgument,
    #[error("no valid interception session")]
    InvalidSession,
    #[error("could not resolve the executable")]
    ResolutionFailed,
    #[error("could not resolve the underlying libc symbol")]
    SymbolUnresolved,
    #[error("scratch buffer exhausted")]
    BufferOverflow,
    #[error("the underlying syscall failed")]
    UnderlyingSyscallFailed,
}

impl HookError {
    /// The `errno` value a hook should leave behind before returning -1.
    pub fn errno(self) -> libc::c_int {
        match self {
            HookError::InvalidArgument => libc::EFAULT,
            HookError::InvalidSession => libc::EINVAL,
            HookError::ResolutionFailed => libc::ENOENT,
            HookError::SymbolUnresolved => libc::ENOSYS,
            HookError::BufferOverflow => libc::ENOMEM,
            HookError::UnderlyingSyscallFailed => current_errno(),
        }
    }
}

#[cfg(target_os = "macos")]
fn current_errno() -> libc::c_int {
    unsafe { *libc::__error() }
}

#[cfg(not(target_os = "macos"))]
fn current_errno() -> libc::c_int {
    unsafe { *libc::__errno_location() }
}
