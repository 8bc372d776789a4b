// SPDX-License-Identifier: GPL-3.0-or-later

//! Resolving a bare filename or relative path to the absolute executable
//! path `execvp`/`execvpe`/`execlp` need, following POSIX's own
//! `PATH`-search rules: a `PATH_MAX` guard on candidate length, and a
//! `confstr(_CS_PATH, ...)` fallback when `PATH` is unset.

use std::ffi::CString;
use std::path::{Path, PathBuf};

const PATH_MAX: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("no such file")]
    NotFound,
    #[error("not a regular file")]
    NotRegularFile,
    #[error("not executable")]
    NotExecutable,
    #[error("candidate path exceeds PATH_MAX")]
    TooLong,
}

/// Resolves `file` relative to the current working directory: used when
/// `file` already contains a directory separator, so no `PATH` search
/// applies.
pub fn from_current_directory(file: &Path) -> Result<PathBuf, ResolveError> {
    let absolute = if file.is_absolute() {
        file.to_path_buf()
    } else {
        std::env::current_dir().map_err(|_| ResolveError::NotFound)?.join(file)
    };
    let metadata = std::fs::metadata(&absolute).map_err(|_| ResolveError::NotFound)?;
    if !metadata.is_file() {
        return Err(ResolveError::NotRegularFile);
    }
    if !is_executable(&absolute) {
        return Err(ResolveError::NotExecutable);
    }
    Ok(absolute)
}

/// Searches `search_path` (a colon-separated list, as found in `PATH`) for
/// the first directory containing an executable regular file named `file`.
/// Empty segments are skipped per POSIX (they do not mean "current
/// directory" here, matching `execvp`'s stricter reading).
pub fn from_search_path(file: &Path, search_path: &str) -> Result<PathBuf, ResolveError> {
    if has_dir_separator(file) {
        return from_current_directory(file);
    }

    let mut last_err = ResolveError::NotFound;
    for dir in search_path.split(':') {
        if dir.is_empty() {
            continue;
        }
        let candidate_len = dir.len() + 1 + file.as_os_str().len();
        if candidate_len > PATH_MAX {
            last_err = ResolveError::TooLong;
            continue;
        }
        let candidate = Path::new(dir).join(file);
        match from_current_directory(&candidate) {
            Ok(resolved) => return Ok(resolved),
            Err(err) => last_err = err,
        }
    }
    Err(last_err)
}

/// Resolves `file` the way `execvp`/`execvpe` do: direct lookup if it
/// contains a directory separator, otherwise a `PATH` search, falling back
/// to `confstr(_CS_PATH, ...)` when `path_var` is absent or empty (POSIX's
/// prescribed behavior for a missing `PATH`).
pub fn from_path(file: &Path, path_var: Option<&str>) -> Result<PathBuf, ResolveError> {
    if has_dir_separator(file) {
        return from_current_directory(file);
    }
    match path_var {
        Some(path) if !path.is_empty() => from_search_path(file, path),
        _ => from_search_path(file, &confstr_path_default()),
    }
}

fn has_dir_separator(file: &Path) -> bool {
    file.to_string_lossy().contains('/')
}

/// Mirrors `execvp`'s own check: the effective-UID-aware `access(2)`, not a
/// raw mode-bit test, so resolution never picks a binary the loader itself
/// would refuse (e.g. one executable-by-owner-only but owned by someone
/// else).
fn is_executable(path: &Path) -> bool {
    use std::os::unix::ffi::OsStrExt;

    let Ok(cpath) = CString::new(path.as_os_str().as_bytes()) else {
        return false;
    };
    unsafe { libc::access(cpath.as_ptr(), libc::X_OK) == 0 }
}

/// The system's default `PATH` as reported by `confstr(_CS_PATH, ...)`,
/// used only when the caller's own `PATH` is missing or empty.
fn confstr_path_default() -> String {
    unsafe {
        let needed = libc::confstr(libc::_CS_PATH, std::ptr::null_mut(), 0);
        if needed <= 1 {
            return String::new();
        }
        let mut buf = vec![0u8; needed];
        let written = libc::confstr(libc::_CS_PATH, buf.as_mut_ptr() as *mut i8, buf.len());
        if written == 0 {
            return String::new();
        }
        let cstr = CString::from_vec_with_nul(buf[..written.min(buf.len())].to_vec())
            .unwrap_or_else(|_| CString::new("").unwrap());
        cstr.to_string_lossy().into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    #[test]
    fn resolves_an_absolute_direct_path() {
        let resolved = from_current_directory(Path::new("/bin/sh"));
        assert!(resolved.is_ok() || resolved == Err(ResolveError::NotFound));
    }

    #[test]
    fn finds_executable_in_search_path() {
        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join("tool");
        std::fs::write(&exe, b"#!/bin/sh\n").unwrap();
        let mut perms = std::fs::metadata(&exe).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&exe, perms).unwrap();

        let search_path = dir.path().to_string_lossy().into_owned();
        let resolved = from_search_path(Path::new("tool"), &search_path).unwrap();
        assert_eq!(resolved, exe);
    }

    #[test]
    fn skips_empty_path_segments() {
        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join("tool");
        std::fs::write(&exe, b"#!/bin/sh\n").unwrap();
        let mut perms = std::fs::metadata(&exe).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&exe, perms).unwrap();

        let search_path = format!("::{}:", dir.path().to_string_lossy());
        let resolved = from_search_path(Path::new("tool"), &search_path).unwrap();
        assert_eq!(resolved, exe);
    }

    #[test]
    fn rejects_a_non_executable_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("data.txt");
        std::fs::write(&file, b"not a program").unwrap();
        let err = from_current_directory(&file).unwrap_err();
        assert_eq!(err, ResolveError::NotExecutable);
    }

    #[test]
    fn a_name_with_a_slash_skips_path_search() {
        let err = from_search_path(Path::new("./does-not-exist"), "/some/other/dir").unwrap_err();
        assert_eq!(err, ResolveError::NotFound);
    }
}
