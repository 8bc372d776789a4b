// SPDX-License-Identifier: GPL-3.0-or-later

//! The optional, best-effort execution recorder.
//!
//! When `CATTER_RECORD_DIR` is set, every rewritten command gets one line
//! appended to a file named after the calling process and thread id. This
//! is purely diagnostic: failures to record are logged and swallowed, never
//! propagated — a recording failure must never turn into a failed `execve`.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::config::Config;

/// Prefix marking a recorder line as an error report rather than a captured
/// command: lines starting with this denote errors, all others are
/// captured commands. Concatenated directly against the message with no
/// separating space.
pub const ERROR_PREFIX: &str = "linux or mac error found in hook:";

/// A recorder bound to a single process/thread's output file, or disabled.
pub enum Recorder {
    Enabled { path: PathBuf },
    Disabled,
}

impl Recorder {
    /// Builds a recorder from the environment, using the calling process id
    /// and thread id to name its output file.
    pub fn from_config(config: &Config, pid: u32, tid: u64) -> Self {
        match &config.record_dir {
            Some(dir) => Recorder::Enabled { path: dir.join(format!("{pid}-{tid}")) },
            None => Recorder::Disabled,
        }
    }

    /// Appends one diagnostic line describing a rewritten command. Never
    /// fails visibly: I/O errors are logged at debug level and dropped.
    pub fn record(&self, executable: &Path, arguments: &[String]) {
        let line = format!("{} {}\n", executable.display(), arguments.join(" "));
        self.append(&line);
    }

    /// Appends one error-report line, prefixed so a later reader of the
    /// file can tell a failed attempt apart from a captured command
    /// without re-parsing each line's shape.
    pub fn record_error(&self, message: &str) {
        let line = format!("{ERROR_PREFIX}{message}\n");
        self.append(&line);
    }

    fn append(&self, line: &str) {
        let Recorder::Enabled { path } = self else { return };

        match OpenOptions::new().create(true).append(true).open(path) {
            Ok(mut file) => {
                if let Err(e) = file.write_all(line.as_bytes()) {
                    log::debug!("failed to append to recorder file {}: {e}", path.display());
                }
            }
            Err(e) => {
                log::debug!("failed to open recorder file {}: {e}", path.display());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_recorder_never_writes() {
        let recorder = Recorder::Disabled;
        // Should not panic even though there is no backing file.
        recorder.record(Path::new("/bin/true"), &["true".to_string()]);
    }

    #[test]
    fn enabled_recorder_appends_a_line() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = Recorder::Enabled { path: dir.path().join("123-1") };
        recorder.record(Path::new("/bin/echo"), &["echo".to_string(), "hi".to_string()]);

        let contents = std::fs::read_to_string(dir.path().join("123-1")).unwrap();
        assert_eq!(contents, "/bin/echo echo hi\n");
    }

    #[test]
    fn enabled_recorder_prefixes_errors() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = Recorder::Enabled { path: dir.path().join("123-2") };
        recorder.record_error("no such file or directory");

        let contents = std::fs::read_to_string(dir.path().join("123-2")).unwrap();
        assert_eq!(contents, "linux or mac error found in hook:no such file or directory\n");
    }
}
