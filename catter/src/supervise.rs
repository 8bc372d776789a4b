// SPDX-License-Identifier: GPL-3.0-or-later

//! Supervises a spawned child process: waits for its completion while
//! forwarding termination signals, so an `INJECT`/`WRAP`'d child behaves
//! like any other foreground subprocess of the proxy.

use std::process::{Command, ExitStatus};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time;

/// Spawns `command`, waits for it to exit, forwarding any received
/// termination signal to the child in the meantime.
pub fn supervise(mut command: Command) -> std::io::Result<ExitStatus> {
    let signaled = Arc::new(AtomicUsize::new(0));
    for signal in signal_hook::consts::TERM_SIGNALS {
        // Registration failure here would mean the process can't trust signal
        // forwarding at all; surface it rather than supervise blind.
        signal_hook::flag::register_usize(*signal, Arc::clone(&signaled), *signal as usize)
            .map_err(|e| std::io::Error::other(e.to_string()))?;
    }

    let mut child = command.spawn()?;
    loop {
        if signaled.swap(0, Ordering::SeqCst) != 0 {
            log::debug!("received signal, forwarding to child process");
            child.kill()?;
        }

        match child.try_wait() {
            Ok(Some(exit_status)) => {
                log::debug!("child process exited with {exit_status}");
                return Ok(exit_status);
            }
            Ok(None) => {
                thread::sleep(time::Duration::from_millis(100));
            }
            Err(e) => {
                log::error!("error waiting for child process: {e}");
                return Err(e);
            }
        }
    }
}
