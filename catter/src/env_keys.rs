// SPDX-License-Identifier: GPL-3.0-or-later

//! Environment variable keys shared between the preload library and the
//! proxy executable.
//!
//! Unlike a JSON-blob session, these are plain `KEY=VALUE` entries: the hook
//! surface is not allowed to allocate, so the session state it hands down to
//! a child process has to be two independent raw strings rather than a
//! serialized structure.

/// Carries the absolute path of the proxy executable that a hooked call has
/// been rewritten to run instead of the original target.
pub const KEY_PROXY_PATH: &str = "__key_catter_proxy_path_v1";

/// Carries the opaque command identifier for the current session, handed
/// back to the controller on every subsequent RPC so it can correlate
/// parent/child executions.
pub const KEY_COMMAND_ID: &str = "__key_catter_command_id_v1";

/// Present (with any non-empty value) in the environment of a process that
/// *is* the proxy itself, so the hook surface can recognize and skip it
/// rather than re-wrapping the proxy's own exec calls.
pub const KEY_IS_PROXY: &str = "exec_is_catter_proxy_v1";

/// The dynamic loader's preload-path variable, which differs between Linux
/// (and the BSDs) and macOS.
#[cfg(target_os = "macos")]
pub const KEY_PRELOAD_PATH: &str = "DYLD_INSERT_LIBRARIES";
#[cfg(not(target_os = "macos"))]
pub const KEY_PRELOAD_PATH: &str = "LD_PRELOAD";

/// The search path variable consulted by `execvp`/`execvpe`.
pub const KEY_PATH: &str = "PATH";

/// Recorder output directory. Absent means recording is disabled.
pub const KEY_RECORD_DIR: &str = "CATTER_RECORD_DIR";

/// Overrides how long `catter-proxy` waits to connect to the controller, in
/// milliseconds. Absent means the documented default applies.
pub const KEY_CONNECT_TIMEOUT_MS: &str = "CATTER_CONNECT_TIMEOUT_MS";

/// The controller's `host:port` address, read by `catter-proxy` on every
/// invocation. Kept as an environment key rather than a CLI flag so the
/// preload library's own injected environment can carry it down to every
/// descendant proxy invocation the same way it already carries the two
/// session keys.
pub const KEY_CONTROLLER_ADDR: &str = "CATTER_CONTROLLER_ADDR";
