// SPDX-License-Identifier: GPL-3.0-or-later

//! The preloaded hook library: `LD_PRELOAD`/`DYLD_INSERT_LIBRARIES` loads
//! this into every process that inherits the environment a `catter-proxy`
//! invocation set up, and every `exec*`/`posix_spawn*` call the process
//! makes afterwards is rerouted through the proxy instead of running
//! directly.
//!
//! Module map, roughly in the order a call actually flows through them:
//!
//! - [`lifecycle`] (C7): load-time bootstrap, idempotent via `ctor`/`dtor`.
//! - [`session`] (C3): the per-process facts read once from the environment.
//! - [`env`]: byte-level `KEY=VALUE` lookup over a raw `envp`, no allocator.
//! - [`resolver`] (C2): `PATH`/search-path resolution, mirroring
//!   `execvp`/`execvpe`'s own rules.
//! - [`buffer`]: the no-heap scratch arenas (static and on-stack) every
//!   hot-path write lands in.
//! - [`command`]: builds the replacement argv that hands a call off to the
//!   proxy, or reports a resolution failure to it.
//! - [`envinject`]: builds the child's injected environment (preload key,
//!   session keys, and the rest of the parent's environment untouched).
//! - [`executor`] (C6): the state machine tying the above together for one
//!   intercepted call.
//! - [`hooks`] (C8): the exported entry points themselves.
//! - [`error`]: the `HookError` taxonomy threaded through all of the above.
//! - [`symbol`]: cached `dlsym(RTLD_NEXT, ...)` resolution of the real libc
//!   functions the hooks eventually fall back to or forward into.
//! - [`macos`]: macOS-only `__DATA,__interpose` wiring, since `dyld` has no
//!   `RTLD_NEXT` and no by-name shadowing.

mod buffer;
mod command;
mod env;
mod envinject;
mod error;
mod executor;
mod hooks;
mod lifecycle;

// `catter-proxy` re-resolves a command's executable itself, since the
// controller may have substituted a different one, reusing this same
// `PATH`-search logic rather than duplicating it.
pub mod resolver;
mod session;
mod symbol;

#[cfg(target_os = "macos")]
mod macos;

// Hook entry points are reached by the dynamic linker (by name on
// Linux/BSD, by address via `macos::Interpose` on macOS), never by a Rust
// caller, so nothing needs to be re-exported here.
