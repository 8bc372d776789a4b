// SPDX-License-Identifier: GPL-3.0-or-later

//! The shared error taxonomy for the parts of the pipeline that run with a
//! normal heap (the proxy and its RPC/supervision/recording services). The
//! preload library's own hot path has a stricter, allocation-free error
//! type of its own (`catter_preload::error::HookError`); this one is for
//! everything downstream of the exec rewrite.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CatterError {
    #[error("controller RPC failed: {0}")]
    Rpc(#[from] crate::rpc::RpcError),

    #[error("failed to supervise child process: {0}")]
    Supervise(#[from] std::io::Error),

    #[error("invalid session: {0}")]
    InvalidSession(String),
}
