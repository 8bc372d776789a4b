// SPDX-License-Identifier: GPL-3.0-or-later

//! The controller contract.
//!
//! The decision *policy* lives outside this repo entirely — some external
//! process that the proxy talks to over a channel it doesn't otherwise care
//! about. `Controller` is that boundary expressed as a trait. `tcp` is one
//! concrete, swappable implementation, so `catter-proxy` is runnable end to
//! end without this repo inventing a real controller.

pub mod tcp;

use thiserror::Error;

use crate::protocol::{Command, Decision};

/// Operations a proxy invocation performs against the controller, in the
/// order a single dispatch calls them.
pub trait Controller {
    /// Ask the controller what to do with an intercepted command. Returns
    /// the decision (`Drop`/`Inject`/`Wrap`) and, when relevant, the command
    /// identifier the child execution should carry forward.
    fn make_decision(
        &self,
        parent_id: &str,
        command: &Command,
    ) -> Result<Decision, RpcError>;

    /// Report that running the decided-upon command failed, so the
    /// controller can record the failure against the session.
    fn report_error(&self, command_id: &str, message: &str) -> Result<(), RpcError>;

    /// Tell the controller this command's lifecycle is over (the child, if
    /// any, has exited) and report its exit status.
    fn finish(&self, command_id: &str, exit_code: i32) -> Result<(), RpcError>;
}

#[derive(Error, Debug)]
pub enum RpcError {
    #[error("network error: {0}")]
    Network(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
