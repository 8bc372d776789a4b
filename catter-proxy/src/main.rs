// SPDX-License-Identifier: GPL-3.0-or-later

//! The proxy executable: the program every rewritten `exec*`/
//! `posix_spawn*` call actually runs. Reads the grammar `args` module
//! parses, talks to the controller over `catter::rpc`, and dispatches
//! DROP/INJECT/WRAP.

mod args;
mod env_prep;

use std::path::PathBuf;
use std::process::Command as ChildCommand;

use catter::config::Config;
use catter::env_keys::KEY_IS_PROXY;
use catter::protocol::{Action, Command, Decision};
use catter::rpc::tcp::TcpController;
use catter::rpc::Controller;

use args::Invocation;

fn main() {
    env_logger::init();

    // Marks this process as the proxy itself before anything else runs, so
    // any of this process's own exec/posix_spawn calls short-circuit
    // through the hook library's guard rather than being rewritten again.
    //
    // SAFETY: the very first thing `main` does, on the only thread that
    // exists at this point.
    unsafe { std::env::set_var(KEY_IS_PROXY, "v1") };

    let config = Config::from_env();
    let controller = TcpController::new(config.controller_addr, config.connect_timeout);

    let exit_code = match args::parse(std::env::args()) {
        Ok(Invocation::Diagnostic { parent_id, message }) => run_diagnostic(&controller, &parent_id, &message),
        Ok(Invocation::Run { parent_id, executable, arguments }) => {
            run_command(&controller, &parent_id, &executable, arguments)
        }
        Err(e) => {
            log::error!("catter-proxy: {e:#}");
            -1
        }
    };

    std::process::exit(exit_code);
}

/// The hook library could not build a real command. Forward its
/// diagnostic to the controller and exit nonzero.
fn run_diagnostic(controller: &TcpController, parent_id: &str, message: &str) -> i32 {
    log::warn!("catter-proxy: reporting diagnostic for {parent_id}: {message}");
    if let Err(e) = controller.report_error(parent_id, message) {
        log::error!("catter-proxy: failed to report diagnostic to controller: {e}");
    }
    -1
}

/// Re-resolve the executable, consult the controller, dispatch, report
/// completion.
fn run_command(controller: &TcpController, parent_id: &str, executable: &str, arguments: Vec<String>) -> i32 {
    let resolved = match resolve(executable) {
        Ok(path) => path,
        Err(e) => return fail(controller, parent_id, &format!("could not resolve {executable}: {e}")),
    };

    let command = match Command::capture(resolved, arguments) {
        Ok(command) => command,
        Err(e) => return fail(controller, parent_id, &format!("could not capture command: {e}")),
    };

    let decision = match controller.make_decision(parent_id, &command) {
        Ok(decision) => decision,
        Err(e) => return fail(controller, parent_id, &format!("controller RPC failed: {e}")),
    };

    match decision.action {
        Action::Drop => {
            log::info!("catter-proxy: dropping command for {parent_id}");
            0
        }
        Action::Wrap => run_wrapped(controller, parent_id, &command),
        Action::Inject => run_injected(controller, parent_id, &command, &decision),
    }
}

fn run_wrapped(controller: &TcpController, parent_id: &str, command: &Command) -> i32 {
    let mut child = ChildCommand::new(&command.executable);
    child.args(&command.arguments);
    child.current_dir(&command.working_dir);
    env_prep::prepare_wrapped(&mut child);

    match catter::supervise::supervise(child) {
        Ok(status) => status.code().unwrap_or(1),
        Err(e) => fail(controller, parent_id, &format!("failed to run wrapped command: {e}")),
    }
}

fn run_injected(controller: &TcpController, parent_id: &str, command: &Command, decision: &Decision) -> i32 {
    let new_command_id = decision.new_command_id.clone().unwrap_or_else(|| parent_id.to_string());

    let mut child = ChildCommand::new(&command.executable);
    child.args(&command.arguments);
    child.current_dir(&command.working_dir);
    if let Err(e) = env_prep::prepare_injected(&mut child, &new_command_id) {
        return fail(controller, parent_id, &format!("failed to prepare injected environment: {e}"));
    }

    let exit_code = match catter::supervise::supervise(child) {
        Ok(status) => status.code().unwrap_or(1),
        Err(e) => return fail(controller, parent_id, &format!("failed to run injected command: {e}")),
    };

    // Only `INJECT` produced a fresh command id worth reporting lifecycle
    // completion against; `DROP`/`WRAP` return their exit code without it.
    if let Err(e) = controller.finish(&new_command_id, exit_code) {
        log::warn!("catter-proxy: failed to report completion to controller: {e}");
    }

    exit_code
}

fn resolve(executable: &str) -> Result<PathBuf, catter_hook::resolver::ResolveError> {
    let path = std::path::Path::new(executable);
    let path_var = std::env::var(catter::env_keys::KEY_PATH).ok();
    catter_hook::resolver::from_path(path, path_var.as_deref())
}

/// Any unexpected failure in the proxy's own logic: report it to the
/// controller and exit nonzero.
fn fail(controller: &TcpController, parent_id: &str, message: &str) -> i32 {
    log::error!("catter-proxy: {message}");
    if let Err(e) = controller.report_error(parent_id, message) {
        log::error!("catter-proxy: failed to report error to controller: {e}");
    }
    -1
}
