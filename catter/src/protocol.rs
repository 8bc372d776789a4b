// SPDX-License-Identifier: GPL-3.0-or-later

//! The wire model exchanged between the proxy executable and the external
//! controller: a captured command, the controller's decision on what to do
//! with it, and the envelope the two travel in.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A single intercepted process creation, as seen by the proxy.
///
/// This is deliberately richer than the no-allocator `Command` the preload
/// library builds on the hot path: by the time the proxy constructs one of
/// these, we are a freshly exec'd process with a normal heap, so there is no
/// reason to economize on it.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub struct Command {
    pub executable: PathBuf,
    pub arguments: Vec<String>,
    pub working_dir: PathBuf,
    pub environment: HashMap<String, String>,
}

impl Command {
    pub fn capture(executable: PathBuf, arguments: Vec<String>) -> std::io::Result<Self> {
        let working_dir = std::env::current_dir()?;
        let environment = std::env::vars().collect();
        Ok(Self { executable, arguments, working_dir, environment })
    }
}

/// What the controller decided to do with a command.
///
/// `Wrap` runs the command unmodified, without further interception.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Drop,
    Inject,
    Wrap,
}

/// The envelope sent to the controller for a single command.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub struct DataToController {
    pub command_id: String,
    pub parent_id: String,
    pub command: Command,
    /// Milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
}

/// The controller's reply to a `make_decision` call.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub struct Decision {
    pub action: Action,
    /// The command identifier the child should carry forward, if the action
    /// requires continued interception.
    pub new_command_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_round_trips_through_json() {
        let decision = Decision { action: Action::Inject, new_command_id: Some("c-2".into()) };
        let text = serde_json::to_string(&decision).unwrap();
        let back: Decision = serde_json::from_str(&text).unwrap();
        assert_eq!(decision, back);
    }

    #[test]
    fn wrap_action_serializes_as_snake_case() {
        let text = serde_json::to_string(&Action::Wrap).unwrap();
        assert_eq!(text, "\"wrap\"");
    }
}
