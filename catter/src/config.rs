// SPDX-License-Identifier: GPL-3.0-or-later

//! The handful of tunables that do not belong in the wire protocol: where
//! the recorder writes, how long the proxy waits for the controller to
//! answer, and the controller's own address. Read from the environment with
//! documented defaults.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::env_keys::{KEY_CONNECT_TIMEOUT_MS, KEY_CONTROLLER_ADDR, KEY_RECORD_DIR};

const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 2_000;
const DEFAULT_CONTROLLER_ADDR: &str = "127.0.0.1:7878";

#[derive(Debug, Clone)]
pub struct Config {
    /// Recording is disabled unless `CATTER_RECORD_DIR` is set.
    pub record_dir: Option<PathBuf>,
    /// Overridable via `CATTER_CONNECT_TIMEOUT_MS`; falls back to
    /// `DEFAULT_CONNECT_TIMEOUT_MS` if unset or unparseable.
    pub connect_timeout: Duration,
    /// Where `catter-proxy` dials the controller. Overridable via
    /// `CATTER_CONTROLLER_ADDR`; falls back to a loopback default so a
    /// proxy invocation without one still fails at connect time with a
    /// readable `RpcError` instead of panicking on a missing config value.
    pub controller_addr: SocketAddr,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            record_dir: std::env::var_os(KEY_RECORD_DIR).map(PathBuf::from),
            connect_timeout: std::env::var(KEY_CONNECT_TIMEOUT_MS)
                .ok()
                .and_then(|value| value.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or_else(|| Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS)),
            controller_addr: std::env::var(KEY_CONTROLLER_ADDR)
                .ok()
                .and_then(|value| value.parse().ok())
                .unwrap_or_else(default_controller_addr),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            record_dir: None,
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
            controller_addr: default_controller_addr(),
        }
    }
}

fn default_controller_addr() -> SocketAddr {
    DEFAULT_CONTROLLER_ADDR.parse().expect("default controller address is well-formed")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_no_record_dir() {
        let config = Config::default();
        assert!(config.record_dir.is_none());
        assert_eq!(config.connect_timeout, Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS));
        assert_eq!(config.controller_addr, default_controller_addr());
    }

    #[test]
    fn invalid_controller_addr_falls_back_to_default() {
        // SAFETY: test process, no other thread reads env concurrently here.
        unsafe { std::env::set_var(KEY_CONTROLLER_ADDR, "not-an-address") };
        let config = Config::from_env();
        assert_eq!(config.controller_addr, default_controller_addr());
        unsafe { std::env::remove_var(KEY_CONTROLLER_ADDR) };
    }

    #[test]
    fn connect_timeout_override_is_read_from_env() {
        // SAFETY: test process, no other thread reads env concurrently here.
        unsafe { std::env::set_var(KEY_CONNECT_TIMEOUT_MS, "500") };
        let config = Config::from_env();
        assert_eq!(config.connect_timeout, Duration::from_millis(500));
        unsafe { std::env::remove_var(KEY_CONNECT_TIMEOUT_MS) };
    }

    #[test]
    fn invalid_connect_timeout_falls_back_to_default() {
        // SAFETY: test process, no other thread reads env concurrently here.
        unsafe { std::env::set_var(KEY_CONNECT_TIMEOUT_MS, "not-a-number") };
        let config = Config::from_env();
        assert_eq!(config.connect_timeout, Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS));
        unsafe { std::env::remove_var(KEY_CONNECT_TIMEOUT_MS) };
    }
}
