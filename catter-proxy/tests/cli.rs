// SPDX-License-Identifier: GPL-3.0-or-later

//! End-to-end exercises of the `catter-proxy` binary against a minimal fake
//! controller: spawn the real binary via `assert_cmd`, assert on its exit
//! code.

use std::io::{Read, Write};
use std::net::TcpListener;

use assert_cmd::Command;
use predicates::prelude::*;

/// Starts a one-shot fake controller on an ephemeral port: reads exactly one
/// length-prefixed JSON frame, and if it is a `make_decision` request,
/// answers with `decision_json`. Returns the address to point
/// `CATTER_CONTROLLER_ADDR` at.
fn spawn_fake_controller(decision_json: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    let address = listener.local_addr().expect("local addr").to_string();

    std::thread::spawn(move || {
        for stream in listener.incoming() {
            let mut stream = match stream {
                Ok(s) => s,
                Err(_) => continue,
            };

            let mut length_bytes = [0u8; 4];
            if stream.read_exact(&mut length_bytes).is_err() {
                continue;
            }
            let length = u32::from_be_bytes(length_bytes) as usize;
            let mut body = vec![0u8; length];
            if stream.read_exact(&mut body).is_err() {
                continue;
            }
            let text = String::from_utf8_lossy(&body);

            if text.contains("\"make_decision\"") {
                let reply = decision_json.as_bytes();
                let reply_len = (reply.len() as u32).to_be_bytes();
                let _ = stream.write_all(&reply_len);
                let _ = stream.write_all(reply);
            }
            // `report_error`/`finish` are one-way notifications: nothing to
            // write back.
        }
    });

    address
}

#[test]
fn missing_parent_id_exits_nonzero_without_touching_the_network() {
    Command::cargo_bin("catter-proxy")
        .unwrap()
        .env("RUST_LOG", "error")
        .arg("--")
        .arg("/bin/true")
        .assert()
        .failure()
        .stderr(predicate::str::contains("-p").or(predicate::str::contains("required")));
}

#[test]
fn drop_decision_exits_zero_without_running_the_command() {
    let address = spawn_fake_controller(r#"{"action":"drop","new_command_id":null}"#);

    Command::cargo_bin("catter-proxy")
        .unwrap()
        .env("CATTER_CONTROLLER_ADDR", address)
        .args(["-p", "1", "--", "/bin/false"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

#[test]
fn wrap_decision_runs_the_command_and_reflects_its_exit_code() {
    let address = spawn_fake_controller(r#"{"action":"wrap","new_command_id":null}"#);

    Command::cargo_bin("catter-proxy")
        .unwrap()
        .env("CATTER_CONTROLLER_ADDR", address)
        .args(["-p", "1", "--", "/bin/false"])
        .assert()
        .failure();
}

#[test]
fn inject_decision_runs_the_command_and_reports_completion() {
    let address = spawn_fake_controller(r#"{"action":"inject","new_command_id":"2"}"#);

    Command::cargo_bin("catter-proxy")
        .unwrap()
        .env("CATTER_CONTROLLER_ADDR", address)
        .args(["-p", "1", "--", "/bin/true"])
        .assert()
        .success();
}

#[test]
fn unreachable_controller_exits_nonzero() {
    Command::cargo_bin("catter-proxy")
        .unwrap()
        .env("CATTER_CONTROLLER_ADDR", "127.0.0.1:1")
        .args(["-p", "1", "--", "/bin/true"])
        .assert()
        .failure();
}
