// SPDX-License-Identifier: GPL-3.0-or-later

//! A length-prefixed JSON-over-TCP implementation of the controller
//! contract: a 4-byte big-endian length followed by the JSON payload. One
//! connection is opened and closed per call.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

use serde::{Serialize, de::DeserializeOwned};

use super::{Controller, RpcError};
use crate::protocol::{Command, DataToController, Decision};

/// The request envelopes sent over the wire. `make_decision` carries the
/// full `DataToController` payload; the others are light notifications.
#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Request<'a> {
    MakeDecision(&'a DataToController),
    ReportError { command_id: &'a str, message: &'a str },
    Finish { command_id: &'a str, exit_code: i32 },
}

pub struct TcpController {
    address: SocketAddr,
    connect_timeout: Duration,
}

impl TcpController {
    pub fn new(address: SocketAddr, connect_timeout: Duration) -> Self {
        Self { address, connect_timeout }
    }

    fn call<T: DeserializeOwned>(&self, request: &Request) -> Result<T, RpcError> {
        let mut stream = TcpStream::connect_timeout(&self.address, self.connect_timeout)?;
        write_frame(&mut stream, request)?;
        read_frame(&mut stream)
    }

    fn notify(&self, request: &Request) -> Result<(), RpcError> {
        let mut stream = TcpStream::connect_timeout(&self.address, self.connect_timeout)?;
        write_frame(&mut stream, request)
    }
}

fn write_frame(writer: &mut impl Write, value: &impl Serialize) -> Result<(), RpcError> {
    let bytes = serde_json::to_vec(value)?;
    let length = bytes.len() as u32;
    writer.write_all(&length.to_be_bytes())?;
    writer.write_all(&bytes)?;
    Ok(())
}

fn read_frame<T: DeserializeOwned>(reader: &mut impl Read) -> Result<T, RpcError> {
    let mut length_bytes = [0u8; 4];
    reader.read_exact(&mut length_bytes)?;
    let length = u32::from_be_bytes(length_bytes) as usize;

    let mut buffer = vec![0u8; length];
    reader.read_exact(&mut buffer)?;
    Ok(serde_json::from_slice(&buffer)?)
}

impl Controller for TcpController {
    fn make_decision(&self, parent_id: &str, command: &Command) -> Result<Decision, RpcError> {
        let envelope = DataToController {
            command_id: parent_id.to_string(),
            parent_id: parent_id.to_string(),
            command: command.clone(),
            timestamp_ms: now_ms(),
        };
        self.call(&Request::MakeDecision(&envelope))
    }

    fn report_error(&self, command_id: &str, message: &str) -> Result<(), RpcError> {
        self.notify(&Request::ReportError { command_id, message })
    }

    fn finish(&self, command_id: &str, exit_code: i32) -> Result<(), RpcError> {
        self.notify(&Request::Finish { command_id, exit_code })
    }
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn frame_round_trips() {
        let mut buffer = Cursor::new(Vec::new());
        write_frame(&mut buffer, &"hello").unwrap();
        buffer.set_position(0);
        let value: String = read_frame(&mut buffer).unwrap();
        assert_eq!(value, "hello");
    }

    #[test]
    fn make_decision_request_serializes_with_kind_tag() {
        let envelope = DataToController {
            command_id: "c-1".into(),
            parent_id: "p-1".into(),
            command: Command {
                executable: "/usr/bin/cc".into(),
                arguments: vec!["cc".into()],
                working_dir: "/tmp".into(),
                environment: Default::default(),
            },
            timestamp_ms: 0,
        };
        let request = Request::MakeDecision(&envelope);
        let text = serde_json::to_string(&request).unwrap();
        assert!(text.contains("\"kind\":\"make_decision\""));
    }
}
