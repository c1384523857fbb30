//! Control-socket wire format: one JSON object per line in each direction.
//!
//! ```text
//! -> {"cmd":"status"}
//! <- {"ok":true,"data":{"running":true,"projects":[...]}}
//! -> {"cmd":"stop"}
//! <- {"ok":true,"data":{"stopping":true}}
//! ```

use std::io::{self, BufRead, BufReader, ErrorKind, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::thread::sleep;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{io_err, DaemonError};

const CONNECT_ATTEMPTS: u32 = 5;
const CONNECT_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum ControlCommand {
    Status,
    Stop,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlReply {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ControlReply {
    pub fn ok(data: Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(message.into()),
        }
    }

    fn into_result(self) -> Result<Value, DaemonError> {
        match (self.ok, self.error) {
            (true, _) => Ok(self.data.unwrap_or(Value::Null)),
            (false, message) => Err(DaemonError::Protocol(
                message.unwrap_or_else(|| "server reported failure without a message".to_string()),
            )),
        }
    }
}

/// Write `command` to the socket and wait for its reply.
pub fn send_command(socket: &Path, command: ControlCommand) -> Result<ControlReply, DaemonError> {
    let not_running = || DaemonError::DaemonNotRunning {
        socket: socket.to_path_buf(),
    };
    if !socket.exists() {
        return Err(not_running());
    }

    let mut stream = UnixStream::connect(socket).map_err(|err| match err.kind() {
        ErrorKind::NotFound | ErrorKind::ConnectionRefused | ErrorKind::ConnectionReset => {
            not_running()
        }
        _ => io_err(socket, err),
    })?;

    let mut request = serde_json::to_vec(&command)?;
    request.push(b'\n');
    stream
        .write_all(&request)
        .and_then(|()| stream.flush())
        .map_err(|e| io_err(socket, e))?;

    let mut line = String::new();
    match BufReader::new(stream).read_line(&mut line) {
        Ok(0) => Err(DaemonError::Protocol(format!(
            "{} closed without replying",
            socket.display()
        ))),
        Ok(_) => Ok(serde_json::from_str(line.trim_end())?),
        Err(err) => Err(io_err(socket, err)),
    }
}

/// Runtime status of a running server. A socket that is not accepting yet is
/// retried a few times before giving up.
pub fn request_status(socket: &Path) -> Result<Value, DaemonError> {
    let mut attempt = 1;
    loop {
        match send_command(socket, ControlCommand::Status) {
            Ok(reply) => return reply.into_result(),
            Err(DaemonError::DaemonNotRunning { .. }) if attempt < CONNECT_ATTEMPTS => {
                attempt += 1;
                sleep(CONNECT_BACKOFF);
            }
            Err(err) => return Err(err),
        }
    }
}

pub fn request_stop(socket: &Path) -> Result<(), DaemonError> {
    send_command(socket, ControlCommand::Stop)?
        .into_result()
        .map(|_| ())
}

/// Parse one request line. Malformed or unknown commands become the error
/// reply to send back.
pub(crate) fn parse_command(line: &str) -> Result<ControlCommand, ControlReply> {
    serde_json::from_str(line).map_err(|err| ControlReply::error(format!("invalid request: {err}")))
}

pub(crate) async fn write_reply<W>(writer: &mut W, reply: &ControlReply) -> io::Result<()>
where
    W: tokio::io::AsyncWrite + Unpin,
{
    use tokio::io::AsyncWriteExt;

    let mut payload = serde_json::to_vec(reply)?;
    payload.push(b'\n');
    writer.write_all(&payload).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn missing_socket_means_not_running() {
        let tmp = TempDir::new().unwrap();
        let socket = tmp.path().join("relay.sock");
        assert!(matches!(
            request_stop(&socket),
            Err(DaemonError::DaemonNotRunning { .. })
        ));
    }

    #[test]
    fn commands_use_cmd_tag() {
        assert_eq!(
            serde_json::to_value(ControlCommand::Status).unwrap(),
            json!({ "cmd": "status" })
        );
        assert_eq!(parse_command(r#"{"cmd":"stop"}"#), Ok(ControlCommand::Stop));
    }

    #[test]
    fn unknown_command_is_an_error_reply() {
        let reply = parse_command(r#"{"cmd":"reload"}"#).unwrap_err();
        assert!(!reply.ok);
        assert!(reply.error.unwrap().starts_with("invalid request"));
    }

    #[test]
    fn failed_reply_becomes_protocol_error() {
        let err = ControlReply::error("boom").into_result().unwrap_err();
        assert_eq!(err.to_string(), "daemon protocol error: boom");
    }

    #[test]
    fn reply_omits_empty_fields() {
        let encoded = serde_json::to_value(ControlReply::ok(json!({ "stopping": true }))).unwrap();
        assert_eq!(encoded, json!({ "ok": true, "data": { "stopping": true } }));
    }
}
