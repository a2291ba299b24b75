//! Client side of the daemon socket.

use crate::error::{NarratorError, Result};
use crate::ipc::protocol::{Command, Response};
use std::path::Path;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

/// Send one command and wait for its response.
///
/// # Errors
/// `IpcConnection` when the daemon is unreachable or hangs up, `IpcProtocol`
/// when a message cannot be encoded or decoded.
pub async fn send_command(socket_path: &Path, command: &Command) -> Result<Response> {
    let stream = UnixStream::connect(socket_path)
        .await
        .map_err(|e| NarratorError::IpcConnection {
            message: format!(
                "Failed to connect to daemon at {}: {} (is `narrator daemon` running?)",
                socket_path.display(),
                e
            ),
        })?;

    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    let mut payload = command.to_json().map_err(|e| NarratorError::IpcProtocol {
        message: format!("Failed to serialize command: {}", e),
    })?;
    payload.push('\n');
    writer
        .write_all(payload.as_bytes())
        .await
        .map_err(|e| NarratorError::IpcConnection {
            message: format!("Failed to write command: {}", e),
        })?;
    writer
        .flush()
        .await
        .map_err(|e| NarratorError::IpcConnection {
            message: format!("Failed to flush writer: {}", e),
        })?;

    let mut line = String::new();
    let read = reader
        .read_line(&mut line)
        .await
        .map_err(|e| NarratorError::IpcConnection {
            message: format!("Failed to read response: {}", e),
        })?;
    if read == 0 {
        return Err(NarratorError::IpcConnection {
            message: "Daemon closed the connection without responding".to_string(),
        });
    }

    Response::from_json(line.trim()).map_err(|e| NarratorError::IpcProtocol {
        message: format!("Failed to deserialize response: {}", e),
    })
}
