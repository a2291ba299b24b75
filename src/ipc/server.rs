//! Unix socket server for daemon control.

use crate::error::{NarratorError, Result};
use crate::ipc::protocol::{Command, Response};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::watch;

/// Handles one decoded command.
#[async_trait::async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle(&self, command: Command) -> Response;
}

/// Stops a running [`IpcServer`] from another task.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.tx.send_replace(true);
    }
}

pub struct IpcServer {
    socket_path: PathBuf,
    shutdown_tx: Arc<watch::Sender<bool>>,
}

impl IpcServer {
    pub fn new(socket_path: PathBuf) -> Self {
        let (tx, _) = watch::channel(false);
        Self {
            socket_path,
            shutdown_tx: Arc::new(tx),
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// `$XDG_RUNTIME_DIR/narrator.sock`, or a per-user path under /tmp.
    pub fn default_socket_path() -> PathBuf {
        if let Ok(xdg_runtime) = std::env::var("XDG_RUNTIME_DIR") {
            PathBuf::from(xdg_runtime).join("narrator.sock")
        } else {
            let uid = unsafe { libc::getuid() };
            PathBuf::from(format!("/tmp/narrator-{}.sock", uid))
        }
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: self.shutdown_tx.clone(),
        }
    }

    /// Accept connections until shut down, then remove the socket file.
    ///
    /// Each connection may send several commands, one JSON object per line;
    /// each gets exactly one response line.
    pub async fn serve<H>(&self, handler: Arc<H>) -> Result<()>
    where
        H: CommandHandler + ?Sized + 'static,
    {
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path).map_err(|e| NarratorError::IpcSocket {
                message: format!("Failed to remove stale socket: {}", e),
            })?;
        }
        if let Some(parent) = self.socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let listener =
            UnixListener::bind(&self.socket_path).map_err(|e| NarratorError::IpcSocket {
                message: format!("Failed to bind to {}: {}", self.socket_path.display(), e),
            })?;
        log::info!("listening on {}", self.socket_path.display());

        let mut shutdown = self.shutdown_tx.subscribe();
        let result = loop {
            if *shutdown.borrow_and_update() {
                break Ok(());
            }
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, _)) => {
                        let handler = Arc::clone(&handler);
                        tokio::spawn(async move {
                            if let Err(e) = handle_client(stream, handler).await {
                                log::warn!("client connection: {e}");
                            }
                        });
                    }
                    Err(e) => {
                        break Err(NarratorError::IpcConnection {
                            message: format!("Failed to accept connection: {}", e),
                        });
                    }
                },
                _ = shutdown.changed() => {}
            }
        };

        if let Err(e) = std::fs::remove_file(&self.socket_path)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            log::warn!("could not remove {}: {e}", self.socket_path.display());
        }
        result
    }
}

async fn handle_client<H>(stream: UnixStream, handler: Arc<H>) -> Result<()>
where
    H: CommandHandler + ?Sized,
{
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| NarratorError::IpcConnection {
            message: format!("Failed to read from client: {}", e),
        })?
    {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let response = match Command::from_json(line) {
            Ok(command) => handler.handle(command).await,
            Err(e) => Response::Error {
                message: format!("Malformed command: {}", e),
                input: true,
            },
        };

        let mut payload = response.to_json().map_err(|e| NarratorError::IpcProtocol {
            message: format!("Failed to serialize response: {}", e),
        })?;
        payload.push('\n');
        writer
            .write_all(payload.as_bytes())
            .await
            .map_err(|e| NarratorError::IpcConnection {
                message: format!("Failed to write to client: {}", e),
            })?;
        writer
            .flush()
            .await
            .map_err(|e| NarratorError::IpcConnection {
                message: format!("Failed to flush writer: {}", e),
            })?;
    }
    Ok(())
}
