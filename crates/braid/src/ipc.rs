//! IPC protocol between the CLI and the per-workspace sync daemon.
//!
//! One newline-delimited JSON request per exchange over the workspace's
//! Unix socket. Every request carries the client's protocol version; the
//! daemon refuses mismatches with a distinct error instead of silently
//! serving them. Requests fail fast: a daemon that does not answer within
//! a few seconds is treated as unreachable so the caller can clean up a
//! stale socket and fall back to direct mode.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::time::timeout;
use tracing::debug;

use crate::config::{BRAID_DIR_NAME, SOCKET_FILE_NAME};
use crate::error::IpcError;

/// Protocol version spoken by this build; daemon and client must match.
pub const PROTOCOL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Client-side request deadline.
pub const REQUEST_TIMEOUT_SECS: u64 = 3;

/// Methods the daemon answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    /// Liveness and state probe.
    Health,
    /// Mark pending changes, or force an immediate reconciliation cycle.
    Sync,
    /// Cooperative shutdown.
    Shutdown,
    /// Report the daemon's version.
    Version,
}

/// A request line sent to the daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Requested method.
    pub method: Method,

    /// The client's protocol version.
    pub version: String,

    /// Method-specific payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Request {
    /// Build a request for `method` with this build's protocol version.
    #[must_use]
    pub fn new(method: Method) -> Self {
        Self {
            method,
            version: PROTOCOL_VERSION.to_string(),
            params: None,
        }
    }

    /// Attach a payload.
    #[must_use]
    pub fn with_params(mut self, params: Value) -> Self {
        self.params = Some(params);
        self
    }
}

/// Parameters for [`Method::Sync`].
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SyncParams {
    /// Run a cycle now instead of waiting for the debounce timer.
    #[serde(default)]
    pub immediate: bool,
}

/// Machine-readable error category in an error response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Client and daemon protocol versions differ.
    VersionMismatch,
    /// The request could not be parsed or carried bad parameters.
    InvalidRequest,
    /// The daemon failed internally while handling the request.
    Internal,
}

/// A response line from the daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Response {
    /// Success, with a method-specific payload.
    Ok {
        /// Method-specific payload.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
    /// Failure.
    Error {
        /// Error category.
        code: ErrorCode,
        /// Human-readable detail.
        message: String,
    },
}

impl Response {
    /// A success response with a payload.
    #[must_use]
    pub fn ok(payload: Value) -> Self {
        Self::Ok {
            payload: Some(payload),
        }
    }

    /// A bare success response.
    #[must_use]
    pub fn ok_empty() -> Self {
        Self::Ok { payload: None }
    }

    /// An error response.
    #[must_use]
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Error {
            code,
            message: message.into(),
        }
    }
}

/// The daemon socket path for a workspace root.
#[must_use]
pub fn socket_path(workspace_root: &Path) -> PathBuf {
    workspace_root.join(BRAID_DIR_NAME).join(SOCKET_FILE_NAME)
}

/// Short-lived client for one workspace's daemon.
///
/// Each request opens a fresh connection, writes one line, reads one line,
/// and closes; nothing is kept alive between invocations.
pub struct DaemonClient {
    socket: PathBuf,
}

impl DaemonClient {
    /// Client for the daemon of the given workspace root.
    #[must_use]
    pub fn for_workspace(workspace_root: &Path) -> Self {
        Self {
            socket: socket_path(workspace_root),
        }
    }

    /// Send one request and await its response.
    ///
    /// # Errors
    ///
    /// [`IpcError::Unreachable`] when the socket cannot be connected,
    /// [`IpcError::Timeout`] when the daemon does not answer in time,
    /// [`IpcError::VersionMismatch`] when the daemon rejects the client's
    /// version, and [`IpcError::Daemon`] for other daemon-reported errors.
    pub async fn request(&self, request: &Request) -> Result<Response, IpcError> {
        let deadline = Duration::from_secs(REQUEST_TIMEOUT_SECS);

        let stream = timeout(deadline, UnixStream::connect(&self.socket))
            .await
            .map_err(|_| IpcError::Timeout {
                timeout_secs: REQUEST_TIMEOUT_SECS,
            })?
            .map_err(|e| IpcError::Unreachable {
                path: self.socket.display().to_string(),
                reason: e.to_string(),
            })?;

        let (read_half, mut write_half) = stream.into_split();

        let mut line =
            serde_json::to_string(request).map_err(|e| IpcError::Protocol(e.to_string()))?;
        line.push('\n');
        timeout(deadline, write_half.write_all(line.as_bytes()))
            .await
            .map_err(|_| IpcError::Timeout {
                timeout_secs: REQUEST_TIMEOUT_SECS,
            })?
            .map_err(|e| IpcError::Unreachable {
                path: self.socket.display().to_string(),
                reason: e.to_string(),
            })?;

        let mut reader = BufReader::new(read_half);
        let mut response_line = String::new();
        let read = timeout(deadline, reader.read_line(&mut response_line))
            .await
            .map_err(|_| IpcError::Timeout {
                timeout_secs: REQUEST_TIMEOUT_SECS,
            })?
            .map_err(|e| IpcError::Protocol(e.to_string()))?;
        if read == 0 {
            return Err(IpcError::Protocol("connection closed mid-request".into()));
        }

        let response: Response = serde_json::from_str(response_line.trim())
            .map_err(|e| IpcError::Protocol(e.to_string()))?;

        match response {
            Response::Error {
                code: ErrorCode::VersionMismatch,
                message,
            } => {
                let daemon = message
                    .rsplit(' ')
                    .next()
                    .unwrap_or("unknown")
                    .to_string();
                Err(IpcError::VersionMismatch {
                    client: PROTOCOL_VERSION.to_string(),
                    daemon,
                })
            }
            Response::Error { message, .. } => Err(IpcError::Daemon(message)),
            ok => Ok(ok),
        }
    }

    /// Probe the daemon. Returns its health payload.
    ///
    /// # Errors
    ///
    /// See [`Self::request`].
    pub async fn health(&self) -> Result<Option<Value>, IpcError> {
        match self.request(&Request::new(Method::Health)).await? {
            Response::Ok { payload } => Ok(payload),
            Response::Error { message, .. } => Err(IpcError::Daemon(message)),
        }
    }

    /// Notify the daemon of pending changes, or force an immediate cycle.
    ///
    /// # Errors
    ///
    /// See [`Self::request`].
    pub async fn sync(&self, immediate: bool) -> Result<Option<Value>, IpcError> {
        let params = serde_json::to_value(SyncParams { immediate })
            .map_err(|e| IpcError::Protocol(e.to_string()))?;
        match self
            .request(&Request::new(Method::Sync).with_params(params))
            .await?
        {
            Response::Ok { payload } => Ok(payload),
            Response::Error { message, .. } => Err(IpcError::Daemon(message)),
        }
    }

    /// Ask the daemon to shut down.
    ///
    /// # Errors
    ///
    /// See [`Self::request`].
    pub async fn shutdown(&self) -> Result<(), IpcError> {
        self.request(&Request::new(Method::Shutdown)).await?;
        Ok(())
    }

    /// Whether a daemon is answering on this workspace's socket.
    pub async fn is_running(&self) -> bool {
        self.health().await.is_ok()
    }

    /// Remove the socket file if no daemon answers on it.
    ///
    /// Returns true when a stale socket was removed.
    pub async fn cleanup_stale_socket(&self) -> bool {
        if !self.socket.exists() {
            return false;
        }
        if self.is_running().await {
            return false;
        }
        debug!(socket = %self.socket.display(), "removing stale daemon socket");
        std::fs::remove_file(&self.socket).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_method_and_version() {
        let req = Request::new(Method::Sync)
            .with_params(serde_json::json!({"immediate": true}));
        let line = serde_json::to_string(&req).unwrap();
        assert!(line.contains("\"method\":\"sync\""));
        assert!(line.contains("\"immediate\":true"));
        assert!(line.contains(PROTOCOL_VERSION));
    }

    #[test]
    fn response_status_tag_round_trips() {
        let ok: Response = serde_json::from_str(r#"{"status":"ok"}"#).unwrap();
        assert!(matches!(ok, Response::Ok { payload: None }));

        let err: Response = serde_json::from_str(
            r#"{"status":"error","code":"version_mismatch","message":"client 0.1.0, daemon 0.2.0"}"#,
        )
        .unwrap();
        assert!(matches!(
            err,
            Response::Error {
                code: ErrorCode::VersionMismatch,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn missing_socket_is_unreachable() {
        let dir = tempfile::tempdir().unwrap();
        let client = DaemonClient::for_workspace(dir.path());
        let err = client.request(&Request::new(Method::Health)).await.unwrap_err();
        assert!(matches!(err, IpcError::Unreachable { .. }));
    }
}
