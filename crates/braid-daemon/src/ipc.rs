//! Unix-socket IPC server.
//!
//! Reads newline-delimited JSON requests, answers one response line per
//! request. Every request's protocol version is checked before dispatch;
//! a mismatched client gets a `version_mismatch` error rather than being
//! silently served by the wrong daemon build.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tracing::debug;

use braid::ipc::{ErrorCode, Method, PROTOCOL_VERSION, Request, Response, SyncParams};

use crate::DaemonContext;

/// Handle a single client connection: a short-lived request/response
/// exchange, possibly several requests on one stream.
pub async fn handle_connection(
    ctx: Arc<DaemonContext>,
    stream: UnixStream,
) -> std::io::Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut line = String::new();

    loop {
        line.clear();
        let n = reader.read_line(&mut line).await?;
        if n == 0 {
            break; // EOF
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let (response, shutdown_after) = dispatch(&ctx, trimmed).await;
        let mut bytes = serde_json::to_vec(&response).unwrap_or_else(|_| b"{}".to_vec());
        bytes.push(b'\n');
        write_half.write_all(&bytes).await?;
        write_half.flush().await?;

        if shutdown_after {
            // The response is on the wire; now the daemon can go down.
            ctx.request_shutdown();
            break;
        }
    }

    Ok(())
}

/// Parse and dispatch one request line. The bool asks the connection
/// handler to trigger shutdown after the response is written.
async fn dispatch(ctx: &DaemonContext, raw: &str) -> (Response, bool) {
    let request: Request = match serde_json::from_str(raw) {
        Ok(req) => req,
        Err(e) => {
            return (
                Response::error(ErrorCode::InvalidRequest, format!("invalid request: {e}")),
                false,
            );
        }
    };

    if request.version != PROTOCOL_VERSION {
        return (
            Response::error(
                ErrorCode::VersionMismatch,
                format!("client {}, daemon {}", request.version, PROTOCOL_VERSION),
            ),
            false,
        );
    }

    debug!(method = ?request.method, "ipc request");
    match request.method {
        Method::Health => (Response::ok(ctx.health_payload().await), false),
        Method::Version => (
            Response::ok(serde_json::json!({ "version": PROTOCOL_VERSION })),
            false,
        ),
        Method::Shutdown => (Response::ok_empty(), true),
        Method::Sync => {
            let params: SyncParams = match request.params {
                Some(value) => match serde_json::from_value(value) {
                    Ok(p) => p,
                    Err(e) => {
                        return (
                            Response::error(
                                ErrorCode::InvalidRequest,
                                format!("invalid sync params: {e}"),
                            ),
                            false,
                        );
                    }
                },
                None => SyncParams::default(),
            };

            if params.immediate {
                match ctx.force_cycle().await {
                    Ok(report) => match serde_json::to_value(&report) {
                        Ok(value) => (Response::ok(value), false),
                        Err(e) => (
                            Response::error(ErrorCode::Internal, e.to_string()),
                            false,
                        ),
                    },
                    Err(e) => (Response::error(ErrorCode::Internal, e.to_string()), false),
                }
            } else {
                ctx.mark_pending().await;
                (Response::ok(serde_json::json!({ "pending": true })), false)
            }
        }
    }
}
