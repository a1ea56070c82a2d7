//! IPC Server + Dispatcher (§4.8): a line-framed JSON request/response protocol over a
//! local TCP socket. Grounded on this codebase's `{ "error": message }` response
//! convention, carried over a raw socket rather than an HTTP transport since there is no
//! routing, headers, or content negotiation to justify one.

use std::io;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Deserialize)]
pub struct Request {
    pub cmd: String,
    #[serde(default)]
    pub args: Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Response {
    Ok { ok: bool, data: Value },
    Err { ok: bool, error: String },
}

impl Response {
    pub fn ok(data: Value) -> Self {
        Self::Ok { ok: true, data }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self::Err { ok: false, error: message.into() }
    }
}

/// A request marshalled from an accepted connection onto the Consume Runner's loop,
/// together with a one-shot reply channel back to that connection (§5: "IPC commands are
/// marshalled onto the loop through a queue").
pub struct Command {
    pub request: Request,
    pub reply: tokio::sync::oneshot::Sender<Response>,
}

/// Binds the configured port and spawns the accept loop, which forwards parsed requests
/// onto `tx`. The loop on the other end of `tx` is the only thing allowed to act on them;
/// this task does no dispatch itself. Returns the bound local address (useful when `port`
/// is 0, for tests).
pub async fn serve(port: u16, tx: mpsc::Sender<Command>) -> io::Result<std::net::SocketAddr> {
    let listener = TcpListener::bind(("127.0.0.1", port)).await?;
    let addr = listener.local_addr()?;
    tokio::spawn(accept_loop(listener, tx));
    Ok(addr)
}

async fn accept_loop(listener: TcpListener, tx: mpsc::Sender<Command>) {
    loop {
        match listener.accept().await {
            Ok((socket, _addr)) => {
                let tx = tx.clone();
                tokio::spawn(handle_connection(socket, tx));
            }
            Err(e) => {
                tracing::warn!(error = %e, "IPC accept error");
                break;
            }
        }
    }
}

/// Each connection is processed sequentially (§4.8): one request fully round-trips before
/// the next line is read.
async fn handle_connection(socket: TcpStream, tx: mpsc::Sender<Command>) {
    let (read_half, mut write_half) = socket.into_split();
    let mut lines = BufReader::new(read_half).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "IPC read error");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<Request>(&line) {
            Ok(request) => {
                let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
                if tx.send(Command { request, reply: reply_tx }).await.is_err() {
                    Response::err("daemon is shutting down")
                } else {
                    reply_rx.await.unwrap_or_else(|_| Response::err("no reply from daemon loop"))
                }
            }
            Err(e) => Response::err(format!("malformed request: {e}")),
        };

        let Ok(mut payload) = serde_json::to_vec(&response) else { break };
        payload.push(b'\n');
        if write_half.write_all(&payload).await.is_err() {
            break;
        }
    }
}
