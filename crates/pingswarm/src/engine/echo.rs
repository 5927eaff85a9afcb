//! Line-echo target server.
//!
//! Each accepted connection has every newline-terminated line it sends
//! written straight back. With the default `ping\n` probe this produces the
//! fixed five-byte reply the workers expect.

use std::io;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Accepts and echoes connections until `token` is cancelled.
pub async fn serve(listener: TcpListener, token: CancellationToken) -> io::Result<()> {
    let local = listener.local_addr()?;
    info!(listen_addr = %local, "Echo server listening");

    loop {
        tokio::select! {
            res = listener.accept() => match res {
                Ok((socket, peer)) => {
                    let conn_token = token.clone();
                    tokio::spawn(async move {
                        if let Err(e) = echo_lines(socket, conn_token).await {
                            debug!(client = %peer, error = %e, "Echo connection error");
                        }
                    });
                }
                Err(e) => warn!(error = %e, "Accept failed"),
            },
            _ = token.cancelled() => {
                info!(listen_addr = %local, "Echo server shutting down");
                break;
            }
        }
    }
    Ok(())
}

async fn echo_lines(socket: TcpStream, token: CancellationToken) -> io::Result<()> {
    socket.set_nodelay(true)?;
    let (read_half, mut write_half) = socket.into_split();
    let mut reader = BufReader::new(read_half);
    let mut line = Vec::with_capacity(64);

    loop {
        line.clear();
        let n = tokio::select! {
            res = reader.read_until(b'\n', &mut line) => res?,
            _ = token.cancelled() => return Ok(()),
        };
        if n == 0 {
            return Ok(());
        }
        write_half.write_all(&line).await?;
    }
}
