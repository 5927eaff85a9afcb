use crate::engine::endpoint::Endpoint;
use crate::engine::metered::MeteredStream;
use bytes::{Bytes, BytesMut};
use pingswarm_common::{ProbeConfig, ResponseMode, TimeoutConfig, MAX_RESPONSE_LEN};
use std::future::Future;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, trace};

/// Number of probe connections currently open in this process.
pub static ACTIVE_CONNECTIONS: AtomicUsize = AtomicUsize::new(0);

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("failed to connect to {endpoint}: {source}")]
    Io {
        endpoint: Endpoint,
        #[source]
        source: io::Error,
    },
    #[error("timed out connecting to {endpoint} after {timeout:?}")]
    Timeout { endpoint: Endpoint, timeout: Duration },
}

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("send failed: {0}")]
    Send(#[source] io::Error),
    #[error("receive failed: {0}")]
    Recv(#[source] io::Error),
    #[error("peer closed connection after {got} response bytes")]
    Closed { got: usize },
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),
    #[error("response exceeds {limit} bytes")]
    ResponseTooLong { limit: usize },
    #[error("connection already closed")]
    NotConnected,
}

/// The request a worker writes on every probe and how its reply is framed.
#[derive(Debug, Clone)]
pub struct Probe {
    request: Bytes,
    response: ResponseMode,
}

impl Probe {
    pub fn new(request: impl Into<Bytes>, response: ResponseMode) -> Self {
        Self {
            request: request.into(),
            response,
        }
    }

    pub fn from_config(config: &ProbeConfig) -> Self {
        Self::new(Bytes::from(config.message.clone()), config.response)
    }

    pub fn request(&self) -> &[u8] {
        &self.request
    }

    pub fn response(&self) -> ResponseMode {
        self.response
    }
}

impl Default for Probe {
    /// `ping\n` answered by exactly five bytes.
    fn default() -> Self {
        Self::new(Bytes::from_static(b"ping\n"), ResponseMode::Fixed { len: 5 })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SocketOptions {
    pub connect_timeout: Option<Duration>,
    pub io_timeout: Option<Duration>,
}

impl From<&TimeoutConfig> for SocketOptions {
    fn from(config: &TimeoutConfig) -> Self {
        Self {
            connect_timeout: config.connect(),
            io_timeout: config.io(),
        }
    }
}

struct ConnectionGuard;

impl ConnectionGuard {
    fn new() -> Self {
        ACTIVE_CONNECTIONS.fetch_add(1, Ordering::SeqCst);
        Self
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        ACTIVE_CONNECTIONS.fetch_sub(1, Ordering::SeqCst);
    }
}

struct Open {
    stream: MeteredStream<TcpStream>,
    _guard: ConnectionGuard,
}

/// One TCP connection bound to a single endpoint for its whole life.
///
/// The socket is released by `close` or, on any other exit path, when the
/// handle is dropped.
pub struct ConnectionHandle {
    endpoint: Endpoint,
    conn: Option<Open>,
    io_timeout: Option<Duration>,
    response: BytesMut,
    // Bytes read past the end of a line-mode reply, kept for the next probe.
    pending: BytesMut,
    bytes_sent: u64,
    bytes_received: u64,
}

impl ConnectionHandle {
    /// Connects to `endpoint`. Failures are returned as-is and never retried.
    pub async fn open(endpoint: Endpoint, options: SocketOptions) -> Result<Self, ConnectError> {
        let connect = TcpStream::connect((endpoint.host.clone(), endpoint.port));
        let result = match options.connect_timeout {
            Some(limit) => match timeout(limit, connect).await {
                Ok(res) => res,
                Err(_) => {
                    return Err(ConnectError::Timeout {
                        endpoint,
                        timeout: limit,
                    })
                }
            },
            None => connect.await,
        };

        let stream = match result {
            Ok(s) => s,
            Err(source) => return Err(ConnectError::Io { endpoint, source }),
        };
        // Probes are tiny request/response pairs.
        if let Err(e) = stream.set_nodelay(true) {
            debug!(endpoint = %endpoint, error = %e, "could not set TCP_NODELAY");
        }
        trace!(endpoint = %endpoint, "connection established");

        Ok(Self {
            endpoint,
            conn: Some(Open {
                stream: MeteredStream::new(stream),
                _guard: ConnectionGuard::new(),
            }),
            io_timeout: options.io_timeout,
            response: BytesMut::with_capacity(64),
            pending: BytesMut::new(),
            bytes_sent: 0,
            bytes_received: 0,
        })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    /// Bytes written on this connection, including those of a closed one.
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent + self.conn.as_ref().map_or(0, |c| c.stream.bytes_written())
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received + self.conn.as_ref().map_or(0, |c| c.stream.bytes_read())
    }

    /// The reply consumed by the last successful probe.
    pub fn last_response(&self) -> &[u8] {
        &self.response
    }

    /// Writes the probe request, then reads one framed response.
    ///
    /// Returns the number of response bytes consumed.
    pub async fn probe(&mut self, probe: &Probe) -> Result<usize, ProbeError> {
        let io_timeout = self.io_timeout;
        let conn = self.conn.as_mut().ok_or(ProbeError::NotConnected)?;
        let stream = &mut conn.stream;

        bounded(io_timeout, stream.write_all(probe.request()))
            .await
            .map_err(|e| io_failure(e, io_timeout, ProbeError::Send))?;

        self.response.clear();
        match probe.response() {
            ResponseMode::Fixed { len } => {
                bounded_result(io_timeout, read_fixed(stream, &mut self.response, len)).await
            }
            ResponseMode::Line => {
                bounded_result(
                    io_timeout,
                    read_line(stream, &mut self.pending, &mut self.response),
                )
                .await
            }
        }
    }

    /// Shuts the connection down. Calling it again is a no-op.
    pub async fn close(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            // Counters are final once the connection leaves `conn`.
            self.bytes_sent += conn.stream.bytes_written();
            self.bytes_received += conn.stream.bytes_read();
            let _ = conn.stream.shutdown().await;
            debug!(endpoint = %self.endpoint, "connection closed");
        }
    }
}

async fn bounded<F, T>(limit: Option<Duration>, fut: F) -> io::Result<T>
where
    F: Future<Output = io::Result<T>>,
{
    match limit {
        Some(d) => match timeout(d, fut).await {
            Ok(res) => res,
            Err(_) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "probe operation timed out",
            )),
        },
        None => fut.await,
    }
}

async fn bounded_result<F>(limit: Option<Duration>, fut: F) -> Result<usize, ProbeError>
where
    F: Future<Output = Result<usize, ProbeError>>,
{
    match limit {
        Some(d) => match timeout(d, fut).await {
            Ok(res) => res,
            Err(_) => Err(ProbeError::Timeout(d)),
        },
        None => fut.await,
    }
}

fn io_failure(
    e: io::Error,
    limit: Option<Duration>,
    wrap: fn(io::Error) -> ProbeError,
) -> ProbeError {
    match (e.kind(), limit) {
        (io::ErrorKind::TimedOut, Some(d)) => ProbeError::Timeout(d),
        _ => wrap(e),
    }
}

/// Reads exactly `len` bytes, never more, so nothing is left over for the
/// next probe.
async fn read_fixed(
    stream: &mut MeteredStream<TcpStream>,
    buf: &mut BytesMut,
    len: usize,
) -> Result<usize, ProbeError> {
    if len > MAX_RESPONSE_LEN {
        return Err(ProbeError::ResponseTooLong {
            limit: MAX_RESPONSE_LEN,
        });
    }
    buf.resize(len, 0);
    let mut got = 0;
    while got < len {
        let n = stream.read(&mut buf[got..]).await.map_err(ProbeError::Recv)?;
        if n == 0 {
            buf.truncate(got);
            return Err(ProbeError::Closed { got });
        }
        got += n;
    }
    Ok(len)
}

/// Reads up to and including the next `\n` into `out`. Anything the peer
/// sent after the newline stays in `pending` for the next call.
async fn read_line(
    stream: &mut MeteredStream<TcpStream>,
    pending: &mut BytesMut,
    out: &mut BytesMut,
) -> Result<usize, ProbeError> {
    let mut scanned = 0;
    loop {
        if let Some(i) = pending[scanned..].iter().position(|&b| b == b'\n') {
            let line = pending.split_to(scanned + i + 1);
            out.extend_from_slice(&line);
            return Ok(out.len());
        }
        scanned = pending.len();
        if scanned >= MAX_RESPONSE_LEN {
            return Err(ProbeError::ResponseTooLong {
                limit: MAX_RESPONSE_LEN,
            });
        }

        pending.reserve(512);
        let n = stream.read_buf(pending).await.map_err(ProbeError::Recv)?;
        if n == 0 {
            return Err(ProbeError::Closed { got: pending.len() });
        }
    }
}
