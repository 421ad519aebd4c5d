use std::io::{self, Write};
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpStream;

use crate::error::Result;

/// A connected control-channel stream.
///
/// Wraps a tokio `TcpStream` with `TCP_NODELAY` set. Reads and writes are
/// non-blocking: callers wait for [`readable`](Self::readable) and then
/// drain with [`try_read`](Self::try_read), and write through a [`TcpSink`].
pub struct ControlStream {
    inner: Arc<TcpStream>,
    peer: SocketAddr,
}

impl ControlStream {
    /// Wrap a connected TCP stream.
    ///
    /// Control frames are tiny and latency sensitive, so Nagle is disabled.
    pub fn from_tcp(stream: TcpStream) -> Result<Self> {
        stream.set_nodelay(true)?;
        let peer = stream.peer_addr()?;
        Ok(Self {
            inner: Arc::new(stream),
            peer,
        })
    }

    /// Address of the remote end.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Wait until the socket may be readable.
    ///
    /// Readiness can be spurious; a following `try_read` may still return
    /// `WouldBlock`.
    pub async fn readable(&self) -> io::Result<()> {
        self.inner.readable().await
    }

    /// Read whatever is available without blocking.
    pub fn try_read(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.try_read(buf)
    }

    /// A writer handle for this stream.
    pub fn sink(&self) -> TcpSink {
        TcpSink {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl std::fmt::Debug for ControlStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlStream")
            .field("peer", &self.peer)
            .finish()
    }
}

/// Non-blocking `Write` half of a [`ControlStream`].
///
/// Every `write` is a single `try_write`. A full socket buffer surfaces as
/// `WouldBlock` instead of parking the event loop.
pub struct TcpSink {
    inner: Arc<TcpStream>,
}

impl Write for TcpSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.try_write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl std::fmt::Debug for TcpSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpSink").finish_non_exhaustive()
    }
}
