use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::stream::ControlStream;

/// Well-known TCP port of the control channel.
pub const DEFAULT_CONTROL_PORT: u16 = 1875;

/// Well-known UDP port of the RTP media stream.
///
/// Not used by the control channel itself; exposed so both endpoints agree
/// on it out of band.
pub const DEFAULT_MEDIA_PORT: u16 = 1874;

/// Listening side of the control port.
pub struct TcpControlSocket {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl TcpControlSocket {
    /// Bind and listen on `host:port`.
    ///
    /// Port 0 picks an ephemeral port; read it back with
    /// [`local_addr`](Self::local_addr).
    pub async fn bind(host: &str, port: u16) -> Result<Self> {
        let listener = TcpListener::bind((host, port))
            .await
            .map_err(|source| TransportError::Bind {
                addr: format!("{host}:{port}"),
                source,
            })?;
        let local_addr = listener.local_addr()?;

        info!(%local_addr, "control socket listening");

        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Accept the next inbound connection.
    pub async fn accept(&self) -> Result<ControlStream> {
        let (stream, addr) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::Accept)?;
        debug!(%addr, "accepted control connection");
        ControlStream::from_tcp(stream)
    }

    /// Connect to a listening control socket.
    pub async fn connect(host: &str, port: u16) -> Result<ControlStream> {
        let addr = format!("{host}:{port}");
        let stream = TcpStream::connect((host, port))
            .await
            .map_err(|source| TransportError::Connect {
                addr: addr.clone(),
                source,
            })?;
        debug!(%addr, "connected to control socket");
        ControlStream::from_tcp(stream)
    }

    /// The address this socket is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        "tcp"
    }
}
