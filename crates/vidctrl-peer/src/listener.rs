use std::future::Future;
use std::net::SocketAddr;

use tracing::{debug, info, warn};
use vidctrl_frame::Message;
use vidctrl_transport::{ControlStream, TcpControlSocket};

use crate::connection::{next_event_of, Connection, ConnectionEvent};
use crate::control::ServerConfig;
use crate::error::Result;
use crate::pipeline::MediaPipeline;
use crate::stats::SharedStats;

enum Wake {
    Connection(Result<ConnectionEvent>),
    Accepted(vidctrl_transport::Result<ControlStream>),
    Shutdown,
}

/// Producer side of the control channel.
///
/// Serves one client at a time: a newly accepted connection replaces the
/// current one, and the replaced client's disconnect is not reported to the
/// pipeline. Replacement therefore never pauses the stream; it keeps its
/// current state until the new client's replayed parameters arrive.
/// Inbound messages are applied to the [`MediaPipeline`] in
/// arrival order; probes are answered from the shared stats window.
pub struct ControlServer<P> {
    socket: TcpControlSocket,
    pipeline: P,
    stats: SharedStats,
    conn: Option<Connection>,
    next_conn_id: u64,
}

impl<P: MediaPipeline> ControlServer<P> {
    /// Bind the control port.
    pub async fn bind(config: &ServerConfig, pipeline: P, stats: SharedStats) -> Result<Self> {
        let socket = TcpControlSocket::bind(&config.bind_host, config.control_port).await?;
        Ok(Self {
            socket,
            pipeline,
            stats,
            conn: None,
            next_conn_id: 0,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.socket.local_addr()
    }

    pub fn stats(&self) -> &SharedStats {
        &self.stats
    }

    pub fn pipeline(&self) -> &P {
        &self.pipeline
    }

    /// Whether a client is currently connected.
    pub fn has_client(&self) -> bool {
        self.conn.is_some()
    }

    /// Serve forever.
    pub async fn run(&mut self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Serve until `shutdown` completes.
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            let wake = tokio::select! {
                biased;
                () = &mut shutdown => Wake::Shutdown,
                event = next_event_of(&mut self.conn) => Wake::Connection(event),
                accepted = self.socket.accept() => Wake::Accepted(accepted),
            };

            match wake {
                Wake::Shutdown => {
                    info!("control server shutting down");
                    if let Some(mut conn) = self.conn.take() {
                        if !conn.is_destroyed() {
                            conn.destroy("server shutdown")?;
                        }
                    }
                    return Ok(());
                }
                Wake::Accepted(Ok(stream)) => self.replace_connection(stream)?,
                Wake::Accepted(Err(err)) => warn!(%err, "accept failed"),
                Wake::Connection(event) => match event? {
                    ConnectionEvent::Message(message) => self.dispatch(message),
                    ConnectionEvent::Destroyed(reason) => {
                        info!(%reason, "client disconnected");
                        self.conn = None;
                        self.pipeline.client_disconnected();
                    }
                    ConnectionEvent::Connected => {}
                },
            }
        }
    }

    fn replace_connection(&mut self, stream: ControlStream) -> Result<()> {
        if let Some(mut old) = self.conn.take() {
            if !old.is_destroyed() {
                old.destroy("replaced by new connection")?;
            }
        }

        let peer = stream.peer_addr();
        self.next_conn_id += 1;
        info!(conn = self.next_conn_id, %peer, "client connected");

        self.pipeline.set_dest_host(peer.ip());
        self.conn = Some(Connection::from_stream(self.next_conn_id, stream));
        Ok(())
    }

    fn dispatch(&mut self, message: Message) {
        debug!(kind = %message.kind(), "dispatch");
        match message {
            Message::SetResolutionFramerate {
                width,
                height,
                framerate,
            } => self
                .pipeline
                .set_resolution_framerate(width, height, framerate),
            Message::Pause => self.pipeline.pause(),
            Message::Resume => self.pipeline.resume(),
            Message::SetTargetBitrate(bitrate) => self.pipeline.set_target_bitrate(bitrate),
            Message::SetAnnotationMode(mode) => self.pipeline.set_annotation_mode(mode),
            Message::SetDrcLevel(level) => self.pipeline.set_drc_level(level),
            Message::StatsRequest => {
                let average = self.stats.average();
                self.reply(Message::StatsResponse(average.to_report()));
            }
            Message::Ping => self.reply(Message::Pong),
            Message::StatsResponse(_) | Message::Pong => {
                warn!(kind = %message.kind(), "unexpected message from client");
            }
        }
    }

    fn reply(&mut self, message: Message) {
        if let Some(conn) = self.conn.as_mut() {
            conn.send(&message);
        }
    }
}
