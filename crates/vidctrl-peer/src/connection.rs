use std::collections::VecDeque;
use std::future::{pending, Future};
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::pin::Pin;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use vidctrl_frame::{FrameError, FrameReader, FrameWriter, Message};
use vidctrl_transport::{ControlStream, TcpControlSocket, TcpSink, Timer};

use crate::error::{PeerError, Result};

/// Upper bound on bytes taken from the socket per readiness event.
const READ_CHUNK_SIZE: usize = 4096;

type ConnectFuture =
    Pin<Box<dyn Future<Output = vidctrl_transport::Result<ControlStream>> + Send>>;

/// What a [`Connection`] reports to its owner.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// An outbound connect completed.
    Connected,
    /// A complete message arrived.
    Message(Message),
    /// The connection is gone. Reported exactly once.
    Destroyed(String),
}

enum Phase {
    /// The connect runs on its own task from the moment it is started.
    Connecting(JoinHandle<vidctrl_transport::Result<ControlStream>>),
    Open {
        stream: ControlStream,
        writer: FrameWriter<TcpSink>,
    },
    Closed,
}

enum Wake {
    Connect(vidctrl_transport::Result<ControlStream>),
    ConnectAborted(String),
    ConnectTimeout,
    Readable(std::io::Result<()>),
}

/// One control connection, outbound or accepted.
///
/// All activity is surfaced through [`next_event`](Self::next_event), which
/// is cancel safe and meant to sit in a `select!` loop. Writes go straight
/// to the socket without waiting; a write that cannot complete at once tears
/// the connection down.
pub struct Connection {
    id: u64,
    phase: Phase,
    reader: FrameReader,
    connect_timer: Timer,
    events: VecDeque<ConnectionEvent>,
}

impl Connection {
    /// Start connecting to `host:port`.
    ///
    /// The connect is under way as soon as this returns. If it has not
    /// completed after `timeout` the connection is destroyed with reason
    /// `"connect timeout"`. Must be called from within a tokio runtime.
    pub fn connect(id: u64, host: impl Into<String>, port: u16, timeout: Duration) -> Self {
        let host = host.into();
        debug!(conn = id, %host, port, "connecting");
        Self::connecting(
            id,
            Box::pin(async move { TcpControlSocket::connect(&host, port).await }),
            timeout,
        )
    }

    fn connecting(id: u64, connect: ConnectFuture, timeout: Duration) -> Self {
        let mut connect_timer = Timer::new();
        connect_timer.schedule(timeout);
        Self {
            id,
            phase: Phase::Connecting(tokio::spawn(connect)),
            reader: FrameReader::new(),
            connect_timer,
            events: VecDeque::new(),
        }
    }

    /// Wrap an already established stream, e.g. one just accepted.
    ///
    /// No `Connected` event is reported for it.
    pub fn from_stream(id: u64, stream: ControlStream) -> Self {
        let writer = FrameWriter::new(stream.sink());
        Self {
            id,
            phase: Phase::Open { stream, writer },
            reader: FrameReader::new(),
            connect_timer: Timer::new(),
            events: VecDeque::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Remote address, once connected.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        match &self.phase {
            Phase::Open { stream, .. } => Some(stream.peer_addr()),
            _ => None,
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self.phase, Phase::Open { .. })
    }

    pub fn is_destroyed(&self) -> bool {
        matches!(self.phase, Phase::Closed)
    }

    /// Wait for the next event.
    ///
    /// Messages decoded from one read are delivered in order, ahead of any
    /// teardown that read caused. After `Destroyed` has been returned this
    /// never completes.
    ///
    /// Fails with [`PeerError::AlreadyDisconnected`] if a connect completes
    /// once the connect timeout has already gone off.
    pub async fn next_event(&mut self) -> Result<ConnectionEvent> {
        loop {
            if let Some(event) = self.events.pop_front() {
                return Ok(event);
            }

            let wake = match &mut self.phase {
                Phase::Closed => return pending().await,
                Phase::Connecting(task) => tokio::select! {
                    biased;
                    joined = task => match joined {
                        Ok(result) => Wake::Connect(result),
                        Err(err) => Wake::ConnectAborted(err.to_string()),
                    },
                    () = self.connect_timer.fired() => Wake::ConnectTimeout,
                },
                Phase::Open { stream, .. } => Wake::Readable(stream.readable().await),
            };

            match wake {
                Wake::Connect(Ok(stream)) => self.on_connected(stream)?,
                Wake::Connect(Err(err)) => self.teardown(err.to_string()),
                Wake::ConnectAborted(reason) => self.teardown(reason),
                Wake::ConnectTimeout => self.teardown("connect timeout"),
                Wake::Readable(Ok(())) => self.read_ready(),
                Wake::Readable(Err(err)) => self.teardown(err.to_string()),
            }
        }
    }

    fn on_connected(&mut self, stream: ControlStream) -> Result<()> {
        if !self.connect_timer.cancel() {
            return Err(PeerError::AlreadyDisconnected);
        }

        info!(conn = self.id, peer = %stream.peer_addr(), "connected");
        let writer = FrameWriter::new(stream.sink());
        self.phase = Phase::Open { stream, writer };
        self.events.push_back(ConnectionEvent::Connected);
        Ok(())
    }

    fn read_ready(&mut self) {
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        let result = match &self.phase {
            Phase::Open { stream, .. } => stream.try_read(&mut chunk),
            _ => return,
        };

        match result {
            Ok(0) => self.teardown("connection closed"),
            Ok(n) => self.ingest(&chunk[..n]),
            Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted) => {}
            Err(err) => self.teardown(err.to_string()),
        }
    }

    fn ingest(&mut self, bytes: &[u8]) {
        if let Err(err) = self.reader.append(bytes) {
            error!(conn = self.id, %err, "peer is not honoring the framing");
            self.teardown(err.to_string());
            return;
        }

        loop {
            match self.reader.read_message() {
                Ok(Some(message)) => {
                    debug!(conn = self.id, kind = %message.kind(), "received");
                    self.events.push_back(ConnectionEvent::Message(message));
                }
                Ok(None) => break,
                Err(err) => {
                    warn!(conn = self.id, %err, "undecodable frame");
                    self.teardown(err.to_string());
                    break;
                }
            }
        }
    }

    /// Send one message, or queue it while corked.
    ///
    /// Returns `false` if the connection is not open or the write failed. A
    /// failed write destroys the connection with the error text as reason.
    pub fn send(&mut self, message: &Message) -> bool {
        let Phase::Open { writer, .. } = &mut self.phase else {
            debug!(conn = self.id, kind = %message.kind(), "dropping send, connection not open");
            return false;
        };
        match writer.send(message) {
            Ok(()) => true,
            Err(err) => {
                self.write_failed(err);
                false
            }
        }
    }

    /// Queue subsequent sends until [`uncork`](Self::uncork).
    pub fn cork(&mut self) {
        if let Phase::Open { writer, .. } = &mut self.phase {
            writer.cork();
        }
    }

    /// Write all queued sends in a single socket write.
    pub fn uncork(&mut self) -> bool {
        let Phase::Open { writer, .. } = &mut self.phase else {
            return false;
        };
        match writer.uncork() {
            Ok(()) => true,
            Err(err) => {
                self.write_failed(err);
                false
            }
        }
    }

    fn write_failed(&mut self, err: FrameError) {
        warn!(conn = self.id, %err, "write failed");
        self.teardown(err.to_string());
    }

    /// Tear the connection down.
    ///
    /// Cancels the connect timeout, closes the socket and queues
    /// `Destroyed(reason)`. Destroying twice is a bug and fails with
    /// [`PeerError::AlreadyDestroyed`]; that includes a connection that
    /// already tore itself down.
    pub fn destroy(&mut self, reason: impl Into<String>) -> Result<()> {
        if self.is_destroyed() {
            return Err(PeerError::AlreadyDestroyed);
        }
        self.teardown(reason);
        Ok(())
    }

    fn teardown(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        self.connect_timer.cancel();
        if let Phase::Connecting(task) = &self.phase {
            task.abort();
        }
        self.phase = Phase::Closed;
        info!(conn = self.id, %reason, "connection destroyed");
        self.events.push_back(ConnectionEvent::Destroyed(reason));
    }
}

/// Next event of an optional connection; pending forever when there is none.
pub(crate) async fn next_event_of(conn: &mut Option<Connection>) -> Result<ConnectionEvent> {
    match conn {
        Some(conn) => conn.next_event().await,
        None => pending().await,
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Phase::Connecting(task) = &self.phase {
            task.abort();
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let phase = match self.phase {
            Phase::Connecting(_) => "connecting",
            Phase::Open { .. } => "open",
            Phase::Closed => "closed",
        };
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("phase", &phase)
            .field("queued_events", &self.events.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::time::timeout;

    use super::*;

    const WAIT: Duration = Duration::from_secs(5);

    async fn connected_pair() -> (Connection, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("listener should bind");
        let port = listener.local_addr().expect("local addr").port();

        let mut conn = Connection::connect(1, "127.0.0.1", port, WAIT);
        let (peer, _) = accept(&listener).await;

        let event = timeout(WAIT, conn.next_event())
            .await
            .expect("connect should finish")
            .expect("connect should not be a logic error");
        assert_eq!(event, ConnectionEvent::Connected);
        (conn, peer)
    }

    async fn accept(listener: &TcpListener) -> (TcpStream, SocketAddr) {
        timeout(WAIT, listener.accept())
            .await
            .expect("connect should reach the listener")
            .expect("accept should succeed")
    }

    async fn next(conn: &mut Connection) -> ConnectionEvent {
        timeout(WAIT, conn.next_event())
            .await
            .expect("event should arrive")
            .expect("event should not be an error")
    }

    #[tokio::test]
    async fn connect_reports_connected_once() {
        let (mut conn, _peer) = connected_pair().await;
        assert!(conn.is_open());
        assert!(conn.peer_addr().is_some());

        let more = timeout(Duration::from_millis(50), conn.next_event()).await;
        assert!(more.is_err(), "no further event expected");
    }

    #[tokio::test(start_paused = true)]
    async fn connect_timeout_destroys() {
        let mut conn = Connection::connecting(
            7,
            Box::pin(pending::<vidctrl_transport::Result<ControlStream>>()),
            Duration::from_millis(10_000),
        );

        assert_eq!(
            conn.next_event().await.expect("timeout is not a logic error"),
            ConnectionEvent::Destroyed("connect timeout".to_string())
        );
        assert!(conn.is_destroyed());
        assert!(!conn.connect_timer.is_armed());
    }

    #[tokio::test]
    async fn connected_after_timeout_is_a_logic_error() {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("listener should bind");
        let port = listener.local_addr().expect("local addr").port();

        let mut conn = Connection::connect(2, "127.0.0.1", port, WAIT);
        let _accepted = accept(&listener).await;
        // Simulate the timeout having already consumed its deadline.
        conn.connect_timer.cancel();

        let err = timeout(WAIT, conn.next_event())
            .await
            .expect("connect should finish")
            .unwrap_err();
        assert!(matches!(err, PeerError::AlreadyDisconnected));
    }

    #[tokio::test]
    async fn connect_starts_before_first_poll() {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("listener should bind");
        let port = listener.local_addr().expect("local addr").port();

        let mut conn = Connection::connect(4, "127.0.0.1", port, WAIT);
        let (_peer, _) = accept(&listener).await;
        assert!(!conn.is_open(), "open is only observed through next_event");

        assert_eq!(next(&mut conn).await, ConnectionEvent::Connected);
        assert!(conn.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_aborts_pending_connect() {
        let mut conn = Connection::connecting(
            8,
            Box::pin(pending::<vidctrl_transport::Result<ControlStream>>()),
            WAIT,
        );
        conn.destroy("user request").expect("first destroy succeeds");
        assert!(conn.is_destroyed());
        assert_eq!(
            next(&mut conn).await,
            ConnectionEvent::Destroyed("user request".to_string())
        );
    }

    #[tokio::test]
    async fn refused_connect_destroys_with_error_text() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0")
                .await
                .expect("listener should bind");
            listener.local_addr().expect("local addr").port()
        };

        let mut conn = Connection::connect(3, "127.0.0.1", port, WAIT);
        match next(&mut conn).await {
            ConnectionEvent::Destroyed(reason) => assert!(reason.contains("127.0.0.1")),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn peer_close_destroys_with_reason() {
        let (mut conn, peer) = connected_pair().await;
        drop(peer);

        assert_eq!(
            next(&mut conn).await,
            ConnectionEvent::Destroyed("connection closed".to_string())
        );
        assert!(conn.is_destroyed());
    }

    #[tokio::test]
    async fn frames_from_one_read_arrive_in_order() {
        let (mut conn, mut peer) = connected_pair().await;

        let mut wire = Vec::new();
        for message in [
            Message::Pong,
            Message::SetTargetBitrate(64_000),
            Message::Resume,
        ] {
            wire.extend_from_slice(&message.to_bytes());
        }
        peer.write_all(&wire).await.expect("peer write");

        assert_eq!(next(&mut conn).await, ConnectionEvent::Message(Message::Pong));
        assert_eq!(
            next(&mut conn).await,
            ConnectionEvent::Message(Message::SetTargetBitrate(64_000))
        );
        assert_eq!(
            next(&mut conn).await,
            ConnectionEvent::Message(Message::Resume)
        );
    }

    #[tokio::test]
    async fn messages_before_bad_frame_are_delivered_first() {
        let (mut conn, mut peer) = connected_pair().await;

        let mut wire = Message::Ping.to_bytes().to_vec();
        wire.extend_from_slice(&[0x00, 0x01, 0x7F]);
        peer.write_all(&wire).await.expect("peer write");

        assert_eq!(next(&mut conn).await, ConnectionEvent::Message(Message::Ping));
        assert_eq!(
            next(&mut conn).await,
            ConnectionEvent::Destroyed("unknown message kind 127".to_string())
        );
    }

    #[tokio::test]
    async fn unframed_flood_destroys() {
        let (mut conn, mut peer) = connected_pair().await;

        let writer = tokio::spawn(async move {
            let _ = peer.write_all(&[0xFF, 0xFF]).await;
            let junk = vec![0u8; 60_000];
            let _ = peer.write_all(&junk).await;
            peer
        });

        match next(&mut conn).await {
            ConnectionEvent::Destroyed(reason) => assert!(reason.contains("overflow")),
            other => panic!("unexpected event: {other:?}"),
        }
        drop(writer.await);
    }

    #[tokio::test]
    async fn cork_batches_onto_the_wire() {
        let (mut conn, mut peer) = connected_pair().await;

        conn.cork();
        assert!(conn.send(&Message::SetTargetBitrate(1_000_000)));
        assert!(conn.send(&Message::Resume));
        assert!(conn.uncork());

        let mut expected = Message::SetTargetBitrate(1_000_000).to_bytes().to_vec();
        expected.extend_from_slice(&Message::Resume.to_bytes());

        let mut got = vec![0u8; expected.len()];
        timeout(WAIT, peer.read_exact(&mut got))
            .await
            .expect("bytes should arrive")
            .expect("read should succeed");
        assert_eq!(got, expected);
    }

    #[tokio::test]
    async fn destroy_twice_is_an_error() {
        let (mut conn, _peer) = connected_pair().await;

        conn.destroy("user request").expect("first destroy succeeds");
        assert!(matches!(
            conn.destroy("again"),
            Err(PeerError::AlreadyDestroyed)
        ));

        assert_eq!(
            next(&mut conn).await,
            ConnectionEvent::Destroyed("user request".to_string())
        );
        let more = timeout(Duration::from_millis(50), conn.next_event()).await;
        assert!(more.is_err(), "Destroyed is reported once");
    }

    #[tokio::test]
    async fn send_on_closed_connection_is_refused() {
        let (mut conn, _peer) = connected_pair().await;
        conn.destroy("done").expect("destroy succeeds");
        assert!(!conn.send(&Message::Pause));
        assert!(!conn.uncork());
    }

    #[tokio::test]
    async fn accepted_stream_reports_no_connected_event() {
        let socket = TcpControlSocket::bind("127.0.0.1", 0)
            .await
            .expect("socket should bind");
        let port = socket.local_addr().port();

        let mut client = TcpStream::connect(("127.0.0.1", port))
            .await
            .expect("client should connect");
        let stream = timeout(WAIT, socket.accept())
            .await
            .expect("client should reach the socket")
            .expect("accept should succeed");
        let mut conn = Connection::from_stream(9, stream);
        assert!(conn.is_open());

        client
            .write_all(&Message::StatsRequest.to_bytes())
            .await
            .expect("client write");
        assert_eq!(
            next(&mut conn).await,
            ConnectionEvent::Message(Message::StatsRequest)
        );
    }
}
