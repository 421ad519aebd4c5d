use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};
use vidctrl_frame::{AnnotationMode, DrcLevel};
use vidctrl_transport::Timer;

use crate::connection::{next_event_of, Connection, ConnectionEvent};
use crate::control::SessionConfig;
use crate::error::{PeerError, Result};
use crate::session::{ConnectionState, ProbeResult, SessionAction, SessionCore};

const COMMAND_QUEUE_DEPTH: usize = 64;

/// Notifications from a running [`ControlSession`].
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StatusChanged(ConnectionState),
    ProbeCompleted(ProbeResult),
}

#[derive(Debug)]
enum Intent {
    Pause,
    Resume,
    SetResolutionFramerate {
        width: u16,
        height: u16,
        framerate: u16,
    },
    ResolutionChanged {
        width: u16,
        height: u16,
    },
    FramerateChanged(u16),
    SetTargetBitrate(u32),
    SetAnnotationMode(AnnotationMode),
    SetDrcLevel(DrcLevel),
}

#[derive(Debug)]
enum Command {
    SetEndpoint { host: String, reconnect_now: bool },
    Connect,
    Intent {
        intent: Intent,
        reply: oneshot::Sender<bool>,
    },
    Shutdown,
}

enum Wake {
    Connection(Result<ConnectionEvent>),
    Reconnect,
    Probe,
    Command(Option<Command>),
}

/// Client control session task.
///
/// Owns a [`SessionCore`], the current [`Connection`] and the reconnect and
/// probe timers, and runs them on a single task. Drive it through the
/// [`SessionHandle`] returned alongside it.
pub struct ControlSession {
    core: SessionCore,
    conn: Option<Connection>,
    next_conn_id: u64,
    reconnect_timer: Timer,
    probe_timer: Timer,
    probe_interval: Duration,
    commands: mpsc::Receiver<Command>,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl ControlSession {
    /// Create a session with its handle and event stream. Nothing happens
    /// until [`run`](Self::run) is polled.
    pub fn new(
        config: SessionConfig,
    ) -> (Self, SessionHandle, mpsc::UnboundedReceiver<SessionEvent>) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let probe_interval = config.probe_interval;

        let session = Self {
            core: SessionCore::new(config),
            conn: None,
            next_conn_id: 0,
            reconnect_timer: Timer::new(),
            probe_timer: Timer::new(),
            probe_interval,
            commands: command_rx,
            events: event_tx,
        };
        (session, SessionHandle { commands: command_tx }, event_rx)
    }

    /// Create a session and spawn it on the current runtime.
    pub fn spawn(
        config: SessionConfig,
    ) -> (
        SessionHandle,
        mpsc::UnboundedReceiver<SessionEvent>,
        JoinHandle<Result<()>>,
    ) {
        let (session, handle, events) = Self::new(config);
        (handle, events, tokio::spawn(session.run()))
    }

    /// Run until shut down or until every handle is dropped.
    ///
    /// Connection failures never end the loop. It returns an error only for
    /// a broken connection invariant, such as destroying a connection twice.
    pub async fn run(mut self) -> Result<()> {
        loop {
            let wake = tokio::select! {
                biased;
                event = next_event_of(&mut self.conn) => Wake::Connection(event),
                () = self.reconnect_timer.fired() => Wake::Reconnect,
                () = self.probe_timer.fired() => Wake::Probe,
                command = self.commands.recv() => Wake::Command(command),
            };

            match wake {
                Wake::Connection(event) => match event? {
                    ConnectionEvent::Connected => self.core.on_connected(),
                    ConnectionEvent::Message(message) => {
                        self.core.on_message(message, Instant::now())
                    }
                    ConnectionEvent::Destroyed(reason) => {
                        self.conn = None;
                        self.core.on_connection_destroyed(reason);
                    }
                },
                Wake::Reconnect => self.core.on_reconnect_timer(),
                Wake::Probe => {
                    self.probe_timer.schedule(self.probe_interval);
                    self.core.on_probe_tick(Instant::now());
                }
                Wake::Command(None) | Wake::Command(Some(Command::Shutdown)) => {
                    info!("control session shutting down");
                    self.core.shutdown();
                    self.apply_actions()?;
                    return Ok(());
                }
                Wake::Command(Some(command)) => self.handle_command(command),
            }

            self.apply_actions()?;
        }
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::SetEndpoint {
                host,
                reconnect_now,
            } => self.core.set_endpoint(host, reconnect_now),
            Command::Connect => self.core.connect(),
            Command::Intent { intent, reply } => {
                let sent = self.apply_intent(intent);
                // The caller may have stopped waiting.
                let _ = reply.send(sent);
            }
            Command::Shutdown => {}
        }
    }

    fn apply_intent(&mut self, intent: Intent) -> bool {
        match intent {
            Intent::Pause => self.core.pause(),
            Intent::Resume => self.core.resume(),
            Intent::SetResolutionFramerate {
                width,
                height,
                framerate,
            } => self.core.set_resolution_framerate(width, height, framerate),
            Intent::ResolutionChanged { width, height } => {
                self.core.resolution_changed(width, height)
            }
            Intent::FramerateChanged(framerate) => self.core.framerate_changed(framerate),
            Intent::SetTargetBitrate(bitrate) => self.core.set_target_bitrate(bitrate),
            Intent::SetAnnotationMode(mode) => self.core.set_annotation_mode(mode),
            Intent::SetDrcLevel(level) => self.core.set_drc_level(level),
        }
    }

    fn apply_actions(&mut self) -> Result<()> {
        for action in self.core.take_actions() {
            match action {
                SessionAction::StatusChanged(state) => {
                    self.emit(SessionEvent::StatusChanged(state));
                }
                SessionAction::Connect {
                    host,
                    port,
                    timeout,
                } => {
                    self.next_conn_id += 1;
                    self.conn = Some(Connection::connect(self.next_conn_id, host, port, timeout));
                }
                SessionAction::Teardown { reason } => {
                    // A connection that already tore itself down has its
                    // Destroyed event discarded along with it.
                    if let Some(mut conn) = self.conn.take() {
                        if !conn.is_destroyed() {
                            conn.destroy(reason)?;
                        }
                    }
                }
                SessionAction::Cork => {
                    if let Some(conn) = self.conn.as_mut() {
                        conn.cork();
                    }
                }
                SessionAction::Send(message) => {
                    if let Some(conn) = self.conn.as_mut() {
                        conn.send(&message);
                    }
                }
                SessionAction::Uncork => {
                    if let Some(conn) = self.conn.as_mut() {
                        conn.uncork();
                    }
                }
                SessionAction::ScheduleReconnect(delay) => {
                    self.reconnect_timer.schedule(delay);
                }
                SessionAction::CancelReconnect => {
                    self.reconnect_timer.cancel();
                }
                SessionAction::StartProbe(interval) => {
                    self.probe_interval = interval;
                    self.probe_timer.schedule(interval);
                }
                SessionAction::StopProbe => {
                    self.probe_timer.cancel();
                }
                SessionAction::ProbeCompleted(result) => {
                    self.emit(SessionEvent::ProbeCompleted(result));
                }
            }
        }
        Ok(())
    }

    fn emit(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            debug!("session event dropped, no subscriber");
        }
    }
}

/// Cloneable handle to a running [`ControlSession`].
///
/// Intent methods resolve to `true` if the message went out and `false` if
/// the session was not connected; the value is cached for the next connect
/// either way.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
}

impl SessionHandle {
    pub async fn set_endpoint(&self, host: impl Into<String>, reconnect_now: bool) -> Result<()> {
        self.command(Command::SetEndpoint {
            host: host.into(),
            reconnect_now,
        })
        .await
    }

    pub async fn connect(&self) -> Result<()> {
        self.command(Command::Connect).await
    }

    /// Ask the session to stop. Completes once the request is queued.
    pub async fn shutdown(&self) -> Result<()> {
        self.command(Command::Shutdown).await
    }

    pub async fn pause(&self) -> Result<bool> {
        self.intent(Intent::Pause).await
    }

    pub async fn resume(&self) -> Result<bool> {
        self.intent(Intent::Resume).await
    }

    pub async fn set_resolution_framerate(
        &self,
        width: u16,
        height: u16,
        framerate: u16,
    ) -> Result<bool> {
        self.intent(Intent::SetResolutionFramerate {
            width,
            height,
            framerate,
        })
        .await
    }

    pub async fn resolution_changed(&self, width: u16, height: u16) -> Result<bool> {
        self.intent(Intent::ResolutionChanged { width, height })
            .await
    }

    pub async fn framerate_changed(&self, framerate: u16) -> Result<bool> {
        self.intent(Intent::FramerateChanged(framerate)).await
    }

    pub async fn set_target_bitrate(&self, bitrate: u32) -> Result<bool> {
        self.intent(Intent::SetTargetBitrate(bitrate)).await
    }

    pub async fn set_annotation_mode(&self, mode: AnnotationMode) -> Result<bool> {
        self.intent(Intent::SetAnnotationMode(mode)).await
    }

    pub async fn set_drc_level(&self, level: DrcLevel) -> Result<bool> {
        self.intent(Intent::SetDrcLevel(level)).await
    }

    async fn command(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| PeerError::SessionClosed)
    }

    async fn intent(&self, intent: Intent) -> Result<bool> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Intent { intent, reply }).await?;
        rx.await.map_err(|_| PeerError::SessionClosed)
    }
}
