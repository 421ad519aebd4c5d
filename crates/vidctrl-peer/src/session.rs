use std::fmt;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};
use vidctrl_frame::{AnnotationMode, DrcLevel, Message, StatsReport};

use crate::control::{ProbeKind, SessionConfig, StreamParams};

/// Connection status as seen by the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected { reason: Option<String> },
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Disconnected { .. } => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Disconnected { reason } => reason.as_deref(),
            _ => None,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.reason() {
            Some(reason) => write!(f, "{} ({reason})", self.name()),
            None => f.write_str(self.name()),
        }
    }
}

/// Reply that completed a probe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProbeReply {
    Pong,
    Stats(StatsReport),
}

/// A completed probe: round-trip time and what came back.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeResult {
    pub rtt: Duration,
    pub reply: ProbeReply,
}

/// Side effects requested by [`SessionCore`], to be carried out in order.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionAction {
    /// Notify observers of a state transition.
    StatusChanged(ConnectionState),
    /// Open a new connection.
    Connect {
        host: String,
        port: u16,
        timeout: Duration,
    },
    /// Destroy the current connection and drop it unobserved.
    Teardown { reason: String },
    Cork,
    Send(Message),
    Uncork,
    /// Arm the reconnect timer, replacing any armed deadline.
    ScheduleReconnect(Duration),
    CancelReconnect,
    /// Start the periodic probe timer.
    StartProbe(Duration),
    StopProbe,
    /// Deliver a probe result to the application.
    ProbeCompleted(ProbeResult),
}

/// Client-side control protocol state machine.
///
/// Performs no I/O and reads no clocks: every input is a method call (with
/// the current time where it matters) and every effect is a queued
/// [`SessionAction`] collected with [`take_actions`](Self::take_actions).
///
/// The cycle is `Disconnected -> Connecting -> Connected -> Disconnected`.
/// A lost connection always schedules exactly one reconnect; at most one
/// probe is ever in flight because replies carry no request id.
#[derive(Debug)]
pub struct SessionCore {
    config: SessionConfig,
    state: ConnectionState,
    params: StreamParams,
    has_connection: bool,
    reconnect_pending: bool,
    probe_running: bool,
    probe_sent_at: Option<Instant>,
    actions: Vec<SessionAction>,
}

impl SessionCore {
    pub fn new(config: SessionConfig) -> Self {
        let params = config.params.clone();
        Self {
            config,
            state: ConnectionState::Disconnected { reason: None },
            params,
            has_connection: false,
            reconnect_pending: false,
            probe_running: false,
            probe_sent_at: None,
            actions: Vec::new(),
        }
    }

    /// Drain the actions queued so far.
    pub fn take_actions(&mut self) -> Vec<SessionAction> {
        std::mem::take(&mut self.actions)
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn params(&self) -> &StreamParams {
        &self.params
    }

    pub fn host(&self) -> &str {
        &self.config.host
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn probe_outstanding(&self) -> bool {
        self.probe_sent_at.is_some()
    }

    pub fn reconnect_pending(&self) -> bool {
        self.reconnect_pending
    }

    /// Change the target host. With `reconnect_now` any current connection
    /// is dropped and a new one started immediately.
    pub fn set_endpoint(&mut self, host: impl Into<String>, reconnect_now: bool) {
        self.config.host = host.into();
        debug!(host = %self.config.host, reconnect_now, "endpoint changed");
        if reconnect_now {
            self.reconnect("connect to new ip address".to_string(), Duration::ZERO);
        }
    }

    /// Start a connection attempt to the configured endpoint.
    pub fn connect(&mut self) {
        if self.reconnect_pending {
            self.reconnect_pending = false;
            self.push(SessionAction::CancelReconnect);
        }
        if self.has_connection {
            self.push(SessionAction::Teardown {
                reason: "superseded by new connect".to_string(),
            });
        }

        info!(host = %self.config.host, port = self.config.control_port, "connect");
        self.set_state(ConnectionState::Connecting);
        self.has_connection = true;
        self.push(SessionAction::Connect {
            host: self.config.host.clone(),
            port: self.config.control_port,
            timeout: self.config.connect_timeout,
        });
    }

    /// The connection finished connecting: replay parameters and start probing.
    pub fn on_connected(&mut self) {
        if self.state != ConnectionState::Connecting {
            warn!(state = %self.state, "connected event outside connecting state");
        }
        self.set_state(ConnectionState::Connected);

        self.push(SessionAction::Cork);
        self.push(SessionAction::Send(Message::SetTargetBitrate(
            self.params.target_bitrate,
        )));
        self.push(SessionAction::Send(self.resolution_framerate()));
        if let Some(mode) = self.params.annotation {
            self.push(SessionAction::Send(Message::SetAnnotationMode(mode)));
        }
        if let Some(level) = self.params.drc {
            self.push(SessionAction::Send(Message::SetDrcLevel(level)));
        }
        self.push(SessionAction::Send(if self.params.paused {
            Message::Pause
        } else {
            Message::Resume
        }));
        self.push(SessionAction::Uncork);

        self.probe_running = true;
        self.push(SessionAction::StartProbe(self.config.probe_interval));
    }

    /// The connection went away, for any reason.
    pub fn on_connection_destroyed(&mut self, reason: impl Into<String>) {
        self.has_connection = false;
        self.reconnect(reason.into(), self.config.reconnect_delay);
    }

    /// The reconnect delay elapsed.
    pub fn on_reconnect_timer(&mut self) {
        self.reconnect_pending = false;
        self.connect();
    }

    /// Periodic probe tick. Sends a probe unless one is still outstanding.
    pub fn on_probe_tick(&mut self, now: Instant) {
        if !self.state.is_connected() {
            return;
        }
        if let Some(sent_at) = self.probe_sent_at {
            warn!(
                waited_ms = now.saturating_duration_since(sent_at).as_millis() as u64,
                "previous probe still outstanding, skipping tick"
            );
            return;
        }

        self.probe_sent_at = Some(now);
        let probe = match self.config.probe {
            ProbeKind::Ping => Message::Ping,
            ProbeKind::Stats => Message::StatsRequest,
        };
        self.push(SessionAction::Send(probe));
    }

    /// A message arrived from the producer.
    pub fn on_message(&mut self, message: Message, now: Instant) {
        let reply = match message {
            Message::Pong => ProbeReply::Pong,
            Message::StatsResponse(report) => ProbeReply::Stats(report),
            other => {
                warn!(kind = %other.kind(), "unexpected message from producer");
                return;
            }
        };

        let Some(sent_at) = self.probe_sent_at.take() else {
            warn!(?reply, "unsolicited probe reply");
            return;
        };
        let rtt = now.saturating_duration_since(sent_at);
        debug!(rtt_ms = rtt.as_secs_f64() * 1000.0, "probe completed");
        self.push(SessionAction::ProbeCompleted(ProbeResult { rtt, reply }));
    }

    /// Stop everything: probe, pending reconnect and the connection.
    pub fn shutdown(&mut self) {
        self.stop_probe();
        if self.reconnect_pending {
            self.reconnect_pending = false;
            self.push(SessionAction::CancelReconnect);
        }
        if self.has_connection {
            self.has_connection = false;
            self.push(SessionAction::Teardown {
                reason: "session shutdown".to_string(),
            });
        }
        self.set_state(ConnectionState::Disconnected {
            reason: Some("session shutdown".to_string()),
        });
    }

    pub fn pause(&mut self) -> bool {
        self.params.paused = true;
        self.send_if_connected(Message::Pause)
    }

    pub fn resume(&mut self) -> bool {
        self.params.paused = false;
        self.send_if_connected(Message::Resume)
    }

    pub fn set_resolution_framerate(&mut self, width: u16, height: u16, framerate: u16) -> bool {
        self.params.width = width;
        self.params.height = height;
        self.params.framerate = framerate;
        self.send_if_connected(self.resolution_framerate())
    }

    /// Update width and height, keeping the framerate.
    pub fn resolution_changed(&mut self, width: u16, height: u16) -> bool {
        self.set_resolution_framerate(width, height, self.params.framerate)
    }

    /// Update the framerate, keeping the resolution.
    pub fn framerate_changed(&mut self, framerate: u16) -> bool {
        self.set_resolution_framerate(self.params.width, self.params.height, framerate)
    }

    pub fn set_target_bitrate(&mut self, bitrate: u32) -> bool {
        self.params.target_bitrate = bitrate;
        self.send_if_connected(Message::SetTargetBitrate(bitrate))
    }

    pub fn set_annotation_mode(&mut self, mode: AnnotationMode) -> bool {
        self.params.annotation = Some(mode);
        self.send_if_connected(Message::SetAnnotationMode(mode))
    }

    pub fn set_drc_level(&mut self, level: DrcLevel) -> bool {
        self.params.drc = Some(level);
        self.send_if_connected(Message::SetDrcLevel(level))
    }

    fn resolution_framerate(&self) -> Message {
        Message::SetResolutionFramerate {
            width: self.params.width,
            height: self.params.height,
            framerate: self.params.framerate,
        }
    }

    fn send_if_connected(&mut self, message: Message) -> bool {
        if !self.state.is_connected() {
            debug!(kind = %message.kind(), state = %self.state, "not connected, cached only");
            return false;
        }
        self.push(SessionAction::Send(message));
        true
    }

    fn reconnect(&mut self, reason: String, delay: Duration) {
        info!(%reason, delay_ms = delay.as_millis() as u64, "disconnected, reconnecting");
        self.stop_probe();
        self.set_state(ConnectionState::Disconnected {
            reason: Some(reason.clone()),
        });

        if self.has_connection {
            self.has_connection = false;
            self.push(SessionAction::Teardown { reason });
        }
        if self.reconnect_pending {
            self.reconnect_pending = false;
            self.push(SessionAction::CancelReconnect);
        }

        if delay.is_zero() {
            self.connect();
        } else {
            self.reconnect_pending = true;
            self.push(SessionAction::ScheduleReconnect(delay));
        }
    }

    fn stop_probe(&mut self) {
        self.probe_sent_at = None;
        if self.probe_running {
            self.probe_running = false;
            self.push(SessionAction::StopProbe);
        }
    }

    fn set_state(&mut self, state: ConnectionState) {
        self.state = state.clone();
        self.push(SessionAction::StatusChanged(state));
    }

    fn push(&mut self, action: SessionAction) {
        self.actions.push(action);
    }
}
