use std::time::Duration;

use vidctrl_frame::{AnnotationMode, DrcLevel};
use vidctrl_transport::DEFAULT_CONTROL_PORT;

/// Default connect timeout: 10 seconds.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(10_000);
/// Default delay before reconnecting after a disconnect: 1.5 seconds.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(1500);
/// Default interval between probes: 1 second.
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_millis(1000);
/// Default encoder target bitrate in bits per second.
pub const DEFAULT_TARGET_BITRATE: u32 = 1_000_000;
/// Default MTU of the media path.
pub const DEFAULT_MTU: u16 = 1500;
/// IPv4 header plus UDP header.
pub const IPV4_UDP_OVERHEAD: u16 = 28;

/// Last known stream parameters, replayed to the producer on every connect.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamParams {
    pub width: u16,
    pub height: u16,
    pub framerate: u16,
    pub target_bitrate: u32,
    /// Only sent once it has been set.
    pub annotation: Option<AnnotationMode>,
    /// Only sent once it has been set.
    pub drc: Option<DrcLevel>,
    pub paused: bool,
}

impl Default for StreamParams {
    fn default() -> Self {
        Self {
            width: 320,
            height: 240,
            framerate: 30,
            target_bitrate: DEFAULT_TARGET_BITRATE,
            annotation: None,
            drc: None,
            paused: false,
        }
    }
}

/// Which correlated request the periodic probe sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProbeKind {
    /// `Ping`, answered by `Pong`. Measures round-trip time only.
    Ping,
    /// `StatsRequest`, answered by `StatsResponse`.
    #[default]
    Stats,
}

/// Client session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub host: String,
    pub control_port: u16,
    pub connect_timeout: Duration,
    pub reconnect_delay: Duration,
    pub probe_interval: Duration,
    pub probe: ProbeKind,
    pub params: StreamParams,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            control_port: DEFAULT_CONTROL_PORT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            probe_interval: DEFAULT_PROBE_INTERVAL,
            probe: ProbeKind::default(),
            params: StreamParams::default(),
        }
    }
}

/// Producer (server) configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_host: String,
    pub control_port: u16,
    pub mtu: u16,
}

impl ServerConfig {
    /// RTP payload size that fits one datagram on the configured MTU.
    pub fn rtp_payload_size(&self) -> u16 {
        self.mtu.saturating_sub(IPV4_UDP_OVERHEAD)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            control_port: DEFAULT_CONTROL_PORT,
            mtu: DEFAULT_MTU,
        }
    }
}
