//! Connection lifecycle and control sessions for vidctrl.
//!
//! This is the "keeps working" layer. A [`ControlSession`] holds a control
//! connection to a video producer open across failures, replays the stream
//! parameters on every reconnect, batches them into one write and polls the
//! producer with single-in-flight probes. A [`ControlServer`] is the producer
//! end: it applies received commands to a [`MediaPipeline`] and answers
//! probes from a [`StatsAggregator`] window.
//!
//! The protocol logic lives in [`SessionCore`], a synchronous state machine
//! with no I/O; the async types only carry out the actions it queues.

pub mod connection;
pub mod connector;
pub mod control;
pub mod error;
pub mod listener;
pub mod pipeline;
pub mod session;
pub mod stats;

pub use connection::{Connection, ConnectionEvent};
pub use connector::{ControlSession, SessionEvent, SessionHandle};
pub use control::{
    ProbeKind, ServerConfig, SessionConfig, StreamParams, DEFAULT_CONNECT_TIMEOUT, DEFAULT_MTU,
    DEFAULT_PROBE_INTERVAL, DEFAULT_RECONNECT_DELAY, DEFAULT_TARGET_BITRATE, IPV4_UDP_OVERHEAD,
};
pub use error::{PeerError, Result};
pub use listener::ControlServer;
pub use pipeline::MediaPipeline;
pub use session::{ConnectionState, ProbeReply, ProbeResult, SessionAction, SessionCore};
pub use stats::{SharedStats, StatsAggregator, StatsSample, STATS_WINDOW};
