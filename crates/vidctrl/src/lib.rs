//! Remote control channel for live video streaming endpoints.
//!
//! vidctrl carries control commands (pause/resume, resolution, framerate,
//! bitrate, image flags) and health probes between a video viewer and a
//! video producer over one persistent TCP connection.
//!
//! # Crate Structure
//!
//! - [`transport`]: TCP sockets and cancellable timers
//! - [`frame`]: control message codec and frame reassembly
//! - [`peer`]: connections, the reconnecting client session, the producer
//!   server and rolling stats (behind the `peer` feature)

/// Re-export transport types.
pub mod transport {
    pub use vidctrl_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use vidctrl_frame::*;
}

/// Re-export peer types (requires `peer` feature).
#[cfg(feature = "peer")]
pub mod peer {
    pub use vidctrl_peer::*;
}
