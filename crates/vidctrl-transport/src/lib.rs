//! TCP transport for the vidctrl control channel.
//!
//! This is the lowest layer of vidctrl. It provides:
//! - [`ControlStream`], a connected non-blocking TCP stream with `TCP_NODELAY`
//! - [`TcpControlSocket`], the listening side of the control port
//! - [`TcpSink`], a `std::io::Write` adapter that never blocks
//! - [`Timer`], an owned, cancellable one-shot deadline
//!
//! Everything above (framing, connections, sessions) builds on these.

pub mod error;
pub mod stream;
pub mod tcp;
pub mod timer;

pub use error::{Result, TransportError};
pub use stream::{ControlStream, TcpSink};
pub use tcp::{TcpControlSocket, DEFAULT_CONTROL_PORT, DEFAULT_MEDIA_PORT};
pub use timer::Timer;
