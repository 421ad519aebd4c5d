//! Control message framing for vidctrl.
//!
//! Every message on the control channel is framed as:
//! - A 2-byte big-endian length counting everything after it
//! - A 1-byte message kind
//! - A fixed-size payload determined by the kind
//!
//! [`FrameReader`] reassembles frames from arbitrarily chunked input without
//! doing any I/O itself. [`FrameWriter`] encodes messages onto any `Write`
//! sink and can batch several of them into one write (cork/uncork).

#[cfg(feature = "async")]
pub mod async_codec;
pub mod codec;
pub mod error;
pub mod reader;
pub mod writer;

#[cfg(feature = "async")]
pub use async_codec::ControlCodec;
pub use codec::{
    AnnotationMode, DrcLevel, Frame, FrameConfig, Message, MessageKind, StatsReport,
    DEFAULT_MAX_BUFFERED, LENGTH_PREFIX_SIZE,
};
pub use error::{FrameError, Result};
pub use reader::FrameReader;
pub use writer::FrameWriter;
