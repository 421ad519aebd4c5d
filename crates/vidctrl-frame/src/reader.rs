use bytes::{Buf, BytesMut};

use crate::codec::{Frame, FrameConfig, Message, LENGTH_PREFIX_SIZE};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 4 * 1024;

/// Reassembles frames from arbitrarily chunked input.
///
/// The reader does no I/O. Feed it whatever the socket produced with
/// [`append`](Self::append), then call [`try_read_frame`](Self::try_read_frame)
/// until it returns `None`; a single chunk may hold any number of frames.
///
/// Reassembly is two-phase: first the 2-byte length, then the body. A parsed
/// length is kept across calls, so a frame split anywhere is picked up where
/// it left off.
#[derive(Debug)]
pub struct FrameReader {
    buf: BytesMut,
    pending_len: Option<u16>,
    config: FrameConfig,
}

impl FrameReader {
    /// Create a new frame reader with default configuration.
    pub fn new() -> Self {
        Self::with_config(FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(config: FrameConfig) -> Self {
        Self {
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            pending_len: None,
            config,
        }
    }

    /// Buffer a chunk of received bytes.
    ///
    /// Fails with [`FrameError::BufferOverflow`] if the total would exceed
    /// `max_buffered`; nothing is buffered in that case. The overflow means
    /// the peer is not honoring the framing, so the owner should drop the
    /// connection.
    pub fn append(&mut self, chunk: &[u8]) -> Result<()> {
        let buffered = self.buf.len() + chunk.len();
        if buffered > self.config.max_buffered {
            return Err(FrameError::BufferOverflow {
                buffered,
                max: self.config.max_buffered,
            });
        }
        self.buf.extend_from_slice(chunk);
        Ok(())
    }

    /// Take the next complete frame, if one is buffered.
    ///
    /// Returns `Ok(None)` when more bytes are needed. A zero length prefix is
    /// rejected with [`FrameError::EmptyFrame`].
    pub fn try_read_frame(&mut self) -> Result<Option<Frame>> {
        let len = match self.pending_len {
            Some(len) => len,
            None => {
                if self.buf.len() < LENGTH_PREFIX_SIZE {
                    return Ok(None);
                }
                let len = self.buf.get_u16();
                self.pending_len = Some(len);
                len
            }
        };

        if len == 0 {
            self.pending_len = None;
            return Err(FrameError::EmptyFrame);
        }

        let len = usize::from(len);
        if self.buf.len() < len {
            return Ok(None);
        }

        self.pending_len = None;
        let mut body = self.buf.split_to(len).freeze();
        let kind = body.get_u8();
        Ok(Some(Frame {
            kind,
            payload: body,
        }))
    }

    /// Take and decode the next complete message, if one is buffered.
    pub fn read_message(&mut self) -> Result<Option<Message>> {
        match self.try_read_frame()? {
            Some(frame) => frame.message().map(Some),
            None => Ok(None),
        }
    }

    /// Bytes currently held, excluding an already parsed length prefix.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Whether a length prefix has been parsed for a frame still incomplete.
    pub fn has_pending_length(&self) -> bool {
        self.pending_len.is_some()
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl Default for FrameReader {
    fn default() -> Self {
        Self::new()
    }
}
