use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::{FrameConfig, Message, LENGTH_PREFIX_SIZE};
use crate::error::{FrameError, Result};

/// `tokio_util` codec for the control protocol.
///
/// Wire-compatible with [`FrameReader`](crate::FrameReader) and
/// [`FrameWriter`](crate::FrameWriter); used where a `Framed` stream is more
/// convenient than driving the reader by hand.
#[derive(Debug, Clone, Default)]
pub struct ControlCodec {
    config: FrameConfig,
}

impl ControlCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: FrameConfig) -> Self {
        Self { config }
    }
}

impl Decoder for ControlCodec {
    type Item = Message;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>> {
        if src.len() > self.config.max_buffered {
            return Err(FrameError::BufferOverflow {
                buffered: src.len(),
                max: self.config.max_buffered,
            });
        }
        if src.len() < LENGTH_PREFIX_SIZE {
            return Ok(None);
        }

        let len = usize::from(u16::from_be_bytes([src[0], src[1]]));
        if len == 0 {
            return Err(FrameError::EmptyFrame);
        }

        let total = LENGTH_PREFIX_SIZE + len;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_PREFIX_SIZE);
        let body = src.split_to(len);
        Message::decode(&body).map(Some)
    }
}

impl Encoder<Message> for ControlCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<()> {
        item.encode(dst);
        Ok(())
    }
}
