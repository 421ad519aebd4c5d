use std::io::{ErrorKind, Write};

use bytes::{Bytes, BytesMut};
use tracing::trace;

use crate::codec::Message;
use crate::error::{FrameError, Result};

/// Writes control messages to any `Write` sink.
///
/// Each send is exactly one `write` call on the sink. A sink that accepts only
/// part of the bytes is an error ([`FrameError::ShortWrite`]), never a partial
/// state to resume from.
///
/// Between [`cork`](Self::cork) and [`uncork`](Self::uncork) sends are queued
/// instead of written; `uncork` concatenates the queue into one buffer and
/// writes it with a single call.
pub struct FrameWriter<T> {
    inner: T,
    corked: Option<Vec<Bytes>>,
}

impl<T: Write> FrameWriter<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            corked: None,
        }
    }

    /// Encode and send one message.
    pub fn send(&mut self, message: &Message) -> Result<()> {
        trace!(kind = %message.kind(), corked = self.is_corked(), "send");
        self.send_bytes(message.to_bytes())
    }

    /// Send already encoded frame bytes.
    pub fn send_bytes(&mut self, bytes: Bytes) -> Result<()> {
        match self.corked.as_mut() {
            Some(queue) => {
                queue.push(bytes);
                Ok(())
            }
            None => self.write_once(&bytes),
        }
    }

    /// Start queueing sends. Corking an already corked writer keeps the
    /// existing queue.
    pub fn cork(&mut self) {
        if self.corked.is_none() {
            self.corked = Some(Vec::new());
        }
    }

    /// Write everything queued since [`cork`](Self::cork) in one call.
    ///
    /// A no-op if the writer is not corked. Cork state is cleared even when
    /// the write fails.
    pub fn uncork(&mut self) -> Result<()> {
        let Some(queue) = self.corked.take() else {
            return Ok(());
        };

        let mut batch = BytesMut::with_capacity(queue.iter().map(Bytes::len).sum());
        for bytes in &queue {
            batch.extend_from_slice(bytes);
        }
        trace!(frames = queue.len(), bytes = batch.len(), "uncork");
        self.write_once(&batch)
    }

    pub fn is_corked(&self) -> bool {
        self.corked.is_some()
    }

    /// Number of frames queued while corked.
    pub fn queued(&self) -> usize {
        self.corked.as_ref().map_or(0, Vec::len)
    }

    fn write_once(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.is_empty() {
            return Ok(());
        }

        loop {
            match self.inner.write(bytes) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) if n == bytes.len() => break,
                Ok(n) => {
                    return Err(FrameError::ShortWrite {
                        written: n,
                        expected: bytes.len(),
                    })
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Borrow the underlying sink.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying sink.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the writer and return the inner sink.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T> std::fmt::Debug for FrameWriter<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameWriter")
            .field("corked", &self.corked.as_ref().map(Vec::len))
            .finish_non_exhaustive()
    }
}
