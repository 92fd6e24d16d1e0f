use std::collections::VecDeque;
use std::io::{ErrorKind, Read};
use std::sync::Arc;

use rpcwire_serial::Serializer;

use crate::buffer::ContiguousBuffer;
use crate::codec::{BufferConfig, Message};
use crate::envelope::PeerId;
use crate::error::{FrameError, Result};

/// Reads complete messages from any `Read` stream.
///
/// Each read fills the scratch buffer of an owned [`ContiguousBuffer`];
/// callers always get complete messages.
pub struct MessageReader<R> {
    inner: R,
    buffer: ContiguousBuffer,
    serializer: Arc<Serializer>,
    ready: VecDeque<Message>,
    deferred: Option<FrameError>,
}

impl<R: Read> MessageReader<R> {
    /// Create a new message reader with default configuration.
    pub fn new(inner: R) -> Self {
        Self::with_config(inner, BufferConfig::default())
    }

    /// Create a new message reader with explicit configuration.
    pub fn with_config(inner: R, config: BufferConfig) -> Self {
        Self::with_buffer(
            inner,
            ContiguousBuffer::with_config(PeerId::default(), config),
            Arc::new(Serializer::new()),
        )
    }

    /// Create a message reader around an existing buffer and serializer.
    pub fn with_buffer(inner: R, buffer: ContiguousBuffer, serializer: Arc<Serializer>) -> Self {
        Self {
            inner,
            buffer,
            serializer,
            ready: VecDeque::new(),
            deferred: None,
        }
    }

    /// Read the next complete message (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached between
    /// messages, and `Err(FrameError::IncompleteMessage)` when it cuts one short.
    pub fn read_message(&mut self) -> Result<Message> {
        loop {
            if let Some(message) = self.ready.pop_front() {
                return Ok(message);
            }
            if let Some(err) = self.deferred.take() {
                return Err(err);
            }

            let scratch = self.buffer.scratch_mut()?;
            let read = match self.inner.read(scratch) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return Err(end_of_stream(&mut self.buffer));
            }

            let ready = &mut self.ready;
            let processed = self.buffer.process(read, &self.serializer, |delivery| {
                ready.push_back(delivery.into_message());
            });
            // Messages completed ahead of a bad one are still handed out first.
            if let Err(err) = processed {
                self.deferred = Some(err);
            }
        }
    }

    /// Read the next message and decode its payload as `T`.
    pub fn read_value<T: 'static>(&mut self) -> Result<T> {
        let message = self.read_message()?;
        message.decode(&self.serializer)
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> R {
        self.inner
    }

    pub fn buffer(&self) -> &ContiguousBuffer {
        &self.buffer
    }

    pub fn serializer(&self) -> &Arc<Serializer> {
        &self.serializer
    }

    /// Update maximum message size for messages not yet started.
    pub fn set_max_message_size(&mut self, max_message_size: usize) {
        self.buffer.set_max_message_size(max_message_size);
    }

    /// Current buffer configuration.
    pub fn config(&self) -> &BufferConfig {
        self.buffer.config()
    }
}

/// The error for EOF, resetting any partial message.
pub(crate) fn end_of_stream(buffer: &mut ContiguousBuffer) -> FrameError {
    let received = buffer.pending_len();
    if received == 0 {
        return FrameError::ConnectionClosed;
    }
    let expected = buffer.pending_total().unwrap_or(0);
    buffer.reset();
    FrameError::IncompleteMessage { received, expected }
}
