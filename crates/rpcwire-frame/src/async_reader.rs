use std::collections::VecDeque;
use std::io::ErrorKind;
use std::sync::Arc;

use rpcwire_serial::Serializer;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::buffer::ContiguousBuffer;
use crate::codec::{BufferConfig, Message};
use crate::envelope::PeerId;
use crate::error::{FrameError, Result};
use crate::reader::end_of_stream;

/// Reads complete messages from a tokio `AsyncRead` stream.
///
/// Same semantics as [`MessageReader`](crate::MessageReader).
pub struct AsyncMessageReader<R> {
    inner: R,
    buffer: ContiguousBuffer,
    serializer: Arc<Serializer>,
    ready: VecDeque<Message>,
    deferred: Option<FrameError>,
}

impl<R: AsyncRead + Unpin> AsyncMessageReader<R> {
    pub fn new(inner: R) -> Self {
        Self::with_config(inner, BufferConfig::default())
    }

    pub fn with_config(inner: R, config: BufferConfig) -> Self {
        Self::with_buffer(
            inner,
            ContiguousBuffer::with_config(PeerId::default(), config),
            Arc::new(Serializer::new()),
        )
    }

    pub fn with_buffer(inner: R, buffer: ContiguousBuffer, serializer: Arc<Serializer>) -> Self {
        Self {
            inner,
            buffer,
            serializer,
            ready: VecDeque::new(),
            deferred: None,
        }
    }

    /// Read the next complete message.
    ///
    /// Cancel-safe between reads: a dropped future loses no buffered bytes.
    pub async fn read_message(&mut self) -> Result<Message> {
        loop {
            if let Some(message) = self.ready.pop_front() {
                return Ok(message);
            }
            if let Some(err) = self.deferred.take() {
                return Err(err);
            }

            let scratch = self.buffer.scratch_mut()?;
            let read = match self.inner.read(scratch).await {
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

    pub async fn read_value<T: 'static>(&mut self) -> Result<T> {
        let message = self.read_message().await?;
        message.decode(&self.serializer)
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    pub fn buffer(&self) -> &ContiguousBuffer {
        &self.buffer
    }

    pub fn set_max_message_size(&mut self, max_message_size: usize) {
        self.buffer.set_max_message_size(max_message_size);
    }
}
