use std::fmt;

use bytes::Bytes;
use rpcwire_serial::Serializer;
use tracing::{debug, error, trace, warn};

use crate::codec::{BufferConfig, Message};
use crate::envelope::{Envelope, EnvelopeCodec, PeerId};
use crate::error::{FrameError, Result};

type ProgressObserver = Box<dyn FnMut(&Progress<'_>) + Send>;

/// Where a [`ContiguousBuffer`] stands between receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveState {
    /// No partial message is pending.
    Idle,
    /// Part of an envelope has arrived.
    AwaitingHeader,
    /// The envelope is complete and part of the payload has arrived.
    AwaitingBody,
    /// [`ContiguousBuffer::dispose`] was called.
    Disposed,
    /// A fatal error discarded the scratch buffer.
    Poisoned,
}

/// Progress of the message being assembled.
///
/// `envelope: None` with `0/0` means the pending state was just cleared.
#[derive(Debug, Clone, Copy)]
pub struct Progress<'a> {
    pub envelope: Option<&'a Envelope>,
    pub received: usize,
    pub expected: usize,
}

impl Progress<'_> {
    pub fn is_cleared(&self) -> bool {
        self.envelope.is_none() && self.received == 0 && self.expected == 0
    }
}

/// Payload bytes handed to the message callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload<'a> {
    /// A view into the scratch buffer. Valid only for the callback.
    Borrowed(&'a [u8]),
    /// The dedicated buffer the message was assembled in. May be retained.
    Owned(Bytes),
}

impl Payload<'_> {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Borrowed(bytes) => bytes,
            Self::Owned(bytes) => bytes,
        }
    }

    /// Take the payload, copying only if it is borrowed.
    pub fn into_bytes(self) -> Bytes {
        match self {
            Self::Borrowed(bytes) => Bytes::copy_from_slice(bytes),
            Self::Owned(bytes) => bytes,
        }
    }

    pub fn can_take_ownership(&self) -> bool {
        matches!(self, Self::Owned(_))
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One complete message, as seen by the callback passed to
/// [`ContiguousBuffer::process`].
#[derive(Debug)]
pub struct Delivery<'a> {
    pub envelope: &'a Envelope,
    pub payload: Payload<'a>,
    pub serializer: &'a Serializer,
}

impl Delivery<'_> {
    /// Whether the payload memory may outlive the callback without a copy.
    pub fn can_take_ownership(&self) -> bool {
        self.payload.can_take_ownership()
    }

    /// Detach the message from the buffer.
    pub fn into_message(self) -> Message {
        Message {
            envelope: self.envelope.clone(),
            payload: self.payload.into_bytes(),
        }
    }

    /// Decode the payload with the serializer passed to `process`.
    pub fn decode<T: 'static>(&self) -> Result<T> {
        Ok(self.serializer.from_bytes(self.payload.as_bytes())?)
    }
}

struct PendingBody {
    envelope: Envelope,
    buf: Vec<u8>,
    total: usize,
}

enum Pending {
    Idle,
    Header(Vec<u8>),
    Body(PendingBody),
}

/// Carves complete messages out of a stream of receives.
///
/// The transport reads into [`scratch_mut`](Self::scratch_mut) and reports
/// each read through [`process`](Self::process). A receive may hold part of
/// a message, exactly one message, or several. Messages that arrive whole
/// are delivered straight from the scratch buffer; split messages are
/// assembled in a dedicated buffer sized from their envelope and delivered
/// as owned [`Bytes`].
///
/// Errors reset the pending message and leave the buffer usable, except
/// for sizing overflow and allocation failure, which discard the scratch
/// buffer and make every later call fail with [`FrameError::Poisoned`].
pub struct ContiguousBuffer {
    scratch: Option<Box<[u8]>>,
    pending: Pending,
    spare: Vec<u8>,
    codec: EnvelopeCodec,
    config: BufferConfig,
    remote: PeerId,
    observer: Option<ProgressObserver>,
    disposed: bool,
}

impl ContiguousBuffer {
    /// Create a buffer with the standard envelope layout and default configuration.
    pub fn new(remote: PeerId) -> Self {
        Self::with_config(remote, BufferConfig::default())
    }

    /// Create a buffer with the standard envelope layout.
    pub fn with_config(remote: PeerId, config: BufferConfig) -> Self {
        let codec = EnvelopeCodec::standard(config.max_message_size);
        Self::with_codec(remote, codec, config)
    }

    /// Create a buffer for a custom envelope layout.
    ///
    /// The codec's size ceiling is replaced by `config.max_message_size`.
    pub fn with_codec(remote: PeerId, mut codec: EnvelopeCodec, config: BufferConfig) -> Self {
        codec.set_max_message_size(config.max_message_size);
        let capacity = config.scratch_capacity.max(1);
        Self {
            scratch: Some(vec![0u8; capacity].into_boxed_slice()),
            pending: Pending::Idle,
            spare: Vec::new(),
            codec,
            config,
            remote,
            observer: None,
            disposed: false,
        }
    }

    /// The buffer the transport reads into.
    pub fn scratch_mut(&mut self) -> Result<&mut [u8]> {
        if self.disposed {
            return Err(FrameError::Disposed);
        }
        self.scratch.as_deref_mut().ok_or(FrameError::Poisoned)
    }

    /// Process `received` bytes at the start of the scratch buffer.
    pub fn process<F>(
        &mut self,
        received: usize,
        serializer: &Serializer,
        on_message: F,
    ) -> Result<()>
    where
        F: FnMut(Delivery<'_>),
    {
        self.process_at(0, received, serializer, on_message)
    }

    /// Process `received` bytes starting at `offset` in the scratch buffer.
    ///
    /// `on_message` runs once per completed message, before this returns.
    pub fn process_at<F>(
        &mut self,
        offset: usize,
        received: usize,
        serializer: &Serializer,
        mut on_message: F,
    ) -> Result<()>
    where
        F: FnMut(Delivery<'_>),
    {
        if self.disposed {
            return Err(FrameError::Disposed);
        }
        let scratch = self.scratch.take().ok_or(FrameError::Poisoned)?;

        let capacity = scratch.len();
        let Some(end) = offset.checked_add(received).filter(|&end| end <= capacity) else {
            self.scratch = Some(scratch);
            return Err(FrameError::ScratchOverrun {
                offset,
                received,
                capacity,
            });
        };

        match self.run(&scratch[offset..end], serializer, &mut on_message) {
            Ok(()) => {
                self.scratch = Some(scratch);
                Ok(())
            }
            Err(err) if err.is_fatal() => {
                self.pending = Pending::Idle;
                self.spare = Vec::new();
                notify(&mut self.observer, None, 0, 0);
                error!(remote = %self.remote, error = %err, "contiguous buffer poisoned");
                Err(err)
            }
            Err(err) => {
                warn!(remote = %self.remote, error = %err, "message rejected");
                self.clear();
                self.scratch = Some(scratch);
                Err(err)
            }
        }
    }

    /// Copy `data` through the scratch buffer and process it, one
    /// scratch-sized receive at a time.
    pub fn feed<F>(&mut self, data: &[u8], serializer: &Serializer, mut on_message: F) -> Result<()>
    where
        F: FnMut(Delivery<'_>),
    {
        let capacity = self.scratch_mut()?.len();
        if data.is_empty() {
            return self.process(0, serializer, &mut on_message);
        }
        for chunk in data.chunks(capacity) {
            self.scratch_mut()?[..chunk.len()].copy_from_slice(chunk);
            self.process(chunk.len(), serializer, &mut on_message)?;
        }
        Ok(())
    }

    pub fn state(&self) -> ReceiveState {
        if self.disposed {
            return ReceiveState::Disposed;
        }
        if self.scratch.is_none() {
            return ReceiveState::Poisoned;
        }
        match self.pending {
            Pending::Idle => ReceiveState::Idle,
            Pending::Header(_) => ReceiveState::AwaitingHeader,
            Pending::Body(_) => ReceiveState::AwaitingBody,
        }
    }

    /// Bytes of the pending message received so far.
    pub fn pending_len(&self) -> usize {
        match &self.pending {
            Pending::Idle => 0,
            Pending::Header(stash) => stash.len(),
            Pending::Body(body) => body.buf.len(),
        }
    }

    /// Total size of the pending message, once its envelope is known.
    pub fn pending_total(&self) -> Option<usize> {
        match &self.pending {
            Pending::Body(body) => Some(body.total),
            _ => None,
        }
    }

    /// Drop any partial message and return to [`ReceiveState::Idle`].
    pub fn reset(&mut self) {
        if !matches!(self.pending, Pending::Idle) {
            debug!(remote = %self.remote, "pending message discarded");
            self.clear();
        }
    }

    /// Release all buffers. Later calls to `process` fail with
    /// [`FrameError::Disposed`]. Calling this twice is a no-op.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.scratch = None;
        self.pending = Pending::Idle;
        self.spare = Vec::new();
        self.observer = None;
        debug!(remote = %self.remote, "contiguous buffer disposed");
    }

    pub fn set_progress_observer<F>(&mut self, observer: F)
    where
        F: FnMut(&Progress<'_>) + Send + 'static,
    {
        self.observer = Some(Box::new(observer));
    }

    pub fn clear_progress_observer(&mut self) {
        self.observer = None;
    }

    /// Update the size ceiling for messages whose envelope has not arrived yet.
    pub fn set_max_message_size(&mut self, max_message_size: usize) {
        self.config.max_message_size = max_message_size;
        self.codec.set_max_message_size(max_message_size);
    }

    pub fn config(&self) -> &BufferConfig {
        &self.config
    }

    pub fn codec(&self) -> &EnvelopeCodec {
        &self.codec
    }

    pub fn remote(&self) -> &PeerId {
        &self.remote
    }

    fn run<F>(
        &mut self,
        mut window: &[u8],
        serializer: &Serializer,
        on_message: &mut F,
    ) -> Result<()>
    where
        F: FnMut(Delivery<'_>),
    {
        if window.is_empty() && matches!(self.pending, Pending::Idle) {
            return Err(FrameError::MessageTooShort {
                received: 0,
                minimum: self.codec.minimum_size(),
            });
        }

        let mut fresh = true;
        while !window.is_empty() {
            let consumed = match std::mem::replace(&mut self.pending, Pending::Idle) {
                Pending::Idle => self.begin(window, fresh, serializer, on_message)?,
                Pending::Header(stash) => self.extend_header(stash, window, serializer, on_message)?,
                Pending::Body(body) => self.extend_body(body, window, serializer, on_message)?,
            };
            window = &window[consumed..];
            fresh = false;
        }
        Ok(())
    }

    /// Start a message at the front of `window`. Returns the bytes consumed.
    fn begin<F>(
        &mut self,
        window: &[u8],
        fresh: bool,
        serializer: &Serializer,
        on_message: &mut F,
    ) -> Result<usize>
    where
        F: FnMut(Delivery<'_>),
    {
        let Some((prefix, total)) = self.codec.prefix(window)? else {
            if fresh && !self.config.allow_partial_header {
                return Err(FrameError::MessageTooShort {
                    received: window.len(),
                    minimum: self.codec.minimum_size(),
                });
            }
            let stash = self.take_spare();
            return Ok(self.stash_header(stash, window));
        };

        let overhead = prefix.overhead_size as usize;
        if window.len() < overhead {
            let stash = self.take_spare();
            return Ok(self.stash_header(stash, window));
        }

        let envelope = self.codec.envelope(prefix, &window[..overhead], &self.remote);
        if window.len() >= total {
            notify(&mut self.observer, Some(&envelope), total, total);
            trace!(remote = %self.remote, size = total, "message delivered from scratch");
            on_message(Delivery {
                envelope: &envelope,
                payload: Payload::Borrowed(&window[overhead..total]),
                serializer,
            });
            return Ok(total);
        }

        let mut buf = self.take_spare();
        reserve(&mut buf, total)?;
        buf.extend_from_slice(window);
        debug!(
            remote = %self.remote,
            received = buf.len(),
            expected = total,
            "awaiting message body"
        );
        notify(&mut self.observer, Some(&envelope), buf.len(), total);
        self.pending = Pending::Body(PendingBody {
            envelope,
            buf,
            total,
        });
        Ok(window.len())
    }

    /// Complete a partial envelope from `window`, then continue with the body.
    fn extend_header<F>(
        &mut self,
        mut stash: Vec<u8>,
        window: &[u8],
        serializer: &Serializer,
        on_message: &mut F,
    ) -> Result<usize>
    where
        F: FnMut(Delivery<'_>),
    {
        let minimum = self.codec.minimum_size();
        let mut taken = 0;
        if stash.len() < minimum {
            taken = (minimum - stash.len()).min(window.len());
            stash.extend_from_slice(&window[..taken]);
        }

        let Some((prefix, total)) = self.codec.prefix(&stash)? else {
            if stash.len() < minimum {
                return Ok(taken + self.stash_header(stash, &[]));
            }
            return Err(FrameError::MessageTooShort {
                received: stash.len(),
                minimum,
            });
        };

        let overhead = prefix.overhead_size as usize;
        if stash.len() < overhead {
            let more = (overhead - stash.len()).min(window.len() - taken);
            stash.extend_from_slice(&window[taken..taken + more]);
            taken += more;
            if stash.len() < overhead {
                return Ok(taken + self.stash_header(stash, &[]));
            }
        }

        let envelope = self.codec.envelope(prefix, &stash[..overhead], &self.remote);
        reserve(&mut stash, total)?;
        debug!(
            remote = %self.remote,
            received = stash.len(),
            expected = total,
            "envelope complete, awaiting message body"
        );
        let body = PendingBody {
            envelope,
            buf: stash,
            total,
        };
        Ok(taken + self.extend_body(body, &window[taken..], serializer, on_message)?)
    }

    /// Append to the pending body; deliver it once complete.
    fn extend_body<F>(
        &mut self,
        mut body: PendingBody,
        window: &[u8],
        serializer: &Serializer,
        on_message: &mut F,
    ) -> Result<usize>
    where
        F: FnMut(Delivery<'_>),
    {
        let taken = (body.total - body.buf.len()).min(window.len());
        body.buf.extend_from_slice(&window[..taken]);

        if body.buf.len() < body.total {
            notify(&mut self.observer, Some(&body.envelope), body.buf.len(), body.total);
            self.pending = Pending::Body(body);
            return Ok(taken);
        }

        let PendingBody {
            envelope,
            buf,
            total,
        } = body;
        notify(&mut self.observer, Some(&envelope), total, total);
        debug!(remote = %self.remote, size = total, "assembled message delivered");
        let overhead = envelope.overhead_size() as usize;
        on_message(Delivery {
            envelope: &envelope,
            payload: Payload::Owned(Bytes::from(buf).slice(overhead..)),
            serializer,
        });
        Ok(taken)
    }

    fn stash_header(&mut self, mut stash: Vec<u8>, bytes: &[u8]) -> usize {
        stash.extend_from_slice(bytes);
        trace!(remote = %self.remote, received = stash.len(), "awaiting envelope");
        notify(&mut self.observer, None, stash.len(), 0);
        self.pending = Pending::Header(stash);
        bytes.len()
    }

    /// Drop the pending message and notify observers that state cleared.
    fn clear(&mut self) {
        match std::mem::replace(&mut self.pending, Pending::Idle) {
            Pending::Idle => {}
            Pending::Header(stash) => self.recycle(stash),
            Pending::Body(body) => self.recycle(body.buf),
        }
        notify(&mut self.observer, None, 0, 0);
    }

    fn recycle(&mut self, mut buf: Vec<u8>) {
        if buf.capacity() > self.config.large_buffer_threshold {
            debug!(
                remote = %self.remote,
                capacity = buf.capacity(),
                "large pending buffer released"
            );
            return;
        }
        if buf.capacity() > self.spare.capacity() {
            buf.clear();
            self.spare = buf;
        }
    }

    fn take_spare(&mut self) -> Vec<u8> {
        let mut buf = std::mem::take(&mut self.spare);
        buf.clear();
        buf
    }
}

impl fmt::Debug for ContiguousBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContiguousBuffer")
            .field("remote", &self.remote)
            .field("state", &self.state())
            .field("pending_len", &self.pending_len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn notify(
    observer: &mut Option<ProgressObserver>,
    envelope: Option<&Envelope>,
    received: usize,
    expected: usize,
) {
    if let Some(observer) = observer {
        observer(&Progress {
            envelope,
            received,
            expected,
        });
    }
}

fn reserve(buf: &mut Vec<u8>, total: usize) -> Result<()> {
    let additional = total.saturating_sub(buf.len());
    buf.try_reserve_exact(additional)
        .map_err(|source| FrameError::OutOfMemory {
            size: total,
            source,
        })
}
