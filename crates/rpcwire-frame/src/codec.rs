use bytes::{BufMut, Bytes, BytesMut};
use rpcwire_serial::Serializer;

use crate::envelope::{Envelope, EnvelopeCodec, EnvelopeLayout, PeerId};
use crate::error::{FrameError, Result};

/// Default maximum message size (envelope + payload): 128 MiB.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 128 * 1024 * 1024;

/// Pending buffers above this size are released as soon as they are done: 16 KiB.
pub const DEFAULT_LARGE_BUFFER_THRESHOLD: usize = 16 * 1024;

/// Default scratch buffer capacity: 64 KiB.
pub const DEFAULT_SCRATCH_CAPACITY: usize = 64 * 1024;

/// A complete message with an owned payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub envelope: Envelope,
    pub payload: Bytes,
}

impl Message {
    pub fn routing(&self) -> &Bytes {
        self.envelope.routing()
    }

    /// The total wire size of this message (envelope + payload).
    pub fn wire_size(&self) -> usize {
        self.envelope.total_size()
    }

    /// Decode the payload as a single `T` spanning all of it.
    pub fn decode<T: 'static>(&self, serializer: &Serializer) -> Result<T> {
        Ok(serializer.from_bytes(&self.payload)?)
    }
}

/// Encode one message: envelope, then payload.
pub fn encode_message(
    layout: &dyn EnvelopeLayout,
    routing: &[u8],
    payload: &[u8],
    dst: &mut BytesMut,
) -> Result<()> {
    let payload_size = u32::try_from(payload.len()).map_err(|_| FrameError::OversizedMessage {
        size: payload.len() as u64,
        max: u32::MAX as usize,
    })?;
    dst.reserve(layout.minimum_size() + routing.len() + payload.len());
    layout.encode(payload_size, routing, dst)?;
    dst.put_slice(payload);
    Ok(())
}

/// Decode one message from the front of `src`.
///
/// Returns `Ok(None)` if `src` doesn't hold a complete message yet. On
/// success, consumes the message bytes from `src`.
pub fn decode_message(
    src: &mut BytesMut,
    codec: &EnvelopeCodec,
    remote: &PeerId,
) -> Result<Option<Message>> {
    let Some((prefix, total)) = codec.prefix(src)? else {
        return Ok(None);
    };
    if src.len() < total {
        return Ok(None);
    }

    let overhead = prefix.overhead_size as usize;
    let envelope = codec.envelope(prefix, &src[..overhead], remote);
    let payload = src.split_to(total).freeze().slice(overhead..);
    Ok(Some(Message { envelope, payload }))
}

/// Configuration for [`ContiguousBuffer`](crate::ContiguousBuffer).
#[derive(Debug, Clone)]
pub struct BufferConfig {
    /// Maximum message size in bytes. Default: 128 MiB.
    pub max_message_size: usize,
    /// Pending buffers larger than this are dropped instead of kept for reuse. Default: 16 KiB.
    pub large_buffer_threshold: usize,
    /// Whether a fresh receive shorter than the minimum envelope is stashed
    /// (`true`) or rejected with `MessageTooShort` (`false`). Default: `true`.
    pub allow_partial_header: bool,
    /// Capacity of the scratch buffer the transport reads into. Default: 64 KiB.
    pub scratch_capacity: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            large_buffer_threshold: DEFAULT_LARGE_BUFFER_THRESHOLD,
            allow_partial_header: true,
            scratch_capacity: DEFAULT_SCRATCH_CAPACITY,
        }
    }
}
