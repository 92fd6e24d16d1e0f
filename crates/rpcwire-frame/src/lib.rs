//! Message framing for RPC byte streams.
//!
//! Every message is an envelope followed by its payload. The default
//! envelope is:
//! - A 4-byte little-endian payload size
//! - A 4-byte little-endian size check derived from the payload size
//! - A 2-byte little-endian routing length, then that many routing bytes
//!
//! [`ContiguousBuffer`] carves complete messages out of receives that may
//! split a message anywhere or carry several messages at once.

#[cfg(feature = "async")]
pub mod async_reader;
pub mod buffer;
pub mod codec;
pub mod envelope;
pub mod error;
pub mod reader;
pub mod writer;

#[cfg(feature = "async")]
pub use async_reader::AsyncMessageReader;
pub use buffer::{ContiguousBuffer, Delivery, Payload, Progress, ReceiveState};
pub use codec::{
    decode_message, encode_message, BufferConfig, Message, DEFAULT_LARGE_BUFFER_THRESHOLD,
    DEFAULT_MAX_MESSAGE_SIZE, DEFAULT_SCRATCH_CAPACITY,
};
pub use envelope::{
    Envelope, EnvelopeCodec, EnvelopeLayout, EnvelopePrefix, PeerId, StandardLayout,
    SIZE_CHECK_MASK, STANDARD_PREFIX_SIZE,
};
pub use error::{FrameError, Result};
pub use reader::MessageReader;
pub use writer::MessageWriter;
