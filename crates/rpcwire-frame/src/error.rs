use std::collections::TryReserveError;

use rpcwire_serial::SerialError;

/// Errors that can occur while framing or unframing messages.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// A fresh receive held fewer bytes than the smallest envelope.
    #[error("message too short ({received} bytes, minimum envelope is {minimum})")]
    MessageTooShort { received: usize, minimum: usize },

    /// The envelope's size check does not match its payload size.
    #[error("envelope size check mismatch (payload {payload_size}, check {size_check:#010x}, expected {expected:#010x})")]
    SizeCheckMismatch {
        payload_size: u32,
        size_check: u32,
        expected: u32,
    },

    /// The message exceeds the configured maximum size.
    #[error("message too large ({size} bytes, max {max})")]
    OversizedMessage { size: u64, max: usize },

    /// Sizing the message overflowed. The buffer is unusable afterwards.
    #[error("message size overflow (payload {payload_size} + overhead {overhead_size})")]
    Overflow { payload_size: u32, overhead_size: u32 },

    /// The pending body could not be allocated. The buffer is unusable afterwards.
    #[error("cannot allocate {size} bytes for pending message")]
    OutOfMemory {
        size: usize,
        #[source]
        source: TryReserveError,
    },

    /// Routing metadata does not fit the envelope layout.
    #[error("routing metadata too large ({size} bytes, max {max})")]
    RoutingTooLarge { size: usize, max: usize },

    /// A receive reported more bytes than the scratch buffer holds.
    #[error("receive of {received} bytes at offset {offset} exceeds scratch capacity {capacity}")]
    ScratchOverrun {
        offset: usize,
        received: usize,
        capacity: usize,
    },

    /// The buffer was disposed.
    #[error("contiguous buffer has been disposed")]
    Disposed,

    /// The buffer hit a fatal error earlier and refuses further input.
    #[error("contiguous buffer is poisoned by an earlier fatal error")]
    Poisoned,

    /// The stream ended partway through a message.
    #[error("stream ended mid-message ({received} of {expected} bytes)")]
    IncompleteMessage { received: usize, expected: usize },

    /// A payload value failed to encode or decode.
    #[error("payload serialization failed: {0}")]
    Serial(#[from] SerialError),

    /// An I/O error occurred while reading or writing messages.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed.
    #[error("connection closed")]
    ConnectionClosed,
}

impl FrameError {
    /// Whether the error leaves the buffer that raised it unusable.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Overflow { .. } | Self::OutOfMemory { .. } | Self::Poisoned
        )
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
