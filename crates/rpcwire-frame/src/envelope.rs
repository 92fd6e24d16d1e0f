use std::fmt;
use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Fixed part of the standard envelope: size (4) + check (4) + routing length (2).
pub const STANDARD_PREFIX_SIZE: usize = 10;

/// Mask the standard layout XORs into the payload size to form the size check.
pub const SIZE_CHECK_MASK: u32 = 0xA5A5_A5A5;

/// Identity of the remote end a message arrived from. Attribution only.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerId(Arc<str>);

impl PeerId {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for PeerId {
    fn default() -> Self {
        Self::new("local")
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Envelope fields needed to size a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvelopePrefix {
    pub payload_size: u32,
    pub size_check: u32,
    /// Total envelope length, routing metadata included.
    pub overhead_size: u32,
}

/// Byte layout of the envelope in front of every message.
///
/// The layout decides where sizes live and how much routing metadata
/// follows them; framing only relies on this trait.
pub trait EnvelopeLayout: Send + Sync + fmt::Debug {
    /// Bytes needed before [`decode_fields`](Self::decode_fields) can answer.
    fn minimum_size(&self) -> usize;

    /// Read the sizing fields, or `None` if `window` is shorter than
    /// `minimum_size`.
    fn decode_fields(&self, window: &[u8]) -> Option<EnvelopePrefix>;

    /// Full envelope length announced by `window`, if it can be read yet.
    fn header_size(&self, window: &[u8]) -> Option<u32> {
        self.decode_fields(window).map(|prefix| prefix.overhead_size)
    }

    /// The size check a correct envelope carries for `payload_size`.
    fn size_check(&self, payload_size: u32) -> u32;

    /// Routing metadata inside a complete envelope.
    fn routing<'a>(&self, envelope: &'a [u8]) -> &'a [u8];

    /// Append an envelope for a payload of `payload_size` bytes.
    fn encode(&self, payload_size: u32, routing: &[u8], dst: &mut BytesMut) -> Result<()>;
}

/// The default envelope layout.
///
/// Wire format:
/// ```text
/// ┌──────────────┬──────────────┬──────────────┬──────────────────┐
/// │ Payload size │ Size check   │ Routing len  │ Routing metadata │
/// │ (4B LE)      │ (4B LE)      │ (2B LE)      │ (Routing len B)  │
/// └──────────────┴──────────────┴──────────────┴──────────────────┘
/// ```
///
/// The size check is `payload_size ^ 0xA5A5_A5A5`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardLayout;

impl EnvelopeLayout for StandardLayout {
    fn minimum_size(&self) -> usize {
        STANDARD_PREFIX_SIZE
    }

    fn decode_fields(&self, window: &[u8]) -> Option<EnvelopePrefix> {
        let prefix = window.get(..STANDARD_PREFIX_SIZE)?;
        let payload_size = u32::from_le_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]);
        let size_check = u32::from_le_bytes([prefix[4], prefix[5], prefix[6], prefix[7]]);
        let routing_len = u16::from_le_bytes([prefix[8], prefix[9]]);
        Some(EnvelopePrefix {
            payload_size,
            size_check,
            overhead_size: STANDARD_PREFIX_SIZE as u32 + u32::from(routing_len),
        })
    }

    fn size_check(&self, payload_size: u32) -> u32 {
        payload_size ^ SIZE_CHECK_MASK
    }

    fn routing<'a>(&self, envelope: &'a [u8]) -> &'a [u8] {
        envelope.get(STANDARD_PREFIX_SIZE..).unwrap_or_default()
    }

    fn encode(&self, payload_size: u32, routing: &[u8], dst: &mut BytesMut) -> Result<()> {
        let routing_len = u16::try_from(routing.len()).map_err(|_| FrameError::RoutingTooLarge {
            size: routing.len(),
            max: u16::MAX as usize,
        })?;
        dst.reserve(STANDARD_PREFIX_SIZE + routing.len());
        dst.put_u32_le(payload_size);
        dst.put_u32_le(self.size_check(payload_size));
        dst.put_u16_le(routing_len);
        dst.put_slice(routing);
        Ok(())
    }
}

/// A decoded, validated envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    payload_size: u32,
    size_check: u32,
    overhead_size: u32,
    routing: Bytes,
    remote: PeerId,
}

impl Envelope {
    pub fn payload_size(&self) -> u32 {
        self.payload_size
    }

    pub fn size_check(&self) -> u32 {
        self.size_check
    }

    pub fn overhead_size(&self) -> u32 {
        self.overhead_size
    }

    pub fn routing(&self) -> &Bytes {
        &self.routing
    }

    pub fn remote(&self) -> &PeerId {
        &self.remote
    }

    /// Envelope plus payload. Validated to fit `usize` at decode time.
    pub fn total_size(&self) -> usize {
        self.overhead_size as usize + self.payload_size as usize
    }
}

/// Validating envelope decoder for one layout and size ceiling.
#[derive(Debug, Clone)]
pub struct EnvelopeCodec {
    layout: Arc<dyn EnvelopeLayout>,
    max_message_size: usize,
}

impl EnvelopeCodec {
    pub fn new(layout: Arc<dyn EnvelopeLayout>, max_message_size: usize) -> Self {
        Self {
            layout,
            max_message_size,
        }
    }

    /// Codec for [`StandardLayout`].
    pub fn standard(max_message_size: usize) -> Self {
        Self::new(Arc::new(StandardLayout), max_message_size)
    }

    pub fn layout(&self) -> &Arc<dyn EnvelopeLayout> {
        &self.layout
    }

    pub fn minimum_size(&self) -> usize {
        self.layout.minimum_size()
    }

    pub fn max_message_size(&self) -> usize {
        self.max_message_size
    }

    pub fn set_max_message_size(&mut self, max_message_size: usize) {
        self.max_message_size = max_message_size;
    }

    /// Validate the sizing fields at the front of `window`.
    ///
    /// Returns `None` while fewer than `minimum_size` bytes are present;
    /// otherwise the prefix and the total message size.
    pub fn prefix(&self, window: &[u8]) -> Result<Option<(EnvelopePrefix, usize)>> {
        let Some(prefix) = self.layout.decode_fields(window) else {
            return Ok(None);
        };

        let expected = self.layout.size_check(prefix.payload_size);
        if prefix.size_check != expected {
            return Err(FrameError::SizeCheckMismatch {
                payload_size: prefix.payload_size,
                size_check: prefix.size_check,
                expected,
            });
        }

        let total = prefix
            .payload_size
            .checked_add(prefix.overhead_size)
            .and_then(|total| usize::try_from(total).ok())
            .ok_or(FrameError::Overflow {
                payload_size: prefix.payload_size,
                overhead_size: prefix.overhead_size,
            })?;
        if total > self.max_message_size {
            return Err(FrameError::OversizedMessage {
                size: total as u64,
                max: self.max_message_size,
            });
        }
        Ok(Some((prefix, total)))
    }

    /// Build the envelope from its complete bytes (`overhead_size` long).
    pub fn envelope(&self, prefix: EnvelopePrefix, envelope: &[u8], remote: &PeerId) -> Envelope {
        Envelope {
            payload_size: prefix.payload_size,
            size_check: prefix.size_check,
            overhead_size: prefix.overhead_size,
            routing: Bytes::copy_from_slice(self.layout.routing(envelope)),
            remote: remote.clone(),
        }
    }

    /// Decode and validate the envelope at the front of `window`.
    ///
    /// Returns `None` until the whole envelope, routing included, is present.
    pub fn decode(&self, window: &[u8], remote: &PeerId) -> Result<Option<Envelope>> {
        let Some((prefix, _)) = self.prefix(window)? else {
            return Ok(None);
        };
        let overhead = prefix.overhead_size as usize;
        match window.get(..overhead) {
            Some(envelope) => Ok(Some(self.envelope(prefix, envelope, remote))),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn standard_bytes(payload_size: u32, routing: &[u8]) -> BytesMut {
        let mut buf = BytesMut::new();
        StandardLayout.encode(payload_size, routing, &mut buf).unwrap();
        buf
    }

    #[test]
    fn standard_layout_bytes() {
        let buf = standard_bytes(20, b"");
        assert_eq!(buf.len(), STANDARD_PREFIX_SIZE);
        assert_eq!(&buf[..4], &20u32.to_le_bytes());
        assert_eq!(&buf[4..8], &(20u32 ^ SIZE_CHECK_MASK).to_le_bytes());
        assert_eq!(&buf[8..10], &[0, 0]);
    }

    #[test]
    fn decode_with_routing() {
        let codec = EnvelopeCodec::standard(1024);
        let buf = standard_bytes(5, b"svc.echo");
        let remote = PeerId::from("peer-a");

        let envelope = codec.decode(&buf, &remote).unwrap().unwrap();
        assert_eq!(envelope.payload_size(), 5);
        assert_eq!(envelope.overhead_size(), 18);
        assert_eq!(envelope.routing().as_ref(), b"svc.echo");
        assert_eq!(envelope.remote().as_str(), "peer-a");
        assert_eq!(envelope.total_size(), 23);
    }

    #[test]
    fn short_window_needs_more() {
        let codec = EnvelopeCodec::standard(1024);
        let buf = standard_bytes(5, b"route");
        let remote = PeerId::default();

        assert!(codec.decode(&buf[..9], &remote).unwrap().is_none());
        assert!(codec.prefix(&buf[..10]).unwrap().is_some());
        assert!(codec.decode(&buf[..12], &remote).unwrap().is_none());
        assert_eq!(StandardLayout.header_size(&buf[..10]), Some(15));
    }

    #[test]
    fn size_check_mismatch() {
        let codec = EnvelopeCodec::standard(1024);
        let mut buf = standard_bytes(5, b"");
        buf[4] ^= 0x01;

        let err = codec.prefix(&buf).unwrap_err();
        assert!(matches!(
            err,
            FrameError::SizeCheckMismatch { payload_size: 5, .. }
        ));
        assert!(!err.is_fatal());
    }

    #[test]
    fn oversized_message() {
        let codec = EnvelopeCodec::standard(64);
        let buf = standard_bytes(60, b"");
        let err = codec.prefix(&buf).unwrap_err();
        assert!(matches!(
            err,
            FrameError::OversizedMessage { size: 70, max: 64 }
        ));
    }

    #[test]
    fn sizing_overflow_is_fatal() {
        let codec = EnvelopeCodec::standard(usize::MAX);
        let buf = standard_bytes(u32::MAX - 4, b"");
        let err = codec.prefix(&buf).unwrap_err();
        assert!(matches!(err, FrameError::Overflow { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn routing_too_large() {
        let routing = vec![0u8; u16::MAX as usize + 1];
        let err = StandardLayout
            .encode(1, &routing, &mut BytesMut::new())
            .unwrap_err();
        assert!(matches!(err, FrameError::RoutingTooLarge { .. }));
    }
}
