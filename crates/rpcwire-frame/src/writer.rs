use std::io::{ErrorKind, Write};
use std::sync::Arc;

use bytes::BytesMut;
use rpcwire_serial::Serializer;

use crate::codec::{encode_message, Message, DEFAULT_MAX_MESSAGE_SIZE};
use crate::envelope::{EnvelopeLayout, StandardLayout};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Writes complete messages to any `Write` stream.
pub struct MessageWriter<W> {
    inner: W,
    buf: BytesMut,
    layout: Arc<dyn EnvelopeLayout>,
    max_message_size: usize,
}

impl<W: Write> MessageWriter<W> {
    /// Create a new message writer using the standard envelope layout.
    pub fn new(inner: W) -> Self {
        Self::with_layout(inner, Arc::new(StandardLayout), DEFAULT_MAX_MESSAGE_SIZE)
    }

    /// Create a new message writer for a custom envelope layout.
    pub fn with_layout(inner: W, layout: Arc<dyn EnvelopeLayout>, max_message_size: usize) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            layout,
            max_message_size,
        }
    }

    /// Write a complete message (blocking).
    pub fn write_message(&mut self, message: &Message) -> Result<()> {
        self.send(message.routing(), &message.payload)
    }

    /// Encode and send a payload with routing metadata.
    pub fn send(&mut self, routing: &[u8], payload: &[u8]) -> Result<()> {
        self.buf.clear();
        encode_message(self.layout.as_ref(), routing, payload, &mut self.buf)?;
        if self.buf.len() > self.max_message_size {
            let size = self.buf.len() as u64;
            self.buf.clear();
            return Err(FrameError::OversizedMessage {
                size,
                max: self.max_message_size,
            });
        }

        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        self.flush()
    }

    /// Serialize `value` with `serializer` and send it as the payload.
    pub fn send_value<T: 'static>(
        &mut self,
        routing: &[u8],
        value: &T,
        serializer: &Serializer,
    ) -> Result<()> {
        let payload = serializer.to_bytes(value)?;
        self.send(routing, &payload)
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> W {
        self.inner
    }

    /// Update maximum message size for subsequent messages.
    pub fn set_max_message_size(&mut self, max_message_size: usize) {
        self.max_message_size = max_message_size;
    }

    pub fn max_message_size(&self) -> usize {
        self.max_message_size
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;
    use crate::codec::decode_message;
    use crate::envelope::{EnvelopeCodec, PeerId};

    fn decode_all(bytes: &[u8]) -> Vec<Message> {
        let mut wire = BytesMut::from(bytes);
        let codec = EnvelopeCodec::standard(usize::MAX);
        let mut messages = Vec::new();
        while let Some(message) = decode_message(&mut wire, &codec, &PeerId::default()).unwrap() {
            messages.push(message);
        }
        assert!(wire.is_empty());
        messages
    }

    #[test]
    fn write_single_message() {
        let mut writer = MessageWriter::new(Cursor::new(Vec::<u8>::new()));

        writer.send(b"greet", b"hello").unwrap();

        let messages = decode_all(&writer.into_inner().into_inner());
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].routing().as_ref(), b"greet");
        assert_eq!(messages[0].payload.as_ref(), b"hello");
    }

    #[test]
    fn write_multiple_messages() {
        let mut writer = MessageWriter::new(Cursor::new(Vec::<u8>::new()));

        writer.send(b"1", b"one").unwrap();
        writer.send(b"2", b"two").unwrap();
        writer.send(b"", b"three").unwrap();

        let messages = decode_all(&writer.into_inner().into_inner());
        let got: Vec<(&[u8], &[u8])> = messages
            .iter()
            .map(|m| (m.routing().as_ref(), m.payload.as_ref()))
            .collect();
        assert_eq!(
            got,
            vec![
                (b"1".as_ref(), b"one".as_ref()),
                (b"2".as_ref(), b"two".as_ref()),
                (b"".as_ref(), b"three".as_ref()),
            ]
        );
    }

    #[test]
    fn message_too_large_rejected() {
        let mut writer =
            MessageWriter::with_layout(Cursor::new(Vec::<u8>::new()), Arc::new(StandardLayout), 16);

        let err = writer.send(b"", b"oversized").unwrap_err();
        assert!(matches!(err, FrameError::OversizedMessage { size: 19, max: 16 }));
        assert!(writer.get_ref().get_ref().is_empty());
    }

    #[test]
    fn routing_too_large_rejected() {
        let mut writer = MessageWriter::new(Cursor::new(Vec::<u8>::new()));
        let routing = vec![b'r'; 70_000];
        let err = writer.send(&routing, b"x").unwrap_err();
        assert!(matches!(err, FrameError::RoutingTooLarge { size: 70_000, .. }));
    }

    #[test]
    fn send_value_serializes_payload() {
        let serializer = Serializer::new();
        let mut writer = MessageWriter::new(Cursor::new(Vec::<u8>::new()));

        writer
            .send_value(b"sum", &vec![1i32, -2, 3], &serializer)
            .unwrap();

        let messages = decode_all(&writer.into_inner().into_inner());
        let values: Vec<i32> = messages[0].decode(&serializer).unwrap();
        assert_eq!(values, vec![1, -2, 3]);
    }

    #[test]
    fn write_message_method() {
        let mut source = BytesMut::new();
        encode_message(&StandardLayout, b"r", b"abc", &mut source).unwrap();
        let message = decode_all(&source).remove(0);

        let mut writer = MessageWriter::new(Cursor::new(Vec::<u8>::new()));
        writer.write_message(&message).unwrap();

        let bytes = writer.into_inner().into_inner();
        assert_eq!(bytes.as_slice(), source.as_ref());
    }

    #[test]
    fn flush_propagates() {
        let sink = FlushTrackingWriter::default();
        let flag = Arc::clone(&sink.flushed);
        let mut writer = MessageWriter::new(sink);

        writer.send(b"", b"x").unwrap();

        assert!(flag.load(Ordering::SeqCst));
    }

    #[test]
    fn accessors_and_into_inner() {
        let mut writer = MessageWriter::new(Cursor::new(Vec::<u8>::new()));

        let _ = writer.get_ref();
        let _ = writer.get_mut();
        writer.set_max_message_size(1024);
        assert_eq!(writer.max_message_size(), 1024);
        let _inner = writer.into_inner();
    }

    #[test]
    fn handles_interrupted_write_and_flush() {
        let writer_impl = InterruptedWriteThenFlush {
            wrote_once: false,
            flush_interrupted: false,
            data: Vec::new(),
        };

        let mut writer = MessageWriter::new(writer_impl);
        writer.send(b"", b"retry").unwrap();

        let inner = writer.into_inner();
        assert_eq!(decode_all(&inner.data)[0].payload.as_ref(), b"retry");
    }

    #[test]
    fn handles_would_block_write_and_flush() {
        let writer_impl = WouldBlockWriteThenFlush {
            wrote_once: false,
            flush_would_block: false,
            data: Vec::new(),
        };

        let mut writer = MessageWriter::new(writer_impl);
        writer.send(b"", b"retry").unwrap();

        let inner = writer.into_inner();
        assert_eq!(decode_all(&inner.data)[0].payload.as_ref(), b"retry");
    }

    #[test]
    fn connection_closed_when_write_returns_zero() {
        let mut writer = MessageWriter::new(ZeroWriter);
        let err = writer.send(b"", b"x").unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn written_bytes_read_back() {
        let mut writer = MessageWriter::new(Cursor::new(Vec::<u8>::new()));

        writer.send(b"z", b"last").unwrap();

        let wire = writer.into_inner().into_inner();
        let mut reader = crate::reader::MessageReader::new(Cursor::new(wire));
        let message = reader.read_message().unwrap();
        assert_eq!(message.routing().as_ref(), b"z");
        assert_eq!(message.payload.as_ref(), b"last");
    }

    #[derive(Default)]
    struct FlushTrackingWriter {
        flushed: Arc<AtomicBool>,
        data: Vec<u8>,
    }

    impl Write for FlushTrackingWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            self.flushed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    struct InterruptedWriteThenFlush {
        wrote_once: bool,
        flush_interrupted: bool,
        data: Vec<u8>,
    }

    impl Write for InterruptedWriteThenFlush {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if !self.wrote_once {
                self.wrote_once = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            if !self.flush_interrupted {
                self.flush_interrupted = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            Ok(())
        }
    }

    struct WouldBlockWriteThenFlush {
        wrote_once: bool,
        flush_would_block: bool,
        data: Vec<u8>,
    }

    impl Write for WouldBlockWriteThenFlush {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if !self.wrote_once {
                self.wrote_once = true;
                return Err(std::io::Error::from(ErrorKind::WouldBlock));
            }
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            if !self.flush_would_block {
                self.flush_would_block = true;
                return Err(std::io::Error::from(ErrorKind::WouldBlock));
            }
            Ok(())
        }
    }

    struct ZeroWriter;

    impl Write for ZeroWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Ok(0)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
}
