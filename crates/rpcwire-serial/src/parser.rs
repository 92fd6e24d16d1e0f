use std::io::{Read, Write};
use std::marker::PhantomData;

use bytes::Bytes;

use crate::collection::ElementCodec;
use crate::error::{Result, SerialError};
use crate::header::{header_size_for, read_header, read_header_from, write_header, write_header_to};
use crate::staging::read_exact_counted;

/// Converts values of one type to and from the wire.
///
/// Buffer-addressed and stream-addressed forms must produce identical bytes.
/// For every value, `encoded_size` equals what `write` returns.
pub trait BinaryParser<T>: Send + Sync {
    /// Whether encoded sizes depend on the value.
    fn is_variable_size(&self) -> bool;

    /// Smallest possible encoding; the exact size for fixed-size parsers.
    fn minimum_size(&self) -> usize;

    /// Bytes `write` will produce for `value`.
    fn encoded_size(&self, value: &T) -> usize {
        let _ = value;
        self.minimum_size()
    }

    /// Encode into the front of `dst`. Returns bytes written.
    fn write(&self, value: &T, dst: &mut [u8]) -> Result<usize>;

    /// Encode to a stream. Returns bytes written.
    fn write_to(&self, value: &T, dst: &mut dyn Write) -> Result<usize>;

    /// Decode from the front of `src`. Returns the value and bytes consumed.
    fn read(&self, src: &[u8]) -> Result<(T, usize)>;

    /// Decode from a stream. Returns the value and bytes consumed.
    fn read_from(&self, src: &mut dyn Read) -> Result<(T, usize)>;
}

const SCALAR_STACK_SIZE: usize = 32;

/// Fixed-size parser for a single element, driven by an [`ElementCodec`].
pub struct ScalarParser<T, C> {
    codec: C,
    _marker: PhantomData<fn() -> T>,
}

impl<T, C: ElementCodec<T>> ScalarParser<T, C> {
    pub fn new(codec: C) -> Self {
        Self {
            codec,
            _marker: PhantomData,
        }
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    fn with_scratch<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        let size = self.codec.element_size();
        if size <= SCALAR_STACK_SIZE {
            let mut stack = [0u8; SCALAR_STACK_SIZE];
            f(&mut stack[..size])
        } else {
            f(&mut vec![0u8; size])
        }
    }
}

impl<T, C: ElementCodec<T>> BinaryParser<T> for ScalarParser<T, C> {
    fn is_variable_size(&self) -> bool {
        false
    }

    fn minimum_size(&self) -> usize {
        self.codec.element_size()
    }

    fn write(&self, value: &T, dst: &mut [u8]) -> Result<usize> {
        let size = self.codec.element_size();
        let available = dst.len();
        let slot = dst.get_mut(..size).ok_or(SerialError::BufferOverflow {
            needed: size,
            available,
        })?;
        self.codec.encode_one(value, slot);
        Ok(size)
    }

    fn write_to(&self, value: &T, dst: &mut dyn Write) -> Result<usize> {
        self.with_scratch(|buf| {
            self.codec.encode_one(value, buf);
            dst.write_all(buf)?;
            Ok(buf.len())
        })
    }

    fn read(&self, src: &[u8]) -> Result<(T, usize)> {
        let size = self.codec.element_size();
        let raw = src.get(..size).ok_or(SerialError::BufferOverflow {
            needed: size,
            available: src.len(),
        })?;
        Ok((self.codec.decode_one(raw)?, size))
    }

    fn read_from(&self, src: &mut dyn Read) -> Result<(T, usize)> {
        self.with_scratch(|buf| {
            read_exact_counted(src, buf)?;
            Ok((self.codec.decode_one(buf)?, buf.len()))
        })
    }
}

/// UTF-8 strings: a length header counting bytes, then the bytes.
///
/// `Option<String>` maps `None` to the null header.
#[derive(Debug, Clone, Copy, Default)]
pub struct Utf8Parser;

/// Raw byte strings, encoded exactly like a `u8` collection.
#[derive(Debug, Clone, Copy, Default)]
pub struct BytesParser;

fn write_bytes(raw: &[u8], dst: &mut [u8]) -> Result<usize> {
    let length = u32::try_from(raw.len()).map_err(|_| SerialError::InvalidLength(raw.len() as u64))?;
    let total = header_size_for(raw.len()) + raw.len();
    if dst.len() < total {
        return Err(SerialError::BufferOverflow {
            needed: total,
            available: dst.len(),
        });
    }
    let header = write_header(dst, length, false)?;
    dst[header..total].copy_from_slice(raw);
    Ok(total)
}

fn write_bytes_to(raw: &[u8], dst: &mut dyn Write) -> Result<usize> {
    let length = u32::try_from(raw.len()).map_err(|_| SerialError::InvalidLength(raw.len() as u64))?;
    let header = write_header_to(dst, length, false)?;
    dst.write_all(raw)?;
    Ok(header + raw.len())
}

fn read_bytes(src: &[u8]) -> Result<(Option<&[u8]>, usize)> {
    let header = read_header(src)?;
    if header.is_null() {
        return Ok((None, header.size));
    }
    let end = header.size + header.count();
    let raw = src.get(header.size..end).ok_or(SerialError::BufferOverflow {
        needed: end,
        available: src.len(),
    })?;
    Ok((Some(raw), end))
}

fn read_bytes_from(src: &mut dyn Read) -> Result<(Option<Vec<u8>>, usize)> {
    let header = read_header_from(src)?;
    let Some(length) = header.length else {
        return Ok((None, header.size));
    };
    // Grows with the data actually received, not the declared length.
    let mut raw = Vec::new();
    let got = Read::take(&mut *src, u64::from(length)).read_to_end(&mut raw)?;
    if got < length as usize {
        return Err(SerialError::TruncatedStream {
            expected: length as usize,
            actual: got,
            consumed: header.size + got,
        });
    }
    Ok((Some(raw), header.size + got))
}

fn utf8(raw: Vec<u8>) -> Result<String> {
    String::from_utf8(raw).map_err(|err| SerialError::InvalidValue {
        type_name: "String",
        reason: err.to_string(),
    })
}

fn required<T>(value: Option<T>, consumed: usize) -> Result<T> {
    value.ok_or(SerialError::UnexpectedNull { consumed })
}

impl BinaryParser<String> for Utf8Parser {
    fn is_variable_size(&self) -> bool {
        true
    }

    fn minimum_size(&self) -> usize {
        1
    }

    fn encoded_size(&self, value: &String) -> usize {
        header_size_for(value.len()) + value.len()
    }

    fn write(&self, value: &String, dst: &mut [u8]) -> Result<usize> {
        write_bytes(value.as_bytes(), dst)
    }

    fn write_to(&self, value: &String, dst: &mut dyn Write) -> Result<usize> {
        write_bytes_to(value.as_bytes(), dst)
    }

    fn read(&self, src: &[u8]) -> Result<(String, usize)> {
        let (raw, consumed) = read_bytes(src)?;
        let raw = required(raw, consumed)?;
        Ok((utf8(raw.to_vec())?, consumed))
    }

    fn read_from(&self, src: &mut dyn Read) -> Result<(String, usize)> {
        let (raw, consumed) = read_bytes_from(src)?;
        Ok((utf8(required(raw, consumed)?)?, consumed))
    }
}

impl BinaryParser<Option<String>> for Utf8Parser {
    fn is_variable_size(&self) -> bool {
        true
    }

    fn minimum_size(&self) -> usize {
        1
    }

    fn encoded_size(&self, value: &Option<String>) -> usize {
        value.as_ref().map_or(1, |s| header_size_for(s.len()) + s.len())
    }

    fn write(&self, value: &Option<String>, dst: &mut [u8]) -> Result<usize> {
        match value {
            Some(s) => write_bytes(s.as_bytes(), dst),
            None => write_header(dst, 0, true),
        }
    }

    fn write_to(&self, value: &Option<String>, dst: &mut dyn Write) -> Result<usize> {
        match value {
            Some(s) => write_bytes_to(s.as_bytes(), dst),
            None => write_header_to(dst, 0, true),
        }
    }

    fn read(&self, src: &[u8]) -> Result<(Option<String>, usize)> {
        let (raw, consumed) = read_bytes(src)?;
        let value = raw.map(|raw| utf8(raw.to_vec())).transpose()?;
        Ok((value, consumed))
    }

    fn read_from(&self, src: &mut dyn Read) -> Result<(Option<String>, usize)> {
        let (raw, consumed) = read_bytes_from(src)?;
        Ok((raw.map(utf8).transpose()?, consumed))
    }
}

impl BinaryParser<Bytes> for BytesParser {
    fn is_variable_size(&self) -> bool {
        true
    }

    fn minimum_size(&self) -> usize {
        1
    }

    fn encoded_size(&self, value: &Bytes) -> usize {
        header_size_for(value.len()) + value.len()
    }

    fn write(&self, value: &Bytes, dst: &mut [u8]) -> Result<usize> {
        write_bytes(value, dst)
    }

    fn write_to(&self, value: &Bytes, dst: &mut dyn Write) -> Result<usize> {
        write_bytes_to(value, dst)
    }

    fn read(&self, src: &[u8]) -> Result<(Bytes, usize)> {
        let (raw, consumed) = read_bytes(src)?;
        Ok((Bytes::copy_from_slice(required(raw, consumed)?), consumed))
    }

    fn read_from(&self, src: &mut dyn Read) -> Result<(Bytes, usize)> {
        let (raw, consumed) = read_bytes_from(src)?;
        Ok((Bytes::from(required(raw, consumed)?), consumed))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::layout::ByteOrder;
    use crate::unmanaged::BlockCopyCodec;

    #[test]
    fn scalar_round_trip_both_targets() {
        let parser = ScalarParser::new(BlockCopyCodec::<u64>::new(ByteOrder::Little));
        let value = 0x0102_0304_0506_0708u64;

        let mut buf = [0u8; 8];
        assert_eq!(parser.write(&value, &mut buf).unwrap(), 8);
        assert_eq!(buf, value.to_le_bytes());

        let mut stream = Vec::new();
        parser.write_to(&value, &mut stream).unwrap();
        assert_eq!(stream, buf);

        assert_eq!(parser.read(&buf).unwrap(), (value, 8));
        assert_eq!(parser.read_from(&mut Cursor::new(stream)).unwrap(), (value, 8));
    }

    #[test]
    fn scalar_short_input() {
        let parser = ScalarParser::new(BlockCopyCodec::<u32>::new(ByteOrder::Little));
        assert!(matches!(
            parser.read(&[1, 2]),
            Err(SerialError::BufferOverflow {
                needed: 4,
                available: 2
            })
        ));
        assert!(matches!(
            parser.write(&7, &mut [0u8; 3]),
            Err(SerialError::BufferOverflow {
                needed: 4,
                available: 3
            })
        ));
        assert!(matches!(
            parser.read_from(&mut Cursor::new(vec![1u8])),
            Err(SerialError::TruncatedStream {
                expected: 4,
                actual: 1,
                consumed: 1
            })
        ));
    }

    #[test]
    fn string_round_trip() {
        let value = "héllo".to_string();
        let size = Utf8Parser.encoded_size(&value);
        let mut buf = vec![0u8; size];
        assert_eq!(Utf8Parser.write(&value, &mut buf).unwrap(), size);

        let (decoded, consumed): (String, usize) = Utf8Parser.read(&buf).unwrap();
        assert_eq!(decoded, value);
        assert_eq!(consumed, size);

        let mut stream = Vec::new();
        Utf8Parser.write_to(&value, &mut stream).unwrap();
        assert_eq!(stream, buf);
    }

    #[test]
    fn optional_string_null() {
        let mut buf = [0u8; 1];
        BinaryParser::<Option<String>>::write(&Utf8Parser, &None, &mut buf).unwrap();
        assert_eq!(buf, [0x80]);

        let (decoded, consumed): (Option<String>, usize) = Utf8Parser.read(&buf).unwrap();
        assert_eq!((decoded, consumed), (None, 1));

        let err = BinaryParser::<String>::read(&Utf8Parser, &buf).unwrap_err();
        assert!(matches!(err, SerialError::UnexpectedNull { consumed: 1 }));
    }

    #[test]
    fn invalid_utf8_rejected() {
        let err = BinaryParser::<String>::read(&Utf8Parser, &[0x01, 0x02, 0xFF, 0xFE]).unwrap_err();
        assert!(matches!(err, SerialError::InvalidValue { type_name: "String", .. }));
    }

    #[test]
    fn truncated_string_stream() {
        let mut stream = Cursor::new(vec![0x01, 0x05, b'a', b'b']);
        let err = BinaryParser::<String>::read_from(&Utf8Parser, &mut stream).unwrap_err();
        assert!(matches!(
            err,
            SerialError::TruncatedStream {
                expected: 5,
                actual: 2,
                consumed: 4
            }
        ));
    }

    #[test]
    fn bytes_match_u8_collection_encoding() {
        let value = Bytes::from_static(&[1, 2, 3]);
        let mut buf = [0u8; 8];
        let len = BytesParser.write(&value, &mut buf).unwrap();
        assert_eq!(&buf[..len], &[0x01, 0x03, 1, 2, 3]);

        let (decoded, _) = BytesParser.read(&buf[..len]).unwrap();
        assert_eq!(decoded, value);
    }
}
