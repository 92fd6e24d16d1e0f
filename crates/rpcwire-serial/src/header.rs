use std::io::{Read, Write};

use crate::error::{Result, SerialError};
use crate::staging::fill_from;

/// Flag bit marking a null (absent) collection.
pub const NULL_FLAG: u8 = 0x80;

/// Low bits of the flag byte selecting the length width.
pub const SIZE_CLASS_MASK: u8 = 0x03;

/// Largest possible header: flag + 4 length bytes.
pub const MAX_HEADER_SIZE: usize = 5;

/// Largest encodable collection length.
pub const MAX_LENGTH: u32 = i32::MAX as u32;

/// A decoded collection length header.
///
/// Wire format:
/// ```text
/// ┌────────────────────────┬──────────────────────────────┐
/// │ Flag (1B)              │ Length (0/1/2/4B LE)         │
/// │ bit 7: null            │ width selected by bits 0-1   │
/// │ bits 0-1: size class   │ absent when null or empty    │
/// └────────────────────────┴──────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LengthHeader {
    /// Element count, or `None` for a null collection.
    pub length: Option<u32>,
    /// Header bytes on the wire.
    pub size: usize,
}

impl LengthHeader {
    /// Whether the header marks an absent collection.
    pub fn is_null(&self) -> bool {
        self.length.is_none()
    }

    /// Length as a signed count, `-1` for null.
    pub fn signed_length(&self) -> i32 {
        self.length.map_or(-1, |len| len as i32)
    }

    /// Element count, zero for null.
    pub fn count(&self) -> usize {
        self.length.unwrap_or(0) as usize
    }
}

/// Minimal size class for a length.
pub fn size_class(length: u32) -> u8 {
    match length {
        0 => 0,
        1..=0xFF => 1,
        0x100..=0xFFFF => 2,
        _ => 3,
    }
}

fn class_width(class: u8) -> usize {
    match class & SIZE_CLASS_MASK {
        0 => 0,
        1 => 1,
        2 => 2,
        _ => 4,
    }
}

/// Header bytes needed for a non-null collection of `length` elements.
pub fn header_size(length: u32) -> usize {
    1 + class_width(size_class(length))
}

/// Header bytes needed for `count` elements, saturating at the widest header.
pub fn header_size_for(count: usize) -> usize {
    u32::try_from(count).map_or(MAX_HEADER_SIZE, header_size)
}

/// Encode a header into a fixed array; returns the array and the used length.
///
/// Both the buffer and the stream writers go through here, so their output
/// is byte-identical.
pub fn encode_header(length: u32, is_null: bool) -> Result<([u8; MAX_HEADER_SIZE], usize)> {
    let mut out = [0u8; MAX_HEADER_SIZE];
    if is_null {
        out[0] = NULL_FLAG;
        return Ok((out, 1));
    }
    if length > MAX_LENGTH {
        return Err(SerialError::InvalidLength(u64::from(length)));
    }

    let class = size_class(length);
    let width = class_width(class);
    out[0] = class;
    out[1..1 + width].copy_from_slice(&length.to_le_bytes()[..width]);
    Ok((out, 1 + width))
}

/// Write a header to the front of `dst`. Returns the header size (1, 2, 3 or 5).
pub fn write_header(dst: &mut [u8], length: u32, is_null: bool) -> Result<usize> {
    let (bytes, size) = encode_header(length, is_null)?;
    if dst.len() < size {
        return Err(SerialError::BufferOverflow {
            needed: size,
            available: dst.len(),
        });
    }
    dst[..size].copy_from_slice(&bytes[..size]);
    Ok(size)
}

/// Write a header to a stream. Returns the header size (1, 2, 3 or 5).
pub fn write_header_to(dst: &mut dyn Write, length: u32, is_null: bool) -> Result<usize> {
    let (bytes, size) = encode_header(length, is_null)?;
    dst.write_all(&bytes[..size])?;
    Ok(size)
}

/// Read a header from the front of `src`.
pub fn read_header(src: &[u8]) -> Result<LengthHeader> {
    let Some(&flag) = src.first() else {
        return Err(SerialError::TruncatedHeader {
            needed: 1,
            available: 0,
        });
    };
    if flag & NULL_FLAG != 0 {
        return Ok(LengthHeader {
            length: None,
            size: 1,
        });
    }

    let width = class_width(flag);
    if src.len() < 1 + width {
        return Err(SerialError::TruncatedHeader {
            needed: 1 + width,
            available: src.len(),
        });
    }
    let length = decode_length(&src[1..1 + width])?;
    Ok(LengthHeader {
        length: Some(length),
        size: 1 + width,
    })
}

/// Read a header from a stream.
pub fn read_header_from(src: &mut dyn Read) -> Result<LengthHeader> {
    let mut flag = [0u8; 1];
    if fill_from(src, &mut flag)? == 0 {
        return Err(SerialError::TruncatedHeader {
            needed: 1,
            available: 0,
        });
    }
    if flag[0] & NULL_FLAG != 0 {
        return Ok(LengthHeader {
            length: None,
            size: 1,
        });
    }

    let width = class_width(flag[0]);
    let mut raw = [0u8; 4];
    let got = fill_from(src, &mut raw[..width])?;
    if got < width {
        return Err(SerialError::TruncatedHeader {
            needed: 1 + width,
            available: 1 + got,
        });
    }
    let length = decode_length(&raw[..width])?;
    Ok(LengthHeader {
        length: Some(length),
        size: 1 + width,
    })
}

fn decode_length(raw: &[u8]) -> Result<u32> {
    let mut le = [0u8; 4];
    le[..raw.len()].copy_from_slice(raw);
    let length = u32::from_le_bytes(le);
    if length > MAX_LENGTH {
        return Err(SerialError::InvalidLength(u64::from(length)));
    }
    Ok(length)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use proptest::prelude::*;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::empty(0, false, 1)]
    #[case::one(1, false, 2)]
    #[case::byte_max(255, false, 2)]
    #[case::word_min(256, false, 3)]
    #[case::word_max(65535, false, 3)]
    #[case::dword_min(65536, false, 5)]
    #[case::max(i32::MAX as u32, false, 5)]
    #[case::null(0, true, 1)]
    #[case::null_ignores_length(65536, true, 1)]
    fn header_roundtrip(#[case] length: u32, #[case] is_null: bool, #[case] size: usize) {
        let mut buf = [0u8; MAX_HEADER_SIZE];
        let written = write_header(&mut buf, length, is_null).unwrap();
        assert_eq!(written, size);

        let mut stream = Vec::new();
        let streamed = write_header_to(&mut stream, length, is_null).unwrap();
        assert_eq!(streamed, size);
        assert_eq!(&buf[..written], stream.as_slice());

        let decoded = read_header(&buf[..written]).unwrap();
        let from_stream = read_header_from(&mut Cursor::new(stream)).unwrap();
        assert_eq!(decoded, from_stream);
        assert_eq!(decoded.size, size);
        assert_eq!(decoded.is_null(), is_null);
        if is_null {
            assert_eq!(decoded.signed_length(), -1);
        } else {
            assert_eq!(decoded.length, Some(length));
        }
    }

    #[test]
    fn header_bytes_are_little_endian() {
        let mut buf = [0u8; MAX_HEADER_SIZE];
        assert_eq!(write_header(&mut buf, 0x0102, false).unwrap(), 3);
        assert_eq!(&buf[..3], &[0x02, 0x02, 0x01]);

        assert_eq!(write_header(&mut buf, 0x0102_0304, false).unwrap(), 5);
        assert_eq!(&buf, &[0x03, 0x04, 0x03, 0x02, 0x01]);
    }

    #[test]
    fn null_and_empty_are_distinct() {
        let mut null = [0u8; 1];
        let mut empty = [0u8; 1];
        write_header(&mut null, 0, true).unwrap();
        write_header(&mut empty, 0, false).unwrap();
        assert_ne!(null, empty);
        assert!(read_header(&null).unwrap().is_null());
        assert_eq!(read_header(&empty).unwrap().length, Some(0));
    }

    #[test]
    fn truncated_header_in_buffer() {
        let err = read_header(&[]).unwrap_err();
        assert!(matches!(
            err,
            SerialError::TruncatedHeader {
                needed: 1,
                available: 0
            }
        ));

        let err = read_header(&[0x03, 0x01, 0x02]).unwrap_err();
        assert!(matches!(
            err,
            SerialError::TruncatedHeader {
                needed: 5,
                available: 3
            }
        ));
    }

    #[test]
    fn truncated_header_in_stream() {
        let err = read_header_from(&mut Cursor::new(vec![0x02, 0xFF])).unwrap_err();
        assert!(matches!(
            err,
            SerialError::TruncatedHeader {
                needed: 3,
                available: 2
            }
        ));
    }

    #[test]
    fn write_rejects_small_destination() {
        let mut buf = [0u8; 2];
        let err = write_header(&mut buf, 300, false).unwrap_err();
        assert!(matches!(
            err,
            SerialError::BufferOverflow {
                needed: 3,
                available: 2
            }
        ));
    }

    #[test]
    fn lengths_past_i32_max_rejected() {
        let mut buf = [0u8; MAX_HEADER_SIZE];
        assert!(matches!(
            write_header(&mut buf, u32::MAX, false),
            Err(SerialError::InvalidLength(_))
        ));
        assert!(matches!(
            read_header(&[0x03, 0xFF, 0xFF, 0xFF, 0xFF]),
            Err(SerialError::InvalidLength(_))
        ));
    }

    proptest! {
        #[test]
        fn buffer_and_stream_encodings_match(length in 0u32..=MAX_LENGTH, is_null in any::<bool>()) {
            let mut buf = [0u8; MAX_HEADER_SIZE];
            let size = write_header(&mut buf, length, is_null).unwrap();
            let mut stream = Vec::new();
            write_header_to(&mut stream, length, is_null).unwrap();
            prop_assert_eq!(&buf[..size], stream.as_slice());
            prop_assert_eq!(size, if is_null { 1 } else { header_size(length) });

            let decoded = read_header(&buf[..size]).unwrap();
            prop_assert_eq!(decoded.length, if is_null { None } else { Some(length) });
        }
    }
}
