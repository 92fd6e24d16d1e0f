//! The shared "collection of T" encoding.
//!
//! Wire format:
//! ```text
//! ┌──────────────────────┬─────────────────────────────────────┐
//! │ Length header (1-5B) │ count × element_size bytes          │
//! └──────────────────────┴─────────────────────────────────────┘
//! ```
//!
//! A null collection is a lone header byte with the null flag set. The
//! encoding is implemented once in [`CollectionParser`]; the element bytes
//! come from an [`ElementCodec`].
//!
//! Shapes:
//! - `Vec<T>`, `Box<[T]>`, `Arc<[T]>`, `VecDeque<T>` and [`Segment<T>`] are
//!   full [`BinaryParser`] targets, each also in `Option<_>` form
//! - `&[T]` and `&mut [T]` go through [`CollectionParser::write_slice`] and
//!   [`CollectionParser::read_into`]
//! - any `ExactSizeIterator` goes through [`CollectionParser::write_exact`]
//! - any other iterator goes through [`CollectionParser::write_iter`]

use std::borrow::Borrow;
use std::collections::VecDeque;
use std::io::{Read, Write};
use std::marker::PhantomData;
use std::sync::Arc;

use crate::error::{Result, SerialError};
use crate::header::{
    header_size, header_size_for, read_header, read_header_from, write_header, write_header_to,
    LengthHeader, MAX_HEADER_SIZE, MAX_LENGTH,
};
use crate::layout::shift_bytes;
use crate::parser::BinaryParser;
use crate::staging::StagingPolicy;

/// Per-element encoding for a fixed-size element type.
///
/// Implementors provide single-element conversion; the slice and stream
/// methods have element-loop defaults that fast paths override.
pub trait ElementCodec<T>: Send + Sync {
    /// Bytes per element on the wire. Never zero.
    fn element_size(&self) -> usize;

    /// Encode one element into `dst` (exactly `element_size` bytes).
    fn encode_one(&self, value: &T, dst: &mut [u8]);

    /// Decode one element from `src` (exactly `element_size` bytes).
    fn decode_one(&self, src: &[u8]) -> Result<T>;

    /// Encode `values` back to back into `dst`.
    fn encode_slice(&self, values: &[T], dst: &mut [u8]) {
        let size = self.element_size();
        for (value, slot) in values.iter().zip(dst.chunks_exact_mut(size)) {
            self.encode_one(value, slot);
        }
    }

    /// Decode `dst.len()` elements from `src`, overwriting `dst`.
    fn decode_slice(&self, src: &[u8], dst: &mut [T]) -> Result<()> {
        let size = self.element_size();
        for (slot, raw) in dst.iter_mut().zip(src.chunks_exact(size)) {
            *slot = self.decode_one(raw)?;
        }
        Ok(())
    }

    /// Decode every element in `src` onto the end of `out`.
    fn decode_append(&self, src: &[u8], out: &mut Vec<T>) -> Result<()> {
        let size = self.element_size();
        out.reserve(src.len() / size);
        for raw in src.chunks_exact(size) {
            out.push(self.decode_one(raw)?);
        }
        Ok(())
    }

    /// Write the element bytes of `values` to a stream.
    fn write_slice_to(
        &self,
        values: &[T],
        dst: &mut dyn Write,
        staging: &StagingPolicy,
    ) -> Result<usize> {
        staged_write(self, values, dst, staging)
    }

    /// Fill `dst` with elements read from a stream.
    fn read_slice_from(
        &self,
        src: &mut dyn Read,
        dst: &mut [T],
        staging: &StagingPolicy,
    ) -> Result<usize> {
        staged_read(self, src, dst, staging)
    }
}

/// Stage `values` through `staging` and write them to `dst`.
pub fn staged_write<T, C>(
    codec: &C,
    values: &[T],
    dst: &mut dyn Write,
    staging: &StagingPolicy,
) -> Result<usize>
where
    C: ElementCodec<T> + ?Sized,
{
    let size = codec.element_size();
    let total = checked_body_len(values.len(), size)?;
    staging.write_staged(dst, total, size, |range, staged| {
        codec.encode_slice(&values[range.start / size..range.end / size], staged);
        Ok(())
    })
}

/// Read `dst.len()` elements from `src` through `staging`.
pub fn staged_read<T, C>(
    codec: &C,
    src: &mut dyn Read,
    dst: &mut [T],
    staging: &StagingPolicy,
) -> Result<usize>
where
    C: ElementCodec<T> + ?Sized,
{
    let size = codec.element_size();
    let total = checked_body_len(dst.len(), size)?;
    staging.read_staged(src, total, size, |range, staged| {
        codec.decode_slice(staged, &mut dst[range.start / size..range.end / size])
    })
}

fn checked_body_len(count: usize, element_size: usize) -> Result<usize> {
    count
        .checked_mul(element_size)
        .ok_or(SerialError::InvalidLength(count as u64))
}

fn wire_count(count: usize) -> Result<u32> {
    u32::try_from(count)
        .ok()
        .filter(|length| *length <= MAX_LENGTH)
        .ok_or(SerialError::InvalidLength(count as u64))
}

/// How a growable read treats existing contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FillMode {
    /// Replace existing contents.
    #[default]
    Overwrite,
    /// Keep existing contents and add the decoded elements after them.
    Append,
}

impl FillMode {
    fn fill<T>(self, out: &mut Vec<T>, mut items: Vec<T>) {
        if self == FillMode::Overwrite {
            out.clear();
        }
        out.append(&mut items);
    }
}

/// Result of a read into a caller-provided destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadOutcome {
    /// Elements decoded, `None` when the encoding was null.
    pub elements: Option<usize>,
    /// Bytes consumed from the source.
    pub consumed: usize,
}

impl ReadOutcome {
    fn null() -> Self {
        Self {
            elements: None,
            consumed: 1,
        }
    }

    pub fn is_null(&self) -> bool {
        self.elements.is_none()
    }
}

/// A bounded window over a backing vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment<T> {
    items: Vec<T>,
    offset: usize,
    count: usize,
}

impl<T> Segment<T> {
    /// Window of `count` elements starting at `offset`.
    pub fn new(items: Vec<T>, offset: usize, count: usize) -> Result<Self> {
        let end = offset.saturating_add(count);
        if end > items.len() {
            return Err(SerialError::BufferOverflow {
                needed: end,
                available: items.len(),
            });
        }
        Ok(Self {
            items,
            offset,
            count,
        })
    }

    /// Window covering all of `items`.
    pub fn from_vec(items: Vec<T>) -> Self {
        let count = items.len();
        Self {
            items,
            offset: 0,
            count,
        }
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items[self.offset..self.offset + self.count]
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.items[self.offset..self.offset + self.count]
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// The backing vector, including elements outside the window.
    pub fn into_inner(self) -> Vec<T> {
        self.items
    }
}

/// Encoder/decoder for collections of `T` using codec `C`.
pub struct CollectionParser<T, C> {
    codec: C,
    staging: StagingPolicy,
    _marker: PhantomData<fn() -> T>,
}

impl<T, C: ElementCodec<T>> CollectionParser<T, C> {
    /// Create a parser with its own default staging policy.
    pub fn new(codec: C) -> Self {
        Self::with_staging(codec, StagingPolicy::new())
    }

    /// Create a parser sharing an existing staging policy.
    ///
    /// # Panics
    ///
    /// Panics if the codec reports a zero element size.
    pub fn with_staging(codec: C, staging: StagingPolicy) -> Self {
        assert!(
            codec.element_size() > 0,
            "element codec must have a non-zero wire size"
        );
        Self {
            codec,
            staging,
            _marker: PhantomData,
        }
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    pub fn staging(&self) -> &StagingPolicy {
        &self.staging
    }

    pub fn element_size(&self) -> usize {
        self.codec.element_size()
    }

    /// Encoded size of a non-null collection of `count` elements.
    pub fn encoded_len(&self, count: usize) -> usize {
        header_size_for(count).saturating_add(count.saturating_mul(self.element_size()))
    }

    fn body_len(&self, count: usize) -> Result<usize> {
        checked_body_len(count, self.element_size())
    }

    /// Write a null collection (one byte).
    pub fn write_null(&self, dst: &mut [u8]) -> Result<usize> {
        write_header(dst, 0, true)
    }

    /// Write a null collection to a stream.
    pub fn write_null_to(&self, dst: &mut dyn Write) -> Result<usize> {
        write_header_to(dst, 0, true)
    }

    /// Write a contiguous slice. The whole size is checked up front.
    pub fn write_slice(&self, values: &[T], dst: &mut [u8]) -> Result<usize> {
        let length = wire_count(values.len())?;
        let header = header_size(length);
        let total = header + self.body_len(values.len())?;
        if dst.len() < total {
            return Err(SerialError::BufferOverflow {
                needed: total,
                available: dst.len(),
            });
        }
        write_header(dst, length, false)?;
        self.codec.encode_slice(values, &mut dst[header..total]);
        Ok(total)
    }

    /// Write a contiguous slice to a stream.
    pub fn write_slice_to(&self, values: &[T], dst: &mut dyn Write) -> Result<usize> {
        let length = wire_count(values.len())?;
        let header = write_header_to(dst, length, false)?;
        let body = self.codec.write_slice_to(values, dst, &self.staging)?;
        Ok(header + body)
    }

    /// Write a sequence whose length is known up front.
    ///
    /// Fails with `LengthMismatch` if the iterator yields a different number
    /// of elements than it reported.
    pub fn write_exact<I>(&self, values: I, dst: &mut [u8]) -> Result<usize>
    where
        I: IntoIterator,
        I::IntoIter: ExactSizeIterator,
        I::Item: Borrow<T>,
    {
        let iter = values.into_iter();
        let declared = iter.len();
        self.write_counted(iter, declared, dst)
    }

    /// Stream form of [`write_exact`](Self::write_exact).
    pub fn write_exact_to<I>(&self, values: I, dst: &mut dyn Write) -> Result<usize>
    where
        I: IntoIterator,
        I::IntoIter: ExactSizeIterator,
        I::Item: Borrow<T>,
    {
        let iter = values.into_iter();
        let declared = iter.len();
        self.write_counted_to(iter, declared, dst)
    }

    /// Write a sequence of unknown length into a buffer.
    ///
    /// Elements are written past a header slot sized from the iterator's
    /// upper bound (the widest header when there is none). Once the count
    /// is known the body is shifted so it directly follows the minimal
    /// header.
    pub fn write_iter<I>(&self, values: I, dst: &mut [u8]) -> Result<usize>
    where
        I: IntoIterator,
        I::Item: Borrow<T>,
    {
        let iter = values.into_iter();
        let reserved = iter
            .size_hint()
            .1
            .map_or(MAX_HEADER_SIZE, header_size_for);
        let size = self.element_size();

        let mut offset = reserved;
        let mut count = 0usize;
        for value in iter {
            let end = offset + size;
            if end > dst.len() {
                return Err(SerialError::BufferOverflow {
                    needed: end,
                    available: dst.len(),
                });
            }
            self.codec.encode_one(value.borrow(), &mut dst[offset..end]);
            offset = end;
            count += 1;
        }

        let length = wire_count(count)?;
        let header = header_size(length);
        let body = offset - reserved;
        if header != reserved && body > 0 {
            shift_bytes(dst, reserved, body, header)?;
        }
        write_header(dst, length, false)?;
        Ok(header + body)
    }

    /// Write a sequence of unknown length to a stream.
    ///
    /// A stream cannot be patched after the fact, so the iterator is cloned
    /// for a counting pass before the write pass.
    pub fn write_iter_to<I>(&self, values: I, dst: &mut dyn Write) -> Result<usize>
    where
        I: IntoIterator,
        I::IntoIter: Clone,
        I::Item: Borrow<T>,
    {
        let iter = values.into_iter();
        let declared = iter.clone().count();
        self.write_counted_to(iter, declared, dst)
    }

    fn write_counted<I>(&self, mut iter: I, declared: usize, dst: &mut [u8]) -> Result<usize>
    where
        I: Iterator,
        I::Item: Borrow<T>,
    {
        let length = wire_count(declared)?;
        let header = write_header(dst, length, false)?;
        let needed = header.saturating_add(self.body_len(declared)?);
        let size = self.element_size();

        let mut offset = header;
        let mut produced = 0usize;
        for value in iter.by_ref().take(declared) {
            let end = offset + size;
            if end > dst.len() {
                return Err(SerialError::BufferOverflow {
                    needed,
                    available: dst.len(),
                });
            }
            self.codec.encode_one(value.borrow(), &mut dst[offset..end]);
            offset = end;
            produced += 1;
        }
        ensure_exhausted(declared, produced, iter)?;
        Ok(offset)
    }

    fn write_counted_to<I>(&self, mut iter: I, declared: usize, dst: &mut dyn Write) -> Result<usize>
    where
        I: Iterator,
        I::Item: Borrow<T>,
    {
        let length = wire_count(declared)?;
        let body = self.body_len(declared)?;
        let size = self.element_size();
        let header = write_header_to(dst, length, false)?;

        let mut produced = 0usize;
        self.staging.write_staged(dst, body, size, |_, staged| {
            for slot in staged.chunks_exact_mut(size) {
                let value = iter.next().ok_or(SerialError::LengthMismatch {
                    declared,
                    actual: produced,
                })?;
                self.codec.encode_one(value.borrow(), slot);
                produced += 1;
            }
            Ok(())
        })?;
        ensure_exhausted(declared, produced, iter)?;
        Ok(header + body)
    }

    fn body_window<'a>(&self, src: &'a [u8], header: &LengthHeader) -> Result<&'a [u8]> {
        let end = header.size.saturating_add(self.body_len(header.count())?);
        src.get(header.size..end)
            .ok_or(SerialError::BufferOverflow {
                needed: end,
                available: src.len(),
            })
    }

    /// Decode into a fixed-capacity destination.
    ///
    /// A destination shorter than the encoded count fails with
    /// `DestinationTooSmall`, reporting the bytes the whole encoding spans.
    pub fn read_into(&self, src: &[u8], dst: &mut [T]) -> Result<ReadOutcome> {
        let header = read_header(src)?;
        let Some(length) = header.length else {
            return Ok(ReadOutcome::null());
        };
        let count = length as usize;
        if count > dst.len() {
            return Err(SerialError::DestinationTooSmall {
                required: count,
                capacity: dst.len(),
                consumed: header.size.saturating_add(self.body_len(count)?),
            });
        }
        let body = self.body_window(src, &header)?;
        self.codec.decode_slice(body, &mut dst[..count])?;
        Ok(ReadOutcome {
            elements: Some(count),
            consumed: header.size + body.len(),
        })
    }

    /// Decode into a growable destination. A null encoding or a failed
    /// decode leaves `out` untouched.
    pub fn read_into_vec(&self, src: &[u8], out: &mut Vec<T>, mode: FillMode) -> Result<ReadOutcome> {
        let header = read_header(src)?;
        let Some(length) = header.length else {
            return Ok(ReadOutcome::null());
        };
        let body = self.body_window(src, &header)?;
        let mut items = Vec::with_capacity(length as usize);
        self.codec.decode_append(body, &mut items)?;
        mode.fill(out, items);
        Ok(ReadOutcome {
            elements: Some(length as usize),
            consumed: header.size + body.len(),
        })
    }

    /// Decode a whole collection; `None` for a null encoding.
    pub fn read_vec(&self, src: &[u8]) -> Result<(Option<Vec<T>>, usize)> {
        let header = read_header(src)?;
        if header.is_null() {
            return Ok((None, header.size));
        }
        let body = self.body_window(src, &header)?;
        let mut items = Vec::with_capacity(header.count());
        self.codec.decode_append(body, &mut items)?;
        Ok((Some(items), header.size + body.len()))
    }

    /// Decode and hand the elements to any `Extend` target.
    pub fn read_extend<E: Extend<T>>(&self, src: &[u8], target: &mut E) -> Result<ReadOutcome> {
        let (items, consumed) = self.read_vec(src)?;
        let elements = items.map(|items| {
            let count = items.len();
            target.extend(items);
            count
        });
        Ok(ReadOutcome { elements, consumed })
    }

    /// Stream form of [`read_into`](Self::read_into).
    ///
    /// On `DestinationTooSmall` only the header has been consumed from the
    /// stream; the error still reports the size of the whole encoding.
    pub fn read_into_from(&self, src: &mut dyn Read, dst: &mut [T]) -> Result<ReadOutcome> {
        let header = read_header_from(src)?;
        let Some(length) = header.length else {
            return Ok(ReadOutcome::null());
        };
        let count = length as usize;
        if count > dst.len() {
            return Err(SerialError::DestinationTooSmall {
                required: count,
                capacity: dst.len(),
                consumed: header.size.saturating_add(self.body_len(count)?),
            });
        }
        let body = self
            .codec
            .read_slice_from(src, &mut dst[..count], &self.staging)
            .map_err(|err| err.consumed_after(header.size))?;
        Ok(ReadOutcome {
            elements: Some(count),
            consumed: header.size + body,
        })
    }

    /// Stream form of [`read_into_vec`](Self::read_into_vec).
    pub fn read_into_vec_from(
        &self,
        src: &mut dyn Read,
        out: &mut Vec<T>,
        mode: FillMode,
    ) -> Result<ReadOutcome> {
        let header = read_header_from(src)?;
        let Some(length) = header.length else {
            return Ok(ReadOutcome::null());
        };
        let mut items = Vec::new();
        let body = self
            .read_append_from(src, length as usize, &mut items)
            .map_err(|err| err.consumed_after(header.size))?;
        mode.fill(out, items);
        Ok(ReadOutcome {
            elements: Some(length as usize),
            consumed: header.size + body,
        })
    }

    /// Stream form of [`read_vec`](Self::read_vec).
    pub fn read_vec_from(&self, src: &mut dyn Read) -> Result<(Option<Vec<T>>, usize)> {
        let header = read_header_from(src)?;
        let Some(length) = header.length else {
            return Ok((None, header.size));
        };
        let mut items = Vec::new();
        let body = self
            .read_append_from(src, length as usize, &mut items)
            .map_err(|err| err.consumed_after(header.size))?;
        Ok((Some(items), header.size + body))
    }

    // Decodes chunk by chunk, so the vector only grows as bytes arrive.
    fn read_append_from(&self, src: &mut dyn Read, count: usize, out: &mut Vec<T>) -> Result<usize> {
        let size = self.element_size();
        let total = self.body_len(count)?;
        self.staging
            .read_staged(src, total, size, |_, staged| self.codec.decode_append(staged, out))
    }
}

fn ensure_exhausted<I: Iterator>(declared: usize, produced: usize, mut rest: I) -> Result<()> {
    if produced < declared {
        return Err(SerialError::LengthMismatch {
            declared,
            actual: produced,
        });
    }
    if rest.next().is_some() {
        return Err(SerialError::LengthMismatch {
            declared,
            actual: produced + 1 + rest.count(),
        });
    }
    Ok(())
}

impl<T, C> std::fmt::Debug for CollectionParser<T, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionParser")
            .field("element", &std::any::type_name::<T>())
            .field("staging", &self.staging)
            .finish()
    }
}

trait CollectionShape<T>: Sized {
    fn element_count(&self) -> usize;
    fn write_with<C: ElementCodec<T>>(&self, parser: &CollectionParser<T, C>, dst: &mut [u8]) -> Result<usize>;
    fn write_with_to<C: ElementCodec<T>>(
        &self,
        parser: &CollectionParser<T, C>,
        dst: &mut dyn Write,
    ) -> Result<usize>;
    fn from_items(items: Vec<T>) -> Self;
}

macro_rules! contiguous_shape {
    ($shape:ty, |$items:ident| $from_items:expr) => {
        impl<T> CollectionShape<T> for $shape {
            fn element_count(&self) -> usize {
                self.len()
            }

            fn write_with<C: ElementCodec<T>>(
                &self,
                parser: &CollectionParser<T, C>,
                dst: &mut [u8],
            ) -> Result<usize> {
                parser.write_slice(&self[..], dst)
            }

            fn write_with_to<C: ElementCodec<T>>(
                &self,
                parser: &CollectionParser<T, C>,
                dst: &mut dyn Write,
            ) -> Result<usize> {
                parser.write_slice_to(&self[..], dst)
            }

            fn from_items($items: Vec<T>) -> Self {
                $from_items
            }
        }
    };
}

contiguous_shape!(Vec<T>, |items| items);
contiguous_shape!(Box<[T]>, |items| items.into_boxed_slice());
contiguous_shape!(Arc<[T]>, |items| Arc::from(items));

impl<T> CollectionShape<T> for Segment<T> {
    fn element_count(&self) -> usize {
        self.count
    }

    fn write_with<C: ElementCodec<T>>(&self, parser: &CollectionParser<T, C>, dst: &mut [u8]) -> Result<usize> {
        parser.write_slice(self.as_slice(), dst)
    }

    fn write_with_to<C: ElementCodec<T>>(
        &self,
        parser: &CollectionParser<T, C>,
        dst: &mut dyn Write,
    ) -> Result<usize> {
        parser.write_slice_to(self.as_slice(), dst)
    }

    fn from_items(items: Vec<T>) -> Self {
        Segment::from_vec(items)
    }
}

// A ring buffer may wrap, so it goes through the element loop.
impl<T> CollectionShape<T> for VecDeque<T> {
    fn element_count(&self) -> usize {
        self.len()
    }

    fn write_with<C: ElementCodec<T>>(&self, parser: &CollectionParser<T, C>, dst: &mut [u8]) -> Result<usize> {
        parser.write_exact(self.iter(), dst)
    }

    fn write_with_to<C: ElementCodec<T>>(
        &self,
        parser: &CollectionParser<T, C>,
        dst: &mut dyn Write,
    ) -> Result<usize> {
        parser.write_exact_to(self.iter(), dst)
    }

    fn from_items(items: Vec<T>) -> Self {
        VecDeque::from(items)
    }
}

macro_rules! shape_parsers {
    ($($shape:ty),* $(,)?) => {$(
        impl<T, C: ElementCodec<T>> BinaryParser<$shape> for CollectionParser<T, C> {
            fn is_variable_size(&self) -> bool {
                true
            }

            fn minimum_size(&self) -> usize {
                1
            }

            fn encoded_size(&self, value: &$shape) -> usize {
                self.encoded_len(value.element_count())
            }

            fn write(&self, value: &$shape, dst: &mut [u8]) -> Result<usize> {
                value.write_with(self, dst)
            }

            fn write_to(&self, value: &$shape, dst: &mut dyn Write) -> Result<usize> {
                value.write_with_to(self, dst)
            }

            fn read(&self, src: &[u8]) -> Result<($shape, usize)> {
                match self.read_vec(src)? {
                    (Some(items), consumed) => Ok((CollectionShape::from_items(items), consumed)),
                    (None, consumed) => Err(SerialError::UnexpectedNull { consumed }),
                }
            }

            fn read_from(&self, src: &mut dyn Read) -> Result<($shape, usize)> {
                match self.read_vec_from(src)? {
                    (Some(items), consumed) => Ok((CollectionShape::from_items(items), consumed)),
                    (None, consumed) => Err(SerialError::UnexpectedNull { consumed }),
                }
            }
        }

        impl<T, C: ElementCodec<T>> BinaryParser<Option<$shape>> for CollectionParser<T, C> {
            fn is_variable_size(&self) -> bool {
                true
            }

            fn minimum_size(&self) -> usize {
                1
            }

            fn encoded_size(&self, value: &Option<$shape>) -> usize {
                value
                    .as_ref()
                    .map_or(1, |items| self.encoded_len(items.element_count()))
            }

            fn write(&self, value: &Option<$shape>, dst: &mut [u8]) -> Result<usize> {
                match value {
                    Some(items) => items.write_with(self, dst),
                    None => self.write_null(dst),
                }
            }

            fn write_to(&self, value: &Option<$shape>, dst: &mut dyn Write) -> Result<usize> {
                match value {
                    Some(items) => items.write_with_to(self, dst),
                    None => self.write_null_to(dst),
                }
            }

            fn read(&self, src: &[u8]) -> Result<(Option<$shape>, usize)> {
                let (items, consumed) = self.read_vec(src)?;
                Ok((items.map(CollectionShape::from_items), consumed))
            }

            fn read_from(&self, src: &mut dyn Read) -> Result<(Option<$shape>, usize)> {
                let (items, consumed) = self.read_vec_from(src)?;
                Ok((items.map(CollectionShape::from_items), consumed))
            }
        }
    )*};
}

shape_parsers!(Vec<T>, Box<[T]>, Arc<[T]>, VecDeque<T>, Segment<T>);
