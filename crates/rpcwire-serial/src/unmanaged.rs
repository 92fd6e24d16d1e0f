//! Fast-path element codecs for fixed-layout ("unmanaged") types.
//!
//! Two families:
//! - [`BlockCopyCodec`]: the in-memory layout is the wire layout, so slices
//!   are copied as one block. Hosts with big-endian order reverse each
//!   element's bytes after writing and before reading.
//! - [`ConvertCodec`]: the value goes through a `Pod` wire representation
//!   via four conversion functions. The aligned or unaligned variant is
//!   chosen per call from the target address.

use std::any::TypeId;
use std::io::{Read, Write};
use std::marker::PhantomData;
use std::sync::Arc;

use bytemuck::Pod;

use crate::collection::{staged_write, CollectionParser, ElementCodec, Segment};
use crate::error::{Result, SerialError};
use crate::layout::{as_bytes, as_bytes_mut, is_aligned, swap_element_bytes, ByteOrder};
use crate::parser::BinaryParser;
use crate::registry::{ErasedParser, ParserFactory, Resolution, TypeKey};
use crate::staging::{read_exact_counted, StagingPolicy};

/// Block-copy codec for `Pod` element types.
pub struct BlockCopyCodec<T> {
    order: ByteOrder,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Pod> BlockCopyCodec<T> {
    /// Codec behaving as if the host had byte order `order`.
    pub fn new(order: ByteOrder) -> Self {
        Self {
            order,
            _marker: PhantomData,
        }
    }

    /// Codec for the actual host byte order.
    pub fn with_host_order() -> Self {
        Self::new(ByteOrder::NATIVE)
    }

    pub fn order(&self) -> ByteOrder {
        self.order
    }

    fn fixup(&self, bytes: &mut [u8]) {
        if self.order.needs_swap() {
            swap_element_bytes(bytes, std::mem::size_of::<T>());
        }
    }
}

impl<T: Pod> ElementCodec<T> for BlockCopyCodec<T> {
    fn element_size(&self) -> usize {
        std::mem::size_of::<T>()
    }

    fn encode_one(&self, value: &T, dst: &mut [u8]) {
        dst.copy_from_slice(bytemuck::bytes_of(value));
        self.fixup(dst);
    }

    fn decode_one(&self, src: &[u8]) -> Result<T> {
        let mut value: T = bytemuck::pod_read_unaligned(src);
        self.fixup(bytemuck::bytes_of_mut(&mut value));
        Ok(value)
    }

    fn encode_slice(&self, values: &[T], dst: &mut [u8]) {
        dst.copy_from_slice(as_bytes(values));
        self.fixup(dst);
    }

    fn decode_slice(&self, src: &[u8], dst: &mut [T]) -> Result<()> {
        let raw = as_bytes_mut(dst);
        raw.copy_from_slice(src);
        self.fixup(raw);
        Ok(())
    }

    fn decode_append(&self, src: &[u8], out: &mut Vec<T>) -> Result<()> {
        let start = out.len();
        out.resize(start + src.len() / std::mem::size_of::<T>(), T::zeroed());
        self.decode_slice(src, &mut out[start..])
    }

    fn write_slice_to(
        &self,
        values: &[T],
        dst: &mut dyn Write,
        staging: &StagingPolicy,
    ) -> Result<usize> {
        if self.order.needs_swap() {
            return staged_write(self, values, dst, staging);
        }
        let raw = as_bytes(values);
        dst.write_all(raw)?;
        Ok(raw.len())
    }

    fn read_slice_from(
        &self,
        src: &mut dyn Read,
        dst: &mut [T],
        _staging: &StagingPolicy,
    ) -> Result<usize> {
        let raw = as_bytes_mut(dst);
        read_exact_counted(src, raw)?;
        self.fixup(raw);
        Ok(raw.len())
    }
}

impl<T> Clone for BlockCopyCodec<T> {
    fn clone(&self) -> Self {
        Self {
            order: self.order,
            _marker: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for BlockCopyCodec<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockCopyCodec")
            .field("element", &std::any::type_name::<T>())
            .field("order", &self.order)
            .finish()
    }
}

/// Conversion functions between `T` and its wire bytes.
///
/// The aligned variants are only called with a slice whose address is
/// aligned for the wire type.
pub struct ConvertFns<T> {
    pub write_aligned: fn(&T, &mut [u8]),
    pub write_unaligned: fn(&T, &mut [u8]),
    pub read_aligned: fn(&[u8]) -> Result<T>,
    pub read_unaligned: fn(&[u8]) -> Result<T>,
}

impl<T> Clone for ConvertFns<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ConvertFns<T> {}

const MAX_CONVERT_WIRE_SIZE: usize = 16;

/// Element codec that converts through a `Pod` wire type.
pub struct ConvertCodec<T> {
    fns: ConvertFns<T>,
    wire_size: usize,
    wire_align: usize,
    order: ByteOrder,
}

impl<T> ConvertCodec<T> {
    /// Codec whose wire form is the layout of `W`.
    pub fn for_wire<W: Pod>(fns: ConvertFns<T>, order: ByteOrder) -> Self {
        const { assert!(std::mem::size_of::<W>() <= MAX_CONVERT_WIRE_SIZE) };
        Self {
            fns,
            wire_size: std::mem::size_of::<W>(),
            wire_align: std::mem::align_of::<W>(),
            order,
        }
    }

    pub fn order(&self) -> ByteOrder {
        self.order
    }
}

impl<T> Clone for ConvertCodec<T> {
    fn clone(&self) -> Self {
        Self {
            fns: self.fns,
            wire_size: self.wire_size,
            wire_align: self.wire_align,
            order: self.order,
        }
    }
}

impl<T> ElementCodec<T> for ConvertCodec<T> {
    fn element_size(&self) -> usize {
        self.wire_size
    }

    fn encode_one(&self, value: &T, dst: &mut [u8]) {
        if self.order.needs_swap() {
            (self.fns.write_unaligned)(value, dst);
            swap_element_bytes(dst, self.wire_size);
        } else if is_aligned(dst, self.wire_align) {
            (self.fns.write_aligned)(value, dst);
        } else {
            (self.fns.write_unaligned)(value, dst);
        }
    }

    fn decode_one(&self, src: &[u8]) -> Result<T> {
        if self.order.needs_swap() {
            let mut flipped = [0u8; MAX_CONVERT_WIRE_SIZE];
            let flipped = &mut flipped[..self.wire_size];
            flipped.copy_from_slice(src);
            swap_element_bytes(flipped, self.wire_size);
            (self.fns.read_unaligned)(flipped)
        } else if is_aligned(src, self.wire_align) {
            (self.fns.read_aligned)(src)
        } else {
            (self.fns.read_unaligned)(src)
        }
    }
}

impl<T> std::fmt::Debug for ConvertCodec<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConvertCodec")
            .field("value", &std::any::type_name::<T>())
            .field("wire_size", &self.wire_size)
            .field("order", &self.order)
            .finish()
    }
}

/// Store `wire` in place. Falls back to a byte copy if `dst` turns out
/// not to be aligned.
pub fn store_aligned<W: Pod>(wire: W, dst: &mut [u8]) {
    match bytemuck::try_from_bytes_mut::<W>(dst) {
        Ok(slot) => *slot = wire,
        Err(_) => store_unaligned(wire, dst),
    }
}

pub fn store_unaligned<W: Pod>(wire: W, dst: &mut [u8]) {
    dst.copy_from_slice(bytemuck::bytes_of(&wire));
}

pub fn load_aligned<W: Pod>(src: &[u8]) -> W {
    match bytemuck::try_from_bytes::<W>(src) {
        Ok(value) => *value,
        Err(_) => load_unaligned(src),
    }
}

pub fn load_unaligned<W: Pod>(src: &[u8]) -> W {
    bytemuck::pod_read_unaligned(src)
}

macro_rules! convert_fns {
    ($(#[$doc:meta])* $name:ident: $value:ty => $wire:ty,
     |$v:ident| $to_wire:expr,
     |$w:ident| $from_wire:expr) => {
        $(#[$doc])*
        pub fn $name() -> ConvertFns<$value> {
            fn to_wire($v: &$value) -> $wire {
                $to_wire
            }
            fn from_wire($w: $wire) -> Result<$value> {
                $from_wire
            }
            ConvertFns {
                write_aligned: |value, dst| store_aligned(to_wire(value), dst),
                write_unaligned: |value, dst| store_unaligned(to_wire(value), dst),
                read_aligned: |src| from_wire(load_aligned(src)),
                read_unaligned: |src| from_wire(load_unaligned(src)),
            }
        }
    };
}

fn invalid(type_name: &'static str, reason: impl ToString) -> SerialError {
    SerialError::InvalidValue {
        type_name,
        reason: reason.to_string(),
    }
}

convert_fns!(
    /// `bool` as one byte; any non-zero byte decodes as `true`.
    bool_fns: bool => u8,
    |v| u8::from(*v),
    |w| Ok(w != 0)
);

convert_fns!(
    /// `char` as its `u32` scalar value.
    char_fns: char => u32,
    |v| u32::from(*v),
    |w| char::from_u32(w).ok_or_else(|| invalid("char", format!("{w:#x} is not a scalar value")))
);

convert_fns!(
    /// `usize` as a 64-bit integer regardless of pointer width.
    usize_fns: usize => u64,
    |v| *v as u64,
    |w| usize::try_from(w).map_err(|err| invalid("usize", err))
);

convert_fns!(
    /// `isize` as a 64-bit integer regardless of pointer width.
    isize_fns: isize => i64,
    |v| *v as i64,
    |w| isize::try_from(w).map_err(|err| invalid("isize", err))
);

/// Factory answering every collection shape of one element type.
pub struct CollectionFactory<T, C> {
    parser: Arc<CollectionParser<T, C>>,
}

impl<T, C> CollectionFactory<T, C>
where
    T: 'static,
    C: ElementCodec<T> + 'static,
{
    pub fn new(parser: CollectionParser<T, C>) -> Self {
        Self {
            parser: Arc::new(parser),
        }
    }

    fn erase<S: 'static>(&self) -> ErasedParser
    where
        CollectionParser<T, C>: BinaryParser<S>,
    {
        let parser: Arc<dyn BinaryParser<S>> = self.parser.clone();
        ErasedParser::new(parser)
    }
}

impl<T, C> ParserFactory for CollectionFactory<T, C>
where
    T: 'static,
    C: ElementCodec<T> + 'static,
{
    fn create(&self, key: &TypeKey) -> Option<Resolution> {
        let id = key.id();
        let parser = if id == TypeId::of::<Vec<T>>() {
            self.erase::<Vec<T>>()
        } else if id == TypeId::of::<Option<Vec<T>>>() {
            self.erase::<Option<Vec<T>>>()
        } else if id == TypeId::of::<Box<[T]>>() {
            self.erase::<Box<[T]>>()
        } else if id == TypeId::of::<Option<Box<[T]>>>() {
            self.erase::<Option<Box<[T]>>>()
        } else if id == TypeId::of::<Arc<[T]>>() {
            self.erase::<Arc<[T]>>()
        } else if id == TypeId::of::<Option<Arc<[T]>>>() {
            self.erase::<Option<Arc<[T]>>>()
        } else if id == TypeId::of::<std::collections::VecDeque<T>>() {
            self.erase::<std::collections::VecDeque<T>>()
        } else if id == TypeId::of::<Option<std::collections::VecDeque<T>>>() {
            self.erase::<Option<std::collections::VecDeque<T>>>()
        } else if id == TypeId::of::<Segment<T>>() {
            self.erase::<Segment<T>>()
        } else if id == TypeId::of::<Option<Segment<T>>>() {
            self.erase::<Option<Segment<T>>>()
        } else {
            return None;
        };
        Some(Resolution {
            parser,
            cache: true,
        })
    }
}

impl<T, C> std::fmt::Debug for CollectionFactory<T, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionFactory")
            .field("element", &std::any::type_name::<T>())
            .finish()
    }
}
