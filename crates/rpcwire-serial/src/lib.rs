//! Compact binary encoding of RPC call arguments and return values.
//!
//! Every value crosses the wire through a [`BinaryParser`] resolved from a
//! [`Serializer`] registry. Collections share one encoding:
//! - A 1-byte flag: low 2 bits select the length width (0, 1, 2 or 4 bytes),
//!   the high bit marks a null collection
//! - The little-endian element count, in the width the flag selected
//! - The elements, back to back, in little-endian wire layout
//!
//! Fixed-layout ("unmanaged") element types take a block-copy fast path.

pub mod collection;
pub mod error;
pub mod header;
pub mod layout;
pub mod parser;
pub mod registry;
pub mod staging;
pub mod unmanaged;

pub use collection::{CollectionParser, ElementCodec, FillMode, ReadOutcome, Segment};
pub use error::{Result, SerialError};
pub use header::{
    read_header, read_header_from, write_header, write_header_to, LengthHeader, MAX_HEADER_SIZE,
    MAX_LENGTH, NULL_FLAG,
};
pub use layout::ByteOrder;
pub use parser::{BinaryParser, BytesParser, ScalarParser, Utf8Parser};
pub use registry::{ErasedParser, ParserFactory, Resolution, Serializer, SerializerConfig, TypeKey};
pub use staging::{StagingConfig, StagingPolicy, StagingTier};
pub use unmanaged::{BlockCopyCodec, CollectionFactory, ConvertCodec, ConvertFns};
