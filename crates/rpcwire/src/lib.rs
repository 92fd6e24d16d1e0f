//! Binary RPC wire format.
//!
//! rpcwire encodes RPC arguments compactly and carves messages out of
//! fragmented byte streams.
//!
//! # Crate Structure
//!
//! - [`serial`]: Length headers, typed parsers, the parser registry, and
//!   bulk codecs for plain-old-data collections
//! - [`frame`]: Message envelopes, the contiguous receive buffer, and
//!   blocking/async read and write pumps

/// Re-export serialization types.
pub mod serial {
    pub use rpcwire_serial::*;
}

/// Re-export framing types.
pub mod frame {
    pub use rpcwire_frame::*;
}
