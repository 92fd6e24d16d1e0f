/// Errors that can occur while encoding or decoding values.
#[derive(Debug, thiserror::Error)]
pub enum SerialError {
    /// The source ran out before a complete length header was read.
    #[error("truncated length header ({available} of {needed} bytes available)")]
    TruncatedHeader { needed: usize, available: usize },

    /// A collection length does not fit the wire format.
    #[error("collection length {0} exceeds the encodable maximum")]
    InvalidLength(u64),

    /// A buffer-addressed read or write would cross the provided bound.
    #[error("buffer overflow ({needed} bytes needed, {available} available)")]
    BufferOverflow { needed: usize, available: usize },

    /// The underlying stream returned fewer bytes than a length-prefixed read declared.
    #[error("truncated stream (expected {expected} bytes, got {actual}; {consumed} bytes consumed)")]
    TruncatedStream {
        expected: usize,
        actual: usize,
        consumed: usize,
    },

    /// A caller-supplied fixed destination cannot hold the decoded elements.
    ///
    /// `consumed` is the size of the whole encoding, so the caller can skip it.
    #[error("destination too small ({required} elements, capacity {capacity}; encoding spans {consumed} bytes)")]
    DestinationTooSmall {
        required: usize,
        capacity: usize,
        consumed: usize,
    },

    /// A null collection was decoded into a shape that cannot represent absence.
    #[error("null collection decoded into a non-optional value")]
    UnexpectedNull { consumed: usize },

    /// An iterator yielded a different number of elements than it declared.
    #[error("length mismatch (declared {declared} elements, produced {actual})")]
    LengthMismatch { declared: usize, actual: usize },

    /// Wire bytes do not form a valid value of the target type.
    #[error("invalid {type_name} value: {reason}")]
    InvalidValue {
        type_name: &'static str,
        reason: String,
    },

    /// No parser could be resolved for the requested type.
    #[error("no binary parser registered for type {0}")]
    UnsupportedType(&'static str),

    /// The type already has a resolved parser; bindings are never replaced.
    #[error("parser for type {0} is already bound")]
    AlreadyBound(&'static str),

    /// An I/O error occurred on the underlying stream.
    #[error("serial I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SerialError {
    /// Shift the consumed-byte count of progress-carrying errors by `prefix`.
    ///
    /// Nested reads report what they consumed themselves; the caller adds
    /// what it consumed before delegating.
    pub fn consumed_after(self, prefix: usize) -> Self {
        match self {
            Self::TruncatedStream {
                expected,
                actual,
                consumed,
            } => Self::TruncatedStream {
                expected,
                actual,
                consumed: consumed.saturating_add(prefix),
            },
            Self::DestinationTooSmall {
                required,
                capacity,
                consumed,
            } => Self::DestinationTooSmall {
                required,
                capacity,
                consumed: consumed.saturating_add(prefix),
            },
            Self::UnexpectedNull { consumed } => Self::UnexpectedNull {
                consumed: consumed.saturating_add(prefix),
            },
            other => other,
        }
    }

    /// Bytes consumed before the error, when the error tracks it.
    pub fn consumed(&self) -> Option<usize> {
        match self {
            Self::TruncatedStream { consumed, .. }
            | Self::DestinationTooSmall { consumed, .. }
            | Self::UnexpectedNull { consumed } => Some(*consumed),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, SerialError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consumed_after_accumulates_prefix() {
        let err = SerialError::TruncatedStream {
            expected: 8,
            actual: 3,
            consumed: 3,
        }
        .consumed_after(5);
        assert_eq!(err.consumed(), Some(8));
    }

    #[test]
    fn consumed_after_leaves_other_errors() {
        let err = SerialError::UnsupportedType("Foo").consumed_after(5);
        assert!(matches!(err, SerialError::UnsupportedType("Foo")));
        assert_eq!(err.consumed(), None);
    }
}
