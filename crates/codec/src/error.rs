/// Reasons a value cannot be encoded or a byte sequence is not a valid
/// encoding.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// The input ended inside a value.
    #[error("input truncated: a read needed {needed} bytes, {remaining} remaining")]
    TruncatedInput {
        /// Bytes the read required.
        needed: usize,
        /// Bytes that were left.
        remaining: usize,
    },
    /// The input or the encoding is longer than the codec handles.
    #[error("{len} bytes exceed the limit of {limit}")]
    InvalidLength {
        /// Length of the input or the encoding.
        len: usize,
        /// The maximum length.
        limit: usize,
    },
    /// A complete value was followed by unconsumed input.
    #[error("{remaining} unexpected bytes after the encoded value")]
    TrailingBytes {
        /// Bytes left over.
        remaining: usize,
    },
    /// The bytes are not a value of the type, e.g. an unknown enum tag.
    #[error("invalid encoding: {0}")]
    InvalidData(String),
    /// The value has no encoding, e.g. a sequence longer than `u32::MAX`.
    #[error("value cannot be encoded: {0}")]
    Unencodable(String),
}
