//! The crate `lightbridge-codec` defines the binary layout the light client
//! on the target chain expects for everything the relayer submits.
//!
//! The layout is Borsh, derived on the types with
//! [`BorshSerialize`](borsh::BorshSerialize) and
//! [`BorshDeserialize`](borsh::BorshDeserialize):
//! - fixed-width integers are little-endian;
//! - `bool` and `Option` tags are a single `0` or `1` byte;
//! - fixed-size byte arrays are written raw;
//! - sequences carry a `u32` little-endian element count followed by the
//!   elements in order;
//! - records are their fields in declaration order, without padding or tags.
//!
//! [`decode`] of the output of [`encode`] yields an equal value. Decoding
//! rejects input that stops inside a value or continues after it. Neither
//! direction handles more than [`MAX_ENCODED_LEN`] bytes.

#![deny(clippy::arithmetic_side_effects)]
#![deny(clippy::cast_possible_truncation)]
#![deny(missing_docs)]

mod digest;
mod error;
mod reader;


pub use borsh::{
    BorshDeserialize,
    BorshSerialize,
};
pub use digest::payload_hash;
pub use error::CodecError;

use reader::TrackingReader;

/// Largest encoding the codec produces or accepts. Longer inputs fail with
/// [`CodecError::InvalidLength`].
pub const MAX_ENCODED_LEN: usize = 16 * 1024 * 1024;

fn check_len(len: usize) -> Result<(), CodecError> {
    if len > MAX_ENCODED_LEN {
        return Err(CodecError::InvalidLength {
            len,
            limit: MAX_ENCODED_LEN,
        })
    }
    Ok(())
}

/// Encodes `value` into a fresh buffer.
pub fn encode<T>(value: &T) -> Result<Vec<u8>, CodecError>
where
    T: BorshSerialize + ?Sized,
{
    let bytes =
        borsh::to_vec(value).map_err(|err| CodecError::Unencodable(err.to_string()))?;
    check_len(bytes.len())?;
    Ok(bytes)
}

/// Decodes a `T` that must span the whole of `bytes`.
pub fn decode<T>(bytes: &[u8]) -> Result<T, CodecError>
where
    T: BorshDeserialize,
{
    check_len(bytes.len())?;
    let mut reader = TrackingReader::new(bytes);
    let value = match T::deserialize_reader(&mut reader) {
        Ok(value) => value,
        Err(err) => {
            return Err(match reader.shortfall() {
                Some((needed, remaining)) => {
                    CodecError::TruncatedInput { needed, remaining }
                }
                None => CodecError::InvalidData(err.to_string()),
            })
        }
    };
    let remaining = reader.remaining();
    if remaining != 0 {
        return Err(CodecError::TrailingBytes { remaining })
    }
    Ok(value)
}
