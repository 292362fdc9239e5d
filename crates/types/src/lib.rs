//! The crate `lightbridge-types` contains plain rust common type used by the relayer crates.
//! It mainly holds the source-chain state that is relayed to the target chain light client
//! and the bookkeeping records the relayer keeps about its own progress.

#![deny(clippy::arithmetic_side_effects)]
#![deny(clippy::cast_possible_truncation)]
#![deny(missing_docs)]

pub mod blockchain;
pub mod entities;
#[cfg(feature = "serde")]
pub mod serde_helpers;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub use blockchain::primitives::{
    BlockHeight,
    Bytes32,
    EpochId,
};
