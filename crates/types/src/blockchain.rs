//! Source-chain blockchain types

pub mod header;
pub mod primitives;
pub mod validators;
