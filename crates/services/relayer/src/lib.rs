#![deny(clippy::arithmetic_side_effects)]
#![deny(clippy::cast_possible_truncation)]
#![deny(missing_docs)]

//! # Relayer
//! Follows the source chain and submits every new header, with the validator
//! set on epoch boundaries and an optional proof, to the light client on the
//! target chain. Progress is kept in a durable checkpoint so a restarted
//! relayer resumes where it stopped.

pub mod adapters;
mod config;
mod error;
mod payload;
pub mod ports;
pub(crate) mod service;
pub mod signer;
pub mod storage;
pub mod submission;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub use config::Config;
pub use error::RelayError;
pub use payload::RelayPayload;
#[cfg(any(test, feature = "test-helpers"))]
pub use service::new_service_test;
pub use service::{
    RelayState,
    RelayStatus,
    Service,
    SharedState,
    new_service,
};

#[cfg(test)]
lightbridge_trace::enable_tracing!();
