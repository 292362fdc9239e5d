//! JSON-RPC access to the source and target chains.
//!
//! [`RobustClient`] turns an ordered list of endpoints into a single logical
//! endpoint. Transient failures are retried with exponential [`Backoff`] and
//! fail over to the next endpoint, while permanent failures are returned to
//! the caller as they are.

#![deny(clippy::arithmetic_side_effects)]
#![deny(clippy::cast_possible_truncation)]

pub mod backoff;
pub mod client;
pub mod config;
pub mod error;
pub mod transport;

pub use backoff::{
    Backoff,
    BackoffMaker,
};
pub use client::RobustClient;
pub use config::{
    ChainMethods,
    RpcConfig,
};
pub use error::RpcError;
pub use transport::{
    HttpTransport,
    Transport,
};

#[cfg(any(test, feature = "test-helpers"))]
pub use transport::MockTransport;
