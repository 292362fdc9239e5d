//! Higher level domain types

pub mod checkpoint;
pub mod proof;
pub mod submission;
pub mod transaction;

pub use checkpoint::{
    InFlightSubmission,
    RelayCheckpoint,
    RelayDirection,
    RelayedHeader,
};
pub use proof::{
    Proof,
    ProofKind,
};
pub use submission::{
    Receipt,
    SubmissionRecord,
    SubmissionStatus,
    TransactionOutcome,
    TransactionReceipt,
};
pub use transaction::{
    SignedTransaction,
    UnsignedTransaction,
};
