//! Error types for cascade-ledger.

use crate::math::Amount;
use cascade_quorum::{Address, QuorumError};
use thiserror::Error;

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in ledger operations.
///
/// Every variant aborts the operation that produced it and the engine rolls
/// back to the state before the call. `PaymentDeliveryFailed` is the one
/// condition the ledger swallows on push-payments.
#[derive(Debug, Error)]
pub enum Error {
    /// Amount must be non-zero
    #[error("amount must be greater than zero")]
    ZeroAmount,

    /// Slot id does not reference a filled slot
    #[error("invalid slot: {0}")]
    InvalidSlot(u64),

    /// Escrow balance too low
    #[error("insufficient escrow: need {needed}, have {available}")]
    InsufficientEscrow { needed: Amount, available: Amount },

    /// Wrong caller for an owner-gated or wallet-gated operation
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Nonce is not the wallet's next expected nonce
    #[error("replayed nonce: expected {expected}, got {got}")]
    ReplayedNonce { expected: u64, got: u64 },

    /// Not a strict majority of current leaders
    #[error("insufficient votes: have {votes}, need {needed} more")]
    InsufficientVotes { votes: usize, needed: usize },

    /// Recipient refused or failed to accept a value transfer
    #[error("payment delivery to {recipient} failed: {reason}")]
    PaymentDeliveryFailed { recipient: Address, reason: String },

    /// Native balance too low to attach a value
    #[error("insufficient funds on {account}: need {needed}, have {available}")]
    InsufficientFunds {
        account: Address,
        needed: Amount,
        available: Amount,
    },

    /// Value attached to an operation that doesn't accept it
    #[error("operation does not accept value")]
    NonPayable,

    /// No ledger instance at this address
    #[error("unknown instance: {0}")]
    UnknownInstance(Address),

    /// No governance wallet at this address
    #[error("unknown wallet: {0}")]
    UnknownWallet(Address),

    /// Nested calls went deeper than the configured bound
    #[error("call depth exceeded (max {0})")]
    CallDepthExceeded(usize),

    /// Slot ids and signatures don't pair up
    #[error("malformed claims: {slots} slots, {signatures} signatures")]
    MalformedClaims { slots: usize, signatures: usize },

    /// Arithmetic overflow
    #[error("arithmetic overflow")]
    Overflow,

    /// Configuration error
    #[error("config error: {0}")]
    Config(String),

    /// Binary encoding error
    #[error("encoding error: {0}")]
    Encoding(#[from] bincode::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<QuorumError> for Error {
    fn from(e: QuorumError) -> Self {
        match e {
            QuorumError::LengthMismatch { slots, signatures } => {
                Error::MalformedClaims { slots, signatures }
            }
            QuorumError::DuplicateSlot(id) | QuorumError::UnfilledSlot(id) => Error::InvalidSlot(id),
        }
    }
}
