//! Error types for cascade-quorum.

use thiserror::Error;

/// Errors that make a signer claim set malformed.
///
/// A signature that merely fails to recover to the slot owner is not an
/// error; it is counted as rejected in the tally.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuorumError {
    /// Slot ids and signatures must pair up one-to-one.
    #[error("claim length mismatch: {slots} slots, {signatures} signatures")]
    LengthMismatch { slots: usize, signatures: usize },

    /// The same slot was claimed twice.
    #[error("slot {0} claimed more than once")]
    DuplicateSlot(u64),

    /// The claimed slot isn't currently filled.
    #[error("slot {0} is not filled")]
    UnfilledSlot(u64),
}
