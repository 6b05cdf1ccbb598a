//! Leader Quorum for Cascade Ledgers
//!
//! A governance wallet acts only when a **strict majority** of the current
//! leaderboard co-signs. This crate holds the pieces of that check that have
//! no side effects:
//!
//! - [`Address`]: fixed-width account identity
//! - [`sign`] / [`recover`]: prefixed ed25519 signatures with signer recovery
//! - [`majority_threshold`]: `floor(n / 2) + 1` of the live member count
//! - [`evaluate`]: pure `(hash, claims, owners) -> tally` evaluation
//!
//! # Live Threshold
//!
//! Members sign before the final slot count is known. The threshold is
//! therefore taken at execution time:
//! - 4 members → 3 required
//! - 12 members → 7 required
//!
//! The same signatures can pass against a small leaderboard and fail once it
//! grows.

mod error;
mod identity;
mod signature;
mod threshold;
mod verdict;

pub use error::QuorumError;
pub use identity::Address;
pub use signature::{recover, sign, LeaderSignature, MessageHash, SIGNED_MESSAGE_PREFIX};
pub use threshold::{majority_threshold, meets_threshold, votes_needed, DEFAULT_CAPACITY};
pub use verdict::{evaluate, QuorumTally, QuorumVerdict};
