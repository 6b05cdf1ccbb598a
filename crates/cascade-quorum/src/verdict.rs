//! Quorum evaluation as a pure function.
//!
//! Evaluation takes a message hash, the signer claims and a view of the
//! current slot owners, and returns a tally. It has no side effects: the
//! wallet decides what to do with the verdict.
//!
//! # Claim Rules
//!
//! - every claimed slot must currently be filled
//! - a slot may appear at most once
//! - a claim whose recovered signer isn't the slot owner is discarded, not
//!   fatal; it just doesn't count toward the majority

use crate::error::QuorumError;
use crate::identity::Address;
use crate::signature::{recover, LeaderSignature, MessageHash};
use crate::threshold::{majority_threshold, votes_needed};
use std::collections::HashSet;

/// Outcome of a quorum check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuorumVerdict {
    /// Strict majority of current members signed
    Approved { votes: usize, threshold: usize },
    /// Not enough valid signer pairs
    Insufficient { votes: usize, needed: usize },
}

impl QuorumVerdict {
    /// Whether the action may proceed.
    pub fn is_approved(&self) -> bool {
        matches!(self, QuorumVerdict::Approved { .. })
    }
}

/// Per-claim result of an evaluation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuorumTally {
    /// Filled slots at evaluation time
    pub members: usize,
    /// Slots whose owner produced a valid signature
    pub accepted: Vec<u64>,
    /// Slots whose signature didn't recover to the owner
    pub rejected: Vec<u64>,
}

impl QuorumTally {
    /// Valid signer pairs.
    pub fn votes(&self) -> usize {
        self.accepted.len()
    }

    /// Turn the tally into a verdict against the live member count.
    pub fn verdict(&self) -> QuorumVerdict {
        let votes = self.votes();
        let threshold = majority_threshold(self.members);
        if votes >= threshold {
            QuorumVerdict::Approved { votes, threshold }
        } else {
            QuorumVerdict::Insufficient {
                votes,
                needed: votes_needed(votes, self.members),
            }
        }
    }
}

/// Evaluate signer claims for `hash`.
///
/// `owner_of` returns the current owner of a filled slot, or `None` if the
/// slot isn't filled. `members` is the live filled-slot count.
pub fn evaluate<F>(
    hash: &MessageHash,
    slot_ids: &[u64],
    signatures: &[LeaderSignature],
    members: usize,
    owner_of: F,
) -> Result<QuorumTally, QuorumError>
where
    F: Fn(u64) -> Option<Address>,
{
    if slot_ids.len() != signatures.len() {
        return Err(QuorumError::LengthMismatch {
            slots: slot_ids.len(),
            signatures: signatures.len(),
        });
    }

    let mut seen = HashSet::with_capacity(slot_ids.len());
    let mut owners = Vec::with_capacity(slot_ids.len());
    for &slot_id in slot_ids {
        if !seen.insert(slot_id) {
            return Err(QuorumError::DuplicateSlot(slot_id));
        }
        let owner = owner_of(slot_id).ok_or(QuorumError::UnfilledSlot(slot_id))?;
        owners.push(owner);
    }

    let mut tally = QuorumTally {
        members,
        ..QuorumTally::default()
    };
    for ((&slot_id, owner), sig) in slot_ids.iter().zip(owners).zip(signatures) {
        if recover(hash, sig) == Some(owner) {
            tally.accepted.push(slot_id);
        } else {
            tally.rejected.push(slot_id);
        }
    }

    Ok(tally)
}
