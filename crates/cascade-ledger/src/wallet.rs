//! Governance wallets.
//!
//! A wallet holds value and acts for an instance when a strict majority of
//! that instance's current leaders sign the same [`LeaderTransaction`].
//!
//! # Message Hash
//!
//! ```text
//! H = blake3(bincode(target, value, call, nonce))
//! ```
//!
//! Leaders sign the prefixed form of `H` (see [`cascade_quorum::sign`]).
//! Nonces start at 1 and must be used in order, so a signed transaction can
//! be executed at most once.

use crate::call::Call;
use crate::error::{Error, Result};
use crate::math::Amount;
use cascade_quorum::{Address, MessageHash};
use serde::{Deserialize, Serialize};

/// First nonce a fresh wallet accepts.
pub const INITIAL_NONCE: u64 = 1;

/// A call the leaders authorize a wallet to make.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderTransaction {
    pub target: Address,
    pub value: Amount,
    pub call: Call,
    pub nonce: u64,
}

impl LeaderTransaction {
    pub fn new(target: Address, value: Amount, call: Call, nonce: u64) -> Self {
        Self {
            target,
            value,
            call,
            nonce,
        }
    }

    /// Canonical hash the leaders sign.
    pub fn message_hash(&self) -> Result<MessageHash> {
        let encoded = bincode::serialize(&(&self.target, self.value, &self.call, self.nonce))?;
        Ok(MessageHash::of(&encoded))
    }
}

/// Wallet state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GovernanceWallet {
    pub address: Address,
    /// Instance whose leaders govern this wallet
    pub ledger: Address,
    next_nonce: u64,
}

impl GovernanceWallet {
    pub fn new(address: Address, ledger: Address) -> Self {
        Self {
            address,
            ledger,
            next_nonce: INITIAL_NONCE,
        }
    }

    /// The only nonce the wallet will accept next.
    pub fn next_nonce(&self) -> u64 {
        self.next_nonce
    }

    pub fn check_nonce(&self, nonce: u64) -> Result<()> {
        if nonce != self.next_nonce {
            return Err(Error::ReplayedNonce {
                expected: self.next_nonce,
                got: nonce,
            });
        }
        Ok(())
    }

    /// Consume the current nonce.
    pub fn advance(&mut self) -> Result<()> {
        self.next_nonce = self.next_nonce.checked_add(1).ok_or(Error::Overflow)?;
        Ok(())
    }
}
