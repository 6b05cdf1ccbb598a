//! Escrow balances.
//!
//! Evicted leaders and contributors who don't make the board hold their
//! stake here as a transferable credit. Escrow can later be spent to contest
//! the lowest slot or to top up a slot.
//!
//! Every change records the entry's prior balance. [`EscrowLedger::rollback`]
//! undoes changes back to a [`EscrowLedger::checkpoint`] in time proportional
//! to what changed; [`EscrowLedger::commit`] forgets the record.

use crate::error::{Error, Result};
use crate::math::Amount;
use cascade_quorum::Address;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-address fungible credit.
///
/// Entries are created on first credit and never removed; zero is a valid
/// resting balance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EscrowLedger {
    balances: HashMap<Address, Amount>,
    total_supply: Amount,
    /// Prior balances of changed entries, oldest first
    #[serde(skip)]
    undo: Vec<(Address, Option<Amount>)>,
}

impl EscrowLedger {
    /// Create empty escrow.
    pub fn new() -> Self {
        Self::default()
    }

    /// Balance of an address (zero if never credited).
    pub fn balance_of(&self, account: &Address) -> Amount {
        self.balances.get(account).copied().unwrap_or(0)
    }

    /// Sum of all balances.
    pub fn total_supply(&self) -> Amount {
        self.total_supply
    }

    /// Credit an address.
    pub fn credit(&mut self, account: Address, amount: Amount) -> Result<()> {
        let total = self.total_supply.checked_add(amount).ok_or(Error::Overflow)?;
        let prior = self.balances.get(&account).copied();
        let credited = prior.unwrap_or(0).checked_add(amount).ok_or(Error::Overflow)?;
        self.undo.push((account, prior));
        self.balances.insert(account, credited);
        self.total_supply = total;
        Ok(())
    }

    /// Debit an address.
    pub fn debit(&mut self, account: &Address, amount: Amount) -> Result<()> {
        let available = self.balance_of(account);
        if available < amount {
            return Err(Error::InsufficientEscrow {
                needed: amount,
                available,
            });
        }
        if let Some(balance) = self.balances.get_mut(account) {
            self.undo.push((*account, Some(*balance)));
            *balance -= amount;
        }
        self.total_supply -= amount;
        Ok(())
    }

    /// Zero an address's balance and return what it held.
    pub fn take(&mut self, account: &Address) -> Amount {
        match self.balances.get_mut(account) {
            Some(balance) => {
                self.undo.push((*account, Some(*balance)));
                let taken = std::mem::take(balance);
                self.total_supply -= taken;
                taken
            }
            None => 0,
        }
    }

    /// Move credit between addresses.
    pub fn transfer(&mut self, from: &Address, to: Address, amount: Amount) -> Result<()> {
        self.debit(from, amount)?;
        self.credit(to, amount)
    }

    /// Position in the undo record to roll back to.
    pub fn checkpoint(&self) -> usize {
        self.undo.len()
    }

    /// Undo every change made since `checkpoint`.
    pub fn rollback(&mut self, checkpoint: usize) {
        while self.undo.len() > checkpoint {
            let Some((account, prior)) = self.undo.pop() else {
                break;
            };
            let current = match prior {
                Some(balance) => self.balances.insert(account, balance),
                None => self.balances.remove(&account),
            }
            .unwrap_or(0);
            self.total_supply = self.total_supply - current + prior.unwrap_or(0);
        }
    }

    /// Drop the undo record. Earlier checkpoints become invalid.
    pub fn commit(&mut self) {
        self.undo.clear();
    }

    /// Iterate over all known balances.
    pub fn balances(&self) -> impl Iterator<Item = (&Address, &Amount)> {
        self.balances.iter()
    }

    /// Number of addresses ever credited.
    pub fn len(&self) -> usize {
        self.balances.len()
    }

    /// Check if no address was ever credited.
    pub fn is_empty(&self) -> bool {
        self.balances.is_empty()
    }
}
