//! Ranked leaderboard with proportional distribution.
//!
//! The leaderboard holds up to `capacity` slots. Each incoming contribution
//! is split across the current slots in proportion to their stake, then the
//! contributor either tops up their own slot or runs a reorg against the
//! lowest slot.
//!
//! # Distribution
//!
//! ```text
//! payout_shares = contribution_total − reinvested_total
//! share_i       = amount × contribution_i / payout_shares
//! ```
//!
//! Non-reinvesting slots get `share_i` pushed to their recipient.
//! Reinvesting slots add `share_i` to their own stake instead. Both kinds
//! divide by `payout_shares`, so reinvesting slots grow faster than their
//! plain weight; the payouts to non-reinvesting slots still sum to `amount`.
//!
//! # Reorg
//!
//! When the board is full, a newcomer's stake is `amount + escrow`. If it
//! beats the lowest slot (ties go to the lowest index), the lowest owner is
//! evicted: their stake becomes escrow and the newcomer takes the slot with
//! a cleared reinvest flag. Otherwise `amount` is credited to the
//! newcomer's escrow.
//!
//! This module is pure state. It returns [`Payout`]s; the engine moves the
//! value after every counter here is already updated.

use crate::error::{Error, Result};
use crate::escrow::EscrowLedger;
use crate::math::{mul_div, Amount};
use cascade_quorum::Address;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Slot index on the leaderboard.
pub type SlotId = u64;

/// One ranked leaderboard position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub id: SlotId,
    pub owner: Address,
    /// Payout target, defaults to the owner
    pub recipient: Address,
    pub contribution: Amount,
    pub reinvest: bool,
}

impl Slot {
    fn new(id: SlotId, owner: Address, contribution: Amount) -> Self {
        Self {
            id,
            owner,
            recipient: owner,
            contribution,
            reinvest: false,
        }
    }
}

/// A value transfer the engine must attempt on the ledger's behalf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Payout {
    pub slot_id: SlotId,
    pub recipient: Address,
    pub amount: Amount,
}

/// Where a contribution's stake ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    /// Slot 0 filled at creation
    Seeded { slot_id: SlotId },
    /// Contributor already held a slot
    ToppedUp { slot_id: SlotId },
    /// A free slot was filled
    Filled { slot_id: SlotId },
    /// The lowest slot was taken over
    Evicted {
        slot_id: SlotId,
        evicted: Address,
        refunded: Amount,
        stake: Amount,
    },
    /// Stake wasn't enough; credited to escrow
    Escrowed { credited: Amount, balance: Amount },
}

/// Result of [`LeaderboardLedger::contribute`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContributionOutcome {
    /// Pushes to attempt, in slot order
    pub payouts: Vec<Payout>,
    /// Total added to reinvesting slots
    pub reinvested: Amount,
    pub placement: Placement,
}

/// State captured by [`LeaderboardLedger::checkpoint`].
#[derive(Debug, Clone)]
pub struct BoardCheckpoint {
    slots: Vec<Slot>,
    contribution_total: Amount,
    reinvested_total: Amount,
    escrow: usize,
}

/// The leaderboard state of one instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardLedger {
    name: String,
    symbol: String,
    capacity: usize,
    slots: Vec<Slot>,
    contribution_total: Amount,
    reinvested_total: Amount,
    escrow: EscrowLedger,
}

impl LeaderboardLedger {
    /// Create an empty leaderboard.
    pub fn new(name: impl Into<String>, symbol: impl Into<String>, capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::Config("leaderboard capacity must be at least 1".into()));
        }
        Ok(Self {
            name: name.into(),
            symbol: symbol.into(),
            capacity,
            slots: Vec::with_capacity(capacity),
            contribution_total: 0,
            reinvested_total: 0,
            escrow: EscrowLedger::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of filled slots.
    pub fn filled(&self) -> usize {
        self.slots.len()
    }

    pub fn is_full(&self) -> bool {
        self.slots.len() >= self.capacity
    }

    /// Whether the seeding contribution has happened.
    pub fn is_seeded(&self) -> bool {
        !self.slots.is_empty()
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn slot(&self, slot_id: SlotId) -> Option<&Slot> {
        self.slots.get(usize::try_from(slot_id).ok()?)
    }

    pub fn owner_of(&self, slot_id: SlotId) -> Option<Address> {
        self.slot(slot_id).map(|s| s.owner)
    }

    pub fn recipient_of(&self, slot_id: SlotId) -> Option<Address> {
        self.slot(slot_id).map(|s| s.recipient)
    }

    pub fn contribution_of(&self, slot_id: SlotId) -> Result<Amount> {
        self.filled_slot(slot_id).map(|s| s.contribution)
    }

    pub fn is_reinvested(&self, slot_id: SlotId) -> Result<bool> {
        self.filled_slot(slot_id).map(|s| s.reinvest)
    }

    pub fn contribution_total(&self) -> Amount {
        self.contribution_total
    }

    pub fn reinvested_total(&self) -> Amount {
        self.reinvested_total
    }

    /// The first slot owned by `account`.
    pub fn slot_of(&self, account: &Address) -> Option<SlotId> {
        self.slots.iter().find(|s| s.owner == *account).map(|s| s.id)
    }

    /// How many slots `account` owns.
    pub fn slots_held(&self, account: &Address) -> usize {
        self.slots.iter().filter(|s| s.owner == *account).count()
    }

    /// Lowest slot by contribution; ties go to the lowest index.
    pub fn lowest_slot(&self) -> Option<(SlotId, Amount)> {
        let mut lowest: Option<&Slot> = None;
        for slot in &self.slots {
            match lowest {
                Some(l) if slot.contribution >= l.contribution => {}
                _ => lowest = Some(slot),
            }
        }
        lowest.map(|s| (s.id, s.contribution))
    }

    pub fn escrow(&self) -> &EscrowLedger {
        &self.escrow
    }

    pub fn escrow_balance_of(&self, account: &Address) -> Amount {
        self.escrow.balance_of(account)
    }

    /// Transfer escrow credit between holders.
    pub fn transfer_escrow(&mut self, from: &Address, to: Address, amount: Amount) -> Result<()> {
        self.escrow.transfer(from, to, amount)
    }

    /// Recompute both totals from the slots and compare.
    pub fn totals_consistent(&self) -> bool {
        let total: Option<Amount> = self
            .slots
            .iter()
            .try_fold(0, |acc: Amount, s| acc.checked_add(s.contribution));
        let reinvested: Option<Amount> = self
            .slots
            .iter()
            .filter(|s| s.reinvest)
            .try_fold(0, |acc: Amount, s| acc.checked_add(s.contribution));
        total == Some(self.contribution_total) && reinvested == Some(self.reinvested_total)
    }

    // --- Undo ---

    /// Capture the slots and totals. Escrow is tracked by its own undo
    /// record, so this is O(slots).
    pub fn checkpoint(&self) -> BoardCheckpoint {
        BoardCheckpoint {
            slots: self.slots.clone(),
            contribution_total: self.contribution_total,
            reinvested_total: self.reinvested_total,
            escrow: self.escrow.checkpoint(),
        }
    }

    pub fn rollback(&mut self, checkpoint: BoardCheckpoint) {
        self.slots = checkpoint.slots;
        self.contribution_total = checkpoint.contribution_total;
        self.reinvested_total = checkpoint.reinvested_total;
        self.escrow.rollback(checkpoint.escrow);
    }

    /// Forget escrow undo history once no checkpoint is outstanding.
    pub fn commit(&mut self) {
        self.escrow.commit();
    }

    // --- Contribution ---

    /// Fill slot 0 without distribution.
    ///
    /// A zero `amount` is allowed: an instance created without funds still
    /// gives its creator slot 0, with no stake.
    pub fn seed(&mut self, sender: Address, amount: Amount) -> Result<Placement> {
        if self.is_seeded() {
            return Err(Error::Unauthorized("leaderboard already seeded".into()));
        }
        self.slots.push(Slot::new(0, sender, amount));
        self.contribution_total = amount;
        Ok(Placement::Seeded { slot_id: 0 })
    }

    /// Apply a contribution: distribute across current slots, then place the
    /// sender's stake.
    ///
    /// Weights come from the slots as they were before this contribution.
    pub fn contribute(&mut self, sender: Address, amount: Amount) -> Result<ContributionOutcome> {
        if amount == 0 {
            return Err(Error::ZeroAmount);
        }
        if !self.is_seeded() {
            let placement = self.seed(sender, amount)?;
            return Ok(ContributionOutcome {
                payouts: Vec::new(),
                reinvested: 0,
                placement,
            });
        }

        let (payouts, reinvested) = self.split_with_reinvestment(amount)?;

        let placement = match self.slot_of(&sender) {
            Some(slot_id) => {
                self.credit_slot(slot_id, amount)?;
                Placement::ToppedUp { slot_id }
            }
            None => self.reorg(sender, amount)?,
        };

        Ok(ContributionOutcome {
            payouts,
            reinvested,
            placement,
        })
    }

    fn split_with_reinvestment(&mut self, amount: Amount) -> Result<(Vec<Payout>, Amount)> {
        let payout_shares = self.contribution_total - self.reinvested_total;
        if payout_shares == 0 {
            // Everyone reinvests, or nobody holds stake: nothing to divide by
            return Ok((Vec::new(), 0));
        }

        let shares = self
            .slots
            .iter()
            .map(|s| mul_div(amount, s.contribution, payout_shares).ok_or(Error::Overflow))
            .collect::<Result<Vec<_>>>()?;

        let mut payouts = Vec::with_capacity(self.slots.len());
        let mut reinvested: Amount = 0;
        for (index, share) in shares.into_iter().enumerate() {
            if share == 0 {
                continue;
            }
            let slot = &self.slots[index];
            if slot.reinvest {
                let slot_id = slot.id;
                self.credit_slot(slot_id, share)?;
                reinvested = reinvested.checked_add(share).ok_or(Error::Overflow)?;
            } else {
                payouts.push(Payout {
                    slot_id: slot.id,
                    recipient: slot.recipient,
                    amount: share,
                });
            }
        }
        Ok((payouts, reinvested))
    }

    /// Shares of `amount` by `contribution / contribution_total`, ignoring
    /// reinvestment. Nothing is mutated.
    pub fn proportional_payouts(&self, amount: Amount) -> Result<Vec<Payout>> {
        if self.contribution_total == 0 {
            return Ok(Vec::new());
        }
        let mut payouts = Vec::with_capacity(self.slots.len());
        for slot in &self.slots {
            let share = mul_div(amount, slot.contribution, self.contribution_total).ok_or(Error::Overflow)?;
            if share > 0 {
                payouts.push(Payout {
                    slot_id: slot.id,
                    recipient: slot.recipient,
                    amount: share,
                });
            }
        }
        Ok(payouts)
    }

    /// Place a non-leader's stake: fill a free slot, evict the lowest, or
    /// credit escrow.
    pub fn reorg(&mut self, sender: Address, amount: Amount) -> Result<Placement> {
        if !self.is_full() {
            let slot_id = self.slots.len() as SlotId;
            self.contribution_total = self.contribution_total.checked_add(amount).ok_or(Error::Overflow)?;
            self.slots.push(Slot::new(slot_id, sender, amount));
            return Ok(Placement::Filled { slot_id });
        }

        let Some((slot_id, lowest)) = self.lowest_slot() else {
            return Err(Error::Config("full leaderboard without slots".into()));
        };
        let candidate = amount
            .checked_add(self.escrow.balance_of(&sender))
            .ok_or(Error::Overflow)?;

        if candidate > lowest {
            // Sender's escrow is consumed before the evicted stake is
            // credited, so an owner evicting their own slot keeps it as escrow
            self.escrow.take(&sender);

            let index = slot_id as usize;
            let evicted = self.slots[index].owner;
            if self.slots[index].reinvest {
                self.reinvested_total -= lowest;
            }
            self.contribution_total = (self.contribution_total - lowest)
                .checked_add(candidate)
                .ok_or(Error::Overflow)?;
            self.slots[index] = Slot::new(slot_id, sender, candidate);
            self.escrow.credit(evicted, lowest)?;

            debug!(slot = slot_id, %evicted, incoming = %sender, stake = candidate, "slot evicted");
            Ok(Placement::Evicted {
                slot_id,
                evicted,
                refunded: lowest,
                stake: candidate,
            })
        } else {
            self.escrow.credit(sender, amount)?;
            Ok(Placement::Escrowed {
                credited: amount,
                balance: self.escrow.balance_of(&sender),
            })
        }
    }

    /// Contest the lowest slot with escrow alone.
    pub fn claim_leadership(&mut self, sender: Address) -> Result<Placement> {
        self.reorg(sender, 0)
    }

    /// Move escrow from `caller` into a slot's stake, skipping the reorg
    /// comparison.
    pub fn add_to_leader_contribution_balance(
        &mut self,
        caller: &Address,
        slot_id: SlotId,
        amount: Amount,
    ) -> Result<()> {
        if amount == 0 {
            return Err(Error::ZeroAmount);
        }
        self.filled_slot(slot_id)?;
        self.escrow.debit(caller, amount)?;
        self.credit_slot(slot_id, amount)
    }

    // --- Owner-gated slot settings ---

    /// Forward future payouts of a slot.
    pub fn set_recipient(&mut self, caller: &Address, slot_id: SlotId, recipient: Address) -> Result<()> {
        self.owned_slot_mut(caller, slot_id)?.recipient = recipient;
        Ok(())
    }

    /// Toggle reinvestment. Returns whether anything changed.
    pub fn set_reinvestment(&mut self, caller: &Address, slot_id: SlotId, enabled: bool) -> Result<bool> {
        let slot = self.owned_slot_mut(caller, slot_id)?;
        if slot.reinvest == enabled {
            return Ok(false);
        }
        slot.reinvest = enabled;
        let contribution = slot.contribution;
        if enabled {
            self.reinvested_total = self.reinvested_total.checked_add(contribution).ok_or(Error::Overflow)?;
        } else {
            self.reinvested_total -= contribution;
        }
        Ok(true)
    }

    /// Hand a slot to a new owner. Recipient resets to the new owner and
    /// reinvestment is cleared.
    pub fn transfer_slot(&mut self, caller: &Address, slot_id: SlotId, to: Address) -> Result<()> {
        let slot = self.owned_slot_mut(caller, slot_id)?;
        let cleared = std::mem::replace(&mut slot.reinvest, false);
        let contribution = slot.contribution;
        slot.owner = to;
        slot.recipient = to;
        if cleared {
            self.reinvested_total -= contribution;
        }
        Ok(())
    }

    // --- Internals ---

    fn filled_slot(&self, slot_id: SlotId) -> Result<&Slot> {
        self.slot(slot_id).ok_or(Error::InvalidSlot(slot_id))
    }

    fn owned_slot_mut(&mut self, caller: &Address, slot_id: SlotId) -> Result<&mut Slot> {
        let index = usize::try_from(slot_id).map_err(|_| Error::InvalidSlot(slot_id))?;
        let slot = self.slots.get_mut(index).ok_or(Error::InvalidSlot(slot_id))?;
        if slot.owner != *caller {
            return Err(Error::Unauthorized(format!("only the owner of slot {} may do this", slot_id)));
        }
        Ok(slot)
    }

    fn credit_slot(&mut self, slot_id: SlotId, amount: Amount) -> Result<()> {
        let index = usize::try_from(slot_id).map_err(|_| Error::InvalidSlot(slot_id))?;
        let slot = self.slots.get_mut(index).ok_or(Error::InvalidSlot(slot_id))?;
        slot.contribution = slot.contribution.checked_add(amount).ok_or(Error::Overflow)?;
        self.contribution_total = self.contribution_total.checked_add(amount).ok_or(Error::Overflow)?;
        if slot.reinvest {
            self.reinvested_total = self.reinvested_total.checked_add(amount).ok_or(Error::Overflow)?;
        }
        Ok(())
    }
}
