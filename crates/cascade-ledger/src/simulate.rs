//! Distribution replay.
//!
//! Rebuilds a leaderboard from its recorded history and reports how much
//! each address sent and received. Records are ordered by
//! `(block, log_index)`; contributions sort before slot transfers at the
//! same position.
//!
//! The first contribution seeds slot 0 and is attributed to the instance's
//! parent (for a root, the seeder gets it back). Slot transfers from the
//! zero address are mints and are skipped, since replaying the
//! contributions already fills the slots. Zero-value contributions after the
//! seed count as sent but leave the board untouched.

use crate::error::{Error, Result};
use crate::leaderboard::{LeaderboardLedger, SlotId};
use crate::math::Amount;
use cascade_quorum::{Address, DEFAULT_CAPACITY};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributionRecord {
    pub sender: Address,
    pub amount: Amount,
    pub block: u64,
    #[serde(default)]
    pub log_index: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotTransferRecord {
    pub from: Address,
    pub to: Address,
    pub slot_id: SlotId,
    pub block: u64,
    #[serde(default)]
    pub log_index: u64,
}

/// History of one instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayInput {
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// Parent instance; `None` for a root
    #[serde(default)]
    pub parent: Option<Address>,
    pub contributions: Vec<ContributionRecord>,
    #[serde(default)]
    pub transfers: Vec<SlotTransferRecord>,
}

fn default_capacity() -> usize {
    DEFAULT_CAPACITY
}

/// Per-address totals from a replay.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayReport {
    pub sent: BTreeMap<Address, Amount>,
    pub received: BTreeMap<Address, Amount>,
    /// Value not paid out: reinvested shares plus rounding dust
    pub undistributed: Amount,
    /// Final stake per slot
    pub slots: Vec<Amount>,
}

enum Step<'a> {
    Contribution(&'a ContributionRecord),
    Transfer(&'a SlotTransferRecord),
}

impl Step<'_> {
    fn position(&self) -> (u64, u64, u8) {
        match self {
            Step::Contribution(c) => (c.block, c.log_index, 0),
            Step::Transfer(t) => (t.block, t.log_index, 1),
        }
    }
}

/// Replay an instance's history.
pub fn replay(input: &ReplayInput) -> Result<ReplayReport> {
    let mut steps: Vec<Step<'_>> = input
        .contributions
        .iter()
        .map(Step::Contribution)
        .chain(input.transfers.iter().map(Step::Transfer))
        .collect();
    steps.sort_by_key(Step::position);

    let mut board = LeaderboardLedger::new("Replay Leaderboard", "REPLAY", input.capacity)?;
    let mut report = ReplayReport::default();

    for step in steps {
        match step {
            Step::Transfer(t) => {
                if t.from == Address::ZERO {
                    continue;
                }
                board.transfer_slot(&t.from, t.slot_id, t.to)?;
            }
            Step::Contribution(c) => {
                add(&mut report.sent, c.sender, c.amount)?;
                if !board.is_seeded() {
                    board.seed(c.sender, c.amount)?;
                    add(&mut report.received, input.parent.unwrap_or(c.sender), c.amount)?;
                    continue;
                }
                if c.amount == 0 {
                    continue;
                }

                let outcome = board.contribute(c.sender, c.amount)?;
                let mut paid: Amount = 0;
                for payout in &outcome.payouts {
                    add(&mut report.received, payout.recipient, payout.amount)?;
                    paid = paid.checked_add(payout.amount).ok_or(Error::Overflow)?;
                }
                report.undistributed = report
                    .undistributed
                    .checked_add(c.amount - paid)
                    .ok_or(Error::Overflow)?;
                debug!(block = c.block, sender = %c.sender, amount = c.amount, paid, "replayed contribution");
            }
        }
        board.commit();
    }

    report.slots = board.slots().iter().map(|s| s.contribution).collect();
    Ok(report)
}

fn add(totals: &mut BTreeMap<Address, Amount>, account: Address, amount: Amount) -> Result<()> {
    let total = totals.entry(account).or_insert(0);
    *total = total.checked_add(amount).ok_or(Error::Overflow)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(seed: u8) -> Address {
        Address::from_bytes([seed; 32])
    }

    fn contribution(sender: u8, amount: Amount, block: u64) -> ContributionRecord {
        ContributionRecord {
            sender: addr(sender),
            amount,
            block,
            log_index: 0,
        }
    }

    #[test]
    fn root_seed_is_refunded_and_later_contributions_paid_out() {
        let input = ReplayInput {
            capacity: 2,
            parent: None,
            contributions: vec![contribution(1, 100, 1), contribution(2, 50, 2), contribution(3, 30, 3)],
            transfers: vec![],
        };
        let report = replay(&input).unwrap();

        assert_eq!(report.sent[&addr(1)], 100);
        // Seed back to the seeder, then all of 50, then 100/150 of 30
        assert_eq!(report.received[&addr(1)], 100 + 50 + 20);
        assert_eq!(report.received[&addr(2)], 10);
        assert_eq!(report.undistributed, 0);
        // 30 can't beat the lowest slot (50), so it went to escrow
        assert_eq!(report.slots, vec![100, 50]);
    }

    #[test]
    fn transfers_redirect_later_payouts() {
        let input = ReplayInput {
            capacity: 12,
            parent: Some(addr(9)),
            contributions: vec![contribution(1, 10, 1), contribution(2, 10, 3)],
            transfers: vec![
                SlotTransferRecord {
                    from: Address::ZERO,
                    to: addr(1),
                    slot_id: 0,
                    block: 1,
                    log_index: 1,
                },
                SlotTransferRecord {
                    from: addr(1),
                    to: addr(5),
                    slot_id: 0,
                    block: 2,
                    log_index: 0,
                },
            ],
        };
        let report = replay(&input).unwrap();

        assert_eq!(report.received[&addr(9)], 10);
        assert_eq!(report.received[&addr(5)], 10);
        assert!(!report.received.contains_key(&addr(1)));
    }

    #[test]
    fn zero_value_contributions_are_sent_but_not_placed() {
        let input = ReplayInput {
            capacity: 12,
            parent: None,
            contributions: vec![contribution(1, 10, 1), contribution(2, 0, 2), contribution(3, 4, 3)],
            transfers: vec![],
        };
        let report = replay(&input).unwrap();

        assert_eq!(report.sent[&addr(2)], 0);
        assert!(!report.received.contains_key(&addr(2)));
        assert_eq!(report.received[&addr(1)], 10 + 4);
        assert_eq!(report.slots, vec![10, 4]);
    }

    #[test]
    fn zero_value_seed_holds_slot_zero() {
        let input = ReplayInput {
            capacity: 12,
            parent: Some(addr(9)),
            contributions: vec![contribution(1, 0, 1), contribution(2, 6, 2)],
            transfers: vec![],
        };
        let report = replay(&input).unwrap();

        assert_eq!(report.slots, vec![0, 6]);
        assert_eq!(report.undistributed, 6);
    }

    #[test]
    fn overflowing_totals_are_an_error() {
        let input = ReplayInput {
            capacity: 12,
            parent: None,
            contributions: vec![contribution(1, Amount::MAX, 1), contribution(1, 1, 2)],
            transfers: vec![],
        };
        assert!(matches!(replay(&input), Err(Error::Overflow)));
    }

    #[test]
    fn parses_json_history() {
        let json = format!(
            r#"{{"contributions":[{{"sender":"{}","amount":5,"block":1}}]}}"#,
            addr(1).to_hex()
        );
        let input: ReplayInput = serde_json::from_str(&json).unwrap();
        assert_eq!(input.capacity, 12);
        assert_eq!(input.contributions[0].log_index, 0);
    }
}
