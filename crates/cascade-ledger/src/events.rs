//! Ledger events.
//!
//! The engine appends one event per observable state change. Events from a
//! call that fails are dropped along with its state changes.

use crate::leaderboard::SlotId;
use crate::math::Amount;
use cascade_quorum::Address;
use serde::{Deserialize, Serialize};

/// Events emitted by ledgers, wallets and the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LedgerEvent {
    /// Value was contributed to a ledger
    Contribution {
        instance: Address,
        sender: Address,
        amount: Amount,
    },

    /// A share was delivered to a slot recipient
    Distribution {
        instance: Address,
        slot_id: SlotId,
        recipient: Address,
        amount: Amount,
    },

    /// A share couldn't be delivered and rests in the ledger
    PaymentDeferred {
        instance: Address,
        slot_id: SlotId,
        recipient: Address,
        amount: Amount,
        reason: String,
    },

    /// A free slot was taken
    SlotFilled {
        instance: Address,
        slot_id: SlotId,
        owner: Address,
        contribution: Amount,
    },

    /// The lowest slot changed hands
    Eviction {
        instance: Address,
        slot_id: SlotId,
        evicted: Address,
        incoming: Address,
        refunded: Amount,
        stake: Amount,
    },

    /// A contribution too small to place was kept as escrow
    Escrowed {
        instance: Address,
        account: Address,
        amount: Amount,
        balance: Amount,
    },

    EscrowTransfer {
        instance: Address,
        from: Address,
        to: Address,
        amount: Amount,
    },

    SlotTransfer {
        instance: Address,
        slot_id: SlotId,
        from: Address,
        to: Address,
    },

    RecipientUpdated {
        instance: Address,
        slot_id: SlotId,
        recipient: Address,
    },

    ReinvestmentUpdated {
        instance: Address,
        slot_id: SlotId,
        enabled: bool,
    },

    /// Escrow was moved into a slot's stake
    LeaderBalanceAdded {
        instance: Address,
        slot_id: SlotId,
        account: Address,
        amount: Amount,
    },

    /// A governance wallet executed an approved call
    LeaderTransactionExecuted {
        wallet: Address,
        target: Address,
        value: Amount,
        nonce: u64,
        votes: usize,
    },

    /// A new instance was created (parent is `None` for roots)
    ChildDeployed {
        parent: Option<Address>,
        child: Address,
        wallet: Address,
        deployer: Address,
        amount: Amount,
    },

    WalletUpdated {
        instance: Address,
        wallet: Address,
    },

    MetadataUpdated {
        instance: Address,
    },

    /// Plain value transfer between accounts
    ValueTransfer {
        from: Address,
        to: Address,
        amount: Amount,
    },
}

impl LedgerEvent {
    /// The instance this event belongs to, if any.
    pub fn instance(&self) -> Option<Address> {
        match self {
            LedgerEvent::Contribution { instance, .. }
            | LedgerEvent::Distribution { instance, .. }
            | LedgerEvent::PaymentDeferred { instance, .. }
            | LedgerEvent::SlotFilled { instance, .. }
            | LedgerEvent::Eviction { instance, .. }
            | LedgerEvent::Escrowed { instance, .. }
            | LedgerEvent::EscrowTransfer { instance, .. }
            | LedgerEvent::SlotTransfer { instance, .. }
            | LedgerEvent::RecipientUpdated { instance, .. }
            | LedgerEvent::ReinvestmentUpdated { instance, .. }
            | LedgerEvent::LeaderBalanceAdded { instance, .. }
            | LedgerEvent::WalletUpdated { instance, .. }
            | LedgerEvent::MetadataUpdated { instance } => Some(*instance),
            LedgerEvent::ChildDeployed { child, .. } => Some(*child),
            LedgerEvent::LeaderTransactionExecuted { .. } | LedgerEvent::ValueTransfer { .. } => None,
        }
    }
}
