//! Engine calls.
//!
//! Every state-changing ledger operation is a [`Call`] on a target address.
//! Direct callers, programmable recipients and governance wallets all go
//! through the same dispatch, so a wallet can do anything an account can.

use crate::leaderboard::SlotId;
use crate::math::Amount;
use crate::metadata::MetadataStyle;
use crate::registry::ChildParams;
use cascade_quorum::Address;
use serde::{Deserialize, Serialize};

/// An operation on a target address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Call {
    /// Send plain value. A ledger target treats it as a contribution.
    Transfer,
    Contribute,
    ClaimLeadership,
    /// Pay the attached value out by plain stake weight
    Distribute,
    /// Pay out the ledger's resting balance
    ForceDistribution,
    AddToLeaderContributionBalance { slot: SlotId, amount: Amount },
    SetRecipient { slot: SlotId, recipient: Address },
    SetReinvestment { slot: SlotId, enabled: bool },
    TransferSlot { slot: SlotId, to: Address },
    TransferEscrow { to: Address, amount: Amount },
    /// Wallet-gated
    UpdateWallet { wallet: Address },
    /// Wallet-gated
    UpdateMetadata { style: MetadataStyle },
    /// Deploy a child of the target; attached value seeds it
    DeployChild { params: ChildParams },
}

impl Call {
    /// Whether the call accepts attached value.
    pub fn is_payable(&self) -> bool {
        matches!(
            self,
            Call::Transfer | Call::Contribute | Call::Distribute | Call::DeployChild { .. }
        )
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Call::Transfer => "transfer",
            Call::Contribute => "contribute",
            Call::ClaimLeadership => "claim_leadership",
            Call::Distribute => "distribute",
            Call::ForceDistribution => "force_distribution",
            Call::AddToLeaderContributionBalance { .. } => "add_to_leader_contribution_balance",
            Call::SetRecipient { .. } => "set_recipient",
            Call::SetReinvestment { .. } => "set_reinvestment",
            Call::TransferSlot { .. } => "transfer_slot",
            Call::TransferEscrow { .. } => "transfer_escrow",
            Call::UpdateWallet { .. } => "update_wallet",
            Call::UpdateMetadata { .. } => "update_metadata",
            Call::DeployChild { .. } => "deploy_child",
        }
    }
}
