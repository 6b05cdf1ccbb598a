//! The ledger engine.
//!
//! Owns every instance, wallet, native balance and the registry, and runs
//! all operations against them.
//!
//! # Atomicity
//!
//! Each call runs inside [`Engine::atomic`]. Every state change made inside
//! a call pushes an undo entry onto a journal; on error the journal is
//! unwound to the call's mark and the call's events are dropped. Undo
//! entries are O(1) except leaderboard checkpoints, which copy the slots.
//! Calls nest (a payout delivery inside a contribution, a governance call
//! inside an execution), and each level rolls back on its own. A failed push-payment therefore undoes only the delivery; the
//! contribution that triggered it still commits and the share rests in the
//! ledger.
//!
//! # Re-entrancy
//!
//! Programmable recipients ([`Recipient`]) get a [`Context`] scoped to their
//! own address and may call back into the engine. Aggregates are updated
//! before any delivery, so those calls see the new state. Two guards bound
//! the recursion:
//! - a recipient (or ledger) that is already executing rejects a nested
//!   delivery
//! - nesting deeper than `max_call_depth` fails with `CallDepthExceeded`

use crate::call::Call;
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::events::LedgerEvent;
use crate::leaderboard::{BoardCheckpoint, LeaderboardLedger, Payout, Placement, SlotId};
use crate::math::Amount;
use crate::metadata::{self, MetadataStyle};
use crate::registry::{ChildParams, InstanceRecord, InstanceRegistry};
use crate::wallet::{GovernanceWallet, LeaderTransaction};
use cascade_quorum::{evaluate, Address, LeaderSignature, QuorumTally, QuorumVerdict};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

/// Code that runs when value is delivered to an address.
///
/// Returning an error refuses the delivery; everything the recipient did
/// through its context is rolled back with it.
pub trait Recipient {
    fn on_receive(&mut self, ctx: &mut Context<'_>, from: Address, amount: Amount) -> Result<()>;
}

impl<F> Recipient for F
where
    F: FnMut(&mut Context<'_>, Address, Amount) -> Result<()>,
{
    fn on_receive(&mut self, ctx: &mut Context<'_>, from: Address, amount: Amount) -> Result<()> {
        self(ctx, from, amount)
    }
}

/// Capability handed to a running recipient. Calls are made as `this`.
pub struct Context<'a> {
    engine: &'a mut Engine,
    this: Address,
}

impl<'a> Context<'a> {
    pub fn address(&self) -> Address {
        self.this
    }

    pub fn balance(&self) -> Amount {
        self.engine.balance(&self.this)
    }

    /// Read-only view of the engine.
    pub fn engine(&self) -> &Engine {
        self.engine
    }

    /// Make a call as this recipient.
    pub fn call(&mut self, target: Address, value: Amount, call: Call) -> Result<()> {
        self.engine.dispatch(self.this, target, value, call)
    }
}

/// A ledger instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    pub address: Address,
    pub name: String,
    pub symbol: String,
    /// Wallet allowed to make privileged calls
    pub wallet: Address,
    /// `None` for roots
    pub parent: Option<Address>,
    pub creator: Address,
    pub leaderboard: LeaderboardLedger,
    pub style: MetadataStyle,
}

/// Addresses of a freshly created instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deployment {
    pub ledger: Address,
    pub wallet: Address,
}

#[derive(Debug, Default)]
struct State {
    balances: HashMap<Address, Amount>,
    instances: HashMap<Address, Instance>,
    wallets: HashMap<Address, GovernanceWallet>,
    registry: InstanceRegistry,
    minted: Amount,
    deployments: u64,
}

/// Reverses one state change.
enum Undo {
    Balance { account: Address, prior: Option<Amount> },
    Minted(Amount),
    Deployments(u64),
    InstanceCreated(Address),
    WalletCreated(Address),
    Registered,
    Leaderboard { ledger: Address, checkpoint: BoardCheckpoint },
    Governance { ledger: Address, wallet: Address, style: MetadataStyle },
    Wallet(GovernanceWallet),
}

/// Top-level context for all instances.
pub struct Engine {
    config: EngineConfig,
    state: State,
    journal: Vec<Undo>,
    events: Vec<LedgerEvent>,
    hooks: HashMap<Address, Box<dyn Recipient>>,
    in_flight: HashSet<Address>,
    depth: usize,
}

impl Default for Engine {
    fn default() -> Self {
        Self::with_config(EngineConfig::default())
    }
}

impl Engine {
    /// Create an engine after validating the config.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_config(config))
    }

    fn with_config(config: EngineConfig) -> Self {
        Self {
            config,
            state: State::default(),
            journal: Vec::new(),
            events: Vec::new(),
            hooks: HashMap::new(),
            in_flight: HashSet::new(),
            depth: 0,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // --- Accounts ---

    /// Create native value out of nothing. The only source of value.
    pub fn mint(&mut self, account: Address, amount: Amount) -> Result<()> {
        let minted = self.state.minted.checked_add(amount).ok_or(Error::Overflow)?;
        let credited = self.balance(&account).checked_add(amount).ok_or(Error::Overflow)?;
        self.set_balance(account, credited);
        self.record(Undo::Minted(self.state.minted));
        self.state.minted = minted;
        Ok(())
    }

    /// Native balance of an account, instance or wallet.
    pub fn balance(&self, account: &Address) -> Amount {
        self.state.balances.get(account).copied().unwrap_or(0)
    }

    /// Total value ever minted.
    pub fn total_minted(&self) -> Amount {
        self.state.minted
    }

    /// Sum of all native balances. Equals [`Engine::total_minted`].
    pub fn total_balances(&self) -> Amount {
        self.state.balances.values().sum()
    }

    /// Attach code to an address; it runs on every delivery to it.
    pub fn register_recipient<R: Recipient + 'static>(&mut self, account: Address, recipient: R) {
        self.hooks.insert(account, Box::new(recipient));
    }

    pub fn remove_recipient(&mut self, account: &Address) -> Option<Box<dyn Recipient>> {
        self.hooks.remove(account)
    }

    // --- Instances ---

    /// Create a root instance. Slot 0 goes to the creator with `seed` as
    /// its stake; the creator keeps the value.
    pub fn create_root(&mut self, creator: Address, params: ChildParams, seed: Amount) -> Result<Deployment> {
        self.atomic(|e| e.deploy(None, creator, params, seed))
    }

    /// Deploy a child of `parent`. Slot 0 goes to the deployer with
    /// `attached` as its stake; a non-zero `attached` is contributed into
    /// the parent by the child's wallet.
    pub fn deploy_child(
        &mut self,
        parent: Address,
        deployer: Address,
        params: ChildParams,
        attached: Amount,
    ) -> Result<Deployment> {
        self.atomic(|e| e.deploy(Some(parent), deployer, params, attached))
    }

    /// Deploy an additional wallet governed by `ledger`'s leaders.
    ///
    /// It can act on the instance's privileged operations only once the
    /// current wallet hands over to it with `update_wallet`.
    pub fn create_wallet(&mut self, ledger: Address) -> Result<Address> {
        self.instance(&ledger)?;
        let nonce = self.next_deployment()?;
        let wallet = Address::derive("wallet", &[ledger.as_bytes(), &nonce.to_le_bytes()]);
        self.insert_wallet(GovernanceWallet::new(wallet, ledger));
        debug!(instance = %ledger, %wallet, "wallet created");
        Ok(wallet)
    }

    // --- Operations ---

    /// Send plain value. Delivery failures surface as errors.
    pub fn transfer(&mut self, from: Address, to: Address, amount: Amount) -> Result<()> {
        self.dispatch(from, to, amount, Call::Transfer)
    }

    pub fn contribute(&mut self, ledger: Address, sender: Address, amount: Amount) -> Result<()> {
        self.dispatch(sender, ledger, amount, Call::Contribute)
    }

    pub fn claim_leadership(&mut self, ledger: Address, caller: Address) -> Result<()> {
        self.dispatch(caller, ledger, 0, Call::ClaimLeadership)
    }

    pub fn distribute(&mut self, ledger: Address, sender: Address, amount: Amount) -> Result<()> {
        self.dispatch(sender, ledger, amount, Call::Distribute)
    }

    pub fn force_distribution(&mut self, ledger: Address, caller: Address) -> Result<()> {
        self.dispatch(caller, ledger, 0, Call::ForceDistribution)
    }

    pub fn add_to_leader_contribution_balance(
        &mut self,
        ledger: Address,
        caller: Address,
        slot: SlotId,
        amount: Amount,
    ) -> Result<()> {
        self.dispatch(caller, ledger, 0, Call::AddToLeaderContributionBalance { slot, amount })
    }

    pub fn set_recipient(&mut self, ledger: Address, caller: Address, slot: SlotId, recipient: Address) -> Result<()> {
        self.dispatch(caller, ledger, 0, Call::SetRecipient { slot, recipient })
    }

    pub fn set_reinvestment(&mut self, ledger: Address, caller: Address, slot: SlotId, enabled: bool) -> Result<()> {
        self.dispatch(caller, ledger, 0, Call::SetReinvestment { slot, enabled })
    }

    pub fn transfer_slot(&mut self, ledger: Address, caller: Address, slot: SlotId, to: Address) -> Result<()> {
        self.dispatch(caller, ledger, 0, Call::TransferSlot { slot, to })
    }

    pub fn transfer_escrow(&mut self, ledger: Address, caller: Address, to: Address, amount: Amount) -> Result<()> {
        self.dispatch(caller, ledger, 0, Call::TransferEscrow { to, amount })
    }

    pub fn update_wallet(&mut self, ledger: Address, caller: Address, wallet: Address) -> Result<()> {
        self.dispatch(caller, ledger, 0, Call::UpdateWallet { wallet })
    }

    pub fn update_metadata(&mut self, ledger: Address, caller: Address, style: MetadataStyle) -> Result<()> {
        self.dispatch(caller, ledger, 0, Call::UpdateMetadata { style })
    }

    /// Execute a leader-approved call from `wallet`.
    ///
    /// Checks the nonce, evaluates the signatures against the live
    /// leaderboard, consumes the nonce and performs the call. If the call
    /// fails, the nonce is restored along with everything else.
    pub fn execute_leader_transaction(
        &mut self,
        wallet: Address,
        tx: &LeaderTransaction,
        slot_ids: &[SlotId],
        signatures: &[LeaderSignature],
    ) -> Result<QuorumTally> {
        self.atomic(|e| {
            let governed = e.wallet(&wallet)?;
            governed.check_nonce(tx.nonce)?;
            let ledger = governed.ledger;

            let hash = tx.message_hash()?;
            let board = e.leaderboard(&ledger)?;
            let tally = evaluate(&hash, slot_ids, signatures, board.filled(), |id| board.owner_of(id))?;
            if let QuorumVerdict::Insufficient { votes, needed } = tally.verdict() {
                debug!(%wallet, votes, needed, members = tally.members, "quorum not reached");
                return Err(Error::InsufficientVotes { votes, needed });
            }

            e.wallet_mut(&wallet)?.advance()?;
            e.dispatch(wallet, tx.target, tx.value, tx.call.clone())?;

            info!(
                %wallet,
                target = %tx.target,
                call = tx.call.name(),
                nonce = tx.nonce,
                votes = tally.votes(),
                "leader transaction executed"
            );
            e.emit(LedgerEvent::LeaderTransactionExecuted {
                wallet,
                target: tx.target,
                value: tx.value,
                nonce: tx.nonce,
                votes: tally.votes(),
            });
            Ok(tally)
        })
    }

    // --- Queries ---

    pub fn instance(&self, ledger: &Address) -> Result<&Instance> {
        self.state.instances.get(ledger).ok_or(Error::UnknownInstance(*ledger))
    }

    pub fn leaderboard(&self, ledger: &Address) -> Result<&LeaderboardLedger> {
        self.instance(ledger).map(|i| &i.leaderboard)
    }

    pub fn wallet(&self, wallet: &Address) -> Result<&GovernanceWallet> {
        self.state.wallets.get(wallet).ok_or(Error::UnknownWallet(*wallet))
    }

    pub fn is_instance(&self, account: &Address) -> bool {
        self.state.instances.contains_key(account)
    }

    pub fn registry(&self) -> &InstanceRegistry {
        &self.state.registry
    }

    pub fn total_children(&self, parent: &Address) -> usize {
        self.state.registry.total_children(parent)
    }

    pub fn child_at(&self, parent: &Address, index: usize) -> Option<&InstanceRecord> {
        self.state.registry.child_at(parent, index)
    }

    /// Escrow credit of `account` on `ledger`.
    pub fn balance_of(&self, ledger: &Address, account: &Address) -> Result<Amount> {
        Ok(self.leaderboard(ledger)?.escrow_balance_of(account))
    }

    pub fn lowest_slot(&self, ledger: &Address) -> Result<Option<(SlotId, Amount)>> {
        Ok(self.leaderboard(ledger)?.lowest_slot())
    }

    pub fn contribution_of(&self, ledger: &Address, slot: SlotId) -> Result<Amount> {
        self.leaderboard(ledger)?.contribution_of(slot)
    }

    pub fn contribution_total(&self, ledger: &Address) -> Result<Amount> {
        Ok(self.leaderboard(ledger)?.contribution_total())
    }

    /// Render a slot's metadata URI.
    pub fn slot_uri(&self, ledger: &Address, slot: SlotId) -> Result<String> {
        let instance = self.instance(ledger)?;
        let board = &instance.leaderboard;
        let slot = board.slot(slot).ok_or(Error::InvalidSlot(slot))?;
        metadata::slot_uri(board.name(), slot, &instance.style)
    }

    /// Every committed event, oldest first.
    pub fn events(&self) -> &[LedgerEvent] {
        &self.events
    }

    // --- Dispatch ---

    /// Run `call` on `target` as `caller`, attaching `value`.
    pub(crate) fn dispatch(&mut self, caller: Address, target: Address, value: Amount, call: Call) -> Result<()> {
        self.atomic(|e| {
            if value > 0 && !call.is_payable() {
                return Err(Error::NonPayable);
            }
            debug!(call = call.name(), %caller, %target, value, depth = e.depth, "dispatch");

            match call {
                Call::Transfer => e.transfer_value(caller, target, value),
                Call::Contribute => {
                    if value == 0 {
                        return Err(Error::ZeroAmount);
                    }
                    e.instance(&target)?;
                    e.move_value(caller, target, value)?;
                    e.contribute_received(target, caller, value)
                }
                Call::ClaimLeadership => {
                    let placement = e.leaderboard_mut(&target)?.claim_leadership(caller)?;
                    e.emit_placement(target, caller, 0, placement);
                    Ok(())
                }
                Call::Distribute => e.distribute_value(target, caller, value),
                Call::ForceDistribution => {
                    let resting = e.balance(&target);
                    e.instance(&target)?;
                    if resting == 0 {
                        return Ok(());
                    }
                    info!(instance = %target, amount = resting, "force distribution");
                    e.pay_out(target, resting)
                }
                Call::AddToLeaderContributionBalance { slot, amount } => {
                    e.leaderboard_mut(&target)?
                        .add_to_leader_contribution_balance(&caller, slot, amount)?;
                    e.emit(LedgerEvent::LeaderBalanceAdded {
                        instance: target,
                        slot_id: slot,
                        account: caller,
                        amount,
                    });
                    Ok(())
                }
                Call::SetRecipient { slot, recipient } => {
                    e.leaderboard_mut(&target)?.set_recipient(&caller, slot, recipient)?;
                    e.emit(LedgerEvent::RecipientUpdated {
                        instance: target,
                        slot_id: slot,
                        recipient,
                    });
                    Ok(())
                }
                Call::SetReinvestment { slot, enabled } => {
                    if e.leaderboard_mut(&target)?.set_reinvestment(&caller, slot, enabled)? {
                        e.emit(LedgerEvent::ReinvestmentUpdated {
                            instance: target,
                            slot_id: slot,
                            enabled,
                        });
                    }
                    Ok(())
                }
                Call::TransferSlot { slot, to } => {
                    e.leaderboard_mut(&target)?.transfer_slot(&caller, slot, to)?;
                    e.emit(LedgerEvent::SlotTransfer {
                        instance: target,
                        slot_id: slot,
                        from: caller,
                        to,
                    });
                    Ok(())
                }
                Call::TransferEscrow { to, amount } => {
                    e.leaderboard_mut(&target)?.transfer_escrow(&caller, to, amount)?;
                    e.emit(LedgerEvent::EscrowTransfer {
                        instance: target,
                        from: caller,
                        to,
                        amount,
                    });
                    Ok(())
                }
                Call::UpdateWallet { wallet } => {
                    e.governed_instance_mut(&target, &caller)?.wallet = wallet;
                    info!(instance = %target, %wallet, "wallet updated");
                    e.emit(LedgerEvent::WalletUpdated {
                        instance: target,
                        wallet,
                    });
                    Ok(())
                }
                Call::UpdateMetadata { style } => {
                    e.governed_instance_mut(&target, &caller)?.style = style;
                    e.emit(LedgerEvent::MetadataUpdated { instance: target });
                    Ok(())
                }
                Call::DeployChild { params } => e.deploy(Some(target), caller, params, value).map(|_| ()),
            }
        })
    }

    /// Run `f` as one all-or-nothing step.
    fn atomic<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if self.depth >= self.config.max_call_depth {
            return Err(Error::CallDepthExceeded(self.config.max_call_depth));
        }
        let mark = self.journal.len();
        let events = self.events.len();

        self.depth += 1;
        let result = f(self);
        self.depth -= 1;

        if result.is_err() {
            self.rollback(mark);
            self.events.truncate(events);
        } else if self.depth == 0 {
            self.commit();
        }
        result
    }

    /// Keep `undo` if a call is running. Outside a call nothing can roll back.
    fn record(&mut self, undo: Undo) {
        if self.depth > 0 {
            self.journal.push(undo);
        }
    }

    fn rollback(&mut self, mark: usize) {
        while self.journal.len() > mark {
            let Some(undo) = self.journal.pop() else {
                break;
            };
            match undo {
                Undo::Balance { account, prior: Some(balance) } => {
                    self.state.balances.insert(account, balance);
                }
                Undo::Balance { account, prior: None } => {
                    self.state.balances.remove(&account);
                }
                Undo::Minted(prior) => self.state.minted = prior,
                Undo::Deployments(prior) => self.state.deployments = prior,
                Undo::InstanceCreated(ledger) => {
                    self.state.instances.remove(&ledger);
                }
                Undo::WalletCreated(wallet) => {
                    self.state.wallets.remove(&wallet);
                }
                Undo::Registered => {
                    self.state.registry.unregister_last();
                }
                Undo::Leaderboard { ledger, checkpoint } => {
                    if let Some(instance) = self.state.instances.get_mut(&ledger) {
                        instance.leaderboard.rollback(checkpoint);
                    }
                }
                Undo::Governance { ledger, wallet, style } => {
                    if let Some(instance) = self.state.instances.get_mut(&ledger) {
                        instance.wallet = wallet;
                        instance.style = style;
                    }
                }
                Undo::Wallet(prior) => {
                    self.state.wallets.insert(prior.address, prior);
                }
            }
        }
    }

    /// A top-level call succeeded; its undo entries are no longer needed.
    fn commit(&mut self) {
        for undo in std::mem::take(&mut self.journal) {
            if let Undo::Leaderboard { ledger, .. } = undo {
                if let Some(instance) = self.state.instances.get_mut(&ledger) {
                    instance.leaderboard.commit();
                }
            }
        }
    }

    // --- Value movement ---

    fn move_value(&mut self, from: Address, to: Address, amount: Amount) -> Result<()> {
        if amount == 0 || from == to {
            return self.require_funds(&from, amount);
        }
        self.require_funds(&from, amount)?;
        let credited = self.balance(&to).checked_add(amount).ok_or(Error::Overflow)?;
        let debited = self.balance(&from) - amount;
        self.set_balance(from, debited);
        self.set_balance(to, credited);
        Ok(())
    }

    fn set_balance(&mut self, account: Address, balance: Amount) {
        let prior = self.state.balances.insert(account, balance);
        self.record(Undo::Balance { account, prior });
    }

    fn require_funds(&self, account: &Address, needed: Amount) -> Result<()> {
        let available = self.balance(account);
        if available < needed {
            return Err(Error::InsufficientFunds {
                account: *account,
                needed,
                available,
            });
        }
        Ok(())
    }

    fn transfer_value(&mut self, from: Address, to: Address, amount: Amount) -> Result<()> {
        if amount == 0 {
            return Err(Error::ZeroAmount);
        }
        self.require_funds(&from, amount)?;
        self.deliver(from, to, amount)?;
        self.emit(LedgerEvent::ValueTransfer { from, to, amount });
        Ok(())
    }

    /// Move value and run whatever the receiving address does with it.
    ///
    /// A ledger treats received value as a contribution from `from`; an
    /// address with a registered [`Recipient`] runs it. Any failure rolls
    /// the delivery back and is reported as `PaymentDeliveryFailed`.
    fn deliver(&mut self, from: Address, to: Address, amount: Amount) -> Result<()> {
        if self.in_flight.contains(&to) {
            return Err(Error::PaymentDeliveryFailed {
                recipient: to,
                reason: "recipient is already executing".into(),
            });
        }

        self.atomic(|e| {
            e.move_value(from, to, amount)?;
            if e.is_instance(&to) {
                return e.contribute_received(to, from, amount);
            }
            let Some(mut hook) = e.hooks.remove(&to) else {
                return Ok(());
            };

            e.in_flight.insert(to);
            let result = {
                let mut ctx = Context { engine: &mut *e, this: to };
                hook.on_receive(&mut ctx, from, amount)
            };
            e.in_flight.remove(&to);
            e.hooks.insert(to, hook);

            result
        })
        .map_err(|err| match err {
            Error::PaymentDeliveryFailed { .. } => err,
            other => Error::PaymentDeliveryFailed {
                recipient: to,
                reason: other.to_string(),
            },
        })
    }

    /// Attempt a payout; on failure the share rests in the ledger.
    fn push_payment(&mut self, ledger: Address, payout: Payout) {
        match self.deliver(ledger, payout.recipient, payout.amount) {
            Ok(()) => self.emit(LedgerEvent::Distribution {
                instance: ledger,
                slot_id: payout.slot_id,
                recipient: payout.recipient,
                amount: payout.amount,
            }),
            Err(err) => {
                warn!(
                    instance = %ledger,
                    slot = payout.slot_id,
                    recipient = %payout.recipient,
                    amount = payout.amount,
                    error = %err,
                    "payment deferred"
                );
                self.emit(LedgerEvent::PaymentDeferred {
                    instance: ledger,
                    slot_id: payout.slot_id,
                    recipient: payout.recipient,
                    amount: payout.amount,
                    reason: err.to_string(),
                });
            }
        }
    }

    // --- Ledger internals ---

    /// Apply a contribution whose value already sits in the ledger.
    fn contribute_received(&mut self, ledger: Address, sender: Address, amount: Amount) -> Result<()> {
        let marked = self.in_flight.insert(ledger);
        let result = self.apply_contribution(ledger, sender, amount);
        if marked {
            self.in_flight.remove(&ledger);
        }
        result
    }

    fn apply_contribution(&mut self, ledger: Address, sender: Address, amount: Amount) -> Result<()> {
        if amount == 0 {
            return Err(Error::ZeroAmount);
        }
        self.emit(LedgerEvent::Contribution {
            instance: ledger,
            sender,
            amount,
        });

        let outcome = self.leaderboard_mut(&ledger)?.contribute(sender, amount)?;
        self.emit_placement(ledger, sender, amount, outcome.placement);
        for payout in outcome.payouts {
            self.push_payment(ledger, payout);
        }
        Ok(())
    }

    fn distribute_value(&mut self, ledger: Address, sender: Address, amount: Amount) -> Result<()> {
        if amount == 0 {
            return Err(Error::ZeroAmount);
        }
        self.instance(&ledger)?;
        self.move_value(sender, ledger, amount)?;
        self.pay_out(ledger, amount)
    }

    /// Pay `amount` of the ledger's balance by plain stake weight.
    fn pay_out(&mut self, ledger: Address, amount: Amount) -> Result<()> {
        let payouts = self.leaderboard(&ledger)?.proportional_payouts(amount)?;
        let marked = self.in_flight.insert(ledger);
        for payout in payouts {
            self.push_payment(ledger, payout);
        }
        if marked {
            self.in_flight.remove(&ledger);
        }
        Ok(())
    }

    fn deploy(
        &mut self,
        parent: Option<Address>,
        deployer: Address,
        params: ChildParams,
        attached: Amount,
    ) -> Result<Deployment> {
        if let Some(parent) = parent {
            self.instance(&parent)?;
        }
        self.require_funds(&deployer, attached)?;

        let nonce = self.next_deployment()?;
        let ledger = Address::derive("ledger", &[&nonce.to_le_bytes(), deployer.as_bytes()]);
        let wallet = Address::derive("wallet", &[ledger.as_bytes(), &nonce.to_le_bytes()]);

        let mut leaderboard = LeaderboardLedger::new(
            params.leaderboard_name(),
            params.leaderboard_symbol.clone(),
            self.config.capacity,
        )?;
        let placement = leaderboard.seed(deployer, attached)?;
        self.state.instances.insert(
            ledger,
            Instance {
                address: ledger,
                name: params.name.clone(),
                symbol: params.symbol.clone(),
                wallet,
                parent,
                creator: deployer,
                leaderboard,
                style: MetadataStyle::default(),
            },
        );
        self.record(Undo::InstanceCreated(ledger));
        self.insert_wallet(GovernanceWallet::new(wallet, ledger));
        let order = self
            .state
            .registry
            .register(ledger, wallet, parent, deployer, attached)
            .order;
        self.record(Undo::Registered);

        info!(instance = %ledger, %wallet, name = %params.name, order, "instance deployed");
        self.emit(LedgerEvent::ChildDeployed {
            parent,
            child: ledger,
            wallet,
            deployer,
            amount: attached,
        });
        self.emit(LedgerEvent::Contribution {
            instance: ledger,
            sender: deployer,
            amount: attached,
        });
        self.emit_placement(ledger, deployer, attached, placement);

        // A root's creator keeps the seed; a child's seed buys stake upstream
        match parent {
            Some(parent) if attached > 0 => {
                debug!(instance = %ledger, %parent, amount = attached, "forwarding seed to parent");
                self.move_value(deployer, wallet, attached)?;
                self.dispatch(wallet, parent, attached, Call::Contribute)?;
            }
            _ => {}
        }
        Ok(Deployment { ledger, wallet })
    }

    fn next_deployment(&mut self) -> Result<u64> {
        let nonce = self.state.deployments;
        self.state.deployments = nonce.checked_add(1).ok_or(Error::Overflow)?;
        self.record(Undo::Deployments(nonce));
        Ok(nonce)
    }

    fn insert_wallet(&mut self, wallet: GovernanceWallet) {
        let address = wallet.address;
        self.state.wallets.insert(address, wallet);
        self.record(Undo::WalletCreated(address));
    }

    fn emit_placement(&mut self, ledger: Address, sender: Address, amount: Amount, placement: Placement) {
        let event = match placement {
            Placement::Seeded { slot_id } | Placement::Filled { slot_id } => LedgerEvent::SlotFilled {
                instance: ledger,
                slot_id,
                owner: sender,
                contribution: amount,
            },
            Placement::ToppedUp { .. } => return,
            Placement::Evicted {
                slot_id,
                evicted,
                refunded,
                stake,
            } => {
                info!(instance = %ledger, slot = slot_id, %evicted, incoming = %sender, stake, "leader evicted");
                LedgerEvent::Eviction {
                    instance: ledger,
                    slot_id,
                    evicted,
                    incoming: sender,
                    refunded,
                    stake,
                }
            }
            Placement::Escrowed { credited: 0, .. } => return,
            Placement::Escrowed { credited, balance } => LedgerEvent::Escrowed {
                instance: ledger,
                account: sender,
                amount: credited,
                balance,
            },
        };
        self.emit(event);
    }

    fn emit(&mut self, event: LedgerEvent) {
        self.events.push(event);
    }

    fn instance_mut(&mut self, ledger: &Address) -> Result<&mut Instance> {
        self.state
            .instances
            .get_mut(ledger)
            .ok_or(Error::UnknownInstance(*ledger))
    }

    fn leaderboard_mut(&mut self, ledger: &Address) -> Result<&mut LeaderboardLedger> {
        let checkpoint = self.leaderboard(ledger)?.checkpoint();
        self.record(Undo::Leaderboard {
            ledger: *ledger,
            checkpoint,
        });
        self.instance_mut(ledger).map(|i| &mut i.leaderboard)
    }

    /// The instance, if `caller` is its current wallet.
    fn governed_instance_mut(&mut self, ledger: &Address, caller: &Address) -> Result<&mut Instance> {
        let instance = self.instance(ledger)?;
        if instance.wallet != *caller {
            return Err(Error::Unauthorized(format!(
                "{} is not the wallet of instance {}",
                caller, ledger
            )));
        }
        let undo = Undo::Governance {
            ledger: *ledger,
            wallet: instance.wallet,
            style: instance.style.clone(),
        };
        self.record(undo);
        self.instance_mut(ledger)
    }

    fn wallet_mut(&mut self, wallet: &Address) -> Result<&mut GovernanceWallet> {
        let prior = self.wallet(wallet)?.clone();
        self.record(Undo::Wallet(prior));
        self.state.wallets.get_mut(wallet).ok_or(Error::UnknownWallet(*wallet))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::UNIT;

    fn addr(seed: u8) -> Address {
        Address::from_bytes([seed; 32])
    }

    fn funded(accounts: &[u8]) -> Engine {
        let mut engine = Engine::default();
        for &a in accounts {
            engine.mint(addr(a), 1_000 * UNIT).unwrap();
        }
        engine
    }

    fn root(engine: &mut Engine, creator: u8, seed: Amount) -> Deployment {
        engine
            .create_root(addr(creator), ChildParams::new("Cascade", "CSC", "CSCL"), seed)
            .unwrap()
    }

    #[test]
    fn root_seed_returns_value_to_creator() {
        let mut engine = funded(&[1]);
        let d = root(&mut engine, 1, 5 * UNIT);
        assert_eq!(engine.balance(&addr(1)), 1_000 * UNIT);
        assert_eq!(engine.balance(&d.ledger), 0);
        assert_eq!(engine.contribution_of(&d.ledger, 0).unwrap(), 5 * UNIT);
        assert_eq!(engine.instance(&d.ledger).unwrap().leaderboard.name(), "Cascade Leaderboard");
    }

    #[test]
    fn failed_call_rolls_back_state_and_events() {
        let mut engine = funded(&[1, 2]);
        let d = root(&mut engine, 1, UNIT);
        let events = engine.events().len();

        let err = engine.contribute(d.ledger, addr(3), UNIT).unwrap_err();
        assert!(matches!(err, Error::InsufficientFunds { .. }));
        assert_eq!(engine.events().len(), events);
        assert_eq!(engine.contribution_total(&d.ledger).unwrap(), UNIT);
    }

    #[test]
    fn non_payable_calls_reject_value() {
        let mut engine = funded(&[1]);
        let d = root(&mut engine, 1, UNIT);
        let err = engine.dispatch(addr(1), d.ledger, 1, Call::ClaimLeadership).unwrap_err();
        assert!(matches!(err, Error::NonPayable));
        assert_eq!(engine.balance(&addr(1)), 1_000 * UNIT);
    }

    #[test]
    fn unknown_instance() {
        let mut engine = funded(&[1]);
        let err = engine.contribute(addr(9), addr(1), UNIT).unwrap_err();
        assert!(matches!(err, Error::UnknownInstance(a) if a == addr(9)));
    }

    #[test]
    fn recipient_runs_on_delivery() {
        let mut engine = funded(&[1, 2]);
        let d = root(&mut engine, 1, UNIT);
        let hook = addr(7);
        engine.set_recipient(d.ledger, addr(1), 0, hook).unwrap();

        // Forward everything received into the ledger again
        let ledger = d.ledger;
        engine.register_recipient(hook, move |ctx: &mut Context<'_>, _from: Address, amount: Amount| {
            assert_eq!(ctx.engine().contribution_of(&ledger, 1).unwrap_or(0), UNIT);
            ctx.call(ledger, amount, Call::Contribute)
        });

        engine.contribute(d.ledger, addr(2), UNIT).unwrap();
        assert_eq!(engine.balance(&hook), 0);
        assert_eq!(engine.leaderboard(&d.ledger).unwrap().slot_of(&hook), Some(2));
        assert_eq!(engine.total_balances(), engine.total_minted());
    }

    #[test]
    fn unfunded_root_keeps_first_contribution() {
        let mut engine = funded(&[1, 2]);
        let d = root(&mut engine, 1, 0);
        assert_eq!(engine.leaderboard(&d.ledger).unwrap().owner_of(0), Some(addr(1)));

        engine.contribute(d.ledger, addr(2), 3 * UNIT).unwrap();

        assert_eq!(engine.balance(&addr(1)), 1_000 * UNIT);
        assert_eq!(engine.balance(&addr(2)), 997 * UNIT);
        assert_eq!(engine.balance(&d.ledger), 3 * UNIT);
        let board = engine.leaderboard(&d.ledger).unwrap();
        assert_eq!(board.owner_of(1), Some(addr(2)));
        assert_eq!(board.contribution_of(0).unwrap(), 0);
    }

    #[test]
    fn journal_is_cleared_after_each_call() {
        let mut engine = funded(&[1, 2, 3]);
        let d = root(&mut engine, 1, UNIT);
        engine.contribute(d.ledger, addr(2), UNIT).unwrap();
        assert!(engine.journal.is_empty());

        let _ = engine.contribute(d.ledger, addr(4), UNIT).unwrap_err();
        assert!(engine.journal.is_empty());
        assert_eq!(engine.depth, 0);
    }

    #[test]
    fn failed_deployment_is_fully_undone() {
        let config = EngineConfig {
            capacity: 12,
            max_call_depth: 1,
        };
        let mut engine = Engine::new(config).unwrap();
        engine.mint(addr(1), 10 * UNIT).unwrap();
        engine.mint(addr(2), 10 * UNIT).unwrap();
        let d = root(&mut engine, 1, UNIT);
        let events = engine.events().len();

        // Forwarding the seed upstream needs a second call level
        let err = engine
            .deploy_child(d.ledger, addr(2), ChildParams::new("Child", "C", "CL"), UNIT)
            .unwrap_err();
        assert!(matches!(err, Error::CallDepthExceeded(1)));

        assert_eq!(engine.registry().len(), 1);
        assert_eq!(engine.total_children(&d.ledger), 0);
        assert_eq!(engine.balance(&addr(2)), 10 * UNIT);
        assert_eq!(engine.events().len(), events);
        assert_eq!(engine.total_balances(), engine.total_minted());

        // The deployment counter was restored, so the next root gets the
        // address the failed child would have had
        let next = root(&mut engine, 2, 0);
        assert!(engine.is_instance(&next.ledger));
        assert_eq!(engine.registry().len(), 2);
    }

    #[test]
    fn depth_bound_is_enforced() {
        let config = EngineConfig {
            capacity: 12,
            max_call_depth: 1,
        };
        let mut engine = Engine::new(config).unwrap();
        engine.mint(addr(1), 10).unwrap();
        // transfer → deliver needs two levels
        let err = engine.transfer(addr(1), addr(2), 5).unwrap_err();
        assert!(matches!(err, Error::PaymentDeliveryFailed { .. }));
        assert_eq!(engine.balance(&addr(1)), 10);
    }
}
