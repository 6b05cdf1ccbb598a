//! Cascade Ledger
//!
//! A ranked contribution leaderboard that pays every incoming contribution
//! out to its current leaders, governed by the leaders themselves.
//!
//! # Model
//!
//! - An **instance** is a ledger plus a governance wallet.
//! - The ledger's [`LeaderboardLedger`] has up to `capacity` slots. Each
//!   contribution is split across the slots by stake; the contributor then
//!   tops up their slot, takes a free one, evicts the lowest, or gets escrow.
//! - Escrow ([`EscrowLedger`]) is transferable credit that can later contest
//!   the lowest slot or top up a slot.
//! - The wallet ([`GovernanceWallet`]) acts on a strict majority of the
//!   current leaders' signatures over a [`LeaderTransaction`].
//! - Instances deploy children. The deployer holds the child's slot 0, and
//!   value attached at deployment is contributed into the parent through the
//!   child's wallet, so funded children hold stake upstream.
//!
//! # Example
//!
//! ```
//! use cascade_ledger::{ChildParams, Engine, UNIT};
//! use cascade_quorum::Address;
//!
//! let mut engine = Engine::default();
//! let alice = Address::from_bytes([1; 32]);
//! let bob = Address::from_bytes([2; 32]);
//! engine.mint(alice, 10 * UNIT).unwrap();
//! engine.mint(bob, 10 * UNIT).unwrap();
//!
//! let root = engine
//!     .create_root(alice, ChildParams::new("Cascade", "CSC", "CSCL"), UNIT)
//!     .unwrap();
//! engine.contribute(root.ledger, bob, 2 * UNIT).unwrap();
//!
//! // Alice led alone, so she received all of Bob's contribution
//! assert_eq!(engine.balance(&alice), 12 * UNIT);
//! assert_eq!(engine.contribution_of(&root.ledger, 1).unwrap(), 2 * UNIT);
//! ```

pub mod call;
pub mod config;
pub mod engine;
pub mod error;
pub mod escrow;
pub mod events;
pub mod leaderboard;
pub mod math;
pub mod metadata;
pub mod registry;
pub mod simulate;
pub mod wallet;

pub use call::Call;
pub use config::EngineConfig;
pub use engine::{Context, Deployment, Engine, Instance, Recipient};
pub use error::{Error, Result};
pub use escrow::EscrowLedger;
pub use events::LedgerEvent;
pub use leaderboard::{BoardCheckpoint, ContributionOutcome, LeaderboardLedger, Payout, Placement, Slot, SlotId};
pub use math::{mul_div, Amount, UNIT};
pub use metadata::{slot_uri, MetadataStyle};
pub use registry::{ChildParams, InstanceRecord, InstanceRegistry};
pub use simulate::{replay, ReplayInput, ReplayReport};
pub use wallet::{GovernanceWallet, LeaderTransaction};
