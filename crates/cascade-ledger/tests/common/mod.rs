//! Shared fixtures for scenario tests.

#![allow(dead_code)]

use cascade_ledger::{Amount, ChildParams, Deployment, Engine, LeaderTransaction, SlotId, UNIT};
use cascade_quorum::{sign, Address, LeaderSignature};
use ed25519_dalek::SigningKey;

/// Starting balance of every test account.
pub const FUNDS: Amount = 10_000 * UNIT;

pub struct Account {
    pub key: SigningKey,
    pub address: Address,
}

/// `n` keyed accounts with distinct deterministic keys.
pub fn accounts(n: usize) -> Vec<Account> {
    (0..n)
        .map(|i| {
            let mut seed = [0u8; 32];
            seed[..8].copy_from_slice(&(i as u64 + 1).to_le_bytes());
            let key = SigningKey::from_bytes(&seed);
            let address = Address::from_verifying_key(&key.verifying_key());
            Account { key, address }
        })
        .collect()
}

/// Default engine with every account funded.
pub fn funded_engine(accounts: &[Account]) -> Engine {
    let mut engine = Engine::default();
    for account in accounts {
        engine.mint(account.address, FUNDS).unwrap();
    }
    engine
}

pub fn params(name: &str) -> ChildParams {
    ChildParams::new(name, name.to_uppercase(), format!("{}L", name.to_uppercase()))
}

/// Root seeded by `accounts[0]`, then one contribution of `amount` from each
/// of the next `leaders - 1` accounts, so slot i belongs to `accounts[i]`.
pub fn root_with_leaders(engine: &mut Engine, accounts: &[Account], leaders: usize, amount: Amount) -> Deployment {
    let root = engine
        .create_root(accounts[0].address, params("Cascade"), amount)
        .unwrap();
    for account in &accounts[1..leaders] {
        engine.contribute(root.ledger, account.address, amount).unwrap();
    }
    root
}

/// Signatures from the accounts owning `slots`, paired with the slot ids.
pub fn approve(tx: &LeaderTransaction, accounts: &[Account], slots: &[SlotId]) -> (Vec<SlotId>, Vec<LeaderSignature>) {
    let hash = tx.message_hash().unwrap();
    let signatures = slots
        .iter()
        .map(|&slot| sign(&accounts[slot as usize].key, &hash))
        .collect();
    (slots.to_vec(), signatures)
}

/// Sum of native balances held by the given addresses.
pub fn balances(engine: &Engine, addresses: &[Address]) -> Amount {
    addresses.iter().map(|a| engine.balance(a)).sum()
}
