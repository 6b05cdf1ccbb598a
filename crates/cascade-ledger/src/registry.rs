//! Instance registry.
//!
//! Append-only record of every ledger/wallet pair, indexed per parent so
//! `child_at` is O(1).

use crate::math::Amount;
use cascade_quorum::Address;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Naming for a new instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildParams {
    pub name: String,
    pub symbol: String,
    pub leaderboard_symbol: String,
}

impl ChildParams {
    pub fn new(name: impl Into<String>, symbol: impl Into<String>, leaderboard_symbol: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            symbol: symbol.into(),
            leaderboard_symbol: leaderboard_symbol.into(),
        }
    }

    /// Display name of the instance's leaderboard.
    pub fn leaderboard_name(&self) -> String {
        format!("{} Leaderboard", self.name)
    }
}

/// One deployed instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceRecord {
    pub child: Address,
    pub wallet: Address,
    /// `None` for root instances
    pub parent: Option<Address>,
    pub deployer: Address,
    /// Position among the parent's children
    pub order: u64,
    /// Value attached at deployment
    pub seed: Amount,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstanceRegistry {
    records: Vec<InstanceRecord>,
    children: HashMap<Address, Vec<usize>>,
    roots: Vec<usize>,
}

impl InstanceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record. `order` is assigned from the parent's child count.
    pub fn register(
        &mut self,
        child: Address,
        wallet: Address,
        parent: Option<Address>,
        deployer: Address,
        seed: Amount,
    ) -> &InstanceRecord {
        let index = self.records.len();
        let siblings = match parent {
            Some(parent) => self.children.entry(parent).or_default(),
            None => &mut self.roots,
        };
        let order = siblings.len() as u64;
        siblings.push(index);
        self.records.push(InstanceRecord {
            child,
            wallet,
            parent,
            deployer,
            order,
            seed,
        });
        &self.records[index]
    }

    /// Remove the most recent record.
    pub fn unregister_last(&mut self) -> Option<InstanceRecord> {
        let record = self.records.pop()?;
        match record.parent {
            Some(parent) => {
                if let Some(siblings) = self.children.get_mut(&parent) {
                    siblings.pop();
                    if siblings.is_empty() {
                        self.children.remove(&parent);
                    }
                }
            }
            None => {
                self.roots.pop();
            }
        }
        Some(record)
    }

    /// Children deployed under `parent`.
    pub fn total_children(&self, parent: &Address) -> usize {
        self.children.get(parent).map_or(0, Vec::len)
    }

    /// The `index`-th child of `parent`, in deployment order.
    pub fn child_at(&self, parent: &Address, index: usize) -> Option<&InstanceRecord> {
        let record = *self.children.get(parent)?.get(index)?;
        self.records.get(record)
    }

    pub fn roots(&self) -> impl Iterator<Item = &InstanceRecord> {
        self.roots.iter().filter_map(|&i| self.records.get(i))
    }

    /// Look up the record of an instance.
    pub fn record_of(&self, instance: &Address) -> Option<&InstanceRecord> {
        self.records.iter().find(|r| r.child == *instance)
    }

    pub fn records(&self) -> &[InstanceRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
