// 📒 Ledger - latest accepted snapshot per account
//
// Keyed by (id, version) so a snapshot is always addressed exactly,
// but only one version per id is ever retained (replace-on-update).

use crate::account::{Account, AccountKey};
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct Ledger {
    accounts: HashMap<AccountKey, Account>,

    /// id -> currently held version
    current: HashMap<String, i64>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a snapshot, replacing any other version held for the same id.
    /// Returns the replaced snapshot.
    pub fn put(&mut self, account: Account) -> Option<Account> {
        let replaced = match self.current.get(&account.id).copied() {
            Some(held) => self.accounts.remove(&AccountKey::new(&account.id, held)),
            None => None,
        };

        self.current.insert(account.id.clone(), account.version);
        self.accounts.insert(account.key(), account);

        replaced
    }

    /// Remove the snapshot only if `version` is the one held
    pub fn remove(&mut self, id: &str, version: i64) -> Option<Account> {
        if self.current.get(id) != Some(&version) {
            return None;
        }
        self.current.remove(id);
        self.accounts.remove(&AccountKey::new(id, version))
    }

    pub fn get(&self, id: &str, version: i64) -> Option<&Account> {
        self.accounts.get(&AccountKey::new(id, version))
    }

    pub fn contains(&self, id: &str, version: i64) -> bool {
        self.get(id, version).is_some()
    }

    pub fn contains_key(&self, key: &AccountKey) -> bool {
        self.accounts.contains_key(key)
    }

    pub fn current_version(&self, id: &str) -> Option<i64> {
        self.current.get(id).copied()
    }

    pub fn current(&self, id: &str) -> Option<&Account> {
        self.current_version(id).and_then(|v| self.get(id, v))
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Unordered iteration over held snapshots
    pub fn iter(&self) -> impl Iterator<Item = &Account> {
        self.accounts.values()
    }
}
