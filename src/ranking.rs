// 🏆 Ranking Table - bounded top-K accounts per account type
//
// Eviction direction is fixed: keep the K highest token counts,
// drop the lowest on overflow.

use crate::account::Account;
use std::collections::HashMap;

pub const DEFAULT_CAPACITY: usize = 3;

// ============================================================================
// TOP-K
// ============================================================================

/// Fixed-capacity collection sorted by descending tokens.
///
/// Ties keep arrival order: an entry inserted later ranks below an
/// earlier one with the same token count, so it is the first to go.
#[derive(Debug, Clone)]
pub struct TopK {
    capacity: usize,
    entries: Vec<Account>,
}

impl TopK {
    pub fn new(capacity: usize) -> Self {
        TopK {
            capacity,
            entries: Vec::new(),
        }
    }

    /// Insert in rank order, then evict the lowest entry if over capacity
    pub fn insert(&mut self, account: Account) -> Option<Account> {
        let pos = self
            .entries
            .iter()
            .position(|held| held.tokens < account.tokens)
            .unwrap_or(self.entries.len());
        self.entries.insert(pos, account);

        if self.entries.len() > self.capacity {
            self.evict_lowest()
        } else {
            None
        }
    }

    fn evict_lowest(&mut self) -> Option<Account> {
        self.entries.pop()
    }

    pub fn remove(&mut self, id: &str) -> Option<Account> {
        let pos = self.entries.iter().position(|a| a.id == id)?;
        Some(self.entries.remove(pos))
    }

    pub fn find(&self, id: &str) -> Option<&Account> {
        self.entries.iter().find(|a| a.id == id)
    }

    pub fn as_slice(&self) -> &[Account] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// RANKING TABLE
// ============================================================================

#[derive(Debug, Clone)]
pub struct RankingTable {
    capacity: usize,
    by_type: HashMap<String, TopK>,
}

impl RankingTable {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        RankingTable {
            capacity,
            by_type: HashMap::new(),
        }
    }

    /// Rank an account; returns the evicted entry when the type was full
    pub fn insert(&mut self, account_type: &str, account: Account) -> Option<Account> {
        let capacity = self.capacity;
        self.by_type
            .entry(account_type.to_string())
            .or_insert_with(|| TopK::new(capacity))
            .insert(account)
    }

    pub fn remove_by_identity(&mut self, account_type: &str, id: &str) -> Option<Account> {
        self.by_type.get_mut(account_type)?.remove(id)
    }

    /// Ranked entries, descending by tokens (empty for unknown types)
    pub fn top_k(&self, account_type: &str) -> &[Account] {
        self.by_type
            .get(account_type)
            .map(TopK::as_slice)
            .unwrap_or(&[])
    }

    pub fn find(&self, account_type: &str, id: &str) -> Option<&Account> {
        self.by_type.get(account_type)?.find(id)
    }

    /// Account types with at least one ranked entry, sorted by name
    pub fn categories(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self
            .by_type
            .iter()
            .filter(|(_, top)| !top.is_empty())
            .map(|(t, _)| t.as_str())
            .collect();
        types.sort_unstable();
        types
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Account])> {
        self.by_type.iter().map(|(t, top)| (t.as_str(), top.as_slice()))
    }
}

impl Default for RankingTable {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================
