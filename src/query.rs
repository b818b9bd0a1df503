// 🔎 Query - filtered scan over the ledger

use crate::account::Account;
use crate::ledger::Ledger;
use serde::{Deserialize, Serialize};

/// Unset fields match everything
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountFilter {
    #[serde(default)]
    pub account_type: Option<String>,
    #[serde(default)]
    pub min_tokens: Option<i64>,
    #[serde(default)]
    pub max_tokens: Option<i64>,
}

impl AccountFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn account_type(mut self, account_type: &str) -> Self {
        self.account_type = Some(account_type.to_string());
        self
    }

    pub fn min_tokens(mut self, min: i64) -> Self {
        self.min_tokens = Some(min);
        self
    }

    pub fn max_tokens(mut self, max: i64) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn matches(&self, account: &Account) -> bool {
        if let Some(account_type) = &self.account_type {
            if &account.account_type != account_type {
                return false;
            }
        }
        let min = self.min_tokens.unwrap_or(i64::MIN);
        let max = self.max_tokens.unwrap_or(i64::MAX);
        min <= account.tokens && account.tokens <= max
    }
}

/// Every ledger snapshot matching `filter`, in ledger iteration order
pub fn filter_accounts(ledger: &Ledger, filter: &AccountFilter) -> Vec<Account> {
    ledger
        .iter()
        .filter(|account| filter.matches(account))
        .cloned()
        .collect()
}

/// Descending by tokens, ties by id - for callers that need a stable order
pub fn sort_by_tokens_desc(accounts: &mut [Account]) {
    accounts.sort_by(|a, b| b.tokens.cmp(&a.tokens).then_with(|| a.id.cmp(&b.id)));
}
