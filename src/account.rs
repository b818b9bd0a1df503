// 💳 Account snapshot + incoming update record
//
// An Account is one accepted version of an account's state.
// Identity is the `id`; everything else is a value that changes per version.

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// ACCOUNT SNAPSHOT
// ============================================================================

/// One accepted version of an account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    /// Stable identity - never changes across versions
    pub id: String,

    /// Category used for ranking (e.g. "user", "admin")
    pub account_type: String,

    /// Ranking key
    pub tokens: i64,

    /// Opaque attributes carried along with the snapshot
    #[serde(default)]
    pub data: HashMap<String, i64>,

    /// Base delay before the callback fires
    pub callback_time_ms: u64,

    /// Monotonic per id
    pub version: i64,
}

impl Account {
    pub fn new(id: &str, account_type: &str, tokens: i64, callback_time_ms: u64, version: i64) -> Self {
        Account {
            id: id.to_string(),
            account_type: account_type.to_string(),
            tokens,
            data: HashMap::new(),
            callback_time_ms,
            version,
        }
    }

    /// Ledger key for this snapshot
    pub fn key(&self) -> AccountKey {
        AccountKey::new(&self.id, self.version)
    }
}

// ============================================================================
// ACCOUNT KEY
// ============================================================================

/// (id, version) - uniquely names a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountKey {
    pub id: String,
    pub version: i64,
}

impl AccountKey {
    pub fn new(id: &str, version: i64) -> Self {
        AccountKey {
            id: id.to_string(),
            version,
        }
    }
}

impl std::fmt::Display for AccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} v{}", self.id, self.version)
    }
}

// ============================================================================
// ACCOUNT UPDATE (raw input record)
// ============================================================================

/// Incoming update as decoded from a file or request body.
///
/// Every field is optional at this layer so a record with missing fields
/// still reaches the indexer and is rejected as malformed there, instead of
/// aborting the whole batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountUpdate {
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub account_type: Option<String>,

    #[serde(default)]
    pub tokens: Option<i64>,

    #[serde(default)]
    pub callback_time_ms: Option<i64>,

    #[serde(default)]
    pub data: Option<HashMap<String, i64>>,

    #[serde(default)]
    pub version: Option<i64>,
}

impl AccountUpdate {
    /// Build a complete update (all required fields set)
    pub fn new(id: &str, account_type: &str, tokens: i64, callback_time_ms: i64, version: i64) -> Self {
        AccountUpdate {
            id: Some(id.to_string()),
            account_type: Some(account_type.to_string()),
            tokens: Some(tokens),
            callback_time_ms: Some(callback_time_ms),
            data: None,
            version: Some(version),
        }
    }

    /// Builder pattern: add one attribute
    pub fn with_attribute(mut self, key: &str, value: i64) -> Self {
        self.data
            .get_or_insert_with(HashMap::new)
            .insert(key.to_string(), value);
        self
    }

    /// Validate required fields and turn the record into a snapshot
    pub fn validate(&self) -> Result<Account, Vec<ValidationError>> {
        let mut errors = Vec::new();

        let id = match self.id.as_deref() {
            Some(id) if !id.trim().is_empty() => Some(id),
            Some(_) => {
                errors.push(ValidationError::new("id", "Required field is empty"));
                None
            }
            None => {
                errors.push(ValidationError::missing("id"));
                None
            }
        };

        let account_type = match self.account_type.as_deref() {
            Some(t) if !t.trim().is_empty() => Some(t),
            Some(_) => {
                errors.push(ValidationError::new("accountType", "Required field is empty"));
                None
            }
            None => {
                errors.push(ValidationError::missing("accountType"));
                None
            }
        };

        if self.tokens.is_none() {
            errors.push(ValidationError::missing("tokens"));
        }

        let callback_time_ms = match self.callback_time_ms {
            Some(ms) if ms >= 0 => Some(ms as u64),
            Some(ms) => {
                errors.push(ValidationError::new(
                    "callbackTimeMs",
                    format!("Must be non-negative, got {}", ms),
                ));
                None
            }
            None => {
                errors.push(ValidationError::missing("callbackTimeMs"));
                None
            }
        };

        if self.version.is_none() {
            errors.push(ValidationError::missing("version"));
        }

        match (id, account_type, self.tokens, callback_time_ms, self.version) {
            (Some(id), Some(account_type), Some(tokens), Some(callback_time_ms), Some(version))
                if errors.is_empty() =>
            {
                Ok(Account {
                    id: id.to_string(),
                    account_type: account_type.to_string(),
                    tokens,
                    data: self.data.clone().unwrap_or_default(),
                    callback_time_ms,
                    version,
                })
            }
            _ => Err(errors),
        }
    }

    /// Best-effort label for log lines about a record that may be malformed
    pub fn label(&self) -> String {
        format!(
            "{} v{}",
            self.id.as_deref().unwrap_or("<no id>"),
            self.version
                .map(|v| v.to_string())
                .unwrap_or_else(|| "?".to_string())
        )
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_complete_update() {
        let update = AccountUpdate::new("account1", "user", 100, 250, 2).with_attribute("nonce", 7);

        let account = update.validate().unwrap();

        assert_eq!(account.id, "account1");
        assert_eq!(account.account_type, "user");
        assert_eq!(account.tokens, 100);
        assert_eq!(account.callback_time_ms, 250);
        assert_eq!(account.version, 2);
        assert_eq!(account.data.get("nonce"), Some(&7));
        assert_eq!(account.key(), AccountKey::new("account1", 2));
    }

    #[test]
    fn test_validate_reports_every_missing_field() {
        let errors = AccountUpdate::default().validate().unwrap_err();

        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec!["id", "accountType", "tokens", "callbackTimeMs", "version"]
        );
    }

    #[test]
    fn test_validate_rejects_negative_delay() {
        let update = AccountUpdate::new("a", "user", 1, -5, 1);

        let errors = update.validate().unwrap_err();

        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "callbackTimeMs");
    }

    #[test]
    fn test_validate_rejects_blank_id() {
        let update = AccountUpdate::new("  ", "user", 1, 0, 1);

        let errors = update.validate().unwrap_err();

        assert_eq!(errors[0].field, "id");
    }

    #[test]
    fn test_update_deserializes_source_field_names() {
        let json = r#"{
            "id": "GzbXUY1JQwRVUf3j3myg2NbDRwD5i4jD4HJpYhVNfiDm",
            "accountType": "mint",
            "tokens": 500,
            "callbackTimeMs": 400,
            "data": {"mintAuthority": 1},
            "version": 123
        }"#;

        let update: AccountUpdate = serde_json::from_str(json).unwrap();
        let account = update.validate().unwrap();

        assert_eq!(account.account_type, "mint");
        assert_eq!(account.version, 123);
        assert_eq!(account.data.get("mintAuthority"), Some(&1));
    }

    #[test]
    fn test_missing_data_defaults_to_empty() {
        let update: AccountUpdate = serde_json::from_str(
            r#"{"id":"a","accountType":"user","tokens":1,"callbackTimeMs":0,"version":1}"#,
        )
        .unwrap();

        assert!(update.validate().unwrap().data.is_empty());
    }

    #[test]
    fn test_label_for_partial_record() {
        let update = AccountUpdate {
            id: Some("acc".to_string()),
            ..Default::default()
        };
        assert_eq!(update.label(), "acc v?");
    }
}
