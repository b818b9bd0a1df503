// 📂 Update loader - JSON / CSV files into AccountUpdate records
//
// Fail-soft per record: a record that cannot be decoded is reported and
// skipped; only an unreadable file or a non-array document is fatal.

use crate::account::AccountUpdate;
use crate::error::{IndexerError, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::warn;

/// A record that could not be decoded at all
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordError {
    /// Position in the input (0-based)
    pub index: usize,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct LoadedUpdates {
    pub updates: Vec<AccountUpdate>,
    pub rejected: Vec<RecordError>,
}

impl LoadedUpdates {
    /// Records seen in the input, decodable or not
    pub fn len(&self) -> usize {
        self.updates.len() + self.rejected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty() && self.rejected.is_empty()
    }
}

/// Pick the decoder from the file extension (`.csv`, anything else is JSON)
pub fn load_updates<P: AsRef<Path>>(path: P) -> Result<LoadedUpdates> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|source| IndexerError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let is_csv = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("csv"))
        .unwrap_or(false);

    if is_csv {
        parse_csv(&content)
    } else {
        parse_json(&content)
    }
}

/// Top-level JSON array of update objects
pub fn parse_json(content: &str) -> Result<LoadedUpdates> {
    let values: Vec<serde_json::Value> = serde_json::from_str(content)?;
    let mut loaded = LoadedUpdates::default();

    for (index, value) in values.into_iter().enumerate() {
        match serde_json::from_value::<AccountUpdate>(value) {
            Ok(update) => loaded.updates.push(update),
            Err(e) => {
                warn!(index, error = %e, "skipping undecodable record");
                loaded.rejected.push(RecordError {
                    index,
                    message: e.to_string(),
                });
            }
        }
    }

    Ok(loaded)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CsvRow {
    id: Option<String>,
    account_type: Option<String>,
    tokens: Option<i64>,
    callback_time_ms: Option<i64>,
    version: Option<i64>,
    /// JSON object, e.g. `{"lamports": 5}`
    #[serde(default)]
    data: Option<String>,
}

impl CsvRow {
    fn into_update(self) -> std::result::Result<AccountUpdate, String> {
        let data = match self.data.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(
                serde_json::from_str::<HashMap<String, i64>>(raw)
                    .map_err(|e| format!("invalid data column: {}", e))?,
            ),
        };

        Ok(AccountUpdate {
            id: self.id.filter(|s| !s.is_empty()),
            account_type: self.account_type.filter(|s| !s.is_empty()),
            tokens: self.tokens,
            callback_time_ms: self.callback_time_ms,
            data,
            version: self.version,
        })
    }
}

/// CSV with header `id,accountType,tokens,callbackTimeMs,version[,data]`
pub fn parse_csv(content: &str) -> Result<LoadedUpdates> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(content.as_bytes());
    let headers = reader.headers()?;
    if !headers.iter().any(|h| h == "id") {
        return Err(IndexerError::Config(
            "csv header must name an `id` column".to_string(),
        ));
    }
    let mut loaded = LoadedUpdates::default();

    for (index, row) in reader.deserialize::<CsvRow>().enumerate() {
        let decoded = row
            .map_err(|e| e.to_string())
            .and_then(CsvRow::into_update);

        match decoded {
            Ok(update) => loaded.updates.push(update),
            Err(message) => {
                warn!(index, error = %message, "skipping undecodable row");
                loaded.rejected.push(RecordError { index, message });
            }
        }
    }

    Ok(loaded)
}
