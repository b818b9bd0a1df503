// Account Indexer - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod account;
pub mod config;
pub mod error;
pub mod jitter;
pub mod journal;
pub mod ledger;
pub mod loader;
pub mod query;
pub mod ranking;
pub mod reconciliation;
pub mod scheduler;

// Re-export commonly used types
pub use account::{Account, AccountKey, AccountUpdate};
pub use config::IndexerConfig;
pub use error::{IndexerError, Result, ValidationError};
pub use jitter::{FixedJitter, JitterSource, RandomJitter, DEFAULT_MAX_JITTER_MS};
pub use journal::{EventKind, IndexEvent, Journal};
pub use ledger::Ledger;
pub use loader::{load_updates, parse_csv, parse_json, LoadedUpdates, RecordError};
pub use query::{filter_accounts, sort_by_tokens_desc, AccountFilter};
pub use ranking::{RankingTable, TopK, DEFAULT_CAPACITY};
pub use reconciliation::{AccountIndexer, IngestOutcome, IngestReport};
pub use scheduler::{CallbackScheduler, FiredCallback, PendingCallback};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
