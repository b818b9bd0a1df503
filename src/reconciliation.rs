// ⚖️ Reconciliation Engine - keeps ledger, ranking and callbacks in step
//
// Per update (type c, id, version v):
//   no current snapshot      -> index it
//   current v_old, v <= v_old -> reject as stale, touch nothing
//   current v_old, v >  v_old -> cancel callback, drop old snapshot from
//                                ledger and ranking, then index the new one
//
// The three views are only consistent between updates, never mid-update.

use crate::account::{Account, AccountUpdate};
use crate::config::IndexerConfig;
use crate::error::{IndexerError, Result, ValidationError};
use crate::jitter::{FixedJitter, JitterSource, RandomJitter};
use crate::journal::{EventKind, IndexEvent, Journal};
use crate::ledger::Ledger;
use crate::loader::{LoadedUpdates, RecordError};
use crate::query::{filter_accounts, AccountFilter};
use crate::ranking::RankingTable;
use crate::scheduler::{CallbackScheduler, FiredCallback};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};

// ============================================================================
// INGEST OUTCOME
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Indexed; `superseded` holds the replaced version, if any
    Accepted {
        version: i64,
        superseded: Option<i64>,
        fire_at: DateTime<Utc>,
    },

    /// Version not newer than the one already held
    RejectedStale { version: i64, current_version: i64 },

    /// Required field missing or invalid
    RejectedMalformed(Vec<ValidationError>),
}

impl IngestOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, IngestOutcome::Accepted { .. })
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, IngestOutcome::RejectedStale { .. })
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, IngestOutcome::RejectedMalformed(_))
    }
}

// ============================================================================
// INGEST REPORT
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub processed: usize,
    pub accepted: usize,
    pub superseded: usize,
    pub stale: usize,
    pub malformed: usize,
    pub fired: Vec<FiredCallback>,
}

impl IngestReport {
    pub fn record(&mut self, outcome: &IngestOutcome) {
        self.processed += 1;
        match outcome {
            IngestOutcome::Accepted { superseded, .. } => {
                self.accepted += 1;
                if superseded.is_some() {
                    self.superseded += 1;
                }
            }
            IngestOutcome::RejectedStale { .. } => self.stale += 1,
            IngestOutcome::RejectedMalformed(_) => self.malformed += 1,
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "Processed {} updates: {} accepted ({} superseded), {} stale, {} malformed, {} callbacks fired",
            self.processed,
            self.accepted,
            self.superseded,
            self.stale,
            self.malformed,
            self.fired.len()
        )
    }
}

// ============================================================================
// ACCOUNT INDEXER
// ============================================================================

/// Owns the ledger, the ranking table and the callback scheduler.
/// One instance per run (or per test); no shared global state.
pub struct AccountIndexer {
    ledger: Ledger,
    ranking: RankingTable,
    scheduler: CallbackScheduler,
    journal: Journal,
    jitter: Box<dyn JitterSource>,
    max_jitter_ms: u64,
    ranking_capacity: usize,
}

impl AccountIndexer {
    /// Default capacity, random jitter from entropy
    pub fn new() -> Self {
        Self::with_jitter(&IndexerConfig::default(), Box::new(RandomJitter::from_entropy()))
    }

    pub fn from_config(config: &IndexerConfig) -> Self {
        let jitter: Box<dyn JitterSource> = match config.jitter_seed {
            Some(seed) => Box::new(RandomJitter::seeded(seed)),
            None => Box::new(RandomJitter::from_entropy()),
        };
        Self::with_jitter(config, jitter)
    }

    pub fn with_jitter(config: &IndexerConfig, jitter: Box<dyn JitterSource>) -> Self {
        AccountIndexer {
            ledger: Ledger::new(),
            ranking: RankingTable::with_capacity(config.ranking_capacity),
            scheduler: CallbackScheduler::new(),
            journal: Journal::with_capacity(config.journal_capacity),
            jitter,
            max_jitter_ms: config.max_jitter_ms,
            ranking_capacity: config.ranking_capacity,
        }
    }

    /// Zero jitter: fire time is exactly now + callback_time_ms
    pub fn deterministic(config: &IndexerConfig) -> Self {
        Self::with_jitter(config, Box::new(FixedJitter(0)))
    }

    // ------------------------------------------------------------------------
    // ingestion
    // ------------------------------------------------------------------------

    /// Reconcile one update against the current state
    pub fn process_update(&mut self, update: &AccountUpdate, now: DateTime<Utc>) -> IngestOutcome {
        let account = match update.validate() {
            Ok(account) => account,
            Err(errors) => {
                warn!(record = %update.label(), errors = errors.len(), "rejected malformed update");
                self.journal.record(IndexEvent::new(
                    EventKind::RejectedMalformed,
                    update.id.as_deref().unwrap_or(""),
                    update.version,
                    now,
                    json!({ "errors": errors.iter().map(|e| e.to_string()).collect::<Vec<_>>() }),
                ));
                return IngestOutcome::RejectedMalformed(errors);
            }
        };

        let superseded = match self.ledger.current(&account.id).cloned() {
            Some(current) if account.version <= current.version => {
                let current_version = current.version;
                debug!(
                    account = %account.id,
                    version = account.version,
                    current_version,
                    "rejected stale update"
                );
                self.journal.record(IndexEvent::new(
                    EventKind::RejectedStale,
                    &account.id,
                    Some(account.version),
                    now,
                    json!({ "current_version": current_version }),
                ));
                return IngestOutcome::RejectedStale {
                    version: account.version,
                    current_version,
                };
            }
            Some(old) => {
                self.retire(&old, now);
                Some(old.version)
            }
            None => None,
        };

        let version = account.version;
        let fire_at = self.index(account, now);

        self.debug_check();

        IngestOutcome::Accepted {
            version,
            superseded,
            fire_at,
        }
    }

    /// Remove every trace of `old` before its successor is indexed
    fn retire(&mut self, old: &Account, now: DateTime<Utc>) {
        if let Some(cancelled) = self.scheduler.cancel(&old.id) {
            debug!(account = %old.id, version = cancelled.account.version, "cancelled callback");
            self.journal.record(IndexEvent::new(
                EventKind::CallbackCancelled,
                &old.id,
                Some(cancelled.account.version),
                now,
                json!({ "fire_at": cancelled.fire_at }),
            ));
        }

        self.ledger.remove(&old.id, old.version);
        self.ranking.remove_by_identity(&old.account_type, &old.id);

        self.journal.record(IndexEvent::new(
            EventKind::Superseded,
            &old.id,
            Some(old.version),
            now,
            json!({ "account_type": old.account_type, "tokens": old.tokens }),
        ));
    }

    /// Ledger, ranking, then callback. Returns the fire time.
    fn index(&mut self, account: Account, now: DateTime<Utc>) -> DateTime<Utc> {
        let id = account.id.clone();
        let version = account.version;
        let account_type = account.account_type.clone();

        self.ledger.put(account.clone());
        info!(account = %id, version, account_type = %account_type, "account indexed");
        self.journal.record(IndexEvent::new(
            EventKind::Indexed,
            &id,
            Some(version),
            now,
            json!({ "account_type": account_type, "tokens": account.tokens }),
        ));

        if let Some(evicted) = self.ranking.insert(&account_type, account.clone()) {
            debug!(account = %evicted.id, account_type = %account_type, "evicted from ranking");
            self.journal.record(IndexEvent::new(
                EventKind::Evicted,
                &evicted.id,
                Some(evicted.version),
                now,
                json!({ "account_type": account_type, "tokens": evicted.tokens }),
            ));
        }

        let delay_ms = account
            .callback_time_ms
            .saturating_add(self.jitter.next_jitter_ms(self.max_jitter_ms));
        let fire_at = i64::try_from(delay_ms)
            .ok()
            .and_then(|ms| now.checked_add_signed(Duration::milliseconds(ms)))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        self.scheduler.schedule(account, fire_at);
        self.journal.record(IndexEvent::new(
            EventKind::CallbackScheduled,
            &id,
            Some(version),
            now,
            json!({ "fire_at": fire_at }),
        ));

        fire_at
    }

    /// Fire every callback due at or before `now`
    pub fn tick(&mut self, now: DateTime<Utc>) -> Vec<FiredCallback> {
        let fired = self.scheduler.fire_due(now);
        for callback in &fired {
            info!(account = %callback.id, version = callback.version, "callback fired");
            self.journal.record(IndexEvent::new(
                EventKind::CallbackFired,
                &callback.id,
                Some(callback.version),
                now,
                json!({ "fire_at": callback.fire_at }),
            ));
        }
        fired
    }

    /// Process updates in order, sweeping due callbacks after each one
    pub fn ingest_batch<'a, I, F>(&mut self, updates: I, mut clock: F) -> IngestReport
    where
        I: IntoIterator<Item = &'a AccountUpdate>,
        F: FnMut() -> DateTime<Utc>,
    {
        let mut report = IngestReport::default();
        for update in updates {
            let outcome = self.process_update(update, clock());
            self.sweep_into(&mut report, &outcome, clock());
        }
        report
    }

    /// Like `ingest_batch`, but records the loader's undecodable records as
    /// malformed at their original input positions
    pub fn ingest_loaded<F>(&mut self, loaded: &LoadedUpdates, mut clock: F) -> IngestReport
    where
        F: FnMut() -> DateTime<Utc>,
    {
        let mut report = IngestReport::default();
        let mut updates = loaded.updates.iter();
        let mut rejected = loaded.rejected.iter().peekable();

        for index in 0..loaded.len() {
            let outcome = match rejected.next_if(|r| r.index == index) {
                Some(record) => self.reject_undecodable(record, clock()),
                None => match updates.next() {
                    Some(update) => self.process_update(update, clock()),
                    None => break,
                },
            };
            self.sweep_into(&mut report, &outcome, clock());
        }
        report
    }

    fn sweep_into(&mut self, report: &mut IngestReport, outcome: &IngestOutcome, now: DateTime<Utc>) {
        report.record(outcome);
        let fired = self.tick(now);
        report.fired.extend(fired);
    }

    fn reject_undecodable(&mut self, record: &RecordError, now: DateTime<Utc>) -> IngestOutcome {
        self.journal.record(IndexEvent::new(
            EventKind::RejectedMalformed,
            "",
            None,
            now,
            json!({ "index": record.index, "errors": [record.message.as_str()] }),
        ));
        IngestOutcome::RejectedMalformed(vec![ValidationError::new("record", record.message.as_str())])
    }

    // ------------------------------------------------------------------------
    // reads
    // ------------------------------------------------------------------------

    pub fn query(&self, filter: &AccountFilter) -> Vec<Account> {
        filter_accounts(&self.ledger, filter)
    }

    pub fn top_accounts(&self, account_type: &str) -> &[Account] {
        self.ranking.top_k(account_type)
    }

    /// Highest-token accounts per type, types sorted by name
    pub fn top_accounts_report(&self) -> String {
        let mut out = String::new();
        for account_type in self.ranking.categories() {
            out.push_str(&format!("Highest token value accounts for account type {}:\n", account_type));
            for account in self.ranking.top_k(account_type) {
                out.push_str(&format!(
                    "  Account {} v{}: Tokens - {}\n",
                    account.id, account.version, account.tokens
                ));
            }
        }
        out
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn ranking(&self) -> &RankingTable {
        &self.ranking
    }

    pub fn scheduler(&self) -> &CallbackScheduler {
        &self.scheduler
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    // ------------------------------------------------------------------------
    // invariants
    // ------------------------------------------------------------------------

    /// Verify the cross-structure invariants
    pub fn check_invariants(&self) -> Result<()> {
        for (account_type, ranked) in self.ranking.iter() {
            if ranked.len() > self.ranking_capacity {
                return Err(IndexerError::InvariantViolation(format!(
                    "ranking for {} holds {} entries, capacity {}",
                    account_type,
                    ranked.len(),
                    self.ranking_capacity
                )));
            }
            for (i, account) in ranked.iter().enumerate() {
                if ranked[..i].iter().any(|a| a.id == account.id) {
                    return Err(IndexerError::InvariantViolation(format!(
                        "{} ranked twice in {}",
                        account.id, account_type
                    )));
                }
                if !self.ledger.contains(&account.id, account.version) {
                    return Err(IndexerError::InvariantViolation(format!(
                        "{} ranked in {} without ledger entry",
                        account.key(),
                        account_type
                    )));
                }
                if account.account_type != account_type {
                    return Err(IndexerError::InvariantViolation(format!(
                        "{} ranked under {} but has type {}",
                        account.key(),
                        account_type,
                        account.account_type
                    )));
                }
            }
        }

        for pending in self.scheduler.pending() {
            if !self.ledger.contains(&pending.account.id, pending.account.version) {
                return Err(IndexerError::InvariantViolation(format!(
                    "callback pending for {} without ledger entry",
                    pending.account.key()
                )));
            }
        }

        if !self.scheduler.is_consistent() {
            return Err(IndexerError::InvariantViolation(
                "scheduler heap and index disagree".to_string(),
            ));
        }

        Ok(())
    }

    fn debug_check(&self) {
        if cfg!(debug_assertions) {
            if let Err(e) = self.check_invariants() {
                panic!("{}", e);
            }
        }
    }
}

impl Default for AccountIndexer {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================
