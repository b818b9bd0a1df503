// End-to-end ingestion scenarios driven by fixture files

use account_indexer::{
    load_updates, sort_by_tokens_desc, AccountFilter, AccountIndexer, AccountKey, EventKind,
    IndexerConfig, IngestReport,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::path::PathBuf;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 9, 30, 0).unwrap()
}

/// Ingest a fixture with zero jitter and a frozen clock
fn ingest(name: &str) -> (AccountIndexer, IngestReport) {
    let loaded = load_updates(fixture(name)).unwrap();
    let mut indexer = AccountIndexer::deterministic(&IndexerConfig::default());
    let report = indexer.ingest_loaded(&loaded, t0);
    (indexer, report)
}

#[test]
fn single_account_update() {
    let (indexer, report) = ingest("single_account_update.json");

    assert_eq!(indexer.ledger().len(), 1);
    assert!(indexer
        .ledger()
        .contains_key(&AccountKey::new("GzbXUY1JQwRVUf3j3myg2NbDRwD5i4jD4HJpYhVNfiDm", 123)));
    assert_eq!(report.accepted, 1);
    assert!(indexer.check_invariants().is_ok());
}

#[test]
fn multi_account_updates_with_callback() {
    let (mut indexer, report) = ingest("multi_account_updates_with_callback.json");

    let ledger = indexer.ledger();
    assert_eq!(ledger.len(), 3);
    assert!(ledger.contains("account1", 2));
    assert!(ledger.contains("account2", 1));
    assert!(ledger.contains("account3", 1));
    assert_eq!(report.superseded, 1);

    // Frozen clock: nothing was due during ingestion
    assert!(report.fired.is_empty());
    assert_eq!(indexer.scheduler().len(), 3);

    let fired = indexer.tick(t0() + Duration::seconds(1));
    let fired: Vec<(String, i64)> = fired.into_iter().map(|f| (f.id, f.version)).collect();
    assert_eq!(
        fired,
        vec![
            ("account3".to_string(), 1),
            ("account1".to_string(), 2),
            ("account2".to_string(), 1),
        ]
    );
    assert!(indexer.scheduler().is_empty());
}

#[test]
fn account_replaced_by_newer_version() {
    let (indexer, _) = ingest("account_replaced_by_newer_version.json");

    assert_eq!(indexer.ledger().len(), 1);
    assert!(indexer.ledger().contains("account1", 2));
    assert!(!indexer.ledger().contains("account1", 1));

    // Lower tokens still win: version decides, not the metric
    assert_eq!(indexer.top_accounts("user")[0].tokens, 50);

    // v1's callback is cancelled before v2's is scheduled
    let journal: Vec<(EventKind, Option<i64>)> = indexer
        .journal()
        .for_account("account1")
        .filter(|e| matches!(e.kind, EventKind::CallbackCancelled | EventKind::CallbackScheduled))
        .map(|e| (e.kind, e.version))
        .collect();
    assert_eq!(
        journal,
        vec![
            (EventKind::CallbackScheduled, Some(1)),
            (EventKind::CallbackCancelled, Some(1)),
            (EventKind::CallbackScheduled, Some(2)),
        ]
    );
    assert_eq!(indexer.scheduler().get("account1").map(|c| c.account.version), Some(2));
}

#[test]
fn multi_account_multi_version_indexing() {
    let (indexer, report) = ingest("multi_account_multi_version_indexing.json");

    assert_eq!(indexer.ledger().len(), 2);
    assert!(indexer.ledger().contains("account1", 3));
    assert!(indexer.ledger().contains("account2", 1));
    assert_eq!(report.stale, 1);
    assert_eq!(indexer.ledger().current("account1").map(|a| a.tokens), Some(300));
}

#[test]
fn accounts_filtered_by_type_and_range() {
    let (indexer, _) = ingest("multi_accounts_to_be_filtered.json");

    let mut filtered = indexer.query(&AccountFilter::new().account_type("user").min_tokens(200).max_tokens(400));
    sort_by_tokens_desc(&mut filtered);

    let found: Vec<(&str, &str, i64)> = filtered
        .iter()
        .map(|a| (a.id.as_str(), a.account_type.as_str(), a.tokens))
        .collect();
    assert_eq!(
        found,
        vec![("id4", "user", 400), ("id3", "user", 300), ("id6", "user", 200)]
    );
}

#[test]
fn ranking_keeps_three_highest_per_type() {
    let (indexer, _) = ingest("multi_accounts_to_be_filtered.json");

    let top: Vec<&str> = indexer.top_accounts("user").iter().map(|a| a.id.as_str()).collect();
    assert_eq!(top, vec!["id5", "id4", "id3"]);
    assert_eq!(indexer.top_accounts("admin").len(), 1);

    // Evicted accounts stay queryable through the ledger
    assert_eq!(indexer.ledger().len(), 6);
    assert_eq!(indexer.journal().count(EventKind::Evicted), 2);
}

#[test]
fn malformed_records_are_skipped_not_fatal() {
    let (indexer, report) = ingest("mixed_quality_updates.json");

    assert_eq!(report.processed, 5);
    assert_eq!(report.malformed, 3);
    assert_eq!(report.accepted, 2);
    assert_eq!(indexer.ledger().len(), 1);
    assert!(indexer.ledger().contains("good", 2));
}

#[test]
fn csv_updates_reconcile_like_json() {
    let (indexer, report) = ingest("updates.csv");

    assert_eq!(report.accepted, 3);
    assert_eq!(report.superseded, 1);
    assert!(indexer.ledger().contains("account1", 2));
    assert_eq!(
        indexer.ledger().current("account1").and_then(|a| a.data.get("nonce").copied()),
        Some(2)
    );
}

#[test]
fn seeded_jitter_stays_within_bounds() {
    let loaded = load_updates(fixture("multi_account_updates_with_callback.json")).unwrap();
    let config = IndexerConfig {
        jitter_seed: Some(17),
        ..IndexerConfig::default()
    };
    let mut indexer = AccountIndexer::from_config(&config);

    for update in &loaded.updates {
        indexer.process_update(update, t0());
    }

    for pending in indexer.scheduler().pending() {
        let base = t0() + Duration::milliseconds(pending.account.callback_time_ms as i64);
        assert!(pending.fire_at >= base);
        assert!(pending.fire_at <= base + Duration::milliseconds(config.max_jitter_ms as i64));
    }
}
