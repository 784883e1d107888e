// crates/vei-store-sqlite/tests/fixture_store.rs
// ============================================================================
// Module: SQLite Fixture Store Tests
// Description: Persist Sim recordings and replay them from a fresh store.
// Purpose: Ensure fixture sets survive the database byte-for-byte.
// ============================================================================

//! Fixture set persistence tests.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use proptest::prelude::*;
use serde_json::json;
use tempfile::TempDir;
use vei_core::ReplayFixtures;
use vei_core::ResultEnvelope;
use vei_core::runtime::ConnectorMode;
use vei_core::runtime::ConnectorModes;
use vei_core::runtime::Session;
use vei_core::runtime::SessionConfig;
use vei_store_sqlite::SqliteReceiptStore;
use vei_store_sqlite::SqliteStoreConfig;
use vei_store_sqlite::SqliteStoreError;

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn config(mode: ConnectorMode) -> SessionConfig {
    SessionConfig {
        seed: 7,
        modes: ConnectorModes::uniform(mode),
        ..SessionConfig::default()
    }
}

fn drive(session: &mut Session) -> Result<Vec<ResultEnvelope>, Box<dyn std::error::Error>> {
    let calls = [
        ("browser", "read", json!({"url": "https://intranet.example/policy"})),
        ("docs", "search", json!({"query": "travel policy"})),
        ("tickets", "create", json!({"title": "Update policy"})),
    ];
    let mut results = Vec::new();
    for (service, operation, args) in calls {
        results.push(session.dispatch(service, operation, args)?.result);
    }
    Ok(results)
}

#[test]
fn saved_fixtures_replay_in_a_new_process() -> TestResult {
    let temp = TempDir::new()?;
    let path = temp.path().join("fixtures.sqlite");
    let mut recorder = Session::new(config(ConnectorMode::Sim))?;
    let recorded = drive(&mut recorder)?;
    SqliteReceiptStore::new(&SqliteStoreConfig::new(&path))?.save_fixtures("policy", recorder.recorded_fixtures())?;

    let reopened = SqliteReceiptStore::new(&SqliteStoreConfig::new(&path))?;
    let fixtures = reopened.load_fixtures("policy")?.ok_or("fixture set missing")?;
    assert_eq!(&fixtures, recorder.recorded_fixtures());
    let mut replayer = Session::builder(config(ConnectorMode::Replay)).fixtures(fixtures).build()?;
    assert_eq!(drive(&mut replayer)?, recorded);
    assert_eq!(replayer.receipts(), recorder.receipts());
    Ok(())
}

#[test]
fn unknown_set_is_none_and_empty_set_is_some() -> TestResult {
    let temp = TempDir::new()?;
    let store = SqliteReceiptStore::new(&SqliteStoreConfig::new(temp.path().join("f.sqlite")))?;
    assert!(store.load_fixtures("missing")?.is_none());
    store.save_fixtures("empty", &ReplayFixtures::new())?;
    assert_eq!(store.load_fixtures("empty")?, Some(ReplayFixtures::new()));
    Ok(())
}

#[test]
fn saving_a_set_replaces_previous_entries() -> TestResult {
    let temp = TempDir::new()?;
    let store = SqliteReceiptStore::new(&SqliteStoreConfig::new(temp.path().join("f.sqlite")))?;
    let mut recorder = Session::new(config(ConnectorMode::Sim))?;
    drive(&mut recorder)?;
    store.save_fixtures("set", recorder.recorded_fixtures())?;
    store.save_fixtures("set", &ReplayFixtures::new())?;
    assert_eq!(store.load_fixtures("set")?, Some(ReplayFixtures::new()));
    Ok(())
}

#[test]
fn missing_fixture_rows_are_corruption() -> TestResult {
    let temp = TempDir::new()?;
    let path = temp.path().join("f.sqlite");
    let store = SqliteReceiptStore::new(&SqliteStoreConfig::new(&path))?;
    let mut recorder = Session::new(config(ConnectorMode::Sim))?;
    drive(&mut recorder)?;
    store.save_fixtures("set", recorder.recorded_fixtures())?;
    {
        let connection = rusqlite::Connection::open(&path)?;
        connection.execute(
            "DELETE FROM replay_fixtures WHERE rowid = (SELECT MIN(rowid) FROM replay_fixtures)",
            rusqlite::params![],
        )?;
    }
    assert!(matches!(store.load_fixtures("set"), Err(SqliteStoreError::Corrupt(_))));
    Ok(())
}

#[test]
fn fixture_set_names_are_validated() -> TestResult {
    let temp = TempDir::new()?;
    let store = SqliteReceiptStore::new(&SqliteStoreConfig::new(temp.path().join("f.sqlite")))?;
    assert!(matches!(store.save_fixtures("  ", &ReplayFixtures::new()), Err(SqliteStoreError::Invalid(_))));
    assert!(matches!(store.load_fixtures(&"n".repeat(256)), Err(SqliteStoreError::Invalid(_))));
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn any_recorded_set_round_trips(seed in any::<u64>(), queries in proptest::collection::vec("[a-z ]{0,16}", 0 .. 6)) {
        let temp = TempDir::new().unwrap();
        let store = SqliteReceiptStore::new(&SqliteStoreConfig::new(temp.path().join("p.sqlite"))).unwrap();
        let mut recorder = Session::new(SessionConfig { seed, ..config(ConnectorMode::Sim) }).unwrap();
        for query in &queries {
            recorder.dispatch("docs", "search", json!({ "query": query })).unwrap();
        }
        store.save_fixtures("prop", recorder.recorded_fixtures()).unwrap();
        let loaded = store.load_fixtures("prop").unwrap().unwrap();
        prop_assert_eq!(loaded.len(), queries.len());
        prop_assert_eq!(&loaded, recorder.recorded_fixtures());
    }
}
