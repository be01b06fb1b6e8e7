//! Full open → cooldown → resolve cycles against real store backends.

use chrono::{DateTime, Duration, Utc};
use rust_decimal_macros::dec;
use std::sync::Arc;

use pricecall::engine::{selector, Clock, ManualClock, Resolution, VoteEngine};
use pricecall::storage::{InMemoryStore, JsonFileStore, ParticipantStore, SqliteStore};
use pricecall::types::{ConflictReason, Direction, Participant, VoteError};

use crate::mock_oracle::MockOracle;

fn start() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-01-01T19:30:50Z").unwrap().with_timezone(&Utc)
}

async fn seeded(store: Arc<dyn ParticipantStore>) -> Arc<dyn ParticipantStore> {
    store
        .insert(Participant::new("18890123000123", "Test User", "test@gmail.com"))
        .await
        .unwrap();
    store
}

const ID: &str = "18890123000123";

/// Open(Down) at 100, wait 61s, resolve at 90: score 1 and the next Open succeeds.
async fn run_full_cycle(store: Arc<dyn ParticipantStore>) {
    let oracle = MockOracle::new(dec!(100));
    let clock = Arc::new(ManualClock::new(start()));
    let engine = VoteEngine::new(store.clone(), oracle.clone(), clock.clone());

    let predictions = engine.open(ID, Direction::Down).await.unwrap();
    assert_eq!(predictions.len(), 1);
    assert_eq!(predictions[0].reference_price, dec!(100));
    assert_eq!(predictions[0].created_at, start());

    clock.advance(Duration::seconds(61));
    oracle.set_price(dec!(90));

    let resolution = engine.resolve(ID).await.unwrap();
    let prediction = resolution.prediction().unwrap();
    assert_eq!(prediction.resolved_price, Some(dec!(90)));
    assert!(matches!(resolution, Resolution::Resolved { delta: 1, score: 1, .. }));

    let stored = store.load(ID).await.unwrap().unwrap();
    assert_eq!(stored.score, 1);

    let predictions = engine.open(ID, Direction::Up).await.unwrap();
    assert_eq!(predictions.len(), 2);
    let latest = selector::latest(&predictions).unwrap();
    assert_eq!(latest.direction, Direction::Up);
    assert_eq!(latest.reference_price, dec!(90));
    assert_eq!(latest.created_at, clock.now());
    assert_eq!(oracle.calls(), 3);
}

#[tokio::test]
async fn test_full_cycle_in_memory() {
    run_full_cycle(seeded(Arc::new(InMemoryStore::new())).await).await;
}

#[tokio::test]
async fn test_full_cycle_json_file() {
    let mut path = std::env::temp_dir();
    path.push(format!("pricecall_it_{}.json", uuid::Uuid::new_v4()));

    let store = JsonFileStore::open(&path).await.unwrap();
    run_full_cycle(seeded(Arc::new(store)).await).await;

    let reopened = JsonFileStore::open(&path).await.unwrap();
    let stored = reopened.load(ID).await.unwrap().unwrap();
    assert_eq!(stored.score, 1);
    assert_eq!(stored.predictions.len(), 2);

    std::fs::remove_file(&path).unwrap();
}

#[tokio::test]
async fn test_full_cycle_sqlite() {
    let store = SqliteStore::connect("sqlite::memory:").await.unwrap();
    run_full_cycle(seeded(Arc::new(store)).await).await;
}

#[tokio::test]
async fn test_states_gate_open_and_resolve() {
    let store = seeded(Arc::new(InMemoryStore::new())).await;
    let oracle = MockOracle::new(dec!(45234));
    let clock = Arc::new(ManualClock::new(start()));
    let engine = VoteEngine::new(store.clone(), oracle.clone(), clock.clone());

    // Empty history: nothing to resolve, oracle untouched.
    assert_eq!(engine.resolve(ID).await.unwrap(), Resolution::NothingToResolve);
    assert_eq!(oracle.calls(), 0);

    engine.open(ID, Direction::Up).await.unwrap();
    assert_eq!(oracle.calls(), 1);

    // Recent: resolve is a no-op, open conflicts.
    clock.advance(Duration::seconds(30));
    assert!(matches!(engine.resolve(ID).await.unwrap(), Resolution::Pending(_)));
    assert!(matches!(
        engine.open(ID, Direction::Down).await,
        Err(VoteError::Conflict(ConflictReason::InProgress))
    ));
    assert_eq!(oracle.calls(), 1);

    // Awaiting resolution: open conflicts without sampling.
    clock.advance(Duration::seconds(31));
    assert!(matches!(
        engine.open(ID, Direction::Down).await,
        Err(VoteError::Conflict(ConflictReason::Unresolved))
    ));
    assert_eq!(oracle.calls(), 1);

    // Unchanged price resolves in favour of Up.
    let first = engine.resolve(ID).await.unwrap();
    assert!(matches!(first, Resolution::Resolved { delta: 1, .. }));
    assert_eq!(oracle.calls(), 2);

    // Idempotent afterwards.
    let version_before = store.load(ID).await.unwrap().unwrap().version;
    let second = engine.resolve(ID).await.unwrap();
    assert_eq!(second.prediction(), first.prediction());
    assert!(matches!(second, Resolution::AlreadyResolved(_)));
    assert_eq!(oracle.calls(), 2);
    assert_eq!(store.load(ID).await.unwrap().unwrap().version, version_before);
}

#[tokio::test]
async fn test_outage_during_resolve_then_recovery() {
    let store = seeded(Arc::new(InMemoryStore::new())).await;
    let oracle = MockOracle::new(dec!(59760));
    let clock = Arc::new(ManualClock::new(start()));
    let engine = VoteEngine::new(store.clone(), oracle.clone(), clock.clone());

    engine.open(ID, Direction::Down).await.unwrap();
    clock.advance(Duration::minutes(2));

    oracle.set_error("both providers down");
    let err = engine.resolve(ID).await.unwrap_err();
    assert!(matches!(err, VoteError::DependencyFailure(_)));

    let stored = store.load(ID).await.unwrap().unwrap();
    assert_eq!(stored.score, 0);
    assert_eq!(stored.predictions[0].resolved_price, None);

    oracle.clear_error();
    oracle.set_price(dec!(45234));
    let res = engine.resolve(ID).await.unwrap();
    assert!(matches!(res, Resolution::Resolved { delta: 1, score: 1, .. }));
}

#[tokio::test]
async fn test_losing_score_goes_negative() {
    let store = seeded(Arc::new(InMemoryStore::new())).await;
    let oracle = MockOracle::new(dec!(45234));
    let clock = Arc::new(ManualClock::new(start()));
    let engine = VoteEngine::new(store.clone(), oracle.clone(), clock.clone());

    engine.open(ID, Direction::Down).await.unwrap();
    clock.advance(Duration::seconds(60));
    oracle.set_price(dec!(59760));

    let res = engine.resolve(ID).await.unwrap();
    assert!(matches!(res, Resolution::Resolved { delta: -1, score: -1, .. }));
}

#[tokio::test]
async fn test_concurrent_resolves_commit_once() {
    let store = seeded(Arc::new(InMemoryStore::new())).await;
    let clock = Arc::new(ManualClock::new(start()));

    // Open with an ungated oracle, then race two resolves through a gated one.
    let opener = VoteEngine::new(store.clone(), MockOracle::new(dec!(100)), clock.clone());
    opener.open(ID, Direction::Up).await.unwrap();
    clock.advance(Duration::seconds(90));

    let oracle = MockOracle::gated(dec!(110), 2);
    let engine = VoteEngine::new(store.clone(), oracle.clone(), clock.clone());

    let (a, b) = tokio::join!(engine.resolve(ID), engine.resolve(ID));
    let results = [a, b];

    let committed = results.iter().filter(|r| matches!(r, Ok(Resolution::Resolved { .. }))).count();
    let rejected = results
        .iter()
        .filter(|r| matches!(r, Err(VoteError::Conflict(ConflictReason::ConcurrentUpdate))))
        .count();
    assert_eq!(committed, 1);
    assert_eq!(rejected, 1);
    assert_eq!(oracle.calls(), 2);

    let stored = store.load(ID).await.unwrap().unwrap();
    assert_eq!(stored.score, 1);
    assert_eq!(stored.predictions[0].resolved_price, Some(dec!(110)));
}
