//! HTTP flows through the full router.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::{DateTime, Duration, Utc};
use rust_decimal_macros::dec;
use std::sync::Arc;
use tower::ServiceExt;

use pricecall::api::{build_router, ApiState};
use pricecall::engine::{ManualClock, VoteEngine};
use pricecall::storage::{InMemoryStore, ParticipantStore};
use pricecall::types::{Direction, Participant, Prediction};

use crate::mock_oracle::MockOracle;

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, serde_json::Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let body = axum::body::to_bytes(resp.into_body(), 100_000).await.unwrap();
    let json = if body.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn ts(rfc3339: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(rfc3339).unwrap().with_timezone(&Utc)
}

#[tokio::test]
async fn test_register_vote_wait_resolve() {
    let store = Arc::new(InMemoryStore::new());
    let oracle = MockOracle::new(dec!(100));
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let engine = VoteEngine::new(store.clone(), oracle.clone(), clock.clone());
    let app = build_router(Arc::new(ApiState::new(engine)));

    let (status, user) = send(&app, post("/users", serde_json::json!({"name": "John Doe", "email": "john@test.com"}))).await;
    assert_eq!(status, StatusCode::CREATED);
    let id = user["id"].as_str().unwrap().to_string();
    assert!(uuid::Uuid::parse_str(&id).is_ok());

    let (status, votes) = send(&app, post(&format!("/users/{id}/votes"), serde_json::json!({"direction": "down"}))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(votes[0]["direction"], "down");

    // Too early: the prediction comes back untouched.
    let (status, vote) = send(&app, get(&format!("/users/{id}/votes/result"))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(vote["resolved_price"].is_null());

    clock.advance(Duration::seconds(61));
    oracle.set_price(dec!(90));

    let (status, vote) = send(&app, get(&format!("/users/{id}/votes/result"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(vote["resolved_price"], 90.0);

    let (_, user) = send(&app, get(&format!("/users/{id}"))).await;
    assert_eq!(user["score"], 1);

    let (status, votes) = send(&app, post(&format!("/users/{id}/votes"), serde_json::json!({"direction": "up"}))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(votes.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_result_resolves_newest_of_unordered_history() {
    let mut user = Participant::new("18890123000123", "Test User", "test@gmail.com");
    let mut older = Prediction::open(Direction::Up, dec!(45234), ts("2023-10-12T07:20:50.52Z"));
    older.resolved_price = Some(dec!(59760));
    let newer = Prediction::open(Direction::Down, dec!(45234), ts("2024-01-01T19:30:50.52Z"));
    user.predictions = vec![newer, older];

    let store = Arc::new(InMemoryStore::with_participants([user]));
    let oracle = MockOracle::new(dec!(40000));
    let engine = VoteEngine::new(store.clone(), oracle.clone(), Arc::new(ManualClock::new(Utc::now())));
    let app = build_router(Arc::new(ApiState::new(engine)));

    let (status, vote) = send(&app, get("/users/18890123000123/votes/result")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(vote["direction"], "down");
    assert_eq!(vote["resolved_price"], 40000.0);

    let stored = store.load("18890123000123").await.unwrap().unwrap();
    assert_eq!(stored.score, 1);
    assert_eq!(stored.predictions[1].resolved_price, Some(dec!(59760)));
}

#[tokio::test]
async fn test_unresolved_prior_vote_conflicts() {
    let mut user = Participant::new("7", "Late Resolver", "late@test.com");
    user.predictions.push(Prediction::open(Direction::Up, dec!(100), Utc::now() - Duration::hours(1)));

    let store = Arc::new(InMemoryStore::with_participants([user]));
    let oracle = MockOracle::new(dec!(101));
    let engine = VoteEngine::new(store, oracle.clone(), Arc::new(ManualClock::new(Utc::now())));
    let app = build_router(Arc::new(ApiState::new(engine)));

    let (status, body) = send(&app, post("/users/7/votes", serde_json::json!({"direction": "up"}))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "prior prediction unresolved");
    assert_eq!(oracle.calls(), 0);
}
