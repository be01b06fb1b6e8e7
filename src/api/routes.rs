//! API route handlers.
//!
//! All endpoints speak JSON. State is shared via `Arc<ApiState>`; errors
//! are rendered as `{"error": "..."}` with the status mapped from the
//! domain error.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};

use crate::engine::VoteEngine;
use crate::storage::StoreError;
use crate::types::{Direction, Participant, Prediction, Price, VoteError, TRACKED_ASSET, TRACKED_CURRENCY};

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Shared state accessible by all route handlers.
pub struct ApiState {
    pub engine: VoteEngine,
}

impl ApiState {
    pub fn new(engine: VoteEngine) -> Self {
        Self { engine }
    }
}

pub type AppState = Arc<ApiState>;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct NewUserRequest {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VoteRequest {
    #[serde(alias = "vote_direction")]
    pub direction: Direction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub api: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoinResult {
    pub vote_coin: String,
    pub coin_value: Price,
    pub coin_value_currency: String,
    pub query_time: DateTime<Utc>,
    pub source: String,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Vote(VoteError),
}

impl From<VoteError> for ApiError {
    fn from(err: VoteError) -> Self {
        ApiError::Vote(err)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Vote(err.into())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Vote(VoteError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Vote(VoteError::Conflict(_)) => StatusCode::CONFLICT,
            ApiError::Vote(VoteError::DependencyFailure(_)) => StatusCode::FAILED_DEPENDENCY,
            ApiError::Vote(VoteError::Store(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::BadRequest(msg) => msg.clone(),
            ApiError::Vote(VoteError::NotFound(_)) => "User not found".to_string(),
            ApiError::Vote(VoteError::Conflict(reason)) => reason.to_string(),
            ApiError::Vote(VoteError::DependencyFailure(_)) => {
                "Could not determine current exchange rate".to_string()
            }
            ApiError::Vote(VoteError::Store(e)) => {
                error!(error = %e, "Store failure");
                "Internal server error".to_string()
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

// ---------------------------------------------------------------------------
// Participants
// ---------------------------------------------------------------------------

/// GET /users/health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "healthy".into(), api: "users".into() })
}

/// GET /users
pub async fn list_users(State(state): State<AppState>) -> ApiResult<Json<Vec<Participant>>> {
    Ok(Json(state.engine.store().list().await?))
}

/// GET /users/:id
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Participant>> {
    match state.engine.store().load(&id).await? {
        Some(participant) => Ok(Json(participant)),
        None => Err(VoteError::NotFound(id).into()),
    }
}

/// POST /users returns the existing participant if the email is taken.
pub async fn create_user(
    State(state): State<AppState>,
    payload: Result<Json<NewUserRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Participant>)> {
    let Json(req) = payload?;
    if req.name.trim().is_empty() || req.email.trim().is_empty() {
        return Err(ApiError::BadRequest("name and email are required".into()));
    }

    let store = state.engine.store();
    if let Some(existing) = store.find_by_email(&req.email).await? {
        info!(id = %existing.id, "Participant already registered");
        return Ok((StatusCode::CREATED, Json(existing)));
    }

    let id = uuid::Uuid::new_v4().to_string();
    match store.insert(Participant::new(id, req.name, req.email)).await {
        Ok(created) => {
            info!(id = %created.id, "Participant created");
            Ok((StatusCode::CREATED, Json(created)))
        }
        // Lost a registration race for the same email.
        Err(StoreError::EmailTaken(email)) => match store.find_by_email(&email).await? {
            Some(existing) => {
                info!(id = %existing.id, "Participant registered concurrently");
                Ok((StatusCode::CREATED, Json(existing)))
            }
            None => Err(StoreError::EmailTaken(email).into()),
        },
        Err(e) => Err(e.into()),
    }
}

/// DELETE /users/:id
pub async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    if !state.engine.store().delete(&id).await? {
        return Err(VoteError::NotFound(id).into());
    }
    info!(id = %id, "Participant deleted");
    Ok(Json(json!({ "message": "User successfully deleted" })))
}

// ---------------------------------------------------------------------------
// Votes
// ---------------------------------------------------------------------------

/// GET /users/:id/votes
pub async fn get_votes(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<Prediction>>> {
    Ok(Json(state.engine.predictions(&id).await?))
}

/// POST /users/:id/votes
pub async fn create_vote(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<VoteRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Vec<Prediction>>)> {
    let Json(req) = payload?;
    let predictions = state.engine.open(&id, req.direction).await?;
    Ok((StatusCode::CREATED, Json(predictions)))
}

/// GET /users/:id/votes/result resolves the latest prediction when due.
/// An empty 200 means the participant has no predictions.
pub async fn vote_result(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let resolution = state.engine.resolve(&id).await?;
    Ok(match resolution.into_prediction() {
        Some(prediction) => Json(prediction).into_response(),
        None => StatusCode::OK.into_response(),
    })
}

// ---------------------------------------------------------------------------
// Coins
// ---------------------------------------------------------------------------

/// GET /coins/btc
pub async fn coin_price(State(state): State<AppState>) -> ApiResult<Json<CoinResult>> {
    let quote = state.engine.oracle().current_price().await?;
    Ok(Json(CoinResult {
        vote_coin: TRACKED_ASSET.to_string(),
        coin_value: quote.price,
        coin_value_currency: TRACKED_CURRENCY.to_string(),
        query_time: quote.fetched_at,
        source: quote.source,
    }))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
