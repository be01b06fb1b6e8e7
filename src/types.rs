//! Shared types for the prediction service.
//!
//! Participants, their predictions, and the domain error taxonomy.
//! Everything the engine, storage, and API layers exchange lives here
//! so those modules can depend on it without depending on each other.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::storage::StoreError;

/// A price quoted in [`TRACKED_CURRENCY`].
///
/// Serialised as a JSON number, so stored prices pass through `f64` and are
/// exact only up to about 15 significant digits. Exchange quotes (at most
/// 8 decimals) fit; longer values are rounded on load.
pub type Price = Decimal;

/// The single asset predictions are made on.
pub const TRACKED_ASSET: &str = "bitcoin";

/// Currency every price is quoted in.
pub const TRACKED_CURRENCY: &str = "USD";

/// Minimum age a prediction must reach before it can be resolved.
pub const COOLDOWN_SECS: i64 = 60;

/// [`COOLDOWN_SECS`] as a chrono duration.
pub fn cooldown() -> Duration {
    Duration::seconds(COOLDOWN_SECS)
}

// ---------------------------------------------------------------------------
// Direction
// ---------------------------------------------------------------------------

/// Which way the participant expects the price to move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Up => write!(f, "up"),
            Direction::Down => write!(f, "down"),
        }
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "up" => Ok(Direction::Up),
            "down" => Ok(Direction::Down),
            other => Err(format!("unknown direction: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Prediction
// ---------------------------------------------------------------------------

/// Where a prediction sits in its lifecycle at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredictionState {
    /// Younger than the cooldown; not yet resolvable.
    Recent,
    /// Cooldown elapsed but no resolution price recorded.
    AwaitingResolution,
    /// Resolution price recorded. Terminal.
    Resolved,
}

/// A single directional bet on the tracked asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub direction: Direction,
    pub created_at: DateTime<Utc>,
    /// Price sampled when the prediction was opened.
    pub reference_price: Price,
    /// Price sampled at resolution. `None` until resolved.
    #[serde(default, deserialize_with = "zero_as_unresolved")]
    pub resolved_price: Option<Price>,
    pub asset: String,
    pub currency: String,
}

impl Prediction {
    /// Open a prediction on the tracked market.
    pub fn open(direction: Direction, reference_price: Price, created_at: DateTime<Utc>) -> Self {
        Self {
            direction,
            created_at,
            reference_price,
            resolved_price: None,
            asset: TRACKED_ASSET.to_string(),
            currency: TRACKED_CURRENCY.to_string(),
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved_price.is_some()
    }

    /// Lifecycle state relative to `now`.
    pub fn state(&self, now: DateTime<Utc>) -> PredictionState {
        if self.is_resolved() {
            PredictionState::Resolved
        } else if now - self.created_at < cooldown() {
            PredictionState::Recent
        } else {
            PredictionState::AwaitingResolution
        }
    }
}

/// Older records stored `0` for "not yet resolved".
fn zero_as_unresolved<'de, D>(deserializer: D) -> Result<Option<Price>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Price>::deserialize(deserializer)?;
    Ok(value.filter(|p| !p.is_zero()))
}

// ---------------------------------------------------------------------------
// Participant
// ---------------------------------------------------------------------------

/// A registered participant and their full prediction history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub score: i64,
    /// Optimistic-concurrency token, bumped by the store on every save.
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub predictions: Vec<Prediction>,
}

impl Participant {
    /// A fresh participant with a zero score and no predictions.
    pub fn new(id: impl Into<String>, name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            email: email.into(),
            score: 0,
            version: 0,
            predictions: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Why a request collided with the one-open-prediction rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictReason {
    InProgress,
    Unresolved,
    ConcurrentUpdate,
}

impl fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictReason::InProgress => write!(f, "prediction in progress"),
            ConflictReason::Unresolved => write!(f, "prior prediction unresolved"),
            ConflictReason::ConcurrentUpdate => write!(f, "participant was modified concurrently"),
        }
    }
}

/// Domain errors surfaced by the vote lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum VoteError {
    #[error("Participant not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(ConflictReason),

    #[error("Could not determine current exchange rate: {0}")]
    DependencyFailure(String),

    #[error("Store failure: {0}")]
    Store(StoreError),
}

impl From<StoreError> for VoteError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::VersionConflict { .. } => VoteError::Conflict(ConflictReason::ConcurrentUpdate),
            StoreError::NotFound(id) => VoteError::NotFound(id),
            other => VoteError::Store(other),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
