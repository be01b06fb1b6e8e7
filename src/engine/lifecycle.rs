//! Vote lifecycle engine.
//!
//! Opens predictions, resolves them once the cooldown has elapsed, and
//! applies the score delta. Every operation is one read-modify-write of a
//! single participant record; the store's version check rejects the
//! losing side of a concurrent update.
//!
//! Oracle failures are never partially applied: the price is sampled
//! before anything is mutated, and the mutated record is only returned
//! once the store has accepted it.

use chrono::Duration;
use std::sync::Arc;
use tracing::{debug, info};

use super::clock::Clock;
use super::selector;
use crate::oracle::PriceOracle;
use crate::storage::ParticipantStore;
use crate::types::{
    ConflictReason, Direction, Participant, Prediction, PredictionState, Price, VoteError,
};

/// Score change for a resolved prediction.
///
/// A strictly lower resolution price counts as a drop and rewards `Down`.
/// Anything else, including an unchanged price, rewards `Up`.
pub fn score_delta(direction: Direction, reference_price: Price, resolved_price: Price) -> i64 {
    let dropped = reference_price > resolved_price;
    match (dropped, direction) {
        (true, Direction::Down) | (false, Direction::Up) => 1,
        _ => -1,
    }
}

/// Outcome of a resolve request.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// The participant has never predicted.
    NothingToResolve,
    /// Latest prediction is still inside its cooldown.
    Pending(Prediction),
    /// Latest prediction was resolved earlier.
    AlreadyResolved(Prediction),
    /// Latest prediction was resolved by this call.
    Resolved { prediction: Prediction, delta: i64, score: i64 },
}

impl Resolution {
    /// The prediction to report back, if any.
    pub fn prediction(&self) -> Option<&Prediction> {
        match self {
            Resolution::NothingToResolve => None,
            Resolution::Pending(p) | Resolution::AlreadyResolved(p) => Some(p),
            Resolution::Resolved { prediction, .. } => Some(prediction),
        }
    }

    pub fn into_prediction(self) -> Option<Prediction> {
        match self {
            Resolution::NothingToResolve => None,
            Resolution::Pending(p) | Resolution::AlreadyResolved(p) => Some(p),
            Resolution::Resolved { prediction, .. } => Some(prediction),
        }
    }
}

pub struct VoteEngine {
    store: Arc<dyn ParticipantStore>,
    oracle: Arc<dyn PriceOracle>,
    clock: Arc<dyn Clock>,
}

impl VoteEngine {
    pub fn new(
        store: Arc<dyn ParticipantStore>,
        oracle: Arc<dyn PriceOracle>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { store, oracle, clock }
    }

    pub fn store(&self) -> &Arc<dyn ParticipantStore> {
        &self.store
    }

    pub fn oracle(&self) -> &Arc<dyn PriceOracle> {
        &self.oracle
    }

    async fn load(&self, participant_id: &str) -> Result<Participant, VoteError> {
        self.store
            .load(participant_id)
            .await?
            .ok_or_else(|| VoteError::NotFound(participant_id.to_string()))
    }

    /// All predictions for a participant, as stored.
    pub async fn predictions(&self, participant_id: &str) -> Result<Vec<Prediction>, VoteError> {
        Ok(self.load(participant_id).await?.predictions)
    }

    /// Open a new prediction. Fails with a conflict while the latest
    /// prediction is still recent or waiting to be resolved.
    pub async fn open(
        &self,
        participant_id: &str,
        direction: Direction,
    ) -> Result<Vec<Prediction>, VoteError> {
        let mut participant = self.load(participant_id).await?;
        let now = self.clock.now();

        let latest_at = match selector::latest(&participant.predictions) {
            Some(latest) => {
                match latest.state(now) {
                    PredictionState::Recent => {
                        debug!(participant = participant_id, "Open rejected: prediction in progress");
                        return Err(VoteError::Conflict(ConflictReason::InProgress));
                    }
                    PredictionState::AwaitingResolution => {
                        debug!(participant = participant_id, "Open rejected: prior prediction unresolved");
                        return Err(VoteError::Conflict(ConflictReason::Unresolved));
                    }
                    PredictionState::Resolved => {}
                }
                Some(latest.created_at)
            }
            None => None,
        };

        let quote = self.oracle.current_price().await?;

        // Keep the participant's own timestamps strictly increasing so the
        // selector never has to break a tie between them.
        let created_at = match latest_at {
            Some(prev) if prev >= now => prev + Duration::milliseconds(1),
            _ => now,
        };

        participant
            .predictions
            .push(Prediction::open(direction, quote.price, created_at));
        let saved = self.store.save(&participant).await?;

        info!(
            participant = participant_id,
            %direction,
            reference_price = %quote.price,
            source = %quote.source,
            "Prediction opened"
        );
        Ok(saved.predictions)
    }

    /// Resolve the latest prediction if it is eligible; otherwise report it
    /// unchanged. Only the eligible path touches the oracle or the store.
    pub async fn resolve(&self, participant_id: &str) -> Result<Resolution, VoteError> {
        let mut participant = self.load(participant_id).await?;
        let now = self.clock.now();

        let Some(idx) = selector::latest_index(&participant.predictions) else {
            debug!(participant = participant_id, "Nothing to resolve");
            return Ok(Resolution::NothingToResolve);
        };

        match participant.predictions[idx].state(now) {
            PredictionState::Recent => {
                debug!(participant = participant_id, "Latest prediction still in cooldown");
                return Ok(Resolution::Pending(participant.predictions.swap_remove(idx)));
            }
            PredictionState::Resolved => {
                debug!(participant = participant_id, "Latest prediction already resolved");
                return Ok(Resolution::AlreadyResolved(participant.predictions.swap_remove(idx)));
            }
            PredictionState::AwaitingResolution => {}
        }

        let quote = self.oracle.current_price().await?;

        let prediction = &mut participant.predictions[idx];
        prediction.resolved_price = Some(quote.price);
        let delta = score_delta(prediction.direction, prediction.reference_price, quote.price);
        participant.score += delta;

        let saved = self.store.save(&participant).await?;
        let prediction = saved.predictions[idx].clone();

        info!(
            participant = participant_id,
            direction = %prediction.direction,
            reference_price = %prediction.reference_price,
            resolved_price = %quote.price,
            delta,
            score = saved.score,
            "Prediction resolved"
        );
        Ok(Resolution::Resolved { prediction, delta, score: saved.score })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
