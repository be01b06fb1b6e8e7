//! In-memory participant store. Lost on restart; used for local runs and tests.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{check_unique, next_version, ParticipantStore, StoreError};
use crate::types::Participant;

#[derive(Default)]
pub struct InMemoryStore {
    participants: RwLock<HashMap<String, Participant>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with existing records (versions are kept as given).
    pub fn with_participants(participants: impl IntoIterator<Item = Participant>) -> Self {
        let map = participants.into_iter().map(|p| (p.id.clone(), p)).collect();
        Self { participants: RwLock::new(map) }
    }
}

#[async_trait]
impl ParticipantStore for InMemoryStore {
    async fn load(&self, id: &str) -> Result<Option<Participant>, StoreError> {
        Ok(self.participants.read().await.get(id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Participant>, StoreError> {
        let map = self.participants.read().await;
        Ok(map.values().find(|p| p.email == email).cloned())
    }

    async fn list(&self) -> Result<Vec<Participant>, StoreError> {
        let mut all: Vec<_> = self.participants.read().await.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(all)
    }

    async fn insert(&self, participant: Participant) -> Result<Participant, StoreError> {
        let mut map = self.participants.write().await;
        check_unique(map.values(), &participant)?;
        map.insert(participant.id.clone(), participant.clone());
        Ok(participant)
    }

    async fn save(&self, participant: &Participant) -> Result<Participant, StoreError> {
        let mut map = self.participants.write().await;
        let stored = map
            .get(&participant.id)
            .ok_or_else(|| StoreError::NotFound(participant.id.clone()))?;
        let mut updated = participant.clone();
        updated.version = next_version(stored, participant)?;
        map.insert(updated.id.clone(), updated.clone());
        Ok(updated)
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.participants.write().await.remove(id).is_some())
    }
}
