//! JSON file participant store.
//!
//! Keeps the full participant map in memory and rewrites the whole file
//! (pretty-printed) after every mutation. Suitable for a single instance;
//! the mutex serialises writers so the file never sees interleaved saves.

use anyhow::Context;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{check_unique, next_version, ParticipantStore, StoreError};
use crate::types::Participant;

pub struct JsonFileStore {
    path: PathBuf,
    participants: Mutex<BTreeMap<String, Participant>>,
}

impl JsonFileStore {
    /// Open the store at `path`, loading existing records if the file exists.
    pub async fn open(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let participants = load_file(&path).await?;
        Ok(Self { path, participants: Mutex::new(participants) })
    }

    async fn persist(&self, participants: &BTreeMap<String, Participant>) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(participants)
            .context("Failed to serialise participants")?;
        tokio::fs::write(&self.path, &json)
            .await
            .with_context(|| format!("Failed to write participants to {}", self.path.display()))?;
        debug!(path = %self.path.display(), count = participants.len(), "Participants saved");
        Ok(())
    }
}

/// Read the participant map from disk. A missing file is an empty store.
async fn load_file(path: &Path) -> anyhow::Result<BTreeMap<String, Participant>> {
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        info!(path = %path.display(), "No participant file found, starting empty");
        return Ok(BTreeMap::new());
    }

    let json = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read participants from {}", path.display()))?;
    let participants: BTreeMap<String, Participant> = serde_json::from_str(&json)
        .with_context(|| format!("Failed to parse participants from {}", path.display()))?;

    info!(path = %path.display(), count = participants.len(), "Participants loaded from disk");
    Ok(participants)
}

#[async_trait]
impl ParticipantStore for JsonFileStore {
    async fn load(&self, id: &str) -> Result<Option<Participant>, StoreError> {
        Ok(self.participants.lock().await.get(id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Participant>, StoreError> {
        let map = self.participants.lock().await;
        Ok(map.values().find(|p| p.email == email).cloned())
    }

    async fn list(&self) -> Result<Vec<Participant>, StoreError> {
        Ok(self.participants.lock().await.values().cloned().collect())
    }

    async fn insert(&self, participant: Participant) -> Result<Participant, StoreError> {
        let mut map = self.participants.lock().await;
        check_unique(map.values(), &participant)?;
        let mut next = map.clone();
        next.insert(participant.id.clone(), participant.clone());
        self.persist(&next).await?;
        *map = next;
        Ok(participant)
    }

    async fn save(&self, participant: &Participant) -> Result<Participant, StoreError> {
        let mut map = self.participants.lock().await;
        let stored = map
            .get(&participant.id)
            .ok_or_else(|| StoreError::NotFound(participant.id.clone()))?;
        let mut updated = participant.clone();
        updated.version = next_version(stored, participant)?;

        let mut next = map.clone();
        next.insert(updated.id.clone(), updated.clone());
        self.persist(&next).await?;
        *map = next;
        Ok(updated)
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let mut map = self.participants.lock().await;
        if !map.contains_key(id) {
            return Ok(false);
        }
        let mut next = map.clone();
        next.remove(id);
        self.persist(&next).await?;
        *map = next;
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
