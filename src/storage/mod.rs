//! Persistence layer.
//!
//! Defines the `ParticipantStore` trait plus three backends: an in-memory
//! map, a single JSON file, and SQLite via `sqlx`. All backends enforce
//! optimistic concurrency through `Participant::version`.

pub mod memory;
pub mod json_file;
pub mod sqlite;

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::{StorageBackend, StorageConfig};
use crate::types::Participant;

pub use json_file::JsonFileStore;
pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

/// Errors raised by a participant store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Participant not found: {0}")]
    NotFound(String),

    #[error("Participant already exists: {0}")]
    Duplicate(String),

    #[error("Email already registered: {0}")]
    EmailTaken(String),

    #[error("Version conflict for {id}: expected {expected}, found {found}")]
    VersionConflict { id: String, expected: u64, found: u64 },

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Durable keyed storage of participant records.
///
/// `save` is a compare-and-swap on `version`: it only succeeds when the
/// stored record still carries the version the caller loaded, and returns
/// the record with the bumped version.
#[async_trait]
pub trait ParticipantStore: Send + Sync {
    async fn load(&self, id: &str) -> Result<Option<Participant>, StoreError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<Participant>, StoreError>;

    async fn list(&self) -> Result<Vec<Participant>, StoreError>;

    /// Insert a brand-new participant. Fails with `Duplicate` if the id is
    /// taken and `EmailTaken` if another participant owns the email. Both
    /// checks happen atomically with the write.
    async fn insert(&self, participant: Participant) -> Result<Participant, StoreError>;

    async fn save(&self, participant: &Participant) -> Result<Participant, StoreError>;

    /// Remove a participant. Returns whether anything was deleted.
    async fn delete(&self, id: &str) -> Result<bool, StoreError>;
}

/// Reject an insert whose id or email is already present in `existing`.
pub(crate) fn check_unique<'a>(
    mut existing: impl Iterator<Item = &'a Participant>,
    incoming: &Participant,
) -> Result<(), StoreError> {
    match existing.find(|p| p.id == incoming.id || p.email == incoming.email) {
        Some(p) if p.id == incoming.id => Err(StoreError::Duplicate(incoming.id.clone())),
        Some(_) => Err(StoreError::EmailTaken(incoming.email.clone())),
        None => Ok(()),
    }
}

/// Check the loaded version against the stored one and return the next version.
pub(crate) fn next_version(stored: &Participant, incoming: &Participant) -> Result<u64, StoreError> {
    if stored.version != incoming.version {
        return Err(StoreError::VersionConflict {
            id: incoming.id.clone(),
            expected: incoming.version,
            found: stored.version,
        });
    }
    Ok(incoming.version + 1)
}

/// Build the configured store backend.
pub async fn from_config(cfg: &StorageConfig) -> anyhow::Result<Arc<dyn ParticipantStore>> {
    let store: Arc<dyn ParticipantStore> = match cfg.backend {
        StorageBackend::Memory => Arc::new(InMemoryStore::new()),
        StorageBackend::Json => Arc::new(JsonFileStore::open(cfg.path_or("participants.json")).await?),
        StorageBackend::Sqlite => Arc::new(SqliteStore::connect(&cfg.path_or("sqlite://participants.db?mode=rwc")).await?),
    };
    Ok(store)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
