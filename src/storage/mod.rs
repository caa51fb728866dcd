//! # Storage and Persistence
//!
//! Persistence contracts for credentials and their outbox, with an in-memory
//! implementation for tests and embedding and a PostgreSQL implementation
//! backed by `sqlx`.
//!
//! Absence is reported as `Ok(None)` from lookups. Mutations take the outbox
//! entries describing them and must write both atomically.

pub mod memory;
pub mod pool;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{Credential, CredentialId, OutboxEntryId, Provider, WorkspaceId};
use crate::errors::Result;
use crate::events::OutboxEntry;

pub use memory::InMemoryStore;
pub use pool::{check_connection, create_pool, run_migrations, DbPool};
pub use postgres::PostgresStore;

/// Credential persistence
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn create(&self, credential: &Credential, outbox: &[OutboxEntry]) -> Result<()>;

    async fn get_by_id(&self, id: &CredentialId) -> Result<Option<Credential>>;

    /// All credentials of a workspace, newest first
    async fn get_by_workspace_id(&self, workspace_id: &WorkspaceId) -> Result<Vec<Credential>>;

    /// Active credentials of a workspace for one provider, newest first
    async fn get_active_by_provider(
        &self,
        workspace_id: &WorkspaceId,
        provider: Provider,
    ) -> Result<Vec<Credential>>;

    /// Overwrite mutable fields. Fails with `NotFound` if the row is gone.
    async fn update(&self, credential: &Credential, outbox: &[OutboxEntry]) -> Result<()>;

    /// Hard delete. Deleting a missing id is not an error.
    async fn delete(&self, id: &CredentialId, outbox: &[OutboxEntry]) -> Result<()>;
}

/// Delivery bookkeeping for queued side effects
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Pending entries due at `now`, oldest first
    async fn pending(&self, limit: usize, now: DateTime<Utc>) -> Result<Vec<OutboxEntry>>;

    async fn mark_delivered(&self, id: &OutboxEntryId) -> Result<()>;

    /// Count a failed attempt. `retry_at = None` gives up and marks the entry failed.
    async fn record_failure(
        &self,
        id: &OutboxEntryId,
        error: &str,
        retry_at: Option<DateTime<Utc>>,
    ) -> Result<()>;
}
