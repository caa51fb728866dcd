//! In-memory credential and outbox store
//!
//! Credentials and outbox entries live behind one lock so a mutation and its
//! entries become visible together, matching the transactional PostgreSQL
//! store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{CredentialStore, OutboxStore};
use crate::domain::{Credential, CredentialId, OutboxEntryId, Provider, WorkspaceId};
use crate::errors::{Error, Result};
use crate::events::{OutboxEntry, OutboxStatus};

#[derive(Default)]
struct State {
    credentials: HashMap<CredentialId, Credential>,
    outbox: Vec<OutboxEntry>,
}

/// Process-local store, suitable for tests and single-node embedding
#[derive(Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of undelivered outbox entries, in insertion order
    pub async fn outbox_entries(&self) -> Vec<OutboxEntry> {
        self.state.read().await.outbox.clone()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.credentials.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn newest_first(mut credentials: Vec<Credential>) -> Vec<Credential> {
    credentials.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    credentials
}

#[async_trait]
impl CredentialStore for InMemoryStore {
    async fn create(&self, credential: &Credential, outbox: &[OutboxEntry]) -> Result<()> {
        let mut state = self.state.write().await;
        if state.credentials.contains_key(&credential.id) {
            return Err(Error::internal(format!("Credential {} already exists", credential.id)));
        }

        state.credentials.insert(credential.id.clone(), credential.without_masked_data());
        state.outbox.extend_from_slice(outbox);
        Ok(())
    }

    async fn get_by_id(&self, id: &CredentialId) -> Result<Option<Credential>> {
        Ok(self.state.read().await.credentials.get(id).cloned())
    }

    async fn get_by_workspace_id(&self, workspace_id: &WorkspaceId) -> Result<Vec<Credential>> {
        let state = self.state.read().await;
        Ok(newest_first(
            state
                .credentials
                .values()
                .filter(|c| &c.workspace_id == workspace_id)
                .cloned()
                .collect(),
        ))
    }

    async fn get_active_by_provider(
        &self,
        workspace_id: &WorkspaceId,
        provider: Provider,
    ) -> Result<Vec<Credential>> {
        let state = self.state.read().await;
        Ok(newest_first(
            state
                .credentials
                .values()
                .filter(|c| &c.workspace_id == workspace_id && c.provider == provider && c.is_active)
                .cloned()
                .collect(),
        ))
    }

    async fn update(&self, credential: &Credential, outbox: &[OutboxEntry]) -> Result<()> {
        let mut state = self.state.write().await;
        match state.credentials.get_mut(&credential.id) {
            Some(stored) => *stored = credential.without_masked_data(),
            None => return Err(Error::not_found("Credential", credential.id.as_str())),
        }

        state.outbox.extend_from_slice(outbox);
        Ok(())
    }

    async fn delete(&self, id: &CredentialId, outbox: &[OutboxEntry]) -> Result<()> {
        let mut state = self.state.write().await;
        state.credentials.remove(id);
        state.outbox.extend_from_slice(outbox);
        Ok(())
    }
}

#[async_trait]
impl OutboxStore for InMemoryStore {
    async fn pending(&self, limit: usize, now: DateTime<Utc>) -> Result<Vec<OutboxEntry>> {
        let state = self.state.read().await;
        Ok(state.outbox.iter().filter(|e| e.is_due(now)).take(limit).cloned().collect())
    }

    async fn mark_delivered(&self, id: &OutboxEntryId) -> Result<()> {
        // Delivered entries are dropped; failed ones stay for inspection
        let mut state = self.state.write().await;
        let position = state
            .outbox
            .iter()
            .position(|e| &e.id == id)
            .ok_or_else(|| Error::not_found("OutboxEntry", id.as_str()))?;

        state.outbox.remove(position);
        Ok(())
    }

    async fn record_failure(
        &self,
        id: &OutboxEntryId,
        error: &str,
        retry_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        let entry = state
            .outbox
            .iter_mut()
            .find(|e| &e.id == id)
            .ok_or_else(|| Error::not_found("OutboxEntry", id.as_str()))?;

        entry.attempts += 1;
        entry.last_error = Some(error.to_string());
        match retry_at {
            Some(at) => entry.next_attempt_at = at,
            None => entry.status = OutboxStatus::Failed,
        }
        Ok(())
    }
}
