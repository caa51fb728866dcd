//! PostgreSQL credential and outbox store
//!
//! Every mutation runs in one transaction that also inserts the outbox
//! entries describing it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, Postgres, QueryBuilder, Transaction};
use tracing::{error, instrument};

use super::{CredentialStore, DbPool, OutboxStore};
use crate::domain::{
    ActorId, Credential, CredentialId, OutboxEntryId, Provider, WorkspaceId,
};
use crate::errors::{Error, Result};
use crate::events::{OutboxEntry, OutboxPayload, OutboxStatus};

const CREDENTIAL_COLUMNS: &str =
    "id, workspace_id, created_by, provider, name, encrypted_data, is_active, created_at, updated_at";

#[derive(FromRow)]
struct CredentialRow {
    id: String,
    workspace_id: String,
    created_by: String,
    provider: String,
    name: String,
    encrypted_data: Vec<u8>,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<CredentialRow> for Credential {
    type Error = Error;

    fn try_from(row: CredentialRow) -> Result<Self> {
        let provider = row
            .provider
            .parse::<Provider>()
            .map_err(|_| Error::internal(format!("Unknown provider stored for credential {}", row.id)))?;

        Ok(Credential {
            id: CredentialId::from_string(row.id),
            workspace_id: WorkspaceId::from_string(row.workspace_id),
            created_by: ActorId::from_string(row.created_by),
            provider,
            name: row.name,
            encrypted_data: row.encrypted_data,
            is_active: row.is_active,
            masked_data: None,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct OutboxRow {
    id: String,
    payload: sqlx::types::Json<OutboxPayload>,
    status: String,
    attempts: i32,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
    next_attempt_at: DateTime<Utc>,
}

impl TryFrom<OutboxRow> for OutboxEntry {
    type Error = Error;

    fn try_from(row: OutboxRow) -> Result<Self> {
        Ok(OutboxEntry {
            id: OutboxEntryId::from_string(row.id),
            payload: row.payload.0,
            status: row.status.parse::<OutboxStatus>()?,
            attempts: u32::try_from(row.attempts).unwrap_or_default(),
            last_error: row.last_error,
            created_at: row.created_at,
            next_attempt_at: row.next_attempt_at,
        })
    }
}

/// Store backed by a PostgreSQL pool
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: DbPool,
}

impl PostgresStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Get the database pool reference
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>> {
        self.pool.begin().await.map_err(|e| Error::database(e, "Failed to start transaction"))
    }

    async fn enqueue(tx: &mut Transaction<'static, Postgres>, outbox: &[OutboxEntry]) -> Result<()> {
        if outbox.is_empty() {
            return Ok(());
        }

        let mut builder = QueryBuilder::<Postgres>::new(
            "INSERT INTO credential_outbox (id, kind, payload, status, attempts, last_error, created_at, next_attempt_at) ",
        );
        builder.push_values(outbox, |mut b, entry| {
            b.push_bind(entry.id.as_str())
                .push_bind(entry.payload.kind())
                .push_bind(sqlx::types::Json(&entry.payload))
                .push_bind(entry.status.as_str())
                .push_bind(i32::try_from(entry.attempts).unwrap_or(i32::MAX))
                .push_bind(entry.last_error.as_deref())
                .push_bind(entry.created_at)
                .push_bind(entry.next_attempt_at);
        });

        builder
            .build()
            .execute(&mut **tx)
            .await
            .map_err(|e| Error::database(e, "Failed to enqueue outbox entries"))?;

        Ok(())
    }

    async fn commit(tx: Transaction<'static, Postgres>) -> Result<()> {
        tx.commit().await.map_err(|e| Error::database(e, "Failed to commit transaction"))
    }

    async fn fetch_credentials(
        &self,
        query: sqlx::query::QueryAs<'_, Postgres, CredentialRow, sqlx::postgres::PgArguments>,
    ) -> Result<Vec<Credential>> {
        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::database(e, "Failed to list credentials"))?;

        rows.into_iter().map(Credential::try_from).collect()
    }
}

#[async_trait]
impl CredentialStore for PostgresStore {
    #[instrument(skip(self, credential, outbox), fields(credential_id = %credential.id), name = "db_create_credential")]
    async fn create(&self, credential: &Credential, outbox: &[OutboxEntry]) -> Result<()> {
        let mut tx = self.begin().await?;

        sqlx::query(
            "INSERT INTO credentials (id, workspace_id, created_by, provider, name, encrypted_data, is_active, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(&credential.id)
        .bind(&credential.workspace_id)
        .bind(&credential.created_by)
        .bind(credential.provider.as_str())
        .bind(&credential.name)
        .bind(&credential.encrypted_data)
        .bind(credential.is_active)
        .bind(credential.created_at)
        .bind(credential.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            error!(error = %e, credential_id = %credential.id, "Failed to insert credential");
            Error::database(e, format!("Failed to create credential '{}'", credential.id))
        })?;

        Self::enqueue(&mut tx, outbox).await?;
        Self::commit(tx).await
    }

    #[instrument(skip(self), fields(credential_id = %id), name = "db_get_credential")]
    async fn get_by_id(&self, id: &CredentialId) -> Result<Option<Credential>> {
        let row = sqlx::query_as::<_, CredentialRow>(&format!(
            "SELECT {} FROM credentials WHERE id = $1",
            CREDENTIAL_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::database(e, format!("Failed to get credential '{}'", id)))?;

        row.map(Credential::try_from).transpose()
    }

    #[instrument(skip(self), fields(workspace_id = %workspace_id), name = "db_list_credentials")]
    async fn get_by_workspace_id(&self, workspace_id: &WorkspaceId) -> Result<Vec<Credential>> {
        let sql = format!(
            "SELECT {} FROM credentials WHERE workspace_id = $1 ORDER BY created_at DESC",
            CREDENTIAL_COLUMNS
        );
        self.fetch_credentials(sqlx::query_as::<_, CredentialRow>(&sql).bind(workspace_id)).await
    }

    #[instrument(skip(self), fields(workspace_id = %workspace_id, provider = %provider), name = "db_list_active_credentials")]
    async fn get_active_by_provider(
        &self,
        workspace_id: &WorkspaceId,
        provider: Provider,
    ) -> Result<Vec<Credential>> {
        let sql = format!(
            "SELECT {} FROM credentials WHERE workspace_id = $1 AND provider = $2 AND is_active \
             ORDER BY created_at DESC",
            CREDENTIAL_COLUMNS
        );
        self.fetch_credentials(
            sqlx::query_as::<_, CredentialRow>(&sql).bind(workspace_id).bind(provider.as_str()),
        )
        .await
    }

    #[instrument(skip(self, credential, outbox), fields(credential_id = %credential.id), name = "db_update_credential")]
    async fn update(&self, credential: &Credential, outbox: &[OutboxEntry]) -> Result<()> {
        let mut tx = self.begin().await?;

        let result = sqlx::query(
            "UPDATE credentials SET name = $2, encrypted_data = $3, is_active = $4, updated_at = $5 \
             WHERE id = $1",
        )
        .bind(&credential.id)
        .bind(&credential.name)
        .bind(&credential.encrypted_data)
        .bind(credential.is_active)
        .bind(credential.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| Error::database(e, format!("Failed to update credential '{}'", credential.id)))?;

        if result.rows_affected() == 0 {
            return Err(Error::not_found("Credential", credential.id.as_str()));
        }

        Self::enqueue(&mut tx, outbox).await?;
        Self::commit(tx).await
    }

    #[instrument(skip(self, outbox), fields(credential_id = %id), name = "db_delete_credential")]
    async fn delete(&self, id: &CredentialId, outbox: &[OutboxEntry]) -> Result<()> {
        let mut tx = self.begin().await?;

        sqlx::query("DELETE FROM credentials WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| Error::database(e, format!("Failed to delete credential '{}'", id)))?;

        Self::enqueue(&mut tx, outbox).await?;
        Self::commit(tx).await
    }
}

#[async_trait]
impl OutboxStore for PostgresStore {
    async fn pending(&self, limit: usize, now: DateTime<Utc>) -> Result<Vec<OutboxEntry>> {
        let rows = sqlx::query_as::<_, OutboxRow>(
            "SELECT id, payload, status, attempts, last_error, created_at, next_attempt_at \
             FROM credential_outbox \
             WHERE status = 'pending' AND next_attempt_at <= $1 \
             ORDER BY created_at ASC \
             LIMIT $2",
        )
        .bind(now)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::database(e, "Failed to fetch pending outbox entries"))?;

        rows.into_iter().map(OutboxEntry::try_from).collect()
    }

    async fn mark_delivered(&self, id: &OutboxEntryId) -> Result<()> {
        sqlx::query(
            "UPDATE credential_outbox SET status = 'delivered', attempts = attempts + 1, last_error = NULL \
             WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::database(e, format!("Failed to mark outbox entry '{}' delivered", id)))?;

        Ok(())
    }

    async fn record_failure(
        &self,
        id: &OutboxEntryId,
        error: &str,
        retry_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE credential_outbox SET attempts = attempts + 1, last_error = $2, \
             status = CASE WHEN $3::timestamptz IS NULL THEN 'failed' ELSE 'pending' END, \
             next_attempt_at = COALESCE($3, next_attempt_at) \
             WHERE id = $1",
        )
        .bind(id)
        .bind(error)
        .bind(retry_at)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::database(e, format!("Failed to record outbox failure for '{}'", id)))?;

        Ok(())
    }
}
