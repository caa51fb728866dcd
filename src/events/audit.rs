//! Audit trail for credential mutations
//!
//! Records are produced by the credential service, queued in the outbox in the
//! same write as the mutation, and handed to an [`AuditRecorder`] by the relay.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::PgPool;
use tracing::info;

use crate::domain::{ActorId, Credential};
use crate::errors::{Error, Result};

pub const ACTION_CREATE: &str = "credential.create";
pub const ACTION_UPDATE: &str = "credential.update";
pub const ACTION_DELETE: &str = "credential.delete";

/// Who did what to which credential
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub actor_id: Option<ActorId>,
    pub action: String,
    pub resource: String,
    pub details: Map<String, Value>,
    pub occurred_at: DateTime<Utc>,
}

impl AuditRecord {
    /// Describe a mutation of `credential`. Details never include payload data.
    pub fn for_credential(action: &str, actor_id: Option<ActorId>, credential: &Credential) -> Self {
        let mut details = Map::new();
        details.insert("credential_id".into(), Value::String(credential.id.to_string()));
        details.insert("workspace_id".into(), Value::String(credential.workspace_id.to_string()));
        details.insert("provider".into(), Value::String(credential.provider.to_string()));
        details.insert("name".into(), Value::String(credential.name.clone()));

        Self {
            actor_id,
            action: action.to_string(),
            resource: format!("credentials/{}", credential.id),
            details,
            occurred_at: Utc::now(),
        }
    }
}

/// Sink for audit records
#[async_trait]
pub trait AuditRecorder: Send + Sync {
    async fn record(&self, record: &AuditRecord) -> Result<()>;
}

/// Writes audit records to the log stream
#[derive(Debug, Default, Clone)]
pub struct TracingAuditRecorder;

#[async_trait]
impl AuditRecorder for TracingAuditRecorder {
    async fn record(&self, record: &AuditRecord) -> Result<()> {
        info!(
            target: "cloudkeep::audit",
            actor_id = record.actor_id.as_ref().map(|a| a.as_str()).unwrap_or("system"),
            action = %record.action,
            resource = %record.resource,
            "Audit record"
        );
        Ok(())
    }
}

/// Persists audit records into the `audit_log` table
#[derive(Debug, Clone)]
pub struct PostgresAuditRecorder {
    pool: PgPool,
}

impl PostgresAuditRecorder {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditRecorder for PostgresAuditRecorder {
    async fn record(&self, record: &AuditRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO audit_log (actor_id, action, resource, details, created_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(record.actor_id.as_ref())
        .bind(&record.action)
        .bind(&record.resource)
        .bind(sqlx::types::Json(&record.details))
        .bind(record.occurred_at)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::database(e, "Failed to write credential audit record"))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CredentialId, Provider, WorkspaceId};
    use tracing_test::traced_test;

    fn credential() -> Credential {
        let now = Utc::now();
        Credential {
            id: CredentialId::new(),
            workspace_id: WorkspaceId::new(),
            created_by: ActorId::new(),
            provider: Provider::Aws,
            name: "prod".to_string(),
            encrypted_data: vec![1u8; 40],
            is_active: true,
            masked_data: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn record_describes_credential_without_secrets() {
        let credential = credential();
        let record = AuditRecord::for_credential(ACTION_CREATE, None, &credential);

        assert_eq!(record.action, "credential.create");
        assert_eq!(record.resource, format!("credentials/{}", credential.id));
        assert_eq!(record.details["provider"], Value::String("aws".into()));
        assert_eq!(record.details.len(), 4);
        assert!(!record.details.contains_key("encrypted_data"));
    }

    #[tokio::test]
    #[traced_test]
    async fn tracing_recorder_logs_action() {
        let record = AuditRecord::for_credential(ACTION_DELETE, Some(ActorId::new()), &credential());
        TracingAuditRecorder.record(&record).await.unwrap();
        assert!(logs_contain("credential.delete"));
    }
}
