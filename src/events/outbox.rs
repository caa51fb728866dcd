//! Outbox entries queued alongside credential mutations
//!
//! An entry is written in the same transaction as the credential row it
//! describes, so a crash after commit can delay an audit record or event but
//! never lose it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::audit::AuditRecord;
use super::publisher::CredentialEvent;
use crate::domain::{ActorId, Credential, OutboxEntryId};
use crate::errors::{Error, Result};

/// What the relay hands to which sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutboxPayload {
    Audit(AuditRecord),
    Event(CredentialEvent),
}

impl OutboxPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Audit(_) => "audit",
            Self::Event(_) => "event",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutboxStatus {
    Pending,
    Delivered,
    Failed,
}

impl OutboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Delivered => "delivered",
            Self::Failed => "failed",
        }
    }
}

impl FromStr for OutboxStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "delivered" => Ok(Self::Delivered),
            "failed" => Ok(Self::Failed),
            other => Err(Error::internal(format!("Unknown outbox status: {}", other))),
        }
    }
}

impl fmt::Display for OutboxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pending side effect and its delivery bookkeeping
#[derive(Debug, Clone, PartialEq)]
pub struct OutboxEntry {
    pub id: OutboxEntryId,
    pub payload: OutboxPayload,
    pub status: OutboxStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub next_attempt_at: DateTime<Utc>,
}

impl OutboxEntry {
    pub fn new(payload: OutboxPayload) -> Self {
        let now = Utc::now();
        Self {
            id: OutboxEntryId::new(),
            payload,
            status: OutboxStatus::Pending,
            attempts: 0,
            last_error: None,
            created_at: now,
            next_attempt_at: now,
        }
    }

    /// Audit record plus lifecycle event for one credential mutation
    pub fn for_mutation(
        action: &str,
        topic: &str,
        actor_id: Option<ActorId>,
        credential: &Credential,
    ) -> Vec<Self> {
        vec![
            Self::new(OutboxPayload::Audit(AuditRecord::for_credential(action, actor_id, credential))),
            Self::new(OutboxPayload::Event(CredentialEvent::for_credential(topic, credential))),
        ]
    }

    /// Whether the relay may pick this entry up at `now`
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == OutboxStatus::Pending && self.next_attempt_at <= now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CredentialId, Provider, WorkspaceId};
    use crate::events::{audit, publisher};

    fn credential() -> Credential {
        let now = Utc::now();
        Credential {
            id: CredentialId::new(),
            workspace_id: WorkspaceId::new(),
            created_by: ActorId::new(),
            provider: Provider::Gcp,
            name: "gke".to_string(),
            encrypted_data: vec![3u8; 40],
            is_active: true,
            masked_data: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn mutation_yields_audit_and_event() {
        let entries = OutboxEntry::for_mutation(
            audit::ACTION_UPDATE,
            publisher::TOPIC_UPDATED,
            None,
            &credential(),
        );

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].payload.kind(), "audit");
        assert_eq!(entries[1].payload.kind(), "event");
        assert!(entries.iter().all(|e| e.status == OutboxStatus::Pending && e.attempts == 0));
    }

    #[test]
    fn payload_serializes_with_kind_tag() {
        let entries = OutboxEntry::for_mutation(
            audit::ACTION_CREATE,
            publisher::TOPIC_CREATED,
            Some(ActorId::new()),
            &credential(),
        );

        let json = serde_json::to_value(&entries[1].payload).unwrap();
        assert_eq!(json["kind"], "event");
        assert_eq!(json["topic"], "credential.created");

        let back: OutboxPayload = serde_json::from_value(json).unwrap();
        assert_eq!(back, entries[1].payload);
    }

    #[test]
    fn due_only_when_pending_and_scheduled() {
        let mut entry = OutboxEntry::new(OutboxPayload::Event(CredentialEvent::for_credential(
            publisher::TOPIC_DELETED,
            &credential(),
        )));
        let now = Utc::now();
        assert!(entry.is_due(now));

        entry.next_attempt_at = now + chrono::Duration::seconds(30);
        assert!(!entry.is_due(now));

        entry.next_attempt_at = now;
        entry.status = OutboxStatus::Failed;
        assert!(!entry.is_due(now));
    }

    #[test]
    fn status_round_trips() {
        for status in [OutboxStatus::Pending, OutboxStatus::Delivered, OutboxStatus::Failed] {
            assert_eq!(status.as_str().parse::<OutboxStatus>().unwrap(), status);
        }
        assert!("lost".parse::<OutboxStatus>().is_err());
    }
}
