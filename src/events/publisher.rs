//! Credential lifecycle events
//!
//! Downstream consumers (plugin activation, cache invalidation) learn about
//! credential changes through these topics. Payloads identify the credential
//! and never carry secret data.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::domain::Credential;
use crate::errors::{Error, Result};

pub const TOPIC_CREATED: &str = "credential.created";
pub const TOPIC_UPDATED: &str = "credential.updated";
pub const TOPIC_DELETED: &str = "credential.deleted";

/// A published topic and its payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialEvent {
    pub topic: String,
    pub payload: Map<String, Value>,
}

impl CredentialEvent {
    pub fn for_credential(topic: &str, credential: &Credential) -> Self {
        let mut payload = Map::new();
        payload.insert("credential_id".into(), Value::String(credential.id.to_string()));
        payload.insert("workspace_id".into(), Value::String(credential.workspace_id.to_string()));
        payload.insert("provider".into(), Value::String(credential.provider.to_string()));
        payload.insert("name".into(), Value::String(credential.name.clone()));
        payload.insert("is_active".into(), Value::Bool(credential.is_active));

        Self { topic: topic.to_string(), payload }
    }
}

/// Sink for lifecycle events
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, topic: &str, payload: &Map<String, Value>) -> Result<()>;
}

/// Logs each event instead of delivering it anywhere
#[derive(Debug, Default, Clone)]
pub struct TracingEventPublisher;

#[async_trait]
impl EventPublisher for TracingEventPublisher {
    async fn publish(&self, topic: &str, payload: &Map<String, Value>) -> Result<()> {
        let credential_id =
            payload.get("credential_id").and_then(serde_json::Value::as_str).unwrap_or_default();
        info!(target: "cloudkeep::events", topic, credential_id, "Credential event");
        Ok(())
    }
}

/// Fans events out to in-process subscribers over a tokio broadcast channel
#[derive(Debug, Clone)]
pub struct BroadcastEventPublisher {
    tx: broadcast::Sender<CredentialEvent>,
}

impl BroadcastEventPublisher {
    pub fn new(capacity: usize) -> (Self, broadcast::Receiver<CredentialEvent>) {
        let (tx, rx) = broadcast::channel(capacity);
        (Self { tx }, rx)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CredentialEvent> {
        self.tx.subscribe()
    }
}

#[async_trait]
impl EventPublisher for BroadcastEventPublisher {
    async fn publish(&self, topic: &str, payload: &Map<String, Value>) -> Result<()> {
        let event = CredentialEvent { topic: topic.to_string(), payload: payload.clone() };
        let receivers = self
            .tx
            .send(event)
            .map_err(|_| Error::internal(format!("No subscribers for {}", topic)))?;

        debug!(topic, receivers, "Broadcast credential event");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ActorId, CredentialId, Provider, WorkspaceId};
    use chrono::Utc;
    use tracing_test::traced_test;

    fn credential() -> Credential {
        let now = Utc::now();
        Credential {
            id: CredentialId::new(),
            workspace_id: WorkspaceId::new(),
            created_by: ActorId::new(),
            provider: Provider::OpenStack,
            name: "lab".to_string(),
            encrypted_data: vec![7u8; 40],
            is_active: true,
            masked_data: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn event_payload_identifies_credential() {
        let credential = credential();
        let event = CredentialEvent::for_credential(TOPIC_CREATED, &credential);

        assert_eq!(event.topic, "credential.created");
        assert_eq!(event.payload["credential_id"], Value::String(credential.id.to_string()));
        assert_eq!(event.payload["provider"], Value::String("openstack".into()));
        assert_eq!(event.payload["is_active"], Value::Bool(true));
        assert!(!event.payload.contains_key("encrypted_data"));
    }

    #[tokio::test]
    #[traced_test]
    async fn tracing_publisher_logs_credential_id() {
        let credential = credential();
        let event = CredentialEvent::for_credential(TOPIC_CREATED, &credential);

        TracingEventPublisher.publish(&event.topic, &event.payload).await.unwrap();

        assert!(logs_contain("Credential event"));
        assert!(logs_contain(credential.id.as_str()));
    }

    #[tokio::test]
    async fn broadcast_reaches_subscribers() {
        let (publisher, mut rx) = BroadcastEventPublisher::new(8);
        let event = CredentialEvent::for_credential(TOPIC_DELETED, &credential());

        publisher.publish(&event.topic, &event.payload).await.unwrap();

        assert_eq!(rx.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn broadcast_without_subscribers_fails() {
        let (publisher, rx) = BroadcastEventPublisher::new(8);
        drop(rx);

        let event = CredentialEvent::for_credential(TOPIC_UPDATED, &credential());
        assert!(publisher.publish(&event.topic, &event.payload).await.is_err());
    }
}
