//! Outbox delivery integration tests.
//!
//! Mutations queue their audit record and lifecycle event in the same store
//! write, and the relay delivers them in the background after being woken.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cloudkeep::{
    config::OutboxConfig,
    domain::{ActorId, UpdateCredentialRequest, WorkspaceId},
    events::{
        AuditRecord, AuditRecorder, BroadcastEventPublisher, OutboxPayload, OutboxRelay,
        OutboxStatus,
    },
    storage::InMemoryStore,
    CredentialEncryptor, CredentialService, Result,
};
use serde_json::json;
use tokio::sync::{oneshot, Mutex};

#[path = "common/mod.rs"]
mod common;
use common::aws_request;

#[derive(Default)]
struct CollectingAuditRecorder {
    actions: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl AuditRecorder for CollectingAuditRecorder {
    async fn record(&self, record: &AuditRecord) -> Result<()> {
        self.actions.lock().await.push((record.action.clone(), record.resource.clone()));
        Ok(())
    }
}

fn fast_config() -> OutboxConfig {
    OutboxConfig { poll_interval_ms: 50, batch_size: 10, max_attempts: 3, retry_backoff_ms: 10 }
}

#[tokio::test]
async fn mutations_queue_audit_and_event_without_secrets() {
    let store = Arc::new(InMemoryStore::new());
    let service = CredentialService::builder(store.clone(), CredentialEncryptor::for_testing()).build();
    let ws = WorkspaceId::new();

    let created = service.create_credential(&ws, &ActorId::new(), aws_request("prod")).await.unwrap();

    let entries = store.outbox_entries().await;
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|e| e.status == OutboxStatus::Pending));

    match (&entries[0].payload, &entries[1].payload) {
        (OutboxPayload::Audit(record), OutboxPayload::Event(event)) => {
            assert_eq!(record.action, "credential.create");
            assert_eq!(record.resource, format!("credentials/{}", created.id));
            assert_eq!(event.topic, "credential.created");
            assert_eq!(event.payload["credential_id"], json!(created.id.to_string()));
        }
        other => panic!("unexpected outbox order: {:?}", other),
    }

    for entry in &entries {
        let serialized = serde_json::to_string(&entry.payload).unwrap();
        assert!(!serialized.contains("wJalrXUtnFEMI"));
    }
}

#[tokio::test]
async fn relay_delivers_lifecycle_in_order() {
    let store = Arc::new(InMemoryStore::new());
    let audit = Arc::new(CollectingAuditRecorder::default());
    let (events, mut rx) = BroadcastEventPublisher::new(16);

    let relay = OutboxRelay::new(store.clone(), audit.clone(), Arc::new(events), fast_config());
    let service = CredentialService::builder(store.clone(), CredentialEncryptor::for_testing())
        .outbox_notifier(relay.notifier())
        .build();

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let worker = tokio::spawn(relay.run(async move {
        let _ = stop_rx.await;
    }));

    let ws = WorkspaceId::new();
    let created = service.create_credential(&ws, &ActorId::new(), aws_request("prod")).await.unwrap();
    service
        .update_credential(
            &ws,
            &created.id,
            UpdateCredentialRequest { name: Some("renamed".to_string()), data: None },
        )
        .await
        .unwrap();
    service.delete_credential(&ws, &created.id).await.unwrap();

    let mut topics = Vec::new();
    for _ in 0..3 {
        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("event delivered in time")
            .unwrap();
        assert_eq!(event.payload["credential_id"], json!(created.id.to_string()));
        topics.push(event.topic);
    }
    assert_eq!(topics, vec!["credential.created", "credential.updated", "credential.deleted"]);

    stop_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(2), worker).await.unwrap().unwrap();

    let actions: Vec<String> = audit.actions.lock().await.iter().map(|(a, _)| a.clone()).collect();
    assert_eq!(actions, vec!["credential.create", "credential.update", "credential.delete"]);

    assert!(store.outbox_entries().await.is_empty());
}

#[tokio::test]
async fn sink_failure_never_reaches_the_caller() {
    let store = Arc::new(InMemoryStore::new());
    // No subscribers: every event delivery fails
    let (events, rx) = BroadcastEventPublisher::new(4);
    drop(rx);

    let relay = OutboxRelay::new(
        store.clone(),
        Arc::new(CollectingAuditRecorder::default()),
        Arc::new(events),
        OutboxConfig { max_attempts: 1, ..fast_config() },
    );
    let service = CredentialService::builder(store.clone(), CredentialEncryptor::for_testing())
        .outbox_notifier(relay.notifier())
        .build();

    let ws = WorkspaceId::new();
    let created = service.create_credential(&ws, &ActorId::new(), aws_request("prod")).await;
    assert!(created.is_ok());

    let stats = relay.run_once().await.unwrap();
    assert_eq!(stats.delivered, 1);
    assert_eq!(stats.failed, 1);

    let statuses: Vec<OutboxStatus> = store.outbox_entries().await.iter().map(|e| e.status).collect();
    assert_eq!(statuses, vec![OutboxStatus::Failed]);
}
