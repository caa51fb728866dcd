//! # Audit and Event Side Effects
//!
//! Credential mutations produce an audit record and a lifecycle event. Both
//! are queued in the outbox together with the mutation and delivered by
//! [`OutboxRelay`] in the background, so a slow or failing sink never affects
//! the caller.

pub mod audit;
pub mod outbox;
pub mod publisher;
pub mod relay;

pub use audit::{AuditRecord, AuditRecorder, PostgresAuditRecorder, TracingAuditRecorder};
pub use outbox::{OutboxEntry, OutboxPayload, OutboxStatus};
pub use publisher::{
    BroadcastEventPublisher, CredentialEvent, EventPublisher, TracingEventPublisher,
};
pub use relay::{OutboxRelay, RelayStats};
