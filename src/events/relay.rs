//! Background delivery of queued audit records and events
//!
//! The relay wakes when the credential service signals a new mutation or when
//! the poll interval elapses, whichever comes first. Failed deliveries are
//! retried with linear backoff until `max_attempts`, after which the entry is
//! marked failed and left for inspection.

use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use super::audit::AuditRecorder;
use super::outbox::{OutboxEntry, OutboxPayload};
use super::publisher::EventPublisher;
use crate::config::OutboxConfig;
use crate::errors::Result;
use crate::storage::OutboxStore;

/// Drains the outbox into the audit recorder and event publisher
pub struct OutboxRelay {
    store: Arc<dyn OutboxStore>,
    audit: Arc<dyn AuditRecorder>,
    events: Arc<dyn EventPublisher>,
    config: OutboxConfig,
    notify: Arc<Notify>,
}

/// Outcome of one relay pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RelayStats {
    pub delivered: usize,
    pub retried: usize,
    pub failed: usize,
}

impl OutboxRelay {
    pub fn new(
        store: Arc<dyn OutboxStore>,
        audit: Arc<dyn AuditRecorder>,
        events: Arc<dyn EventPublisher>,
        config: OutboxConfig,
    ) -> Self {
        Self { store, audit, events, config, notify: Arc::new(Notify::new()) }
    }

    /// Handle the credential service uses to wake the relay after a mutation
    pub fn notifier(&self) -> Arc<Notify> {
        self.notify.clone()
    }

    /// Deliver one batch of due entries
    pub async fn run_once(&self) -> Result<RelayStats> {
        let entries = self.store.pending(self.config.batch_size, Utc::now()).await?;
        let mut stats = RelayStats::default();

        for entry in entries {
            match self.deliver(&entry).await {
                Ok(()) => {
                    self.store.mark_delivered(&entry.id).await?;
                    stats.delivered += 1;
                    debug!(entry_id = %entry.id, kind = entry.payload.kind(), "Outbox entry delivered");
                }
                Err(e) => {
                    let attempt = entry.attempts + 1;
                    if attempt >= self.config.max_attempts {
                        error!(
                            entry_id = %entry.id,
                            kind = entry.payload.kind(),
                            error = %e,
                            attempts = attempt,
                            "Outbox delivery failed after all retries"
                        );
                        self.store.record_failure(&entry.id, &e.to_string(), None).await?;
                        stats.failed += 1;
                    } else {
                        let delay = self.config.backoff(attempt);
                        warn!(
                            entry_id = %entry.id,
                            kind = entry.payload.kind(),
                            error = %e,
                            attempt,
                            retry_in_ms = delay.as_millis() as u64,
                            "Outbox delivery failed, retrying"
                        );
                        let retry_at = Utc::now()
                            + chrono::Duration::from_std(delay)
                                .unwrap_or_else(|_| chrono::Duration::zero());
                        self.store
                            .record_failure(&entry.id, &e.to_string(), Some(retry_at))
                            .await?;
                        stats.retried += 1;
                    }
                }
            }
        }

        Ok(stats)
    }

    async fn deliver(&self, entry: &OutboxEntry) -> Result<()> {
        match &entry.payload {
            OutboxPayload::Audit(record) => self.audit.record(record).await,
            OutboxPayload::Event(event) => self.events.publish(&event.topic, &event.payload).await,
        }
    }

    /// Run until `shutdown` resolves
    pub async fn run<F>(self, shutdown: F)
    where
        F: Future<Output = ()> + Send,
    {
        info!(
            poll_interval_ms = self.config.poll_interval_ms,
            batch_size = self.config.batch_size,
            max_attempts = self.config.max_attempts,
            "Outbox relay started"
        );

        tokio::pin!(shutdown);
        loop {
            if let Err(e) = self.run_once().await {
                error!(error = %e, "Outbox relay pass failed");
            }

            tokio::select! {
                _ = &mut shutdown => break,
                _ = self.notify.notified() => {}
                _ = tokio::time::sleep(self.config.poll_interval()) => {}
            }
        }

        info!("Outbox relay stopped");
    }
}
