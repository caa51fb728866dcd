//! Credential lifecycle orchestration
//!
//! Write path: validate, verify live (GCP), encrypt, persist together with the
//! outbox entries, wake the relay. Read path: fetch, authorize, decrypt, mask.
//!
//! Decryption failures on read degrade to a credential without `masked_data`
//! instead of failing the request. Audit and event delivery happen in the
//! background and never affect the result returned to the caller.

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, error, info, instrument, warn};

use super::access;
use super::encryption::CredentialEncryptor;
use super::internal::InternalCredentialResolver;
use super::masking;
use super::validation;
use super::verification::LiveAccessVerifier;
use crate::domain::{
    ActorId, CreateCredentialRequest, Credential, CredentialData, CredentialId, CredentialPayload,
    Provider, UpdateCredentialRequest, WorkspaceId,
};
use crate::errors::{Error, Result};
use crate::events::{audit, publisher, OutboxEntry};
use crate::storage::CredentialStore;

/// Service for managing stored cloud credentials
pub struct CredentialService {
    store: Arc<dyn CredentialStore>,
    encryptor: CredentialEncryptor,
    verifier: Option<Arc<dyn LiveAccessVerifier>>,
    outbox_signal: Option<Arc<Notify>>,
}

/// Collects the service's collaborators
pub struct CredentialServiceBuilder {
    store: Arc<dyn CredentialStore>,
    encryptor: CredentialEncryptor,
    verifier: Option<Arc<dyn LiveAccessVerifier>>,
    outbox_signal: Option<Arc<Notify>>,
}

impl CredentialServiceBuilder {
    pub fn new(store: Arc<dyn CredentialStore>, encryptor: CredentialEncryptor) -> Self {
        Self { store, encryptor, verifier: None, outbox_signal: None }
    }

    /// Live checker for providers that require one. Without it the check is skipped.
    pub fn verifier(mut self, verifier: Arc<dyn LiveAccessVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    /// Relay wake-up handle, see [`crate::events::OutboxRelay::notifier`]
    pub fn outbox_notifier(mut self, notify: Arc<Notify>) -> Self {
        self.outbox_signal = Some(notify);
        self
    }

    pub fn build(self) -> CredentialService {
        CredentialService {
            store: self.store,
            encryptor: self.encryptor,
            verifier: self.verifier,
            outbox_signal: self.outbox_signal,
        }
    }

    /// Build the service together with the trusted resolver that skips the
    /// workspace check. Hand the resolver only to in-process callers.
    pub fn build_with_internal_resolver(self) -> (CredentialService, InternalCredentialResolver) {
        let resolver = InternalCredentialResolver::new(self.store.clone(), self.encryptor.clone());
        (self.build(), resolver)
    }
}

/// Decrypt a stored payload back into its map form
///
/// JSON errors are reduced to their position so no plaintext reaches the message.
pub(crate) fn decrypt_data(
    encryptor: &CredentialEncryptor,
    credential: &Credential,
) -> Result<CredentialData> {
    let plaintext = encryptor.decrypt(&credential.encrypted_data)?;
    serde_json::from_slice::<CredentialData>(&plaintext).map_err(|e| {
        Error::internal(format!(
            "Stored credential payload is not a JSON object (line {}, column {})",
            e.line(),
            e.column()
        ))
    })
}

/// Map a store failure onto the caller-facing taxonomy
fn store_failure(operation: &'static str) -> impl FnOnce(Error) -> Error {
    move |e| match e {
        Error::NotFound { .. } => e,
        other => {
            error!(operation, error = %other, "Credential store operation failed");
            Error::internal(format!("failed to {} credential", operation))
        }
    }
}

impl CredentialService {
    pub fn builder(
        store: Arc<dyn CredentialStore>,
        encryptor: CredentialEncryptor,
    ) -> CredentialServiceBuilder {
        CredentialServiceBuilder::new(store, encryptor)
    }

    /// Validate, encrypt and store a new credential
    #[instrument(skip(self, request), fields(workspace_id = %workspace_id, provider = %request.provider))]
    pub async fn create_credential(
        &self,
        workspace_id: &WorkspaceId,
        actor_id: &ActorId,
        request: CreateCredentialRequest,
    ) -> Result<Credential> {
        let provider = validation::parse_provider(&request.provider)?;
        let payload = validation::parse_payload(provider, &request.data)?;
        validation::validate_name(&request.name)?;

        if provider.requires_live_verification() {
            self.verify_live(&payload).await?;
        }

        let plaintext = payload.to_json_bytes()?;
        let encrypted_data = self.encryptor.encrypt(&plaintext)?;

        let now = Utc::now();
        let credential = Credential {
            id: CredentialId::new(),
            workspace_id: workspace_id.clone(),
            created_by: actor_id.clone(),
            provider,
            name: request.name,
            encrypted_data,
            is_active: true,
            masked_data: None,
            created_at: now,
            updated_at: now,
        };

        let outbox = OutboxEntry::for_mutation(
            audit::ACTION_CREATE,
            publisher::TOPIC_CREATED,
            Some(actor_id.clone()),
            &credential,
        );
        self.store.create(&credential, &outbox).await.map_err(store_failure("create"))?;
        self.signal_outbox();

        info!(credential_id = %credential.id, provider = %provider, "Credential created");

        Ok(Credential { masked_data: Some(masking::mask(&payload.to_data()?)), ..credential })
    }

    /// All credentials of a workspace, masked where decryption succeeds
    #[instrument(skip(self), fields(workspace_id = %workspace_id))]
    pub async fn get_credentials(&self, workspace_id: &WorkspaceId) -> Result<Vec<Credential>> {
        let credentials = self
            .store
            .get_by_workspace_id(workspace_id)
            .await
            .map_err(store_failure("list"))?;

        Ok(self.masked_for(workspace_id, credentials))
    }

    /// Active credentials of one provider, masked where decryption succeeds
    #[instrument(skip(self), fields(workspace_id = %workspace_id, provider = %provider))]
    pub async fn list_active_credentials(
        &self,
        workspace_id: &WorkspaceId,
        provider: Provider,
    ) -> Result<Vec<Credential>> {
        let credentials = self
            .store
            .get_active_by_provider(workspace_id, provider)
            .await
            .map_err(store_failure("list"))?;

        Ok(self.masked_for(workspace_id, credentials))
    }

    #[instrument(skip(self), fields(workspace_id = %workspace_id, credential_id = %id))]
    pub async fn get_credential_by_id(
        &self,
        workspace_id: &WorkspaceId,
        id: &CredentialId,
    ) -> Result<Credential> {
        let credential = self.fetch_authorized(workspace_id, id).await?;
        Ok(self.with_masked_data(credential))
    }

    /// Rename and/or replace the payload of a credential
    #[instrument(skip(self, request), fields(workspace_id = %workspace_id, credential_id = %id))]
    pub async fn update_credential(
        &self,
        workspace_id: &WorkspaceId,
        id: &CredentialId,
        request: UpdateCredentialRequest,
    ) -> Result<Credential> {
        let mut credential = self.fetch_authorized(workspace_id, id).await?;

        if let Some(name) = request.name {
            validation::validate_name(&name)?;
            credential.name = name;
        }

        let mut replaced = None;
        if let Some(data) = request.data {
            let payload = validation::parse_payload(credential.provider, &data)?;
            credential.encrypted_data = self.encryptor.encrypt(&payload.to_json_bytes()?)?;
            replaced = Some(payload);
        }

        credential.updated_at = Utc::now();

        // Attributed to the creator: update and delete carry no acting user
        let outbox = OutboxEntry::for_mutation(
            audit::ACTION_UPDATE,
            publisher::TOPIC_UPDATED,
            Some(credential.created_by.clone()),
            &credential,
        );
        self.store.update(&credential, &outbox).await.map_err(store_failure("update"))?;
        self.signal_outbox();

        info!(credential_id = %credential.id, data_replaced = replaced.is_some(), "Credential updated");

        match replaced {
            Some(payload) => {
                Ok(Credential { masked_data: Some(masking::mask(&payload.to_data()?)), ..credential })
            }
            None => Ok(self.with_masked_data(credential)),
        }
    }

    #[instrument(skip(self), fields(workspace_id = %workspace_id, credential_id = %id))]
    pub async fn delete_credential(&self, workspace_id: &WorkspaceId, id: &CredentialId) -> Result<()> {
        let credential = self.fetch_authorized(workspace_id, id).await?;

        let outbox = OutboxEntry::for_mutation(
            audit::ACTION_DELETE,
            publisher::TOPIC_DELETED,
            Some(credential.created_by.clone()),
            &credential,
        );
        self.store.delete(&credential.id, &outbox).await.map_err(store_failure("delete"))?;
        self.signal_outbox();

        info!(credential_id = %credential.id, provider = %credential.provider, "Credential deleted");

        Ok(())
    }

    async fn fetch_authorized(
        &self,
        workspace_id: &WorkspaceId,
        id: &CredentialId,
    ) -> Result<Credential> {
        let credential = self
            .store
            .get_by_id(id)
            .await
            .map_err(store_failure("get"))?
            .ok_or_else(|| Error::not_found("Credential", id.as_str()))?;

        access::authorize(workspace_id, &credential)?;
        Ok(credential)
    }

    async fn verify_live(&self, payload: &CredentialPayload) -> Result<()> {
        let CredentialPayload::Gcp(account) = payload else {
            return Ok(());
        };

        let Some(verifier) = &self.verifier else {
            debug!("No live verifier configured, skipping GCP access check");
            return Ok(());
        };

        verifier.verify(account).await.map_err(|e| {
            warn!(project_id = %account.project_id, error = %e, "GCP credential verification failed");
            Error::verification_failed(format!("GCP credential validation failed: {}", e), e)
        })
    }

    fn masked_for(&self, workspace_id: &WorkspaceId, credentials: Vec<Credential>) -> Vec<Credential> {
        credentials
            .into_iter()
            .filter(|c| access::authorize(workspace_id, c).is_ok())
            .map(|c| self.with_masked_data(c))
            .collect()
    }

    fn with_masked_data(&self, credential: Credential) -> Credential {
        match decrypt_data(&self.encryptor, &credential) {
            Ok(data) => Credential { masked_data: Some(masking::mask(&data)), ..credential },
            Err(e) => {
                warn!(
                    credential_id = %credential.id,
                    error = %e,
                    "Failed to decrypt credential for masking"
                );
                Credential { masked_data: None, ..credential }
            }
        }
    }

    fn signal_outbox(&self) {
        if let Some(notify) = &self.outbox_signal {
            notify.notify_one();
        }
    }
}
