//! Trusted in-process credential lookup
//!
//! Other subsystems (provisioning, plugin activation) resolve a credential by
//! id without a workspace context. That path skips the workspace check, so it
//! is a separate capability handed out only by
//! [`CredentialServiceBuilder::build_with_internal_resolver`](super::service::CredentialServiceBuilder::build_with_internal_resolver)
//! and never reachable from [`CredentialService`](super::service::CredentialService).

use std::fmt;
use std::sync::Arc;
use tracing::Instrument;

use super::encryption::CredentialEncryptor;
use super::service::decrypt_data;
use super::validation;
use crate::credential_span;
use crate::domain::{Credential, CredentialId, CredentialPayload};
use crate::errors::{Error, Result};
use crate::storage::CredentialStore;

/// A stored credential with its decrypted, typed payload
pub struct ResolvedCredential {
    pub credential: Credential,
    pub payload: CredentialPayload,
}

impl fmt::Debug for ResolvedCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedCredential")
            .field("credential", &self.credential)
            .field("payload", &self.payload)
            .finish()
    }
}

/// Resolves credentials by id, bypassing workspace authorization
pub struct InternalCredentialResolver {
    store: Arc<dyn CredentialStore>,
    encryptor: CredentialEncryptor,
}

impl InternalCredentialResolver {
    pub(crate) fn new(store: Arc<dyn CredentialStore>, encryptor: CredentialEncryptor) -> Self {
        Self { store, encryptor }
    }

    /// Fetch and decrypt. Decryption failures are errors here, not degraded reads.
    pub async fn resolve(&self, id: &CredentialId) -> Result<ResolvedCredential> {
        let span = credential_span!("internal_resolve", credential_id = %id);

        async {
            let credential = self
                .store
                .get_by_id(id)
                .await
                .map_err(|e| match e {
                    Error::NotFound { .. } => e,
                    other => {
                        tracing::error!(error = %other, "Credential store lookup failed");
                        Error::internal("failed to get credential")
                    }
                })?
                .ok_or_else(|| Error::not_found("Credential", id.as_str()))?;

            let data = decrypt_data(&self.encryptor, &credential)?;
            let payload = validation::parse_payload(credential.provider, &data).map_err(|_| {
                Error::internal(format!("Stored payload for credential {} is malformed", id))
            })?;

            tracing::debug!(provider = %credential.provider, "Credential resolved for internal use");
            Ok(ResolvedCredential { credential, payload })
        }
        .instrument(span)
        .await
    }
}

impl fmt::Debug for InternalCredentialResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InternalCredentialResolver").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::service::CredentialService;
    use crate::domain::{ActorId, CreateCredentialRequest, WorkspaceId};
    use crate::storage::InMemoryStore;
    use serde_json::json;

    fn azure_request() -> CreateCredentialRequest {
        CreateCredentialRequest {
            provider: "azure".to_string(),
            name: "sub".to_string(),
            data: json!({
                "client_id": "cid",
                "client_secret": "super-secret-value",
                "tenant_id": "tid",
                "subscription_id": "sub-1"
            })
            .as_object()
            .cloned()
            .unwrap(),
        }
    }

    #[tokio::test]
    async fn resolves_without_workspace_and_redacts_debug() {
        let store = Arc::new(InMemoryStore::new());
        let (service, resolver) =
            CredentialService::builder(store, CredentialEncryptor::for_testing())
                .build_with_internal_resolver();

        let created = service
            .create_credential(&WorkspaceId::new(), &ActorId::new(), azure_request())
            .await
            .unwrap();

        let resolved = resolver.resolve(&created.id).await.unwrap();
        match &resolved.payload {
            CredentialPayload::Azure(sp) => {
                assert_eq!(sp.client_secret, "super-secret-value");
                assert_eq!(sp.extra.get("subscription_id"), Some(&json!("sub-1")));
            }
            other => panic!("unexpected payload {:?}", other),
        }

        assert!(!format!("{:?}", resolved).contains("super-secret-value"));
    }

    #[tokio::test]
    async fn missing_credential_is_not_found() {
        let resolver = InternalCredentialResolver::new(
            Arc::new(InMemoryStore::new()),
            CredentialEncryptor::for_testing(),
        );

        let err = resolver.resolve(&CredentialId::new()).await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }
}
