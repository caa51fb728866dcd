//! Workspace-scoped access control for stored credentials
//!
//! Authorization is by workspace, not by creator: any member of the owning
//! workspace may read, update or delete a credential.

use crate::domain::{Credential, WorkspaceId};
use crate::errors::{Error, Result};

/// Allow access only when the requester's workspace owns the credential
pub fn authorize(requester_workspace_id: &WorkspaceId, credential: &Credential) -> Result<()> {
    if requester_workspace_id == &credential.workspace_id {
        return Ok(());
    }

    tracing::warn!(
        credential_id = %credential.id,
        requester_workspace_id = %requester_workspace_id,
        "Cross-workspace credential access denied"
    );
    Err(Error::forbidden("access denied"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ActorId, CredentialId, Provider};
    use chrono::Utc;

    fn credential_in(workspace_id: WorkspaceId) -> Credential {
        let now = Utc::now();
        Credential {
            id: CredentialId::new(),
            workspace_id,
            created_by: ActorId::new(),
            provider: Provider::Azure,
            name: "shared".to_string(),
            encrypted_data: vec![0u8; 40],
            is_active: true,
            masked_data: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn same_workspace_is_allowed_regardless_of_creator() {
        let workspace = WorkspaceId::new();
        let credential = credential_in(workspace.clone());
        assert!(authorize(&workspace, &credential).is_ok());
    }

    #[test]
    fn other_workspace_is_forbidden() {
        let credential = credential_in(WorkspaceId::new());
        let err = authorize(&WorkspaceId::new(), &credential).unwrap_err();
        assert!(matches!(err, Error::Forbidden { .. }));
    }
}
