//! Credential domain types
//!
//! The persisted [`Credential`] entity, the provider enumeration, and the
//! transient request types. Plaintext credential data only ever lives in the
//! request types and in decrypted payloads; the entity carries ciphertext.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use super::id::{ActorId, CredentialId, WorkspaceId};

/// Raw credential data as submitted by callers
pub type CredentialData = Map<String, Value>;

/// Cloud provider a credential belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Aws,
    Gcp,
    Azure,
    #[serde(rename = "openstack")]
    OpenStack,
}

impl Provider {
    /// All supported providers
    pub const ALL: [Provider; 4] =
        [Provider::Aws, Provider::Gcp, Provider::Azure, Provider::OpenStack];

    /// Get the database representation of this provider
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Aws => "aws",
            Self::Gcp => "gcp",
            Self::Azure => "azure",
            Self::OpenStack => "openstack",
        }
    }

    /// Whether credentials for this provider are checked online before storage
    pub fn requires_live_verification(&self) -> bool {
        matches!(self, Self::Gcp)
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "aws" => Ok(Self::Aws),
            "gcp" => Ok(Self::Gcp),
            "azure" => Ok(Self::Azure),
            "openstack" => Ok(Self::OpenStack),
            _ => Err(format!("Unknown provider: {}", s)),
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Persisted credential entity
///
/// `provider` and `workspace_id` are fixed at creation. `encrypted_data` is
/// never empty once persisted. `masked_data` is derived on read and is never
/// stored.
#[derive(Clone, Serialize)]
pub struct Credential {
    pub id: CredentialId,
    pub workspace_id: WorkspaceId,
    pub created_by: ActorId,
    pub provider: Provider,
    pub name: String,
    #[serde(skip_serializing)]
    pub encrypted_data: Vec<u8>,
    pub is_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub masked_data: Option<CredentialData>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Credential {
    /// Drop derived fields before handing the entity to a store
    pub fn without_masked_data(&self) -> Self {
        Self { masked_data: None, ..self.clone() }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("id", &self.id)
            .field("workspace_id", &self.workspace_id)
            .field("created_by", &self.created_by)
            .field("provider", &self.provider)
            .field("name", &self.name)
            .field("encrypted_data_len", &self.encrypted_data.len())
            .field("is_active", &self.is_active)
            .field("masked_data", &self.masked_data)
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

/// Create credential request
///
/// `provider` stays a string so unsupported values are reported as a
/// validation failure rather than a deserialization error.
#[derive(Clone, Serialize, Deserialize)]
pub struct CreateCredentialRequest {
    pub provider: String,
    pub name: String,
    pub data: CredentialData,
}

/// Update credential request
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct UpdateCredentialRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<CredentialData>,
}

impl fmt::Debug for CreateCredentialRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreateCredentialRequest")
            .field("provider", &self.provider)
            .field("name", &self.name)
            .field("data_keys", &self.data.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl fmt::Debug for UpdateCredentialRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateCredentialRequest")
            .field("name", &self.name)
            .field("data_keys", &self.data.as_ref().map(|d| d.keys().collect::<Vec<_>>()))
            .finish()
    }
}
