//! Domain layer
//!
//! Credential entities, typed identifiers and provider payloads. Nothing in
//! this module performs I/O.
//!
//! ## Module Organization
//!
//! - `id`: Type-safe domain identifiers with NewType pattern
//! - `credential`: Persisted credential entity, provider enum, request types
//! - `payload`: Provider-specific typed credential payloads

pub mod credential;
pub mod id;
pub mod payload;

pub use credential::{
    CreateCredentialRequest, Credential, CredentialData, Provider, UpdateCredentialRequest,
};
pub use id::{ActorId, CredentialId, OutboxEntryId, WorkspaceId};
pub use payload::{
    AwsCredentials, AzureServicePrincipal, CredentialPayload, GcpServiceAccount,
    OpenStackCredentials,
};
