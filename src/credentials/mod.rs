//! # Credential Lifecycle
//!
//! Validation, live verification, encryption, masking and workspace access
//! control, orchestrated by [`CredentialService`].

pub mod access;
pub mod encryption;
pub mod internal;
pub mod masking;
pub mod service;
pub mod validation;
pub mod verification;

pub use encryption::CredentialEncryptor;
pub use internal::{InternalCredentialResolver, ResolvedCredential};
pub use service::{CredentialService, CredentialServiceBuilder};
#[cfg(feature = "gcp")]
pub use verification::ServiceAccountTokenSource;
pub use verification::{
    AccessTokenSource, GcpAccessVerifier, LiveAccessVerifier, StaticTokenSource, VerificationError,
};
