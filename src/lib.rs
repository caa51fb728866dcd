//! # Cloudkeep
//!
//! Workspace-scoped lifecycle management for cloud provider credentials
//! (AWS, GCP, Azure, OpenStack). Payloads are validated per provider,
//! optionally live-verified, encrypted with a master key before they reach
//! storage, and only ever returned to callers in masked form.
//!
//! ## Architecture
//!
//! ```text
//! CredentialService ──► CredentialStore (credential row + outbox rows, one transaction)
//!      │                        │
//!      ├─ validation            └──► OutboxRelay ──► AuditRecorder / EventPublisher
//!      ├─ live verification (GCP)
//!      ├─ encryption / masking
//!      └─ workspace access checks
//! ```
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use cloudkeep::{
//!     credentials::{CredentialEncryptor, CredentialService},
//!     domain::{ActorId, CreateCredentialRequest, WorkspaceId},
//!     storage::InMemoryStore,
//!     Result,
//! };
//!
//! # async fn example(encryptor: CredentialEncryptor) -> Result<()> {
//! let service = CredentialService::builder(Arc::new(InMemoryStore::new()), encryptor).build();
//!
//! let data = serde_json::json!({
//!     "access_key": "AKIAEXAMPLE",
//!     "secret_key": "wJalrXUtnFEMI"
//! });
//! let created = service
//!     .create_credential(
//!         &WorkspaceId::new(),
//!         &ActorId::new(),
//!         CreateCredentialRequest {
//!             provider: "aws".to_string(),
//!             name: "prod".to_string(),
//!             data: data.as_object().cloned().unwrap_or_default(),
//!         },
//!     )
//!     .await?;
//! assert!(created.masked_data.is_some());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod credentials;
pub mod domain;
pub mod errors;
pub mod events;
pub mod observability;
pub mod storage;

// Re-export commonly used types and traits
pub use config::AppConfig;
pub use credentials::{
    CredentialEncryptor, CredentialService, CredentialServiceBuilder, InternalCredentialResolver,
};
pub use errors::{Error, Result};
pub use observability::init_logging;

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
