//! # Configuration Management
//!
//! Layered configuration (defaults, optional file, environment) for the
//! credential service and the outbox worker.

pub mod settings;

pub use settings::{
    AppConfig, DatabaseConfig, EncryptionConfig, ObservabilityConfig, OutboxConfig,
    VerificationConfig, ENCRYPTION_KEY_ENV, ENCRYPTION_KEY_VERSION_ENV,
};
