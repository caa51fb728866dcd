//! # Configuration Settings
//!
//! Defines the configuration structure for the credential service and its worker.

use crate::errors::{Error, Result};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use validator::Validate;

/// Environment variable holding the base64-encoded master key
pub const ENCRYPTION_KEY_ENV: &str = "CLOUDKEEP_ENCRYPTION_KEY";

/// Environment variable holding the master key version label
pub const ENCRYPTION_KEY_VERSION_ENV: &str = "CLOUDKEEP_ENCRYPTION_KEY_VERSION";

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Master-key encryption configuration
    #[validate(nested)]
    pub encryption: EncryptionConfig,

    /// Live credential verification configuration
    #[validate(nested)]
    pub verification: VerificationConfig,

    /// Database configuration
    #[validate(nested)]
    pub database: DatabaseConfig,

    /// Outbox relay configuration
    #[validate(nested)]
    pub outbox: OutboxConfig,

    /// Logging configuration
    #[validate(nested)]
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Load configuration: defaults, then the optional file, then
    /// `CLOUDKEEP__SECTION__KEY` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix("CLOUDKEEP")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut config: AppConfig = settings.try_deserialize()?;

        // The flat key variable wins so deployments can keep the key out of config files
        if let Ok(key) = std::env::var(ENCRYPTION_KEY_ENV) {
            config.encryption.master_key_base64 = key;
        }
        if let Ok(version) = std::env::var(ENCRYPTION_KEY_VERSION_ENV) {
            config.encryption.key_version = version;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self).map_err(Error::from)?;
        self.validate_custom()
    }

    /// Custom validation logic that goes beyond what the validator crate can do
    fn validate_custom(&self) -> Result<()> {
        self.encryption.key_bytes()?;

        if self.database.min_connections > self.database.max_connections {
            return Err(Error::config("min_connections cannot be greater than max_connections"));
        }

        if !self.database.url.starts_with("postgres://")
            && !self.database.url.starts_with("postgresql://")
        {
            return Err(Error::config(
                "Database URL must start with 'postgres://' or 'postgresql://'",
            ));
        }

        Ok(())
    }
}

/// Configuration for the master-key encryptor
#[derive(Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct EncryptionConfig {
    /// Base64-encoded 32-byte master encryption key
    pub master_key_base64: String,

    /// Key version for rotation tracking
    #[validate(length(min = 1, message = "Key version cannot be empty"))]
    pub key_version: String,
}

impl Default for EncryptionConfig {
    fn default() -> Self {
        Self { master_key_base64: String::new(), key_version: "default".to_string() }
    }
}

impl EncryptionConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let master_key_base64 = std::env::var(ENCRYPTION_KEY_ENV).map_err(|_| {
            Error::config(format!(
                "{} environment variable not set. Generate a key with: openssl rand -base64 32",
                ENCRYPTION_KEY_ENV
            ))
        })?;

        let key_version =
            std::env::var(ENCRYPTION_KEY_VERSION_ENV).unwrap_or_else(|_| "default".to_string());

        Ok(Self { master_key_base64, key_version })
    }

    /// Decode and length-check the master key
    pub fn key_bytes(&self) -> Result<[u8; 32]> {
        let key_bytes = base64::engine::general_purpose::STANDARD
            .decode(self.master_key_base64.trim())
            .map_err(|e| {
                Error::config(format!("Invalid base64 in {}: {}", ENCRYPTION_KEY_ENV, e))
            })?;

        if key_bytes.len() != 32 {
            return Err(Error::config(format!(
                "{} must be 32 bytes (256 bits), got {} bytes",
                ENCRYPTION_KEY_ENV,
                key_bytes.len()
            )));
        }

        let mut key = [0u8; 32];
        key.copy_from_slice(&key_bytes);
        Ok(key)
    }

    /// Create a development/testing configuration with a fixed key
    /// WARNING: Only use this for development/testing, never in production!
    pub fn for_testing() -> Self {
        Self {
            master_key_base64: base64::engine::general_purpose::STANDARD.encode([0x42u8; 32]),
            key_version: "test".to_string(),
        }
    }
}

impl std::fmt::Debug for EncryptionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionConfig")
            .field("master_key_base64", &"[REDACTED]")
            .field("key_version", &self.key_version)
            .finish()
    }
}

/// Live verification of provider credentials
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct VerificationConfig {
    /// Run the online GCP check before storing service accounts
    pub enabled: bool,

    /// Upper bound for the whole live check
    #[validate(range(min = 1, max = 300, message = "Timeout must be between 1 and 300 seconds"))]
    pub timeout_seconds: u64,

    /// Region probed by the cluster-management permission check
    #[validate(length(min = 1, message = "Default region cannot be empty"))]
    pub default_region: String,

    /// Base URL of the IAM API
    #[validate(url(message = "IAM endpoint must be a valid URL"))]
    pub iam_endpoint: String,

    /// Base URL of the Kubernetes Engine API
    #[validate(url(message = "Container endpoint must be a valid URL"))]
    pub container_endpoint: String,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_seconds: 15,
            default_region: "asia-northeast3".to_string(),
            iam_endpoint: "https://iam.googleapis.com".to_string(),
            container_endpoint: "https://container.googleapis.com".to_string(),
        }
    }
}

impl VerificationConfig {
    /// Get the live check timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database connection URL
    #[validate(length(min = 1, message = "Database URL cannot be empty"))]
    pub url: String,

    /// Maximum number of connections in the pool
    #[validate(range(min = 1, max = 100, message = "Max connections must be between 1 and 100"))]
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[validate(range(min = 1, max = 60, message = "Connect timeout must be between 1 and 60 seconds"))]
    pub connect_timeout_seconds: u64,

    /// Run embedded migrations on startup
    pub auto_migrate: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgresql://localhost:5432/cloudkeep".to_string(),
            max_connections: 10,
            min_connections: 0,
            connect_timeout_seconds: 10,
            auto_migrate: true,
        }
    }
}

impl DatabaseConfig {
    /// Get connection timeout as Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }
}

/// Outbox relay configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct OutboxConfig {
    /// Fallback polling interval when no mutation notification arrives
    #[validate(range(min = 10, message = "Poll interval must be at least 10ms"))]
    pub poll_interval_ms: u64,

    /// Entries fetched per relay pass
    #[validate(range(min = 1, max = 1000, message = "Batch size must be between 1 and 1000"))]
    pub batch_size: usize,

    /// Delivery attempts before an entry is marked failed
    #[validate(range(min = 1, max = 100, message = "Max attempts must be between 1 and 100"))]
    pub max_attempts: u32,

    /// Base delay between delivery attempts, multiplied by the attempt number
    pub retry_backoff_ms: u64,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self { poll_interval_ms: 1000, batch_size: 100, max_attempts: 5, retry_backoff_ms: 500 }
    }
}

impl OutboxConfig {
    /// Get the polling interval as Duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Backoff before the given (1-based) retry attempt
    pub fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(attempt as u64))
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Default log filter when RUST_LOG is unset
    #[validate(length(min = 1, message = "Log level cannot be empty"))]
    pub log_level: String,

    /// Emit JSON log lines instead of human-readable text
    pub json_logs: bool,

    /// Service name attached to startup logs
    #[validate(length(min = 1, message = "Service name cannot be empty"))]
    pub service_name: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self { log_level: "info".to_string(), json_logs: false, service_name: "cloudkeep".to_string() }
    }
}
