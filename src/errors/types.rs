//! # Error Types
//!
//! Error taxonomy for the credential lifecycle using `thiserror`.
//!
//! `Validation`, `NotFound` and `Forbidden` are surfaced to callers unmodified.
//! `Internal`, `Database` and `Serialization` messages are built from static
//! context only: they must never carry decrypted payload content.

use crate::credentials::verification::VerificationError;

/// Custom result type for cloudkeep operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the credential subsystem
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Bad or missing fields, unsupported provider, or a failed live check
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
        #[source]
        source: Option<VerificationError>,
    },

    /// Resource not found errors
    #[error("Resource not found: {resource_type} with ID '{id}'")]
    NotFound { resource_type: String, id: String },

    /// Workspace mismatch or denied provider permission
    #[error("Forbidden: {message}")]
    Forbidden { message: String },

    /// Malformed input to a lower layer (e.g. empty ciphertext)
    #[error("Bad request: {message}")]
    BadRequest { message: String },

    /// Upstream cloud provider failures
    #[error("Provider error: {message}")]
    Provider { message: String, status: u16 },

    /// Internal server errors
    #[error("Internal server error: {message}")]
    Internal { message: String },

    /// Database and storage errors
    #[error("Database error: {context}")]
    Database {
        #[source]
        source: sqlx::Error,
        context: String,
    },

    /// Serialization/deserialization errors
    #[error("Serialization error: {context}")]
    Serialization { context: String },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl Error {
    /// Create a validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation { message: message.into(), field: None, source: None }
    }

    /// Create a validation error with field information
    pub fn validation_field<S: Into<String>, F: Into<String>>(message: S, field: F) -> Self {
        Self::Validation { message: message.into(), field: Some(field.into()), source: None }
    }

    /// Wrap a failed live verification as a validation failure
    pub fn verification_failed<S: Into<String>>(message: S, source: VerificationError) -> Self {
        Self::Validation { message: message.into(), field: None, source: Some(source) }
    }

    /// Create a not found error
    pub fn not_found<R: Into<String>, I: Into<String>>(resource_type: R, id: I) -> Self {
        Self::NotFound { resource_type: resource_type.into(), id: id.into() }
    }

    /// Create a forbidden error
    pub fn forbidden<S: Into<String>>(message: S) -> Self {
        Self::Forbidden { message: message.into() }
    }

    /// Create a bad request error
    pub fn bad_request<S: Into<String>>(message: S) -> Self {
        Self::BadRequest { message: message.into() }
    }

    /// Create an upstream provider error (502)
    pub fn provider<S: Into<String>>(message: S) -> Self {
        Self::Provider { message: message.into(), status: 502 }
    }

    /// Create an internal server error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal { message: message.into() }
    }

    /// Create a serialization error
    pub fn serialization<S: Into<String>>(context: S) -> Self {
        Self::Serialization { context: context.into() }
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config { message: message.into() }
    }

    /// Wrap a sqlx error with context
    pub fn database<S: Into<String>>(source: sqlx::Error, context: S) -> Self {
        Self::Database { source, context: context.into() }
    }

    /// Name of the offending field, when a validation error carries one
    pub fn field(&self) -> Option<&str> {
        match self {
            Error::Validation { field, .. } => field.as_deref(),
            _ => None,
        }
    }

    /// Get the HTTP status code that should be returned for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Validation { .. } => 400,
            Error::NotFound { .. } => 404,
            Error::Forbidden { .. } => 403,
            Error::BadRequest { .. } => 400,
            Error::Provider { status, .. } => *status,
            Error::Internal { .. } => 500,
            Error::Database { .. } => 500,
            Error::Serialization { .. } => 500,
            Error::Config { .. } => 500,
        }
    }

    /// Check if this error should be retried
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Database { .. } | Error::Provider { .. })
    }
}

impl From<sqlx::Error> for Error {
    fn from(error: sqlx::Error) -> Self {
        Self::Database { source: error, context: "Database operation failed".to_string() }
    }
}

impl From<sqlx::migrate::MigrateError> for Error {
    fn from(error: sqlx::migrate::MigrateError) -> Self {
        Self::Database {
            source: sqlx::Error::Migrate(Box::new(error)),
            context: "Database migration failed".to_string(),
        }
    }
}

impl From<config::ConfigError> for Error {
    fn from(error: config::ConfigError) -> Self {
        Self::config(format!("Configuration loading failed: {}", error))
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(errors: validator::ValidationErrors) -> Self {
        let message = errors
            .field_errors()
            .iter()
            .map(|(field, field_errors)| {
                let error_messages: Vec<String> = field_errors
                    .iter()
                    .map(|e| {
                        e.message.as_ref().map_or("Invalid value".to_string(), |m| m.to_string())
                    })
                    .collect();
                format!("{}: {}", field, error_messages.join(", "))
            })
            .collect::<Vec<_>>()
            .join("; ");

        Self::config(format!("Invalid configuration: {}", message))
    }
}

impl From<VerificationError> for Error {
    fn from(error: VerificationError) -> Self {
        match error {
            VerificationError::NotFound { .. } => Self::NotFound {
                resource_type: "ServiceAccount".to_string(),
                id: error.to_string(),
            },
            VerificationError::Forbidden { .. } => Self::forbidden(error.to_string()),
            VerificationError::Provider { .. } => Self::provider(error.to_string()),
        }
    }
}
