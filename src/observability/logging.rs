//! # Structured Logging
//!
//! Subscriber setup and span helpers built on the tracing ecosystem.
//! Secret values never appear in spans: only identifiers, provider names and lengths.

use crate::config::ObservabilityConfig;
use crate::errors::{Error, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Create a tracing span for credential operations.
///
/// ```rust,ignore
/// let span = credential_span!("update", workspace_id = %ws, credential_id = %id);
/// ```
#[macro_export]
macro_rules! credential_span {
    ($operation:expr) => {
        tracing::info_span!(
            "credential_operation",
            operation = %$operation,
            operation_id = %uuid::Uuid::new_v4()
        )
    };
    ($operation:expr, $($field:tt)*) => {
        tracing::info_span!(
            "credential_operation",
            operation = %$operation,
            operation_id = %uuid::Uuid::new_v4(),
            $($field)*
        )
    };
}

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over `config.log_level`. Fails if a global
/// subscriber was already installed.
pub fn init_logging(config: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| Error::config(format!("Invalid log level '{}': {}", config.log_level, e)))?;

    let registry = tracing_subscriber::registry().with(filter);

    let result = if config.json_logs {
        registry.with(fmt::layer().json().with_current_span(true)).try_init()
    } else {
        registry.with(fmt::layer().with_target(true)).try_init()
    };

    result.map_err(|e| Error::config(format!("Failed to initialize logging: {}", e)))
}

/// Log configuration at startup
pub fn log_config_info(config: &crate::config::AppConfig) {
    tracing::info!(
        service_name = %config.observability.service_name,
        key_version = %config.encryption.key_version,
        verification_enabled = config.verification.enabled,
        verification_region = %config.verification.default_region,
        outbox_max_attempts = config.outbox.max_attempts,
        "cloudkeep configuration"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_macros_compile() {
        let _span = credential_span!("create");
        let _span = credential_span!("delete", credential_id = "abc", workspace_id = "ws-1");
    }

    #[test]
    fn test_log_config_info_runs() {
        log_config_info(&crate::config::AppConfig::default());
    }
}
