//! # Observability Infrastructure
//!
//! Structured logging for the credential service and the outbox worker.

pub mod logging;

pub use logging::{init_logging, log_config_info};
