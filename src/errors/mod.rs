//! # Error Handling
//!
//! Crate-wide error type and result alias for the credential subsystem.

pub mod types;

pub use types::{Error, Result};
