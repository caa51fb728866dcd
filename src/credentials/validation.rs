//! Structural validation of credential payloads
//!
//! Checks run without network access and without judging whether secret
//! values are correct. The first missing or invalid field fails the check and
//! is named in the error.

use serde_json::Value;

use crate::domain::{CredentialData, CredentialPayload, Provider};
use crate::errors::{Error, Result};

/// Maximum length of a credential display name
pub const MAX_NAME_LENGTH: usize = 100;

/// Required value of the GCP `type` field
const GCP_SERVICE_ACCOUNT_TYPE: &str = "service_account";

const AWS_REQUIRED: &[&str] = &["access_key", "secret_key"];

const GCP_REQUIRED: &[&str] = &[
    "type",
    "project_id",
    "private_key",
    "private_key_id",
    "client_email",
    "client_id",
    "auth_uri",
    "token_uri",
];

const AZURE_REQUIRED: &[&str] = &["client_id", "client_secret", "tenant_id"];

const OPENSTACK_REQUIRED: &[&str] = &["auth_url", "username", "password"];

/// Membership test against the supported provider set
pub fn validate_provider(provider: &str) -> bool {
    provider.parse::<Provider>().is_ok()
}

/// Parse a provider name, failing validation for unsupported values
pub fn parse_provider(provider: &str) -> Result<Provider> {
    provider
        .parse::<Provider>()
        .map_err(|_| Error::validation_field(format!("unsupported provider: {}", provider), "provider"))
}

/// Required fields for a provider, in check order
pub fn required_fields(provider: Provider) -> &'static [&'static str] {
    match provider {
        Provider::Aws => AWS_REQUIRED,
        Provider::Gcp => GCP_REQUIRED,
        Provider::Azure => AZURE_REQUIRED,
        Provider::OpenStack => OPENSTACK_REQUIRED,
    }
}

/// Check that every required field is present and holds a non-empty string
pub fn validate_structure(provider: Provider, data: &CredentialData) -> Result<()> {
    for field in required_fields(provider) {
        match data.get(*field) {
            None | Some(Value::Null) => {
                return Err(Error::validation_field(
                    format!("{} is required for {}", field, provider),
                    *field,
                ));
            }
            Some(Value::String(s)) if !s.trim().is_empty() => {}
            Some(_) => {
                return Err(Error::validation_field(
                    format!("{} must be a non-empty string for {}", field, provider),
                    *field,
                ));
            }
        }

        if provider == Provider::Gcp && *field == "type" {
            let account_type = data.get("type").and_then(Value::as_str).unwrap_or_default();
            if account_type != GCP_SERVICE_ACCOUNT_TYPE {
                return Err(Error::validation_field(
                    format!("invalid service account type: {}", account_type),
                    "type",
                ));
            }
        }
    }

    Ok(())
}

/// Validate the structure and lift the map into its typed payload
pub fn parse_payload(provider: Provider, data: &CredentialData) -> Result<CredentialPayload> {
    validate_structure(provider, data)?;
    CredentialPayload::from_validated(provider, data)
}

/// Display names must be 1..=100 characters
pub fn validate_name(name: &str) -> Result<()> {
    let length = name.trim().chars().count();
    if length == 0 {
        return Err(Error::validation_field("name is required", "name"));
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(Error::validation_field(
            format!("name must be at most {} characters", MAX_NAME_LENGTH),
            "name",
        ));
    }
    Ok(())
}
