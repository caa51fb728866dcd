//! Online verification of GCP service accounts
//!
//! A structurally valid key can still be useless: the account may have been
//! deleted, or it may lack the permissions provisioning needs later. Before a
//! GCP credential is stored, [`GcpAccessVerifier`] looks the account up in IAM
//! and probes one read call against each required API in a fixed region.
//!
//! The whole check is bounded by the configured timeout and is cancelled when
//! the caller drops the future.

use async_trait::async_trait;
use reqwest::StatusCode;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::config::VerificationConfig;
use crate::domain::GcpServiceAccount;
use crate::errors::{Error, Result};

/// OAuth scope requested for the verification token
pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

/// Why a live check rejected a credential
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerificationError {
    #[error("service account not found: {message}")]
    NotFound { message: String },

    #[error("permission denied: {message}")]
    Forbidden { message: String },

    #[error("provider request failed: {message}")]
    Provider { message: String },
}

impl VerificationError {
    fn provider<S: Into<String>>(message: S) -> Self {
        Self::Provider { message: message.into() }
    }
}

/// Provider-specific online check run before a credential is stored
#[async_trait]
pub trait LiveAccessVerifier: Send + Sync {
    async fn verify(
        &self,
        account: &GcpServiceAccount,
    ) -> std::result::Result<(), VerificationError>;
}

/// Mints bearer tokens on behalf of the account under test
#[async_trait]
pub trait AccessTokenSource: Send + Sync {
    async fn access_token(
        &self,
        account: &GcpServiceAccount,
    ) -> std::result::Result<String, VerificationError>;
}

/// Hands out a fixed token. Used against emulators and in tests.
#[derive(Clone)]
pub struct StaticTokenSource {
    token: String,
}

impl StaticTokenSource {
    pub fn new(token: impl Into<String>) -> Self {
        Self { token: token.into() }
    }
}

impl std::fmt::Debug for StaticTokenSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticTokenSource").field("token", &"[REDACTED]").finish()
    }
}

#[async_trait]
impl AccessTokenSource for StaticTokenSource {
    async fn access_token(
        &self,
        _account: &GcpServiceAccount,
    ) -> std::result::Result<String, VerificationError> {
        Ok(self.token.clone())
    }
}

/// Exchanges the submitted service-account key for a token via yup-oauth2
#[cfg(feature = "gcp")]
#[derive(Debug, Default, Clone)]
pub struct ServiceAccountTokenSource;

#[cfg(feature = "gcp")]
#[async_trait]
impl AccessTokenSource for ServiceAccountTokenSource {
    async fn access_token(
        &self,
        account: &GcpServiceAccount,
    ) -> std::result::Result<String, VerificationError> {
        let key_json = zeroize::Zeroizing::new(
            serde_json::to_string(account)
                .map_err(|_| VerificationError::provider("failed to encode service account key"))?,
        );

        // parse errors can echo key material, so they are not forwarded
        let key = yup_oauth2::parse_service_account_key(key_json.as_bytes())
            .map_err(|_| VerificationError::provider("service account key could not be parsed"))?;

        let auth = yup_oauth2::ServiceAccountAuthenticator::builder(key).build().await.map_err(
            |e| VerificationError::provider(format!("failed to build authenticator: {}", e)),
        )?;

        let token = auth.token(&[CLOUD_PLATFORM_SCOPE]).await.map_err(classify_token_error)?;

        token
            .token()
            .map(str::to_string)
            .ok_or_else(|| VerificationError::provider("token endpoint returned no access token"))
    }
}

/// Only an OAuth error answered by the token endpoint means the key was refused
#[cfg(feature = "gcp")]
fn classify_token_error(error: yup_oauth2::Error) -> VerificationError {
    match error {
        yup_oauth2::Error::AuthError(e) => {
            VerificationError::Forbidden { message: format!("token exchange rejected: {}", e) }
        }
        other => {
            warn!(error = %other, "GCP token exchange failed");
            VerificationError::provider(format!("token exchange failed: {}", other))
        }
    }
}

/// Verifies GCP service accounts against the IAM and Kubernetes Engine APIs
pub struct GcpAccessVerifier {
    client: reqwest::Client,
    config: VerificationConfig,
    tokens: Arc<dyn AccessTokenSource>,
}

impl GcpAccessVerifier {
    /// Create a verifier with an explicit token source
    pub fn new(config: VerificationConfig, tokens: Arc<dyn AccessTokenSource>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config, tokens })
    }

    /// Create a verifier that authenticates as the submitted service account
    #[cfg(feature = "gcp")]
    pub fn with_service_account_tokens(config: VerificationConfig) -> Result<Self> {
        Self::new(config, Arc::new(ServiceAccountTokenSource))
    }

    /// Verifier for the configured deployment, or `None` when the live check is disabled
    #[cfg(feature = "gcp")]
    pub fn from_config(config: &VerificationConfig) -> Result<Option<Self>> {
        if !config.enabled {
            debug!("Live GCP verification disabled by configuration");
            return Ok(None);
        }
        Self::with_service_account_tokens(config.clone()).map(Some)
    }

    async fn run_checks(
        &self,
        account: &GcpServiceAccount,
    ) -> std::result::Result<(), VerificationError> {
        let token = self.tokens.access_token(account).await?;
        let iam = self.config.iam_endpoint.trim_end_matches('/');
        let container = self.config.container_endpoint.trim_end_matches('/');
        let project = &account.project_id;

        let lookup = format!("{}/v1/projects/{}/serviceAccounts/{}", iam, project, account.client_email);
        match self.get(&lookup, &token, "service account lookup").await? {
            status if status.is_success() => {}
            StatusCode::NOT_FOUND => {
                return Err(VerificationError::NotFound {
                    message: format!("{} in project {}", account.client_email, project),
                });
            }
            status => return Err(classify("service account lookup", status)),
        }

        let clusters = format!(
            "{}/v1/projects/{}/locations/{}/clusters",
            container, project, self.config.default_region
        );
        let status = self.get(&clusters, &token, "cluster list").await?;
        if !status.is_success() {
            return Err(classify("container.clusters.list", status));
        }

        let accounts = format!("{}/v1/projects/{}/serviceAccounts", iam, project);
        let status = self.get(&accounts, &token, "service account list").await?;
        if !status.is_success() {
            return Err(classify("iam.serviceAccounts.list", status));
        }

        Ok(())
    }

    async fn get(
        &self,
        url: &str,
        token: &str,
        operation: &str,
    ) -> std::result::Result<StatusCode, VerificationError> {
        let response = self.client.get(url).bearer_auth(token).send().await.map_err(|e| {
            warn!(operation, error = %e, "GCP request failed");
            VerificationError::provider(format!("{} request failed", operation))
        })?;

        debug!(operation, status = %response.status(), "GCP request completed");
        Ok(response.status())
    }
}

fn classify(operation: &str, status: StatusCode) -> VerificationError {
    match status {
        StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED => {
            VerificationError::Forbidden { message: operation.to_string() }
        }
        other => VerificationError::provider(format!("{} returned {}", operation, other)),
    }
}

#[async_trait]
impl LiveAccessVerifier for GcpAccessVerifier {
    #[instrument(skip(self, account), fields(project_id = %account.project_id))]
    async fn verify(
        &self,
        account: &GcpServiceAccount,
    ) -> std::result::Result<(), VerificationError> {
        let limit = self.config.timeout();
        match tokio::time::timeout(limit, self.run_checks(account)).await {
            Ok(result) => result,
            Err(_) => Err(VerificationError::provider(format!(
                "verification timed out after {}s",
                limit.as_secs()
            ))),
        }
    }
}

impl std::fmt::Debug for GcpAccessVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GcpAccessVerifier")
            .field("iam_endpoint", &self.config.iam_endpoint)
            .field("container_endpoint", &self.config.container_endpoint)
            .field("default_region", &self.config.default_region)
            .finish()
    }
}
