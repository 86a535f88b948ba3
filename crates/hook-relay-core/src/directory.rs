//! # Tenant Directory
//!
//! The tenant directory maps an installation and repository to the workspaces
//! that want its webhooks. It is also told when the App is installed or
//! removed, and in the default deployment it hands out installation tokens.
//!
//! [`TenantDirectory`] is the seam used by the relay and dispatcher;
//! [`HttpTenantDirectory`] is the production client for the directory's REST
//! API.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, instrument};
use url::Url;

use crate::credentials::{CredentialProvider, InstallationCredential};
use crate::error::{CredentialError, DirectoryError};
use crate::InstallationId;

const API_PREFIX: &str = "api/v1/github/app";

/// One workspace as reported by the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceAccess {
    #[serde(default)]
    pub project: String,
    #[serde(default)]
    pub cluster: String,
    #[serde(default)]
    pub region: String,
    #[serde(rename = "lighthouseURL", default)]
    pub lighthouse_url: String,
    /// Base64-encoded shared secret
    #[serde(default)]
    pub hmac: String,
}

/// A relay target: an endpoint plus the secret used to sign for it.
#[derive(Clone, PartialEq, Eq)]
pub struct Destination {
    pub url: String,
    /// Shared secret as delivered by the directory, still base64-encoded
    pub encoded_secret: String,
    pub project: String,
    pub cluster: String,
    pub region: String,
}

impl From<WorkspaceAccess> for Destination {
    fn from(access: WorkspaceAccess) -> Self {
        Self {
            url: access.lighthouse_url,
            encoded_secret: access.hmac,
            project: access.project,
            cluster: access.cluster,
            region: access.region,
        }
    }
}

impl std::fmt::Debug for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Destination")
            .field("url", &self.url)
            .field("encoded_secret", &"<REDACTED>")
            .field("project", &self.project)
            .field("cluster", &self.cluster)
            .field("region", &self.region)
            .finish()
    }
}

/// Operations the relay needs from the tenant directory.
#[async_trait]
pub trait TenantDirectory: Send + Sync {
    /// Register an installation and the account that owns it.
    async fn app_install(
        &self,
        installation_id: InstallationId,
        owner_url: &str,
    ) -> Result<(), DirectoryError>;

    /// Forget an installation.
    async fn app_uninstall(&self, installation_id: InstallationId) -> Result<(), DirectoryError>;

    /// Workspaces interested in `git_url`. An empty list is a valid answer.
    async fn find_workspaces(
        &self,
        installation_id: InstallationId,
        git_url: &str,
    ) -> Result<Vec<Destination>, DirectoryError>;
}

#[derive(Serialize)]
struct InstallRequest<'a> {
    #[serde(rename = "ownerURL")]
    owner_url: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(rename = "expiresAt", default)]
    expires_at: Option<DateTime<Utc>>,
}

/// REST client for the tenant directory service.
#[derive(Debug, Clone)]
pub struct HttpTenantDirectory {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpTenantDirectory {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, DirectoryError> {
        let base_url = Url::parse(base_url).map_err(|e| DirectoryError::InvalidUrl {
            message: format!("{}: {}", base_url, e),
        })?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DirectoryError::Transport {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            API_PREFIX,
            path
        )
    }

    fn installation_endpoint(&self, installation_id: InstallationId) -> String {
        self.endpoint(&format!("installation/{}", installation_id))
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, DirectoryError> {
        let response = request.send().await.map_err(|e| DirectoryError::Transport {
            message: e.to_string(),
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(DirectoryError::UnexpectedStatus {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl TenantDirectory for HttpTenantDirectory {
    #[instrument(skip(self), fields(installation_id = %installation_id))]
    async fn app_install(
        &self,
        installation_id: InstallationId,
        owner_url: &str,
    ) -> Result<(), DirectoryError> {
        let request = self
            .client
            .post(self.installation_endpoint(installation_id))
            .json(&InstallRequest { owner_url });
        self.send(request).await?;

        info!(owner_url, "Registered installation with tenant directory");
        Ok(())
    }

    #[instrument(skip(self), fields(installation_id = %installation_id))]
    async fn app_uninstall(&self, installation_id: InstallationId) -> Result<(), DirectoryError> {
        let request = self
            .client
            .delete(self.installation_endpoint(installation_id));
        self.send(request).await?;

        info!("Removed installation from tenant directory");
        Ok(())
    }

    #[instrument(skip(self), fields(installation_id = %installation_id))]
    async fn find_workspaces(
        &self,
        installation_id: InstallationId,
        git_url: &str,
    ) -> Result<Vec<Destination>, DirectoryError> {
        let installation = installation_id.to_string();
        let request = self
            .client
            .get(self.endpoint("workspaces"))
            .query(&[("gitURL", git_url), ("installation", installation.as_str())]);
        let response = self.send(request).await?;

        let workspaces: Vec<WorkspaceAccess> =
            response
                .json()
                .await
                .map_err(|e| DirectoryError::InvalidResponse {
                    message: format!("Failed to decode workspaces: {}", e),
                })?;

        debug!(count = workspaces.len(), "Resolved workspaces");
        Ok(workspaces.into_iter().map(Destination::from).collect())
    }
}

#[async_trait]
impl CredentialProvider for HttpTenantDirectory {
    #[instrument(skip(self), fields(installation_id = %installation_id))]
    async fn fetch_credential(
        &self,
        installation_id: InstallationId,
    ) -> Result<InstallationCredential, CredentialError> {
        let request = self.client.get(format!(
            "{}/token",
            self.installation_endpoint(installation_id)
        ));
        let response = self.send(request).await?;

        let payload: TokenResponse =
            response
                .json()
                .await
                .map_err(|e| DirectoryError::InvalidResponse {
                    message: format!("Failed to decode token response: {}", e),
                })?;

        match payload.token.filter(|t| !t.is_empty()) {
            Some(token) => Ok(InstallationCredential::new(
                token,
                installation_id,
                payload.expires_at,
            )),
            None => Err(CredentialError::MissingToken { installation_id }),
        }
    }
}

#[cfg(test)]
#[path = "directory_tests.rs"]
mod tests;
