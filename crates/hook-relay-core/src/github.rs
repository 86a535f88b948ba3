//! # Source-Control API Client
//!
//! The small part of the GitHub REST API this service uses:
//!
//! - installation lookup for a repository, organization or user, authenticated
//!   as the App with a JWT
//! - exchanging the App JWT for an installation token, used when credentials
//!   are not delegated to the tenant directory
//! - listing pull request labels with an installation token, used by the
//!   token diagnostic endpoint

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::ACCEPT;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

use crate::credentials::{AppJwtGenerator, CredentialProvider, InstallationCredential};
use crate::error::{CredentialError, GitHubApiError};
use crate::transport::{api_client, AuthenticatedClient};
use crate::InstallationId;

const GITHUB_ACCEPT: &str = "application/vnd.github+json";
const DEFAULT_BOT_NAME: &str = "jenkins-x";
const LABELS_PAGE_SIZE: u32 = 100;

// ============================================================================
// Bot naming
// ============================================================================

/// Bot account name with any `[bot]` suffix removed.
///
/// ```rust
/// use hook_relay_core::github::bot_name;
///
/// assert_eq!(bot_name("my-app[bot]"), "my-app");
/// assert_eq!(bot_name(""), "jenkins-x");
/// ```
pub fn bot_name(configured: &str) -> String {
    let name = configured.replace("[bot]", "");
    if name.is_empty() {
        DEFAULT_BOT_NAME.to_string()
    } else {
        name
    }
}

/// Human-readable App name: `jenkins-x` becomes `Jenkins X`.
pub fn app_display_name(bot: &str) -> String {
    bot.to_lowercase()
        .replace('-', " ")
        .split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// Page where an owner can install the App.
pub fn install_url(bot: &str) -> String {
    format!("https://github.com/apps/{}/installations/new", bot)
}

// ============================================================================
// Installation lookup
// ============================================================================

/// Whether the App is installed for an owner and repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallationStatus {
    #[serde(rename = "Installed")]
    pub installed: bool,
    #[serde(rename = "AccessToRepo")]
    pub access_to_repo: bool,
    #[serde(rename = "URL")]
    pub url: String,
    #[serde(rename = "AppName")]
    pub app_name: String,
}

#[derive(Debug, Deserialize)]
struct InstallationResponse {
    #[serde(default)]
    html_url: String,
}

#[derive(Debug, Deserialize)]
struct AccessTokenResponse {
    token: String,
    #[serde(default)]
    expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct LabelResponse {
    name: String,
}

/// API client authenticated as the App itself.
pub struct GitHubAppClient {
    http: Client,
    api_base: Url,
    jwt: Arc<AppJwtGenerator>,
    bot_name: String,
}

impl GitHubAppClient {
    pub fn new(
        api_base: &str,
        jwt: Arc<AppJwtGenerator>,
        configured_bot_name: &str,
        timeout: Duration,
    ) -> Result<Self, GitHubApiError> {
        let api_base = Url::parse(api_base).map_err(|e| GitHubApiError::InvalidUrl {
            message: format!("{}: {}", api_base, e),
        })?;
        let http = api_client(timeout).map_err(|e| GitHubApiError::Transport {
            message: format!("Failed to create HTTP client: {}", e),
        })?;

        Ok(Self {
            http,
            api_base,
            jwt,
            bot_name: bot_name(configured_bot_name),
        })
    }

    pub fn bot_name(&self) -> &str {
        &self.bot_name
    }

    pub fn api_base(&self) -> &Url {
        &self.api_base
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, GitHubApiError> {
        api_url(&self.api_base, segments)
    }

    fn as_app(&self) -> Result<AuthenticatedClient, GitHubApiError> {
        let jwt = self.jwt.token()?;
        Ok(AuthenticatedClient::bearer(self.http.clone(), jwt.token())?)
    }

    /// Look the App up for `owner` and optionally `repository`.
    ///
    /// Repository installation first, then organization, then user. A 404 at
    /// every level means not installed.
    #[instrument(skip(self))]
    pub async fn find_installation(
        &self,
        owner: &str,
        repository: Option<&str>,
    ) -> Result<InstallationStatus, GitHubApiError> {
        let app_name = app_display_name(&self.bot_name);
        let status = |installed, access_to_repo, url| InstallationStatus {
            installed,
            access_to_repo,
            url,
            app_name: app_name.clone(),
        };

        if let Some(repository) = repository.filter(|r| !r.is_empty()) {
            let url = self.endpoint(&["repos", owner, repository, "installation"])?;
            if let Some(found) = self.lookup(url).await? {
                return Ok(status(true, true, found.html_url));
            }
            debug!("No repository installation, trying organization");
        }

        if let Some(found) = self
            .lookup(self.endpoint(&["orgs", owner, "installation"])?)
            .await?
        {
            return Ok(status(true, false, found.html_url));
        }
        debug!("No organization installation, trying user");

        if let Some(found) = self
            .lookup(self.endpoint(&["users", owner, "installation"])?)
            .await?
        {
            return Ok(status(true, false, found.html_url));
        }
        debug!("App not installed");

        Ok(status(false, false, install_url(&self.bot_name)))
    }

    async fn lookup(&self, url: Url) -> Result<Option<InstallationResponse>, GitHubApiError> {
        let response = self
            .as_app()?
            .get(url)
            .header(ACCEPT, GITHUB_ACCEPT)
            .send()
            .await
            .map_err(transport_error)?;

        match response.status() {
            StatusCode::OK => response.json().await.map(Some).map_err(decode_error),
            StatusCode::NOT_FOUND => Ok(None),
            status => Err(unexpected_status(status, response).await),
        }
    }

    /// Installation-scoped client for `credential`.
    pub fn installation_client(
        &self,
        credential: &InstallationCredential,
    ) -> Result<InstallationApiClient, GitHubApiError> {
        InstallationApiClient::new(self.http.clone(), self.api_base.clone(), credential)
    }
}

#[async_trait]
impl CredentialProvider for GitHubAppClient {
    #[instrument(skip(self), fields(installation_id = %installation_id))]
    async fn fetch_credential(
        &self,
        installation_id: InstallationId,
    ) -> Result<InstallationCredential, CredentialError> {
        let id = installation_id.to_string();
        let url = self.endpoint(&["app", "installations", &id, "access_tokens"])?;
        let response = self
            .as_app()?
            .post(url)
            .header(ACCEPT, GITHUB_ACCEPT)
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(unexpected_status(status, response).await.into());
        }

        let payload: AccessTokenResponse = response.json().await.map_err(decode_error)?;
        if payload.token.is_empty() {
            return Err(CredentialError::MissingToken { installation_id });
        }

        Ok(InstallationCredential::new(
            payload.token,
            installation_id,
            payload.expires_at,
        ))
    }
}

// ============================================================================
// Installation-scoped client
// ============================================================================

/// API client acting on behalf of one installation.
///
/// Built per credential; a new credential means a new client.
#[derive(Debug, Clone)]
pub struct InstallationApiClient {
    client: AuthenticatedClient,
    api_base: Url,
    installation_id: InstallationId,
}

impl InstallationApiClient {
    pub fn new(
        http: Client,
        api_base: Url,
        credential: &InstallationCredential,
    ) -> Result<Self, GitHubApiError> {
        Ok(Self {
            client: AuthenticatedClient::bearer(http, credential.token())?,
            api_base,
            installation_id: credential.installation_id(),
        })
    }

    pub fn installation_id(&self) -> InstallationId {
        self.installation_id
    }

    /// Names of the labels on pull request `number` of `repository`
    /// (`owner/name`).
    #[instrument(skip(self), fields(installation_id = %self.installation_id))]
    pub async fn list_pull_request_labels(
        &self,
        repository: &str,
        number: u64,
    ) -> Result<Vec<String>, GitHubApiError> {
        let number = number.to_string();
        let mut segments = vec!["repos"];
        segments.extend(repository.split('/'));
        segments.extend(["issues", number.as_str(), "labels"]);

        let mut url = api_url(&self.api_base, &segments)?;
        url.query_pairs_mut()
            .append_pair("per_page", &LABELS_PAGE_SIZE.to_string());

        let response = self
            .client
            .get(url)
            .header(ACCEPT, GITHUB_ACCEPT)
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(unexpected_status(status, response).await);
        }

        let labels: Vec<LabelResponse> = response.json().await.map_err(decode_error)?;
        Ok(labels.into_iter().map(|l| l.name).collect())
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// `base` with `segments` appended, each percent-encoded as one path segment.
fn api_url(base: &Url, segments: &[&str]) -> Result<Url, GitHubApiError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| GitHubApiError::InvalidUrl {
            message: format!("{} cannot carry a path", base),
        })?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

fn transport_error(e: reqwest::Error) -> GitHubApiError {
    GitHubApiError::Transport {
        message: e.to_string(),
    }
}

fn decode_error(e: reqwest::Error) -> GitHubApiError {
    GitHubApiError::InvalidResponse {
        message: e.to_string(),
    }
}

async fn unexpected_status(status: StatusCode, response: reqwest::Response) -> GitHubApiError {
    GitHubApiError::UnexpectedStatus {
        status: status.as_u16(),
        body: response.text().await.unwrap_or_default(),
    }
}

#[cfg(test)]
#[path = "github_tests.rs"]
mod tests;
