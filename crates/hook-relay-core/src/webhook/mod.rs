//! # Webhook Envelope Module
//!
//! Parses inbound App webhooks into a provider-neutral [`WebhookEnvelope`].
//!
//! The raw body is kept exactly as received. Its bytes are the input both to
//! inbound signature verification and to re-signing for every relay, so the
//! envelope never re-serializes it.

use bytes::Bytes;
use serde::Deserialize;
use std::collections::HashMap;

use crate::error::ClassificationError;
use crate::signature::DigestAlgorithm;
use crate::InstallationId;

pub mod classifier;

pub use classifier::{
    classify, Classification, GeneralRepoEvent, InstallationLifecycle, InstallationRepoChange,
};

/// Header carrying the event type.
pub const EVENT_TYPE_HEADER: &str = "X-GitHub-Event";

/// Header carrying the delivery id.
pub const DELIVERY_ID_HEADER: &str = "X-GitHub-Delivery";

// ============================================================================
// Headers
// ============================================================================

/// Webhook headers consumed on ingress and reproduced on relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookHeaders {
    pub event_type: String,
    pub delivery_id: String,
    pub signature: Option<String>,
}

impl WebhookHeaders {
    /// Extract headers from a lower-cased header map.
    ///
    /// The event type is mandatory; a missing delivery id becomes an empty
    /// string. The signature is read from the header matching `algorithm`.
    pub fn from_http_headers(
        headers: &HashMap<String, String>,
        algorithm: DigestAlgorithm,
    ) -> Result<Self, ClassificationError> {
        let event_type = headers
            .get("x-github-event")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or(ClassificationError::MissingEventType)?;

        let delivery_id = headers
            .get("x-github-delivery")
            .cloned()
            .unwrap_or_default();

        let signature = headers
            .get(&algorithm.header_name().to_ascii_lowercase())
            .cloned();

        Ok(Self {
            event_type,
            delivery_id,
            signature,
        })
    }
}

// ============================================================================
// Event Kinds
// ============================================================================

/// What an envelope represents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Installation(InstallationAction),
    InstallationRepositories(RepositoriesAction),
    /// Any event that names a repository.
    Repository,
    /// Events this relay has no handling for, including `ping`.
    Unrecognized,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallationAction {
    Create,
    Delete,
    Other(String),
}

impl InstallationAction {
    fn from_action(action: &str) -> Self {
        match action {
            "created" => Self::Create,
            "deleted" => Self::Delete,
            other => Self::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepositoriesAction {
    Added,
    Removed,
    Other(String),
}

impl RepositoriesAction {
    fn from_action(action: &str) -> Self {
        match action {
            "added" => Self::Added,
            "removed" => Self::Removed,
            other => Self::Other(other.to_string()),
        }
    }
}

// ============================================================================
// Envelope
// ============================================================================

/// The repository an event is about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepositoryDescriptor {
    pub namespace: String,
    pub name: String,
    pub full_name: String,
    /// Browser URL of the repository
    pub link: String,
    pub clone_url: String,
}

impl RepositoryDescriptor {
    /// URL used to look the repository up in the tenant directory.
    ///
    /// The browser link is preferred; the clone URL is the fallback.
    pub fn url(&self) -> &str {
        if self.link.is_empty() {
            &self.clone_url
        } else {
            &self.link
        }
    }
}

/// Installation named by an envelope. An id of zero means absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallationRef {
    pub id: InstallationId,
    /// URL of the account that owns the installation
    pub owner_url: String,
}

/// Parsed, immutable webhook.
#[derive(Debug, Clone)]
pub struct WebhookEnvelope {
    kind: EventKind,
    headers: WebhookHeaders,
    body: Bytes,
    repository: Option<RepositoryDescriptor>,
    installation: Option<InstallationRef>,
    repositories_added: Vec<String>,
    repositories_removed: Vec<String>,
}

#[derive(Deserialize)]
struct RawPayload {
    #[serde(default)]
    action: Option<String>,
    #[serde(default)]
    installation: Option<RawInstallation>,
    #[serde(default)]
    repository: Option<RawRepository>,
    #[serde(default)]
    repositories_added: Vec<RawRepositoryName>,
    #[serde(default)]
    repositories_removed: Vec<RawRepositoryName>,
}

#[derive(Deserialize)]
struct RawInstallation {
    #[serde(default)]
    id: u64,
    #[serde(default)]
    account: Option<RawAccount>,
}

#[derive(Deserialize)]
struct RawAccount {
    #[serde(default)]
    login: String,
    #[serde(default)]
    html_url: String,
}

#[derive(Deserialize)]
struct RawRepository {
    #[serde(default)]
    name: String,
    #[serde(default)]
    full_name: String,
    #[serde(default)]
    owner: Option<RawAccount>,
    #[serde(default)]
    html_url: String,
    #[serde(default)]
    clone_url: String,
}

#[derive(Deserialize)]
struct RawRepositoryName {
    #[serde(default)]
    full_name: String,
}

impl WebhookEnvelope {
    /// Parse `body` according to the event type in `headers`.
    pub fn parse(headers: WebhookHeaders, body: Bytes) -> Result<Self, ClassificationError> {
        let raw: RawPayload =
            serde_json::from_slice(&body).map_err(|e| ClassificationError::MalformedPayload {
                event_type: headers.event_type.clone(),
                message: e.to_string(),
            })?;

        let action = raw.action.as_deref().unwrap_or_default();
        let kind = match headers.event_type.as_str() {
            "installation" => EventKind::Installation(InstallationAction::from_action(action)),
            "installation_repositories" => {
                EventKind::InstallationRepositories(RepositoriesAction::from_action(action))
            }
            "ping" => EventKind::Unrecognized,
            _ if raw.repository.is_some() => EventKind::Repository,
            _ => EventKind::Unrecognized,
        };

        let installation = raw.installation.map(|inst| InstallationRef {
            id: InstallationId::new(inst.id),
            owner_url: inst.account.map(|a| a.html_url).unwrap_or_default(),
        });

        let repository = raw.repository.map(|repo| {
            let namespace = repo.owner.map(|o| o.login).unwrap_or_default();
            RepositoryDescriptor {
                full_name: if repo.full_name.is_empty() {
                    format!("{}/{}", namespace, repo.name)
                } else {
                    repo.full_name
                },
                namespace,
                name: repo.name,
                link: repo.html_url,
                clone_url: repo.clone_url,
            }
        });

        Ok(Self {
            kind,
            headers,
            body,
            repository,
            installation,
            repositories_added: raw
                .repositories_added
                .into_iter()
                .map(|r| r.full_name)
                .collect(),
            repositories_removed: raw
                .repositories_removed
                .into_iter()
                .map(|r| r.full_name)
                .collect(),
        })
    }

    pub fn kind(&self) -> &EventKind {
        &self.kind
    }

    pub fn headers(&self) -> &WebhookHeaders {
        &self.headers
    }

    pub fn event_type(&self) -> &str {
        &self.headers.event_type
    }

    pub fn delivery_id(&self) -> &str {
        &self.headers.delivery_id
    }

    /// The body exactly as received.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn repository(&self) -> Option<&RepositoryDescriptor> {
        self.repository.as_ref()
    }

    pub fn installation(&self) -> Option<&InstallationRef> {
        self.installation.as_ref()
    }

    pub fn repositories_added(&self) -> &[String] {
        &self.repositories_added
    }

    pub fn repositories_removed(&self) -> &[String] {
        &self.repositories_removed
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
